use std::time::Duration;

use crate::{Error, cloud::BoxFuture};

const STABLE_TXT_URL: &str = "https://dl.k8s.io/release/stable.txt";

/// Where the populator finds a Kubernetes version when the spec does not pin
/// one: first a channel recommendation, then the published stable marker.
pub trait VersionSource: Send + Sync {
    /// The version the release channel recommends for this tool, if any.
    fn channel_recommended<'a>(&'a self) -> BoxFuture<'a, Result<Option<String>, Error>>;

    /// The upstream stable version marker.
    fn stable<'a>(&'a self) -> BoxFuture<'a, Result<String, Error>>;
}

/// The production source: an optional channel recommendation resolved ahead
/// of time, with `stable.txt` as the network fallback.
pub struct StableChannelVersionSource {
    channel_recommended: Option<String>,
}

impl StableChannelVersionSource {
    pub fn new(channel_recommended: Option<String>) -> Self {
        Self {
            channel_recommended,
        }
    }
}

impl VersionSource for StableChannelVersionSource {
    fn channel_recommended<'a>(&'a self) -> BoxFuture<'a, Result<Option<String>, Error>> {
        Box::pin(std::future::ready(Ok(self.channel_recommended.clone())))
    }

    fn stable<'a>(&'a self) -> BoxFuture<'a, Result<String, Error>> {
        Box::pin(async {
            let client = reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(5))
                .timeout(Duration::from_secs(15))
                .build()
                .map_err(|e| Error::VersionResolution(e.to_string()))?;
            let body = client
                .get(STABLE_TXT_URL)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(|e| Error::VersionResolution(e.to_string()))?
                .text()
                .await
                .map_err(|e| Error::VersionResolution(e.to_string()))?;
            let version = body.trim();
            if version.is_empty() {
                return Err(Error::VersionResolution(format!(
                    "{STABLE_TXT_URL} returned an empty body"
                )));
            }
            Ok(version.to_string())
        })
    }
}
