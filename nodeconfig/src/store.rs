use keel_api::{Cluster, InstanceGroup};
use keel_vfs::{Acl, VfsContext, VfsPath};

use crate::{Error, config::NodeUpConfig, keyset::Keyset};

/// The cluster's persisted config tree, rooted at its config base:
/// `config`, `instancegroup/<name>`, `igconfig/<role>/<name>/nodeupconfig.yaml`,
/// `manifests/…`, `pki/issued/<name>/keyset.yaml`.
pub struct ConfigStore<'a> {
    vfs: &'a VfsContext,
    base: VfsPath,
}

impl<'a> ConfigStore<'a> {
    pub fn new(vfs: &'a VfsContext, base: VfsPath) -> ConfigStore<'a> {
        ConfigStore { vfs, base }
    }

    pub fn base(&self) -> &VfsPath {
        &self.base
    }

    pub async fn write_cluster(&self, cluster: &Cluster) -> Result<(), Error> {
        self.write_yaml("config", cluster).await
    }

    pub async fn read_cluster(&self) -> Result<Cluster, Error> {
        self.read_yaml("config").await
    }

    pub async fn write_instance_group(&self, ig: &InstanceGroup) -> Result<(), Error> {
        self.write_yaml(&format!("instancegroup/{}", ig.name), ig)
            .await
    }

    pub async fn read_instance_group(&self, name: &str) -> Result<InstanceGroup, Error> {
        self.read_yaml(&format!("instancegroup/{name}")).await
    }

    pub async fn write_nodeup_config(
        &self,
        ig: &InstanceGroup,
        config: &NodeUpConfig,
    ) -> Result<(), Error> {
        let role = ig.spec.role.to_string().to_lowercase();
        self.write_yaml(
            &format!("igconfig/{role}/{}/nodeupconfig.yaml", ig.name),
            config,
        )
        .await
    }

    pub async fn write_manifest(&self, relative: &str, content: &str) -> Result<(), Error> {
        let path = self.base.join(relative);
        self.vfs
            .write_file(&path, content.as_bytes(), Acl::Private)
            .await?;
        Ok(())
    }

    pub async fn read_keyset(&self, name: &str) -> Result<Keyset, Error> {
        self.read_yaml(&format!("pki/issued/{name}/keyset.yaml"))
            .await
    }

    pub async fn write_keyset(&self, name: &str, keyset: &Keyset) -> Result<(), Error> {
        self.write_yaml(&format!("pki/issued/{name}/keyset.yaml"), keyset)
            .await
    }

    async fn write_yaml<T: serde::Serialize>(&self, relative: &str, value: &T) -> Result<(), Error> {
        let path = self.base.join(relative);
        let yaml = serde_yaml::to_string(value).map_err(|e| Error::Serialize {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        self.vfs
            .write_file(&path, yaml.as_bytes(), Acl::Private)
            .await?;
        Ok(())
    }

    async fn read_yaml<T: serde::de::DeserializeOwned>(&self, relative: &str) -> Result<T, Error> {
        let path = self.base.join(relative);
        let bytes = self.vfs.read_file(&path).await?;
        serde_yaml::from_slice(&bytes).map_err(|e| Error::Serialize {
            path: path.to_string(),
            message: e.to_string(),
        })
    }
}
