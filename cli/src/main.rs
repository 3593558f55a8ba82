use std::{collections::BTreeMap, path::PathBuf};

use clap::{ArgAction, Args, Parser, Subcommand};
use keel_api::{Cluster, CloudProvider, InstanceGroup, KubernetesVersion};
use keel_assets::{Architecture, AssetBuilder, KopsAssetResolver, SidecarHashReader};
use keel_dns::build_precreate_dns_hostnames;
use keel_mirror::{CopyContext, copy_assets};
use keel_populate::{
    Cloud, StableChannelVersionSource, VpcInfo, populate_cluster, populate_instance_group,
};
use keel_vfs::VfsContext;
use miette::{Context as _, IntoDiagnostic as _, Result};
use tokio_util::sync::CancellationToken;
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt, prelude::*};

#[derive(Parser)]
#[command(name = "keel")]
#[command(version)]
#[command(about = "Keel cluster lifecycle CLI")]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv, -vvvv).
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Expand a partial cluster spec into a complete, validated one.
    Populate(PopulateArgs),
    /// Resolve or mirror the assets a cluster's nodes will download.
    #[command(subcommand)]
    Assets(AssetsCommand),
    /// Show the DNS records that would be pre-created for a cluster.
    #[command(subcommand)]
    Dns(DnsCommand),
}

#[derive(Subcommand)]
enum AssetsCommand {
    /// Print every file and image asset with its mirror locations.
    List(AssetsArgs),
    /// Copy remapped assets into the cluster's file repository and registry.
    Copy(AssetsArgs),
}

#[derive(Subcommand)]
enum DnsCommand {
    /// Print the hostnames nodes will query before the API is up.
    Hostnames(DnsArgs),
}

#[derive(Args)]
struct PopulateArgs {
    /// Cluster spec to populate.
    #[arg(long = "cluster", value_name = "FILE")]
    cluster: PathBuf,

    /// Instance group specs belonging to the cluster.
    #[arg(long = "instance-group", value_name = "FILE")]
    instance_groups: Vec<PathBuf>,

    /// Kubernetes version recommended by the release channel, if known.
    #[arg(long = "channel-version", value_name = "VERSION")]
    channel_version: Option<String>,
}

#[derive(Args)]
struct AssetsArgs {
    /// Completed cluster spec.
    #[arg(long = "cluster", value_name = "FILE")]
    cluster: PathBuf,

    /// Version of the node bootstrap binaries to resolve.
    #[arg(long = "kops-version", value_name = "VERSION")]
    kops_version: String,
}

#[derive(Args)]
struct DnsArgs {
    /// Completed cluster spec.
    #[arg(long = "cluster", value_name = "FILE")]
    cluster: PathBuf,

    /// Emit AAAA placeholders for an IPv6-only cluster.
    #[arg(long = "ipv6")]
    ipv6: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_panic_hook();
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    match cli.command {
        Command::Populate(args) => populate(args).await,
        Command::Assets(AssetsCommand::List(args)) => assets(args, false).await,
        Command::Assets(AssetsCommand::Copy(args)) => assets(args, true).await,
        Command::Dns(DnsCommand::Hostnames(args)) => dns_hostnames(args),
    }
}

fn init_tracing(verbose: u8) -> Result<()> {
    let filter = if std::env::var_os("RUST_LOG").is_some() {
        EnvFilter::try_from_default_env().into_diagnostic()?
    } else {
        let keel_level = match verbose {
            0 => "error",
            1 => "warn",
            2 => "info",
            3 => "debug",
            _ => "trace",
        };
        EnvFilter::new(format!("error,keel={keel_level},keel_={keel_level}"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_fmt::layer())
        .with(ErrorLayer::default())
        .init();

    Ok(())
}

/// Stands in for a cloud adapter when none is wired up. Shared-VPC lookups
/// cannot be answered offline, so clusters relying on one must carry an
/// explicit network CIDR.
struct OfflineCloud {
    provider: CloudProvider,
}

impl Cloud for OfflineCloud {
    fn provider_id(&self) -> CloudProvider {
        self.provider
    }

    fn find_vpc_info<'a>(
        &'a self,
        network_id: &'a str,
    ) -> keel_populate::BoxFuture<'a, Result<Option<VpcInfo>, keel_populate::Error>> {
        Box::pin(std::future::ready(Err(keel_populate::Error::Cloud(
            format!("no cloud adapter available to look up network `{network_id}`"),
        ))))
    }
}

fn read_cluster(path: &PathBuf) -> Result<Cluster> {
    let raw = std::fs::read_to_string(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read `{}`", path.display()))?;
    serde_yaml::from_str(&raw)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to parse cluster spec `{}`", path.display()))
}

async fn populate(args: PopulateArgs) -> Result<()> {
    let cluster = read_cluster(&args.cluster)?;
    let mut instance_groups = Vec::new();
    for path in &args.instance_groups {
        let raw = std::fs::read_to_string(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("failed to read `{}`", path.display()))?;
        let ig: InstanceGroup = serde_yaml::from_str(&raw)
            .into_diagnostic()
            .wrap_err_with(|| format!("failed to parse instance group `{}`", path.display()))?;
        instance_groups.push(ig);
    }

    let cloud = OfflineCloud {
        provider: cluster.spec.cloud_provider,
    };
    let versions = StableChannelVersionSource::new(args.channel_version);
    let populated = populate_cluster(&cluster, &instance_groups, &cloud, &versions)
        .await
        .wrap_err("populate failed")?;

    print!(
        "{}",
        serde_yaml::to_string(&populated).into_diagnostic()?
    );
    for ig in &instance_groups {
        let populated = populate_instance_group(&populated, ig).wrap_err("populate failed")?;
        println!("---");
        print!("{}", serde_yaml::to_string(&populated).into_diagnostic()?);
    }
    Ok(())
}

async fn assets(args: AssetsArgs, copy: bool) -> Result<()> {
    let cluster = read_cluster(&args.cluster)?;
    let raw_version = cluster
        .spec
        .kubernetes_version
        .clone()
        .ok_or_else(|| miette::miette!("cluster spec carries no kubernetesVersion; populate it first"))?;
    let version = KubernetesVersion::parse(&raw_version).wrap_err("invalid kubernetesVersion")?;

    let env: BTreeMap<String, String> = std::env::vars().collect();
    let resolver = KopsAssetResolver::from_env(&args.kops_version);
    let vfs = VfsContext::new();
    let reader = SidecarHashReader::new(&vfs);
    let mut builder = AssetBuilder::new(&cluster, &version, &resolver, &reader, env);
    builder.build().await.wrap_err("asset resolution failed")?;

    if copy {
        let ctx = CopyContext {
            vfs: &vfs,
            registry: None,
        };
        copy_assets(&builder, &ctx, &CancellationToken::new())
            .await
            .wrap_err("asset copy failed")?;
        return Ok(());
    }

    for arch in Architecture::ALL {
        for asset in builder.file_assets(arch) {
            println!("{}", builder.mirrored(asset).compact_string());
        }
    }
    for image in builder.image_assets() {
        println!("{}", image.download);
    }
    Ok(())
}

fn dns_hostnames(args: DnsArgs) -> Result<()> {
    let cluster = read_cluster(&args.cluster)?;
    for hostname in build_precreate_dns_hostnames(&cluster, args.ipv6) {
        println!("{} {}", hostname.fqdn, hostname.record_type);
    }
    Ok(())
}
