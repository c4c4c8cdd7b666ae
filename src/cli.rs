use crate::api::{ServerApi, ZendClient};
use crate::config::{default_store_path, Target, TargetStore};
use crate::model::{ApiConfig, DeployFlags, PollPolicy};
use crate::orchestrator::{InstallParams, Installer};
use crate::package::DescriptorInspector;
use crate::text_summary::{build_install_summary, build_status_summary};
use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Parser, Clone)]
#[command(
    name = "zs-deploy",
    version,
    about = "Deploy and update packaged web applications through the server management API"
)]
pub struct Cli {
    /// Named target from the target store
    #[arg(long, global = true)]
    pub target: Option<String>,

    /// Management API URL (e.g. https://zs.example.com:10082)
    #[arg(long, env = "ZS_URL", global = true)]
    pub zs_url: Option<String>,

    /// API key name
    #[arg(long, env = "ZS_KEY_NAME", global = true)]
    pub zs_key: Option<String>,

    /// API key secret
    #[arg(long, env = "ZS_KEY_SECRET", global = true, hide_env_values = true)]
    pub zs_secret: Option<String>,

    /// Delay between status checks while waiting [default: 3s]
    #[arg(long, global = true)]
    pub poll_interval: Option<humantime::Duration>,

    /// Give up waiting after this long, 0 waits forever [default: 30m]
    #[arg(long, global = true)]
    pub wait_timeout: Option<humantime::Duration>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Deploy a package, or update the application it was deployed as
    Install(InstallArgs),
    /// List deployed applications
    Status {
        /// Only show these application ids
        #[arg(long = "app-id")]
        app_ids: Vec<String>,
    },
    /// Save the current connection flags as a named target
    AddTarget {
        /// Target name
        name: String,
    },
}

#[derive(Debug, Args, Clone)]
pub struct InstallArgs {
    /// Application or library package
    pub package: PathBuf,

    /// Base URL the application is (or will be) deployed at
    #[arg(long)]
    pub base_uri: Option<String>,

    /// Application name, defaults to the package name
    #[arg(long)]
    pub user_app_name: Option<String>,

    /// User parameter passed to the deployment, repeatable
    #[arg(long = "user-param", value_name = "KEY=VALUE", value_parser = parse_user_param)]
    pub user_params: Vec<(String, String)>,

    /// Wait until the deployment finishes
    #[arg(long)]
    pub wait: bool,

    /// Refuse to update while a previous deployment is still running
    #[arg(long)]
    pub safe: bool,

    /// Create a virtual host for the base URL
    #[arg(long)]
    pub create_vhost: bool,

    /// Deploy on the default server
    #[arg(long)]
    pub default_server: bool,

    /// Keep going when some cluster members fail
    #[arg(long)]
    pub ignore_failures: bool,

    /// Package descriptor, defaults to the package path with a .json extension
    #[arg(long)]
    pub descriptor: Option<PathBuf>,
}

fn parse_user_param(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    if key.trim().is_empty() {
        return Err(format!("empty parameter name in '{s}'"));
    }
    Ok((key.trim().to_string(), value.to_string()))
}

pub async fn run(args: Cli) -> Result<()> {
    let store_path = default_store_path();
    let store = TargetStore::load(&store_path)?;

    match &args.command {
        Command::AddTarget { name } => add_target(&args, name, store, &store_path),
        Command::Status { app_ids } => {
            let (api_cfg, _) = build_config(&args, &store)?;
            run_status(&args, &api_cfg, app_ids).await
        }
        Command::Install(install) => {
            let (api_cfg, policy) = build_config(&args, &store)?;
            run_install(&args, &api_cfg, policy, install).await
        }
    }
}

/// Merge explicit flags (and their env fallbacks) over the selected target.
pub fn build_config(args: &Cli, store: &TargetStore) -> Result<(ApiConfig, PollPolicy)> {
    let target = match args.target.as_deref() {
        Some(name) => Some(
            store
                .get(name)
                .ok_or_else(|| anyhow!("unknown target '{name}'; add it with `zs-deploy add-target {name}`"))?,
        ),
        None => None,
    };

    let api = ApiConfig {
        url: pick(&args.zs_url, target.map(|t| &t.url), "zs-url")?,
        key_name: pick(&args.zs_key, target.map(|t| &t.key_name), "zs-key")?,
        key_secret: pick(&args.zs_secret, target.map(|t| &t.key_secret), "zs-secret")?,
        user_agent: format!("zs-deploy/{}", env!("CARGO_PKG_VERSION")),
    };

    let defaults = PollPolicy::default();
    let interval = args
        .poll_interval
        .map(Duration::from)
        .or_else(|| target.and_then(|t| t.poll_interval))
        .unwrap_or(defaults.interval);
    let timeout = match args
        .wait_timeout
        .map(Duration::from)
        .or_else(|| target.and_then(|t| t.wait_timeout))
    {
        Some(d) if d.is_zero() => None,
        Some(d) => Some(d),
        None => defaults.timeout,
    };

    Ok((api, PollPolicy { interval, timeout }))
}

fn pick(flag: &Option<String>, from_target: Option<&String>, name: &str) -> Result<String> {
    flag.clone()
        .or_else(|| from_target.cloned())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| anyhow!("no --{name} configured; pass it, set its environment variable or use --target"))
}

fn add_target(args: &Cli, name: &str, mut store: TargetStore, path: &std::path::Path) -> Result<()> {
    let required = |v: &Option<String>, flag: &str| {
        v.clone()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("--{flag} is required to add a target"))
    };
    let target = Target {
        url: required(&args.zs_url, "zs-url")?,
        key_name: required(&args.zs_key, "zs-key")?,
        key_secret: required(&args.zs_secret, "zs-secret")?,
        poll_interval: args.poll_interval.map(Duration::from),
        wait_timeout: args.wait_timeout.map(Duration::from),
    };
    let replaced = store.upsert(name, target);
    store.save(path)?;
    info!(target_name = name, replaced, path = %path.display(), "Saved target");
    println!(
        "{} target '{}' in {}",
        if replaced { "Updated" } else { "Added" },
        name,
        path.display()
    );
    Ok(())
}

async fn run_status(args: &Cli, api_cfg: &ApiConfig, app_ids: &[String]) -> Result<()> {
    let client = ZendClient::new(api_cfg)?;
    let apps = client
        .application_get_status(app_ids)
        .await
        .context("failed to list applications")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&apps)?);
    } else {
        for line in build_status_summary(&apps).lines {
            println!("{line}");
        }
    }
    Ok(())
}

async fn run_install(
    args: &Cli,
    api_cfg: &ApiConfig,
    policy: PollPolicy,
    install: &InstallArgs,
) -> Result<()> {
    let client = ZendClient::new(api_cfg)?;
    let inspector = DescriptorInspector::new(install.descriptor.clone());
    let params = InstallParams {
        package: install.package.clone(),
        base_url: install.base_uri.clone(),
        app_name: install.user_app_name.clone(),
        user_params: install.user_params.iter().cloned().collect::<BTreeMap<_, _>>(),
        wait: install.wait,
        safe: install.safe,
        flags: DeployFlags {
            create_vhost: install.create_vhost,
            default_server: install.default_server,
            ignore_failures: install.ignore_failures,
        },
    };
    info!(
        package = %params.package.display(),
        wait = params.wait,
        safe = params.safe,
        interval = ?policy.interval,
        timeout = ?policy.timeout,
        "Installing package"
    );

    let outcome = Installer::new(&client, &inspector, policy)
        .install(&params)
        .await
        .with_context(|| format!("failed to install {}", install.package.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        for line in build_install_summary(&outcome).lines {
            println!("{line}");
        }
    }
    Ok(())
}
