//! Warden operator CLI
//!
//! Usage:
//!   warden validate plugin.jsx
//!   warden sign plugin.jsx --plugin-id stripe-pay --version 1.0.0
//!   warden run bundle.wasm --action charge --params '{"amount":100}'

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use warden_cli::{RunArgs, parse_object, run_bundle, sign_file, validate_file, validator, verify_file};
use warden_engine::EngineConfig;
use warden_security::{Environment, PluginSigner};
use warden_types::{PluginId, TenantId};

#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(about = "Vet, sign and run Warden plugins")]
struct Args {
    /// Engine configuration file
    #[arg(short, long, default_value = "warden.toml")]
    config: PathBuf,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan plugin source for dangerous patterns
    Validate { file: PathBuf },

    /// Sign plugin source (vetted first) or a compiled bundle
    Sign {
        file: PathBuf,
        #[arg(long)]
        plugin_id: String,
        #[arg(long)]
        version: String,
        /// Sign a compiled bundle without the source scan
        #[arg(long)]
        bundle: bool,
        #[arg(long, env = "WARDEN_SIGNING_SECRET", hide_env_values = true)]
        signing_secret: String,
    },

    /// Check a file against a signature document
    Verify {
        file: PathBuf,
        #[arg(long)]
        plugin_id: String,
        #[arg(long)]
        version: String,
        #[arg(long)]
        signature: PathBuf,
        #[arg(long, env = "WARDEN_SIGNING_SECRET", hide_env_values = true)]
        signing_secret: String,
    },

    /// Check whether a URL may be loaded
    CheckUrl {
        url: String,
        /// Evaluate outside production, where plain http is allowed
        #[arg(long)]
        development: bool,
    },

    /// Execute one action of a compiled bundle locally
    Run {
        bundle: PathBuf,
        #[arg(long)]
        action: String,
        #[arg(long, default_value = "local")]
        tenant_id: String,
        #[arg(long, default_value = "local-plugin")]
        plugin_id: String,
        /// Action parameters as a JSON object
        #[arg(long)]
        params: Option<String>,
        /// Plugin configuration as a JSON object
        #[arg(long = "plugin-config")]
        plugin_config: Option<String>,
    },
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn status(ok: bool) -> ExitCode {
    if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let mut config = EngineConfig::load_from(&args.config);

    match args.command {
        Command::Validate { file } => {
            let report = validate_file(&validator(&config), &file)?;
            print_json(&report)?;
            Ok(status(report.safe))
        }
        Command::Sign {
            file,
            plugin_id,
            version,
            bundle,
            signing_secret,
        } => {
            let plugin_id = PluginId::parse(&plugin_id)?;
            let signer = PluginSigner::new(signing_secret)?;
            let signature = sign_file(&validator(&config), &signer, &file, &plugin_id, &version, bundle)?;
            print_json(&signature)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Verify {
            file,
            plugin_id,
            version,
            signature,
            signing_secret,
        } => {
            let plugin_id = PluginId::parse(&plugin_id)?;
            let signer = PluginSigner::new(signing_secret)?;
            let valid = verify_file(&signer, &file, &plugin_id, &version, &signature)?;
            println!("{}", if valid { "valid" } else { "invalid" });
            Ok(status(valid))
        }
        Command::CheckUrl { url, development } => {
            if development {
                config.environment = Environment::Development;
            }
            let trusted = validator(&config).is_url_trusted(&url);
            println!("{}", if trusted { "trusted" } else { "untrusted" });
            Ok(status(trusted))
        }
        Command::Run {
            bundle,
            action,
            tenant_id,
            plugin_id,
            params,
            plugin_config,
        } => {
            let parameters = parse_object(params.as_deref()).context("--params")?;
            let run = RunArgs {
                tenant_id: TenantId::parse(&tenant_id)?,
                plugin_id: PluginId::parse(&plugin_id)?,
                action,
                parameters: parameters.into(),
                config: parse_object(plugin_config.as_deref()).context("--plugin-config")?,
            };
            let result = run_bundle(&config, &bundle, run).await?;
            print_json(&result)?;
            Ok(status(result.success))
        }
    }
}
