//! B Side verify - sign the wallet verification message from a terminal.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use bside_verify::wallet::{AutoApprove, LocalWalletProvider, WalletSessionAdapter};
use bside_verify::{IdentityParameters, VerificationMachine, VerifyConfig};
use bside_verify_cli::{CliApprovalHandler, Console, Osc52Clipboard};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// B Side verify - prove wallet ownership to the B Side bot
#[derive(Parser, Debug)]
#[command(name = "bside-verify-cli")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Verification link or query string from the bot (`?code=...&user=...`)
    #[arg(long, conflicts_with_all = ["code", "user", "wallet"])]
    url: Option<String>,

    /// Verification code
    #[arg(long)]
    code: Option<String>,

    /// User identifier
    #[arg(long)]
    user: Option<String>,

    /// Expected wallet address
    #[arg(long)]
    wallet: Option<String>,

    /// Private key of the signing wallet (hex). Without one, no wallet is
    /// available
    #[arg(long, env = "BSIDE_PRIVATE_KEY", hide_env_values = true)]
    private_key: Option<String>,

    /// Approve wallet prompts without asking
    #[arg(short = 'y', long)]
    yes: bool,

    /// JSON configuration file
    #[arg(short, long, env = "BSIDE_VERIFY_CONFIG")]
    config: Option<PathBuf>,

    /// Do not copy the signature to the clipboard automatically
    #[arg(long)]
    no_auto_copy: bool,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn identity(&self) -> anyhow::Result<IdentityParameters> {
        if let Some(url) = &self.url {
            if url.contains("://") {
                return IdentityParameters::from_url(url).context("invalid verification link");
            }
            return Ok(IdentityParameters::from_query(url));
        }

        let mut params = IdentityParameters::new(self.code.clone().unwrap_or_default());
        if let Some(user) = &self.user {
            params = params.with_user(user.as_str());
        }
        if let Some(wallet) = &self.wallet {
            params = params.with_wallet_hint(wallet.as_str());
        }
        Ok(params)
    }

    fn config(&self) -> anyhow::Result<VerifyConfig> {
        let config = match &self.config {
            Some(path) => VerifyConfig::from_file(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => VerifyConfig::default(),
        };
        Ok(if self.no_auto_copy {
            config.with_auto_copy(false)
        } else {
            config
        })
    }

    fn adapter(&self) -> anyhow::Result<WalletSessionAdapter> {
        let Some(key) = &self.private_key else {
            return Ok(WalletSessionAdapter::unavailable());
        };
        let provider = LocalWalletProvider::from_private_key(key).context("invalid private key")?;
        let provider = if self.yes {
            provider.with_approval(AutoApprove)
        } else {
            provider.with_approval(CliApprovalHandler)
        };
        Ok(WalletSessionAdapter::new(Arc::new(provider)))
    }
}

fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("bside_verify=warn,bside_verify_cli=warn"),
        1 => EnvFilter::new("bside_verify=info,bside_verify_cli=info"),
        _ => EnvFilter::new("bside_verify=debug,bside_verify_cli=debug"),
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = args.config()?;
    let params = args.identity()?;
    if params.code.is_empty() {
        warn!("no verification code given; the bot will not accept this signature");
    }

    let adapter = Arc::new(args.adapter()?);
    info!(provider = adapter.provider_name().unwrap_or("none"), "starting verification");

    let machine = VerificationMachine::start(&config, &params, adapter, Arc::new(Osc52Clipboard));
    Console::new(machine).run().await?;

    Ok(())
}
