use clap::Parser;
use tracing_subscriber::EnvFilter;

use chainwatch::application::ports::AlertChannel;
use chainwatch::application::watchdog::Watchdog;
use chainwatch::infrastructure::{
    abi::ContractAbi, console_channel::ConsoleAlertChannel, eth_log_source::EthLogSource,
    multi_channel::MultiAlertChannel, sms_channel::SmsAlertChannel,
};
use chainwatch::interfaces::config::Config;

#[derive(Parser, Debug)]
#[command(name = "chainwatch")]
struct Args {
    /// Path to config.yaml
    #[arg(long, default_value = "config.yaml")]
    config: String,

    /// Drive a single poll/alert cycle and exit
    #[arg(long)]
    once: bool,

    /// Do not send external alerts (console only)
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("chainwatch=info".parse().unwrap()),
        )
        .init();
    if dotenvy::dotenv().is_err() {
        let _ = dotenvy::from_path(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env"));
    }
    let args = Args::parse();

    // 1) load + validate config before touching the network
    let cfg = match Config::load_from_file(&args.config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load config {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    let abi = match ContractAbi::load(&cfg.abi_path) {
        Ok(a) => a,
        Err(e) => {
            tracing::error!("Failed to load ABI document {}: {}", cfg.abi_path, e);
            std::process::exit(1);
        }
    };

    let config = match cfg.into_watchdog_config(abi.deployed_address().map(str::to_string)) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    // 2) build infra
    let source = EthLogSource::new(config.source_url.clone(), abi);

    // channels fanout
    let mut channels: Vec<Box<dyn AlertChannel>> = vec![Box::new(ConsoleAlertChannel::new())];

    if args.dry_run {
        tracing::warn!("--dry-run enabled: alerts go to the console only");
    } else {
        match (
            std::env::var("TWILIO_ACCOUNT_SID"),
            std::env::var("TWILIO_AUTH_TOKEN"),
        ) {
            (Ok(sid), Ok(token)) => {
                let base = std::env::var("TWILIO_API_BASE")
                    .unwrap_or_else(|_| SmsAlertChannel::DEFAULT_API_BASE.to_string());
                channels.push(Box::new(SmsAlertChannel::new(&base, sid, token)));
            }
            _ => {
                tracing::error!(
                    "TWILIO_ACCOUNT_SID and TWILIO_AUTH_TOKEN must be set (or pass --dry-run)"
                );
                std::process::exit(1);
            }
        }
    }
    let channel = MultiAlertChannel::new(channels);

    // 3) run
    let mut watchdog = Watchdog::new(&config, &source, &channel);

    tracing::info!(
        address = %config.contract_address,
        event = %config.event_name,
        poll_secs = config.poll_interval.as_secs(),
        "watchdog starting"
    );

    let outcome = if args.once {
        watchdog.run_once().await
    } else {
        tokio::select! {
            res = watchdog.run() => res,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, shutting down");
                Ok(())
            }
        }
    };

    if let Err(e) = outcome {
        tracing::error!("fatal: {e}");
        std::process::exit(1);
    }
}
