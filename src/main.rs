use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use akd_client::config::{Config, DEFAULT_CONFIG_PATH};
use akd_client::dns::DnsTxtClient;
use akd_client::fetch::HttpKeyFetcher;
use akd_client::output::write_authorized_keys;
use akd_client::resolver::KeyResolver;
use clap::Parser;
use tracing::{debug, error, warn};
use tracing_subscriber::EnvFilter;

/// Print SSH authorized_keys published in a DNS AKD/AKDS record or at a URL
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log more (repeat for more detail)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout is reserved for the keys
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let lookup = match config.nameserver_addrs() {
        Ok(servers) if !servers.is_empty() => DnsTxtClient::new(servers),
        Ok(_) => DnsTxtClient::from_system(),
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    debug!("Using nameservers {:?}", lookup.nameservers());

    let fetcher = match HttpKeyFetcher::new() {
        Ok(fetcher) => fetcher,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let resolver = match KeyResolver::new(&config, Box::new(lookup), Box::new(fetcher)) {
        Ok(resolver) => resolver,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let keys = match resolver.resolve().await {
        Ok(keys) => keys,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    debug!(
        "Got {} keys from {} ({:?})",
        keys.entries, keys.source, keys.trust
    );

    let mut stdout = std::io::stdout().lock();
    if let Err(e) = stdout.write_all(&keys.text).and_then(|_| stdout.flush()) {
        error!("Failed to write keys to stdout: {}", e);
        return ExitCode::FAILURE;
    }

    if config.overwrite_authorized_keys {
        if let Some(path) = &config.authorized_keys_path {
            let report = write_authorized_keys(path, &keys.text);
            if !report.is_complete() {
                warn!("authorized_keys file only partially updated: {:?}", report);
            }
        }
    }

    ExitCode::SUCCESS
}
