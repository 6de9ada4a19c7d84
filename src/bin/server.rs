use clap::Parser;
use sysmonitor::{config::ServerConfig, server, util::shutdown_signal};
use tokio_util::sync::CancellationToken;
use tracing::{level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
#[command(name = "sysmonitor-server", about = "Receives and stores metrics from agents")]
struct Args {
    #[command(flatten)]
    config: ServerConfig,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("sysmonitor", LevelFilter::DEBUG),
        ("sysmonitor_server", LevelFilter::TRACE),
        ("tower_http", LevelFilter::DEBUG),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();

    let args = Args::parse();
    trace!("starting {} on {}", env!("CARGO_BIN_NAME"), args.config.address);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            cancel.cancel();
        }
    });

    server::run(args.config, cancel).await
}
