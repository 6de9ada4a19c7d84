use clap::Parser;
use sysmonitor::{agent, config::AgentConfig, util::shutdown_signal};
use tokio_util::sync::CancellationToken;
use tracing::{level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
#[command(name = "sysmonitor-agent", about = "Collects host metrics and pushes them to the server")]
struct Args {
    #[command(flatten)]
    config: AgentConfig,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("sysmonitor", LevelFilter::DEBUG),
        ("sysmonitor_agent", LevelFilter::TRACE),
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

    agent::run(args.config, cancel).await?;

    Ok(())
}
