mod output;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use futures::future::join_all;
use stockbro_data_access::{Clock, DataServices, Settings, SystemClock};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use output::{FetchReport, Report};

#[derive(Parser, Debug)]
#[command(name = "stockbro")]
#[command(about = "Fetch market data and news through the cached, rate-budgeted data layer", long_about = None)]
struct Args {
    /// Request keys such as `quote:AAPL`, `candles:30:MSFT`, `headlines:business`
    #[arg(required = true)]
    keys: Vec<String>,

    /// Fetch every key this many times; later rounds are served from cache
    #[arg(long, default_value = "1")]
    rounds: u32,

    /// Pretty-print the JSON report
    #[arg(long)]
    pretty: bool,
}

pub fn init_tracing() {
    let log_format = std::env::var("STOCKBRO_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so stdout stays a clean JSON report
    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false).with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_line_number(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let settings = Settings::from_env()?;
    init_tracing();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let services = DataServices::from_settings(&settings, clock)?;
    let sweepers = services.spawn_sweepers(Duration::from_secs(60));

    let mut report = Report::default();
    for round in 1..=args.rounds.max(1) {
        tracing::info!("Round {}: fetching {} keys", round, args.keys.len());
        let fetches = args.keys.iter().map(|key| {
            let services = &services;
            async move { FetchReport::new(round, key, services.fetch(key).await) }
        });
        report.fetches.extend(join_all(fetches).await);
    }

    for client in [services.market.client(), services.news.client()] {
        report.budgets.insert(
            client.provider().to_string(),
            client.budget_status().into_iter().map(Into::into).collect(),
        );
    }

    for sweeper in sweepers {
        sweeper.abort();
    }

    let rendered = if args.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{}", rendered);
    Ok(())
}
