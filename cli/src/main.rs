pub mod cli;
mod stdout;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use backend::{AppConfig, Driver, PipelineContext, RuleBook, TickOutcome};
use clap::Parser;
use common::{TraceId, init_logger, root_span};
use corelib::models::AlertRule;
use engine::{Dispatcher, LogSubscriber};
use market::provider::{HttpProvider, QueueProvider};
use market::MarketDataProvider;
use tracing::{Instrument, Span, debug, info};

use cli::{Cli, Command, LiveArgs, ReplayArgs};
use stdout::JsonLinesSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let json = cli.json_logs || std::env::var("APP_ENV").is_ok_and(|v| v == "production");
    init_logger("chainpulse", json);

    let trace_id = TraceId::default();
    let span = root_span("chainpulse", &trace_id);

    run(cli).instrument(span).await
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = AppConfig::from_env().context("invalid configuration")?;

    match cli.command {
        Command::Live(args) => {
            Span::current().record("mode", "live");
            live(config, args).await
        }
        Command::Replay(args) => {
            Span::current().record("mode", "replay");
            config.replay = true;
            replay(config, args).await
        }
    }
}

async fn live(config: AppConfig, args: LiveArgs) -> anyhow::Result<()> {
    let timeout = Duration::from_millis(config.provider_timeout_ms);

    let providers = args
        .providers
        .iter()
        .map(|(id, url)| {
            HttpProvider::new(id.as_str(), url.as_str(), timeout)
                .map(|p| Arc::new(p) as Arc<dyn MarketDataProvider>)
                .with_context(|| format!("provider {id}"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let driver = build_driver(config, providers, args.rules.as_deref()).await?;

    for instrument in args.instruments {
        driver.watch(instrument).await?;
    }
    driver.start().await?;

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("interrupt received; shutting down");

    driver.shutdown().await;
    Ok(())
}

async fn replay(config: AppConfig, args: ReplayArgs) -> anyhow::Result<()> {
    let symbols: Vec<String> = args.instruments.iter().map(|i| i.symbol.clone()).collect();

    let archive = Arc::new(
        QueueProvider::from_archive("archive", &args.archive, &symbols)
            .with_context(|| format!("loading archive {}", args.archive.display()))?,
    );

    let driver = build_driver(
        config,
        vec![archive.clone() as Arc<dyn MarketDataProvider>],
        args.rules.as_deref(),
    )
    .await?;
    for instrument in args.instruments {
        driver.watch(instrument).await?;
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut analysed = 0usize;
    while symbols.iter().any(|s| archive.remaining(s) > 0) {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupt received; stopping replay");
                break;
            }
            outcomes = driver.step() => {
                for (symbol, outcome) in outcomes {
                    debug!(instrument = %symbol, ?outcome, "replay step");
                    if matches!(outcome, TickOutcome::Analysed { .. }) {
                        analysed += 1;
                    }
                }
            }
        }
    }

    driver.shutdown().await;
    info!(analysed, "replay finished");
    Ok(())
}

async fn build_driver(
    config: AppConfig,
    providers: Vec<Arc<dyn MarketDataProvider>>,
    rules_path: Option<&Path>,
) -> anyhow::Result<Driver> {
    let dispatcher = Arc::new(Dispatcher::new(config.delivery_policy()));
    dispatcher.register(Arc::new(JsonLinesSubscriber));
    dispatcher.register(Arc::new(LogSubscriber));

    let rules = RuleBook::new();
    if let Some(path) = rules_path {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading rules {}", path.display()))?;
        let parsed: Vec<AlertRule> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing rules {}", path.display()))?;

        info!(rules = parsed.len(), "alert rules loaded");
        rules.replace_all(parsed).await;
    }

    let ctx = PipelineContext::bootstrap(config, providers, dispatcher, rules)?;
    Ok(Driver::new(Arc::new(ctx)))
}
