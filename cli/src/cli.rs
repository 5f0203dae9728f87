use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use corelib::models::Instrument;

#[derive(Debug, Parser)]
#[clap(name = "chainpulse", version, about = "Option-chain analytics")]
pub struct Cli {
    /// Emit logs as JSON
    #[clap(long = "json", global = true)]
    pub json_logs: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll providers while markets are open
    Live(LiveArgs),
    /// Analyse archived snapshots back to back
    Replay(ReplayArgs),
}

#[derive(Debug, Args)]
pub struct LiveArgs {
    /// Provider as `id=base_url`. Repeat for fallbacks.
    #[clap(long = "provider", value_parser = parse_provider, required = true)]
    pub providers: Vec<(String, String)>,

    /// Instrument as `SYMBOL:MARKET:YYYY-MM-DD`
    #[clap(long = "instrument", required = true)]
    pub instruments: Vec<Instrument>,

    /// JSON array of alert rules
    #[clap(long)]
    pub rules: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ReplayArgs {
    /// Directory holding one `<SYMBOL>.jsonl` per instrument
    #[clap(long)]
    pub archive: PathBuf,

    #[clap(long = "instrument", required = true)]
    pub instruments: Vec<Instrument>,

    #[clap(long)]
    pub rules: Option<PathBuf>,
}

pub(crate) fn parse_provider(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((id, url)) if !id.trim().is_empty() && !url.trim().is_empty() => {
            Ok((id.trim().to_string(), url.trim().to_string()))
        }
        _ => Err(format!("expected id=base_url, got {s:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_live_with_fallback_providers() {
        let cli = Cli::try_parse_from([
            "chainpulse",
            "live",
            "--provider",
            "nse=https://a.example",
            "--provider",
            "backup=https://b.example",
            "--instrument",
            "NIFTY:EQUITY:2026-10-29",
        ])
        .unwrap();

        let Command::Live(args) = cli.command else {
            panic!("expected live");
        };
        assert_eq!(args.providers[1].0, "backup");
        assert_eq!(args.instruments[0].symbol, "NIFTY");
        assert!(args.rules.is_none());
    }

    #[test]
    fn rejects_malformed_provider_and_instrument() {
        assert!(parse_provider("no-url").is_err());
        assert!(parse_provider("=https://a.example").is_err());

        let res = Cli::try_parse_from([
            "chainpulse",
            "replay",
            "--archive",
            "/tmp",
            "--instrument",
            "NIFTY:BONDS:2026-10-29",
        ]);
        assert!(res.is_err());
    }
}
