//! Trailbot CLI — live/paper trading loop, offline replay and config checks.
//!
//! Commands:
//! - `run` — trade the configured pairs until `--max-passes` or the process is stopped
//! - `replay` — feed CSV or synthetic candles through the engine with simulated fills
//! - `check-config` — validate a config file and print the resolved settings

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;
use trailbot_core::engine::{EventSink, FanoutSink, TracingSink, TradingController};
use trailbot_core::exchange::{Broker, MarketData, PaperBroker};
use trailbot_runner::{
    load_candles, paper_balance, restore_positions, run_replay, seed_paper_holdings,
    synthetic_candles, timeframe_duration,
    BotConfig, Credentials, Driver, JsonlJournal, MexcClient, ReplayOptions, ReplayReport,
    StateStore, SyntheticOptions, TradingMode,
};

#[derive(Parser)]
#[command(
    name = "trailbot",
    about = "Trailbot — MACD momentum entries with ATR trailing-stop exits"
)]
struct Cli {
    /// Emit logs as JSON lines instead of human-readable text.
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Paper,
    Live,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the trading loop.
    Run {
        /// Path to a TOML config file. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the trading mode from the config.
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        /// Stop after this many passes.
        #[arg(long)]
        max_passes: Option<u64>,

        /// Ignore any persisted positions.
        #[arg(long, default_value_t = false)]
        fresh: bool,
    },
    /// Replay historical or synthetic candles with simulated fills.
    Replay {
        /// Path to a TOML config file (engine section is used).
        #[arg(long)]
        config: Option<PathBuf>,

        /// CSV source as PAIR=PATH, e.g. SOL/USDT=data/sol.csv. Repeatable.
        #[arg(long = "csv", value_name = "PAIR=PATH")]
        csv: Vec<String>,

        /// Generate this many synthetic candles per configured pair instead.
        #[arg(long, conflicts_with = "csv")]
        synthetic: Option<usize>,

        /// Seed for synthetic candles.
        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// Starting quote balance.
        #[arg(long, default_value_t = 1_000.0)]
        balance: f64,

        /// Proportional fee per fill.
        #[arg(long, default_value_t = 0.0)]
        fee_rate: f64,

        /// Append replay events to this JSONL journal.
        #[arg(long)]
        journal: Option<PathBuf>,

        /// Print the report as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Validate a config file and print the resolved configuration.
    CheckConfig {
        /// Path to a TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenv::dotenv().ok();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Run {
            config,
            mode,
            max_passes,
            fresh,
        } => run_trading(config.as_deref(), mode, max_passes, fresh),
        Commands::Replay {
            config,
            csv,
            synthetic,
            seed,
            balance,
            fee_rate,
            journal,
            json,
        } => run_replay_cmd(
            config.as_deref(),
            &csv,
            synthetic,
            seed,
            ReplayOptions {
                balance,
                fee_rate,
                sink: journal.map(|p| Arc::new(JsonlJournal::new(p)) as Arc<dyn EventSink>),
            },
            json,
        ),
        Commands::CheckConfig { config } => run_check_config(config.as_deref()),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&Path>) -> Result<BotConfig> {
    match path {
        Some(p) => {
            BotConfig::load(p).with_context(|| format!("loading config {}", p.display()))
        }
        None => Ok(BotConfig::default()),
    }
}

fn run_trading(
    config_path: Option<&Path>,
    mode: Option<ModeArg>,
    max_passes: Option<u64>,
    fresh: bool,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(mode) = mode {
        config.runtime.mode = match mode {
            ModeArg::Paper => TradingMode::Paper,
            ModeArg::Live => TradingMode::Live,
        };
    }
    if max_passes.is_some() {
        config.runtime.max_passes = max_passes;
    }
    config.validate()?;

    let quote = config
        .quote_asset()
        .context("no configured pairs")?
        .to_string();

    let store = StateStore::new(&config.runtime.state_path);
    let state = if fresh {
        tracing::warn!(path = %store.path().display(), "ignoring persisted positions");
        None
    } else {
        store.load()?
    };

    let (market, broker): (Arc<dyn MarketData>, Arc<dyn Broker>) = match config.runtime.mode {
        TradingMode::Live => {
            let creds = Credentials::from_env()?;
            let client = Arc::new(MexcClient::new(&config.exchange, Some(creds), quote)?);
            let market: Arc<dyn MarketData> = client.clone();
            let broker: Arc<dyn Broker> = client;
            (market, broker)
        }
        TradingMode::Paper => {
            let market: Arc<dyn MarketData> =
                Arc::new(MexcClient::new(&config.exchange, None, quote)?);
            let balance = state.as_ref().map_or(config.runtime.paper_balance, |s| {
                paper_balance(s, config.runtime.paper_balance)
            });
            let mut broker =
                PaperBroker::new(market.clone(), config.engine.timeframe.clone(), balance)
                    .with_fee_rate(config.runtime.paper_fee_rate);
            if let Some(state) = &state {
                broker = seed_paper_holdings(broker, state);
            }
            let broker: Arc<dyn Broker> = Arc::new(broker);
            (market, broker)
        }
    };
    tracing::info!(
        mode = ?config.runtime.mode,
        pairs = config.engine.pairs.len(),
        timeframe = %config.engine.timeframe,
        "starting"
    );

    let journal = Arc::new(JsonlJournal::new(&config.runtime.journal_path));
    let sink = FanoutSink::new()
        .with(Arc::new(TracingSink))
        .with(journal);
    let mut controller =
        TradingController::new(config.engine.clone(), market, broker)?.with_sink(Arc::new(sink));

    if let Some(state) = &state {
        let report = restore_positions(&mut controller, state, config.runtime.resync_atr_on_start);
        for (pair, reason) in &report.rejected {
            eprintln!("Could not restore {pair}: {reason}");
        }
    }

    let mut driver = Driver::new(controller)
        .with_store(store)
        .with_max_passes(config.runtime.max_passes);
    let summary = driver.run()?;

    println!("Passes:          {}", summary.passes);
    println!("Opened:          {}", summary.opened);
    println!("Closed:          {}", summary.closed);
    println!("Failures:        {}", summary.failed);
    if summary.save_failures > 0 {
        println!("Failed saves:    {}", summary.save_failures);
    }
    println!("Open positions:  {}", summary.open_positions);
    println!("Realized P&L:    {:.4}", summary.realized_pnl);
    Ok(())
}

fn parse_csv_source(spec: &str) -> Result<(String, PathBuf)> {
    let Some((pair, path)) = spec.split_once('=') else {
        bail!("--csv expects PAIR=PATH, got '{spec}'");
    };
    if trailbot_core::domain::split_pair(pair).is_none() {
        bail!("invalid pair '{pair}' in --csv (expected BASE/QUOTE)");
    }
    Ok((pair.to_string(), PathBuf::from(path)))
}

fn run_replay_cmd(
    config_path: Option<&Path>,
    csv: &[String],
    synthetic: Option<usize>,
    seed: u64,
    options: ReplayOptions,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let mut series = BTreeMap::new();

    if !csv.is_empty() {
        for spec in csv {
            let (pair, path) = parse_csv_source(spec)?;
            let candles = load_candles(&path)?;
            tracing::info!(pair = %pair, candles = candles.len(), "loaded CSV");
            series.insert(pair, candles);
        }
    } else if let Some(count) = synthetic {
        eprintln!("WARNING: replaying synthetic data, results say nothing about real markets");
        let interval = timeframe_duration(&config.engine.timeframe)
            .with_context(|| format!("unsupported timeframe '{}'", config.engine.timeframe))?;
        let opts = SyntheticOptions {
            count,
            seed,
            interval,
            ..SyntheticOptions::default()
        };
        for pair in &config.engine.pairs {
            series.insert(pair.clone(), synthetic_candles(pair, &opts));
        }
    } else {
        bail!("one of --csv or --synthetic is required");
    }

    let report = run_replay(config.engine, series, options)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_replay(&report);
    }
    Ok(())
}

fn print_replay(report: &ReplayReport) {
    println!("=== Replay ===");
    println!("Passes:           {}", report.passes);
    println!("Opened:           {}", report.opened);
    println!("Closed:           {}", report.closed.len());
    println!("Still open:       {}", report.open.len());
    println!("Realized P&L:     {:.4}", report.realized_pnl);
    println!("Starting balance: {:.4}", report.starting_balance);
    println!("Final balance:    {:.4}", report.final_balance);
    println!("Final equity:     {:.4}", report.final_equity);

    if !report.closed.is_empty() {
        println!();
        println!("{:<14} {:>14} {:>16} {:>12}", "pair", "exit", "amount", "pnl");
        for t in &report.closed {
            println!(
                "{:<14} {:>14.6} {:>16.8} {:>12.4}",
                t.pair, t.exit_price, t.amount, t.pnl
            );
        }
    }
    for t in &report.open {
        println!(
            "open {:<14} entry {:.6} amount {:.8} stop {}",
            t.pair,
            t.entry_price,
            t.amount,
            t.trailing_stop
                .map(|s| format!("{s:.6}"))
                .unwrap_or_else(|| "unset".into())
        );
    }
}

fn run_check_config(path: Option<&Path>) -> Result<()> {
    let config = load_config(path)?;
    let params = config.engine.indicator_params();
    print!("{}", config.to_toml_string()?);
    println!();
    println!(
        "# OK: {} pairs, {} candles required per evaluation, credentials {}",
        config.engine.pairs.len(),
        params.required_candles(),
        if Credentials::from_env().is_ok() {
            "present"
        } else {
            "absent"
        }
    );
    Ok(())
}
