//! Neckline CLI: target calculation, config inspection, recovery and replay.
//!
//! Commands:
//! - `targets`: compute TP1/TP2/TP3 for an entry and stop
//! - `config`: print the effective configuration and its fingerprint
//! - `recover`: reconcile a saved state file against a bar history
//! - `replay`: feed a bar history through the decision cycle bar by bar
//!
//! Bar files are CSV with a header row: `timestamp,open,high,low,close`,
//! timestamps in RFC 3339. The last row is treated as the forming bar.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use neckline_core::domain::{Bar, Side};
use neckline_core::execution::PaperGateway;
use neckline_core::recovery::{RecoveryAction, RecoveryReport};
use neckline_core::store::{JsonFileStore, PositionStore, StateSnapshot};
use neckline_core::tp::{compute_targets, TpOutcome};
use neckline_core::{CoreConfig, Trader};

#[derive(Parser)]
#[command(
    name = "neckline",
    version,
    about = "Neckline: double-bottom entry guard and take-profit engine"
)]
struct Cli {
    /// Path to a TOML config file. Defaults apply to any key it omits.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum SideArg {
    Long,
    Short,
}

impl From<SideArg> for Side {
    fn from(side: SideArg) -> Self {
        match side {
            SideArg::Long => Side::Long,
            SideArg::Short => Side::Short,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the three profit targets for an entry and a stop.
    Targets {
        #[arg(long)]
        entry: f64,

        #[arg(long)]
        stop: f64,

        #[arg(long, value_enum, default_value_t = SideArg::Long)]
        side: SideArg,

        /// Override the configured TP3 multiple.
        #[arg(long)]
        rr: Option<f64>,
    },
    /// Print the effective configuration as TOML with its fingerprint.
    Config,
    /// Reconcile open positions in a state file against recent bars.
    Recover {
        /// CSV bar history.
        #[arg(long)]
        bars: PathBuf,

        /// JSON state file. Rewritten after recovery.
        #[arg(long)]
        state: PathBuf,

        /// Write the audit trail as JSON lines.
        #[arg(long)]
        audit: Option<PathBuf>,
    },
    /// Replay a bar history through startup and the live cycle.
    Replay {
        /// CSV bar history.
        #[arg(long)]
        bars: PathBuf,

        /// JSON state file to start from and save to.
        #[arg(long)]
        state: Option<PathBuf>,

        /// Write the audit trail as JSON lines.
        #[arg(long)]
        audit: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("neckline=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Targets {
            entry,
            stop,
            side,
            rr,
        } => run_targets(&config, entry, stop, side.into(), rr),
        Commands::Config => run_config(&config),
        Commands::Recover { bars, state, audit } => {
            run_recover(config, &bars, &state, audit.as_deref())
        }
        Commands::Replay { bars, state, audit } => {
            run_replay(config, &bars, state.as_deref(), audit.as_deref())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<CoreConfig> {
    match path {
        Some(path) => CoreConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(CoreConfig::default()),
    }
}

/// Read `timestamp,open,high,low,close` rows.
fn read_bars(path: &Path) -> Result<Vec<Bar>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("opening bar file {}", path.display()))?;

    let mut bars: Vec<Bar> = Vec::new();
    for (row, record) in reader.deserialize().enumerate() {
        let bar: Bar = record.with_context(|| format!("parsing bar row {}", row + 1))?;
        if let Some(prev) = bars.last() {
            if bar.timestamp <= prev.timestamp {
                bail!(
                    "bar row {} at {} is not after the previous bar at {}",
                    row + 1,
                    bar.timestamp,
                    prev.timestamp
                );
            }
        }
        bars.push(bar);
    }
    info!(bars = bars.len(), path = %path.display(), "bars loaded");
    Ok(bars)
}

fn run_targets(
    config: &CoreConfig,
    entry: f64,
    stop: f64,
    side: Side,
    rr: Option<f64>,
) -> Result<()> {
    let mut targets = config.targets.clone();
    if let Some(rr) = rr {
        targets.tp3_rr = rr;
    }
    let levels = compute_targets(entry, stop, side, &targets)?;
    let risk = (entry - stop).abs();

    println!("Side:   {side}");
    println!("Entry:  {entry}");
    println!("Stop:   {stop}  (risk {risk})");
    println!("TP1:    {:.5}  ({}R)", levels.tp1, targets.tp1_rr);
    println!("TP2:    {:.5}  ({}R)", levels.tp2, targets.tp2_rr);
    println!("TP3:    {:.5}  ({}R)", levels.tp3, targets.tp3_rr);
    Ok(())
}

fn run_config(config: &CoreConfig) -> Result<()> {
    println!("# fingerprint: {}", config.fingerprint());
    print!("{}", config.to_toml_string()?);
    Ok(())
}

fn run_recover(
    config: CoreConfig,
    bars_path: &Path,
    state_path: &Path,
    audit_path: Option<&Path>,
) -> Result<()> {
    let bars = read_bars(bars_path)?;
    let mut store = JsonFileStore::new(state_path);
    let snapshot = store
        .load()
        .with_context(|| format!("loading state from {}", state_path.display()))?;

    let window = config.recovery.history_bars.min(bars.len());
    let history = &bars[bars.len() - window..];

    let gateway = paper_gateway_for(&snapshot);
    let mut trader = Trader::restore(config, gateway, snapshot)?;
    let report = trader.startup(history);
    print_recovery(&report);

    store
        .save(&trader.snapshot())
        .with_context(|| format!("saving state to {}", state_path.display()))?;
    if let Some(path) = audit_path {
        write_audit(&trader, path)?;
    }
    Ok(())
}

fn run_replay(
    config: CoreConfig,
    bars_path: &Path,
    state_path: Option<&Path>,
    audit_path: Option<&Path>,
) -> Result<()> {
    let bars = read_bars(bars_path)?;
    if bars.len() < 2 {
        bail!("replay needs at least two bars, got {}", bars.len());
    }

    let mut store = state_path.map(JsonFileStore::new);
    let snapshot = match &store {
        Some(store) => store.load()?,
        None => StateSnapshot::default(),
    };

    let history_bars = config.recovery.history_bars;
    let (warmup, live) = replay_split(history_bars, bars.len());
    if live == 0 {
        warn!(
            bars = bars.len(),
            needed = history_bars + 2,
            "history only covers startup, no live bars to replay"
        );
    }
    let gateway = paper_gateway_for(&snapshot);
    let mut trader = Trader::restore(config, gateway, snapshot)?;
    let recovery = trader.startup(&bars[..warmup]);
    print_recovery(&recovery);

    let mut entries = 0usize;
    let mut exits = 0usize;
    let mut transitions = 0usize;
    for end in warmup + 1..=bars.len() {
        let report = match trader.on_bars(&bars[..end]) {
            Ok(report) => report,
            Err(err) => {
                warn!(error = %err, "cycle skipped");
                continue;
            }
        };
        for (ticket, outcome) in &report.tp_outcomes {
            match outcome {
                TpOutcome::Exit { price, reason } => {
                    exits += 1;
                    println!(
                        "{} close   {ticket} @ {price:.5} ({reason})",
                        bar_label(&report.bar_time)
                    );
                }
                TpOutcome::Advance { from, to, .. } => {
                    transitions += 1;
                    println!("{} advance {ticket} {from} -> {to}", bar_label(&report.bar_time));
                }
                _ => {}
            }
        }
        if let Some(pos) = &report.opened {
            entries += 1;
            println!(
                "{} open    {} {} @ {:.5} stop {:.5} targets {:.5}/{:.5}/{:.5}",
                bar_label(&report.bar_time),
                pos.ticket,
                pos.side,
                pos.entry_price,
                pos.stop_loss,
                pos.targets.tp1,
                pos.targets.tp2,
                pos.targets.tp3
            );
        }
    }

    println!();
    println!("Bars:         {}", bars.len());
    println!("Entries:      {entries}");
    println!("Transitions:  {transitions}");
    println!("Exits:        {exits}");
    println!("Still open:   {}", trader.book().len());

    let mark = bars[bars.len() - 2].close;
    for pos in trader.book().snapshot() {
        println!(
            "  {} {} {} entry {:.5} stop {:.5} unrealized {:.2} @ {mark:.5}",
            pos.ticket,
            pos.side,
            pos.state,
            pos.entry_price,
            pos.stop_loss,
            pos.unrealized_pnl(mark)
        );
    }

    if let Some(store) = store.as_mut() {
        store.save(&trader.snapshot())?;
        info!(path = %store.path().display(), "state saved");
    }
    if let Some(path) = audit_path {
        write_audit(&trader, path)?;
    }
    Ok(())
}

/// Startup sees the first `history_bars` closed bars plus one forming bar.
/// Returns the startup slice length and the number of live cycles after it.
fn replay_split(history_bars: usize, len: usize) -> (usize, usize) {
    let warmup = (history_bars + 1).min(len);
    (warmup, len - warmup)
}

/// Paper tickets continue after the highest ticket already in the snapshot.
fn paper_gateway_for(snapshot: &StateSnapshot) -> PaperGateway {
    let last = snapshot.positions.iter().map(|p| p.ticket).max();
    last.map_or_else(PaperGateway::new, PaperGateway::starting_after)
}

fn bar_label(time: &Option<chrono::DateTime<chrono::Utc>>) -> String {
    time.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".into())
}

fn print_recovery(report: &RecoveryReport) {
    println!(
        "Recovery at bar {} (reliable: {})",
        bar_label(&report.closed_bar_time),
        report.reliable
    );
    if let Some(pattern) = &report.pattern {
        println!(
            "  pattern: lows {:.5} / {:.5}, neckline {:.5}",
            pattern.left_low.price, pattern.right_low.price, pattern.neckline.price
        );
    }
    for decision in &report.decisions {
        match &decision.action {
            RecoveryAction::Close { price, reason } => {
                println!("  {} close @ {price:.5} ({reason})", decision.ticket)
            }
            RecoveryAction::KeepOpen => println!("  {} keep open", decision.ticket),
            RecoveryAction::Unresolved { detail } => {
                println!("  {} unresolved: {detail}", decision.ticket)
            }
        }
    }
}

fn write_audit<G>(trader: &Trader<G>, path: &Path) -> Result<()>
where
    G: neckline_core::execution::ExecutionGateway,
{
    let file = File::create(path)
        .with_context(|| format!("creating audit file {}", path.display()))?;
    trader
        .audit()
        .write_jsonl(BufWriter::new(file))
        .with_context(|| format!("writing audit file {}", path.display()))?;
    info!(records = trader.audit().len(), path = %path.display(), "audit written");
    Ok(())
}
