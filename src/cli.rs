use crate::engine::espresso_machine;
use crate::logging::{self, LogTarget};
use crate::model::{CoffeeType, GrindSize, HeatSource, RunParameters, StatusEntry};
use crate::orchestrator::{export, ReportFeed, RunController};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use tokio::sync::{mpsc, oneshot};

/// What the output writer thread prints.
enum OutputLine {
    /// A feed entry, printed to stdout as `[time] TAG message`.
    Entry(StatusEntry),
    /// Pre-rendered stdout text (the JSON document).
    Document(String),
    /// Status notices such as the export result, on stderr.
    Notice(String),
}

fn entry_text(entry: &StatusEntry) -> String {
    format!("[{}] {}{}", entry.time, entry.kind.tag(), entry.message)
}

/// Print on a blocking thread so terminal writes never stall the runtime.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let mut out = std::io::LineWriter::new(std::io::stdout().lock());
        let mut err = std::io::stderr().lock();

        while let Some(line) = rx.blocking_recv() {
            // A closed pipe only loses output; keep draining.
            let _ = match line {
                OutputLine::Entry(entry) => writeln!(out, "{}", entry_text(&entry)),
                OutputLine::Document(doc) => writeln!(out, "{doc}"),
                OutputLine::Notice(msg) => writeln!(err, "{msg}"),
            };
        }
        let _ = out.flush();
    });
    (tx, handle)
}

fn parse_time_scale(s: &str) -> Result<f64, String> {
    let v: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if v.is_finite() && v > 0.0 {
        Ok(v)
    } else {
        Err("time scale must be a positive number".into())
    }
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "espresso-sim-cli",
    version,
    about = "Simulated espresso brewing with a live status report"
)]
pub struct Cli {
    /// Simulation speed multiplier (2 runs twice as fast)
    #[arg(long, default_value_t = 1.0, value_parser = parse_time_scale)]
    pub time_scale: f64,

    /// Coffee bean type
    #[arg(long, value_enum, default_value_t = CoffeeType::Arabica)]
    pub coffee_type: CoffeeType,

    /// Grind size
    #[arg(long, value_enum, default_value_t = GrindSize::Fine)]
    pub grind_size: GrindSize,

    /// Coffee dose in grams
    #[arg(long, default_value_t = 20.0)]
    pub coffee_weight: f64,

    /// Water volume in milliliters
    #[arg(long, default_value_t = 36.0)]
    pub water_volume: f64,

    /// Water temperature in Celsius
    #[arg(long, default_value_t = 90.0)]
    pub water_temp: f64,

    /// Heat source
    #[arg(long, value_enum, default_value_t = HeatSource::ElectricBoiler)]
    pub heat_source: HeatSource,

    /// Heater power in Watts
    #[arg(long, default_value_t = 1500.0)]
    pub heat_power: f64,

    /// Seed for the simulation's modelling noise (reproducible runs)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Fail the run if the machine produces no step within this time (e.g. 30s)
    #[arg(long)]
    pub step_timeout: Option<humantime::Duration>,

    /// Print the report feed as JSON and exit (no TUI)
    #[arg(long)]
    pub json: bool,

    /// Stream the report to stdout and exit (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Use --brew-on-launch true or --brew-on-launch false to override
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub brew_on_launch: bool,

    /// Export the report feed as JSON on exit
    #[arg(long)]
    pub export_json: Option<std::path::PathBuf>,

    /// Log filter (e.g. info, espresso_sim_cli=debug)
    #[arg(long, default_value = logging::DEFAULT_LOG_LEVEL)]
    pub log_level: String,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    pub log_file: Option<std::path::PathBuf>,
}

impl Cli {
    fn uses_tui(&self) -> bool {
        cfg!(feature = "tui") && !self.json && !self.text
    }
}

pub async fn run(args: Cli) -> Result<()> {
    if args.json && args.text {
        return Err(anyhow::anyhow!("--json and --text are mutually exclusive"));
    }

    let log_target = match args.log_file.as_deref() {
        Some(path) => LogTarget::File(path),
        None if args.uses_tui() => LogTarget::Off,
        None => LogTarget::Stderr,
    };
    logging::init(&args.log_level, log_target)?;

    if args.uses_tui() {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(args).await;
        }
    }

    if args.json {
        return run_json(args).await;
    }

    run_text(args).await
}

/// Build `RunParameters` from CLI arguments.
pub fn build_params(args: &Cli) -> RunParameters {
    RunParameters {
        time_scale: args.time_scale,
        coffee_type: args.coffee_type,
        grind_size: args.grind_size,
        coffee_weight_g: args.coffee_weight,
        water_volume_ml: args.water_volume,
        water_temp_c: args.water_temp,
        heat_source: args.heat_source,
        heat_power_w: args.heat_power,
        seed: args.seed,
    }
}

/// Build the controller shared by every output mode.
pub(crate) fn build_controller(args: &Cli) -> RunController {
    RunController::new(espresso_machine, ReportFeed::new())
        .with_step_timeout(args.step_timeout.as_deref().copied())
}

async fn run_json(args: Cli) -> Result<()> {
    let params = build_params(&args);
    let controller = build_controller(&args);
    controller.execute(&params).await;

    tracing::info!(entries = controller.feed().len(), "report feed complete");
    let entries = controller.feed().snapshot();
    let (out_tx, out_handle) = spawn_output_writer();
    let out = serde_json::to_string_pretty(&entries).context("serialize report feed")?;
    let _ = out_tx.send(OutputLine::Document(out));
    if let Some(msg) = export::export_if_requested(args.export_json.as_deref(), &params, entries) {
        let _ = out_tx.send(OutputLine::Notice(msg));
    }
    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}

/// Send every entry newer than `next_seq` to stdout, oldest first.
fn print_new_entries(
    feed: &ReportFeed,
    next_seq: &mut u64,
    out_tx: &mpsc::UnboundedSender<OutputLine>,
) {
    for entry in feed.entries_since(*next_seq) {
        *next_seq = entry.seq + 1;
        let _ = out_tx.send(OutputLine::Entry(entry));
    }
}

async fn run_text(args: Cli) -> Result<()> {
    let params = build_params(&args);
    let controller = build_controller(&args);
    let feed = controller.feed().clone();
    let (out_tx, out_handle) = spawn_output_writer();

    // Print entries in the order they happened while the run is in flight.
    let (done_tx, mut done_rx) = oneshot::channel::<()>();
    let mut revision = feed.subscribe();
    let printer_feed = feed.clone();
    let printer_tx = out_tx.clone();
    let printer = tokio::spawn(async move {
        let mut next_seq = 0;
        loop {
            print_new_entries(&printer_feed, &mut next_seq, &printer_tx);
            tokio::select! {
                changed = revision.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = &mut done_rx => {
                    print_new_entries(&printer_feed, &mut next_seq, &printer_tx);
                    break;
                }
            }
        }
    });

    controller.execute(&params).await;
    let _ = done_tx.send(());
    printer.await.context("report printer task failed")?;

    if let Some(msg) =
        export::export_if_requested(args.export_json.as_deref(), &params, feed.snapshot())
    {
        let _ = out_tx.send(OutputLine::Notice(msg));
    }
    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReportKind;

    #[test]
    fn entry_text_tags_the_kind() {
        let entry = StatusEntry {
            seq: 4,
            time: "08:30:12".into(),
            kind: ReportKind::Error,
            message: "Error: boiler fault".into(),
        };
        assert_eq!(entry_text(&entry), "[08:30:12] ERR  Error: boiler fault");
    }

    #[test]
    fn time_scale_must_be_positive_and_finite() {
        assert_eq!(parse_time_scale("2.5"), Ok(2.5));
        assert!(parse_time_scale("0").is_err());
        assert!(parse_time_scale("-1").is_err());
        assert!(parse_time_scale("inf").is_err());
        assert!(parse_time_scale("fast").is_err());
    }

    #[test]
    fn new_entries_go_out_oldest_first_once() {
        let feed = ReportFeed::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut next_seq = 0;

        feed.push_plain("first");
        feed.push_plain("second");
        print_new_entries(&feed, &mut next_seq, &tx);
        feed.push_plain("third");
        print_new_entries(&feed, &mut next_seq, &tx);

        let mut printed = Vec::new();
        while let Ok(OutputLine::Entry(entry)) = rx.try_recv() {
            printed.push(entry.message);
        }
        assert_eq!(printed, ["first", "second", "third"]);
    }
}
