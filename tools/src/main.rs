use anyhow::{Context, Result};
use clap::Parser;
use libviet_core::clock::{ManualClock, RecordingSleeper};
use libviet_core::platform::{AlwaysPermitted, NoAccessibility, NoOverlay};
use libviet_core::{
    parse_trace, replay, CodeTable, Config, Disposition, EventPipeline, Platform, ProcessTable,
    RecordingPoster, ScriptedEngine, SettingsHandle,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Replay a recorded event trace through the pipeline and print what it
/// would have sent, one JSON object per event.
#[derive(Parser)]
#[command(name = "viet-replay")]
struct Args {
    /// Trace file (JSON lines).
    trace: PathBuf,

    /// Application every event is addressed to.
    #[arg(long, default_value = "com.apple.TextEdit")]
    app: String,

    /// Settings file; defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured code table (unicode, tcvn3, vni, compound, cp1258).
    #[arg(long)]
    code_table: Option<String>,

    #[arg(long)]
    pretty: bool,
}

// Every process belongs to the application given on the command line.
struct FixedApp(String);

impl ProcessTable for FixedApp {
    fn bundle_id(&self, _pid: i32) -> Option<String> {
        Some(self.0.clone())
    }

    fn executable_path(&self, _pid: i32) -> Option<String> {
        None
    }

    fn frontmost_bundle_id(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_toml(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(name) = &args.code_table {
        config.code_table = name.parse::<CodeTable>()?;
    }

    let input = std::fs::read_to_string(&args.trace)
        .with_context(|| format!("reading {}", args.trace.display()))?;
    let records = parse_trace(&input).with_context(|| format!("parsing {}", args.trace.display()))?;
    info!(events = records.len(), app = %args.app, table = %config.code_table, "replaying trace");

    let clock = Arc::new(ManualClock::new());
    let poster = Arc::new(RecordingPoster::new());
    let platform = Platform {
        processes: Arc::new(FixedApp(args.app.clone())),
        overlay: Arc::new(NoOverlay),
        accessibility: Arc::new(NoAccessibility),
        layout: None,
        tap: Arc::new(AlwaysPermitted),
        poster: poster.clone(),
        clock: clock.clone(),
        sleeper: Arc::new(RecordingSleeper::with_clock(clock.clone())),
    };
    let mut pipeline =
        EventPipeline::new(ScriptedEngine::new(), SettingsHandle::new(config), platform);

    let steps = replay(&mut pipeline, &clock, &poster, &records);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for step in &steps {
        if args.pretty {
            serde_json::to_writer_pretty(&mut out, step)?;
        } else {
            serde_json::to_writer(&mut out, step)?;
        }
        std::io::Write::write_all(&mut out, b"\n")?;
    }

    let swallowed = steps
        .iter()
        .filter(|s| s.disposition == Disposition::Swallow)
        .count();
    let posted: usize = steps.iter().map(|s| s.posted.len()).sum();
    info!(swallowed, posted, "replay finished");
    Ok(())
}
