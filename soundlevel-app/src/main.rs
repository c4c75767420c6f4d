//! `soundlevel`: headless measurement host.
//!
//! Feeds the engine from a WAV file or an input device, folds delayed
//! measures into session statistics and prints a JSON report.

mod session;
mod settings;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use crossbeam_channel::RecvTimeoutError;
use serde::Serialize;
use session::{MeasurementSession, SessionSummary};
use settings::{default_settings_path, load_settings, save_settings};
use soundlevel_core::{
    DiagnosticsSnapshot, LifecycleState, MeasurementEvent, SampleSource, SessionInfo,
    SoundLevelEngine, SourceFactory, WavSource,
};
use tracing::{info, warn};

const USAGE: &str = "\
usage: soundlevel [--input <file.wav> | --device <name>] [options]

  --input <file.wav>    analyse a WAV file
  --device <name>       capture from the named input device (default device if omitted)
  --duration <secs>     stop after this many seconds (default: end of file, 10 s for devices)
  --settings <path>     settings file (created with defaults if missing)
  --output <file.json>  write the report here instead of stdout
  --list-devices        print input devices and exit
  --help                show this message";

const DEFAULT_DEVICE_DURATION_SECS: f64 = 10.0;
const EVENT_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
struct Args {
    input: Option<PathBuf>,
    device: Option<String>,
    duration_secs: Option<f64>,
    settings: Option<PathBuf>,
    output: Option<PathBuf>,
    list_devices: bool,
    help: bool,
}

fn parse_args(mut raw: impl Iterator<Item = String>) -> anyhow::Result<Args> {
    let mut args = Args::default();
    while let Some(flag) = raw.next() {
        let mut value = || {
            raw.next()
                .with_context(|| format!("{flag} expects a value"))
        };
        match flag.as_str() {
            "--input" => args.input = Some(PathBuf::from(value()?)),
            "--device" => args.device = Some(value()?),
            "--duration" => {
                let raw_secs = value()?;
                let secs: f64 = raw_secs
                    .parse()
                    .with_context(|| format!("invalid --duration {raw_secs:?}"))?;
                if !(secs.is_finite() && secs > 0.0) {
                    bail!("--duration must be > 0");
                }
                args.duration_secs = Some(secs);
            }
            "--settings" => args.settings = Some(PathBuf::from(value()?)),
            "--output" => args.output = Some(PathBuf::from(value()?)),
            "--list-devices" => args.list_devices = true,
            "-h" | "--help" => args.help = true,
            other => bail!("unknown argument {other:?}\n\n{USAGE}"),
        }
    }
    if args.input.is_some() && args.device.is_some() {
        bail!("--input and --device are mutually exclusive");
    }
    Ok(args)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Report {
    session: SessionInfo,
    summary: SessionSummary,
    diagnostics: DiagnosticsSnapshot,
    closed_detail: Option<String>,
}

fn main() -> anyhow::Result<()> {
    // ── Tracing ───────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("soundlevel=info,soundlevel_core=info")),
        )
        .init();

    let args = parse_args(std::env::args().skip(1))?;
    if args.help {
        println!("{USAGE}");
        return Ok(());
    }
    if args.list_devices {
        return list_devices();
    }

    let settings_path = args.settings.clone().unwrap_or_else(default_settings_path);
    let settings = load_settings(&settings_path);
    if !settings_path.exists() {
        if let Err(e) = save_settings(&settings_path, &settings) {
            warn!(path = %settings_path.display(), "could not write default settings: {e}");
        }
    }
    info!(path = %settings_path.display(), "settings loaded");

    let config = settings.to_engine_config();
    let chunk_secs = config.chunk_secs;
    let engine = SoundLevelEngine::new(config).context("invalid engine configuration")?;
    let rx = engine.subscribe();

    let duration_secs = match (&args.input, args.duration_secs) {
        (_, Some(secs)) => Some(secs),
        (Some(_), None) => None,
        (None, None) => Some(DEFAULT_DEVICE_DURATION_SECS),
    };

    let factory: SourceFactory = match args.input.clone() {
        Some(path) => Box::new(move || {
            Ok(Box::new(WavSource::open(path, chunk_secs)?) as Box<dyn SampleSource>)
        }),
        None => device_factory(
            args.device.clone().or(settings.preferred_input_device.clone()),
            engine.config().format_preferences.clone(),
            chunk_secs,
        )?,
    };

    let info = engine.start(factory).context("failed to start measurement")?;
    let mut session = MeasurementSession::new(info.delayed_center_frequencies.clone());

    let deadline = duration_secs.map(|secs| Instant::now() + Duration::from_secs_f64(secs));
    let mut stop_sent = false;
    let mut closed_detail = None;
    loop {
        if let Some(deadline) = deadline {
            if !stop_sent && Instant::now() >= deadline {
                engine.stop();
                stop_sent = true;
            }
        }
        match rx.recv_timeout(EVENT_POLL) {
            Ok(MeasurementEvent::LiveSpectrum(_)) => session.note_live(),
            Ok(MeasurementEvent::DelayedMeasure(measure)) => {
                info!(
                    seq = measure.seq,
                    global_level = format_args!("{:.1}", measure.global_level),
                    "delayed measure"
                );
                session.add_delayed(&measure);
            }
            Ok(MeasurementEvent::LifecycleTransition(transition)) => {
                if transition.state == LifecycleState::Closed {
                    closed_detail = transition.detail;
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    engine.join();

    if let Some(detail) = &closed_detail {
        warn!(detail = detail.as_str(), "session closed abnormally");
    }

    let report = Report {
        session: info,
        summary: session.summary(),
        diagnostics: engine.diagnostics(),
        closed_detail,
    };
    let json = serde_json::to_string_pretty(&report).context("failed to serialise report")?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), records = session.records(), "report written");
        }
        None => println!("{json}"),
    }
    Ok(())
}

#[cfg(feature = "audio-cpal")]
fn device_factory(
    device: Option<String>,
    preferences: Vec<soundlevel_core::CaptureFormat>,
    chunk_secs: f64,
) -> anyhow::Result<SourceFactory> {
    Ok(Box::new(move || {
        let capture =
            soundlevel_core::DeviceCapture::open(device.as_deref(), &preferences, chunk_secs)?;
        Ok(Box::new(capture) as Box<dyn SampleSource>)
    }))
}

#[cfg(not(feature = "audio-cpal"))]
fn device_factory(
    _device: Option<String>,
    _preferences: Vec<soundlevel_core::CaptureFormat>,
    _chunk_secs: f64,
) -> anyhow::Result<SourceFactory> {
    bail!("built without audio-cpal; pass --input <file.wav>")
}

#[cfg(feature = "audio-cpal")]
fn list_devices() -> anyhow::Result<()> {
    for name in soundlevel_core::audio::capture::list_input_devices() {
        println!("{name}");
    }
    Ok(())
}

#[cfg(not(feature = "audio-cpal"))]
fn list_devices() -> anyhow::Result<()> {
    bail!("built without audio-cpal")
}
