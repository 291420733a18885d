//! # AltOS Decode
//!
//! Decode flight-computer telemetry captures and eeprom logs, list and
//! download stored flights, read board sensors, and load launch sites.
//!
//! Decoded samples are written to stdout as JSON lines; logs go to stderr
//! and optionally to a file.
//!
//! # Examples
//!
//! ```bash
//! altos-decode decode capture.telem
//! altos-decode eeprom --format tiny flight-3.eeprom
//! altos-decode --port /dev/ttyACM0 list --download
//! altos-decode adc
//! altos-decode sites sites.txt
//! ```

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use altos_decode::config::{Config, LoggingConfig};
use altos_decode::eeprom::{download_session, ConfigData, EepromFormat, EepromList, EepromLog};
use altos_decode::fusion::{DataListener, FlightRecorder, Sample};
use altos_decode::link::{Link, SerialLink};
use altos_decode::sensor::read_sensor;
use altos_decode::sites;
use altos_decode::telemetry::decode_lines;
use altos_decode::units::{Height, Units};

#[derive(Parser, Debug)]
#[command(name = "altos-decode")]
#[command(about = "Decode rocketry flight-computer telemetry and eeprom logs")]
#[command(version)]
struct Args {
    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial device, overriding the configuration
    #[arg(short, long)]
    port: Option<String>,

    /// Relay through a ground station to the flight computer
    #[arg(long)]
    remote: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode a capture of TELEM lines ("-" for stdin)
    Decode { input: PathBuf },

    /// Decode a raw eeprom image
    Eeprom {
        #[arg(short, long, value_enum)]
        format: LogFormat,
        input: PathBuf,
    },

    /// List flights stored on the device
    List {
        /// Download and decode every listed flight
        #[arg(long)]
        download: bool,
    },

    /// Read the board's sensors once
    Adc,

    /// Load a launch-site catalog
    Sites { input: PathBuf },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Full,
    Tiny,
}

impl From<LogFormat> for EepromFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Full => EepromFormat::Full,
            LogFormat::Tiny => EepromFormat::Tiny,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };
    if args.port.is_some() {
        config.link.port = args.port.clone();
    }
    config.link.remote |= args.remote;

    let _guard = init_logging(&config.logging)?;
    info!("AltOS Decode v{} starting...", env!("CARGO_PKG_VERSION"));

    match args.command {
        Command::Decode { input } => decode_capture(&input, &config).await,
        Command::Eeprom { format, input } => decode_eeprom(&input, format.into(), &config).await,
        Command::List { download } => list_flights(&config, download).await,
        Command::Adc => read_adc(&config).await,
        Command::Sites { input } => load_sites(input).await,
    }
}

/// Log to stderr, and to `config.file` when set. `RUST_LOG` overrides the level.
fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let stderr = fmt::layer().with_writer(std::io::stderr);

    let Some(file) = &config.file else {
        tracing_subscriber::registry().with(filter).with(stderr).init();
        return Ok(None);
    };

    let path = Path::new(file);
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .ok_or_else(|| anyhow!("log file {} has no file name", file))?;

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .init();
    Ok(Some(guard))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn print_samples(samples: &[Sample], imperial: bool) -> Result<()> {
    for sample in samples {
        print_json(sample)?;
    }

    let max_height = samples.iter().filter_map(|s| s.height).fold(None, |max: Option<f64>, h| {
        Some(max.map_or(h, |m| m.max(h)))
    });
    if let Some(height) = max_height {
        info!("Max height: {}", Height.show(0, height, imperial));
    }
    Ok(())
}

async fn read_input(input: &Path) -> Result<String> {
    let mut text = String::new();
    if input.as_os_str() == "-" {
        tokio::io::stdin().read_to_string(&mut text).await?;
    } else {
        text = tokio::fs::read_to_string(input)
            .await
            .with_context(|| format!("reading {}", input.display()))?;
    }
    Ok(text)
}

async fn decode_capture(input: &Path, config: &Config) -> Result<()> {
    let text = read_input(input).await?;
    let mut recorder = FlightRecorder::new();
    let stats = decode_lines(text.lines(), &mut recorder);

    info!(
        "Decoded {} records ({} rejected, {} other lines)",
        stats.decoded, stats.rejected, stats.ignored
    );
    print_samples(&recorder.into_samples(), config.units.imperial)
}

async fn decode_eeprom(input: &Path, format: EepromFormat, config: &Config) -> Result<()> {
    let bytes = tokio::fs::read(input)
        .await
        .with_context(|| format!("reading {}", input.display()))?;
    let log = EepromLog::decode(format, &bytes)?;
    if let EepromLog::Full(full) = &log {
        if full.rejected > 0 {
            warn!("{} eeprom records failed their checksum", full.rejected);
        }
    }

    let mut recorder = FlightRecorder::new();
    log.provide_data(&mut recorder);
    print_samples(&recorder.into_samples(), config.units.imperial)
}

fn open_link(config: &Config) -> Result<SerialLink<tokio_serial::SerialStream>> {
    let link = match &config.link.port {
        Some(port) => SerialLink::open_with_paths(&[port.as_str()], config.link.baud_rate)?,
        None => SerialLink::open(config.link.baud_rate)?,
    };
    Ok(link.with_reply_timeout(config.link.reply_timeout_ms))
}

async fn list_flights(config: &Config, download: bool) -> Result<()> {
    let mut link = open_link(config)?;
    let timeout_ms = link.reply_timeout_ms();
    let list = EepromList::fetch(&mut link, config.link.remote, timeout_ms).await?;

    info!("Device {:?} holds {} flights", list.config.serial, list.flights.len());
    for flight in &list.flights {
        print_json(flight)?;
    }

    if !download || list.flights.is_empty() {
        return Ok(());
    }

    let format = list
        .config
        .log_format
        .and_then(EepromFormat::from_log_format)
        .ok_or_else(|| anyhow!("device reports no supported log format"))?;

    let results = download_session(&mut link, &list, config.link.remote, timeout_ms).await?;

    for (flight, result) in results {
        let Ok(bytes) = result else { continue };
        let log = match EepromLog::decode(format, &bytes) {
            Ok(log) => log,
            Err(e) => {
                warn!("Flight {}: {}", flight.flight, e);
                continue;
            }
        };

        let mut recorder = FlightRecorder::new();
        list.config.apply(recorder.cal_data());
        log.provide_data(&mut recorder);
        debug!("Flight {}: {} samples", flight.flight, recorder.len());
        print_samples(&recorder.into_samples(), config.units.imperial)?;
    }
    Ok(())
}

async fn read_adc(config: &Config) -> Result<()> {
    let mut link = open_link(config)?;
    let timeout_ms = link.reply_timeout_ms();

    if config.link.remote {
        link.start_remote().await?;
    }
    let result = query_adc(&mut link, timeout_ms).await;
    if config.link.remote {
        if let Err(e) = link.stop_remote().await {
            warn!("Failed to stop remote session: {}", e);
        }
    }
    let (device_config, reading) = result?;

    debug!("ADC reading: {:?}", reading);
    let mut recorder = FlightRecorder::new();
    device_config.apply(recorder.cal_data());
    reading.provide_data(&mut recorder);
    print_samples(&recorder.into_samples(), config.units.imperial)
}

async fn query_adc<L: Link + ?Sized>(
    link: &mut L,
    timeout_ms: u64,
) -> Result<(ConfigData, altos_decode::sensor::SensorReading)> {
    let device_config = ConfigData::fetch(link, timeout_ms).await?;
    let device = device_config
        .device_type()
        .ok_or_else(|| anyhow!("device did not report a known product"))?;
    let reading = read_sensor(link, device).await?;
    Ok((device_config, reading))
}

async fn load_sites(input: PathBuf) -> Result<()> {
    let file = tokio::fs::File::open(&input)
        .await
        .with_context(|| format!("opening {}", input.display()))?;
    let (tx, rx) = tokio::sync::oneshot::channel();

    let handle = sites::spawn_load(tokio::io::BufReader::new(file), move |result| {
        let _ = tx.send(result);
    });
    handle.await?;

    for site in rx.await?? {
        print_json(&site)?;
    }
    Ok(())
}
