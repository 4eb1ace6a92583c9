//! tapstream - Main Entry Point
//!
//! Command line front end for the streaming core: copy files through a
//! pipe, stream a text file to stdout, or convert a comma separated file
//! into JSON records line by line.

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use std::ffi::OsStr;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tapstream::{
    config::{LoggingConfig, PipeConfig, DEFAULT_CONFIG_FILE},
    pipeline::{
        bridge, producers::LinesProducer, producers::Producer, FileDestination, Pipe,
        PipeReport, Sink, Source,
    },
    types::{ReadMode, StreamMode},
    ResultExt,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[clap(name = "tapstream")]
#[clap(about = "Stream files through backpressure-aware pipes", long_about = None)]
struct Cli {
    /// Pipe configuration file (TOML or JSON). Defaults to ./tapstream.toml
    /// when present
    #[clap(long, short, global = true)]
    config: Option<PathBuf>,

    /// Print the pipe report as JSON on stderr
    #[clap(long, global = true, action)]
    report: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Copy a file through a pipe
    Copy {
        src: PathBuf,
        dst: PathBuf,

        /// Read the source in pull mode
        #[clap(long, action)]
        pull: bool,

        /// Cancel the copy after this many milliseconds
        #[clap(long)]
        timeout_ms: Option<u64>,
    },

    /// Stream a UTF-8 text file to stdout
    Cat {
        src: PathBuf,

        #[clap(long, action)]
        pull: bool,
    },

    /// Write one JSON record per line of a comma separated file
    Lines {
        src: PathBuf,
        dst: PathBuf,

        /// Shape of the emitted records
        #[clap(long, value_enum, default_value_t = LineFormat::Fields)]
        format: LineFormat,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LineFormat {
    /// `{"line": n, "fields": [...]}` with every field trimmed
    Fields,
    /// `{"postcode", "latitude", "longitude"}` from `AB10 1XG, 57.14, -2.11`
    Postcode,
}

/// JSON record for the `line_no`-th line.
fn line_record(format: LineFormat, line_no: u64, line: &str) -> Value {
    let mut fields = line.split(',');
    match format {
        LineFormat::Fields => {
            let fields: Vec<&str> = fields.map(str::trim).collect();
            json!({ "line": line_no, "fields": fields })
        }
        LineFormat::Postcode => {
            let postcode = fields.next().unwrap_or_default().replacen(' ', "", 1);
            // Unparsable coordinates become null.
            let mut coordinate = || fields.next().and_then(|f| f.trim().parse::<f64>().ok());
            let latitude = coordinate();
            let longitude = coordinate();
            json!({ "postcode": postcode, "latitude": latitude, "longitude": longitude })
        }
    }
}

fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let (file_layer, guard) = match &config.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path.file_name().unwrap_or_else(|| OsStr::new("tapstream.log"));
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    // stdout carries data for `cat`, so logs go to stderr.
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}

fn read_mode(pull: bool, config: &PipeConfig) -> ReadMode {
    if pull {
        ReadMode::Pull
    } else {
        config.pipe.read_mode
    }
}

fn load_config(path: Option<&Path>) -> tapstream::Result<PipeConfig> {
    match path {
        Some(path) => PipeConfig::load(path).context("Failed to load configuration"),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            Ok(PipeConfig::load_or_default(DEFAULT_CONFIG_FILE))
        }
        None => Ok(PipeConfig::default()),
    }
}

fn print_report(report: &PipeReport) -> tapstream::Result<()> {
    eprintln!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

fn copy(
    config: &PipeConfig,
    src: &Path,
    dst: &Path,
    mode: ReadMode,
    timeout: Option<Duration>,
) -> tapstream::Result<PipeReport> {
    let source = Source::open(src, &config.source)
        .with_context(|| format!("Failed to open {:?}", src))?;
    let sink = Sink::create(dst, &config.sink)
        .with_context(|| format!("Failed to create {:?}", dst))?;

    let handle = bridge::spawn(source, vec![sink], mode, &config.pipe)?;
    let deadline = timeout.map(|t| Instant::now() + t);
    let mut timed_out = false;

    loop {
        let event = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match handle.events().recv_timeout(remaining) {
                    Ok(event) => event,
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                        tracing::warn!("Copy timed out, cancelling");
                        timed_out = true;
                        handle.cancel();
                        // Wait for the terminal event without a deadline.
                        match handle.events().recv() {
                            Ok(event) => event,
                            Err(_) => break,
                        }
                    }
                    Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match handle.events().recv() {
                Ok(event) => event,
                Err(_) => break,
            },
        };

        tracing::debug!("Pipe event: {:?}", event);
        if event.is_terminal() {
            break;
        }
    }

    let outcome = handle.join()?;
    outcome.result.with_context(|| {
        if timed_out {
            format!("copy {:?} -> {:?} timed out", src, dst)
        } else {
            format!("copy {:?} -> {:?}", src, dst)
        }
    })
}

fn cat(config: &PipeConfig, src: &Path, mode: ReadMode) -> tapstream::Result<PipeReport> {
    let mut source = Source::open_text(src, &config.source)
        .with_context(|| format!("Failed to open {:?}", src))?;
    let mut sink = Sink::from_writer(std::io::stdout()).with_label("stdout");

    Pipe::new(&mut source)
        .to(&mut sink)
        .with_settings(&config.pipe)
        .mode(mode)
        .run()
        .with_context(|| format!("cat {:?}", src))
}

fn lines(
    config: &PipeConfig,
    src: &Path,
    dst: &Path,
    format: LineFormat,
) -> tapstream::Result<PipeReport> {
    let file = File::open(src).with_context(|| format!("Failed to open {:?}", src))?;

    let mut line_no = 0u64;
    let records = LinesProducer::new(BufReader::new(file)).map(move |line: String| {
        line_no += 1;
        let mut record = line_record(format, line_no, &line).to_string();
        record.push('\n');
        record
    });
    let mut source = Source::from_producer(records, StreamMode::Object)
        .with_label(src.display().to_string());

    let dest =
        FileDestination::create(dst).with_context(|| format!("Failed to create {:?}", dst))?;
    let mut sink = Sink::new(dest, StreamMode::Object)
        .with_label(dst.display().to_string())
        .with_flush_batch(config.sink.flush_batch)
        .discard_on_failure(config.sink.discard_partial_on_failure);
    if let Some(hwm) = config.sink.high_water_mark {
        sink = sink.with_high_water_mark(hwm);
    }

    Pipe::new(&mut source)
        .to(&mut sink)
        .with_settings(&config.pipe)
        .run()
        .with_context(|| format!("lines {:?} -> {:?}", src, dst))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    let _log_guard = init_logging(&config.logging);

    tracing::info!("Starting tapstream {}", env!("CARGO_PKG_VERSION"));

    let report = match &cli.command {
        Command::Copy {
            src,
            dst,
            pull,
            timeout_ms,
        } => copy(
            &config,
            src,
            dst,
            read_mode(*pull, &config),
            timeout_ms.map(Duration::from_millis),
        )?,
        Command::Cat { src, pull } => cat(&config, src, read_mode(*pull, &config))?,
        Command::Lines { src, dst, format } => lines(&config, src, dst, *format)?,
    };

    if cli.report {
        print_report(&report)?;
    }
    Ok(())
}
