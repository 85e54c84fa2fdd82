//! Tracing subscriber setup: console formatter, file layer, and initialisation.
//!
//! [`Logger`](super::Logger) tags stage headers, simulated changes and
//! performed changes with dedicated targets; both sinks classify every
//! event by [`Marker`] and render it their own way.
use std::fmt;
use std::fs;
use std::io::Write as _;
use std::path::Path;
use std::sync::Mutex;

use tracing::Level;

/// Target of stage headers (one per check).
pub(super) const STAGE_TARGET: &str = "homekeeper::stage";
/// Target of changes logged but not made in simulate mode.
pub(super) const DRY_RUN_TARGET: &str = "homekeeper::dry_run";
/// Target of changes made to the host.
pub(super) const ACTION_TARGET: &str = "homekeeper::action";

/// What an event means for the reader of the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Stage,
    Simulated,
    Changed,
    Error,
    Warning,
    Detail,
    Plain,
}

impl Marker {
    fn of(metadata: &tracing::Metadata<'_>) -> Self {
        match (*metadata.level(), metadata.target()) {
            (Level::ERROR, _) => Self::Error,
            (Level::WARN, _) => Self::Warning,
            (Level::INFO, STAGE_TARGET) => Self::Stage,
            (Level::INFO, DRY_RUN_TARGET) => Self::Simulated,
            (Level::INFO, ACTION_TARGET) => Self::Changed,
            (Level::INFO, _) => Self::Plain,
            _ => Self::Detail,
        }
    }

    /// Plain-text tag used in the log file.
    const fn tag(self) -> &'static str {
        match self {
            Self::Stage => "==>",
            Self::Simulated => "[dry run]",
            Self::Changed => "[action]",
            Self::Error => "[error]",
            Self::Warning => "[warn]",
            Self::Detail => "[debug]",
            Self::Plain => "",
        }
    }
}

/// Pulls the `message` field out of an event.
#[derive(Default)]
struct Message(String);

impl tracing::field::Visit for Message {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.0 = value.to_string();
        }
    }
}

fn message_of(event: &tracing::Event<'_>) -> String {
    let mut message = Message::default();
    event.record(&mut message);
    message.0
}

/// Remove ANSI CSI sequences (colours, cursor movement) from `s`.
fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\x1b' {
            out.push(c);
            continue;
        }
        if chars.next() == Some('[') {
            // Parameters run up to the final byte in `@`..=`~`.
            chars.by_ref().find(|c| ('@'..='~').contains(c));
        }
    }
    out
}

fn utc_now(format: &str) -> String {
    chrono::Utc::now().format(format).to_string()
}

/// Appends every event to a plain-text file, timestamped and stripped of
/// ANSI codes. Captures `DEBUG` and above whatever the console shows.
#[derive(Debug)]
pub(super) struct FileLayer {
    file: Mutex<fs::File>,
}

impl FileLayer {
    /// Open `path` for appending and write a run header.
    ///
    /// Returns `None` if the file cannot be opened or written.
    pub(super) fn new(path: &Path) -> Option<Self> {
        let version = option_env!("HOMEKEEPER_VERSION")
            .unwrap_or(concat!("dev-", env!("CARGO_PKG_VERSION")));
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()?;
        writeln!(
            file,
            "---- homekeeper {version} run started {} UTC ----",
            utc_now("%Y-%m-%d %H:%M:%S")
        )
        .ok()?;
        Some(Self {
            file: Mutex::new(file),
        })
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for FileLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _: tracing_subscriber::layer::Context<'_, S>) {
        let marker = Marker::of(event.metadata());
        let message = strip_ansi(&message_of(event));
        let indent = if marker == Marker::Stage { "" } else { "    " };
        let tag = marker.tag();
        let line = if tag.is_empty() {
            format!("[{}] {indent}{message}", utc_now("%H:%M:%S"))
        } else {
            format!("[{}] {indent}{tag} {message}", utc_now("%H:%M:%S"))
        };
        if let Ok(mut file) = self.file.lock() {
            writeln!(file, "{line}").ok();
        }
    }
}

/// Coloured console rendering.
struct ConsoleFormatter;

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for ConsoleFormatter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: tracing_subscriber::fmt::format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> fmt::Result {
        let message = message_of(event);
        match Marker::of(event.metadata()) {
            Marker::Stage => writeln!(writer, "\x1b[1;34m==>\x1b[0m \x1b[1m{message}\x1b[0m"),
            Marker::Simulated => writeln!(writer, "  \x1b[33mwould\x1b[0m {message}"),
            Marker::Changed => writeln!(writer, "  \x1b[32mchanged\x1b[0m {message}"),
            Marker::Error => writeln!(writer, "\x1b[31merror:\x1b[0m {message}"),
            Marker::Warning => writeln!(writer, "\x1b[33mwarning:\x1b[0m {message}"),
            Marker::Plain => writeln!(writer, "  {message}"),
            Marker::Detail => writeln!(writer, "  \x1b[2m{message}\x1b[0m"),
        }
    }
}

/// Install the global [`tracing`] subscriber.
///
/// Warnings and errors go to stderr, everything else to stdout; `debug`
/// only reaches the console with `verbose`. With `log_file`, every event
/// down to `debug` is also appended there. Call once, before logging.
pub fn init_subscriber(verbose: bool, log_file: Option<&Path>) {
    use tracing_subscriber::fmt::writer::MakeWriterExt as _;
    use tracing_subscriber::{
        Layer as _, filter::LevelFilter, fmt, layer::SubscriberExt as _,
        util::SubscriberInitExt as _,
    };

    let console_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let console = fmt::layer()
        .event_format(ConsoleFormatter)
        .with_writer(
            std::io::stderr
                .with_max_level(Level::WARN)
                .and(std::io::stdout.with_min_level(Level::INFO)),
        )
        .with_filter(console_level);
    let file = log_file
        .and_then(FileLayer::new)
        .map(|layer| layer.with_filter(LevelFilter::DEBUG));

    tracing_subscriber::registry().with(console).with(file).init();
}
