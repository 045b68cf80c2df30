//! Logging setup.
//!
//! Exactly one sink records everything from DEBUG up:
//!
//! - Cloud: one JSON object per line on stdout, using the field names Cloud
//!   Logging understands (`severity`, `message`, `time`,
//!   `logging.googleapis.com/sourceLocation`). Cloud Logging also collects
//!   stderr, so no console layer is installed.
//! - Local file: `YYYY-MM-DD HH:MM:SS, TZ - LEVEL - message`, rotated at
//!   `max_bytes` keeping `backups` old files. A console layer on stderr
//!   follows the CLI verbosity (and `RUST_LOG`).

use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use file_rotate::{compression::Compression, suffix::AppendCount, ContentLimit, FileRotate};
use serde_json::{json, Map, Value};
use std::{fmt, path::Path, sync::Mutex};
use tracing::{
    field::{Field, Visit},
    Event, Level, Subscriber,
};
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{
        format::Writer, writer::MakeWriter, FmtContext, FormatEvent, FormatFields,
    },
    layer::SubscriberExt,
    registry::LookupSpan,
    EnvFilter, Layer, Registry,
};

use crate::settings::LogSink;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Initialize the configured sink, plus the console layer for local runs.
///
/// # Errors
///
/// Returns an error if the filter directives are invalid, the log file
/// cannot be created, or a global subscriber is already installed.
pub fn init(verbosity_level: Option<Level>, sink: &LogSink) -> Result<()> {
    let subscriber = Registry::default().with(layers(verbosity_level, sink)?);
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

fn layers(verbosity_level: Option<Level>, sink: &LogSink) -> Result<Vec<BoxedLayer>> {
    Ok(match sink {
        LogSink::Cloud { project } => vec![cloud_layer(project, std::io::stdout)],
        LogSink::LocalFile {
            path,
            max_bytes,
            backups,
        } => vec![
            local_layer(rotating_file(path, *max_bytes, *backups)?),
            console_layer(verbosity_level)?,
        ],
    })
}

fn console_layer(verbosity_level: Option<Level>) -> Result<BoxedLayer> {
    let verbosity_level = verbosity_level.unwrap_or(Level::ERROR);

    let filter = EnvFilter::builder()
        .with_default_directive(verbosity_level.into())
        .from_env_lossy()
        .add_directive("hyper=error".parse()?)
        .add_directive("tokio=error".parse()?);

    Ok(tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(false)
        .with_filter(filter)
        .boxed())
}

/// Size-rotated log file keeping `backups` numbered copies (`<path>.1`, ...).
///
/// # Errors
///
/// Returns an error if `path` has no file name or its directory cannot be
/// created.
pub fn rotating_file(
    path: &Path,
    max_bytes: usize,
    backups: usize,
) -> Result<Mutex<FileRotate<AppendCount>>> {
    if path.file_name().is_none() {
        bail!("log file {} has no file name", path.display());
    }
    let Some(parent) = path.parent() else {
        bail!("log file {} has no parent directory", path.display());
    };
    // An empty parent is the working directory.
    if !parent.as_os_str().is_empty() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
    }

    Ok(Mutex::new(FileRotate::new(
        path,
        AppendCount::new(backups),
        ContentLimit::Bytes(max_bytes),
        Compression::None,
        #[cfg(unix)]
        None,
    )))
}

fn cloud_layer<W>(project: &str, writer: W) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(writer)
        .event_format(CloudFormat {
            project: project.to_string(),
        })
        .with_filter(LevelFilter::DEBUG)
        .boxed()
}

fn local_layer<W>(writer: W) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(writer)
        .event_format(LocalFormat)
        .with_filter(LevelFilter::DEBUG)
        .boxed()
}

/// Message and structured fields of one event.
#[derive(Default)]
struct EventFields {
    message: String,
    fields: Map<String, Value>,
}

impl EventFields {
    fn from_event(event: &Event<'_>) -> Self {
        let mut fields = Self::default();
        event.record(&mut fields);
        fields
    }

    fn insert(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = match value {
                Value::String(message) => message,
                other => other.to_string(),
            };
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }

    /// Message followed by `key=value` pairs.
    fn text(&self) -> String {
        let mut text = self.message.clone();
        for (key, value) in &self.fields {
            let value = match value {
                Value::String(value) => value.clone(),
                other => other.to_string(),
            };
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(key);
            text.push('=');
            text.push_str(&value);
        }
        text
    }
}

impl Visit for EventFields {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, Value::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Value::from(value));
    }
}

/// Cloud Logging severity names.
fn severity(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "ERROR",
        Level::WARN => "WARNING",
        Level::INFO => "INFO",
        Level::DEBUG | Level::TRACE => "DEBUG",
    }
}

fn level_name(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "ERROR",
        Level::WARN => "WARNING",
        Level::INFO => "INFO",
        Level::DEBUG => "DEBUG",
        Level::TRACE => "TRACE",
    }
}

struct CloudFormat {
    project: String,
}

impl CloudFormat {
    fn entry(&self, event: &Event<'_>, now: DateTime<Utc>) -> Value {
        let metadata = event.metadata();
        let EventFields { message, fields } = EventFields::from_event(event);

        let mut entry = fields;
        entry.insert("severity".to_string(), json!(severity(metadata.level())));
        entry.insert("message".to_string(), json!(message));
        entry.insert(
            "time".to_string(),
            json!(now.to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
        entry.insert(
            "logging.googleapis.com/sourceLocation".to_string(),
            json!({
                "file": metadata.file(),
                "line": metadata.line().map(|line| line.to_string()),
                "function": metadata.target(),
            }),
        );
        entry.insert(
            "logging.googleapis.com/labels".to_string(),
            json!({ "project_id": self.project }),
        );
        Value::Object(entry)
    }
}

impl<S, N> FormatEvent<S, N> for CloudFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        writeln!(writer, "{}", self.entry(event, Utc::now()))
    }
}

struct LocalFormat;

impl<S, N> FormatEvent<S, N> for LocalFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let fields = EventFields::from_event(event);
        writeln!(
            writer,
            "{} - {} - {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S, %Z"),
            level_name(event.metadata().level()),
            fields.text()
        )
    }
}
