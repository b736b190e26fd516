use std::backtrace::{Backtrace, BacktraceStatus};
use std::io::{Error, Write};
use std::panic::PanicHookInfo;
use std::sync::{Once, OnceLock};

use serde_json::{Map, Value};
use syncer_config::Environment;
use thiserror::Error;
use tracing::subscriber::{SetGlobalDefaultError, set_global_default};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{self, InitError};
use tracing_log::{LogTracer, log_tracer::SetLoggerError};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, FmtSubscriber, Registry, fmt, layer::SubscriberExt};

/// JSON field carrying the connection a worker is syncing.
const CONNECTION_KEY_IN_LOG: &str = "connection_id";
/// JSON field carrying the workspace owning the connection.
const WORKSPACE_KEY_IN_LOG: &str = "workspace_id";

/// Errors that can occur while installing the tracing subscriber.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to build rolling file appender: {0}")]
    InitAppender(#[from] InitError),

    #[error("failed to init log tracer: {0}")]
    InitLogTracer(#[from] SetLoggerError),

    #[error("failed to set global default subscriber: {0}")]
    SetGlobalDefault(#[from] SetGlobalDefaultError),

    #[error("an io error occurred: {0}")]
    Io(#[from] Error),
}

/// Keeps buffered log lines alive until the process exits.
///
/// In production the [`WorkerGuard`] must be held for the whole lifetime of the worker, dropping
/// it flushes the non-blocking appender.
#[must_use]
pub enum LogFlusher {
    Flusher(WorkerGuard),
    NullFlusher,
}

static INIT_TEST_TRACING: Once = Once::new();

/// Installs terminal tracing for tests when `ENABLE_TRACING` is set.
///
/// ```bash
/// ENABLE_TRACING=1 cargo test wait_for_workload
/// ```
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        if std::env::var("ENABLE_TRACING").is_ok() {
            // Without an explicit environment we would default to prod and log to files.
            Environment::Dev.set();
            let _log_flusher =
                init_tracing("test").expect("Failed to initialize tracing for tests");
        }
    });
}

/// Top-level fields injected into every JSON log line.
#[derive(Debug, Default, Clone)]
pub struct AttemptLogFields {
    pub connection_id: Option<String>,
    pub workspace_id: Option<String>,
}

static ATTEMPT_LOG_FIELDS: OnceLock<AttemptLogFields> = OnceLock::new();

/// Sets the fields injected into JSON log lines. Only the first call has an effect.
pub fn set_global_attempt_fields(fields: AttemptLogFields) {
    let _ = ATTEMPT_LOG_FIELDS.set(fields);
}

fn global_attempt_fields() -> Option<&'static AttemptLogFields> {
    ATTEMPT_LOG_FIELDS.get()
}

/// Adds the attempt fields to a JSON log line.
///
/// Returns [`None`] when the line is not a JSON object or when every field is either unset or
/// already present, in which case the line must be written unchanged.
fn inject_attempt_fields(line: &str, fields: &AttemptLogFields) -> Option<String> {
    let Ok(Value::Object(mut map)) = serde_json::from_str::<Value>(line) else {
        return None;
    };

    let mut modified = false;
    modified |= insert_missing(&mut map, CONNECTION_KEY_IN_LOG, fields.connection_id.as_deref());
    modified |= insert_missing(&mut map, WORKSPACE_KEY_IN_LOG, fields.workspace_id.as_deref());

    if !modified {
        return None;
    }

    let serialized = serde_json::to_string(&map).ok()?;
    if line.ends_with('\n') {
        Some(format!("{serialized}\n"))
    } else {
        Some(serialized)
    }
}

fn insert_missing(map: &mut Map<String, Value>, key: &str, value: Option<&str>) -> bool {
    match value {
        Some(value) if !map.contains_key(key) => {
            map.insert(key.to_owned(), Value::String(value.to_owned()));
            true
        }
        _ => false,
    }
}

/// Writer wrapper adding the attempt fields to JSON log lines.
struct AttemptFieldsWriter<W> {
    inner: W,
}

impl<W> AttemptFieldsWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W> Write for AttemptFieldsWriter<W>
where
    W: Write,
{
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Some(fields) = global_attempt_fields()
            && let Ok(line) = std::str::from_utf8(buf)
            && let Some(output) = inject_attempt_fields(line, fields)
        {
            // The caller must see the original length, not the length of the rewritten line.
            self.inner.write_all(output.as_bytes())?;
            return Ok(buf.len());
        }

        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Initializes tracing for a worker process.
pub fn init_tracing(app_name: &str) -> Result<LogFlusher, TracingError> {
    init_tracing_with_attempt_fields(app_name, AttemptLogFields::default())
}

/// Initializes tracing and tags every production log line with the given attempt fields.
pub fn init_tracing_with_attempt_fields(
    app_name: &str,
    fields: AttemptLogFields,
) -> Result<LogFlusher, TracingError> {
    set_global_attempt_fields(fields);

    // Route records emitted through the `log` facade into tracing.
    LogTracer::init()?;

    let is_prod = Environment::load()?.is_prod();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_flusher = if is_prod {
        configure_prod_tracing(filter, app_name)?
    } else {
        configure_dev_tracing(filter)?
    };

    set_tracing_panic_hook();

    Ok(log_flusher)
}

/// JSON lines into daily rolling files under `logs/`.
fn configure_prod_tracing(filter: EnvFilter, app_name: &str) -> Result<LogFlusher, TracingError> {
    let file_appender = rolling::Builder::new()
        .filename_prefix(app_name)
        .filename_suffix("log")
        .rotation(rolling::Rotation::DAILY)
        .max_log_files(5)
        .build("logs")?;

    let (file_appender, guard) = tracing_appender::non_blocking(file_appender);

    let format = fmt::format()
        .with_level(true)
        .with_ansi(false)
        .with_target(false);

    let subscriber = Registry::default().with(filter).with(
        fmt::layer()
            .event_format(format)
            .with_writer(move || AttemptFieldsWriter::new(file_appender.make_writer()))
            .json()
            .with_current_span(true)
            .with_span_list(true),
    );

    set_global_default(subscriber)?;

    Ok(LogFlusher::Flusher(guard))
}

/// Pretty terminal output.
fn configure_dev_tracing(filter: EnvFilter) -> Result<LogFlusher, TracingError> {
    let format = fmt::format()
        .with_level(true)
        .with_ansi(true)
        .pretty()
        .with_line_number(false)
        .with_file(false)
        .with_target(true);

    let subscriber = FmtSubscriber::builder()
        .event_format(format)
        .with_env_filter(filter)
        .finish();

    set_global_default(subscriber)?;

    Ok(LogFlusher::NullFlusher)
}

/// Chains a hook logging panics through tracing in front of the default hook, which only writes
/// to stderr.
fn set_tracing_panic_hook() {
    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        panic_hook(info);
        prev_hook(info);
    }));
}

fn panic_hook(panic_info: &PanicHookInfo) {
    let backtrace = Backtrace::capture();
    let (backtrace, note) = match backtrace.status() {
        BacktraceStatus::Captured => (Some(backtrace), None),
        BacktraceStatus::Disabled => (
            None,
            Some("run with RUST_BACKTRACE=1 to display backtraces"),
        ),
        BacktraceStatus::Unsupported => {
            (None, Some("backtraces are not supported on this platform"))
        }
        _ => (None, Some("backtrace status is unknown")),
    };

    let payload = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    };

    let location = panic_info.location().map(|location| location.to_string());

    tracing::error!(
        panic.payload = payload,
        payload.location = location,
        panic.backtrace = backtrace.map(tracing::field::display),
        panic.note = note,
        "a panic occurred",
    );
}
