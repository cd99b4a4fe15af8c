//! Logging setup and span constructors shared by both services.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::{Mutex, Once};

use tracing::Span;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::events::EventEnvelope;
use crate::model::OrganisationId;

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line.
    Json,
    /// Human-readable multi-line output.
    #[default]
    Pretty,
}

/// Install the global subscriber.
///
/// Logs go to `log_file` (appended, created if missing) or to stderr.
/// `RUST_LOG` controls levels and defaults to `info`. Only the first call
/// installs anything; later calls are no-ops.
///
/// # Errors
///
/// Returns an [`io::Error`] if the log file cannot be opened.
pub fn init_logging(format: LogFormat, log_file: Option<&Path>) -> io::Result<()> {
    let writer = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(io::stderr),
    };
    let ansi = log_file.is_none();

    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let installed = match format {
            LogFormat::Json => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(writer))
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty().with_ansi(ansi).with_writer(writer))
                .try_init(),
        };
        if installed.is_err() {
            tracing::debug!("a global subscriber was already installed");
        }
    });
    Ok(())
}

/// Span wrapping one recycle request.
#[must_use]
pub fn recycle_span(organisation_id: OrganisationId) -> Span {
    tracing::info_span!("recycle", organisation_id = organisation_id.0)
}

/// Span wrapping one replication delivery.
#[must_use]
pub fn replication_span(handler: &str, envelope: &EventEnvelope, attempt: u32) -> Span {
    tracing::info_span!(
        "replication",
        handler = handler,
        topic = envelope.topic().name(),
        event_id = %envelope.event_id,
        attempt = attempt,
    )
}
