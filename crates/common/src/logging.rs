use std::sync::OnceLock;

use anyhow::Context as _;
use tracing::{field::Visit, Metadata, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LogSettings;

static IGNORE_PATTERNS: OnceLock<Vec<regex::Regex>> = OnceLock::new();

/// Install the global subscriber: stderr output, plus a daily-rotated file
/// when `settings.dir` is set.  Both outputs go through [`LogIgnoreFilter`].
///
/// `default_filter` applies when `RUST_LOG` is unset.  Keep the returned
/// guard alive for the life of the process or buffered file output is lost.
pub fn init(settings: &LogSettings, default_filter: &str) -> anyhow::Result<Option<WorkerGuard>> {
    set_ignore_patterns(&settings.ignore).context("invalid log.ignore pattern")?;

    let (file_layer, guard) = match &settings.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log dir {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "convert-server.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(LogIgnoreFilter);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_filter(LogIgnoreFilter))
        .with(file_layer)
        .try_init()
        .context("installing tracing subscriber")?;

    Ok(guard)
}

/// Compile and activate the log-ignore patterns.
///
/// The first call wins; later calls are ignored.  Returns an error if any
/// pattern is not a valid regular expression.
pub fn set_ignore_patterns(patterns: &[String]) -> Result<(), regex::Error> {
    let compiled = patterns
        .iter()
        .map(|p| regex::Regex::new(p))
        .collect::<Result<Vec<_>, _>>()?;
    let _ = IGNORE_PATTERNS.set(compiled);
    Ok(())
}

// ── Per-layer filter ──────────────────────────────────────────────────────────

/// Per-layer filter that drops events whose "<target>: <message>" matches a
/// pattern installed via [`set_ignore_patterns`].  Useful for the noisy
/// glyph warnings `pdf_extract` emits on every page of some documents.
pub struct LogIgnoreFilter;

impl<S: Subscriber> tracing_subscriber::layer::Filter<S> for LogIgnoreFilter {
    fn enabled(&self, _meta: &Metadata<'_>, _cx: &Context<'_, S>) -> bool {
        true
    }

    fn event_enabled(&self, event: &tracing::Event<'_>, _cx: &Context<'_, S>) -> bool {
        let Some(patterns) = IGNORE_PATTERNS.get() else {
            return true;
        };
        if patterns.is_empty() {
            return true;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        // Log-bridged events carry the real crate target in "log.target".
        let target = visitor.log_target.as_deref().unwrap_or_else(|| event.metadata().target());
        !is_ignored(patterns, target, &visitor.message)
    }
}

fn is_ignored(patterns: &[regex::Regex], target: &str, message: &str) -> bool {
    let candidate = format!("{target}: {message}");
    patterns.iter().any(|p| p.is_match(&candidate))
}

// ── Internal helpers ─────────────────────────────────────────────────────────

#[derive(Default)]
struct MessageVisitor {
    message: String,
    log_target: Option<String>,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            "log.target" => self.log_target = Some(value.to_string()),
            _ => {}
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        match field.name() {
            "message" => self.message = format!("{value:?}"),
            "log.target" => self.log_target = Some(format!("{value:?}")),
            _ => {}
        }
    }
}
