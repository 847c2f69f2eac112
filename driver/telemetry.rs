use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use serde_json::Value;
use shared_event_bus::{EventPublisher, RunEvent};
use shared_logging::{JsonLogger, LogLevel, LogRecord};
use tokio::runtime::Runtime;
use uuid::Uuid;

/// Builder for [`DriverTelemetry`].
pub struct DriverTelemetryBuilder {
    module: String,
    log_path: Option<PathBuf>,
    publisher: Option<Arc<dyn EventPublisher>>,
}

impl DriverTelemetryBuilder {
    /// Creates a builder scoped to a module label.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            log_path: None,
            publisher: None,
        }
    }

    /// Sets the JSON-lines log destination.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Sets the run-event publisher.
    #[must_use]
    pub fn event_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Builds the telemetry handle.
    pub fn build(self) -> Result<DriverTelemetry> {
        let logger = match self.log_path {
            Some(path) => Some(JsonLogger::open(path)?),
            None => None,
        };
        Ok(DriverTelemetry {
            inner: Arc::new(TelemetryInner {
                module: self.module,
                logger,
                publisher: self.publisher,
            }),
        })
    }
}

/// Telemetry handle shared across driver components.
///
/// Logging and event publication are both optional; a disabled handle makes
/// every call a no-op, which keeps the parser and assembler cheap to test.
#[derive(Clone)]
pub struct DriverTelemetry {
    inner: Arc<TelemetryInner>,
}

struct TelemetryInner {
    module: String,
    logger: Option<JsonLogger>,
    publisher: Option<Arc<dyn EventPublisher>>,
}

impl fmt::Debug for DriverTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverTelemetry")
            .field("module", &self.inner.module)
            .finish()
    }
}

impl DriverTelemetry {
    /// Returns a builder.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> DriverTelemetryBuilder {
        DriverTelemetryBuilder::new(module)
    }

    /// A handle with neither logger nor publisher attached.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            inner: Arc::new(TelemetryInner {
                module: "driver".into(),
                logger: None,
                publisher: None,
            }),
        }
    }

    /// Writes a structured log record.
    pub fn log(&self, level: LogLevel, message: &str, detail: Value) -> Result<()> {
        if let Some(logger) = &self.inner.logger {
            logger.log(
                &LogRecord::new(&self.inner.module, level, message).with_detail(detail),
            )?;
        }
        Ok(())
    }

    /// Publishes a run-lifecycle event.
    ///
    /// Inside a tokio runtime the publish is spawned; outside one a
    /// throwaway runtime drives it to completion.
    pub fn event(&self, kind: &str, payload: Value) -> Result<()> {
        if let Some(publisher) = &self.inner.publisher {
            let event = RunEvent {
                id: format!("evt-{}", Uuid::new_v4()),
                source: self.inner.module.clone(),
                kind: kind.into(),
                at: chrono::Utc::now().to_rfc3339(),
                payload,
            };
            if tokio::runtime::Handle::try_current().is_ok() {
                let publisher = Arc::clone(publisher);
                tokio::spawn(async move {
                    let _ = publisher.publish(event).await;
                });
            } else {
                Runtime::new()?.block_on(publisher.publish(event))?;
            }
        }
        Ok(())
    }
}
