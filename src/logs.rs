#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

//! Synthetic log traffic: single records or a recurring emission over a duration.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io::Write;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::error::{AgentError, AgentResult};
use crate::metrics::Metrics;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub fn as_upper(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Plaintext,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogRequest {
    pub message: String,
    pub level: LogLevel,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub interval: Option<u64>,
    #[serde(default)]
    pub duration: Option<u64>,
}

impl LogRequest {
    /// Interval and duration go together, are at least one second, and the interval fits the duration.
    pub fn validate(&self) -> AgentResult<Option<(u64, u64)>> {
        match (self.interval, self.duration) {
            (None, None) => Ok(None),
            (Some(_), None) => Err(AgentError::validation(
                "Duration must be set when interval is provided",
            )),
            (None, Some(_)) => Err(AgentError::validation(
                "Interval must be set when duration is provided",
            )),
            (Some(0), Some(_)) => Err(AgentError::validation("Interval must be greater than 0")),
            (Some(_), Some(0)) => Err(AgentError::validation("Duration must be greater than 0")),
            (Some(interval), Some(duration)) if interval > duration => Err(
                AgentError::validation("Interval cannot be greater than duration"),
            ),
            (Some(interval), Some(duration)) => Ok(Some((interval, duration))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LogRecord {
    pub timestamp: String,
    pub level: LogLevel,
    pub service: Option<String>,
    pub message: String,
}

impl LogRecord {
    pub fn now(req: &LogRequest) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            level: req.level,
            service: req.service.clone(),
            message: req.message.clone(),
        }
    }

    fn service_or_dash(&self) -> &str {
        self.service.as_deref().unwrap_or("-")
    }

    pub fn render(&self, format: LogFormat) -> String {
        match format {
            LogFormat::Json => json!({
                "timestamp": self.timestamp,
                "level": self.level.as_upper(),
                "service": self.service_or_dash(),
                "message": self.message,
            })
            .to_string(),
            LogFormat::Plaintext => format!(
                "{} | {} | {} | {}",
                self.timestamp,
                self.level.as_upper(),
                self.service_or_dash(),
                self.message
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum LogOutcome {
    Written {
        record: LogRecord,
        line: String,
        format: LogFormat,
    },
    Scheduled { interval: u64, duration: u64 },
}

#[derive(Clone)]
pub struct LogEmitter {
    metrics: Metrics,
}

impl LogEmitter {
    pub fn new(metrics: Metrics) -> Self {
        Self { metrics }
    }

    /// Writes one record now, or starts a background emission when interval and duration are set.
    pub fn emit(&self, req: LogRequest) -> AgentResult<LogOutcome> {
        match req.validate()? {
            None => {
                let record = LogRecord::now(&req);
                let line = self.write(&record, req.format);
                Ok(LogOutcome::Written {
                    record,
                    line,
                    format: req.format,
                })
            }
            Some((interval, duration)) => {
                info!(interval, duration, format = ?req.format, "recurring synthetic logs started");
                let emitter = self.clone();
                tokio::spawn(async move {
                    emitter
                        .recurring(req, Duration::from_secs(interval), Duration::from_secs(duration))
                        .await;
                });
                Ok(LogOutcome::Scheduled { interval, duration })
            }
        }
    }

    async fn recurring(&self, req: LogRequest, interval: Duration, duration: Duration) {
        let deadline = Instant::now() + duration;
        let mut written = 0u64;
        while Instant::now() < deadline {
            self.write(&LogRecord::now(&req), req.format);
            written += 1;
            sleep(interval).await;
        }
        debug!(written, "recurring synthetic logs finished");
    }

    fn write(&self, record: &LogRecord, format: LogFormat) -> String {
        let line = record.render(format);
        let mut out = std::io::stdout().lock();
        if let Err(e) = writeln!(out, "{line}") {
            warn!(error = %e, "write synthetic log failed");
        }
        self.metrics.record_log();
        line
    }
}
