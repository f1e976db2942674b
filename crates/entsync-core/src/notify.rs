// ── User-facing notifications ──
//
// The engine reports load/update failures (and optional successes) to a
// sink supplied by the embedding application. Message text can be static
// or computed from the error/result and the call parameters.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};
use tracing::{error, info, warn};

use crate::error::CoreError;
use crate::params::Params;

/// How loud a notification is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// Sink for user-visible messages.
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, title: &str, message: &str, severity: Severity);
}

/// Default sink: routes notifications into `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, title: &str, message: &str, severity: Severity) {
        match severity {
            Severity::Error => error!(title, message, "notification"),
            Severity::Warning => warn!(title, message, "notification"),
            Severity::Info | Severity::Success => info!(title, message, %severity, "notification"),
        }
    }
}

impl<F> Notifier for F
where
    F: Fn(&str, &str, Severity) + Send + Sync + 'static,
{
    fn notify(&self, title: &str, message: &str, severity: Severity) {
        self(title, message, severity);
    }
}

// ── Message templates ────────────────────────────────────────────────

type ErrorFormatter = Arc<dyn Fn(&CoreError, &Params) -> String + Send + Sync>;
type SuccessFormatter = Arc<dyn Fn(&Value, &Params) -> String + Send + Sync>;

/// Text shown when an operation fails.
#[derive(Clone)]
pub enum ErrorMessage {
    Static(String),
    Format(ErrorFormatter),
}

impl ErrorMessage {
    pub fn format<F>(f: F) -> Self
    where
        F: Fn(&CoreError, &Params) -> String + Send + Sync + 'static,
    {
        Self::Format(Arc::new(f))
    }

    pub fn render(&self, err: &CoreError, params: &Params) -> String {
        match self {
            Self::Static(s) => s.clone(),
            Self::Format(f) => f(err, params),
        }
    }
}

impl From<&str> for ErrorMessage {
    fn from(s: &str) -> Self {
        Self::Static(s.to_owned())
    }
}

impl From<String> for ErrorMessage {
    fn from(s: String) -> Self {
        Self::Static(s)
    }
}

impl fmt::Debug for ErrorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(s) => f.debug_tuple("Static").field(s).finish(),
            Self::Format(_) => f.write_str("Format(<fn>)"),
        }
    }
}

/// Text shown when an operation succeeds.
#[derive(Clone)]
pub enum SuccessMessage {
    Static(String),
    Format(SuccessFormatter),
}

impl SuccessMessage {
    pub fn format<F>(f: F) -> Self
    where
        F: Fn(&Value, &Params) -> String + Send + Sync + 'static,
    {
        Self::Format(Arc::new(f))
    }

    pub fn render(&self, result: &Value, params: &Params) -> String {
        match self {
            Self::Static(s) => s.clone(),
            Self::Format(f) => f(result, params),
        }
    }
}

impl From<&str> for SuccessMessage {
    fn from(s: &str) -> Self {
        Self::Static(s.to_owned())
    }
}

impl From<String> for SuccessMessage {
    fn from(s: String) -> Self {
        Self::Static(s)
    }
}

impl fmt::Debug for SuccessMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(s) => f.debug_tuple("Static").field(s).finish(),
            Self::Format(_) => f.write_str("Format(<fn>)"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn closures_are_notifiers() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = Arc::clone(&seen);
            move |title: &str, message: &str, severity: Severity| {
                seen.lock().unwrap().push(format!("{severity}:{title}:{message}"));
            }
        };
        sink.notify("Clusters", "failed", Severity::Error);
        assert_eq!(*seen.lock().unwrap(), vec!["error:Clusters:failed".to_owned()]);
    }

    #[test]
    fn error_message_formatter_sees_params() {
        let msg = ErrorMessage::format(|err, params| {
            format!("{} ({})", err, params["clusterId"].as_str().unwrap_or("?"))
        });
        let params = json!({"clusterId": "c1"}).as_object().unwrap().clone();
        assert_eq!(
            msg.render(&CoreError::operation("timeout"), &params),
            "Operation failed: timeout (c1)"
        );
        assert_eq!(
            ErrorMessage::from("static").render(&CoreError::operation("x"), &params),
            "static"
        );
    }

    #[test]
    fn severity_round_trips_through_strum() {
        assert_eq!(Severity::Warning.to_string(), "warning");
        assert_eq!("success".parse::<Severity>().unwrap(), Severity::Success);
    }
}
