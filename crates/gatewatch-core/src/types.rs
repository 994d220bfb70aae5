use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity recorded on rejections when no roster entry could be attributed.
pub const UNREGISTERED: &str = "unregistered";

/// Direction of an access event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Entry,
    Exit,
}

impl Action {
    /// Label persisted in the ledger's `Accion` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Entry => "ingreso",
            Action::Exit => "egreso",
        }
    }

    /// Parse a persisted action label. Unknown labels yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "ingreso" => Some(Action::Entry),
            "egreso" => Some(Action::Exit),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// An immutable ledger record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessEvent {
    pub identity: String,
    pub action: Action,
    /// `None` when a historical row carries a timestamp that cannot be parsed.
    /// Such rows never take part in open/closed determination.
    pub timestamp: Option<NaiveDateTime>,
    /// Minutes spent inside, present only on exit records.
    pub duration_minutes: Option<f64>,
}

impl AccessEvent {
    pub fn entry(identity: &str, at: NaiveDateTime) -> Self {
        Self {
            identity: identity.to_string(),
            action: Action::Entry,
            timestamp: Some(at),
            duration_minutes: None,
        }
    }

    pub fn exit(identity: &str, at: NaiveDateTime, duration_minutes: f64) -> Self {
        Self {
            identity: identity.to_string(),
            action: Action::Exit,
            timestamp: Some(at),
            duration_minutes: Some(duration_minutes),
        }
    }
}

/// Why a request did not produce an access event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    /// No confident match against the gallery.
    UnknownToRoster,
    /// Matched, but the roster denies access (or has no row for the identity).
    KnownUnauthorized,
    /// Exit requested while the identity has no open entry.
    ExitWithoutOpenEntry,
}

impl RejectReason {
    /// Label persisted in the rejection log's `Motivo` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::UnknownToRoster => "desconocido",
            RejectReason::KnownUnauthorized => "no_autorizado",
            RejectReason::ExitWithoutOpenEntry => "egreso_sin_ingreso",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "desconocido" => Some(RejectReason::UnknownToRoster),
            "no_autorizado" => Some(RejectReason::KnownUnauthorized),
            "egreso_sin_ingreso" => Some(RejectReason::ExitWithoutOpenEntry),
            _ => None,
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RejectReason::UnknownToRoster => "unknown to roster",
            RejectReason::KnownUnauthorized => "known but unauthorized",
            RejectReason::ExitWithoutOpenEntry => "exit without open entry",
        };
        f.write_str(text)
    }
}

/// An immutable rejection-log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectionEvent {
    pub identity: String,
    pub reason: RejectReason,
    pub timestamp: Option<NaiveDateTime>,
}

/// Derived per-identity session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum SessionState {
    Outside,
    Inside { since: NaiveDateTime },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_labels() {
        assert_eq!(Action::parse("ingreso"), Some(Action::Entry));
        assert_eq!(Action::parse(" egreso "), Some(Action::Exit));
        assert_eq!(Action::parse("entry"), None);
        assert_eq!(Action::Exit.to_string(), "egreso");
    }

    #[test]
    fn test_reject_reason_labels() {
        for reason in [
            RejectReason::UnknownToRoster,
            RejectReason::KnownUnauthorized,
            RejectReason::ExitWithoutOpenEntry,
        ] {
            assert_eq!(RejectReason::parse(reason.as_str()), Some(reason));
        }
        assert_eq!(
            RejectReason::ExitWithoutOpenEntry.to_string(),
            "exit without open entry"
        );
    }
}
