//! Append-only log of rejected access attempts.
//!
//! CSV with header `Nombre,Motivo,Hora_Fecha`. Never touches the access ledger.

use crate::ledger::{append_row, read_rows, LedgerError};
use crate::timestamp::{format_timestamp, parse_timestamp};
use crate::types::{RejectReason, RejectionEvent};
use std::path::{Path, PathBuf};

pub const REJECTION_HEADER: [&str; 3] = ["Nombre", "Motivo", "Hora_Fecha"];

pub trait RejectionLog {
    fn record(&mut self, event: &RejectionEvent) -> Result<(), LedgerError>;

    fn events(&self) -> Result<Vec<RejectionEvent>, LedgerError>;
}

#[derive(Debug, Clone)]
pub struct CsvRejectionLog {
    path: PathBuf,
}

impl CsvRejectionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RejectionLog for CsvRejectionLog {
    fn record(&mut self, event: &RejectionEvent) -> Result<(), LedgerError> {
        let timestamp = event
            .timestamp
            .as_ref()
            .map(format_timestamp)
            .unwrap_or_default();
        append_row(
            &self.path,
            &REJECTION_HEADER,
            &[event.identity.as_str(), event.reason.as_str(), timestamp.as_str()],
        )
    }

    fn events(&self) -> Result<Vec<RejectionEvent>, LedgerError> {
        let rows = read_rows(&self.path)?;
        Ok(rows
            .into_iter()
            .filter_map(|(line, record)| {
                let identity = record.get(0).map(str::trim).filter(|s| !s.is_empty());
                let reason = record.get(1).and_then(RejectReason::parse);
                match (identity, reason) {
                    (Some(identity), Some(reason)) => Some(RejectionEvent {
                        identity: identity.to_string(),
                        reason,
                        timestamp: record.get(2).and_then(parse_timestamp),
                    }),
                    _ => {
                        tracing::warn!(path = %self.path.display(), line, "unreadable rejection row; skipped");
                        None
                    }
                }
            })
            .collect())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryRejectionLog {
    events: Vec<RejectionEvent>,
}

impl MemoryRejectionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl RejectionLog for MemoryRejectionLog {
    fn record(&mut self, event: &RejectionEvent) -> Result<(), LedgerError> {
        self.events.push(event.clone());
        Ok(())
    }

    fn events(&self) -> Result<Vec<RejectionEvent>, LedgerError> {
        Ok(self.events.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UNREGISTERED;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    #[test]
    fn test_csv_rejection_log_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("registros/intentos_no_aut.csv");
        let at = NaiveDate::from_ymd_opt(2025, 3, 9)
            .unwrap()
            .and_hms_opt(22, 15, 1)
            .unwrap();

        let mut log = CsvRejectionLog::new(&path);
        log.record(&RejectionEvent {
            identity: UNREGISTERED.into(),
            reason: RejectReason::UnknownToRoster,
            timestamp: Some(at),
        })
        .unwrap();
        log.record(&RejectionEvent {
            identity: "Bob".into(),
            reason: RejectReason::KnownUnauthorized,
            timestamp: Some(at),
        })
        .unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text.lines().collect::<Vec<_>>(),
            vec![
                "Nombre,Motivo,Hora_Fecha",
                "unregistered,desconocido,22:15:01 del 09-03-2025",
                "Bob,no_autorizado,22:15:01 del 09-03-2025",
            ]
        );

        let events = log.events().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].reason, RejectReason::KnownUnauthorized);
        assert_eq!(events[1].timestamp, Some(at));
    }

    #[test]
    fn test_missing_rejection_log_is_empty() {
        let dir = TempDir::new().unwrap();
        let log = CsvRejectionLog::new(dir.path().join("none.csv"));
        assert!(log.events().unwrap().is_empty());
    }
}
