//! Append-only access ledger.
//!
//! The ledger is the only source of truth for who is inside. Session state is
//! never cached: every query folds over the stored events again, so a restart
//! or a skipped cycle cannot desynchronize it from disk.
//!
//! # On-disk format
//!
//! CSV with header `Nombre,Accion,Hora_Fecha,Duracion_min`. `Accion` is
//! `ingreso` or `egreso`, `Hora_Fecha` uses [`TIMESTAMP_FORMAT`], and
//! `Duracion_min` is empty on entries and a two-decimal number on exits.
//!
//! Every append is flushed and fsynced before the call returns.
//!
//! [`TIMESTAMP_FORMAT`]: crate::timestamp::TIMESTAMP_FORMAT

use crate::timestamp::{duration_minutes, format_minutes, format_timestamp, parse_timestamp};
use crate::types::{AccessEvent, Action, SessionState};
use chrono::NaiveDateTime;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const LEDGER_HEADER: [&str; 4] = ["Nombre", "Accion", "Hora_Fecha", "Duracion_min"];

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("ledger csv: {0}")]
    Csv(#[from] csv::Error),
}

/// Result of an exit request against the ledger.
#[derive(Debug, Clone, PartialEq)]
pub enum ExitOutcome {
    /// An open entry existed; the appended exit record.
    Closed(AccessEvent),
    /// Nothing was appended.
    NoOpenEntry,
}

/// Timestamp of the open entry for `identity`, if any.
///
/// Takes the latest entry and the latest exit, ordered by timestamp with
/// ledger position breaking ties, and reports the entry only if no exit
/// follows it. Older exits are ignored. Events without a parsable timestamp
/// are skipped.
pub fn open_entry<'a, I>(events: I, identity: &str) -> Option<NaiveDateTime>
where
    I: IntoIterator<Item = &'a AccessEvent>,
{
    let mut last_entry: Option<(NaiveDateTime, usize)> = None;
    let mut last_exit: Option<(NaiveDateTime, usize)> = None;

    for (pos, event) in events.into_iter().enumerate() {
        if event.identity != identity {
            continue;
        }
        let Some(ts) = event.timestamp else {
            continue;
        };
        let slot = match event.action {
            Action::Entry => &mut last_entry,
            Action::Exit => &mut last_exit,
        };
        if slot.map_or(true, |prev| (ts, pos) > prev) {
            *slot = Some((ts, pos));
        }
    }

    match (last_entry, last_exit) {
        (Some(entry), Some(exit)) if exit > entry => None,
        (Some((ts, _)), _) => Some(ts),
        (None, _) => None,
    }
}

/// Latest timestamp among `identity`'s events.
fn latest_timestamp<'a, I>(events: I, identity: &str) -> Option<NaiveDateTime>
where
    I: IntoIterator<Item = &'a AccessEvent>,
{
    events
        .into_iter()
        .filter(|e| e.identity == identity)
        .filter_map(|e| e.timestamp)
        .max()
}

/// Snapshot of the ledger restricted to one identity.
///
/// [`History::iter`] can be called any number of times; each call walks the
/// snapshot from the start in ledger order.
#[derive(Debug, Clone)]
pub struct History {
    identity: String,
    events: Vec<AccessEvent>,
}

impl History {
    pub fn new(identity: &str, events: Vec<AccessEvent>) -> Self {
        Self {
            identity: identity.to_string(),
            events,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn iter(&self) -> impl Iterator<Item = &AccessEvent> + '_ {
        self.events
            .iter()
            .filter(move |e| e.identity == self.identity)
    }
}

/// Durable, append-only store of access events.
///
/// Implementors provide raw `events` and `append`; the session queries are
/// derived from them. `&mut self` on writes keeps a single writer per store.
pub trait AccessLedger {
    /// All events in ledger order.
    fn events(&self) -> Result<Vec<AccessEvent>, LedgerError>;

    /// Persist one event. Must be durable when this returns `Ok`.
    fn append(&mut self, event: &AccessEvent) -> Result<(), LedgerError>;

    /// Record an entry. The stamp never precedes the identity's latest event,
    /// so a clock stepping backwards cannot reorder its session.
    fn append_entry(&mut self, identity: &str, at: NaiveDateTime) -> Result<AccessEvent, LedgerError> {
        let at = latest_timestamp(&self.events()?, identity).map_or(at, |latest| at.max(latest));
        let event = AccessEvent::entry(identity, at);
        self.append(&event)?;
        Ok(event)
    }

    /// Close the open entry for `identity`, if there is one.
    ///
    /// Stamped no earlier than the identity's latest event, so the exit
    /// always sorts after the entry it closes.
    fn append_exit(&mut self, identity: &str, at: NaiveDateTime) -> Result<ExitOutcome, LedgerError> {
        let events = self.events()?;
        let Some(entered) = open_entry(&events, identity) else {
            return Ok(ExitOutcome::NoOpenEntry);
        };
        let at = latest_timestamp(&events, identity).map_or(at, |latest| at.max(latest));
        let event = AccessEvent::exit(identity, at, duration_minutes(entered, at));
        self.append(&event)?;
        Ok(ExitOutcome::Closed(event))
    }

    fn last_open_entry(&self, identity: &str) -> Result<Option<NaiveDateTime>, LedgerError> {
        Ok(open_entry(&self.events()?, identity))
    }

    fn session_state(&self, identity: &str) -> Result<SessionState, LedgerError> {
        Ok(match self.last_open_entry(identity)? {
            Some(since) => SessionState::Inside { since },
            None => SessionState::Outside,
        })
    }

    fn query_by_identity(&self, identity: &str) -> Result<History, LedgerError> {
        Ok(History::new(identity, self.events()?))
    }
}

/// CSV-file ledger. Reads always go back to disk.
#[derive(Debug, Clone)]
pub struct CsvLedger {
    path: PathBuf,
}

impl CsvLedger {
    /// Does not touch the filesystem; the file is created on first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AccessLedger for CsvLedger {
    fn events(&self) -> Result<Vec<AccessEvent>, LedgerError> {
        let rows = read_rows(&self.path)?;
        Ok(rows
            .into_iter()
            .filter_map(|(line, record)| {
                let event = parse_event(&record);
                if event.is_none() {
                    tracing::warn!(path = %self.path.display(), line, "unreadable ledger row; skipped");
                }
                event
            })
            .collect())
    }

    fn append(&mut self, event: &AccessEvent) -> Result<(), LedgerError> {
        let timestamp = event
            .timestamp
            .as_ref()
            .map(format_timestamp)
            .unwrap_or_default();
        let duration = event
            .duration_minutes
            .map(format_minutes)
            .unwrap_or_default();
        append_row(
            &self.path,
            &LEDGER_HEADER,
            &[
                event.identity.as_str(),
                event.action.as_str(),
                timestamp.as_str(),
                duration.as_str(),
            ],
        )
    }
}

fn parse_event(record: &csv::StringRecord) -> Option<AccessEvent> {
    let identity = record.get(0)?.trim();
    if identity.is_empty() {
        return None;
    }
    let action = Action::parse(record.get(1)?)?;
    let timestamp = record.get(2).and_then(parse_timestamp);
    let duration_minutes = record
        .get(3)
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite());

    Some(AccessEvent {
        identity: identity.to_string(),
        action,
        timestamp,
        duration_minutes,
    })
}

/// Read every data row of a CSV log, paired with its 1-based file line.
///
/// A missing file reads as empty. Rows the CSV parser rejects are skipped;
/// I/O failures are returned.
pub(crate) fn read_rows(path: &Path) -> Result<Vec<(u64, csv::StringRecord)>, LedgerError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        match record {
            Ok(record) => {
                let line = record.position().map(|p| p.line()).unwrap_or_default();
                rows.push((line, record));
            }
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "malformed csv row; skipped");
            }
        }
    }
    Ok(rows)
}

/// Append one row, writing `header` first if the file is new or empty,
/// then fsync.
pub(crate) fn append_row(path: &Path, header: &[&str], row: &[&str]) -> Result<(), LedgerError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let is_new = file.metadata()?.len() == 0;

    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(&file);
        if is_new {
            writer.write_record(header)?;
        }
        writer.write_record(row)?;
        writer.flush()?;
    }

    file.sync_all()?;
    Ok(())
}

/// In-memory ledger with the same contract as [`CsvLedger`].
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    events: Vec<AccessEvent>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_events(events: Vec<AccessEvent>) -> Self {
        Self { events }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl AccessLedger for MemoryLedger {
    fn events(&self) -> Result<Vec<AccessEvent>, LedgerError> {
        Ok(self.events.clone())
    }

    fn append(&mut self, event: &AccessEvent) -> Result<(), LedgerError> {
        self.events.push(event.clone());
        Ok(())
    }
}
