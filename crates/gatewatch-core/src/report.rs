//! Read-only aggregate views over the access ledger.

use crate::ledger::{AccessLedger, CsvLedger, LedgerError};
use crate::timestamp::format_minutes;
use crate::types::{AccessEvent, Action};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonCount {
    pub identity: String,
    pub entries: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonStay {
    pub identity: String,
    pub mean_minutes: f64,
    pub visits: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub entries: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Report {
    /// Most entries first; ties by identity.
    pub entries_per_person: Vec<PersonCount>,
    /// Longest mean stay first.
    pub mean_stay: Vec<PersonStay>,
    /// Oldest day first.
    pub daily_entries: Vec<DailyCount>,
}

/// Either a report or an informational message explaining why there is none.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportOutcome {
    NoData { message: String },
    Report(Report),
}

impl Report {
    /// Aggregate `events`. Rows without a parsable timestamp are dropped.
    pub fn from_events(events: &[AccessEvent]) -> Self {
        let dated = events.iter().filter(|e| e.timestamp.is_some());

        let mut per_person: HashMap<&str, usize> = HashMap::new();
        let mut stays: HashMap<&str, (f64, usize)> = HashMap::new();
        let mut per_day: BTreeMap<NaiveDate, usize> = BTreeMap::new();

        for event in dated {
            match event.action {
                Action::Entry => {
                    *per_person.entry(event.identity.as_str()).or_default() += 1;
                    if let Some(ts) = event.timestamp {
                        *per_day.entry(ts.date()).or_default() += 1;
                    }
                }
                Action::Exit => {
                    if let Some(minutes) = event.duration_minutes {
                        let slot = stays.entry(event.identity.as_str()).or_default();
                        slot.0 += minutes;
                        slot.1 += 1;
                    }
                }
            }
        }

        let mut entries_per_person: Vec<PersonCount> = per_person
            .into_iter()
            .map(|(identity, entries)| PersonCount {
                identity: identity.to_string(),
                entries,
            })
            .collect();
        entries_per_person.sort_by(|a, b| {
            b.entries
                .cmp(&a.entries)
                .then_with(|| a.identity.cmp(&b.identity))
        });

        let mut mean_stay: Vec<PersonStay> = stays
            .into_iter()
            .map(|(identity, (total, visits))| PersonStay {
                identity: identity.to_string(),
                mean_minutes: total / visits as f64,
                visits,
            })
            .collect();
        mean_stay.sort_by(|a, b| {
            b.mean_minutes
                .total_cmp(&a.mean_minutes)
                .then_with(|| a.identity.cmp(&b.identity))
        });

        let daily_entries = per_day
            .into_iter()
            .map(|(date, entries)| DailyCount { date, entries })
            .collect();

        Self {
            entries_per_person,
            mean_stay,
            daily_entries,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries_per_person.is_empty() && self.mean_stay.is_empty()
    }

    /// Plain-text tables for terminal output.
    pub fn render_text(&self) -> String {
        let mut out = String::new();

        out.push_str("Entries per person\n");
        if self.entries_per_person.is_empty() {
            out.push_str("  (no entries)\n");
        }
        for row in &self.entries_per_person {
            let _ = writeln!(out, "  {:<24} {:>6}", row.identity, row.entries);
        }

        out.push_str("\nMean stay (min)\n");
        if self.mean_stay.is_empty() {
            out.push_str("  (no exits with duration)\n");
        }
        for row in &self.mean_stay {
            let _ = writeln!(
                out,
                "  {:<24} {:>8} ({} visits)",
                row.identity,
                format_minutes(row.mean_minutes),
                row.visits
            );
        }

        out.push_str("\nDaily entries\n");
        if self.daily_entries.is_empty() {
            out.push_str("  (no dated entries)\n");
        }
        for row in &self.daily_entries {
            let _ = writeln!(out, "  {}  {:>6}", row.date, row.entries);
        }

        out
    }
}

/// Build a report from the ledger file at `path` without modifying it.
pub fn report_from_path(path: &Path) -> Result<ReportOutcome, LedgerError> {
    if !path.exists() {
        return Ok(ReportOutcome::NoData {
            message: format!("ledger {} does not exist", path.display()),
        });
    }

    let events = CsvLedger::new(path).events()?;
    let report = Report::from_events(&events);
    if report.is_empty() {
        return Ok(ReportOutcome::NoData {
            message: "no access data to report".to_string(),
        });
    }
    Ok(ReportOutcome::Report(report))
}
