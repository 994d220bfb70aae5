//! Roster of known people and their access permission.
//!
//! Loaded once at startup from a CSV file with the columns
//! `Nombre,Rol,Permiso` (permission is `SI` or `NO`). Later edits to the file
//! are not observed by a running process.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

const IDENTITY_COLUMN: &[&str] = &["Nombre", "identity"];
const ROLE_COLUMN: &[&str] = &["Rol", "role"];
const PERMISSION_COLUMN: &[&str] = &["Permiso", "permission"];

/// Row synthesized when no roster file exists.
const DEFAULT_IDENTITY: &str = "admin";
const DEFAULT_ROLE: &str = "Administrador";

#[derive(Error, Debug)]
pub enum RosterError {
    #[error("roster {path} is missing required column {column}")]
    Malformed { path: String, column: &'static str },
    #[error("roster I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("roster csv: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterEntry {
    pub identity: String,
    /// Opaque label, not interpreted by the engine.
    pub role: String,
    pub permission: bool,
}

/// Immutable identity → permission snapshot.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    entries: BTreeMap<String, RosterEntry>,
}

impl Roster {
    /// Build a roster from entries. The first entry for an identity wins.
    pub fn from_entries(entries: impl IntoIterator<Item = RosterEntry>) -> Self {
        let mut map = BTreeMap::new();
        for entry in entries {
            if map.contains_key(&entry.identity) {
                tracing::warn!(identity = %entry.identity, "duplicate roster identity; keeping first row");
                continue;
            }
            map.insert(entry.identity.clone(), entry);
        }
        Self { entries: map }
    }

    /// Load the roster, synthesizing a single-administrator file if none exists.
    pub fn load(path: &Path) -> Result<Self, RosterError> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "roster not found; creating default administrator entry");
            return write_default(path);
        }

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_path(path)?;

        let headers = reader.headers()?.clone();
        let column = |names: &'static [&'static str]| -> Result<usize, RosterError> {
            headers
                .iter()
                .position(|h| names.iter().any(|n| h.eq_ignore_ascii_case(n)))
                .ok_or(RosterError::Malformed {
                    path: path.display().to_string(),
                    column: names[0],
                })
        };
        let id_col = column(IDENTITY_COLUMN)?;
        let role_col = column(ROLE_COLUMN)?;
        let perm_col = column(PERMISSION_COLUMN)?;

        let mut entries = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record?;
            let identity = record.get(id_col).unwrap_or_default();
            if identity.is_empty() {
                tracing::warn!(line = line + 2, "roster row without identity; skipped");
                continue;
            }
            let role = record.get(role_col).unwrap_or_default();
            let raw_permission = record.get(perm_col).unwrap_or_default();
            entries.push(RosterEntry {
                identity: identity.to_string(),
                role: role.to_string(),
                permission: parse_permission(identity, raw_permission),
            });
        }

        let roster = Self::from_entries(entries);
        tracing::info!(path = %path.display(), entries = roster.len(), "roster loaded");
        Ok(roster)
    }

    /// Permission for `identity`, or `None` if the roster has no such row.
    pub fn permission(&self, identity: &str) -> Option<bool> {
        self.entries.get(identity).map(|e| e.permission)
    }

    pub fn get(&self, identity: &str) -> Option<&RosterEntry> {
        self.entries.get(identity)
    }

    pub fn entries(&self) -> impl Iterator<Item = &RosterEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_permission(identity: &str, raw: &str) -> bool {
    if raw.eq_ignore_ascii_case("SI") {
        true
    } else if raw.eq_ignore_ascii_case("NO") {
        false
    } else {
        tracing::warn!(identity, value = raw, "unrecognized permission value; treating as NO");
        false
    }
}

fn write_default(path: &Path) -> Result<Roster, RosterError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_path(path)?;
    writer.write_record(["Nombre", "Rol", "Permiso"])?;
    writer.write_record([DEFAULT_IDENTITY, DEFAULT_ROLE, "SI"])?;
    writer.flush()?;

    Ok(Roster::from_entries([RosterEntry {
        identity: DEFAULT_IDENTITY.to_string(),
        role: DEFAULT_ROLE.to_string(),
        permission: true,
    }]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_parses_permissions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("roster.csv");
        std::fs::write(
            &path,
            "Nombre,Rol,Permiso\nAna,Operadora,SI\nBob,Visita,NO\nCarla,Tecnica, si \n",
        )
        .unwrap();

        let roster = Roster::load(&path).unwrap();
        assert_eq!(roster.len(), 3);
        assert_eq!(roster.permission("Ana"), Some(true));
        assert_eq!(roster.permission("Bob"), Some(false));
        assert_eq!(roster.permission("Carla"), Some(true));
        assert_eq!(roster.permission("Dan"), None);
        assert_eq!(roster.get("Ana").unwrap().role, "Operadora");
    }

    #[test]
    fn test_missing_file_synthesizes_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/roster.csv");

        let roster = Roster::load(&path).unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster.permission("admin"), Some(true));

        // The synthesized file loads back identically.
        let reloaded = Roster::load(&path).unwrap();
        assert_eq!(reloaded.get("admin"), roster.get("admin"));
    }

    #[test]
    fn test_missing_column_is_malformed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("roster.csv");
        std::fs::write(&path, "Nombre,Rol\nAna,Operadora\n").unwrap();

        let err = Roster::load(&path).unwrap_err();
        assert!(matches!(err, RosterError::Malformed { column: "Permiso", .. }));
    }

    #[test]
    fn test_unknown_permission_is_denied() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("roster.csv");
        std::fs::write(&path, "Nombre,Rol,Permiso\nAna,Operadora,maybe\n").unwrap();

        let roster = Roster::load(&path).unwrap();
        assert_eq!(roster.permission("Ana"), Some(false));
    }

    #[test]
    fn test_duplicate_identity_keeps_first() {
        let roster = Roster::from_entries([
            RosterEntry { identity: "Ana".into(), role: "a".into(), permission: true },
            RosterEntry { identity: "Ana".into(), role: "b".into(), permission: false },
        ]);
        assert_eq!(roster.len(), 1);
        assert_eq!(roster.permission("Ana"), Some(true));
    }

    #[test]
    fn test_english_headers_accepted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("roster.csv");
        std::fs::write(&path, "identity,role,permission\nAna,ops,SI\n").unwrap();

        let roster = Roster::load(&path).unwrap();
        assert_eq!(roster.permission("Ana"), Some(true));
    }
}
