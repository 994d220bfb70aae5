//! gatewatch-core: facility access ledger and session authorization.
//!
//! Resolves faces against a gallery, checks the roster, and records entries,
//! exits and rejections in append-only CSV logs. Who is inside is always
//! derived from the ledger, never cached.

pub mod authorization;
pub mod config;
pub mod cycle;
pub mod ledger;
pub mod matcher;
pub mod rejections;
pub mod report;
pub mod roster;
pub mod timestamp;
pub mod types;

pub use authorization::{authorize, Context, Decision, Request};
pub use config::{Config, ConfigError};
pub use cycle::{apply_cycle, run_cycle, CycleOutcome, FaceOutcome, Intent, IntentSignal};
pub use ledger::{AccessLedger, CsvLedger, ExitOutcome, History, LedgerError, MemoryLedger};
pub use matcher::{DistanceMatcher, Encoding, GalleryEntry, MatchResult, Resolver};
pub use rejections::{CsvRejectionLog, MemoryRejectionLog, RejectionLog};
pub use roster::{Roster, RosterEntry, RosterError};
pub use timestamp::{Clock, FixedClock, SystemClock};
pub use types::{AccessEvent, Action, RejectReason, RejectionEvent, SessionState, UNREGISTERED};
