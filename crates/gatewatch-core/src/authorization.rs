//! Session authorization engine.
//!
//! Turns a resolved face plus an operator request into exactly one outcome:
//! an entry, an exit with its stay duration, or a rejection. Inside/outside
//! state is recomputed from the ledger on every call.
//!
//! Re-entry while already inside is accepted; the newest entry is the one a
//! later exit closes.

use crate::ledger::{AccessLedger, ExitOutcome, LedgerError};
use crate::matcher::MatchResult;
use crate::rejections::RejectionLog;
use crate::roster::Roster;
use crate::timestamp::{format_minutes, format_timestamp, Clock};
use crate::types::{AccessEvent, RejectReason, RejectionEvent, UNREGISTERED};
use serde::Serialize;
use std::fmt;

/// Operator-requested direction for one decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Request {
    Entry,
    Exit,
}

/// Everything the engine reads and writes, passed in explicitly.
pub struct Context<'a> {
    pub roster: &'a Roster,
    pub ledger: &'a mut dyn AccessLedger,
    pub rejections: &'a mut dyn RejectionLog,
    pub clock: &'a dyn Clock,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "lowercase")]
pub enum Decision {
    Entered { event: AccessEvent },
    Exited { event: AccessEvent },
    Rejected { rejection: RejectionEvent },
}

impl Decision {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Decision::Rejected { .. })
    }

    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            Decision::Rejected { rejection } => Some(rejection.reason),
            _ => None,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let when = |ts: &Option<chrono::NaiveDateTime>| {
            ts.as_ref().map(format_timestamp).unwrap_or_default()
        };
        match self {
            Decision::Entered { event } => {
                write!(f, "entry granted to {} at {}", event.identity, when(&event.timestamp))
            }
            Decision::Exited { event } => write!(
                f,
                "exit recorded for {} at {} after {} min",
                event.identity,
                when(&event.timestamp),
                format_minutes(event.duration_minutes.unwrap_or_default())
            ),
            Decision::Rejected { rejection } => write!(
                f,
                "access denied for {}: {}",
                rejection.identity, rejection.reason
            ),
        }
    }
}

/// Decide a single request for a resolved face.
///
/// Persistence failures are returned as errors and leave both logs as they
/// were; every other input yields a [`Decision`].
pub fn authorize(
    ctx: &mut Context<'_>,
    resolved: &MatchResult,
    request: Request,
) -> Result<Decision, LedgerError> {
    let now = ctx.clock.now();

    let Some(identity) = resolved.identity.as_deref() else {
        return reject(ctx, UNREGISTERED, RejectReason::UnknownToRoster, resolved);
    };

    if ctx.roster.permission(identity) != Some(true) {
        return reject(ctx, identity, RejectReason::KnownUnauthorized, resolved);
    }

    match request {
        Request::Entry => {
            let event = ctx.ledger.append_entry(identity, now)?;
            tracing::info!(
                identity,
                action = %event.action,
                distance = resolved.distance,
                "entry granted"
            );
            Ok(Decision::Entered { event })
        }
        Request::Exit => match ctx.ledger.append_exit(identity, now)? {
            ExitOutcome::Closed(event) => {
                tracing::info!(
                    identity,
                    action = %event.action,
                    duration_minutes = event.duration_minutes,
                    distance = resolved.distance,
                    "exit recorded"
                );
                Ok(Decision::Exited { event })
            }
            ExitOutcome::NoOpenEntry => {
                reject(ctx, identity, RejectReason::ExitWithoutOpenEntry, resolved)
            }
        },
    }
}

fn reject(
    ctx: &mut Context<'_>,
    identity: &str,
    reason: RejectReason,
    resolved: &MatchResult,
) -> Result<Decision, LedgerError> {
    let rejection = RejectionEvent {
        identity: identity.to_string(),
        reason,
        timestamp: Some(ctx.clock.now()),
    };
    ctx.rejections.record(&rejection)?;
    tracing::warn!(
        identity,
        reason = reason.as_str(),
        distance = resolved.distance,
        "access rejected"
    );
    Ok(Decision::Rejected { rejection })
}
