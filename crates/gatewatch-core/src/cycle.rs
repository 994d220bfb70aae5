//! One detection/decision cycle: resolve every detected face, then apply the
//! pending operator intent to at most one of them.

use crate::authorization::{authorize, Context, Decision, Request};
use crate::ledger::LedgerError;
use crate::matcher::{Encoding, MatchResult, Resolver};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Tri-state operator signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    #[default]
    None,
    Entry,
    Exit,
}

impl Intent {
    pub fn request(self) -> Option<Request> {
        match self {
            Intent::None => None,
            Intent::Entry => Some(Request::Entry),
            Intent::Exit => Some(Request::Exit),
        }
    }
}

impl FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Intent::None),
            "entry" | "ingreso" => Ok(Intent::Entry),
            "exit" | "egreso" => Ok(Intent::Exit),
            other => Err(format!("unknown intent {other:?} (expected none, entry or exit)")),
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Intent::None => "none",
            Intent::Entry => "entry",
            Intent::Exit => "exit",
        })
    }
}

/// Pending operator intent, consumed by the first cycle that applies it.
#[derive(Debug, Default)]
pub struct IntentSignal {
    pending: Intent,
}

impl IntentSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, intent: Intent) {
        self.pending = intent;
    }

    pub fn pending(&self) -> Intent {
        self.pending
    }

    /// Return the pending intent and reset it to [`Intent::None`].
    pub fn take(&mut self) -> Intent {
        std::mem::take(&mut self.pending)
    }
}

/// Outcome for one face in a cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceOutcome {
    #[serde(rename = "match")]
    pub resolved: MatchResult,
    /// `None` when no intent was applied to this face.
    pub decision: Option<Decision>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleOutcome {
    pub faces: Vec<FaceOutcome>,
}

impl CycleOutcome {
    pub fn decision(&self) -> Option<&Decision> {
        self.faces.iter().find_map(|f| f.decision.as_ref())
    }
}

/// Resolve `probes` and run one cycle over the results.
pub fn run_cycle(
    ctx: &mut Context<'_>,
    resolver: &dyn Resolver,
    probes: &[Encoding],
    intent: &mut IntentSignal,
) -> Result<CycleOutcome, LedgerError> {
    let resolved: Vec<MatchResult> = probes.iter().map(|p| resolver.resolve(p)).collect();
    apply_cycle(ctx, resolved, intent)
}

/// Apply the pending intent to already-resolved faces.
///
/// The intent goes to the first matched face, or to the first face when none
/// matched. It is reset only after the decision is durably recorded, so an
/// empty cycle or a persistence failure leaves it pending. Faces that receive
/// no intent write nothing.
pub fn apply_cycle(
    ctx: &mut Context<'_>,
    resolved: Vec<MatchResult>,
    intent: &mut IntentSignal,
) -> Result<CycleOutcome, LedgerError> {
    let target = resolved
        .iter()
        .position(MatchResult::is_match)
        .or(if resolved.is_empty() { None } else { Some(0) });

    let mut faces: Vec<FaceOutcome> = resolved
        .into_iter()
        .map(|resolved| FaceOutcome {
            resolved,
            decision: None,
        })
        .collect();

    for face in &faces {
        if let Some(identity) = face.resolved.identity.as_deref() {
            tracing::debug!(identity, distance = face.resolved.distance, "face recognized");
        }
    }

    if let (Some(idx), Some(request)) = (target, intent.pending().request()) {
        let decision = authorize(ctx, &faces[idx].resolved, request)?;
        intent.take();
        faces[idx].decision = Some(decision);
    }

    Ok(CycleOutcome { faces })
}
