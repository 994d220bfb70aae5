use gatewatch_core::matcher::{load_gallery, GalleryError};
use gatewatch_core::{
    apply_cycle, run_cycle, AccessLedger, Config, Context, CsvLedger, CsvRejectionLog,
    CycleOutcome, DistanceMatcher, Encoding, Intent, IntentSignal, LedgerError, MatchResult,
    Roster, RosterError, SessionState, SystemClock,
};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("roster error: {0}")]
    Roster(#[from] RosterError),
    #[error("gallery error: {0}")]
    Gallery(#[from] GalleryError),
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Snapshot returned by [`EngineHandle::info`].
#[derive(Debug, Clone, Serialize)]
pub struct EngineInfo {
    pub roster_entries: usize,
    pub gallery_entries: usize,
    pub match_threshold: f32,
    pub pending_intent: Intent,
    pub ledger_path: String,
    pub rejections_path: String,
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    SetIntent {
        intent: Intent,
        reply: oneshot::Sender<Intent>,
    },
    Submit {
        probes: Vec<Encoding>,
        reply: oneshot::Sender<Result<CycleOutcome, EngineError>>,
    },
    SubmitMatch {
        candidate: String,
        distance: f32,
        reply: oneshot::Sender<Result<CycleOutcome, EngineError>>,
    },
    State {
        identity: String,
        reply: oneshot::Sender<Result<SessionState, EngineError>>,
    },
    Info {
        reply: oneshot::Sender<EngineInfo>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Replace the pending operator intent. Returns the intent it replaced.
    pub async fn set_intent(&self, intent: Intent) -> Result<Intent, EngineError> {
        self.call(|reply| EngineRequest::SetIntent { intent, reply }).await
    }

    /// Run one cycle over raw face encodings.
    pub async fn submit(&self, probes: Vec<Encoding>) -> Result<CycleOutcome, EngineError> {
        self.call(|reply| EngineRequest::Submit { probes, reply }).await?
    }

    /// Run one cycle over a single candidate resolved by an external matcher.
    pub async fn submit_match(
        &self,
        candidate: String,
        distance: f32,
    ) -> Result<CycleOutcome, EngineError> {
        self.call(|reply| EngineRequest::SubmitMatch {
            candidate,
            distance,
            reply,
        })
        .await?
    }

    pub async fn state(&self, identity: String) -> Result<SessionState, EngineError> {
        self.call(|reply| EngineRequest::State { identity, reply }).await?
    }

    pub async fn info(&self) -> Result<EngineInfo, EngineError> {
        self.call(|reply| EngineRequest::Info { reply }).await
    }
}

/// State owned exclusively by the engine thread.
struct Engine {
    roster: Roster,
    matcher: DistanceMatcher,
    ledger: CsvLedger,
    rejections: CsvRejectionLog,
    clock: SystemClock,
    intent: IntentSignal,
}

impl Engine {
    fn context(&mut self) -> (Context<'_>, &DistanceMatcher, &mut IntentSignal) {
        (
            Context {
                roster: &self.roster,
                ledger: &mut self.ledger,
                rejections: &mut self.rejections,
                clock: &self.clock,
            },
            &self.matcher,
            &mut self.intent,
        )
    }

    fn submit(&mut self, probes: &[Encoding]) -> Result<CycleOutcome, EngineError> {
        let (mut ctx, matcher, intent) = self.context();
        let outcome = run_cycle(&mut ctx, matcher, probes, intent)?;
        log_outcome(&outcome);
        Ok(outcome)
    }

    fn submit_match(&mut self, candidate: &str, distance: f32) -> Result<CycleOutcome, EngineError> {
        let resolved = MatchResult::from_candidate(Some(candidate), distance, self.matcher.threshold());
        let (mut ctx, _, intent) = self.context();
        let outcome = apply_cycle(&mut ctx, vec![resolved], intent)?;
        log_outcome(&outcome);
        Ok(outcome)
    }

    fn info(&self) -> EngineInfo {
        EngineInfo {
            roster_entries: self.roster.len(),
            gallery_entries: self.matcher.len(),
            match_threshold: self.matcher.threshold(),
            pending_intent: self.intent.pending(),
            ledger_path: self.ledger.path().display().to_string(),
            rejections_path: self.rejections.path().display().to_string(),
        }
    }
}

fn log_outcome(outcome: &CycleOutcome) {
    tracing::debug!(faces = outcome.faces.len(), "cycle complete");
    if let Some(decision) = outcome.decision() {
        tracing::info!(%decision, "decision");
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Loads the roster and gallery synchronously so a bad roster stops startup.
/// The thread serves one request at a time: each decision is fully persisted
/// before the next request is read.
pub fn spawn_engine(config: &Config) -> Result<EngineHandle, EngineError> {
    let roster = Roster::load(&config.roster_path)?;
    tracing::info!(path = %config.roster_path.display(), entries = roster.len(), "roster ready");

    let gallery = load_gallery(&config.gallery_path)?;
    let matcher = DistanceMatcher::new(gallery, config.match_threshold);
    tracing::info!(
        entries = matcher.len(),
        threshold = config.match_threshold,
        "matcher ready"
    );

    let ledger = CsvLedger::new(&config.ledger_path);
    // Surface an unreadable ledger now rather than on the first exit.
    let existing = ledger.events()?.len();
    tracing::info!(path = %ledger.path().display(), events = existing, "ledger opened");

    let rejections = CsvRejectionLog::new(&config.rejections_path);

    let mut engine = Engine {
        roster,
        matcher,
        ledger,
        rejections,
        clock: SystemClock,
        intent: IntentSignal::new(),
    };

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(16);

    std::thread::Builder::new()
        .name("gatewatch-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::SetIntent { intent, reply } => {
                        let previous = engine.intent.pending();
                        engine.intent.set(intent);
                        tracing::info!(%intent, %previous, "operator intent set");
                        let _ = reply.send(previous);
                    }
                    EngineRequest::Submit { probes, reply } => {
                        let result = engine.submit(&probes);
                        if let Err(err) = &result {
                            tracing::error!(error = %err, "cycle failed; intent kept pending");
                        }
                        let _ = reply.send(result);
                    }
                    EngineRequest::SubmitMatch {
                        candidate,
                        distance,
                        reply,
                    } => {
                        let result = engine.submit_match(&candidate, distance);
                        if let Err(err) = &result {
                            tracing::error!(error = %err, "cycle failed; intent kept pending");
                        }
                        let _ = reply.send(result);
                    }
                    EngineRequest::State { identity, reply } => {
                        let result = engine
                            .ledger
                            .session_state(&identity)
                            .map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                    EngineRequest::Info { reply } => {
                        let _ = reply.send(engine.info());
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatewatch_core::Decision;
    use std::path::Path;
    use tempfile::TempDir;

    fn config(dir: &Path) -> Config {
        std::fs::write(dir.join("roster.csv"), "Nombre,Rol,Permiso\nAna,ops,SI\n").unwrap();
        std::fs::write(
            dir.join("gallery.json"),
            r#"[{"identity":"Ana","encoding":[0.0,0.0]}]"#,
        )
        .unwrap();
        let data_dir = dir.to_str().unwrap().to_string();
        Config::from_lookup(move |key| match key {
            "GATEWATCH_DATA_DIR" => Some(data_dir.clone()),
            _ => None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_engine_serves_entry_cycle() {
        let dir = TempDir::new().unwrap();
        let engine = spawn_engine(&config(dir.path())).unwrap();

        assert_eq!(engine.set_intent(Intent::Entry).await.unwrap(), Intent::None);
        let outcome = engine
            .submit(vec![Encoding::new(vec![0.1, 0.0])])
            .await
            .unwrap();
        assert!(matches!(outcome.decision(), Some(Decision::Entered { .. })));

        let state = engine.state("Ana".into()).await.unwrap();
        assert!(matches!(state, SessionState::Inside { .. }));
        assert_eq!(engine.info().await.unwrap().pending_intent, Intent::None);
    }

    #[tokio::test]
    async fn test_submit_match_applies_threshold() {
        let dir = TempDir::new().unwrap();
        let engine = spawn_engine(&config(dir.path())).unwrap();

        engine.set_intent(Intent::Entry).await.unwrap();
        let outcome = engine.submit_match("Ana".into(), 0.6).await.unwrap();
        assert!(!outcome.faces[0].resolved.is_match());
        assert!(outcome.decision().is_some_and(|d| !d.is_accepted()));
    }

    #[test]
    fn test_malformed_roster_fails_startup() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path());
        std::fs::write(&config.roster_path, "Nombre\nAna\n").unwrap();
        assert!(matches!(spawn_engine(&config), Err(EngineError::Roster(_))));
    }
}
