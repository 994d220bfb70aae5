use chrono::{Duration, NaiveDate};
use gatewatch_core::report::{report_from_path, ReportOutcome};
use gatewatch_core::{
    run_cycle, AccessLedger, Action, Context, CsvLedger, CsvRejectionLog, Decision,
    DistanceMatcher, Encoding, FixedClock, GalleryEntry, Intent, IntentSignal, RejectReason,
    RejectionLog, Roster, SessionState, UNREGISTERED,
};
use tempfile::TempDir;

struct Site {
    _dir: TempDir,
    roster: Roster,
    ledger: CsvLedger,
    rejections: CsvRejectionLog,
    matcher: DistanceMatcher,
    clock: FixedClock,
    intent: IntentSignal,
}

// Encodings sit on one axis so distances are easy to read: a probe at `x`
// is `|x - stored|` away from each gallery entry.
fn probe(x: f32) -> Encoding {
    Encoding::new(vec![x, 0.0])
}

impl Site {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let roster_path = dir.path().join("roster.csv");
        std::fs::write(
            &roster_path,
            "Nombre,Rol,Permiso\nAna,Operadora,SI\nBob,Visita,NO\n",
        )
        .unwrap();

        let gallery = vec![
            GalleryEntry { identity: "Ana".into(), encoding: probe(0.0) },
            GalleryEntry { identity: "Bob".into(), encoding: probe(10.0) },
        ];

        Self {
            roster: Roster::load(&roster_path).unwrap(),
            ledger: CsvLedger::new(dir.path().join("registros/accesos_autorizados.csv")),
            rejections: CsvRejectionLog::new(dir.path().join("registros/intentos_no_aut.csv")),
            matcher: DistanceMatcher::new(gallery, 0.6),
            clock: FixedClock::new(
                NaiveDate::from_ymd_opt(2025, 3, 9)
                    .unwrap()
                    .and_hms_opt(7, 30, 0)
                    .unwrap(),
            ),
            intent: IntentSignal::new(),
            _dir: dir,
        }
    }

    fn cycle(&mut self, intent: Intent, faces: &[Encoding]) -> Option<Decision> {
        self.intent.set(intent);
        let mut ctx = Context {
            roster: &self.roster,
            ledger: &mut self.ledger,
            rejections: &mut self.rejections,
            clock: &self.clock,
        };
        run_cycle(&mut ctx, &self.matcher, faces, &mut self.intent)
            .unwrap()
            .decision()
            .cloned()
    }
}

#[test]
fn authorized_visit_records_entry_and_exit() {
    let mut site = Site::new();

    let entered = site.cycle(Intent::Entry, &[probe(0.3)]).unwrap();
    assert!(matches!(entered, Decision::Entered { .. }));
    assert!(matches!(
        site.ledger.session_state("Ana").unwrap(),
        SessionState::Inside { .. }
    ));

    site.clock.advance(Duration::minutes(5));
    let exited = site.cycle(Intent::Exit, &[probe(0.4)]).unwrap();
    let Decision::Exited { event } = exited else {
        panic!("expected exit, got {exited:?}");
    };
    assert_eq!(event.duration_minutes, Some(5.0));
    assert_eq!(site.ledger.session_state("Ana").unwrap(), SessionState::Outside);

    let text = std::fs::read_to_string(site.ledger.path()).unwrap();
    assert!(text.ends_with("Ana,egreso,07:35:00 del 09-03-2025,5.00\n"));
}

#[test]
fn exit_without_entry_leaves_ledger_untouched() {
    let mut site = Site::new();

    for _ in 0..4 {
        let decision = site.cycle(Intent::Exit, &[probe(0.3)]).unwrap();
        assert_eq!(decision.reject_reason(), Some(RejectReason::ExitWithoutOpenEntry));
    }

    assert!(site.ledger.events().unwrap().is_empty());
    assert_eq!(site.rejections.events().unwrap().len(), 4);
}

#[test]
fn unauthorized_person_is_logged_not_admitted() {
    let mut site = Site::new();

    let decision = site.cycle(Intent::Entry, &[probe(10.2)]).unwrap();
    assert_eq!(decision.reject_reason(), Some(RejectReason::KnownUnauthorized));

    assert!(site.ledger.events().unwrap().is_empty());
    let rejected = site.rejections.events().unwrap();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].identity, "Bob");
}

#[test]
fn unknown_face_is_logged_as_unregistered() {
    let mut site = Site::new();

    // 0.9 from Ana, 9.1 from Bob.
    let decision = site.cycle(Intent::Entry, &[probe(0.9)]).unwrap();
    let Decision::Rejected { rejection } = decision else {
        panic!("expected rejection");
    };
    assert_eq!(rejection.identity, UNREGISTERED);
    assert_eq!(rejection.reason, RejectReason::UnknownToRoster);
}

#[test]
fn alternation_holds_across_mixed_requests() {
    let mut site = Site::new();
    let script = [
        Intent::Exit,
        Intent::Entry,
        Intent::Exit,
        Intent::Exit,
        Intent::None,
        Intent::Entry,
        Intent::Exit,
    ];
    for intent in script {
        site.cycle(intent, &[probe(0.1)]);
        site.intent.take();
        site.clock.advance(Duration::minutes(3));
    }

    let history = site.ledger.query_by_identity("Ana").unwrap();
    let actions: Vec<Action> = history.iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![Action::Entry, Action::Exit, Action::Entry, Action::Exit]
    );
    for exit in history.iter().filter(|e| e.action == Action::Exit) {
        assert!(exit.duration_minutes.unwrap() >= 0.0);
    }
}

#[test]
fn report_reads_ledger_written_by_engine() {
    let mut site = Site::new();
    site.cycle(Intent::Entry, &[probe(0.0)]);
    site.clock.advance(Duration::minutes(20));
    site.cycle(Intent::Exit, &[probe(0.0)]);

    let ReportOutcome::Report(report) = report_from_path(site.ledger.path()).unwrap() else {
        panic!("expected report data");
    };
    assert_eq!(report.entries_per_person[0].identity, "Ana");
    assert_eq!(report.entries_per_person[0].entries, 1);
    assert_eq!(report.mean_stay[0].mean_minutes, 20.0);
}
