use async_trait::async_trait;
use rollcall_core::{
    Column, DuplicatePolicy, Identifier, LocalClock, ProfileRecord, RowHandle, Target,
    TargetStatus,
};
use rollcall_pipeline::{
    ExtractionFailure, FailureKind, PipelineError, ProfileExtractor, RetryPolicy, RunConfig,
    RunOrchestrator,
};
use rollcall_store::{
    profiles, run_list, tags, Database, ProfileRow, StoreError, WorkQueueStore,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn id(s: &str) -> Identifier {
    Identifier::new(s).expect("valid identifier")
}

fn profile(nick: &str, fields: &[(Column, &str)]) -> ProfileRecord {
    let mut record = ProfileRecord::new(nick);
    for (column, value) in fields {
        record.set(*column, value);
    }
    record
}

/// No delays, fast retries.
fn quick_config() -> RunConfig {
    RunConfig {
        max_targets: None,
        batch_size: 0,
        min_delay_secs: 0.0,
        max_delay_secs: 0.0,
        batch_pause: Duration::ZERO,
        retry: RetryPolicy::new(3, Duration::from_millis(1)),
        duplicate_policy: DuplicatePolicy::Append,
    }
}

/// Returns scripted results per nickname; unknown nicknames yield a bare record.
#[derive(Default)]
struct ScriptedExtractor {
    responses: HashMap<String, Result<ProfileRecord, ExtractionFailure>>,
    cancel_on: Option<(String, CancellationToken)>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedExtractor {
    fn respond(mut self, nick: &str, result: Result<ProfileRecord, ExtractionFailure>) -> Self {
        self.responses.insert(nick.to_string(), result);
        self
    }

    fn cancel_when_extracting(mut self, nick: &str, token: CancellationToken) -> Self {
        self.cancel_on = Some((nick.to_string(), token));
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProfileExtractor for ScriptedExtractor {
    async fn extract(&self, identifier: &Identifier) -> Result<ProfileRecord, ExtractionFailure> {
        let nick = identifier.as_str().to_string();
        self.calls.lock().unwrap().push(nick.clone());
        if let Some((target, token)) = &self.cancel_on {
            if *target == nick {
                token.cancel();
            }
        }
        self.responses
            .get(&nick)
            .cloned()
            .unwrap_or_else(|| Ok(ProfileRecord::new(&nick)))
    }
}

/// Wraps a real database and injects store failures.
struct FlakyStore {
    inner: Database,
    rate_limited_updates: AtomicU32,
    unreachable_appends: AtomicBool,
    rejected_appends: AtomicBool,
}

impl FlakyStore {
    fn new(inner: Database) -> Self {
        Self {
            inner,
            rate_limited_updates: AtomicU32::new(0),
            unreachable_appends: AtomicBool::new(false),
            rejected_appends: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl WorkQueueStore for FlakyStore {
    async fn list_pending(&self) -> rollcall_store::Result<Vec<Target>> {
        self.inner.list_pending().await
    }

    async fn update_status(
        &self,
        row: RowHandle,
        status: TargetStatus,
        remarks: &str,
    ) -> rollcall_store::Result<()> {
        let remaining = self.rate_limited_updates.load(Ordering::SeqCst);
        if remaining > 0 {
            self.rate_limited_updates.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::RateLimited("quota exceeded".to_string()));
        }
        self.inner.update_status(row, status, remarks).await
    }

    async fn append_profile_row(&self, values: &[String]) -> rollcall_store::Result<RowHandle> {
        if self.unreachable_appends.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }
        if self.rejected_appends.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected("row too large".to_string()));
        }
        self.inner.append_profile_row(values).await
    }

    async fn annotate_cell(
        &self,
        row: RowHandle,
        column: Column,
        note: &str,
    ) -> rollcall_store::Result<()> {
        self.inner.annotate_cell(row, column, note).await
    }

    async fn load_all_profile_rows(&self) -> rollcall_store::Result<Vec<ProfileRow>> {
        self.inner.load_all_profile_rows().await
    }

    async fn load_tag_mapping(&self) -> rollcall_store::Result<HashMap<String, String>> {
        self.inner.load_tag_mapping().await
    }
}

async fn queue(db: &Database, nicks: &[&str]) -> Vec<RowHandle> {
    let mut rows = Vec::new();
    for nick in nicks {
        rows.push(
            run_list::enqueue_target(db.pool(), &id(nick), run_list::DEFAULT_SOURCE)
                .await
                .expect("enqueue"),
        );
    }
    rows
}

async fn target(db: &Database, row: RowHandle) -> Target {
    run_list::get_target(db.pool(), row)
        .await
        .expect("get target")
        .expect("target exists")
}

#[tokio::test]
async fn test_new_and_duplicate_end_to_end() {
    let db = Database::in_memory().await.expect("create database");
    let original = profiles::append_row(
        db.pool(),
        profile("alice", &[(Column::City, "Lahore")]).values(),
    )
    .await
    .expect("seed alice");
    tags::assign_tag(db.pool(), "vip", &id("bob"))
        .await
        .expect("tag bob");
    let rows = queue(&db, &["alice", "bob"]).await;

    let extractor = ScriptedExtractor::default()
        .respond("alice", Ok(profile("alice", &[(Column::City, "Karachi")])))
        .respond("bob", Ok(profile("bob", &[(Column::City, "Multan")])));
    let orchestrator = RunOrchestrator::new(
        Arc::new(db.clone()),
        Arc::new(extractor),
        quick_config(),
        LocalClock::default(),
    );

    let report = orchestrator.run(None, 0).await.expect("run");
    assert_eq!(report.stats.processed, 2);
    assert_eq!(report.stats.new_profiles, 1);
    assert_eq!(report.stats.duplicates, 1);
    assert_eq!(report.stats.errors, 0);
    assert_eq!(report.total_considered, 2);

    let stored = profiles::load_all(db.pool()).await.expect("rows");
    assert_eq!(stored.len(), 3, "history is append-only");
    let alice_again = &stored[1];
    let bob = &stored[2];
    assert_eq!(alice_again.record().get(Column::City), "Karachi");
    assert_eq!(bob.record().get(Column::Tags), "vip");
    assert_eq!(bob.record().get(Column::Source), "RunList");

    let change = profiles::get_note(db.pool(), alice_again.row, Column::City)
        .await
        .expect("note")
        .expect("city change noted");
    assert!(change.starts_with("Changed from: Lahore\nNew: Karachi\nTime: "));

    let attempt = profiles::get_note(db.pool(), original, Column::NickName)
        .await
        .expect("note")
        .expect("original row noted");
    assert!(attempt.starts_with("Duplicate attempt @ "));

    let alice_target = target(&db, rows[0]).await;
    assert_eq!(alice_target.status, TargetStatus::Done);
    assert!(alice_target
        .remarks
        .starts_with(&format!("Duplicate (row {original}) @ ")));

    let bob_target = target(&db, rows[1]).await;
    assert_eq!(bob_target.status, TargetStatus::Done);
    assert!(bob_target.remarks.starts_with("New profile @ "));
}

#[tokio::test]
async fn test_annotate_policy_leaves_profiles_untouched() {
    let db = Database::in_memory().await.expect("create database");
    let original = profiles::append_row(db.pool(), profile("alice", &[]).values())
        .await
        .expect("seed alice");
    let rows = queue(&db, &["Alice"]).await;

    let config = RunConfig {
        duplicate_policy: DuplicatePolicy::Annotate,
        ..quick_config()
    };
    let orchestrator = RunOrchestrator::new(
        Arc::new(db.clone()),
        Arc::new(ScriptedExtractor::default()),
        config,
        LocalClock::default(),
    );

    let report = orchestrator.run(None, 0).await.expect("run");
    assert_eq!(report.stats.duplicates, 1);
    assert_eq!(profiles::profile_count(db.pool()).await.expect("count"), 1);
    assert!(profiles::get_note(db.pool(), original, Column::NickName)
        .await
        .expect("note")
        .is_some());
    assert_eq!(target(&db, rows[0]).await.status, TargetStatus::Done);
}

#[tokio::test]
async fn test_failed_extraction_marks_error_and_continues() {
    let db = Database::in_memory().await.expect("create database");
    let rows = queue(&db, &["ghost", "carol"]).await;

    let extractor = ScriptedExtractor::default()
        .respond("ghost", Err(ExtractionFailure::timeout("profile page")));
    let orchestrator = RunOrchestrator::new(
        Arc::new(db.clone()),
        Arc::new(extractor),
        quick_config(),
        LocalClock::default(),
    );

    let report = orchestrator.run(None, 0).await.expect("run");
    assert_eq!(report.stats.processed, 2);
    assert_eq!(report.stats.errors, 1);
    assert_eq!(report.stats.new_profiles, 1);

    let ghost = target(&db, rows[0]).await;
    assert_eq!(ghost.status, TargetStatus::Error);
    assert!(ghost.remarks.starts_with("Scrape failed @ "));
    assert_eq!(target(&db, rows[1]).await.status, TargetStatus::Done);
}

#[tokio::test]
async fn test_interrupt_requeues_in_flight_target() {
    let db = Database::in_memory().await.expect("create database");
    let rows = queue(&db, &["t1", "t2", "t3", "t4", "t5"]).await;

    let token = CancellationToken::new();
    let extractor = Arc::new(ScriptedExtractor::default().cancel_when_extracting("t3", token.clone()));
    let orchestrator = RunOrchestrator::new(
        Arc::new(db.clone()),
        Arc::clone(&extractor),
        quick_config(),
        LocalClock::default(),
    )
    .with_cancellation(token);

    let err = orchestrator.run(None, 0).await.expect_err("interrupted");
    match err {
        PipelineError::Interrupted { stats } => {
            assert_eq!(stats.processed, 2);
            assert_eq!(stats.new_profiles, 2);
        }
        other => panic!("expected interruption, got {other}"),
    }
    assert_eq!(extractor.calls(), vec!["t1", "t2", "t3"]);

    assert_eq!(target(&db, rows[0]).await.status, TargetStatus::Done);
    assert_eq!(target(&db, rows[1]).await.status, TargetStatus::Done);
    let in_flight = target(&db, rows[2]).await;
    assert_eq!(in_flight.status, TargetStatus::Pending);
    assert!(in_flight.remarks.starts_with("Interrupted @ "));
    for row in &rows[3..] {
        let untouched = target(&db, *row).await;
        assert_eq!(untouched.status, TargetStatus::Pending);
        assert_eq!(untouched.remarks, "");
    }
    assert_eq!(profiles::profile_count(db.pool()).await.expect("count"), 2);

    let pending = run_list::list_pending(db.pool()).await.expect("pending");
    assert_eq!(pending.len(), 3, "interrupted target is picked up next run");
}

#[tokio::test]
async fn test_requeue_retries_transient_write_failures() {
    let db = Database::in_memory().await.expect("create database");
    let rows = queue(&db, &["t1", "t2"]).await;

    let store = Arc::new(FlakyStore::new(db.clone()));
    store.rate_limited_updates.store(2, Ordering::SeqCst);

    let token = CancellationToken::new();
    let extractor = ScriptedExtractor::default().cancel_when_extracting("t1", token.clone());
    let orchestrator = RunOrchestrator::new(
        Arc::clone(&store),
        Arc::new(extractor),
        quick_config(),
        LocalClock::default(),
    )
    .with_cancellation(token);

    let err = orchestrator.run(None, 0).await.expect_err("interrupted");
    assert!(err.is_interrupted());
    assert_eq!(store.rate_limited_updates.load(Ordering::SeqCst), 0);

    let in_flight = target(&db, rows[0]).await;
    assert_eq!(in_flight.status, TargetStatus::Pending);
    assert!(in_flight.remarks.starts_with("Interrupted @ "));
    assert_eq!(target(&db, rows[1]).await.remarks, "");
}

#[tokio::test]
async fn test_cancel_during_write_backoff_stops_promptly() {
    let db = Database::in_memory().await.expect("create database");
    queue(&db, &["alice", "bob"]).await;

    let store = Arc::new(FlakyStore::new(db.clone()));
    store.rate_limited_updates.store(10, Ordering::SeqCst);

    let config = RunConfig {
        retry: RetryPolicy::new(3, Duration::from_secs(30)),
        ..quick_config()
    };
    let orchestrator = RunOrchestrator::new(
        Arc::clone(&store),
        Arc::new(ScriptedExtractor::default()),
        config,
        LocalClock::default(),
    );
    let token = orchestrator.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        token.cancel();
    });

    let result = tokio::time::timeout(Duration::from_secs(5), orchestrator.run(None, 0))
        .await
        .expect("run stops before the retry backoff elapses");
    assert!(result.expect_err("interrupted").is_interrupted());
}

#[tokio::test]
async fn test_stored_nickname_follows_the_target() {
    let db = Database::in_memory().await.expect("create database");
    let rows = queue(&db, &["null", "null"]).await;

    let extractor = ScriptedExtractor::default()
        .respond("null", Ok(profile("Display Name", &[(Column::City, "Lahore")])));
    let orchestrator = RunOrchestrator::new(
        Arc::new(db.clone()),
        Arc::new(extractor),
        quick_config(),
        LocalClock::default(),
    );

    let report = orchestrator.run(None, 0).await.expect("run");
    assert_eq!(report.stats.new_profiles, 1);
    assert_eq!(report.stats.duplicates, 1);

    let stored = db.load_all_profile_rows().await.expect("rows");
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|row| row.record().nickname() == "null"));
    assert!(target(&db, rows[1])
        .await
        .remarks
        .starts_with(&format!("Duplicate (row {}) @ ", stored[0].row)));
}

#[tokio::test]
async fn test_cancel_during_delay_stops_promptly() {
    let db = Database::in_memory().await.expect("create database");
    let rows = queue(&db, &["first", "second"]).await;

    let config = RunConfig {
        min_delay_secs: 3.0,
        max_delay_secs: 3.0,
        ..quick_config()
    };
    let orchestrator = RunOrchestrator::new(
        Arc::new(db.clone()),
        Arc::new(ScriptedExtractor::default()),
        config,
        LocalClock::default(),
    );
    let token = orchestrator.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        token.cancel();
    });

    let result = tokio::time::timeout(Duration::from_secs(2), orchestrator.run(None, 0))
        .await
        .expect("run stops before the delay elapses");
    assert!(result.expect_err("interrupted").is_interrupted());
    assert_eq!(target(&db, rows[0]).await.status, TargetStatus::Done);
    assert_eq!(target(&db, rows[1]).await.status, TargetStatus::Pending);
}

#[tokio::test]
async fn test_batch_pauses_and_target_cap() {
    let db = Database::in_memory().await.expect("create database");
    let nicks: Vec<String> = (0..45).map(|i| format!("user{i}")).collect();
    let nick_refs: Vec<&str> = nicks.iter().map(String::as_str).collect();
    queue(&db, &nick_refs).await;

    let orchestrator = RunOrchestrator::new(
        Arc::new(db.clone()),
        Arc::new(ScriptedExtractor::default()),
        quick_config(),
        LocalClock::default(),
    );

    let capped = orchestrator.run(Some(5), 20).await.expect("capped run");
    assert_eq!(capped.stats.processed, 5);
    assert_eq!(capped.total_considered, 5);
    assert_eq!(capped.batch_pauses, 0);

    let rest = orchestrator.run(None, 20).await.expect("full run");
    assert_eq!(rest.stats.processed, 40);
    assert_eq!(rest.batch_pauses, 1, "pause after 20, none at the end");

    assert!(run_list::list_pending(db.pool())
        .await
        .expect("pending")
        .is_empty());
}

#[tokio::test]
async fn test_batch_boundaries_for_full_queue() {
    let db = Database::in_memory().await.expect("create database");
    let nicks: Vec<String> = (0..45).map(|i| format!("user{i}")).collect();
    let nick_refs: Vec<&str> = nicks.iter().map(String::as_str).collect();
    queue(&db, &nick_refs).await;

    let orchestrator = RunOrchestrator::new(
        Arc::new(db.clone()),
        Arc::new(ScriptedExtractor::default()),
        quick_config(),
        LocalClock::default(),
    );

    let report = orchestrator.run(None, 20).await.expect("run");
    assert_eq!(report.stats.processed, 45);
    assert_eq!(report.batch_pauses, 2);
}

#[tokio::test]
async fn test_empty_queue_is_a_clean_run() {
    let db = Database::in_memory().await.expect("create database");
    let extractor = Arc::new(ScriptedExtractor::default());
    let orchestrator = RunOrchestrator::new(
        Arc::new(db),
        Arc::clone(&extractor),
        quick_config(),
        LocalClock::default(),
    );

    let report = orchestrator.run(None, 20).await.expect("run");
    assert_eq!(report.stats.processed, 0);
    assert!(extractor.calls().is_empty());
}

#[tokio::test]
async fn test_transient_status_errors_are_retried() {
    let db = Database::in_memory().await.expect("create database");
    let rows = queue(&db, &["alice"]).await;

    let store = Arc::new(FlakyStore::new(db.clone()));
    store.rate_limited_updates.store(2, Ordering::SeqCst);

    let orchestrator = RunOrchestrator::new(
        Arc::clone(&store),
        Arc::new(ScriptedExtractor::default()),
        quick_config(),
        LocalClock::default(),
    );

    let report = orchestrator.run(None, 0).await.expect("run");
    assert_eq!(report.stats.new_profiles, 1);
    assert_eq!(report.stats.errors, 0);
    assert_eq!(store.rate_limited_updates.load(Ordering::SeqCst), 0);
    assert_eq!(target(&db, rows[0]).await.status, TargetStatus::Done);
}

#[tokio::test]
async fn test_exhausted_status_retries_count_as_error() {
    let db = Database::in_memory().await.expect("create database");
    let rows = queue(&db, &["alice", "bob"]).await;

    let store = Arc::new(FlakyStore::new(db.clone()));
    store.rate_limited_updates.store(3, Ordering::SeqCst);

    let orchestrator = RunOrchestrator::new(
        Arc::clone(&store),
        Arc::new(ScriptedExtractor::default()),
        quick_config(),
        LocalClock::default(),
    );

    let report = orchestrator.run(None, 0).await.expect("run");
    assert_eq!(report.stats.processed, 2);
    assert_eq!(report.stats.errors, 1);
    assert_eq!(report.stats.new_profiles, 1);
    assert_eq!(target(&db, rows[0]).await.status, TargetStatus::Pending);
    assert_eq!(target(&db, rows[1]).await.status, TargetStatus::Done);
}

#[tokio::test]
async fn test_unreachable_store_aborts_run() {
    let db = Database::in_memory().await.expect("create database");
    let rows = queue(&db, &["alice", "bob"]).await;

    let store = Arc::new(FlakyStore::new(db.clone()));
    store.unreachable_appends.store(true, Ordering::SeqCst);

    let extractor = Arc::new(ScriptedExtractor::default());
    let orchestrator = RunOrchestrator::new(
        Arc::clone(&store),
        Arc::clone(&extractor),
        quick_config(),
        LocalClock::default(),
    );

    let err = orchestrator.run(None, 0).await.expect_err("fatal");
    match err {
        PipelineError::Store(e) => assert!(e.is_fatal()),
        other => panic!("expected store error, got {other}"),
    }
    assert_eq!(extractor.calls(), vec!["alice"]);
    assert_eq!(target(&db, rows[0]).await.status, TargetStatus::Pending);
    assert_eq!(target(&db, rows[1]).await.status, TargetStatus::Pending);
}

#[tokio::test]
async fn test_unavailable_extractor_aborts_run() {
    let db = Database::in_memory().await.expect("create database");
    let rows = queue(&db, &["alice", "bob"]).await;

    let extractor = ScriptedExtractor::default().respond(
        "alice",
        Err(ExtractionFailure::new(FailureKind::Unavailable, "browser closed")),
    );
    let orchestrator = RunOrchestrator::new(
        Arc::new(db.clone()),
        Arc::new(extractor),
        quick_config(),
        LocalClock::default(),
    );

    let err = orchestrator.run(None, 0).await.expect_err("fatal");
    assert!(matches!(err, PipelineError::ExtractorUnavailable(_)));
    assert_eq!(target(&db, rows[1]).await.status, TargetStatus::Pending);
}

#[tokio::test]
async fn test_rejected_writes() {
    let db = Database::in_memory().await.expect("create database");
    let original = profiles::append_row(db.pool(), profile("alice", &[]).values())
        .await
        .expect("seed alice");
    let rows = queue(&db, &["alice", "bob"]).await;

    let store = Arc::new(FlakyStore::new(db.clone()));
    store.rejected_appends.store(true, Ordering::SeqCst);

    let orchestrator = RunOrchestrator::new(
        Arc::clone(&store),
        Arc::new(ScriptedExtractor::default()),
        quick_config(),
        LocalClock::default(),
    );

    let report = orchestrator.run(None, 0).await.expect("run");
    assert_eq!(report.stats.processed, 2);
    assert_eq!(report.stats.duplicates, 1);
    assert_eq!(report.stats.errors, 1);
    assert_eq!(profiles::profile_count(db.pool()).await.expect("count"), 1);

    let alice = target(&db, rows[0]).await;
    assert_eq!(alice.status, TargetStatus::Done, "duplicates never end in Error");
    assert!(alice
        .remarks
        .starts_with(&format!("Duplicate (row {original}) @ ")));

    let bob = target(&db, rows[1]).await;
    assert_eq!(bob.status, TargetStatus::Error);
    assert!(bob.remarks.starts_with("Write failed @ "));
    assert!(bob.remarks.contains("row too large"));
}
