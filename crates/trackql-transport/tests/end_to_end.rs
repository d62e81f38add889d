use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use trackql_kernel::{FieldDescriptor, FieldKind, FieldRegistry, Literal, RecordHandle, RecordPatch, ScopeConstraint, StoreSettings};
use trackql_query::{ProjectionExpr, RenderedQuery, Search, SearchResult, SortDirection, field, subtasks_of};
use trackql_store::{FsStore, LockPolicy, MemoryStore, RecordStore, UnitLockGuard};
use trackql_transport::{BackendError, FakeBackend, RemoteBackend, SearchBackend, Transport, TransportError};

fn registry() -> Arc<FieldRegistry> {
    let project = FieldDescriptor::builtin("project", FieldKind::Text);
    let issue_type = FieldDescriptor::builtin("issueType", FieldKind::Text);
    let mut registry = FieldRegistry::new();
    registry
        .register(
            "bug",
            vec![
                project.clone(),
                issue_type.clone(),
                FieldDescriptor::builtin("summary", FieldKind::Text),
                FieldDescriptor::builtin("assignee", FieldKind::User),
                FieldDescriptor::builtin("status", FieldKind::Text),
                FieldDescriptor::custom("story_points", 10016),
            ],
            vec![
                ScopeConstraint::new(project, "DEV"),
                ScopeConstraint::new(issue_type, "Bug"),
            ],
        )
        .expect("register bug");
    Arc::new(registry)
}

fn live() -> CancellationToken {
    CancellationToken::new()
}

/// Records every request body and answers with an empty page.
#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<RenderedQuery>>,
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn search(&self, request: &RenderedQuery) -> Result<SearchResult, TransportError> {
        self.sent
            .lock()
            .expect("recording lock should not be poisoned")
            .push(request.clone());
        Ok(SearchResult {
            matched: Vec::new(),
            total: 7,
        })
    }
}

/// Never answers.
struct StalledTransport;

#[async_trait]
impl Transport for StalledTransport {
    async fn search(&self, _request: &RenderedQuery) -> Result<SearchResult, TransportError> {
        std::future::pending().await
    }
}

async fn scope_scenario<S: RecordStore + 'static>(store: S) {
    let backend = FakeBackend::new(registry(), store);
    let created = backend
        .create(
            "bug",
            RecordHandle::unkeyed()
                .with_field("assignee", "dev1")
                .with_field("summary", "fix"),
            &live(),
        )
        .await
        .expect("create should succeed");
    assert_eq!(created.key, "DEV-1");
    assert_eq!(created.field("issueType"), Some(&Literal::text("Bug")));

    backend
        .create(
            "bug",
            RecordHandle::unkeyed().with_field("assignee", "dev2"),
            &live(),
        )
        .await
        .expect("create should succeed");

    let search = Search::new().filter(field("assignee").eq("dev1"));
    let result = backend
        .search("bug", &search, &live())
        .await
        .expect("search should succeed");
    assert_eq!(result.total, 1);
    assert_eq!(result.matched[0].key, "DEV-1");
    assert_eq!(result.matched[0].field("summary"), Some(&Literal::text("fix")));

    assert_eq!(
        backend
            .count("bug", &Search::new(), &live())
            .await
            .expect("count should succeed"),
        2
    );
    assert!(
        !backend
            .exists("bug", &Search::new().filter(field("assignee").eq("dev3")), &live())
            .await
            .expect("exists should succeed")
    );
}

#[tokio::test]
async fn scope_scenario_on_memory_store() {
    scope_scenario(MemoryStore::new()).await;
}

#[tokio::test]
async fn scope_scenario_on_filesystem_store() {
    let dir = tempfile::tempdir().expect("tempdir should create");
    let store = FsStore::open(&StoreSettings::with_root(dir.path())).expect("store should open");
    scope_scenario(store).await;
}

#[tokio::test]
async fn remote_backend_sends_rendered_query() {
    let backend = RemoteBackend::new(registry(), RecordingTransport::default());
    let search = Search::new()
        .filter(field("assignee").eq("dev1"))
        .select(ProjectionExpr::fields(["summary", "story_points"]))
        .order_by("story_points", SortDirection::Desc)
        .page(20, 10);

    backend
        .search("bug", &search, &live())
        .await
        .expect("search should succeed");
    let total = backend
        .count("bug", &search, &live())
        .await
        .expect("count should succeed");
    assert_eq!(total, 7);
    assert!(
        backend
            .exists("bug", &search, &live())
            .await
            .expect("exists should succeed")
    );

    let sent = backend
        .transport()
        .sent
        .lock()
        .expect("recording lock should not be poisoned")
        .clone();
    assert_eq!(sent.len(), 3);
    insta::assert_json_snapshot!(sent[0], @r#"
    {
      "jql": "project = DEV AND issueType = Bug AND assignee = dev1 ORDER BY cf[10016] DESC",
      "fields": [
        "summary",
        "customfield_10016"
      ],
      "startAt": 20,
      "maxResults": 10
    }
    "#);
    assert_eq!(sent[1].max_results, 0);
    assert_eq!(sent[1].start_at, 0);
}

#[tokio::test]
async fn fake_and_remote_agree_on_subquery_text_and_results() {
    let registry = registry();
    let fake = FakeBackend::new(Arc::clone(&registry), MemoryStore::new());
    let parent = fake
        .create("bug", RecordHandle::unkeyed().with_field("status", "Open"), &live())
        .await
        .expect("create should succeed");
    fake.create(
        "bug",
        RecordHandle::unkeyed()
            .with_field("status", "Done")
            .with_parent(parent.key.clone()),
        &live(),
    )
    .await
    .expect("create should succeed");

    let search = Search::new().filter(subtasks_of("bug", field("status").eq("Done")));
    let result = fake
        .search("bug", &search, &live())
        .await
        .expect("search should succeed");
    let keys: Vec<&str> = result.matched.iter().map(|r| r.key.as_str()).collect();
    assert_eq!(keys, vec![parent.key.as_str()]);

    let remote = RemoteBackend::new(registry, RecordingTransport::default());
    let rendered = remote.render("bug", &search).expect("render should succeed");
    insta::assert_snapshot!(
        rendered.jql,
        @r#"project = DEV AND issueType = Bug AND issueFunction in subtasksOf("project = DEV AND issueType = Bug AND status = Done")"#
    );
}

#[tokio::test]
async fn updates_are_validated_against_the_type() {
    let backend = FakeBackend::new(registry(), MemoryStore::new());
    let created = backend
        .create("bug", RecordHandle::unkeyed(), &live())
        .await
        .expect("create should succeed");

    let updated = backend
        .update(
            "bug",
            &created.key,
            &RecordPatch::new().set("assignee", "dev9"),
            &live(),
        )
        .await
        .expect("update should succeed");
    assert_eq!(updated.field("assignee"), Some(&Literal::user("dev9")));

    let conflict = backend
        .update(
            "bug",
            &created.key,
            &RecordPatch::new().set("project", "OPS"),
            &live(),
        )
        .await;
    assert!(matches!(conflict, Err(BackendError::ScopeConflict { .. })));

    let missing = backend
        .update("bug", "DEV-404", &RecordPatch::new(), &live())
        .await;
    assert!(matches!(missing, Err(BackendError::Store(_))));

    backend
        .delete(&created.key, &live())
        .await
        .expect("delete should succeed");
    assert_eq!(backend.get(&created.key).await.expect("get"), None);
}

#[tokio::test]
async fn cancellation_is_reported_by_both_backends() {
    let fake = FakeBackend::new(registry(), MemoryStore::new());
    let cancelled = CancellationToken::new();
    cancelled.cancel();
    assert!(matches!(
        fake.search("bug", &Search::new(), &cancelled).await,
        Err(BackendError::Cancelled)
    ));
    assert!(matches!(
        fake.create("bug", RecordHandle::unkeyed(), &cancelled).await,
        Err(BackendError::Cancelled)
    ));
    assert_eq!(fake.count("bug", &Search::new(), &live()).await.expect("count"), 0);

    let remote = RemoteBackend::new(registry(), StalledTransport);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });
    assert!(matches!(
        remote.search("bug", &Search::new(), &cancel).await,
        Err(BackendError::Cancelled)
    ));
}

#[tokio::test]
async fn compile_errors_surface_before_any_io() {
    let remote = RemoteBackend::new(registry(), RecordingTransport::default());
    let search = Search::new().filter(field("assignee").eq("a") | field("assignee").eq("b"));
    assert!(matches!(
        remote.search("bug", &search, &live()).await,
        Err(BackendError::Compile(_))
    ));
    assert!(remote.transport().sent.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn contended_record_does_not_stall_other_records() {
    let dir = tempfile::tempdir().expect("tempdir should create");
    let mut settings = StoreSettings::with_root(dir.path());
    settings.lock_retries = 8;
    settings.lock_backoff_ms = 50;
    let store = FsStore::open(&settings).expect("store should open");
    let backend = Arc::new(FakeBackend::new(registry(), store));

    for _ in 0..2 {
        backend
            .create("bug", RecordHandle::unkeyed(), &live())
            .await
            .expect("create should succeed");
    }

    let held = UnitLockGuard::acquire(
        &dir.path().join("records").join("DEV-1.json"),
        "DEV-1",
        LockPolicy::new(0, 1),
        &live(),
    )
    .expect("external lock should acquire");

    let waiting = {
        let backend = Arc::clone(&backend);
        tokio::spawn(async move {
            backend
                .update(
                    "bug",
                    "DEV-1",
                    &RecordPatch::new().set("status", "Blocked"),
                    &live(),
                )
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let other = tokio::time::timeout(
        Duration::from_millis(1000),
        backend.update(
            "bug",
            "DEV-2",
            &RecordPatch::new().set("status", "Done"),
            &live(),
        ),
    )
    .await
    .expect("unrelated update should not wait for the held record")
    .expect("unrelated update should succeed");
    assert_eq!(other.field("status"), Some(&Literal::text("Done")));

    let total = tokio::time::timeout(
        Duration::from_millis(1000),
        backend.count("bug", &Search::new(), &live()),
    )
    .await
    .expect("count should not wait for the held record")
    .expect("count should succeed");
    assert_eq!(total, 2);
    assert!(!waiting.is_finished());

    drop(held);
    let updated = waiting
        .await
        .expect("task should join")
        .expect("update should succeed once the lock is released");
    assert_eq!(updated.field("status"), Some(&Literal::text("Blocked")));
}
