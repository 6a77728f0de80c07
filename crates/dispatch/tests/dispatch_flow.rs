//! End-to-end dispatch: scheduler, queue, worker pool and dispatcher wired
//! together over the in-memory store and a mock external API.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use adu_core::{RetryPolicy, SubmissionData, SystemMap, SystemNode, SystemRegistry, TemplateField};
use adu_dispatch::{
    DispatchError, Dispatcher, ExternalApi, HttpResponse, MapResolver, MemoryArtifactSink,
    MemoryStore, Scheduler, SubmissionStore, WorkerPool,
};
use adu_queue::MemoryQueue;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::watch;

/// Answers per URL; unknown URLs get a 500.
struct MockApi {
    calls: Arc<AtomicUsize>,
    seen: Mutex<Vec<(String, Value)>>,
    responses: HashMap<String, HttpResponse>,
}

impl MockApi {
    fn new(responses: &[(&str, u16, &str)]) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            seen: Mutex::new(Vec::new()),
            responses: responses
                .iter()
                .map(|(url, status, body)| {
                    (
                        url.to_string(),
                        HttpResponse {
                            status: *status,
                            body: body.to_string(),
                        },
                    )
                })
                .collect(),
        }
    }

    fn urls(&self) -> Vec<String> {
        self.seen.lock().unwrap().iter().map(|(u, _)| u.clone()).collect()
    }
}

#[async_trait]
impl ExternalApi for MockApi {
    async fn post_json(&self, url: &str, payload: &Value) -> Result<HttpResponse, DispatchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push((url.to_string(), payload.clone()));
        Ok(self.responses.get(url).cloned().unwrap_or(HttpResponse {
            status: 500,
            body: "unavailable".to_string(),
        }))
    }
}

fn registry(max_retries: Option<u32>) -> Arc<SystemRegistry> {
    let retry = RetryPolicy {
        interval_seconds: 300,
        max_retries,
    };
    let mut map = SystemMap::new();
    map.insert(
        "dbi".into(),
        SystemNode::api("DBI_SYSTEM_URL")
            .with_template(vec![
                TemplateField::simple("block", "block"),
                TemplateField::simple("lot", "lot"),
            ])
            .with_retry(retry.clone())
            .with_dependant(
                "fire",
                SystemNode::api("FIRE_SYSTEM_URL")
                    .with_template(vec![TemplateField::simple("job_size", "est_cost")])
                    .with_retry(retry.clone()),
            ),
    );
    map.insert(
        "planning".into(),
        SystemNode::api("PLANNING_SYSTEM_URL").with_retry(retry),
    );
    Arc::new(SystemRegistry::new(map).unwrap())
}

fn endpoints() -> Arc<MapResolver> {
    Arc::new(
        MapResolver::new()
            .with("DBI_SYSTEM_URL", "http://dbi")
            .with("FIRE_SYSTEM_URL", "http://fire")
            .with("PLANNING_SYSTEM_URL", "http://planning"),
    )
}

fn bob() -> SubmissionData {
    json!({"block": "1", "lot": "2", "first_name": "bob", "est_cost": 12000})
        .as_object()
        .cloned()
        .unwrap()
}

struct Harness {
    store: Arc<MemoryStore>,
    queue: Arc<MemoryQueue>,
    dispatcher: Arc<Dispatcher>,
    api: Arc<MockApi>,
}

fn harness(max_retries: Option<u32>, api: MockApi) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(MemoryQueue::with_poll_wait(Duration::from_millis(50)));
    let api = Arc::new(api);
    let dispatcher = Dispatcher::new(registry(max_retries), store.clone(), queue.clone())
        .with_api(api.clone())
        .with_endpoints(endpoints())
        .with_artifacts(Arc::new(MemoryArtifactSink::new()));
    Harness {
        store,
        queue,
        dispatcher: Arc::new(dispatcher),
        api,
    }
}

impl Harness {
    /// Run workers until everything enqueued so far, including retries, is done.
    async fn drain(&self) -> adu_dispatch::WorkerStats {
        self.queue.close();
        let (_tx, rx) = watch::channel(false);
        WorkerPool::new(self.dispatcher.clone(), self.queue.clone(), 4)
            .run(rx)
            .await
    }
}

#[tokio::test]
async fn fresh_submission_schedules_top_level_systems() {
    let h = harness(Some(3), MockApi::new(&[]));
    let submission = h.store.create_submission(bob()).await.unwrap();

    let jobs = h
        .dispatcher
        .scheduler()
        .schedule(&submission, h.dispatcher.registry())
        .await
        .unwrap();

    let codes: Vec<&str> = jobs.iter().map(|j| j.code()).collect();
    assert_eq!(codes, vec!["dbi", "planning"]);
    assert_eq!(h.queue.outstanding().await, 2);
}

#[tokio::test]
async fn rescheduling_only_enqueues_missing_frontier() {
    let h = harness(Some(3), MockApi::new(&[]));
    let scheduler: &Scheduler = h.dispatcher.scheduler();
    let registry = h.dispatcher.registry();
    let submission = h.store.create_submission(bob()).await.unwrap();

    h.store
        .record_external_dispatch(submission.id, "planning", "P-1")
        .await
        .unwrap();
    let jobs = scheduler.schedule(&submission, registry).await.unwrap();
    assert_eq!(jobs.iter().map(|j| j.code()).collect::<Vec<_>>(), vec!["dbi"]);

    h.store
        .record_external_dispatch(submission.id, "dbi", "D-1")
        .await
        .unwrap();
    for _ in 0..2 {
        let jobs = scheduler.schedule(&submission, registry).await.unwrap();
        assert_eq!(
            jobs.iter().map(|j| j.system.to_string()).collect::<Vec<_>>(),
            vec!["dbi/fire"]
        );
    }

    h.store
        .record_external_dispatch(submission.id, "fire", "F-1")
        .await
        .unwrap();
    assert!(scheduler.schedule(&submission, registry).await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn successful_parent_unlocks_dependant() {
    let h = harness(
        Some(3),
        MockApi::new(&[
            ("http://dbi", 200, r#"{"status":"success","data":{"id":"D-9"}}"#),
            ("http://fire", 201, r#"{"data":{"id":77}}"#),
            ("http://planning", 200, r#"{"data":{"id":"P-3"}}"#),
        ]),
    );
    let submission = h.store.create_submission(bob()).await.unwrap();
    h.dispatcher
        .scheduler()
        .schedule(&submission, h.dispatcher.registry())
        .await
        .unwrap();

    let stats = h.drain().await;
    assert_eq!(stats.succeeded, 3);
    assert_eq!(stats.gave_up, 0);

    let mut records: Vec<(String, String)> = h
        .store
        .find_external_records_for(submission.id)
        .await
        .unwrap()
        .into_iter()
        .map(|r| (r.system_code, r.external_id))
        .collect();
    records.sort();
    assert_eq!(
        records,
        vec![
            ("dbi".to_string(), "D-9".to_string()),
            ("fire".to_string(), "77".to_string()),
            ("planning".to_string(), "P-3".to_string()),
        ]
    );

    let urls = h.api.urls();
    let dbi_at = urls.iter().position(|u| u == "http://dbi").unwrap();
    let fire_at = urls.iter().position(|u| u == "http://fire").unwrap();
    assert!(dbi_at < fire_at, "fire must only be called after dbi succeeded");

    let fire_payload = h
        .api
        .seen
        .lock()
        .unwrap()
        .iter()
        .find(|(u, _)| u == "http://fire")
        .map(|(_, p)| p.clone())
        .unwrap();
    assert_eq!(fire_payload, json!({"job_size": 12000}));
}

#[tokio::test(start_paused = true)]
async fn retries_stop_after_max_retries() {
    let h = harness(
        Some(3),
        MockApi::new(&[("http://planning", 200, r#"{"data":{"id":"P-1"}}"#)]),
    );
    let submission = h.store.create_submission(bob()).await.unwrap();
    h.dispatcher
        .scheduler()
        .schedule(&submission, h.dispatcher.registry())
        .await
        .unwrap();

    let stats = h.drain().await;

    let dbi_calls = h.api.urls().iter().filter(|u| *u == "http://dbi").count();
    assert_eq!(dbi_calls, 3, "exactly three attempts, never a fourth");
    assert_eq!(stats.retry_scheduled, 2);
    assert_eq!(stats.gave_up, 1);
    assert_eq!(stats.succeeded, 1);

    let records = h.store.find_external_records_for(submission.id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].system_code, "planning");
    assert_eq!(h.queue.outstanding().await, 0);
}

#[tokio::test(start_paused = true)]
async fn retry_waits_for_policy_interval() {
    let h = harness(Some(2), MockApi::new(&[]));
    let submission = h.store.create_submission(bob()).await.unwrap();
    h.dispatcher
        .scheduler()
        .schedule(&submission, h.dispatcher.registry())
        .await
        .unwrap();

    let started = tokio::time::Instant::now();
    h.drain().await;

    assert!(started.elapsed() >= Duration::from_secs(300));
    assert_eq!(h.api.calls.load(Ordering::SeqCst), 4);
}
