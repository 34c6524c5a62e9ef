//! End-to-end job runs over in-memory backends

use crate::support::{
    record, test_config, FakeBrowser, CHALLENGE_PAGE, EMAIL_PAGE, FALLBACK, PHONE_PAGE,
};
use profile_enrich::broker::{consume, JobAck, MemoryBus};
use profile_enrich::config::{FetchConfig, FetchProfileConfig, RecordsConfig};
use profile_enrich::extract::{web_table, SelectorExtractor};
use profile_enrich::fetch::FetchEngine;
use profile_enrich::pipeline::{Enricher, JobKind, JobRunner, SharedStore, Tracker, WorkerPool};
use profile_enrich::queue::{CompletionState, JobQueue, MemoryQueue, QueueError};
use profile_enrich::storage::{open_store, RecordStore};
use profile_enrich::{ProxyPool, WorkItem};
use serde_json::json;
use std::sync::{Arc, Mutex};

fn web_runner(browser: FakeBrowser, queue: &Arc<MemoryQueue>, idle_ticks: u32) -> JobRunner {
    let queue: Arc<dyn JobQueue> = queue.clone();
    JobRunner::new(
        JobKind::Web,
        test_config(idle_ticks),
        Arc::new(browser),
        Vec::new(),
        Some(queue),
        None,
    )
    .unwrap()
}

#[tokio::test]
async fn test_web_job_fills_missing_phone() {
    let queue = Arc::new(MemoryQueue::new());
    queue.enqueue(
        "J1",
        record(json!({
            "web": "http://a.biz",
            "phone": "",
            "email": "x@a.biz",
            "social": "https://facebook.com/a"
        })),
    );

    let browser = FakeBrowser::new().page("https://facebook.com/a", PHONE_PAGE);
    let runner = web_runner(browser, &queue, 20);

    assert_eq!(runner.run("J1").await, 1);

    let stored = queue.stored("J1");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0]["phone"], "555-1111");
    assert_eq!(stored[0]["email"], "x@a.biz");
    assert_eq!(stored[0]["web"], "http://a.biz");
}

#[tokio::test]
async fn test_web_job_with_no_items_times_out_idle() {
    let queue = Arc::new(MemoryQueue::new());
    let runner = web_runner(FakeBrowser::new(), &queue, 300);

    assert_eq!(runner.run("J-empty").await, 0);
    assert_eq!(queue.pull_count(), 300);
}

#[tokio::test]
async fn test_rerunning_a_job_leaves_the_list_unchanged() {
    let queue = Arc::new(MemoryQueue::new());
    queue.enqueue(
        "J1",
        record(json!({
            "link": "https://www.a.biz/",
            "phone": "",
            "email": "",
            "social": "https://facebook.com/a | https://facebook.com/a-about"
        })),
    );
    queue.enqueue(
        "J1",
        record(json!({"web": "http://b.biz", "phone": "1", "email": "b@b.biz"})),
    );

    let browser = || {
        FakeBrowser::new()
            .page("https://facebook.com/a", PHONE_PAGE)
            .page("https://facebook.com/a-about", EMAIL_PAGE)
    };

    web_runner(browser(), &queue, 5).run("J1").await;
    let first = queue.stored("J1");
    assert_eq!(first[0]["phone"], "555-1111");
    assert_eq!(first[0]["email"], "hello@b.biz");
    assert_eq!(first[1]["phone"], "1");

    web_runner(browser(), &queue, 5).run("J1").await;
    assert_eq!(queue.stored("J1"), first);
}

#[tokio::test]
async fn test_google_job_drains_until_signal_and_cleans_up() {
    let queue = Arc::new(MemoryQueue::with_separate_source());
    queue.store(
        "G1",
        vec![
            record(json!({"web": "http://a.biz", "phone": ""})),
            record(json!({"web": "http://b.biz", "email": ""})),
            record(json!({"web": "http://c.biz", "phone": ""})),
        ],
    );
    queue.enqueue(
        "G1",
        record(json!({"web": "http://a.biz", "phone": "", "social": "https://facebook.com/a"})),
    );
    queue.enqueue(
        "G1",
        record(json!({"web": "http://b.biz", "email": "", "social": "https://facebook.com/b"})),
    );
    queue.set_signal("G1", "3");

    let browser = FakeBrowser::new()
        .page("https://facebook.com/a", PHONE_PAGE)
        .page("https://facebook.com/b", EMAIL_PAGE);
    let source: Arc<dyn JobQueue> = queue.clone();
    let runner = JobRunner::new(
        JobKind::Google,
        test_config(5),
        Arc::new(browser),
        Vec::new(),
        Some(source),
        None,
    )
    .unwrap();

    assert_eq!(runner.run("G1").await, 2);

    let stored = queue.stored("G1");
    assert_eq!(stored.len(), 3);
    assert_eq!(stored[0]["phone"], "555-1111");
    assert_eq!(stored[1]["email"], "hello@b.biz");
    assert_eq!(stored[2]["phone"], "");

    assert!(!queue.exists("G1").await.unwrap());
    assert_eq!(
        queue.completion("G1").await.unwrap(),
        CompletionState::NotSet
    );
}

#[tokio::test]
async fn test_google_job_on_shared_list_keeps_results() {
    let queue = Arc::new(MemoryQueue::new());
    queue.enqueue(
        "G2",
        record(json!({"web": "http://a.biz", "phone": "", "social": "https://facebook.com/a"})),
    );
    queue.set_signal("G2", "3");

    let browser = FakeBrowser::new().page("https://facebook.com/a", PHONE_PAGE);
    let source: Arc<dyn JobQueue> = queue.clone();
    let runner = JobRunner::new(
        JobKind::Google,
        test_config(5),
        Arc::new(browser),
        Vec::new(),
        Some(source),
        None,
    )
    .unwrap();

    assert_eq!(runner.run("G2").await, 1);

    let stored = queue.stored("G2");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0]["phone"], "555-1111");
    assert_eq!(
        queue.completion("G2").await.unwrap(),
        CompletionState::NotSet
    );
}

#[tokio::test]
async fn test_business_job_updates_store_rows() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = open_store(&dir.path().join("records.db")).unwrap();
    store.create_job("oid-7").unwrap();
    let acme = store
        .insert_item(
            "oid-7",
            &record(json!({
                "title": "Acme",
                "phone": "",
                "email": "",
                "social": "https://twitter.com/acme | https://facebook.com/a"
            })),
        )
        .unwrap();
    let store: SharedStore = Arc::new(Mutex::new(store));

    let browser = FakeBrowser::new().page("https://facebook.com/a", PHONE_PAGE);
    let runner = JobRunner::new(
        JobKind::Business,
        test_config(5),
        Arc::new(browser),
        Vec::new(),
        None,
        Some(Arc::clone(&store)),
    )
    .unwrap();

    assert_eq!(runner.run("oid-7").await, 1);

    let items = store
        .lock()
        .unwrap()
        .load_items("oid-7", &RecordsConfig::default())
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].record_id, Some(acme));
    assert_eq!(items[0].text("phone"), "555-1111");
}

#[tokio::test]
async fn test_worker_pool_returns_one_item_per_input() {
    let browser = Arc::new(
        FakeBrowser::new()
            .page("https://facebook.com/a", PHONE_PAGE)
            .page("https://facebook.com/c", CHALLENGE_PAGE),
    );
    let profile = FetchProfileConfig::standard();
    let pool = Arc::new(ProxyPool::for_profile(Vec::new(), &profile));
    let settings = FetchConfig {
        fallback_egress: Some(FALLBACK.to_string()),
        settle_delay_ms: 0,
        ..FetchConfig::default()
    };
    let engine = Arc::new(FetchEngine::new(pool, browser, settings, profile, "socks5"));
    let enricher = Enricher::new(
        engine,
        Arc::new(SelectorExtractor::new(web_table("description").unwrap())),
        RecordsConfig::default(),
        vec!["phone".to_string()],
    );
    let workers = WorkerPool::new(enricher, 2);
    let tracker = Arc::new(Tracker::new());

    let inputs: Vec<WorkItem> = ["a", "b", "c", "d", "e"]
        .iter()
        .map(|name| {
            WorkItem::from_raw(
                record(json!({
                    "web": format!("http://{}.biz", name),
                    "phone": "",
                    "social": format!("https://facebook.com/{}", name)
                })),
                &RecordsConfig::default(),
            )
            .unwrap()
        })
        .collect();

    let results = workers.process_batch(inputs.clone(), &tracker).await;

    assert_eq!(results.len(), inputs.len());
    for input in &inputs {
        assert_eq!(
            results.iter().filter(|r| r.identity == input.identity).count(),
            1
        );
    }
    let enriched = tracker.drain_pending();
    assert_eq!(enriched.len(), 1);
    assert_eq!(enriched[0].text("phone"), "555-1111");
}

#[tokio::test]
async fn test_engine_escalates_past_challenged_endpoint() {
    let browser = Arc::new(
        FakeBrowser::new()
            .page("https://facebook.com/a", PHONE_PAGE)
            .challenge_on("socks5://p1"),
    );
    let profile = FetchProfileConfig::standard();
    let pool = Arc::new(ProxyPool::for_profile(
        vec!["p1".to_string(), "p2".to_string()],
        &profile,
    ));
    let settings = FetchConfig {
        fallback_egress: Some(FALLBACK.to_string()),
        settle_delay_ms: 0,
        ..FetchConfig::default()
    };
    let engine = FetchEngine::new(pool.clone(), browser.clone(), settings, profile, "socks5");

    let content = engine.fetch("https://facebook.com/a").await;

    assert!(content.contains("555-1111"));
    assert_eq!(browser.launches(), vec!["socks5://p1", "socks5://p2"]);

    let stats = pool.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.regular_failures, 1);
    assert_eq!(stats.active, 2);
}

#[tokio::test]
async fn test_consume_acknowledges_each_accepted_request() {
    let queue = Arc::new(MemoryQueue::new());
    queue.enqueue(
        "J1",
        record(json!({
            "web": "http://a.biz",
            "phone": "",
            "email": "x@a.biz",
            "social": "https://facebook.com/a"
        })),
    );

    let browser = FakeBrowser::new().page("https://facebook.com/a", PHONE_PAGE);
    let runner = web_runner(browser, &queue, 3);
    let bus = MemoryBus::new(["not json", r#"{"oid": "J1", "keyword": "bakery"}"#, r#"{"oid": "J2"}"#]);

    let result = consume(&bus, &runner).await;

    assert!(matches!(result, Err(QueueError::Disconnected(_))));
    assert_eq!(
        bus.acks(),
        vec![
            JobAck {
                oid: "J1".to_string(),
                updated_amount: 1
            },
            JobAck {
                oid: "J2".to_string(),
                updated_amount: 0
            },
        ]
    );
}
