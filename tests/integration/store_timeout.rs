#![allow(missing_docs)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use sqlquiz::activity::{CounterActivity, MemoryActivity, Outcome};
use sqlquiz::query::{CountPolicy, ExecError, PageSize, QueryError};
use sqlquiz::service::{QueryRequest, QueryService, ServiceSettings};
use sqlquiz::store::{seed_demo, Store, StoreOptions};
use tempfile::TempDir;

const RUNAWAY: &str = "SELECT COUNT(*) FROM encounters a, encounters b, encounters c";

fn service(timeout: Duration, pool_size: usize) -> (TempDir, QueryService) {
    service_with(timeout, pool_size, ServiceSettings::default())
}

fn service_with(
    timeout: Duration,
    pool_size: usize,
    settings: ServiceSettings,
) -> (TempDir, QueryService) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("quiz.db");
    seed_demo(&path).expect("seed demo data");
    let options = StoreOptions {
        timeout,
        pool_size,
        ..StoreOptions::default()
    };
    let store = Arc::new(Store::open(&path, options).expect("open store"));
    (dir, QueryService::new(store, settings))
}

#[test]
fn runaway_query_times_out_and_connection_recovers() {
    let (_dir, service) = service(Duration::from_millis(300), 1);
    let memory = Arc::new(MemoryActivity::default());
    let service = service.with_activity(memory.clone());

    let started = Instant::now();
    let err = service
        .run_query(&QueryRequest::new(RUNAWAY))
        .expect_err("timeout");
    assert!(
        matches!(err, QueryError::Failed(ExecError::Timeout { .. })),
        "{err:?}"
    );
    assert_eq!(err.code(), "Timeout");
    assert!(started.elapsed() < Duration::from_secs(10));

    let page = service
        .run_query(&QueryRequest::new("SELECT COUNT(*) FROM patients"))
        .expect("pool recovered");
    assert_eq!(page.row_count, 1);

    let records = memory.records();
    assert_eq!(records[0].outcome, Outcome::Failed("Timeout"));
    assert_eq!(records[1].outcome, Outcome::Success);
}

#[test]
fn other_connections_serve_while_one_is_busy() {
    let (_dir, service) = service(Duration::from_secs(2), 2);
    let counters = Arc::new(CounterActivity::default());
    let service = service.with_activity(counters.clone());

    let slow = {
        let service = service.clone();
        thread::spawn(move || service.run_query(&QueryRequest::new(RUNAWAY)))
    };
    thread::sleep(Duration::from_millis(100));

    let started = Instant::now();
    let page = service
        .run_query(&QueryRequest::new("SELECT id FROM patients ORDER BY id").page_size(100))
        .expect("fast query");
    assert_eq!(page.row_count, 100);
    assert!(started.elapsed() < Duration::from_secs(2));

    let err = slow.join().expect("thread").expect_err("timeout");
    assert_eq!(err.code(), "Timeout");

    let stats = counters.snapshot();
    assert_eq!(stats.attempts, 2);
    assert_eq!(stats.timeouts, 1);
    assert_eq!(stats.succeeded, 1);
}

#[test]
fn exact_count_that_runs_out_of_time_reports_unknown_total() {
    let settings = ServiceSettings {
        default_page_size: PageSize::nearest(100),
        count_policy: CountPolicy::Exact,
    };
    let (_dir, service) = service_with(Duration::from_millis(500), 1, settings);

    let page = service
        .run_query(&QueryRequest::new("SELECT a.id FROM patients a, patients b, patients c"))
        .expect("page is returned without a total");
    assert_eq!(page.row_count, 100);
    assert!(page.has_more);
    assert_eq!(page.total_rows, None);

    let counted = service
        .run_query(&QueryRequest::new("SELECT id FROM patients"))
        .expect("cheap count");
    assert_eq!(counted.total_rows, Some(1_200));
}
