#![allow(missing_docs)]

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use sqlquiz::activity::{MemoryActivity, Outcome, VerdictSummary};
use sqlquiz::query::value::Opaque;
use sqlquiz::query::{CountPolicy, PageSize, Value};
use sqlquiz::service::{QueryRequest, QueryService, ServiceSettings};
use sqlquiz::store::{seed_demo, Store, StoreOptions};
use tempfile::TempDir;

const PATIENTS: u64 = 1_200;

fn setup_db() -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("quiz.db");
    seed_demo(&path).expect("seed demo data");
    (dir, path)
}

fn service_with(path: &PathBuf, settings: ServiceSettings) -> (QueryService, Arc<MemoryActivity>) {
    let store = Arc::new(Store::open(path, StoreOptions::default()).expect("open store"));
    let memory = Arc::new(MemoryActivity::default());
    let service = QueryService::new(store, settings).with_activity(memory.clone());
    (service, memory)
}

fn ids(rows: &[Vec<Value>]) -> Vec<i64> {
    rows.iter()
        .map(|row| match row[0] {
            Value::Int(id) => id,
            ref other => panic!("unexpected id value {other:?}"),
        })
        .collect()
}

#[test]
fn count_star_returns_one_row() {
    let (_dir, path) = setup_db();
    let (service, _) = service_with(&path, ServiceSettings::default());
    let page = service
        .run_query(&QueryRequest::new("SELECT COUNT(*) FROM patients"))
        .expect("count");
    assert_eq!(page.row_count, 1);
    assert_eq!(page.rows[0][0], Value::Int(PATIENTS as i64));
    assert_eq!(page.total_rows, Some(1));
    assert!(!page.has_more);
}

#[test]
fn mutating_statement_never_reaches_the_store() {
    let (_dir, path) = setup_db();
    let (service, memory) = service_with(&path, ServiceSettings::default());
    let err = service
        .run_query(&QueryRequest::new("DELETE FROM patients"))
        .expect_err("rejected");
    assert_eq!(err.code(), "MustBeSelect");

    let err = service
        .run_query(&QueryRequest::new(
            "SELECT * FROM patients; DROP TABLE patients;",
        ))
        .expect_err("rejected");
    assert_eq!(err.code(), "MultipleStatements");

    let page = service
        .run_query(&QueryRequest::new("SELECT COUNT(*) FROM patients"))
        .expect("count");
    assert_eq!(page.rows[0][0], Value::Int(PATIENTS as i64));

    let records = memory.records();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].verdict, VerdictSummary::Rejected("MustBeSelect"));
    assert_eq!(records[0].outcome, Outcome::Rejected);
}

#[test]
fn adjacent_pages_do_not_overlap() {
    let (_dir, path) = setup_db();
    let (service, _) = service_with(&path, ServiceSettings::default());
    let sql = "SELECT id FROM patients ORDER BY id";
    let first = service
        .run_query(&QueryRequest::new(sql).page(1).page_size(100))
        .expect("page 1");
    let second = service
        .run_query(&QueryRequest::new(sql).page(2).page_size(100))
        .expect("page 2");

    assert_eq!(first.row_count, 100);
    assert_eq!(second.row_count, 100);
    assert!(first.has_more && second.has_more);
    assert_eq!(second.page, 2);

    let a: HashSet<i64> = ids(&first.rows).into_iter().collect();
    let b: HashSet<i64> = ids(&second.rows).into_iter().collect();
    assert!(a.is_disjoint(&b));
    assert_eq!(ids(&first.rows), (1..=100).collect::<Vec<_>>());
    assert_eq!(ids(&second.rows), (101..=200).collect::<Vec<_>>());
}

#[test]
fn walking_every_page_covers_the_result_once() {
    let (_dir, path) = setup_db();
    let (service, _) = service_with(&path, ServiceSettings::default());
    let sql = "SELECT id FROM patients ORDER BY id";
    let mut seen = Vec::new();
    let mut page = 1;
    loop {
        let envelope = service
            .run_query(&QueryRequest::new(sql).page(page).page_size(500))
            .expect("page");
        seen.extend(ids(&envelope.rows));
        if !envelope.has_more {
            assert_eq!(envelope.total_rows, Some(PATIENTS));
            break;
        }
        page += 1;
    }
    assert_eq!(page, 3);
    assert_eq!(seen, (1..=PATIENTS as i64).collect::<Vec<_>>());
}

#[test]
fn small_user_limit_is_honored_verbatim() {
    let (_dir, path) = setup_db();
    let (service, _) = service_with(&path, ServiceSettings::default());
    let page = service
        .run_query(
            &QueryRequest::new("SELECT * FROM patients LIMIT 50")
                .page(3)
                .page_size(250),
        )
        .expect("limited");
    assert_eq!(page.row_count, 50);
    assert!(page.user_limit_honored);
    assert_eq!(page.page, 1);
    assert!(!page.has_more);
}

#[test]
fn large_user_limit_is_paginated_within_bound() {
    let (_dir, path) = setup_db();
    let (service, _) = service_with(&path, ServiceSettings::default());
    let sql = "SELECT id FROM patients ORDER BY id LIMIT 1100";
    let first = service
        .run_query(&QueryRequest::new(sql).page_size(1_000))
        .expect("page 1");
    assert_eq!(first.row_count, 1_000);
    assert!(first.has_more);
    assert!(!first.user_limit_honored);

    let second = service
        .run_query(&QueryRequest::new(sql).page(2).page_size(1_000))
        .expect("page 2");
    assert_eq!(second.row_count, 100);
    assert!(!second.has_more);
    assert_eq!(second.total_rows, Some(1_100));
}

#[test]
fn limit_ceiling_is_enforced() {
    let (_dir, path) = setup_db();
    let (service, _) = service_with(&path, ServiceSettings::default());
    service
        .run_query(&QueryRequest::new("SELECT * FROM encounters LIMIT 5000"))
        .expect("at ceiling");
    for limit in [5_001, 50_000] {
        let err = service
            .run_query(&QueryRequest::new(format!(
                "SELECT * FROM encounters LIMIT {limit}"
            )))
            .expect_err("over ceiling");
        assert_eq!(err.code(), "LimitTooLarge");
    }
}

#[test]
fn page_past_the_end_is_empty() {
    let (_dir, path) = setup_db();
    let (service, _) = service_with(&path, ServiceSettings::default());
    let page = service
        .run_query(&QueryRequest::new("SELECT id FROM patients").page(99).page_size(100))
        .expect("empty page");
    assert_eq!(page.row_count, 0);
    assert!(!page.has_more);
    assert_eq!(page.total_rows, None);
    assert_eq!(page.columns[0].name, "id");
}

#[test]
fn exact_count_policy_reports_totals() {
    let (_dir, path) = setup_db();
    let settings = ServiceSettings {
        default_page_size: PageSize::nearest(100),
        count_policy: CountPolicy::Exact,
    };
    let (service, _) = service_with(&path, settings);
    let page = service
        .run_query(&QueryRequest::new("SELECT * FROM patients"))
        .expect("page");
    assert_eq!(page.page_size, 100);
    assert_eq!(page.total_rows, Some(PATIENTS));
    assert!(page.has_more);
}

#[test]
fn page_sizes_snap_to_allowed_values() {
    let (_dir, path) = setup_db();
    let (service, _) = service_with(&path, ServiceSettings::default());
    let page = service
        .run_query(&QueryRequest::new("SELECT id FROM patients").page(0).page_size(300))
        .expect("snapped");
    assert_eq!(page.page_size, 250);
    assert_eq!(page.page, 1);
    assert_eq!(page.row_count, 250);
}

#[test]
fn values_keep_their_types() {
    let (_dir, path) = setup_db();
    let (service, _) = service_with(&path, ServiceSettings::default());
    let page = service
        .run_query(&QueryRequest::new(
            "SELECT 9007199254740993 AS big, 42 AS small, 1.5 AS r, \
             NULL AS n, x'0102' AS b, 'hé' AS t",
        ))
        .expect("values");
    assert_eq!(
        page.rows[0],
        vec![
            Value::BigInt("9007199254740993".into()),
            Value::Int(42),
            Value::Real(1.5),
            Value::Null,
            Value::Blob(Opaque {
                len: 2,
                base64: "AQI=".into()
            }),
            Value::Text("hé".into()),
        ]
    );
    let types: Vec<_> = page.columns.iter().map(|c| c.data_type.as_str()).collect();
    assert_eq!(types, vec!["integer", "integer", "real", "null", "blob", "text"]);
}

#[test]
fn duplicate_columns_are_disambiguated() {
    let (_dir, path) = setup_db();
    let (service, _) = service_with(&path, ServiceSettings::default());
    let sql = "SELECT p.id, e.id, e.patient_id FROM patients p \
               JOIN encounters e ON e.patient_id = p.id ORDER BY e.id";
    for request in [
        QueryRequest::new(format!("{sql} LIMIT 3")),
        QueryRequest::new(sql).page(2).page_size(100),
    ] {
        let page = service.run_query(&request).expect("join");
        let names: Vec<_> = page.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "id_2", "patient_id"]);
        assert_eq!(page.columns[0].data_type, "INTEGER");
        assert_eq!(page.rows[0].len(), 3);
    }
}

#[test]
fn comments_and_trailing_semicolons_are_accepted() {
    let (_dir, path) = setup_db();
    let (service, _) = service_with(&path, ServiceSettings::default());
    let page = service
        .run_query(&QueryRequest::new(
            "-- how many women?\nSELECT COUNT(*) FROM patients WHERE gender = 'F' -- filter\n;",
        ))
        .expect("commented");
    assert_eq!(page.row_count, 1);
}

#[test]
fn engine_errors_are_classified() {
    let (_dir, path) = setup_db();
    let (service, _) = service_with(&path, ServiceSettings::default());
    let err = service
        .run_query(&QueryRequest::new("SELECT * FORM patients"))
        .expect_err("syntax");
    assert_eq!(err.code(), "SyntaxError");
    let err = service
        .run_query(&QueryRequest::new("SELECT missing_column FROM patients"))
        .expect_err("runtime");
    assert_eq!(err.code(), "RuntimeError");
    assert!(err.to_string().contains("missing_column"));
}

#[test]
fn concurrent_requests_are_independent() {
    let (_dir, path) = setup_db();
    let (service, memory) = service_with(&path, ServiceSettings::default());
    let handles: Vec<_> = (1..=8u32)
        .map(|page| {
            let service = service.clone();
            thread::spawn(move || {
                service
                    .run_query(
                        &QueryRequest::new("SELECT id FROM patients ORDER BY id")
                            .page(page)
                            .page_size(100),
                    )
                    .expect("page")
            })
        })
        .collect();
    for (idx, handle) in handles.into_iter().enumerate() {
        let page = handle.join().expect("thread");
        let first = idx as i64 * 100 + 1;
        assert_eq!(ids(&page.rows)[0], first);
    }
    assert_eq!(memory.records().len(), 8);
}
