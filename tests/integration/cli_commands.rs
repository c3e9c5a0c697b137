#![allow(missing_docs)]

use std::fs;
use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use tempfile::TempDir;

fn seeded_db() -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("quiz.db");
    cargo_bin_cmd!("sqlquiz")
        .arg("--db")
        .arg(&path)
        .arg("seed-demo")
        .assert()
        .success();
    (dir, path)
}

fn json_stdout(output: &[u8]) -> Value {
    serde_json::from_slice(output).expect("json output")
}

#[test]
fn seed_demo_refuses_to_overwrite() {
    let (_dir, path) = seeded_db();
    assert!(path.exists());
    cargo_bin_cmd!("sqlquiz")
        .arg("--db")
        .arg(&path)
        .arg("seed-demo")
        .assert()
        .failure();
}

#[test]
fn query_json_reports_page_and_insights() {
    let (_dir, path) = seeded_db();
    let output = cargo_bin_cmd!("sqlquiz")
        .arg("--db")
        .arg(&path)
        .args(["--format", "json", "query"])
        .arg("SELECT id, city FROM patients ORDER BY id")
        .args(["--page", "3", "--page-size", "250", "--insights"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let body = json_stdout(&output);
    assert_eq!(body["page"]["row_count"], 250);
    assert_eq!(body["page"]["page"], 3);
    assert_eq!(body["page"]["has_more"], true);
    assert_eq!(body["page"]["rows"][0][0]["v"], 501);
    assert!(body["insights"]["suggestions"].is_array());
}

#[test]
fn query_text_prints_a_table() {
    let (_dir, path) = seeded_db();
    let output = cargo_bin_cmd!("sqlquiz")
        .arg("--db")
        .arg(&path)
        .arg("query")
        .arg("SELECT COUNT(*) AS n FROM encounters")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    assert!(text.starts_with("n"), "{text}");
    assert!(text.contains("3600"), "{text}");
    assert!(text.contains("1 rows"), "{text}");
}

#[test]
fn rejected_query_exits_with_code() {
    let (_dir, path) = seeded_db();
    let output = cargo_bin_cmd!("sqlquiz")
        .arg("--db")
        .arg(&path)
        .arg("query")
        .arg("DELETE FROM patients")
        .assert()
        .failure()
        .code(1)
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8(output).expect("utf8");
    assert!(stderr.contains("[MustBeSelect]"), "{stderr}");
}

#[test]
fn schema_lists_tables_and_samples() {
    let (_dir, path) = seeded_db();
    let output = cargo_bin_cmd!("sqlquiz")
        .arg("--db")
        .arg(&path)
        .args(["--format", "json", "schema"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let schema = json_stdout(&output);
    let names: Vec<_> = schema
        .as_array()
        .expect("array")
        .iter()
        .map(|table| table["name"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(names, vec!["encounters", "patients"]);

    let output = cargo_bin_cmd!("sqlquiz")
        .arg("--db")
        .arg(&path)
        .args(["schema", "--sample", "patients"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    assert!(text.contains("first_name"), "{text}");
    assert!(text.contains("5 rows"), "{text}");
}

#[test]
fn check_exit_codes_follow_the_verdict() {
    let (_dir, path) = seeded_db();
    let output = cargo_bin_cmd!("sqlquiz")
        .arg("--db")
        .arg(&path)
        .arg("check")
        .arg("SELECT id FROM patients WHERE gender = 'F' ORDER BY id")
        .arg("SELECT id FROM patients WHERE 'F' = gender ORDER BY id")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert!(String::from_utf8_lossy(&output).starts_with("Correct!"));

    let output = cargo_bin_cmd!("sqlquiz")
        .arg("--db")
        .arg(&path)
        .args(["--format", "json", "check"])
        .arg("SELECT id FROM patients LIMIT 10")
        .arg("SELECT id FROM patients LIMIT 20")
        .assert()
        .code(2)
        .get_output()
        .stdout
        .clone();
    let check = json_stdout(&output);
    assert_eq!(check["correct"], false);
    assert_eq!(
        check["message"],
        "Incorrect. Your query returned 10 rows, expected 20 rows."
    );
}

#[test]
fn config_file_supplies_database_and_defaults() {
    let (dir, path) = seeded_db();
    let config = dir.path().join("sqlquiz.toml");
    fs::write(
        &config,
        format!(
            "[database]\npath = {:?}\n\n[query]\n\
             default_page_size = 500\ncount_policy = \"exact\"\n",
            path.display().to_string()
        ),
    )
    .expect("write config");

    let output = cargo_bin_cmd!("sqlquiz")
        .arg("--config")
        .arg(&config)
        .args(["--format", "json", "query", "SELECT * FROM patients"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let body = json_stdout(&output);
    assert_eq!(body["page"]["page_size"], 500);
    assert_eq!(body["page"]["total_rows"], 1200);

    fs::write(&config, "[query]\ndefault_page_size = 300\n").expect("rewrite config");
    cargo_bin_cmd!("sqlquiz")
        .arg("--config")
        .arg(&config)
        .args(["query", "SELECT 1"])
        .assert()
        .failure();
}

#[test]
fn sample_queries_name_the_demo_tables() {
    let (_dir, path) = seeded_db();
    let output = cargo_bin_cmd!("sqlquiz")
        .arg("--db")
        .arg(&path)
        .args(["--format", "json", "sample-queries"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let samples = json_stdout(&output);
    assert!(samples["basic"]
        .as_str()
        .is_some_and(|sql| sql.contains("FROM \"encounters\"")));
    assert!(samples["join"].as_str().is_some_and(|sql| sql.contains("patient_id")));
}

#[test]
fn challenges_list_and_attempt() {
    let output = cargo_bin_cmd!("sqlquiz")
        .arg("challenges")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    assert!(text.starts_with("Basic"), "{text}");
    assert!(text.contains("Patient Count"), "{text}");

    let (_dir, path) = seeded_db();
    let output = cargo_bin_cmd!("sqlquiz")
        .arg("--db")
        .arg(&path)
        .args(["--format", "json", "attempt", "1", "SELECT COUNT(*) FROM patients"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let attempt = json_stdout(&output);
    assert_eq!(attempt["correct"], true);
    assert_eq!(attempt["score"], 100);

    cargo_bin_cmd!("sqlquiz")
        .arg("--db")
        .arg(&path)
        .args(["attempt", "1", "SELECT 1", "--hints", "1"])
        .assert()
        .code(2);

    cargo_bin_cmd!("sqlquiz")
        .arg("--db")
        .arg(&path)
        .args(["attempt", "77", "SELECT 1"])
        .assert()
        .code(1);
}
