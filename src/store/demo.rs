//! Small deterministic healthcare dataset for local use and tests.
//!
//! Seeding uses its own writable connection. The query store never writes.

use std::path::Path;
use std::time::Instant;

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rusqlite::{params, Connection, OpenFlags};
use serde::Serialize;
use tracing::info;

use super::error::{Result, StoreError};

pub(crate) const PATIENT_COUNT: usize = 1_200;
pub(crate) const ENCOUNTERS_PER_PATIENT: usize = 3;
const SEED: u64 = 0x5EED_DA7A;

const FIRST_NAMES: &[&str] = &[
    "Ada", "Ben", "Chloe", "Diego", "Elena", "Farah", "Gus", "Hana", "Ivan", "Jade", "Kofi",
    "Lena", "Marco", "Nia", "Omar", "Priya",
];
const LAST_NAMES: &[&str] = &[
    "Smith", "Garcia", "Nguyen", "Okafor", "Johnson", "Kowalski", "Haddad", "Larsen", "Tanaka",
    "Moreau", "Silva",
];
const CITIES: &[&str] = &["Boston", "Worcester", "Springfield", "Lowell", "Cambridge"];
const ENCOUNTER_CLASSES: &[&str] = &[
    "ambulatory",
    "outpatient",
    "emergency",
    "inpatient",
    "wellness",
];

const SCHEMA: &str = "
    CREATE TABLE patients (
        id INTEGER PRIMARY KEY,
        first_name TEXT NOT NULL,
        last_name TEXT NOT NULL,
        birthdate TEXT NOT NULL,
        gender TEXT NOT NULL,
        city TEXT
    );
    CREATE TABLE encounters (
        id INTEGER PRIMARY KEY,
        patient_id INTEGER NOT NULL REFERENCES patients(id),
        encounter_date TEXT NOT NULL,
        encounter_class TEXT NOT NULL,
        total_cost REAL NOT NULL
    );
    CREATE INDEX encounters_patient ON encounters(patient_id);
";

/// Result of [`seed_demo`].
#[derive(Clone, Debug, Serialize)]
pub struct SeedReport {
    /// Rows written to `patients`.
    pub patients: usize,
    /// Rows written to `encounters`.
    pub encounters: usize,
    /// Time spent seeding in milliseconds.
    pub duration_ms: f64,
}

/// Creates `patients` and `encounters` in the database at `path`, creating
/// the file when needed. Fails if either table already exists.
pub fn seed_demo(path: impl AsRef<Path>) -> Result<SeedReport> {
    let path = path.as_ref();
    let start = Instant::now();
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
    let mut conn = Connection::open_with_flags(path, flags)?;

    for table in ["patients", "encounters"] {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            [table],
            |row| row.get(0),
        )?;
        if exists {
            return Err(StoreError::AlreadySeeded {
                table,
                path: path.to_path_buf(),
            });
        }
    }

    let tx = conn.transaction()?;
    tx.execute_batch(SCHEMA)?;
    let mut encounters = 0usize;
    {
        let mut insert_patient = tx.prepare(
            "INSERT INTO patients (id, first_name, last_name, birthdate, gender, city) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        let mut insert_encounter = tx.prepare(
            "INSERT INTO encounters (id, patient_id, encounter_date, encounter_class, total_cost) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        let mut rng = ChaCha8Rng::seed_from_u64(SEED);
        for idx in 0..PATIENT_COUNT {
            let id = idx as i64 + 1;
            let city = rng.gen_bool(0.85).then(|| pick(&mut rng, CITIES));
            let birthdate = format!(
                "{}-{:02}-{:02}",
                rng.gen_range(1940..2005),
                rng.gen_range(1..=12),
                rng.gen_range(1..=28)
            );
            let gender = if rng.gen_bool(0.5) { "F" } else { "M" };
            insert_patient.execute(params![
                id,
                pick(&mut rng, FIRST_NAMES),
                pick(&mut rng, LAST_NAMES),
                birthdate,
                gender,
                city,
            ])?;
            for visit in 0..ENCOUNTERS_PER_PATIENT {
                let seq = idx * ENCOUNTERS_PER_PATIENT + visit;
                let encounter_date = format!(
                    "{}-{:02}-{:02}",
                    rng.gen_range(2015..2025),
                    rng.gen_range(1..=12),
                    rng.gen_range(1..=28)
                );
                let cents: u32 = rng.gen_range(0..250_000);
                insert_encounter.execute(params![
                    seq as i64 + 1,
                    id,
                    encounter_date,
                    pick(&mut rng, ENCOUNTER_CLASSES),
                    f64::from(cents) / 100.0,
                ])?;
                encounters += 1;
            }
        }
    }
    tx.commit()?;

    let report = SeedReport {
        patients: PATIENT_COUNT,
        encounters,
        duration_ms: start.elapsed().as_secs_f64() * 1000.0,
    };
    info!(
        path = %path.display(),
        patients = report.patients,
        encounters = report.encounters,
        duration_ms = report.duration_ms,
        "store.seed_demo"
    );
    Ok(report)
}

fn pick(rng: &mut ChaCha8Rng, items: &[&'static str]) -> &'static str {
    items.choose(rng).copied().unwrap_or_default()
}
