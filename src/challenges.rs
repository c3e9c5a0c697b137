#![forbid(unsafe_code)]

//! Starter queries generated from the schema, and the built-in challenge set
//! for the demo dataset.

use serde::Serialize;
use thiserror::Error;

use crate::activity::SessionToken;
use crate::grading::{check_answer, AnswerCheck};
use crate::service::QueryService;
use crate::store::{quote_ident, Catalog, ColumnDef, Result as StoreResult};

/// Points removed from a correct attempt for each hint used.
pub const HINT_PENALTY: u32 = 10;

const NO_TABLES: &str = "-- No tables available\n-- Seed the demo data or load a dataset first";

/// Ready-to-run examples for the current schema.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SampleQueries {
    /// Browse the first table.
    pub basic: String,
    /// Join the first two tables.
    pub join: String,
    /// Group the first table by a text column.
    pub aggregate: String,
}

/// Builds [`SampleQueries`] from whatever tables `catalog` reports.
///
/// Tables are taken in name order. The join prefers a `<table>_id` foreign
/// key column, then any shared id-like column that actually matches rows,
/// and otherwise falls back to `id = id` with a note to adjust it.
pub fn sample_queries(catalog: &dyn Catalog) -> StoreResult<SampleQueries> {
    let tables = catalog.tables()?;
    let Some(first) = tables.first() else {
        return Ok(SampleQueries {
            basic: NO_TABLES.to_string(),
            join: NO_TABLES.to_string(),
            aggregate: NO_TABLES.to_string(),
        });
    };
    let first_columns = catalog.columns(first)?;

    let basic = format!(
        "-- Browse {first} data\nSELECT * FROM {} LIMIT 10;",
        quote_ident(first)
    );

    let join = match tables.get(1) {
        Some(second) => {
            let second_columns = catalog.columns(second)?;
            let mut key = None;
            for (left, right) in join_candidates(
                (first.as_str(), first_columns.as_slice()),
                (second.as_str(), second_columns.as_slice()),
            ) {
                let found = catalog.joinable(
                    (first.as_str(), left.as_str()),
                    (second.as_str(), right.as_str()),
                )?;
                if found {
                    key = Some((left, right));
                    break;
                }
            }
            let (header, left, right) = match key {
                Some((left, right)) if left == right => {
                    (format!("-- Join {first} and {second} on {left}"), left, right)
                }
                Some((left, right)) => (
                    format!("-- Join {first}.{left} to {second}.{right}"),
                    left,
                    right,
                ),
                None => (
                    "-- Example join (adjust column names as needed)".to_string(),
                    "id".to_string(),
                    "id".to_string(),
                ),
            };
            format!(
                "{header}\nSELECT t1.*, t2.*\nFROM {} AS t1\n\
                 JOIN {} AS t2 ON t1.{} = t2.{}\nLIMIT 10;",
                quote_ident(first),
                quote_ident(second),
                quote_ident(&left),
                quote_ident(&right),
            )
        }
        None => format!("-- Only {first} is available; there is nothing to join yet"),
    };

    let aggregate = match first_columns.iter().find(|c| is_groupable(c)) {
        Some(column) => {
            let name = quote_ident(&column.name);
            format!(
                "-- Aggregate {first} by {}\nSELECT {name}, COUNT(*) AS record_count\nFROM {}\n\
                 GROUP BY {name}\nORDER BY record_count DESC;",
                column.name,
                quote_ident(first),
            )
        }
        None => format!(
            "-- Count all records\nSELECT COUNT(*) AS total_records\nFROM {};",
            quote_ident(first)
        ),
    };

    Ok(SampleQueries {
        basic,
        join,
        aggregate,
    })
}

fn join_candidates(
    (left, left_columns): (&str, &[ColumnDef]),
    (right, right_columns): (&str, &[ColumnDef]),
) -> Vec<(String, String)> {
    let has = |columns: &[ColumnDef], name: &str| {
        columns.iter().any(|c| c.name.eq_ignore_ascii_case(name))
    };
    let mut candidates = Vec::new();

    let right_key = format!("{}_id", singular(right));
    if has(left_columns, &right_key) && has(right_columns, "id") {
        candidates.push((right_key, "id".to_string()));
    }
    let left_key = format!("{}_id", singular(left));
    if has(right_columns, &left_key) && has(left_columns, "id") {
        candidates.push(("id".to_string(), left_key));
    }
    for column in left_columns {
        if column.name.to_ascii_lowercase().contains("id") && has(right_columns, &column.name) {
            candidates.push((column.name.clone(), column.name.clone()));
        }
    }
    candidates
}

fn singular(table: &str) -> &str {
    table.strip_suffix('s').unwrap_or(table)
}

fn is_groupable(column: &ColumnDef) -> bool {
    !column.pk
        && (column.declared_type.is_empty() || column.declared_type.eq_ignore_ascii_case("TEXT"))
}

/// Challenge difficulty, easiest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    /// Single-table lookups.
    Basic,
    /// Grouping and date functions.
    Intermediate,
    /// Joins and HAVING.
    Advanced,
    /// Multi-step analysis.
    Expert,
}

impl Difficulty {
    /// Every level in order.
    pub const ALL: [Difficulty; 4] = [
        Difficulty::Basic,
        Difficulty::Intermediate,
        Difficulty::Advanced,
        Difficulty::Expert,
    ];

    /// Display name.
    pub fn name(self) -> &'static str {
        match self {
            Difficulty::Basic => "Basic",
            Difficulty::Intermediate => "Intermediate",
            Difficulty::Advanced => "Advanced",
            Difficulty::Expert => "Expert",
        }
    }
}

/// One exercise graded against a reference query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Challenge {
    /// Stable identifier used in URLs and on the command line.
    pub id: u32,
    /// Short title.
    pub title: &'static str,
    /// What the candidate is asked to find.
    pub description: &'static str,
    /// Difficulty level.
    pub difficulty: Difficulty,
    /// Topic tag.
    pub category: &'static str,
    /// Hints, revealed one at a time by the client.
    pub hints: &'static [&'static str],
    /// Score for a correct answer with no hints.
    pub max_score: u32,
    /// Suggested time box.
    pub time_limit_minutes: u32,
    /// Reference answer. Never sent to clients.
    #[serde(skip)]
    pub expected_query: &'static str,
}

const CHALLENGES: &[Challenge] = &[
    Challenge {
        id: 1,
        title: "Patient Count",
        description: "How many patients are in the dataset?",
        difficulty: Difficulty::Basic,
        category: "basic",
        hints: &["Every patient is one row in patients", "COUNT(*) counts rows"],
        max_score: 100,
        time_limit_minutes: 10,
        expected_query: "SELECT COUNT(*) FROM patients;",
    },
    Challenge {
        id: 2,
        title: "Cities on File",
        description: "List every city patients live in, alphabetically, without duplicates. \
                      Leave out patients with no city recorded.",
        difficulty: Difficulty::Basic,
        category: "basic",
        hints: &[
            "DISTINCT removes duplicates",
            "city can be NULL",
            "Sort with ORDER BY",
        ],
        max_score: 100,
        time_limit_minutes: 10,
        expected_query: "SELECT DISTINCT city FROM patients WHERE city IS NOT NULL ORDER BY city;",
    },
    Challenge {
        id: 3,
        title: "Encounter Mix",
        description: "How many encounters are there of each encounter class? Show the class and \
                      its count, busiest class first.",
        difficulty: Difficulty::Intermediate,
        category: "operational",
        hints: &[
            "GROUP BY encounter_class",
            "COUNT(*) gives the total per group",
            "Break ties by class name",
        ],
        max_score: 100,
        time_limit_minutes: 15,
        expected_query: "SELECT encounter_class, COUNT(*) AS encounter_count FROM encounters \
                         GROUP BY encounter_class ORDER BY encounter_count DESC, encounter_class;",
    },
    Challenge {
        id: 4,
        title: "Busiest Year",
        description: "Which calendar year had the most encounters? Return the year and the \
                      number of encounters.",
        difficulty: Difficulty::Intermediate,
        category: "temporal",
        hints: &[
            "strftime('%Y', encounter_date) extracts the year",
            "Group by the year",
            "LIMIT 1 keeps the top row",
        ],
        max_score: 100,
        time_limit_minutes: 20,
        expected_query: "SELECT strftime('%Y', encounter_date) AS year, COUNT(*) AS visit_count \
                         FROM encounters GROUP BY year ORDER BY visit_count DESC, year LIMIT 1;",
    },
    Challenge {
        id: 5,
        title: "Cost by City",
        description: "What is the total encounter cost for each city, rounded to cents? Skip \
                      patients with no city and list the most expensive city first.",
        difficulty: Difficulty::Advanced,
        category: "financial",
        hints: &[
            "Join encounters to patients on patient_id",
            "SUM the cost and ROUND it to 2 places",
            "Filter out NULL cities before grouping",
        ],
        max_score: 150,
        time_limit_minutes: 25,
        expected_query: "SELECT p.city, ROUND(SUM(e.total_cost), 2) AS total_cost \
                         FROM encounters e JOIN patients p ON p.id = e.patient_id \
                         WHERE p.city IS NOT NULL GROUP BY p.city ORDER BY total_cost DESC;",
    },
    Challenge {
        id: 6,
        title: "Repeat Emergency Visits",
        description: "Which patients had more than one emergency encounter? Show the patient id \
                      and their number of emergency visits, most visits first, then by id.",
        difficulty: Difficulty::Advanced,
        category: "clinical",
        hints: &[
            "Filter encounter_class first",
            "HAVING filters groups",
            "Order by the count, then patient_id",
        ],
        max_score: 150,
        time_limit_minutes: 25,
        expected_query: "SELECT patient_id, COUNT(*) AS emergency_visits FROM encounters \
                         WHERE encounter_class = 'emergency' GROUP BY patient_id \
                         HAVING COUNT(*) > 1 ORDER BY emergency_visits DESC, patient_id;",
    },
    Challenge {
        id: 7,
        title: "Highest Lifetime Cost",
        description: "Find the ten patients with the highest total encounter cost. Show id, \
                      first and last name, and the total rounded to cents. Break ties by id.",
        difficulty: Difficulty::Expert,
        category: "financial",
        hints: &[
            "Join patients to encounters",
            "Group by the patient",
            "ORDER BY the total, then id, and LIMIT 10",
        ],
        max_score: 200,
        time_limit_minutes: 40,
        expected_query: "SELECT p.id, p.first_name, p.last_name, \
                         ROUND(SUM(e.total_cost), 2) AS lifetime_cost \
                         FROM patients p JOIN encounters e ON e.patient_id = p.id \
                         GROUP BY p.id ORDER BY lifetime_cost DESC, p.id LIMIT 10;",
    },
];

/// Every challenge, ordered by difficulty then id.
pub fn challenges() -> &'static [Challenge] {
    CHALLENGES
}

/// Challenges of one difficulty level.
#[derive(Clone, Debug, Serialize)]
pub struct ChallengeLevel {
    /// Level.
    pub difficulty: Difficulty,
    /// Display name of the level.
    pub name: &'static str,
    /// Challenges at this level.
    pub challenges: Vec<&'static Challenge>,
}

/// Challenges grouped by difficulty. Levels with no challenges are kept so
/// clients can render a fixed layout.
pub fn challenge_levels() -> Vec<ChallengeLevel> {
    Difficulty::ALL
        .into_iter()
        .map(|difficulty| ChallengeLevel {
            difficulty,
            name: difficulty.name(),
            challenges: CHALLENGES
                .iter()
                .filter(|c| c.difficulty == difficulty)
                .collect(),
        })
        .collect()
}

/// Errors from challenge lookups.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChallengeError {
    /// No challenge has this id.
    #[error("challenge {0} not found")]
    NotFound(u32),
}

/// Looks a challenge up by id.
pub fn challenge(id: u32) -> Result<&'static Challenge, ChallengeError> {
    CHALLENGES
        .iter()
        .find(|c| c.id == id)
        .ok_or(ChallengeError::NotFound(id))
}

/// Graded attempt at a challenge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChallengeAttempt {
    /// Challenge answered.
    pub challenge_id: u32,
    /// Points awarded; zero unless correct.
    pub score: u32,
    /// Hints counted against the score.
    pub hints_used: u32,
    /// Comparison against the reference query.
    #[serde(flatten)]
    pub check: AnswerCheck,
}

/// Grades `candidate` against challenge `id` with [`check_answer`].
///
/// A correct answer scores the challenge maximum less [`HINT_PENALTY`] per
/// hint. `hints_used` is capped at the number of hints the challenge has.
pub fn attempt_challenge(
    service: &QueryService,
    id: u32,
    candidate: &str,
    hints_used: u32,
    session: Option<SessionToken>,
) -> Result<ChallengeAttempt, ChallengeError> {
    let challenge = challenge(id)?;
    let hints_used = hints_used.min(u32::try_from(challenge.hints.len()).unwrap_or(u32::MAX));
    let check = check_answer(service, candidate, challenge.expected_query, session);
    let score = if check.correct {
        challenge
            .max_score
            .saturating_sub(hints_used.saturating_mul(HINT_PENALTY))
    } else {
        0
    };
    tracing::debug!(challenge = id, correct = check.correct, score, "challenge.attempt");
    Ok(ChallengeAttempt {
        challenge_id: id,
        score,
        hints_used,
        check,
    })
}
