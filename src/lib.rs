//! SQLQuiz query core.
//!
//! Accepts candidate-submitted SQL, refuses anything that is not a single
//! SELECT, runs it against a read-only SQLite store under a hard deadline,
//! and returns one typed page of results at a time.
//!
//! ```no_run
//! use std::sync::Arc;
//! use sqlquiz::service::{QueryRequest, QueryService, ServiceSettings};
//! use sqlquiz::store::{Store, StoreOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(Store::open("quiz.db", StoreOptions::default())?);
//! let service = QueryService::new(store, ServiceSettings::default());
//! let page = service.run_query(&QueryRequest::new("SELECT * FROM patients").page_size(100))?;
//! println!("{} rows, more: {}", page.row_count, page.has_more);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod activity;
pub mod challenges;
pub mod grading;
pub mod query;
pub mod server;
pub mod service;
pub mod store;

pub use activity::{ActivityRecord, ActivitySink, SessionToken};
pub use query::{PageEnvelope, QueryError};
pub use service::{QueryRequest, QueryService};
