#![forbid(unsafe_code)]

//! Request entry point tying the query core to a store.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::debug;

use crate::activity::{
    default_activity, ActivityRecord, ActivitySink, Outcome, SessionToken, VerdictSummary,
};
use crate::query::{
    format, plan, validate, CountPolicy, PageEnvelope, PageRequest, PageSize, QueryError,
    QueryErrorWithCode,
};
use crate::store::{sanitize_table_name, Catalog, SqliteCatalog, Store, StoreError};

/// Rows returned by [`QueryService::sample_data`].
pub const SAMPLE_ROWS: u32 = 5;

/// Service-level knobs that are not store options.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServiceSettings {
    /// Page size used when a request does not name one.
    pub default_page_size: PageSize,
    /// Whether windowed plans compute exact totals.
    pub count_policy: CountPolicy,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            default_page_size: PageSize::DEFAULT,
            count_policy: CountPolicy::Never,
        }
    }
}

/// One call to [`QueryService::run_query`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryRequest {
    /// Raw SQL text.
    pub text: String,
    /// Requested 1-based page.
    pub page: Option<u32>,
    /// Requested rows per page.
    pub page_size: Option<u32>,
    /// Caller session, copied onto the activity record.
    pub session: Option<SessionToken>,
}

impl QueryRequest {
    /// Request for the first page at the default size.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Sets the page number.
    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    /// Sets the page size.
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Attaches a session token.
    pub fn session(mut self, session: SessionToken) -> Self {
        self.session = Some(session);
        self
    }
}

/// Errors from the schema-aware helpers.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Query core failure.
    #[error(transparent)]
    Query(#[from] QueryError),
    /// Catalog or store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Runs candidate SQL against one store.
#[derive(Clone)]
pub struct QueryService {
    store: Arc<Store>,
    catalog: Arc<dyn Catalog>,
    activity: Arc<dyn ActivitySink>,
    settings: ServiceSettings,
}

impl QueryService {
    /// Creates a service that logs activity through `tracing`.
    pub fn new(store: Arc<Store>, settings: ServiceSettings) -> Self {
        let catalog = Arc::new(SqliteCatalog::new(Arc::clone(&store)));
        Self {
            store,
            catalog,
            activity: default_activity(),
            settings,
        }
    }

    /// Replaces the activity sink.
    pub fn with_activity(mut self, activity: Arc<dyn ActivitySink>) -> Self {
        self.activity = activity;
        self
    }

    /// Replaces the catalog.
    pub fn with_catalog(mut self, catalog: Arc<dyn Catalog>) -> Self {
        self.catalog = catalog;
        self
    }

    /// Underlying store.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Schema lookups.
    pub fn catalog(&self) -> &dyn Catalog {
        self.catalog.as_ref()
    }

    /// Settings in effect.
    pub fn settings(&self) -> ServiceSettings {
        self.settings
    }

    /// Validates, plans, executes and formats one query.
    ///
    /// Exactly one activity record is emitted per call.
    pub fn run_query(&self, request: &QueryRequest) -> Result<PageEnvelope, QueryError> {
        let started = Instant::now();
        let outcome = self.attempt(request);

        let (verdict, result, row_count) = match &outcome {
            Ok(envelope) => (VerdictSummary::Accepted, Outcome::Success, envelope.row_count),
            Err(err) => {
                debug!(error = %QueryErrorWithCode(err), "service.run_query.error");
                match err {
                    QueryError::Rejected(rejection) => {
                        (VerdictSummary::Rejected(rejection.code()), Outcome::Rejected, 0)
                    }
                    QueryError::Failed(failure) => {
                        (VerdictSummary::Accepted, Outcome::Failed(failure.code()), 0)
                    }
                }
            }
        };
        self.activity.record(&ActivityRecord {
            session: request.session.clone(),
            query_text: request.text.clone(),
            verdict,
            outcome: result,
            duration: started.elapsed(),
            row_count,
        });
        outcome
    }

    fn attempt(&self, request: &QueryRequest) -> Result<PageEnvelope, QueryError> {
        let query = validate(&request.text).into_result()?;
        let page = PageRequest::new(
            request.page,
            request.page_size,
            self.settings.default_page_size,
        );
        let plan = plan(&query, page, self.settings.count_policy)?;
        let exec_started = Instant::now();
        let rows = self.store.execute(&plan)?;
        Ok(format(rows, &plan, exec_started.elapsed()))
    }

    /// First few rows of a user table, run through the normal query path.
    pub fn sample_data(
        &self,
        table: &str,
        session: Option<SessionToken>,
    ) -> Result<PageEnvelope, ServiceError> {
        let name = sanitize_table_name(table)
            .filter(|name| name == table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        if !self.catalog.table_exists(&name)? {
            return Err(StoreError::UnknownTable(name).into());
        }
        let mut request =
            QueryRequest::new(format!("SELECT * FROM \"{name}\" LIMIT {SAMPLE_ROWS}"));
        request.session = session;
        Ok(self.run_query(&request)?)
    }
}
