//! Store client handle
//!
//! One [`DatabaseConnection`] is built per process (DI singleton) and shared by
//! every repository. It talks either to a hosted PostgREST endpoint or to a
//! local SQLite pool; both return rows as JSON objects.

use crate::config::{Config, StoreSettings};
use crate::infrastructure::query::{Query, SqlValue};
use di::{Ref, inject, injectable};
use log::{debug, error};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, InvalidHeaderValue};
use serde::Deserialize;
use serde_json::Value;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Mutex;
use thiserror::Error;

/// Pool handed to DI-created connections in tests.
static TEST_POOL: Mutex<Option<SqlitePool>> = Mutex::new(None);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store rejected the request ({status}): {message}")]
    Remote {
        status: u16,
        code: Option<String>,
        message: String,
    },
    #[error("row already exists")]
    Conflict,
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("malformed row: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

/// Error body returned by PostgREST.
#[derive(Debug, Deserialize)]
struct RemoteErrorBody {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

/// Hosted PostgREST endpoint.
pub struct RestStore {
    http: reqwest::Client,
    url: String,
    api_key: String,
}

impl RestStore {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> RestStore {
        RestStore {
            http: reqwest::Client::new(),
            url: url.into().trim_end_matches('/').to_owned(),
            api_key: api_key.into(),
        }
    }

    /// Headers for a single request. The bearer token is resolved per call and
    /// falls back to the API key, which the store treats as anonymous.
    fn headers(&self, token: Option<&str>) -> Result<HeaderMap, StoreError> {
        let invalid = |_: InvalidHeaderValue| {
            StoreError::InvalidQuery("credentials are not valid header values".into())
        };

        let mut headers = HeaderMap::new();
        headers.insert("apikey", HeaderValue::from_str(&self.api_key).map_err(invalid)?);
        let bearer = format!("Bearer {}", token.unwrap_or(self.api_key.as_str()));
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&bearer).map_err(invalid)?);
        Ok(headers)
    }

    async fn execute(&self, query: &Query, token: Option<&str>) -> Result<Vec<Value>, StoreError> {
        let request = query.to_postgrest()?;
        debug!("{} {} {:?}", request.method, request.path, request.params);

        let mut builder = self
            .http
            .request(request.method, format!("{}{}", self.url, request.path))
            .headers(self.headers(token)?)
            .query(&request.params);
        if let Some(prefer) = request.prefer {
            builder = builder.header("Prefer", prefer);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let body: Option<RemoteErrorBody> = serde_json::from_str(&text).ok();
            let code = body.as_ref().and_then(|b| b.code.clone());

            if status.as_u16() == 409 || code.as_deref() == Some("23505") {
                return Err(StoreError::Conflict);
            }

            let message = body
                .map(|b| {
                    let mut message = b.message.unwrap_or_default();
                    for extra in [b.details, b.hint].into_iter().flatten() {
                        message.push_str(&format!(" ({extra})"));
                    }
                    message
                })
                .unwrap_or(text);
            return Err(StoreError::Remote {
                status: status.as_u16(),
                code,
                message,
            });
        }

        if !query.returns_rows() {
            return Ok(Vec::new());
        }

        match response.json::<Value>().await? {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            row => Ok(vec![row]),
        }
    }
}

enum Backend {
    Rest(RestStore),
    Sqlite(SqlitePool),
}

pub struct DatabaseConnection {
    backend: Backend,
}

#[injectable]
impl DatabaseConnection {
    #[inject]
    pub fn create(config: Ref<Config>) -> DatabaseConnection {
        if let Some(pool) = TEST_POOL.lock().ok().and_then(|pool| pool.clone()) {
            return DatabaseConnection::sqlite(pool);
        }

        let settings = config
            .store()
            .expect("SUPABASE_URL or DATABASE_URL must be set");

        match settings {
            StoreSettings::Rest { url, api_key } => {
                DatabaseConnection::rest(RestStore::new(url, api_key))
            }
            StoreSettings::Sqlite { url } => {
                let pool = SqlitePoolOptions::new()
                    .max_connections(5)
                    .connect_lazy(&url)
                    .expect("Cannot connect to database");
                DatabaseConnection::sqlite(pool)
            }
        }
    }
}

impl DatabaseConnection {
    pub fn rest(store: RestStore) -> DatabaseConnection {
        DatabaseConnection {
            backend: Backend::Rest(store),
        }
    }

    pub fn sqlite(pool: SqlitePool) -> DatabaseConnection {
        DatabaseConnection {
            backend: Backend::Sqlite(pool),
        }
    }

    /// Makes DI-created connections use `pool` until [`Self::clear_test_pool`].
    #[doc(hidden)]
    pub fn set_test_pool(pool: SqlitePool) {
        if let Ok(mut slot) = TEST_POOL.lock() {
            *slot = Some(pool);
        }
    }

    #[doc(hidden)]
    pub fn clear_test_pool() {
        if let Ok(mut slot) = TEST_POOL.lock() {
            *slot = None;
        }
    }

    /// Applies bundled migrations. The hosted store manages its own schema.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        match &self.backend {
            Backend::Rest(_) => Ok(()),
            Backend::Sqlite(pool) => {
                sqlx::migrate!().run(pool).await?;
                Ok(())
            }
        }
    }

    /// Runs one query, attaching `token` as the bearer credential when the
    /// backend supports it.
    pub async fn execute(&self, query: &Query, token: Option<&str>) -> Result<Vec<Value>, StoreError> {
        let result = match &self.backend {
            Backend::Rest(store) => store.execute(query, token).await,
            Backend::Sqlite(pool) => execute_sqlite(pool, query).await,
        };
        match &result {
            Err(StoreError::Conflict) => debug!("{} row already exists", query.table.name()),
            Err(e) => error!("{} query failed: {e}", query.table.name()),
            Ok(_) => {}
        }
        result
    }
}

async fn execute_sqlite(pool: &SqlitePool, query: &Query) -> Result<Vec<Value>, StoreError> {
    let statement = query.to_sql()?;
    debug!("{}", statement.sql);

    let mut sql_query = sqlx::query_scalar::<sqlx::Sqlite, String>(&statement.sql);
    for value in statement.binds {
        sql_query = match value {
            SqlValue::Null => sql_query.bind(None::<String>),
            SqlValue::Integer(i) => sql_query.bind(i),
            SqlValue::Real(f) => sql_query.bind(f),
            SqlValue::Text(s) => sql_query.bind(s),
        };
    }

    let rows = sql_query.fetch_all(pool).await.map_err(|e| {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() {
                return StoreError::Conflict;
            }
        }
        StoreError::Database(e)
    })?;

    if !query.returns_rows() {
        return Ok(Vec::new());
    }

    rows.iter()
        .map(|row| serde_json::from_str(row).map_err(StoreError::from))
        .collect()
}
