//! PostgreSQL document store backend.
//!
//! Documents live in a single JSONB table keyed by their full path:
//!
//! ```sql
//! CREATE TABLE documents (
//!     path       TEXT PRIMARY KEY,   -- apps/auditoria/users/u1/widgets/w1
//!     parent     TEXT NOT NULL,      -- apps/auditoria/users/u1/widgets
//!     doc_id     TEXT NOT NULL,      -- w1
//!     fields     JSONB NOT NULL,
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! ```
//!
//! Equality filters use JSONB containment (`fields @> $filter`) and listings
//! page by `doc_id` (keyset pagination), so deleting already-listed rows
//! during a scan never shifts later pages.
//!
//! # Example
//!
//! ```ignore
//! use rehome::store::backends::postgres::PostgresStore;
//!
//! let store = PostgresStore::connect("postgresql://localhost/docs", "documents").await?;
//! store.ensure_table().await?;
//! ```

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use serde_json::Value as JsonValue;
use tokio_postgres::NoTls;

use crate::error::AppError;
use crate::store::document::{Document, Fields};
use crate::store::path::{CollectionPath, DocumentPath};
use crate::store::traits::{DocumentReader, DocumentWriter, Page, PageRequest};

/// SQL statements for one document table.
///
/// The table name is validated as a plain identifier before it is ever
/// formatted into a statement; all values are bound parameters.
#[derive(Debug, Clone)]
struct Statements {
    create: String,
    get: String,
    page: String,
    upsert: String,
    merge: String,
    delete: String,
}

impl Statements {
    fn new(table: &str) -> Result<Self, AppError> {
        let mut chars = table.chars();
        let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(AppError::Connection(format!(
                "invalid document table name '{}'",
                table
            )));
        }

        Ok(Self {
            create: format!(
                "CREATE TABLE IF NOT EXISTS {t} (
                    path TEXT PRIMARY KEY,
                    parent TEXT NOT NULL,
                    doc_id TEXT NOT NULL,
                    fields JSONB NOT NULL,
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );
                CREATE INDEX IF NOT EXISTS {t}_parent_doc_id ON {t} (parent, doc_id);",
                t = table
            ),
            get: format!("SELECT fields FROM {} WHERE path = $1", table),
            page: format!(
                "SELECT doc_id, fields FROM {} \
                 WHERE parent = $1 AND fields @> $2 AND ($3::text IS NULL OR doc_id > $3) \
                 ORDER BY doc_id LIMIT $4",
                table
            ),
            upsert: format!(
                "INSERT INTO {} (path, parent, doc_id, fields, updated_at) \
                 VALUES ($1, $2, $3, $4, NOW()) \
                 ON CONFLICT (path) DO UPDATE SET fields = EXCLUDED.fields, updated_at = NOW()",
                table
            ),
            merge: format!(
                "UPDATE {} SET fields = fields || $2, updated_at = NOW() WHERE path = $1",
                table
            ),
            delete: format!("DELETE FROM {} WHERE path = $1", table),
        })
    }
}

/// PostgreSQL-backed document store.
///
/// Provides connection pooling via deadpool-postgres. Cheap to clone; the
/// pool is shared.
#[derive(Clone)]
pub struct PostgresStore {
    pool: Pool,
    sql: std::sync::Arc<Statements>,
}

impl PostgresStore {
    /// Creates a pooled store. No connection is made until first use; call
    /// [`ping`](DocumentReader::ping) to verify reachability.
    pub async fn connect(connection_string: &str, table: &str) -> Result<Self, AppError> {
        let sql = Statements::new(table)?;
        let pg_config: tokio_postgres::Config = connection_string
            .parse()
            .map_err(|e| AppError::Connection(format!("Invalid PostgreSQL connection string: {}", e)))?;

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
        // Runs are sequential; a small pool is plenty.
        let pool = Pool::builder(mgr)
            .max_size(4)
            .build()
            .map_err(|e| AppError::Connection(format!("Failed to create connection pool: {}", e)))?;

        Ok(Self {
            pool,
            sql: std::sync::Arc::new(sql),
        })
    }

    /// Creates the document table and its listing index if missing.
    pub async fn ensure_table(&self) -> Result<(), AppError> {
        let conn = self.connection().await?;
        conn.batch_execute(&self.sql.create)
            .await
            .map_err(|e| AppError::Connection(format!("Failed to ensure document table: {}", describe(&e))))
    }

    /// Closes the pool. Outstanding connections are dropped as they return.
    pub fn close(&self) {
        self.pool.close();
    }

    async fn connection(&self) -> Result<Object, AppError> {
        self.pool
            .get()
            .await
            .map_err(|e| AppError::Connection(format!("Failed to get connection from pool: {}", e)))
    }
}

/// Extracts the detailed server message from a PostgreSQL error.
fn describe(e: &tokio_postgres::Error) -> String {
    e.as_db_error()
        .map(|db_err| {
            format!(
                "{}: {} ({})",
                db_err.severity(),
                db_err.message(),
                db_err.code().code()
            )
        })
        .unwrap_or_else(|| e.to_string())
}

fn into_fields(path: &str, value: JsonValue) -> Result<Fields, AppError> {
    match value {
        JsonValue::Object(map) => Ok(map),
        other => Err(AppError::store(
            "get",
            path,
            format!("stored fields are not an object: {}", other),
        )),
    }
}

#[async_trait]
impl DocumentReader for PostgresStore {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>, AppError> {
        let key = path.to_string();
        let conn = self.connection().await?;
        let row = conn
            .query_opt(&self.sql.get, &[&key])
            .await
            .map_err(|e| AppError::store("get", &key, describe(&e)))?;

        match row {
            Some(row) => {
                let fields: JsonValue = row.get(0);
                Ok(Some(Document::new(path.clone(), into_fields(&key, fields)?)))
            }
            None => Ok(None),
        }
    }

    async fn query_page(
        &self,
        collection: &CollectionPath,
        filter: &Fields,
        page: &PageRequest,
    ) -> Result<Page, AppError> {
        let parent = collection.to_string();
        let filter = JsonValue::Object(filter.clone());
        let limit = (page.limit + 1) as i64;

        let conn = self.connection().await?;
        let rows = conn
            .query(&self.sql.page, &[&parent, &filter, &page.after, &limit])
            .await
            .map_err(|e| AppError::Query {
                collection: parent.clone(),
                message: describe(&e),
            })?;

        let mut documents = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.get(0);
            let fields: JsonValue = row.get(1);
            let path = collection.doc(&id)?;
            let fields = into_fields(&path.to_string(), fields)?;
            documents.push(Document::new(path, fields));
        }

        let next = if documents.len() > page.limit {
            documents.truncate(page.limit);
            documents.last().map(|d| d.id().to_string())
        } else {
            None
        };

        Ok(Page { documents, next })
    }

    async fn ping(&self) -> Result<(), AppError> {
        let conn = self.connection().await?;
        conn.simple_query("SELECT 1")
            .await
            .map_err(|e| AppError::Connection(format!("Store unreachable: {}", describe(&e))))?;
        Ok(())
    }
}

#[async_trait]
impl DocumentWriter for PostgresStore {
    async fn set(&self, path: &DocumentPath, fields: Fields) -> Result<(), AppError> {
        let key = path.to_string();
        let parent = path.parent().to_string();
        let id = path.id().to_string();
        let fields = JsonValue::Object(fields);

        let conn = self.connection().await?;
        conn.execute(&self.sql.upsert, &[&key, &parent, &id, &fields])
            .await
            .map_err(|e| AppError::store("set", &key, describe(&e)))?;
        Ok(())
    }

    async fn update(&self, path: &DocumentPath, fields: Fields) -> Result<(), AppError> {
        let key = path.to_string();
        let fields = JsonValue::Object(fields);

        let conn = self.connection().await?;
        let updated = conn
            .execute(&self.sql.merge, &[&key, &fields])
            .await
            .map_err(|e| AppError::store("update", &key, describe(&e)))?;

        if updated == 0 {
            return Err(AppError::NotFound(key));
        }
        Ok(())
    }

    async fn delete(&self, path: &DocumentPath) -> Result<(), AppError> {
        let key = path.to_string();
        let conn = self.connection().await?;
        conn.execute(&self.sql.delete, &[&key])
            .await
            .map_err(|e| AppError::store("delete", &key, describe(&e)))?;
        Ok(())
    }
}
