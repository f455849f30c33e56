//! Metadata index: the queryable secondary store backing `IndexedListing`.
//!
//! One row per stored image in the `images` table. The `key` column carries
//! a UNIQUE constraint, so concurrent uploads of the same key resolve to a
//! single winner at insert time.

use crate::{
    models::object::ObjectRecord,
    services::error::{GalleryError, GalleryResult, is_unique_violation},
};
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::sync::Arc;
use tracing::debug;

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const SELECT_COLUMNS: &str =
    "SELECT key, file_name, content_type, size_bytes, description, upload_timestamp FROM images";

#[derive(Clone)]
pub struct MetadataIndex {
    db: Arc<SqlitePool>,
}

impl MetadataIndex {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Apply the embedded schema. Every statement is idempotent.
    pub async fn migrate(&self) -> GalleryResult<usize> {
        let statements = schema_statements();
        for stmt in &statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(statements.len())
    }

    pub async fn ping(&self) -> GalleryResult<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        Ok(())
    }

    /// Insert a new row; a taken key yields `DuplicateKey`.
    pub async fn insert(&self, record: &ObjectRecord) -> GalleryResult<()> {
        let description = record.description.as_deref().unwrap_or("");
        let result = sqlx::query(
            "INSERT INTO images (key, file_name, content_type, size_bytes, description, upload_timestamp,
                                 key_folded, description_folded)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.key)
        .bind(&record.file_name)
        .bind(record.content_type.as_deref())
        .bind(record.size_bytes)
        .bind(description)
        .bind(record.upload_timestamp)
        .bind(record.key.to_lowercase())
        .bind(description.to_lowercase())
        .execute(&*self.db)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => {
                Err(GalleryError::DuplicateKey(record.key.clone()))
            }
            Err(err) => Err(GalleryError::Sqlx(err)),
        }
    }

    pub async fn find_by_key(&self, key: &str) -> GalleryResult<Option<ObjectRecord>> {
        let record = sqlx::query_as::<_, ObjectRecord>(&format!("{} WHERE key = ?", SELECT_COLUMNS))
            .bind(key)
            .fetch_optional(&*self.db)
            .await?;
        Ok(record)
    }

    /// Returns whether a row was removed.
    pub async fn delete_by_key(&self, key: &str) -> GalleryResult<bool> {
        let result = sqlx::query("DELETE FROM images WHERE key = ?")
            .bind(key)
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// One page of matching rows, most recent upload first.
    pub async fn query(
        &self,
        search: Option<&str>,
        offset: u64,
        limit: u32,
    ) -> GalleryResult<Vec<ObjectRecord>> {
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);

        let mut builder = QueryBuilder::<Sqlite>::new(SELECT_COLUMNS);
        push_search_clause(&mut builder, search);
        builder.push(" ORDER BY upload_timestamp DESC, id DESC LIMIT ");
        builder.push_bind(i64::from(limit));
        builder.push(" OFFSET ");
        builder.push_bind(offset);

        let rows: Vec<ObjectRecord> = builder.build_query_as().fetch_all(&*self.db).await?;
        Ok(rows)
    }

    pub async fn count(&self, search: Option<&str>) -> GalleryResult<u64> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM images");
        push_search_clause(&mut builder, search);
        let count: i64 = builder.build_query_scalar().fetch_one(&*self.db).await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

fn schema_statements() -> Vec<&'static str> {
    SCHEMA
        .split(';')
        .filter(|chunk| has_sql(chunk))
        .map(str::trim)
        .collect()
}

fn has_sql(chunk: &str) -> bool {
    chunk
        .lines()
        .any(|line| !line.trim().is_empty() && !line.trim_start().starts_with("--"))
}

/// Case-insensitive substring match on key (and so file name) and description.
///
/// Both sides are folded with `str::to_lowercase`, the same folding the
/// in-process `SearchTerm` uses, so non-ASCII letters compare equal too.
fn push_search_clause(builder: &mut QueryBuilder<'_, Sqlite>, search: Option<&str>) {
    let Some(term) = search.filter(|s| !s.trim().is_empty()) else {
        return;
    };
    let pattern = format!("%{}%", escape_like(&term.to_lowercase()));
    builder
        .push(" WHERE key_folded LIKE ")
        .push_bind(pattern.clone())
        .push(" ESCAPE '\\' OR description_folded LIKE ")
        .push_bind(pattern)
        .push(" ESCAPE '\\'");
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
