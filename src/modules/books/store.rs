//! Wishlist persistence: a single `books` table in SQLite.

use sqlx::SqlitePool;
use thiserror::Error;

use super::models::{Book, BookRow, NewBook};
use super::stats::StatsReport;
use crate::utils::join_list;

/// At most this many subjects are stored per book.
pub const MAX_STORED_SUBJECTS: usize = 5;

const SELECT_BOOK: &str =
    "SELECT id, title, author, description, region, subjects, is_fiction, is_owned FROM books";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result of [`BookStore::add`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Added { id: i64 },
    AlreadyExists,
}

impl AddOutcome {
    pub fn message(&self, title: &str) -> String {
        match self {
            AddOutcome::Added { .. } => "Added to the To-Read List".to_string(),
            AddOutcome::AlreadyExists => format!("Book '{title}' already exists."),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BookStore {
    pool: SqlitePool,
}

impl BookStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Case-insensitive exact title match.
    pub async fn exists(&self, title: &str) -> Result<bool, StoreError> {
        let found: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM books WHERE title = ?1 COLLATE NOCASE)",
        )
        .bind(title)
        .fetch_one(&self.pool)
        .await?;
        Ok(found != 0)
    }

    /// Insert a book unless one with the same title (ignoring case) exists.
    ///
    /// Subjects beyond [`MAX_STORED_SUBJECTS`] are dropped. A concurrent add
    /// of the same title that slips past the pre-check hits the unique index
    /// and also reports [`AddOutcome::AlreadyExists`].
    pub async fn add(&self, book: &NewBook) -> Result<AddOutcome, StoreError> {
        if self.exists(&book.title).await? {
            tracing::info!(title = %book.title, "book already on the wishlist");
            return Ok(AddOutcome::AlreadyExists);
        }

        let subjects = if book.subjects.is_empty() {
            None
        } else {
            let kept = &book.subjects[..book.subjects.len().min(MAX_STORED_SUBJECTS)];
            Some(join_list(kept))
        };

        let result = sqlx::query(
            "INSERT INTO books (title, author, description, region, subjects, is_fiction, is_owned)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT DO NOTHING",
        )
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.description)
        .bind(&book.region)
        .bind(subjects)
        .bind(book.is_fiction.map(|c| c.as_str()))
        .bind(book.is_owned)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::info!(title = %book.title, "concurrent add of the same title");
            return Ok(AddOutcome::AlreadyExists);
        }

        let id = result.last_insert_rowid();
        tracing::info!(id, title = %book.title, "book added");
        Ok(AddOutcome::Added { id })
    }

    /// Returns `false` when no book has this id.
    pub async fn update_ownership(&self, id: i64, is_owned: bool) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE books SET is_owned = ?1 WHERE id = ?2")
            .bind(is_owned)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Returns `false` when no book has this id.
    pub async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM books WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Newest first. Page N of size M is `list((N - 1) * M, M)`.
    pub async fn list(&self, skip: i64, limit: i64) -> Result<Vec<Book>, StoreError> {
        let rows: Vec<BookRow> =
            sqlx::query_as(&format!("{SELECT_BOOK} ORDER BY id DESC LIMIT ?1 OFFSET ?2"))
                .bind(limit.max(0))
                .bind(skip.max(0))
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(Book::from).collect())
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    /// Full scan in id order, aggregated in memory.
    pub async fn aggregate_stats(&self) -> Result<StatsReport, StoreError> {
        let rows: Vec<BookRow> = sqlx::query_as(&format!("{SELECT_BOOK} ORDER BY id ASC"))
            .fetch_all(&self.pool)
            .await?;
        let books: Vec<Book> = rows.into_iter().map(Book::from).collect();
        Ok(StatsReport::from_books(&books))
    }
}

#[cfg(test)]
pub(crate) async fn test_store() -> BookStore {
    use bookwish_kernel::settings::DatabaseSettings;

    let pool = bookwish_db::connect(&DatabaseSettings::in_memory())
        .await
        .unwrap();
    let migrations: Vec<_> = super::schema_migrations()
        .into_iter()
        .map(|m| ("books".to_string(), m))
        .collect();
    bookwish_db::apply_migrations(&pool, &migrations)
        .await
        .unwrap();
    BookStore::new(pool)
}
