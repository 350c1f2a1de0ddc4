//! Local letter store.
//!
//! Letters are owned by the CRUD layer; the sync subsystem only reads them and
//! records where they were exported to.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;
use tracing::debug;

use letterbox_common::{LetterId, Result, UserId};

use crate::db::{conversion_err, from_millis, to_millis, Database};

const LETTER_COLUMNS: &str =
    "id, author_id, title, content, is_draft, drive_file_id, last_saved_at, created_at";

/// Title used when a letter is created without one.
pub const DEFAULT_TITLE: &str = "Untitled Letter";

/// A plain-text letter.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Letter {
    pub id: LetterId,
    pub author_id: UserId,
    pub title: String,
    pub content: String,
    pub is_draft: bool,
    /// Remote document this letter was last exported to.
    pub drive_file_id: Option<String>,
    pub last_saved_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Letter {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let id: String = row.get(0)?;
        let author: String = row.get(1)?;
        Ok(Self {
            id: LetterId::new(id).map_err(|e| conversion_err(0, e))?,
            author_id: UserId::new(author).map_err(|e| conversion_err(1, e))?,
            title: row.get(2)?,
            content: row.get(3)?,
            is_draft: row.get::<_, i32>(4)? != 0,
            drive_file_id: row.get(5)?,
            last_saved_at: from_millis(row.get(6)?),
            created_at: from_millis(row.get(7)?),
        })
    }
}

#[derive(Clone)]
pub struct LetterStore {
    db: Database,
}

impl LetterStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a draft letter. An empty title falls back to [`DEFAULT_TITLE`].
    pub fn create(&self, author: &UserId, title: &str, content: &str) -> Result<Letter> {
        let now = Utc::now();
        let letter = Letter {
            id: LetterId::generate(),
            author_id: author.clone(),
            title: if title.is_empty() {
                DEFAULT_TITLE.to_string()
            } else {
                title.to_string()
            },
            content: content.to_string(),
            is_draft: true,
            drive_file_id: None,
            last_saved_at: now,
            created_at: now,
        };

        debug!("Creating letter {} for {}", letter.id, author);
        self.db.with_conn(|conn| {
            conn.execute(
                r#"
                INSERT INTO letters
                (id, author_id, title, content, is_draft, drive_file_id, last_saved_at, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    letter.id.as_str(),
                    letter.author_id.as_str(),
                    letter.title,
                    letter.content,
                    letter.is_draft as i32,
                    letter.drive_file_id,
                    to_millis(letter.last_saved_at),
                    to_millis(letter.created_at),
                ],
            )
        })?;
        Ok(letter)
    }

    /// Fetch a letter only if it belongs to `author`.
    ///
    /// A letter owned by someone else is indistinguishable from a missing one.
    pub fn find_for_author(&self, id: &LetterId, author: &UserId) -> Result<Option<Letter>> {
        let sql = format!(
            "SELECT {} FROM letters WHERE id = ?1 AND author_id = ?2",
            LETTER_COLUMNS
        );
        self.db.with_conn(|conn| {
            conn.query_row(&sql, [id.as_str(), author.as_str()], Letter::from_row)
                .optional()
        })
    }

    /// All letters of `author`, most recently saved first.
    pub fn list_for_author(&self, author: &UserId) -> Result<Vec<Letter>> {
        let sql = format!(
            "SELECT {} FROM letters WHERE author_id = ?1 ORDER BY last_saved_at DESC",
            LETTER_COLUMNS
        );
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([author.as_str()], Letter::from_row)?;
            rows.collect()
        })
    }

    /// Remember the remote document a letter was exported to.
    pub fn record_export(&self, id: &LetterId, drive_file_id: &str) -> Result<()> {
        debug!("Letter {} exported as {}", id, drive_file_id);
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE letters SET drive_file_id = ?2 WHERE id = ?1",
                params![id.as_str(), drive_file_id],
            )
        })?;
        Ok(())
    }
}
