//! Posts repository
//!
//! Reads that return posts "with author" join `users` in the same query,
//! so the author never needs a second round trip.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use super::StoreResult;
use super::sqlite_helpers::now_iso8601;
use super::users::UserRecord;

const POST_COLUMNS: &str = "id, title, content, author_id, created_at, updated_at";

const POST_WITH_AUTHOR_SELECT: &str = r#"
    SELECT p.id, p.title, p.content, p.author_id, p.created_at, p.updated_at,
           u.name AS author_name, u.email AS author_email,
           u.created_at AS author_created_at, u.updated_at AS author_updated_at
    FROM posts p
    JOIN users u ON u.id = p.author_id
"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PostRecord {
    pub id: i32,
    pub title: String,
    pub content: String,
    pub author_id: i32,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostWithAuthor {
    pub post: PostRecord,
    pub author: UserRecord,
}

/// Flat row produced by [POST_WITH_AUTHOR_SELECT]
#[derive(FromRow)]
struct PostAuthorRow {
    id: i32,
    title: String,
    content: String,
    author_id: i32,
    created_at: String,
    updated_at: String,
    author_name: String,
    author_email: String,
    author_created_at: String,
    author_updated_at: String,
}

impl From<PostAuthorRow> for PostWithAuthor {
    fn from(r: PostAuthorRow) -> Self {
        Self {
            author: UserRecord {
                id: r.author_id,
                name: r.author_name,
                email: r.author_email,
                created_at: r.author_created_at,
                updated_at: r.author_updated_at,
            },
            post: PostRecord {
                id: r.id,
                title: r.title,
                content: r.content,
                author_id: r.author_id,
                created_at: r.created_at,
                updated_at: r.updated_at,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreatePost {
    pub title: String,
    pub content: String,
    pub author_id: i32,
}

pub struct PostsRepository {
    pool: SqlitePool,
}

impl PostsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a post. Fails with a missing reference error if the author does not exist.
    /// The insert and the author read share one transaction.
    pub async fn create(&self, post: CreatePost) -> StoreResult<PostWithAuthor> {
        let now = now_iso8601();
        let mut tx = self.pool.begin().await?;

        let record = sqlx::query_as::<_, PostRecord>(&format!(
            r#"
            INSERT INTO posts (title, content, author_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING {POST_COLUMNS}
            "#
        ))
        .bind(&post.title)
        .bind(&post.content)
        .bind(post.author_id)
        .bind(&now)
        .bind(&now)
        .fetch_one(&mut *tx)
        .await?;

        let author = sqlx::query_as::<_, UserRecord>(
            "SELECT id, name, email, created_at, updated_at FROM users WHERE id = ?",
        )
        .bind(record.author_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(PostWithAuthor {
            post: record,
            author,
        })
    }

    /// Get a post and its author by post ID
    pub async fn get_with_author(&self, id: i32) -> StoreResult<Option<PostWithAuthor>> {
        let row = sqlx::query_as::<_, PostAuthorRow>(&format!(
            "{POST_WITH_AUTHOR_SELECT} WHERE p.id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// List all posts with their authors
    pub async fn list_with_authors(&self) -> StoreResult<Vec<PostWithAuthor>> {
        let rows = sqlx::query_as::<_, PostAuthorRow>(&format!(
            "{POST_WITH_AUTHOR_SELECT} ORDER BY p.id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// List posts written by one author
    pub async fn list_by_author(&self, author_id: i32) -> StoreResult<Vec<PostRecord>> {
        let records = sqlx::query_as::<_, PostRecord>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE author_id = ? ORDER BY id"
        ))
        .bind(author_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// List every post, in id order
    pub async fn list_all(&self) -> StoreResult<Vec<PostRecord>> {
        let records = sqlx::query_as::<_, PostRecord>(&format!(
            "SELECT {POST_COLUMNS} FROM posts ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
