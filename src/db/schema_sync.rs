//! Schema synchronization at startup
//!
//! Creates the `users` and `posts` tables and their indexes when missing.
//! Existing tables are left untouched; column renames or type changes
//! require wiping the database.

use sqlx::SqlitePool;
use tracing::{debug, info};

use super::Database;

/// A table and the statements that create it
struct TableDef {
    name: &'static str,
    create_sql: &'static str,
}

const TABLES: &[TableDef] = &[
    TableDef {
        name: "users",
        create_sql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
        "#,
    },
    // Posts go with their author
    TableDef {
        name: "posts",
        create_sql: r#"
            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                author_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
        "#,
    },
];

const INDEXES: &[&str] = &["CREATE INDEX IF NOT EXISTS idx_posts_author_id ON posts(author_id)"];

/// Result of a schema sync operation
#[derive(Debug, Default)]
pub struct SchemaSyncResult {
    pub tables_created: Vec<String>,
}

/// Check if a table exists in the database
async fn table_exists(pool: &SqlitePool, table_name: &str) -> Result<bool, sqlx::Error> {
    let result: Option<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' AND name = ?")
            .bind(table_name)
            .fetch_optional(pool)
            .await?;

    Ok(result.is_some())
}

/// Create any missing tables and indexes
pub async fn sync_schema(db: &Database) -> Result<SchemaSyncResult, sqlx::Error> {
    let pool = db.pool();
    let mut result = SchemaSyncResult::default();

    for table in TABLES {
        if table_exists(pool, table.name).await? {
            debug!(table = table.name, "Table already exists");
            continue;
        }
        sqlx::query(table.create_sql).execute(pool).await?;
        info!(table = table.name, "Created table");
        result.tables_created.push(table.name.to_string());
    }

    for index in INDEXES {
        sqlx::query(index).execute(pool).await?;
    }

    Ok(result)
}
