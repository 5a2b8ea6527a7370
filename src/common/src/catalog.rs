use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{PgPool, Row, SqlitePool, query};
use uuid::Uuid;

/// A stored file record, as the upload path creates it.
#[derive(Clone, Debug)]
pub struct FileRecord {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// The slice of a file record the reconciler needs: the stored locator
/// from which the object key is derived, plus the creation timestamp.
#[derive(Clone, Debug)]
pub struct FileReference {
    pub locator: String,
    pub created_at: DateTime<Utc>,
}

/// Catalog provides an interface to the file catalog database
/// (PostgreSQL or SQLite).
#[derive(Clone)]
pub enum Catalog {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

impl Catalog {
    /// Create a new Catalog client and initialize schema.
    pub async fn new(dsn: &str) -> Result<Self, sqlx::Error> {
        log::info!("Connecting to catalog database with DSN: {dsn}");

        let catalog = if dsn.starts_with("sqlite:") {
            // Add mode=rwc to create database file if it doesn't exist;
            // in-memory databases need no creation mode
            let dsn_with_create = if dsn.contains(":memory:") || dsn.contains("mode=") {
                dsn.to_string()
            } else if dsn.contains('?') {
                format!("{dsn}&mode=rwc")
            } else {
                format!("{dsn}?mode=rwc")
            };

            // An in-memory database only exists within its own connection,
            // so the pool must never open a second one
            let pool = if dsn.contains(":memory:") {
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .connect(&dsn_with_create)
                    .await
            } else {
                SqlitePool::connect(&dsn_with_create).await
            }
            .map_err(|e| {
                log::error!("Failed to connect to SQLite database with DSN '{dsn_with_create}': {e}");
                e
            })?;
            Catalog::Sqlite(pool)
        } else {
            let pool = PgPool::connect(dsn).await.map_err(|e| {
                log::error!("Failed to connect to PostgreSQL database with DSN '{dsn}': {e}");
                e
            })?;
            Catalog::Postgres(pool)
        };

        catalog.init().await.map_err(|e| {
            log::error!("Failed to initialize catalog schema: {e}");
            e
        })?;
        Ok(catalog)
    }

    /// Initialize catalog tables if they do not exist.
    async fn init(&self) -> Result<(), sqlx::Error> {
        match self {
            Catalog::Sqlite(pool) => {
                let create_files = r#"
                CREATE TABLE IF NOT EXISTS files (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    url TEXT NOT NULL,
                    created_at TEXT NOT NULL
                )"#;
                query(create_files).execute(pool).await?;
            }
            Catalog::Postgres(pool) => {
                let create_files = r#"
                CREATE TABLE IF NOT EXISTS files (
                    id UUID PRIMARY KEY,
                    name TEXT NOT NULL,
                    url TEXT NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL
                )"#;
                query(create_files).execute(pool).await?;
            }
        }

        Ok(())
    }

    /// Insert a file record, returning it with its generated id.
    pub async fn insert_file(&self, name: &str, url: &str) -> Result<FileRecord, sqlx::Error> {
        let id = Uuid::new_v4();
        let created_at = Utc::now();

        match self {
            Catalog::Sqlite(pool) => {
                let stmt = r#"
                INSERT INTO files (id, name, url, created_at)
                VALUES (?, ?, ?, ?)
                "#;
                query(stmt)
                    .bind(id.to_string())
                    .bind(name)
                    .bind(url)
                    .bind(created_at.to_rfc3339())
                    .execute(pool)
                    .await?;
            }
            Catalog::Postgres(pool) => {
                let stmt = r#"
                INSERT INTO files (id, name, url, created_at)
                VALUES ($1, $2, $3, $4)
                "#;
                query(stmt)
                    .bind(id)
                    .bind(name)
                    .bind(url)
                    .bind(created_at)
                    .execute(pool)
                    .await?;
            }
        }

        Ok(FileRecord {
            id,
            name: name.to_string(),
            url: url.to_string(),
            created_at,
        })
    }

    /// Delete a file record by id.
    pub async fn delete_file(&self, id: Uuid) -> Result<(), sqlx::Error> {
        match self {
            Catalog::Sqlite(pool) => {
                let result = query("DELETE FROM files WHERE id = ?")
                    .bind(id.to_string())
                    .execute(pool)
                    .await?;
                if result.rows_affected() == 0 {
                    return Err(sqlx::Error::RowNotFound);
                }
            }
            Catalog::Postgres(pool) => {
                let result = query("DELETE FROM files WHERE id = $1")
                    .bind(id)
                    .execute(pool)
                    .await?;
                if result.rows_affected() == 0 {
                    return Err(sqlx::Error::RowNotFound);
                }
            }
        }
        Ok(())
    }

    /// List all file records, newest first.
    pub async fn list_files(&self) -> Result<Vec<FileRecord>, sqlx::Error> {
        match self {
            Catalog::Sqlite(pool) => {
                let rows = query("SELECT id, name, url, created_at FROM files ORDER BY created_at DESC")
                    .fetch_all(pool)
                    .await?;
                let mut files = Vec::with_capacity(rows.len());
                for row in rows {
                    let id_str: String = row.get("id");
                    let created_at_str: String = row.get("created_at");

                    let id = Uuid::parse_str(&id_str)
                        .map_err(|_| sqlx::Error::Decode("Invalid UUID format".into()))?;
                    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
                        .map_err(|_| sqlx::Error::Decode("Invalid timestamp format".into()))?
                        .with_timezone(&Utc);

                    files.push(FileRecord {
                        id,
                        name: row.get("name"),
                        url: row.get("url"),
                        created_at,
                    });
                }
                Ok(files)
            }
            Catalog::Postgres(pool) => {
                let rows = query("SELECT id, name, url, created_at FROM files ORDER BY created_at DESC")
                    .fetch_all(pool)
                    .await?;
                let mut files = Vec::with_capacity(rows.len());
                for row in rows {
                    files.push(FileRecord {
                        id: row.get("id"),
                        name: row.get("name"),
                        url: row.get("url"),
                        created_at: row.get("created_at"),
                    });
                }
                Ok(files)
            }
        }
    }

    /// List the locators of all live file records.
    ///
    /// This is the catalog side of a reconciliation run: every stored
    /// object whose key cannot be derived from one of these locators is
    /// an orphan.
    pub async fn list_file_locators(&self) -> Result<Vec<FileReference>, sqlx::Error> {
        match self {
            Catalog::Sqlite(pool) => {
                let rows = query("SELECT url, created_at FROM files")
                    .fetch_all(pool)
                    .await?;
                let mut references = Vec::with_capacity(rows.len());
                for row in rows {
                    let created_at_str: String = row.get("created_at");
                    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
                        .map_err(|_| sqlx::Error::Decode("Invalid timestamp format".into()))?
                        .with_timezone(&Utc);

                    references.push(FileReference {
                        locator: row.get("url"),
                        created_at,
                    });
                }
                Ok(references)
            }
            Catalog::Postgres(pool) => {
                let rows = query("SELECT url, created_at FROM files")
                    .fetch_all(pool)
                    .await?;
                let mut references = Vec::with_capacity(rows.len());
                for row in rows {
                    references.push(FileReference {
                        locator: row.get("url"),
                        created_at: row.get("created_at"),
                    });
                }
                Ok(references)
            }
        }
    }
}
