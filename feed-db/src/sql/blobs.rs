use feed_ref::MediaPath;
use log::trace;
use sqlx::{query, sqlite::SqliteRow, Error, Row, SqliteConnection};

pub async fn create_blobs_tables(connection: &mut SqliteConnection) -> Result<(), Error> {
    trace!("Creating blobs tables");

    query(
        "
        CREATE TABLE IF NOT EXISTS blobs (
            path TEXT PRIMARY KEY,
            prefix TEXT NOT NULL,
            content_type TEXT,
            size INTEGER NOT NULL,
            data BLOB NOT NULL
        )
        ",
    )
    .execute(connection)
    .await?;

    Ok(())
}

pub async fn create_blobs_indices(connection: &mut SqliteConnection) -> Result<(), Error> {
    trace!("Creating blobs prefix index");

    query("CREATE INDEX IF NOT EXISTS blobs_prefix_index on blobs (prefix)")
        .execute(connection)
        .await?;

    Ok(())
}

pub async fn insert_or_replace_blob(
    connection: &mut SqliteConnection,
    path: &str,
    prefix: &MediaPath,
    bytes: &[u8],
    content_type: Option<&str>,
) -> Result<(), Error> {
    query(
        "INSERT OR REPLACE INTO blobs (path, prefix, content_type, size, data)
        VALUES (?, ?, ?, ?, ?)",
    )
    .bind(path)
    .bind(prefix.as_str())
    .bind(content_type)
    .bind(bytes.len() as i64)
    .bind(bytes)
    .execute(connection)
    .await?;

    Ok(())
}

pub async fn select_blobs_by_prefix(
    connection: &mut SqliteConnection,
    prefix: &MediaPath,
) -> Result<Vec<(String, Option<String>, i64)>, Error> {
    query("SELECT path, content_type, size FROM blobs WHERE prefix = ? ORDER BY path")
        .bind(prefix.as_str())
        .map(|row: SqliteRow| (row.get(0), row.get(1), row.get(2)))
        .fetch_all(connection)
        .await
}

pub async fn select_blob_data(
    connection: &mut SqliteConnection,
    path: &str,
) -> Result<Option<Vec<u8>>, Error> {
    query("SELECT data FROM blobs WHERE path = ?")
        .bind(path)
        .map(|row: SqliteRow| row.get(0))
        .fetch_optional(connection)
        .await
}

pub async fn delete_blob(connection: &mut SqliteConnection, path: &str) -> Result<bool, Error> {
    let result = query("DELETE FROM blobs WHERE path = ?")
        .bind(path)
        .execute(connection)
        .await?;

    Ok(result.rows_affected() > 0)
}
