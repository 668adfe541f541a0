use feed_ref::{CollectionPath, DocPath};
use log::trace;
use sqlx::{query, sqlite::SqliteRow, Error, Row, SqliteConnection};
use std::collections::HashSet;

use crate::sql::*;

pub async fn create_documents_tables(connection: &mut SqliteConnection) -> Result<(), Error> {
    trace!("Creating documents tables");

    query(
        "
        CREATE TABLE IF NOT EXISTS documents (
            path TEXT PRIMARY KEY,
            collection TEXT NOT NULL,
            data TEXT NOT NULL
        )
        ",
    )
    .execute(connection)
    .await?;

    Ok(())
}

pub async fn create_documents_indices(connection: &mut SqliteConnection) -> Result<(), Error> {
    trace!("Creating documents collection index");

    query("CREATE INDEX IF NOT EXISTS documents_collection_index on documents (collection)")
        .execute(connection)
        .await?;

    Ok(())
}

pub async fn select_doc_data(
    connection: &mut SqliteConnection,
    path: &DocPath,
) -> Result<Option<String>, Error> {
    query("SELECT data FROM documents WHERE path = ?")
        .bind(path.to_string())
        .map(|row: SqliteRow| row.get(0))
        .fetch_optional(connection)
        .await
}

/// Creates or replaces a document. Returns whether it was created.
pub async fn upsert_doc(
    connection: &mut SqliteConnection,
    path: &DocPath,
    data: &str,
) -> Result<bool, Error> {
    let row: Option<String> = query("SELECT path FROM documents WHERE path = ?")
        .bind(path.to_string())
        .map(|row: SqliteRow| row.get(0))
        .fetch_optional(&mut *connection)
        .await?;

    if row.is_some() {
        trace!("update doc {}", path);
        query("UPDATE documents SET data = ? WHERE path = ?")
            .bind(data)
            .bind(path.to_string())
            .execute(connection)
            .await?;
        Ok(false)
    } else {
        trace!("insert doc {}", path);
        query("INSERT INTO documents (path, collection, data) VALUES (?, ?, ?)")
            .bind(path.to_string())
            .bind(path.collection().to_string())
            .bind(data)
            .execute(connection)
            .await?;
        Ok(true)
    }
}

/// Deletes the given documents, returning the paths that existed in the
/// order they were given.
pub async fn delete_docs(
    connection: &mut SqliteConnection,
    paths: &[DocPath],
) -> Result<Vec<String>, Error> {
    let mut deleted = Vec::new();

    for chunk in paths.chunks(MAX_BOUND_PARAMS) {
        let marks = placeholders(chunk.len());

        let select = format!("SELECT path FROM documents WHERE path IN ({})", marks);
        let mut select_query = query(&select);
        for path in chunk {
            select_query = select_query.bind(path.to_string());
        }
        let existing: HashSet<String> = select_query
            .map(|row: SqliteRow| row.get(0))
            .fetch_all(&mut *connection)
            .await?
            .into_iter()
            .collect();

        if existing.is_empty() {
            continue;
        }

        trace!("delete {} docs", existing.len());
        let delete = format!("DELETE FROM documents WHERE path IN ({})", marks);
        let mut delete_query = query(&delete);
        for path in chunk {
            delete_query = delete_query.bind(path.to_string());
        }
        delete_query.execute(&mut *connection).await?;

        deleted.extend(
            chunk
                .iter()
                .map(|path| path.to_string())
                .filter(|path| existing.contains(path)),
        );
    }

    Ok(deleted)
}

pub async fn select_collection(
    connection: &mut SqliteConnection,
    collection: &CollectionPath,
) -> Result<Vec<(String, String)>, Error> {
    query("SELECT path, data FROM documents WHERE collection = ? ORDER BY path")
        .bind(collection.to_string())
        .map(|row: SqliteRow| (row.get(0), row.get(1)))
        .fetch_all(connection)
        .await
}

pub async fn select_collection_count(
    connection: &mut SqliteConnection,
    collection: &CollectionPath,
) -> Result<i64, Error> {
    query("SELECT COUNT(*) FROM documents WHERE collection = ?")
        .bind(collection.to_string())
        .map(|row: SqliteRow| row.get(0))
        .fetch_one(connection)
        .await
}
