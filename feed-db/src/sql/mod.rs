use log::trace;
use sqlx::{
    query,
    sqlite::{
        SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqliteRow, SqliteSynchronous,
    },
    ConnectOptions, Error as SqlError, Row,
};
use std::str::FromStr;

mod blobs;
mod documents;
mod migrations;
pub(crate) use self::blobs::*;
pub(crate) use self::documents::*;
pub(crate) use self::migrations::*;

/// Highest bound-parameter count used by a single statement.
pub(crate) const MAX_BOUND_PARAMS: usize = 500;

pub async fn create_connection(path: &str) -> Result<SqliteConnection, SqlError> {
    SqliteConnectOptions::from_str(path)?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .create_if_missing(true)
        .connect()
        .await
}

pub async fn setup_new_db(connection: &mut SqliteConnection) -> Result<(), SqlError> {
    create_tables(connection).await?;
    create_indices(connection).await?;

    set_db_version(connection, SCHEMA_VERSION).await?;

    Ok(())
}

pub async fn setup_db(connection: &mut SqliteConnection) -> Result<(), SqlError> {
    set_pragmas(connection).await?;

    Ok(())
}

pub async fn check_db_integrity(connection: &mut SqliteConnection) -> Result<bool, SqlError> {
    let res: String = query("PRAGMA integrity_check")
        .map(|row: SqliteRow| -> String { row.get(0) })
        .fetch_one(connection)
        .await?;

    if res == "ok" {
        Ok(true)
    } else {
        Ok(false)
    }
}

/// `?, ?, ?` for `count` parameters.
pub(crate) fn placeholders(count: usize) -> String {
    itertools::repeat_n("?", count)
        .collect::<Vec<_>>()
        .join(", ")
}

async fn set_pragmas(connection: &mut SqliteConnection) -> Result<(), SqlError> {
    trace!("Setting pragmas");
    query("PRAGMA page_size = 4096")
        .execute(&mut *connection)
        .await?;
    Ok(())
}

async fn create_tables(connection: &mut SqliteConnection) -> Result<(), SqlError> {
    create_migrations_tables(connection).await?;
    create_documents_tables(connection).await?;
    create_blobs_tables(connection).await?;

    Ok(())
}

async fn create_indices(connection: &mut SqliteConnection) -> Result<(), SqlError> {
    create_documents_indices(connection).await?;
    create_blobs_indices(connection).await?;
    Ok(())
}
