use log::trace;
use sqlx::{query, sqlite::SqliteRow, Error, Row, SqliteConnection};

/// Schema version written by this build.
pub const SCHEMA_VERSION: i64 = 1;

pub async fn create_migrations_tables(connection: &mut SqliteConnection) -> Result<(), Error> {
    trace!("Creating migrations tables");

    query(
        "
        CREATE TABLE IF NOT EXISTS migrations (
            id INTEGER PRIMARY KEY,
            version INTEGER NOT NULL
        )
        ",
    )
    .execute(connection)
    .await?;

    Ok(())
}

pub async fn get_db_version(connection: &mut SqliteConnection) -> Result<Option<i64>, Error> {
    let has_table: Option<String> =
        query("SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'migrations'")
            .map(|row: SqliteRow| row.get(0))
            .fetch_optional(&mut *connection)
            .await?;

    if has_table.is_none() {
        return Ok(None);
    }

    let version: Option<i64> = query("SELECT MAX(version) FROM migrations")
        .map(|row: SqliteRow| row.get(0))
        .fetch_optional(&mut *connection)
        .await?
        .flatten();

    trace!("got db version: {:?}", version);

    Ok(version)
}

pub async fn set_db_version(connection: &mut SqliteConnection, version: i64) -> Result<(), Error> {
    query("INSERT INTO migrations (version) VALUES (?)")
        .bind(version)
        .execute(connection)
        .await?;

    Ok(())
}
