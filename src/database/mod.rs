pub mod schema;

use crate::error::AppError;
use crate::filesystem;
use rusqlite::Connection;
use std::path::PathBuf;

/// Path of the SQLite file inside the app data directory
pub fn get_database_path() -> PathBuf {
    filesystem::get_app_data_dir().join("security_patrol.db")
}

/// Opens the database and brings the schema up to date
pub fn init_database() -> Result<Connection, AppError> {
    let db_path = get_database_path();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(&db_path)?;

    schema::init_schema(&conn)?;
    photo_store::schema::init_photo_schema(&conn)?;

    Ok(conn)
}

/// Opens an in-memory database with the full schema, for tests
#[cfg(test)]
pub fn open_test_database() -> Connection {
    let conn = Connection::open_in_memory().expect("in-memory database");
    schema::init_schema(&conn).expect("schema init");
    photo_store::schema::init_photo_schema(&conn).expect("photo schema init");
    conn
}
