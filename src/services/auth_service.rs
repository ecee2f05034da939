use crate::error::AppError;
use crate::models::sync_state::datetime_from_millis;
use patrol_auth::AuthSession;
use rusqlite::Connection;

/// Loads the stored session, if anyone is signed in on this device
pub fn load_session(conn: &Connection) -> Result<Option<AuthSession>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT user_id, phone_number, access_token, refresh_token, expires_at
         FROM auth_session
         ORDER BY id DESC
         LIMIT 1",
    )?;

    let result = stmt.query_row([], |row| {
        Ok(AuthSession {
            user_id: row.get(0)?,
            phone_number: row.get(1)?,
            access_token: row.get(2)?,
            refresh_token: row.get(3)?,
            expires_at: datetime_from_millis(row.get(4)?)?,
        })
    });

    match result {
        Ok(session) => Ok(Some(session)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(AppError::Database(e)),
    }
}

/// Persists a session, replacing any previous one.
/// Called after sign-in and after every token refresh.
pub fn save_session(conn: &Connection, session: &AuthSession) -> Result<(), AppError> {
    conn.execute("DELETE FROM auth_session", [])?;
    conn.execute(
        "INSERT INTO auth_session (user_id, phone_number, access_token, refresh_token, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        (
            &session.user_id,
            &session.phone_number,
            &session.access_token,
            &session.refresh_token,
            session.expires_at.timestamp_millis(),
        ),
    )?;
    Ok(())
}

/// Signs out: removes the stored session. Captured data stays local
/// and syncs after the next sign-in.
pub fn clear_session(conn: &Connection) -> Result<(), AppError> {
    conn.execute("DELETE FROM auth_session", [])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database;
    use chrono::{Duration, Utc};

    fn session(token: &str) -> AuthSession {
        AuthSession {
            user_id: "officer-7".to_string(),
            phone_number: "+4915112345678".to_string(),
            access_token: token.to_string(),
            refresh_token: "refresh-1".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        }
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let conn = database::open_test_database();
        assert!(load_session(&conn).unwrap().is_none());

        save_session(&conn, &session("token-a")).unwrap();
        let loaded = load_session(&conn).unwrap().unwrap();
        assert_eq!(loaded.user_id, "officer-7");
        assert_eq!(loaded.access_token, "token-a");
    }

    #[test]
    fn test_save_replaces_previous_session() {
        let conn = database::open_test_database();
        save_session(&conn, &session("token-a")).unwrap();
        save_session(&conn, &session("token-b")).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM auth_session", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(
            load_session(&conn).unwrap().unwrap().access_token,
            "token-b"
        );
    }

    #[test]
    fn test_clear_session() {
        let conn = database::open_test_database();
        save_session(&conn, &session("token-a")).unwrap();
        clear_session(&conn).unwrap();
        assert!(load_session(&conn).unwrap().is_none());
    }
}
