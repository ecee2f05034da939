use crate::error::AppError;
use crate::models::IncidentReport;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

/// Input for a new report capture
#[derive(Debug, Clone)]
pub struct ReportInput {
    pub user_id: String,
    pub body: String,
    pub captured_at: DateTime<Utc>,
    pub position: Option<(f64, f64)>,
}

/// Captures a free-text report. The body is trimmed before validation,
/// invalid input writes nothing.
pub fn capture_report(conn: &Connection, input: ReportInput) -> Result<IncidentReport, AppError> {
    let mut report = IncidentReport::new(
        input.user_id,
        input.body.trim().to_string(),
        input.captured_at,
        input.position,
    );
    report.validate().map_err(AppError::Validation)?;

    conn.execute(
        "INSERT INTO incident_reports (uuid, user_id, body, captured_at, latitude, longitude)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            report.uuid,
            report.user_id,
            report.body,
            report.captured_at.timestamp_millis(),
            report.latitude,
            report.longitude,
        ],
    )?;
    report.id = Some(conn.last_insert_rowid());

    log::info!("Captured report {} by {}", report.uuid, report.user_id);

    Ok(report)
}

pub fn get_report(conn: &Connection, uuid: &str) -> Result<IncidentReport, AppError> {
    conn.query_row(
        "SELECT * FROM incident_reports WHERE uuid = ?1",
        params![uuid],
        |row| IncidentReport::try_from(row),
    )
    .optional()?
    .ok_or_else(|| AppError::NotFound(format!("Report {}", uuid)))
}

pub fn list_reports(conn: &Connection, user_id: &str) -> Result<Vec<IncidentReport>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM incident_reports WHERE user_id = ?1 ORDER BY captured_at DESC, id DESC",
    )?;
    let rows = stmt.query_map(params![user_id], |row| IncidentReport::try_from(row))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Reports still waiting for upload, oldest capture first
pub fn unsynced_reports(conn: &Connection) -> Result<Vec<IncidentReport>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM incident_reports WHERE is_synced = 0 ORDER BY captured_at ASC, id ASC",
    )?;
    let rows = stmt.query_map([], |row| IncidentReport::try_from(row))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn mark_report_synced(
    conn: &Connection,
    uuid: &str,
    remote_id: &str,
    synced_at: DateTime<Utc>,
) -> Result<(), AppError> {
    let rows = conn.execute(
        "UPDATE incident_reports SET is_synced = 1, remote_id = ?1, synced_at = ?2
         WHERE uuid = ?3 AND is_synced = 0",
        params![remote_id, synced_at.timestamp_millis(), uuid],
    )?;
    if rows == 0 {
        return Err(AppError::NotFound(format!("No pending report {}", uuid)));
    }
    Ok(())
}

/// Corrective edit of the report body, only while unsynced
pub fn update_report(conn: &Connection, report: &IncidentReport) -> Result<(), AppError> {
    report.validate().map_err(AppError::Validation)?;

    let existing = get_report(conn, &report.uuid)?;
    if existing.sync.is_synced {
        return Err(AppError::Validation(
            "Report is already synced and can no longer be edited".to_string(),
        ));
    }

    conn.execute(
        "UPDATE incident_reports SET body = ?1, latitude = ?2, longitude = ?3
         WHERE uuid = ?4 AND is_synced = 0",
        params![report.body, report.latitude, report.longitude, report.uuid],
    )?;
    Ok(())
}

pub fn delete_report(conn: &Connection, uuid: &str) -> Result<(), AppError> {
    let rows = conn.execute(
        "DELETE FROM incident_reports WHERE uuid = ?1",
        params![uuid],
    )?;
    if rows == 0 {
        return Err(AppError::NotFound(format!("Report {}", uuid)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database;
    use crate::models::report::MAX_REPORT_LENGTH;

    fn input(body: &str) -> ReportInput {
        ReportInput {
            user_id: "officer-7".to_string(),
            body: body.to_string(),
            captured_at: Utc::now(),
            position: None,
        }
    }

    #[test]
    fn test_body_is_trimmed() {
        let conn = database::open_test_database();
        let report = capture_report(&conn, input("  Broken window in B wing \n")).unwrap();
        assert_eq!(report.body, "Broken window in B wing");

        let stored = get_report(&conn, &report.uuid).unwrap();
        assert_eq!(stored.body, "Broken window in B wing");
    }

    #[test]
    fn test_blank_and_overlong_bodies_write_nothing() {
        let conn = database::open_test_database();
        assert!(capture_report(&conn, input("   \n\t")).is_err());
        assert!(capture_report(&conn, input(&"x".repeat(MAX_REPORT_LENGTH + 1))).is_err());
        assert!(list_reports(&conn, "officer-7").unwrap().is_empty());
    }

    #[test]
    fn test_synced_report_refuses_edits() {
        let conn = database::open_test_database();
        let mut report = capture_report(&conn, input("Gate unlocked")).unwrap();

        report.body = "Gate unlocked, relocked at 23:10".to_string();
        update_report(&conn, &report).unwrap();

        mark_report_synced(&conn, &report.uuid, "srv-5", Utc::now()).unwrap();
        report.body = "Changed after sync".to_string();
        assert!(update_report(&conn, &report).is_err());

        let stored = get_report(&conn, &report.uuid).unwrap();
        assert_eq!(stored.body, "Gate unlocked, relocked at 23:10");
    }
}
