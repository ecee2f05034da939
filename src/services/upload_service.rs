use crate::error::AppError;
use crate::services::{
    auth_service, checkpoint_service, location_service, report_service, time_service,
};
use chrono::Utc;
use patrol_api::{
    ApiError, CheckpointVerifyUpload, LocationBatchUpload, LocationPointUpload, PatrolApi,
    PhotoUpload, ReportUpload, TimeRecordUpload,
};
use patrol_auth::{AuthSession, SessionRefresher};
use photo_store::PhotoStore;
use rusqlite::Connection;
use std::sync::Arc;

use super::background_sync::SyncControl;

/// Track points uploaded together in one request
pub const LOCATION_BATCH_SIZE: usize = 50;

/// Concurrent photo uploads
const MAX_PARALLEL_PHOTO_UPLOADS: usize = 3;

/// Result of one per-kind upload pass
#[derive(Debug, Clone, Default)]
pub struct KindOutcome {
    pub uploaded: usize,
    pub failed: usize,
    /// Token was rejected and could not be refreshed, skip the rest
    pub auth_required: bool,
    pub cancelled: bool,
}

impl KindOutcome {
    pub fn merge(&mut self, other: &KindOutcome) {
        self.uploaded += other.uploaded;
        self.failed += other.failed;
        self.auth_required = self.auth_required || other.auth_required;
        self.cancelled = self.cancelled || other.cancelled;
    }

    /// True while the cycle may continue with the next kind
    pub fn keep_going(&self) -> bool {
        !self.auth_required && !self.cancelled
    }
}

/// The session carried through one sync cycle.
///
/// At most one token refresh per cycle: the first 401/403 triggers it,
/// after that a rejected token ends the cycle with `auth_required`.
pub struct SyncAuth {
    session: AuthSession,
    refresh_spent: bool,
}

impl SyncAuth {
    pub fn new(session: AuthSession) -> Self {
        Self {
            session,
            refresh_spent: false,
        }
    }

    pub fn token(&self) -> &str {
        &self.session.access_token
    }

    pub fn is_expired(&self) -> bool {
        self.session.is_expired()
    }

    /// Tries the one refresh this cycle has. Returns true when the caller
    /// should retry the rejected upload with the new token.
    pub async fn try_refresh<R>(&mut self, conn: &Connection, refresher: &R) -> bool
    where
        R: SessionRefresher + ?Sized,
    {
        if self.refresh_spent {
            return false;
        }
        self.refresh_spent = true;

        match refresher.refresh(&self.session).await {
            Ok(new_session) => {
                if let Err(e) = auth_service::save_session(conn, &new_session) {
                    log::warn!("Could not persist refreshed session: {}", e);
                }
                log::info!("Access token refreshed");
                self.session = new_session;
                true
            }
            Err(e) => {
                log::warn!("Token refresh failed: {}", e);
                false
            }
        }
    }
}

/// Uploads pending time records one by one, oldest first.
/// A failed record is logged, left pending and does not stop the rest.
pub async fn upload_time_records<A, R>(
    conn: &Connection,
    api: &A,
    auth: &mut SyncAuth,
    refresher: &R,
    control: &SyncControl,
) -> Result<KindOutcome, AppError>
where
    A: PatrolApi + ?Sized,
    R: SessionRefresher + ?Sized,
{
    let pending = time_service::unsynced_time_records(conn)?;
    let mut outcome = KindOutcome::default();

    for record in pending {
        if control.is_cancelled() {
            outcome.cancelled = true;
            break;
        }

        let upload = TimeRecordUpload {
            client_ref: record.uuid.clone(),
            user_id: record.user_id.clone(),
            record_type: record.record_type.as_str().to_string(),
            captured_at: record.captured_at,
            latitude: record.latitude,
            longitude: record.longitude,
        };

        let result = match api.upload_time_record(auth.token(), &upload).await {
            Err(ApiError::Auth(_)) => {
                if auth.try_refresh(conn, refresher).await {
                    api.upload_time_record(auth.token(), &upload).await
                } else {
                    outcome.auth_required = true;
                    break;
                }
            }
            other => other,
        };

        match result {
            Ok(remote_id) => {
                time_service::mark_time_record_synced(conn, &record.uuid, &remote_id, Utc::now())?;
                outcome.uploaded += 1;
            }
            Err(ApiError::Auth(_)) => {
                outcome.auth_required = true;
                break;
            }
            Err(e) => {
                log::warn!("Time record {} upload failed: {}", record.uuid, e);
                outcome.failed += 1;
            }
        }
    }

    Ok(outcome)
}

/// Uploads pending track points in batches per user, oldest first.
/// Every point of a successful batch gets the same server batch id.
pub async fn upload_location_records<A, R>(
    conn: &Connection,
    api: &A,
    auth: &mut SyncAuth,
    refresher: &R,
    control: &SyncControl,
) -> Result<KindOutcome, AppError>
where
    A: PatrolApi + ?Sized,
    R: SessionRefresher + ?Sized,
{
    let pending = location_service::unsynced_location_records(conn)?;
    let mut outcome = KindOutcome::default();

    // Batches never mix users; order within a user stays oldest first
    let mut by_user: Vec<(String, Vec<usize>)> = Vec::new();
    for (idx, record) in pending.iter().enumerate() {
        match by_user.iter_mut().find(|(user, _)| *user == record.user_id) {
            Some((_, indexes)) => indexes.push(idx),
            None => by_user.push((record.user_id.clone(), vec![idx])),
        }
    }

    for (user_id, indexes) in by_user {
        for chunk in indexes.chunks(LOCATION_BATCH_SIZE) {
            if control.is_cancelled() {
                outcome.cancelled = true;
                return Ok(outcome);
            }

            let records: Vec<_> = chunk.iter().map(|&i| &pending[i]).collect();
            let upload = LocationBatchUpload {
                batch_ref: ulid::Ulid::new().to_string(),
                user_id: user_id.clone(),
                points: records
                    .iter()
                    .map(|r| LocationPointUpload {
                        client_ref: r.uuid.clone(),
                        captured_at: r.captured_at,
                        latitude: r.latitude,
                        longitude: r.longitude,
                        accuracy_m: r.accuracy_m,
                    })
                    .collect(),
            };

            let result = match api.upload_location_batch(auth.token(), &upload).await {
                Err(ApiError::Auth(_)) => {
                    if auth.try_refresh(conn, refresher).await {
                        api.upload_location_batch(auth.token(), &upload).await
                    } else {
                        outcome.auth_required = true;
                        return Ok(outcome);
                    }
                }
                other => other,
            };

            match result {
                Ok(remote_id) => {
                    let uuids: Vec<String> = records.iter().map(|r| r.uuid.clone()).collect();
                    location_service::mark_location_batch_synced(
                        conn,
                        &uuids,
                        &remote_id,
                        Utc::now(),
                    )?;
                    outcome.uploaded += records.len();
                }
                Err(ApiError::Auth(_)) => {
                    outcome.auth_required = true;
                    return Ok(outcome);
                }
                Err(e) => {
                    log::warn!("Location batch of {} points failed: {}", records.len(), e);
                    outcome.failed += records.len();
                }
            }
        }
    }

    Ok(outcome)
}

/// Uploads pending checkpoint verifications one by one, oldest first
pub async fn upload_checkpoint_verifications<A, R>(
    conn: &Connection,
    api: &A,
    auth: &mut SyncAuth,
    refresher: &R,
    control: &SyncControl,
) -> Result<KindOutcome, AppError>
where
    A: PatrolApi + ?Sized,
    R: SessionRefresher + ?Sized,
{
    let pending = checkpoint_service::unsynced_verifications(conn)?;
    let mut outcome = KindOutcome::default();

    for verification in pending {
        if control.is_cancelled() {
            outcome.cancelled = true;
            break;
        }

        let upload = CheckpointVerifyUpload {
            client_ref: verification.uuid.clone(),
            user_id: verification.user_id.clone(),
            checkpoint_id: verification.checkpoint_id.clone(),
            captured_at: verification.captured_at,
            latitude: verification.latitude,
            longitude: verification.longitude,
        };

        let result = match api
            .upload_checkpoint_verification(auth.token(), &upload)
            .await
        {
            Err(ApiError::Auth(_)) => {
                if auth.try_refresh(conn, refresher).await {
                    api.upload_checkpoint_verification(auth.token(), &upload).await
                } else {
                    outcome.auth_required = true;
                    break;
                }
            }
            other => other,
        };

        match result {
            Ok(remote_id) => {
                checkpoint_service::mark_verification_synced(
                    conn,
                    &verification.uuid,
                    &remote_id,
                    Utc::now(),
                )?;
                outcome.uploaded += 1;
            }
            Err(ApiError::Auth(_)) => {
                outcome.auth_required = true;
                break;
            }
            Err(e) => {
                log::warn!("Verification {} upload failed: {}", verification.uuid, e);
                outcome.failed += 1;
            }
        }
    }

    Ok(outcome)
}

/// Uploads pending reports one by one, oldest first
pub async fn upload_reports<A, R>(
    conn: &Connection,
    api: &A,
    auth: &mut SyncAuth,
    refresher: &R,
    control: &SyncControl,
) -> Result<KindOutcome, AppError>
where
    A: PatrolApi + ?Sized,
    R: SessionRefresher + ?Sized,
{
    let pending = report_service::unsynced_reports(conn)?;
    let mut outcome = KindOutcome::default();

    for report in pending {
        if control.is_cancelled() {
            outcome.cancelled = true;
            break;
        }

        let upload = ReportUpload {
            client_ref: report.uuid.clone(),
            user_id: report.user_id.clone(),
            body: report.body.clone(),
            captured_at: report.captured_at,
            latitude: report.latitude,
            longitude: report.longitude,
        };

        let result = match api.upload_report(auth.token(), &upload).await {
            Err(ApiError::Auth(_)) => {
                if auth.try_refresh(conn, refresher).await {
                    api.upload_report(auth.token(), &upload).await
                } else {
                    outcome.auth_required = true;
                    break;
                }
            }
            other => other,
        };

        match result {
            Ok(remote_id) => {
                report_service::mark_report_synced(conn, &report.uuid, &remote_id, Utc::now())?;
                outcome.uploaded += 1;
            }
            Err(ApiError::Auth(_)) => {
                outcome.auth_required = true;
                break;
            }
            Err(e) => {
                log::warn!("Report {} upload failed: {}", report.uuid, e);
                outcome.failed += 1;
            }
        }
    }

    Ok(outcome)
}

/// Uploads pending photos with up to three requests in flight.
///
/// Payloads are read and encoded on this thread because the database
/// connection cannot move into the tasks. Uploads that hit a token
/// rejection are collected and retried once after a refresh.
pub async fn upload_photos<A, R>(
    conn: &Connection,
    api: &Arc<A>,
    store: &PhotoStore,
    auth: &mut SyncAuth,
    refresher: &R,
    control: &SyncControl,
) -> Result<KindOutcome, AppError>
where
    A: PatrolApi + Send + Sync + 'static,
    R: SessionRefresher + ?Sized,
{
    use tokio::task::JoinSet;

    let pending = store.pending_photos(conn)?;
    let mut outcome = KindOutcome::default();
    if pending.is_empty() {
        return Ok(outcome);
    }

    let mut join_set: JoinSet<(String, PhotoUpload, Result<String, ApiError>)> = JoinSet::new();
    let mut auth_retry: Vec<(String, PhotoUpload)> = Vec::new();

    for photo in &pending {
        if control.is_cancelled() {
            outcome.cancelled = true;
            break;
        }

        let bytes = match store.load_original(conn, &photo.uuid) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("Photo {} unreadable, skipping: {}", photo.uuid, e);
                outcome.failed += 1;
                continue;
            }
        };

        let upload = PhotoUpload {
            client_ref: photo.uuid.clone(),
            user_id: photo.user_id.clone(),
            captured_at: photo.captured_at,
            latitude: photo.latitude,
            longitude: photo.longitude,
            content_type: photo.content_type.clone(),
            checksum_sha256: photo.checksum_sha256.clone(),
            image_base64: PhotoUpload::encode_image(&bytes),
        };

        while join_set.len() >= MAX_PARALLEL_PHOTO_UPLOADS {
            if let Some(result) = join_set.join_next().await {
                handle_photo_result(conn, store, result, &mut outcome, &mut auth_retry)?;
            }
        }

        let api = api.clone();
        let token = auth.token().to_string();
        let uuid = photo.uuid.clone();
        join_set.spawn(async move {
            let result = api.upload_photo(&token, &upload).await;
            (uuid, upload, result)
        });
    }

    while let Some(result) = join_set.join_next().await {
        handle_photo_result(conn, store, result, &mut outcome, &mut auth_retry)?;
    }

    if !auth_retry.is_empty() && !outcome.cancelled {
        if auth.try_refresh(conn, refresher).await {
            for (uuid, upload) in auth_retry {
                if control.is_cancelled() {
                    outcome.cancelled = true;
                    break;
                }
                match api.upload_photo(auth.token(), &upload).await {
                    Ok(remote_id) => {
                        store.mark_synced(conn, &uuid, &remote_id, Utc::now())?;
                        outcome.uploaded += 1;
                    }
                    Err(ApiError::Auth(_)) => {
                        outcome.auth_required = true;
                        break;
                    }
                    Err(e) => {
                        log::warn!("Photo {} upload failed: {}", uuid, e);
                        outcome.failed += 1;
                    }
                }
            }
        } else {
            outcome.auth_required = true;
        }
    }

    Ok(outcome)
}

fn handle_photo_result(
    conn: &Connection,
    store: &PhotoStore,
    result: Result<(String, PhotoUpload, Result<String, ApiError>), tokio::task::JoinError>,
    outcome: &mut KindOutcome,
    auth_retry: &mut Vec<(String, PhotoUpload)>,
) -> Result<(), AppError> {
    let (uuid, upload, upload_result) = match result {
        Ok(done) => done,
        Err(e) => {
            log::error!("Photo upload task failed: {}", e);
            outcome.failed += 1;
            return Ok(());
        }
    };

    match upload_result {
        Ok(remote_id) => {
            store.mark_synced(conn, &uuid, &remote_id, Utc::now())?;
            outcome.uploaded += 1;
        }
        Err(ApiError::Auth(_)) => {
            auth_retry.push((uuid, upload));
        }
        Err(e) => {
            log::warn!("Photo {} upload failed: {}", uuid, e);
            outcome.failed += 1;
        }
    }

    Ok(())
}

/// Pending counts per entity kind, used for cycle stats and the
/// status command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingCounts {
    pub time_records: usize,
    pub location_records: usize,
    pub checkpoint_verifications: usize,
    pub reports: usize,
    pub photos: usize,
}

impl PendingCounts {
    pub fn total(&self) -> usize {
        self.time_records
            + self.location_records
            + self.checkpoint_verifications
            + self.reports
            + self.photos
    }
}

pub fn pending_counts(conn: &Connection, store: &PhotoStore) -> Result<PendingCounts, AppError> {
    let count = |table: &str| -> Result<usize, AppError> {
        let n: usize = conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE is_synced = 0", table),
            [],
            |row| row.get(0),
        )?;
        Ok(n)
    };

    Ok(PendingCounts {
        time_records: count("time_records")?,
        location_records: count("location_records")?,
        checkpoint_verifications: count("checkpoint_verifications")?,
        reports: count("incident_reports")?,
        photos: store.count_pending(conn)?,
    })
}
