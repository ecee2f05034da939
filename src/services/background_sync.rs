use crate::config;
use crate::database;
use crate::error::AppError;
use crate::services::{
    auth_service, cleanup_service, download_service, photo_service, sync_service, upload_service,
};
use chrono::Utc;
use patrol_api::{HttpPatrolApi, PatrolApi};
use patrol_auth::{PhoneAuthService, SessionRefresher};
use photo_store::PhotoStore;
use rusqlite::Connection;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::OnceLock;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;

use super::upload_service::{KindOutcome, SyncAuth};

/// Fallback interval when no settings row exists yet
const DEFAULT_INTERVAL_SECONDS: u64 = 60;
/// Base delay after a failed cycle, doubled per consecutive error
const RETRY_DELAY_SECONDS: u64 = 30;
/// Random extra delay so restarted devices do not sync in lockstep
const RETRY_JITTER_SECONDS: u64 = 10;
/// In-memory session log cap
const SYNC_LOG_CAP: usize = 200;

/// Global flag to control the background sync loop
static SYNC_ENABLED: AtomicBool = AtomicBool::new(false);
/// Guards against overlapping cycles; a second trigger skips
static CYCLE_RUNNING: AtomicBool = AtomicBool::new(false);
static NEXT_SYNC_AT: AtomicU64 = AtomicU64::new(0); // epoch ms of next planned sync
static SYNC_LOG: OnceLock<Arc<Mutex<Vec<SyncLogEntry>>>> = OnceLock::new();
static SYNC_CONTROL: OnceLock<Arc<SyncControl>> = OnceLock::new();

/// Global progress channel for photo uploads: (uploaded, total)
static UPLOAD_PROGRESS: OnceLock<watch::Sender<(usize, usize)>> = OnceLock::new();

/// Cooperative cancellation handle for a running cycle.
///
/// The flag is checked between entity uploads, never during one, so a
/// cancelled cycle still finishes the request in flight and records its
/// result.
#[derive(Debug, Default)]
pub struct SyncControl {
    cancelled: AtomicBool,
}

impl SyncControl {
    pub fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Control handle shared by the sync loop and `cancel_sync`
pub fn sync_control() -> Arc<SyncControl> {
    SYNC_CONTROL
        .get_or_init(|| Arc::new(SyncControl::new()))
        .clone()
}

/// Requests cancellation of the running cycle after its current upload
pub fn cancel_sync() {
    sync_control().cancel();
}

/// Outcome of one sync cycle
#[derive(Debug, Clone)]
pub struct SyncStats {
    pub cycle_id: String,
    pub started_at_ms: i64,
    pub duration_ms: i64,
    pub uploaded: usize,
    pub failed: usize,
    /// Entities still waiting after the cycle
    pub pending: usize,
    pub auth_required: bool,
    pub cancelled: bool,
}

/// In-memory session log entry (volatile, lost on restart)
#[derive(Debug, Clone, PartialEq)]
pub struct SyncLogEntry {
    pub ts_ms: i64,
    pub uploaded: usize,
    pub failed: usize,
    pub pending: usize,
    pub auth_required: bool,
}

fn log_store() -> Arc<Mutex<Vec<SyncLogEntry>>> {
    SYNC_LOG
        .get_or_init(|| Arc::new(Mutex::new(Vec::new())))
        .clone()
}

fn append_log(entry: SyncLogEntry) {
    if let Ok(mut guard) = log_store().lock() {
        guard.push(entry);
        let len = guard.len();
        if len > SYNC_LOG_CAP {
            let remove = len - SYNC_LOG_CAP;
            guard.drain(0..remove);
        }
    }
}

pub fn get_sync_log() -> Vec<SyncLogEntry> {
    if let Ok(guard) = log_store().lock() {
        guard.clone()
    } else {
        Vec::new()
    }
}

pub fn next_sync_eta_seconds() -> Option<u64> {
    if !SYNC_ENABLED.load(Ordering::SeqCst) {
        return None;
    }
    let now_ms = epoch_ms();
    let target = NEXT_SYNC_AT.load(Ordering::SeqCst);
    if target == 0 || target <= now_ms {
        Some(0)
    } else {
        Some((target - now_ms) / 1000)
    }
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Subscribe to photo upload progress updates (uploaded, total)
pub fn subscribe_upload_progress() -> watch::Receiver<(usize, usize)> {
    UPLOAD_PROGRESS
        .get_or_init(|| {
            let (tx, _rx) = watch::channel((0, 0));
            tx
        })
        .subscribe()
}

fn set_upload_progress(current: usize, total: usize) {
    let tx = UPLOAD_PROGRESS.get_or_init(|| {
        let (tx, _rx) = watch::channel((0, 0));
        tx
    });
    let _ = tx.send((current, total));
}

/// Runs one sync cycle over the given connection and services.
///
/// Upload order is time records, track points, checkpoint verifications,
/// reports, photos; within each kind oldest capture first. A kind that
/// ends with a token the server no longer accepts stops the cycle with
/// `auth_required`, cancellation stops it after the upload in flight.
/// Reference data is refreshed at the end; a failure there only logs,
/// captured data always comes first.
pub async fn run_sync_cycle<A, R>(
    conn: &Connection,
    api: &Arc<A>,
    refresher: &R,
    store: &PhotoStore,
    control: &SyncControl,
) -> Result<SyncStats, AppError>
where
    A: PatrolApi + Send + Sync + 'static,
    R: SessionRefresher + ?Sized,
{
    let started = Utc::now();
    let cycle_id = ulid::Ulid::new().to_string();

    let settings = sync_service::load_sync_settings(conn)?
        .ok_or_else(|| AppError::NotFound("Sync settings".to_string()))?;
    if !settings.enabled {
        return Err(AppError::Validation("Sync is disabled".to_string()));
    }

    let session = auth_service::load_session(conn)?
        .ok_or_else(|| AppError::NotFound("No signed-in session".to_string()))?;

    log::debug!("Sync cycle {} started", cycle_id);

    let mut auth = SyncAuth::new(session);
    let mut total = KindOutcome::default();

    // A token already past its lifetime would fail every upload, spend
    // the cycle's one refresh up front
    if auth.is_expired() && !auth.try_refresh(conn, refresher).await {
        total.auth_required = true;
    }

    if total.keep_going() {
        let out =
            upload_service::upload_time_records(conn, api.as_ref(), &mut auth, refresher, control)
                .await?;
        total.merge(&out);
    }
    if total.keep_going() {
        let out = upload_service::upload_location_records(
            conn,
            api.as_ref(),
            &mut auth,
            refresher,
            control,
        )
        .await?;
        total.merge(&out);
    }
    if total.keep_going() {
        let out = upload_service::upload_checkpoint_verifications(
            conn,
            api.as_ref(),
            &mut auth,
            refresher,
            control,
        )
        .await?;
        total.merge(&out);
    }
    if total.keep_going() {
        let out =
            upload_service::upload_reports(conn, api.as_ref(), &mut auth, refresher, control)
                .await?;
        total.merge(&out);
    }
    if total.keep_going() {
        let photo_total = store.count_pending(conn)?;
        set_upload_progress(0, photo_total);
        let out =
            upload_service::upload_photos(conn, api, store, &mut auth, refresher, control).await?;
        set_upload_progress(out.uploaded, photo_total);
        total.merge(&out);
        set_upload_progress(0, 0);
    }

    if total.keep_going() {
        match download_service::refresh_reference_data(conn, api.as_ref(), auth.token()).await {
            Ok(count) => log::debug!("Reference data refreshed, {} entries", count),
            Err(e) => log::warn!("Reference data refresh failed: {}", e),
        }
        sync_service::update_last_sync(conn)?;
    }

    let pending = upload_service::pending_counts(conn, store)?;
    let stats = SyncStats {
        cycle_id,
        started_at_ms: started.timestamp_millis(),
        duration_ms: (Utc::now() - started).num_milliseconds(),
        uploaded: total.uploaded,
        failed: total.failed,
        pending: pending.total(),
        auth_required: total.auth_required,
        cancelled: total.cancelled,
    };

    if stats.uploaded > 0 || stats.failed > 0 {
        log::info!(
            "Sync cycle {}: {} uploaded, {} failed, {} pending in {} ms",
            stats.cycle_id,
            stats.uploaded,
            stats.failed,
            stats.pending,
            stats.duration_ms
        );
    }

    append_log(SyncLogEntry {
        ts_ms: stats.started_at_ms,
        uploaded: stats.uploaded,
        failed: stats.failed,
        pending: stats.pending,
        auth_required: stats.auth_required,
    });

    Ok(stats)
}

/// Runs one cycle against the configured backend.
///
/// Returns `Ok(None)` when another cycle is already in flight; cycles
/// never overlap, the later trigger is skipped.
pub async fn perform_sync_cycle() -> Result<Option<SyncStats>, AppError> {
    if CYCLE_RUNNING
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        log::debug!("Sync cycle already running, skipping this trigger");
        return Ok(None);
    }

    let result = run_configured_cycle().await;
    CYCLE_RUNNING.store(false, Ordering::SeqCst);
    result.map(Some)
}

async fn run_configured_cycle() -> Result<SyncStats, AppError> {
    let conn = database::init_database()?;
    let app_config = config::load_or_default(&config::config_path())?;
    let settings = sync_service::ensure_sync_settings(&conn, &app_config)?;

    let api = Arc::new(HttpPatrolApi::new(settings.server_url.clone())?);
    let refresher = PhoneAuthService::new(settings.server_url.clone())?;
    let store = photo_service::build_store(&app_config);

    let control = sync_control();
    control.reset();

    run_sync_cycle(&conn, &api, &refresher, &store, &control).await
}

/// Triggers an immediate cycle in addition to the scheduled ones
pub async fn sync_now() -> Result<Option<SyncStats>, AppError> {
    perform_sync_cycle().await
}

/// Starts the background sync loop
///
/// Runs a cycle every configured interval until `stop_background_sync()`
/// is called. Failed cycles back off exponentially with a little jitter.
pub fn start_background_sync() {
    if SYNC_ENABLED.swap(true, Ordering::SeqCst) {
        log::warn!("Background sync already running");
        return;
    }

    log::info!("Starting background sync");

    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("Failed to create tokio runtime");

        let mut consecutive_errors: u32 = 0;

        while SYNC_ENABLED.load(Ordering::SeqCst) {
            runtime.block_on(async {
                match perform_sync_cycle().await {
                    Ok(Some(stats)) => {
                        consecutive_errors = 0;
                        if stats.cancelled {
                            log::info!("Sync cycle was cancelled");
                        }
                        if stats.auth_required {
                            log::warn!("Sync paused, sign-in required");
                        }
                        if let Err(e) = cleanup_service::run_cleanup_if_due() {
                            log::warn!("Retention cleanup failed: {}", e);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        consecutive_errors += 1;
                        log::error!("Sync cycle failed: {}", e);
                    }
                }

                let delay = if consecutive_errors == 0 {
                    configured_interval_seconds()
                } else {
                    retry_delay_seconds(consecutive_errors)
                };

                NEXT_SYNC_AT.store(epoch_ms() + delay * 1000, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(delay)).await;
            });
        }

        log::info!("Background sync stopped");
    });
}

/// Stops the background sync loop
pub fn stop_background_sync() {
    if SYNC_ENABLED.swap(false, Ordering::SeqCst) {
        log::info!("Stopping background sync");
    }
}

/// Checks if the background sync loop is running
pub fn is_background_sync_running() -> bool {
    SYNC_ENABLED.load(Ordering::SeqCst)
}

/// Current interval from the settings row, default when unconfigured
fn configured_interval_seconds() -> u64 {
    database::init_database()
        .ok()
        .and_then(|conn| sync_service::load_sync_settings(&conn).ok().flatten())
        .map(|settings| settings.sync_interval_seconds.max(1) as u64)
        .unwrap_or(DEFAULT_INTERVAL_SECONDS)
}

fn retry_delay_seconds(consecutive_errors: u32) -> u64 {
    let shift = consecutive_errors.saturating_sub(1).min(4);
    let backoff = RETRY_DELAY_SECONDS << shift;
    backoff + rand::random_range(0..=RETRY_JITTER_SECONDS)
}
