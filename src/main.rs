mod config;
mod database;
mod error;
mod filesystem;
mod models;
mod services;

use chrono::Utc;
use error::AppError;
use models::TimeRecordType;
use patrol_auth::AuthSession;
use services::checkpoint_service::CheckpointVerifyInput;
use services::location_service::LocationPointInput;
use services::report_service::ReportInput;
use services::time_service::{ClockStatus, TimeCaptureInput};
use services::{
    auth_service, background_sync, checkpoint_service, cleanup_service, export_service,
    location_service, photo_service, report_service, sync_service, time_service, upload_service,
};
use std::io::Write;
use std::time::Duration;

fn main() {
    init_logging();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("daemon");

    let result = match command {
        "daemon" => run_daemon(),
        "sync" => run_once(),
        "status" => show_status(),
        "history" => show_history(),
        "checkpoints" => show_checkpoints(),
        "clock-in" => run_clock(TimeRecordType::ClockIn, &args[2..]),
        "clock-out" => run_clock(TimeRecordType::ClockOut, &args[2..]),
        "track" => run_track(&args[2..]),
        "verify" => run_verify(&args[2..]),
        "report" => run_report(&args[2..]),
        "photo" => run_photo(&args[2..]),
        "amend-report" => run_amend_report(&args[2..]),
        "amend-time" => run_amend_time(&args[2..]),
        "discard" => run_discard(&args[2..]),
        "cleanup" => run_cleanup(),
        "export" => run_export(),
        "config" => show_config(),
        "login" => run_login(args.get(2).map(|s| s.as_str())),
        "logout" => run_logout(),
        "enable" => set_enabled(true),
        "disable" => set_enabled(false),
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            std::process::exit(2);
        }
    };

    if let Err(e) = result {
        log::error!("{}", e);
        eprintln!("{}", e.user_message());
        std::process::exit(1);
    }
}

#[cfg(not(target_os = "android"))]
fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

#[cfg(target_os = "android")]
fn init_logging() {
    android_logger::init_once(
        android_logger::Config::default().with_max_level(log::LevelFilter::Info),
    );
}

fn open_configured(
) -> Result<(rusqlite::Connection, config::AppConfig, models::SyncSettings), AppError> {
    let conn = database::init_database()?;
    let app_config = config::load_or_default(&config::config_path())?;
    let settings = sync_service::ensure_sync_settings(&conn, &app_config)?;
    Ok((conn, app_config, settings))
}

fn runtime() -> Result<tokio::runtime::Runtime, AppError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| AppError::Other(format!("Failed to create runtime: {}", e)))
}

fn require_session(conn: &rusqlite::Connection) -> Result<AuthSession, AppError> {
    auth_service::load_session(conn)?.ok_or_else(|| {
        AppError::NotFound(
            "No signed-in session, run `security-patrol login <phone>`".to_string(),
        )
    })
}

fn parse_number(args: &[String], index: usize, name: &str) -> Result<f64, AppError> {
    let raw = args
        .get(index)
        .ok_or_else(|| AppError::Validation(format!("Missing {}", name)))?;
    raw.parse::<f64>()
        .map_err(|_| AppError::Validation(format!("Invalid {}: {}", name, raw)))
}

fn sync_tag(is_synced: bool) -> &'static str {
    if is_synced {
        "[synced]"
    } else {
        "[pending]"
    }
}

/// Runs the sync loop until the process is stopped.
///
/// Ctrl-C cancels a running cycle at the next upload boundary, stops
/// the loop and prints a short session summary.
fn run_daemon() -> Result<(), AppError> {
    open_configured()?;

    background_sync::start_background_sync();
    log::info!("Daemon running, Ctrl-C stops it");

    runtime()?.block_on(async {
        let mut progress = background_sync::subscribe_upload_progress();
        while background_sync::is_background_sync_running() {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    if let Err(e) = signal {
                        log::warn!("Ctrl-C handler failed: {}", e);
                    }
                    log::info!("Shutting down");
                    background_sync::cancel_sync();
                    background_sync::stop_background_sync();
                }
                changed = progress.changed() => {
                    if changed.is_ok() {
                        let (done, total) = *progress.borrow_and_update();
                        if total > 0 {
                            log::info!("Uploading photos {}/{}", done, total);
                        }
                    }
                }
                _ = tokio::time::sleep(Duration::from_secs(60)) => {
                    if let Some(eta) = background_sync::next_sync_eta_seconds() {
                        log::debug!("Next sync in {} s", eta);
                    }
                }
            }
        }
    });

    let cycles = background_sync::get_sync_log();
    let uploaded: usize = cycles.iter().map(|c| c.uploaded).sum();
    let failed: usize = cycles.iter().map(|c| c.failed).sum();
    println!(
        "Daemon stopped: {} sync cycles, {} uploaded, {} failed",
        cycles.len(),
        uploaded,
        failed
    );
    if let Some(last) = cycles.last() {
        if let Some(at) = chrono::DateTime::from_timestamp_millis(last.ts_ms) {
            println!("Last cycle at {} UTC", at.format("%H:%M:%S"));
        }
        if last.pending > 0 {
            println!("{} captures still pending", last.pending);
        }
        if last.auth_required {
            println!("Sign-in required, run `security-patrol login <phone>`");
        }
    }
    Ok(())
}

/// One sync cycle plus a retention pass when one is due
fn run_once() -> Result<(), AppError> {
    open_configured()?;

    let stats = runtime()?.block_on(background_sync::sync_now())?;
    match stats {
        Some(stats) => {
            println!(
                "Synced: {} uploaded, {} failed, {} pending",
                stats.uploaded, stats.failed, stats.pending
            );
            if stats.auth_required {
                println!("Sign-in required, run `security-patrol login <phone>`");
            }
        }
        None => println!("A sync cycle is already running"),
    }

    if let Some(cleanup) = cleanup_service::run_cleanup_if_due()? {
        println!("Cleanup removed {} rows", cleanup.total_rows());
    }
    Ok(())
}

fn show_status() -> Result<(), AppError> {
    let (conn, app_config, settings) = open_configured()?;
    let store = photo_service::build_store(&app_config);

    let session = auth_service::load_session(&conn)?;
    match &session {
        Some(session) if !session.is_expired() => println!("Signed in as {}", session.user_id),
        Some(session) => println!("Signed in as {} (token expired)", session.user_id),
        None => println!("Not signed in"),
    }
    if let Some(session) = &session {
        let duty = match time_service::current_status(&conn, &session.user_id)? {
            ClockStatus::ClockedIn => "on duty",
            ClockStatus::ClockedOut => "off duty",
        };
        println!("Duty: {}", duty);
    }

    println!("Device: {}", sync_service::get_device_id(&conn)?);
    println!("Server: {}", settings.server_url);
    println!(
        "Sync: {}",
        if settings.enabled { "enabled" } else { "disabled" }
    );
    if let Some(last) = &settings.last_sync {
        println!("Last sync: {}", last);
    }
    if let Some(last) = &settings.last_cleanup {
        println!("Last cleanup: {}", last);
    }

    let pending = upload_service::pending_counts(&conn, &store)?;
    println!("Pending uploads: {}", pending.total());
    println!("  time records: {}", pending.time_records);
    println!("  track points: {}", pending.location_records);
    println!("  checkpoint verifications: {}", pending.checkpoint_verifications);
    println!("  reports: {}", pending.reports);
    println!("  photos: {}", pending.photos);
    Ok(())
}

/// Recent captures of the signed-in officer, newest first
fn show_history() -> Result<(), AppError> {
    let (conn, app_config, _) = open_configured()?;
    let session = require_session(&conn)?;
    let store = photo_service::build_store(&app_config);

    println!("Time records:");
    for record in time_service::list_time_records(&conn, &session.user_id)?
        .iter()
        .take(10)
    {
        println!(
            "  {} {:<9} {:<9} {}",
            record.captured_at.format("%Y-%m-%d %H:%M"),
            record.record_type.as_str(),
            sync_tag(record.sync.is_synced),
            record.uuid
        );
    }

    println!("Reports:");
    for report in report_service::list_reports(&conn, &session.user_id)?
        .iter()
        .take(10)
    {
        println!(
            "  {} {:<9} {}  {:.60}",
            report.captured_at.format("%Y-%m-%d %H:%M"),
            sync_tag(report.sync.is_synced),
            report.uuid,
            report.body
        );
    }

    println!("Checkpoint verifications:");
    for verification in checkpoint_service::list_verifications(&conn, &session.user_id)?
        .iter()
        .take(10)
    {
        println!(
            "  {} {:<9} {}  checkpoint {}",
            verification.captured_at.format("%Y-%m-%d %H:%M"),
            sync_tag(verification.sync.is_synced),
            verification.uuid,
            verification.checkpoint_id
        );
    }

    let track = location_service::list_location_records(&conn, &session.user_id)?;
    let pending = track.iter().filter(|r| !r.sync.is_synced).count();
    println!("Track points: {} captured, {} pending", track.len(), pending);

    println!("Photos:");
    for photo in store.list_photos(&conn)?.iter().take(10) {
        println!(
            "  {} {:<9} {}  {}",
            photo.captured_at.format("%Y-%m-%d %H:%M"),
            sync_tag(photo.is_synced),
            photo.uuid,
            photo.file_name
        );
    }
    Ok(())
}

/// Cached patrol locations and their checkpoints
fn show_checkpoints() -> Result<(), AppError> {
    let (conn, _, _) = open_configured()?;

    let locations = checkpoint_service::list_patrol_locations(&conn)?;
    let checkpoints = checkpoint_service::list_checkpoints(&conn)?;
    if locations.is_empty() && checkpoints.is_empty() {
        println!("No cached patrol data, run `security-patrol sync` while online");
        return Ok(());
    }

    for location in &locations {
        println!("{} [{}]", location.name, location.remote_id);
        for checkpoint in checkpoints
            .iter()
            .filter(|c| c.location_id == location.remote_id)
        {
            println!(
                "  {} [{}] at {:.5}, {:.5}",
                checkpoint.name, checkpoint.remote_id, checkpoint.latitude, checkpoint.longitude
            );
        }
    }
    for checkpoint in checkpoints
        .iter()
        .filter(|c| !locations.iter().any(|l| l.remote_id == c.location_id))
    {
        println!(
            "{} [{}] at {:.5}, {:.5}",
            checkpoint.name, checkpoint.remote_id, checkpoint.latitude, checkpoint.longitude
        );
    }
    Ok(())
}

fn run_clock(record_type: TimeRecordType, args: &[String]) -> Result<(), AppError> {
    let latitude = parse_number(args, 0, "latitude")?;
    let longitude = parse_number(args, 1, "longitude")?;

    let (conn, _, _) = open_configured()?;
    let session = require_session(&conn)?;

    let record = time_service::capture_time_record(
        &conn,
        TimeCaptureInput {
            user_id: session.user_id,
            record_type,
            captured_at: Utc::now(),
            latitude,
            longitude,
        },
    )?;
    println!(
        "Captured {} at {:.5}, {:.5} ({})",
        record.record_type.as_str(),
        record.latitude,
        record.longitude,
        record.uuid
    );
    Ok(())
}

fn run_track(args: &[String]) -> Result<(), AppError> {
    if args.is_empty() || args.len() % 3 != 0 {
        return Err(AppError::Validation(
            "Usage: security-patrol track <lat> <lon> <accuracy-m> [<lat> <lon> <accuracy-m> ...]"
                .to_string(),
        ));
    }

    let (conn, _, _) = open_configured()?;
    let session = require_session(&conn)?;

    let now = Utc::now();
    let mut points: Vec<LocationPointInput> = Vec::with_capacity(args.len() / 3);
    for chunk in args.chunks(3) {
        points.push(LocationPointInput {
            captured_at: now,
            latitude: parse_number(chunk, 0, "latitude")?,
            longitude: parse_number(chunk, 1, "longitude")?,
            accuracy_m: parse_number(chunk, 2, "accuracy")?,
        });
    }

    if points.len() == 1 {
        let record = location_service::capture_position(&conn, &session.user_id, points.remove(0))?;
        println!("Captured track point {}", record.uuid);
    } else {
        let records = location_service::capture_location_batch(&conn, &session.user_id, points)?;
        println!("Captured {} track points", records.len());
    }
    Ok(())
}

fn run_verify(args: &[String]) -> Result<(), AppError> {
    let checkpoint_id = args.first().ok_or_else(|| {
        AppError::Validation("Usage: security-patrol verify <checkpoint-id> <lat> <lon>".to_string())
    })?;
    let latitude = parse_number(args, 1, "latitude")?;
    let longitude = parse_number(args, 2, "longitude")?;

    let (conn, app_config, _) = open_configured()?;
    let session = require_session(&conn)?;

    let verification = checkpoint_service::capture_checkpoint_verification(
        &conn,
        CheckpointVerifyInput {
            user_id: session.user_id,
            checkpoint_id: checkpoint_id.clone(),
            captured_at: Utc::now(),
            latitude,
            longitude,
        },
        app_config.checkpoint.proximity_radius_m,
    )?;
    println!(
        "Verified checkpoint {} ({})",
        verification.checkpoint_id, verification.uuid
    );
    Ok(())
}

fn run_report(args: &[String]) -> Result<(), AppError> {
    let body = args.first().ok_or_else(|| {
        AppError::Validation("Usage: security-patrol report <text> [<lat> <lon>]".to_string())
    })?;
    let position = if args.len() > 1 {
        Some((
            parse_number(args, 1, "latitude")?,
            parse_number(args, 2, "longitude")?,
        ))
    } else {
        None
    };

    let (conn, _, _) = open_configured()?;
    let session = require_session(&conn)?;

    let report = report_service::capture_report(
        &conn,
        ReportInput {
            user_id: session.user_id,
            body: body.clone(),
            captured_at: Utc::now(),
            position,
        },
    )?;
    println!("Captured report {}", report.uuid);
    Ok(())
}

fn run_photo(args: &[String]) -> Result<(), AppError> {
    let path = args.first().ok_or_else(|| {
        AppError::Validation("Usage: security-patrol photo <file> [<lat> <lon>]".to_string())
    })?;
    let (latitude, longitude) = if args.len() > 1 {
        (
            Some(parse_number(args, 1, "latitude")?),
            Some(parse_number(args, 2, "longitude")?),
        )
    } else {
        (None, None)
    };

    let (conn, app_config, _) = open_configured()?;
    let session = require_session(&conn)?;
    let store = photo_service::build_store(&app_config);
    let bytes = std::fs::read(path)?;

    let photo = runtime()?.block_on(photo_service::capture_photo(
        &conn,
        &store,
        photo_store::NewPhotoCapture {
            user_id: session.user_id,
            captured_at: Utc::now(),
            latitude,
            longitude,
            bytes,
        },
    ))?;
    println!("Captured photo {} ({} bytes stored)", photo.uuid, photo.size_bytes);
    Ok(())
}

/// Rewrites the text of a report that has not been uploaded yet
fn run_amend_report(args: &[String]) -> Result<(), AppError> {
    let usage = "Usage: security-patrol amend-report <uuid> <text>";
    let uuid = args
        .first()
        .ok_or_else(|| AppError::Validation(usage.to_string()))?;
    let body = args
        .get(1)
        .ok_or_else(|| AppError::Validation(usage.to_string()))?;

    let (conn, _, _) = open_configured()?;
    let mut report = report_service::get_report(&conn, uuid)?;
    report.body = body.trim().to_string();
    report_service::update_report(&conn, &report)?;
    println!("Updated report {}", report.uuid);
    Ok(())
}

/// Corrects the position of a clock record that has not been uploaded yet
fn run_amend_time(args: &[String]) -> Result<(), AppError> {
    let uuid = args.first().ok_or_else(|| {
        AppError::Validation("Usage: security-patrol amend-time <uuid> <lat> <lon>".to_string())
    })?;
    let latitude = parse_number(args, 1, "latitude")?;
    let longitude = parse_number(args, 2, "longitude")?;

    let (conn, _, _) = open_configured()?;
    let mut record = time_service::get_time_record(&conn, uuid)?;
    record.latitude = latitude;
    record.longitude = longitude;
    time_service::update_time_record(&conn, &record)?;
    println!("Updated {} {}", record.record_type.as_str(), record.uuid);
    Ok(())
}

fn run_discard(args: &[String]) -> Result<(), AppError> {
    let usage = "Usage: security-patrol discard <time|track|verification|report|photo> <uuid>";
    let kind = args
        .first()
        .ok_or_else(|| AppError::Validation(usage.to_string()))?;
    let uuid = args
        .get(1)
        .ok_or_else(|| AppError::Validation(usage.to_string()))?;

    let (conn, app_config, _) = open_configured()?;
    match kind.as_str() {
        "time" => {
            let record = time_service::get_time_record(&conn, uuid)?;
            time_service::delete_time_record(&conn, uuid)?;
            println!(
                "Discarded {} from {}",
                record.record_type.as_str(),
                record.captured_at.format("%Y-%m-%d %H:%M")
            );
        }
        "track" => {
            let record = location_service::get_location_record(&conn, uuid)?;
            location_service::delete_location_record(&conn, uuid)?;
            println!(
                "Discarded track point from {}",
                record.captured_at.format("%Y-%m-%d %H:%M")
            );
        }
        "verification" => {
            let verification = checkpoint_service::get_verification(&conn, uuid)?;
            checkpoint_service::delete_verification(&conn, uuid)?;
            println!(
                "Discarded verification of checkpoint {}",
                verification.checkpoint_id
            );
        }
        "report" => {
            report_service::delete_report(&conn, uuid)?;
            println!("Discarded report {}", uuid);
        }
        "photo" => {
            let store = photo_service::build_store(&app_config);
            store.delete_photo(&conn, uuid)?;
            println!("Discarded photo {}", uuid);
        }
        other => {
            return Err(AppError::Validation(format!(
                "Unknown kind {}. {}",
                other, usage
            )));
        }
    }
    Ok(())
}

fn run_cleanup() -> Result<(), AppError> {
    let (conn, app_config, settings) = open_configured()?;
    let store = photo_service::build_store(&app_config);

    let stats = cleanup_service::run_retention_cleanup(&conn, &store, settings.retention_days)?;
    println!(
        "Removed {} rows and {} orphan files (retention {} days)",
        stats.total_rows(),
        stats.orphan_files,
        settings.retention_days
    );
    Ok(())
}

fn run_export() -> Result<(), AppError> {
    let (conn, app_config, _) = open_configured()?;
    let store = photo_service::build_store(&app_config);

    let path = export_service::export_backup(&conn, &store, &filesystem::export_dir())?;
    println!("Backup written to {}", path.display());
    Ok(())
}

/// Prints the effective configuration as TOML
fn show_config() -> Result<(), AppError> {
    let app_config = config::load_or_default(&config::config_path())?;
    print!("{}", app_config.to_toml()?);
    Ok(())
}

fn run_login(phone: Option<&str>) -> Result<(), AppError> {
    let phone = phone.ok_or_else(|| {
        AppError::Validation("Usage: security-patrol login <phone-number>".to_string())
    })?;

    let (conn, _, settings) = open_configured()?;
    let auth = patrol_auth::PhoneAuthService::new(settings.server_url.clone())?;

    runtime()?.block_on(async {
        let start = auth.request_code(phone).await?;
        println!(
            "Verification code sent to {}, valid for {} seconds",
            phone, start.expires_in_seconds
        );
        print!("Code: ");
        std::io::stdout().flush()?;
        let mut code = String::new();
        std::io::stdin().read_line(&mut code)?;

        let session = auth
            .verify_code(phone, &start.verification_id, code.trim())
            .await?;
        auth_service::save_session(&conn, &session)?;
        println!("Signed in as {}", session.user_id);
        Ok(())
    })
}

fn run_logout() -> Result<(), AppError> {
    let conn = database::init_database()?;
    auth_service::clear_session(&conn)?;
    println!("Signed out, captured data stays on the device");
    Ok(())
}

fn set_enabled(enabled: bool) -> Result<(), AppError> {
    let (conn, _, _) = open_configured()?;
    sync_service::set_sync_enabled(&conn, enabled)?;
    println!("Sync {}", if enabled { "enabled" } else { "disabled" });
    Ok(())
}

fn print_usage() {
    println!("security-patrol {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Usage: security-patrol [COMMAND]");
    println!();
    println!("Commands:");
    println!("  daemon                            Run the background sync loop (default)");
    println!("  sync                              Run one sync cycle and exit");
    println!("  status                            Show session and pending upload counts");
    println!("  history                           List recent captures");
    println!("  checkpoints                       List cached patrol locations and checkpoints");
    println!("  clock-in <lat> <lon>              Capture the start of a shift");
    println!("  clock-out <lat> <lon>             Capture the end of a shift");
    println!("  track <lat> <lon> <acc> ...       Capture GPS track points");
    println!("  verify <checkpoint> <lat> <lon>   Capture a checkpoint verification");
    println!("  report <text> [<lat> <lon>]       Capture an incident report");
    println!("  photo <file> [<lat> <lon>]        Capture a photo from a JPEG or PNG file");
    println!("  amend-report <uuid> <text>        Rewrite a report that is still pending");
    println!("  amend-time <uuid> <lat> <lon>     Correct the position of a pending clock record");
    println!("  discard <kind> <uuid>             Delete a capture from the device");
    println!("  cleanup                           Remove synced data older than the retention window");
    println!("  export                            Write a zip backup into the export directory");
    println!("  config                            Print the effective configuration");
    println!("  login <phone>                     Sign in with a phone number");
    println!("  logout                            Drop the stored session");
    println!("  enable                            Turn background sync on");
    println!("  disable                           Turn background sync off");
}
