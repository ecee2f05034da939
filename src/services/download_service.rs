use crate::error::AppError;
use crate::services::checkpoint_service;
use patrol_api::PatrolApi;
use rusqlite::Connection;

/// Refreshes the cached reference data (patrol locations and checkpoints)
/// from the backend. Returns the number of cached entries.
///
/// The cache is what checkpoint verification validates against while
/// offline, so the sync engine calls this at the end of a cycle but
/// treats failures as non-fatal.
pub async fn refresh_reference_data<A>(
    conn: &Connection,
    api: &A,
    token: &str,
) -> Result<usize, AppError>
where
    A: PatrolApi + ?Sized,
{
    let locations = api.fetch_patrol_locations(token).await?;
    let checkpoints = api.fetch_checkpoints(token).await?;

    let stored_locations = checkpoint_service::replace_patrol_locations(conn, &locations)?;
    let stored_checkpoints = checkpoint_service::replace_checkpoints(conn, &checkpoints)?;

    log::info!(
        "Reference data refreshed: {} locations, {} checkpoints",
        stored_locations,
        stored_checkpoints
    );

    Ok(stored_locations + stored_checkpoints)
}
