//! Startup recovery of partial builds.
//!
//! A build row without an end time that started before today belongs to a
//! process that died mid-build. Builds started today are left alone: they
//! may still be running in another process on the same machine.

use chrono::{DateTime, Duration, NaiveTime, TimeZone};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::Result;

/// Midnight at the start of `now`'s calendar day, in `now`'s time zone.
///
/// When midnight does not exist locally (a DST gap), the first existing
/// instant of the day is used.
pub fn start_of_day<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Tz> {
    let midnight = now.date_naive().and_time(NaiveTime::MIN);
    let timezone = now.timezone();
    (0..=24)
        .map(|minutes| midnight + Duration::minutes(minutes * 5))
        .find_map(|local| timezone.from_local_datetime(&local).earliest())
        .unwrap_or_else(|| now.clone())
}

/// Delete every unfinished build that started before `cutoff`, children
/// first. Returns the number of builds removed.
pub async fn delete_partial_builds<Tz: TimeZone>(
    conn: &mut SqliteConnection,
    cutoff: &DateTime<Tz>,
) -> Result<u64> {
    let build_ids: Vec<i64> =
        sqlx::query_scalar("SELECT id FROM build WHERE end_time IS NULL AND start_time < ?")
            .bind(cutoff.timestamp_millis())
            .fetch_all(&mut *conn)
            .await?;

    for build_id in &build_ids {
        delete_build_data(conn, *build_id).await?;
    }

    debug!(removed = build_ids.len(), "deleted partial builds");
    Ok(build_ids.len() as u64)
}

async fn delete_build_data(conn: &mut SqliteConnection, build_id: i64) -> Result<()> {
    let machine_info_id =
        sqlx::query_scalar::<_, Option<i64>>("SELECT machine_info_id FROM build WHERE id = ?")
            .bind(build_id)
            .fetch_optional(&mut *conn)
            .await?
            .flatten();

    sqlx::query("DELETE FROM plugin_execution WHERE build_id = ?")
        .bind(build_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM build WHERE id = ?")
        .bind(build_id)
        .execute(&mut *conn)
        .await?;

    if let Some(machine_info_id) = machine_info_id {
        sqlx::query("DELETE FROM machine_info WHERE id = ?")
            .bind(machine_info_id)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}
