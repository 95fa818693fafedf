//! Per-installation device identity.
//!
//! The device - not the user, not the tab - is the unit of causality in
//! the vector clocks, so the id must be minted once and reused for the
//! lifetime of the installation.

use crate::db::Pool;
use crate::error::Result;
use reel_engine::DeviceId;
use sqlx::Row;

/// Load the persisted device id, minting and storing one on first run.
pub async fn load_or_create_device_id(pool: &Pool) -> Result<DeviceId> {
    if let Some(row) = sqlx::query(r#"SELECT device_id FROM device_profile WHERE id = 1"#)
        .fetch_optional(pool)
        .await?
    {
        let device_id: String = row.try_get("device_id")?;
        return Ok(device_id);
    }

    let device_id = uuid::Uuid::new_v4().to_string();
    sqlx::query(r#"INSERT INTO device_profile (id, device_id) VALUES (1, ?1)"#)
        .bind(&device_id)
        .execute(pool)
        .await?;

    tracing::info!(device_id = %device_id, "minted device identity");

    Ok(device_id)
}
