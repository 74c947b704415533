use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use rollcalld::dbus_interface::AttendanceInterface;
use rollcalld::{AttendanceService, Config};

const BUS_NAME: &str = "org.rollcall.Attendance1";
const OBJECT_PATH: &str = "/org/rollcall/Attendance1";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");

    let config = Config::from_env();
    tracing::info!(
        db = %config.db_path.display(),
        gallery = %config.gallery_dir.display(),
        verifier = %config.verifier_cmd,
        "configuration loaded"
    );

    let service = Arc::new(AttendanceService::from_config(&config).await?);

    let _connection = zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, AttendanceInterface::new(service))?
        .build()
        .await?;

    tracing::info!(bus = BUS_NAME, "rollcalld ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");

    Ok(())
}
