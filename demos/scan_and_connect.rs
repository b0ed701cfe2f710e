use ringlink::{
    BleRingSdk, HealthMetric, PermissionState, Result, RingConfig, RingRepository,
    RingViewModel, SdkRingRepository,
};
use std::{sync::Arc, time::Duration};
use tokio::time::sleep;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("💍 Ringlink Scan & Connect Example");

    let config = RingConfig {
        name_filter: std::env::args().nth(1),
        ..RingConfig::default()
    };

    let sdk = match BleRingSdk::new(&config).await {
        Ok(sdk) => Arc::new(sdk),
        Err(e) => {
            error!("❌ Bluetooth unavailable: {}", e);
            return Err(e);
        }
    };
    let repository: Arc<dyn RingRepository> =
        Arc::new(SdkRingRepository::new(sdk, config.clone()));
    let view_model = RingViewModel::new(repository, &config);

    // A desktop host has no runtime permission prompts
    view_model.update_permissions(PermissionState::all_granted());

    info!("🔍 Scanning for {}s...", config.default_scan_secs);
    view_model.start_scan(None).await;

    let state = view_model.state();
    if let Some(message) = state.error_message {
        error!("❌ Scan failed: {}", message);
        return Ok(());
    }

    for ring in &state.discovered_rings {
        info!(
            "  {} [{}] {} dBm ({})",
            ring.name,
            ring.mac_address,
            ring.rssi,
            ring.signal_quality()
        );
    }

    let Some(ring) = state
        .discovered_rings
        .iter()
        .max_by_key(|r| r.rssi)
        .cloned()
    else {
        warn!("No rings found");
        return Ok(());
    };

    info!("🔗 Connecting to {}...", ring.name);
    view_model.connect(&ring.mac_address, Some(&ring.name)).await;
    if let Some(message) = view_model.state().error_message {
        error!("❌ Failed to connect: {}", message);
        return Ok(());
    }
    info!("✅ {}", view_model.state().connection_status);

    match view_model.refresh_battery() {
        Some(level) => info!("🔋 Battery: {}%", level),
        None => info!("🔋 Battery: not available"),
    }

    view_model.start_measurement(HealthMetric::HeartRate).await;
    for _ in 0..10 {
        sleep(Duration::from_secs(1)).await;
        let health = view_model.state().health_data;
        info!("❤️  Heart rate: {} bpm", health.heart_rate);
    }
    view_model.stop_measurement(HealthMetric::HeartRate).await;

    view_model.disconnect().await;
    info!("👋 {}", view_model.state().connection_status);

    Ok(())
}
