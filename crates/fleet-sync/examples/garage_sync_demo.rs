//! 车库同步演示
//!
//! 两台"设备"共享一个进程内远端：设备 A 离线新增车辆后登录推送，
//! 设备 B 登录后通过订阅收到该车辆；随后演示部分失败与同步错误。

use std::sync::Arc;

use fleet_sync::{
    document_id, CollectionPath, FleetSync, FleetSyncConfig, MemoryCollection, MemoryRemoteStore,
    RemoteError, SyncEvent, Vehicle,
};
use tokio::time::{sleep, Duration};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("========================================");
    println!("Fleet Sync 演示");
    println!("========================================\n");

    let remote = MemoryRemoteStore::new();
    let config = FleetSyncConfig::builder().debug_mode(true).build();

    let device_a = FleetSync::with_collection(
        config.clone(),
        MemoryCollection::new(),
        Arc::new(remote.clone()),
    )?;
    let device_b =
        FleetSync::with_collection(config, MemoryCollection::new(), Arc::new(remote.clone()))?;

    // === 1. 离线新增 ===
    let mut tesla = Vehicle::new("Tesla", "Model 3", 2021);
    tesla.trim = "Long Range".to_string();
    tesla.color = "Pearl White".to_string();
    device_a.add_vehicle(tesla.clone()).await?;
    println!("设备 A 离线新增: {}", tesla.display_name());

    // === 2. 登录并推送 ===
    let report = device_a.sign_in("driver-1").await?;
    println!("设备 A 登录，推送 {} 条", report.uploaded);

    // === 3. 设备 B 通过订阅收到 ===
    let mut events = device_b.subscribe_events();
    device_b.sign_in("driver-1").await?;
    sleep(Duration::from_millis(100)).await;
    while let Ok(event) = events.try_recv() {
        if let SyncEvent::BatchApplied(report) = event {
            println!(
                "设备 B 应用批次: inserted={} updated={} removed={}",
                report.inserted, report.updated, report.removed
            );
        }
    }
    for v in device_b.vehicles().await? {
        println!("设备 B 本地车辆: {} ({})", v.display_name(), v.subtitle());
    }

    // === 4. 部分失败 ===
    let bmw = Vehicle::new("BMW", "M4", 2022);
    remote.fail_writes_for(
        &document_id(bmw.id),
        RemoteError::PermissionDenied("write rule rejected".into()),
    );
    if let Err(e) = device_a.add_vehicle(bmw).await {
        println!("上传失败（本地保留）: {}", e);
    }
    if let Err(e) = device_a.sync_all().await {
        println!("全量推送: {}", e);
    }
    remote.clear_write_failures();

    // === 5. 粘性同步错误 ===
    let path = CollectionPath::for_identity("driver-1")?;
    remote.push_error(&path, RemoteError::Network("connection reset".into()));
    sleep(Duration::from_millis(50)).await;
    if let Some(err) = device_b.last_sync_error() {
        println!("设备 B 同步错误: {}", err);
    }
    device_a.sync_all().await?;
    sleep(Duration::from_millis(50)).await;
    println!(
        "设备 B 同步错误已清除: {}",
        device_b.last_sync_error().is_none()
    );

    device_a.shutdown().await;
    device_b.shutdown().await;
    println!("\n演示结束");
    Ok(())
}
