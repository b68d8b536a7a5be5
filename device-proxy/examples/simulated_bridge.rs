//! Drive the device proxy manager against simulated devices
//!
//! Run with: cargo run -p device-proxy --example simulated_bridge
//!
//! Set DEVICE_PROXY_LOG_MODE=development (or debug) to see the manager's logs.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use device_proxy::prelude::*;
use device_proxy::{init_logging_from_env, to_json_lossy};
use device_transport::memory::{InMemoryTransport, SimulatedDevice};
use serde_json::json;

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    init_logging_from_env()?;

    println!("Device Proxy - Simulated Bridge");
    println!("===============================\n");

    let transport = Arc::new(InMemoryTransport::new());
    let thermometer = transport.add_device(
        SimulatedDevice::new("lab/thermo/1")
            .with_attribute("temp", 20.0)
            .with_attribute("State", DevState::On)
            .with_command("Calibrate", |offset| {
                let offset = offset.and_then(|v| v.as_f64()).unwrap_or(0.0);
                Ok(AttrValue::String(format!("calibrated by {:+.1}", offset)))
            }),
    );
    transport.add_device(SimulatedDevice::new("lab/valve/1").with_attribute("position", 0i64));

    let manager = Arc::new(DeviceProxyManager::with_config(
        Arc::clone(&transport) as Arc<dyn Transport>,
        ProxyConfig::interactive(),
    )?);

    // Remote reads and commands
    let info = manager.get_device_info("lab/thermo/1")?;
    println!("📟 {} served by {} at {}", info.dev_class, info.server_id, info.address);
    println!("   State: {}", manager.read_attribute("lab/thermo/1", "State")?);
    let result = manager.run_command_json("lab/thermo/1", "Calibrate", Some(&json!(0.5)))?;
    println!("   Calibrate -> {}", result);

    // Subscribe and wait for a change pushed from another thread
    manager.subscribe("lab/thermo/1", "temp")?;
    let pusher = thread::spawn(move || {
        for value in [21.5, 22.0, 22.4] {
            thread::sleep(Duration::from_millis(50));
            thermometer.push_value("temp", value);
        }
    });

    for _ in 0..3 {
        manager.wait_for_next_event("lab/thermo/1", "temp", Duration::from_secs(1))?;
        println!(
            "🌡️  temp changed: {}",
            manager.get_latest_event_json("lab/thermo/1", "temp")
        );
    }
    pusher.join().map_err(|_| "event thread panicked")?;

    println!("\n📜 Event log:");
    for record in manager.get_event_log() {
        println!(
            "   {} {}/{} = {}",
            record.timestamp.format("%H:%M:%S%.3f"),
            record.device,
            record.attribute,
            to_json_lossy(&record.value)
        );
    }

    // Ping every known device, including one that does not exist
    println!("\n📡 Ping:");
    for (device, result) in manager.ping_many(["lab/thermo/1", "lab/valve/1", "lab/pump/9"]) {
        match result {
            Ok(rtt) => println!("   {} answered in {:?}", device, rtt),
            Err(err) => println!("   {} failed: {}", device, err),
        }
    }

    let report = manager.reset();
    println!(
        "\n🧹 Reset: {} device(s), {} subscription(s) released, clean = {}",
        report.devices,
        report.subscriptions_released,
        report.is_clean()
    );

    Ok(())
}
