// Servo diagnostic: READ-ONLY check that all 24 leg actuators respond.
//
// This tool does not write anything to the servos - it's completely safe.
// Run it before the first walk on a freshly wired chassis.
//
// Usage: cargo run --example servo_diag -- [port]

use hexapod_zenoh_runtime::bus::dynamixel::DynamixelBus;
use hexapod_zenoh_runtime::bus::ServoBus;
use std::io::{self, Write};

const LEG_NAMES: [&str; 6] = ["FL", "FR", "MR", "BR", "BL", "ML"];
const LEG_BASE_IDS: [u8; 6] = [10, 20, 30, 40, 50, 60];
const JOINT_NAMES: [&str; 4] = ["coxa", "femur", "tibia", "tarsus"];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().unwrap()),
        )
        .init();

    let port = std::env::args()
        .nth(1)
        .unwrap_or_else(|| hexapod_zenoh_runtime::config::DEFAULT_PORT.to_string());

    println!("Hexapod servo diagnostic (read-only)");
    println!("Serial port: {}", port);
    println!();

    println!("Step 1: Opening serial port...");
    let mut bus = match DynamixelBus::open(&port) {
        Ok(bus) => {
            println!("  ok: serial port opened");
            bus
        }
        Err(e) => {
            println!("  FAILED to open serial port: {}", e);
            println!("  Check the device path and that the USB adapter is connected.");
            return Err(e.into());
        }
    };
    println!();

    println!("Step 2: Pinging all 24 servos...");
    let mut all_found = true;
    for (leg, &base_id) in LEG_NAMES.iter().zip(LEG_BASE_IDS.iter()) {
        for (joint_index, joint) in JOINT_NAMES.iter().enumerate() {
            let id = base_id + joint_index as u8 + 1;
            print!("  {} {} (ID {}): ", leg, joint, id);
            io::stdout().flush()?;

            match bus.ping(id) {
                Ok(true) => println!("RESPONDING"),
                Ok(false) => {
                    println!("NO RESPONSE");
                    all_found = false;
                }
                Err(e) => {
                    println!("ERROR: {}", e);
                    all_found = false;
                }
            }
        }
    }
    println!();

    println!("Step 3: Reading battery voltage...");
    match bus.read_voltage(LEG_BASE_IDS[0] + 1) {
        Ok(v) => println!("  {:.2}v (cutoff is 9.6v)", v),
        Err(e) => println!("  FAILED: {}", e),
    }
    println!();

    if all_found {
        println!("All servos responding. You can start the runtime with: cargo run -- run");
    } else {
        println!("Some servos did not respond; check wiring and ID assignments.");
    }

    Ok(())
}
