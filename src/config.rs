// Loop rate, topics, timeouts, safety constants
use std::time::Duration;

// Control loop frequency. All gait timing below is counted in these ticks.
pub const LOOP_HZ: u64 = 100;

// Input staleness timeout for the watchdog. Past this age the controller
// sees a neutral pad, so it keeps standing but stops walking.
pub const PAD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_PAD: &str = "hexapod/cmd/pad"; // gamepad samples
pub const TOPIC_RT_STATE: &str = "hexapod/rt/state"; // gait state + health

// Serial port for the Dynamixel servo bus
pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";

// Ticks between voltage telemetry samples (5s). Running a LiPo at low
// voltage for long damages it, so this has to fire regularly.
pub const VOLTAGE_CHECK_TICKS: u32 = 500;

// The voltage at which the hexapod forcibly shuts down.
pub const MINIMUM_VOLTAGE: f64 = 9.6;

// Ticks between leg activations during startup (0.25s). Legs start one at
// a time to keep the inrush current from browning out the supply.
pub const INIT_INTERVAL_TICKS: u32 = 25;

// How many legs move together in one stepping group. 1, 2 (opposite
// pairs) or 3 (tripod); anything else is rejected at startup.
pub const LEG_SET_SIZE: usize = 2;
