// Message types carried over zenoh

use serde::{Deserialize, Serialize};

/// One normalized gamepad sample, published by a teleop process and polled
/// by the controller once per tick. Stick axes are -127..=127; the lift
/// trigger is an analog 0..=255. `Default` is the neutral pad, which the
/// watchdog substitutes when samples go stale.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct GamepadState {
    pub left_x: i8,
    pub left_y: i8,
    pub right_x: i8,
    pub dpad_up: bool,
    pub dpad_down: bool,
    pub start: bool,
    pub select: bool,
    /// Brace mode: the body may lean but feet never step.
    pub brace: bool,
    /// Extra foot lift while stepping, for clearing obstacles.
    pub lift_trigger: u8,
}

/// Input-side health, from the staleness watchdog.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PadHealth {
    Ok,
    Stale,
}

/// Status published by the runtime each tick: current gait state and
/// whether the pad feed is live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerReport {
    pub state: String,
    pub pad: PadHealth,
}
