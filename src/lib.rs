// Hexapod walking-robot runtime
//
// Provides:
// - Homogeneous-transform math (world / body / leg frames)
// - Analytic leg inverse kinematics
// - Gait state machine driving six legs over a Dynamixel servo bus
// - Zenoh-fed gamepad input with a staleness watchdog

pub mod bus;
pub mod config;
pub mod gait;
pub mod legs;
pub mod math3d;
pub mod messages;
pub mod runtime;

pub use bus::{BusError, DynamixelBus, ServoBus};
pub use gait::{GaitState, Hexapod, TickOutcome};
pub use legs::Leg;
pub use math3d::{Axis, Matrix44, Rotation, Vector3};
pub use messages::GamepadState;
