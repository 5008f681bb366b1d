// Actuator bus for the hexapod's 24 servos
//
// Provides:
// - `ServoBus`: the operations the locomotion core needs from the bus
// - `DynamixelBus`: the serial Protocol 1.0 implementation
// - `Servo`: a lightweight per-joint handle (bus ID only; the controller
//   owns the single bus connection)

pub mod dynamixel;

pub use dynamixel::{DynamixelBus, degrees_to_position};

/// Error types for servo bus communication
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response from servo {id}: {reason}")]
    InvalidResponse { id: u8, reason: String },

    #[error("Checksum mismatch for servo {id}")]
    ChecksumMismatch { id: u8 },

    #[error("Servo {id} returned error status: 0x{status:02X}")]
    ServoError { id: u8, status: u8 },

    #[error("Timeout waiting for response from servo {id}")]
    Timeout { id: u8 },
}

pub type Result<T> = std::result::Result<T, BusError>;

/// The actuator-bus operations consumed by the locomotion core. All writes
/// issued between `begin_batch` and `end_batch` queue on the servos and
/// take effect together on `commit`.
pub trait ServoBus {
    fn move_to(&mut self, id: u8, degrees: f64) -> Result<()>;
    fn set_torque_enabled(&mut self, id: u8, enabled: bool) -> Result<()>;
    fn set_moving_speed(&mut self, id: u8, speed: u16) -> Result<()>;
    fn set_led(&mut self, id: u8, on: bool) -> Result<()>;
    fn set_status_report_level(&mut self, id: u8, level: u8) -> Result<()>;
    fn read_voltage(&mut self, id: u8) -> Result<f64>;
    fn begin_batch(&mut self) -> Result<()>;
    fn end_batch(&mut self) -> Result<()>;
    fn commit(&mut self) -> Result<()>;

    /// Run `f` with the bus in batch mode, then commit, so every queued
    /// move lands on the same tick.
    fn run_batched<F>(&mut self, f: F) -> Result<()>
    where
        Self: Sized,
        F: FnOnce(&mut Self) -> Result<()>,
    {
        self.begin_batch()?;
        let result = f(self);
        self.end_batch()?;
        result?;
        self.commit()
    }
}

/// Handle to a single joint actuator. Holds only the bus ID; every call
/// borrows the controller-owned bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Servo {
    id: u8,
}

impl Servo {
    pub fn new(id: u8) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn move_to<B: ServoBus>(&self, bus: &mut B, degrees: f64) -> Result<()> {
        bus.move_to(self.id, degrees)
    }

    pub fn set_torque_enabled<B: ServoBus>(&self, bus: &mut B, enabled: bool) -> Result<()> {
        bus.set_torque_enabled(self.id, enabled)
    }

    pub fn set_moving_speed<B: ServoBus>(&self, bus: &mut B, speed: u16) -> Result<()> {
        bus.set_moving_speed(self.id, speed)
    }

    pub fn set_led<B: ServoBus>(&self, bus: &mut B, on: bool) -> Result<()> {
        bus.set_led(self.id, on)
    }

    pub fn set_status_report_level<B: ServoBus>(&self, bus: &mut B, level: u8) -> Result<()> {
        bus.set_status_report_level(self.id, level)
    }

    pub fn read_voltage<B: ServoBus>(&self, bus: &mut B) -> Result<f64> {
        bus.read_voltage(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{MockBus, Op};
    use super::{BusError, ServoBus};

    #[test]
    fn run_batched_queues_then_commits() {
        let mut bus = MockBus::new();
        bus.run_batched(|bus| {
            bus.move_to(11, 10.0)?;
            bus.move_to(12, -20.0)
        })
        .unwrap();

        assert_eq!(bus.ops[0], Op::BeginBatch);
        assert!(matches!(bus.ops[1], Op::Move { batched: true, .. }));
        assert!(matches!(bus.ops[2], Op::Move { batched: true, .. }));
        assert_eq!(bus.ops[3], Op::EndBatch);
        assert_eq!(bus.ops[4], Op::Commit);
    }

    #[test]
    fn run_batched_skips_commit_on_error() {
        let mut bus = MockBus::new();
        let result = bus.run_batched(|bus| {
            bus.move_to(11, 10.0)?;
            Err(BusError::Timeout { id: 12 })
        });

        assert!(result.is_err());
        // The batch is still closed, but nothing is committed.
        assert_eq!(*bus.ops.last().unwrap(), Op::EndBatch);
        assert!(!bus.ops.contains(&Op::Commit));
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::{BusError, Result, ServoBus};
    use std::collections::HashMap;

    /// A recorded bus operation, tagged with whether it was issued inside
    /// an open batch.
    #[derive(Debug, Clone, PartialEq)]
    pub enum Op {
        Move { id: u8, degrees: f64, batched: bool },
        Torque { id: u8, enabled: bool },
        Speed { id: u8, speed: u16 },
        Led { id: u8, on: bool },
        StatusLevel { id: u8, level: u8 },
        BeginBatch,
        EndBatch,
        Commit,
    }

    /// Records every operation so tests can assert on dispatch ordering,
    /// batch atomicity and final torque state.
    #[derive(Debug)]
    pub struct MockBus {
        pub ops: Vec<Op>,
        pub voltage: f64,
        pub fail_voltage_read: bool,
        pub torque: HashMap<u8, bool>,
        batched: bool,
    }

    impl MockBus {
        pub fn new() -> Self {
            Self {
                ops: Vec::new(),
                voltage: 11.8,
                fail_voltage_read: false,
                torque: HashMap::new(),
                batched: false,
            }
        }

        pub fn moves(&self) -> Vec<(u8, f64)> {
            self.ops
                .iter()
                .filter_map(|op| match op {
                    Op::Move { id, degrees, .. } => Some((*id, *degrees)),
                    _ => None,
                })
                .collect()
        }
    }

    impl ServoBus for MockBus {
        fn move_to(&mut self, id: u8, degrees: f64) -> Result<()> {
            self.ops.push(Op::Move {
                id,
                degrees,
                batched: self.batched,
            });
            Ok(())
        }

        fn set_torque_enabled(&mut self, id: u8, enabled: bool) -> Result<()> {
            self.torque.insert(id, enabled);
            self.ops.push(Op::Torque { id, enabled });
            Ok(())
        }

        fn set_moving_speed(&mut self, id: u8, speed: u16) -> Result<()> {
            self.ops.push(Op::Speed { id, speed });
            Ok(())
        }

        fn set_led(&mut self, id: u8, on: bool) -> Result<()> {
            self.ops.push(Op::Led { id, on });
            Ok(())
        }

        fn set_status_report_level(&mut self, id: u8, level: u8) -> Result<()> {
            self.ops.push(Op::StatusLevel { id, level });
            Ok(())
        }

        fn read_voltage(&mut self, id: u8) -> Result<f64> {
            if self.fail_voltage_read {
                return Err(BusError::Timeout { id });
            }
            Ok(self.voltage)
        }

        fn begin_batch(&mut self) -> Result<()> {
            self.batched = true;
            self.ops.push(Op::BeginBatch);
            Ok(())
        }

        fn end_batch(&mut self) -> Result<()> {
            self.batched = false;
            self.ops.push(Op::EndBatch);
            Ok(())
        }

        fn commit(&mut self) -> Result<()> {
            self.ops.push(Op::Commit);
            Ok(())
        }
    }
}
