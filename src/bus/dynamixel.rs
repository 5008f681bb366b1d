// Dynamixel Protocol 1.0 implementation (AX-12 class actuators)
//
// Packet format: [0xFF, 0xFF, ID, Length, Instruction, Params..., Checksum]
//
// Supports the buffered write mode the gait loop depends on: between
// `begin_batch` and `end_batch` every write is sent as REG_WRITE, which the
// servo queues instead of executing; `commit` broadcasts ACTION so all
// queued writes take effect on the same control tick.

use serialport::{self, SerialPort};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

use super::{BusError, Result, ServoBus};

/// Default serial configuration for the servo bus
pub const DEFAULT_BAUDRATE: u32 = 1_000_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Broadcast ID: every servo on the bus acts, none responds
const BROADCAST_ID: u8 = 0xFE;

/// Packet header bytes
const HEADER: [u8; 2] = [0xFF, 0xFF];

/// Goal position range: 0..=1023 ticks over 300 degrees, centred at 150
const POSITION_TICKS: f64 = 1023.0;
const POSITION_RANGE_DEG: f64 = 300.0;

/// Instruction set
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Instruction {
    Ping = 0x01,
    Read = 0x02,
    Write = 0x03,
    RegWrite = 0x04,
    Action = 0x05,
}

/// Register addresses for the AX-12 control table
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Register {
    // EEPROM area (persists across power cycles)
    ModelNumber = 0, // 2 bytes, read-only
    Id = 3,          // 1 byte
    BaudRate = 4,    // 1 byte
    StatusReturnLevel = 16, // 1 byte: 0=never, 1=reads only, 2=all

    // RAM area (volatile)
    TorqueEnable = 24,   // 1 byte: 0=off, 1=on
    Led = 25,            // 1 byte: 0=off, 1=on
    GoalPosition = 30,   // 2 bytes
    MovingSpeed = 32,    // 2 bytes
    PresentPosition = 36, // 2 bytes, read-only
    PresentVoltage = 42, // 1 byte, read-only, decivolts
}

/// Convert a joint angle in degrees (-150..=150, 0 = servo centre) to a raw
/// goal position, clamped to the mechanical range.
pub fn degrees_to_position(degrees: f64) -> u16 {
    let ticks = (degrees + POSITION_RANGE_DEG / 2.0) * (POSITION_TICKS / POSITION_RANGE_DEG);
    ticks.round().clamp(0.0, POSITION_TICKS) as u16
}

/// Servo bus - handles serial communication with the actuators
pub struct DynamixelBus {
    port: Box<dyn SerialPort>,
    buffered: bool,
    // The status return level last written to the bus. At level 2 every
    // write instruction is answered with a status packet which must be
    // drained; at 1 only reads are answered.
    status_level: u8,
}

impl DynamixelBus {
    /// Open a new connection to the servo bus
    pub fn open(port_name: &str) -> Result<Self> {
        Self::open_with_baudrate(port_name, DEFAULT_BAUDRATE)
    }

    /// Open with custom baudrate
    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self {
            port,
            buffered: false,
            status_level: 2,
        })
    }

    /// Calculate checksum for a packet (excluding header)
    fn checksum(data: &[u8]) -> u8 {
        let sum: u16 = data.iter().map(|&b| b as u16).sum();
        (!sum & 0xFF) as u8
    }

    /// Build a packet with header and checksum
    fn build_packet(id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
        let length = (params.len() + 2) as u8; // params + instruction + checksum
        let mut packet = Vec::with_capacity(6 + params.len());

        packet.extend_from_slice(&HEADER);
        packet.push(id);
        packet.push(length);
        packet.push(instruction as u8);
        packet.extend_from_slice(params);

        // Checksum over id, length, instruction, params
        let checksum_data = &packet[2..]; // skip header
        packet.push(Self::checksum(checksum_data));

        packet
    }

    fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        self.port.write_all(packet)?;
        self.port.flush()?;
        Ok(())
    }

    /// Read a status packet
    fn read_response(&mut self, expected_id: u8) -> Result<Vec<u8>> {
        let mut header = [0u8; 2];
        self.port.read_exact(&mut header).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                BusError::Timeout { id: expected_id }
            } else {
                BusError::Io(e)
            }
        })?;

        if header != HEADER {
            return Err(BusError::InvalidResponse {
                id: expected_id,
                reason: format!("Invalid header: {:02X?}", header),
            });
        }

        let mut id_length = [0u8; 2];
        self.port.read_exact(&mut id_length)?;
        let id = id_length[0];
        let length = id_length[1] as usize;

        if id != expected_id {
            return Err(BusError::InvalidResponse {
                id: expected_id,
                reason: format!("ID mismatch: expected {}, got {}", expected_id, id),
            });
        }

        // Read remaining bytes (error + params + checksum = length bytes)
        let mut remaining = vec![0u8; length];
        self.port.read_exact(&mut remaining)?;

        // Verify checksum
        let mut checksum_data = vec![id, length as u8];
        checksum_data.extend_from_slice(&remaining[..remaining.len() - 1]);
        let expected_checksum = Self::checksum(&checksum_data);
        let received_checksum = remaining[remaining.len() - 1];

        if expected_checksum != received_checksum {
            return Err(BusError::ChecksumMismatch { id });
        }

        // Check error status
        let error_status = remaining[0];
        if error_status != 0 {
            return Err(BusError::ServoError {
                id,
                status: error_status,
            });
        }

        // Return parameters (excluding error byte and checksum)
        Ok(remaining[1..remaining.len() - 1].to_vec())
    }

    /// Ping a servo to check if it's connected
    pub fn ping(&mut self, id: u8) -> Result<bool> {
        let packet = Self::build_packet(id, Instruction::Ping, &[]);
        self.send_packet(&packet)?;

        match self.read_response(id) {
            Ok(_) => Ok(true),
            Err(BusError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Issue a write, buffered as REG_WRITE while a batch is open. Drains
    /// the status packet when the servos are configured to send one.
    fn write_params(&mut self, id: u8, params: &[u8]) -> Result<()> {
        let instruction = if self.buffered {
            Instruction::RegWrite
        } else {
            Instruction::Write
        };
        let packet = Self::build_packet(id, instruction, params);
        self.send_packet(&packet)?;

        if self.status_level == 2 {
            let _ = self.read_response(id)?;
        }
        Ok(())
    }

    /// Write a single byte to a register
    pub fn write_u8(&mut self, id: u8, register: Register, value: u8) -> Result<()> {
        debug!("Write u8 to servo {}: reg={:?}, value={}", id, register, value);
        self.write_params(id, &[register as u8, value])
    }

    /// Write two bytes (little-endian) to a register
    pub fn write_u16(&mut self, id: u8, register: Register, value: u16) -> Result<()> {
        debug!(
            "Write u16 to servo {}: reg={:?}, value={}",
            id, register, value
        );
        self.write_params(
            id,
            &[register as u8, (value & 0xFF) as u8, (value >> 8) as u8],
        )
    }

    /// Read a single byte from a register
    pub fn read_u8(&mut self, id: u8, register: Register) -> Result<u8> {
        let params = [register as u8, 1]; // address, length
        let packet = Self::build_packet(id, Instruction::Read, &params);
        self.send_packet(&packet)?;

        let response = self.read_response(id)?;
        if response.is_empty() {
            return Err(BusError::InvalidResponse {
                id,
                reason: "Empty response".to_string(),
            });
        }
        Ok(response[0])
    }

    /// Read two bytes (little-endian) from a register
    pub fn read_u16(&mut self, id: u8, register: Register) -> Result<u16> {
        let params = [register as u8, 2]; // address, length
        let packet = Self::build_packet(id, Instruction::Read, &params);
        self.send_packet(&packet)?;

        let response = self.read_response(id)?;
        if response.len() < 2 {
            return Err(BusError::InvalidResponse {
                id,
                reason: format!("Expected 2 bytes, got {}", response.len()),
            });
        }
        Ok(u16::from_le_bytes([response[0], response[1]]))
    }
}

impl ServoBus for DynamixelBus {
    fn move_to(&mut self, id: u8, degrees: f64) -> Result<()> {
        self.write_u16(id, Register::GoalPosition, degrees_to_position(degrees))
    }

    fn set_torque_enabled(&mut self, id: u8, enabled: bool) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, enabled as u8)
    }

    fn set_moving_speed(&mut self, id: u8, speed: u16) -> Result<()> {
        self.write_u16(id, Register::MovingSpeed, speed)
    }

    fn set_led(&mut self, id: u8, on: bool) -> Result<()> {
        self.write_u8(id, Register::Led, on as u8)
    }

    fn set_status_report_level(&mut self, id: u8, level: u8) -> Result<()> {
        self.write_u8(id, Register::StatusReturnLevel, level)?;
        self.status_level = level;
        Ok(())
    }

    fn read_voltage(&mut self, id: u8) -> Result<f64> {
        let decivolts = self.read_u8(id, Register::PresentVoltage)?;
        Ok(decivolts as f64 / 10.0)
    }

    fn begin_batch(&mut self) -> Result<()> {
        self.buffered = true;
        Ok(())
    }

    fn end_batch(&mut self) -> Result<()> {
        self.buffered = false;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let packet = Self::build_packet(BROADCAST_ID, Instruction::Action, &[]);
        debug!("Committing queued servo writes");
        self.send_packet(&packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum() {
        // Example: ID=1, Length=4, Instruction=WRITE, Addr=30, Data=0, 2
        let data = [1u8, 4, 0x03, 30, 0, 2];
        let checksum = DynamixelBus::checksum(&data);
        // ~(1+4+3+30+0+2) = ~40 = 215
        assert_eq!(checksum, 215);
    }

    #[test]
    fn test_build_packet() {
        let packet = DynamixelBus::build_packet(1, Instruction::Ping, &[]);
        // Header (2) + ID (1) + Length (1) + Instruction (1) + Checksum (1) = 6 bytes
        assert_eq!(packet.len(), 6);
        assert_eq!(packet[0], 0xFF);
        assert_eq!(packet[1], 0xFF);
        assert_eq!(packet[2], 1); // ID
        assert_eq!(packet[3], 2); // Length (instruction + checksum)
        assert_eq!(packet[4], 0x01); // PING instruction
    }

    #[test]
    fn test_reg_write_packet_shape() {
        let packet = DynamixelBus::build_packet(
            11,
            Instruction::RegWrite,
            &[Register::GoalPosition as u8, 0x00, 0x02],
        );
        assert_eq!(packet[2], 11);
        assert_eq!(packet[4], 0x04); // REG_WRITE instruction
        assert_eq!(packet[5], 30); // goal position register
    }

    #[test]
    fn test_degrees_to_position() {
        assert_eq!(degrees_to_position(0.0), 512);
        assert_eq!(degrees_to_position(-150.0), 0);
        assert_eq!(degrees_to_position(150.0), 1023);
        // Out-of-range angles clamp to the mechanical stops
        assert_eq!(degrees_to_position(200.0), 1023);
        assert_eq!(degrees_to_position(-200.0), 0);
        // 90 degrees is ~307 ticks past centre
        assert_eq!(degrees_to_position(90.0), 818);
    }
}
