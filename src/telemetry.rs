//! Payload interpretations for the two commands the console understands.
//!
//! - `0x0305` robot positions: six little-endian `(x: u16, y: u16)` pairs in
//!   slot order R1, R2, R3, R4, R5, R7 (24 bytes minimum, in centimetres).
//! - `0x020C` vulnerability flags: one byte, bit *n* marks a robot.
//!
//! Anything else is passed through as [`TelemetryRecord::Raw`].
use log::debug;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::protocol::{CommandId, ParsedFrame};

/// Minimum payload length for a coordinate set.
pub const COORDINATE_PAYLOAD_LEN: usize = 24;
pub const DEFAULT_X_MAX: u16 = 2800;
pub const DEFAULT_Y_MAX: u16 = 1500;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("robot {0} has no vulnerability bit")]
    NoVulnerabilityBit(Robot),

    #[error("unknown robot '{0}' (expected one of R1, R2, R3, R4, R5, R7)")]
    UnknownRobot(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Robot {
    R1,
    R2,
    R3,
    R4,
    R5,
    R7,
}

impl Robot {
    /// Slot order inside a coordinate payload.
    pub const ALL: [Robot; 6] = [Robot::R1, Robot::R2, Robot::R3, Robot::R4, Robot::R5, Robot::R7];

    pub fn name(self) -> &'static str {
        match self {
            Robot::R1 => "R1",
            Robot::R2 => "R2",
            Robot::R3 => "R3",
            Robot::R4 => "R4",
            Robot::R5 => "R5",
            Robot::R7 => "R7",
        }
    }

    /// Role as the operators know it.
    pub fn role(self) -> &'static str {
        match self {
            Robot::R1 => "hero",
            Robot::R2 => "engineer",
            Robot::R3 | Robot::R4 | Robot::R5 => "infantry",
            Robot::R7 => "sentry",
        }
    }

    /// Bit index in the vulnerability mask. R5 is not flaggable.
    pub fn vulnerability_bit(self) -> Option<u8> {
        match self {
            Robot::R1 => Some(0),
            Robot::R2 => Some(1),
            Robot::R3 => Some(2),
            Robot::R4 => Some(3),
            Robot::R5 => None,
            Robot::R7 => Some(4),
        }
    }
}

impl fmt::Display for Robot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Robot {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        let digits = t.strip_prefix(&['R', 'r'][..]).unwrap_or(t);
        match digits {
            "1" => Ok(Robot::R1),
            "2" => Ok(Robot::R2),
            "3" => Ok(Robot::R3),
            "4" => Ok(Robot::R4),
            "5" => Ok(Robot::R5),
            "7" => Ok(Robot::R7),
            _ => Err(TelemetryError::UnknownRobot(s.to_string())),
        }
    }
}

/// Display range for decoded coordinates. Values outside it are clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinateLimits {
    pub x_max: u16,
    pub y_max: u16,
}

impl Default for CoordinateLimits {
    fn default() -> Self {
        Self {
            x_max: DEFAULT_X_MAX,
            y_max: DEFAULT_Y_MAX,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RobotPosition {
    /// `(0, 0)` on the wire: the peer has nothing for this robot yet.
    NotReceived,
    At { x: u16, y: u16 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RobotCoordinateSet {
    pub positions: Vec<(Robot, RobotPosition)>,
}

impl RobotCoordinateSet {
    /// Decode the first 24 bytes of `payload`; `None` if it is shorter.
    pub fn decode(payload: &[u8], limits: CoordinateLimits) -> Option<Self> {
        if payload.len() < COORDINATE_PAYLOAD_LEN {
            return None;
        }
        let positions = Robot::ALL
            .iter()
            .zip(payload.chunks_exact(4))
            .map(|(&robot, slot)| {
                let x = u16::from_le_bytes([slot[0], slot[1]]);
                let y = u16::from_le_bytes([slot[2], slot[3]]);
                if x == 0 && y == 0 {
                    return (robot, RobotPosition::NotReceived);
                }
                let cx = x.min(limits.x_max);
                let cy = y.min(limits.y_max);
                if (cx, cy) != (x, y) {
                    debug!("{} position ({}, {}) clamped to ({}, {})", robot, x, y, cx, cy);
                }
                (robot, RobotPosition::At { x: cx, y: cy })
            })
            .collect();
        Some(Self { positions })
    }

    pub fn get(&self, robot: Robot) -> Option<RobotPosition> {
        self.positions
            .iter()
            .find(|(r, _)| *r == robot)
            .map(|(_, p)| *p)
    }

    /// One line per robot, e.g. `R1: (120, 340)` or `R2: not received`.
    pub fn lines(&self) -> Vec<String> {
        self.positions
            .iter()
            .map(|(robot, pos)| match pos {
                RobotPosition::NotReceived => format!("{}: not received", robot),
                RobotPosition::At { x, y } => format!("{}: ({}, {})", robot, x, y),
            })
            .collect()
    }

    /// Encode back to a 24-byte payload (clamped values, `(0,0)` for missing).
    pub fn to_payload(&self) -> Vec<u8> {
        let mut out = vec![0u8; COORDINATE_PAYLOAD_LEN];
        for (robot, pos) in &self.positions {
            let Some(slot) = Robot::ALL.iter().position(|r| r == robot) else {
                continue;
            };
            if let RobotPosition::At { x, y } = pos {
                out[slot * 4..slot * 4 + 2].copy_from_slice(&x.to_le_bytes());
                out[slot * 4 + 2..slot * 4 + 4].copy_from_slice(&y.to_le_bytes());
            }
        }
        out
    }
}

/// One-byte vulnerability mask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VulnerabilityFlags(u8);

impl VulnerabilityFlags {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub fn from_robots<I: IntoIterator<Item = Robot>>(robots: I) -> Result<Self, TelemetryError> {
        let mut flags = Self::empty();
        for robot in robots {
            flags.insert(robot)?;
        }
        Ok(flags)
    }

    pub fn insert(&mut self, robot: Robot) -> Result<(), TelemetryError> {
        let bit = robot
            .vulnerability_bit()
            .ok_or(TelemetryError::NoVulnerabilityBit(robot))?;
        self.0 |= 1 << bit;
        Ok(())
    }

    pub fn contains(&self, robot: Robot) -> bool {
        robot
            .vulnerability_bit()
            .map_or(false, |bit| self.0 & (1 << bit) != 0)
    }

    /// Flagged robots in slot order; bits 5..7 are ignored.
    pub fn robots(&self) -> Vec<Robot> {
        Robot::ALL
            .iter()
            .copied()
            .filter(|r| self.contains(*r))
            .collect()
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn to_payload(&self) -> [u8; 1] {
        [self.0]
    }

    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        payload.first().map(|&b| Self(b))
    }
}

impl fmt::Display for VulnerabilityFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let robots = self.robots();
        if robots.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = robots.iter().map(|r| r.name()).collect();
        write!(f, "{}", names.join(", "))
    }
}

/// Maps validated frames to telemetry records.
#[derive(Debug, Clone, Copy)]
pub struct TelemetryDecoder {
    pub positions_command: CommandId,
    pub flags_command: CommandId,
    pub limits: CoordinateLimits,
}

impl Default for TelemetryDecoder {
    fn default() -> Self {
        Self {
            positions_command: CommandId::ROBOT_POSITIONS,
            flags_command: CommandId::VULNERABILITY_FLAGS,
            limits: CoordinateLimits::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TelemetryRecord {
    Positions(RobotCoordinateSet),
    Vulnerability { flags: VulnerabilityFlags },
    Raw { command_id: CommandId, payload: Vec<u8> },
}

impl TelemetryDecoder {
    pub fn decode(&self, frame: &ParsedFrame) -> TelemetryRecord {
        let decoded = if frame.command_id == self.positions_command {
            RobotCoordinateSet::decode(&frame.payload, self.limits).map(TelemetryRecord::Positions)
        } else if frame.command_id == self.flags_command {
            VulnerabilityFlags::from_payload(&frame.payload)
                .map(|flags| TelemetryRecord::Vulnerability { flags })
        } else {
            None
        };
        decoded.unwrap_or_else(|| TelemetryRecord::Raw {
            command_id: frame.command_id,
            payload: frame.payload.clone(),
        })
    }
}
