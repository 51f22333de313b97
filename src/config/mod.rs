//! # Configuration Management Module
//!
//! Loads and validates the console configuration. Values are read from a TOML
//! file; CLI flags override the few that matter at startup (port, baud rate).
//!
//! ## Configuration Structure
//!
//! - [`LinkConfig`] - serial port, polling cadence, framing limits, sequence numbering
//! - [`TelemetryConfig`] - command ids and display clamp range for decoded records
//! - [`LoggingConfig`] - log level and optional log file
//!
//! ## Usage
//!
//! ```rust,no_run
//! use radarlink::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("radarlink.toml").await?;
//!     println!("Serial Port: {}", config.link.port);
//!
//!     Config::create_default("radarlink.toml").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [link]
//! port = "/dev/ttyUSB0"
//! baud_rate = 115200
//! poll_interval_ms = 200
//!
//! [telemetry]
//! positions_command = 773   # 0x0305
//! flags_command = 524       # 0x020C
//! x_max = 2800
//! y_max = 1500
//!
//! [logging]
//! level = "info"
//! ```

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::fs;

use crate::protocol::{CommandId, FrameParser, MAX_PAYLOAD_LEN};
use crate::telemetry::{CoordinateLimits, TelemetryDecoder, DEFAULT_X_MAX, DEFAULT_Y_MAX};

/// Baud rates offered by the peer firmware.
pub const STANDARD_BAUD_RATES: [u32; 5] = [9600, 19200, 38400, 57600, 115200];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub link: LinkConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    pub port: String,
    pub baud_rate: u32,
    /// How often the console drains the port (ms).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Serial read timeout (ms). Keep well below `poll_interval_ms`.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Largest payload accepted from the peer; longer headers are treated as noise.
    #[serde(default = "default_max_payload_len")]
    pub max_payload_len: usize,
    /// Sequence number stamped on outbound frames.
    #[serde(default = "default_sequence")]
    pub sequence: u8,
    /// Advance the sequence number after every frame instead of keeping it fixed.
    #[serde(default)]
    pub increment_sequence: bool,
    /// Extra command ids to accept (besides the telemetry ones) instead of
    /// reporting them as unknown.
    #[serde(default)]
    pub extra_commands: Vec<u16>,
}

fn default_poll_interval_ms() -> u64 {
    200
}

fn default_read_timeout_ms() -> u64 {
    50
}

fn default_max_payload_len() -> usize {
    1024
}

fn default_sequence() -> u8 {
    0x01
}

impl LinkConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub positions_command: u16,
    pub flags_command: u16,
    pub x_max: u16,
    pub y_max: u16,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            positions_command: CommandId::ROBOT_POSITIONS.0,
            flags_command: CommandId::VULNERABILITY_FLAGS.0,
            x_max: DEFAULT_X_MAX,
            y_max: DEFAULT_Y_MAX,
        }
    }
}

impl TelemetryConfig {
    pub fn decoder(&self) -> TelemetryDecoder {
        TelemetryDecoder {
            positions_command: CommandId(self.positions_command),
            flags_command: CommandId(self.flags_command),
            limits: CoordinateLimits {
                x_max: self.x_max,
                y_max: self.y_max,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Reject values the link cannot work with.
    pub fn validate(&self) -> Result<()> {
        let link = &self.link;
        if link.baud_rate == 0 {
            return Err(anyhow!("link.baud_rate must be positive"));
        }
        if !STANDARD_BAUD_RATES.contains(&link.baud_rate) {
            log::warn!(
                "Non-standard baud rate {} (peer firmware offers {:?})",
                link.baud_rate,
                STANDARD_BAUD_RATES
            );
        }
        if link.poll_interval_ms < 10 {
            return Err(anyhow!(
                "link.poll_interval_ms must be >= 10 (got {})",
                link.poll_interval_ms
            ));
        }
        if link.read_timeout_ms == 0 || link.read_timeout_ms > link.poll_interval_ms {
            return Err(anyhow!(
                "link.read_timeout_ms must be between 1 and poll_interval_ms ({}), got {}",
                link.poll_interval_ms,
                link.read_timeout_ms
            ));
        }
        if link.max_payload_len > MAX_PAYLOAD_LEN {
            return Err(anyhow!(
                "link.max_payload_len must be <= {} (got {})",
                MAX_PAYLOAD_LEN,
                link.max_payload_len
            ));
        }
        if self.telemetry.positions_command == self.telemetry.flags_command {
            return Err(anyhow!(
                "telemetry.positions_command and flags_command must differ"
            ));
        }
        if self.logging.level.parse::<log::LevelFilter>().is_err() {
            return Err(anyhow!("logging.level '{}' is not a log level", self.logging.level));
        }
        Ok(())
    }

    /// Parser accepting the configured telemetry commands plus any extras.
    pub fn parser(&self) -> FrameParser {
        let commands = [self.telemetry.positions_command, self.telemetry.flags_command]
            .into_iter()
            .chain(self.link.extra_commands.iter().copied());
        FrameParser::with_commands(commands).max_payload(self.link.max_payload_len)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            link: LinkConfig {
                port: default_port().to_string(),
                baud_rate: 115200,
                poll_interval_ms: default_poll_interval_ms(),
                read_timeout_ms: default_read_timeout_ms(),
                max_payload_len: default_max_payload_len(),
                sequence: default_sequence(),
                increment_sequence: false,
                extra_commands: Vec::new(),
            },
            telemetry: TelemetryConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                file: None,
            },
        }
    }
}

fn default_port() -> &'static str {
    if cfg!(windows) {
        "COM3"
    } else {
        "/dev/ttyUSB0"
    }
}
