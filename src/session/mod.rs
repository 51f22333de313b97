//! # Serial Session
//!
//! A [`SerialSession`] owns everything one end of the link needs: the
//! transport handle, the receive buffer that carries partial frames between
//! reads, the outbound frame builder and the link counters. Nothing here is
//! global; two sessions on two ports are fully independent.
//!
//! The transport is any `Read + Write`. With the `serial` feature,
//! [`open`] yields a session over a real port; tests use in-memory
//! transports.
//!
//! ```rust,no_run
//! # #[cfg(feature = "serial")]
//! # fn main() -> anyhow::Result<()> {
//! use radarlink::config::Config;
//! use radarlink::session::{self, LinkEvent};
//!
//! let config = Config::default();
//! let mut session = session::open(&config)?;
//! loop {
//!     for event in session.poll()? {
//!         if let LinkEvent::Received { record, .. } = event {
//!             println!("{:?}", record);
//!         }
//!     }
//!     std::thread::sleep(config.link.poll_interval());
//! }
//! # }
//! # #[cfg(not(feature = "serial"))]
//! # fn main() {}
//! ```

pub mod runner;

pub use runner::{run, ControlMessage};

use log::{debug, info, trace, warn};
use std::io::{ErrorKind, Read, Write};
use std::time::Instant;

use crate::config::Config;
use crate::logutil::hex_dump;
use crate::metrics::LinkStats;
use crate::protocol::{BuildError, CommandId, FrameBuilder, ParseOutcome, ParsedFrame, ReceiveBuffer};
use crate::telemetry::{TelemetryDecoder, TelemetryRecord, VulnerabilityFlags};

#[cfg(feature = "serial")]
use serialport::SerialPort;

/// Read chunk size. A full chunk means more is probably waiting.
const READ_CHUNK: usize = 4096;
/// Upper bound on reads per poll so a babbling peer cannot starve the caller.
const MAX_READS_PER_POLL: usize = 8;
/// Bytes of each raw read shown in trace logs.
const TRACE_BYTES: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "serial")]
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("link gave up after {0} consecutive read errors")]
    TooManyErrors(u32),
}

/// What one poll of the link produced.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    Received {
        frame: ParsedFrame,
        record: TelemetryRecord,
    },
    Rejected(ParseOutcome),
    Sent(Vec<u8>),
    SendFailed(String),
    Stats(LinkStats),
}

pub struct SerialSession<T> {
    transport: T,
    label: String,
    rx: ReceiveBuffer,
    builder: FrameBuilder,
    decoder: TelemetryDecoder,
    stats: LinkStats,
    started: Instant,
}

impl<T: Read + Write> SerialSession<T> {
    pub fn new(
        transport: T,
        label: impl Into<String>,
        rx: ReceiveBuffer,
        builder: FrameBuilder,
        decoder: TelemetryDecoder,
    ) -> Self {
        Self {
            transport,
            label: label.into(),
            rx,
            builder,
            decoder,
            stats: LinkStats::default(),
            started: Instant::now(),
        }
    }

    /// Session over `transport` with parser, sequence numbering and decoder
    /// taken from `config`.
    pub fn with_config(transport: T, config: &Config) -> Self {
        Self::new(
            transport,
            config.link.port.clone(),
            ReceiveBuffer::new(config.parser()),
            FrameBuilder::new(config.link.sequence, config.link.increment_sequence),
            config.telemetry.decoder(),
        )
    }

    /// Read whatever the transport has and turn it into events.
    ///
    /// Timeouts and interrupted reads are "no data", not errors.
    pub fn poll(&mut self) -> Result<Vec<LinkEvent>, LinkError> {
        let mut events = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];
        for _ in 0..MAX_READS_PER_POLL {
            match self.transport.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    events.extend(self.ingest(&chunk[..n]));
                    if n < READ_CHUNK {
                        break;
                    }
                }
                Err(ref e)
                    if matches!(
                        e.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) =>
                {
                    break;
                }
                Err(e) => {
                    self.stats.read_errors += 1;
                    return Err(LinkError::Io(e));
                }
            }
        }
        Ok(events)
    }

    /// Feed bytes obtained elsewhere through the receive buffer.
    pub fn ingest(&mut self, data: &[u8]) -> Vec<LinkEvent> {
        trace!("{} RX {} bytes: {}", self.label, data.len(), hex_dump(data, TRACE_BYTES));
        self.stats.bytes_received += data.len() as u64;
        self.rx.push(data);
        let events = self
            .rx
            .drain()
            .into_iter()
            .map(|result| match result {
                Ok(frame) => {
                    self.stats.frames_ok += 1;
                    let record = self.decoder.decode(&frame);
                    debug!(
                        "{} frame cmd={} seq={} len={}",
                        self.label,
                        frame.command_id,
                        frame.sequence,
                        frame.payload.len()
                    );
                    LinkEvent::Received { frame, record }
                }
                Err(outcome) => {
                    self.stats.record_rejection(&outcome);
                    debug!("{} rejected: {}", self.label, outcome);
                    LinkEvent::Rejected(outcome)
                }
            })
            .collect();
        self.stats.bytes_discarded = self.rx.discarded();
        events
    }

    /// Frame `payload` under `command`, write it out and return the bytes sent.
    pub fn send(&mut self, command: impl Into<CommandId>, payload: &[u8]) -> Result<Vec<u8>, LinkError> {
        let command = command.into();
        let frame = self.builder.next_frame(command, payload)?;
        self.transport.write_all(&frame)?;
        self.transport.flush()?;
        self.stats.frames_sent += 1;
        self.stats.bytes_sent += frame.len() as u64;
        debug!("{} TX cmd={} {}", self.label, command, hex_dump(&frame, TRACE_BYTES));
        Ok(frame)
    }

    pub fn send_vulnerability_flags(&mut self, flags: VulnerabilityFlags) -> Result<Vec<u8>, LinkError> {
        info!("{} sending vulnerability flags: {}", self.label, flags);
        self.send(self.decoder.flags_command, &flags.to_payload())
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Bytes waiting in the receive buffer for the rest of their frame.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Drop any buffered partial frame (e.g. after the peer was reset).
    pub fn reset_receive_buffer(&mut self) {
        if !self.rx.is_empty() {
            warn!("{} dropping {} buffered byte(s)", self.label, self.rx.len());
        }
        self.rx.clear();
        self.stats.bytes_discarded = self.rx.discarded();
    }
}

/// Open the configured serial port (8N1) and wrap it in a session.
#[cfg(feature = "serial")]
pub fn open(config: &Config) -> Result<SerialSession<Box<dyn SerialPort>>, LinkError> {
    let link = &config.link;
    info!("Opening serial port {} at {} baud", link.port, link.baud_rate);
    let mut builder = serialport::new(link.port.as_str(), link.baud_rate).timeout(link.read_timeout());
    #[cfg(unix)]
    {
        builder = builder
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .flow_control(serialport::FlowControl::None);
    }
    let port = builder.open()?;
    // Stale bytes from before we opened would only be noise to resync past.
    if let Err(e) = port.clear(serialport::ClearBuffer::Input) {
        debug!("Could not purge input buffer on {}: {}", link.port, e);
    }
    Ok(SerialSession::with_config(port, config))
}

/// A serial port as shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PortInfo {
    pub name: String,
    pub description: String,
}

#[cfg(feature = "serial")]
pub fn available_ports() -> Result<Vec<PortInfo>, LinkError> {
    use serialport::SerialPortType;
    let ports = serialport::available_ports()?;
    Ok(ports
        .into_iter()
        .map(|p| {
            let description = match p.port_type {
                SerialPortType::UsbPort(usb) => {
                    let product = usb.product.unwrap_or_default();
                    let maker = usb.manufacturer.unwrap_or_default();
                    let text = format!("{} {}", maker, product).trim().to_string();
                    if text.is_empty() {
                        format!("USB {:04x}:{:04x}", usb.vid, usb.pid)
                    } else {
                        text
                    }
                }
                SerialPortType::PciPort => "PCI".to_string(),
                SerialPortType::BluetoothPort => "Bluetooth".to_string(),
                SerialPortType::Unknown => String::new(),
            };
            PortInfo {
                name: p.port_name,
                description,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{Robot, RobotPosition};
    use std::collections::VecDeque;
    use std::io;

    /// Hands out one scripted chunk per read, then times out.
    #[derive(Default)]
    struct Scripted {
        reads: VecDeque<io::Result<Vec<u8>>>,
        written: Vec<u8>,
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                Some(Ok(chunk)) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                Some(Err(e)) => Err(e),
                None => Err(io::Error::new(ErrorKind::TimedOut, "timeout")),
            }
        }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn session(reads: Vec<io::Result<Vec<u8>>>) -> SerialSession<Scripted> {
        let port = Scripted {
            reads: reads.into(),
            written: Vec::new(),
        };
        SerialSession::with_config(port, &Config::default())
    }

    fn positions_frame() -> Vec<u8> {
        let mut payload = vec![0u8; 24];
        payload[0..2].copy_from_slice(&3000u16.to_le_bytes());
        payload[2..4].copy_from_slice(&40u16.to_le_bytes());
        FrameBuilder::build(&payload, 2, CommandId::ROBOT_POSITIONS).unwrap()
    }

    #[test]
    fn partial_frame_survives_between_polls() {
        let frame = positions_frame();
        let mut s = session(vec![Ok(frame[..12].to_vec())]);
        assert!(s.poll().unwrap().is_empty());
        assert_eq!(s.pending(), 12);

        s.transport_mut().reads.push_back(Ok(frame[12..].to_vec()));
        let events = s.poll().unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            LinkEvent::Received {
                record: TelemetryRecord::Positions(set),
                ..
            } => assert_eq!(set.get(Robot::R1), Some(RobotPosition::At { x: 2800, y: 40 })),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(s.stats().frames_ok, 1);
        assert_eq!(s.stats().bytes_received, frame.len() as u64);
    }

    #[test]
    fn timeouts_and_interrupts_are_not_errors() {
        let mut s = session(vec![Err(io::Error::new(ErrorKind::Interrupted, "eintr"))]);
        assert!(s.poll().unwrap().is_empty());
        assert!(s.poll().unwrap().is_empty());
    }

    #[test]
    fn hard_read_errors_are_reported() {
        let mut s = session(vec![Err(io::Error::new(ErrorKind::BrokenPipe, "unplugged"))]);
        assert!(matches!(s.poll(), Err(LinkError::Io(_))));
        assert_eq!(s.stats().read_errors, 1);
    }

    #[test]
    fn send_flags_writes_reference_frame() {
        let mut s = session(vec![]);
        let flags = VulnerabilityFlags::from_robots([Robot::R1, Robot::R3]).unwrap();
        let sent = s.send_vulnerability_flags(flags).unwrap();
        assert_eq!(
            sent,
            vec![0xA5, 0x01, 0x00, 0x01, 0x36, 0x0C, 0x02, 0x05, 0xB8, 0xC4]
        );
        assert_eq!(s.transport_mut().written, sent);
        assert_eq!(s.stats().frames_sent, 1);
        assert_eq!(s.stats().bytes_sent, 10);
    }

    #[test]
    fn noise_is_counted() {
        let mut chunk = vec![0x10, 0x20, 0x30];
        chunk.extend(positions_frame());
        let mut s = session(vec![Ok(chunk)]);
        let events = s.poll().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(s.stats().bytes_discarded, 3);
        s.ingest(&[0xA5, 0x00]);
        assert_eq!(s.pending(), 2);
        s.reset_receive_buffer();
        assert_eq!(s.pending(), 0);
        assert_eq!(s.stats().bytes_discarded, 5);
    }
}
