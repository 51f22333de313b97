//! Test utilities & fixtures.
//! Provides an in-memory serial port and payload helpers shared by the integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::sync::{Arc, Mutex};

use radarlink::protocol::{CommandId, FrameBuilder};

enum Step {
    Data(Vec<u8>),
    Fail(ErrorKind),
}

/// Shared handle to a [`MockPort`]; the port itself moves into the session.
#[derive(Clone, Default)]
pub struct MockHandle {
    reads: Arc<Mutex<VecDeque<Step>>>,
    written: Arc<Mutex<Vec<u8>>>,
}

impl MockHandle {
    pub fn port(&self) -> MockPort {
        MockPort {
            handle: self.clone(),
        }
    }

    /// Queue one read's worth of bytes.
    pub fn feed(&self, chunk: &[u8]) {
        self.reads.lock().unwrap().push_back(Step::Data(chunk.to_vec()));
    }

    /// Queue a failing read.
    pub fn fail(&self, kind: ErrorKind) {
        self.reads.lock().unwrap().push_back(Step::Fail(kind));
    }

    pub fn written(&self) -> Vec<u8> {
        self.written.lock().unwrap().clone()
    }
}

/// Reads return queued chunks in order and time out once the queue is empty,
/// like a serial port with a read timeout.
pub struct MockPort {
    handle: MockHandle,
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut reads = self.handle.reads.lock().unwrap();
        match reads.pop_front() {
            Some(Step::Data(mut chunk)) => {
                if chunk.len() > buf.len() {
                    let rest = chunk.split_off(buf.len());
                    reads.push_front(Step::Data(rest));
                }
                buf[..chunk.len()].copy_from_slice(&chunk);
                Ok(chunk.len())
            }
            Some(Step::Fail(kind)) => Err(io::Error::new(kind, "mock failure")),
            None => Err(io::Error::new(ErrorKind::TimedOut, "mock timeout")),
        }
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.handle.written.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// 24-byte position payload for R1, R2, R3, R4, R5, R7 in that order.
pub fn positions_payload(coords: [(u16, u16); 6]) -> Vec<u8> {
    coords
        .iter()
        .flat_map(|(x, y)| x.to_le_bytes().into_iter().chain(y.to_le_bytes()))
        .collect()
}

pub fn positions_frame(coords: [(u16, u16); 6], sequence: u8) -> Vec<u8> {
    FrameBuilder::build(&positions_payload(coords), sequence, CommandId::ROBOT_POSITIONS).unwrap()
}

/// Flags frame for R1 and R3, as sent by the console.
pub const FLAGS_R1_R3: [u8; 10] = [0xA5, 0x01, 0x00, 0x01, 0x36, 0x0C, 0x02, 0x05, 0xB8, 0xC4];
