//! Async driver for a [`SerialSession`].
//!
//! The session is polled on a fixed interval; commands arrive over an
//! unbounded channel and events leave over another, so the console front end
//! never touches the port directly.

use log::{debug, error, info, warn};
use std::io::{Read, Write};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

use super::{LinkError, LinkEvent, SerialSession};
use crate::protocol::CommandId;
use crate::telemetry::VulnerabilityFlags;

/// Consecutive hard read errors tolerated before the loop gives up.
const MAX_CONSECUTIVE_READ_ERRORS: u32 = 10;

#[derive(Debug, Clone)]
pub enum ControlMessage {
    Send { command: CommandId, payload: Vec<u8> },
    SendFlags(VulnerabilityFlags),
    /// Ask for a [`LinkEvent::Stats`] snapshot.
    Stats,
    Shutdown,
}

/// Drive `session` until shutdown, a closed control channel, a dropped event
/// receiver or a port that keeps failing. Returns the session so callers
/// can inspect the final counters.
pub async fn run<T: Read + Write>(
    mut session: SerialSession<T>,
    poll_interval: Duration,
    mut control_rx: mpsc::UnboundedReceiver<ControlMessage>,
    event_tx: mpsc::UnboundedSender<LinkEvent>,
) -> Result<SerialSession<T>, LinkError> {
    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut consecutive_errors = 0u32;
    info!("Link reader started on {} (poll every {:?})", session.label(), poll_interval);

    loop {
        tokio::select! {
            msg = control_rx.recv() => {
                let event = match msg {
                    Some(ControlMessage::Shutdown) | None => {
                        info!("Link reader on {} shutting down", session.label());
                        break;
                    }
                    Some(ControlMessage::Send { command, payload }) => {
                        sent_or_failed(session.send(command, &payload))
                    }
                    Some(ControlMessage::SendFlags(flags)) => {
                        sent_or_failed(session.send_vulnerability_flags(flags))
                    }
                    Some(ControlMessage::Stats) => LinkEvent::Stats(session.stats()),
                };
                if event_tx.send(event).is_err() {
                    debug!("event receiver dropped");
                    break;
                }
            }
            _ = ticker.tick() => {
                match session.poll() {
                    Ok(events) => {
                        consecutive_errors = 0;
                        for event in events {
                            if event_tx.send(event).is_err() {
                                debug!("event receiver dropped");
                                return Ok(session);
                            }
                        }
                    }
                    Err(e) => {
                        consecutive_errors += 1;
                        warn!(
                            "Serial read error on {} ({}/{}): {}",
                            session.label(),
                            consecutive_errors,
                            MAX_CONSECUTIVE_READ_ERRORS,
                            e
                        );
                        if consecutive_errors >= MAX_CONSECUTIVE_READ_ERRORS {
                            error!("Giving up on {}", session.label());
                            return Err(LinkError::TooManyErrors(consecutive_errors));
                        }
                    }
                }
            }
        }
    }
    Ok(session)
}

fn sent_or_failed(result: Result<Vec<u8>, LinkError>) -> LinkEvent {
    match result {
        Ok(frame) => LinkEvent::Sent(frame),
        Err(e) => {
            error!("Send failed: {}", e);
            LinkEvent::SendFailed(e.to_string())
        }
    }
}
