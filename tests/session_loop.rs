//! The async link loop against an in-memory port.

mod common;

use common::{positions_frame, MockHandle, FLAGS_R1_R3};
use radarlink::config::Config;
use radarlink::protocol::{CommandId, ParseOutcome};
use radarlink::session::{run, ControlMessage, LinkError, LinkEvent, SerialSession};
use radarlink::telemetry::{Robot, RobotPosition, TelemetryRecord, VulnerabilityFlags};
use std::io::ErrorKind;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

const POLL: Duration = Duration::from_millis(5);

async fn next_event(rx: &mut mpsc::UnboundedReceiver<LinkEvent>) -> LinkEvent {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("event within 2s")
        .expect("channel open")
}

#[tokio::test]
async fn telemetry_flows_and_flags_go_out() {
    let port = MockHandle::default();
    let frame = positions_frame([(120, 340), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)], 3);
    port.feed(&[0x00, 0x01]);
    port.feed(&frame[..10]);
    port.feed(&frame[10..]);

    let session = SerialSession::with_config(port.port(), &Config::default());
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(session, POLL, control_rx, event_tx));

    assert!(matches!(
        next_event(&mut event_rx).await,
        LinkEvent::Rejected(ParseOutcome::NoStartByte)
    ));
    match next_event(&mut event_rx).await {
        LinkEvent::Received {
            frame,
            record: TelemetryRecord::Positions(set),
        } => {
            assert_eq!(frame.sequence, 3);
            assert_eq!(set.get(Robot::R1), Some(RobotPosition::At { x: 120, y: 340 }));
            assert_eq!(set.get(Robot::R2), Some(RobotPosition::NotReceived));
        }
        other => panic!("unexpected {:?}", other),
    }

    let flags = VulnerabilityFlags::from_robots([Robot::R1, Robot::R3]).unwrap();
    control_tx.send(ControlMessage::SendFlags(flags)).unwrap();
    match next_event(&mut event_rx).await {
        LinkEvent::Sent(bytes) => assert_eq!(bytes, FLAGS_R1_R3),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(port.written(), FLAGS_R1_R3);

    control_tx.send(ControlMessage::Stats).unwrap();
    match next_event(&mut event_rx).await {
        LinkEvent::Stats(stats) => {
            assert_eq!(stats.frames_ok, 1);
            assert_eq!(stats.frames_sent, 1);
            assert_eq!(stats.bytes_discarded, 2);
            assert_eq!(stats.no_start_byte, 1);
        }
        other => panic!("unexpected {:?}", other),
    }

    control_tx.send(ControlMessage::Shutdown).unwrap();
    let session = task.await.unwrap().unwrap();
    assert_eq!(session.stats().bytes_received, 2 + frame.len() as u64);
}

#[tokio::test]
async fn raw_send_uses_configured_sequence() {
    let port = MockHandle::default();
    let mut config = Config::default();
    config.link.sequence = 0x10;
    config.link.increment_sequence = true;
    let session = SerialSession::with_config(port.port(), &config);
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(session, POLL, control_rx, event_tx));

    for _ in 0..2 {
        control_tx
            .send(ControlMessage::Send {
                command: CommandId(0x0001),
                payload: vec![],
            })
            .unwrap();
        assert!(matches!(next_event(&mut event_rx).await, LinkEvent::Sent(_)));
    }
    drop(control_tx);
    task.await.unwrap().unwrap();

    let written = port.written();
    assert_eq!(written.len(), 18);
    assert_eq!(written[3], 0x10);
    assert_eq!(written[9 + 3], 0x11);
}

#[tokio::test]
async fn persistent_read_errors_stop_the_loop() {
    let port = MockHandle::default();
    for _ in 0..20 {
        port.fail(ErrorKind::BrokenPipe);
    }
    let session = SerialSession::with_config(port.port(), &Config::default());
    let (_control_tx, control_rx) = mpsc::unbounded_channel();
    let (event_tx, _event_rx) = mpsc::unbounded_channel();

    let result = timeout(Duration::from_secs(2), run(session, POLL, control_rx, event_tx))
        .await
        .expect("loop ends");
    assert!(matches!(result, Err(LinkError::TooManyErrors(10))));
}

#[tokio::test]
async fn transient_errors_are_survived() {
    let port = MockHandle::default();
    port.fail(ErrorKind::BrokenPipe);
    port.fail(ErrorKind::Interrupted);
    port.feed(&FLAGS_R1_R3);
    let session = SerialSession::with_config(port.port(), &Config::default());
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(session, POLL, control_rx, event_tx));

    match next_event(&mut event_rx).await {
        LinkEvent::Received {
            record: TelemetryRecord::Vulnerability { flags },
            ..
        } => assert_eq!(flags.bits(), 0x05),
        other => panic!("unexpected {:?}", other),
    }
    control_tx.send(ControlMessage::Shutdown).unwrap();
    let session = task.await.unwrap().unwrap();
    assert_eq!(session.stats().read_errors, 1);
}

#[test]
fn session_polls_synchronously() {
    let port = MockHandle::default();
    port.feed(&FLAGS_R1_R3);
    let mut session = SerialSession::with_config(port.port(), &Config::default());
    let events = tokio_test::assert_ok!(session.poll());
    assert_eq!(events.len(), 1);
    assert!(session.poll().unwrap().is_empty());
}
