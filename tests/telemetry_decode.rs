//! Decoding position and vulnerability frames as the console shows them.

mod common;

use radarlink::protocol::{CommandId, FrameParser};
use radarlink::telemetry::{
    CoordinateLimits, Robot, RobotCoordinateSet, RobotPosition, TelemetryDecoder, TelemetryRecord,
    VulnerabilityFlags,
};

/// Position frame captured from the peer: R1 off the field, R3 missing.
const POSITIONS_SEQ7: [u8; 33] = [
    0xA5, 0x18, 0x00, 0x07, 0x2F, 0x05, 0x03, 0xB8, 0x0B, 0x40, 0x06, 0x64, 0x00, 0xC8, 0x00, 0x00,
    0x00, 0x00, 0x00, 0xF0, 0x0A, 0xDC, 0x05, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x07, 0x00, 0x26,
    0x61,
];

#[test]
fn captured_position_frame_decodes_and_clamps() {
    let frame = FrameParser::new().feed(&POSITIONS_SEQ7).unwrap();
    assert_eq!(frame.command_id, CommandId::ROBOT_POSITIONS);
    assert_eq!(frame.sequence, 7);

    let record = TelemetryDecoder::default().decode(&frame);
    let TelemetryRecord::Positions(set) = &record else {
        panic!("expected positions, got {:?}", record);
    };
    assert_eq!(set.get(Robot::R1), Some(RobotPosition::At { x: 2800, y: 1500 }));
    assert_eq!(set.get(Robot::R2), Some(RobotPosition::At { x: 100, y: 200 }));
    assert_eq!(set.get(Robot::R3), Some(RobotPosition::NotReceived));
    assert_eq!(set.get(Robot::R4), Some(RobotPosition::At { x: 2800, y: 1500 }));
    assert_eq!(set.get(Robot::R5), Some(RobotPosition::At { x: 5, y: 0 }));
    assert_eq!(set.get(Robot::R7), Some(RobotPosition::At { x: 0, y: 7 }));
    assert_eq!(
        set.lines(),
        [
            "R1: (2800, 1500)",
            "R2: (100, 200)",
            "R3: not received",
            "R4: (2800, 1500)",
            "R5: (5, 0)",
            "R7: (0, 7)",
        ]
    );
}

#[test]
fn clamping_follows_configured_limits() {
    let payload = common::positions_payload([(3000, 40), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)]);
    let default = RobotCoordinateSet::decode(&payload, CoordinateLimits::default()).unwrap();
    assert_eq!(default.get(Robot::R1), Some(RobotPosition::At { x: 2800, y: 40 }));

    let narrow = CoordinateLimits { x_max: 1000, y_max: 20 };
    let narrow = RobotCoordinateSet::decode(&payload, narrow).unwrap();
    assert_eq!(narrow.get(Robot::R1), Some(RobotPosition::At { x: 1000, y: 20 }));
}

#[test]
fn short_position_payload_falls_back_to_raw() {
    let frame = radarlink::protocol::ParsedFrame {
        command_id: CommandId::ROBOT_POSITIONS,
        sequence: 1,
        payload: vec![1, 2, 3],
    };
    match TelemetryDecoder::default().decode(&frame) {
        TelemetryRecord::Raw { command_id, payload } => {
            assert_eq!(command_id, CommandId::ROBOT_POSITIONS);
            assert_eq!(payload, vec![1, 2, 3]);
        }
        other => panic!("expected raw, got {:?}", other),
    }
}

#[test]
fn flags_frame_decodes_to_robots() {
    let frame = FrameParser::new().feed(&common::FLAGS_R1_R3).unwrap();
    match TelemetryDecoder::default().decode(&frame) {
        TelemetryRecord::Vulnerability { flags } => {
            assert_eq!(flags.robots(), vec![Robot::R1, Robot::R3]);
            assert_eq!(flags.to_string(), "R1, R3");
        }
        other => panic!("expected flags, got {:?}", other),
    }
}

#[test]
fn robot_names_parse_from_operator_input() {
    let robots: Vec<Robot> = ["R1", "r7", " 3 "]
        .iter()
        .map(|s| s.parse().unwrap())
        .collect();
    assert_eq!(robots, vec![Robot::R1, Robot::R7, Robot::R3]);
    assert!("R6".parse::<Robot>().is_err());

    let flags = VulnerabilityFlags::from_robots(robots).unwrap();
    assert_eq!(flags.bits(), 0b0001_0101);
    assert!(VulnerabilityFlags::from_robots([Robot::R5]).is_err());
}

#[test]
fn record_serializes_for_json_output() {
    let frame = FrameParser::new().feed(&common::FLAGS_R1_R3).unwrap();
    let record = TelemetryDecoder::default().decode(&frame);
    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(json["kind"], "vulnerability");
}
