// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn user_input_defaults_enter_to_true_when_omitted() {
    let parsed: ChatClientMessage = serde_json::from_str(r#"{"type":"user_input","text":"ls"}"#).unwrap();
    match parsed {
        ChatClientMessage::UserInput { text, message_id, enter } => {
            assert_eq!(text, "ls");
            assert_eq!(message_id, None);
            assert!(enter);
        }
        _ => panic!("expected user_input"),
    }
}

#[test]
fn user_input_respects_explicit_enter_false() {
    let parsed: ChatClientMessage =
        serde_json::from_str(r#"{"type":"user_input","text":"partial","enter":false}"#).unwrap();
    match parsed {
        ChatClientMessage::UserInput { enter, .. } => assert!(!enter),
        _ => panic!("expected user_input"),
    }
}

#[test]
fn resize_parses() {
    let parsed: ChatClientMessage = serde_json::from_str(r#"{"type":"resize","cols":100,"rows":40}"#).unwrap();
    match parsed {
        ChatClientMessage::Resize { cols, rows } => {
            assert_eq!(cols, 100);
            assert_eq!(rows, 40);
        }
        _ => panic!("expected resize"),
    }
}

#[test]
fn raw_client_hello_and_ping_parse() {
    assert!(matches!(serde_json::from_str::<RawClientMessage>(r#"{"type":"hello"}"#).unwrap(), RawClientMessage::Hello));
    assert!(matches!(serde_json::from_str::<RawClientMessage>(r#"{"type":"ping"}"#).unwrap(), RawClientMessage::Ping));
}

#[test]
fn raw_server_snapshot_serializes_with_tag() {
    let msg = RawServerMessage::Snapshot { data: "aGVsbG8=".to_owned() };
    let json = serde_json::to_value(&msg).unwrap();
    assert_eq!(json["type"], "snapshot");
    assert_eq!(json["data"], "aGVsbG8=");
}
