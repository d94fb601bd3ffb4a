// Wire-format tests covering the client RPC envelope, agent stream frames,
// and pack stream frames.

use relaygate_protocol::agent::{RawReplyEvent, SendMessage, TranslatedKind};
use relaygate_protocol::auth::{AuthMetadata, SshAuth};
use relaygate_protocol::frames::{EventFrame, InboundFrame, ResFrame};
use relaygate_protocol::pack::{Manifest, ToolResult};

#[test]
fn req_frame_round_trip() {
    let json = r#"{"type":"req","id":"abc-123","method":"conversation.send","params":{"text":"hello"}}"#;
    let frame: InboundFrame = serde_json::from_str(json).unwrap();
    assert_eq!(frame.frame_type, "req");

    let req = frame.as_req().unwrap();
    assert_eq!(req.method, "conversation.send");
    assert_eq!(req.id, "abc-123");
}

#[test]
fn res_ok_serialization() {
    let res = ResFrame::ok("req-1", serde_json::json!({"pong": true}));
    let json = serde_json::to_string(&res).unwrap();

    assert!(json.contains(r#""type":"res""#));
    assert!(json.contains(r#""ok":true"#));
    assert!(json.contains(r#""pong":true"#));
    assert!(!json.contains(r#""error""#));
}

#[test]
fn res_err_serialization() {
    let res = ResFrame::err("req-2", "unauthenticated", "bad token");
    let json = serde_json::to_string(&res).unwrap();

    assert!(json.contains(r#""ok":false"#));
    assert!(json.contains(r#""unauthenticated""#));
    assert!(!json.contains(r#""payload""#));
}

#[test]
fn event_frame_with_seq() {
    let ev = EventFrame::new("message", serde_json::json!({"text": "hi"})).with_seq(42);
    let json = serde_json::to_string(&ev).unwrap();

    assert!(json.contains(r#""type":"event""#));
    assert!(json.contains(r#""event":"message""#));
    assert!(json.contains(r#""seq":42"#));
}

#[test]
fn inbound_frame_rejects_non_req() {
    let json = r#"{"type":"event","event":"message","payload":{}}"#;
    let frame: InboundFrame = serde_json::from_str(json).unwrap();
    assert!(frame.as_req().is_none(), "event frame must not parse as req");
}

#[test]
fn ssh_auth_signed_payload_is_timestamp_pipe_nonce() {
    let auth = SshAuth {
        pubkey: "ssh-ed25519 AAAA...".into(),
        signature: "sig".into(),
        timestamp: 1700000000,
        nonce: "n0nce".into(),
    };
    assert_eq!(auth.signed_payload(), "1700000000|n0nce");
}

#[test]
fn auth_metadata_round_trips() {
    let meta = AuthMetadata::Bearer(relaygate_protocol::auth::BearerAuth {
        token: "jwt.value.here".into(),
    });
    let json = serde_json::to_string(&meta).unwrap();
    let back: AuthMetadata = serde_json::from_str(&json).unwrap();
    match back {
        AuthMetadata::Bearer(b) => assert_eq!(b.token, "jwt.value.here"),
        _ => panic!("expected bearer variant"),
    }
}

#[test]
fn send_message_round_trip() {
    let msg = SendMessage {
        request_id: "req-1".into(),
        thread_id: Some("thread-1".into()),
        sender: "alice".into(),
        content: "hello agent".into(),
        attachments: vec![],
    };
    let json = serde_json::to_string(&msg).unwrap();
    let back: SendMessage = serde_json::from_str(&json).unwrap();
    assert_eq!(back.request_id, "req-1");
    assert_eq!(back.content, "hello agent");
}

#[test]
fn raw_reply_event_translates_to_uniform_kind() {
    let raw = RawReplyEvent::ToolUse {
        tool_call_id: "call-1".into(),
        tool_name: "search".into(),
        input: serde_json::json!({"q": "rust"}),
    };
    let translated: TranslatedKind = raw.into();
    match translated {
        TranslatedKind::ToolUse { tool_name, .. } => assert_eq!(tool_name, "search"),
        _ => panic!("expected tool_use"),
    }
}

#[test]
fn manifest_round_trip() {
    let json = r#"{"pack_id":"pack-1","version":"1.0","tools":[{"name":"search","description":"web search","input_schema":{},"required_capabilities":[]}]}"#;
    let manifest: Manifest = serde_json::from_str(json).unwrap();
    assert_eq!(manifest.pack_id, "pack-1");
    assert_eq!(manifest.tools.len(), 1);
    assert_eq!(manifest.tools[0].name, "search");
}

#[test]
fn tool_result_error_variant() {
    let result = ToolResult {
        request_id: "req-3".into(),
        output_json: None,
        error: Some("timed out".into()),
    };
    assert!(result.is_error());
}
