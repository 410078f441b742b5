//! Serialisation of stored messages.
//!
//! Conversation stores hold messages as JSON strings. The encoding is
//! lossless for every field the wrapper reads (role, id, content, tool
//! calls); fields it does not know about survive the round trip through the
//! flattened `extra` map on [`ChatMessage`].

use crate::chat::ChatMessage;
use crate::store::StoreError;

pub fn encode(message: &ChatMessage) -> Result<String, StoreError> {
    serde_json::to_string(message).map_err(|e| StoreError::Codec(e.to_string()))
}

pub fn decode(raw: &str) -> Result<ChatMessage, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Codec(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolCall;
    use crate::chat::{ChatRole, MessageType};

    #[test]
    fn round_trips_text_message() {
        let msg = ChatMessage::user().content("hello").id("m1").build();
        let decoded = decode(&encode(&msg).unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn round_trips_tool_calls_with_status() {
        let mut call = ToolCall::new("tc1", "send_email", r#"{"to":"[EMAIL_01]"}"#);
        call.status = Some("ok".to_string());
        let msg = ChatMessage::assistant()
            .content("")
            .id("m2")
            .tool_use(vec![call])
            .build();
        let decoded = decode(&encode(&msg).unwrap()).unwrap();
        assert_eq!(decoded.message_type, msg.message_type);
        assert_eq!(decoded.role, ChatRole::Assistant);
    }

    #[test]
    fn unknown_fields_round_trip_opaquely() {
        let raw = r#"{"role":"user","content":"hi","id":"m3","trace_id":"abc-123","hops":3}"#;
        let decoded = decode(raw).unwrap();
        assert_eq!(decoded.extra.get("trace_id").unwrap(), "abc-123");
        let re_encoded = encode(&decoded).unwrap();
        let round: ChatMessage = decode(&re_encoded).unwrap();
        assert_eq!(round.extra.get("hops").unwrap(), 3);
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode("not json").is_err());
    }

    #[test]
    fn missing_message_type_defaults_to_text() {
        let decoded = decode(r#"{"role":"assistant","content":"ok"}"#).unwrap();
        assert_eq!(decoded.message_type, MessageType::Text);
    }
}
