//! Stateless control-vs-media classification of inbound client frames.
//!
//! A frame that parses as a `{"type": …}` control object is dispatched
//! as control; anything else is raw media and forwarded as-is. The
//! parse-first heuristic is kept for compatibility with existing
//! clients; binary audio is effectively never valid control syntax.

use crate::session::messages::ControlMessage;

#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Control(ControlMessage),
    Media(Vec<u8>),
}

pub fn classify(data: Vec<u8>) -> InboundFrame {
    match serde_json::from_slice::<ControlMessage>(&data) {
        Ok(control) => InboundFrame::Control(control),
        Err(_) => InboundFrame::Media(data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_message_is_control() {
        let frame = classify(br#"{"type":"stop"}"#.to_vec());
        assert_eq!(frame, InboundFrame::Control(ControlMessage::Stop));
    }

    #[test]
    fn unknown_type_is_still_control() {
        let frame = classify(br#"{"type":"volume_up"}"#.to_vec());
        assert_eq!(frame, InboundFrame::Control(ControlMessage::Unknown));
    }

    #[test]
    fn binary_audio_is_media() {
        let pcm: Vec<u8> = vec![0x00, 0x01, 0xfe, 0xff, 0x80, 0x7f];
        let frame = classify(pcm.clone());
        assert_eq!(frame, InboundFrame::Media(pcm));
    }

    #[test]
    fn json_without_type_is_media() {
        let data = br#"{"volume": 3}"#.to_vec();
        let frame = classify(data.clone());
        assert_eq!(frame, InboundFrame::Media(data));
    }

    #[test]
    fn malformed_text_is_media() {
        let data = b"{not json".to_vec();
        let frame = classify(data.clone());
        assert_eq!(frame, InboundFrame::Media(data));
    }
}
