//! Wire format between a session and its page.
//!
//! Every server-to-client message is one JSON text frame. Application
//! values are sent as their plain JSON encoding; reload content is wrapped in
//! an envelope the page script recognises by its `GooeyMessage` tag.

use gooey_reload::ContentUpdate;
use serde::Serialize;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;

/// Tag identifying a reload envelope.
pub const RELOAD_MESSAGE: &str = "gooey-server-reload-content";

/// Reload content as sent to the page.
#[derive(Debug, Clone, Serialize)]
pub struct ReloadEnvelope {
    #[serde(rename = "GooeyMessage")]
    pub message: &'static str,
    #[serde(rename = "GooeyContent")]
    pub content: ContentUpdate,
}

impl ReloadEnvelope {
    pub fn new(content: ContentUpdate) -> Self {
        Self {
            message: RELOAD_MESSAGE,
            content,
        }
    }
}

/// How the client ended the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseKind {
    /// Tab closed or navigated away.
    Clean,
    /// Any other code, or none at all.
    Unexpected(String),
}

/// Classifies a received close frame.
pub fn classify_close(frame: Option<&CloseFrame<'_>>) -> CloseKind {
    match frame.map(|f| f.code) {
        Some(CloseCode::Normal) | Some(CloseCode::Away) => CloseKind::Clean,
        Some(code) => CloseKind::Unexpected(u16::from(code).to_string()),
        None => CloseKind::Unexpected("none".to_string()),
    }
}

/// Close frame sent when the server is shutting down.
pub fn shutdown_frame() -> CloseFrame<'static> {
    CloseFrame {
        code: CloseCode::Normal,
        reason: "".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::OutboundMessage;

    #[test]
    fn test_reload_envelope_serialization() {
        let envelope = ReloadEnvelope::new(ContentUpdate {
            body: "<div></div>".into(),
            css: "h1{}".into(),
            css_changed: true,
            body_changed: true,
            ..ContentUpdate::default()
        });

        let json: serde_json::Value = serde_json::from_str(&envelope.to_json().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "GooeyMessage": "gooey-server-reload-content",
                "GooeyContent": {"Body": "<div></div>", "Javascript": "", "CSS": "h1{}"}
            })
        );
    }

    #[test]
    fn test_plain_values_are_bare_json() {
        assert_eq!("hello".to_json().unwrap(), "\"hello\"");
        assert_eq!(42_u32.to_json().unwrap(), "42");
    }

    #[test]
    fn test_classify_close() {
        let frame = |code| CloseFrame {
            code,
            reason: "".into(),
        };

        assert_eq!(classify_close(Some(&frame(CloseCode::Normal))), CloseKind::Clean);
        assert_eq!(classify_close(Some(&frame(CloseCode::Away))), CloseKind::Clean);
        assert_eq!(
            classify_close(Some(&frame(CloseCode::Error))),
            CloseKind::Unexpected("1011".into())
        );
        assert_eq!(
            classify_close(None),
            CloseKind::Unexpected("none".into())
        );
    }
}
