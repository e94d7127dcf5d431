//! Wire messages
//!
//! The tracking service speaks in named events carried as JSON text frames.
//! Two framings exist, selected by [`Framing`]:
//!
//! - Socket.IO (Engine.IO v4 packets): `42["pan_update",0.42]`, plus the
//!   transport packets `0` open, `2` ping, `3` pong, `40` namespace connect
//!   and `41` disconnect
//! - plain JSON, in object form `{"event": "pan_update", "data": 0.42}` or
//!   array form `["pan_update", 0.42]`
//!
//! Outbound plain JSON events use the object form.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ConnectionError;

/// Inbound event names
pub mod names {
    pub const CONNECTION_RESPONSE: &str = "connection_response";
    pub const PAN_UPDATE: &str = "pan_update";
    pub const AUDIO_UPDATE: &str = "audio_update";
    pub const TRACKING_STARTED: &str = "tracking_started";
    pub const TRACKING_STOPPED: &str = "tracking_stopped";
    pub const ERROR: &str = "error";
    pub const DISCONNECT: &str = "disconnect";
    pub const VIDEO_FRAME: &str = "video_frame";
    pub const START_TRACKING: &str = "start_tracking";
    pub const STOP_TRACKING: &str = "stop_tracking";
}

/// Event received from the tracking service
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Handshake acknowledgement
    ConnectionResponse(String),
    /// Raw (uncalibrated) pan value
    PanUpdate(f64),
    /// Pan plus optional hand-derived volume (0..=1)
    AudioUpdate {
        pan: f64,
        volume: Option<f64>,
        confidence: Option<f64>,
    },
    TrackingStarted(String),
    TrackingStopped(String),
    /// Error reported by the service
    Error(String),
    /// Server is closing the session
    Disconnect,
    /// Base64 JPEG of the tracking camera
    VideoFrame(String),
    /// Any other event name; carried for logging only
    Unknown(String),
}

impl ServerEvent {
    /// Decode one plain JSON text frame
    pub fn decode(text: &str) -> Result<Self, ConnectionError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| ConnectionError::InvalidMessage(e.to_string()))?;
        Self::from_value(value)
    }

    fn from_value(value: Value) -> Result<Self, ConnectionError> {
        let (name, data) = match value {
            Value::Object(mut obj) => {
                let name = match obj.remove("event") {
                    Some(Value::String(name)) => name,
                    _ => {
                        return Err(ConnectionError::InvalidMessage(
                            "missing event name".into(),
                        ))
                    }
                };
                (name, obj.remove("data").unwrap_or(Value::Null))
            }
            Value::Array(items) => {
                let mut items = items.into_iter();
                let name = match items.next() {
                    Some(Value::String(name)) => name,
                    _ => {
                        return Err(ConnectionError::InvalidMessage(
                            "missing event name".into(),
                        ))
                    }
                };
                (name, items.next().unwrap_or(Value::Null))
            }
            other => {
                return Err(ConnectionError::InvalidMessage(format!(
                    "unexpected frame: {}",
                    other
                )))
            }
        };

        Self::from_parts(&name, data)
    }

    fn from_parts(name: &str, data: Value) -> Result<Self, ConnectionError> {
        let event = match name {
            names::CONNECTION_RESPONSE => Self::ConnectionResponse(message_of(&data)),
            names::PAN_UPDATE => {
                let pan = data
                    .as_f64()
                    .or_else(|| data.get("pan").and_then(Value::as_f64))
                    .ok_or_else(|| {
                        ConnectionError::InvalidMessage(format!("pan_update without number: {}", data))
                    })?;
                Self::PanUpdate(pan)
            }
            names::AUDIO_UPDATE => {
                let pan = data.get("pan").and_then(Value::as_f64).ok_or_else(|| {
                    ConnectionError::InvalidMessage(format!("audio_update without pan: {}", data))
                })?;
                Self::AudioUpdate {
                    pan,
                    volume: data.get("volume").and_then(Value::as_f64),
                    confidence: data.get("confidence").and_then(Value::as_f64),
                }
            }
            names::TRACKING_STARTED => Self::TrackingStarted(message_of(&data)),
            names::TRACKING_STOPPED => Self::TrackingStopped(message_of(&data)),
            names::ERROR => Self::Error(message_of(&data)),
            names::DISCONNECT => Self::Disconnect,
            names::VIDEO_FRAME => {
                let frame = data
                    .as_str()
                    .or_else(|| data.get("frame").and_then(Value::as_str))
                    .ok_or_else(|| {
                        ConnectionError::InvalidMessage("video_frame without frame".into())
                    })?;
                Self::VideoFrame(frame.to_string())
            }
            other => Self::Unknown(other.to_string()),
        };
        Ok(event)
    }
}

/// Pull a human readable message out of an event payload
fn message_of(data: &Value) -> String {
    match data {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Object(obj) => match obj.get("message") {
            Some(Value::String(s)) => s.clone(),
            _ => data.to_string(),
        },
        other => other.to_string(),
    }
}

/// Event sent to the tracking service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEvent {
    StartTracking,
    StopTracking,
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartTracking => names::START_TRACKING,
            Self::StopTracking => names::STOP_TRACKING,
        }
    }

    /// Encode as an object-form text frame
    pub fn encode(&self) -> String {
        json!({ "event": self.name() }).to_string()
    }
}

/// How events are packed into text frames
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    /// Engine.IO v4 / Socket.IO v5 packets, as served by Flask-SocketIO
    #[default]
    SocketIo,
    /// Bare JSON events
    Json,
}

/// One decoded text frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Engine.IO handshake; the client must now join the default namespace
    Open,
    /// Heartbeat that must be answered with [`Framing::pong`]
    Ping(String),
    Pong,
    /// Namespace joined; events can flow
    Connected,
    /// Namespace or transport closed by the server
    Closed,
    Event(ServerEvent),
    /// Packets with nothing for the session (acks, upgrade, noop)
    Ignored,
}

impl Framing {
    /// Decode one inbound text frame
    pub fn decode(&self, text: &str) -> Result<Frame, ConnectionError> {
        match self {
            Self::Json => match ServerEvent::decode(text)? {
                ServerEvent::Disconnect => Ok(Frame::Closed),
                event => Ok(Frame::Event(event)),
            },
            Self::SocketIo => decode_engine_packet(text),
        }
    }

    /// Encode an outbound event
    pub fn encode(&self, event: ClientEvent) -> String {
        match self {
            Self::Json => event.encode(),
            Self::SocketIo => format!("42{}", json!([event.name()])),
        }
    }

    /// Packet joining the default namespace, sent after the Engine.IO open
    pub fn connect_packet(&self) -> Option<&'static str> {
        match self {
            Self::SocketIo => Some("40"),
            Self::Json => None,
        }
    }

    /// Packet leaving the namespace before the socket closes
    pub fn disconnect_packet(&self) -> Option<&'static str> {
        match self {
            Self::SocketIo => Some("41"),
            Self::Json => None,
        }
    }

    /// Answer to a ping, echoing its payload
    pub fn pong(&self, payload: &str) -> String {
        format!("3{}", payload)
    }
}

fn decode_engine_packet(text: &str) -> Result<Frame, ConnectionError> {
    let mut chars = text.chars();
    let frame = match chars.next() {
        Some('0') => Frame::Open,
        Some('1') => Frame::Closed,
        Some('2') => Frame::Ping(chars.as_str().to_string()),
        Some('3') => Frame::Pong,
        Some('4') => decode_socket_packet(chars.as_str())?,
        Some('5') | Some('6') => Frame::Ignored,
        _ => {
            return Err(ConnectionError::InvalidMessage(format!(
                "unknown engine packet: {}",
                text
            )))
        }
    };
    Ok(frame)
}

fn decode_socket_packet(packet: &str) -> Result<Frame, ConnectionError> {
    let mut chars = packet.chars();
    let kind = chars.next();
    let mut body = chars.as_str();

    // Optional "/namespace," then an optional ack id before the payload
    if body.starts_with('/') {
        body = body.find(',').map(|i| &body[i + 1..]).unwrap_or("");
    }
    let body = body.trim_start_matches(|c: char| c.is_ascii_digit());

    let frame = match kind {
        Some('0') => Frame::Connected,
        Some('1') => Frame::Closed,
        Some('2') => {
            let value: Value = serde_json::from_str(body)
                .map_err(|e| ConnectionError::InvalidMessage(e.to_string()))?;
            if !value.is_array() {
                return Err(ConnectionError::InvalidMessage(format!(
                    "event packet without array: {}",
                    body
                )));
            }
            match ServerEvent::from_value(value)? {
                ServerEvent::Disconnect => Frame::Closed,
                event => Frame::Event(event),
            }
        }
        Some('3') => Frame::Ignored,
        Some('4') => {
            let data: Value = serde_json::from_str(body).unwrap_or(Value::Null);
            Frame::Event(ServerEvent::Error(message_of(&data)))
        }
        _ => {
            return Err(ConnectionError::InvalidMessage(format!(
                "unknown socket packet: 4{}",
                packet
            )))
        }
    };
    Ok(frame)
}

/// User command coming from the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum UiCommand {
    Start,
    Stop,
    TogglePlayback,
    SetVolume { percent: f32 },
    Recenter,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_object_form() {
        let event = ServerEvent::decode(r#"{"event":"pan_update","data":0.5}"#).unwrap();
        assert_eq!(event, ServerEvent::PanUpdate(0.5));

        let event = ServerEvent::decode(r#"{"event":"pan_update","data":{"pan":-0.25}}"#).unwrap();
        assert_eq!(event, ServerEvent::PanUpdate(-0.25));
    }

    #[test]
    fn test_decode_array_form() {
        let event = ServerEvent::decode(r#"["tracking_started","Tracking started"]"#).unwrap();
        assert_eq!(event, ServerEvent::TrackingStarted("Tracking started".into()));

        let event = ServerEvent::decode(r#"["disconnect"]"#).unwrap();
        assert_eq!(event, ServerEvent::Disconnect);
    }

    #[test]
    fn test_decode_message_payloads() {
        let event =
            ServerEvent::decode(r#"{"event":"error","data":{"message":"camera busy"}}"#).unwrap();
        assert_eq!(event, ServerEvent::Error("camera busy".into()));

        let event = ServerEvent::decode(r#"{"event":"connection_response"}"#).unwrap();
        assert_eq!(event, ServerEvent::ConnectionResponse(String::new()));
    }

    #[test]
    fn test_decode_audio_update() {
        let event = ServerEvent::decode(
            r#"{"event":"audio_update","data":{"pan":0.3,"volume":0.8,"confidence":0.9}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ServerEvent::AudioUpdate {
                pan: 0.3,
                volume: Some(0.8),
                confidence: Some(0.9),
            }
        );
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(ServerEvent::decode("not json").is_err());
        assert!(ServerEvent::decode("42").is_err());
        assert!(ServerEvent::decode(r#"{"data":1}"#).is_err());
        assert!(ServerEvent::decode(r#"{"event":"pan_update","data":"left"}"#).is_err());
    }

    #[test]
    fn test_unknown_event_is_kept() {
        let event = ServerEvent::decode(r#"{"event":"hand_landmarks","data":[]}"#).unwrap();
        assert_eq!(event, ServerEvent::Unknown("hand_landmarks".into()));
    }

    #[test]
    fn test_decode_video_frame() {
        let event = ServerEvent::decode(r#"["video_frame",{"frame":"/9j/4AAQ"}]"#).unwrap();
        assert_eq!(event, ServerEvent::VideoFrame("/9j/4AAQ".into()));
        assert!(ServerEvent::decode(r#"["video_frame",{}]"#).is_err());
    }

    #[test]
    fn test_socketio_event_packet() {
        let frame = Framing::SocketIo
            .decode(r#"42["audio_update",{"pan":0.5,"volume":0.25,"confidence":1.0}]"#)
            .unwrap();
        assert_eq!(
            frame,
            Frame::Event(ServerEvent::AudioUpdate {
                pan: 0.5,
                volume: Some(0.25),
                confidence: Some(1.0),
            })
        );

        // namespace and ack id are skipped
        let frame = Framing::SocketIo
            .decode(r#"42/tracking,7["pan_update",-0.1]"#)
            .unwrap();
        assert_eq!(frame, Frame::Event(ServerEvent::PanUpdate(-0.1)));
    }

    #[test]
    fn test_socketio_transport_packets() {
        let open = r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#;
        assert_eq!(Framing::SocketIo.decode(open).unwrap(), Frame::Open);
        assert_eq!(Framing::SocketIo.decode("2").unwrap(), Frame::Ping(String::new()));
        assert_eq!(Framing::SocketIo.decode("3").unwrap(), Frame::Pong);
        assert_eq!(
            Framing::SocketIo.decode(r#"40{"sid":"xyz"}"#).unwrap(),
            Frame::Connected
        );
        assert_eq!(Framing::SocketIo.decode("41").unwrap(), Frame::Closed);
        assert_eq!(Framing::SocketIo.decode("1").unwrap(), Frame::Closed);
        assert_eq!(Framing::SocketIo.decode("6").unwrap(), Frame::Ignored);
        assert_eq!(
            Framing::SocketIo.decode(r#"44{"message":"not allowed"}"#).unwrap(),
            Frame::Event(ServerEvent::Error("not allowed".into()))
        );
        assert_eq!(Framing::SocketIo.pong(""), "3");
    }

    #[test]
    fn test_socketio_rejects_garbage() {
        assert!(Framing::SocketIo.decode("").is_err());
        assert!(Framing::SocketIo.decode("garbage").is_err());
        assert!(Framing::SocketIo.decode("42not json").is_err());
        assert!(Framing::SocketIo.decode(r#"42{"event":"pan_update"}"#).is_err());
    }

    #[test]
    fn test_socketio_encoding() {
        assert_eq!(
            Framing::SocketIo.encode(ClientEvent::StartTracking),
            r#"42["start_tracking"]"#
        );
        assert_eq!(Framing::SocketIo.connect_packet(), Some("40"));
        assert_eq!(Framing::Json.connect_packet(), None);
        assert_eq!(
            Framing::Json.encode(ClientEvent::StopTracking),
            ClientEvent::StopTracking.encode()
        );
    }

    #[test]
    fn test_json_framing_disconnect_closes() {
        assert_eq!(Framing::Json.decode(r#"["disconnect"]"#).unwrap(), Frame::Closed);
    }

    #[test]
    fn test_client_event_encoding() {
        let value: Value = serde_json::from_str(&ClientEvent::StartTracking.encode()).unwrap();
        assert_eq!(value, json!({"event": "start_tracking"}));
        assert_eq!(ClientEvent::StopTracking.name(), "stop_tracking");
    }

    #[test]
    fn test_ui_command_json() {
        let cmd: UiCommand = serde_json::from_str(r#"{"command":"set_volume","percent":40}"#).unwrap();
        assert_eq!(cmd, UiCommand::SetVolume { percent: 40.0 });

        let cmd: UiCommand = serde_json::from_str(r#"{"command":"toggle_playback"}"#).unwrap();
        assert_eq!(cmd, UiCommand::TogglePlayback);
    }
}
