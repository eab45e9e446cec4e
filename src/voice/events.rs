use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error texts the voice service emits during normal hang-ups or while the
/// browser asks for microphone access.
const BENIGN_ERROR_MARKERS: [&str; 4] = [
    "Meeting has ended",
    "Call already ended",
    "WebRTC",
    "NotAllowedError",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "user" => Some(Role::User),
            "assistant" | "bot" => Some(Role::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptLine {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceEvent {
    CallStart,
    CallEnd,
    SpeechStart,
    SpeechEnd,
    Message(TranscriptLine),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerMessage {
    pub call_id: String,
    /// External id of the user the call was started for, when the message says.
    pub owner: Option<String>,
    pub event: VoiceEvent,
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Extracts a readable message from an error payload of unknown shape.
pub fn error_message(err: &Value) -> String {
    match err {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Object(map) => ["message", "error", "details"]
            .iter()
            .find_map(|key| map.get(*key).filter(|v| truthy(v)).map(text))
            .unwrap_or_else(|| err.to_string()),
        other => other.to_string(),
    }
}

pub fn is_benign_error(message: &str) -> bool {
    message.is_empty()
        || message == "{}"
        || BENIGN_ERROR_MARKERS.iter().any(|m| message.contains(m))
}

/// A final transcript fragment, if the message carries one.
pub fn transcript_line(message: &Value) -> Option<TranscriptLine> {
    let transcript = message.get("transcript")?.as_str().filter(|t| !t.is_empty())?;
    let role = Role::parse(message.get("role")?.as_str()?)?;

    if message.get("type").and_then(Value::as_str) == Some("transcript") {
        let kind = message
            .get("transcriptType")
            .or_else(|| message.get("transcript_type"))
            .and_then(Value::as_str);
        if kind != Some("final") {
            return None;
        }
    }

    Some(TranscriptLine {
        role,
        content: transcript.to_string(),
    })
}

fn call_id(message: &Value) -> Option<String> {
    message
        .get("call")
        .and_then(|c| c.get("id"))
        .or_else(|| message.get("callId"))
        .or_else(|| message.get("call_id"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Reads the `user_id` variable the browser passes when starting a call, or
/// the same key from the call metadata.
fn owner_of(message: &Value) -> Option<String> {
    let call = message.get("call")?;
    call.pointer("/assistantOverrides/variableValues/user_id")
        .or_else(|| call.pointer("/metadata/user_id"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

fn event_of(message: &Value) -> Option<VoiceEvent> {
    let kind = message.get("type").and_then(Value::as_str).unwrap_or_default();
    let status = message.get("status").and_then(Value::as_str);

    match kind {
        "call-start" => Some(VoiceEvent::CallStart),
        "call-end" | "end-of-call-report" | "hang" => Some(VoiceEvent::CallEnd),
        "status-update" => match status {
            Some("in-progress") => Some(VoiceEvent::CallStart),
            Some("ended") => Some(VoiceEvent::CallEnd),
            _ => None,
        },
        "speech-start" => Some(VoiceEvent::SpeechStart),
        "speech-end" => Some(VoiceEvent::SpeechEnd),
        "speech-update" => {
            let role = message.get("role").and_then(Value::as_str);
            if role.is_some_and(|r| r != "assistant") {
                return None;
            }
            match status {
                Some("started") => Some(VoiceEvent::SpeechStart),
                Some("stopped") => Some(VoiceEvent::SpeechEnd),
                _ => None,
            }
        }
        "error" => {
            let payload = message.get("error").unwrap_or(message);
            Some(VoiceEvent::Error(error_message(payload)))
        }
        _ => transcript_line(message).map(VoiceEvent::Message),
    }
}

/// Reads one server message, either wrapped as `{"message": {...}}` or bare.
pub fn parse_server_message(body: &Value) -> Option<ServerMessage> {
    let message = body.get("message").filter(|m| m.is_object()).unwrap_or(body);
    let call_id = call_id(message)?;
    let event = event_of(message)?;
    Some(ServerMessage {
        call_id,
        owner: owner_of(message),
        event,
    })
}
