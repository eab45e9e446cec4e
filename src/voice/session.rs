use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::events::{is_benign_error, TranscriptLine, VoiceEvent};

pub const DEFAULT_CALL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Connecting,
    Active,
    Ended,
    Failed,
}

impl CallStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, CallStatus::Ended | CallStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CallSession {
    #[serde(skip_serializing)]
    pub owner: Option<String>,
    pub status: CallStatus,
    pub speaking: bool,
    pub transcript: Vec<TranscriptLine>,
    pub last_error: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Default for CallSession {
    fn default() -> Self {
        Self {
            owner: None,
            status: CallStatus::Connecting,
            speaking: false,
            transcript: Vec::new(),
            last_error: None,
            updated_at: OffsetDateTime::now_utc(),
        }
    }
}

impl CallSession {
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner.as_deref() == Some(user_id)
    }

    pub fn apply(&mut self, event: VoiceEvent) {
        match event {
            VoiceEvent::CallStart => {
                self.status = CallStatus::Active;
                self.last_error = None;
            }
            VoiceEvent::CallEnd => {
                if self.status != CallStatus::Failed {
                    self.status = CallStatus::Ended;
                }
                self.speaking = false;
            }
            VoiceEvent::SpeechStart => self.speaking = true,
            VoiceEvent::SpeechEnd => self.speaking = false,
            VoiceEvent::Message(line) => self.transcript.push(line),
            VoiceEvent::Error(message) => {
                if is_benign_error(&message) {
                    debug!(%message, "ignoring known voice error");
                    return;
                }
                warn!(%message, "voice call failed");
                self.status = CallStatus::Failed;
                self.speaking = false;
                self.last_error = Some(message);
            }
        }
        self.updated_at = OffsetDateTime::now_utc();
    }
}

/// Live view of voice calls keyed by the vendor call id.
#[derive(Clone)]
pub struct CallRegistry {
    sessions: Arc<RwLock<HashMap<String, CallSession>>>,
    capacity: usize,
}

impl Default for CallRegistry {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CALL_CAPACITY)
    }
}

impl CallRegistry {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Applies an event; the first message naming an owner fixes it for the call.
    pub async fn apply(
        &self,
        call_id: &str,
        owner: Option<String>,
        event: VoiceEvent,
    ) -> CallSession {
        let mut sessions = self.sessions.write().await;
        if !sessions.contains_key(call_id) {
            if sessions.len() >= self.capacity {
                evict(&mut sessions, self.capacity);
            }
            info!(%call_id, "tracking voice call");
        }
        let session = sessions.entry(call_id.to_string()).or_default();
        if session.owner.is_none() {
            session.owner = owner;
        }
        session.apply(event);
        session.clone()
    }

    pub async fn snapshot(&self, call_id: &str) -> Option<CallSession> {
        self.sessions.read().await.get(call_id).cloned()
    }

    /// The session, if `user_id` owns it.
    pub async fn snapshot_for(&self, call_id: &str, user_id: &str) -> Option<CallSession> {
        self.snapshot(call_id)
            .await
            .filter(|s| s.is_owned_by(user_id))
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Drops finished calls first, then the least recently updated ones, until
/// one slot is free.
fn evict(sessions: &mut HashMap<String, CallSession>, capacity: usize) {
    sessions.retain(|_, s| !s.status.is_finished());
    while sessions.len() >= capacity {
        let Some(oldest) = sessions
            .iter()
            .min_by_key(|(_, s)| s.updated_at)
            .map(|(id, _)| id.clone())
        else {
            break;
        };
        sessions.remove(&oldest);
    }
}
