use dashmap::DashMap;
use serde::Deserialize;
use tracing::{debug, info};

use crate::{
    error::PlayerResult,
    model::events::{PlayerUpdate, VoiceState},
    node::RemoteNode,
};

/// Routes serialized payloads to the Discord gateway shard owning the guild.
///
/// Fire and forget, acknowledgement arrives later as a `VOICE_STATE_UPDATE`.
#[cfg_attr(test, mockall::automock)]
pub trait VoiceDispatcher: Send + Sync {
    fn dispatch(&self, guild_id: &str, payload: String);
}

/// Raw Discord gateway packet, only `t` and `d` matter here.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayPacket {
    #[serde(default)]
    pub t: Option<String>,
    #[serde(default)]
    pub d: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoiceStateData {
    #[serde(default)]
    pub guild_id: Option<String>,
    pub user_id: String,
    pub session_id: String,
    #[serde(default)]
    pub channel_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoiceServerData {
    pub guild_id: String,
    pub token: String,
    #[serde(default)]
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct PendingVoice {
    session_id: Option<String>,
    server: Option<(String, String)>,
}

/// Pairs the two halves Discord sends when the bot joins a channel.
#[derive(Debug, Default)]
pub struct VoiceRegistry {
    waiting: DashMap<String, PendingVoice>,
}

impl VoiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state_update(&self, guild_id: &str, session_id: impl ToString) {
        let mut entry = self
            .waiting
            .entry(guild_id.to_string())
            .or_insert_with(PendingVoice::default);

        if entry.session_id.is_some() {
            debug!("got the same state half twice for guild {}, replacing it", guild_id);
        }

        entry.session_id = Some(session_id.to_string());
    }

    pub fn server_update(&self, guild_id: &str, token: impl ToString, endpoint: impl ToString) {
        let mut entry = self
            .waiting
            .entry(guild_id.to_string())
            .or_insert_with(PendingVoice::default);

        if entry.server.is_some() {
            debug!("got the same server half twice for guild {}, replacing it", guild_id);
        }

        entry.server = Some((token.to_string(), endpoint.to_string()));
    }

    /// Both halves, once Discord sent them.
    pub fn voice_state(&self, guild_id: &str) -> Option<VoiceState> {
        let pending = self.waiting.get(guild_id)?;

        match (&pending.session_id, &pending.server) {
            (Some(session_id), Some((token, endpoint))) => Some(VoiceState {
                token: token.clone(),
                endpoint: endpoint.clone(),
                session_id: session_id.clone(),
            }),
            _ => None,
        }
    }

    pub fn forget(&self, guild_id: &str) {
        self.waiting.remove(guild_id);
    }

    /// Hands the voice credentials to the node. Returns false without calling the
    /// node while a half is still missing.
    pub async fn attempt_connection(
        &self,
        guild_id: &str,
        node: &dyn RemoteNode,
    ) -> PlayerResult<bool> {
        let voice = match self.voice_state(guild_id) {
            Some(voice) => voice,
            None => {
                info!("guild {} is still waiting for the other voice half", guild_id);
                return Ok(false);
            }
        };

        info!("sending voice update for guild {}", guild_id);

        node.update(guild_id, PlayerUpdate::voice(voice)).await?;

        Ok(true)
    }
}
