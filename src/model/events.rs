use serde::{Deserialize, Serialize};

/// Voice credentials the node needs to join the channel itself.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceState {
    pub token: String,
    pub endpoint: String,
    pub session_id: String,
}

/// Partial player update body. Absent fields are left untouched by the node.
///
/// `encoded_track` is doubly optional: `Some(None)` is sent as `null` and stops
/// the player, `None` leaves the playing track alone.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoded_track: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<VoiceState>,
}

impl PlayerUpdate {
    pub fn play(encoded: Option<String>, volume: u16) -> Self {
        Self {
            encoded_track: Some(encoded),
            volume: Some(volume),
            ..Default::default()
        }
    }

    pub fn resume_at(encoded: Option<String>, position: u64, volume: u16) -> Self {
        Self {
            encoded_track: Some(encoded),
            position: Some(position),
            volume: Some(volume),
            ..Default::default()
        }
    }

    pub fn stop() -> Self {
        Self {
            encoded_track: Some(None),
            ..Default::default()
        }
    }

    pub fn pause(paused: bool) -> Self {
        Self {
            paused: Some(paused),
            ..Default::default()
        }
    }

    pub fn volume(volume: u16) -> Self {
        Self {
            volume: Some(volume),
            ..Default::default()
        }
    }

    pub fn seek(position: u64) -> Self {
        Self {
            position: Some(position),
            ..Default::default()
        }
    }

    pub fn voice(voice: VoiceState) -> Self {
        Self {
            voice: Some(voice),
            ..Default::default()
        }
    }
}

/// Gateway op 4, asks Discord to move the bot into (or out of) a voice channel.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct VoiceStateUpdate {
    pub op: u8,
    pub d: VoiceStateUpdateData,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct VoiceStateUpdateData {
    pub guild_id: String,
    pub channel_id: Option<String>,
    pub self_mute: bool,
    pub self_deaf: bool,
}

impl VoiceStateUpdate {
    pub const OP: u8 = 4;

    pub fn new(
        guild_id: impl ToString,
        channel_id: Option<String>,
        self_mute: bool,
        self_deaf: bool,
    ) -> Self {
        Self {
            op: Self::OP,
            d: VoiceStateUpdateData {
                guild_id: guild_id.to_string(),
                channel_id,
                self_mute,
                self_deaf,
            },
        }
    }
}
