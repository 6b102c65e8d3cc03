use std::convert::TryFrom;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::PlayerError;

pub const DEFAULT_VOLUME: u16 = 90;

fn default_volume() -> u16 {
    DEFAULT_VOLUME
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    Off = 0,
    Track = 1,
    Queue = 2,
}

impl TryFrom<u8> for LoopMode {
    type Error = PlayerError;

    fn try_from(mode: u8) -> Result<Self, Self::Error> {
        match mode {
            0 => Ok(Self::Off),
            1 => Ok(Self::Track),
            2 => Ok(Self::Queue),
            _ => Err(PlayerError::invalid("mode", format!("{} is not a loop mode (0-2)", mode))),
        }
    }
}

/// The per-guild record kept under the `players` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    #[serde(default)]
    pub text_channel: Option<String>,
    #[serde(default)]
    pub voice_channel: Option<String>,
    #[serde(default)]
    pub auto_play: Option<bool>,
    #[serde(default)]
    pub connected: Option<bool>,
    #[serde(default)]
    pub playing: Option<bool>,
    #[serde(default)]
    pub paused: Option<bool>,
    #[serde(default, rename = "loop")]
    pub loop_mode: Option<u8>,
    #[serde(default = "default_volume")]
    pub volume: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for PlayerRecord {
    fn default() -> Self {
        Self {
            text_channel: None,
            voice_channel: None,
            auto_play: None,
            connected: None,
            playing: None,
            paused: None,
            loop_mode: None,
            volume: DEFAULT_VOLUME,
            node: None,
            extra: Map::new(),
        }
    }
}

impl PlayerRecord {
    /// Applies one field, returning the record for chaining.
    pub fn apply(&mut self, field: PlayerField) -> &mut Self {
        match field {
            PlayerField::TextChannel(v) => self.text_channel = v,
            PlayerField::VoiceChannel(v) => self.voice_channel = v,
            PlayerField::AutoPlay(v) => self.auto_play = v,
            PlayerField::Connected(v) => self.connected = v,
            PlayerField::Playing(v) => self.playing = v,
            PlayerField::Paused(v) => self.paused = v,
            PlayerField::Loop(v) => self.loop_mode = v.map(|mode| mode as u8),
            PlayerField::Volume(v) => self.volume = v,
            PlayerField::Node(v) => self.node = v,
            PlayerField::Other(key, value) => {
                self.extra.insert(key, value);
            }
        }

        self
    }

    /// Options win over what was persisted, unset options keep the persisted value.
    pub(crate) fn overlay(&mut self, options: &PlayerOptions) {
        fn keep<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                *slot = value.clone();
            }
        }

        keep(&mut self.text_channel, &options.text_channel);
        keep(&mut self.voice_channel, &options.voice_channel);
        keep(&mut self.auto_play, &options.auto_play);
        keep(&mut self.connected, &options.connected);
        keep(&mut self.playing, &options.playing);
        keep(&mut self.paused, &options.paused);
        keep(&mut self.loop_mode, &options.loop_mode);
        keep(&mut self.node, &options.node);

        if let Some(volume) = options.volume {
            self.volume = volume;
        }
    }
}

/// A settable field of [`PlayerRecord`] together with its new value.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerField {
    TextChannel(Option<String>),
    VoiceChannel(Option<String>),
    AutoPlay(Option<bool>),
    Connected(Option<bool>),
    Playing(Option<bool>),
    Paused(Option<bool>),
    Loop(Option<LoopMode>),
    Volume(u16),
    Node(Option<String>),
    /// Any key the record does not model.
    Other(String, Value),
}

/// Input used to create a player.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerOptions {
    pub guild_id: String,
    #[serde(default)]
    pub text_channel: Option<String>,
    #[serde(default)]
    pub voice_channel: Option<String>,
    #[serde(default)]
    pub auto_play: Option<bool>,
    #[serde(default)]
    pub connected: Option<bool>,
    #[serde(default)]
    pub playing: Option<bool>,
    #[serde(default)]
    pub paused: Option<bool>,
    #[serde(default, rename = "loop")]
    pub loop_mode: Option<u8>,
    #[serde(default)]
    pub volume: Option<u16>,
    #[serde(default)]
    pub node: Option<String>,
}

impl PlayerOptions {
    pub fn new(guild_id: impl ToString) -> Self {
        Self {
            guild_id: guild_id.to_string(),
            ..Default::default()
        }
    }

    pub fn text_channel(mut self, channel: impl ToString) -> Self {
        self.text_channel = Some(channel.to_string());
        self
    }

    pub fn voice_channel(mut self, channel: impl ToString) -> Self {
        self.voice_channel = Some(channel.to_string());
        self
    }

    pub fn auto_play(mut self, auto_play: bool) -> Self {
        self.auto_play = Some(auto_play);
        self
    }

    pub fn volume(mut self, volume: u16) -> Self {
        self.volume = Some(volume);
        self
    }

    /// Pins the player to a node instead of picking the least loaded one.
    pub fn node(mut self, node: impl ToString) -> Self {
        self.node = Some(node.to_string());
        self
    }
}
