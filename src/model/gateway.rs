use serde::{Deserialize, Serialize};

use super::track::{Exception, RemoteTrack};

/// Every message the node pushes over its websocket.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum NodeMessage {
    Ready(Ready),
    PlayerUpdate(PlayerStateUpdate),
    Stats(Stats),
    Event(NodeEvent),
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Ready {
    pub resumed: bool,
    pub session_id: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStateUpdate {
    pub guild_id: String,
    pub state: State,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct State {
    pub time: u64,
    #[serde(default)]
    pub position: u64,
    pub connected: bool,
    pub ping: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Cpu {
    pub cores: i64,
    pub system_load: f64,
    pub lavalink_load: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FrameStats {
    pub sent: i64,
    pub deficit: i64,
    pub nulled: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Memory {
    pub reservable: i64,
    pub used: i64,
    pub free: i64,
    pub allocated: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub players: i64,
    pub playing_players: i64,
    pub uptime: i64,
    pub memory: Memory,
    pub cpu: Cpu,
    #[serde(default)]
    pub frame_stats: Option<FrameStats>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type")]
pub enum NodeEvent {
    #[serde(rename = "TrackStartEvent")]
    TrackStart(TrackStart),
    #[serde(rename = "TrackEndEvent")]
    TrackEnd(TrackEnd),
    #[serde(rename = "TrackExceptionEvent")]
    TrackException(TrackException),
    #[serde(rename = "TrackStuckEvent")]
    TrackStuck(TrackStuck),
    #[serde(rename = "WebSocketClosedEvent")]
    WebSocketClosed(WebSocketClosed),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TrackStart {
    pub guild_id: String,
    pub track: RemoteTrack,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TrackEndReason {
    Finished,
    LoadFailed,
    Stopped,
    Replaced,
    Cleanup,
}

impl TrackEndReason {
    /// Whether the queue owner would normally advance after this end.
    pub fn may_start_next(&self) -> bool {
        matches!(self, Self::Finished | Self::LoadFailed)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TrackEnd {
    pub guild_id: String,
    pub track: RemoteTrack,
    pub reason: TrackEndReason,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TrackException {
    pub guild_id: String,
    pub track: RemoteTrack,
    pub exception: Exception,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TrackStuck {
    pub guild_id: String,
    pub track: RemoteTrack,
    pub threshold_ms: u64,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketClosed {
    pub guild_id: String,
    pub code: u16,
    pub reason: String,
    pub by_remote: bool,
}
