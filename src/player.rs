//! Per-guild playback session.
//!
//! A [`Player`] keeps three stores in step: its own fields, the persisted
//! `players`/`current`/queue records, and the player on the node. The rules are:
//!
//! * every field change goes through [`Player::set`], which writes the whole
//!   record through to the store before returning;
//! * `current` is always written to the store and to the player together;
//! * commands that move tracks (`play`, `skip_to`, `shuffle`) persist the queue
//!   before calling the node, so a failed call leaves the queue already advanced
//!   and the next `play`/`restart` picks up from there;
//! * `pause`, `resume` and `set_volume` call the node first and only commit once
//!   it accepted, so a failed call changes nothing locally.
//!
//! All argument checks happen before anything is written or sent. Once
//! [`Player::destroy`] ran the player never writes its record or current track
//! to the store again, so late node events cannot bring the guild back.

use serde_json::{json, Value};
use std::{convert::TryFrom, sync::Arc};
use tracing::{debug, info, instrument, warn};

use crate::{
    error::{PlayerError, PlayerResult},
    manager::ManagerContext,
    model::{
        events::{PlayerUpdate, VoiceStateUpdate},
        player::{LoopMode, PlayerField, PlayerOptions, PlayerRecord, DEFAULT_VOLUME},
        track::TrackRecord,
    },
    node::RemoteNode,
    queue::TrackQueue,
    store::Repository,
};

/// Highest volume the node accepts.
pub const MAX_VOLUME: u16 = 1000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectOptions {
    pub set_deaf: bool,
    pub set_mute: bool,
}

pub struct Player {
    guild_id: String,
    bot_id: String,
    record: PlayerRecord,
    current: Option<TrackRecord>,
    queue: Box<dyn TrackQueue>,
    node: Arc<dyn RemoteNode>,
    context: Arc<ManagerContext>,
    destroyed: bool,
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("guild_id", &self.guild_id)
            .field("record", &self.record)
            .field("current", &self.current)
            .field("destroyed", &self.destroyed)
            .finish()
    }
}

impl Player {
    /// Builds the session, resuming from whatever the store holds for the guild.
    ///
    /// Options that are set override the persisted record, the rest is taken from
    /// it. Fails when the record points at a node the manager does not know.
    pub fn new(options: PlayerOptions, context: Arc<ManagerContext>) -> PlayerResult<Self> {
        if options.guild_id.is_empty() {
            return Err(PlayerError::invalid("guildId", "option is empty"));
        }

        if let Some(mode) = options.loop_mode {
            LoopMode::try_from(mode)?;
        }

        let guild_id = options.guild_id.clone();
        let repository = &context.repository;

        let mut record = repository.player(&guild_id).unwrap_or_default();
        record.overlay(&options);

        let node_id = record
            .node
            .clone()
            .ok_or_else(|| PlayerError::NodeNotFound(String::from("<unassigned>")))?;
        let node = context
            .nodes
            .get(&node_id)
            .map(|item| Arc::clone(item.value()))
            .ok_or(PlayerError::NodeNotFound(node_id))?;

        let current = repository.current(&guild_id);
        let queue = context
            .queues
            .queue(&context.bot_id, &guild_id, Arc::clone(repository.store()));

        let player = Self {
            guild_id,
            bot_id: context.bot_id.clone(),
            record,
            current,
            queue,
            node,
            context,
            destroyed: false,
        };

        player.update_players();

        Ok(player)
    }

    fn repository(&self) -> &Repository {
        &self.context.repository
    }

    fn update_players(&self) {
        if self.destroyed {
            return;
        }

        self.repository().put_player(&self.guild_id, &self.record);
    }

    /// Whether [`Self::destroy`] ran. A destroyed player keeps its in-memory state
    /// but stops persisting it.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Applies `field` and writes the whole record to the store.
    pub fn set(&mut self, field: PlayerField) {
        self.record.apply(field);
        self.update_players();
    }

    /// Refresh-then-read: commits the record to the store, then returns `key` from it.
    ///
    /// The store is shared, so anything written to this guild's record from outside
    /// is replaced by this player's view first. Absent and `null` values are `None`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.update_players();

        match serde_json::to_value(&self.record) {
            Ok(Value::Object(mut map)) => map.remove(key).filter(|value| !value.is_null()),
            _ => None,
        }
    }

    /// Refresh-then-read of the whole record.
    pub fn record(&self) -> &PlayerRecord {
        self.update_players();

        &self.record
    }

    pub fn guild_id(&self) -> &str {
        &self.guild_id
    }

    pub fn bot_id(&self) -> &str {
        &self.bot_id
    }

    pub fn node_id(&self) -> Option<&str> {
        self.record.node.as_deref()
    }

    pub(crate) fn node(&self) -> Arc<dyn RemoteNode> {
        Arc::clone(&self.node)
    }

    pub fn text_channel(&self) -> Option<&str> {
        self.record.text_channel.as_deref()
    }

    pub fn voice_channel(&self) -> Option<&str> {
        self.record.voice_channel.as_deref()
    }

    pub fn auto_play(&self) -> Option<bool> {
        self.record.auto_play
    }

    pub fn connected(&self) -> bool {
        self.record.connected.unwrap_or(false)
    }

    pub fn playing(&self) -> bool {
        self.record.playing.unwrap_or(false)
    }

    pub fn paused(&self) -> bool {
        self.record.paused.unwrap_or(false)
    }

    pub fn loop_mode(&self) -> Option<LoopMode> {
        self.record.loop_mode.and_then(|mode| LoopMode::try_from(mode).ok())
    }

    pub fn volume(&self) -> u16 {
        self.record.volume
    }

    pub fn current(&self) -> Option<&TrackRecord> {
        self.current.as_ref()
    }

    pub fn queue(&self) -> &dyn TrackQueue {
        self.queue.as_ref()
    }

    pub fn set_text_channel(&mut self, channel_id: &str) -> PlayerResult<bool> {
        if channel_id.is_empty() {
            return Err(PlayerError::invalid("channelId", "option is empty"));
        }

        self.set(PlayerField::TextChannel(Some(channel_id.to_string())));
        Ok(true)
    }

    pub fn set_voice_channel(&mut self, channel_id: &str) -> PlayerResult<bool> {
        if channel_id.is_empty() {
            return Err(PlayerError::invalid("channelId", "option is empty"));
        }

        self.set(PlayerField::VoiceChannel(Some(channel_id.to_string())));
        Ok(true)
    }

    pub fn set_auto_play(&mut self, mode: bool) -> bool {
        self.set(PlayerField::AutoPlay(Some(mode)));
        mode
    }

    fn send_voice_state(&self, channel_id: Option<String>, self_mute: bool, self_deaf: bool) {
        let payload = VoiceStateUpdate::new(&self.guild_id, channel_id, self_mute, self_deaf);

        match serde_json::to_string(&payload) {
            Ok(payload) => self.context.dispatcher.dispatch(&self.guild_id, payload),
            Err(why) => warn!(
                "Failed to serialize voice state for guild {}: {}",
                self.guild_id, why
            ),
        }
    }

    /// Asks the gateway to join the configured voice channel. Does not wait for
    /// Discord to confirm, that arrives through `Manager::packet_update`.
    pub fn connect(&mut self, options: ConnectOptions) -> bool {
        self.set(PlayerField::Connected(Some(true)));

        let channel_id = self.record.voice_channel.clone();

        self.send_voice_state(channel_id, options.set_mute, options.set_deaf);

        true
    }

    pub fn disconnect(&mut self) -> bool {
        self.set(PlayerField::Connected(Some(false)));
        self.set(PlayerField::VoiceChannel(None));

        self.send_voice_state(None, false, false);

        true
    }

    fn commit_current(&mut self, track: TrackRecord) {
        if !self.destroyed {
            self.repository().put_current(&self.guild_id, &track);
        }

        self.current = Some(track);
    }

    /// Mirrors the position the node reported into `current`.
    pub(crate) fn sync_position(&mut self, position: u64) {
        if self.destroyed {
            return;
        }

        if let Some(current) = self.current.as_mut() {
            current.position = position;
            self.context.repository.set_current_position(&self.guild_id, position);
        }
    }

    /// Puts the node back in the state this player remembers, after the node lost
    /// its session. Remote failures are returned.
    #[instrument(skip(self), fields(guild_id = %self.guild_id))]
    pub async fn restart(&mut self) -> PlayerResult<()> {
        if self.current.is_none() && self.queue.is_empty() {
            return Ok(());
        }

        if self.current.is_none() {
            self.play().await?;
        }

        let Some(current) = &self.current else {
            return Err(PlayerError::NoCurrentTrack);
        };
        let update =
            PlayerUpdate::resume_at(current.encoded.clone(), current.position, self.record.volume);

        self.context
            .voice
            .attempt_connection(&self.guild_id, self.node.as_ref())
            .await?;

        info!("Restarting playback for guild {}", self.guild_id);

        self.node.update(&self.guild_id, update).await
    }

    /// Pops the queue head and plays it. Does nothing on an empty queue.
    #[instrument(skip(self), fields(guild_id = %self.guild_id))]
    pub async fn play(&mut self) -> PlayerResult<()> {
        if self.queue.is_empty() {
            return Ok(());
        }

        let mut tracks = self.queue.all();

        if tracks.is_empty() {
            return Ok(());
        }

        let track = tracks.remove(0);
        let encoded = track.encoded.clone();

        self.commit_current(track);
        self.queue.replace_all(tracks);

        debug!("Playing next track on guild {}", self.guild_id);

        self.node
            .update(&self.guild_id, PlayerUpdate::play(encoded, self.record.volume))
            .await
    }

    /// No remote call when already paused.
    pub async fn pause(&mut self) -> PlayerResult<bool> {
        if self.paused() {
            return Ok(true);
        }

        self.update_playback_status(true).await?;
        Ok(true)
    }

    /// No remote call when already playing.
    pub async fn resume(&mut self) -> PlayerResult<bool> {
        if self.playing() {
            return Ok(true);
        }

        self.update_playback_status(false).await?;
        Ok(true)
    }

    async fn update_playback_status(&mut self, paused: bool) -> PlayerResult<()> {
        self.node.update(&self.guild_id, PlayerUpdate::pause(paused)).await?;

        self.set(PlayerField::Paused(Some(paused)));
        self.set(PlayerField::Playing(Some(!paused)));

        Ok(())
    }

    fn clear_session_data(&mut self) {
        self.repository().remove_player(&self.guild_id);

        self.set(PlayerField::Connected(Some(false)));
        self.set(PlayerField::VoiceChannel(None));
    }

    /// Stops the node only when nothing is queued. With tracks left the session is
    /// cleared but the node keeps playing, the caller is expected to advance.
    pub async fn stop(&mut self) -> PlayerResult<bool> {
        if self.queue.is_empty() {
            self.node.update(&self.guild_id, PlayerUpdate::stop()).await?;
        }

        self.clear_session_data();

        Ok(true)
    }

    /// Plays the next track, or destroys the session when the queue is empty.
    /// Returns whether a track was skipped to.
    pub async fn skip(&mut self) -> PlayerResult<bool> {
        if self.queue.is_empty() {
            self.destroy().await?;
            return Ok(false);
        }

        self.play().await?;
        Ok(true)
    }

    pub async fn set_volume(&mut self, percent: u16) -> PlayerResult<u16> {
        if percent > MAX_VOLUME {
            return Err(PlayerError::invalid(
                "percent",
                format!("{} is above the maximum of {}", percent, MAX_VOLUME),
            ));
        }

        if !self.playing() {
            return Err(PlayerError::NotPlaying);
        }

        self.node.update(&self.guild_id, PlayerUpdate::volume(percent)).await?;

        self.repository().merge_player(&self.guild_id, json!({ "volume": percent }));
        self.record.volume = percent;

        Ok(percent)
    }

    /// Loop enforcement lives with whoever handles track ends, this only records it.
    pub fn set_loop(&mut self, mode: u8) -> PlayerResult<LoopMode> {
        let mode = LoopMode::try_from(mode)?;

        self.set(PlayerField::Loop(Some(mode)));

        Ok(mode)
    }

    /// Tears the session down on the node and in the store.
    ///
    /// Local cleanup runs even when the node rejects the destroy, the node error is
    /// returned afterwards.
    #[instrument(skip(self), fields(guild_id = %self.guild_id))]
    pub async fn destroy(&mut self) -> PlayerResult<bool> {
        if self.connected() {
            self.disconnect();
        }

        let result = self.node.destroy(&self.guild_id).await;

        if let Err(why) = &result {
            warn!("Node failed to destroy player for guild {}: {}", self.guild_id, why);
        }

        self.queue.clear();
        self.repository().remove_player(&self.guild_id);
        self.repository().remove_current(&self.guild_id);
        self.current = None;
        self.destroyed = true;

        info!("Destroyed player for guild {}", self.guild_id);

        result.map(|_| true)
    }

    pub async fn seek(&mut self, position: u64) -> PlayerResult<u64> {
        let current = self.current.as_ref().ok_or(PlayerError::NoCurrentTrack)?;

        if position >= current.duration {
            return Err(PlayerError::SeekOutOfRange {
                position,
                duration: current.duration,
            });
        }

        if !current.is_seekable && current.is_stream {
            return Err(PlayerError::NotSeekable);
        }

        self.node.update(&self.guild_id, PlayerUpdate::seek(position)).await?;

        Ok(position)
    }

    /// Jumps to the 1-based `position` in the queue, removing only that track.
    ///
    /// The node volume is reset to the default here, not to the player's volume.
    pub async fn skip_to(&mut self, position: usize) -> PlayerResult<bool> {
        let mut tracks = self.queue.all();

        if tracks.is_empty() {
            return Err(PlayerError::EmptyQueue);
        }

        if position == 0 || position > tracks.len() {
            return Err(PlayerError::QueuePositionOutOfRange {
                position,
                size: tracks.len(),
            });
        }

        let track = tracks.remove(position - 1);
        let encoded = track.encoded_track().map(str::to_string);

        self.commit_current(track);
        self.queue.replace_all(tracks);

        self.node
            .update(&self.guild_id, PlayerUpdate::play(encoded, DEFAULT_VOLUME))
            .await?;

        Ok(true)
    }

    pub fn shuffle(&mut self) -> PlayerResult<bool> {
        if self.queue.is_empty() {
            return Err(PlayerError::EmptyQueue);
        }

        self.queue.shuffle();

        Ok(true)
    }
}
