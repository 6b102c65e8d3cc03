use std::sync::Arc;

use rand::seq::SliceRandom;

use crate::{
    model::track::TrackRecord,
    store::{Repository, StateStore},
};

/// Ordered pending tracks of one guild.
///
/// Only `all`, `replace_all` and `clear` are required, the rest is built on them so
/// that every mutation ends in a single whole-list write.
pub trait TrackQueue: Send + Sync {
    /// Snapshot of every queued track, head first.
    fn all(&self) -> Vec<TrackRecord>;

    fn replace_all(&self, tracks: Vec<TrackRecord>);

    fn clear(&self);

    fn size(&self) -> usize {
        self.all().len()
    }

    fn is_empty(&self) -> bool {
        self.size() == 0
    }

    fn push(&self, track: TrackRecord) {
        let mut tracks = self.all();
        tracks.push(track);
        self.replace_all(tracks);
    }

    fn extend(&self, new: Vec<TrackRecord>) {
        let mut tracks = self.all();
        tracks.extend(new);
        self.replace_all(tracks);
    }

    /// Removes the track at a zero based index.
    fn remove(&self, index: usize) -> Option<TrackRecord> {
        let mut tracks = self.all();

        if index >= tracks.len() {
            return None;
        }

        let track = tracks.remove(index);
        self.replace_all(tracks);
        Some(track)
    }

    /// Uniform in-place permutation (Fisher-Yates).
    fn shuffle(&self) {
        let mut tracks = self.all();
        tracks.shuffle(&mut rand::thread_rng());
        self.replace_all(tracks);
    }
}

/// Creates the queue a player works with.
pub trait QueueProvider: Send + Sync {
    fn queue(
        &self,
        bot_id: &str,
        guild_id: &str,
        store: Arc<dyn StateStore>,
    ) -> Box<dyn TrackQueue>;
}

/// Queue persisted under `{bot_id}.queue.{guild_id}`.
#[derive(Clone)]
pub struct StoreQueue {
    bot_id: String,
    guild_id: String,
    repository: Repository,
}

impl StoreQueue {
    pub fn new(bot_id: impl ToString, guild_id: impl ToString, store: Arc<dyn StateStore>) -> Self {
        Self {
            bot_id: bot_id.to_string(),
            guild_id: guild_id.to_string(),
            repository: Repository::new(store),
        }
    }
}

impl TrackQueue for StoreQueue {
    fn all(&self) -> Vec<TrackRecord> {
        self.repository.queue(&self.bot_id, &self.guild_id)
    }

    fn replace_all(&self, tracks: Vec<TrackRecord>) {
        self.repository.put_queue(&self.bot_id, &self.guild_id, &tracks);
    }

    fn clear(&self) {
        self.repository.delete_queue(&self.bot_id, &self.guild_id);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StoreQueueProvider;

impl QueueProvider for StoreQueueProvider {
    fn queue(
        &self,
        bot_id: &str,
        guild_id: &str,
        store: Arc<dyn StateStore>,
    ) -> Box<dyn TrackQueue> {
        Box::new(StoreQueue::new(bot_id, guild_id, store))
    }
}
