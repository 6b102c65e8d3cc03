//! Persisted state shared by every player of a manager.
//!
//! The layout is a handful of JSON values under string keys:
//!
//! * `players`: object of `guild_id -> PlayerRecord`
//! * `current`: object of `guild_id -> TrackRecord`
//! * `{bot_id}.queue.{guild_id}`: array of `TrackRecord`
//!
//! [`StateStore`] is the raw key/value contract, [`Repository`] is the typed
//! access players go through.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use tracing::{error, warn};

use crate::model::{merge, player::PlayerRecord, track::TrackRecord};

pub const PLAYERS_KEY: &str = "players";
pub const CURRENT_KEY: &str = "current";

pub fn queue_key(bot_id: &str, guild_id: &str) -> String {
    format!("{}.queue.{}", bot_id, guild_id)
}

/// Key/value storage with whole-value replacement. Last write wins per key.
pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    fn set(&self, key: &str, value: Value);

    fn delete(&self, key: &str);

    /// Read-modify-write of one key. Implementations backed by something that can
    /// lock a single key should override this so concurrent updates are not lost.
    fn update(&self, key: &str, f: &mut dyn FnMut(&mut Value)) {
        let mut value = self.get(key).unwrap_or(Value::Null);
        f(&mut value);
        self.set(key, value);
    }
}

/// In-process store, the default when the manager is not given one.
#[derive(Debug, Default)]
pub struct MemoryStore {
    map: DashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.map.get(key).map(|item| item.value().clone())
    }

    fn set(&self, key: &str, value: Value) {
        self.map.insert(key.to_string(), value);
    }

    fn delete(&self, key: &str) {
        self.map.remove(key);
    }

    fn update(&self, key: &str, f: &mut dyn FnMut(&mut Value)) {
        let mut entry = self.map.entry(key.to_string()).or_insert(Value::Null);

        f(entry.value_mut());
    }
}

fn encode<T: Serialize>(key: &str, value: &T) -> Option<Value> {
    match serde_json::to_value(value) {
        Ok(v) => Some(v),
        Err(why) => {
            error!("Failed to serialize value for `{}`: {}", key, why);
            None
        }
    }
}

fn decode<T: DeserializeOwned>(key: &str, value: Value) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(v) => Some(v),
        Err(why) => {
            warn!("Ignoring malformed persisted value under `{}`: {}", key, why);
            None
        }
    }
}

/// Typed, per-entity view over a [`StateStore`].
#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn StateStore>,
}

impl Repository {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    fn entry<T: DeserializeOwned>(&self, namespace: &str, guild_id: &str) -> Option<T> {
        let value = self.store.get(namespace)?.get(guild_id)?.clone();

        if value.is_null() {
            return None;
        }

        decode(namespace, value)
    }

    fn with_namespace<F>(&self, namespace: &str, f: F)
    where
        F: FnOnce(&mut Map<String, Value>),
    {
        let mut f = Some(f);

        self.store.update(namespace, &mut |value| {
            if !value.is_object() {
                *value = Value::Object(Map::new());
            }

            if let (Some(map), Some(f)) = (value.as_object_mut(), f.take()) {
                f(map);
            }
        });
    }

    fn put_entry<T: Serialize>(&self, namespace: &str, guild_id: &str, value: &T) {
        if let Some(value) = encode(namespace, value) {
            self.with_namespace(namespace, |map| {
                map.insert(guild_id.to_string(), value);
            });
        }
    }

    fn remove_entry(&self, namespace: &str, guild_id: &str) {
        self.with_namespace(namespace, |map| {
            map.remove(guild_id);
        });
    }

    pub fn player(&self, guild_id: &str) -> Option<PlayerRecord> {
        self.entry(PLAYERS_KEY, guild_id)
    }

    /// Every persisted player record, sorted by guild id.
    pub fn players(&self) -> Vec<(String, PlayerRecord)> {
        let map = match self.store.get(PLAYERS_KEY) {
            Some(Value::Object(map)) => map,
            _ => return Vec::new(),
        };

        let mut players = map
            .into_iter()
            .filter_map(|(guild_id, value)| {
                decode(PLAYERS_KEY, value).map(|record| (guild_id, record))
            })
            .collect::<Vec<_>>();

        players.sort_by(|a, b| a.0.cmp(&b.0));
        players
    }

    pub fn put_player(&self, guild_id: &str, record: &PlayerRecord) {
        self.put_entry(PLAYERS_KEY, guild_id, record);
    }

    /// Merges `patch` into the persisted record, leaving its other keys alone.
    pub fn merge_player(&self, guild_id: &str, patch: Value) {
        self.with_namespace(PLAYERS_KEY, |map| {
            let entry = map
                .entry(guild_id.to_string())
                .or_insert_with(|| Value::Object(Map::new()));

            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }

            merge(entry, patch);
        });
    }

    pub fn remove_player(&self, guild_id: &str) {
        self.remove_entry(PLAYERS_KEY, guild_id);
    }

    pub fn current(&self, guild_id: &str) -> Option<TrackRecord> {
        self.entry(CURRENT_KEY, guild_id)
    }

    pub fn put_current(&self, guild_id: &str, track: &TrackRecord) {
        self.put_entry(CURRENT_KEY, guild_id, track);
    }

    /// Returns false when the guild has no current track.
    pub fn set_current_position(&self, guild_id: &str, position: u64) -> bool {
        let mut found = false;

        self.with_namespace(CURRENT_KEY, |map| {
            if let Some(Value::Object(track)) = map.get_mut(guild_id) {
                track.insert("position".to_string(), Value::from(position));
                found = true;
            }
        });

        found
    }

    pub fn remove_current(&self, guild_id: &str) {
        self.remove_entry(CURRENT_KEY, guild_id);
    }

    pub fn queue(&self, bot_id: &str, guild_id: &str) -> Vec<TrackRecord> {
        let key = queue_key(bot_id, guild_id);

        match self.store.get(&key) {
            Some(value @ Value::Array(_)) => decode(&key, value).unwrap_or_default(),
            Some(Value::Null) | None => Vec::new(),
            Some(_) => {
                warn!("Ignoring non-array queue under `{}`", key);
                Vec::new()
            }
        }
    }

    pub fn put_queue(&self, bot_id: &str, guild_id: &str, tracks: &[TrackRecord]) {
        let key = queue_key(bot_id, guild_id);

        if let Some(value) = encode(&key, &tracks) {
            self.store.set(&key, value);
        }
    }

    pub fn delete_queue(&self, bot_id: &str, guild_id: &str) {
        self.store.delete(&queue_key(bot_id, guild_id));
    }
}
