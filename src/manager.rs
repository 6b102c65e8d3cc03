use async_trait::async_trait;
use dashmap::DashMap;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, warn};
use typemap_rev::TypeMap;

use crate::{
    builder::NodeBuilder,
    error::{ManagerError, ManagerResult},
    events::{DefaultHandler, EventHandler, SessionSync},
    model::{
        gateway::{NodeEvent, NodeMessage},
        player::{PlayerField, PlayerOptions},
    },
    node::{Node, RemoteNode},
    player::Player,
    queue::{QueueProvider, StoreQueueProvider},
    store::{MemoryStore, Repository, StateStore},
    voice::{GatewayPacket, VoiceDispatcher, VoiceRegistry, VoiceServerData, VoiceStateData},
};

pub type SharedPlayer = Arc<Mutex<Player>>;

/// Everything a player needs from its manager.
pub struct ManagerContext {
    pub(crate) bot_id: String,
    pub(crate) repository: Repository,
    pub(crate) dispatcher: Arc<dyn VoiceDispatcher>,
    pub(crate) nodes: DashMap<String, Arc<dyn RemoteNode>>,
    pub(crate) voice: VoiceRegistry,
    pub(crate) queues: Arc<dyn QueueProvider>,
}

impl ManagerContext {
    pub(crate) fn new(
        bot_id: impl ToString,
        store: Arc<dyn StateStore>,
        dispatcher: Arc<dyn VoiceDispatcher>,
        queues: Arc<dyn QueueProvider>,
    ) -> Self {
        Self {
            bot_id: bot_id.to_string(),
            repository: Repository::new(store),
            dispatcher,
            nodes: DashMap::new(),
            voice: VoiceRegistry::new(),
            queues,
        }
    }

    pub fn bot_id(&self) -> &str {
        &self.bot_id
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn voice(&self) -> &VoiceRegistry {
        &self.voice
    }

    pub(crate) fn register_node(&self, id: impl ToString, node: Arc<dyn RemoteNode>) {
        let id = id.to_string();

        info!("Node {} added to manager successfully", id);

        self.nodes.insert(id, node);
    }
}

#[non_exhaustive]
pub struct Manager {
    pub context: Arc<ManagerContext>,
    pub players: Arc<DashMap<String, SharedPlayer>>,
    pub shared_data: Arc<RwLock<TypeMap>>,
    nodes: DashMap<String, Arc<Node>>,
}

impl Manager {
    pub fn builder(
        bot_id: impl ToString,
        dispatcher: impl VoiceDispatcher + 'static,
    ) -> ManagerBuilder {
        ManagerBuilder::new(bot_id, dispatcher)
    }

    fn new(builder: ManagerBuilder) -> ManagerResult<Arc<Self>> {
        let context = Arc::new(ManagerContext::new(
            &builder.bot_id,
            builder.store,
            builder.dispatcher,
            builder.queues,
        ));
        let players: Arc<DashMap<String, SharedPlayer>> = Arc::new(DashMap::new());

        let sync: Arc<dyn SessionSync> = Arc::new(SessionEvents {
            players: Arc::clone(&players),
        });
        let handler = builder.event_handler;

        for (id, node) in builder.remote_nodes {
            context.register_node(id, node);
        }

        let nodes = DashMap::new();

        for mut node in builder.nodes {
            node.set_user_id(&builder.bot_id);

            let node = node.build()?;
            let id = node.id().to_string();

            Node::run(
                Arc::clone(&node),
                Arc::clone(&sync),
                Arc::clone(&handler),
                builder.reconnect_attempts,
            );

            context.register_node(&id, Arc::clone(&node) as Arc<dyn RemoteNode>);
            nodes.insert(id, node);
        }

        Ok(Arc::new(Self {
            context,
            players,
            shared_data: Arc::new(RwLock::new(builder.data)),
            nodes,
        }))
    }

    pub fn bot_id(&self) -> &str {
        self.context.bot_id()
    }

    /// A websocket node by identifier, for searching tracks or reading stats.
    pub fn node(&self, id: &str) -> ManagerResult<Arc<Node>> {
        self.nodes
            .get(id)
            .map(|item| Arc::clone(item.value()))
            .ok_or_else(|| ManagerError::NodeNotFound(id.to_string()))
    }

    /// Identifiers of every registered node, sorted.
    pub fn node_ids(&self) -> Vec<String> {
        let mut ids = self
            .context
            .nodes
            .iter()
            .map(|item| item.key().clone())
            .collect::<Vec<_>>();

        ids.sort();
        ids
    }

    /// The node with fewer persisted players, ties go to the smallest identifier.
    pub fn get_best(&self) -> ManagerResult<String> {
        let mut counts: HashMap<String, usize> =
            self.node_ids().into_iter().map(|id| (id, 0)).collect();

        for (_, record) in self.context.repository.players() {
            if let Some(node) = record.node {
                if let Some(count) = counts.get_mut(&node) {
                    *count += 1;
                }
            }
        }

        counts
            .into_iter()
            .min_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)))
            .map(|(id, _)| id)
            .ok_or(ManagerError::NoNodes)
    }

    /// Returns the guild's player, creating it when there is none or the previous
    /// one was destroyed.
    pub fn create_player(&self, options: PlayerOptions) -> ManagerResult<SharedPlayer> {
        if let Some(player) = self.get_player(&options.guild_id) {
            // A player locked by a running command is kept.
            let destroyed = player.try_lock().map(|p| p.is_destroyed()).unwrap_or(false);

            if !destroyed {
                return Ok(player);
            }

            debug!("Replacing destroyed player of guild {}", options.guild_id);
        }

        let mut options = options;

        if options.node.is_none() {
            options.node = self
                .context
                .repository
                .player(&options.guild_id)
                .and_then(|record| record.node)
                .filter(|node| self.context.nodes.contains_key(node));
        }

        if options.node.is_none() {
            options.node = Some(self.get_best()?);
        }

        let guild_id = options.guild_id.clone();
        let player = Arc::new(Mutex::new(Player::new(options, Arc::clone(&self.context))?));

        info!("Created player for guild {}", guild_id);

        self.players.insert(guild_id, Arc::clone(&player));

        Ok(player)
    }

    pub fn get_player(&self, guild_id: &str) -> Option<SharedPlayer> {
        self.players.get(guild_id).map(|item| Arc::clone(item.value()))
    }

    /// Drops the manager's handle, call after `Player::destroy`.
    pub fn remove_player(&self, guild_id: &str) -> Option<SharedPlayer> {
        self.context.voice.forget(guild_id);
        self.players.remove(guild_id).map(|(_, player)| player)
    }

    /// Rebuilds a player for every persisted record, returns how many were restored.
    ///
    /// Records whose node is not registered anymore move to the least loaded one.
    pub fn restore_players(&self) -> usize {
        let mut restored = 0;

        for (guild_id, _) in self.context.repository.players() {
            match self.create_player(PlayerOptions::new(&guild_id)) {
                Ok(_) => restored += 1,
                Err(why) => warn!("Could not restore player for guild {}: {}", guild_id, why),
            }
        }

        restored
    }

    /// Feeds a raw Discord gateway packet. Only voice packets are looked at.
    pub async fn packet_update(&self, packet: &GatewayPacket) -> ManagerResult<()> {
        match packet.t.as_deref() {
            Some("VOICE_STATE_UPDATE") => {
                let state: VoiceStateData = serde_json::from_value(packet.d.clone())?;

                if state.user_id != self.context.bot_id {
                    return Ok(());
                }

                let guild_id = match state.guild_id {
                    Some(id) => id,
                    None => return Ok(()),
                };

                if state.channel_id.is_none() {
                    debug!("Bot left voice in guild {}", guild_id);

                    self.context.voice.forget(&guild_id);

                    if let Some(player) = self.get_player(&guild_id) {
                        player.lock().await.set(PlayerField::Connected(Some(false)));
                    }

                    return Ok(());
                }

                self.context.voice.state_update(&guild_id, &state.session_id);

                if let Some(player) = self.get_player(&guild_id) {
                    let mut player = player.lock().await;

                    player.set(PlayerField::VoiceChannel(state.channel_id.clone()));
                    player.set(PlayerField::Connected(Some(true)));
                }

                self.attempt_connection(&guild_id).await
            }
            Some("VOICE_SERVER_UPDATE") => {
                let server: VoiceServerData = serde_json::from_value(packet.d.clone())?;

                let endpoint = match server.endpoint {
                    Some(endpoint) => endpoint,
                    None => {
                        debug!("Voice server for guild {} is not allocated yet", server.guild_id);
                        return Ok(());
                    }
                };

                self.context.voice.server_update(&server.guild_id, &server.token, endpoint);

                self.attempt_connection(&server.guild_id).await
            }
            _ => Ok(()),
        }
    }

    async fn attempt_connection(&self, guild_id: &str) -> ManagerResult<()> {
        let node = match self.get_player(guild_id) {
            Some(player) => player.lock().await.node(),
            None => return Ok(()),
        };

        self.context.voice.attempt_connection(guild_id, node.as_ref()).await?;

        Ok(())
    }
}

impl typemap_rev::TypeMapKey for Manager {
    type Value = Arc<Manager>;
}

/// Keeps sessions in line with what the node reports.
///
/// Destroyed players are skipped, they are waiting to be replaced or removed.
struct SessionEvents {
    players: Arc<DashMap<String, SharedPlayer>>,
}

impl SessionEvents {
    async fn live_player(&self, guild_id: &str) -> Option<OwnedMutexGuard<Player>> {
        let player = self.players.get(guild_id).map(|item| Arc::clone(item.value()))?;
        let player = player.lock_owned().await;

        if player.is_destroyed() {
            debug!("Ignoring node event for destroyed player of guild {}", guild_id);
            return None;
        }

        Some(player)
    }
}

#[async_trait]
impl SessionSync for SessionEvents {
    async fn apply(&self, message: &NodeMessage) {
        match message {
            NodeMessage::PlayerUpdate(update) => {
                if let Some(mut player) = self.live_player(&update.guild_id).await {
                    player.sync_position(update.state.position);
                }
            }
            NodeMessage::Event(NodeEvent::TrackStart(event)) => {
                if let Some(mut player) = self.live_player(&event.guild_id).await {
                    player.set(PlayerField::Playing(Some(true)));
                    player.set(PlayerField::Paused(Some(false)));
                }
            }
            NodeMessage::Event(NodeEvent::TrackEnd(event)) => {
                if let Some(mut player) = self.live_player(&event.guild_id).await {
                    player.set(PlayerField::Playing(Some(false)));
                }
            }
            _ => (),
        }
    }
}

pub struct ManagerBuilder {
    pub bot_id: String,
    pub dispatcher: Arc<dyn VoiceDispatcher>,
    pub store: Arc<dyn StateStore>,
    pub queues: Arc<dyn QueueProvider>,
    pub event_handler: Arc<dyn EventHandler>,
    pub nodes: Vec<NodeBuilder>,
    pub remote_nodes: Vec<(String, Arc<dyn RemoteNode>)>,
    pub data: TypeMap,
    pub reconnect_attempts: u8,
}

impl ManagerBuilder {
    pub fn new(bot_id: impl ToString, dispatcher: impl VoiceDispatcher + 'static) -> Self {
        Self {
            bot_id: bot_id.to_string(),
            dispatcher: Arc::new(dispatcher),
            store: Arc::new(MemoryStore::new()),
            queues: Arc::new(StoreQueueProvider),
            event_handler: Arc::new(DefaultHandler),
            nodes: Vec::new(),
            remote_nodes: Vec::new(),
            data: TypeMap::new(),
            reconnect_attempts: 5,
        }
    }

    pub fn add_node<F>(&mut self, func: F) -> &mut Self
    where
        F: FnOnce(&mut NodeBuilder) -> &mut NodeBuilder,
    {
        let mut builder = NodeBuilder::default();

        func(&mut builder);

        self.nodes.push(builder);

        self
    }

    /// Registers an already built node client under `id`. No websocket is run for it.
    pub fn register_node(&mut self, id: impl ToString, node: Arc<dyn RemoteNode>) -> &mut Self {
        self.remote_nodes.push((id.to_string(), node));

        self
    }

    pub fn store(&mut self, store: Arc<dyn StateStore>) -> &mut Self {
        self.store = store;

        self
    }

    pub fn queue_provider(&mut self, provider: impl QueueProvider + 'static) -> &mut Self {
        self.queues = Arc::new(provider);

        self
    }

    pub fn event_handler<H: EventHandler + 'static>(&mut self, handler: H) -> &mut Self {
        self.event_handler = Arc::new(handler);

        self
    }

    pub fn reconnect_attempts(&mut self, attempts: u8) -> &mut Self {
        self.reconnect_attempts = attempts;

        self
    }

    pub fn data_ref(&mut self) -> &mut TypeMap {
        &mut self.data
    }

    /// Spawns the websocket of every node added with [`Self::add_node`], so it has
    /// to be called inside a tokio runtime when there are any.
    pub fn build(self) -> ManagerResult<Arc<Manager>> {
        Manager::new(self)
    }
}

#[cfg(test)]
mod tests;
