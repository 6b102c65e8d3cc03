use async_trait::async_trait;
use tracing::info_span;
use tracing_futures::Instrument;

use crate::{
    model::gateway::*,
    node::Node,
};
use std::sync::Arc;

#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// The node accepted the websocket and handed out a session id.
    async fn ready(&self, _node: Arc<Node>, _event: Ready) {}
    /// Periodic event that returns the statistics of the server.
    async fn stats(&self, _node: Arc<Node>, _event: Stats) {}
    /// Event that triggers when a player updates.
    async fn player_update(&self, _node: Arc<Node>, _event: PlayerStateUpdate) {}
    /// Event that triggers when a track starts playing.
    async fn track_start(&self, _node: Arc<Node>, _event: TrackStart) {}
    /// Event that triggers when a track finishes playing.
    async fn track_end(&self, _node: Arc<Node>, _event: TrackEnd) {}
    /// Event triggered when there is an exception playing the track
    async fn track_exception(&self, _node: Arc<Node>, _event: TrackException) {}
    /// Event triggered when a track stops sending audio
    async fn track_stuck(&self, _node: Arc<Node>, _event: TrackStuck) {}
    ///Event triggered when an audio web socket is disconnected from discord
    async fn socket_closed(&self, _node: Arc<Node>, _event: WebSocketClosed) {}
}

/// Handler used when the manager is built without one.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHandler;

impl EventHandler for DefaultHandler {}

/// State the manager keeps in line with node messages.
///
/// Applied by the websocket loop itself, one message at a time in the order they
/// arrive, before the user handler gets its own task.
#[async_trait]
pub(crate) trait SessionSync: Send + Sync + 'static {
    async fn apply(&self, message: &NodeMessage);
}

pub(crate) async fn dispatch(
    node: Arc<Node>,
    handler: &dyn EventHandler,
    message: NodeMessage,
) {
    match message {
        NodeMessage::Ready(e) => handler.ready(node, e).await,
        NodeMessage::Stats(e) => handler.stats(node, e).await,
        NodeMessage::PlayerUpdate(e) => handler.player_update(node, e).await,
        NodeMessage::Event(NodeEvent::TrackStart(e)) => handler.track_start(node, e).await,
        NodeMessage::Event(NodeEvent::TrackEnd(e)) => handler.track_end(node, e).await,
        NodeMessage::Event(NodeEvent::TrackException(e)) => {
            handler.track_exception(node, e).await
        }
        NodeMessage::Event(NodeEvent::TrackStuck(e)) => handler.track_stuck(node, e).await,
        NodeMessage::Event(NodeEvent::WebSocketClosed(e)) => {
            handler.socket_closed(node, e).await
        }
    }
}

pub(crate) fn process(node: Arc<Node>, handler: Arc<dyn EventHandler>, message: NodeMessage) {
    let span = info_span!("node_event", node = %node.id());

    tokio::spawn(
        async move {
            dispatch(node, handler.as_ref(), message).await;
        }
        .instrument(span),
    );
}
