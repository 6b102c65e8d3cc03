use super::*;
use crate::{
    error::{PlayerError, PlayerResult},
    model::{
        events::{PlayerUpdate, VoiceState},
        track::TrackRecord,
    },
    store::{StateStore, PLAYERS_KEY},
    voice::MockVoiceDispatcher,
};
use parking_lot::Mutex as SyncMutex;
use serde_json::json;

#[derive(Default)]
struct Recorder {
    updates: SyncMutex<Vec<(String, PlayerUpdate)>>,
}

#[async_trait]
impl RemoteNode for Recorder {
    async fn update(&self, guild_id: &str, data: PlayerUpdate) -> PlayerResult<()> {
        self.updates.lock().push((guild_id.to_string(), data));
        Ok(())
    }

    async fn destroy(&self, _guild_id: &str) -> PlayerResult<()> {
        Ok(())
    }
}

fn manager_with(nodes: &[&str], players: serde_json::Value) -> (Arc<Manager>, Vec<Arc<Recorder>>) {
    let store = Arc::new(MemoryStore::new());
    store.set(PLAYERS_KEY, players);

    let mut builder = Manager::builder("B1", MockVoiceDispatcher::new());
    builder.store(store);

    let recorders = nodes
        .iter()
        .map(|id| {
            let recorder = Arc::new(Recorder::default());
            builder.register_node(*id, Arc::clone(&recorder) as Arc<dyn RemoteNode>);
            recorder
        })
        .collect();

    (builder.build().unwrap(), recorders)
}

fn packet(value: serde_json::Value) -> GatewayPacket {
    serde_json::from_value(value).unwrap()
}

#[test]
fn best_node_has_the_fewest_players() {
    let (manager, _) = manager_with(
        &["b", "a", "c"],
        json!({
            "G1": { "node": "a" },
            "G2": { "node": "a" },
            "G3": { "node": "b" },
            "G4": { "node": "gone" },
        }),
    );

    assert_eq!(manager.node_ids(), vec!["a", "b", "c"]);
    assert_eq!(manager.get_best().unwrap(), "c");
}

#[test]
fn best_node_ties_go_to_smallest_id() {
    let (manager, _) = manager_with(&["b", "a"], json!({}));

    assert_eq!(manager.get_best().unwrap(), "a");
}

#[test]
fn best_node_needs_a_node() {
    let (manager, _) = manager_with(&[], json!({}));

    assert!(matches!(manager.get_best(), Err(ManagerError::NoNodes)));
    assert!(matches!(
        manager.create_player(PlayerOptions::new("G1")),
        Err(ManagerError::NoNodes)
    ));
}

#[tokio::test]
async fn create_player_returns_the_existing_session() {
    let (manager, _) = manager_with(&["main"], json!({}));

    let first = manager.create_player(PlayerOptions::new("G1").volume(30)).unwrap();
    let second = manager.create_player(PlayerOptions::new("G1").volume(80)).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.lock().await.volume(), 30);
    assert!(manager.get_player("G1").is_some());
}

#[tokio::test]
async fn create_player_node_selection() {
    let (manager, _) = manager_with(
        &["a", "b"],
        json!({
            "G1": { "node": "b" },
            "G2": { "node": "gone" },
        }),
    );

    let kept = manager.create_player(PlayerOptions::new("G1")).unwrap();
    assert_eq!(kept.lock().await.node_id(), Some("b"));

    let moved = manager.create_player(PlayerOptions::new("G2")).unwrap();
    assert_eq!(moved.lock().await.node_id(), Some("a"));
    assert_eq!(
        manager.context.repository().player("G2").and_then(|r| r.node),
        Some("a".to_string())
    );

    let explicit = manager.create_player(PlayerOptions::new("G3").node("b")).unwrap();
    assert_eq!(explicit.lock().await.node_id(), Some("b"));

    assert!(matches!(
        manager.create_player(PlayerOptions::new("G4").node("nowhere")),
        Err(ManagerError::Player(PlayerError::NodeNotFound(_)))
    ));
}

#[tokio::test]
async fn restore_players_rebuilds_persisted_sessions() {
    let (manager, _) = manager_with(
        &["main"],
        json!({
            "G1": { "node": "main", "volume": 25, "textChannel": "T1" },
            "G2": { "node": "main", "loop": 1 },
        }),
    );

    assert_eq!(manager.restore_players(), 2);
    assert_eq!(manager.players.len(), 2);

    let restored = manager.get_player("G1").unwrap();
    let restored = restored.lock().await;
    assert_eq!(restored.volume(), 25);
    assert_eq!(restored.text_channel(), Some("T1"));
}

#[tokio::test]
async fn voice_packets_reach_the_player_node() {
    let (manager, recorders) = manager_with(&["main"], json!({}));
    let player = manager.create_player(PlayerOptions::new("G1").voice_channel("V1")).unwrap();

    manager
        .packet_update(&packet(json!({
            "t": "VOICE_STATE_UPDATE",
            "d": {
                "guild_id": "G1", "user_id": "someone", "session_id": "other", "channel_id": "V7"
            }
        })))
        .await
        .unwrap();
    assert_eq!(player.lock().await.voice_channel(), Some("V1"));
    assert!(manager.context.voice().voice_state("G1").is_none());

    manager
        .packet_update(&packet(json!({
            "t": "VOICE_STATE_UPDATE",
            "d": { "guild_id": "G1", "user_id": "B1", "session_id": "session", "channel_id": "V2" }
        })))
        .await
        .unwrap();
    assert!(recorders[0].updates.lock().is_empty());

    {
        let player = player.lock().await;
        assert_eq!(player.voice_channel(), Some("V2"));
        assert!(player.connected());
    }

    manager
        .packet_update(&packet(json!({
            "t": "VOICE_SERVER_UPDATE",
            "d": { "guild_id": "G1", "token": "token", "endpoint": "voice.example:443" }
        })))
        .await
        .unwrap();

    let updates = recorders[0].updates.lock().clone();
    assert_eq!(
        updates,
        vec![(
            "G1".to_string(),
            PlayerUpdate::voice(VoiceState {
                token: "token".into(),
                endpoint: "voice.example:443".into(),
                session_id: "session".into(),
            })
        )]
    );
}

#[tokio::test]
async fn leaving_voice_marks_the_player_disconnected() {
    let (manager, _) = manager_with(&["main"], json!({}));
    let player = manager.create_player(PlayerOptions::new("G1").voice_channel("V1")).unwrap();
    player.lock().await.set(PlayerField::Connected(Some(true)));
    manager.context.voice().state_update("G1", "session");

    manager
        .packet_update(&packet(json!({
            "t": "VOICE_STATE_UPDATE",
            "d": { "guild_id": "G1", "user_id": "B1", "session_id": "session", "channel_id": null }
        })))
        .await
        .unwrap();

    assert!(!player.lock().await.connected());
    assert!(manager.context.voice().voice_state("G1").is_none());
}

#[tokio::test]
async fn unallocated_voice_server_is_ignored() {
    let (manager, recorders) = manager_with(&["main"], json!({}));
    manager.create_player(PlayerOptions::new("G1")).unwrap();
    manager.context.voice().state_update("G1", "session");

    manager
        .packet_update(&packet(json!({
            "t": "VOICE_SERVER_UPDATE",
            "d": { "guild_id": "G1", "token": "token", "endpoint": null }
        })))
        .await
        .unwrap();

    assert!(recorders[0].updates.lock().is_empty());
    assert!(manager.context.voice().voice_state("G1").is_none());
}

#[tokio::test]
async fn unrelated_and_malformed_packets() {
    let (manager, _) = manager_with(&["main"], json!({}));

    manager
        .packet_update(&packet(json!({ "t": "MESSAGE_CREATE", "d": { "content": "hi" } })))
        .await
        .unwrap();

    let error = manager
        .packet_update(&packet(json!({ "t": "VOICE_SERVER_UPDATE", "d": { "guild_id": "G1" } })))
        .await
        .unwrap_err();
    assert!(matches!(error, ManagerError::MalformedPacket(_)));
}

#[tokio::test]
async fn remove_player_forgets_voice_halves() {
    let (manager, _) = manager_with(&["main"], json!({}));
    manager.create_player(PlayerOptions::new("G1")).unwrap();
    manager.context.voice().state_update("G1", "session");
    manager.context.voice().server_update("G1", "token", "endpoint");

    assert!(manager.remove_player("G1").is_some());
    assert!(manager.get_player("G1").is_none());
    assert!(manager.context.voice().voice_state("G1").is_none());
}

struct Greeting;

impl typemap_rev::TypeMapKey for Greeting {
    type Value = String;
}

#[tokio::test]
async fn shared_data_is_carried_over() {
    let mut builder = Manager::builder("B1", MockVoiceDispatcher::new());
    builder.data_ref().insert::<Greeting>("hello".to_string());

    let manager = builder.build().unwrap();

    assert_eq!(manager.bot_id(), "B1");
    assert_eq!(
        manager.shared_data.read().await.get::<Greeting>().map(String::as_str),
        Some("hello")
    );
    assert!(matches!(manager.node("main"), Err(ManagerError::NodeNotFound(_))));
}

fn node_message(value: serde_json::Value) -> NodeMessage {
    serde_json::from_value(value).unwrap()
}

fn remote_track() -> serde_json::Value {
    json!({
        "encoded": "abc",
        "info": {
            "identifier": "id", "isSeekable": true, "author": "a", "length": 5000,
            "isStream": false, "position": 0, "title": "t", "uri": null,
            "artworkUrl": null, "isrc": null, "sourceName": "youtube"
        }
    })
}

fn track_start(guild_id: &str) -> NodeMessage {
    node_message(json!({
        "op": "event", "type": "TrackStartEvent", "guildId": guild_id, "track": remote_track()
    }))
}

fn track_end(guild_id: &str, reason: &str) -> NodeMessage {
    node_message(json!({
        "op": "event", "type": "TrackEndEvent", "guildId": guild_id,
        "track": remote_track(), "reason": reason
    }))
}

fn position_update(guild_id: &str, position: u64) -> NodeMessage {
    node_message(json!({
        "op": "playerUpdate", "guildId": guild_id,
        "state": { "time": 1, "position": position, "connected": true, "ping": 5 }
    }))
}

fn session_events(manager: &Manager) -> SessionEvents {
    SessionEvents {
        players: Arc::clone(&manager.players),
    }
}

#[tokio::test]
async fn track_start_marks_the_session_playing() {
    let (manager, _) = manager_with(&["main"], json!({}));
    let player = manager.create_player(PlayerOptions::new("G1")).unwrap();
    player.lock().await.set(PlayerField::Paused(Some(true)));

    session_events(&manager).apply(&track_start("G1")).await;

    let record = manager.context.repository().player("G1").unwrap();
    assert_eq!(record.playing, Some(true));
    assert_eq!(record.paused, Some(false));
    assert!(player.lock().await.playing());
}

#[tokio::test]
async fn track_end_marks_the_session_stopped() {
    let (manager, _) = manager_with(&["main"], json!({}));
    let player = manager.create_player(PlayerOptions::new("G1")).unwrap();
    player.lock().await.set(PlayerField::Playing(Some(true)));

    session_events(&manager).apply(&track_end("G1", "finished")).await;

    assert_eq!(manager.context.repository().player("G1").unwrap().playing, Some(false));
    assert!(!player.lock().await.playing());
}

#[tokio::test]
async fn player_update_mirrors_the_position() {
    let (manager, _) = manager_with(&["main"], json!({}));
    let player = manager.create_player(PlayerOptions::new("G1")).unwrap();
    {
        let mut player = player.lock().await;
        player.queue().push(TrackRecord::new("abc", 5000));
        player.play().await.unwrap();
    }

    session_events(&manager).apply(&position_update("G1", 1234)).await;

    assert_eq!(player.lock().await.current().map(|t| t.position), Some(1234));
    assert_eq!(manager.context.repository().current("G1").map(|t| t.position), Some(1234));
}

#[tokio::test]
async fn events_for_unknown_guilds_are_ignored() {
    let (manager, _) = manager_with(&["main"], json!({}));

    session_events(&manager).apply(&track_start("G9")).await;
    session_events(&manager).apply(&position_update("G9", 10)).await;

    assert!(manager.context.repository().player("G9").is_none());
    assert!(manager.context.repository().current("G9").is_none());
}

#[tokio::test]
async fn back_to_back_tracks_end_up_playing() {
    let (manager, _) = manager_with(&["main"], json!({}));
    let player = manager.create_player(PlayerOptions::new("G1")).unwrap();
    let events = session_events(&manager);

    events.apply(&track_start("G1")).await;
    events.apply(&track_end("G1", "finished")).await;
    events.apply(&track_start("G1")).await;

    let mut player = player.lock().await;
    assert!(player.playing());
    assert_eq!(player.set_volume(50).await.unwrap(), 50);
}

#[tokio::test]
async fn destroyed_session_stays_gone() {
    let (manager, _) = manager_with(&["main"], json!({}));
    let player = manager.create_player(PlayerOptions::new("G1")).unwrap();
    {
        let mut player = player.lock().await;
        player.queue().push(TrackRecord::new("abc", 5000));
        player.play().await.unwrap();

        assert!(!player.skip().await.unwrap());
        assert!(player.is_destroyed());
    }
    assert!(manager.context.repository().player("G1").is_none());

    let events = session_events(&manager);
    events.apply(&track_end("G1", "cleanup")).await;
    events.apply(&track_start("G1")).await;
    events.apply(&position_update("G1", 999)).await;

    assert!(manager.context.repository().player("G1").is_none());
    assert!(manager.context.repository().current("G1").is_none());

    player.lock().await.set(PlayerField::Volume(10));
    assert!(player.lock().await.get("volume").is_some());
    assert!(manager.context.repository().player("G1").is_none());

    assert_eq!(manager.restore_players(), 0);
}

#[tokio::test]
async fn create_player_replaces_a_destroyed_session() {
    let (manager, _) = manager_with(&["main"], json!({}));
    let first = manager.create_player(PlayerOptions::new("G1")).unwrap();
    first.lock().await.destroy().await.unwrap();

    let second = manager.create_player(PlayerOptions::new("G1")).unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert!(!second.lock().await.is_destroyed());
    assert!(manager.context.repository().player("G1").is_some());
    assert!(Arc::ptr_eq(&second, &manager.get_player("G1").unwrap()));
}
