use async_trait::async_trait;
use futures::StreamExt;
use http::Request;
use lazy_static::lazy_static;
use parking_lot::RwLock;
use regex::Regex;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client as HttpClient, Response,
};
use std::sync::Arc;
use tokio_tungstenite::tungstenite::Message as TungsteniteMessage;
use tracing::{debug, error, info, warn};

use crate::{
    builder::NodeBuilder,
    error::{ManagerError, ManagerResult, PlayerError, PlayerResult},
    events::{process, EventHandler, SessionSync},
    model::{
        events::PlayerUpdate,
        gateway::{NodeMessage, Stats},
        track::LoadResult,
    },
};

lazy_static!(
    static ref URL_REGEX: Regex = Regex::new(r"^https?://(?:www\.)?.+").expect("valid url regex");
);

/// Identifier sent to the node for a free text query.
pub fn search_identifier(query: &str) -> String {
    if URL_REGEX.is_match(query) {
        query.to_string()
    } else {
        format!("ytsearch:{}", query)
    }
}

/// The two player calls a session makes against its node.
///
/// Fields absent from an update must be left unchanged by the node.
#[async_trait]
pub trait RemoteNode: Send + Sync {
    async fn update(&self, guild_id: &str, data: PlayerUpdate) -> PlayerResult<()>;

    async fn destroy(&self, guild_id: &str) -> PlayerResult<()>;
}

pub struct Node {
    id: String,
    rest: String,
    socket: String,
    pass: String,
    user_id: String,
    client_name: String,
    http: HttpClient,
    session_id: RwLock<Option<String>>,
    stats: RwLock<Option<Stats>>,
}

fn header(name: &'static str, value: &str) -> ManagerResult<HeaderValue> {
    value.parse().map_err(|_| {
        ManagerError::InvalidNodeConfig(format!("`{}` is not a valid header value", name))
    })
}

impl Node {
    pub(crate) fn new(builder: NodeBuilder) -> ManagerResult<Self> {
        let user_id = builder
            .user_id
            .clone()
            .ok_or_else(|| ManagerError::InvalidNodeConfig("missing bot user id".to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert("Authorization", header("Authorization", &builder.pass)?);
        headers.insert("User-Id", header("User-Id", &user_id)?);
        headers.insert("Client-Name", header("Client-Name", &builder.client_name)?);

        let http = HttpClient::builder()
            .default_headers(headers)
            .build()
            .map_err(|why| ManagerError::InvalidNodeConfig(why.to_string()))?;

        Ok(Self {
            id: builder.identifier(),
            rest: builder.rest_url(),
            socket: builder.socket_url(),
            pass: builder.pass,
            user_id,
            client_name: builder.client_name,
            http,
            session_id: RwLock::new(None),
            stats: RwLock::new(None),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Session id received with the last `ready` op.
    pub fn session_id(&self) -> Option<String> {
        self.session_id.read().clone()
    }

    pub fn stats(&self) -> Option<Stats> {
        self.stats.read().clone()
    }

    fn get_ws_request(&self) -> Result<Request<()>, http::Error> {
        let mut request = Request::builder()
            .uri(&self.socket)
            .header("Authorization", &self.pass)
            .header("User-Id", &self.user_id)
            .header("Client-Name", &self.client_name);

        if let Some(session_id) = self.session_id() {
            request = request.header("Session-Id", session_id);
        }

        request.body(())
    }

    fn player_url(&self, guild_id: &str) -> PlayerResult<String> {
        let session_id = self
            .session_id()
            .ok_or_else(|| PlayerError::NoNodeSession(self.id.clone()))?;

        Ok(format!("{}/v4/sessions/{}/players/{}", self.rest, session_id, guild_id))
    }

    async fn check(response: Response) -> PlayerResult<Response> {
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();

        Err(PlayerError::Node {
            status: status.as_u16(),
            message,
        })
    }

    pub(crate) fn run(
        node: Arc<Self>,
        sync: Arc<dyn SessionSync>,
        handler: Arc<dyn EventHandler>,
        max_reconnect_attempts: u8,
    ) {
        tokio::spawn(async move {
            let node_id = node.id.clone();
            let mut actual_reconnection_attempt = 1u8;

            while actual_reconnection_attempt <= max_reconnect_attempts {
                info!(
                    "Node {} trying to connect to server, attempt {}",
                    node_id, actual_reconnection_attempt
                );

                let request = match node.get_ws_request() {
                    Ok(request) => request,
                    Err(why) => {
                        error!("Node {} has an invalid websocket request: {}", node_id, why);
                        break;
                    }
                };

                let mut stream = match tokio_tungstenite::connect_async(request).await {
                    Ok((stream, _)) => stream,
                    Err(why) => {
                        actual_reconnection_attempt += 1;

                        warn!(
                            "Node {} failed to connect (attempt {}/{}): {}, retrying in 5s",
                            node_id,
                            actual_reconnection_attempt - 1,
                            max_reconnect_attempts,
                            why
                        );
                        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                info!("Node {} connected successfully to server", node_id);

                actual_reconnection_attempt = 1;

                while let Some(Ok(msg)) = stream.next().await {
                    let text = match msg {
                        TungsteniteMessage::Text(text) => text,
                        TungsteniteMessage::Close(_) => break,
                        _ => continue,
                    };

                    let message = match serde_json::from_str::<NodeMessage>(&text) {
                        Ok(message) => message,
                        Err(why) => {
                            debug!("Node {} sent an unhandled message: {}", node_id, why);
                            continue;
                        }
                    };

                    match &message {
                        NodeMessage::Ready(ready) => {
                            info!(
                                "Node {} ready with session {} (resumed: {})",
                                node_id, ready.session_id, ready.resumed
                            );
                            *node.session_id.write() = Some(ready.session_id.clone());
                        }
                        NodeMessage::Stats(stats) => {
                            *node.stats.write() = Some(stats.clone());
                        }
                        _ => (),
                    }

                    sync.apply(&message).await;

                    process(Arc::clone(&node), Arc::clone(&handler), message);
                }

                warn!("Node {} disconnected from server", node_id);
            }

            error!("Node {} reached max connection attempts, giving up", node_id);
        });
    }

    /// Resolves an identifier (`ytsearch:...`, an URL, ...) into tracks.
    pub async fn load_tracks(&self, identifier: &str) -> PlayerResult<LoadResult> {
        let response = self
            .http
            .get(format!("{}/v4/loadtracks", self.rest))
            .query(&[("identifier", identifier)])
            .send()
            .await?;

        Ok(Self::check(response).await?.json::<LoadResult>().await?)
    }

    /// Loads `query` directly when it is an URL, searches youtube otherwise.
    pub async fn search(&self, query: &str) -> PlayerResult<LoadResult> {
        self.load_tracks(&search_identifier(query)).await
    }
}

#[async_trait]
impl RemoteNode for Node {
    async fn update(&self, guild_id: &str, data: PlayerUpdate) -> PlayerResult<()> {
        let url = self.player_url(guild_id)?;

        debug!("Updating player {} on node {}: {:?}", guild_id, self.id, data);

        let response = self
            .http
            .patch(url)
            .query(&[("noReplace", "false")])
            .json(&data)
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }

    async fn destroy(&self, guild_id: &str) -> PlayerResult<()> {
        let url = self.player_url(guild_id)?;

        debug!("Destroying player {} on node {}", guild_id, self.id);

        let response = self.http.delete(url).send().await?;

        Self::check(response).await?;
        Ok(())
    }
}
