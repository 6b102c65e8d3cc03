use std::sync::Arc;

use crate::{error::ManagerResult, node::Node};

pub struct NodeBuilder {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) ssl: bool,
    pub(crate) pass: String,
    pub(crate) identifier: Option<String>,
    pub(crate) client_name: String,
    pub(crate) user_id: Option<String>,
}

impl Default for NodeBuilder {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 2333,
            ssl: false,
            pass: "youshallnotpass".to_string(),
            identifier: None,
            client_name: concat!("tunelink/", env!("CARGO_PKG_VERSION")).to_string(),
            user_id: None,
        }
    }
}

impl NodeBuilder {
    pub fn set_host(&mut self, host: impl ToString) -> &mut Self {
        self.host = host.to_string();
        self
    }

    pub fn set_port(&mut self, port: u16) -> &mut Self {
        self.port = port;
        self
    }

    pub fn set_password(&mut self, password: impl ToString) -> &mut Self {
        self.pass = password.to_string();
        self
    }

    pub fn set_ssl(&mut self, ssl: bool) -> &mut Self {
        self.ssl = ssl;
        self
    }

    /// Name players refer to the node by, defaults to `host:port`.
    pub fn set_identifier(&mut self, identifier: impl ToString) -> &mut Self {
        self.identifier = Some(identifier.to_string());
        self
    }

    pub fn set_client_name(&mut self, name: impl ToString) -> &mut Self {
        self.client_name = name.to_string();
        self
    }

    pub(crate) fn set_user_id(&mut self, id: impl ToString) -> &mut Self {
        self.user_id = Some(id.to_string());
        self
    }

    pub fn identifier(&self) -> String {
        self.identifier
            .clone()
            .unwrap_or_else(|| format!("{}:{}", self.host, self.port))
    }

    pub(crate) fn rest_url(&self) -> String {
        if self.ssl {
            format!("https://{}:{}", self.host, self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }

    pub(crate) fn socket_url(&self) -> String {
        if self.ssl {
            format!("wss://{}:{}/v4/websocket", self.host, self.port)
        } else {
            format!("ws://{}:{}/v4/websocket", self.host, self.port)
        }
    }

    pub(crate) fn build(self) -> ManagerResult<Arc<Node>> {
        Node::new(self).map(Arc::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_follow_ssl() {
        let mut builder = NodeBuilder::default();
        assert_eq!(builder.rest_url(), "http://localhost:2333");
        assert_eq!(builder.socket_url(), "ws://localhost:2333/v4/websocket");
        assert_eq!(builder.identifier(), "localhost:2333");

        builder.set_host("node.example").set_port(443).set_ssl(true).set_identifier("main");
        assert_eq!(builder.rest_url(), "https://node.example:443");
        assert_eq!(builder.socket_url(), "wss://node.example:443/v4/websocket");
        assert_eq!(builder.identifier(), "main");
    }

    #[test]
    fn building_requires_the_bot_id() {
        assert!(NodeBuilder::default().build().is_err());

        let mut builder = NodeBuilder::default();
        builder.set_user_id("1234");
        let node = builder.build().unwrap();
        assert_eq!(node.id(), "localhost:2333");
        assert!(node.session_id().is_none());
    }
}
