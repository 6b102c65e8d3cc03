use thiserror::Error;

pub type PlayerResult<T> = ::std::result::Result<T, PlayerError>;

/// Broad classes callers can match on without caring about the exact variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Input rejected before any state mutation or remote call.
    InvalidArgument,
    /// The session is not in a state where the command makes sense.
    PreconditionFailed,
    /// The node rejected the request or could not be reached.
    RemoteCallFailure,
}

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("Invalid value for `{name}`: {reason}")]
    InvalidArgument { name: &'static str, reason: String },
    #[error("Cannot change volume while the player is not playing")]
    NotPlaying,
    #[error("There is no track currently playing")]
    NoCurrentTrack,
    #[error("Position {position}ms is past the end of the current track ({duration}ms)")]
    SeekOutOfRange { position: u64, duration: u64 },
    #[error("The current track is a live stream and cannot be seeked")]
    NotSeekable,
    #[error("The queue is empty")]
    EmptyQueue,
    #[error("Queue position {position} does not exist, queue has {size} tracks")]
    QueuePositionOutOfRange { position: usize, size: usize },
    #[error("Cannot find node `{0}`, it is not registered or not available")]
    NodeNotFound(String),
    #[error("Node `{0}` has no session yet, wait for the ready op")]
    NoNodeSession(String),
    #[error("Node responded with status {status}: {message}")]
    Node { status: u16, message: String },
    #[error("Error while sending request to node: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Error while serializing payload: {0}")]
    Json(#[from] serde_json::Error),
}

impl PlayerError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::NotPlaying
            | Self::NoCurrentTrack
            | Self::SeekOutOfRange { .. }
            | Self::NotSeekable
            | Self::EmptyQueue
            | Self::QueuePositionOutOfRange { .. }
            | Self::NodeNotFound(_) => ErrorKind::PreconditionFailed,
            Self::NoNodeSession(_) | Self::Node { .. } | Self::Http(_) | Self::Json(_) => {
                ErrorKind::RemoteCallFailure
            }
        }
    }
}

pub type ManagerResult<T> = ::std::result::Result<T, ManagerError>;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Cannot find node `{0}`, this can mean the node is not available or does not exist")]
    NodeNotFound(String),
    #[error("Cannot find the best node, there are no nodes added")]
    NoNodes,
    #[error("Invalid node configuration: {0}")]
    InvalidNodeConfig(String),
    #[error("Malformed gateway packet: {0}")]
    MalformedPacket(#[from] serde_json::Error),
    #[error(transparent)]
    Player(#[from] PlayerError),
}
