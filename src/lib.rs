pub mod error;
pub mod store;
pub mod queue;
pub mod node;
pub mod model;
pub mod events;
pub mod voice;
pub mod player;
pub mod manager;
pub mod builder;

pub use manager::{Manager, ManagerBuilder, SharedPlayer};
pub use player::{ConnectOptions, Player};
