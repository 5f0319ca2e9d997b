//! marklive core library: resource identity, commands, dispatch, subscriber
//! registries, configuration and errors.
//!
//! Public API surface:
//! - [`types`]: `ResourceId`, `ResourceKind`, `ConnectionId`, `RenderFrame`
//! - [`identity`]: deterministic fingerprinting of files and memory keys
//! - [`command`]: the tagged [`Command`] sum type
//! - [`dispatch`]: [`Dispatcher`] fan-out bus and the [`Handler`] trait
//! - [`registry`]: per-resource [`SubscriberRegistry`]
//! - [`connection`]: the [`Connection`] seam plus a channel-backed impl
//! - [`config`]: YAML configuration load
//! - [`error`]: [`CommandError`], [`ConfigError`]

pub mod command;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod identity;
pub mod registry;
pub mod render;
pub mod types;

pub use command::{Command, CommandKind};
pub use config::{Config, MarkdownConfig};
pub use connection::{
    ChannelConnection, Connection, DeliveryError, Outbound, SharedConnection,
};
pub use dispatch::{Dispatch, Dispatcher, FnHandler, Handler};
pub use error::{CommandError, ConfigError};
pub use registry::{BroadcastReport, RegistrySnapshot, SubscriberRegistry};
pub use render::{Render, SharedRender};
pub use types::{ConnectionId, RenderFrame, ResourceId, ResourceKind};
