//! # Parse Proxy
//!
//! Message-oriented access to a Parse-style backend: inbound and outbound
//! message records, filtered live subscriptions, and validated creation.
//!
//! ## Core Concepts
//!
//! - **Backend**: capability interface to the hosted service (queries, live
//!   subscriptions, saves, config)
//! - **Filters**: declarative `{ref, key, val}` descriptors applied to a query
//! - **Subscriptions**: live event streams routed to a handler set, with
//!   created objects admitted only when they carry the required keys
//! - **Record schemas**: per-direction class name and required key set
//!
//! ## Example
//!
//! ```ignore
//! use parse_proxy::{FilterDescriptor, HandlerSet, MemoryBackend, ParseProxy, ProxyConfig};
//! use serde_json::json;
//!
//! let config = ProxyConfig::new("http://localhost:1337/parse", "app-id", "js-key");
//! let backend = MemoryBackend::from_config(&config);
//! let proxy = ParseProxy::init(config, backend)?;
//!
//! let handlers = HandlerSet::new(|message| println!("outbound: {}", message));
//! let filters = [FilterDescriptor::equal_to("channel", "c1")];
//! let subscription = proxy.subscribe_message_outbound(handlers, Some(&filters))?;
//!
//! let payload = json!({"toUserId": "u1", "channel": "c1"});
//! let message = proxy
//!     .create_message_outbound(payload.as_object().cloned().unwrap_or_default())?
//!     .await?;
//!
//! subscription.close()?;
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod filters;
pub mod proxy;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use backend::{
    Backend, Comparison, Condition, LiveEvent, LiveSubscription, MemoryBackend, MemoryQuery,
    Query, SortKey, SubscriptionId,
};
pub use config::{Credentials, ProxyConfig};
pub use error::{ProxyError, Result};
pub use filters::{apply_filters, FilterDescriptor, FilterOp};
pub use proxy::{ParseProxy, PendingObject};
pub use subscriptions::{
    DispatchStats, Dispatcher, HandlerSet, HandlerSetBuilder, SubscriptionHandle,
};
pub use types::*;
