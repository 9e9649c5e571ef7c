//! Capability interface to the hosted backend.
//!
//! Everything the proxy needs from the service goes through [`Backend`]:
//! - building queries ([`Query`])
//! - opening live subscriptions that stream [`LiveEvent`]s over a channel
//! - saving, fetching and finding objects
//! - reading server-side config parameters
//!
//! [`MemoryBackend`] is an in-process implementation used by the tests and
//! for local development.

mod memory;

pub use memory::{Comparison, Condition, MemoryBackend, MemoryQuery, SortKey};

use crate::config::Credentials;
use crate::error::Result;
use crate::types::{Attributes, ParseObject};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

/// Query builder with one setter per filter operator.
///
/// Setters never fail. Implementations report malformed input when the
/// query is used (subscribe or find).
pub trait Query: Send + Sync {
    /// Class this query targets.
    fn class_name(&self) -> &str;

    fn equal_to(&mut self, key: &str, value: Value);
    fn not_equal_to(&mut self, key: &str, value: Value);
    fn greater_than(&mut self, key: &str, value: Value);
    fn greater_than_or_equal_to(&mut self, key: &str, value: Value);
    fn less_than(&mut self, key: &str, value: Value);
    fn less_than_or_equal_to(&mut self, key: &str, value: Value);

    /// `values` is expected to be an array.
    fn contained_in(&mut self, key: &str, values: Value);

    fn limit(&mut self, value: Value);
    fn skip(&mut self, value: Value);

    /// `value` names the sort key.
    fn ascending(&mut self, value: Value);

    /// `value` names the sort key.
    fn descending(&mut self, value: Value);
}

/// Unique identifier for a live subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle events streamed by a live subscription.
#[derive(Clone, Debug, PartialEq)]
pub enum LiveEvent {
    /// Subscription is established.
    Opened,
    /// A matching object was created.
    Created(ParseObject),
    /// A matching object was updated and still matches.
    Updated(ParseObject),
    /// An existing object was updated and now matches.
    Entered(ParseObject),
    /// A matching object was deleted.
    Deleted(ParseObject),
    /// Subscription ended. No further events follow.
    Closed,
    /// Transport failure reported while the subscription is open.
    Error(String),
}

impl LiveEvent {
    /// Event name as used by the live query protocol.
    pub fn name(&self) -> &'static str {
        match self {
            LiveEvent::Opened => "open",
            LiveEvent::Created(_) => "create",
            LiveEvent::Updated(_) => "update",
            LiveEvent::Entered(_) => "enter",
            LiveEvent::Deleted(_) => "delete",
            LiveEvent::Closed => "close",
            LiveEvent::Error(_) => "error",
        }
    }
}

/// An open live subscription: its id and the receiving end of its stream.
pub struct LiveSubscription {
    pub id: SubscriptionId,
    pub receiver: crossbeam_channel::Receiver<LiveEvent>,
}

/// The hosted service, as seen by the proxy.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    type Query: Query + 'static;

    /// One-time setup with application credentials.
    fn initialize(&self, credentials: &Credentials) -> Result<()>;

    /// New, unconstrained query for `class_name`.
    fn query(&self, class_name: &str) -> Self::Query;

    /// Open a live subscription for objects matching `query`.
    fn subscribe(&self, query: &Self::Query) -> Result<LiveSubscription>;

    /// Close a live subscription. The stream receives [`LiveEvent::Closed`]
    /// and then disconnects. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);

    /// Persist a new object of `class_name`.
    async fn save(&self, class_name: &str, attributes: Attributes) -> Result<ParseObject>;

    /// Fetch one object by id.
    async fn get(&self, class_name: &str, object_id: &str) -> Result<ParseObject>;

    /// Run `query` once.
    async fn find(&self, query: &Self::Query) -> Result<Vec<ParseObject>>;

    /// Server-side config parameters.
    async fn config(&self) -> Result<Attributes>;
}
