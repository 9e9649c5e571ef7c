//! In-process backend.
//!
//! Holds objects per class, assigns object ids and timestamps, and streams
//! live events to subscriptions whose query matches. Live subscriptions
//! ignore `limit`, `skip` and ordering, as the hosted live query server does.

use super::{Backend, LiveEvent, LiveSubscription, Query, SubscriptionId};
use crate::config::{Credentials, ProxyConfig};
use crate::error::{ProxyError, Result};
use crate::types::{Attributes, ParseObject};
use async_trait::async_trait;
use chrono::Utc;
use crossbeam_channel::{bounded, Sender};
use parking_lot::RwLock;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace, warn};

/// Default max buffered events per live subscription.
const DEFAULT_BUFFER_SIZE: usize = 1000;

/// Result cap applied by `find` when the query sets no limit.
const DEFAULT_FIND_LIMIT: usize = 100;

/// Constraint operator on a single key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    ContainedIn,
}

/// One constraint of a [`MemoryQuery`].
#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    pub key: String,
    pub comparison: Comparison,
    pub value: Value,
}

impl Condition {
    fn matches(&self, view: &Attributes) -> bool {
        let field = view.get(&self.key);
        match self.comparison {
            Comparison::Equal => field == Some(&self.value),
            Comparison::NotEqual => field != Some(&self.value),
            Comparison::GreaterThan => ordering(field, &self.value) == Some(CmpOrdering::Greater),
            Comparison::GreaterThanOrEqual => matches!(
                ordering(field, &self.value),
                Some(CmpOrdering::Greater | CmpOrdering::Equal)
            ),
            Comparison::LessThan => ordering(field, &self.value) == Some(CmpOrdering::Less),
            Comparison::LessThanOrEqual => matches!(
                ordering(field, &self.value),
                Some(CmpOrdering::Less | CmpOrdering::Equal)
            ),
            Comparison::ContainedIn => match (field, self.value.as_array()) {
                (Some(field), Some(values)) => values.contains(field),
                _ => false,
            },
        }
    }
}

/// Sort clause as given to `ascending`/`descending`.
#[derive(Clone, Debug, PartialEq)]
pub struct SortKey {
    pub key: Value,
    pub descending: bool,
}

/// Compare a field against a bound. Numbers compare numerically, strings
/// lexicographically, and date objects (`{"__type": "Date", "iso": ...}`)
/// by their ISO string. Anything else is incomparable.
fn ordering(field: Option<&Value>, bound: &Value) -> Option<CmpOrdering> {
    compare_values(field?, bound)
}

fn compare_values(a: &Value, b: &Value) -> Option<CmpOrdering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Object(_), Value::Object(_)) => Some(date_iso(a)?.cmp(date_iso(b)?)),
        _ => None,
    }
}

fn date_iso(value: &Value) -> Option<&str> {
    if value.get("__type")?.as_str()? != "Date" {
        return None;
    }
    value.get("iso")?.as_str()
}

/// Query built against the in-process backend.
///
/// Setters follow the hosted service's semantics: `equal_to` replaces every
/// constraint on its key, other operators replace an earlier constraint of
/// the same operator (and any equality) on their key, and
/// `ascending`/`descending` replace the sort order.
#[derive(Clone, Debug, PartialEq)]
pub struct MemoryQuery {
    class_name: String,
    conditions: Vec<Condition>,
    limit: Option<Value>,
    skip: Option<Value>,
    order: Vec<SortKey>,
}

impl MemoryQuery {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            conditions: Vec::new(),
            limit: None,
            skip: None,
            order: Vec::new(),
        }
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Whether a constraint with this key and operator is set.
    pub fn has_condition(&self, key: &str, comparison: Comparison) -> bool {
        self.conditions
            .iter()
            .any(|c| c.key == key && c.comparison == comparison)
    }

    pub fn limit_value(&self) -> Option<&Value> {
        self.limit.as_ref()
    }

    pub fn skip_value(&self) -> Option<&Value> {
        self.skip.as_ref()
    }

    pub fn order(&self) -> &[SortKey] {
        &self.order
    }

    /// Check that every setter received usable input.
    pub fn validate(&self) -> Result<()> {
        for condition in &self.conditions {
            if condition.key.is_empty() {
                return Err(ProxyError::InvalidQuery(format!(
                    "{:?} constraint without a key",
                    condition.comparison
                )));
            }
            if condition.comparison == Comparison::ContainedIn && !condition.value.is_array() {
                return Err(ProxyError::InvalidQuery(format!(
                    "containedIn on {} expects an array, got {}",
                    condition.key, condition.value
                )));
            }
        }
        count("limit", self.limit.as_ref())?;
        count("skip", self.skip.as_ref())?;
        self.sort_keys()?;
        Ok(())
    }

    /// Whether `object` satisfies every constraint. Ignores limit, skip and
    /// order.
    pub fn matches(&self, object: &ParseObject) -> bool {
        if object.class_name != self.class_name {
            return false;
        }
        let view = object.to_json();
        self.conditions.iter().all(|c| c.matches(&view))
    }

    fn set_condition(&mut self, key: &str, comparison: Comparison, value: Value) {
        self.conditions.retain(|c| {
            c.key != key
                || (comparison != Comparison::Equal
                    && c.comparison != Comparison::Equal
                    && c.comparison != comparison)
        });
        self.conditions.push(Condition {
            key: key.to_string(),
            comparison,
            value,
        });
    }

    /// Sort keys as `(key, descending)`. A key value may list several keys
    /// separated by commas.
    fn sort_keys(&self) -> Result<Vec<(String, bool)>> {
        let mut keys = Vec::new();
        for sort in &self.order {
            let names = sort.key.as_str().ok_or_else(|| {
                ProxyError::InvalidQuery(format!("sort key must be a string, got {}", sort.key))
            })?;
            for name in names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                keys.push((name.to_string(), sort.descending));
            }
        }
        Ok(keys)
    }

    fn run(&self, objects: &[ParseObject]) -> Result<Vec<ParseObject>> {
        self.validate()?;
        let skip = count("skip", self.skip.as_ref())?.unwrap_or(0);
        let limit = count("limit", self.limit.as_ref())?.unwrap_or(DEFAULT_FIND_LIMIT);
        let sort_keys = self.sort_keys()?;

        let mut results: Vec<(Attributes, &ParseObject)> = objects
            .iter()
            .filter(|o| self.matches(o))
            .map(|o| (o.to_json(), o))
            .collect();

        if !sort_keys.is_empty() {
            results.sort_by(|(a, _), (b, _)| {
                for (key, descending) in &sort_keys {
                    let ord = match (a.get(key), b.get(key)) {
                        (Some(a), Some(b)) => compare_values(a, b).unwrap_or(CmpOrdering::Equal),
                        (Some(_), None) => CmpOrdering::Greater,
                        (None, Some(_)) => CmpOrdering::Less,
                        (None, None) => CmpOrdering::Equal,
                    };
                    let ord = if *descending { ord.reverse() } else { ord };
                    if ord != CmpOrdering::Equal {
                        return ord;
                    }
                }
                CmpOrdering::Equal
            });
        }

        Ok(results
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|(_, o)| o.clone())
            .collect())
    }
}

fn count(name: &str, value: Option<&Value>) -> Result<Option<usize>> {
    match value {
        None => Ok(None),
        Some(v) => v
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| {
                ProxyError::InvalidQuery(format!(
                    "{} must be a non-negative integer that fits in usize, got {}",
                    name, v
                ))
            }),
    }
}

impl Query for MemoryQuery {
    fn class_name(&self) -> &str {
        &self.class_name
    }

    fn equal_to(&mut self, key: &str, value: Value) {
        self.set_condition(key, Comparison::Equal, value);
    }

    fn not_equal_to(&mut self, key: &str, value: Value) {
        self.set_condition(key, Comparison::NotEqual, value);
    }

    fn greater_than(&mut self, key: &str, value: Value) {
        self.set_condition(key, Comparison::GreaterThan, value);
    }

    fn greater_than_or_equal_to(&mut self, key: &str, value: Value) {
        self.set_condition(key, Comparison::GreaterThanOrEqual, value);
    }

    fn less_than(&mut self, key: &str, value: Value) {
        self.set_condition(key, Comparison::LessThan, value);
    }

    fn less_than_or_equal_to(&mut self, key: &str, value: Value) {
        self.set_condition(key, Comparison::LessThanOrEqual, value);
    }

    fn contained_in(&mut self, key: &str, values: Value) {
        self.set_condition(key, Comparison::ContainedIn, values);
    }

    fn limit(&mut self, value: Value) {
        self.limit = Some(value);
    }

    fn skip(&mut self, value: Value) {
        self.skip = Some(value);
    }

    fn ascending(&mut self, value: Value) {
        self.order = vec![SortKey {
            key: value,
            descending: false,
        }];
    }

    fn descending(&mut self, value: Value) {
        self.order = vec![SortKey {
            key: value,
            descending: true,
        }];
    }
}

/// Internal live subscription state.
struct LiveQuery {
    query: MemoryQuery,
    sender: Sender<LiveEvent>,
}

impl LiveQuery {
    /// Try to send an event. Returns false if the buffer is full or the
    /// receiver is gone (subscription will be dropped).
    fn try_send(&self, event: LiveEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(crossbeam_channel::TrySendError::Full(_)) => false,
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => false,
        }
    }
}

/// In-process implementation of [`Backend`].
pub struct MemoryBackend {
    credentials: RwLock<Option<Credentials>>,
    /// Objects by class name, in creation order.
    objects: RwLock<HashMap<String, Vec<ParseObject>>>,
    /// Active live subscriptions by ID.
    live: RwLock<HashMap<SubscriptionId, LiveQuery>>,
    /// Server-side config parameters.
    params: RwLock<Attributes>,
    next_subscription: AtomicU64,
    next_object: AtomicU64,
    /// Number of `save` calls that reached the backend.
    saves: AtomicU64,
    buffer_size: usize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    /// Backend sized by `subscriptionBufferSize` from the proxy config.
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self::with_buffer_size(config.subscription_buffer_size)
    }

    /// Backend whose live subscriptions buffer at most `buffer_size` events.
    /// Slower subscribers are dropped.
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            credentials: RwLock::new(None),
            objects: RwLock::new(HashMap::new()),
            live: RwLock::new(HashMap::new()),
            params: RwLock::new(Attributes::new()),
            next_subscription: AtomicU64::new(1),
            next_object: AtomicU64::new(1),
            saves: AtomicU64::new(0),
            buffer_size: buffer_size.max(1),
        }
    }

    /// Replace the server-side config parameters.
    pub fn set_config(&self, params: Attributes) {
        *self.params.write() = params;
    }

    pub fn is_initialized(&self) -> bool {
        self.credentials.read().is_some()
    }

    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn object_count(&self, class_name: &str) -> usize {
        self.objects.read().get(class_name).map_or(0, Vec::len)
    }

    pub fn subscription_count(&self) -> usize {
        self.live.read().len()
    }

    /// Query of an active live subscription.
    pub fn subscription_query(&self, id: SubscriptionId) -> Option<MemoryQuery> {
        self.live.read().get(&id).map(|l| l.query.clone())
    }

    /// Merge `changes` into an existing object.
    ///
    /// Subscriptions that matched before and after receive `Updated`; those
    /// that match only after receive `Entered`.
    pub fn update(
        &self,
        class_name: &str,
        object_id: &str,
        changes: Attributes,
    ) -> Result<ParseObject> {
        self.ensure_initialized()?;
        // Held through the broadcast so live events follow the store order.
        let mut objects = self.objects.write();
        let object = objects
            .get_mut(class_name)
            .and_then(|list| {
                list.iter_mut()
                    .find(|o| o.object_id.as_deref() == Some(object_id))
            })
            .ok_or_else(|| not_found(class_name, object_id))?;
        let before = object.clone();
        object.attributes.extend(changes);
        object.updated_at = Some(Utc::now());
        let after = object.clone();

        self.broadcast(class_name, |query| {
            match (query.matches(&before), query.matches(&after)) {
                (true, true) => Some(LiveEvent::Updated(after.clone())),
                (false, true) => Some(LiveEvent::Entered(after.clone())),
                _ => None,
            }
        });
        drop(objects);
        Ok(after)
    }

    /// Remove an object. Matching subscriptions receive `Deleted`.
    pub fn destroy(&self, class_name: &str, object_id: &str) -> Result<ParseObject> {
        self.ensure_initialized()?;
        let mut objects = self.objects.write();
        let list = objects
            .get_mut(class_name)
            .ok_or_else(|| not_found(class_name, object_id))?;
        let pos = list
            .iter()
            .position(|o| o.object_id.as_deref() == Some(object_id))
            .ok_or_else(|| not_found(class_name, object_id))?;
        let removed = list.remove(pos);

        self.broadcast(class_name, |query| {
            query
                .matches(&removed)
                .then(|| LiveEvent::Deleted(removed.clone()))
        });
        drop(objects);
        Ok(removed)
    }

    /// Report a transport failure to every open subscription.
    pub fn fail_transport(&self, reason: &str) {
        warn!(reason, "simulated transport failure");
        let failed: Vec<SubscriptionId> = self
            .live
            .read()
            .iter()
            .filter(|(_, sub)| !sub.try_send(LiveEvent::Error(reason.to_string())))
            .map(|(id, _)| *id)
            .collect();
        self.drop_subscribers(failed);
    }

    /// Close every open subscription, as a dropped connection would.
    pub fn disconnect(&self) {
        let closed: Vec<(SubscriptionId, LiveQuery)> = self.live.write().drain().collect();
        for (id, sub) in closed {
            debug!(subscription_id = %id, "closing live subscription");
            let _ = sub.try_send(LiveEvent::Closed);
        }
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(ProxyError::NotInitialized)
        }
    }

    /// Ten hex characters derived from the class, a counter and the clock.
    fn generate_object_id(&self, class_name: &str) -> String {
        let n = self.next_object.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now().timestamp_nanos_opt().unwrap_or_default();

        let mut hasher = Sha256::new();
        hasher.update(class_name.as_bytes());
        hasher.update(n.to_le_bytes());
        hasher.update(now.to_le_bytes());
        hex::encode(&hasher.finalize()[..5])
    }

    /// Send the event chosen by `event_for` to each live subscription on
    /// `class_name`. Drops subscribers that fail to receive.
    ///
    /// Callers that mutate `objects` hold its write guard across this call,
    /// which serializes broadcasts in mutation order.
    fn broadcast<F>(&self, class_name: &str, event_for: F)
    where
        F: Fn(&MemoryQuery) -> Option<LiveEvent>,
    {
        let mut to_remove = Vec::new();

        {
            let live = self.live.read();
            for (id, sub) in live.iter() {
                if sub.query.class_name != class_name {
                    continue;
                }
                if let Some(event) = event_for(&sub.query) {
                    trace!(subscription_id = %id, event = event.name(), "live event");
                    if !sub.try_send(event) {
                        to_remove.push(*id);
                    }
                }
            }
        }

        self.drop_subscribers(to_remove);
    }

    /// Remove subscribers whose buffer is full or whose receiver is gone.
    fn drop_subscribers(&self, ids: Vec<SubscriptionId>) {
        if ids.is_empty() {
            return;
        }
        let mut live = self.live.write();
        for id in ids {
            if live.remove(&id).is_some() {
                warn!(subscription_id = %id, "dropping slow live subscriber");
            }
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(class_name: &str, object_id: &str) -> ProxyError {
    ProxyError::ObjectNotFound {
        class_name: class_name.to_string(),
        object_id: object_id.to_string(),
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    type Query = MemoryQuery;

    fn initialize(&self, credentials: &Credentials) -> Result<()> {
        debug!(
            app_id = %credentials.app_id,
            server_url = %credentials.server_url,
            "memory backend initialized"
        );
        *self.credentials.write() = Some(credentials.clone());
        Ok(())
    }

    fn query(&self, class_name: &str) -> MemoryQuery {
        MemoryQuery::new(class_name)
    }

    fn subscribe(&self, query: &MemoryQuery) -> Result<LiveSubscription> {
        self.ensure_initialized()?;
        query.validate()?;

        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(self.buffer_size);
        let live = LiveQuery {
            query: query.clone(),
            sender,
        };
        if !live.try_send(LiveEvent::Opened) {
            return Err(ProxyError::Transport("live stream rejected open event".to_string()));
        }

        debug!(subscription_id = %id, class_name = %query.class_name, "live subscription opened");
        self.live.write().insert(id, live);
        Ok(LiveSubscription { id, receiver })
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        let removed = self.live.write().remove(&id);
        if let Some(sub) = removed {
            debug!(subscription_id = %id, "live subscription closed");
            // Best effort; the receiver may already be gone.
            let _ = sub.try_send(LiveEvent::Closed);
        }
    }

    async fn save(&self, class_name: &str, attributes: Attributes) -> Result<ParseObject> {
        self.ensure_initialized()?;
        self.saves.fetch_add(1, Ordering::SeqCst);

        let now = Utc::now();
        let object = ParseObject {
            class_name: class_name.to_string(),
            object_id: Some(self.generate_object_id(class_name)),
            created_at: Some(now),
            updated_at: Some(now),
            attributes,
        };

        let mut objects = self.objects.write();
        objects
            .entry(class_name.to_string())
            .or_default()
            .push(object.clone());

        self.broadcast(class_name, |query| {
            query
                .matches(&object)
                .then(|| LiveEvent::Created(object.clone()))
        });
        drop(objects);
        Ok(object)
    }

    async fn get(&self, class_name: &str, object_id: &str) -> Result<ParseObject> {
        self.ensure_initialized()?;
        self.objects
            .read()
            .get(class_name)
            .and_then(|list| {
                list.iter()
                    .find(|o| o.object_id.as_deref() == Some(object_id))
            })
            .cloned()
            .ok_or_else(|| not_found(class_name, object_id))
    }

    async fn find(&self, query: &MemoryQuery) -> Result<Vec<ParseObject>> {
        self.ensure_initialized()?;
        let objects = self.objects.read();
        let list = objects
            .get(&query.class_name)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        query.run(list)
    }

    async fn config(&self) -> Result<Attributes> {
        self.ensure_initialized()?;
        Ok(self.params.read().clone())
    }
}
