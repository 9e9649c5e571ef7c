//! The connected proxy handle.

use crate::backend::{Backend, Query};
use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::filters::{apply_filters, FilterDescriptor};
use crate::subscriptions::{Dispatcher, HandlerSet, SubscriptionHandle};
use crate::types::{Attributes, ParseObject, RecordKind};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info};

/// Save in flight, resolving to the persisted object.
pub type PendingObject<'a> = Pin<Box<dyn Future<Output = Result<ParseObject>> + Send + 'a>>;

/// Message-oriented access to an initialized backend.
///
/// Returned by [`ParseProxy::init`]; every operation runs through it, so
/// there is no separate "ready" state to check.
pub struct ParseProxy<B: Backend> {
    config: ProxyConfig,
    backend: Arc<B>,
}

impl<B: Backend> Clone for ParseProxy<B> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            backend: Arc::clone(&self.backend),
        }
    }
}

impl<B: Backend> ParseProxy<B> {
    /// Validate `config` and initialize `backend` with its credentials.
    pub fn init(config: ProxyConfig, backend: B) -> Result<Self> {
        Self::init_shared(config, Arc::new(backend))
    }

    /// Like [`ParseProxy::init`], for a backend the caller keeps a handle to.
    pub fn init_shared(config: ProxyConfig, backend: Arc<B>) -> Result<Self> {
        config.validate()?;
        backend.initialize(&config.credentials)?;
        info!(
            app_id = %config.credentials.app_id,
            server_url = %config.credentials.server_url,
            "proxy initialized"
        );
        Ok(Self { config, backend })
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    // --- Subscriptions ---

    /// Open a live subscription on the class of `kind`, narrowed by
    /// `filters`, and route its events to `handlers`.
    pub fn subscribe(
        &self,
        kind: RecordKind,
        handlers: HandlerSet,
        filters: Option<&[FilterDescriptor]>,
    ) -> Result<SubscriptionHandle<B>> {
        let schema = self.config.schema(kind).clone();
        let query = self.query(&schema.class_name, filters);
        let live = self.backend.subscribe(&query)?;
        debug!(class_name = %schema.class_name, subscription_id = %live.id, "subscribed");

        SubscriptionHandle::spawn(
            Arc::clone(&self.backend),
            live,
            Dispatcher::new(schema, handlers),
        )
    }

    pub fn subscribe_message_inbound(
        &self,
        handlers: HandlerSet,
        filters: Option<&[FilterDescriptor]>,
    ) -> Result<SubscriptionHandle<B>> {
        self.subscribe(RecordKind::Inbound, handlers, filters)
    }

    pub fn subscribe_message_outbound(
        &self,
        handlers: HandlerSet,
        filters: Option<&[FilterDescriptor]>,
    ) -> Result<SubscriptionHandle<B>> {
        self.subscribe(RecordKind::Outbound, handlers, filters)
    }

    // --- Records ---

    /// Check `payload` against the schema of `kind` and start saving it.
    ///
    /// Missing keys fail here, before the backend is called. Backend
    /// failures surface through the returned future.
    pub fn create(&self, kind: RecordKind, payload: Attributes) -> Result<PendingObject<'_>> {
        let schema = self.config.schema(kind);
        let missing = schema.missing_keys(&payload);
        if !missing.is_empty() {
            return Err(ProxyError::MissingKeys {
                class_name: schema.class_name.clone(),
                missing,
            });
        }
        debug!(class_name = %schema.class_name, "creating object");
        Ok(self.backend.save(&schema.class_name, payload))
    }

    pub fn create_message_inbound(&self, payload: Attributes) -> Result<PendingObject<'_>> {
        self.create(RecordKind::Inbound, payload)
    }

    pub fn create_message_outbound(&self, payload: Attributes) -> Result<PendingObject<'_>> {
        self.create(RecordKind::Outbound, payload)
    }

    pub async fn get_by_id(&self, kind: RecordKind, object_id: &str) -> Result<ParseObject> {
        let class_name = &self.config.schema(kind).class_name;
        self.backend.get(class_name, object_id).await
    }

    pub async fn get_message_inbound_by_id(&self, object_id: &str) -> Result<ParseObject> {
        self.get_by_id(RecordKind::Inbound, object_id).await
    }

    pub async fn get_message_outbound_by_id(&self, object_id: &str) -> Result<ParseObject> {
        self.get_by_id(RecordKind::Outbound, object_id).await
    }

    // --- Queries ---

    /// Query on any class with `filters` applied.
    pub fn query(&self, class_name: &str, filters: Option<&[FilterDescriptor]>) -> B::Query {
        let mut query = self.backend.query(class_name);
        if let Some(filters) = filters {
            apply_filters(&mut query, filters);
        }
        query
    }

    pub async fn find(&self, query: &B::Query) -> Result<Vec<ParseObject>> {
        debug!(class_name = query.class_name(), "find");
        self.backend.find(query).await
    }

    /// Server-side config parameters.
    pub async fn get_config(&self) -> Result<Attributes> {
        self.backend.config().await
    }
}
