//! Caller-supplied callbacks for a live subscription.

use crate::error::{ProxyError, Result};
use crate::types::ParseObject;

/// Callback receiving an object.
pub type ObjectHandler = Box<dyn FnMut(ParseObject) + Send>;

/// Callback run when the subscription closes.
pub type CloseHandler = Box<dyn FnMut() + Send>;

/// Callback receiving a transport failure message.
pub type ErrorHandler = Box<dyn FnMut(&str) + Send>;

/// Callbacks for one subscription. `on_create` is mandatory, the rest are
/// optional. Fixed once the subscription starts.
pub struct HandlerSet {
    pub(crate) on_create: ObjectHandler,
    pub(crate) on_update: Option<ObjectHandler>,
    pub(crate) on_enter: Option<ObjectHandler>,
    pub(crate) on_delete: Option<ObjectHandler>,
    pub(crate) on_close: Option<CloseHandler>,
    pub(crate) on_error: Option<ErrorHandler>,
}

impl HandlerSet {
    /// Handler set with only `on_create`.
    pub fn new(on_create: impl FnMut(ParseObject) + Send + 'static) -> Self {
        Self {
            on_create: Box::new(on_create),
            on_update: None,
            on_enter: None,
            on_delete: None,
            on_close: None,
            on_error: None,
        }
    }

    pub fn builder() -> HandlerSetBuilder {
        HandlerSetBuilder::default()
    }
}

/// Builder for [`HandlerSet`]. `build` fails when `on_create` was not set.
#[derive(Default)]
pub struct HandlerSetBuilder {
    on_create: Option<ObjectHandler>,
    on_update: Option<ObjectHandler>,
    on_enter: Option<ObjectHandler>,
    on_delete: Option<ObjectHandler>,
    on_close: Option<CloseHandler>,
    on_error: Option<ErrorHandler>,
}

impl HandlerSetBuilder {
    pub fn on_create(mut self, f: impl FnMut(ParseObject) + Send + 'static) -> Self {
        self.on_create = Some(Box::new(f));
        self
    }

    pub fn on_update(mut self, f: impl FnMut(ParseObject) + Send + 'static) -> Self {
        self.on_update = Some(Box::new(f));
        self
    }

    pub fn on_enter(mut self, f: impl FnMut(ParseObject) + Send + 'static) -> Self {
        self.on_enter = Some(Box::new(f));
        self
    }

    pub fn on_delete(mut self, f: impl FnMut(ParseObject) + Send + 'static) -> Self {
        self.on_delete = Some(Box::new(f));
        self
    }

    pub fn on_close(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_close = Some(Box::new(f));
        self
    }

    /// Receives transport failures reported while the subscription is open.
    pub fn on_error(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn build(self) -> Result<HandlerSet> {
        let on_create = self
            .on_create
            .ok_or(ProxyError::MissingHandler("on_create"))?;
        Ok(HandlerSet {
            on_create,
            on_update: self.on_update,
            on_enter: self.on_enter,
            on_delete: self.on_delete,
            on_close: self.on_close,
            on_error: self.on_error,
        })
    }
}
