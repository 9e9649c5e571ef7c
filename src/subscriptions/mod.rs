//! Live subscriptions routed to caller-supplied handlers.
//!
//! Each subscription gets its own dispatcher thread that consumes the
//! backend's event stream in order and calls one handler per event before
//! taking the next:
//! - `Created` reaches `on_create` only when the object carries every
//!   required key of its record schema; otherwise it is dropped
//! - `Updated`, `Entered`, `Deleted` and `Error` go to their optional
//!   handler unchecked
//! - `Closed` runs `on_close` and ends the thread
//!
//! # Example
//!
//! ```ignore
//! let handlers = HandlerSet::builder()
//!     .on_create(|message| println!("new message: {}", message))
//!     .on_close(|| println!("closed"))
//!     .build()?;
//!
//! let filters = [FilterDescriptor::equal_to("channel", "c1")];
//! let handle = proxy.subscribe_message_inbound(handlers, Some(&filters))?;
//!
//! // Later
//! let stats = handle.close()?;
//! ```

mod dispatcher;
mod handlers;

pub use dispatcher::{DispatchStats, Dispatcher, SubscriptionHandle};
pub use handlers::{CloseHandler, ErrorHandler, HandlerSet, HandlerSetBuilder, ObjectHandler};
