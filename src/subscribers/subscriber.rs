//! # Event subscriber trait.
//!
//! [`Subscribe`] is the injectable observability hook: anything that wants to
//! watch a bring-up (logging, metrics, a progress display) implements it and is
//! handed to [`SupervisorBuilder::with_subscribers`](crate::SupervisorBuilder::with_subscribers).
//!
//! Each subscriber gets a dedicated worker task and a bounded queue, so a slow
//! subscriber never delays the bring-up itself.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use nix_remote::{Event, EventKind, Subscribe};
//!
//! struct Progress;
//!
//! #[async_trait]
//! impl Subscribe for Progress {
//!     async fn on_event(&self, ev: &Event) {
//!         if matches!(ev.kind, EventKind::ProbeFailed) {
//!             eprint!(".");
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "progress" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Event subscriber for bring-up observability.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor.
/// - Handle errors internally; do not panic.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event, in FIFO order per subscriber.
    ///
    /// Panics are caught; the set publishes `EventKind::SubscriberPanicked`.
    async fn on_event(&self, event: &Event);

    /// Short name used in overflow/panic events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Queue capacity for this subscriber (clamped to at least 1). Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
