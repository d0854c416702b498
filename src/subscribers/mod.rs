//! # Event subscribers.
//!
//! The [`Subscribe`] trait and the built-in [`LogWriter`] consume events
//! published on the [`Bus`](crate::Bus) during a bring-up.
//!
//! ## Architecture
//! ```text
//! Supervisor / ProcessGuard ── publish(Event) ──► Bus ──► listener ──► SubscriberSet
//!                                                                          │
//!                                                             ┌────────────┼──────────┐
//!                                                             ▼            ▼          ▼
//!                                                         LogWriter     Metrics    Custom
//! ```

mod log;
mod subscriber;
mod subscriber_set;

pub use log::LogWriter;
pub use subscriber::Subscribe;
pub use subscriber_set::SubscriberSet;
