//! # Controller Bus Module
//!
//! Fan-out of controller events to an arbitrary number of subscribers.
//!
//! ## Overview
//!
//! - Each controller owns one [`ControllerBus`]
//! - Subscribers attach with an [`EventFilter`] and either a synchronous
//!   handler or an unbounded channel
//! - Broadcasts reach subscribers in attach order; a single subscriber can
//!   be addressed with [`ControllerBus::send_to`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cncstream_core::event_bus::{ControllerBus, EventCategory, EventFilter};
//!
//! let bus = ControllerBus::new();
//! let (id, mut rx) = bus.channel(EventFilter::Categories(vec![EventCategory::Machine]));
//! while let Some(event) = rx.recv().await {
//!     println!("{}", event.description());
//! }
//! bus.unsubscribe(id);
//! ```

mod bus;
mod events;

pub use bus::*;
pub use events::*;
