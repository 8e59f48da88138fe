//! Topic membership and fan-out.
//!
//! `Registry` owns which connections belong to which topic. `Broadcaster`
//! takes a snapshot from it and delivers a message to every member without
//! holding the registry lock.

pub mod broadcaster;
pub mod registry;
pub mod topic;

pub use broadcaster::{Broadcaster, DeliveryReport};
pub use registry::Registry;
