//! Campus shuttle client core: session handling, auth, navigation gating,
//! and the fleet and notification services the screens read from.

pub mod config;
pub mod events;
pub mod map;
pub mod provider;
pub mod services;
pub mod session;
