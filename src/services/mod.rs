//! Application services behind the console shell.
//!
//! ARCHITECTURE
//! ============
//! `auth` owns every session mutation and `navigation` only observes the
//! session store. `fleet` and `notification` are independent in-memory
//! services with their own event hubs.

pub mod auth;
pub mod fleet;
pub mod navigation;
pub mod notification;
pub mod validation;
