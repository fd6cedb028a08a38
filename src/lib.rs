// Clippy allows for reasonable defaults
// These suppress warnings where the suggested change doesn't improve readability
#![allow(clippy::new_without_default)] // Default not always appropriate for stateful types
#![allow(clippy::derivable_impls)] // Explicit Default impls can be clearer
#![allow(clippy::needless_borrows_for_generic_args)] // Explicit borrows clarify intent

//! Web Push notification server
//!
//! - [`push`]: key handling, RFC 8291 payload encryption, VAPID signing,
//!   subscriber registry and delivery
//! - [`config`]: TOML + command line configuration
//! - [`server`]: HTTP API under `/api/v1`

// Module declarations
pub mod config;
pub mod push;

// Server module (HTTP API)
pub mod server;
