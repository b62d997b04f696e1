//! Shared wire types and HTTP clients for the Stellarium bot.
//!
//! - [`objects`]: Horizon and Telegram JSON records.
//! - [`address`]: Stellar account address (strkey) validation.
//! - [`sse`]: incremental server-sent-events decoder used by the Horizon
//!   streaming endpoints.
//! - `client` (feature `client`): typed `reqwest` clients.

pub mod address;
pub mod objects;
pub mod sse;

#[cfg(feature = "client")]
pub mod client;
