//! # Parley
//!
//! A chat platform bot SDK: a self-healing gateway connection plus a rate-limited REST client.

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(missing_debug_implementations, missing_docs)]
#![forbid(unsafe_code)]

pub mod api;
pub mod config;
pub mod listener;
pub mod ws;

mod bot;
mod error;

pub use bot::{Bot, EVENT_DISCONNECT, EVENT_ERROR, EVENT_READY};
pub use config::Config;
pub use error::{Error, Result};
