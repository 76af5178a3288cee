//! Core domain + application logic for the media transfer bot.
//!
//! Framework-agnostic: Telegram lives behind the [`messaging::port::ChatPlatform`] and
//! [`replies::ReplySource`] ports, implemented in the adapter crate.

pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod link;
pub mod logging;
pub mod messaging;
pub mod orchestrator;
pub mod replies;
pub mod security;
pub mod transfer;
pub mod wizard;

#[cfg(test)]
mod testing;

pub use errors::{Error, Result};
