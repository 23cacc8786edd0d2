//! Core domain + application logic for the Xray admin bot.
//!
//! This crate is intentionally framework-agnostic. Telegram, systemd and the
//! host's `/proc` live behind ports (traits) so the menu can be driven from tests.

pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod inbound;
pub mod logging;
pub mod menu;
pub mod messaging;
pub mod probe;
pub mod security;
pub mod service;

pub use errors::{Error, Result};
