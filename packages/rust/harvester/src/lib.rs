//! Chat-history link harvesting.
//!
//! This crate provides:
//! - [`source`] — the [`ChatHistory`] trait and message model
//! - [`gateway`] — a [`ChatHistory`] over a TDLib JSON gateway
//! - [`engine`] — the [`Harvester`] loop that persists track links

pub mod engine;
pub mod gateway;
pub mod source;

pub use engine::{HarvestEnd, HarvestReport, Harvester};
pub use gateway::TdGateway;
pub use source::{ChatHistory, ChatMessage, Cursor, MessageContent};
