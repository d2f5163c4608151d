//! # wabridge-core
//!
//! Core types, traits, configuration, and error handling for the wabridge
//! WhatsApp HTTP bridge.

pub mod config;
pub mod error;
pub mod event;
pub mod message;
pub mod phone;
pub mod traits;
