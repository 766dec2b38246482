//! Estate Common - Shared configuration, errors, and logging for the Estate agent services.
//!
//! This crate provides:
//! - Configuration types and loading (`~/.estate/config.json` plus env overrides)
//! - The unified service error type
//! - Logging setup with noise filtering

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;

pub use config::{
    AgentConfig, Config, GatewayConfig, ModelConfig, ObservabilityConfig, ScheduleEntry,
    SecretsConfig,
};
pub use error::{Error, Result};

