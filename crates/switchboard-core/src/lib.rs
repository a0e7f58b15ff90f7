//! Switchboard Core Library
//!
//! This crate provides the core functionality for Switchboard, including:
//! - Expert routing (vector similarity, performance scoring, adaptive voting)
//! - Embedding client with caching and retries
//! - Configuration management
//! - Error types with codes and suggestions

pub mod config;
pub mod embedding;
pub mod error;
pub mod routing;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::routing::{
        AdaptiveStrategy, ExpertKind, Feedback, RoutingDecision, RoutingStrategy,
    };
}

#[cfg(test)]
mod error_tests;
