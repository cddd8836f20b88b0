//! # stowage-core
//!
//! Shared building blocks for the stowage crates:
//!
//! | Item | Description |
//! |------|-------------|
//! | [`Context`] | Cancellation token plus optional deadline, threaded through every port call |
//! | [`Interrupted`] | Why a [`Context`] stopped an operation (`Cancelled` / `DeadlineExceeded`) |
//! | [`ErrorKind`] / [`Classify`] | Backend-independent error classification |
//! | [`StowageConfig`] | Layered YAML / `.env` / environment configuration |
//! | [`init_tracing`] | Installs the default `tracing` subscriber |

pub mod config;
pub mod context;
pub mod error;
pub mod tracing_setup;

pub use config::{ConfigError, ConfigValue, FromConfig, FromConfigValue, StowageConfig};
pub use context::{Context, Interrupted};
pub use error::{Classify, ErrorKind};
pub use tracing_setup::init_tracing;
