//! Nova Act client.
//!
//! [`ActClient`] owns one browser session and turns natural-language
//! instructions into acts, dispatched either to the browser extension or to
//! a caller-supplied actuator. Configuration comes from YAML with
//! environment overrides; see [`load_client_config`].

pub mod client;
pub mod config;
pub mod factory;
pub mod logging;
pub mod schema;
pub mod validation;

pub use client::{ActClient, ActOptions, ClientError, RateLimitRetry};
pub use config::{load_client_config, ClientConfig, ConfigError, LoggingConfig};
pub use factory::{create_act_dispatcher, ActuationSurface};
pub use logging::init_logging;
pub use validation::ValidationError;

pub use nova_act_core::{ActError, ActErrorKind, ActResult, Backend, ModelKnobs};
pub use nova_act_dispatch::CancellationFlag;
