//! Builds a configured client for one actuation surface.

use crate::client::{ActClient, ClientError, RateLimitRetry};
use crate::config::{ClientConfig, ConfigError};
use crate::logging::{is_quiet, resolve_filter, LOG_LEVEL_ENV};
use crate::validation::{validate_api_key, validate_param_length};
use nova_act_channel::{AwsCredentials, ExtensionTransport};
use nova_act_dispatch::{
    ActDispatcher, CancellationFlag, CustomActDispatcher, ExtensionDispatcher, Routes, StepClient,
    TraceContext,
};
use nova_act_interpreter::BrowserActuator;
use std::sync::Arc;
use tracing::info;

/// Where acts are carried out.
pub enum ActuationSurface {
    /// A browser extension reached through the encrypted channel.
    Extension {
        transport: Arc<dyn ExtensionTransport>,
        aws_credentials: Option<AwsCredentials>,
    },
    /// A caller-supplied actuator; programs come from the step endpoint.
    Custom { actuator: Arc<dyn BrowserActuator> },
    /// As `Custom`, with programs from the given step client.
    CustomWithStepClient {
        actuator: Arc<dyn BrowserActuator>,
        step_client: Arc<dyn StepClient>,
    },
}

impl ActuationSurface {
    pub fn extension(transport: Arc<dyn ExtensionTransport>) -> Self {
        ActuationSurface::Extension {
            transport,
            aws_credentials: None,
        }
    }

    pub fn custom(actuator: Arc<dyn BrowserActuator>) -> Self {
        ActuationSurface::Custom { actuator }
    }
}

/// Dispatcher for `surface`: the custom loop when an actuator is supplied,
/// the extension channel otherwise.
pub fn create_act_dispatcher(
    config: &ClientConfig,
    surface: ActuationSurface,
    trace: TraceContext,
    cancellation: CancellationFlag,
) -> Result<Box<dyn ActDispatcher>, ConfigError> {
    let api_key = config.require_api_key()?;
    let backend = config.backend.info();

    let dispatcher: Box<dyn ActDispatcher> = match surface {
        ActuationSurface::Extension {
            transport,
            aws_credentials,
        } => Box::new(
            ExtensionDispatcher::new(backend, api_key, transport, trace)
                .with_timings(config.extension.timings()?)
                .with_retry(config.retry)
                .with_aws_credentials(aws_credentials)
                .with_cancellation(cancellation),
        ),
        ActuationSurface::Custom { actuator } => {
            let routes = Routes::with_timeouts(
                &backend,
                api_key,
                config.custom.connect_timeout()?,
                config.custom.read_timeout()?,
            )
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
            Box::new(
                CustomActDispatcher::new(backend, actuator, Arc::new(routes), trace)
                    .with_settle_timeout(config.custom.settle_timeout()?)
                    .with_cancellation(cancellation),
            )
        }
        ActuationSurface::CustomWithStepClient {
            actuator,
            step_client,
        } => Box::new(
            CustomActDispatcher::new(backend, actuator, step_client, trace)
                .with_settle_timeout(config.custom.settle_timeout()?)
                .with_cancellation(cancellation),
        ),
    };
    Ok(dispatcher)
}

impl ActClient {
    /// New session with a fresh session id, configured from `config`.
    ///
    /// # Errors
    /// Returns error if the API key is missing or malformed, or if the
    /// configured timings are invalid.
    pub fn from_config(config: &ClientConfig, surface: ActuationSurface) -> Result<Self, ClientError> {
        validate_api_key(config.require_api_key()?)?;
        validate_param_length("endpoint_name", &config.endpoint_name)?;

        let session_id = uuid::Uuid::new_v4().to_string();
        let filter = resolve_filter(&config.logging, std::env::var(LOG_LEVEL_ENV).ok());
        let trace = TraceContext::new(session_id.as_str()).with_quiet(is_quiet(&config.logging, &filter));

        let dispatcher = create_act_dispatcher(config, surface, trace.clone(), CancellationFlag::new())?;
        let rate_limit_retry = RateLimitRetry {
            tries: config.rate_limit_retry.tries,
            delay: config.rate_limit_retry.delay()?,
        };
        info!("Created session {} against {}", session_id, config.backend.info().api_uri);

        Ok(ActClient::new(dispatcher, trace)
            .with_endpoint_name(config.endpoint_name.as_str())
            .with_rate_limit_retry(rate_limit_retry)
            .with_tty(config.tty))
    }
}
