//! Dispatch through the browser extension over the encrypted channel.

use crate::cancel::CancellationFlag;
use crate::dispatcher::{client_error, session_error, ActDispatcher};
use crate::trace::TraceContext;
use async_trait::async_trait;
use nova_act_channel::messages::{
    cancel_prompt_message, pending_prompt_message, wait_for_page_to_settle_message,
};
use nova_act_channel::{
    AwsCredentials, ChannelError, ExtensionTransport, MessageEncrypter, WindowMessageHandler,
};
use nova_act_core::{
    resolve_outcome, Act, ActError, ActErrorKind, ActResult, BackendInfo, PageState,
    NOVA_ACT_CLIENT,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const ACK_FAILURE: &str = "Failed to receive Acknowledgment after dispatching a prompt to browser";
const CANCEL_FAILURE: &str = "Failed to cancel Act";

/// Poll cadence and bounds of the extension protocol.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionTimings {
    pub poll_interval: Duration,
    /// How long the extension has to accept a prompt or confirm a cancel.
    pub ack_timeout: Duration,
    pub retry_delay: Duration,
    pub retry_tries: u32,
    pub settle_timeout: Duration,
}

impl Default for ExtensionTimings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            ack_timeout: Duration::from_secs(30),
            retry_delay: Duration::from_secs(2),
            retry_tries: 5,
            settle_timeout: Duration::from_secs(15),
        }
    }
}

pub struct ExtensionDispatcher {
    backend: BackendInfo,
    api_key: String,
    aws_credentials: Option<AwsCredentials>,
    transport: Arc<dyn ExtensionTransport>,
    encrypter: Arc<MessageEncrypter>,
    handler: WindowMessageHandler,
    timings: ExtensionTimings,
    retry: bool,
    key_installed: bool,
    cancellation: CancellationFlag,
    trace: TraceContext,
}

impl ExtensionDispatcher {
    pub fn new(
        backend: BackendInfo,
        api_key: impl Into<String>,
        transport: Arc<dyn ExtensionTransport>,
        trace: TraceContext,
    ) -> Self {
        let encrypter = Arc::new(MessageEncrypter::new());
        Self {
            backend,
            api_key: api_key.into(),
            aws_credentials: None,
            transport,
            handler: WindowMessageHandler::new(encrypter.clone()),
            encrypter,
            timings: ExtensionTimings::default(),
            retry: true,
            key_installed: false,
            cancellation: CancellationFlag::new(),
            trace,
        }
    }

    pub fn with_timings(mut self, timings: ExtensionTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn with_aws_credentials(mut self, credentials: Option<AwsCredentials>) -> Self {
        self.aws_credentials = credentials;
        self
    }

    /// Disable retries of the initial handshake.
    pub fn with_retry(mut self, retry: bool) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationFlag) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Send the session key in plaintext. Happens once, before any encrypted
    /// traffic.
    pub async fn install_key(&mut self) -> Result<(), ChannelError> {
        if self.key_installed {
            return Ok(());
        }
        self.transport
            .post_message(&self.encrypter.set_key_message())
            .await?;
        self.key_installed = true;
        debug!("Installed channel key");
        Ok(())
    }

    /// Encrypt and post. Delivery failures are logged and otherwise ignored;
    /// the caller's poll deadline decides what happens next.
    async fn post(&self, message: &Value) -> Result<(), ChannelError> {
        let envelope = self.encrypter.encrypt(message)?;
        if let Err(e) = self.transport.post_message(&envelope).await {
            warn!("Failed to post message to extension: {}", e);
        }
        Ok(())
    }

    /// Sleep one poll interval, then apply everything the extension sent.
    async fn poll(&mut self, mut act: Option<&mut Act>) {
        tokio::time::sleep(self.timings.poll_interval).await;

        let messages = match self.transport.drain_messages().await {
            Ok(messages) => messages,
            Err(e) => {
                debug!("Polling extension failed: {}", e);
                return;
            }
        };
        for raw in messages {
            if let Err(e) = self.handler.handle_message(&raw, act.as_deref_mut()) {
                warn!("Dropping message from extension: {}", e);
            }
        }
    }

    async fn dispatch_prompt_and_wait_for_ack(&mut self, act: &mut Act) -> Result<(), ActError> {
        let message = pending_prompt_message(
            act,
            &self.api_key,
            &self.backend.api_uri,
            self.aws_credentials.as_ref(),
        )
        .map_err(|e| client_error(act, e))?;
        self.post(&message).await.map_err(|e| client_error(act, e))?;

        let wait = act
            .remaining()
            .map_or(self.timings.ack_timeout, |left| left.min(self.timings.ack_timeout));
        let deadline = Instant::now() + wait;
        while Instant::now() < deadline {
            if act.is_acknowledged() || act.is_complete() {
                return Ok(());
            }
            self.poll(Some(&mut *act)).await;
        }

        // The act's own deadline came first; the poll loop times it out.
        if act.is_past_deadline() {
            return Ok(());
        }

        Err(ActError::new(ActErrorKind::Dispatch, act.metadata()).with_message(ACK_FAILURE))
    }

    async fn dispatch_with_retry(&mut self, act: &mut Act) -> Result<(), ActError> {
        let tries = if self.retry {
            self.timings.retry_tries.max(1)
        } else {
            1
        };

        let mut attempt = 1;
        loop {
            match self.dispatch_prompt_and_wait_for_ack(act).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < tries && e.kind() == ActErrorKind::Dispatch => {
                    warn!("Dispatch attempt {}/{} failed, retrying", attempt, tries);
                    attempt += 1;
                    tokio::time::sleep(self.timings.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Send a cancel and wait for the act to reach a terminal state.
    /// Returns whether it did within the ack timeout.
    async fn cancel_and_wait(&mut self, act: &mut Act) -> Result<bool, ActError> {
        self.post(&cancel_prompt_message())
            .await
            .map_err(|e| client_error(act, e))?;

        let deadline = Instant::now() + self.timings.ack_timeout;
        while Instant::now() < deadline {
            if act.is_complete() {
                return Ok(true);
            }
            self.poll(Some(&mut *act)).await;
        }
        Ok(act.is_complete())
    }

    async fn time_out(&mut self, act: &mut Act) -> Result<(), ActError> {
        act.mark_timed_out().map_err(|e| client_error(act, e))?;
        info!("Act {} timed out, canceling", act.id());
        if !self.cancel_and_wait(act).await? {
            warn!("Extension did not confirm cancel of timed out act {}", act.id());
            act.fail(json!({ "type": NOVA_ACT_CLIENT, "error": "Act timed out" }))
                .map_err(|e| client_error(act, e))?;
        }
        Ok(())
    }

    async fn run(&mut self, act: &mut Act) -> Result<ActResult, ActError> {
        self.install_key().await.map_err(|e| client_error(act, e))?;
        self.handler.bind(act).map_err(|e| client_error(act, e))?;
        self.cancellation.reset();

        debug!("Dispatching act {} for session {}", act.id(), act.session_id());
        self.dispatch_with_retry(act).await?;

        let mut scroller = self.trace.scroller(5);
        let mut steps_observed = 0;
        while !act.is_complete() {
            if act.is_past_deadline() {
                self.time_out(act).await?;
                break;
            }

            self.poll(Some(&mut *act)).await;
            scroller.tick();

            for step in &act.steps()[steps_observed..] {
                self.trace.program(&step.model_output().awl_raw_program);
            }
            steps_observed = act.steps().len();

            if self.cancellation.is_triggered() && !act.is_complete() {
                self.cancellation.reset();
                self.trace.line("Terminating agent workflow");
                if !self.cancel_and_wait(act).await? {
                    return Err(ActError::new(ActErrorKind::Dispatch, act.metadata())
                        .with_message(CANCEL_FAILURE));
                }
            }
        }

        resolve_outcome(act, &self.backend)
    }
}

#[async_trait]
impl ActDispatcher for ExtensionDispatcher {
    async fn dispatch(&mut self, act: &mut Act) -> Result<ActResult, ActError> {
        let outcome = self.run(act).await;
        self.handler.release();
        outcome
    }

    async fn wait_for_page_to_settle(
        &mut self,
        session_id: &str,
        timeout: Option<Duration>,
    ) -> Result<(), ActError> {
        let timeout = timeout.unwrap_or(self.timings.settle_timeout);
        let channel_error = |e: ChannelError| session_error(ActErrorKind::Client, session_id, e);

        self.install_key().await.map_err(channel_error)?;
        self.handler
            .bind_page(PageState::new(session_id))
            .map_err(channel_error)?;

        let message = wait_for_page_to_settle_message(
            &self.api_key,
            &self.backend.api_uri,
            session_id,
            timeout.as_secs(),
        );
        if let Err(e) = self.post(&message).await {
            self.handler.release();
            return Err(channel_error(e));
        }

        let deadline = Instant::now() + self.timings.ack_timeout + timeout;
        let settled = loop {
            if self.handler.page_settled() == Some(true) {
                break true;
            }
            if Instant::now() >= deadline {
                break false;
            }
            self.poll(None).await;
        };
        self.handler.release();

        if !settled {
            warn!("Page not settled after {}s", timeout.as_secs());
        }
        Ok(())
    }

    async fn go_to_url(
        &mut self,
        url: &str,
        session_id: &str,
        timeout: Option<Duration>,
    ) -> Result<(), ActError> {
        self.transport
            .navigate(url)
            .await
            .map_err(|e| session_error(ActErrorKind::Client, session_id, e))?;
        self.wait_for_page_to_settle(session_id, timeout).await
    }

    fn cancellation_flag(&self) -> &CancellationFlag {
        &self.cancellation
    }
}
