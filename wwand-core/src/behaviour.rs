use crate::auth::{AuthError, AuthOutcome};
use crate::device::{DeviceProfile, ModemCommands};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use wwand_at::AtError;

/// Bring-up stages, in order. `Ready` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Auth,
    Init,
    Registration,
    Ready,
}

/// Closed set of failure tags callers may register handlers for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureTag {
    SimNotInserted,
    SimFailure,
    AuthCancelled,
    SimLocked,
    AuthCommand,
    Init,
    Registration,
}

/// What the (external) registration machine resolves with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationInfo {
    pub operator: Option<String>,
    pub roaming: bool,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("network registration denied")]
    Denied,
    #[error("network registration timed out")]
    Timeout,
}

/// Failure of a bring-up stage, routed to registered handlers by tag.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BringUpError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("device init failed: {0}")]
    Init(AtError),
    #[error(transparent)]
    Registration(#[from] RegistrationError),
}

impl BringUpError {
    pub fn tag(&self) -> FailureTag {
        match self {
            BringUpError::Auth(AuthError::SimNotInserted) => FailureTag::SimNotInserted,
            BringUpError::Auth(AuthError::SimFailure) => FailureTag::SimFailure,
            BringUpError::Auth(AuthError::Cancelled) => FailureTag::AuthCancelled,
            BringUpError::Auth(AuthError::Puk2Exhausted) => FailureTag::SimLocked,
            BringUpError::Auth(AuthError::Command(_)) => FailureTag::AuthCommand,
            BringUpError::Init(_) => FailureTag::Init,
            BringUpError::Registration(_) => FailureTag::Registration,
        }
    }
}

#[async_trait]
pub trait AuthStage: Send {
    async fn run(&mut self) -> Result<AuthOutcome, AuthError>;
}

#[async_trait]
pub trait InitStage: Send {
    async fn run(&mut self) -> Result<(), AtError>;
}

/// Contract for the external network-registration machine: constructed from
/// a device, exposes one driving operation.
#[async_trait]
pub trait RegistrationStage: Send {
    async fn run(&mut self) -> Result<RegistrationInfo, RegistrationError>;
}

pub type Hook = Box<dyn Fn(Stage) + Send + Sync>;
pub type FailureHandler = Box<dyn Fn(&BringUpError) + Send + Sync>;

/// Sequences Auth → Init → Registration → Ready, driving each injected
/// sub-machine to completion.
///
/// At most one enter/exit hook per stage and one handler per failure tag;
/// registering again overwrites. An unhandled failure is logged and
/// dropped -- the orchestrator cannot know what every embedding layer wants
/// done with every failure kind.
pub struct BringUp {
    stage: Stage,
    auth: Box<dyn AuthStage>,
    init: Box<dyn InitStage>,
    registration: Box<dyn RegistrationStage>,
    device: Arc<Mutex<dyn ModemCommands>>,
    profile: DeviceProfile,
    enter_hooks: HashMap<Stage, Hook>,
    exit_hooks: HashMap<Stage, Hook>,
    failure_handlers: HashMap<FailureTag, FailureHandler>,
}

impl BringUp {
    pub fn new(
        auth: Box<dyn AuthStage>,
        init: Box<dyn InitStage>,
        registration: Box<dyn RegistrationStage>,
        device: Arc<Mutex<dyn ModemCommands>>,
        profile: DeviceProfile,
    ) -> Self {
        Self {
            stage: Stage::Auth,
            auth,
            init,
            registration,
            device,
            profile,
            enter_hooks: HashMap::new(),
            exit_hooks: HashMap::new(),
            failure_handlers: HashMap::new(),
        }
    }

    /// The live stage, so asynchronous notifications can be routed to
    /// whichever sub-machine is active.
    pub fn current_stage(&self) -> Stage {
        self.stage
    }

    pub fn on_enter(&mut self, stage: Stage, hook: Hook) {
        self.enter_hooks.insert(stage, hook);
    }

    pub fn on_exit(&mut self, stage: Stage, hook: Hook) {
        self.exit_hooks.insert(stage, hook);
    }

    pub fn on_failure(&mut self, tag: FailureTag, handler: FailureHandler) {
        self.failure_handlers.insert(tag, handler);
    }

    /// Drives the stages to `Ready`. Failures are routed to the registered
    /// handler for their tag before propagating.
    pub async fn start(&mut self) -> Result<RegistrationInfo, BringUpError> {
        info!(vendor = %self.profile.vendor, "starting device bring-up");

        self.transition(Stage::Auth);
        let result = self.auth.run().await.map_err(BringUpError::from);
        let outcome = self.escalate(result)?;
        debug!(?outcome, "auth stage done");

        self.transition(Stage::Init);
        let result = self.init.run().await.map_err(BringUpError::Init);
        self.escalate(result)?;

        self.transition(Stage::Registration);
        let result = self.registration.run().await.map_err(BringUpError::from);
        let info = self.escalate(result)?;

        self.transition(Stage::Ready);
        self.apply_preferred_mode().await;
        info!(operator = ?info.operator, "device ready");

        Ok(info)
    }

    /// Routes a stage failure to its registered handler before propagating.
    fn escalate<T>(
        &self,
        result: Result<T, BringUpError>,
    ) -> Result<T, BringUpError> {
        result.inspect_err(|e| self.dispatch_failure(e))
    }

    fn transition(&mut self, to: Stage) {
        if self.stage == to {
            if let Some(hook) = self.enter_hooks.get(&to) {
                hook(to);
            }
            return;
        }

        if let Some(hook) = self.exit_hooks.get(&self.stage) {
            hook(self.stage);
        }

        debug!(from = ?self.stage, ?to, "stage transition");
        self.stage = to;

        if let Some(hook) = self.enter_hooks.get(&to) {
            hook(to);
        }
    }

    fn dispatch_failure(&self, error: &BringUpError) {
        let tag = error.tag();

        match self.failure_handlers.get(&tag) {
            Some(handler) => handler(error),
            None => warn!(?tag, "unhandled bring-up failure: {error}"),
        }
    }

    /// Applies the profile's preferred connection mode once `Ready`. A
    /// missing table entry is tolerated.
    async fn apply_preferred_mode(&mut self) {
        let Some(preferred) = &self.profile.preferred_mode else {
            return;
        };

        let Some(literal) = self.profile.connection_modes.get(preferred) else {
            debug!(%preferred, "no connection-mode entry for preferred mode");
            return;
        };

        if let Err(e) = self
            .device
            .lock()
            .await
            .set_connection_mode(literal)
            .await
        {
            warn!(%preferred, "failed to apply preferred connection mode: {e}");
        }
    }
}
