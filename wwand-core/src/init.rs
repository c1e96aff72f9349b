use crate::auth::{AuthConfig, AuthError, AuthFlow, AuthOutcome, CredentialsProvider};
use crate::behaviour::{AuthStage, InitStage};
use crate::device::ModemCommands;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use wwand_at::AtError;

/// [`AuthStage`] over a shared device handle: locks the control channel for
/// the duration of one [`AuthFlow`] attempt.
pub struct SimAuthStage {
    device: Arc<Mutex<dyn ModemCommands>>,
    provider: Arc<dyn CredentialsProvider>,
    cfg: AuthConfig,
}

impl SimAuthStage {
    pub fn new(
        device: Arc<Mutex<dyn ModemCommands>>,
        provider: Arc<dyn CredentialsProvider>,
        cfg: AuthConfig,
    ) -> Self {
        Self {
            device,
            provider,
            cfg,
        }
    }
}

#[async_trait]
impl AuthStage for SimAuthStage {
    async fn run(&mut self) -> Result<AuthOutcome, AuthError> {
        let mut device = self.device.lock().await;
        AuthFlow::new(&mut *device, self.provider.as_ref(), self.cfg.clone())
            .run()
            .await
    }
}

/// [`InitStage`] that runs the profile's init sequence (reset, echo off,
/// verbose errors, charset) through the command surface.
pub struct DeviceInit {
    device: Arc<Mutex<dyn ModemCommands>>,
    sequence: Vec<String>,
}

impl DeviceInit {
    pub fn new(device: Arc<Mutex<dyn ModemCommands>>, sequence: Vec<String>) -> Self {
        Self { device, sequence }
    }
}

#[async_trait]
impl InitStage for DeviceInit {
    async fn run(&mut self) -> Result<(), AtError> {
        debug!(commands = self.sequence.len(), "running init sequence");
        self.device.lock().await.run_init(&self.sequence).await
    }
}
