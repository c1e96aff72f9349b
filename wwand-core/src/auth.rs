use crate::device::{ModemCommands, PinStatus};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::time;
use tracing::{debug, info, warn};
use wwand_at::{AtError, CmeError};

/// Tunables for the auth machine. The PUK2 retry bound has no counterpart
/// on real devices' firmware counters, so it is configurable; `None` keeps
/// re-prompting indefinitely.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub retry_delay: Duration,
    /// Wait after a successful unlock before reporting success, to let the
    /// SIM settle. Skipped when the SIM was already unlocked.
    pub settle_delay: Duration,
    pub sim_failure_limit: u32,
    pub sim_busy_limit: u32,
    pub puk2_retry_limit: Option<u32>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(15),
            settle_delay: Duration::from_secs(15),
            sim_failure_limit: 3,
            sim_busy_limit: 5,
            puk2_retry_limit: None,
        }
    }
}

/// Terminal failure of one authentication attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("SIM not inserted")]
    SimNotInserted,
    #[error("SIM failure")]
    SimFailure,
    #[error("credential request cancelled")]
    Cancelled,
    #[error("PUK2 attempts exhausted, SIM locked")]
    Puk2Exhausted,
    #[error("authentication command failed: {0}")]
    Command(AtError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The SIM reported `READY` on the first status query; no settle delay.
    AlreadyReady,
    Unlocked,
}

/// PUK plus the replacement PIN entered alongside it.
#[derive(Debug, Clone)]
pub struct PukPair {
    pub puk: String,
    pub pin: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialsError {
    #[error("credential prompt cancelled")]
    Cancelled,
}

impl From<CredentialsError> for AuthError {
    fn from(_: CredentialsError) -> Self {
        AuthError::Cancelled
    }
}

/// External source of SIM credentials (typically a UI prompt backed by an
/// optional keyring).
#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    async fn get_pin(&self) -> Result<String, CredentialsError>;

    async fn get_puk(&self) -> Result<PukPair, CredentialsError>;

    async fn get_puk2(&self) -> Result<PukPair, CredentialsError>;

    /// Whether the provider opted into persisting a working PIN.
    fn manages_keyring(&self) -> bool {
        false
    }

    async fn store_pin(&self, _pin: &str) {}

    /// Drop a previously stored credential after the device rejected it.
    async fn forget_pin(&self) {}
}

enum AuthState {
    GetPinStatus,
    PinNeeded { pin: String },
    PukNeeded { pair: PukPair },
    Puk2Needed { pair: PukPair },
}

enum Step {
    Next(AuthState),
    Done(AuthOutcome),
}

/// One authentication attempt. Escalates strictly forward
/// (status → PIN → PUK → PUK2) and never skips a tier.
pub struct AuthFlow<'a> {
    device: &'a mut dyn ModemCommands,
    provider: &'a dyn CredentialsProvider,
    cfg: AuthConfig,
    auth_was_ready: bool,
    sim_failures: u32,
    sim_busy: u32,
    puk2_attempts: u32,
}

impl<'a> AuthFlow<'a> {
    pub fn new(
        device: &'a mut dyn ModemCommands,
        provider: &'a dyn CredentialsProvider,
        cfg: AuthConfig,
    ) -> Self {
        Self {
            device,
            provider,
            cfg,
            auth_was_ready: false,
            sim_failures: 0,
            sim_busy: 0,
            puk2_attempts: 0,
        }
    }

    pub async fn run(mut self) -> Result<AuthOutcome, AuthError> {
        let mut state = AuthState::GetPinStatus;

        loop {
            let step = match state {
                AuthState::GetPinStatus => self.step_pin_status().await?,
                AuthState::PinNeeded { pin } => self.step_pin(pin).await?,
                AuthState::PukNeeded { pair } => self.step_puk(pair, false).await?,
                AuthState::Puk2Needed { pair } => self.step_puk(pair, true).await?,
            };

            match step {
                Step::Next(next) => state = next,
                Step::Done(outcome) => return Ok(outcome),
            }
        }
    }

    async fn step_pin_status(&mut self) -> Result<Step, AuthError> {
        match self.device.pin_status().await {
            Ok(PinStatus::Ready) => {
                self.auth_was_ready = true;
                info!("SIM already unlocked");
                Ok(Step::Done(AuthOutcome::AlreadyReady))
            }
            Ok(PinStatus::SimPin) => {
                let pin = self.provider.get_pin().await?;
                Ok(Step::Next(AuthState::PinNeeded { pin }))
            }
            Ok(PinStatus::SimPuk) => {
                let pair = self.provider.get_puk().await?;
                Ok(Step::Next(AuthState::PukNeeded { pair }))
            }
            Ok(PinStatus::SimPuk2) => {
                let pair = self.provider.get_puk2().await?;
                Ok(Step::Next(AuthState::Puk2Needed { pair }))
            }
            Err(e) => {
                self.pin_status_failure(e).await?;
                Ok(Step::Next(AuthState::GetPinStatus))
            }
        }
    }

    /// Bounded retries for a flaky status query: SIM-failure errors count
    /// toward a missing SIM, busy/not-started/generic/timeout errors toward
    /// a broken one.
    async fn pin_status_failure(&mut self, error: AtError) -> Result<(), AuthError> {
        match error {
            AtError::Cme(CmeError::SimNotInserted) => Err(AuthError::SimNotInserted),
            AtError::Cme(CmeError::SimFailure) => {
                self.sim_failures += 1;
                if self.sim_failures >= self.cfg.sim_failure_limit {
                    warn!(
                        count = self.sim_failures,
                        "persistent SIM failure, giving up"
                    );
                    return Err(AuthError::SimNotInserted);
                }

                debug!(count = self.sim_failures, "SIM failure, retrying");
                time::sleep(self.cfg.retry_delay).await;
                Ok(())
            }
            AtError::Cme(CmeError::SimBusy)
            | AtError::Cme(CmeError::SimNotStarted)
            | AtError::Generic
            | AtError::Timeout(_) => {
                self.sim_busy += 1;
                if self.sim_busy >= self.cfg.sim_busy_limit {
                    warn!(count = self.sim_busy, "SIM never became ready, giving up");
                    return Err(AuthError::SimFailure);
                }

                debug!(count = self.sim_busy, "SIM busy, retrying");
                time::sleep(self.cfg.retry_delay).await;
                Ok(())
            }
            other => Err(AuthError::Command(other)),
        }
    }

    async fn step_pin(&mut self, pin: String) -> Result<Step, AuthError> {
        match self.device.send_pin(&pin).await {
            Ok(()) => self.finish_unlocked(&pin).await,
            Err(AtError::Cme(CmeError::IncorrectPassword)) | Err(AtError::Generic) => {
                debug!("PIN rejected, requesting again");
                self.provider.forget_pin().await;
                let pin = self.provider.get_pin().await?;
                Ok(Step::Next(AuthState::PinNeeded { pin }))
            }
            Err(AtError::Cme(CmeError::SimPukRequired)) => {
                info!("PIN exhausted, escalating to PUK");
                let pair = self.provider.get_puk().await?;
                Ok(Step::Next(AuthState::PukNeeded { pair }))
            }
            Err(other) => Err(AuthError::Command(other)),
        }
    }

    async fn step_puk(&mut self, pair: PukPair, puk2: bool) -> Result<Step, AuthError> {
        let sent = if puk2 {
            self.device.send_puk2(&pair.puk, &pair.pin).await
        } else {
            self.device.send_puk(&pair.puk, &pair.pin).await
        };

        match sent {
            Ok(()) => self.finish_unlocked(&pair.pin).await,
            Err(AtError::Cme(CmeError::IncorrectPassword)) | Err(AtError::Generic) => {
                self.provider.forget_pin().await;

                if puk2 {
                    self.puk2_attempts += 1;
                    if let Some(limit) = self.cfg.puk2_retry_limit {
                        if self.puk2_attempts >= limit {
                            warn!(
                                attempts = self.puk2_attempts,
                                "PUK2 retry limit reached"
                            );
                            return Err(AuthError::Puk2Exhausted);
                        }
                    }

                    debug!("PUK2 rejected, requesting again");
                    let pair = self.provider.get_puk2().await?;
                    return Ok(Step::Next(AuthState::Puk2Needed { pair }));
                }

                debug!("PUK rejected, requesting again");
                let pair = self.provider.get_puk().await?;
                Ok(Step::Next(AuthState::PukNeeded { pair }))
            }
            Err(AtError::Cme(CmeError::SimPuk2Required)) if !puk2 => {
                info!("PUK exhausted, escalating to PUK2");
                let pair = self.provider.get_puk2().await?;
                Ok(Step::Next(AuthState::Puk2Needed { pair }))
            }
            Err(other) => Err(AuthError::Command(other)),
        }
    }

    async fn finish_unlocked(&mut self, pin: &str) -> Result<Step, AuthError> {
        if !self.auth_was_ready && self.provider.manages_keyring() {
            self.provider.store_pin(pin).await;
        }

        info!(settle = ?self.cfg.settle_delay, "SIM unlocked");
        time::sleep(self.cfg.settle_delay).await;

        Ok(Step::Done(AuthOutcome::Unlocked))
    }
}
