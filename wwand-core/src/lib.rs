//! Bring-up state machines for cellular WWAN devices.
//!
//! Sits on top of the [`wwand_at`] protocol engine: SIM authentication
//! (PIN/PUK/PUK2 escalation), connection management with bearer-based usage
//! accounting, and the orchestrator that sequences Auth → Init →
//! Registration → Ready.

pub mod auth;
pub mod behaviour;
pub mod connect;
pub mod device;
pub mod init;
pub mod usage;

pub use auth::{
    AuthConfig, AuthError, AuthFlow, AuthOutcome, CredentialsError,
    CredentialsProvider, PukPair,
};
pub use behaviour::{
    AuthStage, BringUp, BringUpError, FailureTag, InitStage, RegistrationError,
    RegistrationInfo, RegistrationStage, Stage,
};
pub use connect::{ConnectError, Connection, ConnectionEvent, ConnectionState, Dialer};
pub use device::{
    AtModem, DeviceProfile, ModemCommands, NetCounters, NetStats, PinStatus,
    SysfsCounters,
};
pub use init::{DeviceInit, SimAuthStage};
pub use usage::{UsageRecord, UsageStore, UsageTracker};
