use std::time::Duration;
use thiserror::Error;

/// Result of an AT exchange.
pub type AtResult<T> = Result<T, AtError>;

/// Failure of a single AT command exchange.
///
/// `Generic` covers the bare `ERROR`/`NO CARRIER` result codes; structured
/// `+CME ERROR:` / `+CMS ERROR:` lines carry their own taxonomy so callers
/// can branch on the tier even for codes we have no mapping for.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AtError {
    #[error("command failed: ERROR")]
    Generic,
    #[error("equipment error: {0}")]
    Cme(#[from] CmeError),
    #[error("messaging error: {0}")]
    Cms(#[from] CmsError),
    #[error("input value out of range")]
    ValueOutOfRange,
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("no such command in table: {0}")]
    UnknownCommand(String),
    #[error("transport channel closed")]
    ChannelClosed,
    #[error("transport i/o: {0}")]
    Io(String),
}

/// Mobile-equipment (`+CME ERROR:`) failures, 3GPP TS 27.007 §9.2.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CmeError {
    #[error("incorrect password")]
    IncorrectPassword,
    #[error("invalid characters in dial string")]
    InvalidDialString,
    #[error("no network service")]
    NoNetworkService,
    #[error("not found")]
    NotFound,
    #[error("operation not allowed")]
    OperationNotAllowed,
    #[error("text string too long")]
    StringTooLong,
    #[error("SIM busy")]
    SimBusy,
    #[error("SIM failure")]
    SimFailure,
    #[error("SIM interface not started")]
    SimNotStarted,
    #[error("SIM not inserted")]
    SimNotInserted,
    #[error("SIM PIN required")]
    SimPinRequired,
    #[error("SIM PUK required")]
    SimPukRequired,
    #[error("SIM PUK2 required")]
    SimPuk2Required,
    #[error("unmapped CME error: {0}")]
    Unknown(String),
}

/// Messaging-service (`+CMS ERROR:`) failures, 3GPP TS 27.005 §3.2.5.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CmsError {
    #[error("phone failure")]
    PhoneFailure,
    #[error("SIM not inserted")]
    SimNotInserted,
    #[error("SIM PIN necessary")]
    SimPinNecessary,
    #[error("SIM failure")]
    SimFailure,
    #[error("SIM busy")]
    SimBusy,
    #[error("SIM wrong")]
    SimWrong,
    #[error("memory failure")]
    MemoryFailure,
    #[error("invalid memory index")]
    InvalidMemoryIndex,
    #[error("memory full")]
    MemoryFull,
    #[error("SMSC address unknown")]
    SmscUnknown,
    #[error("no network service")]
    NoNetworkService,
    #[error("network timeout")]
    NetworkTimeout,
    #[error("unmapped CMS error: {0}")]
    Unknown(String),
}

impl CmsError {
    /// Numeric code → variant, for the `+CMS ERROR: <err>` integer form.
    pub fn from_code(code: u16) -> Self {
        match code {
            300 => CmsError::PhoneFailure,
            310 => CmsError::SimNotInserted,
            311 => CmsError::SimPinNecessary,
            313 => CmsError::SimFailure,
            314 => CmsError::SimBusy,
            315 => CmsError::SimWrong,
            320 => CmsError::MemoryFailure,
            321 => CmsError::InvalidMemoryIndex,
            322 => CmsError::MemoryFull,
            330 => CmsError::SmscUnknown,
            331 => CmsError::NoNetworkService,
            332 => CmsError::NetworkTimeout,
            other => CmsError::Unknown(other.to_string()),
        }
    }
}
