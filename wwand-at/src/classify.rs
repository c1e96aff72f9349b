use crate::error::{AtError, CmeError, CmsError};
use regex::Regex;
use std::sync::LazyLock;

static CME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\+CME ERROR:\s*(?P<detail>[^\r\n]+)").unwrap()
});

static CMS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\+CMS ERROR:\s*(?P<detail>[^\r\n]+)").unwrap()
});

static OUT_OF_RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(value )?out of range|invalid index").unwrap()
});

/// Textual CME detail → variant. Most specific patterns first, so
/// `SIM PUK2` wins over `SIM PUK` and `SIM not inserted` over `SIM`.
static CME_TEXT: LazyLock<Vec<(Regex, CmeError)>> = LazyLock::new(|| {
    let table: &[(&str, CmeError)] = &[
        (r"(?i)incorrect password", CmeError::IncorrectPassword),
        (
            r"(?i)invalid characters in dial string",
            CmeError::InvalidDialString,
        ),
        (r"(?i)no network service", CmeError::NoNetworkService),
        (r"(?i)not found", CmeError::NotFound),
        (r"(?i)operation not allowed", CmeError::OperationNotAllowed),
        (r"(?i)text string too long", CmeError::StringTooLong),
        (r"(?i)SIM busy", CmeError::SimBusy),
        (r"(?i)SIM failure", CmeError::SimFailure),
        (
            r"(?i)SIM (interface )?not started",
            CmeError::SimNotStarted,
        ),
        (r"(?i)SIM not inserted", CmeError::SimNotInserted),
        (r"(?i)SIM PIN required", CmeError::SimPinRequired),
        (r"(?i)SIM PUK2 required", CmeError::SimPuk2Required),
        (r"(?i)SIM PUK required", CmeError::SimPukRequired),
    ];

    table
        .iter()
        .map(|(pat, err)| (Regex::new(pat).unwrap(), err.clone()))
        .collect()
});

/// Textual CMS detail → variant, most specific first.
static CMS_TEXT: LazyLock<Vec<(Regex, CmsError)>> = LazyLock::new(|| {
    let table: &[(&str, CmsError)] = &[
        (r"(?i)phone failure", CmsError::PhoneFailure),
        (r"(?i)SIM busy", CmsError::SimBusy),
        (r"(?i)SIM failure", CmsError::SimFailure),
        (r"(?i)SIM not inserted", CmsError::SimNotInserted),
        (r"(?i)SIM PIN necessary", CmsError::SimPinNecessary),
        (r"(?i)SIM wrong", CmsError::SimWrong),
        (r"(?i)memory failure", CmsError::MemoryFailure),
        (r"(?i)memory full", CmsError::MemoryFull),
        (r"(?i)invalid memory index", CmsError::InvalidMemoryIndex),
        (r"(?i)SMSC address unknown", CmsError::SmscUnknown),
        (r"(?i)no network service", CmsError::NoNetworkService),
        (r"(?i)network timeout", CmsError::NetworkTimeout),
    ];

    table
        .iter()
        .map(|(pat, err)| (Regex::new(pat).unwrap(), err.clone()))
        .collect()
});

/// Numeric CME codes for the same variants (`AT+CMEE=1` devices).
fn cme_from_code(code: u16) -> CmeError {
    match code {
        3 => CmeError::OperationNotAllowed,
        10 => CmeError::SimNotInserted,
        11 => CmeError::SimPinRequired,
        12 => CmeError::SimPukRequired,
        13 => CmeError::SimFailure,
        14 => CmeError::SimBusy,
        16 => CmeError::IncorrectPassword,
        18 => CmeError::SimPuk2Required,
        22 => CmeError::NotFound,
        24 => CmeError::StringTooLong,
        27 => CmeError::InvalidDialString,
        30 => CmeError::NoNetworkService,
        other => CmeError::Unknown(other.to_string()),
    }
}

/// Maps raw error text onto the typed taxonomy.
///
/// Pure table lookup, most specific match first: structured
/// `+CME ERROR:` / `+CMS ERROR:` lines (textual or numeric detail) carry
/// their tier even when the detail is unmapped; everything else is the
/// generic `ERROR` result code.
pub fn classify(raw: &str) -> AtError {
    if let Some(caps) = CME_RE.captures(raw) {
        let detail = caps["detail"].trim();
        return AtError::Cme(classify_cme(detail));
    }

    if let Some(caps) = CMS_RE.captures(raw) {
        let detail = caps["detail"].trim();
        return AtError::Cms(classify_cms(detail));
    }

    if OUT_OF_RANGE_RE.is_match(raw) {
        return AtError::ValueOutOfRange;
    }

    AtError::Generic
}

fn classify_cme(detail: &str) -> CmeError {
    if let Ok(code) = detail.parse::<u16>() {
        return cme_from_code(code);
    }

    CME_TEXT
        .iter()
        .find(|(re, _)| re.is_match(detail))
        .map(|(_, err)| err.clone())
        .unwrap_or_else(|| CmeError::Unknown(detail.to_string()))
}

fn classify_cms(detail: &str) -> CmsError {
    if let Ok(code) = detail.parse::<u16>() {
        return CmsError::from_code(code);
    }

    CMS_TEXT
        .iter()
        .find(|(re, _)| re.is_match(detail))
        .map(|(_, err)| err.clone())
        .unwrap_or_else(|| CmsError::Unknown(detail.to_string()))
}
