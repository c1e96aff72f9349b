use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Radio access technology reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bearer {
    Gsm,
    Gprs,
    Edge,
    Umts,
    Hsdpa,
    Hsupa,
    Hspa,
}

/// Accounting bucket: the whole 3G family (UMTS/HSDPA/HSUPA/HSPA) counts
/// as one bucket for usage records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BearerBucket {
    TwoG,
    ThreeG,
}

impl Bearer {
    pub fn bucket(self) -> BearerBucket {
        match self {
            Bearer::Gsm | Bearer::Gprs | Bearer::Edge => BearerBucket::TwoG,
            Bearer::Umts | Bearer::Hsdpa | Bearer::Hsupa | Bearer::Hspa => {
                BearerBucket::ThreeG
            }
        }
    }
}

/// Unsolicited result code parsed off the shared byte stream. These bypass
/// command matching entirely and feed the tracker/listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Urc {
    BearerChange(Bearer),
    /// `^RSSI: <n>`, 0..=31 per TS 27.007 +CSQ scale.
    SignalQuality(u8),
    /// Single-field `+CREG: <stat>` unsolicited form.
    Registration(u8),
    Ring,
    /// A line matched by a device capability pattern we do not interpret.
    Raw(String),
}

static MODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\^MODE:\s*(?P<mode>\d+),\s*(?P<submode>\d+)\r?$").unwrap()
});

static RSSI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\^RSSI:\s*(?P<rssi>\d+)\r?$").unwrap());

static CREG_URC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+CREG:\s*(?P<stat>\d)\r?$").unwrap());

/// Parses one complete line into a [`Urc`], or `None` when the line is a
/// command response and must stay in the matching buffer. Only the
/// single-field `+CREG:` form is unsolicited; the two-field solicited
/// reply never matches here.
pub fn parse_urc_line(line: &str) -> Option<Urc> {
    let line = line.trim_end_matches(['\r', '\n']);

    if let Some(caps) = MODE_RE.captures(line) {
        let submode: u8 = caps["submode"].parse().ok()?;
        return Some(match submode {
            1 => Urc::BearerChange(Bearer::Gsm),
            2 => Urc::BearerChange(Bearer::Gprs),
            3 => Urc::BearerChange(Bearer::Edge),
            4 => Urc::BearerChange(Bearer::Umts),
            5 => Urc::BearerChange(Bearer::Hsdpa),
            6 => Urc::BearerChange(Bearer::Hsupa),
            7 => Urc::BearerChange(Bearer::Hspa),
            _ => Urc::Raw(line.to_string()),
        });
    }

    if let Some(caps) = RSSI_RE.captures(line) {
        return caps["rssi"].parse().ok().map(Urc::SignalQuality);
    }

    if let Some(caps) = CREG_URC_RE.captures(line) {
        return caps["stat"].parse().ok().map(Urc::Registration);
    }

    if line == "RING" {
        return Some(Urc::Ring);
    }

    None
}
