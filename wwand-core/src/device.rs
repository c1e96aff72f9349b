use async_trait::async_trait;
use color_eyre::eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWrite;
use wwand_at::{AtError, CommandSpec, CommandTable, Dispatcher};

/// `+CPIN?` status values the auth machine dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinStatus {
    Ready,
    SimPin,
    SimPuk,
    SimPuk2,
}

impl PinStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "READY" => Some(PinStatus::Ready),
            "SIM PIN" => Some(PinStatus::SimPin),
            "SIM PUK" => Some(PinStatus::SimPuk),
            "SIM PUK2" => Some(PinStatus::SimPuk2),
            _ => None,
        }
    }
}

/// The device command surface the state machines consume. Implemented over
/// the dispatcher for real hardware; mocked in tests.
#[async_trait]
pub trait ModemCommands: Send {
    async fn pin_status(&mut self) -> Result<PinStatus, AtError>;

    async fn send_pin(&mut self, pin: &str) -> Result<(), AtError>;

    async fn send_puk(&mut self, puk: &str, pin: &str) -> Result<(), AtError>;

    async fn send_puk2(&mut self, puk: &str, pin: &str) -> Result<(), AtError>;

    /// Runs the named commands of a profile's init sequence, in order.
    async fn run_init(&mut self, sequence: &[String]) -> Result<(), AtError>;

    /// Sends a vendor connection-mode literal looked up from the profile.
    async fn set_connection_mode(&mut self, literal: &str) -> Result<(), AtError>;
}

/// Interface byte counters sampled for usage accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NetStats {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

#[async_trait]
pub trait NetCounters: Send + Sync {
    async fn counters(&self) -> Result<NetStats>;
}

/// Counters from `/sys/class/net/<iface>/statistics`.
pub struct SysfsCounters {
    statistics: PathBuf,
}

impl SysfsCounters {
    pub fn new(sysfs: impl Into<PathBuf>, iface: &str) -> Self {
        Self {
            statistics: sysfs
                .into()
                .join("class")
                .join("net")
                .join(iface)
                .join("statistics"),
        }
    }
}

#[async_trait]
impl NetCounters for SysfsCounters {
    async fn counters(&self) -> Result<NetStats> {
        let rx = fs::read_to_string(self.statistics.join("rx_bytes")).await?;
        let tx = fs::read_to_string(self.statistics.join("tx_bytes")).await?;

        let rx_bytes = rx
            .trim()
            .parse()
            .map_err(|e| eyre!("bad rx_bytes value: {e}"))?;
        let tx_bytes = tx
            .trim()
            .parse()
            .map_err(|e| eyre!("bad tx_bytes value: {e}"))?;

        Ok(NetStats { rx_bytes, tx_bytes })
    }
}

/// Per-vendor device configuration, consumed as data.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceProfile {
    pub vendor: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Symbolic mode → literal AT string; keys may be absent for devices
    /// without mode selection.
    #[serde(default)]
    pub connection_modes: HashMap<String, String>,
    #[serde(default)]
    pub preferred_mode: Option<String>,
    /// Command-table names run by the init stage, in order.
    #[serde(default)]
    pub init_sequence: Vec<String>,
    #[serde(default)]
    pub command_patches: Vec<wwand_at::CommandPatch>,
}

/// [`ModemCommands`] over a [`Dispatcher`] and a (possibly vendor-patched)
/// command table.
pub struct AtModem<W> {
    dispatcher: Dispatcher<W>,
    table: CommandTable,
}

impl<W: AsyncWrite + Unpin + Send> AtModem<W> {
    pub fn new(dispatcher: Dispatcher<W>, table: CommandTable) -> Self {
        Self { dispatcher, table }
    }

    pub fn from_profile(
        dispatcher: Dispatcher<W>,
        profile: &DeviceProfile,
    ) -> Result<Self, regex::Error> {
        let mut table = CommandTable::standard();
        table.apply_all(&profile.command_patches)?;

        Ok(Self { dispatcher, table })
    }

    async fn run(&mut self, name: &str, args: &[&str]) -> Result<(), AtError> {
        let spec = self.table.get(name)?.clone();
        self.dispatcher.send(&spec, args).await?;
        Ok(())
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> ModemCommands for AtModem<W> {
    async fn pin_status(&mut self) -> Result<PinStatus, AtError> {
        let spec = self.table.get("check_pin")?.clone();
        let matches = self.dispatcher.send(&spec, &[]).await?;

        let status = matches
            .first()
            .and_then(|m| m.get("status"))
            .ok_or_else(|| AtError::Malformed("missing +CPIN status".to_string()))?;

        PinStatus::parse(status)
            .ok_or_else(|| AtError::Malformed(format!("unknown +CPIN status {status:?}")))
    }

    async fn send_pin(&mut self, pin: &str) -> Result<(), AtError> {
        self.run("send_pin", &[pin]).await
    }

    async fn send_puk(&mut self, puk: &str, pin: &str) -> Result<(), AtError> {
        self.run("send_puk", &[puk, pin]).await
    }

    async fn send_puk2(&mut self, puk: &str, pin: &str) -> Result<(), AtError> {
        self.run("send_puk2", &[puk, pin]).await
    }

    async fn run_init(&mut self, sequence: &[String]) -> Result<(), AtError> {
        for name in sequence {
            self.run(name, &[]).await?;
        }
        Ok(())
    }

    async fn set_connection_mode(&mut self, literal: &str) -> Result<(), AtError> {
        let spec = CommandSpec::raw("set_mode", literal);
        self.dispatcher.send(&spec, &[]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{DeviceProfile, PinStatus};

    #[test]
    fn it_parses_cpin_statuses() {
        assert_eq!(PinStatus::parse("READY"), Some(PinStatus::Ready));
        assert_eq!(PinStatus::parse("SIM PIN"), Some(PinStatus::SimPin));
        assert_eq!(PinStatus::parse("SIM PUK"), Some(PinStatus::SimPuk));
        assert_eq!(PinStatus::parse("SIM PUK2"), Some(PinStatus::SimPuk2));
        assert_eq!(PinStatus::parse("SIM PIN2"), None);
    }

    #[test]
    fn it_deserializes_a_vendor_profile() {
        let profile: DeviceProfile = serde_json::from_str(
            r#"{
                "vendor": "huawei",
                "capabilities": ["^MODE", "^RSSI"],
                "connection_modes": {
                    "3g-preferred": "AT^SYSCFG=2,2,3FFFFFFF,2,4",
                    "3g-only": "AT^SYSCFG=14,2,3FFFFFFF,2,4"
                },
                "preferred_mode": "3g-preferred",
                "init_sequence": ["reset", "init_profile", "set_error_format"],
                "command_patches": [
                    {"name": "enable_radio", "timeout_secs": 60}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(profile.vendor, "huawei");
        assert_eq!(profile.init_sequence.len(), 3);
        assert!(profile.connection_modes.contains_key("3g-only"));
        assert_eq!(profile.command_patches[0].timeout_secs, Some(60));
    }
}
