use crate::error::AtError;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Default per-command deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
/// Deadline for slow operations such as powering the radio.
pub const SLOW_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_TERMINATOR: &str = r"(?m)^OK\r?$";
const DEFAULT_ERROR: &str =
    r"(?m)^(ERROR(:[^\r\n]*)?|\+CME ERROR:[^\r\n]*|\+CMS ERROR:[^\r\n]*|NO CARRIER|BUSY|NO DIALTONE)\r?$";

/// Static descriptor for one named AT command: how to render it and how to
/// recognize its echo, terminator, error and extractable payload in the
/// response stream.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub name: String,
    /// Command text with positional `{0}`/`{1}` placeholders, no trailing CRLF.
    pub template: String,
    pub echo: Option<Regex>,
    pub terminator: Regex,
    pub error: Regex,
    pub extract: Vec<Regex>,
    /// Prompt for two-phase commands (`> ` before an SMS/payload body).
    pub prompt: Option<Regex>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(name: &str, template: &str) -> Self {
        Self {
            name: name.to_string(),
            template: template.to_string(),
            echo: None,
            terminator: Regex::new(DEFAULT_TERMINATOR).unwrap(),
            error: Regex::new(DEFAULT_ERROR).unwrap(),
            extract: Vec::new(),
            prompt: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Descriptor for a raw vendor literal (e.g. a connection-mode string
    /// looked up from a device profile), with the default matchers.
    pub fn raw(name: &str, line: &str) -> Self {
        Self::new(name, line)
    }

    pub fn extractor(mut self, pattern: &str) -> Self {
        self.extract.push(Regex::new(pattern).unwrap());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_echo(mut self, pattern: &str) -> Self {
        self.echo = Some(Regex::new(pattern).unwrap());
        self
    }

    pub fn with_prompt(mut self, pattern: &str) -> Self {
        self.prompt = Some(Regex::new(pattern).unwrap());
        self
    }

    /// Substitutes positional args into the template. Rejects the call when
    /// a placeholder is left unfilled rather than sending `{0}` down the wire.
    pub fn render(&self, args: &[&str]) -> Result<String, AtError> {
        let mut line = self.template.clone();
        for (i, arg) in args.iter().enumerate() {
            line = line.replace(&format!("{{{i}}}"), arg);
        }

        if line.contains('{') && line.contains('}') {
            return Err(AtError::Malformed(format!(
                "unfilled placeholder in command {}: {line:?}",
                self.name
            )));
        }

        Ok(line)
    }
}

/// Partial override of one [`CommandSpec`], merge-by-name. Vendor profiles
/// carry lists of these to patch the standard table for quirky devices.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CommandPatch {
    pub name: String,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub terminator: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub extract: Option<Vec<String>>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Command descriptors keyed by name, loaded once per device from the
/// standard set plus vendor patches.
#[derive(Debug, Clone)]
pub struct CommandTable {
    by_name: HashMap<String, CommandSpec>,
}

impl CommandTable {
    /// The standard 27.007 bring-up set.
    pub fn standard() -> Self {
        let specs = vec![
            CommandSpec::new("check_pin", "AT+CPIN?")
                .extractor(r"(?m)^\+CPIN:\s*(?P<status>[^\r\n]+?)\r?$"),
            CommandSpec::new("send_pin", r#"AT+CPIN="{0}""#),
            CommandSpec::new("send_puk", r#"AT+CPIN="{0}","{1}""#),
            CommandSpec::new("send_puk2", r#"AT+CPIN="{0}","{1}""#),
            CommandSpec::new("enable_radio", "AT+CFUN=1").with_timeout(SLOW_TIMEOUT),
            CommandSpec::new("disable_radio", "AT+CFUN=0").with_timeout(SLOW_TIMEOUT),
            CommandSpec::new("reset", "ATZ"),
            CommandSpec::new("init_profile", "ATE0 V1 X5 &C1"),
            CommandSpec::new("set_error_format", "AT+CMEE=1"),
            CommandSpec::new("set_charset", r#"AT+CSCS="{0}""#),
            CommandSpec::new("get_charset", "AT+CSCS?")
                .extractor(r#"\+CSCS:\s*"(?P<charset>[^"]+)""#),
            CommandSpec::new("get_signal", "AT+CSQ")
                .extractor(r"\+CSQ:\s*(?P<rssi>\d+),\s*(?P<ber>\d+)"),
            CommandSpec::new("get_netreg", "AT+CREG?")
                .extractor(r"\+CREG:\s*(?P<mode>\d+),\s*(?P<status>\d+)"),
            CommandSpec::new("get_manufacturer", "AT+CGMI")
                .extractor(r"(?m)^(?P<manufacturer>[^\r\n+][^\r\n]*?)\r?$"),
            CommandSpec::new("get_model", "AT+CGMM")
                .extractor(r"(?m)^(?P<model>[^\r\n+][^\r\n]*?)\r?$"),
            CommandSpec::new("get_imei", "AT+CGSN")
                .extractor(r"(?m)^(?P<imei>\d{14,16})\r?$"),
        ];

        let by_name = specs
            .into_iter()
            .map(|spec| (spec.name.clone(), spec))
            .collect();

        Self { by_name }
    }

    pub fn get(&self, name: &str) -> Result<&CommandSpec, AtError> {
        self.by_name
            .get(name)
            .ok_or_else(|| AtError::UnknownCommand(name.to_string()))
    }

    /// Merges one vendor patch. Unknown names create a fresh entry with the
    /// default matchers so profiles can carry vendor-only commands.
    pub fn apply(&mut self, patch: &CommandPatch) -> Result<(), regex::Error> {
        let spec = self
            .by_name
            .entry(patch.name.clone())
            .or_insert_with(|| CommandSpec::new(&patch.name, ""));

        if let Some(template) = &patch.template {
            spec.template = template.clone();
        }
        if let Some(terminator) = &patch.terminator {
            spec.terminator = Regex::new(terminator)?;
        }
        if let Some(error) = &patch.error {
            spec.error = Regex::new(error)?;
        }
        if let Some(extract) = &patch.extract {
            spec.extract = extract
                .iter()
                .map(|pattern| Regex::new(pattern))
                .collect::<Result<_, _>>()?;
        }
        if let Some(secs) = patch.timeout_secs {
            spec.timeout = Duration::from_secs(secs);
        }

        Ok(())
    }

    pub fn apply_all(&mut self, patches: &[CommandPatch]) -> Result<(), regex::Error> {
        for patch in patches {
            self.apply(patch)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{CommandPatch, CommandSpec, CommandTable};
    use crate::error::AtError;
    use std::time::Duration;
    use test_log::test;

    #[test]
    fn it_renders_positional_args() {
        let spec = CommandSpec::new("send_puk", r#"AT+CPIN="{0}","{1}""#);

        let line = spec.render(&["12345678", "1234"]).unwrap();

        assert_eq!(line, r#"AT+CPIN="12345678","1234""#);
    }

    #[test]
    fn it_rejects_missing_args() {
        let spec = CommandSpec::new("send_pin", r#"AT+CPIN="{0}""#);

        assert!(matches!(spec.render(&[]), Err(AtError::Malformed(_))));
    }

    #[test]
    fn it_patches_an_existing_entry() {
        let mut table = CommandTable::standard();
        let patch = CommandPatch {
            name: "enable_radio".to_string(),
            template: Some("AT+CFUN=1,1".to_string()),
            terminator: None,
            error: None,
            extract: None,
            timeout_secs: Some(60),
        };

        table.apply(&patch).unwrap();

        let spec = table.get("enable_radio").unwrap();
        assert_eq!(spec.template, "AT+CFUN=1,1");
        assert_eq!(spec.timeout, Duration::from_secs(60));
        // untouched fields keep their defaults
        assert!(spec.terminator.is_match("OK\r"));
    }

    #[test]
    fn it_inserts_vendor_only_commands() {
        let mut table = CommandTable::standard();
        let patch: CommandPatch = serde_json::from_str(
            r#"{"name": "set_mode", "template": "AT^SYSCFG=13,1,3FFFFFFF,2,4"}"#,
        )
        .unwrap();

        table.apply(&patch).unwrap();

        assert_eq!(
            table.get("set_mode").unwrap().template,
            "AT^SYSCFG=13,1,3FFFFFFF,2,4"
        );
    }

    #[test]
    fn it_errors_on_unknown_names() {
        let table = CommandTable::standard();

        assert!(matches!(
            table.get("warp_drive"),
            Err(AtError::UnknownCommand(_))
        ));
    }
}
