use crate::classify::classify;
use crate::command::CommandSpec;
use crate::error::AtError;
use crate::urc::{parse_urc_line, Urc};
use bytes::Bytes;
use regex::Regex;
use std::collections::BTreeMap;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

const CTRL_Z: u8 = 0x1a;

/// One extractor hit: the named capture groups of a single match. Extractors
/// without named groups record the whole match under `"0"`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AtMatch {
    groups: BTreeMap<String, String>,
}

impl AtMatch {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.groups.get(name).map(String::as_str)
    }

    pub fn groups(&self) -> &BTreeMap<String, String> {
        &self.groups
    }
}

/// Matches an asynchronous byte stream against one command at a time.
///
/// Taking `&mut self` on [`send`](Dispatcher::send) is the one-command-in-
/// flight invariant: a second send on the same control channel cannot be
/// expressed while one is pending. Unsolicited lines are filtered out of the
/// matching buffer and routed to the URC sink before any error/terminator
/// matching, so they can never complete the wrong command.
pub struct Dispatcher<W> {
    writer: W,
    chunks: mpsc::Receiver<Bytes>,
    urc_tx: mpsc::Sender<Urc>,
    /// Extra unsolicited patterns from the device capability list.
    extra_urcs: Vec<Regex>,
    buf: String,
}

impl<W: AsyncWrite + Unpin + Send> Dispatcher<W> {
    pub fn new(
        writer: W,
        chunks: mpsc::Receiver<Bytes>,
        urc_tx: mpsc::Sender<Urc>,
    ) -> Self {
        Self {
            writer,
            chunks,
            urc_tx,
            extra_urcs: Vec::new(),
            buf: String::new(),
        }
    }

    pub fn with_extra_urcs(mut self, patterns: Vec<Regex>) -> Self {
        self.extra_urcs = patterns;
        self
    }

    /// Sends one command and matches the stream until its terminator, error
    /// pattern or deadline. Success resolves with the extractor matches over
    /// the response body; no extractor or no hit is `Ok(vec![])`.
    pub async fn send(
        &mut self,
        spec: &CommandSpec,
        args: &[&str],
    ) -> Result<Vec<AtMatch>, AtError> {
        self.exchange(spec, args, None).await
    }

    /// Two-phase variant for prompt-driven commands: once the descriptor's
    /// prompt matches, `payload` is written followed by Ctrl-Z.
    pub async fn send_with_payload(
        &mut self,
        spec: &CommandSpec,
        args: &[&str],
        payload: &str,
    ) -> Result<Vec<AtMatch>, AtError> {
        self.exchange(spec, args, Some(payload)).await
    }

    async fn exchange(
        &mut self,
        spec: &CommandSpec,
        args: &[&str],
        payload: Option<&str>,
    ) -> Result<Vec<AtMatch>, AtError> {
        let line = spec.render(args)?;
        debug!(command = %spec.name, tx = %line, "sending AT command");

        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| AtError::Io(e.to_string()))?;
        self.writer
            .write_all(b"\r\n")
            .await
            .map_err(|e| AtError::Io(e.to_string()))?;
        self.writer
            .flush()
            .await
            .map_err(|e| AtError::Io(e.to_string()))?;

        let deadline = Instant::now() + spec.timeout;
        let mut echo_pending = spec.echo.is_some();
        let mut payload_pending = payload.is_some();

        loop {
            let chunk = match time::timeout_at(deadline, self.chunks.recv()).await {
                Err(_) => {
                    debug!(command = %spec.name, "AT command timed out");
                    self.buf.clear();
                    return Err(AtError::Timeout(spec.timeout));
                }
                Ok(None) => return Err(AtError::ChannelClosed),
                Ok(Some(chunk)) => chunk,
            };

            trace!(command = %spec.name, rx = ?chunk, "received chunk");
            self.buf.push_str(&String::from_utf8_lossy(&chunk));
            self.drain_urcs();

            if echo_pending {
                if let Some(echo) = &spec.echo {
                    if let Some(m) = echo.find(&self.buf) {
                        self.buf.replace_range(m.range(), "");
                        echo_pending = false;
                    }
                }
            }

            if payload_pending {
                if let (Some(prompt), Some(body)) = (&spec.prompt, payload) {
                    if let Some(m) = prompt.find(&self.buf) {
                        self.buf.replace_range(..m.end(), "");
                        self.writer
                            .write_all(body.as_bytes())
                            .await
                            .map_err(|e| AtError::Io(e.to_string()))?;
                        self.writer
                            .write_all(&[CTRL_Z])
                            .await
                            .map_err(|e| AtError::Io(e.to_string()))?;
                        self.writer
                            .flush()
                            .await
                            .map_err(|e| AtError::Io(e.to_string()))?;
                        payload_pending = false;
                    }
                }
            }

            if let Some(m) = spec.error.find(&self.buf) {
                let error = classify(m.as_str());
                debug!(command = %spec.name, %error, "AT command failed");
                self.buf.clear();
                return Err(error);
            }

            if let Some(m) = spec.terminator.find(&self.buf) {
                let body = self.buf[..m.start()].to_string();
                let matches = extract_matches(spec, &body);
                debug!(
                    command = %spec.name,
                    matches = matches.len(),
                    "AT command completed"
                );
                self.buf.clear();
                return Ok(matches);
            }
        }
    }

    /// Moves complete unsolicited lines out of the matching buffer and into
    /// the URC sink. Partial trailing data stays buffered.
    fn drain_urcs(&mut self) {
        if !self.buf.contains('\n') {
            return;
        }

        let mut kept = String::with_capacity(self.buf.len());
        let mut rest = self.buf.as_str();

        while let Some(pos) = rest.find('\n') {
            let (line, tail) = rest.split_at(pos + 1);
            rest = tail;

            if !self.route_urc(line) {
                kept.push_str(line);
            }
        }
        kept.push_str(rest);

        self.buf = kept;
    }

    /// Returns true when the line was consumed as unsolicited.
    fn route_urc(&self, line: &str) -> bool {
        let trimmed = line.trim_end_matches(['\r', '\n']);

        let urc = if let Some(urc) = parse_urc_line(trimmed) {
            Some(urc)
        } else if self.extra_urcs.iter().any(|re| re.is_match(trimmed)) {
            Some(Urc::Raw(trimmed.to_string()))
        } else {
            None
        };

        let Some(urc) = urc else { return false };

        debug!(?urc, "unsolicited notification");
        if let Err(e) = self.urc_tx.try_send(urc) {
            warn!("dropping unsolicited notification: {e}");
        }

        true
    }
}

fn extract_matches(spec: &CommandSpec, body: &str) -> Vec<AtMatch> {
    let mut matches = Vec::new();

    for re in &spec.extract {
        for caps in re.captures_iter(body) {
            let mut groups = BTreeMap::new();

            for name in re.capture_names().flatten() {
                if let Some(m) = caps.name(name) {
                    groups.insert(name.to_string(), m.as_str().to_string());
                }
            }

            if groups.is_empty() {
                groups.insert("0".to_string(), caps[0].to_string());
            }

            matches.push(AtMatch { groups });
        }
    }

    matches
}
