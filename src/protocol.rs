use serde::{Deserialize, Serialize};
use std::fmt;

/// Default LWRP TCP port
pub const LWRP_PORT: u16 = 93;

/// Protocol verbs used by LWRP devices
pub mod verb {
    pub const LOGIN: &str = "LOGIN";
    pub const VER: &str = "VER";
    pub const IP: &str = "IP";
    pub const SET: &str = "SET";
    pub const SOURCE: &str = "SOURCE";
    pub const DESTINATION: &str = "DESTINATION";
    pub const GPI: &str = "GPI";
    pub const GPO: &str = "GPO";
    pub const LEVEL: &str = "LEVEL";
    pub const METER: &str = "METER";
    pub const MIX: &str = "MIX";
    pub const ADD: &str = "ADD";
    pub const ERROR: &str = "ERROR";
}

/// Notification topics a subscriber can register for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    /// Audio source configuration changes (SOURCE)
    SourceConfig,
    /// Audio destination configuration changes (DESTINATION)
    DestinationConfig,
    /// GPI/GPO pin state changes
    Gpio,
    /// Silence and clipping alerts (LEVEL)
    LevelAlert,
    /// Device error notifications and protocol parse problems
    Error,
    /// Everything else (VER, IP, SET, METER, ...)
    Generic,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Topic::SourceConfig => "source-config",
            Topic::DestinationConfig => "destination-config",
            Topic::Gpio => "gpio",
            Topic::LevelAlert => "level-alert",
            Topic::Error => "error",
            Topic::Generic => "generic",
        };
        f.write_str(name)
    }
}

impl Topic {
    /// Topic a frame with the given verb belongs to
    pub fn for_verb(verb: &str) -> Topic {
        match verb {
            verb::SOURCE => Topic::SourceConfig,
            verb::DESTINATION => Topic::DestinationConfig,
            verb::GPI | verb::GPO => Topic::Gpio,
            verb::LEVEL => Topic::LevelAlert,
            verb::ERROR => Topic::Error,
            _ => Topic::Generic,
        }
    }
}

/// One parsed protocol block: a verb, an optional disambiguating key,
/// and the key=value fields that followed it.
///
/// Frames are immutable once parsed and shared as `Arc<Frame>` between the
/// state cache, subscribers, and callers waiting on replies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Verb that introduced the block (e.g. "SOURCE", "GPO", "ERROR")
    pub verb: String,
    /// Bare tokens that followed the verb on the first line, joined with a
    /// space (channel number, pin group, or a status word like "OK")
    pub key: Option<String>,
    /// key=value fields in wire order
    pub fields: Vec<(String, String)>,
    /// Lines that could not be parsed as key=value, kept verbatim
    pub raw: Vec<String>,
}

impl Frame {
    /// Look up the first field with the given name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Whether every line of the block parsed cleanly
    pub fn is_well_formed(&self) -> bool {
        self.raw.is_empty()
    }

    /// Topic this frame is dispatched on when unsolicited
    pub fn topic(&self) -> Topic {
        Topic::for_verb(&self.verb)
    }

    /// The key parsed as a channel/pin number, if it is one
    pub fn channel(&self) -> Option<u32> {
        self.key.as_deref()?.split_whitespace().last()?.parse().ok()
    }
}

/// An outgoing command line
///
/// Serializes to `VERB [key] [k=v ...]` followed by a newline.
#[derive(Debug, Clone)]
pub struct Command {
    verb: String,
    key: Option<String>,
    params: Vec<(String, String)>,
}

impl Command {
    /// Create a command for the given verb
    pub fn new(verb: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            key: None,
            params: Vec::new(),
        }
    }

    /// Set the disambiguating key (channel number, "ICH 3", ...)
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Append a key=value parameter
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    /// The command verb
    pub fn verb(&self) -> &str {
        &self.verb
    }

    /// The disambiguating key, if any
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Render the command as a wire line, newline included
    pub fn to_wire(&self) -> String {
        let mut line = self.verb.clone();
        if let Some(key) = &self.key {
            line.push(' ');
            line.push_str(key);
        }
        for (name, value) in &self.params {
            line.push(' ');
            line.push_str(name);
            line.push('=');
            line.push_str(value);
        }
        line.push('\n');
        line
    }
}

/// Assembles raw wire lines into [`Frame`]s.
///
/// A frame is a contiguous run of non-blank lines terminated by a blank
/// line. The first line of a run carries the verb and key; subsequent
/// lines are split on the first `=`. Lines that fail to parse are retained
/// under [`Frame::raw`] rather than dropped.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    current: Option<Frame>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one wire line; returns a frame when a block completes
    pub fn push_line(&mut self, line: &str) -> Option<Frame> {
        let line = line.trim_end_matches(['\r', '\n']);

        if line.trim().is_empty() {
            return self.current.take();
        }

        match &mut self.current {
            None => {
                self.current = Some(parse_first_line(line));
                None
            }
            Some(frame) => {
                match line.split_once('=') {
                    Some((name, value)) => {
                        frame.fields.push((name.trim().to_string(), value.to_string()));
                    }
                    None => frame.raw.push(line.to_string()),
                }
                None
            }
        }
    }

    /// Flush a partially assembled frame, used when the stream ends
    pub fn finish(&mut self) -> Option<Frame> {
        self.current.take()
    }
}

fn parse_first_line(line: &str) -> Frame {
    let mut frame = Frame::default();
    let mut key_tokens: Vec<&str> = Vec::new();

    for (i, token) in line.split_whitespace().enumerate() {
        if i == 0 {
            frame.verb = token.to_string();
        } else if let Some((name, value)) = token.split_once('=') {
            frame.fields.push((name.to_string(), value.to_string()));
        } else {
            key_tokens.push(token);
        }
    }

    if !key_tokens.is_empty() {
        frame.key = Some(key_tokens.join(" "));
    }
    frame
}
