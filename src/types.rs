use crate::error::LwrpError;
use crate::protocol::{verb, Frame};
use serde::{Deserialize, Serialize};

/// Audio direction of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IoDirection {
    Input,
    Output,
}

impl IoDirection {
    /// Parse the wire token ("ICH" / "OCH")
    pub fn from_wire(token: &str) -> Option<Self> {
        match token {
            "ICH" => Some(IoDirection::Input),
            "OCH" => Some(IoDirection::Output),
            _ => None,
        }
    }

    /// The wire token for this direction
    pub fn wire_token(&self) -> &'static str {
        match self {
            IoDirection::Input => "ICH",
            IoDirection::Output => "OCH",
        }
    }
}

/// Device identity and capability summary (VER)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_name: Option<String>,
    pub system_version: Option<String>,
    pub protocol_version: Option<String>,
    pub source_count: Option<u32>,
    pub source_type: Option<String>,
    pub destination_count: Option<u32>,
    pub gpi_count: Option<u32>,
    pub gpo_count: Option<u32>,
}

impl TryFrom<&Frame> for DeviceInfo {
    type Error = LwrpError;

    fn try_from(frame: &Frame) -> Result<Self, LwrpError> {
        expect_verb(frame, verb::VER)?;

        // NSRC reports "count/type" on devices that distinguish source types
        let (source_count, source_type) = match frame.get("NSRC") {
            Some(nsrc) => match nsrc.split_once('/') {
                Some((count, kind)) => (count.parse().ok(), Some(kind.to_string())),
                None => (nsrc.parse().ok(), None),
            },
            None => (None, None),
        };

        Ok(DeviceInfo {
            device_name: frame.get("DEVN").map(str::to_string),
            system_version: frame.get("SYSV").map(str::to_string),
            protocol_version: frame.get("LWRP").map(str::to_string),
            source_count,
            source_type,
            destination_count: frame.get("NDST").and_then(|v| v.parse().ok()),
            gpi_count: frame.get("NGPI").and_then(|v| v.parse().ok()),
            gpo_count: frame.get("NGPO").and_then(|v| v.parse().ok()),
        })
    }
}

/// Network configuration (IP, supplemented by SET)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub address: Option<String>,
    pub netmask: Option<String>,
    pub gateway: Option<String>,
    pub hostname: Option<String>,
    pub advertisement_address: Option<String>,
    pub clock_address: Option<String>,
    pub nic_address: Option<String>,
    pub nic_name: Option<String>,
}

impl NetworkInfo {
    /// Fold fields from another frame into this record; used because some
    /// devices split network data across the IP and SET replies. Fails for
    /// frames of any other verb.
    pub fn merge_frame(&mut self, frame: &Frame) -> Result<(), LwrpError> {
        let merged = Self::try_from(frame)?;
        self.address = merged.address.or(self.address.take());
        self.netmask = merged.netmask.or(self.netmask.take());
        self.gateway = merged.gateway.or(self.gateway.take());
        self.hostname = merged.hostname.or(self.hostname.take());
        self.advertisement_address = merged
            .advertisement_address
            .or(self.advertisement_address.take());
        self.clock_address = merged.clock_address.or(self.clock_address.take());
        self.nic_address = merged.nic_address.or(self.nic_address.take());
        self.nic_name = merged.nic_name.or(self.nic_name.take());
        Ok(())
    }

    fn from_fields(frame: &Frame) -> Self {
        NetworkInfo {
            address: frame.get("address").map(str::to_string),
            netmask: frame.get("netmask").map(str::to_string),
            gateway: frame.get("gateway").map(str::to_string),
            hostname: frame.get("hostname").map(str::to_string),
            advertisement_address: frame.get("ADIP").map(str::to_string),
            clock_address: frame.get("IPCLK_ADDR").map(str::to_string),
            nic_address: frame.get("NIC_IPADDR").map(str::to_string),
            nic_name: frame.get("NIC_NAME").map(str::to_string),
        }
    }
}

impl TryFrom<&Frame> for NetworkInfo {
    type Error = LwrpError;

    fn try_from(frame: &Frame) -> Result<Self, LwrpError> {
        if frame.verb != verb::IP && frame.verb != verb::SET {
            return Err(LwrpError::Protocol(format!(
                "expected IP or SET frame, got {}",
                frame.verb
            )));
        }
        Ok(Self::from_fields(frame))
    }
}

/// Audio source configuration for one channel (SOURCE)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub channel: u32,
    pub name: Option<String>,
    pub rtp_enabled: Option<bool>,
    pub rtp_address: Option<String>,
    pub livestream_enabled: Option<bool>,
    pub livestream_address: Option<String>,
    pub input_gain: Option<f32>,
}

impl TryFrom<&Frame> for SourceConfig {
    type Error = LwrpError;

    fn try_from(frame: &Frame) -> Result<Self, LwrpError> {
        expect_verb(frame, verb::SOURCE)?;
        Ok(SourceConfig {
            channel: require_channel(frame)?,
            name: frame.get("PSNM").map(str::to_string),
            rtp_enabled: frame.get("RTPE").map(flag),
            rtp_address: frame.get("RTPA").map(str::to_string),
            livestream_enabled: frame.get("LWSE").map(flag),
            livestream_address: frame.get("LWSA").map(str::to_string),
            input_gain: frame.get("INGN").and_then(|v| v.parse().ok()),
        })
    }
}

/// Audio destination configuration for one channel (DESTINATION)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    pub channel: u32,
    pub name: Option<String>,
    /// Routed multicast address; `None` when unrouted (0.0.0.0)
    pub address: Option<String>,
}

impl TryFrom<&Frame> for DestinationConfig {
    type Error = LwrpError;

    fn try_from(frame: &Frame) -> Result<Self, LwrpError> {
        expect_verb(frame, verb::DESTINATION)?;
        let address = frame
            .get("ADDR")
            .filter(|a| !a.is_empty() && *a != "0.0.0.0")
            .map(str::to_string);
        Ok(DestinationConfig {
            channel: require_channel(frame)?,
            name: frame.get("NAME").map(str::to_string),
            address,
        })
    }
}

/// Electrical level of a GPIO pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PinLevel {
    High,
    Low,
}

impl PinLevel {
    /// Command character for this level
    pub fn wire_char(&self) -> char {
        match self {
            PinLevel::High => 'h',
            PinLevel::Low => 'l',
        }
    }
}

/// State of one GPIO pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinState {
    pub level: PinLevel,
    /// Whether the pin is mid-transition (uppercase on the wire)
    pub changing: bool,
}

impl PinState {
    fn from_wire_char(c: char) -> Option<Self> {
        match c {
            'h' => Some(PinState { level: PinLevel::High, changing: false }),
            'H' => Some(PinState { level: PinLevel::High, changing: true }),
            'l' => Some(PinState { level: PinLevel::Low, changing: false }),
            'L' => Some(PinState { level: PinLevel::Low, changing: true }),
            _ => None,
        }
    }
}

/// GPIO pin states for one channel (GPI / GPO)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpioState {
    pub channel: u32,
    /// Per-pin states; `None` for pins reported in an unknown state
    pub pins: Vec<Option<PinState>>,
    /// Text command associated with the channel, if any
    pub command_text: Option<String>,
}

impl TryFrom<&Frame> for GpioState {
    type Error = LwrpError;

    fn try_from(frame: &Frame) -> Result<Self, LwrpError> {
        if frame.verb != verb::GPI && frame.verb != verb::GPO {
            return Err(LwrpError::Protocol(format!(
                "expected GPI or GPO frame, got {}",
                frame.verb
            )));
        }
        let pins = frame
            .get("PINS")
            .map(|s| s.chars().map(PinState::from_wire_char).collect())
            .unwrap_or_default();
        Ok(GpioState {
            channel: require_channel(frame)?,
            pins,
            command_text: frame.get("CMD").map(str::to_string),
        })
    }
}

/// Number of pins per GPIO channel on Livewire hardware
pub const GPIO_PINS_PER_CHANNEL: usize = 5;

/// Build the positional pin mask that drives one pin and leaves the others
/// untouched, e.g. pin 3 low -> "xxlxx". Pins are numbered from 1.
pub fn pin_mask(pin: usize, level: PinLevel) -> Result<String, LwrpError> {
    if pin == 0 || pin > GPIO_PINS_PER_CHANNEL {
        return Err(LwrpError::Protocol(format!(
            "pin {pin} out of range 1..={GPIO_PINS_PER_CHANNEL}"
        )));
    }
    Ok((1..=GPIO_PINS_PER_CHANNEL)
        .map(|i| if i == pin { level.wire_char() } else { 'x' })
        .collect())
}

/// Which side of a stereo channel a level alert refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

/// Silence/clip alert state for one channel (LEVEL)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelAlert {
    pub io: IoDirection,
    pub channel: u32,
    pub side: Option<Side>,
    /// Rolling clip flag; `None` when the frame did not report it
    pub clip: Option<bool>,
    /// Rolling silence flag; `None` when the frame did not report it
    pub silence: Option<bool>,
}

impl TryFrom<&Frame> for LevelAlert {
    type Error = LwrpError;

    fn try_from(frame: &Frame) -> Result<Self, LwrpError> {
        expect_verb(frame, verb::LEVEL)?;
        let side = match frame.get("SIDE") {
            Some("L") => Some(Side::Left),
            Some("R") => Some(Side::Right),
            _ => None,
        };
        Ok(LevelAlert {
            io: require_direction(frame)?,
            channel: require_channel(frame)?,
            side,
            clip: frame.get("CLIP").map(flag),
            silence: frame.get("LOW").map(flag),
        })
    }
}

/// A left/right level pair in dBFS
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StereoLevel {
    pub left: f32,
    pub right: f32,
}

impl StereoLevel {
    fn parse(value: &str) -> Option<Self> {
        let (left, right) = value.split_once(':')?;
        Some(StereoLevel {
            left: left.parse().ok()?,
            right: right.parse().ok()?,
        })
    }
}

/// Meter readings for one channel (METER)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterReading {
    pub io: IoDirection,
    pub channel: u32,
    pub peak: Option<StereoLevel>,
    pub rms: Option<StereoLevel>,
}

impl TryFrom<&Frame> for MeterReading {
    type Error = LwrpError;

    fn try_from(frame: &Frame) -> Result<Self, LwrpError> {
        expect_verb(frame, verb::METER)?;
        Ok(MeterReading {
            io: require_direction(frame)?,
            channel: require_channel(frame)?,
            peak: frame.get("PEEK").and_then(StereoLevel::parse),
            rms: frame.get("RMS").and_then(StereoLevel::parse),
        })
    }
}

fn expect_verb(frame: &Frame, expected: &str) -> Result<(), LwrpError> {
    if frame.verb == expected {
        Ok(())
    } else {
        Err(LwrpError::Protocol(format!(
            "expected {expected} frame, got {}",
            frame.verb
        )))
    }
}

fn require_channel(frame: &Frame) -> Result<u32, LwrpError> {
    frame.channel().ok_or_else(|| {
        LwrpError::Protocol(format!(
            "{} frame has no channel number (key: {:?})",
            frame.verb, frame.key
        ))
    })
}

fn require_direction(frame: &Frame) -> Result<IoDirection, LwrpError> {
    frame
        .key
        .as_deref()
        .and_then(|k| k.split_whitespace().next())
        .and_then(IoDirection::from_wire)
        .ok_or_else(|| {
            LwrpError::Protocol(format!(
                "{} frame has no ICH/OCH direction (key: {:?})",
                frame.verb, frame.key
            ))
        })
}

fn flag(value: &str) -> bool {
    value == "1"
}
