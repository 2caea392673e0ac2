//! Channel and source definitions shared by the device core and its collaborators.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SourceError;
use crate::params::TransponderParams;

/// TS packet size.
pub const TS_PACKET_SIZE: usize = 188;

/// TS sync byte.
pub const TS_SYNC_BYTE: u8 = 0x47;

/// Highest valid packet identifier (13 bits).
pub const MAX_PID: u16 = 0x1FFF;

/// Lowest CA id that denotes a real conditional access system.
///
/// Values below this are device selectors of the host, not encryption.
pub const CA_ENCRYPTED_MIN: u16 = 0x0100;

/// Priority levels used for channel admission.
pub mod priority {
    /// Sentinel for "no receiver at all", always eligible.
    pub const IDLE: i32 = -100;
    pub const MIN: i32 = -99;
    pub const MAX: i32 = 99;
}

/// Kind of a signal source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    Atsc,
    Cable,
    Satellite,
    Terrestrial,
}

impl SourceKind {
    /// All kinds in the order they are listed in device names.
    pub const ALL: [SourceKind; 4] = [
        SourceKind::Atsc,
        SourceKind::Cable,
        SourceKind::Satellite,
        SourceKind::Terrestrial,
    ];

    /// Single letter code of the kind.
    pub fn to_char(self) -> char {
        match self {
            SourceKind::Atsc => 'A',
            SourceKind::Cable => 'C',
            SourceKind::Satellite => 'S',
            SourceKind::Terrestrial => 'T',
        }
    }

    /// Parse a single letter code.
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'A' => Some(SourceKind::Atsc),
            'C' => Some(SourceKind::Cable),
            'S' => Some(SourceKind::Satellite),
            'T' => Some(SourceKind::Terrestrial),
            _ => None,
        }
    }
}

/// A signal source: a kind plus, for satellites, the orbital position.
///
/// The position is stored in tenths of a degree, east positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Source {
    pub kind: SourceKind,
    pub position: i16,
}

impl Source {
    /// A satellite source at the given orbital position (tenths of a degree, east positive).
    pub fn satellite(position: i16) -> Self {
        Self {
            kind: SourceKind::Satellite,
            position,
        }
    }

    pub fn cable() -> Self {
        Self {
            kind: SourceKind::Cable,
            position: 0,
        }
    }

    pub fn terrestrial() -> Self {
        Self {
            kind: SourceKind::Terrestrial,
            position: 0,
        }
    }

    pub fn atsc() -> Self {
        Self {
            kind: SourceKind::Atsc,
            position: 0,
        }
    }

    /// A source of the given kind with no orbital position.
    pub fn of_kind(kind: SourceKind) -> Self {
        Self { kind, position: 0 }
    }

    pub fn is_satellite(&self) -> bool {
        self.kind == SourceKind::Satellite
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SourceKind::Satellite => {
                let abs = self.position.unsigned_abs();
                let hemisphere = if self.position < 0 { 'W' } else { 'E' };
                write!(f, "S{}.{}{}", abs / 10, abs % 10, hemisphere)
            }
            kind => write!(f, "{}", kind.to_char()),
        }
    }
}

impl FromStr for Source {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut chars = s.chars();
        let first = chars.next().ok_or(SourceError::Empty)?;
        let kind = SourceKind::from_char(first).ok_or(SourceError::UnknownKind(first))?;
        let rest = chars.as_str();

        if kind != SourceKind::Satellite || rest.is_empty() {
            return Ok(Self::of_kind(kind));
        }

        let (number, sign) = match rest.chars().last().map(|c| c.to_ascii_uppercase()) {
            Some('E') => (&rest[..rest.len() - 1], 1),
            Some('W') => (&rest[..rest.len() - 1], -1),
            _ => return Err(SourceError::InvalidPosition(rest.to_string())),
        };
        let degrees: f32 = number
            .parse()
            .map_err(|_| SourceError::InvalidPosition(rest.to_string()))?;
        if !(0.0..=180.0).contains(&degrees) {
            return Err(SourceError::InvalidPosition(rest.to_string()));
        }

        Ok(Self::satellite(sign * (degrees * 10.0).round() as i16))
    }
}

/// Role of a PID inside the host's PID table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PidType {
    Audio,
    Video,
    Pcr,
    Teletext,
    Dolby,
    Other,
}

/// Snapshot of a host channel descriptor.
///
/// `frequency` is in the host's native unit for the source kind (MHz for
/// satellites, kHz or Hz for cable and terrestrial); it is scaled down
/// wherever a transponder number or URL parameter is derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub number: u32,
    pub name: String,
    pub source: Source,
    pub frequency: u32,
    /// Compact DVB parameter string, e.g. `HC23M5O35P0S1`.
    pub parameters: String,
    /// Symbol rate in kSym/s (satellite and cable only).
    pub srate: u32,
    pub sid: u16,
    pub vpid: u16,
    #[serde(default)]
    pub apids: Vec<u16>,
    #[serde(default)]
    pub dpids: Vec<u16>,
    #[serde(default)]
    pub caids: Vec<u16>,
}

impl Channel {
    pub fn new(
        number: u32,
        name: impl Into<String>,
        source: Source,
        frequency: u32,
        parameters: impl Into<String>,
    ) -> Self {
        Self {
            number,
            name: name.into(),
            source,
            frequency,
            parameters: parameters.into(),
            srate: 0,
            sid: 0,
            vpid: 0,
            apids: Vec::new(),
            dpids: Vec::new(),
            caids: Vec::new(),
        }
    }

    /// Transponder number: frequency scaled below 20000, plus a polarisation
    /// offset for satellite sources.
    pub fn transponder(&self) -> u32 {
        let mut tf = self.frequency;
        while tf > 20000 {
            tf /= 1000;
        }
        if self.source.is_satellite() {
            if let Ok(params) = TransponderParams::parse(&self.parameters) {
                tf += params.polarization.map_or(0, |p| p.transponder_offset());
            }
        }
        tf
    }

    /// First CA id, or 0 for a free-to-air channel.
    pub fn ca(&self) -> u16 {
        self.caids.first().copied().unwrap_or(0)
    }

    /// True when the first CA id names a real conditional access system.
    pub fn is_encrypted(&self) -> bool {
        self.ca() >= CA_ENCRYPTED_MIN
    }

    pub fn apid(&self, index: usize) -> u16 {
        self.apids.get(index).copied().unwrap_or(0)
    }

    pub fn dpid(&self, index: usize) -> u16 {
        self.dpids.get(index).copied().unwrap_or(0)
    }

    /// The elementary stream PIDs a receiver of this channel needs first.
    pub fn required_pids(&self) -> impl Iterator<Item = u16> {
        [self.vpid, self.apid(0), self.dpid(0)]
            .into_iter()
            .filter(|pid| *pid != 0)
    }

    /// One-line textual form used in information pages.
    pub fn to_text(&self) -> String {
        let join = |pids: &[u16]| {
            pids.iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(",")
        };
        let caids = self
            .caids
            .iter()
            .map(|c| format!("{:X}", c))
            .collect::<Vec<_>>()
            .join(",");
        let apids = if self.dpids.is_empty() {
            join(&self.apids)
        } else {
            format!("{};{}", join(&self.apids), join(&self.dpids))
        };
        format!(
            "{}:{}:{}:{}:{}:{}:{}:{}:{}",
            self.name,
            self.frequency,
            self.parameters,
            self.source,
            self.srate,
            self.vpid,
            apids,
            if caids.is_empty() { "0".to_string() } else { caids },
            self.sid
        )
    }
}

/// A remote SAT>IP server as reported by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SatipServer {
    pub address: String,
    pub model: String,
    pub description: String,
}

impl SatipServer {
    pub fn new(
        address: impl Into<String>,
        model: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            model: model.into(),
            description: description.into(),
        }
    }
}

impl fmt::Display for SatipServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.address, self.model, self.description)
    }
}

/// A conditional access system family, identified by a CA id range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaSystem {
    pub name: &'static str,
    pub start: u16,
    pub end: u16,
}

impl CaSystem {
    pub fn contains(&self, caid: u16) -> bool {
        (self.start..=self.end).contains(&caid)
    }
}

/// CA system families that can be assigned to a CI slot.
pub const CA_SYSTEMS: &[CaSystem] = &[
    CaSystem { name: "SECA Mediaguard", start: 0x0100, end: 0x01FF },
    CaSystem { name: "EuroDec", start: 0x0464, end: 0x0464 },
    CaSystem { name: "Viaccess", start: 0x0500, end: 0x05FF },
    CaSystem { name: "Irdeto", start: 0x0600, end: 0x06FF },
    CaSystem { name: "DigiCipher 2", start: 0x0700, end: 0x07FF },
    CaSystem { name: "NDS Videoguard", start: 0x0900, end: 0x09FF },
    CaSystem { name: "Conax", start: 0x0B00, end: 0x0BFF },
    CaSystem { name: "CryptoWorks", start: 0x0D00, end: 0x0DFF },
    CaSystem { name: "PowerVu", start: 0x0E00, end: 0x0EFF },
    CaSystem { name: "RAS", start: 0x1000, end: 0x10FF },
    CaSystem { name: "NagraVision", start: 0x1200, end: 0x12FF },
    CaSystem { name: "VCAS", start: 0x1700, end: 0x17FF },
    CaSystem { name: "NagraVision 3", start: 0x1800, end: 0x18FF },
    CaSystem { name: "Codicrypt", start: 0x22F0, end: 0x22F0 },
    CaSystem { name: "BISS", start: 0x2600, end: 0x2600 },
    CaSystem { name: "DRE-Crypt", start: 0x4AE0, end: 0x4AE1 },
    CaSystem { name: "Bulcrypt", start: 0x5581, end: 0x5581 },
];

/// Look up a CA system family by name, ignoring case.
pub fn ca_system_by_name(name: &str) -> Option<&'static CaSystem> {
    CA_SYSTEMS
        .iter()
        .find(|system| system.name.eq_ignore_ascii_case(name.trim()))
}
