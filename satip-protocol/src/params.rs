//! Transponder parameter strings and their SAT>IP URL form.
//!
//! The host stores delivery parameters as a compact string of key letters
//! followed by numbers (`HC23M5O35P0S1`). This module parses that string and
//! renders the query parameters a SAT>IP server expects
//! (`src=1&freq=11494&pol=h&ro=0.35&msys=dvbs2&mtype=8psk&plts=on&sr=22000&fec=23`).

use std::fmt;

use crate::error::ParamError;
use crate::types::{Channel, SourceKind};

/// Code used by the host for "let the frontend decide".
pub const AUTO: u32 = 999;

const BANDWIDTHS: &[u32] = &[5, 6, 7, 8, 10, 1712];
const CODE_RATES: &[u32] = &[0, 12, 23, 34, 35, 45, 56, 67, 78, 89, 910, AUTO];
const GUARDS: &[u32] = &[4, 8, 16, 32, 128, 19128, 19256, AUTO];
const TRI_STATES: &[u32] = &[0, 1, AUTO];
const ROLL_OFFS: &[u32] = &[0, 20, 25, 35];
const TRANSMISSIONS: &[u32] = &[1, 2, 4, 8, 16, 32, AUTO];
const HIERARCHIES: &[u32] = &[0, 1, 2, 4, AUTO];

/// Satellite polarisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Polarization {
    Horizontal,
    Vertical,
    CircularLeft,
    CircularRight,
}

impl Polarization {
    fn from_key(key: char) -> Option<Self> {
        match key {
            'H' => Some(Polarization::Horizontal),
            'V' => Some(Polarization::Vertical),
            'L' => Some(Polarization::CircularLeft),
            'R' => Some(Polarization::CircularRight),
            _ => None,
        }
    }

    /// Lower-case letter used in the `pol=` URL parameter.
    pub fn to_char(self) -> char {
        match self {
            Polarization::Horizontal => 'h',
            Polarization::Vertical => 'v',
            Polarization::CircularLeft => 'l',
            Polarization::CircularRight => 'r',
        }
    }

    /// Offset added to a satellite frequency to form the transponder number.
    pub fn transponder_offset(self) -> u32 {
        match self {
            Polarization::Horizontal => 100_000,
            Polarization::Vertical => 200_000,
            Polarization::CircularLeft => 300_000,
            Polarization::CircularRight => 400_000,
        }
    }

    fn index(self) -> u32 {
        match self {
            Polarization::Horizontal => 0,
            Polarization::Vertical => 1,
            Polarization::CircularLeft => 2,
            Polarization::CircularRight => 3,
        }
    }
}

/// Delivery system generation (`S0` / `S1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Generation {
    #[default]
    First,
    Second,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Modulation {
    #[default]
    Qpsk,
    Psk8,
    Apsk16,
    Apsk32,
    Vsb8,
    Vsb16,
    Dqpsk,
    Qam16,
    Qam32,
    Qam64,
    Qam128,
    Qam256,
    Auto,
}

impl Modulation {
    fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            2 => Modulation::Qpsk,
            5 => Modulation::Psk8,
            6 => Modulation::Apsk16,
            7 => Modulation::Apsk32,
            10 => Modulation::Vsb8,
            11 => Modulation::Vsb16,
            12 => Modulation::Dqpsk,
            16 => Modulation::Qam16,
            32 => Modulation::Qam32,
            64 => Modulation::Qam64,
            128 => Modulation::Qam128,
            256 => Modulation::Qam256,
            AUTO => Modulation::Auto,
            _ => return None,
        })
    }

    fn code(self) -> u32 {
        match self {
            Modulation::Qpsk => 2,
            Modulation::Psk8 => 5,
            Modulation::Apsk16 => 6,
            Modulation::Apsk32 => 7,
            Modulation::Vsb8 => 10,
            Modulation::Vsb16 => 11,
            Modulation::Dqpsk => 12,
            Modulation::Qam16 => 16,
            Modulation::Qam32 => 32,
            Modulation::Qam64 => 64,
            Modulation::Qam128 => 128,
            Modulation::Qam256 => 256,
            Modulation::Auto => AUTO,
        }
    }

    fn url_value(self) -> Option<&'static str> {
        match self {
            Modulation::Qpsk => Some("qpsk"),
            Modulation::Psk8 => Some("8psk"),
            Modulation::Apsk16 => Some("16apsk"),
            Modulation::Apsk32 => Some("32apsk"),
            Modulation::Vsb8 => Some("8vsb"),
            Modulation::Vsb16 => Some("16vsb"),
            Modulation::Qam16 => Some("16qam"),
            Modulation::Qam32 => Some("32qam"),
            Modulation::Qam64 => Some("64qam"),
            Modulation::Qam128 => Some("128qam"),
            Modulation::Qam256 => Some("256qam"),
            Modulation::Dqpsk | Modulation::Auto => None,
        }
    }
}

/// Delivery system requested from a remote tuner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliverySystem {
    DvbS,
    DvbS2,
    DvbT,
    DvbT2,
    DvbC,
    DvbC2,
    Atsc,
}

impl DeliverySystem {
    pub fn new(kind: SourceKind, generation: Generation) -> Self {
        match (kind, generation) {
            (SourceKind::Satellite, Generation::First) => DeliverySystem::DvbS,
            (SourceKind::Satellite, Generation::Second) => DeliverySystem::DvbS2,
            (SourceKind::Terrestrial, Generation::First) => DeliverySystem::DvbT,
            (SourceKind::Terrestrial, Generation::Second) => DeliverySystem::DvbT2,
            (SourceKind::Cable, Generation::First) => DeliverySystem::DvbC,
            (SourceKind::Cable, Generation::Second) => DeliverySystem::DvbC2,
            (SourceKind::Atsc, _) => DeliverySystem::Atsc,
        }
    }

    /// Value of the `msys=` URL parameter.
    pub fn url_value(self) -> &'static str {
        match self {
            DeliverySystem::DvbS => "dvbs",
            DeliverySystem::DvbS2 => "dvbs2",
            DeliverySystem::DvbT => "dvbt",
            DeliverySystem::DvbT2 => "dvbt2",
            DeliverySystem::DvbC => "dvbc",
            DeliverySystem::DvbC2 => "dvbc2",
            DeliverySystem::Atsc => "atsc",
        }
    }
}

impl fmt::Display for DeliverySystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeliverySystem::DvbS => "DVB-S",
            DeliverySystem::DvbS2 => "DVB-S2",
            DeliverySystem::DvbT => "DVB-T",
            DeliverySystem::DvbT2 => "DVB-T2",
            DeliverySystem::DvbC => "DVB-C",
            DeliverySystem::DvbC2 => "DVB-C2",
            DeliverySystem::Atsc => "ATSC",
        };
        f.write_str(name)
    }
}

/// Parsed form of a compact transponder parameter string.
///
/// Numeric fields keep the host's codes; [`AUTO`] means "not specified".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransponderParams {
    pub polarization: Option<Polarization>,
    /// `B`: bandwidth in MHz, 1712 for 1.712 MHz.
    pub bandwidth: u32,
    /// `C`: high priority code rate, e.g. 23 for 2/3; 0 for none.
    pub code_rate_hp: u32,
    /// `D`: low priority code rate.
    pub code_rate_lp: u32,
    /// `G`: guard interval denominator, e.g. 8 for 1/8.
    pub guard: u32,
    /// `I`: spectral inversion.
    pub inversion: u32,
    pub modulation: Modulation,
    /// `N`: DVB-S2 pilot tones.
    pub pilot: u32,
    /// `O`: roll-off factor in hundredths; 0 for auto.
    pub roll_off: u32,
    /// `P`: PLP / stream id.
    pub stream_id: u32,
    /// `Q`: T2 system id.
    pub t2_system_id: u32,
    pub system: Generation,
    /// `T`: transmission mode in k carriers.
    pub transmission: u32,
    /// `X`: SISO (0) or MISO (1).
    pub siso_miso: u32,
    /// `Y`: hierarchy.
    pub hierarchy: u32,
}

impl Default for TransponderParams {
    fn default() -> Self {
        Self {
            polarization: None,
            bandwidth: 8,
            code_rate_hp: AUTO,
            code_rate_lp: AUTO,
            guard: AUTO,
            inversion: AUTO,
            modulation: Modulation::Qpsk,
            pilot: AUTO,
            roll_off: 0,
            stream_id: 0,
            t2_system_id: 0,
            system: Generation::First,
            transmission: AUTO,
            siso_miso: 0,
            hierarchy: AUTO,
        }
    }
}

impl TransponderParams {
    /// Parse a compact parameter string such as `HC23M5O35P0S1`.
    pub fn parse(s: &str) -> Result<Self, ParamError> {
        let mut params = Self::default();
        let mut chars = s.trim().chars().peekable();

        while let Some(c) = chars.next() {
            let key = c.to_ascii_uppercase();
            if let Some(pol) = Polarization::from_key(key) {
                params.polarization = Some(pol);
                continue;
            }
            if !"BCDGIMNOPQSTXY".contains(key) {
                return Err(ParamError::UnknownKey(c));
            }

            let mut digits = String::new();
            while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                digits.push(d);
                chars.next();
            }
            if digits.is_empty() {
                return Err(ParamError::MissingValue(key));
            }
            let value: u32 = digits
                .parse()
                .map_err(|_| ParamError::MissingValue(key))?;

            let check = |allowed: &[u32]| {
                if allowed.contains(&value) {
                    Ok(value)
                } else {
                    Err(ParamError::InvalidValue { key, value })
                }
            };

            match key {
                'B' => params.bandwidth = check(BANDWIDTHS)?,
                'C' => params.code_rate_hp = check(CODE_RATES)?,
                'D' => params.code_rate_lp = check(CODE_RATES)?,
                'G' => params.guard = check(GUARDS)?,
                'I' => params.inversion = check(TRI_STATES)?,
                'M' => {
                    params.modulation = Modulation::from_code(value)
                        .ok_or(ParamError::InvalidValue { key, value })?
                }
                'N' => params.pilot = check(TRI_STATES)?,
                'O' => params.roll_off = check(ROLL_OFFS)?,
                'P' => params.stream_id = value,
                'Q' => params.t2_system_id = value,
                'S' => {
                    params.system = match value {
                        0 => Generation::First,
                        1 => Generation::Second,
                        _ => return Err(ParamError::InvalidValue { key, value }),
                    }
                }
                'T' => params.transmission = check(TRANSMISSIONS)?,
                'X' => params.siso_miso = check(&[0, 1])?,
                'Y' => params.hierarchy = check(HIERARCHIES)?,
                _ => unreachable!("key set checked above"),
            }
        }

        Ok(params)
    }

    pub fn delivery_system(&self, kind: SourceKind) -> DeliverySystem {
        DeliverySystem::new(kind, self.system)
    }
}

fn fec_value(code: u32) -> Option<String> {
    match code {
        0 | AUTO => None,
        c => Some(c.to_string()),
    }
}

fn guard_value(code: u32) -> Option<String> {
    match code {
        AUTO => None,
        4 => Some("14".to_string()),
        8 => Some("18".to_string()),
        16 => Some("116".to_string()),
        32 => Some("132".to_string()),
        128 => Some("1128".to_string()),
        c => Some(c.to_string()),
    }
}

fn tri_state_value(code: u32, off: &'static str, on: &'static str) -> Option<&'static str> {
    match code {
        0 => Some(off),
        1 => Some(on),
        _ => None,
    }
}

/// Build the SAT>IP tuning query for a channel.
///
/// `src` is the DiSEqC source index for satellite channels; values outside
/// `1..=255` fall back to 1.
pub fn transponder_url_parameters(channel: &Channel, src: i32) -> Result<String, ParamError> {
    Ok(TransponderParams::parse(&channel.parameters)?.url_parameters(channel, src))
}

impl TransponderParams {
    /// Render the SAT>IP tuning query for `channel` using these parameters.
    ///
    /// Only the keys that apply to the channel's source kind and delivery
    /// system are emitted; automatic values are left out.
    pub fn url_parameters(&self, channel: &Channel, src: i32) -> String {
        let params = self;
        let kind = channel.source.kind;
        let sat = kind == SourceKind::Satellite;
        let terr = kind == SourceKind::Terrestrial;
        let cable = kind == SourceKind::Cable;
        let atsc = kind == SourceKind::Atsc;
        let gen2 = params.system == Generation::Second;

        let mut freq = channel.frequency as f64;
        while freq > 20000.0 {
            freq /= 1000.0;
        }

        let mut q: Vec<String> = Vec::new();
        if sat {
            q.push(format!("src={}", if (1..=255).contains(&src) { src } else { 1 }));
        }
        q.push(format!("freq={}", freq));
        if sat {
            if let Some(pol) = params.polarization {
                q.push(format!("pol={}", pol.to_char()));
            }
            if !matches!(params.roll_off, 0 | AUTO) {
                q.push(format!("ro=0.{}", params.roll_off));
            }
        }
        if cable && gen2 {
            q.push("c2tft=0".to_string());
        }
        if terr || (cable && gen2) {
            let bw = match params.bandwidth {
                1712 => "1.712".to_string(),
                b => b.to_string(),
            };
            q.push(format!("bw={}", bw));
        }
        q.push(format!("msys={}", params.delivery_system(kind).url_value()));
        if terr && params.transmission != AUTO {
            q.push(format!("tmode={}k", params.transmission));
        }
        if sat || terr || atsc || (cable && !gen2) {
            if let Some(mtype) = params.modulation.url_value() {
                q.push(format!("mtype={}", mtype));
            }
        }
        if sat && gen2 {
            if let Some(plts) = tri_state_value(params.pilot, "off", "on") {
                q.push(format!("plts={}", plts));
            }
        }
        if sat || (cable && !gen2) {
            q.push(format!("sr={}", channel.srate));
        }
        if cable && gen2 {
            q.push("ds=0".to_string());
        }
        if cable {
            if let Some(inv) = tri_state_value(params.inversion, "0", "1") {
                q.push(format!("specinv={}", inv));
            }
        }
        if terr && gen2 {
            q.push(format!("plp={}", params.stream_id));
            q.push(format!("t2id={}", params.t2_system_id));
            q.push(format!("sm={}", params.siso_miso));
        }
        if terr {
            if let Some(gi) = guard_value(params.guard) {
                q.push(format!("gi={}", gi));
            }
        }
        if sat || terr {
            if let Some(fec) = fec_value(params.code_rate_hp) {
                q.push(format!("fec={}", fec));
            }
        }

        q.join("&")
    }
}

/// Build the `tnr=` tuning descriptor handed to CI-capable servers.
pub fn tnr_parameters(channel: &Channel) -> Result<String, ParamError> {
    let params = TransponderParams::parse(&channel.parameters)?;
    let tuner_type = match channel.source.kind {
        SourceKind::Cable => 0,
        SourceKind::Satellite => 1,
        SourceKind::Terrestrial => 2,
        SourceKind::Atsc => 3,
    };
    let srate = match channel.source.kind {
        SourceKind::Cable | SourceKind::Satellite => channel.srate,
        _ => 0,
    };
    let system = match params.system {
        Generation::First => 0,
        Generation::Second => 1,
    };

    Ok(format!(
        "tnr={},{},{},{},{},{},{},{},{},{}",
        tuner_type,
        channel.frequency,
        srate,
        params.polarization.map_or(0, Polarization::index),
        channel.source.position,
        system,
        params.modulation.code(),
        channel.sid,
        channel.vpid,
        channel.apid(0)
    ))
}
