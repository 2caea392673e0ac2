//! Channel, source and transponder definitions for the SAT>IP device core.
//!
//! This crate holds the vocabulary shared between the device orchestration
//! (`satip-device`) and the collaborators it talks to: the remote tuner
//! session, server discovery and the host framework.
//!
//! # Example
//!
//! ```rust
//! use satip_protocol::{transponder_url_parameters, Channel, Source};
//!
//! let mut ch = Channel::new(1, "Das Erste HD", Source::satellite(192), 11494, "HC23M5O35P0S1");
//! ch.srate = 22000;
//!
//! assert_eq!(ch.transponder(), 111494);
//! let url = transponder_url_parameters(&ch, 1).unwrap();
//! assert!(url.starts_with("src=1&freq=11494&pol=h"));
//! ```

pub mod error;
pub mod params;
pub mod types;

pub use error::{ParamError, SourceError};
pub use params::{
    tnr_parameters, transponder_url_parameters, DeliverySystem, Generation, Modulation,
    Polarization, TransponderParams,
};
pub use types::{
    ca_system_by_name, priority, CaSystem, Channel, PidType, SatipServer, Source, SourceKind,
    CA_ENCRYPTED_MIN, CA_SYSTEMS, MAX_PID, TS_PACKET_SIZE, TS_SYNC_BYTE,
};
