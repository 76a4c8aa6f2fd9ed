//! BACnet wire codec for the bacflow session core.
//!
//! `bacflow-core` turns service requests into NPDU/APDU bytes and turns
//! received bytes back into [`codec::DecodedFrame`] values. It performs no I/O
//! and keeps no state, so it can be exercised directly from tests or fuzzers.
//!
//! # Feature flags
//!
//! - **`std`** (default): `std::error::Error` implementations.
//! - **`serde`**: `Serialize` on the value and identifier types.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

/// APDU headers for confirmed, unconfirmed and response PDUs.
pub mod apdu;
/// Frame-level encode/decode entry points.
pub mod codec;
/// Tag system and the byte reader/writer.
pub mod encoding;
/// Codec error types.
pub mod error;
/// NPDU (network layer) header.
pub mod npdu;
/// Service payload codecs.
pub mod services;
/// Identifiers, enumerations and property values.
pub mod types;

pub use codec::{decode, DecodedFrame, ServiceAck, ServiceRequest};
pub use error::{DecodeError, EncodeError, MalformedFrame};
