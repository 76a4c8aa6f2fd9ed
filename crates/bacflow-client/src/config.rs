//! Session configuration.
//!
//! With the `serde` feature the configuration deserializes from the
//! camelCase option names (`port`, `interface`, `broadcastAddress`,
//! `adpuTimeout` in milliseconds, `retries`). Missing fields take their
//! defaults and unknown fields are ignored.

use crate::ClientError;
use bacflow_datalink::{DataLinkAddress, TransportConfig};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

pub const DEFAULT_APDU_TIMEOUT: Duration = Duration::from_millis(3000);
pub const DEFAULT_RETRIES: u8 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase", default)
)]
pub struct SessionConfig {
    /// UDP port to bind; broadcasts go to the same port.
    pub port: u16,
    /// Local interface address to bind.
    pub interface: IpAddr,
    /// Subnet broadcast address used for Who-Is.
    pub broadcast_address: IpAddr,
    /// Time before a confirmed request is retransmitted.
    #[cfg_attr(
        feature = "serde",
        serde(rename = "adpuTimeout", alias = "apduTimeout", with = "millis")
    )]
    pub apdu_timeout: Duration,
    /// Retransmissions after the first send.
    pub retries: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port: DataLinkAddress::BACNET_IP_DEFAULT_PORT,
            interface: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            broadcast_address: IpAddr::V4(Ipv4Addr::BROADCAST),
            apdu_timeout: DEFAULT_APDU_TIMEOUT,
            retries: DEFAULT_RETRIES,
        }
    }
}

impl SessionConfig {
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_interface(mut self, interface: IpAddr) -> Self {
        self.interface = interface;
        self
    }

    pub fn with_broadcast_address(mut self, broadcast_address: IpAddr) -> Self {
        self.broadcast_address = broadcast_address;
        self
    }

    pub fn with_apdu_timeout(mut self, timeout: Duration) -> Self {
        self.apdu_timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.retries = retries;
        self
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        if self.apdu_timeout.is_zero() {
            return Err(ClientError::InvalidConfig("adpuTimeout must be positive"));
        }
        Ok(())
    }

    /// Longest a confirmed request can stay pending.
    pub fn max_request_time(&self) -> Duration {
        self.apdu_timeout * (u32::from(self.retries) + 1)
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            interface: self.interface,
            port: self.port,
            broadcast_address: self.broadcast_address,
        }
    }
}

#[cfg(feature = "serde")]
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
