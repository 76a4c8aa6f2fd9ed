//! Shared argument handling for the bacflow command-line tools.

use bacflow_client::SessionConfig;
use bacflow_core::types::{ObjectType, PropertyId, PropertyValue};
use clap::{Args, ValueEnum};
use std::error::Error;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

/// CLI-friendly enum for selecting BACnet object types.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ObjectTypeArg {
    AnalogInput,
    AnalogOutput,
    AnalogValue,
    BinaryInput,
    BinaryOutput,
    BinaryValue,
    Device,
    MultiStateInput,
    MultiStateOutput,
    MultiStateValue,
}

impl ObjectTypeArg {
    pub const fn into_object_type(self) -> ObjectType {
        match self {
            Self::AnalogInput => ObjectType::AnalogInput,
            Self::AnalogOutput => ObjectType::AnalogOutput,
            Self::AnalogValue => ObjectType::AnalogValue,
            Self::BinaryInput => ObjectType::BinaryInput,
            Self::BinaryOutput => ObjectType::BinaryOutput,
            Self::BinaryValue => ObjectType::BinaryValue,
            Self::Device => ObjectType::Device,
            Self::MultiStateInput => ObjectType::MultiStateInput,
            Self::MultiStateOutput => ObjectType::MultiStateOutput,
            Self::MultiStateValue => ObjectType::MultiStateValue,
        }
    }
}

/// Application type of a value given on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ValueKind {
    Null,
    Boolean,
    Unsigned,
    Signed,
    Real,
    Enumerated,
    String,
}

impl ValueKind {
    pub fn parse(self, raw: &str) -> Result<PropertyValue, String> {
        let bad = |e: &dyn std::fmt::Display| format!("invalid {self:?} value {raw:?}: {e}");
        Ok(match self {
            Self::Null => PropertyValue::Null,
            Self::Boolean => PropertyValue::Boolean(raw.parse().map_err(|e| bad(&e))?),
            Self::Unsigned => PropertyValue::Unsigned(raw.parse().map_err(|e| bad(&e))?),
            Self::Signed => PropertyValue::Signed(raw.parse().map_err(|e| bad(&e))?),
            Self::Real => PropertyValue::Real(raw.parse().map_err(|e| bad(&e))?),
            Self::Enumerated => PropertyValue::Enumerated(raw.parse().map_err(|e| bad(&e))?),
            Self::String => PropertyValue::CharacterString(raw.to_owned()),
        })
    }
}

const PROPERTY_NAMES: &[(&str, PropertyId)] = &[
    ("description", PropertyId::Description),
    ("max-apdu-length-accepted", PropertyId::MaxApduLengthAccepted),
    ("model-name", PropertyId::ModelName),
    ("object-identifier", PropertyId::ObjectIdentifier),
    ("object-list", PropertyId::ObjectList),
    ("object-name", PropertyId::ObjectName),
    ("object-type", PropertyId::ObjectType),
    ("out-of-service", PropertyId::OutOfService),
    ("present-value", PropertyId::PresentValue),
    ("priority-array", PropertyId::PriorityArray),
    ("relinquish-default", PropertyId::RelinquishDefault),
    ("segmentation-supported", PropertyId::SegmentationSupported),
    ("status-flags", PropertyId::StatusFlags),
    ("units", PropertyId::Units),
    ("vendor-identifier", PropertyId::VendorIdentifier),
    ("vendor-name", PropertyId::VendorName),
];

/// Accepts a property name such as `present-value` or its number.
pub fn parse_property(raw: &str) -> Result<PropertyId, String> {
    if let Ok(number) = raw.parse::<u32>() {
        return Ok(PropertyId::from_raw(number));
    }
    let wanted = raw.replace('_', "-").to_ascii_lowercase();
    PROPERTY_NAMES
        .iter()
        .find(|(name, _)| *name == wanted)
        .map(|(_, id)| *id)
        .ok_or_else(|| format!("unknown property {raw:?}; use a name or a number"))
}

/// Session options every tool accepts. Flags override the config file.
#[derive(Debug, Clone, Args)]
pub struct SessionArgs {
    /// JSON session configuration (port, interface, broadcastAddress,
    /// adpuTimeout, retries).
    #[arg(long)]
    pub config: Option<std::path::PathBuf>,
    #[arg(long)]
    pub interface: Option<IpAddr>,
    #[arg(long)]
    pub port: Option<u16>,
    #[arg(long)]
    pub broadcast: Option<IpAddr>,
    /// Per-attempt APDU timeout in milliseconds.
    #[arg(long)]
    pub timeout_ms: Option<u64>,
    #[arg(long)]
    pub retries: Option<u8>,
    /// Print results as JSON.
    #[arg(long)]
    pub json: bool,
}

impl SessionArgs {
    pub fn session_config(&self) -> Result<SessionConfig, Box<dyn Error>> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => SessionConfig::default(),
        };
        if let Some(interface) = self.interface {
            config = config.with_interface(interface);
        }
        if let Some(port) = self.port {
            config = config.with_port(port);
        }
        if let Some(broadcast) = self.broadcast {
            config = config.with_broadcast_address(broadcast);
        }
        if let Some(ms) = self.timeout_ms {
            config = config.with_apdu_timeout(Duration::from_millis(ms));
        }
        if let Some(retries) = self.retries {
            config = config.with_retries(retries);
        }
        config.validate()?;
        Ok(config)
    }
}

/// Reads a JSON session configuration. Unknown fields are ignored and
/// missing ones keep their defaults.
pub fn load_config(path: &Path) -> Result<SessionConfig, Box<dyn Error>> {
    let text = std::fs::read_to_string(path)?;
    let config: SessionConfig = serde_json::from_str(&text)?;
    log::debug!("loaded session config from {}", path.display());
    Ok(config)
}
