use bacflow_core::npdu::NpduAddress;
use bacflow_core::services::IAmRequest;
use bacflow_core::types::{PropertyId, PropertyValue, Segmentation};
use bacflow_datalink::DataLinkAddress;
use core::fmt;
use std::net::{IpAddr, SocketAddr};

/// Where a device is reached: the B/IP station that delivers its frames,
/// plus the remote network and MAC when a router sits in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DeviceAddress {
    pub datalink: DataLinkAddress,
    pub route: Option<NpduAddress>,
}

impl DeviceAddress {
    pub const fn local(datalink: DataLinkAddress) -> Self {
        Self {
            datalink,
            route: None,
        }
    }

    pub const fn routed(datalink: DataLinkAddress, route: NpduAddress) -> Self {
        Self {
            datalink,
            route: Some(route),
        }
    }
}

impl From<DataLinkAddress> for DeviceAddress {
    fn from(datalink: DataLinkAddress) -> Self {
        Self::local(datalink)
    }
}

impl From<SocketAddr> for DeviceAddress {
    fn from(addr: SocketAddr) -> Self {
        Self::local(DataLinkAddress::Ip(addr))
    }
}

impl From<IpAddr> for DeviceAddress {
    fn from(addr: IpAddr) -> Self {
        Self::local(DataLinkAddress::bacnet_default(addr))
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.route {
            None => write!(f, "{}", self.datalink),
            Some(route) => {
                write!(f, "{} net {} mac ", self.datalink, route.network)?;
                for byte in route.mac() {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// A discovered BACnet device.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Device {
    pub device_id: u32,
    pub address: DeviceAddress,
    pub max_apdu_length: u32,
    pub segmentation: Segmentation,
    pub vendor_id: u32,
}

impl Device {
    pub fn from_i_am(i_am: &IAmRequest, address: DeviceAddress) -> Self {
        Self {
            device_id: i_am.device_id.instance(),
            address,
            max_apdu_length: i_am.max_apdu,
            segmentation: i_am.segmentation,
            vendor_id: i_am.vendor_id,
        }
    }

    /// Applies a capability property read back from the device object.
    ///
    /// Returns `false` when the property is not a capability or the value
    /// has the wrong shape.
    pub fn apply_capability(&mut self, property: PropertyId, value: &PropertyValue) -> bool {
        match (property, value) {
            (PropertyId::MaxApduLengthAccepted, PropertyValue::Unsigned(v)) => {
                self.max_apdu_length = *v;
            }
            (PropertyId::SegmentationSupported, PropertyValue::Enumerated(v)) => {
                match Segmentation::from_raw(*v) {
                    Some(segmentation) => self.segmentation = segmentation,
                    None => return false,
                }
            }
            (PropertyId::VendorIdentifier, PropertyValue::Unsigned(v)) => {
                self.vendor_id = *v;
            }
            _ => return false,
        }
        true
    }
}
