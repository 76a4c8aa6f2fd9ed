/// Segmentation capability a device advertises in I-Am.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum Segmentation {
    Both = 0,
    Transmit = 1,
    Receive = 2,
    None = 3,
}

impl Segmentation {
    pub const fn to_raw(self) -> u32 {
        self as u32
    }

    pub const fn from_raw(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Both),
            1 => Some(Self::Transmit),
            2 => Some(Self::Receive),
            3 => Some(Self::None),
            _ => None,
        }
    }
}

/// Max-APDU-length-accepted code from the confirmed request header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MaxApdu {
    UpTo50 = 0,
    UpTo128 = 1,
    UpTo206 = 2,
    UpTo480 = 3,
    UpTo1024 = 4,
    UpTo1476 = 5,
}

impl MaxApdu {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::UpTo50),
            1 => Some(Self::UpTo128),
            2 => Some(Self::UpTo206),
            3 => Some(Self::UpTo480),
            4 => Some(Self::UpTo1024),
            5 => Some(Self::UpTo1476),
            _ => None,
        }
    }

    pub const fn octets(self) -> u32 {
        match self {
            Self::UpTo50 => 50,
            Self::UpTo128 => 128,
            Self::UpTo206 => 206,
            Self::UpTo480 => 480,
            Self::UpTo1024 => 1024,
            Self::UpTo1476 => 1476,
        }
    }
}

open_enumeration! {
    /// Error class carried by an Error PDU.
    ErrorClass(u32) {
        Device = 0,
        Object = 1,
        Property = 2,
        Resources = 3,
        Security = 4,
        Services = 5,
        Vt = 6,
        Communication = 7,
    }
    other => Other
}

open_enumeration! {
    /// Error code carried by an Error PDU. Only the codes the session core
    /// reports on are named.
    ErrorCode(u32) {
        Other = 0,
        ConfigurationInProgress = 2,
        DeviceBusy = 3,
        InconsistentParameters = 7,
        InvalidDataType = 9,
        MissingRequiredParameter = 16,
        NoSpaceToWriteProperty = 20,
        ServiceRequestDenied = 29,
        Timeout = 30,
        UnknownObject = 31,
        UnknownProperty = 32,
        ValueOutOfRange = 37,
        WriteAccessDenied = 40,
        InvalidArrayIndex = 42,
        PropertyIsNotAList = 22,
        OptionalFunctionalityNotSupported = 45,
        PropertyIsNotAnArray = 50,
    }
    other => Unlisted
}
