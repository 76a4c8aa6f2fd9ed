open_enumeration! {
    /// Property identifiers the session core names directly. Everything else
    /// travels as [`PropertyId::Proprietary`] with its raw number.
    PropertyId(u32) {
        All = 8,
        Description = 28,
        MaxApduLengthAccepted = 62,
        ModelName = 70,
        ObjectIdentifier = 75,
        ObjectList = 76,
        ObjectName = 77,
        ObjectType = 79,
        Optional = 80,
        PresentValue = 85,
        PriorityArray = 87,
        ProtocolVersion = 98,
        Required = 105,
        SegmentationSupported = 107,
        StatusFlags = 111,
        SystemStatus = 112,
        Units = 117,
        VendorIdentifier = 120,
        VendorName = 121,
        RelinquishDefault = 104,
        OutOfService = 81,
        ProtocolRevision = 139,
        FirmwareRevision = 44,
        ApplicationSoftwareVersion = 12,
    }
    other => Proprietary
}
