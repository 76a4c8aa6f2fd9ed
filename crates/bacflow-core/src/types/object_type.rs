open_enumeration! {
    /// Standard object types; anything else is kept as its raw number.
    ObjectType(u16) {
        AnalogInput = 0,
        AnalogOutput = 1,
        AnalogValue = 2,
        BinaryInput = 3,
        BinaryOutput = 4,
        BinaryValue = 5,
        Calendar = 6,
        Command = 7,
        Device = 8,
        EventEnrollment = 9,
        File = 10,
        Group = 11,
        Loop = 12,
        MultiStateInput = 13,
        MultiStateOutput = 14,
        NotificationClass = 15,
        Program = 16,
        Schedule = 17,
        Averaging = 18,
        MultiStateValue = 19,
        TrendLog = 20,
        Accumulator = 23,
        PulseConverter = 24,
        EventLog = 25,
        TrendLogMultiple = 27,
        StructuredView = 29,
        CharacterStringValue = 40,
        IntegerValue = 45,
        PositiveIntegerValue = 48,
        NetworkPort = 56,
    }
    other => Proprietary
}
