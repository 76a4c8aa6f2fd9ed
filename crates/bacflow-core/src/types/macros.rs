/// Declares an open BACnet enumeration: named standard values plus a
/// catch-all variant for vendor or not-yet-modelled numbers.
macro_rules! open_enumeration {
    (
        $(#[$meta:meta])*
        $name:ident($repr:ty) {
            $($variant:ident = $value:literal,)+
        }
        other => $other:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize))]
        pub enum $name {
            $($variant,)+
            $other($repr),
        }

        impl $name {
            pub const fn to_raw(self) -> $repr {
                match self {
                    $(Self::$variant => $value,)+
                    Self::$other(v) => v,
                }
            }

            pub const fn from_raw(value: $repr) -> Self {
                match value {
                    $($value => Self::$variant,)+
                    v => Self::$other(v),
                }
            }
        }
    };
}
