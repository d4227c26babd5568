/// Hotel identifiers are plain database integers; the newtypes exist so a
/// habbo id can never be handed to something expecting an item id.
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Copy,
            Clone,
            Debug,
            Default,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[repr(transparent)]
        #[serde(transparent)] // JSON = plain integer
        pub struct $name(pub i64);

        impl $name {
            #[inline]
            pub fn new(raw: i64) -> Self {
                Self(raw)
            }
            #[inline]
            pub fn raw(&self) -> i64 {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl core::str::FromStr for $name {
            type Err = core::num::ParseIntError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map(Self)
            }
        }

        impl From<i64> for $name {
            fn from(v: i64) -> Self {
                Self(v)
            }
        }
        impl From<$name> for i64 {
            fn from(v: $name) -> i64 {
                v.0
            }
        }
    };
}

define_id!(HabboId);
define_id!(RoomId);
define_id!(ItemId);
define_id!(ItemBaseId);
