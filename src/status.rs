use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// OPC UA status code.
///
/// The top two bits encode severity (00 good, 01 uncertain, 10 bad). The low
/// sixteen bits carry info bits; the engine only touches the three that
/// matter for monitoring: `Overflow`, `SemanticsChanged` and
/// `StructureChanged`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub u32);

impl StatusCode {
    pub const GOOD: StatusCode = StatusCode(0x0000_0000);
    pub const BAD_INTERNAL_ERROR: StatusCode = StatusCode(0x8002_0000);
    pub const BAD_NODE_ID_UNKNOWN: StatusCode = StatusCode(0x8034_0000);
    pub const BAD_ATTRIBUTE_ID_INVALID: StatusCode = StatusCode(0x8035_0000);
    pub const BAD_OUT_OF_RANGE: StatusCode = StatusCode(0x803C_0000);
    pub const BAD_MONITORED_ITEM_ID_INVALID: StatusCode = StatusCode(0x8042_0000);
    pub const BAD_TOO_MANY_MONITORED_ITEMS: StatusCode = StatusCode(0x80DB_0000);

    /// Info-type flag marking the low bits as DataValue info bits.
    const INFO_TYPE_DATA_VALUE: u32 = 0x0000_0400;
    const OVERFLOW_BIT: u32 = 0x0000_0080;
    const SEMANTICS_CHANGED_BIT: u32 = 0x0000_4000;
    const STRUCTURE_CHANGED_BIT: u32 = 0x0000_8000;

    #[inline]
    pub fn is_good(self) -> bool {
        self.0 & 0xC000_0000 == 0
    }

    #[inline]
    pub fn is_bad(self) -> bool {
        self.0 & 0x8000_0000 != 0
    }

    /// Set the overflow info bit, signaling that the notification queue
    /// dropped or replaced an entry before this value was delivered.
    #[inline]
    #[must_use]
    pub fn with_overflow(self) -> StatusCode {
        StatusCode(self.0 | Self::INFO_TYPE_DATA_VALUE | Self::OVERFLOW_BIT)
    }

    #[inline]
    pub fn has_overflow(self) -> bool {
        self.0 & Self::OVERFLOW_BIT != 0
    }

    #[inline]
    #[must_use]
    pub fn with_semantics_changed(self) -> StatusCode {
        StatusCode(self.0 | Self::SEMANTICS_CHANGED_BIT)
    }

    #[inline]
    pub fn has_semantics_changed(self) -> bool {
        self.0 & Self::SEMANTICS_CHANGED_BIT != 0
    }

    #[inline]
    #[must_use]
    pub fn with_structure_changed(self) -> StatusCode {
        StatusCode(self.0 | Self::STRUCTURE_CHANGED_BIT)
    }

    #[inline]
    pub fn has_structure_changed(self) -> bool {
        self.0 & Self::STRUCTURE_CHANGED_BIT != 0
    }

    /// The code with all info bits stripped, for severity comparisons.
    #[inline]
    pub fn code(self) -> u32 {
        self.0 & 0xFFFF_0000
    }
}

impl Display for StatusCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}
