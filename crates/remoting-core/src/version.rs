//! Packed protocol version
//!
//! The handshake carries the engine version as a single `u32`:
//! major in the top 10 bits, minor in the next 10, patch in the low 12.

use std::fmt;

const MAJOR_SHIFT: u32 = 22;
const MINOR_SHIFT: u32 = 12;
const MINOR_MASK: u32 = 0x3ff;
const PATCH_MASK: u32 = 0xfff;

/// A packed `major.minor.patch` version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProtocolVersion(u32);

impl ProtocolVersion {
    /// Placeholder for "no version"
    pub const INVALID: ProtocolVersion = ProtocolVersion(0);

    /// Version this crate speaks by default
    pub const LATEST: ProtocolVersion = ProtocolVersion::new(2, 6, 0);

    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self((major << MAJOR_SHIFT) | ((minor & MINOR_MASK) << MINOR_SHIFT) | (patch & PATCH_MASK))
    }

    pub const fn from_packed(packed: u32) -> Self {
        Self(packed)
    }

    pub const fn packed(self) -> u32 {
        self.0
    }

    pub const fn major(self) -> u32 {
        self.0 >> MAJOR_SHIFT
    }

    pub const fn minor(self) -> u32 {
        (self.0 >> MINOR_SHIFT) & MINOR_MASK
    }

    pub const fn patch(self) -> u32 {
        self.0 & PATCH_MASK
    }

    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::LATEST
    }
}

impl From<u32> for ProtocolVersion {
    fn from(packed: u32) -> Self {
        Self(packed)
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major(), self.minor(), self.patch())
    }
}
