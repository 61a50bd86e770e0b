//! Core types shared by the interface byte chain and the parameter views

use crate::error::{AtrError, Result};

/// Coding convention announced by the initial character TS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Convention {
    /// Direct convention (TS = 0x3B)
    #[default]
    Direct,
    /// Inverse convention (TS = 0x3F)
    Inverse,
}

impl Convention {
    /// TS byte for this convention
    pub fn as_byte(&self) -> u8 {
        match self {
            Convention::Direct => 0x3B,
            Convention::Inverse => 0x3F,
        }
    }
}

impl TryFrom<u8> for Convention {
    type Error = AtrError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x3B => Ok(Convention::Direct),
            0x3F => Ok(Convention::Inverse),
            _ => Err(AtrError::invalid_structure(format!(
                "Unknown initial character TS 0x{:02X}",
                value
            ))),
        }
    }
}

impl std::fmt::Display for Convention {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Convention::Direct => write!(f, "direct"),
            Convention::Inverse => write!(f, "inverse"),
        }
    }
}

/// Type tag of an interface byte group
///
/// The declaration order is the insertion order used when new groups are
/// attached to the chain: global groups first, then protocols by number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProtocolType {
    /// Group 1 (TA1/TB1/TC1), always present
    Global,
    /// Groups following a TDi that indicates T=15
    GlobalExtended,
    T0,
    T1,
    T2,
    T3,
    T4,
    T5,
    T6,
    T7,
    T8,
    T9,
    T10,
    T11,
    T12,
    T13,
    T14,
}

impl ProtocolType {
    /// All transmission protocols, T=0 to T=14
    pub const PROTOCOLS: [ProtocolType; 15] = [
        ProtocolType::T0,
        ProtocolType::T1,
        ProtocolType::T2,
        ProtocolType::T3,
        ProtocolType::T4,
        ProtocolType::T5,
        ProtocolType::T6,
        ProtocolType::T7,
        ProtocolType::T8,
        ProtocolType::T9,
        ProtocolType::T10,
        ProtocolType::T11,
        ProtocolType::T12,
        ProtocolType::T13,
        ProtocolType::T14,
    ];

    /// Decode the low nibble of a TDi byte
    pub fn from_nibble(nibble: u8) -> Self {
        match nibble & 0x0F {
            0x0F => ProtocolType::GlobalExtended,
            n => Self::PROTOCOLS[n as usize],
        }
    }

    /// Low nibble used for this type in TDi, `None` for the first group
    pub fn nibble(&self) -> Option<u8> {
        match self {
            ProtocolType::Global => None,
            ProtocolType::GlobalExtended => Some(0x0F),
            protocol => Self::PROTOCOLS
                .iter()
                .position(|p| p == protocol)
                .map(|n| n as u8),
        }
    }

    /// Whether this tag names a transmission protocol rather than a global group
    pub fn is_protocol(&self) -> bool {
        !matches!(self, ProtocolType::Global | ProtocolType::GlobalExtended)
    }
}

impl std::fmt::Display for ProtocolType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolType::Global => write!(f, "Global"),
            other => match other.nibble() {
                Some(n) => write!(f, "T={}", n),
                None => write!(f, "Global"),
            },
        }
    }
}

/// One of the three parameter bytes in an interface byte group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ByteSlot {
    Ta,
    Tb,
    Tc,
}

impl ByteSlot {
    /// Slots in wire order
    pub const ALL: [ByteSlot; 3] = [ByteSlot::Ta, ByteSlot::Tb, ByteSlot::Tc];
}

impl std::fmt::Display for ByteSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ByteSlot::Ta => write!(f, "TA"),
            ByteSlot::Tb => write!(f, "TB"),
            ByteSlot::Tc => write!(f, "TC"),
        }
    }
}

/// A parameter byte as seen through a protocol mapping
///
/// `Irrelevant` marks a byte that may exist physically but carries no
/// meaning under the current mapping, e.g. TC2 when group 2 is not T=0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ParameterByte {
    Present(u8),
    Absent,
    Irrelevant,
}

impl ParameterByte {
    /// The byte value if present
    pub fn value(&self) -> Option<u8> {
        match self {
            ParameterByte::Present(value) => Some(*value),
            _ => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, ParameterByte::Present(_))
    }
}

impl From<Option<u8>> for ParameterByte {
    fn from(value: Option<u8>) -> Self {
        match value {
            Some(value) => ParameterByte::Present(value),
            None => ParameterByte::Absent,
        }
    }
}
