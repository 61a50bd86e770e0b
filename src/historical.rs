//! Historical characters and their category indicator

use crate::compact_tlv::{CompactTlv, CATEGORY_STATUS_APPENDED, CATEGORY_STATUS_IN_TLV};
use crate::error::{AtrError, ParseError, Result};
use crate::tlv::Interpreted;
use tracing::warn;

/// Category indicator for a DIR data reference
pub const CATEGORY_DIR_DATA_REFERENCE: u8 = 0x10;

/// Which interpretation the category indicator selects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HistoricalKind {
    None,
    CompactTlv,
    DirDataReference,
    Proprietary,
    Rfu,
    /// The bytes did not decode under the kind the category selects
    Invalid,
}

impl HistoricalKind {
    /// Kind selected by the category indicator alone
    pub fn classify(bytes: &[u8]) -> Self {
        match bytes.first() {
            None => HistoricalKind::None,
            Some(&(CATEGORY_STATUS_APPENDED | CATEGORY_STATUS_IN_TLV)) => HistoricalKind::CompactTlv,
            Some(&CATEGORY_DIR_DATA_REFERENCE) => HistoricalKind::DirDataReference,
            Some(0x81..=0x8F) => HistoricalKind::Rfu,
            Some(_) => HistoricalKind::Proprietary,
        }
    }
}

impl std::fmt::Display for HistoricalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HistoricalKind::None => "none",
            HistoricalKind::CompactTlv => "compact-TLV",
            HistoricalKind::DirDataReference => "DIR data reference",
            HistoricalKind::Proprietary => "proprietary",
            HistoricalKind::Rfu => "RFU",
            HistoricalKind::Invalid => "invalid",
        };
        write!(f, "{}", name)
    }
}

/// Interpreted historical characters
///
/// Exactly one interpretation applies at a time; bytes that fail to decode
/// under the kind their category selects become [`HistoricalCharacters::Invalid`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HistoricalCharacters {
    None,
    CompactTlv(CompactTlv),
    DirDataReference(u8),
    /// Category 0x01..=0x0F, 0x11..=0x7F or 0x90..=0xFF, content not interpreted
    Proprietary { category: u8, data: Vec<u8> },
    /// Category 0x81..=0x8F
    Rfu { category: u8, data: Vec<u8> },
    Invalid {
        bytes: Vec<u8>,
        attempted: HistoricalKind,
        error: ParseError,
    },
}

impl HistoricalCharacters {
    /// Interpret raw historical characters
    pub fn parse(bytes: &[u8]) -> Self {
        let kind = HistoricalKind::classify(bytes);
        let parsed = match kind {
            HistoricalKind::None => Ok(HistoricalCharacters::None),
            HistoricalKind::CompactTlv => CompactTlv::decode(bytes).map(HistoricalCharacters::CompactTlv),
            HistoricalKind::DirDataReference => match bytes {
                [_, reference] => Ok(HistoricalCharacters::DirDataReference(*reference)),
                _ => Err(ParseError::new(
                    format!(
                        "DIR data reference is one byte after the category, got {}",
                        bytes.len() - 1
                    ),
                    bytes.len().min(2),
                )),
            },
            HistoricalKind::Rfu => Ok(HistoricalCharacters::Rfu {
                category: bytes[0],
                data: bytes[1..].to_vec(),
            }),
            HistoricalKind::Proprietary | HistoricalKind::Invalid => {
                Ok(HistoricalCharacters::Proprietary {
                    category: bytes[0],
                    data: bytes[1..].to_vec(),
                })
            }
        };

        parsed.unwrap_or_else(|error| {
            warn!(%kind, %error, "historical characters did not decode");
            HistoricalCharacters::Invalid {
                bytes: bytes.to_vec(),
                attempted: kind,
                error,
            }
        })
    }

    /// Minimal valid content for a kind
    pub fn default_for(kind: HistoricalKind) -> Result<Self> {
        match kind {
            HistoricalKind::None => Ok(HistoricalCharacters::None),
            HistoricalKind::CompactTlv => Ok(HistoricalCharacters::CompactTlv(CompactTlv::new())),
            HistoricalKind::DirDataReference => Ok(HistoricalCharacters::DirDataReference(0x00)),
            HistoricalKind::Proprietary => Ok(HistoricalCharacters::Proprietary {
                category: 0x01,
                data: Vec::new(),
            }),
            HistoricalKind::Rfu => Ok(HistoricalCharacters::Rfu {
                category: 0x81,
                data: Vec::new(),
            }),
            HistoricalKind::Invalid => Err(AtrError::invalid_operation(
                "Historical characters cannot be switched to the invalid kind",
            )),
        }
    }

    pub fn kind(&self) -> HistoricalKind {
        match self {
            HistoricalCharacters::None => HistoricalKind::None,
            HistoricalCharacters::CompactTlv(_) => HistoricalKind::CompactTlv,
            HistoricalCharacters::DirDataReference(_) => HistoricalKind::DirDataReference,
            HistoricalCharacters::Proprietary { .. } => HistoricalKind::Proprietary,
            HistoricalCharacters::Rfu { .. } => HistoricalKind::Rfu,
            HistoricalCharacters::Invalid { .. } => HistoricalKind::Invalid,
        }
    }

    pub fn compact_tlv(&self) -> Option<&CompactTlv> {
        match self {
            HistoricalCharacters::CompactTlv(tlv) => Some(tlv),
            _ => None,
        }
    }

    pub fn parse_error(&self) -> Option<&ParseError> {
        match self {
            HistoricalCharacters::Invalid { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Encode back to historical characters, including the category byte
    pub fn encode(&self) -> Result<Vec<u8>> {
        match self {
            HistoricalCharacters::None => Ok(Vec::new()),
            HistoricalCharacters::CompactTlv(tlv) => tlv.encode(),
            HistoricalCharacters::DirDataReference(reference) => {
                Ok(vec![CATEGORY_DIR_DATA_REFERENCE, *reference])
            }
            HistoricalCharacters::Proprietary { category, data } => {
                if HistoricalKind::classify(&[*category]) != HistoricalKind::Proprietary {
                    return Err(AtrError::invalid_parameter(format!(
                        "Category 0x{:02X} is not proprietary",
                        category
                    )));
                }
                Ok(std::iter::once(*category).chain(data.iter().copied()).collect())
            }
            HistoricalCharacters::Rfu { category, data } => {
                if !(0x81..=0x8F).contains(category) {
                    return Err(AtrError::invalid_parameter(format!(
                        "Category 0x{:02X} is not reserved",
                        category
                    )));
                }
                Ok(std::iter::once(*category).chain(data.iter().copied()).collect())
            }
            HistoricalCharacters::Invalid { bytes, .. } => Ok(bytes.clone()),
        }
    }
}

impl Interpreted for HistoricalCharacters {
    fn is_applicable(&self) -> bool {
        !matches!(self, HistoricalCharacters::None | HistoricalCharacters::Invalid { .. })
    }

    fn raw_data(&self) -> Option<Vec<u8>> {
        self.encode().ok().filter(|bytes| !bytes.is_empty())
    }

    fn error_message(&self) -> Option<String> {
        self.parse_error().map(ToString::to_string)
    }
}
