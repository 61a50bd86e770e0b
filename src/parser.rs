//! Byte-level ATR parser

use crate::atr::Atr;
use crate::chain::InterfaceGroupChain;
use crate::core::Convention;
use crate::encoding::{xor_checksum, ByteReader};
use crate::error::{AtrError, Result};
use crate::historical::HistoricalCharacters;
use tracing::{trace, warn};

/// TS plus at most 32 further characters
pub const MAX_ATR_LEN: usize = 33;

/// ATR parser
///
/// By default a wrong or missing TCK is logged and tolerated; the result can
/// still be inspected through [`Atr::checksum_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parser {
    /// Reject a TCK that does not match
    pub strict_checksum: bool,
    /// Accept an ATR whose TCK is required but missing
    pub allow_missing_checksum: bool,
}

impl Parser {
    /// Create a lenient parser
    pub fn new() -> Self {
        Parser {
            strict_checksum: false,
            allow_missing_checksum: true,
        }
    }

    /// Parse a complete ATR, TS included
    pub fn parse(&self, bytes: &[u8]) -> Result<Atr> {
        let mut reader = ByteReader::new(bytes);
        let convention = Convention::try_from(reader.read_u8("TS")?)?;
        let (chain, historical_len) = InterfaceGroupChain::parse(&mut reader)?;
        let historical_bytes = reader
            .read_bytes(historical_len, "historical characters")?
            .to_vec();

        let tck = match reader.remaining() {
            0 => None,
            1 => Some(reader.read_u8("TCK")?),
            extra => {
                return Err(AtrError::invalid_structure(format!(
                    "{} unexpected bytes after the historical characters",
                    extra
                )))
            }
        };

        self.check_tck(bytes, &chain, tck)?;
        if bytes.len() > MAX_ATR_LEN {
            warn!(len = bytes.len(), "ATR longer than {} bytes", MAX_ATR_LEN);
        }

        let historical = HistoricalCharacters::parse(&historical_bytes);
        trace!(
            %convention,
            groups = chain.len(),
            historical_kind = %historical.kind(),
            "parsed ATR"
        );

        Ok(Atr::from_parts(
            convention,
            chain,
            historical_bytes,
            historical,
            tck,
            bytes.to_vec(),
        ))
    }

    fn check_tck(&self, bytes: &[u8], chain: &InterfaceGroupChain, tck: Option<u8>) -> Result<()> {
        match tck {
            Some(actual) => {
                let expected = xor_checksum(&bytes[1..bytes.len() - 1]);
                if expected != actual {
                    if self.strict_checksum {
                        return Err(AtrError::ChecksumMismatch { expected, actual });
                    }
                    warn!(expected, actual, "TCK mismatch");
                }
            }
            None if chain.checksum_required() => {
                if !self.allow_missing_checksum {
                    return Err(AtrError::invalid_structure(
                        "TCK is required when protocols other than T=0 are indicated",
                    ));
                }
                warn!("TCK missing");
            }
            None => {}
        }
        Ok(())
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for a [`Parser`] with non-default checksum handling
pub struct ParserBuilder {
    strict_checksum: bool,
    allow_missing_checksum: bool,
}

impl ParserBuilder {
    /// Create a new parser builder
    pub fn new() -> Self {
        let defaults = Parser::new();
        ParserBuilder {
            strict_checksum: defaults.strict_checksum,
            allow_missing_checksum: defaults.allow_missing_checksum,
        }
    }

    /// Fail on a TCK mismatch instead of logging it
    pub fn with_strict_checksum(mut self, strict: bool) -> Self {
        self.strict_checksum = strict;
        self
    }

    /// Whether a required but missing TCK is accepted
    pub fn with_missing_checksum_allowed(mut self, allowed: bool) -> Self {
        self.allow_missing_checksum = allowed;
        self
    }

    /// Build the parser
    pub fn build(self) -> Parser {
        Parser {
            strict_checksum: self.strict_checksum,
            allow_missing_checksum: self.allow_missing_checksum,
        }
    }
}

impl Default for ParserBuilder {
    fn default() -> Self {
        Self::new()
    }
}
