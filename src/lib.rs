//! # ISO/IEC 7816 Answer-To-Reset codec
//!
//! A Rust library for decoding, editing and re-encoding the Answer-To-Reset
//! (ATR) a smart card sends after power-up.
//!
//! The ATR announces the transmission protocols a card offers (T=0, T=1, ...),
//! their timing and size parameters, and a block of historical characters that
//! describe the card itself. This library provides:
//!
//! - Parsing of the interface byte chain TA/TB/TC/TD into typed groups
//! - Global, T=0 and T=1 parameter views with standard defaults
//! - Compact-TLV decoding of the historical characters
//! - Edits that keep the chain minimal and re-encode the ATR, TCK included
//!
//! ## Features
//!
//! - `serde`: Enable serialization/deserialization support
//!
//! ## Example
//!
//! ```
//! use iso7816_atr::{Atr, ProtocolType};
//!
//! let mut atr = Atr::from_bytes(&[0x3B, 0x00])?;
//! assert_eq!(atr.indicated_protocols(), vec![ProtocolType::T0]);
//!
//! atr.indicate_protocol(ProtocolType::T1)?;
//! assert_eq!(atr.to_string(), "3B80800101");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod atr;
pub mod chain;
pub mod compact_tlv;
pub mod core;
pub mod encoding;
pub mod error;
pub mod historical;
pub mod parser;
pub mod protocol;
pub mod tlv;

pub use atr::{Atr, ChecksumStatus, SubscriptionId};
pub use chain::{InterfaceGroup, InterfaceGroupChain};
pub use compact_tlv::CompactTlv;
pub use crate::core::{ByteSlot, Convention, ParameterByte, ProtocolType};
pub use error::{AtrError, ParseError, Result};
pub use historical::{HistoricalCharacters, HistoricalKind};
pub use parser::{Parser, ParserBuilder};
pub use tlv::{DataObject, Interpreted};

/// Values that apply when the corresponding interface byte is absent
pub mod defaults {
    /// Fi = 372, fmax = 5 MHz
    pub const FI_CODE: u8 = 1;

    /// Di = 1
    pub const DI_CODE: u8 = 1;

    /// Programming voltage in tenths of a volt
    pub const VPP_DECIVOLTS: u16 = 50;

    /// Extra guard time N
    pub const EXTRA_GUARD_TIME: u8 = 0;

    /// T=0 waiting integer
    pub const WI: u8 = 10;

    /// T=1 information field size for the card
    pub const IFSC: u8 = 32;

    /// T=1 block waiting integer
    pub const BWI: u8 = 4;

    /// T=1 character waiting integer
    pub const CWI: u8 = 13;

    /// Data coding byte written when card capabilities need one: one-time
    /// write, data unit of one byte
    pub const DATA_CODING: u8 = 0x01;
}
