//! The ATR model
//!
//! [`Atr`] keeps the raw bytes together with their decoded form. Every edit is
//! applied to a copy, re-encoded, parsed again and only then committed, so a
//! failed edit leaves the previous state untouched.

use crate::chain::InterfaceGroupChain;
use crate::compact_tlv::CompactTlv;
use crate::core::{Convention, ProtocolType};
use crate::encoding::{xor_checksum, ByteWriter};
use crate::error::{AtrError, Result};
use crate::historical::{HistoricalCharacters, HistoricalKind};
use crate::parser::Parser;
use crate::protocol::{
    GlobalParameters, GlobalParametersMut, ProtocolParameters, T0Parameters, T0ParametersMut,
    T1Parameters, T1ParametersMut, UnknownProtocolParameters, UnknownProtocolParametersMut,
};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// State of the check character TCK
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChecksumStatus {
    Absent,
    Valid,
    Invalid { expected: u8, actual: u8 },
}

/// Handle returned by [`Atr::on_changed`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type ChangeCallback = Box<dyn FnMut(&[u8]) + Send>;

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    callbacks: Vec<(SubscriptionId, ChangeCallback)>,
}

impl fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscribers")
            .field("count", &self.callbacks.len())
            .finish()
    }
}

// Subscriptions belong to one instance; a clone starts without any.
impl Clone for Subscribers {
    fn clone(&self) -> Self {
        Subscribers::default()
    }
}

/// A decoded Answer-To-Reset
#[derive(Debug, Clone)]
pub struct Atr {
    convention: Convention,
    chain: InterfaceGroupChain,
    historical_bytes: Vec<u8>,
    historical: HistoricalCharacters,
    tck: Option<u8>,
    bytes: Vec<u8>,
    subscribers: Subscribers,
}

impl Atr {
    /// The minimal ATR `3B 00`
    pub fn new() -> Self {
        Atr::from_parts(
            Convention::Direct,
            InterfaceGroupChain::new(),
            Vec::new(),
            HistoricalCharacters::None,
            None,
            vec![Convention::Direct.as_byte(), 0x00],
        )
    }

    /// Parse with the default, lenient [`Parser`]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Parser::new().parse(bytes)
    }

    pub(crate) fn from_parts(
        convention: Convention,
        chain: InterfaceGroupChain,
        historical_bytes: Vec<u8>,
        historical: HistoricalCharacters,
        tck: Option<u8>,
        bytes: Vec<u8>,
    ) -> Self {
        Atr {
            convention,
            chain,
            historical_bytes,
            historical,
            tck,
            bytes,
            subscribers: Subscribers::default(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.bytes.clone()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn convention(&self) -> Convention {
        self.convention
    }

    pub fn chain(&self) -> &InterfaceGroupChain {
        &self.chain
    }

    pub fn historical_bytes(&self) -> &[u8] {
        &self.historical_bytes
    }

    pub fn historical_characters(&self) -> &HistoricalCharacters {
        &self.historical
    }

    /// Compact-TLV content of the historical characters, if that is their kind
    pub fn compact_tlv(&self) -> Option<&CompactTlv> {
        self.historical.compact_tlv()
    }

    /// TCK as received
    pub fn checksum(&self) -> Option<u8> {
        self.tck
    }

    pub fn checksum_status(&self) -> ChecksumStatus {
        match self.tck {
            None => ChecksumStatus::Absent,
            Some(actual) => {
                let expected = xor_checksum(&self.bytes[1..self.bytes.len() - 1]);
                if expected == actual {
                    ChecksumStatus::Valid
                } else {
                    ChecksumStatus::Invalid { expected, actual }
                }
            }
        }
    }

    /// Protocols offered by the card, T=0 when none is named
    pub fn indicated_protocols(&self) -> Vec<ProtocolType> {
        self.chain.indicated_protocols()
    }

    pub fn global_parameters(&self) -> GlobalParameters<'_> {
        GlobalParameters::new(&self.chain)
    }

    pub fn global_parameters_mut(&mut self) -> GlobalParametersMut<'_> {
        GlobalParametersMut::new(self)
    }

    pub fn t0_parameters(&self) -> T0Parameters<'_> {
        T0Parameters::new(&self.chain)
    }

    /// Writable T=0 parameters, `None` unless T=0 is indicated
    pub fn t0_parameters_mut(&mut self) -> Option<T0ParametersMut<'_>> {
        if !self.chain.indicates(ProtocolType::T0) {
            return None;
        }
        Some(T0ParametersMut::new(self))
    }

    pub fn t1_parameters(&self) -> T1Parameters<'_> {
        T1Parameters::new(&self.chain)
    }

    /// Writable T=1 parameters, `None` unless T=1 is indicated
    pub fn t1_parameters_mut(&mut self) -> Option<T1ParametersMut<'_>> {
        if !self.chain.indicates(ProtocolType::T1) {
            return None;
        }
        Some(T1ParametersMut::new(self))
    }

    pub fn unknown_protocol_parameters(
        &self,
        protocol: ProtocolType,
    ) -> Option<UnknownProtocolParameters<'_>> {
        match self.protocol_parameters(protocol)? {
            ProtocolParameters::Unknown(params) => Some(params),
            _ => None,
        }
    }

    /// Raw access to an indicated protocol other than T=0 and T=1
    pub fn unknown_protocol_parameters_mut(
        &mut self,
        protocol: ProtocolType,
    ) -> Option<UnknownProtocolParametersMut<'_>> {
        if matches!(protocol, ProtocolType::T0 | ProtocolType::T1)
            || !protocol.is_protocol()
            || !self.chain.indicates(protocol)
        {
            return None;
        }
        Some(UnknownProtocolParametersMut::new(self, protocol))
    }

    pub fn protocol_parameters(&self, protocol: ProtocolType) -> Option<ProtocolParameters<'_>> {
        ProtocolParameters::for_protocol(&self.chain, protocol)
    }

    /// Offer an additional protocol
    pub fn indicate_protocol(&mut self, protocol: ProtocolType) -> Result<()> {
        self.update_chain(|chain| chain.add_indication(protocol))
    }

    /// Withdraw a protocol together with its specific bytes
    pub fn remove_protocol_indication(&mut self, protocol: ProtocolType) -> Result<()> {
        self.update_chain(|chain| chain.remove_indication(protocol))
    }

    pub fn set_convention(&mut self, convention: Convention) -> Result<()> {
        let bytes = self.encode(convention, &self.chain, &self.historical_bytes)?;
        self.reload(bytes)
    }

    /// Replace the historical characters with raw bytes, interpreted afresh
    pub fn set_historical_bytes(&mut self, historical_bytes: &[u8]) -> Result<()> {
        let bytes = self.encode(self.convention, &self.chain, historical_bytes)?;
        self.reload(bytes)
    }

    pub fn set_historical_characters(&mut self, historical: &HistoricalCharacters) -> Result<()> {
        self.set_historical_bytes(&historical.encode()?)
    }

    /// Switch the historical characters to the minimal content of `kind`
    ///
    /// Staying on the current kind keeps the current content.
    pub fn set_historical_characters_kind(&mut self, kind: HistoricalKind) -> Result<()> {
        if kind == self.historical.kind() {
            return Ok(());
        }
        let historical = HistoricalCharacters::default_for(kind)?;
        self.set_historical_characters(&historical)
    }

    /// Edit the compact-TLV historical characters
    pub fn update_compact_tlv<F>(&mut self, edit: F) -> Result<()>
    where
        F: FnOnce(&mut CompactTlv) -> Result<()>,
    {
        let mut tlv = self.historical.compact_tlv().cloned().ok_or_else(|| {
            AtrError::invalid_operation(format!(
                "Historical characters are {}, not compact-TLV",
                self.historical.kind()
            ))
        })?;
        edit(&mut tlv)?;
        self.set_historical_bytes(&tlv.encode()?)
    }

    /// Register a callback run with the new bytes after each change
    pub fn on_changed<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        let id = SubscriptionId(self.subscribers.next_id);
        self.subscribers.next_id += 1;
        self.subscribers.callbacks.push((id, Box::new(callback)));
        id
    }

    /// Returns false if `id` was not subscribed
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.callbacks.len();
        self.subscribers.callbacks.retain(|(other, _)| *other != id);
        self.subscribers.callbacks.len() != before
    }

    /// Apply `edit` to a copy of the chain and commit it if the result parses
    pub(crate) fn update_chain<F>(&mut self, edit: F) -> Result<()>
    where
        F: FnOnce(&mut InterfaceGroupChain) -> Result<()>,
    {
        let mut chain = self.chain.clone();
        edit(&mut chain)?;
        let bytes = self.encode(self.convention, &chain, &self.historical_bytes)?;
        self.reload(bytes)
    }

    fn encode(
        &self,
        convention: Convention,
        chain: &InterfaceGroupChain,
        historical_bytes: &[u8],
    ) -> Result<Vec<u8>> {
        let mut writer = ByteWriter::new();
        writer.write_u8(convention.as_byte());
        chain.serialize(historical_bytes.len(), &mut writer)?;
        writer.write_bytes(historical_bytes);
        // A T=0-only ATR may keep its TCK only while it stays T=0-only
        let keep_tck = self.tck.is_some() && !self.chain.checksum_required();
        if chain.checksum_required() || keep_tck {
            let tck = xor_checksum(&writer.as_slice()[1..]);
            writer.write_u8(tck);
        }
        Ok(writer.into_bytes())
    }

    fn reload(&mut self, bytes: Vec<u8>) -> Result<()> {
        let parsed = Parser::new().parse(&bytes).map_err(|err| {
            warn!(%err, "edited ATR does not parse, keeping the previous one");
            err
        })?;
        if parsed.bytes == self.bytes {
            return Ok(());
        }

        let subscribers = std::mem::take(&mut self.subscribers);
        *self = parsed;
        self.subscribers = subscribers;
        debug!(atr = %self, "ATR updated");
        self.notify();
        Ok(())
    }

    fn notify(&mut self) {
        let mut subscribers = std::mem::take(&mut self.subscribers);
        for (_, callback) in subscribers.callbacks.iter_mut() {
            callback(&self.bytes);
        }
        self.subscribers = subscribers;
    }
}

impl Default for Atr {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Atr {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for Atr {}

impl fmt::Display for Atr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(&self.bytes))
    }
}

/// Parse hex, ignoring whitespace
impl FromStr for Atr {
    type Err = AtrError;

    fn from_str(s: &str) -> Result<Self> {
        let digits: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = hex::decode(&digits)
            .map_err(|err| AtrError::invalid_structure(format!("Invalid hex: {}", err)))?;
        Atr::from_bytes(&bytes)
    }
}

impl TryFrom<&[u8]> for Atr {
    type Error = AtrError;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        Atr::from_bytes(bytes)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Atr {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Atr {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = <String as serde::Deserialize>::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
