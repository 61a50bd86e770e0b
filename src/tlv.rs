//! Compact-TLV data objects found in the historical characters
//!
//! ISO/IEC 7816-4 reserves tags 0x40 to 0x4F for data objects in the
//! historical characters. Each tag here has one decoder and one encoder; a
//! decoding failure is reported as a message and never aborts the scan of the
//! surrounding structure.

use crate::error::{AtrError, Result};
use tracing::warn;

pub const TAG_COUNTRY_CODE: u8 = 0x41;
pub const TAG_ISSUER_ID: u8 = 0x42;
pub const TAG_CARD_SERVICE_DATA: u8 = 0x43;
pub const TAG_INITIAL_ACCESS_DATA: u8 = 0x44;
pub const TAG_CARD_ISSUER_DATA: u8 = 0x45;
pub const TAG_PRE_ISSUING_DATA: u8 = 0x46;
pub const TAG_CARD_CAPABILITIES: u8 = 0x47;
pub const TAG_STATUS_INDICATOR: u8 = 0x48;
pub const TAG_APPLICATION_IDENTIFIER: u8 = 0x4F;

/// Longest value a compact-TLV length nibble can describe
pub const MAX_VALUE_LEN: usize = 15;

type DecodeResult<T> = std::result::Result<T, String>;

/// Country code and national data (tag 0x41)
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CountryCode {
    /// ISO 3166-1 numeric code, three BCD digits
    pub code: u16,
    /// National data; the first byte only contributes its low nibble
    pub national_data: Vec<u8>,
}

impl CountryCode {
    fn decode(value: &[u8]) -> DecodeResult<Self> {
        if value.len() < 2 {
            return Err(format!(
                "Country code needs at least 2 bytes, got {}",
                value.len()
            ));
        }

        let digits = [value[0] >> 4, value[0] & 0x0F, value[1] >> 4];
        if digits.iter().any(|&digit| digit > 9) {
            return Err(format!(
                "Country code {:02X}{:X} is not BCD",
                value[0],
                value[1] >> 4
            ));
        }

        let mut national_data = vec![value[1] & 0x0F];
        national_data.extend_from_slice(&value[2..]);
        Ok(CountryCode {
            code: digits[0] as u16 * 100 + digits[1] as u16 * 10 + digits[2] as u16,
            national_data,
        })
    }

    fn encode(&self) -> Result<Vec<u8>> {
        if self.code > 999 {
            return Err(AtrError::invalid_parameter(format!(
                "Country code {} has more than 3 digits",
                self.code
            )));
        }

        let lead = match self.national_data.first() {
            Some(&nibble) if nibble > 0x0F => {
                return Err(AtrError::invalid_parameter(
                    "First national data byte must hold a single nibble",
                ))
            }
            Some(&nibble) => nibble,
            None => 0x0F,
        };

        let hundreds = (self.code / 100) as u8;
        let tens = (self.code / 10 % 10) as u8;
        let units = (self.code % 10) as u8;
        let mut value = vec![hundreds << 4 | tens, units << 4 | lead];
        value.extend(self.national_data.iter().skip(1));
        Ok(value)
    }
}

/// Issuer identification number (tag 0x42), BCD digits padded with 0xF
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IssuerId {
    pub number: String,
}

impl IssuerId {
    fn decode(value: &[u8]) -> DecodeResult<Self> {
        if value.is_empty() {
            return Err("Issuer identification number is empty".to_string());
        }

        let nibbles: Vec<u8> = value.iter().flat_map(|b| [b >> 4, b & 0x0F]).collect();
        let digits = match nibbles.iter().position(|&nibble| nibble == 0x0F) {
            None => &nibbles[..],
            Some(0) => return Err("Issuer identification number has no digits".to_string()),
            Some(pad) if pad == nibbles.len() - 1 => &nibbles[..pad],
            Some(_) => {
                return Err("Issuer identification padding before the last nibble".to_string())
            }
        };
        if let Some(bad) = digits.iter().find(|&&digit| digit > 9) {
            return Err(format!("Issuer identification digit 0x{:X} is not BCD", bad));
        }

        Ok(IssuerId {
            number: digits.iter().map(|digit| char::from(b'0' + digit)).collect(),
        })
    }

    fn encode(&self) -> Result<Vec<u8>> {
        if self.number.is_empty() || !self.number.bytes().all(|c| c.is_ascii_digit()) {
            return Err(AtrError::invalid_parameter(format!(
                "Issuer identification number '{}' must be a non-empty digit string",
                self.number
            )));
        }

        let mut nibbles: Vec<u8> = self.number.bytes().map(|c| c - b'0').collect();
        if nibbles.len() % 2 == 1 {
            nibbles.push(0x0F);
        }
        Ok(nibbles.chunks(2).map(|pair| pair[0] << 4 | pair[1]).collect())
    }
}

/// How EF.DIR and EF.ATR are read (card service data bits 4-2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FileIoServicesMethod {
    ReadBinary,
    ReadRecord,
    GetData,
    Rfu(u8),
}

impl FileIoServicesMethod {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0b100 => FileIoServicesMethod::ReadBinary,
            0b000 => FileIoServicesMethod::ReadRecord,
            0b010 => FileIoServicesMethod::GetData,
            other => FileIoServicesMethod::Rfu(other),
        }
    }

    fn bits(&self) -> u8 {
        match self {
            FileIoServicesMethod::ReadBinary => 0b100,
            FileIoServicesMethod::ReadRecord => 0b000,
            FileIoServicesMethod::GetData => 0b010,
            FileIoServicesMethod::Rfu(bits) => bits & 0x07,
        }
    }
}

/// Card service data (tag 0x43)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CardServiceData {
    pub selection_by_full_df_name: bool,
    pub selection_by_partial_df_name: bool,
    pub data_objects_in_ef_dir: bool,
    pub data_objects_in_ef_atr: bool,
    pub file_io_method: FileIoServicesMethod,
    pub card_without_mf: bool,
}

impl CardServiceData {
    fn decode(value: &[u8]) -> DecodeResult<Self> {
        let &[byte] = value else {
            return Err(format!("Card service data is 1 byte, got {}", value.len()));
        };

        Ok(CardServiceData {
            selection_by_full_df_name: byte & 0x80 != 0,
            selection_by_partial_df_name: byte & 0x40 != 0,
            data_objects_in_ef_dir: byte & 0x20 != 0,
            data_objects_in_ef_atr: byte & 0x10 != 0,
            file_io_method: FileIoServicesMethod::from_bits(byte >> 1),
            card_without_mf: byte & 0x01 != 0,
        })
    }

    fn encode(&self) -> Vec<u8> {
        let mut byte = self.file_io_method.bits() << 1;
        if self.selection_by_full_df_name {
            byte |= 0x80;
        }
        if self.selection_by_partial_df_name {
            byte |= 0x40;
        }
        if self.data_objects_in_ef_dir {
            byte |= 0x20;
        }
        if self.data_objects_in_ef_atr {
            byte |= 0x10;
        }
        if self.card_without_mf {
            byte |= 0x01;
        }
        vec![byte]
    }
}

/// Initial access data (tag 0x44)
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InitialAccessData {
    /// Number of bytes to read with an implicit READ BINARY
    ReadLength(u8),
    /// Read from a short EF identifier
    ReadFile {
        record_oriented: bool,
        short_ef_id: u8,
        length: u8,
    },
    /// Command APDU to send, at least 5 bytes
    Command(Vec<u8>),
}

impl InitialAccessData {
    fn decode(value: &[u8]) -> DecodeResult<Self> {
        match value {
            [length] => Ok(InitialAccessData::ReadLength(*length)),
            [file, length] => {
                if file & 0x60 != 0 {
                    return Err(format!(
                        "Initial access file byte 0x{:02X} has RFU bits set",
                        file
                    ));
                }
                let short_ef_id = file & 0x1F;
                check_short_ef_id(short_ef_id)?;
                Ok(InitialAccessData::ReadFile {
                    record_oriented: file & 0x80 != 0,
                    short_ef_id,
                    length: *length,
                })
            }
            apdu if apdu.len() >= 5 => Ok(InitialAccessData::Command(apdu.to_vec())),
            other => Err(format!(
                "Initial access data of {} bytes is neither a length, a file reference nor a command",
                other.len()
            )),
        }
    }

    fn encode(&self) -> Result<Vec<u8>> {
        match self {
            InitialAccessData::ReadLength(length) => Ok(vec![*length]),
            InitialAccessData::ReadFile {
                record_oriented,
                short_ef_id,
                length,
            } => {
                check_short_ef_id(*short_ef_id).map_err(AtrError::invalid_parameter)?;
                let file = if *record_oriented { 0x80 } else { 0x00 } | short_ef_id;
                Ok(vec![file, *length])
            }
            InitialAccessData::Command(apdu) if apdu.len() >= 5 => Ok(apdu.clone()),
            InitialAccessData::Command(apdu) => Err(AtrError::invalid_parameter(format!(
                "Command APDU of {} bytes is shorter than a header plus Le",
                apdu.len()
            ))),
        }
    }
}

fn check_short_ef_id(short_ef_id: u8) -> DecodeResult<()> {
    if short_ef_id == 0 || short_ef_id > 0x1E {
        return Err(format!("Short EF identifier {} is outside 1 to 30", short_ef_id));
    }
    Ok(())
}

/// Behaviour of write functions (data coding byte bits 7-6)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WriteBehaviour {
    OneTimeWrite,
    Proprietary,
    WriteOr,
    WriteAnd,
}

/// Data coding byte, second byte of the card capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DataCoding(u8);

impl DataCoding {
    pub fn new(byte: u8) -> Self {
        DataCoding(byte)
    }

    pub fn byte(&self) -> u8 {
        self.0
    }

    pub fn tlv_efs_supported(&self) -> bool {
        self.0 & 0x80 != 0
    }

    pub fn write_behaviour(&self) -> WriteBehaviour {
        match (self.0 >> 5) & 0x03 {
            0 => WriteBehaviour::OneTimeWrite,
            1 => WriteBehaviour::Proprietary,
            2 => WriteBehaviour::WriteOr,
            _ => WriteBehaviour::WriteAnd,
        }
    }

    /// Whether 0xFF is a valid first byte of a BER-TLV tag
    pub fn ff_tag_valid(&self) -> bool {
        self.0 & 0x10 != 0
    }

    /// Data unit size in quartets
    pub fn data_unit_quartets(&self) -> u32 {
        1 << (self.0 & 0x0F)
    }
}

/// Logical channel support (third card capabilities byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LogicalChannels {
    pub assignment_by_card: bool,
    pub assignment_by_interface: bool,
    /// Maximum number of channels, 1 to 4
    pub max_channels: u8,
}

/// Card capabilities (tag 0x47)
///
/// The data coding byte and the third byte are optional, but the third can
/// only be sent after the second.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CardCapabilities {
    pub selection_methods: u8,
    data_coding: Option<u8>,
    third: Option<u8>,
}

impl CardCapabilities {
    pub const SELECT_BY_FULL_DF_NAME: u8 = 0x80;
    pub const SELECT_BY_PARTIAL_DF_NAME: u8 = 0x40;
    pub const SELECT_BY_PATH: u8 = 0x20;
    pub const SELECT_BY_FILE_ID: u8 = 0x10;
    pub const IMPLICIT_DF_SELECTION: u8 = 0x08;
    pub const SHORT_EF_ID: u8 = 0x04;
    pub const RECORD_NUMBER: u8 = 0x02;
    pub const RECORD_IDENTIFIER: u8 = 0x01;

    const COMMAND_CHAINING: u8 = 0x80;
    const EXTENDED_LENGTHS: u8 = 0x40;
    const CHANNEL_BY_CARD: u8 = 0x10;
    const CHANNEL_BY_INTERFACE: u8 = 0x08;
    const CHANNEL_MASK: u8 = 0x1B;

    /// Capabilities with only the selection methods byte
    pub fn new(selection_methods: u8) -> Self {
        CardCapabilities {
            selection_methods,
            data_coding: None,
            third: None,
        }
    }

    fn decode(value: &[u8]) -> DecodeResult<Self> {
        match value {
            [first] => Ok(CardCapabilities::new(*first)),
            [first, second] => Ok(CardCapabilities {
                selection_methods: *first,
                data_coding: Some(*second),
                third: None,
            }),
            [first, second, third] => Ok(CardCapabilities {
                selection_methods: *first,
                data_coding: Some(*second),
                third: Some(*third),
            }),
            other => Err(format!(
                "Card capabilities are 1 to 3 bytes, got {}",
                other.len()
            )),
        }
    }

    fn encode(&self) -> Vec<u8> {
        let mut value = vec![self.selection_methods];
        if let Some(second) = self.data_coding.or(self.third.map(|_| crate::defaults::DATA_CODING)) {
            value.push(second);
        }
        if let Some(third) = self.third {
            value.push(third);
        }
        value
    }

    pub fn supports(&self, selection_method: u8) -> bool {
        self.selection_methods & selection_method == selection_method
    }

    pub fn data_coding(&self) -> Option<DataCoding> {
        self.data_coding.map(DataCoding)
    }

    /// Set or clear the data coding byte; it cannot be cleared under a third byte
    pub fn set_data_coding(&mut self, coding: Option<DataCoding>) -> Result<()> {
        if coding.is_none() && self.third.is_some() {
            return Err(AtrError::invalid_operation(
                "The data coding byte is needed while the third capabilities byte is present",
            ));
        }
        self.data_coding = coding.map(|coding| coding.0);
        Ok(())
    }

    /// Raw third byte
    pub fn third_byte(&self) -> Option<u8> {
        self.third
    }

    pub fn command_chaining(&self) -> bool {
        self.third.is_some_and(|b| b & Self::COMMAND_CHAINING != 0)
    }

    pub fn extended_lengths(&self) -> bool {
        self.third.is_some_and(|b| b & Self::EXTENDED_LENGTHS != 0)
    }

    /// Logical channel support, `None` when the card assigns no channels
    pub fn logical_channels(&self) -> Option<LogicalChannels> {
        let byte = self.third?;
        let by_card = byte & Self::CHANNEL_BY_CARD != 0;
        let by_interface = byte & Self::CHANNEL_BY_INTERFACE != 0;
        if !by_card && !by_interface {
            return None;
        }

        Some(LogicalChannels {
            assignment_by_card: by_card,
            assignment_by_interface: by_interface,
            max_channels: (byte & 0x03) + 1,
        })
    }

    /// Update the third byte, materializing the data coding byte it needs
    fn update_third(&mut self, mask: u8, bits: u8) {
        let byte = (self.third.unwrap_or(0) & !mask) | bits;
        if byte == 0 {
            self.third = None;
        } else {
            self.data_coding.get_or_insert(crate::defaults::DATA_CODING);
            self.third = Some(byte);
        }
    }

    pub fn set_command_chaining(&mut self, enabled: bool) {
        let bits = if enabled { Self::COMMAND_CHAINING } else { 0 };
        self.update_third(Self::COMMAND_CHAINING, bits);
    }

    pub fn set_extended_lengths(&mut self, enabled: bool) {
        let bits = if enabled { Self::EXTENDED_LENGTHS } else { 0 };
        self.update_third(Self::EXTENDED_LENGTHS, bits);
    }

    /// Write or remove logical channel support
    ///
    /// Removing it drops the third byte once nothing else is coded there; the
    /// data coding byte is left as it is.
    pub fn set_logical_channels(&mut self, channels: Option<LogicalChannels>) -> Result<()> {
        let bits = match channels {
            None => 0,
            Some(channels) => {
                if !(1..=4).contains(&channels.max_channels) {
                    return Err(AtrError::invalid_parameter(format!(
                        "Logical channel count {} is outside 1 to 4",
                        channels.max_channels
                    )));
                }
                if !channels.assignment_by_card && !channels.assignment_by_interface {
                    return Err(AtrError::invalid_parameter(
                        "Logical channels need assignment by the card or by the interface device",
                    ));
                }

                let mut bits = channels.max_channels - 1;
                if channels.assignment_by_card {
                    bits |= Self::CHANNEL_BY_CARD;
                }
                if channels.assignment_by_interface {
                    bits |= Self::CHANNEL_BY_INTERFACE;
                }
                bits
            }
        };

        self.update_third(Self::CHANNEL_MASK, bits);
        Ok(())
    }
}

/// Card life cycle status and/or status word (tag 0x48)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatusIndicator {
    pub life_cycle_status: Option<u8>,
    pub status_word: Option<u16>,
    /// Carried as a TLV object (category 0x80) rather than as three bytes
    /// after the TLV objects (category 0x00)
    pub included_in_tlv: bool,
}

impl StatusIndicator {
    fn decode(value: &[u8]) -> DecodeResult<Self> {
        let (life_cycle_status, status_word) = match value {
            [lcs] => (Some(*lcs), None),
            [sw1, sw2] => (None, Some(u16::from_be_bytes([*sw1, *sw2]))),
            [lcs, sw1, sw2] => (Some(*lcs), Some(u16::from_be_bytes([*sw1, *sw2]))),
            other => {
                return Err(format!(
                    "Status indicator is 1 to 3 bytes, got {}",
                    other.len()
                ))
            }
        };

        Ok(StatusIndicator {
            life_cycle_status,
            status_word,
            included_in_tlv: true,
        })
    }

    /// Decode the three bytes that follow the TLV objects under category 0x00
    pub(crate) fn decode_appended(value: [u8; 3]) -> Self {
        StatusIndicator {
            life_cycle_status: Some(value[0]),
            status_word: Some(u16::from_be_bytes([value[1], value[2]])),
            included_in_tlv: false,
        }
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let mut value = Vec::with_capacity(3);
        if let Some(lcs) = self.life_cycle_status {
            value.push(lcs);
        }
        if let Some(sw) = self.status_word {
            value.extend_from_slice(&sw.to_be_bytes());
        }
        if value.is_empty() {
            return Err(AtrError::invalid_parameter(
                "Status indicator needs a life cycle status or a status word",
            ));
        }
        Ok(value)
    }

    /// Three bytes written after the TLV objects, absent parts filled with
    /// "no information" (0x00) and 0x9000
    pub(crate) fn appended_bytes(&self) -> [u8; 3] {
        let [sw1, sw2] = self.status_word.unwrap_or(0x9000).to_be_bytes();
        [self.life_cycle_status.unwrap_or(0x00), sw1, sw2]
    }
}

/// A decoded compact-TLV data object
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DataObject {
    /// Tags 0x40 and 0x49 to 0x4E, kept as they are
    Rfu { tag: u8, data: Vec<u8> },
    CountryCode(CountryCode),
    IssuerId(IssuerId),
    CardServiceData(CardServiceData),
    InitialAccessData(InitialAccessData),
    CardIssuerData(Vec<u8>),
    PreIssuingData(Vec<u8>),
    CardCapabilities(CardCapabilities),
    StatusIndicator(StatusIndicator),
    ApplicationIdentifier(Vec<u8>),
}

impl DataObject {
    /// Decode the value of a data object with the given tag
    pub fn decode(tag: u8, value: &[u8]) -> DecodeResult<Self> {
        match tag {
            TAG_COUNTRY_CODE => CountryCode::decode(value).map(DataObject::CountryCode),
            TAG_ISSUER_ID => IssuerId::decode(value).map(DataObject::IssuerId),
            TAG_CARD_SERVICE_DATA => CardServiceData::decode(value).map(DataObject::CardServiceData),
            TAG_INITIAL_ACCESS_DATA => {
                InitialAccessData::decode(value).map(DataObject::InitialAccessData)
            }
            TAG_CARD_ISSUER_DATA => Ok(DataObject::CardIssuerData(value.to_vec())),
            TAG_PRE_ISSUING_DATA => Ok(DataObject::PreIssuingData(value.to_vec())),
            TAG_CARD_CAPABILITIES => {
                CardCapabilities::decode(value).map(DataObject::CardCapabilities)
            }
            TAG_STATUS_INDICATOR => StatusIndicator::decode(value).map(DataObject::StatusIndicator),
            TAG_APPLICATION_IDENTIFIER => {
                if value.len() < 5 {
                    return Err(format!(
                        "Application identifier needs at least a 5-byte RID, got {} bytes",
                        value.len()
                    ));
                }
                Ok(DataObject::ApplicationIdentifier(value.to_vec()))
            }
            0x40..=0x4F => Ok(DataObject::Rfu {
                tag,
                data: value.to_vec(),
            }),
            other => Err(format!("0x{:02X} is not a compact-TLV tag", other)),
        }
    }

    pub fn tag(&self) -> u8 {
        match self {
            DataObject::Rfu { tag, .. } => *tag,
            DataObject::CountryCode(_) => TAG_COUNTRY_CODE,
            DataObject::IssuerId(_) => TAG_ISSUER_ID,
            DataObject::CardServiceData(_) => TAG_CARD_SERVICE_DATA,
            DataObject::InitialAccessData(_) => TAG_INITIAL_ACCESS_DATA,
            DataObject::CardIssuerData(_) => TAG_CARD_ISSUER_DATA,
            DataObject::PreIssuingData(_) => TAG_PRE_ISSUING_DATA,
            DataObject::CardCapabilities(_) => TAG_CARD_CAPABILITIES,
            DataObject::StatusIndicator(_) => TAG_STATUS_INDICATOR,
            DataObject::ApplicationIdentifier(_) => TAG_APPLICATION_IDENTIFIER,
        }
    }

    /// Encode the value bytes, without the tag/length byte
    pub fn encode(&self) -> Result<Vec<u8>> {
        let value = match self {
            DataObject::Rfu { tag, data } => {
                if !is_rfu_tag(*tag) {
                    return Err(AtrError::invalid_parameter(format!(
                        "0x{:02X} is not a reserved compact-TLV tag",
                        tag
                    )));
                }
                data.clone()
            }
            DataObject::CountryCode(country) => country.encode()?,
            DataObject::IssuerId(issuer) => issuer.encode()?,
            DataObject::CardServiceData(service) => service.encode(),
            DataObject::InitialAccessData(access) => access.encode()?,
            DataObject::CardIssuerData(data) | DataObject::PreIssuingData(data) => data.clone(),
            DataObject::CardCapabilities(capabilities) => capabilities.encode(),
            DataObject::StatusIndicator(status) => status.encode()?,
            DataObject::ApplicationIdentifier(aid) => {
                if aid.len() < 5 {
                    return Err(AtrError::invalid_parameter(format!(
                        "Application identifier of {} bytes is shorter than a RID",
                        aid.len()
                    )));
                }
                aid.clone()
            }
        };

        if value.len() > MAX_VALUE_LEN {
            return Err(AtrError::invalid_parameter(format!(
                "Data object 0x{:02X} is {} bytes, compact-TLV allows {}",
                self.tag(),
                value.len(),
                MAX_VALUE_LEN
            )));
        }
        Ok(value)
    }
}

/// Tags with no meaning assigned
pub fn is_rfu_tag(tag: u8) -> bool {
    matches!(tag, 0x40 | 0x49..=0x4E)
}

/// Common surface of interpreted structures: whether they apply, the bytes
/// behind them and what went wrong while decoding
pub trait Interpreted {
    fn is_applicable(&self) -> bool;

    fn raw_data(&self) -> Option<Vec<u8>>;

    fn error_message(&self) -> Option<String>;
}

/// Registry slot for one compact-TLV tag
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DataObjectEntry {
    tag: u8,
    object: Option<DataObject>,
    data_error: Option<String>,
    /// Value bytes that did not decode, written back unchanged
    undecoded: Option<Vec<u8>>,
}

impl DataObjectEntry {
    pub(crate) fn empty(tag: u8) -> Self {
        DataObjectEntry {
            tag,
            object: None,
            data_error: None,
            undecoded: None,
        }
    }

    /// Decode `value` into this slot, recording a failure as a data error
    pub(crate) fn load(&mut self, value: &[u8]) {
        match DataObject::decode(self.tag, value) {
            Ok(object) => {
                self.object = Some(object);
                self.data_error = None;
                self.undecoded = None;
            }
            Err(message) => {
                warn!(tag = self.tag, %message, "compact-TLV data object did not decode");
                self.object = None;
                self.data_error = Some(message);
                self.undecoded = Some(value.to_vec());
            }
        }
    }

    pub(crate) fn set(&mut self, object: Option<DataObject>) {
        self.object = object;
        self.data_error = None;
        self.undecoded = None;
    }

    /// Value bytes to write for this slot, `None` when the slot is empty
    pub(crate) fn value(&self) -> Result<Option<Vec<u8>>> {
        match (&self.object, &self.undecoded) {
            (Some(object), _) => object.encode().map(Some),
            (None, Some(raw)) => Ok(Some(raw.clone())),
            (None, None) => Ok(None),
        }
    }

    pub fn tag(&self) -> u8 {
        self.tag
    }

    pub fn object(&self) -> Option<&DataObject> {
        self.object.as_ref()
    }

    pub fn data_error(&self) -> Option<&str> {
        self.data_error.as_deref()
    }
}

impl Interpreted for DataObjectEntry {
    fn is_applicable(&self) -> bool {
        self.object.is_some()
    }

    fn raw_data(&self) -> Option<Vec<u8>> {
        self.value().ok().flatten()
    }

    fn error_message(&self) -> Option<String> {
        self.data_error.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_service_data() {
        let object = DataObject::decode(TAG_CARD_SERVICE_DATA, &[0x08]).unwrap();
        let DataObject::CardServiceData(service) = &object else {
            panic!("wrong variant {:?}", object);
        };
        assert_eq!(service.file_io_method, FileIoServicesMethod::ReadBinary);
        assert!(!service.selection_by_full_df_name);
        assert_eq!(object.encode().unwrap(), vec![0x08]);

        let object = DataObject::decode(TAG_CARD_SERVICE_DATA, &[0xE1]).unwrap();
        let DataObject::CardServiceData(service) = object else {
            panic!("wrong variant");
        };
        assert!(service.selection_by_full_df_name);
        assert!(service.selection_by_partial_df_name);
        assert!(service.data_objects_in_ef_dir);
        assert_eq!(service.file_io_method, FileIoServicesMethod::ReadRecord);
        assert!(service.card_without_mf);

        assert!(DataObject::decode(TAG_CARD_SERVICE_DATA, &[0x08, 0x00]).is_err());
    }

    #[test]
    fn test_country_code() {
        let object = DataObject::decode(TAG_COUNTRY_CODE, &[0x27, 0x6F]).unwrap();
        let DataObject::CountryCode(country) = &object else {
            panic!("wrong variant");
        };
        assert_eq!(country.code, 276);
        assert_eq!(country.national_data, vec![0x0F]);
        assert_eq!(object.encode().unwrap(), vec![0x27, 0x6F]);

        assert!(DataObject::decode(TAG_COUNTRY_CODE, &[0x2A, 0x60]).is_err());
        assert!(DataObject::decode(TAG_COUNTRY_CODE, &[0x27]).is_err());
    }

    #[test]
    fn test_issuer_id() {
        let object = DataObject::decode(TAG_ISSUER_ID, &[0x12, 0x34, 0x5F]).unwrap();
        assert_eq!(
            object,
            DataObject::IssuerId(IssuerId {
                number: "12345".to_string()
            })
        );
        assert_eq!(object.encode().unwrap(), vec![0x12, 0x34, 0x5F]);
        assert!(DataObject::decode(TAG_ISSUER_ID, &[0x1F, 0x23]).is_err());
        assert!(DataObject::decode(TAG_ISSUER_ID, &[0xFF]).is_err());
        assert!(DataObject::decode(TAG_ISSUER_ID, &[0x12, 0xFF]).is_err());
    }

    #[test]
    fn test_initial_access_data_forms() {
        assert_eq!(
            DataObject::decode(TAG_INITIAL_ACCESS_DATA, &[0x10]).unwrap(),
            DataObject::InitialAccessData(InitialAccessData::ReadLength(0x10))
        );
        assert_eq!(
            DataObject::decode(TAG_INITIAL_ACCESS_DATA, &[0x82, 0x20]).unwrap(),
            DataObject::InitialAccessData(InitialAccessData::ReadFile {
                record_oriented: true,
                short_ef_id: 2,
                length: 0x20,
            })
        );
        assert!(DataObject::decode(TAG_INITIAL_ACCESS_DATA, &[0x00, 0xB0, 0x00]).is_err());
    }

    #[test]
    fn test_initial_access_file_byte_checked() {
        for file in [0x00, 0x80, 0x1F, 0x9F, 0x61, 0xC2] {
            assert!(
                DataObject::decode(TAG_INITIAL_ACCESS_DATA, &[file, 0x20]).is_err(),
                "file byte 0x{:02X}",
                file
            );
        }

        let object = DataObject::decode(TAG_INITIAL_ACCESS_DATA, &[0x1E, 0x20]).unwrap();
        assert_eq!(object.encode().unwrap(), vec![0x1E, 0x20]);
    }

    #[test]
    fn test_decoded_objects_reencode_exactly() {
        let mut values: Vec<Vec<u8>> = vec![vec![]];
        values.extend((0..=0xFFu8).map(|b| vec![b]));
        for first in 0..=0xFFu8 {
            for second in 0..=0xFFu8 {
                values.push(vec![first, second]);
            }
        }
        values.push(vec![0x12, 0x34, 0x5F]);
        values.push(vec![0x27, 0x6F, 0x01, 0x02]);
        values.push(vec![0x80, 0x21, 0x9B]);
        values.push(vec![0x07, 0x90, 0x00]);
        values.push(vec![0x00, 0xB0, 0x00, 0x00, 0x10]);
        values.push(vec![0xA0, 0x00, 0x00, 0x03, 0x08, 0x00]);

        for tag in 0x40..=0x4F {
            for value in &values {
                if let Ok(object) = DataObject::decode(tag, value) {
                    assert_eq!(
                        object.encode().as_ref(),
                        Ok(value),
                        "tag 0x{:02X} value {:02X?}",
                        tag,
                        value
                    );
                }
            }
        }
    }

    #[test]
    fn test_card_capabilities_third_byte() -> Result<()> {
        let object = DataObject::decode(TAG_CARD_CAPABILITIES, &[0xC0, 0x21, 0xC0]).unwrap();
        let DataObject::CardCapabilities(capabilities) = object else {
            panic!("wrong variant");
        };
        assert!(capabilities.supports(CardCapabilities::SELECT_BY_FULL_DF_NAME));
        assert!(capabilities.command_chaining());
        assert!(capabilities.extended_lengths());
        assert_eq!(capabilities.logical_channels(), None);
        assert_eq!(capabilities.data_coding().map(|c| c.data_unit_quartets()), Some(2));
        Ok(())
    }

    #[test]
    fn test_logical_channels_materialize_third_byte() -> Result<()> {
        let mut capabilities = CardCapabilities::new(0x80);
        capabilities.set_logical_channels(Some(LogicalChannels {
            assignment_by_card: true,
            assignment_by_interface: false,
            max_channels: 4,
        }))?;
        assert_eq!(capabilities.encode(), vec![0x80, crate::defaults::DATA_CODING, 0x13]);

        capabilities.set_logical_channels(None)?;
        assert_eq!(capabilities.third_byte(), None);
        assert_eq!(capabilities.encode(), vec![0x80, crate::defaults::DATA_CODING]);
        Ok(())
    }

    #[test]
    fn test_removing_channels_keeps_other_bits() -> Result<()> {
        let DataObject::CardCapabilities(mut capabilities) =
            DataObject::decode(TAG_CARD_CAPABILITIES, &[0x80, 0x21, 0x9B]).unwrap()
        else {
            panic!("wrong variant");
        };
        assert_eq!(
            capabilities.logical_channels(),
            Some(LogicalChannels {
                assignment_by_card: true,
                assignment_by_interface: true,
                max_channels: 4,
            })
        );

        capabilities.set_logical_channels(None)?;
        assert_eq!(capabilities.encode(), vec![0x80, 0x21, 0x80]);
        Ok(())
    }

    #[test]
    fn test_channel_count_range() {
        let mut capabilities = CardCapabilities::new(0x00);
        for max_channels in [0, 5] {
            let result = capabilities.set_logical_channels(Some(LogicalChannels {
                assignment_by_card: true,
                assignment_by_interface: true,
                max_channels,
            }));
            assert!(matches!(result, Err(AtrError::InvalidParameter(_))));
        }
        assert_eq!(capabilities.third_byte(), None);
    }

    #[test]
    fn test_data_coding_needed_under_third_byte() {
        let mut capabilities = CardCapabilities::new(0x00);
        capabilities.set_command_chaining(true);
        assert!(capabilities.set_data_coding(None).is_err());
        capabilities.set_command_chaining(false);
        assert!(capabilities.set_data_coding(None).is_ok());
        assert_eq!(capabilities.encode(), vec![0x00]);
    }

    #[test]
    fn test_status_indicator_lengths() {
        let lcs = DataObject::decode(TAG_STATUS_INDICATOR, &[0x07]).unwrap();
        assert_eq!(
            lcs,
            DataObject::StatusIndicator(StatusIndicator {
                life_cycle_status: Some(0x07),
                status_word: None,
                included_in_tlv: true,
            })
        );

        let sw = DataObject::decode(TAG_STATUS_INDICATOR, &[0x90, 0x00]).unwrap();
        assert_eq!(sw.encode().unwrap(), vec![0x90, 0x00]);

        assert!(DataObject::decode(TAG_STATUS_INDICATOR, &[]).is_err());
        assert!(DataObject::decode(TAG_STATUS_INDICATOR, &[1, 2, 3, 4]).is_err());
    }

    #[test]
    fn test_status_appended_bytes_fill_defaults() {
        let status = StatusIndicator {
            life_cycle_status: None,
            status_word: Some(0x6A82),
            included_in_tlv: false,
        };
        assert_eq!(status.appended_bytes(), [0x00, 0x6A, 0x82]);
    }

    #[test]
    fn test_application_identifier_length() {
        assert!(DataObject::decode(TAG_APPLICATION_IDENTIFIER, &[0xA0, 0x00, 0x00]).is_err());
        let aid = [0xA0, 0x00, 0x00, 0x03, 0x08, 0x00, 0x00, 0x10, 0x00];
        assert_eq!(
            DataObject::decode(TAG_APPLICATION_IDENTIFIER, &aid).unwrap(),
            DataObject::ApplicationIdentifier(aid.to_vec())
        );
    }

    #[test]
    fn test_rfu_tags_kept_opaque() {
        let object = DataObject::decode(0x4A, &[0x01, 0x02]).unwrap();
        assert_eq!(object.tag(), 0x4A);
        assert_eq!(object.encode().unwrap(), vec![0x01, 0x02]);
        assert!(is_rfu_tag(0x40));
        assert!(!is_rfu_tag(0x4F));
    }

    #[test]
    fn test_value_too_long() {
        let object = DataObject::CardIssuerData(vec![0u8; 16]);
        assert!(object.encode().is_err());
    }

    #[test]
    fn test_entry_records_data_error() {
        let mut entry = DataObjectEntry::empty(TAG_CARD_SERVICE_DATA);
        entry.load(&[0x01, 0x02]);
        assert!(!entry.is_applicable());
        assert!(entry.data_error().is_some());
        assert_eq!(entry.raw_data(), Some(vec![0x01, 0x02]));

        entry.load(&[0x80]);
        assert!(entry.is_applicable());
        assert_eq!(entry.error_message(), None);
        assert_eq!(entry.raw_data(), Some(vec![0x80]));
    }
}
