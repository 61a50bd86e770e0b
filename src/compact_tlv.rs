//! Compact-TLV historical characters (category indicator 0x00 or 0x80)

use crate::encoding::ByteWriter;
use crate::error::{AtrError, ParseError, Result};
use crate::tlv::{
    CardCapabilities, CardServiceData, CountryCode, DataObject, DataObjectEntry,
    InitialAccessData, IssuerId, StatusIndicator, TAG_APPLICATION_IDENTIFIER,
    TAG_CARD_CAPABILITIES, TAG_CARD_ISSUER_DATA, TAG_CARD_SERVICE_DATA, TAG_COUNTRY_CODE,
    TAG_INITIAL_ACCESS_DATA, TAG_ISSUER_ID, TAG_PRE_ISSUING_DATA, TAG_STATUS_INDICATOR,
};
use tracing::warn;

/// Category indicator: status indicator appended after the TLV objects
pub const CATEGORY_STATUS_APPENDED: u8 = 0x00;
/// Category indicator: status indicator, if any, is a TLV object
pub const CATEGORY_STATUS_IN_TLV: u8 = 0x80;

/// Decoded compact-TLV structure with one registry slot per tag 0x40..=0x4F
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CompactTlv {
    entries: Vec<DataObjectEntry>,
}

impl Default for CompactTlv {
    fn default() -> Self {
        CompactTlv {
            entries: (0x40..=0x4F).map(DataObjectEntry::empty).collect(),
        }
    }
}

impl CompactTlv {
    /// Empty structure; encodes as the single category byte 0x80
    pub fn new() -> Self {
        CompactTlv::default()
    }

    /// Decode historical characters starting with category 0x00 or 0x80
    ///
    /// Errors carry the offset into the historical characters.
    pub fn decode(bytes: &[u8]) -> std::result::Result<Self, ParseError> {
        let Some(&category) = bytes.first() else {
            return Err(ParseError::new("Missing category indicator", 0));
        };

        let mut tlv = CompactTlv::new();
        let end = match category {
            CATEGORY_STATUS_IN_TLV => bytes.len(),
            CATEGORY_STATUS_APPENDED => {
                if bytes.len() < 4 {
                    return Err(ParseError::new(
                        "Category 0x00 needs a 3-byte status indicator at the end",
                        bytes.len(),
                    ));
                }
                bytes.len() - 3
            }
            other => {
                return Err(ParseError::new(
                    format!("Category 0x{:02X} is not compact-TLV", other),
                    0,
                ))
            }
        };

        let mut index = 1;
        while index < end {
            let header = bytes[index];
            if header == 0x00 {
                index += 1;
                continue;
            }

            let tag = 0x40 | (header >> 4);
            let len = (header & 0x0F) as usize;
            let start = index + 1;
            if start + len > end {
                return Err(ParseError::new(
                    format!(
                        "Data object 0x{:02X} claims {} bytes, {} left",
                        tag,
                        len,
                        end - start
                    ),
                    index,
                ));
            }
            if tag == TAG_STATUS_INDICATOR && category == CATEGORY_STATUS_APPENDED {
                return Err(ParseError::new(
                    "Status indicator object under category 0x00",
                    index,
                ));
            }

            let entry = tlv.slot_mut(tag);
            if entry.object().is_some() || entry.data_error().is_some() {
                warn!(tag, "duplicate compact-TLV data object, keeping the later one");
            }
            entry.load(&bytes[start..start + len]);
            index = start + len;
        }

        if category == CATEGORY_STATUS_APPENDED {
            let status = StatusIndicator::decode_appended([bytes[end], bytes[end + 1], bytes[end + 2]]);
            tlv.slot_mut(TAG_STATUS_INDICATOR)
                .set(Some(DataObject::StatusIndicator(status)));
        }

        Ok(tlv)
    }

    /// Encode in ascending tag order
    ///
    /// The category is 0x00 only when a status indicator applies and is not
    /// carried in the TLV objects.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let appended = self
            .status_indicator()
            .filter(|status| !status.included_in_tlv)
            .copied();

        let mut writer = ByteWriter::new();
        writer.write_u8(match appended {
            Some(_) => CATEGORY_STATUS_APPENDED,
            None => CATEGORY_STATUS_IN_TLV,
        });

        for entry in &self.entries {
            if matches!(
                entry.object(),
                Some(DataObject::StatusIndicator(status)) if !status.included_in_tlv
            ) {
                continue;
            }
            let Some(value) = entry.value()? else {
                continue;
            };
            writer.write_u8((entry.tag() & 0x0F) << 4 | value.len() as u8);
            writer.write_bytes(&value);
        }

        if let Some(status) = appended {
            writer.write_bytes(&status.appended_bytes());
        }
        Ok(writer.into_bytes())
    }

    fn slot(&self, tag: u8) -> Option<&DataObjectEntry> {
        if !(0x40..=0x4F).contains(&tag) {
            return None;
        }
        self.entries.get((tag & 0x0F) as usize)
    }

    fn slot_mut(&mut self, tag: u8) -> &mut DataObjectEntry {
        &mut self.entries[(tag & 0x0F) as usize]
    }

    /// Registry slot for a tag, `None` outside 0x40..=0x4F
    pub fn entry(&self, tag: u8) -> Option<&DataObjectEntry> {
        self.slot(tag)
    }

    /// All 16 slots in tag order
    pub fn entries(&self) -> &[DataObjectEntry] {
        &self.entries
    }

    /// Objects that decoded successfully, in tag order
    pub fn objects(&self) -> impl Iterator<Item = &DataObject> {
        self.entries.iter().filter_map(DataObjectEntry::object)
    }

    pub fn object(&self, tag: u8) -> Option<&DataObject> {
        self.slot(tag).and_then(DataObjectEntry::object)
    }

    /// Store an object in its tag's slot, validating that it encodes
    pub fn set(&mut self, object: DataObject) -> Result<()> {
        object.encode()?;
        let tag = object.tag();
        self.slot_mut(tag).set(Some(object));
        Ok(())
    }

    /// Make a tag not applicable, also clearing any data error
    pub fn remove(&mut self, tag: u8) -> Result<()> {
        if !(0x40..=0x4F).contains(&tag) {
            return Err(AtrError::invalid_parameter(format!(
                "0x{:02X} is not a compact-TLV tag",
                tag
            )));
        }
        self.slot_mut(tag).set(None);
        Ok(())
    }

    pub fn country_code(&self) -> Option<&CountryCode> {
        match self.object(TAG_COUNTRY_CODE)? {
            DataObject::CountryCode(country) => Some(country),
            _ => None,
        }
    }

    pub fn issuer_id(&self) -> Option<&IssuerId> {
        match self.object(TAG_ISSUER_ID)? {
            DataObject::IssuerId(issuer) => Some(issuer),
            _ => None,
        }
    }

    pub fn card_service_data(&self) -> Option<&CardServiceData> {
        match self.object(TAG_CARD_SERVICE_DATA)? {
            DataObject::CardServiceData(service) => Some(service),
            _ => None,
        }
    }

    pub fn initial_access_data(&self) -> Option<&InitialAccessData> {
        match self.object(TAG_INITIAL_ACCESS_DATA)? {
            DataObject::InitialAccessData(access) => Some(access),
            _ => None,
        }
    }

    pub fn card_issuer_data(&self) -> Option<&[u8]> {
        match self.object(TAG_CARD_ISSUER_DATA)? {
            DataObject::CardIssuerData(data) => Some(data.as_slice()),
            _ => None,
        }
    }

    pub fn pre_issuing_data(&self) -> Option<&[u8]> {
        match self.object(TAG_PRE_ISSUING_DATA)? {
            DataObject::PreIssuingData(data) => Some(data.as_slice()),
            _ => None,
        }
    }

    pub fn card_capabilities(&self) -> Option<&CardCapabilities> {
        match self.object(TAG_CARD_CAPABILITIES)? {
            DataObject::CardCapabilities(capabilities) => Some(capabilities),
            _ => None,
        }
    }

    pub fn status_indicator(&self) -> Option<&StatusIndicator> {
        match self.object(TAG_STATUS_INDICATOR)? {
            DataObject::StatusIndicator(status) => Some(status),
            _ => None,
        }
    }

    pub fn application_identifier(&self) -> Option<&[u8]> {
        match self.object(TAG_APPLICATION_IDENTIFIER)? {
            DataObject::ApplicationIdentifier(aid) => Some(aid.as_slice()),
            _ => None,
        }
    }

    /// Whether the status indicator travels as a TLV object
    ///
    /// True when no status indicator applies, matching category 0x80.
    pub fn status_included_in_tlv(&self) -> bool {
        self.status_indicator()
            .map_or(true, |status| status.included_in_tlv)
    }

    /// Move the status indicator between the TLV objects and the trailing bytes
    pub fn set_status_included_in_tlv(&mut self, included: bool) -> Result<()> {
        let Some(status) = self.status_indicator().copied() else {
            if included {
                return Ok(());
            }
            return Err(AtrError::invalid_operation(
                "No status indicator to place after the TLV objects",
            ));
        };

        self.set(DataObject::StatusIndicator(StatusIndicator {
            included_in_tlv: included,
            ..status
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tlv::{FileIoServicesMethod, Interpreted};

    #[test]
    fn test_card_service_data_only() {
        let tlv = CompactTlv::decode(&[0x80, 0x31, 0x08]).unwrap();
        let service = tlv.card_service_data().unwrap();
        assert_eq!(service.file_io_method, FileIoServicesMethod::ReadBinary);
        assert!(tlv.status_indicator().is_none());
        assert!(tlv.status_included_in_tlv());
        assert_eq!(tlv.encode().unwrap(), vec![0x80, 0x31, 0x08]);
    }

    #[test]
    fn test_padding_skipped() {
        let tlv = CompactTlv::decode(&[0x80, 0x00, 0x31, 0x08, 0x00]).unwrap();
        assert!(tlv.card_service_data().is_some());
        assert_eq!(tlv.objects().count(), 1);
    }

    #[test]
    fn test_appended_status() {
        let bytes = [0x00, 0x31, 0x08, 0x07, 0x90, 0x00];
        let tlv = CompactTlv::decode(&bytes).unwrap();
        let status = tlv.status_indicator().unwrap();
        assert_eq!(status.life_cycle_status, Some(0x07));
        assert_eq!(status.status_word, Some(0x9000));
        assert!(!status.included_in_tlv);
        assert_eq!(tlv.encode().unwrap(), bytes.to_vec());
    }

    #[test]
    fn test_move_status_into_tlv() -> Result<()> {
        let mut tlv = CompactTlv::decode(&[0x00, 0x31, 0x08, 0x07, 0x90, 0x00]).unwrap();
        tlv.set_status_included_in_tlv(true)?;
        assert_eq!(
            tlv.encode()?,
            vec![0x80, 0x31, 0x08, 0x83, 0x07, 0x90, 0x00]
        );

        tlv.set_status_included_in_tlv(false)?;
        assert_eq!(tlv.encode()?, vec![0x00, 0x31, 0x08, 0x07, 0x90, 0x00]);
        Ok(())
    }

    #[test]
    fn test_partial_status_appended_with_defaults() -> Result<()> {
        let mut tlv = CompactTlv::new();
        tlv.set(DataObject::StatusIndicator(StatusIndicator {
            life_cycle_status: Some(0x0F),
            status_word: None,
            included_in_tlv: false,
        }))?;
        assert_eq!(tlv.encode()?, vec![0x00, 0x0F, 0x90, 0x00]);
        Ok(())
    }

    #[test]
    fn test_no_status_cannot_be_appended() {
        let mut tlv = CompactTlv::new();
        assert!(tlv.set_status_included_in_tlv(true).is_ok());
        assert!(matches!(
            tlv.set_status_included_in_tlv(false),
            Err(AtrError::InvalidOperation(_))
        ));
        assert_eq!(tlv.encode().unwrap(), vec![0x80]);
    }

    #[test]
    fn test_short_appended_status_fails() {
        let err = CompactTlv::decode(&[0x00, 0x90, 0x00]).unwrap_err();
        assert_eq!(err.byte_index, 3);
    }

    #[test]
    fn test_status_object_under_category_00_fails() {
        let err = CompactTlv::decode(&[0x00, 0x81, 0x07, 0x07, 0x90, 0x00]).unwrap_err();
        assert_eq!(err.byte_index, 1);
    }

    #[test]
    fn test_truncated_object_fails() {
        let err = CompactTlv::decode(&[0x80, 0x33, 0x08]).unwrap_err();
        assert_eq!(err.byte_index, 1);
    }

    #[test]
    fn test_bad_object_is_data_error() {
        let tlv = CompactTlv::decode(&[0x80, 0x32, 0x08, 0x09, 0x47, 0x1]).unwrap_err();
        assert_eq!(tlv.byte_index, 4);

        let tlv = CompactTlv::decode(&[0x80, 0x32, 0x08, 0x09, 0x71, 0x80]).unwrap();
        let entry = tlv.entry(TAG_CARD_SERVICE_DATA).unwrap();
        assert!(!entry.is_applicable());
        assert!(entry.data_error().is_some());
        assert!(tlv.card_capabilities().is_some());
        assert_eq!(
            tlv.encode().unwrap(),
            vec![0x80, 0x32, 0x08, 0x09, 0x71, 0x80]
        );

        let mut tlv = tlv;
        tlv.remove(TAG_CARD_SERVICE_DATA).unwrap();
        assert_eq!(tlv.encode().unwrap(), vec![0x80, 0x71, 0x80]);
    }

    #[test]
    fn test_edit_keeps_unrelated_objects_byte_exact() -> Result<()> {
        let service = DataObject::CardServiceData(CardServiceData {
            selection_by_full_df_name: false,
            selection_by_partial_df_name: false,
            data_objects_in_ef_dir: false,
            data_objects_in_ef_atr: false,
            file_io_method: FileIoServicesMethod::ReadBinary,
            card_without_mf: false,
        });

        for initial_access in [[0x61, 0x20], [0x00, 0x20], [0x9F, 0x20]] {
            let bytes = [0x80, 0x42, initial_access[0], initial_access[1]];
            let mut tlv = CompactTlv::decode(&bytes).unwrap();
            assert!(tlv.entry(TAG_INITIAL_ACCESS_DATA).unwrap().data_error().is_some());

            tlv.set(service.clone())?;
            assert_eq!(
                tlv.encode()?,
                vec![0x80, 0x31, 0x08, 0x42, initial_access[0], initial_access[1]]
            );
        }

        let mut tlv = CompactTlv::decode(&[0x80, 0x21, 0xFF]).unwrap();
        assert!(tlv.issuer_id().is_none());
        tlv.set(service)?;
        assert_eq!(tlv.encode()?, vec![0x80, 0x21, 0xFF, 0x31, 0x08]);
        Ok(())
    }

    #[test]
    fn test_duplicate_tag_later_wins() {
        let tlv = CompactTlv::decode(&[0x80, 0x31, 0x08, 0x31, 0x80]).unwrap();
        assert!(tlv.card_service_data().unwrap().selection_by_full_df_name);
    }

    #[test]
    fn test_ascending_tag_order() -> Result<()> {
        let mut tlv = CompactTlv::new();
        tlv.set(DataObject::CardCapabilities(CardCapabilities::new(0x80)))?;
        tlv.set(DataObject::CardServiceData(CardServiceData {
            selection_by_full_df_name: false,
            selection_by_partial_df_name: false,
            data_objects_in_ef_dir: false,
            data_objects_in_ef_atr: false,
            file_io_method: FileIoServicesMethod::ReadBinary,
            card_without_mf: false,
        }))?;
        assert_eq!(tlv.encode()?, vec![0x80, 0x31, 0x08, 0x71, 0x80]);

        tlv.remove(TAG_CARD_SERVICE_DATA)?;
        assert_eq!(tlv.encode()?, vec![0x80, 0x71, 0x80]);
        Ok(())
    }

    #[test]
    fn test_wrong_category() {
        assert!(CompactTlv::decode(&[0x10, 0x00]).is_err());
        assert!(CompactTlv::decode(&[]).is_err());
    }
}
