//! Integration tests for the ATR codec
//!
//! These tests exercise whole ATRs captured from real cards and the edit
//! cycle end to end:
//! - Decoding of interface bytes and compact-TLV historical characters
//! - Byte-exact re-encoding
//! - Protocol indication edits and chain consistency
//! - Fallback to invalid historical characters

use iso7816_atr::historical::HistoricalKind;
use iso7816_atr::protocol::{ClockRateConversion, RedundancyCode};
use iso7816_atr::tlv::{FileIoServicesMethod, TAG_APPLICATION_IDENTIFIER};
use iso7816_atr::{
    Atr, AtrError, ByteSlot, ChecksumStatus, DataObject, HistoricalCharacters, Interpreted,
    Parser, ProtocolType, Result,
};

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;

    /// YubiKey 5 NFC over the contact interface
    pub const YUBIKEY: &str = "3B FD 13 00 00 81 31 FE 15 80 73 C0 21 C0 57 59 75 62 69 4B 65 79 40";

    /// PC/SC part 3 ATR built by a reader for a MIFARE Classic 1K
    pub const PCSC_CONTACTLESS: &str = "3B 8F 80 01 80 4F 0C A0 00 00 03 06 03 00 01 00 00 00 00 6A";

    /// T=0 card with proprietary historical characters
    pub const PROPRIETARY_T0: &str = "3B 65 00 00 9C 11 01 01 03";

    pub fn atr(text: &str) -> Atr {
        text.parse().expect("valid ATR")
    }

    pub fn bytes(text: &str) -> Vec<u8> {
        hex::decode(text.replace(' ', "")).expect("valid hex")
    }

    /// The encoded bytes parse back into the same groups, group 1 is global
    /// and only the global group may be empty at the end of the chain
    pub fn assert_chain_consistent(atr: &Atr) {
        let chain = atr.chain();
        let reparsed = Parser::new().parse(&atr.to_bytes()).expect("encoded ATR parses");
        assert_eq!(reparsed.chain().groups(), chain.groups());
        assert_eq!(reparsed.historical_bytes(), atr.historical_bytes());

        assert_eq!(chain.groups()[0].group_type(), ProtocolType::Global);
        assert!(chain.groups()[1..]
            .iter()
            .all(|group| group.group_type() != ProtocolType::Global));
        if atr.chain().checksum_required() {
            assert_eq!(atr.checksum_status(), ChecksumStatus::Valid);
        }
    }
}

use helpers::*;

// ============================================================================
// Real Cards
// ============================================================================

mod real_cards {
    use super::*;

    #[test]
    fn yubikey_interface_bytes() {
        let atr = atr(YUBIKEY);
        assert_eq!(atr.to_bytes(), bytes(YUBIKEY));
        assert_eq!(atr.checksum_status(), ChecksumStatus::Valid);
        assert_eq!(atr.indicated_protocols(), vec![ProtocolType::T1]);

        let global = atr.global_parameters();
        assert_eq!(global.fi().and_then(|fi| fi.fi()), Some(372));
        assert_eq!(global.di().and_then(|di| di.di()), Some(4));
        assert_eq!(global.is_vpp_connected(), Some(false));
        assert_eq!(global.extra_guard_time(), Some(0));

        let t1 = atr.t1_parameters();
        assert_eq!(t1.ifsc(), Some(0xFE));
        assert_eq!(t1.bwi(), Some(1));
        assert_eq!(t1.cwi(), Some(5));
        assert_eq!(t1.redundancy_code_value(), RedundancyCode::Lrc);
    }

    #[test]
    fn yubikey_historical_characters() {
        let atr = atr(YUBIKEY);
        let tlv = atr.compact_tlv().expect("compact-TLV");

        let capabilities = tlv.card_capabilities().expect("card capabilities");
        assert!(capabilities.command_chaining());
        assert!(capabilities.extended_lengths());
        assert_eq!(capabilities.logical_channels(), None);

        assert_eq!(tlv.card_issuer_data(), Some(&b"YubiKey"[..]));
        assert!(tlv.status_indicator().is_none());
        assert!(tlv.status_included_in_tlv());
    }

    #[test]
    fn pcsc_contactless_falls_back_to_invalid() {
        let atr = atr(PCSC_CONTACTLESS);
        assert_eq!(atr.to_bytes(), bytes(PCSC_CONTACTLESS));
        assert_eq!(
            atr.indicated_protocols(),
            vec![ProtocolType::T0, ProtocolType::T1]
        );

        let historical = atr.historical_characters();
        assert_eq!(historical.kind(), HistoricalKind::Invalid);
        assert!(!historical.is_applicable());
        match historical {
            HistoricalCharacters::Invalid {
                attempted, error, ..
            } => {
                assert_eq!(*attempted, HistoricalKind::CompactTlv);
                assert_eq!(error.byte_index, 1);
            }
            other => panic!("unexpected historical characters {:?}", other),
        }
        assert_eq!(historical.raw_data(), Some(atr.historical_bytes().to_vec()));
    }

    #[test]
    fn proprietary_t0_card() {
        let atr = atr(PROPRIETARY_T0);
        assert_eq!(atr.checksum_status(), ChecksumStatus::Absent);
        assert!(atr.chain().is_implicit_t0());
        assert_eq!(atr.global_parameters().extra_guard_time(), Some(0));
        assert_eq!(
            atr.historical_characters(),
            &HistoricalCharacters::Proprietary {
                category: 0x9C,
                data: vec![0x11, 0x01, 0x01, 0x03],
            }
        );
    }
}

// ============================================================================
// Edits
// ============================================================================

mod edits {
    use super::*;

    #[test]
    fn edit_keeps_unrelated_bytes() -> Result<()> {
        let mut atr = atr(YUBIKEY);
        atr.global_parameters_mut()
            .set_fi(ClockRateConversion::new(0x09)?)?;

        let mut expected = bytes(YUBIKEY);
        expected[2] = 0x93;
        let last = expected.len() - 1;
        expected[last] ^= 0x13 ^ 0x93;
        assert_eq!(atr.to_bytes(), expected);
        assert_eq!(atr.checksum_status(), ChecksumStatus::Valid);
        assert_chain_consistent(&atr);
        Ok(())
    }

    #[test]
    fn add_and_remove_t0_on_t1_card() -> Result<()> {
        let mut atr = atr(YUBIKEY);
        atr.indicate_protocol(ProtocolType::T0)?;
        assert_eq!(atr.chain().second_group_type(), Some(ProtocolType::T0));
        assert_eq!(
            atr.indicated_protocols(),
            vec![ProtocolType::T0, ProtocolType::T1]
        );
        assert_eq!(atr.t1_parameters().ifsc(), Some(0xFE));
        assert_chain_consistent(&atr);

        atr.remove_protocol_indication(ProtocolType::T0)?;
        assert_eq!(atr.to_bytes(), bytes(YUBIKEY));
        Ok(())
    }

    #[test]
    fn t0_wi_lives_in_second_group() -> Result<()> {
        let mut atr = Atr::new();
        atr.t0_parameters_mut()
            .ok_or_else(|| AtrError::invalid_operation("T=0 missing"))?
            .set_wi(Some(0x80))?;
        assert_eq!(atr.to_string(), "3B804080");

        atr.t0_parameters_mut()
            .ok_or_else(|| AtrError::invalid_operation("T=0 missing"))?
            .set_wi(None)?;
        assert_eq!(atr.to_string(), "3B8000");
        Ok(())
    }

    #[test]
    fn unknown_protocol_bytes() -> Result<()> {
        let mut atr = Atr::new();
        atr.indicate_protocol(ProtocolType::T14)?;
        atr.unknown_protocol_parameters_mut(ProtocolType::T14)
            .ok_or_else(|| AtrError::invalid_operation("T=14 missing"))?
            .set_byte(1, ByteSlot::Ta, Some(0x55))?;

        let params = atr
            .unknown_protocol_parameters(ProtocolType::T14)
            .ok_or_else(|| AtrError::invalid_operation("T=14 missing"))?;
        assert_eq!(params.group_count(), 2);
        assert_eq!(params.byte(0, ByteSlot::Ta), None);
        assert_eq!(params.byte(1, ByteSlot::Ta), Some(0x55));
        assert_chain_consistent(&atr);
        Ok(())
    }

    #[test]
    fn compact_tlv_aid_and_service_data() -> Result<()> {
        let mut atr: Atr = "3B 03 80 31 08".parse()?;
        let service = atr
            .compact_tlv()
            .and_then(|tlv| tlv.card_service_data())
            .copied()
            .ok_or_else(|| AtrError::invalid_operation("card service data missing"))?;
        assert_eq!(service.file_io_method, FileIoServicesMethod::ReadBinary);

        let aid = vec![0xA0, 0x00, 0x00, 0x03, 0x08];
        atr.update_compact_tlv(|tlv| {
            tlv.set(DataObject::ApplicationIdentifier(aid.clone()))
        })?;
        assert_eq!(
            atr.historical_bytes(),
            &[0x80, 0x31, 0x08, 0xF5, 0xA0, 0x00, 0x00, 0x03, 0x08]
        );
        assert_eq!(
            atr.compact_tlv()
                .and_then(|tlv| tlv.object(TAG_APPLICATION_IDENTIFIER))
                .map(|object| object.tag()),
            Some(TAG_APPLICATION_IDENTIFIER)
        );
        Ok(())
    }

    #[test]
    fn compact_tlv_edit_keeps_undecodable_objects() -> Result<()> {
        for (text, kept) in [
            ("3B 04 80 42 61 20", vec![0x42, 0x61, 0x20]),
            ("3B 04 80 42 00 20", vec![0x42, 0x00, 0x20]),
            ("3B 03 80 21 FF", vec![0x21, 0xFF]),
        ] {
            let mut atr: Atr = text.parse()?;
            atr.update_compact_tlv(|tlv| tlv.set(DataObject::CardIssuerData(vec![0x01])))?;

            let mut expected = vec![0x80];
            expected.extend_from_slice(&kept);
            expected.extend_from_slice(&[0x51, 0x01]);
            assert_eq!(atr.historical_bytes(), &expected[..], "{}", text);
        }
        Ok(())
    }

    #[test]
    fn withdrawing_t1_drops_tck() -> Result<()> {
        let mut atr = atr(YUBIKEY);
        let historical = atr.historical_bytes().to_vec();
        atr.indicate_protocol(ProtocolType::T0)?;
        atr.remove_protocol_indication(ProtocolType::T1)?;

        assert_eq!(atr.indicated_protocols(), vec![ProtocolType::T0]);
        assert!(!atr.chain().checksum_required());
        assert_eq!(atr.checksum_status(), ChecksumStatus::Absent);
        assert!(atr.to_bytes().ends_with(&historical));
        assert_chain_consistent(&atr);
        Ok(())
    }

    #[test]
    fn historical_bytes_over_limit_rejected() -> Result<()> {
        let mut atr = atr(YUBIKEY);
        let err = atr
            .update_compact_tlv(|tlv| {
                tlv.set(DataObject::PreIssuingData(vec![0xAA; 8]))
            })
            .unwrap_err();
        assert!(err.is_structural());
        assert_eq!(atr.to_bytes(), bytes(YUBIKEY));
        Ok(())
    }
}

// ============================================================================
// Serde
// ============================================================================

#[cfg(feature = "serde")]
mod serde_tests {
    use super::*;

    #[test]
    fn atr_serializes_as_hex() -> std::result::Result<(), serde_json::Error> {
        let atr = atr(YUBIKEY);
        let json = serde_json::to_string(&atr)?;
        assert_eq!(json, format!("\"{}\"", YUBIKEY.replace(' ', "")));

        let back: Atr = serde_json::from_str(&json)?;
        assert_eq!(back, atr);
        Ok(())
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    /// Presence bits, type nibble and values of one interface group
    type GroupSpec = (u8, u8, [u8; 3]);

    /// Assemble an ATR from group descriptions, with or without TCK
    fn build(
        first: (u8, [u8; 3]),
        rest: &[GroupSpec],
        historical: &[u8],
        with_tck: bool,
    ) -> Vec<u8> {
        let td = |more: bool| if more { 0x80 } else { 0x00 };
        let push_group = |out: &mut Vec<u8>, presence: u8, values: &[u8; 3]| {
            for (bit, value) in values.iter().enumerate() {
                if presence & (1 << bit) != 0 {
                    out.push(*value);
                }
            }
        };

        let mut out = vec![0x3B];
        out.push(td(!rest.is_empty()) | first.0 << 4 | historical.len() as u8);
        push_group(&mut out, first.0, &first.1);
        for (index, (presence, nibble, values)) in rest.iter().enumerate() {
            out.push(td(index + 1 < rest.len()) | presence << 4 | nibble);
            push_group(&mut out, *presence, values);
        }
        out.extend_from_slice(historical);

        if with_tck {
            let tck = out[1..].iter().fold(0u8, |acc, b| acc ^ b);
            out.push(tck);
        }
        out
    }

    fn atr_parts() -> impl Strategy<Value = ((u8, [u8; 3]), Vec<GroupSpec>, Vec<u8>, bool)> {
        (
            (0u8..8, any::<[u8; 3]>()),
            prop::collection::vec((0u8..8, 0u8..16, any::<[u8; 3]>()), 0..5),
            prop::collection::vec(any::<u8>(), 0..=15),
            any::<bool>(),
        )
    }

    #[derive(Debug, Clone)]
    enum Edit {
        Indicate(u8),
        Remove(u8),
        Ifsc(Option<u8>),
        Wi(Option<u8>),
        GuardTime(Option<u8>),
        Raw(u8, usize, Option<u8>),
    }

    fn edit() -> impl Strategy<Value = Edit> {
        prop_oneof![
            (0u8..15).prop_map(Edit::Indicate),
            (0u8..15).prop_map(Edit::Remove),
            proptest::option::of(1u8..=254).prop_map(Edit::Ifsc),
            proptest::option::of(1u8..=255).prop_map(Edit::Wi),
            proptest::option::of(any::<u8>()).prop_map(Edit::GuardTime),
            (2u8..15, 0usize..3, proptest::option::of(any::<u8>()))
                .prop_map(|(protocol, index, value)| Edit::Raw(protocol, index, value)),
        ]
    }

    fn apply(atr: &mut Atr, edit: &Edit) -> Result<()> {
        match edit {
            Edit::Indicate(n) => atr.indicate_protocol(ProtocolType::from_nibble(*n)),
            Edit::Remove(n) => atr.remove_protocol_indication(ProtocolType::from_nibble(*n)),
            Edit::Ifsc(value) => match atr.t1_parameters_mut() {
                Some(mut t1) => t1.set_ifsc(*value),
                None => Ok(()),
            },
            Edit::Wi(value) => match atr.t0_parameters_mut() {
                Some(mut t0) => t0.set_wi(*value),
                None => Ok(()),
            },
            Edit::GuardTime(value) => atr.global_parameters_mut().set_extra_guard_time(*value),
            Edit::Raw(n, index, value) => {
                let protocol = ProtocolType::from_nibble(*n);
                match atr.unknown_protocol_parameters_mut(protocol) {
                    Some(mut params) => params.set_byte(*index, ByteSlot::Tc, *value),
                    None => Ok(()),
                }
            }
        }
    }

    proptest! {
        #[test]
        fn well_formed_atr_parses_and_reencodes(
            (first, rest, historical, with_tck) in atr_parts()
        ) {
            let input = build(first, &rest, &historical, with_tck);
            let mut atr = Atr::from_bytes(&input).expect("well-formed ATR");
            prop_assert_eq!(atr.to_bytes(), input.clone());
            prop_assert_eq!(atr.historical_bytes(), &historical[..]);

            let needs_tck = !with_tck && atr.chain().checksum_required();
            let historical = atr.historical_bytes().to_vec();
            atr.set_historical_bytes(&historical).expect("no-op edit");

            let mut expected = input;
            if needs_tck {
                let tck = expected[1..].iter().fold(0u8, |acc, b| acc ^ b);
                expected.push(tck);
            }
            prop_assert_eq!(atr.to_bytes(), expected);
        }

        #[test]
        fn arbitrary_bytes_never_panic(input in prop::collection::vec(any::<u8>(), 0..40)) {
            if let Ok(atr) = Atr::from_bytes(&input) {
                prop_assert_eq!(atr.to_bytes(), input);
            }
        }

        #[test]
        fn edits_keep_chain_consistent(edits in prop::collection::vec(edit(), 0..12)) {
            let mut atr = Atr::new();
            for edit in &edits {
                let before = atr.to_bytes();
                if apply(&mut atr, edit).is_err() {
                    prop_assert_eq!(atr.to_bytes(), before);
                }

                assert_chain_consistent(&atr);
                prop_assert!(!atr.indicated_protocols().is_empty());
                prop_assert!(!matches!(atr.checksum_status(), ChecksumStatus::Invalid { .. }), "checksum status must not be Invalid");
                if atr.chain().checksum_required() {
                    prop_assert_eq!(atr.checksum_status(), ChecksumStatus::Valid);
                } else {
                    prop_assert_eq!(atr.checksum_status(), ChecksumStatus::Absent);
                }

                let reparsed = Atr::from_bytes(&atr.to_bytes()).expect("edited ATR parses");
                prop_assert_eq!(reparsed, atr.clone());
            }
        }

        #[test]
        fn t1_set_then_clear_restores(ifsc in 1u8..=254) {
            let mut atr = Atr::new();
            atr.indicate_protocol(ProtocolType::T1).expect("indicate T=1");
            let before = atr.to_bytes();

            atr.t1_parameters_mut().expect("T=1").set_ifsc(Some(ifsc)).expect("set IFSC");
            prop_assert_eq!(atr.t1_parameters().ifsc(), Some(ifsc));
            atr.t1_parameters_mut().expect("T=1").set_ifsc(None).expect("clear IFSC");
            prop_assert_eq!(atr.to_bytes(), before);
        }
    }
}
