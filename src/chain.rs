//! Interface byte groups and the chain they form
//!
//! An ATR carries its interface bytes as a linked sequence of groups. Group 1
//! (TA1/TB1/TC1) is announced by T0; every following group is announced by the
//! TDi byte at the end of the group before it, which also names the group's
//! protocol type. The chain here keeps only the groups themselves: T0 and TDi
//! are derived from the neighbouring groups whenever the chain is serialized,
//! so the two can never disagree.

use bitfield::bitfield;
use tracing::trace;

use crate::core::{ByteSlot, ProtocolType};
use crate::encoding::{ByteReader, ByteWriter};
use crate::error::{AtrError, Result};

/// Maximum number of historical bytes T0 can announce
pub const MAX_HISTORICAL_BYTES: usize = 15;

bitfield! {
    /// Layout shared by T0 and TDi: presence bits for the next group and a
    /// low nibble holding either the historical byte count (T0) or the next
    /// group's protocol type (TDi)
    #[derive(Clone, Copy, PartialEq, Eq)]
    struct IndicatorByte(u8);
    impl Debug;
    u8, nibble, set_nibble: 3, 0;
    ta_present, set_ta_present: 4;
    tb_present, set_tb_present: 5;
    tc_present, set_tc_present: 6;
    td_present, set_td_present: 7;
}

/// One TAi/TBi/TCi triple together with its type tag
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InterfaceGroup {
    group_type: ProtocolType,
    ta: Option<u8>,
    tb: Option<u8>,
    tc: Option<u8>,
}

impl InterfaceGroup {
    /// Create an empty group of the given type
    pub fn new(group_type: ProtocolType) -> Self {
        InterfaceGroup {
            group_type,
            ta: None,
            tb: None,
            tc: None,
        }
    }

    pub fn group_type(&self) -> ProtocolType {
        self.group_type
    }

    pub fn ta(&self) -> Option<u8> {
        self.ta
    }

    pub fn tb(&self) -> Option<u8> {
        self.tb
    }

    pub fn tc(&self) -> Option<u8> {
        self.tc
    }

    /// Byte in the given slot
    pub fn byte(&self, slot: ByteSlot) -> Option<u8> {
        match slot {
            ByteSlot::Ta => self.ta,
            ByteSlot::Tb => self.tb,
            ByteSlot::Tc => self.tc,
        }
    }

    fn set_byte(&mut self, slot: ByteSlot, value: Option<u8>) {
        match slot {
            ByteSlot::Ta => self.ta = value,
            ByteSlot::Tb => self.tb = value,
            ByteSlot::Tc => self.tc = value,
        }
    }

    /// Whether none of TA, TB and TC is present
    pub fn is_empty(&self) -> bool {
        self.ta.is_none() && self.tb.is_none() && self.tc.is_none()
    }
}

/// What a TDi byte says about the group after it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NextGroupIndicator {
    pub ta_present: bool,
    pub tb_present: bool,
    pub tc_present: bool,
    pub group_type: ProtocolType,
}

/// Ordered interface byte groups of an ATR
///
/// `groups[0]` is always the global group. `groups[1]`, when present, is the
/// reserved second group: its type is the first offered protocol, its TA and
/// TB are global bytes and its TC belongs to T=0. Groups from index 2 onward
/// carry the bytes specific to their type.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InterfaceGroupChain {
    groups: Vec<InterfaceGroup>,
}

impl Default for InterfaceGroupChain {
    fn default() -> Self {
        Self::new()
    }
}

impl InterfaceGroupChain {
    /// A chain holding only an empty global group (implicit T=0)
    pub fn new() -> Self {
        InterfaceGroupChain {
            groups: vec![InterfaceGroup::new(ProtocolType::Global)],
        }
    }

    /// Parse T0 and the interface bytes that follow it
    ///
    /// Returns the chain and the number of historical bytes announced by T0.
    /// The reader is left at the first historical byte.
    pub fn parse(reader: &mut ByteReader<'_>) -> Result<(Self, usize)> {
        let t0 = IndicatorByte(reader.read_u8("T0")?);
        let historical_len = t0.nibble() as usize;

        let mut groups = Vec::new();
        let mut indicator = t0;
        let mut group_type = ProtocolType::Global;

        loop {
            let number = groups.len() + 1;
            let mut group = InterfaceGroup::new(group_type);
            if indicator.ta_present() {
                group.ta = Some(reader.read_u8(&format!("TA{}", number))?);
            }
            if indicator.tb_present() {
                group.tb = Some(reader.read_u8(&format!("TB{}", number))?);
            }
            if indicator.tc_present() {
                group.tc = Some(reader.read_u8(&format!("TC{}", number))?);
            }
            trace!(number, group_type = %group_type, "parsed interface group");

            let next = if indicator.td_present() {
                Some(IndicatorByte(reader.read_u8(&format!("TD{}", number))?))
            } else {
                None
            };
            groups.push(group);

            match next {
                Some(td) => {
                    group_type = ProtocolType::from_nibble(td.nibble());
                    indicator = td;
                }
                None => break,
            }
        }

        Ok((InterfaceGroupChain { groups }, historical_len))
    }

    /// Write T0 and all interface bytes, deriving every TDi from the chain
    pub fn serialize(&self, historical_len: usize, writer: &mut ByteWriter) -> Result<()> {
        if historical_len > MAX_HISTORICAL_BYTES {
            return Err(AtrError::invalid_structure(format!(
                "{} historical bytes exceed the maximum of {}",
                historical_len, MAX_HISTORICAL_BYTES
            )));
        }

        writer.write_u8(self.indicator_for(0, historical_len as u8).0);

        for (index, group) in self.groups.iter().enumerate() {
            writer.write_opt(group.ta);
            writer.write_opt(group.tb);
            writer.write_opt(group.tc);

            if let Some(next) = self.groups.get(index + 1) {
                let nibble = next.group_type.nibble().ok_or_else(|| {
                    AtrError::invalid_structure(format!(
                        "Group {} cannot be a global group",
                        index + 2
                    ))
                })?;
                writer.write_u8(self.indicator_for(index + 1, nibble).0);
            }
        }

        Ok(())
    }

    /// Indicator byte announcing `groups[index]`
    fn indicator_for(&self, index: usize, nibble: u8) -> IndicatorByte {
        let group = &self.groups[index];
        let mut indicator = IndicatorByte(0);
        indicator.set_nibble(nibble);
        indicator.set_ta_present(group.ta.is_some());
        indicator.set_tb_present(group.tb.is_some());
        indicator.set_tc_present(group.tc.is_some());
        indicator.set_td_present(index + 1 < self.groups.len());
        indicator
    }

    /// All groups in physical order
    pub fn groups(&self) -> &[InterfaceGroup] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Always false: the global group cannot be removed
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Group by its 1-based physical number
    pub fn group(&self, number: usize) -> Option<&InterfaceGroup> {
        number.checked_sub(1).and_then(|index| self.groups.get(index))
    }

    /// The TDi content at the end of group `number`, if any
    pub fn next_indicator(&self, number: usize) -> Option<NextGroupIndicator> {
        let next = self.groups.get(number)?;
        number.checked_sub(1)?;
        Some(NextGroupIndicator {
            ta_present: next.ta.is_some(),
            tb_present: next.tb.is_some(),
            tc_present: next.tc.is_some(),
            group_type: next.group_type,
        })
    }

    /// Type of the reserved second group, `None` while T=0 is implicit
    pub fn second_group_type(&self) -> Option<ProtocolType> {
        self.groups.get(1).map(|group| group.group_type)
    }

    /// Protocols the chain offers, in ascending order
    ///
    /// A chain that names no protocol offers T=0 implicitly.
    pub fn indicated_protocols(&self) -> Vec<ProtocolType> {
        let mut protocols: Vec<ProtocolType> = Vec::new();
        for group in self.groups.iter().skip(1) {
            if group.group_type.is_protocol() && !protocols.contains(&group.group_type) {
                protocols.push(group.group_type);
            }
        }

        if protocols.is_empty() {
            protocols.push(ProtocolType::T0);
        }
        protocols.sort();
        protocols
    }

    /// Whether the protocol is offered, explicitly or as the implicit T=0
    pub fn indicates(&self, protocol: ProtocolType) -> bool {
        self.indicated_protocols().contains(&protocol)
    }

    /// Whether T=0 is offered only because no protocol is named
    pub fn is_implicit_t0(&self) -> bool {
        !self
            .groups
            .iter()
            .skip(1)
            .any(|group| group.group_type.is_protocol())
    }

    /// TCK must be sent unless T=0 is the only type ever named
    pub fn checksum_required(&self) -> bool {
        self.groups
            .iter()
            .skip(1)
            .any(|group| group.group_type != ProtocolType::T0)
    }

    /// Indexes of the groups holding bytes specific to `group_type`
    fn specific_positions(&self, group_type: ProtocolType) -> impl Iterator<Item = usize> + '_ {
        self.groups
            .iter()
            .enumerate()
            .skip(2)
            .filter(move |(_, group)| group.group_type == group_type)
            .map(|(index, _)| index)
    }

    /// Number of groups carrying bytes specific to `group_type`
    pub fn specific_group_count(&self, group_type: ProtocolType) -> usize {
        self.specific_positions(group_type).count()
    }

    fn position_of(&self, group_type: ProtocolType, index: usize) -> Option<usize> {
        match group_type {
            ProtocolType::Global => (index < 2 && index < self.groups.len()).then_some(index),
            other => self.specific_positions(other).nth(index),
        }
    }

    /// Read a parameter byte
    ///
    /// For [`ProtocolType::Global`], index 0 is group 1 and index 1 is the
    /// reserved second group. For any other type, `index` counts the groups of
    /// that type from group 3 onward.
    pub fn byte(&self, group_type: ProtocolType, index: usize, slot: ByteSlot) -> Option<u8> {
        self.position_of(group_type, index)
            .and_then(|position| self.groups[position].byte(slot))
    }

    /// Write or clear a parameter byte, creating the groups needed to hold it
    ///
    /// Missing groups are materialized first: the second group as an explicit
    /// T=0 group if it does not exist, then groups of the requested type until
    /// `index` is reachable. Trailing groups left empty afterwards are pruned.
    pub fn set_byte(
        &mut self,
        group_type: ProtocolType,
        index: usize,
        slot: ByteSlot,
        value: Option<u8>,
    ) -> Result<()> {
        if group_type == ProtocolType::Global && index > 1 {
            return Err(AtrError::invalid_parameter(format!(
                "Global interface bytes live in groups 1 and 2, not group {}",
                index + 1
            )));
        }

        let position = match self.position_of(group_type, index) {
            Some(position) => position,
            None if value.is_none() => return Ok(()),
            None => self.materialize(group_type, index),
        };

        self.groups[position].set_byte(slot, value);
        self.prune();
        Ok(())
    }

    fn materialize(&mut self, group_type: ProtocolType, index: usize) -> usize {
        self.ensure_second_group();
        if group_type == ProtocolType::Global {
            return index;
        }

        loop {
            let existing: Vec<usize> = self.specific_positions(group_type).collect();
            if let Some(&position) = existing.get(index) {
                return position;
            }

            let at = match existing.last() {
                Some(last) => last + 1,
                None => self.insertion_point(group_type),
            };
            trace!(group_type = %group_type, number = at + 1, "inserting interface group");
            self.groups.insert(at, InterfaceGroup::new(group_type));
        }
    }

    /// Turn an implicit T=0 into an explicit second group
    fn ensure_second_group(&mut self) {
        if self.groups.len() == 1 {
            self.groups.push(InterfaceGroup::new(ProtocolType::T0));
        }
    }

    /// Position right after the last group of a strictly lower type, never
    /// before the specific groups start
    fn insertion_point(&self, group_type: ProtocolType) -> usize {
        let after_lower = self
            .groups
            .iter()
            .rposition(|group| group.group_type < group_type)
            .map_or(self.groups.len(), |position| position + 1);
        after_lower.max(2).min(self.groups.len())
    }

    /// Drop trailing groups that hold no bytes
    ///
    /// Scanning backward, an empty group is removed when another group still
    /// names its type, or when it is a T=15 group. The scan stops at the first
    /// group that has to stay, so earlier bytes never move. The global group
    /// and the last group naming a protocol are kept.
    pub fn prune(&mut self) {
        while self.groups.len() > 1 {
            let last = self.groups.len() - 1;
            let group = &self.groups[last];
            if !group.is_empty() {
                break;
            }

            let removable = match group.group_type {
                ProtocolType::GlobalExtended => true,
                group_type => self.groups[1..last]
                    .iter()
                    .any(|other| other.group_type == group_type),
            };
            if !removable {
                break;
            }

            trace!(group_type = %group.group_type, number = last + 1, "pruning empty interface group");
            self.groups.pop();
        }
    }

    /// Offer an additional protocol
    ///
    /// If T=0 was only implicit it becomes an explicit second group first, so
    /// it is not silently dropped. A protocol lower than the one in the second
    /// group takes that group over; the displaced protocol keeps its
    /// indication through a group of its own.
    pub fn add_indication(&mut self, protocol: ProtocolType) -> Result<()> {
        if !protocol.is_protocol() {
            return Err(AtrError::invalid_parameter(format!(
                "{} is not a transmission protocol",
                protocol
            )));
        }
        if self.indicates(protocol) {
            return Ok(());
        }

        self.ensure_second_group();
        let second = self.groups[1].group_type;

        if protocol < second {
            self.groups[1].group_type = protocol;
            let still_named = self.groups[2..]
                .iter()
                .any(|group| group.group_type == second);
            if second.is_protocol() && !still_named {
                let at = self.insertion_point(second);
                self.groups.insert(at, InterfaceGroup::new(second));
            }
        } else {
            let at = self.insertion_point(protocol);
            self.groups.insert(at, InterfaceGroup::new(protocol));
        }

        trace!(protocol = %protocol, "protocol indication added");
        Ok(())
    }

    /// Stop offering a protocol, dropping every group specific to it
    ///
    /// The second group is never deleted: if it names the removed protocol it
    /// is retargeted to the next protocol named further down the chain, and
    /// its TC2 is cleared when the removed protocol was T=0.
    pub fn remove_indication(&mut self, protocol: ProtocolType) -> Result<()> {
        if !protocol.is_protocol() {
            return Err(AtrError::invalid_parameter(format!(
                "{} is not a transmission protocol",
                protocol
            )));
        }

        let indicated = self.indicated_protocols();
        if !indicated.contains(&protocol) {
            return Err(AtrError::invalid_operation(format!(
                "{} is not indicated",
                protocol
            )));
        }
        if indicated.len() == 1 {
            return Err(AtrError::invalid_operation(format!(
                "Cannot remove {}: at least one protocol must stay indicated",
                protocol
            )));
        }

        let mut index = 0;
        self.groups.retain(|group| {
            let keep = index < 2 || group.group_type != protocol;
            index += 1;
            keep
        });

        if self.groups[1].group_type == protocol {
            let next = self.groups[2..]
                .iter()
                .map(|group| group.group_type)
                .find(|group_type| group_type.is_protocol())
                .ok_or_else(|| {
                    AtrError::invalid_operation(format!(
                        "No protocol left to take over group 2 from {}",
                        protocol
                    ))
                })?;

            if protocol == ProtocolType::T0 {
                self.groups[1].tc = None;
            }
            self.groups[1].group_type = next;
        }

        self.prune();
        trace!(protocol = %protocol, "protocol indication removed");
        Ok(())
    }
}
