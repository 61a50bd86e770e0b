//! Parameter views projected over the interface byte chain
//!
//! Views are computed on demand and never stored: the read views borrow the
//! chain, the `*Mut` views borrow the whole [`Atr`] so that every write goes
//! through its re-encode and re-parse cycle.

use crate::atr::Atr;
use crate::chain::InterfaceGroupChain;
use crate::core::{ByteSlot, ParameterByte, ProtocolType};
use crate::defaults;
use crate::error::{AtrError, Result};

/// Clock rate conversion factor Fi and maximum clock fmax (TA1 high nibble)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClockRateConversion(u8);

impl ClockRateConversion {
    const TABLE: [Option<(u16, u32)>; 16] = [
        Some((372, 4_000)),
        Some((372, 5_000)),
        Some((558, 6_000)),
        Some((744, 8_000)),
        Some((1116, 12_000)),
        Some((1488, 16_000)),
        Some((1860, 20_000)),
        None,
        None,
        Some((512, 5_000)),
        Some((768, 7_500)),
        Some((1024, 10_000)),
        Some((1536, 15_000)),
        Some((2048, 20_000)),
        None,
        None,
    ];

    /// Create from a 4-bit code, rejecting reserved codes
    pub fn new(code: u8) -> Result<Self> {
        let conversion = Self::from_code(code);
        if code > 0x0F || conversion.is_rfu() {
            return Err(AtrError::invalid_parameter(format!(
                "Fi code 0x{:X} is reserved for future use",
                code
            )));
        }
        Ok(conversion)
    }

    /// Create from a raw nibble without validation
    pub fn from_code(code: u8) -> Self {
        ClockRateConversion(code & 0x0F)
    }

    pub fn code(&self) -> u8 {
        self.0
    }

    /// Fi, `None` for reserved codes
    pub fn fi(&self) -> Option<u16> {
        Self::TABLE[self.0 as usize].map(|(fi, _)| fi)
    }

    /// fmax in kHz, `None` for reserved codes
    pub fn fmax_khz(&self) -> Option<u32> {
        Self::TABLE[self.0 as usize].map(|(_, fmax)| fmax)
    }

    pub fn is_rfu(&self) -> bool {
        Self::TABLE[self.0 as usize].is_none()
    }
}

/// Baud rate adjustment factor Di (TA1 low nibble)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BaudRateAdjustment(u8);

impl BaudRateAdjustment {
    const TABLE: [Option<u8>; 16] = [
        None,
        Some(1),
        Some(2),
        Some(4),
        Some(8),
        Some(16),
        Some(32),
        Some(64),
        Some(12),
        Some(20),
        None,
        None,
        None,
        None,
        None,
        None,
    ];

    /// Create from a 4-bit code, rejecting reserved codes
    pub fn new(code: u8) -> Result<Self> {
        let adjustment = Self::from_code(code);
        if code > 0x0F || adjustment.is_rfu() {
            return Err(AtrError::invalid_parameter(format!(
                "Di code 0x{:X} is reserved for future use",
                code
            )));
        }
        Ok(adjustment)
    }

    /// Create from a raw nibble without validation
    pub fn from_code(code: u8) -> Self {
        BaudRateAdjustment(code & 0x0F)
    }

    pub fn code(&self) -> u8 {
        self.0
    }

    /// Di, `None` for reserved codes
    pub fn di(&self) -> Option<u8> {
        Self::TABLE[self.0 as usize]
    }

    pub fn is_rfu(&self) -> bool {
        Self::TABLE[self.0 as usize].is_none()
    }
}

/// Maximum programming current (TB1 bits 7-6)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VppCurrent {
    Milliamps25,
    Milliamps50,
    Milliamps100,
    Rfu,
}

impl VppCurrent {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => VppCurrent::Milliamps25,
            1 => VppCurrent::Milliamps50,
            2 => VppCurrent::Milliamps100,
            _ => VppCurrent::Rfu,
        }
    }

    fn bits(&self) -> u8 {
        match self {
            VppCurrent::Milliamps25 => 0,
            VppCurrent::Milliamps50 => 1,
            VppCurrent::Milliamps100 => 2,
            VppCurrent::Rfu => 3,
        }
    }

    /// Current in mA, `None` for the reserved code
    pub fn milliamps(&self) -> Option<u16> {
        match self {
            VppCurrent::Milliamps25 => Some(25),
            VppCurrent::Milliamps50 => Some(50),
            VppCurrent::Milliamps100 => Some(100),
            VppCurrent::Rfu => None,
        }
    }
}

/// Programming voltage and current
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Vpp {
    /// Voltage in tenths of a volt, 50 to 250
    pub decivolts: u16,
    pub current: VppCurrent,
}

/// Specific mode byte TA2
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpecificMode {
    /// Bit 8 cleared: the card can switch between negotiable and specific mode
    pub can_change_mode: bool,
    /// Bit 5 set: transmission parameters are implicitly known, TA1 is not used
    pub implicit_parameters: bool,
    /// Protocol the card works with in specific mode
    pub protocol: ProtocolType,
}

impl SpecificMode {
    fn decode(byte: u8) -> Self {
        SpecificMode {
            can_change_mode: byte & 0x80 == 0,
            implicit_parameters: byte & 0x10 != 0,
            protocol: ProtocolType::from_nibble(byte),
        }
    }

    fn encode(&self) -> Result<u8> {
        let nibble = self.protocol.nibble().ok_or_else(|| {
            AtrError::invalid_parameter("Specific mode needs a protocol, not the global group")
        })?;
        let mut byte = nibble;
        if !self.can_change_mode {
            byte |= 0x80;
        }
        if self.implicit_parameters {
            byte |= 0x10;
        }
        Ok(byte)
    }
}

/// Clock stop indicator (first TA after T=15, bits 8-7)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ClockStop {
    NotSupported,
    StateLow,
    StateHigh,
    NoPreference,
}

impl ClockStop {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => ClockStop::NotSupported,
            1 => ClockStop::StateLow,
            2 => ClockStop::StateHigh,
            _ => ClockStop::NoPreference,
        }
    }

    fn bits(&self) -> u8 {
        match self {
            ClockStop::NotSupported => 0,
            ClockStop::StateLow => 1,
            ClockStop::StateHigh => 2,
            ClockStop::NoPreference => 3,
        }
    }
}

/// Operating conditions (first TA after T=15, bits 6-1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClassIndicator(u8);

impl ClassIndicator {
    /// Class A (5 V)
    pub const A: u8 = 0x01;
    /// Class B (3 V)
    pub const B: u8 = 0x02;
    /// Class C (1.8 V)
    pub const C: u8 = 0x04;

    /// Create from the 6 class bits, at least one class must be set
    pub fn new(bits: u8) -> Result<Self> {
        if bits == 0 || bits > 0x3F {
            return Err(AtrError::invalid_parameter(format!(
                "Class indicator 0x{:02X} must set at least one of the 6 class bits",
                bits
            )));
        }
        Ok(ClassIndicator(bits))
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn supports_a(&self) -> bool {
        self.0 & Self::A != 0
    }

    pub fn supports_b(&self) -> bool {
        self.0 & Self::B != 0
    }

    pub fn supports_c(&self) -> bool {
        self.0 & Self::C != 0
    }
}

/// Standard or proprietary use of the first TB after T=15
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Spu {
    NotUsed,
    /// 7-bit value defined by ISO/IEC JTC 1/SC 17
    Standard(u8),
    /// 7-bit proprietary value
    Proprietary(u8),
}

impl Spu {
    fn decode(byte: u8) -> Self {
        match byte {
            0x00 => Spu::NotUsed,
            b if b & 0x80 != 0 => Spu::Proprietary(b & 0x7F),
            b => Spu::Standard(b),
        }
    }

    fn encode(&self) -> Result<u8> {
        match *self {
            Spu::NotUsed => Ok(0x00),
            Spu::Standard(value) if (1..=0x7F).contains(&value) => Ok(value),
            Spu::Proprietary(value) if value <= 0x7F => Ok(0x80 | value),
            other => Err(AtrError::invalid_parameter(format!(
                "SPU value {:?} does not fit in 7 bits",
                other
            ))),
        }
    }
}

/// Error detection code used by T=1 (TC bit 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RedundancyCode {
    Lrc,
    Crc,
}

/// Global interface parameters
#[derive(Debug, Clone, Copy)]
pub struct GlobalParameters<'a> {
    chain: &'a InterfaceGroupChain,
}

impl<'a> GlobalParameters<'a> {
    pub fn new(chain: &'a InterfaceGroupChain) -> Self {
        GlobalParameters { chain }
    }

    fn first(&self, slot: ByteSlot) -> Option<u8> {
        self.chain.byte(ProtocolType::Global, 0, slot)
    }

    fn second(&self, slot: ByteSlot) -> Option<u8> {
        self.chain.byte(ProtocolType::Global, 1, slot)
    }

    fn extended(&self, slot: ByteSlot) -> Option<u8> {
        self.chain.byte(ProtocolType::GlobalExtended, 0, slot)
    }

    /// Fi/fmax from TA1
    pub fn fi(&self) -> Option<ClockRateConversion> {
        self.first(ByteSlot::Ta)
            .map(|ta1| ClockRateConversion::from_code(ta1 >> 4))
    }

    pub fn fi_value(&self) -> ClockRateConversion {
        self.fi()
            .unwrap_or(ClockRateConversion::from_code(defaults::FI_CODE))
    }

    /// Di from TA1
    pub fn di(&self) -> Option<BaudRateAdjustment> {
        self.first(ByteSlot::Ta).map(BaudRateAdjustment::from_code)
    }

    pub fn di_value(&self) -> BaudRateAdjustment {
        self.di()
            .unwrap_or(BaudRateAdjustment::from_code(defaults::DI_CODE))
    }

    /// Programming current from TB1
    pub fn vpp_current(&self) -> Option<VppCurrent> {
        self.first(ByteSlot::Tb)
            .map(|tb1| VppCurrent::from_bits(tb1 >> 5))
    }

    pub fn vpp_current_value(&self) -> VppCurrent {
        self.vpp_current().unwrap_or(VppCurrent::Milliamps50)
    }

    /// Programming voltage in tenths of a volt, TB2 taking precedence over TB1
    pub fn vpp_voltage(&self) -> Option<u16> {
        if let Some(tb2) = self.second(ByteSlot::Tb) {
            return Some(tb2 as u16);
        }
        match self.first(ByteSlot::Tb).map(|tb1| tb1 & 0x1F) {
            Some(0) | None => None,
            Some(pi1) => Some(pi1 as u16 * 10),
        }
    }

    pub fn vpp_voltage_value(&self) -> u16 {
        self.vpp_voltage().unwrap_or(defaults::VPP_DECIVOLTS)
    }

    /// Whether Vpp is connected, known only when TB1 is present
    pub fn is_vpp_connected(&self) -> Option<bool> {
        self.first(ByteSlot::Tb).map(|tb1| tb1 & 0x1F != 0)
    }

    /// Vpp counts as not connected when nothing is coded
    pub fn is_vpp_connected_value(&self) -> bool {
        self.is_vpp_connected().unwrap_or(false)
    }

    /// Extra guard time N from TC1
    pub fn extra_guard_time(&self) -> Option<u8> {
        self.first(ByteSlot::Tc)
    }

    pub fn extra_guard_time_value(&self) -> u8 {
        self.extra_guard_time()
            .unwrap_or(defaults::EXTRA_GUARD_TIME)
    }

    /// Specific mode byte TA2; absent means negotiable mode
    pub fn specific_mode(&self) -> Option<SpecificMode> {
        self.second(ByteSlot::Ta).map(SpecificMode::decode)
    }

    pub fn clock_stop(&self) -> Option<ClockStop> {
        self.extended(ByteSlot::Ta)
            .map(|ta| ClockStop::from_bits(ta >> 6))
    }

    pub fn clock_stop_value(&self) -> ClockStop {
        self.clock_stop().unwrap_or(ClockStop::NotSupported)
    }

    pub fn class_indicator(&self) -> Option<ClassIndicator> {
        self.extended(ByteSlot::Ta)
            .map(|ta| ClassIndicator(ta & 0x3F))
    }

    pub fn class_indicator_value(&self) -> ClassIndicator {
        self.class_indicator()
            .unwrap_or(ClassIndicator(ClassIndicator::A))
    }

    pub fn spu(&self) -> Option<Spu> {
        self.extended(ByteSlot::Tb).map(Spu::decode)
    }

    pub fn spu_value(&self) -> Spu {
        self.spu().unwrap_or(Spu::NotUsed)
    }
}

/// Writes to the global interface parameters
pub struct GlobalParametersMut<'a> {
    atr: &'a mut Atr,
}

impl<'a> GlobalParametersMut<'a> {
    pub(crate) fn new(atr: &'a mut Atr) -> Self {
        GlobalParametersMut { atr }
    }

    /// Write TA1 as a whole, `None` removes it
    pub fn set_fi_di(&mut self, value: Option<(ClockRateConversion, BaudRateAdjustment)>) -> Result<()> {
        if let Some((fi, di)) = value {
            if fi.is_rfu() || di.is_rfu() {
                return Err(AtrError::invalid_parameter(format!(
                    "TA1 codes Fi=0x{:X} Di=0x{:X} include a reserved value",
                    fi.code(),
                    di.code()
                )));
            }
        }
        let ta1 = value.map(|(fi, di)| fi.code() << 4 | di.code());
        self.atr.update_chain(|chain| {
            chain.set_byte(ProtocolType::Global, 0, ByteSlot::Ta, ta1)
        })
    }

    /// Change Fi/fmax, keeping Di
    pub fn set_fi(&mut self, fi: ClockRateConversion) -> Result<()> {
        let di = self.atr.global_parameters().di_value();
        self.set_fi_di(Some((fi, di)))
    }

    /// Change Di, keeping Fi/fmax
    pub fn set_di(&mut self, di: BaudRateAdjustment) -> Result<()> {
        let fi = self.atr.global_parameters().fi_value();
        self.set_fi_di(Some((fi, di)))
    }

    /// Write the programming voltage and current
    ///
    /// Whole volts go to PI1 in TB1. A voltage with tenths needs PI2 in TB2;
    /// TB1 then keeps the current and the whole-volt part.
    pub fn set_vpp(&mut self, vpp: Option<Vpp>) -> Result<()> {
        let (tb1, tb2) = match vpp {
            None => (None, None),
            Some(vpp) => {
                if !(50..=250).contains(&vpp.decivolts) {
                    return Err(AtrError::invalid_parameter(format!(
                        "Vpp of {} dV is outside 5.0 V to 25.0 V",
                        vpp.decivolts
                    )));
                }
                if vpp.current == VppCurrent::Rfu {
                    return Err(AtrError::invalid_parameter(
                        "Vpp current code 3 is reserved for future use",
                    ));
                }

                let tb1 = vpp.current.bits() << 5 | (vpp.decivolts / 10) as u8;
                let tb2 = (vpp.decivolts % 10 != 0).then_some(vpp.decivolts as u8);
                (Some(tb1), tb2)
            }
        };

        self.atr.update_chain(|chain| {
            chain.set_byte(ProtocolType::Global, 0, ByteSlot::Tb, tb1)?;
            chain.set_byte(ProtocolType::Global, 1, ByteSlot::Tb, tb2)
        })
    }

    /// Code TB1 = 0x00: Vpp is not connected
    pub fn set_vpp_not_connected(&mut self) -> Result<()> {
        self.atr.update_chain(|chain| {
            chain.set_byte(ProtocolType::Global, 1, ByteSlot::Tb, None)?;
            chain.set_byte(ProtocolType::Global, 0, ByteSlot::Tb, Some(0x00))
        })
    }

    pub fn set_extra_guard_time(&mut self, n: Option<u8>) -> Result<()> {
        self.atr.update_chain(|chain| {
            chain.set_byte(ProtocolType::Global, 0, ByteSlot::Tc, n)
        })
    }

    pub fn set_specific_mode(&mut self, mode: Option<SpecificMode>) -> Result<()> {
        let ta2 = mode.map(|mode| mode.encode()).transpose()?;
        self.atr.update_chain(|chain| {
            chain.set_byte(ProtocolType::Global, 1, ByteSlot::Ta, ta2)
        })
    }

    /// Write clock stop and class together, `None` removes the byte
    pub fn set_clock_stop_and_class(&mut self, value: Option<(ClockStop, ClassIndicator)>) -> Result<()> {
        let ta = value.map(|(stop, class)| stop.bits() << 6 | class.bits());
        self.atr.update_chain(|chain| {
            chain.set_byte(ProtocolType::GlobalExtended, 0, ByteSlot::Ta, ta)
        })
    }

    pub fn set_clock_stop(&mut self, stop: ClockStop) -> Result<()> {
        let class = self.atr.global_parameters().class_indicator_value();
        self.set_clock_stop_and_class(Some((stop, class)))
    }

    pub fn set_class_indicator(&mut self, class: ClassIndicator) -> Result<()> {
        let stop = self.atr.global_parameters().clock_stop_value();
        self.set_clock_stop_and_class(Some((stop, class)))
    }

    pub fn set_spu(&mut self, spu: Option<Spu>) -> Result<()> {
        let tb = spu.map(|spu| spu.encode()).transpose()?;
        self.atr.update_chain(|chain| {
            chain.set_byte(ProtocolType::GlobalExtended, 0, ByteSlot::Tb, tb)
        })
    }
}

/// T=0 parameters
#[derive(Debug, Clone, Copy)]
pub struct T0Parameters<'a> {
    chain: &'a InterfaceGroupChain,
}

impl<'a> T0Parameters<'a> {
    pub fn new(chain: &'a InterfaceGroupChain) -> Self {
        T0Parameters { chain }
    }

    /// TC2; only meaningful while group 2 belongs to T=0
    pub fn wi(&self) -> ParameterByte {
        match self.chain.second_group_type() {
            None => ParameterByte::Absent,
            Some(ProtocolType::T0) => self
                .chain
                .byte(ProtocolType::Global, 1, ByteSlot::Tc)
                .into(),
            Some(_) => ParameterByte::Irrelevant,
        }
    }

    /// Waiting time integer WI
    pub fn wi_value(&self) -> u8 {
        self.wi().value().unwrap_or(defaults::WI)
    }

    /// Maximum delay between two characters, in etu (960 x D x WI)
    pub fn waiting_time_etu(&self) -> u32 {
        let di = GlobalParameters::new(self.chain)
            .di_value()
            .di()
            .unwrap_or(1) as u32;
        960 * di * self.wi_value() as u32
    }
}

/// Writes to the T=0 parameters
pub struct T0ParametersMut<'a> {
    atr: &'a mut Atr,
}

impl<'a> T0ParametersMut<'a> {
    pub(crate) fn new(atr: &'a mut Atr) -> Self {
        T0ParametersMut { atr }
    }

    pub fn set_wi(&mut self, wi: Option<u8>) -> Result<()> {
        if wi == Some(0) {
            return Err(AtrError::invalid_parameter("WI = 0 is reserved for future use"));
        }
        if self.atr.t0_parameters().wi() == ParameterByte::Irrelevant {
            return Err(AtrError::invalid_operation(
                "TC2 belongs to T=0 only while group 2 is the T=0 group",
            ));
        }
        self.atr.update_chain(|chain| {
            chain.set_byte(ProtocolType::Global, 1, ByteSlot::Tc, wi)
        })
    }
}

/// T=1 parameters, from the first T=1 group after group 2
#[derive(Debug, Clone, Copy)]
pub struct T1Parameters<'a> {
    chain: &'a InterfaceGroupChain,
}

impl<'a> T1Parameters<'a> {
    pub fn new(chain: &'a InterfaceGroupChain) -> Self {
        T1Parameters { chain }
    }

    fn byte(&self, slot: ByteSlot) -> Option<u8> {
        self.chain.byte(ProtocolType::T1, 0, slot)
    }

    /// Information field size for the card
    pub fn ifsc(&self) -> Option<u8> {
        self.byte(ByteSlot::Ta)
    }

    pub fn ifsc_value(&self) -> u8 {
        self.ifsc().unwrap_or(defaults::IFSC)
    }

    /// Block waiting time integer, high nibble of TB
    pub fn bwi(&self) -> Option<u8> {
        self.byte(ByteSlot::Tb).map(|tb| tb >> 4)
    }

    pub fn bwi_value(&self) -> u8 {
        self.bwi().unwrap_or(defaults::BWI)
    }

    /// Character waiting time integer, low nibble of TB
    pub fn cwi(&self) -> Option<u8> {
        self.byte(ByteSlot::Tb).map(|tb| tb & 0x0F)
    }

    pub fn cwi_value(&self) -> u8 {
        self.cwi().unwrap_or(defaults::CWI)
    }

    /// Character waiting time in etu (11 + 2^CWI)
    pub fn character_waiting_time_etu(&self) -> u32 {
        11 + (1u32 << self.cwi_value())
    }

    pub fn redundancy_code(&self) -> Option<RedundancyCode> {
        self.byte(ByteSlot::Tc).map(|tc| {
            if tc & 0x01 != 0 {
                RedundancyCode::Crc
            } else {
                RedundancyCode::Lrc
            }
        })
    }

    pub fn redundancy_code_value(&self) -> RedundancyCode {
        self.redundancy_code().unwrap_or(RedundancyCode::Lrc)
    }
}

/// Writes to the T=1 parameters
pub struct T1ParametersMut<'a> {
    atr: &'a mut Atr,
}

impl<'a> T1ParametersMut<'a> {
    pub(crate) fn new(atr: &'a mut Atr) -> Self {
        T1ParametersMut { atr }
    }

    pub fn set_ifsc(&mut self, ifsc: Option<u8>) -> Result<()> {
        if let Some(value @ (0x00 | 0xFF)) = ifsc {
            return Err(AtrError::invalid_parameter(format!(
                "IFSC 0x{:02X} is reserved for future use",
                value
            )));
        }
        self.atr.update_chain(|chain| {
            chain.set_byte(ProtocolType::T1, 0, ByteSlot::Ta, ifsc)
        })
    }

    /// Write BWI and CWI, which share TB
    pub fn set_waiting_integers(&mut self, value: Option<(u8, u8)>) -> Result<()> {
        if let Some((bwi, cwi)) = value {
            if bwi > 9 {
                return Err(AtrError::invalid_parameter(format!(
                    "BWI {} is reserved for future use",
                    bwi
                )));
            }
            if cwi > 0x0F {
                return Err(AtrError::invalid_parameter(format!(
                    "CWI {} does not fit in 4 bits",
                    cwi
                )));
            }
        }
        let tb = value.map(|(bwi, cwi)| bwi << 4 | cwi);
        self.atr.update_chain(|chain| {
            chain.set_byte(ProtocolType::T1, 0, ByteSlot::Tb, tb)
        })
    }

    /// Change BWI, writing the current or default CWI alongside
    pub fn set_bwi(&mut self, bwi: u8) -> Result<()> {
        let cwi = self.atr.t1_parameters().cwi_value();
        self.set_waiting_integers(Some((bwi, cwi)))
    }

    /// Change CWI, writing the current or default BWI alongside
    pub fn set_cwi(&mut self, cwi: u8) -> Result<()> {
        let bwi = self.atr.t1_parameters().bwi_value();
        self.set_waiting_integers(Some((bwi, cwi)))
    }

    pub fn set_redundancy_code(&mut self, code: Option<RedundancyCode>) -> Result<()> {
        let tc = code.map(|code| match code {
            RedundancyCode::Lrc => 0x00,
            RedundancyCode::Crc => 0x01,
        });
        self.atr.update_chain(|chain| {
            chain.set_byte(ProtocolType::T1, 0, ByteSlot::Tc, tc)
        })
    }
}

/// Raw bytes of a protocol this crate does not interpret (T=2 to T=14)
#[derive(Debug, Clone, Copy)]
pub struct UnknownProtocolParameters<'a> {
    chain: &'a InterfaceGroupChain,
    protocol: ProtocolType,
}

impl<'a> UnknownProtocolParameters<'a> {
    pub fn new(chain: &'a InterfaceGroupChain, protocol: ProtocolType) -> Self {
        UnknownProtocolParameters { chain, protocol }
    }

    pub fn protocol(&self) -> ProtocolType {
        self.protocol
    }

    /// Number of groups holding bytes for this protocol
    pub fn group_count(&self) -> usize {
        self.chain.specific_group_count(self.protocol)
    }

    pub fn byte(&self, index: usize, slot: ByteSlot) -> Option<u8> {
        self.chain.byte(self.protocol, index, slot)
    }
}

/// Writes to the raw bytes of an uninterpreted protocol
pub struct UnknownProtocolParametersMut<'a> {
    atr: &'a mut Atr,
    protocol: ProtocolType,
}

impl<'a> UnknownProtocolParametersMut<'a> {
    pub(crate) fn new(atr: &'a mut Atr, protocol: ProtocolType) -> Self {
        UnknownProtocolParametersMut { atr, protocol }
    }

    pub fn set_byte(&mut self, index: usize, slot: ByteSlot, value: Option<u8>) -> Result<()> {
        let protocol = self.protocol;
        self.atr
            .update_chain(|chain| chain.set_byte(protocol, index, slot, value))
    }
}

/// Parameters of one indicated protocol
#[derive(Debug, Clone, Copy)]
pub enum ProtocolParameters<'a> {
    T0(T0Parameters<'a>),
    T1(T1Parameters<'a>),
    Unknown(UnknownProtocolParameters<'a>),
}

impl<'a> ProtocolParameters<'a> {
    /// View for `protocol` if the chain indicates it
    pub fn for_protocol(chain: &'a InterfaceGroupChain, protocol: ProtocolType) -> Option<Self> {
        if !protocol.is_protocol() || !chain.indicates(protocol) {
            return None;
        }

        Some(match protocol {
            ProtocolType::T0 => ProtocolParameters::T0(T0Parameters::new(chain)),
            ProtocolType::T1 => ProtocolParameters::T1(T1Parameters::new(chain)),
            other => ProtocolParameters::Unknown(UnknownProtocolParameters::new(chain, other)),
        })
    }

    pub fn protocol(&self) -> ProtocolType {
        match self {
            ProtocolParameters::T0(_) => ProtocolType::T0,
            ProtocolParameters::T1(_) => ProtocolType::T1,
            ProtocolParameters::Unknown(params) => params.protocol(),
        }
    }
}
