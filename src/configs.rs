//! Configuration structs for the PHY and the transmitter
//!
//! This module houses the datastructures that control how frames are
//! transmitted and received. A [`Config`] is applied with
//! [`DW3000::configure`], a [`TxConfig`] with [`DW3000::configure_tx_rf`].
//!
//! [`DW3000::configure`]: ../hl/struct.DW3000.html#method.configure
//! [`DW3000::configure_tx_rf`]: ../hl/struct.DW3000.html#method.configure_tx_rf

/// Default SFD timeout in symbols, matching a 128 symbol preamble
pub const SFD_TIMEOUT_DEFAULT: u16 = 129;

/// PHY configuration
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// The channel the transceiver operates on
    pub channel: UwbChannel,
    /// Length of the transmitted preamble
    pub preamble_length: PreambleLength,
    /// Preamble acquisition chunk size of the receiver
    pub pac: PacSize,
    /// TX preamble code, this also selects the PRF
    pub tx_preamble_code: u8,
    /// RX preamble code, this also selects the PRF
    pub rx_preamble_code: u8,
    /// Start of frame delimiter
    pub sfd_type: SfdSequence,
    /// Data rate of the payload
    pub bitrate: BitRate,
    /// Standard or extended PHR
    pub phr_mode: PhrMode,
    /// Rate the PHR is sent at
    pub phr_rate: PhrRate,
    /// SFD timeout in symbols, 0 selects [`SFD_TIMEOUT_DEFAULT`]
    pub sfd_timeout: u16,
    /// STS packet configuration
    pub sts_mode: StsMode,
    /// Use super deterministic codes instead of the programmed key and IV
    pub sts_sdc: bool,
    /// STS length
    pub sts_length: StsLength,
    /// PDoA mode
    pub pdoa_mode: PdoaMode,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            channel: UwbChannel::Channel5,
            preamble_length: PreambleLength::SYMBOLS_128,
            pac: PacSize::Pac8,
            tx_preamble_code: 9,
            rx_preamble_code: 9,
            sfd_type: SfdSequence::Ieee4z,
            bitrate: BitRate::Kbps6800,
            phr_mode: PhrMode::Standard,
            phr_rate: PhrRate::Standard,
            sfd_timeout: SFD_TIMEOUT_DEFAULT,
            sts_mode: StsMode::Off,
            sts_sdc: false,
            sts_length: StsLength::Symbols64,
            pdoa_mode: PdoaMode::Disabled,
        }
    }
}

/// Reasons a [`Config`] is rejected
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// A preamble code outside 1..=24
    PreambleCode,
    /// TX and RX preamble codes select different PRFs
    PrfMismatch,
    /// PDoA mode 3 needs an STS that is a multiple of 128 symbols
    PdoaStsLength,
    /// PDoA needs the STS
    PdoaWithoutSts,
    /// A TX or RX mode names more than one delay reference
    DelayReference,
    /// Clear channel assessment can't be combined with a delayed start
    CcaDelayed,
    /// A preamble length the chip can't send
    PreambleLength,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let reason = match self {
            ConfigError::PreambleCode => "preamble code outside 1..=24",
            ConfigError::PrfMismatch => "TX and RX preamble codes select different PRFs",
            ConfigError::PdoaStsLength => "PDoA mode 3 needs an STS of a multiple of 128 symbols",
            ConfigError::PdoaWithoutSts => "PDoA needs the STS",
            ConfigError::DelayReference => "more than one delay reference",
            ConfigError::CcaDelayed => "CCA with a delayed start",
            ConfigError::PreambleLength => "unsupported preamble length",
        };
        f.write_str(reason)
    }
}

impl Config {
    /// Checks the invariants the chip relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        let tx = Prf::from_code(self.tx_preamble_code).ok_or(ConfigError::PreambleCode)?;
        let rx = Prf::from_code(self.rx_preamble_code).ok_or(ConfigError::PreambleCode)?;
        if tx != rx {
            return Err(ConfigError::PrfMismatch);
        }

        match self.pdoa_mode {
            PdoaMode::Disabled => {}
            PdoaMode::Mode1 => {}
            PdoaMode::Mode3 => {
                if self.sts_mode == StsMode::Off {
                    return Err(ConfigError::PdoaWithoutSts);
                }
                if self.sts_length.symbols() % 128 != 0 {
                    return Err(ConfigError::PdoaStsLength);
                }
            }
        }

        Ok(())
    }

    /// The PRF selected by the RX preamble code
    pub fn prf(&self) -> Prf {
        Prf::from_code(self.rx_preamble_code).unwrap_or(Prf::Mhz64)
    }

    /// The SFD timeout actually programmed
    pub fn effective_sfd_timeout(&self) -> u16 {
        if self.sfd_timeout == 0 {
            SFD_TIMEOUT_DEFAULT
        } else {
            self.sfd_timeout
        }
    }
}

/// Transmitter RF configuration
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TxConfig {
    /// Pulse generator delay
    pub pg_delay: u8,
    /// TX power for the four frame segments, one byte each
    pub power: u32,
    /// Pulse generator count target, 0 disables the pulse generator
    /// calibration
    pub pg_count: u16,
}

impl Default for TxConfig {
    fn default() -> Self {
        TxConfig {
            pg_delay: 0x34,
            power: 0xfdfd_fdfd,
            pg_count: 0,
        }
    }
}

/// The bitrate at which a message is transmitted
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BitRate {
    /// 850 kilobits per second.
    Kbps850 = 0,
    /// 6.8 megabits per second.
    Kbps6800 = 1,
}

/// The pulse repetition frequency, selected through the preamble code
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Prf {
    /// 16 megahertz, codes 1 to 8
    Mhz16 = 1,
    /// 64 megahertz, codes 9 to 24
    Mhz64 = 2,
}

impl Prf {
    /// PRF of a preamble code, `None` for codes the chip does not support
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1..=8 => Some(Prf::Mhz16),
            9..=24 => Some(Prf::Mhz64),
            _ => None,
        }
    }
}

/// Preamble length in symbols
///
/// Any multiple of 8 from 16 to 2048 is allowed, plus 4096. Lengths other
/// than the standard ones are sent using the fine preamble length field.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u16", into = "u16"))]
pub struct PreambleLength(u16);

impl TryFrom<u16> for PreambleLength {
    type Error = ConfigError;

    fn try_from(symbols: u16) -> Result<Self, Self::Error> {
        PreambleLength::new(symbols).ok_or(ConfigError::PreambleLength)
    }
}

impl From<PreambleLength> for u16 {
    fn from(length: PreambleLength) -> Self {
        length.0
    }
}

impl PreambleLength {
    /// 32 symbols
    pub const SYMBOLS_32: Self = PreambleLength(32);
    /// 64 symbols
    pub const SYMBOLS_64: Self = PreambleLength(64);
    /// 72 symbols
    pub const SYMBOLS_72: Self = PreambleLength(72);
    /// 128 symbols
    pub const SYMBOLS_128: Self = PreambleLength(128);
    /// 256 symbols
    pub const SYMBOLS_256: Self = PreambleLength(256);
    /// 512 symbols
    pub const SYMBOLS_512: Self = PreambleLength(512);
    /// 1024 symbols
    pub const SYMBOLS_1024: Self = PreambleLength(1024);
    /// 1536 symbols
    pub const SYMBOLS_1536: Self = PreambleLength(1536);
    /// 2048 symbols
    pub const SYMBOLS_2048: Self = PreambleLength(2048);
    /// 4096 symbols
    pub const SYMBOLS_4096: Self = PreambleLength(4096);

    /// Whether the chip can send a preamble of `symbols` symbols
    pub const fn is_valid(symbols: u16) -> bool {
        (symbols >= 16 && symbols <= 2048 && symbols % 8 == 0) || symbols == 4096
    }

    /// Creates a preamble length, `None` if the chip can't send it
    pub const fn new(symbols: u16) -> Option<Self> {
        if Self::is_valid(symbols) {
            Some(PreambleLength(symbols))
        } else {
            None
        }
    }

    /// Number of symbols
    pub fn symbols(&self) -> u16 {
        self.0
    }

    /// TXPSR code of the largest standard length that fits in this preamble
    pub fn txpsr(&self) -> u8 {
        match self.0 {
            4096 => 0x3,
            2048..=4095 => 0xa,
            1536..=2047 => 0x6,
            1024..=1535 => 0x2,
            512..=1023 => 0xd,
            256..=511 => 0x9,
            128..=255 => 0x5,
            64..=127 => 0x1,
            _ => 0x4,
        }
    }

    /// Fine preamble length field, in 8 symbol steps minus one
    ///
    /// Zero for 4096 symbols, which only the TXPSR code can express.
    pub fn fine_plen(&self) -> u8 {
        if self.0 > 2048 {
            0
        } else {
            (self.0 / 8 - 1) as u8
        }
    }

    /// Recommended PAC size for receiving this preamble
    pub fn recommended_pac(&self) -> PacSize {
        match self.0 {
            0..=127 => PacSize::Pac4,
            128..=255 => PacSize::Pac8,
            256..=511 => PacSize::Pac16,
            _ => PacSize::Pac32,
        }
    }
}

impl Default for PreambleLength {
    fn default() -> Self {
        PreambleLength::SYMBOLS_128
    }
}

/// Preamble acquisition chunk size
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PacSize {
    /// 8 symbols, for preambles of 128 symbols and below
    Pac8 = 0,
    /// 16 symbols, for 256 symbol preambles
    Pac16 = 1,
    /// 32 symbols, for 512 symbols and above
    Pac32 = 2,
    /// 4 symbols, for preambles shorter than 128 symbols
    Pac4 = 3,
}

impl PacSize {
    /// Number of symbols in a chunk
    pub fn symbols(&self) -> u16 {
        match self {
            PacSize::Pac4 => 4,
            PacSize::Pac8 => 8,
            PacSize::Pac16 => 16,
            PacSize::Pac32 => 32,
        }
    }
}

/// Start of frame delimiter
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SfdSequence {
    /// IEEE 8-bit ternary
    Ieee4a = 0,
    /// Proprietary 8-bit
    Dw8 = 1,
    /// Proprietary 16-bit
    Dw16 = 2,
    /// IEEE 8-bit binary (4z)
    Ieee4z = 3,
}

impl SfdSequence {
    /// Length in symbols
    pub fn length(&self) -> u16 {
        match self {
            SfdSequence::Dw16 => 16,
            _ => 8,
        }
    }
}

/// PHR format
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PhrMode {
    /// Frames of up to 127 bytes
    Standard = 0,
    /// Frames of up to 1023 bytes
    Extended = 1,
}

impl PhrMode {
    /// Mask applied to the received frame length
    pub fn frame_length_mask(&self) -> u16 {
        match self {
            PhrMode::Standard => 0x7f,
            PhrMode::Extended => 0x3ff,
        }
    }
}

/// Rate the PHR is sent at
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PhrRate {
    /// 850 kbps
    Standard = 0,
    /// At the data rate
    DataRate = 1,
}

/// STS packet configuration
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StsMode {
    /// No STS (SP0)
    Off = 0,
    /// STS after the SFD, before the PHR (SP1)
    Mode1 = 1,
    /// STS after the payload (SP2)
    Mode2 = 2,
    /// STS without PHR or payload (SP3)
    NoData = 3,
}

/// STS length
///
/// The discriminant is the register encoding, the length in blocks of 8
/// symbols minus one.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StsLength {
    /// 16 symbols
    Symbols16 = 1,
    /// 32 symbols
    Symbols32 = 3,
    /// 64 symbols
    Symbols64 = 7,
    /// 128 symbols
    Symbols128 = 15,
    /// 256 symbols
    Symbols256 = 31,
    /// 512 symbols
    Symbols512 = 63,
    /// 1024 symbols
    Symbols1024 = 127,
    /// 2048 symbols
    Symbols2048 = 255,
}

impl StsLength {
    /// Number of symbols
    pub fn symbols(&self) -> u16 {
        (*self as u16 + 1) * 8
    }

    /// Index into the per length tables, 0 for 16 symbols
    pub fn index(&self) -> usize {
        (*self as u16 + 1).trailing_zeros() as usize - 1
    }
}

/// PDoA mode
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PdoaMode {
    /// No PDoA
    Disabled = 0,
    /// Phase difference between the Ipatov and STS CIRs
    Mode1 = 1,
    /// Phase difference between the two halves of the STS
    Mode3 = 3,
}

/// All the available UWB channels.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UwbChannel {
    /// Channel 5
    /// - Center frequency: 6489.6 Mhz
    /// - Bandwidth: 499.2 Mhz
    Channel5 = 0,
    /// Channel 9
    /// - Center frequency: 7987.2 Mhz
    /// - Bandwidth: 499.2 Mhz
    Channel9 = 1,
}

impl Default for UwbChannel {
    fn default() -> Self {
        UwbChannel::Channel5
    }
}

impl UwbChannel {
    /// Channel number
    pub fn number(&self) -> u8 {
        match self {
            UwbChannel::Channel5 => 5,
            UwbChannel::Channel9 => 9,
        }
    }

    /// Center frequency in Hz
    pub fn center_frequency_hz(&self) -> u64 {
        match self {
            UwbChannel::Channel5 => 6_489_600_000,
            UwbChannel::Channel9 => 7_987_200_000,
        }
    }

    /// Channel from its number
    pub fn from_number(number: u8) -> Option<Self> {
        match number {
            5 => Some(UwbChannel::Channel5),
            9 => Some(UwbChannel::Channel9),
            _ => None,
        }
    }

    /// Gets the recommended value for rf_tx_ctrl_2
    pub fn rf_tx_ctrl_2(&self) -> u32 {
        match self {
            UwbChannel::Channel5 => 0x1C07_1134,
            UwbChannel::Channel9 => 0x1C01_0034,
        }
    }

    /// Gets the recommended value for the PLL configuration
    pub fn pll_cfg(&self) -> u16 {
        match self {
            UwbChannel::Channel5 => 0x1F3C,
            UwbChannel::Channel9 => 0x0F3C,
        }
    }

    /// Conversion factor from Hz of carrier offset to ppm of clock offset
    pub fn hz_to_ppm(&self) -> f32 {
        match self {
            UwbChannel::Channel5 => -1.0e6 / 6489.6e6,
            UwbChannel::Channel9 => -1.0e6 / 7987.2e6,
        }
    }

    /// Digital gain control lookup table
    pub fn dgc_lut(&self) -> [u32; 7] {
        match self {
            UwbChannel::Channel5 => [
                0x1c0fd, 0x1c43e, 0x1c6be, 0x1c77e, 0x1cf36, 0x1cfb5, 0x1cff5,
            ],
            UwbChannel::Channel9 => [
                0x2a8fe, 0x2ac36, 0x2a5fe, 0x2af3e, 0x2af7d, 0x2afb5, 0x2afb5,
            ],
        }
    }
}
