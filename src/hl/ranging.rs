//! Time stamps and CIA results of the last exchange
//!
//! TX and RX time stamps are 40-bit device times, already corrected by the
//! antenna delays. Besides the adjusted RX time stamp the CIA reports one time
//! of arrival per accumulator, plus the phase and time difference between two
//! of them for angle of arrival.

use fixed::types::I5F11;

use super::{receiving::DB_DIAG_SET_0, receiving::DB_RX_TIME, AccumulatorIndex};
use crate::{maybe_async_attr, spi_type, time::Instant, Error, Ready, DW3000};

/// Largest TDoA magnitude, in device time units, for which the PDoA of the
/// same frame is usable
pub const VALID_TDOA_LIMIT: i64 = 100;

/// How much CIA diagnostics the chip logs
///
/// `Min`, `Mid` and `Max` select the set copied into the swinging buffers in
/// double buffer mode.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum CiaDiagLog {
    /// Reduced set only
    Off = 0x0,
    /// All diagnostic registers
    All = 0x1,
    /// Minimal swinging set
    Min = 0x2,
    /// Medium swinging set
    Mid = 0x4,
    /// Maximal swinging set
    Max = 0x8,
}

/// Phase difference of arrival, in radians
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pdoa(pub I5F11);

impl Pdoa {
    /// Decodes the 14-bit two's complement register field
    pub fn from_raw(raw: u16) -> Self {
        let value = ((raw << 2) as i16) >> 2;
        Pdoa(I5F11::from_bits(value))
    }

    /// Value in radians
    pub fn radians(&self) -> f32 {
        self.0.to_num()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Pdoa {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "Pdoa({=i16})", self.0.to_bits())
    }
}

/// Time difference of arrival between the two CIRs, in device time units
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tdoa(pub i64);

impl Tdoa {
    /// Decodes the 41-bit two's complement register field
    ///
    /// The 7 bits above it are ignored.
    pub fn from_raw(raw: u64) -> Self {
        Tdoa(((raw << 23) as i64) >> 23)
    }

    /// Whether the PDoA measured with this TDoA can be trusted
    pub fn is_valid(&self) -> bool {
        self.0.abs() <= VALID_TDOA_LIMIT
    }
}

/// STS quality of the last frame
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StsQuality {
    /// Signed quality index
    pub index: i16,
    /// 60 % of the length factor of the configured STS length
    pub threshold: i16,
}

impl StsQuality {
    /// The STS time stamp may be used
    pub fn is_good(&self) -> bool {
        self.index >= self.threshold
    }
}

/// Status of an STS time of arrival, 9 bits
///
/// Every set bit is a failed check of the CIA.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StsStatus(pub u16);

impl StsStatus {
    /// No check failed
    pub fn is_good(&self) -> bool {
        self.0 & 0x1ff == 0
    }
}

/// CIA diagnostics of one accumulator
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CirDiagnostics {
    /// Channel area, an estimate of the channel power
    pub power: u32,
    /// Magnitude at the first path + 1, 2 fractional bits
    pub f1: u32,
    /// Magnitude at the first path + 2
    pub f2: u32,
    /// Magnitude at the first path + 3
    pub f3: u32,
    /// Amplitude of the peak sample
    pub peak_amplitude: u32,
    /// Index of the peak sample
    pub peak_index: u16,
    /// First path index, 6 fractional bits
    pub fp_index: u16,
    /// Preamble symbols or STS length accumulated
    pub accum_count: u16,
}

/// Everything the CIA reports about a frame
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxDiagnostics {
    /// Time of arrival on the Ipatov CIR
    pub ipatov_rx_time: Instant,
    /// Status of the Ipatov time of arrival
    pub ipatov_rx_status: u8,
    /// Phase of arrival on the Ipatov CIR
    pub ipatov_poa: u16,
    /// Time of arrival on the first STS CIR
    pub sts_rx_time: Instant,
    /// Status of the first STS time of arrival
    pub sts_rx_status: StsStatus,
    /// Phase of arrival on the first STS CIR
    pub sts_poa: u16,
    /// Time of arrival on the second STS CIR
    pub sts2_rx_time: Instant,
    /// Status of the second STS time of arrival
    pub sts2_rx_status: StsStatus,
    /// Phase of arrival on the second STS CIR
    pub sts2_poa: u16,
    /// TDoA between the two CIRs of the PDoA mode
    pub tdoa: Tdoa,
    /// PDoA between the two CIRs of the PDoA mode
    pub pdoa: Pdoa,
    /// Clock offset of the remote device, see [`DW3000::read_clock_offset`]
    pub xtal_offset: i16,
    /// Diagnostics common to both sequences
    pub cia_diag1: u32,
    /// Ipatov CIR
    pub ipatov: CirDiagnostics,
    /// First STS CIR
    pub sts: CirDiagnostics,
    /// Second STS CIR
    pub sts2: CirDiagnostics,
}

impl<SPI> DW3000<SPI, Ready>
where
    SPI: spi_type::spi::SpiDevice<u8>,
{
    /// Selects the CIA diagnostics the chip logs
    ///
    /// With anything but [`CiaDiagLog::All`] only a reduced set of registers
    /// is written and the first path power can't be computed.
    #[maybe_async_attr]
    pub async fn set_cia_diag_log(&mut self, log: CiaDiagLog) -> Result<(), Error<SPI>> {
        let mask = log as u8;
        self.ll
            .cia_conf()
            .and_or(|w| w.mindiag((mask & CiaDiagLog::All as u8 == 0) as u8))
            .await?;
        self.ll.rdb_diag().write(|w| w.rdb_dmode(mask >> 1)).await?;

        self.ctx.cia_diag = log;
        Ok(())
    }

    /// TX time stamp of the last frame, antenna delay included
    #[maybe_async_attr]
    pub async fn read_tx_timestamp(&mut self) -> Result<Instant, Error<SPI>> {
        let stamp = self.ll.tx_time().read().await?.tx_stamp();
        Ok(Instant::from_register(stamp))
    }

    /// Raw TX time stamp, bits 8..40 before the antenna delay
    #[maybe_async_attr]
    pub async fn read_tx_timestamp_raw(&mut self) -> Result<u32, Error<SPI>> {
        Ok(self.ll.tx_rawst().read().await?.value())
    }

    /// RX time stamp of the frame in the current buffer, antenna delay
    /// subtracted
    #[maybe_async_attr]
    pub async fn read_rx_timestamp(&mut self) -> Result<Instant, Error<SPI>> {
        match self.ctx.double_buffer {
            Some(_) => {
                let mut bytes = [0; 5];
                self.ll
                    .read_bytes(DB_DIAG_SET_0 + self.ctx.rx_buffer, DB_RX_TIME, &mut bytes)
                    .await?;
                Ok(Instant::from_le_bytes(bytes))
            }
            None => {
                let stamp = self.ll.rx_time().read().await?.rx_stamp();
                Ok(Instant::from_register(stamp))
            }
        }
    }

    /// Raw RX time stamp, bits 8..40 before the antenna delay
    #[maybe_async_attr]
    pub async fn read_rx_timestamp_raw(&mut self) -> Result<u32, Error<SPI>> {
        Ok(self.ll.rx_time().read().await?.rx_rawst())
    }

    /// Time of arrival on the Ipatov CIR
    #[maybe_async_attr]
    pub async fn read_rx_timestamp_ipatov(&mut self) -> Result<Instant, Error<SPI>> {
        let toa = self.ll.ip_ts().read().await?.ip_toa();
        Ok(Instant::from_register(toa))
    }

    /// Time of arrival on one of the STS CIRs
    ///
    /// The second STS only exists in PDoA mode 3.
    #[maybe_async_attr]
    pub async fn read_rx_timestamp_sts(
        &mut self,
        accumulator: AccumulatorIndex,
    ) -> Result<Instant, Error<SPI>> {
        let toa = match accumulator {
            AccumulatorIndex::Ipatov => return Err(Error::InvalidConfiguration),
            AccumulatorIndex::Sts0 => self.ll.sts_ts().read().await?.sts_toa(),
            AccumulatorIndex::Sts1 => self.ll.sts1_ts().read().await?.sts1_toa(),
        };
        Ok(Instant::from_register(toa))
    }

    /// PDoA of the last frame
    #[maybe_async_attr]
    pub async fn read_pdoa(&mut self) -> Result<Pdoa, Error<SPI>> {
        Ok(Pdoa::from_raw(self.ll.pdoa().read().await?.pdoa()))
    }

    /// TDoA of the last frame
    ///
    /// Check [`Tdoa::is_valid`] before using the PDoA of the same frame.
    #[maybe_async_attr]
    pub async fn read_tdoa(&mut self) -> Result<Tdoa, Error<SPI>> {
        Ok(Tdoa::from_raw(self.ll.tdoa().read().await?.value()))
    }

    /// STS quality index of the last frame
    ///
    /// The STS time stamp may be inaccurate unless [`StsQuality::is_good`].
    #[maybe_async_attr]
    pub async fn read_sts_quality(&mut self) -> Result<StsQuality, Error<SPI>> {
        let raw = self.ll.sts_sts().read().await?.acc_qual();
        let index = ((raw << 4) as i16) >> 4;
        Ok(StsQuality {
            index,
            threshold: self.ctx.sts_quality_threshold,
        })
    }

    /// Status of an STS time of arrival
    #[maybe_async_attr]
    pub async fn read_sts_status(
        &mut self,
        accumulator: AccumulatorIndex,
    ) -> Result<StsStatus, Error<SPI>> {
        let status = match accumulator {
            AccumulatorIndex::Ipatov => return Err(Error::InvalidConfiguration),
            AccumulatorIndex::Sts0 => self.ll.sts_ts().read().await?.sts_toast(),
            AccumulatorIndex::Sts1 => self.ll.sts1_ts().read().await?.sts1_toast(),
        };
        Ok(StsStatus(status))
    }

    /// CIA diagnostics of one accumulator
    #[maybe_async_attr]
    pub async fn read_cir_diagnostics(
        &mut self,
        accumulator: AccumulatorIndex,
    ) -> Result<CirDiagnostics, Error<SPI>> {
        let diag = match accumulator {
            AccumulatorIndex::Ipatov => {
                let peak = self.ll.ip_diag_0().read().await?;
                CirDiagnostics {
                    power: self.ll.ip_diag_1().read().await?.ip_carea(),
                    f1: self.ll.ip_diag_2().read().await?.ip_fp1m(),
                    f2: self.ll.ip_diag_3().read().await?.ip_fp2m(),
                    f3: self.ll.ip_diag_4().read().await?.ip_fp3m(),
                    peak_amplitude: peak.ip_peaka(),
                    peak_index: peak.ip_peaki(),
                    fp_index: self.ll.ip_diag_8().read().await?.ip_fp(),
                    accum_count: self.ll.ip_diag_12().read().await?.ip_nacc(),
                }
            }
            AccumulatorIndex::Sts0 => {
                let peak = self.ll.sts_diag_0().read().await?;
                CirDiagnostics {
                    power: self.ll.sts_diag_1().read().await?.cp0_carea(),
                    f1: self.ll.sts_diag_2().read().await?.cp0_fp1m(),
                    f2: self.ll.sts_diag_3().read().await?.cp0_fp2m(),
                    f3: self.ll.sts_diag_4().read().await?.cp0_fp3m(),
                    peak_amplitude: peak.cp0_peaka(),
                    peak_index: peak.cp0_peaki(),
                    fp_index: self.ll.sts_diag_8().read().await?.cp0_fp(),
                    accum_count: self.ll.sts_diag_12().read().await?.cp0_nacc(),
                }
            }
            AccumulatorIndex::Sts1 => {
                let peak = self.ll.sts1_diag_0().read().await?;
                CirDiagnostics {
                    power: self.ll.sts1_diag_1().read().await?.cp1_carea(),
                    f1: self.ll.sts1_diag_2().read().await?.cp1_fp1m(),
                    f2: self.ll.sts1_diag_3().read().await?.cp1_fp2m(),
                    f3: self.ll.sts1_diag_4().read().await?.cp1_fp3m(),
                    peak_amplitude: peak.cp1_peaka(),
                    peak_index: peak.cp1_peaki(),
                    fp_index: self.ll.sts1_diag_8().read().await?.cp1_fp(),
                    accum_count: self.ll.sts1_diag_12().read().await?.cp1_nacc(),
                }
            }
        };
        Ok(diag)
    }

    /// Reads the full set of CIA results
    ///
    /// Only the reduced set is valid unless logging is [`CiaDiagLog::All`].
    #[maybe_async_attr]
    pub async fn read_diagnostics(&mut self) -> Result<RxDiagnostics, Error<SPI>> {
        let ip = self.ll.ip_ts().read().await?;
        let sts = self.ll.sts_ts().read().await?;
        let sts2 = self.ll.sts1_ts().read().await?;

        Ok(RxDiagnostics {
            ipatov_rx_time: Instant::from_register(ip.ip_toa()),
            ipatov_rx_status: ip.ip_toast(),
            ipatov_poa: ip.ip_poa(),
            sts_rx_time: Instant::from_register(sts.sts_toa()),
            sts_rx_status: StsStatus(sts.sts_toast()),
            sts_poa: sts.sts_poa(),
            sts2_rx_time: Instant::from_register(sts2.sts1_toa()),
            sts2_rx_status: StsStatus(sts2.sts1_toast()),
            sts2_poa: sts2.sts1_poa(),
            tdoa: self.read_tdoa().await?,
            pdoa: self.read_pdoa().await?,
            xtal_offset: self.read_clock_offset().await?,
            cia_diag1: self.ll.cia_diag_1().read().await?.value(),
            ipatov: self.read_cir_diagnostics(AccumulatorIndex::Ipatov).await?,
            sts: self.read_cir_diagnostics(AccumulatorIndex::Sts0).await?,
            sts2: self.read_cir_diagnostics(AccumulatorIndex::Sts1).await?,
        })
    }
}
