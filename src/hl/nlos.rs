//! Signal levels and line of sight estimation
//!
//! The raw values come from the CIA diagnostics, so logging has to be set to
//! [`CiaDiagLog::All`] first. With the `rssi` feature the driver also turns
//! them into dBm levels and a non line of sight probability, following DW3000
//! user manual 4.7 and the method of APS006 part 3.
//!
//! [`CiaDiagLog::All`]: super::CiaDiagLog::All

#[cfg(feature = "rssi")]
use num_traits::Float;

use super::AccumulatorIndex;
#[cfg(feature = "rssi")]
use super::RxQuality;
#[cfg(feature = "rssi")]
use crate::configs::{PdoaMode, Prf, StsMode};
use crate::{maybe_async_attr, spi_type, Error, Ready, DW3000};

/// Level difference in dB above which the signal is non line of sight
pub const SIG_LVL_THRESHOLD: f32 = 12.0;
/// Fraction of [`SIG_LVL_THRESHOLD`] from which NLOS becomes possible
pub const SIG_LVL_FACTOR: f32 = 0.4;
/// First to peak path distance, in samples, up to which the signal is LOS
pub const IP_MIN_THRESHOLD: f32 = 3.3;
/// First to peak path distance from which the signal is NLOS
pub const IP_MAX_THRESHOLD: f32 = 6.0;

const CONSTANT_PR_IP_A: f32 = 0.39178;
const CONSTANT_PR_IP_B: f32 = 1.31719;

/// 10 log10(2^21), DW3000
const LOG_CONSTANT_DW3000: f32 = 63.2;
/// 10 log10(2^17), QM33xxx
const LOG_CONSTANT_QM33: f32 = 51.175;

/// Raw values behind the signal levels of one CIR
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NlosAllDiag {
    /// Preamble symbols, or STS length, accumulated
    pub accum_count: u32,
    /// First path amplitude, point 1, 2 fractional bits
    pub f1: u32,
    /// First path amplitude, point 2
    pub f2: u32,
    /// First path amplitude, point 3
    pub f3: u32,
    /// Channel impulse response power
    pub cir_power: u32,
    /// DGC decision, 0 to 7, only meaningful with DGC on
    pub dgc_decision: u8,
}

/// First and peak path of the Ipatov CIR, both with 6 fractional bits
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NlosIpDiag {
    /// First path index
    pub index_fp: u32,
    /// Peak path index
    pub index_pp: u32,
}

impl NlosIpDiag {
    /// Distance from the first to the peak path in samples
    pub fn index_difference(&self) -> f32 {
        (self.index_pp as f32 - self.index_fp as f32) / 64.0
    }
}

/// Non line of sight probability of a frame
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NlosEstimate {
    /// 0 for certainly line of sight, 1 for certainly not
    pub probability: f32,
}

impl NlosEstimate {
    /// Combines the signal level differences of the CIRs with the Ipatov
    /// path distance
    ///
    /// A level difference is the total received level minus the first path
    /// level, in dB. The path distance only decides when no CIR shows a
    /// significant level difference.
    pub fn new(level_differences: &[f32], ip_diag: NlosIpDiag) -> Self {
        let possible = SIG_LVL_THRESHOLD * SIG_LVL_FACTOR;

        let probability = if level_differences.iter().any(|&d| d > SIG_LVL_THRESHOLD) {
            1.0
        } else if let Some(&d) = level_differences.iter().find(|&&d| d > possible) {
            (d / SIG_LVL_THRESHOLD - SIG_LVL_FACTOR) / (1.0 - SIG_LVL_FACTOR)
        } else {
            let distance = ip_diag.index_difference();
            if distance <= IP_MIN_THRESHOLD {
                0.0
            } else if distance < IP_MAX_THRESHOLD {
                CONSTANT_PR_IP_A * distance - CONSTANT_PR_IP_B
            } else {
                1.0
            }
        };

        NlosEstimate {
            probability: probability.clamp(0.0, 1.0),
        }
    }

    /// Confidence that the path was line of sight
    pub fn los_confidence(&self) -> f32 {
        1.0 - self.probability
    }
}

/// The constant A of the level formulas, in dB
#[cfg(feature = "rssi")]
fn level_constant(prf: Prf, accumulator: AccumulatorIndex) -> f32 {
    match (prf, accumulator) {
        (Prf::Mhz16, AccumulatorIndex::Ipatov) => 113.8,
        (Prf::Mhz64, AccumulatorIndex::Ipatov) => 121.7,
        (_, _) => 120.7,
    }
}

impl<SPI> DW3000<SPI, Ready>
where
    SPI: spi_type::spi::SpiDevice<u8>,
{
    /// DGC decision of the last frame
    #[maybe_async_attr]
    pub async fn read_dgc_decision(&mut self) -> Result<u8, Error<SPI>> {
        Ok(self.ll.dgc_dbg().read().await?.dgc_decision())
    }

    /// Signal level inputs of one CIR
    #[maybe_async_attr]
    pub async fn nlos_all_diag(
        &mut self,
        accumulator: AccumulatorIndex,
    ) -> Result<NlosAllDiag, Error<SPI>> {
        let diag = self.read_cir_diagnostics(accumulator).await?;
        let dgc_decision = self.read_dgc_decision().await?;

        Ok(NlosAllDiag {
            accum_count: diag.accum_count as u32,
            f1: diag.f1,
            f2: diag.f2,
            f3: diag.f3,
            cir_power: diag.power,
            dgc_decision,
        })
    }

    /// First and peak path of the Ipatov CIR
    #[maybe_async_attr]
    pub async fn nlos_ip_diag(&mut self) -> Result<NlosIpDiag, Error<SPI>> {
        let index_pp = self.ll.ip_diag_0().read().await?.ip_peaki() as u32;
        let index_fp = self.ll.ip_diag_8().read().await?.ip_fp() as u32;

        Ok(NlosIpDiag {
            index_fp,
            index_pp: index_pp << 6,
        })
    }
}

#[cfg(feature = "rssi")]
impl<SPI> DW3000<SPI, Ready>
where
    SPI: spi_type::spi::SpiDevice<u8>,
{
    fn log_constant(&self) -> f32 {
        match self.ctx.variant {
            Some(variant) if variant.has_equalizer() => LOG_CONSTANT_QM33,
            _ => LOG_CONSTANT_DW3000,
        }
    }

    /// 6 dB per DGC step, when the DGC is on
    #[maybe_async_attr]
    async fn dgc_gain(&mut self) -> Result<f32, Error<SPI>> {
        if self.ll.dgc_cfg().read().await?.rx_tune_en() == 0 {
            return Ok(0.0);
        }
        Ok(6.0 * self.read_dgc_decision().await? as f32)
    }

    /// The CIR the CIA runs on, Ipatov first
    #[maybe_async_attr]
    async fn quality_accumulator(&mut self) -> Result<AccumulatorIndex, Error<SPI>> {
        let sys_cfg = self.ll.sys_cfg().read().await?;
        if sys_cfg.cia_ipatov() != 0 {
            Ok(AccumulatorIndex::Ipatov)
        } else if sys_cfg.cia_sts() != 0 {
            Ok(AccumulatorIndex::Sts0)
        } else {
            Err(Error::InvalidConfiguration)
        }
    }

    /// Received signal level on one CIR, in dBm
    ///
    /// DW3000 user manual 4.7.2
    #[maybe_async_attr]
    pub async fn signal_power(&mut self, accumulator: AccumulatorIndex) -> Result<f32, Error<SPI>> {
        let diag = self.nlos_all_diag(accumulator).await?;
        if diag.accum_count == 0 || diag.cir_power == 0 {
            return Err(Error::RssiNotCalculable);
        }

        let n = diag.accum_count as f32;
        let a = level_constant(self.ctx.config.prf(), accumulator);
        let d = self.dgc_gain().await?;

        Ok(10.0 * (diag.cir_power as f32 / (n * n)).log10() + self.log_constant() + d - a)
    }

    /// First path signal level on one CIR, in dBm
    ///
    /// DW3000 user manual 4.7.1
    #[maybe_async_attr]
    pub async fn first_path_power(
        &mut self,
        accumulator: AccumulatorIndex,
    ) -> Result<f32, Error<SPI>> {
        let diag = self.nlos_all_diag(accumulator).await?;
        let sum = first_path_energy(&diag);
        if diag.accum_count == 0 || sum == 0.0 {
            return Err(Error::RssiNotCalculable);
        }

        let n = diag.accum_count as f32;
        let a = level_constant(self.ctx.config.prf(), accumulator);
        let d = self.dgc_gain().await?;

        Ok(10.0 * (sum / (n * n)).log10() + d - a)
    }

    /// Estimates whether the last frame took a direct path
    ///
    /// Uses every CIR the configured STS and PDoA modes produce.
    #[maybe_async_attr]
    pub async fn estimate_nlos(&mut self) -> Result<NlosEstimate, Error<SPI>> {
        let mut differences = [0.0f32; 3];
        let mut count = 0;

        let mut accumulators = [Some(AccumulatorIndex::Ipatov), None, None];
        if self.ctx.config.sts_mode != StsMode::Off {
            accumulators[1] = Some(AccumulatorIndex::Sts0);
            if self.ctx.config.pdoa_mode == PdoaMode::Mode3 {
                accumulators[2] = Some(AccumulatorIndex::Sts1);
            }
        }

        for accumulator in accumulators.into_iter().flatten() {
            let diag = self.nlos_all_diag(accumulator).await?;
            let sum = first_path_energy(&diag);
            if diag.cir_power == 0 || sum == 0.0 {
                continue;
            }
            // N, A and D are the same on both levels
            differences[count] = 10.0 * (diag.cir_power as f32 / sum).log10() + self.log_constant();
            count += 1;
        }

        let ip_diag = self.nlos_ip_diag().await?;
        Ok(NlosEstimate::new(&differences[..count], ip_diag))
    }

    /// Signal level and line of sight confidence of the last frame
    #[maybe_async_attr]
    pub async fn rx_quality(&mut self) -> Result<RxQuality, Error<SPI>> {
        let accumulator = self.quality_accumulator().await?;
        let rssi = self.signal_power(accumulator).await?;
        let nlos = self.estimate_nlos().await?;

        Ok(RxQuality {
            los_confidence_level: nlos.los_confidence(),
            rssi,
        })
    }
}

/// F1² + F2² + F3², with the fractional bits dropped
#[cfg(feature = "rssi")]
fn first_path_energy(diag: &NlosAllDiag) -> f32 {
    [diag.f1, diag.f2, diag.f3]
        .iter()
        .map(|&f| {
            let f = f as f32 / 4.0;
            f * f
        })
        .sum()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hl::{fake::FakeChip, InitSkip};

    use embedded_hal_mock::eh1::delay::NoopDelay;

    fn ip(distance_samples: u32) -> NlosIpDiag {
        NlosIpDiag {
            index_fp: 100 << 6,
            index_pp: (100 + distance_samples) << 6,
        }
    }

    #[test]
    fn strong_level_difference_is_nlos() {
        let estimate = NlosEstimate::new(&[3.0, 12.5], ip(0));
        assert_eq!(estimate.probability, 1.0);
        assert_eq!(estimate.los_confidence(), 0.0);
    }

    #[test]
    fn moderate_level_difference_scales() {
        // halfway between 4.8 and 12 dB
        let estimate = NlosEstimate::new(&[8.4], ip(0));
        assert!((estimate.probability - 0.5).abs() < 1e-5);
    }

    #[test]
    fn path_distance_decides_without_level_difference() {
        assert_eq!(NlosEstimate::new(&[1.0], ip(3)).probability, 0.0);
        assert_eq!(NlosEstimate::new(&[], ip(7)).probability, 1.0);

        let estimate = NlosEstimate::new(&[], ip(5));
        assert!((estimate.probability - (0.39178 * 5.0 - 1.31719)).abs() < 1e-5);
    }

    #[tokio::test]
    async fn raw_values() {
        let mut chip = FakeChip::healthy(0xDECA_0302);
        chip.set32(0x0C, 0x28, 12 << 21);
        chip.set32(0x0C, 0x48, 10 << 6);
        chip.set32(0x0C, 0x2C, 5000);
        chip.set32(0x0C, 0x58, 64);
        chip.set32(0x03, 0x60, 3 << 28);
        let mut dw3000 = DW3000::new(chip)
            .initialise(&mut NoopDelay::new(), InitSkip::empty())
            .await
            .unwrap();

        let ip_diag = dw3000.nlos_ip_diag().await.unwrap();
        assert_eq!(ip_diag.index_difference(), 2.0);

        let all = dw3000
            .nlos_all_diag(AccumulatorIndex::Ipatov)
            .await
            .unwrap();
        assert_eq!(all.cir_power, 5000);
        assert_eq!(all.accum_count, 64);
        assert_eq!(all.dgc_decision, 3);
    }

    #[cfg(feature = "rssi")]
    #[tokio::test]
    async fn levels_in_dbm() {
        let mut chip = FakeChip::healthy(0xDECA_0302);
        // C = N², F1 = 64 after dropping the fractional bits
        chip.set32(0x0C, 0x2C, 64 * 64);
        chip.set32(0x0C, 0x30, 256);
        chip.set32(0x0C, 0x58, 64);
        let mut dw3000 = DW3000::new(chip)
            .initialise(&mut NoopDelay::new(), InitSkip::empty())
            .await
            .unwrap();

        // CIA on Ipatov, DGC off
        dw3000.ll().bus().set32(0x00, 0x10, 1 << 7);
        dw3000.ll().bus().set16(0x03, 0x18, 0);

        let rssi = dw3000.signal_power(AccumulatorIndex::Ipatov).await.unwrap();
        assert!((rssi - (63.2 - 121.7)).abs() < 1e-3);

        let fp = dw3000
            .first_path_power(AccumulatorIndex::Ipatov)
            .await
            .unwrap();
        assert!((fp + 121.7).abs() < 1e-3);

        let quality = dw3000.rx_quality().await.unwrap();
        assert_eq!(quality.rssi, rssi);
        // 63.2 dB between the levels
        assert_eq!(quality.los_confidence_level, 0.0);

        assert!(matches!(
            dw3000.signal_power(AccumulatorIndex::Sts0).await,
            Err(Error::RssiNotCalculable)
        ));
    }
}
