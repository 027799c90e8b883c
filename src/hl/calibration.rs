//! PLL, receiver and crystal calibration
//!
//! Every calibration polls a status bit with the bounded budgets of the
//! `retry` module. A calibration that runs out of attempts reports its own
//! error and leaves the chip half calibrated; the only way back is a reset.

use crate::{delay_type, maybe_async_attr, spi_type, Error, Ready, DW3000};

use super::{
    retry::{
        Outcome, Retry, PGF_CAL_POLLS, PLL_CAL_LOOPS, PLL_LOCK_POLLS, POLL_DELAY_US,
    },
    Awake,
};

/// Crystal trim used when OTP holds none
pub const DEFAULT_XTAL_TRIM: u8 = 0x2E;
/// Largest crystal trim code
pub const XTAL_TRIM_MAX: u8 = 0x3F;
/// Temperature value meaning "not measured"
pub const TEMP_INIT: i8 = -127;
/// Temperature assumed when none is known, in °C
pub const DEFAULT_XTAL_TRIM_TEMP: i8 = 25;

/// Result of a failed resistor calibration
const RX_CAL_FAIL: u32 = 0x1fff_ffff;

/// LDOs the PGF calibration needs
const PGF_CAL_LDOS: u32 = 0x0105;

/// Crystal temperature model
///
/// The trim offset is `(alpha * dt + beta * dt²) / 2^22` codes for a
/// temperature `dt` away from the reference.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct XtalTrimParams {
    /// Temperature to compensate for in °C, [`TEMP_INIT`] to measure it
    pub temperature: i8,
    /// Temperature the reference trim was found at
    pub ref_temperature: i8,
    /// Trim at the reference temperature
    pub ref_trim: u8,
    /// Linear coefficient, scaled by 2^22
    pub alpha: i32,
    /// Quadratic coefficient, scaled by 2^22
    pub beta: i32,
}

/// Trim code for `temperature`, clipped to the valid range
///
/// [`TEMP_INIT`] stands for an unknown temperature and selects
/// [`DEFAULT_XTAL_TRIM_TEMP`].
pub fn compensate_xtal_trim(params: &XtalTrimParams, temperature: i8) -> u8 {
    let temperature = if temperature == TEMP_INIT {
        DEFAULT_XTAL_TRIM_TEMP
    } else {
        temperature
    };

    let dt = temperature as i64 - params.ref_temperature as i64;
    let scaled = params.alpha as i64 * dt + params.beta as i64 * dt * dt;
    // round to nearest
    let offset = (scaled + (1 << 21)) >> 22;

    (params.ref_trim as i64 + offset).clamp(0, XTAL_TRIM_MAX as i64) as u8
}

impl<SPI, State> DW3000<SPI, State>
where
    SPI: spi_type::spi::SpiDevice<u8>,
    State: Awake,
{
    /// Calibrates the PLL and waits for it to lock
    ///
    /// The coarse code found on a channel is reused for the first pass the
    /// next time. Fails with [`Error::PllLock`] if the PLL did not lock
    /// after all passes.
    #[maybe_async_attr]
    pub async fn pll_cal<DELAY>(&mut self, delay: &mut DELAY) -> Result<(), Error<SPI>>
    where
        DELAY: delay_type::delay::DelayNs,
    {
        let channel = self.ctx.config.channel as usize;

        let mut passes = Retry::new(PLL_CAL_LOOPS, 0);
        while passes.next_attempt() {
            match self.ctx.pll_coarse_code[channel] {
                Some(code) if passes.attempt() == 1 => {
                    self.ll.write32(0x09, 0x04, code).await?;
                    self.ll
                        .pll_cal()
                        .and_or(|w| w.use_old(1).cal_en(1))
                        .await?;
                }
                _ => {
                    self.ll
                        .pll_cal()
                        .and_or(|w| w.use_old(0).cal_en(1))
                        .await?;
                }
            }

            self.ll.sys_status().write(|w| w.cplock(1)).await?;
            self.ll.seq_ctrl().and_or(|w| w.ainit2idle(1)).await?;

            let mut lock = Retry::new(PLL_LOCK_POLLS, POLL_DELAY_US);
            while lock.next_attempt() {
                delay.delay_us(lock.delay_us()).await;
                if self.ll.sys_status().read().await?.cplock() == 1 {
                    lock.finish();
                }
            }

            if let Outcome::Done(_polls) = lock.outcome() {
                #[cfg(feature = "defmt")]
                defmt::trace!("PLL locked after {=u16} polls", _polls);

                self.ctx.pll_coarse_code[channel] = Some(self.ll.read32(0x09, 0x04).await?);
                passes.finish();
            } else {
                // the cached code is stale
                self.ctx.pll_coarse_code[channel] = None;
            }
        }

        match passes.outcome() {
            Outcome::Done(_) => Ok(()),
            Outcome::Exhausted => {
                #[cfg(feature = "defmt")]
                defmt::warn!("PLL did not lock");

                Err(Error::PllLock)
            }
        }
    }

    /// Returns the crystal trim in use
    pub fn get_xtal_trim(&self) -> u8 {
        self.ctx.xtal_trim
    }

    /// Sets the crystal trim, clipped to [`XTAL_TRIM_MAX`]
    #[maybe_async_attr]
    pub async fn set_xtal_trim(&mut self, trim: u8) -> Result<(), Error<SPI>> {
        let trim = trim.min(XTAL_TRIM_MAX);
        self.ll.xtal().and_or(|w| w.xtal_trim(trim)).await?;
        self.ctx.xtal_trim = trim;
        Ok(())
    }
}

impl<SPI> DW3000<SPI, Ready>
where
    SPI: spi_type::spi::SpiDevice<u8>,
{
    /// Runs the PGF calibration
    ///
    /// With `ldo_enable`, the LDOs the calibration depends on are turned on
    /// for its duration. The LDO configuration is restored in all cases.
    #[maybe_async_attr]
    pub async fn pgf_cal<DELAY>(
        &mut self,
        delay: &mut DELAY,
        ldo_enable: bool,
    ) -> Result<(), Error<SPI>>
    where
        DELAY: delay_type::delay::DelayNs,
    {
        let ldo_ctrl = if ldo_enable {
            let ldo_ctrl = self.ll.ldo_ctrl().read().await?.value();
            self.ll
                .ldo_ctrl()
                .write(|w| w.value(ldo_ctrl | PGF_CAL_LDOS))
                .await?;
            Some(ldo_ctrl)
        } else {
            None
        };

        let result = self.run_pgf_cal(delay).await;

        if let Some(ldo_ctrl) = ldo_ctrl {
            self.ll.ldo_ctrl().write(|w| w.value(ldo_ctrl)).await?;
        }

        result
    }

    /// Runs the PGF calibration, the LDOs have to be on already
    ///
    /// Reports the first failure: the calibration itself, then the I branch,
    /// then the Q branch.
    #[maybe_async_attr]
    pub async fn run_pgf_cal<DELAY>(&mut self, delay: &mut DELAY) -> Result<(), Error<SPI>>
    where
        DELAY: delay_type::delay::DelayNs,
    {
        self.ll
            .rx_cal()
            .write(|w| w.comp_dly(2).cal_mode(1))
            .await?;
        self.ll.rx_cal().and_or(|w| w.cal_en(1)).await?;

        let done = self.wait_rx_cal(delay).await?;

        // calibration off, results readable
        self.ll.write8(0x04, 0x0C, 0).await?;
        self.ll.rx_cal_sts().write(|w| w.value(1)).await?;
        self.ll.and_or8(0x04, 0x0E, 0xff, 0x01).await?;

        let resi = self.ll.rx_cal_resi().read().await?.value();
        let resq = self.ll.rx_cal_resq().read().await?.value();

        let result = if !done {
            Err(Error::RxCalPgf)
        } else if resi == RX_CAL_FAIL {
            Err(Error::RxCalResI)
        } else if resq == RX_CAL_FAIL {
            Err(Error::RxCalResQ)
        } else {
            Ok(())
        };

        #[cfg(feature = "defmt")]
        if result.is_err() {
            defmt::warn!("PGF calibration failed: {:?}", result);
        }

        result
    }

    /// Runs the ADC offset calibration of the QM33xxx receiver
    #[maybe_async_attr]
    pub async fn adc_offset_cal<DELAY>(&mut self, delay: &mut DELAY) -> Result<(), Error<SPI>>
    where
        DELAY: delay_type::delay::DelayNs,
    {
        if !self.ctx.variant.map_or(false, |v| v.has_equalizer()) {
            return Err(Error::InvalidConfiguration);
        }

        self.ll
            .rx_cal()
            .write(|w| w.comp_dly(2).cal_mode(2))
            .await?;
        self.ll.rx_cal().and_or(|w| w.cal_en(1)).await?;

        let done = self.wait_rx_cal(delay).await?;

        self.ll.write8(0x04, 0x0C, 0).await?;
        self.ll.rx_cal_sts().write(|w| w.value(1)).await?;

        if done {
            Ok(())
        } else {
            #[cfg(feature = "defmt")]
            defmt::warn!("ADC offset calibration failed");

            Err(Error::RxAdcCal)
        }
    }

    /// Compensates the crystal trim for temperature and applies it
    ///
    /// If `params.temperature` is [`TEMP_INIT`], the on-chip sensor is read.
    /// If that fails too, [`DEFAULT_XTAL_TRIM_TEMP`] is used. Returns the
    /// applied trim.
    #[maybe_async_attr]
    pub async fn xtal_temperature_compensation<DELAY>(
        &mut self,
        delay: &mut DELAY,
        params: &XtalTrimParams,
    ) -> Result<u8, Error<SPI>>
    where
        DELAY: delay_type::delay::DelayNs,
    {
        let temperature = if params.temperature == TEMP_INIT {
            match self.read_temperature(delay).await {
                Ok(celsius) => celsius as i8,
                Err(Error::Spi(error)) => return Err(Error::Spi(error)),
                Err(_) => TEMP_INIT,
            }
        } else {
            params.temperature
        };

        let trim = compensate_xtal_trim(params, temperature);
        self.set_xtal_trim(trim).await?;

        Ok(trim)
    }

    #[maybe_async_attr]
    async fn wait_rx_cal<DELAY>(&mut self, delay: &mut DELAY) -> Result<bool, Error<SPI>>
    where
        DELAY: delay_type::delay::DelayNs,
    {
        let mut retry = Retry::new(PGF_CAL_POLLS, POLL_DELAY_US);
        while retry.next_attempt() {
            if self.ll.rx_cal_sts().read().await?.value() == 1 {
                retry.finish();
            } else {
                delay.delay_us(retry.delay_us()).await;
            }
        }
        Ok(retry.outcome() != Outcome::Exhausted)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hl::{fake::FakeChip, DwState, InitSkip};

    use embedded_hal_mock::eh1::delay::NoopDelay;

    async fn ready(chip: FakeChip) -> DW3000<FakeChip, Ready> {
        DW3000::new(chip)
            .initialise(&mut NoopDelay::new(), InitSkip::empty())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn pll_locks_and_caches_coarse_code() {
        let mut chip = FakeChip::healthy(0xDECA_0302);
        chip.set32(0x09, 0x04, 0x0000_1234);
        let mut dw3000 = ready(chip).await;

        dw3000
            .set_dw_state(&mut NoopDelay::new(), DwState::Idle)
            .await
            .unwrap();

        assert_eq!(dw3000.ctx.pll_coarse_code[0], Some(0x1234));
        // AINIT2IDLE set, calibration enabled
        assert_eq!(dw3000.ll().bus().get32(0x11, 0x08) & 0x100, 0x100);
        assert_eq!(dw3000.ll().bus().get16(0x09, 0x08) & 0x100, 0x100);
    }

    #[tokio::test]
    async fn pll_never_reports_lock_without_cplock() {
        let mut chip = FakeChip::healthy(0xDECA_0302);
        chip.unforce(0x00, 0x44);
        let mut dw3000 = ready(chip).await;

        let result = dw3000.pll_cal(&mut NoopDelay::new()).await;

        assert!(matches!(result, Err(Error::PllLock)));
        assert_eq!(result.unwrap_err().code(), -2);
        assert_eq!(dw3000.ctx.pll_coarse_code[0], None);
    }

    #[tokio::test]
    async fn pgf_calibration_reports_each_failure() {
        let mut dw3000 = ready(FakeChip::healthy(0xDECA_0302)).await;
        dw3000.pgf_cal(&mut NoopDelay::new(), true).await.unwrap();

        dw3000.ll().bus().set32(0x04, 0x14, RX_CAL_FAIL);
        let result = dw3000.pgf_cal(&mut NoopDelay::new(), false).await;
        assert!(matches!(result, Err(Error::RxCalResI)));

        dw3000.ll().bus().set32(0x04, 0x14, 0);
        dw3000.ll().bus().set32(0x04, 0x1C, RX_CAL_FAIL);
        let result = dw3000.pgf_cal(&mut NoopDelay::new(), false).await;
        assert!(matches!(result, Err(Error::RxCalResQ)));

        dw3000.ll().bus().unforce(0x04, 0x20);
        dw3000.ll().bus().set8(0x04, 0x20, 0);
        let result = dw3000.pgf_cal(&mut NoopDelay::new(), false).await;
        assert!(matches!(result, Err(Error::RxCalPgf)));
    }

    #[tokio::test]
    async fn pgf_calibration_restores_ldos() {
        let mut chip = FakeChip::healthy(0xDECA_0302);
        chip.set32(0x07, 0x48, 0x0000_0040);
        let mut dw3000 = ready(chip).await;

        dw3000.pgf_cal(&mut NoopDelay::new(), true).await.unwrap();

        assert_eq!(dw3000.ll().bus().get32(0x07, 0x48), 0x0000_0040);
        assert!(dw3000
            .ll()
            .bus()
            .writes
            .contains(&(0x07, 0x48, vec![0x45, 0x01, 0x00, 0x00])));
    }

    #[tokio::test]
    async fn adc_calibration_needs_qm33() {
        let mut dw3000 = ready(FakeChip::healthy(0xDECA_0302)).await;
        let result = dw3000.adc_offset_cal(&mut NoopDelay::new()).await;
        assert!(matches!(result, Err(Error::InvalidConfiguration)));

        let mut dw3000 = ready(FakeChip::healthy(0xDECA_0304)).await;
        dw3000.adc_offset_cal(&mut NoopDelay::new()).await.unwrap();
    }

    #[test]
    fn xtal_trim_at_reference_temperature() {
        let params = XtalTrimParams {
            temperature: 25,
            ref_temperature: 25,
            ref_trim: 0x2E,
            alpha: -1 << 22,
            beta: 3 << 20,
        };
        assert_eq!(compensate_xtal_trim(&params, 25), 0x2E);
        assert_eq!(compensate_xtal_trim(&params, TEMP_INIT), 0x2E);
    }

    #[test]
    fn xtal_trim_follows_temperature_and_is_clipped() {
        let params = XtalTrimParams {
            temperature: TEMP_INIT,
            ref_temperature: 25,
            ref_trim: 0x20,
            alpha: 1 << 22,
            beta: 0,
        };
        assert_eq!(compensate_xtal_trim(&params, 30), 0x25);
        assert_eq!(compensate_xtal_trim(&params, 20), 0x1B);
        assert_eq!(compensate_xtal_trim(&params, 100), XTAL_TRIM_MAX);
        assert_eq!(compensate_xtal_trim(&params, -40), 0);

        for t in -40..=85 {
            for alpha in [-(8 << 22), 0, 8 << 22] {
                let params = XtalTrimParams { alpha, ..params };
                assert!(compensate_xtal_trim(&params, t) <= XTAL_TRIM_MAX);
            }
        }
    }

    #[tokio::test]
    async fn xtal_trim_is_clipped() {
        let mut dw3000 = ready(FakeChip::healthy(0xDECA_0302)).await;
        dw3000.set_xtal_trim(0x7f).await.unwrap();
        assert_eq!(dw3000.get_xtal_trim(), XTAL_TRIM_MAX);
        assert_eq!(dw3000.ll().bus().get8(0x09, 0x14) & 0x3f, XTAL_TRIM_MAX);
    }
}
