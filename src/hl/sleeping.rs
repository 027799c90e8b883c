//! Sleep, deep sleep and the way back
//!
//! Before sleeping the chip saves its configuration into the always-on (AON)
//! array. On wake up, the parts selected with [`OnWake`] are reloaded by the
//! chip itself. [`DW3000::restore_common`] and [`DW3000::restore_txrx`] redo
//! the rest.

use bitflags::bitflags;
use embedded_hal::digital::OutputPin;

use super::{
    configure::{LDO_RLOAD_VALUE, PLL_CAL_CONFIG, RF_TX_CTRL_1_VALUE},
    retry::{Outcome, Retry, IDLE_RC_POLLS, POLL_DELAY_US},
    uninitialized::BIAS_TUNE_MASK,
    ChipVariant, DwState,
};
use crate::{
    configs::Prf, delay_type, maybe_async_attr, spi_type, Error, Ready, Sleeping, DW3000,
};

/// AON_CTRL: copy the configuration into the AON array, entering sleep when
/// enabled
pub(crate) const AON_ARRAY_SAVE: u8 = 0x02;
const AON_DCA_READ: u8 = 0x08;
const AON_DCA_WRITE: u8 = 0x10;
/// Needed for addresses above 0xFF
const AON_DCA_WRITE_HI: u8 = 0x20;
const AON_DCA_ENABLE: u8 = 0x80;

/// Sleep counter, bits 19..12
pub const AON_SLPCNT_LO: u16 = 0x102;
/// Sleep counter, bits 27..20
pub const AON_SLPCNT_HI: u16 = 0x103;
/// Sleep counter calibration control
pub const AON_SLPCNT_CAL_CTRL: u16 = 0x104;
/// Low power oscillator trim
pub const AON_LPOSC_TRIM: u16 = 0x10B;
/// Digital supply configuration
pub const AON_VDD_DIG: u16 = 0x10C;
/// Sleep counter calibration result, low octet
pub const AON_SLPCNT_CAL_LO: u16 = 0x10E;
/// Sleep counter calibration result, high octet
pub const AON_SLPCNT_CAL_HI: u16 = 0x10F;

const SLPCNT_CAL_ENABLE: u8 = 0x04;
const SLPCNT_CAL_START: u8 = 0x05;
/// Time the calibration needs to count a few oscillator cycles
const SLPCNT_CAL_TIME_MS: u32 = 2;

/// How long the wake up line has to stay active
pub const WAKE_UP_PULSE_US: u32 = 500;

bitflags! {
    /// What the chip does by itself on waking up
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct OnWake: u16 {
        /// Reload the configuration from the AON array
        const CONFIG = 0x0001;
        /// Sample temperature and battery voltage
        const RUN_SAR = 0x0002;
        /// Reload the bias trim from OTP
        const LOAD_BIAS = 0x0004;
        /// Reload the DGC tables from OTP
        const LOAD_DGC = 0x0008;
        /// Reload the LDO tune from OTP
        const LOAD_LDO = 0x0010;
        /// Load the operating parameter set selected below
        const ALT_OPS = 0x0020;
        /// Operating parameter set, bit 0
        const SEL_OPS_0 = 0x0040;
        /// Operating parameter set, bit 1
        const SEL_OPS_1 = 0x0080;
        /// Go to IDLE_PLL
        const GOTO_IDLE = 0x0100;
        /// Go to IDLE_PLL and enable the receiver
        const GOTO_RX = 0x0200;
        /// Run the PGF calibration, which costs receiver performance
        const PGF_CAL = 0x0800;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for OnWake {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "OnWake({=u16:#x})", self.bits())
    }
}

bitflags! {
    /// Sleep and wake up sources, AON_CFG
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct WakeConfig: u8 {
        /// Sleep or deep sleep may be entered at all
        const SLEEP_ENABLE = 0x01;
        /// Sleep with the sleep counter running, deep sleep without
        const SLEEP = 0x02;
        /// Brownout detector stays on while sleeping
        const BROWNOUT_DETECT = 0x04;
        /// Chip select wakes the chip up
        const WAKE_CS = 0x08;
        /// The WAKEUP pin wakes the chip up
        const WAKE_PIN = 0x10;
        /// SLEEP_ENABLE survives the next wake up
        const PRESERVE_SLEEP = 0x20;
        /// Restart the sleep counter when it expires
        const SLEEP_COUNT_REPEAT = 0x40;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for WakeConfig {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "WakeConfig({=u8:#x})", self.bits())
    }
}

bitflags! {
    /// Events after which the chip goes to sleep on its own
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct SleepAfter: u8 {
        /// A frame was sent
        const TX = 0x01;
        /// A frame was received
        const RX = 0x02;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for SleepAfter {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "SleepAfter({=u8:#x})", self.bits())
    }
}

bitflags! {
    /// What [`DW3000::restore_txrx`] brings back
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct RestoreMask: u8 {
        /// Recalibrate the ADC offsets, QM33xxx only
        const FORCE_ADC_OFFSET_CAL = 0x02;
        /// Receiver
        const RX = 0x04;
        /// Transmitter
        const TX = 0x08;
        /// Both directions
        const TXRX = 0x0C;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for RestoreMask {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "RestoreMask({=u8:#x})", self.bits())
    }
}

impl<SPI> DW3000<SPI, Ready>
where
    SPI: spi_type::spi::SpiDevice<u8>,
{
    /// Reads one octet of the AON array
    #[maybe_async_attr]
    pub async fn aon_read(&mut self, address: u16) -> Result<u8, Error<SPI>> {
        self.ll.aon_addr().write(|w| w.value(address)).await?;
        self.ll
            .aon_ctrl()
            .write(|w| w.value(AON_DCA_ENABLE | AON_DCA_READ))
            .await?;
        let value = self.ll.aon_rdata().read().await?.value();
        self.ll.aon_ctrl().write(|w| w.value(0)).await?;
        Ok(value)
    }

    /// Writes one octet of the AON array
    #[maybe_async_attr]
    pub async fn aon_write(&mut self, address: u16, value: u8) -> Result<(), Error<SPI>> {
        let ctrl = if address > 0xff {
            AON_DCA_ENABLE | AON_DCA_WRITE | AON_DCA_WRITE_HI
        } else {
            AON_DCA_ENABLE | AON_DCA_WRITE
        };

        self.ll.aon_addr().write(|w| w.value(address)).await?;
        self.ll.aon_wdata().write(|w| w.value(value)).await?;
        self.ll.aon_ctrl().write(|w| w.value(ctrl)).await?;
        self.ll.aon_ctrl().write(|w| w.value(0)).await?;
        Ok(())
    }

    /// Measures the low power oscillator against the crystal
    ///
    /// Returns the number of crystal cycles per oscillator cycle; the
    /// oscillator runs at 38.4 MHz divided by that. Run it before
    /// [`DW3000::configure_sleep_count`] to know what a count is worth.
    #[maybe_async_attr]
    pub async fn calibrate_sleep_count<DELAY>(&mut self, delay: &mut DELAY) -> Result<u16, Error<SPI>>
    where
        DELAY: delay_type::delay::DelayNs,
    {
        self.aon_write(AON_SLPCNT_CAL_CTRL, SLPCNT_CAL_ENABLE).await?;
        self.aon_write(AON_SLPCNT_CAL_CTRL, SLPCNT_CAL_START).await?;
        delay.delay_ms(SLPCNT_CAL_TIME_MS).await;
        self.aon_write(AON_SLPCNT_CAL_CTRL, 0).await?;

        let hi = self.aon_read(AON_SLPCNT_CAL_HI).await?;
        let lo = self.aon_read(AON_SLPCNT_CAL_LO).await?;
        let cycles = u16::from_be_bytes([hi, lo]);

        #[cfg(feature = "defmt")]
        defmt::debug!("sleep counter: {=u16} crystal cycles per tick", cycles);

        Ok(cycles)
    }

    /// Programs the upper 16 bits of the 28-bit sleep counter
    ///
    /// The SPI clock has to be below 3 MHz for the AON writes.
    #[maybe_async_attr]
    pub async fn configure_sleep_count(&mut self, count: u16) -> Result<(), Error<SPI>> {
        let [hi, lo] = count.to_be_bytes();
        self.aon_write(AON_SLPCNT_HI, hi).await?;
        self.aon_write(AON_SLPCNT_LO, lo).await?;
        Ok(())
    }

    /// Sets up sleep, the wake up sources and what happens on wake up
    ///
    /// Reloading the trims and DGC tables the OTP holds is added to
    /// `on_wake`.
    #[maybe_async_attr]
    pub async fn configure_sleep(
        &mut self,
        on_wake: OnWake,
        wake: WakeConfig,
    ) -> Result<(), Error<SPI>> {
        let mut mode = on_wake;
        if self.ctx.otp.ldo_tune != 0 {
            mode |= OnWake::LOAD_LDO;
        }
        if self.ctx.otp.bias_tune != 0 {
            mode |= OnWake::LOAD_BIAS;
        }
        if self.ctx.otp.dgc_from_otp && self.ctx.config.prf() == Prf::Mhz64 {
            mode |= OnWake::LOAD_DGC;
        }

        self.ll.aon_dig_cfg().write(|w| w.value(mode.bits())).await?;
        self.ll.aon_cfg().write(|w| w.value(wake.bits())).await?;
        self.ctx.on_wake = mode;

        #[cfg(feature = "defmt")]
        defmt::debug!("sleep configured: {:?}, {:?}", mode, wake);

        Ok(())
    }

    /// Lets the chip go to sleep by itself after the given events
    ///
    /// The interrupt line has to be inactive for the chip to fall asleep.
    #[maybe_async_attr]
    pub async fn enter_sleep_after(&mut self, events: SleepAfter) -> Result<(), Error<SPI>> {
        self.ll
            .seq_ctrl()
            .and_or(|w| {
                w.atx2slp(events.contains(SleepAfter::TX) as u8)
                    .arx2slp(events.contains(SleepAfter::RX) as u8)
            })
            .await?;
        Ok(())
    }

    /// Puts the chip to sleep, or deep sleep, as set up by
    /// [`DW3000::configure_sleep`]
    ///
    /// With `stay_in_idle_rc` the PLL stays off after waking up, which makes
    /// waking up faster.
    #[maybe_async_attr]
    pub async fn enter_sleep(
        mut self,
        stay_in_idle_rc: bool,
    ) -> Result<DW3000<SPI, Sleeping>, Error<SPI>> {
        if stay_in_idle_rc {
            self.ll.seq_ctrl().and_or(|w| w.ainit2idle(0)).await?;
        }

        self.ll.aon_ctrl().write(|w| w.value(0)).await?;
        self.ll
            .aon_ctrl()
            .write(|w| w.value(AON_ARRAY_SAVE))
            .await?;

        #[cfg(feature = "defmt")]
        defmt::debug!("entering sleep");

        Ok(self.into_state(Sleeping))
    }

    /// Reapplies the configuration the AON array does not keep
    ///
    /// Call it first after waking up.
    #[maybe_async_attr]
    pub async fn restore_common(&mut self) -> Result<(), Error<SPI>> {
        let on_wake = self.ctx.on_wake;
        let otp = self.ctx.otp;

        if !on_wake.contains(OnWake::LOAD_DGC) {
            let (channel, prf) = (self.ctx.config.channel, self.ctx.config.prf());
            self.configure_dgc(channel, prf).await?;
        }

        if otp.ldo_tune != 0 && !on_wake.contains(OnWake::LOAD_LDO) {
            self.ll.otp_cfg().and_or(|w| w.ldo_kick(1)).await?;
        }
        if otp.bias_tune != 0 && !on_wake.contains(OnWake::LOAD_BIAS) {
            self.ll.otp_cfg().and_or(|w| w.bias_kick(1)).await?;
            self.ll
                .and_or16(0x11, 0x1F, !BIAS_TUNE_MASK, otp.bias_tune as u16)
                .await?;
        }

        let trim = self.ctx.xtal_trim;
        self.set_xtal_trim(trim).await?;
        self.ll.write8(0x09, 0x08, PLL_CAL_CONFIG).await?;

        Ok(())
    }

    /// Brings the transmitter and/or receiver back after
    /// [`DW3000::restore_common`]
    ///
    /// Locks the PLL, which fails with [`Error::PllLock`]. Restoring the
    /// receiver reruns the PGF calibration; the ADC offsets are only
    /// recalibrated on request, which the DW3000 does not support. Nothing
    /// happens without [`RestoreMask::TX`] or [`RestoreMask::RX`].
    #[maybe_async_attr]
    pub async fn restore_txrx<DELAY>(
        &mut self,
        delay: &mut DELAY,
        mask: RestoreMask,
    ) -> Result<(), Error<SPI>>
    where
        DELAY: delay_type::delay::DelayNs,
    {
        if !mask.intersects(RestoreMask::TXRX) {
            return Ok(());
        }

        self.ll.sys_status().write(|w| w.cplock(1)).await?;
        self.set_dw_state(delay, DwState::Idle).await?;

        if mask.contains(RestoreMask::TX) {
            let channel = self.ctx.config.channel;
            self.configure_rf(channel).await?;
            self.ll
                .ldo_rload()
                .write(|w| w.value(LDO_RLOAD_VALUE))
                .await?;
            self.ll
                .rf_tx_ctrl_1()
                .write(|w| w.value(RF_TX_CTRL_1_VALUE))
                .await?;
        }

        if mask.contains(RestoreMask::RX) {
            self.pgf_cal(delay, true).await?;
            if mask.contains(RestoreMask::FORCE_ADC_OFFSET_CAL) {
                self.adc_offset_cal(delay).await?;
            }
        }

        Ok(())
    }
}

impl<SPI> DW3000<SPI, Sleeping>
where
    SPI: spi_type::spi::SpiDevice<u8>,
{
    /// Wakes the chip up by pulsing its WAKEUP pin
    ///
    /// Returns once the chip is back in IDLE_RC and identifies as the chip
    /// that went to sleep. Follow with [`DW3000::restore_common`].
    #[maybe_async_attr]
    pub async fn wake_up<PIN, DELAY>(
        self,
        pin: &mut PIN,
        delay: &mut DELAY,
    ) -> Result<DW3000<SPI, Ready>, Error<SPI>>
    where
        PIN: OutputPin,
        DELAY: delay_type::delay::DelayNs,
    {
        pin.set_high().map_err(|_| Error::WakeUp)?;
        delay.delay_us(WAKE_UP_PULSE_US).await;
        pin.set_low().map_err(|_| Error::WakeUp)?;

        self.await_wake_up(delay).await
    }

    /// Wakes the chip up by holding chip select active
    #[maybe_async_attr]
    pub async fn wake_up_cs<DELAY>(
        mut self,
        delay: &mut DELAY,
    ) -> Result<DW3000<SPI, Ready>, Error<SPI>>
    where
        DELAY: delay_type::delay::DelayNs,
    {
        self.ll.wake_up(WAKE_UP_PULSE_US).await?;
        self.await_wake_up(delay).await
    }

    #[maybe_async_attr]
    async fn await_wake_up<DELAY>(
        mut self,
        delay: &mut DELAY,
    ) -> Result<DW3000<SPI, Ready>, Error<SPI>>
    where
        DELAY: delay_type::delay::DelayNs,
    {
        let mut retry = Retry::new(IDLE_RC_POLLS, POLL_DELAY_US);
        while retry.next_attempt() {
            let status = self.ll.sys_status().read().await?;
            if status.rcinit() == 1 && status.spirdy() == 1 {
                retry.finish();
            } else {
                delay.delay_us(retry.delay_us()).await;
            }
        }
        if retry.outcome() == Outcome::Exhausted {
            #[cfg(feature = "defmt")]
            defmt::warn!("chip did not wake up");
            return Err(Error::WrongState);
        }

        let dev_id = self.ll.dev_id().read().await?.value();
        if ChipVariant::from_dev_id(dev_id) != self.ctx.variant {
            return Err(Error::UnknownDevice(dev_id));
        }

        self.ctx.rx_buffer = 0;

        #[cfg(feature = "defmt")]
        defmt::debug!("awake");

        Ok(self.into_state(Ready))
    }
}
