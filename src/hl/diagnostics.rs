//! Event counters, LEDs, on-chip sensors and the dual SPI semaphore

use bitflags::bitflags;

use super::retry::{Outcome, Retry, POLL_DELAY_US, SHORT_JOB_POLLS};
use crate::{delay_type, maybe_async_attr, spi_type, Error, Ready, DW3000};

/// Register file of the dual SPI semaphore
pub(crate) const DUAL_SPI_FILE: u8 = 0x1A;
/// Semaphore control and owner
pub(crate) const DUAL_SPI_CTRL: u16 = 0x00;
/// Semaphore status, write 1 to clear
pub(crate) const DUAL_SPI_STATUS: u16 = 0x01;
/// Semaphore interrupt enables
pub(crate) const DUAL_SPI_INT_ENABLE: u8 = 0x02;

/// Default LED blink time, in 14 ms units
pub const LED_BLINK_TIME_DEFAULT: u8 = 0x10;

/// Temperature the OTP reference was taken at
const TEMP_REF_CELSIUS: f32 = 22.0;
/// Voltage the OTP reference was taken at
const VBAT_REF_VOLTS: f32 = 3.0;
/// Degrees per SAR count
const SAR_TEMP_TO_CELSIUS: f32 = 1.05;
/// SAR counts per volt
const SAR_VBAT_PER_VOLT: f32 = 173.0;

/// Second block of event counters, after EVC_COUNTERS
const EVC_PREJ: u16 = 0x1C;
const EVC_SFDD: u16 = 0x1E;

/// Snapshot of the event counters
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EventCounters {
    /// PHR errors
    pub phe: u16,
    /// Frame sync losses
    pub rsl: u16,
    /// Frames with a good CRC
    pub crcg: u16,
    /// Frames with a bad CRC
    pub crcb: u16,
    /// Frame filter rejections
    pub arfe: u8,
    /// RX buffer overruns
    pub over: u8,
    /// SFD timeouts
    pub sfdto: u16,
    /// Preamble timeouts
    pub pto: u16,
    /// Frame wait timeouts
    pub rto: u8,
    /// Frames sent
    pub txf: u16,
    /// Half period warnings
    pub hpw: u8,
    /// SPI write CRC errors
    pub crce: u8,
    /// Preamble rejections
    pub prej: u16,
    /// SFD detections, QM33xxx only
    pub sfdd: u16,
    /// STS errors and warnings
    pub stse: u8,
}

bitflags! {
    /// LED behaviour
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct LedMode: u8 {
        /// Drive the RX and TX LEDs from GPIO2 and GPIO3
        const ENABLE = 0x01;
        /// Blink both LEDs once
        const INIT_BLINK = 0x02;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for LedMode {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "LedMode({=u8:#x})", self.bits())
    }
}

/// Raw SAR readings
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TempVbat {
    /// Temperature count
    pub temp: u8,
    /// Battery voltage count
    pub vbat: u8,
}

impl TempVbat {
    /// Decodes the `temp << 8 | vbat` word of the SAR
    pub fn from_raw(raw: u16) -> Self {
        TempVbat {
            temp: (raw >> 8) as u8,
            vbat: raw as u8,
        }
    }
}

/// Converts a raw temperature reading to °C using the OTP reference
pub fn convert_raw_temperature(raw: u8, temp_ref: u8) -> f32 {
    (raw as f32 - temp_ref as f32) * SAR_TEMP_TO_CELSIUS + TEMP_REF_CELSIUS
}

/// Converts a raw battery reading to volts using the OTP reference
pub fn convert_raw_voltage(raw: u8, vbat_ref: u8) -> f32 {
    (raw as f32 - vbat_ref as f32) / SAR_VBAT_PER_VOLT + VBAT_REF_VOLTS
}

bitflags! {
    /// State of the dual SPI semaphore
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct DualSpiStatus: u8 {
        /// The semaphore became available to SPI2
        const SPI2_AVAILABLE = 0x02;
        /// The semaphore became available to SPI1
        const SPI1_AVAILABLE = 0x04;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for DualSpiStatus {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "DualSpiStatus({=u8:#x})", self.bits())
    }
}

/// Requests written to the semaphore control
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
enum SemaphoreRequest {
    Request = 0x01,
    Release = 0x02,
    Force = 0x04,
}

impl<SPI> DW3000<SPI, Ready>
where
    SPI: spi_type::spi::SpiDevice<u8>,
{
    /// Clears the event counters and enables or disables them
    #[maybe_async_attr]
    pub async fn configure_event_counters(&mut self, enable: bool) -> Result<(), Error<SPI>> {
        self.ll.evc_ctrl().write(|w| w.evc_clr(1)).await?;
        if enable {
            self.ll.evc_ctrl().write(|w| w.evc_en(1)).await?;
        }
        Ok(())
    }

    /// Reads all event counters
    #[maybe_async_attr]
    pub async fn read_event_counters(&mut self) -> Result<EventCounters, Error<SPI>> {
        let evc = self.ll.evc_counters().read().await?;
        let prej = self.ll.read16(0x0F, EVC_PREJ).await? & 0x0fff;
        let sfdd = match self.ctx.variant {
            Some(variant) if variant.has_equalizer() => {
                self.ll.read16(0x0F, EVC_SFDD).await? & 0x0fff
            }
            _ => 0,
        };

        Ok(EventCounters {
            phe: evc.phe(),
            rsl: evc.rse(),
            crcg: evc.fcg(),
            crcb: evc.fce(),
            arfe: evc.ffr(),
            over: evc.ovr(),
            sfdto: evc.sto(),
            pto: evc.pto(),
            rto: evc.fwto(),
            txf: evc.txfs(),
            hpw: evc.hpw(),
            crce: evc.swce(),
            prej,
            sfdd,
            stse: self.ll.evc_cpqe().read().await?.value(),
        })
    }

    /// Configures the RX and TX LEDs
    #[maybe_async_attr]
    pub async fn set_leds(&mut self, mode: LedMode) -> Result<(), Error<SPI>> {
        if mode.contains(LedMode::ENABLE) {
            self.ll
                .gpio_mode()
                .and_or(|w| w.msgp2(1).msgp3(1))
                .await?;
            self.ll
                .clk_ctrl()
                .and_or(|w| w.gpio_clk_en(1).gpio_dclk_en(1).gpio_drst_n(1))
                .await?;
            self.ll
                .led_ctrl()
                .write(|w| w.blink_en(1).blink_tim(LED_BLINK_TIME_DEFAULT))
                .await?;

            if mode.contains(LedMode::INIT_BLINK) {
                self.ll
                    .led_ctrl()
                    .and_or(|w| w.force_trig(0xf))
                    .await?;
                self.ll.led_ctrl().and_or(|w| w.force_trig(0)).await?;
            }
        } else {
            self.ll.led_ctrl().and_or(|w| w.blink_en(0)).await?;
            self.ll
                .gpio_mode()
                .and_or(|w| w.msgp2(0).msgp3(0))
                .await?;
        }
        Ok(())
    }

    /// Runs one SAR conversion of temperature and battery voltage
    #[maybe_async_attr]
    pub async fn read_temp_vbat<DELAY>(&mut self, delay: &mut DELAY) -> Result<TempVbat, Error<SPI>>
    where
        DELAY: delay_type::delay::DelayNs,
    {
        self.ll.sar_test().write(|w| w.sar_rdtemp(1)).await?;
        self.ll.sar_ctrl().write(|w| w.sar_start(1)).await?;

        let mut retry = Retry::new(SHORT_JOB_POLLS, POLL_DELAY_US);
        while retry.next_attempt() {
            if self.ll.sar_status().read().await?.sar_done() == 1 {
                retry.finish();
            } else {
                delay.delay_us(retry.delay_us()).await;
            }
        }

        let reading = self.ll.sar_reading().read().await?;
        self.ll.sar_ctrl().write(|w| w.sar_start(0)).await?;
        self.ll.sar_test().write(|w| w.sar_rdtemp(0)).await?;

        if retry.outcome() == Outcome::Exhausted {
            #[cfg(feature = "defmt")]
            defmt::warn!("SAR conversion did not complete");
            return Err(Error::WrongState);
        }

        Ok(TempVbat {
            temp: reading.sar_ltemp(),
            vbat: reading.sar_lvbat(),
        })
    }

    /// Chip temperature in °C
    #[maybe_async_attr]
    pub async fn read_temperature<DELAY>(&mut self, delay: &mut DELAY) -> Result<f32, Error<SPI>>
    where
        DELAY: delay_type::delay::DelayNs,
    {
        let raw = self.read_temp_vbat(delay).await?;
        Ok(convert_raw_temperature(raw.temp, self.ctx.otp.temp_ref))
    }

    /// Supply voltage in volts
    #[maybe_async_attr]
    pub async fn read_voltage<DELAY>(&mut self, delay: &mut DELAY) -> Result<f32, Error<SPI>>
    where
        DELAY: delay_type::delay::DelayNs,
    {
        let raw = self.read_temp_vbat(delay).await?;
        Ok(convert_raw_voltage(raw.vbat, self.ctx.otp.vbat_ref))
    }

    /// Raw temperature sampled on the last wake up
    #[maybe_async_attr]
    pub async fn read_wake_temp(&mut self) -> Result<u8, Error<SPI>> {
        Ok(self.ll.sar_wake_rd().read().await?.sar_wtemp())
    }

    /// Raw battery voltage sampled on the last wake up
    #[maybe_async_attr]
    pub async fn read_wake_vbat(&mut self) -> Result<u8, Error<SPI>> {
        Ok(self.ll.sar_wake_rd().read().await?.sar_wvbat())
    }

    #[maybe_async_attr]
    async fn semaphore(&mut self, request: SemaphoreRequest) -> Result<(), Error<SPI>> {
        if !self.ctx.variant.map_or(false, |v| v.has_dual_spi()) {
            return Err(Error::InvalidConfiguration);
        }
        self.ll
            .write8(DUAL_SPI_FILE, DUAL_SPI_CTRL, request as u8)
            .await?;
        Ok(())
    }

    /// Asks for the dual SPI semaphore
    ///
    /// Check [`DW3000::ds_sema_status`] to see whether it was granted.
    #[maybe_async_attr]
    pub async fn ds_sema_request(&mut self) -> Result<(), Error<SPI>> {
        self.semaphore(SemaphoreRequest::Request).await
    }

    /// Gives the dual SPI semaphore back
    #[maybe_async_attr]
    pub async fn ds_sema_release(&mut self) -> Result<(), Error<SPI>> {
        self.semaphore(SemaphoreRequest::Release).await
    }

    /// Takes the semaphore from the other host, SPI2 only
    #[maybe_async_attr]
    pub async fn ds_sema_force(&mut self) -> Result<(), Error<SPI>> {
        self.semaphore(SemaphoreRequest::Force).await
    }

    /// Owner bits of the semaphore
    #[maybe_async_attr]
    pub async fn ds_sema_status(&mut self) -> Result<u8, Error<SPI>> {
        if !self.ctx.variant.map_or(false, |v| v.has_dual_spi()) {
            return Err(Error::InvalidConfiguration);
        }
        Ok(self.ll.read8(DUAL_SPI_FILE, DUAL_SPI_CTRL).await?)
    }

    /// Availability events of the semaphore
    #[maybe_async_attr]
    pub async fn ds_sema_status_hi(&mut self) -> Result<DualSpiStatus, Error<SPI>> {
        if !self.ctx.variant.map_or(false, |v| v.has_dual_spi()) {
            return Err(Error::InvalidConfiguration);
        }
        let raw = self.ll.read8(DUAL_SPI_FILE, DUAL_SPI_STATUS).await?;
        Ok(DualSpiStatus::from_bits_truncate(raw))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hl::{fake::FakeChip, InitSkip};

    use embedded_hal_mock::eh1::delay::NoopDelay;

    async fn ready(chip: FakeChip) -> DW3000<FakeChip, Ready> {
        DW3000::new(chip)
            .initialise(&mut NoopDelay::new(), InitSkip::empty())
            .await
            .unwrap()
    }

    #[test]
    fn sensor_conversions() {
        assert_eq!(convert_raw_temperature(0x85, 0x85), 22.0);
        assert!((convert_raw_temperature(0x8f, 0x85) - 32.5).abs() < 1e-4);
        assert_eq!(convert_raw_voltage(0x74, 0x74), 3.0);
        assert!((convert_raw_voltage(0x74 - 173 / 2, 0x74) - 2.5).abs() < 0.01);

        let raw = TempVbat::from_raw(0x8574);
        assert_eq!(raw.temp, 0x85);
        assert_eq!(raw.vbat, 0x74);
    }

    #[tokio::test]
    async fn event_counters() {
        let mut chip = FakeChip::healthy(0xDECA_0304);
        chip.set16(0x0F, 0x04, 3);
        chip.set16(0x0F, 0x08, 42);
        chip.set16(0x0F, 0x16, 7);
        chip.set16(0x0F, 0x1C, 0xf005);
        chip.set16(0x0F, 0x1E, 9);
        chip.set8(0x0F, 0x28, 2);
        let mut dw3000 = ready(chip).await;

        dw3000.configure_event_counters(true).await.unwrap();
        assert_eq!(dw3000.ll().bus().get8(0x0F, 0x00), 0x01);

        let counters = dw3000.read_event_counters().await.unwrap();
        assert_eq!(counters.phe, 3);
        assert_eq!(counters.crcg, 42);
        assert_eq!(counters.txf, 7);
        assert_eq!(counters.prej, 5);
        assert_eq!(counters.sfdd, 9);
        assert_eq!(counters.stse, 2);
    }

    #[tokio::test]
    async fn sar_reading() {
        let mut chip = FakeChip::healthy(0xDECA_0302);
        chip.set8(0x08, 0x04, 0x01);
        chip.set16(0x08, 0x08, 0x8f74);
        let mut dw3000 = ready(chip).await;

        let raw = dw3000.read_temp_vbat(&mut NoopDelay::new()).await.unwrap();
        assert_eq!(raw, TempVbat::from_raw(0x8f74));
        assert_eq!(dw3000.ll().bus().get8(0x08, 0x00), 0);
    }

    #[tokio::test]
    async fn stuck_sar_is_reported() {
        let mut dw3000 = ready(FakeChip::healthy(0xDECA_0302)).await;
        let result = dw3000.read_temperature(&mut NoopDelay::new()).await;
        assert!(matches!(result, Err(Error::WrongState)));
    }

    #[tokio::test]
    async fn leds() {
        let mut dw3000 = ready(FakeChip::healthy(0xDECA_0302)).await;

        dw3000
            .set_leds(LedMode::ENABLE | LedMode::INIT_BLINK)
            .await
            .unwrap();
        assert_eq!(dw3000.ll().bus().get32(0x05, 0x00) & 0xfc0, 0x240);
        assert_eq!(dw3000.ll().bus().get32(0x11, 0x16), 0x0110);

        dw3000.set_leds(LedMode::empty()).await.unwrap();
        assert_eq!(dw3000.ll().bus().get32(0x05, 0x00) & 0xfc0, 0);
        assert_eq!(dw3000.ll().bus().get32(0x11, 0x16) & 0x100, 0);
    }

    #[tokio::test]
    async fn semaphore_needs_a_second_port() {
        let mut dw3000 = ready(FakeChip::healthy(0xDECA_0302)).await;
        assert!(matches!(
            dw3000.ds_sema_request().await,
            Err(Error::InvalidConfiguration)
        ));

        let mut chip = FakeChip::healthy(0xDECA_0314);
        chip.set8(0x1A, 0x01, 0x04);
        let mut dw3000 = ready(chip).await;
        dw3000.ds_sema_request().await.unwrap();
        assert_eq!(dw3000.ll().bus().get8(0x1A, 0x00), 0x01);
        assert_eq!(
            dw3000.ds_sema_status_hi().await.unwrap(),
            DualSpiStatus::SPI1_AVAILABLE
        );
    }
}
