//! Clock offset of the remote transmitter
//!
//! Two estimates are available after a reception: the carrier recovery
//! integrator of the receiver and the clock offset the CIA derives from the
//! preamble. For both a positive value means the local clock runs slower than
//! the remote one.

use crate::{configs::UwbChannel, maybe_async_attr, spi_type, Error, Ready, DW3000};

/// F_S / 2 / N_samples / 2^17, with N_samples = 1024
const FREQ_OFFSET_MULTIPLIER: f64 = 998.4e6 / 2.0 / 1024.0 / 131072.0;

/// The clock offset register counts in 2^-26
const CLOCK_OFFSET_SCALE: f32 = (1u32 << 26) as f32;

/// Carrier frequency offset of the received message
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CarrierFreqOffset {
    /// Offset in Hertz
    pub f_offset_hz: f64,

    /// Offset in ppm of the channel's center frequency, with the sign of
    /// [`DW3000::read_clock_offset`]
    pub f_offset_ppm: f64,
}

impl CarrierFreqOffset {
    /// Converts the sign extended carrier integrator on `channel`
    pub fn from_integrator(integrator: i32, channel: UwbChannel) -> Self {
        let f_offset_hz = integrator as f64 * FREQ_OFFSET_MULTIPLIER;
        Self::from_f_offset_hz(f_offset_hz, channel.center_frequency_hz())
    }

    /// Relates an offset in Hertz to the center frequency `f_c`
    pub fn from_f_offset_hz(f_offset_hz: f64, f_c: u64) -> Self {
        CarrierFreqOffset {
            f_offset_hz,
            f_offset_ppm: 1e6 * f_offset_hz / f_c as f64,
        }
    }
}

/// Converts the value of [`DW3000::read_clock_offset`] to ppm
pub fn clock_offset_ppm(offset: i16) -> f32 {
    offset as f32 / CLOCK_OFFSET_SCALE * 1e6
}

impl<SPI> DW3000<SPI, Ready>
where
    SPI: spi_type::spi::SpiDevice<u8>,
{
    /// Carrier recovery integrator of the last frame, 21 bits sign extended
    #[maybe_async_attr]
    pub async fn read_carrier_integrator(&mut self) -> Result<i32, Error<SPI>> {
        let raw = self.ll.drx_car_int().read().await?.value();
        Ok(((raw << 11) as i32) >> 11)
    }

    /// Carrier frequency offset of the last frame on the configured channel
    #[maybe_async_attr]
    pub async fn read_carrier_freq_offset(&mut self) -> Result<CarrierFreqOffset, Error<SPI>> {
        let integrator = self.read_carrier_integrator().await?;
        Ok(CarrierFreqOffset::from_integrator(
            integrator,
            self.ctx.config.channel,
        ))
    }

    /// Clock offset estimated by the CIA, in 2^-26 units
    #[maybe_async_attr]
    pub async fn read_clock_offset(&mut self) -> Result<i16, Error<SPI>> {
        let raw = self.ll.cia_diag_0().read().await?.coe_ppm();
        Ok(((raw << 3) as i16) >> 3)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hl::{fake::FakeChip, InitSkip};

    use embedded_hal_mock::eh1::delay::NoopDelay;

    #[test]
    fn offset_in_ppm() {
        let offset = CarrierFreqOffset::from_f_offset_hz(6489.6, 6_489_600_000);
        assert!((offset.f_offset_ppm - 1.0).abs() < 1e-9);

        assert_eq!(clock_offset_ppm(0), 0.0);
        assert!((clock_offset_ppm(671) - 10.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn negative_offsets_are_sign_extended() {
        let mut chip = FakeChip::healthy(0xDECA_0302);
        // -2 in 21 bits
        chip.set_bytes(0x06, 0x29, &[0xfe, 0xff, 0x1f]);
        // -3 in 13 bits
        chip.set16(0x0C, 0x20, 0x1ffd);
        let mut dw3000 = DW3000::new(chip)
            .initialise(&mut NoopDelay::new(), InitSkip::empty())
            .await
            .unwrap();

        assert_eq!(dw3000.read_carrier_integrator().await.unwrap(), -2);
        assert_eq!(dw3000.read_clock_offset().await.unwrap(), -3);

        let offset = dw3000.read_carrier_freq_offset().await.unwrap();
        assert!(offset.f_offset_hz < 0.0);
        assert!((offset.f_offset_hz + 2.0 * FREQ_OFFSET_MULTIPLIER).abs() < 1e-9);
    }
}
