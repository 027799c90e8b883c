//! Linear TX power control
//!
//! A power index counts 0.25 dB steps down from the strongest setting the
//! chip supports on a channel. The four bytes of TX_POWER set the power of
//! the data, PHR, SHR and STS segments, in that order.

use crate::{configs::UwbChannel, maybe_async_attr, spi_type, Error, Ready, DW3000};

/// PLL bias trim the chip resets to
pub const DEFAULT_PLL_BIAS_TRIM: u8 = 7;

/// Largest boost in 0.1 dB on channel 5
pub const MAX_BOOST_CH5: u16 = 354;
/// Largest boost in 0.1 dB on channel 9
pub const MAX_BOOST_CH9: u16 = 305;

/// PLL_COMMON, the bias trim sits in the low bits
const PLL_COMMON_OFFSET: u8 = 0x18;
const PLL_BIAS_MASK: u8 = 0x1f;

/// TX_POWER bytes for channel 5, one per 0.25 dB step
const CH5_POWER: [u8; 46] = [
    0xfe, 0xf2, 0xe6, 0xda, 0xce, 0xc2, 0xb6, 0xaa, 0x9e, 0x92, 0x86, 0x9d, 0x91, 0x85, 0x7d,
    0x79, 0x75, 0x71, 0x6d, 0x69, 0x65, 0x61, 0x5d, 0x59, 0x55, 0x51, 0x4d, 0x49, 0x45, 0x41,
    0x3d, 0x39, 0x35, 0x31, 0x2d, 0x29, 0x25, 0x21, 0x1d, 0x19, 0x15, 0x11, 0x0d, 0x09, 0x05,
    0x01,
];

/// TX_POWER bytes for channel 9, one per 0.25 dB step
const CH9_POWER: [u8; 41] = [
    0xfe, 0xf6, 0xee, 0xe6, 0xde, 0xd6, 0xce, 0xc6, 0xc1, 0xbd, 0xb9, 0xb5, 0xb1, 0xad, 0xa9,
    0xa5, 0xa1, 0x9d, 0x99, 0x95, 0x91, 0x8d, 0x89, 0x85, 0x81, 0x7d, 0x79, 0x75, 0x71, 0x6d,
    0x69, 0x65, 0x61, 0x5d, 0x59, 0x55, 0x51, 0x4d, 0x49, 0x45, 0x41,
];

fn power_table(channel: UwbChannel) -> &'static [u8] {
    match channel {
        UwbChannel::Channel5 => &CH5_POWER,
        UwbChannel::Channel9 => &CH9_POWER,
    }
}

/// Largest power index usable on `channel`
pub fn max_power_index(channel: UwbChannel) -> u8 {
    (power_table(channel).len() - 1) as u8
}

/// Segments of a frame that have their own TX power
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PowerSegment {
    /// Payload
    Data = 0,
    /// PHY header
    Phr = 1,
    /// Preamble and SFD
    Shr = 2,
    /// Scrambled timestamp sequence
    Sts = 3,
}

/// Result of [`calculate_linear_tx_power`]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinearTxPower {
    /// Value for TX_POWER
    pub tx_power: u32,
    /// PLL bias trim to use while transmitting
    pub pll_bias: u8,
    /// Indexes actually applied, per [`PowerSegment`]
    pub applied: [u8; 4],
}

/// Finds the power index of a TX_POWER byte
///
/// Returns `None` if the byte is not one of the characterised settings of
/// the channel.
pub fn convert_tx_power_to_index(channel: UwbChannel, tx_power: u8) -> Option<u8> {
    power_table(channel)
        .iter()
        .position(|&b| b == tx_power)
        .map(|i| i as u8)
}

/// Computes the TX_POWER word for one power index per segment
///
/// Indexes past the end of the channel's range are clamped to the weakest
/// setting. The clamped indexes are reported in `applied`.
pub fn calculate_linear_tx_power(channel: UwbChannel, indexes: [u8; 4]) -> LinearTxPower {
    let table = power_table(channel);
    let max = max_power_index(channel);

    let mut applied = [0; 4];
    let mut tx_power = 0u32;
    for (segment, index) in indexes.iter().enumerate() {
        let index = (*index).min(max);
        applied[segment] = index;
        tx_power |= (table[index as usize] as u32) << (8 * segment);
    }

    LinearTxPower {
        tx_power,
        pll_bias: DEFAULT_PLL_BIAS_TRIM,
        applied,
    }
}

/// Boosts a reference TX power setting
///
/// `ref_tx_power` is the setting for a 1 ms frame, `boost` is in 0.1 dB and
/// capped at the channel maximum. Every segment is raised by the same number
/// of steps, as many as the strongest segment allows. Returns the new setting
/// and the boost actually applied, or `None` if a byte of `ref_tx_power` is
/// not a characterised setting.
pub fn adjust_tx_power(boost: u16, ref_tx_power: u32, channel: UwbChannel) -> Option<(u32, u16)> {
    let max_boost = match channel {
        UwbChannel::Channel5 => MAX_BOOST_CH5,
        UwbChannel::Channel9 => MAX_BOOST_CH9,
    };
    let boost = boost.min(max_boost);

    let mut indexes = [0; 4];
    for (segment, byte) in ref_tx_power.to_le_bytes().iter().enumerate() {
        indexes[segment] = convert_tx_power_to_index(channel, *byte)?;
    }

    // one step is 2.5 tenths of a dB
    let wanted = (boost as u32 * 2 / 5) as u8;
    let steps = indexes.iter().fold(wanted, |steps, &index| steps.min(index));

    for index in indexes.iter_mut() {
        *index -= steps;
    }
    let result = calculate_linear_tx_power(channel, indexes);

    Some((result.tx_power, steps as u16 * 5 / 2))
}

impl<SPI> DW3000<SPI, Ready>
where
    SPI: spi_type::spi::SpiDevice<u8>,
{
    /// Sets the PLL bias trim
    ///
    /// The receiver wants [`DEFAULT_PLL_BIAS_TRIM`].
    #[maybe_async_attr]
    pub async fn set_pll_bias_trim(&mut self, trim: u8) -> Result<(), Error<SPI>> {
        self.ll
            .and_or8(0x09, PLL_COMMON_OFFSET, !PLL_BIAS_MASK, trim & PLL_BIAS_MASK)
            .await?;
        Ok(())
    }

    /// Programs TX_POWER directly
    #[maybe_async_attr]
    pub async fn set_tx_power(&mut self, tx_power: u32) -> Result<(), Error<SPI>> {
        self.ll.tx_power().write(|w| w.value(tx_power)).await?;
        Ok(())
    }

    /// Applies one power index per segment on the configured channel
    #[maybe_async_attr]
    pub async fn set_linear_tx_power(
        &mut self,
        indexes: [u8; 4],
    ) -> Result<LinearTxPower, Error<SPI>> {
        let result = calculate_linear_tx_power(self.ctx.config.channel, indexes);

        #[cfg(feature = "defmt")]
        if result.applied != indexes {
            defmt::debug!("TX power indexes clamped to {:?}", result.applied);
        }

        self.set_tx_power(result.tx_power).await?;
        self.set_pll_bias_trim(result.pll_bias).await?;
        Ok(result)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn exact_setting_is_found() {
        let index = convert_tx_power_to_index(UwbChannel::Channel5, 0xc2);
        assert_eq!(index, Some(5));

        let result = calculate_linear_tx_power(UwbChannel::Channel5, [5; 4]);
        assert_eq!(result.tx_power, 0xc2c2_c2c2);
        assert_eq!(result.pll_bias, 7);
        assert_eq!(result.applied, [5; 4]);
    }

    #[test]
    fn characterised_settings_convert() {
        for byte in [
            0x5d, 0x61, 0x65, 0x69, 0x6d, 0x71, 0x75, 0x79, 0x7d, 0x85, 0x9d,
        ] {
            let index = convert_tx_power_to_index(UwbChannel::Channel5, byte);
            assert!(index.is_some(), "channel 5, {:#x}", byte);
            let result = calculate_linear_tx_power(UwbChannel::Channel5, [index.unwrap(); 4]);
            assert_eq!(result.tx_power, u32::from_le_bytes([byte; 4]));
        }

        for byte in [
            0x79, 0x7d, 0x85, 0x91, 0x95, 0x99, 0x9d, 0xa1, 0xa5, 0xa9, 0xad, 0xb1, 0xb5, 0xb9,
            0xc1,
        ] {
            let index = convert_tx_power_to_index(UwbChannel::Channel9, byte);
            assert!(index.is_some(), "channel 9, {:#x}", byte);
            let result = calculate_linear_tx_power(UwbChannel::Channel9, [index.unwrap(); 4]);
            assert_eq!(result.tx_power, u32::from_le_bytes([byte; 4]));
        }

        assert_eq!(convert_tx_power_to_index(UwbChannel::Channel5, 0x00), None);
    }

    #[test]
    fn indexes_past_the_range_are_clamped() {
        let max = max_power_index(UwbChannel::Channel9);
        let result = calculate_linear_tx_power(UwbChannel::Channel9, [0, 3, 200, max]);

        assert_eq!(result.applied, [0, 3, max, max]);
        assert_eq!(result.tx_power & 0xff, 0xfe);
    }

    #[test]
    fn boost_is_capped_per_channel() {
        let weakest = calculate_linear_tx_power(UwbChannel::Channel5, [45; 4]).tx_power;
        let (_, applied) = adjust_tx_power(1000, weakest, UwbChannel::Channel5).unwrap();
        assert!(applied <= MAX_BOOST_CH5);

        let weakest = calculate_linear_tx_power(UwbChannel::Channel9, [40; 4]).tx_power;
        let (_, applied) = adjust_tx_power(1000, weakest, UwbChannel::Channel9).unwrap();
        assert!(applied <= MAX_BOOST_CH9);
    }

    #[test]
    fn boost_moves_every_segment() {
        // 1 dB is four steps
        let reference = calculate_linear_tx_power(UwbChannel::Channel5, [9, 9, 10, 9]).tx_power;
        let (boosted, applied) = adjust_tx_power(10, reference, UwbChannel::Channel5).unwrap();

        assert_eq!(applied, 10);
        assert_eq!(
            boosted,
            calculate_linear_tx_power(UwbChannel::Channel5, [5, 5, 6, 5]).tx_power
        );
    }

    #[test]
    fn boost_stops_at_full_power() {
        let reference = calculate_linear_tx_power(UwbChannel::Channel5, [2, 8, 8, 8]).tx_power;
        let (boosted, applied) = adjust_tx_power(90, reference, UwbChannel::Channel5).unwrap();

        assert_eq!(applied, 5);
        assert_eq!(
            boosted,
            calculate_linear_tx_power(UwbChannel::Channel5, [0, 6, 6, 6]).tx_power
        );
        assert_eq!(adjust_tx_power(10, 0x0000_0000, UwbChannel::Channel5), None);
    }

    #[tokio::test]
    async fn linear_power_is_programmed() {
        use crate::hl::{fake::FakeChip, InitSkip};
        use embedded_hal_mock::eh1::delay::NoopDelay;

        let mut chip = FakeChip::healthy(0xDECA_0302);
        chip.set8(0x09, 0x18, 0xe0);
        let mut dw3000 = DW3000::new(chip)
            .initialise(&mut NoopDelay::new(), InitSkip::empty())
            .await
            .unwrap();

        let result = dw3000.set_linear_tx_power([5, 5, 5, 99]).await.unwrap();

        assert_eq!(result.applied, [5, 5, 5, 45]);
        assert_eq!(dw3000.ll().bus().get32(0x01, 0x0C), 0x01c2_c2c2);
        assert_eq!(dw3000.ll().bus().get8(0x09, 0x18), 0xe7);
    }
}
