//! PHY configuration
//!
//! `configure` programs a complete [`Config`] and recalibrates the receiver.
//! The setters below change one aspect of the configuration without going
//! through the full sequence; they keep the cached configuration in sync.

use crate::{
    configs::{BitRate, Config, PdoaMode, PhrMode, PhrRate, Prf, StsLength, StsMode, TxConfig, UwbChannel},
    delay_type,
    ll::SpiCrcMode,
    maybe_async_attr, spi_type, Error, Ready, DW3000,
};

use super::{
    otp::DGC_CFG0_VALUE,
    retry::{Outcome, Retry, POLL_DELAY_US, SHORT_JOB_POLLS},
    DwState,
};

/// DGC_CFG1 value of the reference tuning
const DGC_CFG1_VALUE: u32 = 0x1b6d_a489;
/// DGC threshold for 64 MHz PRF
const DGC_THR_64: u8 = 0x32;
/// First of the seven DGC lookup table words
const DGC_LUT_OFFSET: u16 = 0x38;

/// DTUNE3 when the STS is used
const DTUNE3_STS: u32 = 0xaf5f_35cc;
/// DTUNE3 without STS
const DTUNE3_DEFAULT: u32 = 0xaf5f_584c;

const RF_RX_CTRL_HI_CH9: u32 = 0x08b5_a833;
pub(super) const LDO_RLOAD_VALUE: u8 = 0x14;
pub(super) const RF_TX_CTRL_1_VALUE: u8 = 0x0e;
/// Loop filter setting and calibration enable used before the PLL locks
pub(super) const PLL_CAL_CONFIG: u8 = 0x81;

/// STS minimum threshold scaling for the eight STS lengths, `1024 * sqrt(2)^n`
const STS_LENGTH_FACTORS: [u32; 8] = [1024, 1448, 2048, 2896, 4096, 5793, 8192, 11585];
const STS_THRESHOLD_64: u32 = 0x10;
const SQRT_FACTOR: u32 = 181;
const SQRT_SHIFT: u32 = 7;
const THRESHOLD_SHIFT: u32 = 11;
/// 60 % in Q15, the share of the length factor a good STS reaches
const STS_QUALITY_SHARE_Q15: u32 = 19661;

/// Minimum STS correlation threshold for an STS length
///
/// PDoA mode 3 splits the STS in two halves, each half uses the threshold of
/// the full length divided by sqrt(2).
pub fn sts_min_threshold(length: StsLength, pdoa_mode: PdoaMode) -> u8 {
    let mut value = STS_LENGTH_FACTORS[length.index()] * STS_THRESHOLD_64;
    if pdoa_mode != PdoaMode::Mode3 {
        value = (value * SQRT_FACTOR) >> SQRT_SHIFT;
    }

    // round to nearest
    let rounded = (value + (1 << (THRESHOLD_SHIFT - 1))) >> THRESHOLD_SHIFT;
    rounded.min(u8::MAX as u32) as u8
}

/// Lowest STS quality index of a good STS reception for an STS length
pub(crate) fn sts_quality_threshold(length: StsLength) -> i16 {
    ((STS_LENGTH_FACTORS[length.index()] * STS_QUALITY_SHARE_Q15) >> 15) as i16
}

impl<SPI> DW3000<SPI, Ready>
where
    SPI: spi_type::spi::SpiDevice<u8>,
{
    /// Applies a full PHY configuration
    ///
    /// Locks the PLL and runs the receiver calibration afterwards. Any
    /// calibration error means the receiver can't be trusted; reset the chip
    /// and start over.
    #[maybe_async_attr]
    pub async fn configure<DELAY>(
        &mut self,
        delay: &mut DELAY,
        config: Config,
    ) -> Result<(), Error<SPI>>
    where
        DELAY: delay_type::delay::DelayNs,
    {
        config.validate()?;

        #[cfg(feature = "defmt")]
        defmt::debug!("configure: {:?}", config);

        let sts_on = config.sts_mode != StsMode::Off;

        self.ll
            .sys_cfg()
            .and_or(|w| {
                w.phr_mode(config.phr_mode as u8)
                    .phr_6m8(config.phr_rate as u8)
                    .cp_spc(config.sts_mode as u8)
                    .cp_sdc(config.sts_sdc as u8)
                    .pdoa_mode(config.pdoa_mode as u8)
                    .cia_ipatov(1)
                    .cia_sts(sts_on as u8)
            })
            .await?;

        self.ll
            .sts_cfg()
            .write(|w| w.cps_len(config.sts_length as u8))
            .await?;
        self.ll
            .sts_conf_1()
            .modify(|_, w| w.res_b0(sts_min_threshold(config.sts_length, config.pdoa_mode)))
            .await?;
        self.ll
            .dtune3()
            .write(|w| w.value(if sts_on { DTUNE3_STS } else { DTUNE3_DEFAULT }))
            .await?;

        self.ll
            .dtune0()
            .and_or(|w| w.pac(config.pac as u8).dt0b4(0))
            .await?;
        self.ll
            .rx_sfd_toc()
            .write(|w| w.value(config.effective_sfd_timeout()))
            .await?;

        self.ll
            .tx_fctrl()
            .modify(|_, w| {
                w.txbr(config.bitrate as u8)
                    .txpsr(config.preamble_length.txpsr())
                    .fine_plen(config.preamble_length.fine_plen())
            })
            .await?;

        self.ll
            .chan_ctrl()
            .write(|w| {
                w.rf_chan(config.channel as u8)
                    .sfd_type(config.sfd_type as u8)
                    .tx_pcode(config.tx_preamble_code)
                    .rx_pcode(config.rx_preamble_code)
            })
            .await?;

        self.configure_rf(config.channel).await?;
        self.configure_dgc(config.channel, config.prf()).await?;

        self.ll
            .ldo_rload()
            .write(|w| w.value(LDO_RLOAD_VALUE))
            .await?;
        self.ll
            .rf_tx_ctrl_1()
            .write(|w| w.value(RF_TX_CTRL_1_VALUE))
            .await?;
        self.ll.write8(0x09, 0x08, PLL_CAL_CONFIG).await?;

        self.ctx.config = config;
        self.ctx.sts_quality_threshold = sts_quality_threshold(config.sts_length);

        self.ll.sys_status().write(|w| w.cplock(1)).await?;
        self.set_dw_state(delay, DwState::Idle).await?;

        self.pgf_cal(delay, true).await?;
        if self.ctx.variant.map_or(false, |v| v.has_equalizer()) {
            self.adc_offset_cal(delay).await?;
        }

        Ok(())
    }

    /// Applies the transmitter RF configuration
    ///
    /// A nonzero `pg_count` runs the pulse generator calibration against that
    /// target, which overrides `pg_delay`.
    #[maybe_async_attr]
    pub async fn configure_tx_rf<DELAY>(
        &mut self,
        delay: &mut DELAY,
        config: &TxConfig,
    ) -> Result<(), Error<SPI>>
    where
        DELAY: delay_type::delay::DelayNs,
    {
        if config.pg_count == 0 {
            self.ll
                .rf_tx_ctrl_2()
                .and_or(|w| w.pg_delay(config.pg_delay))
                .await?;
        } else {
            self.calibrate_pg_delay(delay, config.pg_count).await?;
        }

        self.ll
            .tx_power()
            .write(|w| w.value(config.power))
            .await?;

        Ok(())
    }

    /// Lets the chip find the pulse generator delay that meets `target`
    ///
    /// Returns the delay it settled on.
    #[maybe_async_attr]
    pub async fn calibrate_pg_delay<DELAY>(
        &mut self,
        delay: &mut DELAY,
        target: u16,
    ) -> Result<u8, Error<SPI>>
    where
        DELAY: delay_type::delay::DelayNs,
    {
        self.ll
            .pg_cal_target()
            .write(|w| w.value(target))
            .await?;
        self.ll
            .pgc_ctrl()
            .and_or(|w| w.pg_start(1).pgc_auto_cal(1))
            .await?;

        let mut retry = Retry::new(SHORT_JOB_POLLS, POLL_DELAY_US);
        while retry.next_attempt() {
            delay.delay_us(retry.delay_us()).await;
            if self.ll.pgc_status().read().await?.autocal_done() == 1 {
                retry.finish();
            }
        }

        self.ll.pgc_ctrl().and_or(|w| w.pg_start(0)).await?;

        if retry.outcome() == Outcome::Exhausted {
            return Err(Error::WrongState);
        }

        Ok(self.ll.rf_tx_ctrl_2().read().await?.pg_delay())
    }

    /// Sets the data rate of transmitted frames
    #[maybe_async_attr]
    pub async fn set_data_rate(&mut self, bitrate: BitRate) -> Result<(), Error<SPI>> {
        self.ll
            .tx_fctrl()
            .modify(|_, w| w.txbr(bitrate as u8))
            .await?;
        self.ctx.config.bitrate = bitrate;
        Ok(())
    }

    /// Sets the PHR format and rate
    #[maybe_async_attr]
    pub async fn set_phr_mode(&mut self, mode: PhrMode, rate: PhrRate) -> Result<(), Error<SPI>> {
        self.ll
            .sys_cfg()
            .and_or(|w| w.phr_mode(mode as u8).phr_6m8(rate as u8))
            .await?;
        self.ctx.config.phr_mode = mode;
        self.ctx.config.phr_rate = rate;
        Ok(())
    }

    /// Sets the offset the CIA adds to every PDoA result
    #[maybe_async_attr]
    pub async fn set_pdoa_offset(&mut self, offset: u16) -> Result<(), Error<SPI>> {
        self.ll
            .cia_adjust()
            .and_or(|w| w.value(offset & 0x3fff))
            .await?;
        Ok(())
    }

    /// Switches the SPI CRC on or off, on both sides of the bus
    ///
    /// Read mismatches are reported through
    /// [`EventKind::SpiReadError`](crate::hl::EventKind::SpiReadError) by the
    /// next [`DW3000::isr`], write mismatches through
    /// [`EventKind::SpiError`](crate::hl::EventKind::SpiError).
    #[maybe_async_attr]
    pub async fn set_spi_crc(&mut self, mode: SpiCrcMode) -> Result<(), Error<SPI>> {
        let enable = (mode != SpiCrcMode::Off) as u8;
        // still under the old mode
        self.ll.sys_cfg().and_or(|w| w.spi_crcen(enable)).await?;
        self.ll.set_crc_mode(mode);
        Ok(())
    }

    /// Turns the CIA equaliser on or off
    ///
    /// Only for frames from transmitters using a root raised cosine pulse.
    /// The chip default is off.
    #[maybe_async_attr]
    pub async fn set_equalizer(&mut self, enable: bool) -> Result<(), Error<SPI>> {
        if !self.ctx.variant.map_or(false, |v| v.has_equalizer()) {
            return Err(Error::InvalidConfiguration);
        }
        self.ll.cia_conf().and_or(|w| w.eq_en(enable as u8)).await?;
        Ok(())
    }

    /// Selects the PDoA mode
    ///
    /// Mode 3 needs the STS to be on and a multiple of 128 symbols long.
    #[maybe_async_attr]
    pub async fn set_pdoa_mode(&mut self, mode: PdoaMode) -> Result<(), Error<SPI>> {
        let config = Config {
            pdoa_mode: mode,
            ..self.ctx.config
        };
        config.validate()?;

        self.ll
            .sys_cfg()
            .and_or(|w| w.pdoa_mode(mode as u8))
            .await?;
        self.ctx.config = config;
        self.ctx.sts_quality_threshold = sts_quality_threshold(config.sts_length);
        Ok(())
    }

    /// Changes the STS length, the minimum threshold follows
    #[maybe_async_attr]
    pub async fn set_sts_length(&mut self, length: StsLength) -> Result<(), Error<SPI>> {
        let config = Config {
            sts_length: length,
            ..self.ctx.config
        };
        config.validate()?;

        self.ll
            .sts_cfg()
            .write(|w| w.cps_len(length as u8))
            .await?;
        self.ll
            .sts_conf_1()
            .modify(|_, w| w.res_b0(sts_min_threshold(length, config.pdoa_mode)))
            .await?;
        self.ctx.config = config;
        self.ctx.sts_quality_threshold = sts_quality_threshold(config.sts_length);
        Ok(())
    }

    /// Programs the 128-bit STS key
    #[maybe_async_attr]
    pub async fn set_sts_key(&mut self, key: u128) -> Result<(), Error<SPI>> {
        self.ll.sts_key().write(|w| w.value(key)).await?;
        Ok(())
    }

    /// Programs the 128-bit STS IV
    ///
    /// The counter picks it up with the next [`DW3000::load_sts_iv`].
    #[maybe_async_attr]
    pub async fn set_sts_iv(&mut self, iv: u128) -> Result<(), Error<SPI>> {
        self.ll.sts_iv().write(|w| w.value(iv)).await?;
        Ok(())
    }

    /// Reloads the STS counter from the IV registers
    #[maybe_async_attr]
    pub async fn load_sts_iv(&mut self) -> Result<(), Error<SPI>> {
        self.ll
            .sts_ctrl()
            .write(|w| w.load_iv(1).rst_last(0))
            .await?;
        Ok(())
    }

    /// Switches to another channel and relocks the PLL
    #[maybe_async_attr]
    pub async fn set_channel<DELAY>(
        &mut self,
        delay: &mut DELAY,
        channel: UwbChannel,
    ) -> Result<(), Error<SPI>>
    where
        DELAY: delay_type::delay::DelayNs,
    {
        self.ll
            .chan_ctrl()
            .and_or(|w| w.rf_chan(channel as u8))
            .await?;
        self.configure_rf(channel).await?;
        self.configure_dgc(channel, self.ctx.config.prf()).await?;

        self.ctx.config.channel = channel;

        self.ll.sys_status().write(|w| w.cplock(1)).await?;
        self.set_dw_state(delay, DwState::Idle).await
    }

    /// Channel dependent RF tuning
    #[maybe_async_attr]
    pub(super) async fn configure_rf(&mut self, channel: UwbChannel) -> Result<(), Error<SPI>> {
        self.ll
            .rf_tx_ctrl_2()
            .write(|w| w.value(channel.rf_tx_ctrl_2()))
            .await?;
        self.ll
            .pll_cfg()
            .write(|w| w.value(channel.pll_cfg()))
            .await?;
        if channel == UwbChannel::Channel9 {
            self.ll
                .rf_rx_ctrl_hi()
                .write(|w| w.value(RF_RX_CTRL_HI_CH9))
                .await?;
        }
        Ok(())
    }

    /// Digital gain control, only used with 64 MHz PRF
    #[maybe_async_attr]
    pub(super) async fn configure_dgc(&mut self, channel: UwbChannel, prf: Prf) -> Result<(), Error<SPI>> {
        if prf != Prf::Mhz64 {
            self.ll.dgc_cfg().and_or(|w| w.rx_tune_en(0)).await?;
            return Ok(());
        }

        if self.ctx.otp.dgc_from_otp {
            self.ll
                .otp_cfg()
                .and_or(|w| w.dgc_kick(1).dgc_sel(channel as u8))
                .await?;
        } else {
            for (i, word) in channel.dgc_lut().iter().enumerate() {
                self.ll
                    .write32(0x03, DGC_LUT_OFFSET + 4 * i as u16, *word)
                    .await?;
            }
            self.ll
                .dgc_cfg0()
                .write(|w| w.value(DGC_CFG0_VALUE))
                .await?;
            self.ll
                .dgc_cfg1()
                .write(|w| w.value(DGC_CFG1_VALUE))
                .await?;
        }

        self.ll
            .dgc_cfg()
            .and_or(|w| w.rx_tune_en(1).thr_64(DGC_THR_64))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        configs::{PacSize, PreambleLength, SfdSequence},
        hl::{fake::FakeChip, InitSkip},
    };

    use embedded_hal_mock::eh1::delay::NoopDelay;

    async fn ready(chip: FakeChip) -> DW3000<FakeChip, Ready> {
        DW3000::new(chip)
            .initialise(&mut NoopDelay::new(), InitSkip::empty())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn data_rate_leaves_other_fields_alone() {
        let mut chip = FakeChip::healthy(0xDECA_0302);
        // length 0x7f, txpsr 0x5, fine_plen 0x0f
        chip.set_bytes(0x00, 0x24, &[0x7f, 0x50, 0x00, 0x00, 0x00, 0x0f]);
        let mut dw3000 = ready(chip).await;

        dw3000.set_data_rate(BitRate::Kbps6800).await.unwrap();

        let fctrl = dw3000.ll().tx_fctrl().read().await.unwrap();
        assert_eq!(fctrl.txbr(), BitRate::Kbps6800 as u8);
        assert_eq!(fctrl.txbr(), 1);
        assert_eq!(fctrl.txflen(), 0x7f);
        assert_eq!(fctrl.txpsr(), 0x5);
        assert_eq!(fctrl.fine_plen(), 0x0f);
    }

    #[tokio::test]
    async fn pdoa_offset_keeps_neighbours() {
        let mut chip = FakeChip::healthy(0xDECA_0314);
        chip.set32(0x0E, 0x1A, 0xffff_ffff);
        let mut dw3000 = ready(chip).await;

        dw3000.set_pdoa_offset(125).await.unwrap();

        assert_eq!(dw3000.ll().cia_adjust().read().await.unwrap().value(), 125);
        assert_eq!(dw3000.ll().bus().get16(0x0E, 0x1A), 0xc000 | 125);
        assert_eq!(dw3000.ll().bus().get16(0x0E, 0x1C), 0xffff);
    }

    #[tokio::test]
    async fn spi_crc_on_both_sides() {
        let mut dw3000 = ready(FakeChip::healthy(0xDECA_0302)).await;

        dw3000.set_spi_crc(SpiCrcMode::Write).await.unwrap();
        assert_eq!(dw3000.ll().sys_cfg().read().await.unwrap().spi_crcen(), 1);
        assert_eq!(dw3000.ll().crc_mode(), SpiCrcMode::Write);

        dw3000.ll().bus().crc = true;
        dw3000.set_spi_crc(SpiCrcMode::Off).await.unwrap();
        dw3000.ll().bus().crc = false;
        assert_eq!(dw3000.ll().sys_cfg().read().await.unwrap().spi_crcen(), 0);
        assert_eq!(dw3000.ll().crc_mode(), SpiCrcMode::Off);
    }

    #[tokio::test]
    async fn equalizer_is_qm33_only() {
        let mut chip = FakeChip::healthy(0xDECA_0304);
        chip.set16(0x0E, 0x00, 0x4000);
        let mut dw3000 = ready(chip).await;
        dw3000.set_equalizer(true).await.unwrap();
        assert!(dw3000.ll().cia_conf().read().await.unwrap().eq_en() == 1);
        assert_eq!(dw3000.ll().bus().get16(0x0E, 0x00), 0x4000);

        let mut dw3000 = ready(FakeChip::healthy(0xDECA_0302)).await;
        assert!(matches!(
            dw3000.set_equalizer(true).await,
            Err(Error::InvalidConfiguration)
        ));
    }

    #[tokio::test]
    async fn configure_programs_the_phy() {
        let mut dw3000 = ready(FakeChip::healthy(0xDECA_0302)).await;
        let config = Config {
            channel: UwbChannel::Channel9,
            preamble_length: PreambleLength::SYMBOLS_64,
            pac: PacSize::Pac4,
            tx_preamble_code: 10,
            rx_preamble_code: 10,
            sfd_type: SfdSequence::Dw8,
            bitrate: BitRate::Kbps850,
            sfd_timeout: 0,
            ..Default::default()
        };

        dw3000.configure(&mut NoopDelay::new(), config).await.unwrap();

        let chan = dw3000.ll().chan_ctrl().read().await.unwrap();
        assert_eq!(chan.rf_chan(), 1);
        assert_eq!(chan.sfd_type(), 1);
        assert_eq!(chan.tx_pcode(), 10);
        assert_eq!(chan.rx_pcode(), 10);

        let fctrl = dw3000.ll().tx_fctrl().read().await.unwrap();
        assert_eq!(fctrl.txbr(), 0);
        assert_eq!(fctrl.txpsr(), 0x1);
        assert_eq!(fctrl.fine_plen(), 7);

        assert_eq!(dw3000.ll().dtune0().read().await.unwrap().pac(), PacSize::Pac4 as u8);
        assert_eq!(
            dw3000.ll().rx_sfd_toc().read().await.unwrap().value(),
            crate::configs::SFD_TIMEOUT_DEFAULT
        );
        assert_eq!(dw3000.ll().bus().get32(0x07, 0x1C), 0x1C01_0034);
        assert_eq!(dw3000.ll().bus().get16(0x09, 0x00), 0x0F3C);
        assert_eq!(dw3000.ll().bus().get32(0x03, 0x38), 0x2a8fe);
        assert_eq!(dw3000.ll().dgc_cfg().read().await.unwrap().rx_tune_en(), 1);
        assert_eq!(dw3000.ll().bus().get8(0x07, 0x51), LDO_RLOAD_VALUE);

        assert_eq!(dw3000.ctx.config, config);
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_before_touching_the_chip() {
        let mut dw3000 = ready(FakeChip::healthy(0xDECA_0302)).await;
        let writes = dw3000.ll().bus().writes.len();

        let config = Config {
            tx_preamble_code: 30,
            ..Default::default()
        };
        let result = dw3000.configure(&mut NoopDelay::new(), config).await;

        assert!(matches!(result, Err(Error::InvalidConfiguration)));
        assert_eq!(dw3000.ll().bus().writes.len(), writes);
    }

    #[tokio::test]
    async fn configure_fails_when_the_pll_does_not_lock() {
        let mut chip = FakeChip::healthy(0xDECA_0302);
        chip.unforce(0x00, 0x44);
        let mut dw3000 = ready(chip).await;

        let result = dw3000
            .configure(&mut NoopDelay::new(), Config::default())
            .await;

        assert!(matches!(result, Err(Error::PllLock)));
    }

    #[tokio::test]
    async fn sts_length_and_threshold() {
        let mut dw3000 = ready(FakeChip::healthy(0xDECA_0302)).await;

        dw3000.set_sts_length(StsLength::Symbols256).await.unwrap();

        assert_eq!(dw3000.ll().sts_cfg().read().await.unwrap().cps_len(), 31);
        assert_eq!(
            dw3000.ll().sts_conf_1().read().await.unwrap().res_b0(),
            sts_min_threshold(StsLength::Symbols256, PdoaMode::Disabled)
        );
        assert_eq!(dw3000.ctx.config.sts_length, StsLength::Symbols256);
    }

    #[tokio::test]
    async fn pdoa_mode_3_needs_sts() {
        let mut dw3000 = ready(FakeChip::healthy(0xDECA_0314)).await;

        let result = dw3000.set_pdoa_mode(PdoaMode::Mode3).await;
        assert!(matches!(result, Err(Error::InvalidConfiguration)));

        dw3000.set_pdoa_mode(PdoaMode::Mode1).await.unwrap();
        assert_eq!(dw3000.ll().sys_cfg().read().await.unwrap().pdoa_mode(), 1);
    }

    #[test]
    fn sts_thresholds() {
        // 64 symbols: 2048 * 16 * 181 / 128 / 2048 = 22.6
        assert_eq!(sts_min_threshold(StsLength::Symbols64, PdoaMode::Disabled), 23);
        assert_eq!(sts_min_threshold(StsLength::Symbols64, PdoaMode::Mode3), 16);
        assert_eq!(sts_min_threshold(StsLength::Symbols2048, PdoaMode::Disabled), 128);
    }

    #[tokio::test]
    async fn sts_key_and_iv() {
        let mut dw3000 = ready(FakeChip::healthy(0xDECA_0302)).await;

        dw3000
            .set_sts_key(0x0011_2233_4455_6677_8899_aabb_ccdd_eeff)
            .await
            .unwrap();
        dw3000.set_sts_iv(1).await.unwrap();
        dw3000.load_sts_iv().await.unwrap();

        assert_eq!(dw3000.ll().bus().get32(0x02, 0x0C), 0xccdd_eeff);
        assert_eq!(dw3000.ll().bus().get32(0x02, 0x1C), 1);
        assert_eq!(dw3000.ll().bus().get8(0x02, 0x04), 0x01);
    }
}
