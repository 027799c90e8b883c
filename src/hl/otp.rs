//! One-time programmable memory
//!
//! The factory stores identifiers, calibration references and trims in OTP.
//! `initialise` reads them once and keeps them in [`OtpData`]. Writing OTP is
//! only needed during provisioning.

use crate::{delay_type, maybe_async_attr, spi_type, Error, DW3000};

use super::{
    retry::{Outcome, Retry, OTP_PROG_POLLS},
    Awake, Ready, DEFAULT_XTAL_TRIM,
};

pub(crate) const LDO_TUNE_LO_ADDRESS: u16 = 0x04;
pub(crate) const LDO_TUNE_HI_ADDRESS: u16 = 0x05;
pub(crate) const PART_ID_ADDRESS: u16 = 0x06;
pub(crate) const LOT_ID_ADDRESS: u16 = 0x07;
pub(crate) const VBAT_ADDRESS: u16 = 0x08;
pub(crate) const VTEMP_ADDRESS: u16 = 0x09;
pub(crate) const BIAS_TUNE_ADDRESS: u16 = 0x0A;
pub(crate) const XTRIM_ADDRESS: u16 = 0x1E;
pub(crate) const OTP_REV_ADDRESS: u16 = 0x1F;
pub(crate) const DGC_TUNE_ADDRESS: u16 = 0x20;

/// DGC_CFG0 value of the reference tuning. Its presence in OTP means the DGC
/// tables can be loaded from there.
pub(crate) const DGC_CFG0_VALUE: u32 = 0x1000_0240;

/// Temperature reading at 22 °C when OTP holds none
pub const DEFAULT_TEMP_REF: u8 = 0x85;
/// Battery reading at 3.0 V when OTP holds none
pub const DEFAULT_VBAT_REF: u8 = 0x74;

/// Factory values read from OTP
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OtpData {
    /// Part identifier
    pub part_id: u32,
    /// Lot identifier
    pub lot_id: u32,
    /// SAR battery reading at 3.0 V
    pub vbat_ref: u8,
    /// SAR temperature reading at 22 °C
    pub temp_ref: u8,
    /// Crystal trim
    pub xtal_trim: u8,
    /// Analog bias trim
    pub bias_tune: u8,
    /// LDO tuning, high word in the upper 32 bits
    pub ldo_tune: u64,
    /// DGC tables are programmed in OTP
    pub dgc_from_otp: bool,
    /// OTP layout revision
    pub revision: u8,
}

impl OtpData {
    /// Replaces unprogrammed references by the documented defaults
    pub fn with_defaults(mut self) -> Self {
        if self.temp_ref == 0 {
            self.temp_ref = DEFAULT_TEMP_REF;
        }
        if self.vbat_ref == 0 {
            self.vbat_ref = DEFAULT_VBAT_REF;
        }
        if self.xtal_trim == 0 {
            self.xtal_trim = DEFAULT_XTAL_TRIM;
        }
        self
    }
}

impl<SPI, State> DW3000<SPI, State>
where
    SPI: spi_type::spi::SpiDevice<u8>,
    State: Awake,
{
    /// Reads one 32-bit OTP word
    #[maybe_async_attr]
    pub async fn otp_read(&mut self, address: u16) -> Result<u32, Error<SPI>> {
        // manual access
        self.ll.otp_cfg().write(|w| w.otp_man(1)).await?;
        self.ll.otp_addr().write(|w| w.value(address)).await?;
        self.ll.otp_cfg().write(|w| w.otp_read(1)).await?;

        Ok(self.ll.otp_rdata().read().await?.value())
    }

    /// Factory values cached by `initialise`
    pub fn otp(&self) -> OtpData {
        self.ctx.otp
    }
}

impl<SPI> DW3000<SPI, Ready>
where
    SPI: spi_type::spi::SpiDevice<u8>,
{
    /// Programs one 32-bit OTP word
    ///
    /// OTP bits can only go from 0 to 1 and programming is permanent. This is
    /// meant for provisioning, not for regular operation.
    #[maybe_async_attr]
    pub async fn otp_write<DELAY>(
        &mut self,
        delay: &mut DELAY,
        address: u16,
        value: u32,
    ) -> Result<(), Error<SPI>>
    where
        DELAY: delay_type::delay::DelayNs,
    {
        let ldo_tune = self.ll.read32(0x07, 0x44).await?;
        // VDDHV_TX LDO to its maximum while programming
        self.ll.and_or32(0x07, 0x44, 0xffff_ffff, 0x00f0_0000).await?;

        self.ll.otp_cfg().write(|w| w.value(0x0014)).await?;

        let [v0, v1, v2, v3] = value.to_be_bytes();
        let address = address & 0xff;
        let program = [
            // fast programming
            0x0025,
            // address instruction
            0x0002,
            0x01fc,
            0x0100 | address,
            0x0100,
            0x0000,
            // data instruction
            0x0002,
            0x01c0,
            0x0100 | v0 as u16,
            0x0100 | v1 as u16,
            0x0100 | v2 as u16,
            0x0100 | v3 as u16,
            0x0000,
            // enter programming mode
            0x003a,
            0x01ff,
            0x010a,
            0x0000,
            // start programming
            0x003a,
            0x0101,
        ];
        for word in program {
            self.otp_instruction(word).await?;
        }
        self.ll.write16(0x0B, 0x00, 0x0002).await?;
        self.ll.write16(0x0B, 0x00, 0x0000).await?;

        let mut retry = Retry::new(OTP_PROG_POLLS, 1);
        while retry.next_attempt() {
            if self.ll.otp_stat().read().await?.otp_prog_done() == 1 {
                retry.finish();
            } else {
                delay.delay_us(retry.delay_us()).await;
            }
        }

        // leave programming mode
        for word in [0x003a, 0x0102] {
            self.otp_instruction(word).await?;
        }
        self.ll.write16(0x0B, 0x00, 0x0002).await?;
        self.ll.write16(0x0B, 0x00, 0x0000).await?;

        self.ll.otp_cfg().write(|w| w.value(0)).await?;
        self.ll.write32(0x07, 0x44, ldo_tune).await?;

        if retry.outcome() == Outcome::Exhausted {
            #[cfg(feature = "defmt")]
            defmt::warn!("OTP programming did not complete");

            return Err(Error::OtpVerify);
        }

        Ok(())
    }

    /// Programs one OTP word and reads it back
    #[maybe_async_attr]
    pub async fn otp_write_and_verify<DELAY>(
        &mut self,
        delay: &mut DELAY,
        address: u16,
        value: u32,
    ) -> Result<(), Error<SPI>>
    where
        DELAY: delay_type::delay::DelayNs,
    {
        self.otp_write(delay, address, value).await?;

        if self.otp_read(address).await? != value {
            return Err(Error::OtpVerify);
        }

        Ok(())
    }

    /// Clocks one instruction word into the OTP macro
    #[maybe_async_attr]
    async fn otp_instruction(&mut self, word: u16) -> Result<(), Error<SPI>> {
        self.ll.write16(0x0B, 0x00, word).await?;
        self.ll.write16(0x0B, 0x00, word | 0x0200).await?;
        self.ll.write16(0x0B, 0x00, word).await?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hl::{fake::FakeChip, InitSkip};

    use embedded_hal_mock::eh1::{
        delay::NoopDelay,
        spi::{Mock as SpiMock, Transaction as SpiTransaction},
    };

    #[tokio::test]
    async fn read_sequence() {
        let spi = SpiMock::new(&[
            // OTP_CFG = manual
            SpiTransaction::transaction_start(),
            SpiTransaction::write_vec(vec![0xd6, 0x20, 0x01, 0x00]),
            SpiTransaction::transaction_end(),
            // OTP_ADDR
            SpiTransaction::transaction_start(),
            SpiTransaction::write_vec(vec![0xd6, 0x10, 0x1e, 0x00]),
            SpiTransaction::transaction_end(),
            // OTP_CFG = read
            SpiTransaction::transaction_start(),
            SpiTransaction::write_vec(vec![0xd6, 0x20, 0x02, 0x00]),
            SpiTransaction::transaction_end(),
            // OTP_RDATA
            SpiTransaction::transaction_start(),
            SpiTransaction::transfer_in_place(
                vec![0x56, 0x40, 0, 0, 0, 0],
                vec![0, 0, 0x2e, 0, 0, 0],
            ),
            SpiTransaction::transaction_end(),
        ]);
        let mut dw3000 = DW3000::new(spi);

        assert_eq!(dw3000.otp_read(0x1e).await.unwrap(), 0x2e);

        dw3000.ll.spi.done();
    }

    #[test]
    fn references_fall_back_to_defaults() {
        let otp = OtpData {
            temp_ref: 0x80,
            ..Default::default()
        }
        .with_defaults();

        assert_eq!(otp.temp_ref, 0x80);
        assert_eq!(otp.vbat_ref, DEFAULT_VBAT_REF);
        assert_eq!(otp.xtal_trim, DEFAULT_XTAL_TRIM);
    }

    #[tokio::test]
    async fn write_is_verified() {
        let mut chip = FakeChip::healthy(0xDECA_0302);
        chip.force(0x0B, 0x0C, 0x01);
        let mut dw3000 = DW3000::new(chip)
            .initialise(&mut NoopDelay::new(), InitSkip::empty())
            .await
            .unwrap();

        // the fake does not program its OTP, so the read back differs
        let result = dw3000
            .otp_write_and_verify(&mut NoopDelay::new(), 0x50, 0x1234_5678)
            .await;
        assert!(matches!(result, Err(Error::OtpVerify)));

        // LDO tuning is restored afterwards
        assert_eq!(dw3000.ll().bus().get32(0x07, 0x44), 0);
    }

    #[tokio::test]
    async fn write_times_out_without_prog_done() {
        let chip = FakeChip::healthy(0xDECA_0302);
        let mut dw3000 = DW3000::new(chip)
            .initialise(&mut NoopDelay::new(), InitSkip::empty())
            .await
            .unwrap();

        let result = dw3000
            .otp_write(&mut NoopDelay::new(), 0x50, 0x1)
            .await;
        assert!(matches!(result, Err(Error::OtpVerify)));
        assert_eq!(dw3000.ll().bus().get16(0x0B, 0x08), 0);
    }
}
