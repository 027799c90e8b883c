use core::num::Wrapping;

use bitflags::bitflags;

use crate::{
    delay_type, ll, maybe_async_attr, spi_type,
    time::Duration,
    Error, Ready, Uninitialized, DW3000,
};

use super::{
    otp::{
        BIAS_TUNE_ADDRESS, DGC_TUNE_ADDRESS, LDO_TUNE_HI_ADDRESS, LDO_TUNE_LO_ADDRESS,
        LOT_ID_ADDRESS, OTP_REV_ADDRESS, PART_ID_ADDRESS, VBAT_ADDRESS, VTEMP_ADDRESS,
        XTRIM_ADDRESS, DGC_CFG0_VALUE,
    },
    retry::{Outcome, Retry, IDLE_RC_POLLS, POLL_DELAY_US},
    Context, OtpData,
};

pub(super) const BIAS_TUNE_MASK: u16 = 0x1f;

/// Silicon variants the driver knows about
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChipVariant {
    /// DW3000, single antenna port
    Dw3000,
    /// DW3000 with two antenna ports
    Dw3000Pdoa,
    /// QM33xxx (DW3720), single antenna port
    Qm33,
    /// QM33xxx (DW3720) with two antenna ports
    Qm33Pdoa,
}

impl ChipVariant {
    /// Matches the value of DEV_ID
    pub fn from_dev_id(dev_id: u32) -> Option<Self> {
        match dev_id {
            0xDECA_0302 => Some(ChipVariant::Dw3000),
            0xDECA_0312 => Some(ChipVariant::Dw3000Pdoa),
            0xDECA_0304 => Some(ChipVariant::Qm33),
            0xDECA_0314 => Some(ChipVariant::Qm33Pdoa),
            _ => None,
        }
    }

    /// DEV_ID of the variant
    pub fn dev_id(&self) -> u32 {
        match self {
            ChipVariant::Dw3000 => 0xDECA_0302,
            ChipVariant::Dw3000Pdoa => 0xDECA_0312,
            ChipVariant::Qm33 => 0xDECA_0304,
            ChipVariant::Qm33Pdoa => 0xDECA_0314,
        }
    }

    /// Two SPI hosts can share the chip through a semaphore
    pub fn has_dual_spi(&self) -> bool {
        matches!(self, ChipVariant::Qm33 | ChipVariant::Qm33Pdoa)
    }

    /// The receiver has the multipath equaliser
    pub fn has_equalizer(&self) -> bool {
        matches!(self, ChipVariant::Qm33 | ChipVariant::Qm33Pdoa)
    }

    /// Two antenna ports are bonded out
    pub fn has_pdoa(&self) -> bool {
        matches!(self, ChipVariant::Dw3000Pdoa | ChipVariant::Qm33Pdoa)
    }
}

bitflags! {
    /// OTP values `initialise` does not read
    ///
    /// Skipping saves a few SPI transactions on wake up, when the values are
    /// already known.
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct InitSkip: u8 {
        /// Part and lot identifiers
        const PART_LOT_ID = 0x10;
        /// Battery voltage reference
        const VBAT = 0x40;
        /// Temperature reference
        const VTEMP = 0x80;
    }
}

impl<SPI> DW3000<SPI, Uninitialized>
where
    SPI: spi_type::spi::SpiDevice<u8>,
{
    /// Create a new instance of `DW3000`
    ///
    /// Requires the SPI device that is connected to the chip. Nothing is sent
    /// before [`DW3000::identify`] or [`DW3000::initialise`].
    pub fn new(spi: SPI) -> Self {
        DW3000 {
            ll: ll::DW3000::new(spi),
            seq: Wrapping(0),
            state: Uninitialized,
            ctx: Context::default(),
        }
    }

    /// Reads DEV_ID and selects the chip variant
    #[maybe_async_attr]
    pub async fn identify(&mut self) -> Result<ChipVariant, Error<SPI>> {
        let dev_id = self.ll.dev_id().read().await?.value();

        match ChipVariant::from_dev_id(dev_id) {
            Some(variant) => {
                #[cfg(feature = "defmt")]
                defmt::debug!("found {:?}", variant);

                self.ctx.variant = Some(variant);
                Ok(variant)
            }
            None => {
                #[cfg(feature = "defmt")]
                defmt::warn!("unknown DEV_ID {=u32:#x}", dev_id);

                Err(Error::UnknownDevice(dev_id))
            }
        }
    }

    /// Initialize the chip
    ///
    /// Waits for IDLE_RC, identifies the silicon, loads the LDO and bias
    /// trims from OTP, caches the factory references and applies the crystal
    /// trim. The chip stays in IDLE_RC; [`DW3000::configure`] locks the PLL.
    #[maybe_async_attr]
    pub async fn initialise<DELAY>(
        mut self,
        delay: &mut DELAY,
        skip: InitSkip,
    ) -> Result<DW3000<SPI, Ready>, Error<SPI>>
    where
        DELAY: delay_type::delay::DelayNs,
    {
        let mut retry = Retry::new(IDLE_RC_POLLS, POLL_DELAY_US);
        while retry.next_attempt() {
            if self.check_idle_rc().await? {
                retry.finish();
            } else {
                delay.delay_us(retry.delay_us()).await;
            }
        }
        if retry.outcome() == Outcome::Exhausted {
            return Err(Error::WrongState);
        }

        self.identify().await?;

        let ldo_tune_lo = self.otp_read(LDO_TUNE_LO_ADDRESS).await?;
        let ldo_tune_hi = self.otp_read(LDO_TUNE_HI_ADDRESS).await?;
        let bias_tune = ((self.otp_read(BIAS_TUNE_ADDRESS).await? >> 16) as u16 & BIAS_TUNE_MASK) as u8;
        if ldo_tune_lo != 0 && ldo_tune_hi != 0 && bias_tune != 0 {
            self.ll
                .otp_cfg()
                .and_or(|w| w.ldo_kick(1).bias_kick(1))
                .await?;
            self.ll
                .and_or16(0x11, 0x1F, !BIAS_TUNE_MASK, bias_tune as u16)
                .await?;
        }

        let dgc_from_otp = self.otp_read(DGC_TUNE_ADDRESS).await? == DGC_CFG0_VALUE;

        let (part_id, lot_id) = if skip.contains(InitSkip::PART_LOT_ID) {
            (0, 0)
        } else {
            (
                self.otp_read(PART_ID_ADDRESS).await?,
                self.otp_read(LOT_ID_ADDRESS).await?,
            )
        };
        let vbat_ref = if skip.contains(InitSkip::VBAT) {
            0
        } else {
            self.otp_read(VBAT_ADDRESS).await? as u8
        };
        let temp_ref = if skip.contains(InitSkip::VTEMP) {
            0
        } else {
            self.otp_read(VTEMP_ADDRESS).await? as u8
        };
        let revision = self.otp_read(OTP_REV_ADDRESS).await? as u8;
        let xtal_trim = (self.otp_read(XTRIM_ADDRESS).await? & 0x7f) as u8;

        self.ctx.otp = OtpData {
            part_id,
            lot_id,
            vbat_ref,
            temp_ref,
            xtal_trim,
            bias_tune,
            ldo_tune: ((ldo_tune_hi as u64) << 32) | ldo_tune_lo as u64,
            dgc_from_otp,
            revision,
        }
        .with_defaults();

        let trim = self.ctx.otp.xtal_trim;
        self.ll.xtal().and_or(|w| w.xtal_trim(trim)).await?;
        self.ctx.xtal_trim = trim;

        #[cfg(feature = "defmt")]
        defmt::debug!("initialised, xtal trim {=u8:#x}", trim);

        Ok(self.into_state(Ready))
    }

    /// Initialize the chip and program the antenna delays in one go
    #[maybe_async_attr]
    pub async fn initialise_with_antenna_delay<DELAY>(
        self,
        delay: &mut DELAY,
        skip: InitSkip,
        tx_antenna_delay: Duration,
        rx_antenna_delay: Duration,
    ) -> Result<DW3000<SPI, Ready>, Error<SPI>>
    where
        DELAY: delay_type::delay::DelayNs,
    {
        let mut dw3000 = self.initialise(delay, skip).await?;
        dw3000.set_antenna_delay(tx_antenna_delay, rx_antenna_delay).await?;
        Ok(dw3000)
    }
}
