//! Device state machine: INIT_RC, IDLE_RC, IDLE_PLL and resets

use crate::{delay_type, maybe_async_attr, spi_type, Error, FastCommand, Uninitialized, DW3000};

use super::{Awake, SysStatus};

/// Automatic system clock selection
pub(crate) const SYS_CLK_AUTO: u8 = 0;
/// System clock forced to the crystal divided by 4
pub(crate) const SYS_CLK_FOSC_DIV4: u8 = 1;
/// System clock forced to the PLL
pub(crate) const SYS_CLK_PLL: u8 = 2;
/// System clock forced to the crystal
pub(crate) const SYS_CLK_FOSC: u8 = 3;

/// States `set_dw_state` can move the chip to
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DwState {
    /// INIT_RC, running from the crystal
    Init,
    /// IDLE_RC, PLL off
    IdleRc,
    /// IDLE_PLL, PLL on and locked
    Idle,
}

/// Parts of the chip a soft reset acts on
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResetKind {
    /// Host interface, TX, RX and power management
    All,
    /// Everything except the transceiver
    Ctrx,
    /// Receiver only
    Rx,
    /// Releases every reset line
    Clear,
}

impl ResetKind {
    /// SOFT_RST value, the reset lines are active low
    pub fn value(&self) -> u16 {
        match self {
            ResetKind::All => 0x00,
            ResetKind::Ctrx => 0x0F,
            ResetKind::Rx => 0xEF,
            ResetKind::Clear => 0xFF,
        }
    }
}

impl<SPI, State> DW3000<SPI, State>
where
    SPI: spi_type::spi::SpiDevice<u8>,
    State: Awake,
{
    /// Returns true once the chip reached IDLE_RC with the SPI ready
    #[maybe_async_attr]
    pub async fn check_idle_rc(&mut self) -> Result<bool, Error<SPI>> {
        let status = self.ll.sys_status().read().await?;
        Ok(status.rcinit() == 1 && status.spirdy() == 1)
    }

    /// Moves the chip to INIT_RC, IDLE_RC or IDLE_PLL
    ///
    /// Going to IDLE_PLL calibrates and locks the PLL, which fails with
    /// [`Error::PllLock`] if it does not lock within the retry budget.
    #[maybe_async_attr]
    pub async fn set_dw_state<DELAY>(
        &mut self,
        delay: &mut DELAY,
        state: DwState,
    ) -> Result<(), Error<SPI>>
    where
        DELAY: delay_type::delay::DelayNs,
    {
        #[cfg(feature = "defmt")]
        defmt::debug!("moving to {:?}", state);

        match state {
            DwState::Idle => self.pll_cal(delay).await,
            DwState::IdleRc => {
                // INIT_RC first so the PLL is released cleanly
                self.ll
                    .clk_ctrl()
                    .and_or(|w| w.sys_clk(SYS_CLK_FOSC))
                    .await?;
                self.ll
                    .seq_ctrl()
                    .and_or(|w| w.ainit2idle(0).force2init(1))
                    .await?;
                self.ll.seq_ctrl().and_or(|w| w.force2init(0)).await?;
                self.ll
                    .clk_ctrl()
                    .and_or(|w| w.sys_clk(SYS_CLK_AUTO))
                    .await?;
                Ok(())
            }
            DwState::Init => {
                self.ll
                    .clk_ctrl()
                    .and_or(|w| w.sys_clk(SYS_CLK_FOSC))
                    .await?;
                self.ll
                    .seq_ctrl()
                    .and_or(|w| w.ainit2idle(0).force2init(1))
                    .await?;
                Ok(())
            }
        }
    }

    /// Turns the transceiver off and clears the TX and RX events
    ///
    /// Aborts any ongoing or pending transmission or reception. Calling it on
    /// an idle chip changes nothing.
    #[maybe_async_attr]
    pub async fn force_trx_off(&mut self) -> Result<(), Error<SPI>> {
        self.ll.fast_command(FastCommand::TxRxOff as u8).await?;

        let events = SysStatus::ALL_TX
            | SysStatus::ALL_RX_GOOD
            | SysStatus::ALL_RX_TO
            | SysStatus::ALL_RX_ERR;
        self.ll.sys_status().write(|w| w.value(events.bits())).await?;

        Ok(())
    }

    /// Resets only the receiver, then releases the reset
    #[maybe_async_attr]
    pub async fn rx_reset(&mut self) -> Result<(), Error<SPI>> {
        self.ll
            .soft_rst()
            .write(|w| w.value(ResetKind::Rx.value()))
            .await?;
        self.ll
            .soft_rst()
            .write(|w| w.value(ResetKind::Clear.value()))
            .await?;
        Ok(())
    }

    /// Resets the whole chip
    ///
    /// Clears the AON configuration first so the reset does not reload it.
    /// The chip comes back in INIT_RC and has to be initialised again.
    #[maybe_async_attr]
    pub async fn soft_reset<DELAY>(
        mut self,
        delay: &mut DELAY,
    ) -> Result<DW3000<SPI, Uninitialized>, Error<SPI>>
    where
        DELAY: delay_type::delay::DelayNs,
    {
        self.clear_aon_config().await?;
        delay.delay_ms(1).await;

        // the PLL goes down with the reset
        self.ll
            .clk_ctrl()
            .and_or(|w| w.sys_clk(SYS_CLK_FOSC))
            .await?;
        self.ll
            .soft_rst()
            .write(|w| w.value(ResetKind::All.value()))
            .await?;
        delay.delay_ms(1).await;

        self.ctx.double_buffer = None;
        self.ctx.rx_buffer = 0;
        self.ctx.on_wake = super::OnWake::empty();

        #[cfg(feature = "defmt")]
        defmt::debug!("soft reset");

        Ok(self.into_state(Uninitialized))
    }

    /// Clears the on-wake configuration and uploads it to the AON array
    #[maybe_async_attr]
    pub(crate) async fn clear_aon_config(&mut self) -> Result<(), Error<SPI>> {
        self.ll.aon_dig_cfg().write(|w| w.value(0)).await?;
        self.ll.aon_cfg().write(|w| w.value(0)).await?;
        self.ll.aon_ctrl().write(|w| w.value(0)).await?;
        self.ll
            .aon_ctrl()
            .write(|w| w.value(super::sleeping::AON_ARRAY_SAVE))
            .await?;
        Ok(())
    }
}
