use smoltcp::wire::{Ieee802154Address, Ieee802154Pan};

use super::{Awake, ChipVariant};
use crate::{fast_command::FastCommand, ll, maybe_async_attr, spi_type, time::Duration, Error, DW3000};

/// Power management states reported by SYS_STATE
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PmscState {
    /// Waking up
    Wakeup,
    /// IDLE_RC, PLL off
    IdleRc,
    /// IDLE_PLL
    Idle,
    /// Transmitting
    Tx,
    /// Receiving
    Rx,
    /// Any other state, with the raw value
    Other(u8),
}

impl From<u8> for PmscState {
    fn from(raw: u8) -> Self {
        match raw {
            0x0 => PmscState::Wakeup,
            0x1 => PmscState::IdleRc,
            0x3 => PmscState::Idle,
            0x8..=0xF => PmscState::Tx,
            0x12..=0x19 => PmscState::Rx,
            other => PmscState::Other(other),
        }
    }
}

impl<SPI, State> DW3000<SPI, State>
where
    SPI: spi_type::spi::SpiDevice<u8>,
    State: Awake,
{
    /// Returns the TX antenna delay
    #[maybe_async_attr]
    pub async fn get_tx_antenna_delay(&mut self) -> Result<Duration, Error<SPI>> {
        let tx_antenna_delay = self.ll.tx_antd().read().await?.value();

        Ok(Duration::from_dtu(tx_antenna_delay))
    }

    /// Returns the RX antenna delay
    #[maybe_async_attr]
    pub async fn get_rx_antenna_delay(&mut self) -> Result<Duration, Error<SPI>> {
        let rx_antenna_delay = self.ll.cia_conf().read().await?.rxantd();

        Ok(Duration::from_dtu(rx_antenna_delay))
    }

    /// Returns the network id and address used for sending and receiving
    #[maybe_async_attr]
    pub async fn get_address(&mut self) -> Result<(Ieee802154Pan, Ieee802154Address), Error<SPI>> {
        let panadr = self.ll.panadr().read().await?;

        Ok((
            Ieee802154Pan(panadr.pan_id()),
            Ieee802154Address::Short(panadr.short_addr().to_be_bytes()),
        ))
    }

    /// Returns the extended unique identifier
    #[maybe_async_attr]
    pub async fn get_eui(&mut self) -> Result<u64, Error<SPI>> {
        Ok(self.ll.eui().read().await?.value())
    }

    /// Returns the value of DEV_ID
    #[maybe_async_attr]
    pub async fn read_dev_id(&mut self) -> Result<u32, Error<SPI>> {
        Ok(self.ll.dev_id().read().await?.value())
    }

    /// The silicon found by `identify`
    pub fn variant(&self) -> Option<ChipVariant> {
        self.ctx.variant
    }

    /// Returns the current system time (bits 8 to 39 of the device time)
    #[maybe_async_attr]
    pub async fn sys_time(&mut self) -> Result<u32, Error<SPI>> {
        let sys_time = self.ll.sys_time().read().await?.value();

        Ok(sys_time)
    }

    /// Returns the power management state
    #[maybe_async_attr]
    pub async fn state(&mut self) -> Result<PmscState, Error<SPI>> {
        Ok(self.ll.sys_state().read().await?.pmsc_state().into())
    }

    /// Returns the last fast command the chip executed
    #[maybe_async_attr]
    pub async fn cmd_status(&mut self) -> Result<u8, Error<SPI>> {
        Ok(self.ll.fcmd_stat().read().await?.value())
    }

    /// Returns true if the chip has been in INIT_RC
    #[maybe_async_attr]
    pub async fn init_rc_passed(&mut self) -> Result<bool, Error<SPI>> {
        Ok(self.ll.sys_status().read().await?.rcinit() == 0x1)
    }

    /// Returns true if the PLL is locked
    #[maybe_async_attr]
    pub async fn idle_pll_passed(&mut self) -> Result<bool, Error<SPI>> {
        Ok(self.ll.sys_status().read().await?.cplock() == 0x1)
    }

    /// Provides direct access to the register-level API
    ///
    /// Be aware that by using the register-level API, you can invalidate
    /// various assumptions that the high-level API makes about the operation of
    /// the chip. Don't use the register-level and high-level APIs in tandem,
    /// unless you know what you're doing.
    pub fn ll(&mut self) -> &mut ll::DW3000<SPI> {
        &mut self.ll
    }

    /// Sends a fast command
    #[maybe_async_attr]
    pub async fn fast_cmd(&mut self, fc: FastCommand) -> Result<(), Error<SPI>> {
        self.ll.fast_command(fc as u8).await?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hl::fake::FakeChip;

    use embedded_hal_mock::eh1::spi::{Mock as SpiMock, Transaction as SpiTransaction};

    #[tokio::test]
    async fn test_new_device() {
        let spi = SpiMock::new(&[
            SpiTransaction::transaction_start(),
            SpiTransaction::transfer_in_place(
                vec![0x40, 0x30, 0, 0, 0, 0],
                vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06],
            ),
            SpiTransaction::transaction_end(),
        ]);

        let mut dw3000 = DW3000::new(spi);

        let addr = dw3000.get_address().await.unwrap();

        assert_eq!(
            addr,
            (
                Ieee802154Pan(0x0605),
                Ieee802154Address::Short([0x04, 0x03])
            )
        );

        let mut spi = dw3000.ll.spi;

        spi.done();
    }

    #[tokio::test]
    async fn antenna_delays_and_state() {
        let mut chip = FakeChip::new();
        chip.set16(0x01, 0x04, 16_385);
        chip.set16(0x0E, 0x00, 16_400);
        chip.set8(0x0F, 0x32, 0x03);
        let mut dw3000 = DW3000::new(chip);

        assert_eq!(dw3000.get_tx_antenna_delay().await.unwrap().value(), 16_385);
        assert_eq!(dw3000.get_rx_antenna_delay().await.unwrap().value(), 16_400);
        assert_eq!(dw3000.state().await.unwrap(), PmscState::Idle);
    }

    #[test]
    fn pmsc_states() {
        assert_eq!(PmscState::from(0x01), PmscState::IdleRc);
        assert_eq!(PmscState::from(0x0A), PmscState::Tx);
        assert_eq!(PmscState::from(0x14), PmscState::Rx);
        assert_eq!(PmscState::from(0x42), PmscState::Other(0x42));
    }
}
