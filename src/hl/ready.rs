use smoltcp::wire::{Ieee802154Address, Ieee802154Pan};

use crate::{maybe_async_attr, spi_type, time::Duration, Error, Ready, DW3000};

impl<SPI> DW3000<SPI, Ready>
where
    SPI: spi_type::spi::SpiDevice<u8>,
{
    /// Sets the TX and RX antenna delays
    ///
    /// Both are 16-bit registers. The TX delay is added to every TX time
    /// stamp, the RX delay subtracted from every RX time stamp.
    #[maybe_async_attr]
    pub async fn set_antenna_delay(
        &mut self,
        tx_delay: Duration,
        rx_delay: Duration,
    ) -> Result<(), Error<SPI>> {
        let tx_delay =
            u16::try_from(tx_delay.value()).map_err(|_| Error::InvalidConfiguration)?;
        let rx_delay =
            u16::try_from(rx_delay.value()).map_err(|_| Error::InvalidConfiguration)?;

        self.ll.cia_conf().and_or(|w| w.rxantd(rx_delay)).await?;
        self.ll.tx_antd().write(|w| w.value(tx_delay)).await?;

        Ok(())
    }

    /// Sets the network id and address used for sending and receiving
    ///
    /// A short address goes to PANADR, an extended one to the EUI register.
    #[maybe_async_attr]
    pub async fn set_address(
        &mut self,
        pan_id: Ieee802154Pan,
        addr: Ieee802154Address,
    ) -> Result<(), Error<SPI>> {
        match addr {
            Ieee802154Address::Short(short_addr) => {
                self.ll
                    .panadr()
                    .write(|w| {
                        w.pan_id(pan_id.0)
                            .short_addr(u16::from_be_bytes(short_addr))
                    })
                    .await?;
            }
            Ieee802154Address::Extended(extended) => {
                self.set_pan_id(pan_id.0).await?;
                self.set_eui(u64::from_be_bytes(extended)).await?;
            }
            Ieee802154Address::Absent => return Err(Error::InvalidConfiguration),
        }

        Ok(())
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

    #[tokio::test]
    async fn antenna_delays() {
        let mut chip = FakeChip::healthy(0xDECA_0302);
        // minimum diagnostics
        chip.set32(0x0E, 0x00, 1 << 20);
        let mut dw3000 = ready(chip).await;

        dw3000
            .set_antenna_delay(Duration::from_dtu(16385), Duration::from_dtu(16390))
            .await
            .unwrap();

        assert_eq!(dw3000.get_tx_antenna_delay().await.unwrap().value(), 16385);
        assert_eq!(dw3000.get_rx_antenna_delay().await.unwrap().value(), 16390);
        assert_eq!(dw3000.ll().bus().get32(0x0E, 0x00) & (1 << 20), 1 << 20);

        let too_long = Duration::new(0x1_0000).unwrap();
        assert!(matches!(
            dw3000.set_antenna_delay(too_long, Duration::from_dtu(0)).await,
            Err(Error::InvalidConfiguration)
        ));
    }

    #[tokio::test]
    async fn short_and_extended_addresses() {
        let mut dw3000 = ready(FakeChip::healthy(0xDECA_0302)).await;

        dw3000
            .set_address(Ieee802154Pan(0xdeca), Ieee802154Address::Short([0x12, 0x34]))
            .await
            .unwrap();
        let (pan, addr) = dw3000.get_address().await.unwrap();
        assert_eq!(pan, Ieee802154Pan(0xdeca));
        assert_eq!(addr, Ieee802154Address::Short([0x12, 0x34]));

        dw3000
            .set_address(
                Ieee802154Pan(0xbeef),
                Ieee802154Address::Extended([1, 2, 3, 4, 5, 6, 7, 8]),
            )
            .await
            .unwrap();
        assert_eq!(dw3000.get_eui().await.unwrap(), 0x0102_0304_0506_0708);
        let (pan, addr) = dw3000.get_address().await.unwrap();
        assert_eq!(pan, Ieee802154Pan(0xbeef));
        assert_eq!(addr, Ieee802154Address::Short([0x12, 0x34]));

        assert!(matches!(
            dw3000
                .set_address(Ieee802154Pan(0), Ieee802154Address::Absent)
                .await,
            Err(Error::InvalidConfiguration)
        ));
    }
}
