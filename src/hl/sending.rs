//! Transmit sequencing
//!
//! A transmission is prepared in three steps: the frame goes into the TX
//! buffer with [`DW3000::write_tx_data`], TX_FCTRL is set up with
//! [`DW3000::write_tx_fctrl`], and [`DW3000::start_tx`] picks the fast command
//! that matches the requested [`TxMode`]. [`DW3000::send_raw`] and
//! [`DW3000::send_frame`] do all three.

use core::num::Wrapping;

use bitflags::bitflags;
use smoltcp::wire::{Ieee802154Address, Ieee802154Frame, Ieee802154Pan, Ieee802154Repr};

use super::SysStatus;
use crate::{
    configs::ConfigError, maybe_async_attr, spi_type, time::Instant, Error, FastCommand, Ready,
    DW3000,
};

/// Size of the TX buffer
pub const TX_BUFFER_LEN: usize = 1024;

/// TX buffer register file
const TX_BUFFER: u8 = 0x14;

/// Length of the FCS the chip appends
const FCS_LEN: u16 = 2;

/// Smallest repetition rate of continuous frame mode, in 8 ns units
const CONTINUOUS_FRAME_MIN_RATE: u32 = 4;

/// Smallest period of repeated frames, in 8 ns units
const REPEATED_FRAME_MIN_RATE: u32 = 2;

/// TX_TEST setting for continuous wave
const TX_TEST_CW: u8 = 0x0f;

bitflags! {
    /// Mode flags of a transmission, as used by host protocols
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct TxModeFlags: u8 {
        /// Start at DX_TIME
        const DELAYED = 0x01;
        /// Turn the receiver on after the frame was sent
        const RESPONSE_EXPECTED = 0x02;
        /// Start at DREF_TIME + DX_TIME
        const DLY_REF = 0x04;
        /// Start at the last RX timestamp + DX_TIME
        const DLY_RS = 0x08;
        /// Start at the last TX timestamp + DX_TIME
        const DLY_TS = 0x10;
        /// Only send if no preamble is detected
        const CCA = 0x20;
    }
}

/// What DX_TIME is added to for a delayed start
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DelayReference {
    /// DX_TIME is the start time itself
    Absolute,
    /// DREF_TIME
    Reference,
    /// Timestamp of the last received frame
    RxTimestamp,
    /// Timestamp of the last sent frame
    TxTimestamp,
}

/// How a transmission starts
///
/// A clear channel assessment only exists for immediate starts, so a mode
/// is built through its constructors or [`TxMode::from_flags`].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(try_from = "TxModeFlags", into = "TxModeFlags")
)]
pub struct TxMode {
    delay: Option<DelayReference>,
    response_expected: bool,
    cca: bool,
}

impl TxMode {
    /// Send right away
    pub const fn immediate() -> Self {
        TxMode {
            delay: None,
            response_expected: false,
            cca: false,
        }
    }

    /// Send at a time relative to `reference`
    pub const fn delayed(reference: DelayReference) -> Self {
        TxMode {
            delay: Some(reference),
            response_expected: false,
            cca: false,
        }
    }

    /// Send right away if no preamble is detected
    pub const fn clear_channel() -> Self {
        TxMode {
            delay: None,
            response_expected: false,
            cca: true,
        }
    }

    /// Turn the receiver on after sending
    pub const fn expect_response(mut self) -> Self {
        self.response_expected = true;
        self
    }

    /// Delayed start, `None` sends right away
    pub const fn delay(&self) -> Option<DelayReference> {
        self.delay
    }

    /// Whether the receiver is enabled after the frame, see
    /// [`DW3000::set_rx_after_tx_delay`]
    pub const fn response_expected(&self) -> bool {
        self.response_expected
    }

    /// Whether a clear channel assessment precedes the frame
    pub const fn cca(&self) -> bool {
        self.cca
    }

    /// The flags describing this mode
    pub fn flags(&self) -> TxModeFlags {
        let mut flags = match self.delay {
            None => TxModeFlags::empty(),
            Some(DelayReference::Absolute) => TxModeFlags::DELAYED,
            Some(DelayReference::Reference) => TxModeFlags::DLY_REF,
            Some(DelayReference::RxTimestamp) => TxModeFlags::DLY_RS,
            Some(DelayReference::TxTimestamp) => TxModeFlags::DLY_TS,
        };
        flags.set(TxModeFlags::RESPONSE_EXPECTED, self.response_expected);
        flags.set(TxModeFlags::CCA, self.cca);
        flags
    }

    /// Builds a mode from its flags
    ///
    /// At most one delay reference may be set, and CCA can't be delayed.
    pub fn from_flags(flags: TxModeFlags) -> Result<Self, ConfigError> {
        let delay = delay_from_flags(
            flags.contains(TxModeFlags::DELAYED),
            flags.contains(TxModeFlags::DLY_REF),
            flags.contains(TxModeFlags::DLY_RS),
            flags.contains(TxModeFlags::DLY_TS),
        )?;

        let cca = flags.contains(TxModeFlags::CCA);
        if cca && delay.is_some() {
            return Err(ConfigError::CcaDelayed);
        }

        Ok(TxMode {
            delay,
            response_expected: flags.contains(TxModeFlags::RESPONSE_EXPECTED),
            cca,
        })
    }

    /// The fast command starting this transmission
    pub fn fast_command(&self) -> FastCommand {
        use FastCommand::*;

        match (self.delay, self.cca, self.response_expected) {
            (None, false, false) => Tx,
            (None, false, true) => TxW4r,
            (None, true, false) => CcaTx,
            (None, true, true) => CcaTxW4r,
            (Some(DelayReference::Absolute), _, false) => DelayedTx,
            (Some(DelayReference::Absolute), _, true) => DelayedTxW4r,
            (Some(DelayReference::Reference), _, false) => DelayedTxFromRef,
            (Some(DelayReference::Reference), _, true) => DelayedTxFromRefW4r,
            (Some(DelayReference::RxTimestamp), _, false) => DelayedTxFromRx,
            (Some(DelayReference::RxTimestamp), _, true) => DelayedTxFromRxW4r,
            (Some(DelayReference::TxTimestamp), _, false) => DelayedTxFromTx,
            (Some(DelayReference::TxTimestamp), _, true) => DelayedTxFromTxW4r,
        }
    }
}

impl TryFrom<TxModeFlags> for TxMode {
    type Error = ConfigError;

    fn try_from(flags: TxModeFlags) -> Result<Self, Self::Error> {
        TxMode::from_flags(flags)
    }
}

impl From<TxMode> for TxModeFlags {
    fn from(mode: TxMode) -> Self {
        mode.flags()
    }
}

/// Picks the single delay reference named by a set of mode flags
pub(crate) fn delay_from_flags(
    absolute: bool,
    reference: bool,
    rx_stamp: bool,
    tx_stamp: bool,
) -> Result<Option<DelayReference>, ConfigError> {
    let named = [
        (absolute, DelayReference::Absolute),
        (reference, DelayReference::Reference),
        (rx_stamp, DelayReference::RxTimestamp),
        (tx_stamp, DelayReference::TxTimestamp),
    ];

    let mut found = None;
    for (set, delay) in named {
        if set {
            if found.is_some() {
                return Err(ConfigError::DelayReference);
            }
            found = Some(delay);
        }
    }
    Ok(found)
}

impl<SPI> DW3000<SPI, Ready>
where
    SPI: spi_type::spi::SpiDevice<u8>,
{
    /// Returns the TX state of the DW3000
    #[maybe_async_attr]
    pub async fn tx_state(&mut self) -> Result<u8, Error<SPI>> {
        Ok(self.ll.sys_state().read().await?.tx_state())
    }

    /// Copies `data` into the TX buffer at `offset`
    ///
    /// The FCS is not part of `data`, the chip appends it.
    #[maybe_async_attr]
    pub async fn write_tx_data(&mut self, data: &[u8], offset: u16) -> Result<(), Error<SPI>> {
        if offset as usize + data.len() > TX_BUFFER_LEN {
            return Err(Error::BufferTooSmall {
                required_len: offset as usize + data.len(),
            });
        }

        self.ll.write_bytes(TX_BUFFER, offset, data).await?;
        Ok(())
    }

    /// Sets the length and buffer offset of the next frame
    ///
    /// `frame_length` counts the FCS. The data rate and the preamble length
    /// come from the configuration.
    #[maybe_async_attr]
    pub async fn write_tx_fctrl(
        &mut self,
        frame_length: u16,
        offset: u16,
        ranging: bool,
    ) -> Result<(), Error<SPI>> {
        let max = self.ctx.config.phr_mode.frame_length_mask();
        if frame_length > max {
            return Err(Error::InvalidConfiguration);
        }

        // offsets past 127 need the extra 128, see the DW3000 errata
        let txb_offset = if offset > 127 { offset + 128 } else { offset };

        self.ll
            .tx_fctrl()
            .and_or(|w| {
                w.txflen(frame_length)
                    .txb_offset(txb_offset)
                    .tr(ranging as u8)
            })
            .await?;

        Ok(())
    }

    /// Sets DX_TIME, the start time of a delayed TX or RX
    ///
    /// The value is bits 8 to 40 of the device time, bit 0 of it is ignored.
    #[maybe_async_attr]
    pub async fn set_delayed_trx_time(&mut self, time: u32) -> Result<(), Error<SPI>> {
        self.ll.dx_time().write(|w| w.value(time)).await?;
        Ok(())
    }

    /// Sets DX_TIME from an instant
    #[maybe_async_attr]
    pub async fn set_delayed_instant(&mut self, time: Instant) -> Result<(), Error<SPI>> {
        self.set_delayed_trx_time(time.hi32()).await
    }

    /// Sets DREF_TIME, the reference of [`DelayReference::Reference`]
    #[maybe_async_attr]
    pub async fn set_reference_trx_time(&mut self, time: u32) -> Result<(), Error<SPI>> {
        self.ll.dref_time().write(|w| w.value(time)).await?;
        Ok(())
    }

    /// Time between the end of a frame and the receiver turning on
    ///
    /// Used by [`TxMode::response_expected`]. In UWB microseconds, 20 bits.
    #[maybe_async_attr]
    pub async fn set_rx_after_tx_delay(&mut self, delay: u32) -> Result<(), Error<SPI>> {
        self.ll
            .ack_resp()
            .and_or(|w| w.w4r_tim(delay & 0x000f_ffff))
            .await?;
        Ok(())
    }

    /// Starts the transmission prepared in the TX buffer
    ///
    /// For delayed modes the chip reports with HPDWARN that the start time
    /// had already passed. The transceiver is then turned off and
    /// [`Error::DelayedTooLate`] is returned. A CCA transmission that found
    /// the channel busy shows up as [`SysStatus::CCA_FAIL`] afterwards.
    #[maybe_async_attr]
    pub async fn start_tx(&mut self, mode: TxMode) -> Result<(), Error<SPI>> {
        self.ll.fast_command(mode.fast_command() as u8).await?;

        if mode.delay.is_some() {
            let status = self.read_sys_status().await?;
            if status.contains(SysStatus::HPDWARN) {
                #[cfg(feature = "defmt")]
                defmt::warn!("delayed TX too late, {:?}", mode.delay);

                self.force_trx_off().await?;
                return Err(Error::DelayedTooLate);
            }
        }

        Ok(())
    }

    /// Sends raw bytes
    ///
    /// `data` goes to the start of the TX buffer, the chip appends the FCS.
    #[maybe_async_attr]
    pub async fn send_raw(
        &mut self,
        data: &[u8],
        mode: TxMode,
        ranging: bool,
    ) -> Result<(), Error<SPI>> {
        self.write_tx_data(data, 0).await?;
        self.write_tx_fctrl(data.len() as u16 + FCS_LEN, 0, ranging)
            .await?;
        self.start_tx(mode).await
    }

    /// Sends an IEEE 802.15.4 MAC frame
    ///
    /// The frame is sent as it is, without its FCS.
    #[maybe_async_attr]
    pub async fn send_frame<T>(
        &mut self,
        frame: Ieee802154Frame<T>,
        mode: TxMode,
    ) -> Result<(), Error<SPI>>
    where
        T: AsRef<[u8]>,
    {
        self.send_raw(frame.into_inner().as_ref(), mode, false).await
    }

    /// Creates an IEEE 802.15.4 data frame header from our own address
    ///
    /// For a broadcast use `Ieee802154Address::BROADCAST` and no PAN. Every
    /// call takes the next sequence number.
    #[maybe_async_attr]
    pub async fn build_frame_header(
        &mut self,
        dst_addr: Option<Ieee802154Address>,
        dst_pan_id: Option<Ieee802154Pan>,
    ) -> Result<Ieee802154Repr, Error<SPI>> {
        let (src_pan_id, src_addr) = self.get_address().await?;

        let seq = self.seq.0;
        self.seq += Wrapping(1);

        Ok(Ieee802154Repr {
            frame_type: smoltcp::wire::Ieee802154FrameType::Data,
            frame_version: smoltcp::wire::Ieee802154FrameVersion::Ieee802154_2006,
            security_enabled: false,
            sequence_number: Some(seq),
            frame_pending: false,
            ack_request: false,
            pan_id_compression: true,
            dst_addr,
            src_addr: Some(src_addr),
            src_pan_id: Some(src_pan_id),
            dst_pan_id,
        })
    }

    /// Writes a data frame carrying `data` into `buffer`
    ///
    /// Returns the length of header and payload.
    #[maybe_async_attr]
    pub async fn build_frame(
        &mut self,
        buffer: &mut [u8],
        data: &[u8],
        dst_addr: Option<Ieee802154Address>,
        dst_pan_id: Option<Ieee802154Pan>,
    ) -> Result<usize, Error<SPI>> {
        let header = self.build_frame_header(dst_addr, dst_pan_id).await?;

        let header_len = header.buffer_len();
        let len = header_len + data.len();
        if buffer.len() < len {
            return Err(Error::BufferTooSmall { required_len: len });
        }

        let mut frame = Ieee802154Frame::new_unchecked(&mut buffer[..len]);
        header.emit(&mut frame);
        buffer[header_len..len].copy_from_slice(data);

        Ok(len)
    }

    /// Waits for the transmission to finish
    ///
    /// Returns the TX timestamp once the frame is out, `WouldBlock` before.
    /// A CCA transmission that found the channel busy ends with
    /// [`Error::ChannelBusy`]. Use it with `block!` or together with the TX
    /// done interrupt.
    #[maybe_async_attr]
    pub async fn s_wait(&mut self) -> nb::Result<Instant, Error<SPI>> {
        let status = self.read_sys_status().await.map_err(nb::Error::Other)?;

        if status.contains(SysStatus::CCA_FAIL) {
            self.clear_sys_status(SysStatus::CCA_FAIL | SysStatus::ALL_TX)
                .await
                .map_err(nb::Error::Other)?;
            return Err(nb::Error::Other(Error::ChannelBusy));
        }

        if !status.contains(SysStatus::TXFRS) {
            return Err(nb::Error::WouldBlock);
        }

        let tx_time = self
            .read_tx_timestamp()
            .await
            .map_err(nb::Error::Other)?;

        self.clear_sys_status(SysStatus::ALL_TX)
            .await
            .map_err(nb::Error::Other)?;

        Ok(tx_time)
    }

    /// Sends frames back to back with the given repetition rate
    ///
    /// The frame in the TX buffer goes out every `rate` times 8 ns, at least
    /// 4. Run [`DW3000::configure`] and [`DW3000::configure_tx_rf`] first. A
    /// soft reset ends the mode.
    #[maybe_async_attr]
    pub async fn configure_continuous_frame(&mut self, rate: u32) -> Result<(), Error<SPI>> {
        self.ll.diag_tmc().and_or(|w| w.tx_pstm(1)).await?;
        self.set_delayed_trx_time(rate.max(CONTINUOUS_FRAME_MIN_RATE))
            .await?;
        self.start_tx(TxMode::immediate()).await
    }

    /// Repeats the frame in the TX buffer every `rate` times 8 ns
    ///
    /// Rates below 2 are raised to 2. Stop with
    /// [`DW3000::stop_repeated_frames`].
    #[maybe_async_attr]
    pub async fn repeated_frames(&mut self, rate: u32) -> Result<(), Error<SPI>> {
        self.ll.diag_tmc().and_or(|w| w.tx_pstm(1)).await?;
        self.set_delayed_trx_time(rate.max(REPEATED_FRAME_MIN_RATE))
            .await?;
        self.start_tx(TxMode::immediate()).await
    }

    /// Ends [`DW3000::repeated_frames`]
    #[maybe_async_attr]
    pub async fn stop_repeated_frames(&mut self) -> Result<(), Error<SPI>> {
        self.ll.diag_tmc().and_or(|w| w.tx_pstm(0)).await?;
        self.force_trx_off().await
    }

    /// Transmits an unmodulated carrier on the configured channel
    #[maybe_async_attr]
    pub async fn configure_continuous_wave(&mut self) -> Result<(), Error<SPI>> {
        // TX clock forced on, from the PLL
        self.ll.clk_ctrl().and_or(|w| w.tx_clk(0b10)).await?;
        self.ll.tx_test().write(|w| w.value(TX_TEST_CW)).await?;
        Ok(())
    }

    /// Ends [`DW3000::configure_continuous_wave`]
    #[maybe_async_attr]
    pub async fn stop_continuous_wave(&mut self) -> Result<(), Error<SPI>> {
        self.ll.tx_test().write(|w| w.value(0)).await?;
        self.ll.clk_ctrl().and_or(|w| w.tx_clk(0)).await?;
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

    #[test]
    fn modes_pick_their_fast_command() {
        assert_eq!(TxMode::immediate().fast_command(), FastCommand::Tx);
        assert_eq!(
            TxMode::immediate().expect_response().fast_command(),
            FastCommand::TxW4r
        );
        assert_eq!(
            TxMode::delayed(DelayReference::RxTimestamp).fast_command(),
            FastCommand::DelayedTxFromRx
        );
        assert_eq!(
            TxMode::delayed(DelayReference::Reference)
                .expect_response()
                .fast_command(),
            FastCommand::DelayedTxFromRefW4r
        );

        let cca = TxMode::from_flags(TxModeFlags::CCA | TxModeFlags::RESPONSE_EXPECTED).unwrap();
        assert_eq!(cca.fast_command(), FastCommand::CcaTxW4r);
    }

    #[test]
    fn flags_with_two_references_are_rejected() {
        assert_eq!(
            TxMode::from_flags(TxModeFlags::DELAYED | TxModeFlags::DLY_TS),
            Err(ConfigError::DelayReference)
        );
        assert_eq!(
            TxMode::from_flags(TxModeFlags::DLY_REF | TxModeFlags::CCA),
            Err(ConfigError::CcaDelayed)
        );
        assert_eq!(
            TxMode::from_flags(TxModeFlags::DLY_TS | TxModeFlags::RESPONSE_EXPECTED)
                .unwrap()
                .fast_command(),
            FastCommand::DelayedTxFromTxW4r
        );
    }

    #[test]
    fn clear_channel_modes_stay_immediate() {
        let mode = TxMode::clear_channel();
        assert!(mode.cca());
        assert_eq!(mode.delay(), None);
        assert_eq!(mode.fast_command(), FastCommand::CcaTx);
        assert_eq!(mode.flags(), TxModeFlags::CCA);

        let flags = TxModeFlags::DLY_RS | TxModeFlags::RESPONSE_EXPECTED;
        let delayed = TxMode::try_from(flags).unwrap();
        assert!(!delayed.cca());
        assert!(delayed.response_expected());
        assert_eq!(TxModeFlags::from(delayed), flags);
        assert_eq!(
            TxMode::try_from(TxModeFlags::DELAYED | TxModeFlags::CCA),
            Err(ConfigError::CcaDelayed)
        );
    }

    #[tokio::test]
    async fn raw_frame_is_written_and_started() {
        let mut dw3000 = ready(FakeChip::healthy(0xDECA_0302)).await;

        dw3000
            .send_raw(&[1, 2, 3, 4], TxMode::immediate(), true)
            .await
            .unwrap();

        assert_eq!(dw3000.ll().bus().get_bytes(0x14, 0, 4), vec![1, 2, 3, 4]);
        // length with FCS, ranging bit
        assert_eq!(dw3000.ll().bus().get16(0x00, 0x24) & 0x0bff, 0x0806);
        assert_eq!(
            dw3000.ll().bus().fast_commands.last(),
            Some(&(FastCommand::Tx as u8))
        );
    }

    #[tokio::test]
    async fn high_buffer_offset_gets_errata_fix() {
        let mut dw3000 = ready(FakeChip::healthy(0xDECA_0302)).await;

        dw3000.write_tx_fctrl(12, 200, false).await.unwrap();

        let txb_offset = (dw3000.ll().bus().get32(0x00, 0x24) >> 16) & 0x3ff;
        assert_eq!(txb_offset, 328);
    }

    #[tokio::test]
    async fn tx_data_must_fit() {
        let mut dw3000 = ready(FakeChip::healthy(0xDECA_0302)).await;

        let result = dw3000.write_tx_data(&[0; 32], 1000).await;
        assert!(matches!(
            result,
            Err(Error::BufferTooSmall { required_len: 1032 })
        ));

        let result = dw3000.write_tx_fctrl(200, 0, false).await;
        assert!(matches!(result, Err(Error::InvalidConfiguration)));
    }

    #[tokio::test]
    async fn late_delayed_tx_is_aborted() {
        let mut chip = FakeChip::healthy(0xDECA_0302);
        // HPDWARN next to RCINIT
        chip.set8(0x00, 0x47, 0x09);
        let mut dw3000 = ready(chip).await;

        dw3000.set_delayed_trx_time(0x1234_5600).await.unwrap();
        let result = dw3000
            .start_tx(TxMode::delayed(DelayReference::Absolute))
            .await;

        assert!(matches!(result, Err(Error::DelayedTooLate)));
        assert_eq!(
            dw3000.ll().bus().fast_commands,
            vec![FastCommand::DelayedTx as u8, FastCommand::TxRxOff as u8]
        );
        assert_eq!(dw3000.ll().bus().get32(0x00, 0x2C), 0x1234_5600);
    }

    #[tokio::test]
    async fn delayed_tx_in_time_is_left_running() {
        let mut dw3000 = ready(FakeChip::healthy(0xDECA_0302)).await;

        dw3000
            .start_tx(TxMode::delayed(DelayReference::TxTimestamp))
            .await
            .unwrap();

        assert_eq!(
            dw3000.ll().bus().fast_commands,
            vec![FastCommand::DelayedTxFromTx as u8]
        );
    }

    #[tokio::test]
    async fn s_wait_returns_tx_timestamp() {
        let mut chip = FakeChip::healthy(0xDECA_0302);
        chip.set_bytes(0x00, 0x74, &[0x00, 0x11, 0x22, 0x33, 0x44]);
        let mut dw3000 = ready(chip).await;

        assert!(matches!(dw3000.s_wait().await, Err(nb::Error::WouldBlock)));

        // TXFRS
        dw3000.ll().bus().set8(0x00, 0x44, 0x80);
        let tx_time = dw3000.s_wait().await.unwrap();

        assert_eq!(tx_time.value(), 0x44_3322_1100);
        assert_eq!(dw3000.ll().bus().get8(0x00, 0x44) & 0xf0, 0);
    }

    #[tokio::test]
    async fn frame_is_built_with_our_address() {
        let mut chip = FakeChip::healthy(0xDECA_0302);
        chip.set32(0x00, 0x0C, 0xdeca_0001);
        let mut dw3000 = ready(chip).await;

        let mut buffer = [0; 64];
        let len = dw3000
            .build_frame(
                &mut buffer,
                b"ping",
                Some(Ieee802154Address::BROADCAST),
                Some(Ieee802154Pan(0xdeca)),
            )
            .await
            .unwrap();

        let frame = Ieee802154Frame::new_checked(&buffer[..len]).unwrap();
        assert_eq!(frame.sequence_number(), Some(0));
        assert_eq!(frame.src_addr(), Some(Ieee802154Address::Short([0x00, 0x01])));
        assert!(frame.payload().unwrap().starts_with(b"ping"));

        let mut small = [0; 8];
        let result = dw3000.build_frame(&mut small, b"ping", None, None).await;
        assert!(matches!(result, Err(Error::BufferTooSmall { .. })));
    }

    #[tokio::test]
    async fn test_modes() {
        let mut dw3000 = ready(FakeChip::healthy(0xDECA_0302)).await;

        dw3000.repeated_frames(1).await.unwrap();
        assert_eq!(dw3000.ll().bus().get32(0x00, 0x2C), 2);
        assert_eq!(dw3000.ll().bus().get8(0x0F, 0x24) & 0x10, 0x10);

        dw3000.stop_repeated_frames().await.unwrap();
        assert_eq!(dw3000.ll().bus().get8(0x0F, 0x24) & 0x10, 0);

        dw3000.configure_continuous_frame(1).await.unwrap();
        assert_eq!(dw3000.ll().bus().get32(0x00, 0x2C), 4);

        dw3000.configure_continuous_wave().await.unwrap();
        assert_eq!(dw3000.ll().bus().get8(0x07, 0x28), 0x0f);
        dw3000.stop_continuous_wave().await.unwrap();
        assert_eq!(dw3000.ll().bus().get8(0x07, 0x28), 0);
    }
}
