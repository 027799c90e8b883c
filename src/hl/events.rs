//! Interrupt sources and event dispatch
//!
//! [`DW3000::isr`] reads SYS_STATUS once, decides which event the snapshot
//! stands for and calls the handler registered for it. Handlers are plain
//! function pointers set with [`DW3000::set_callbacks`]; an event without a
//! handler is still acknowledged on the chip.

use core::fmt;

use bitflags::bitflags;

use crate::{configs::StsMode, maybe_async_attr, spi_type, Error, Ready, DW3000};

use super::diagnostics::{DUAL_SPI_FILE, DUAL_SPI_INT_ENABLE, DUAL_SPI_STATUS};

bitflags! {
    /// Events of SYS_STATUS, also the interrupt sources of SYS_ENABLE
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct SysStatus: u64 {
        /// Interrupt line asserted
        const IRQS = 1 << 0;
        /// PLL locked
        const CP_LOCK = 1 << 1;
        /// SPI write CRC error
        const SPICRCE = 1 << 2;
        /// ACK frame requested
        const AAT = 1 << 3;
        /// Transmission started
        const TXFRB = 1 << 4;
        /// Preamble sent
        const TXPRS = 1 << 5;
        /// PHY header sent
        const TXPHS = 1 << 6;
        /// Frame sent
        const TXFRS = 1 << 7;
        /// Preamble detected
        const RXPRD = 1 << 8;
        /// SFD detected
        const RXSFDD = 1 << 9;
        /// CIA processing done
        const CIADONE = 1 << 10;
        /// PHY header detected
        const RXPHD = 1 << 11;
        /// PHY header error
        const RXPHE = 1 << 12;
        /// Data frame ready
        const RXFR = 1 << 13;
        /// FCS good
        const RXFCG = 1 << 14;
        /// FCS error
        const RXFCE = 1 << 15;
        /// Reed Solomon frame sync loss
        const RXFSL = 1 << 16;
        /// Frame wait timeout
        const RXFTO = 1 << 17;
        /// CIA error
        const CIAERR = 1 << 18;
        /// Low voltage warning
        const VWARN = 1 << 19;
        /// Receiver overrun
        const RXOVRR = 1 << 20;
        /// Preamble detection timeout
        const RXPTO = 1 << 21;
        /// SPI ready after reset or wake up
        const SPIRDY = 1 << 23;
        /// IDLE_RC reached
        const RCINIT = 1 << 24;
        /// PLL losing lock
        const PLL_HILO = 1 << 25;
        /// SFD timeout
        const RXSTO = 1 << 26;
        /// Half period warning, a delayed TX or RX started late
        const HPDWARN = 1 << 27;
        /// STS quality error
        const CPERR = 1 << 28;
        /// Frame filtering rejection
        const ARFE = 1 << 29;
        /// Timer 0 expired
        const TIMER0 = 1 << 30;
        /// Timer 1 expired
        const TIMER1 = 1 << 31;
        /// Clear channel assessment failed, the frame was not sent
        const CCA_FAIL = 1 << 44;

        /// Every TX event
        const ALL_TX = Self::TXFRB.bits() | Self::TXPRS.bits() | Self::TXPHS.bits() | Self::TXFRS.bits();
        /// Every event of a good reception
        const ALL_RX_GOOD = Self::RXFR.bits()
            | Self::RXFCG.bits()
            | Self::RXPRD.bits()
            | Self::RXSFDD.bits()
            | Self::RXPHD.bits()
            | Self::CIADONE.bits();
        /// Receive timeouts
        const ALL_RX_TO = Self::RXFTO.bits() | Self::RXPTO.bits() | Self::CPERR.bits();
        /// Receive errors
        const ALL_RX_ERR = Self::RXPHE.bits()
            | Self::RXFCE.bits()
            | Self::RXFSL.bits()
            | Self::RXSTO.bits()
            | Self::ARFE.bits()
            | Self::CIAERR.bits()
            | Self::CPERR.bits();
        /// Errors that still mean a good frame for STS-only packets
        const ND_RX_ERR = Self::CIAERR.bits() | Self::RXSTO.bits();
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for SysStatus {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "SysStatus({=u64:#x})", self.bits())
    }
}

bitflags! {
    /// Details of a received frame
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct RxFlags: u8 {
        /// The ranging bit of the PHR was set
        const RANGING = 0x01;
        /// STS-only packet without PHR or payload
        const NO_DATA = 0x02;
        /// CIA processing finished
        const CIA_DONE = 0x04;
        /// CIA processing failed
        const CIA_ERROR = 0x08;
        /// STS quality error
        const STS_ERROR = 0x10;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for RxFlags {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "RxFlags({=u8:#x})", self.bits())
    }
}

bitflags! {
    /// Events of RDB_STATUS, the receive events of the two RX buffers when
    /// double buffering is on
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct RdbStatus: u8 {
        /// Good frame in buffer 0
        const RXFCG0 = 0x01;
        /// Frame ready in buffer 0
        const RXFR0 = 0x02;
        /// CIA done for buffer 0
        const CIADONE0 = 0x04;
        /// STS error for buffer 0
        const CP_ERR0 = 0x08;
        /// Good frame in buffer 1
        const RXFCG1 = 0x10;
        /// Frame ready in buffer 1
        const RXFR1 = 0x20;
        /// CIA done for buffer 1
        const CIADONE1 = 0x40;
        /// STS error for buffer 1
        const CP_ERR1 = 0x80;

        /// Everything about buffer 0
        const BUFFER0 = 0x0f;
        /// Everything about buffer 1
        const BUFFER1 = 0xf0;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for RdbStatus {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "RdbStatus({=u8:#x})", self.bits())
    }
}

impl RdbStatus {
    /// All events of RX buffer `buffer`
    pub fn buffer_events(buffer: u8) -> RdbStatus {
        if buffer == 0 {
            RdbStatus::BUFFER0
        } else {
            RdbStatus::BUFFER1
        }
    }

    /// The events of `buffer`, moved to the positions of buffer 0
    pub fn of_buffer(&self, buffer: u8) -> RdbStatus {
        let shift = if buffer == 0 { 0 } else { 4 };
        RdbStatus::from_bits_retain((self.bits() >> shift) & RdbStatus::BUFFER0.bits())
    }
}

/// How [`DW3000::set_interrupt`] applies its mask
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InterruptOption {
    /// Disable the sources in the mask, leave the others
    Disable,
    /// Enable the sources in the mask, leave the others
    Enable,
    /// Enable exactly the sources in the mask
    EnableOnly,
    /// Like `Enable`, plus the dual SPI availability interrupts
    EnableDualSpi,
    /// Like `EnableOnly`, plus the dual SPI availability interrupts
    EnableOnlyDualSpi,
}

/// Kinds of events the dispatch reports
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EventKind {
    /// A frame was sent
    TxDone,
    /// A good frame was received
    RxOk,
    /// Frame wait or preamble timeout
    RxTimeout,
    /// Reception failed
    RxError,
    /// The chip saw a bad CRC on a write
    SpiError,
    /// A read did not match its CRC
    SpiReadError,
    /// The chip woke up and the SPI is usable
    SpiReady,
    /// The other host released the dual SPI semaphore
    DualSpi,
}

/// Snapshot handed to the handlers
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CallbackData {
    /// SYS_STATUS as read on entry
    pub status: SysStatus,
    /// Events of the current RX buffer with double buffering, in the
    /// positions of buffer 0
    pub rdb_status: RdbStatus,
    /// Length of the received frame, FCS included
    pub data_length: u16,
    /// Details of the received frame
    pub rx_flags: RxFlags,
    /// Dual SPI availability bits
    pub dss_stat: u8,
}

/// Event handler
pub type Handler = fn(&CallbackData);

/// Handlers called by [`DW3000::isr`]
#[derive(Copy, Clone, Default)]
pub struct Handlers {
    /// Frame sent
    pub tx_done: Option<Handler>,
    /// Good frame received
    pub rx_ok: Option<Handler>,
    /// Receive timeout
    pub rx_timeout: Option<Handler>,
    /// Receive error
    pub rx_error: Option<Handler>,
    /// SPI write CRC error
    pub spi_error: Option<Handler>,
    /// SPI read CRC mismatch
    pub spi_read_error: Option<Handler>,
    /// SPI ready
    pub spi_ready: Option<Handler>,
    /// Dual SPI semaphore available
    pub dual_spi: Option<Handler>,
}

impl Handlers {
    /// No handler registered
    pub const fn new() -> Self {
        Handlers {
            tx_done: None,
            rx_ok: None,
            rx_timeout: None,
            rx_error: None,
            spi_error: None,
            spi_read_error: None,
            spi_ready: None,
            dual_spi: None,
        }
    }

    /// The handler of an event kind
    pub fn get(&self, kind: EventKind) -> Option<Handler> {
        match kind {
            EventKind::TxDone => self.tx_done,
            EventKind::RxOk => self.rx_ok,
            EventKind::RxTimeout => self.rx_timeout,
            EventKind::RxError => self.rx_error,
            EventKind::SpiError => self.spi_error,
            EventKind::SpiReadError => self.spi_read_error,
            EventKind::SpiReady => self.spi_ready,
            EventKind::DualSpi => self.dual_spi,
        }
    }

    /// Registers or removes the handler of an event kind
    pub fn set(&mut self, kind: EventKind, handler: Option<Handler>) {
        let slot = match kind {
            EventKind::TxDone => &mut self.tx_done,
            EventKind::RxOk => &mut self.rx_ok,
            EventKind::RxTimeout => &mut self.rx_timeout,
            EventKind::RxError => &mut self.rx_error,
            EventKind::SpiError => &mut self.spi_error,
            EventKind::SpiReadError => &mut self.spi_read_error,
            EventKind::SpiReady => &mut self.spi_ready,
            EventKind::DualSpi => &mut self.dual_spi,
        };
        *slot = handler;
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Handlers")
            .field("tx_done", &self.tx_done.is_some())
            .field("rx_ok", &self.rx_ok.is_some())
            .field("rx_timeout", &self.rx_timeout.is_some())
            .field("rx_error", &self.rx_error.is_some())
            .field("spi_error", &self.spi_error.is_some())
            .field("spi_read_error", &self.spi_read_error.is_some())
            .field("spi_ready", &self.spi_ready.is_some())
            .field("dual_spi", &self.dual_spi.is_some())
            .finish()
    }
}

impl<SPI> DW3000<SPI, Ready>
where
    SPI: spi_type::spi::SpiDevice<u8>,
{
    /// Replaces all event handlers
    pub fn set_callbacks(&mut self, handlers: Handlers) {
        self.ctx.handlers = handlers;
    }

    /// Registers or removes a single event handler
    pub fn set_callback(&mut self, kind: EventKind, handler: Option<Handler>) {
        self.ctx.handlers.set(kind, handler);
    }

    /// Returns the pending events
    #[maybe_async_attr]
    pub async fn read_sys_status(&mut self) -> Result<SysStatus, Error<SPI>> {
        let value = self.ll.sys_status().read().await?.value();
        Ok(SysStatus::from_bits_retain(value))
    }

    /// Acknowledges events
    #[maybe_async_attr]
    pub async fn clear_sys_status(&mut self, events: SysStatus) -> Result<(), Error<SPI>> {
        self.ll
            .sys_status()
            .write(|w| w.value(events.bits()))
            .await?;
        Ok(())
    }

    /// Returns true if the interrupt line is asserted
    #[maybe_async_attr]
    pub async fn check_irq(&mut self) -> Result<bool, Error<SPI>> {
        Ok(self.read_sys_status().await?.contains(SysStatus::IRQS))
    }

    /// Returns the pending events of both RX buffers
    #[maybe_async_attr]
    pub async fn read_rdb_status(&mut self) -> Result<RdbStatus, Error<SPI>> {
        let value = self.ll.rdb_status().read().await?.value();
        Ok(RdbStatus::from_bits_retain(value))
    }

    /// Acknowledges RX buffer events
    #[maybe_async_attr]
    pub async fn clear_rdb_status(&mut self, events: RdbStatus) -> Result<(), Error<SPI>> {
        self.ll
            .rdb_status()
            .write(|w| w.value(events.bits()))
            .await?;
        Ok(())
    }

    /// Events of the RX buffer in use, empty without double buffering
    #[maybe_async_attr]
    pub(crate) async fn current_buffer_events(&mut self) -> Result<RdbStatus, Error<SPI>> {
        if self.ctx.double_buffer.is_none() {
            return Ok(RdbStatus::empty());
        }
        let rdb = self.read_rdb_status().await?;
        Ok(rdb.of_buffer(self.ctx.rx_buffer))
    }

    /// Selects which events assert the interrupt line
    ///
    /// The dual SPI options are only available on chips with two SPI ports.
    #[maybe_async_attr]
    pub async fn set_interrupt(
        &mut self,
        mask: SysStatus,
        option: InterruptOption,
    ) -> Result<(), Error<SPI>> {
        let dual_spi = matches!(
            option,
            InterruptOption::EnableDualSpi | InterruptOption::EnableOnlyDualSpi
        );
        if dual_spi && !self.ctx.variant.map_or(false, |v| v.has_dual_spi()) {
            return Err(Error::InvalidConfiguration);
        }

        let lo = mask.bits() as u32;
        let hi = (mask.bits() >> 32) as u16;
        match option {
            InterruptOption::Disable => {
                self.ll.and_or32(0x00, 0x3C, !lo, 0).await?;
                self.ll.and_or16(0x00, 0x40, !hi, 0).await?;
            }
            InterruptOption::Enable | InterruptOption::EnableDualSpi => {
                self.ll.and_or32(0x00, 0x3C, u32::MAX, lo).await?;
                self.ll.and_or16(0x00, 0x40, u16::MAX, hi).await?;
            }
            InterruptOption::EnableOnly | InterruptOption::EnableOnlyDualSpi => {
                self.ll.sys_enable().write(|w| w.lo(lo).hi(hi)).await?;
            }
        }

        if dual_spi {
            self.ll
                .and_or8(DUAL_SPI_FILE, DUAL_SPI_INT_ENABLE, 0xff, 0x03)
                .await?;
        }

        Ok(())
    }

    /// Processes the pending events
    ///
    /// Exactly one kind of event is handled per call, in this order: frame
    /// sent, good frame, receive timeout, receive error, SPI errors, SPI
    /// ready, dual SPI. The events are acknowledged whether or not a handler
    /// is registered. Returns the kind that was handled.
    #[maybe_async_attr]
    pub async fn isr(&mut self) -> Result<Option<EventKind>, Error<SPI>> {
        let status = self.read_sys_status().await?;
        let rdb_status = self.current_buffer_events().await?;
        let mut data = CallbackData {
            status,
            rdb_status,
            ..Default::default()
        };

        let no_data = self.ctx.config.sts_mode == StsMode::NoData;
        // with double buffering the good frame events live in RDB_STATUS
        let (frame_good, cia_done) = match self.ctx.double_buffer {
            Some(_) => (
                rdb_status.contains(RdbStatus::RXFCG0),
                rdb_status.contains(RdbStatus::CIADONE0),
            ),
            None => (
                status.contains(SysStatus::RXFCG),
                status.contains(SysStatus::CIADONE),
            ),
        };

        let kind = if status.contains(SysStatus::TXFRS) {
            self.clear_sys_status(SysStatus::ALL_TX).await?;
            Some(EventKind::TxDone)
        } else if frame_good || (no_data && cia_done) {
            self.rx_ok_event(&mut data, no_data).await?;
            Some(EventKind::RxOk)
        } else if status.intersects(SysStatus::RXFTO | SysStatus::RXPTO) {
            self.clear_sys_status(SysStatus::ALL_RX_TO).await?;
            self.force_trx_off().await?;
            self.rx_reset().await?;
            Some(EventKind::RxTimeout)
        } else if status.intersects(SysStatus::ALL_RX_ERR) {
            self.clear_sys_status(SysStatus::ALL_RX_ERR).await?;
            self.force_trx_off().await?;
            self.rx_reset().await?;
            Some(EventKind::RxError)
        } else if status.contains(SysStatus::SPICRCE) {
            self.clear_sys_status(SysStatus::SPICRCE).await?;
            Some(EventKind::SpiError)
        } else if self.ll.take_crc_read_error() {
            #[cfg(feature = "defmt")]
            defmt::warn!("SPI read CRC mismatch");

            Some(EventKind::SpiReadError)
        } else if status.contains(SysStatus::SPIRDY) && !self.ctx.on_wake.is_empty() {
            self.clear_sys_status(SysStatus::SPIRDY | SysStatus::RCINIT)
                .await?;
            Some(EventKind::SpiReady)
        } else if self.ctx.variant.map_or(false, |v| v.has_dual_spi()) {
            let dss_stat = self.ll.read8(DUAL_SPI_FILE, DUAL_SPI_STATUS).await? & 0x06;
            if dss_stat != 0 {
                self.ll
                    .write8(DUAL_SPI_FILE, DUAL_SPI_STATUS, dss_stat)
                    .await?;
                data.dss_stat = dss_stat;
                Some(EventKind::DualSpi)
            } else {
                None
            }
        } else {
            None
        };

        if let Some(kind) = kind {
            #[cfg(feature = "defmt")]
            defmt::trace!("event {:?}, status {:?}", kind, status);

            if let Some(handler) = self.ctx.handlers.get(kind) {
                handler(&data);
            }

            // the handler is done with the buffer
            if kind == EventKind::RxOk {
                self.toggle_rx_buffer().await?;
            }
        }

        Ok(kind)
    }

    #[maybe_async_attr]
    async fn rx_ok_event(&mut self, data: &mut CallbackData, no_data: bool) -> Result<(), Error<SPI>> {
        let status = data.status;
        let rdb = data.rdb_status;

        self.clear_sys_status(SysStatus::ALL_RX_GOOD).await?;
        if self.ctx.double_buffer.is_some() {
            self.clear_rdb_status(RdbStatus::buffer_events(self.ctx.rx_buffer))
                .await?;
        }

        let finfo = self.read_rx_finfo().await?;
        data.data_length = finfo.length & self.ctx.config.phr_mode.frame_length_mask();

        if finfo.ranging {
            data.rx_flags |= RxFlags::RANGING;
        }
        if no_data {
            data.rx_flags |= RxFlags::NO_DATA;
            data.data_length = 0;
        }
        if status.contains(SysStatus::CIADONE) || rdb.contains(RdbStatus::CIADONE0) {
            data.rx_flags |= RxFlags::CIA_DONE;
        }
        if status.contains(SysStatus::CIAERR) {
            data.rx_flags |= RxFlags::CIA_ERROR;
            self.clear_sys_status(SysStatus::CIAERR).await?;
        }
        if status.contains(SysStatus::CPERR) || rdb.contains(RdbStatus::CP_ERR0) {
            data.rx_flags |= RxFlags::STS_ERROR;
            self.clear_sys_status(SysStatus::CPERR).await?;
        }

        Ok(())
    }

    /// Moves to the other RX buffer after a frame was handled
    ///
    /// Only the automatic double buffer mode does this here. In manual mode
    /// the application calls [`DW3000::signal_rx_buff_free`] once it read
    /// the frame.
    #[maybe_async_attr]
    async fn toggle_rx_buffer(&mut self) -> Result<(), Error<SPI>> {
        if self.ctx.double_buffer == Some(super::DoubleBufferMode::Auto) {
            self.signal_rx_buff_free().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        hl::{fake::FakeChip, InitSkip},
        FastCommand,
    };

    use core::sync::atomic::{AtomicU32, Ordering};
    use embedded_hal_mock::eh1::delay::NoopDelay;

    async fn ready(chip: FakeChip) -> DW3000<FakeChip, Ready> {
        DW3000::new(chip)
            .initialise(&mut NoopDelay::new(), InitSkip::empty())
            .await
            .unwrap()
    }

    #[test]
    fn status_groups() {
        assert_eq!(SysStatus::ALL_TX.bits(), 0xf0);
        assert_eq!(SysStatus::ALL_RX_GOOD.bits(), 0x6f00);
        assert_eq!(SysStatus::ALL_RX_TO.bits(), 0x1022_0000);
        assert_eq!(SysStatus::ALL_RX_ERR.bits(), 0x3405_9000);
        assert_eq!(SysStatus::CCA_FAIL.bits() >> 32, 0x1000);
    }

    static TX_CALLS: AtomicU32 = AtomicU32::new(0);
    static RX_LENGTH: AtomicU32 = AtomicU32::new(0);

    fn on_tx(_: &CallbackData) {
        TX_CALLS.fetch_add(1, Ordering::SeqCst);
    }

    fn on_rx(data: &CallbackData) {
        RX_LENGTH.store(data.data_length as u32, Ordering::SeqCst);
    }

    #[tokio::test]
    async fn tx_done_takes_priority() {
        let mut chip = FakeChip::healthy(0xDECA_0302);
        // TXFRS and RXFCG together, SPIRDY and RCINIT kept
        chip.set32(0x00, 0x44, 0x0180_4080);
        let mut dw3000 = ready(chip).await;
        dw3000.set_callbacks(Handlers {
            tx_done: Some(on_tx),
            rx_ok: Some(on_rx),
            ..Handlers::new()
        });

        let kind = dw3000.isr().await.unwrap();

        assert_eq!(kind, Some(EventKind::TxDone));
        assert_eq!(TX_CALLS.load(Ordering::SeqCst), 1);
        // TX events cleared, the frame is still pending
        assert_eq!(dw3000.ll().bus().get32(0x00, 0x44) & 0xff, 0x02);
        assert_eq!(dw3000.ll().bus().get32(0x00, 0x44) & 0x4000, 0x4000);
    }

    #[tokio::test]
    async fn good_frame_reports_length_and_flags() {
        let mut chip = FakeChip::healthy(0xDECA_0302);
        // RXFCG, CIADONE
        chip.set32(0x00, 0x44, 0x0180_4400);
        // 20 bytes, ranging bit
        chip.set32(0x00, 0x4C, 0x0000_8014);
        let mut dw3000 = ready(chip).await;
        dw3000.set_callback(EventKind::RxOk, Some(on_rx));

        let kind = dw3000.isr().await.unwrap();

        assert_eq!(kind, Some(EventKind::RxOk));
        assert_eq!(RX_LENGTH.load(Ordering::SeqCst), 20);
        assert_eq!(dw3000.ll().bus().get32(0x00, 0x44) & 0x6f00, 0);
    }

    #[tokio::test]
    async fn events_are_cleared_without_handler() {
        let mut chip = FakeChip::healthy(0xDECA_0302);
        // RXFTO
        chip.set32(0x00, 0x44, 0x0182_0000);
        let mut dw3000 = ready(chip).await;

        let kind = dw3000.isr().await.unwrap();

        assert_eq!(kind, Some(EventKind::RxTimeout));
        assert_eq!(dw3000.ll().bus().get32(0x00, 0x44) & 0x0002_0000, 0);
        // receiver off and reset
        assert!(dw3000.ll().bus().fast_commands.contains(&0));
        assert_eq!(dw3000.ll().bus().get16(0x11, 0x00), 0xFF);
    }

    #[tokio::test]
    async fn timeout_recovery_consumes_pending_errors() {
        let mut chip = FakeChip::healthy(0xDECA_0302);
        // RXFCE and RXPTO
        chip.set32(0x00, 0x44, 0x01a0_8000);
        let mut dw3000 = ready(chip).await;

        assert_eq!(dw3000.isr().await.unwrap(), Some(EventKind::RxTimeout));
        // turning the transceiver off acknowledged the error too
        assert_eq!(dw3000.ll().bus().get32(0x00, 0x44) & 0x8000, 0);
        assert_eq!(dw3000.isr().await.unwrap(), None);
    }

    #[tokio::test]
    async fn double_buffer_toggles_after_good_frame() {
        let mut chip = FakeChip::healthy(0xDECA_0302);
        // RXFCG0
        chip.set8(0x01, 0x24, 0x01);
        let mut dw3000 = ready(chip).await;
        dw3000.ctx.double_buffer = Some(crate::hl::DoubleBufferMode::Auto);

        assert_eq!(dw3000.isr().await.unwrap(), Some(EventKind::RxOk));

        assert_eq!(dw3000.ctx.rx_buffer, 1);
        assert_eq!(
            dw3000.ll().bus().fast_commands.last(),
            Some(&(FastCommand::DbToggle as u8))
        );
    }

    static RDB_SEEN: AtomicU32 = AtomicU32::new(0);

    fn on_buffered_rx(data: &CallbackData) {
        RDB_SEEN.store(data.rdb_status.bits() as u32, Ordering::SeqCst);
    }

    #[tokio::test]
    async fn double_buffer_events_come_from_rdb_status() {
        let mut chip = FakeChip::healthy(0xDECA_0302);
        // buffer 0: RXFCG0, RXFR0, CIADONE0; buffer 1: RXFR1
        chip.set8(0x01, 0x24, 0x27);
        // 12 bytes in the frame information of set 0
        chip.set32(0x18, 0x00, 0x0000_000c);
        let mut dw3000 = ready(chip).await;
        dw3000.ctx.double_buffer = Some(crate::hl::DoubleBufferMode::Manual);
        dw3000.set_callback(EventKind::RxOk, Some(on_buffered_rx));

        assert_eq!(dw3000.isr().await.unwrap(), Some(EventKind::RxOk));
        assert_eq!(RDB_SEEN.load(Ordering::SeqCst), 0x07);
        // only the events of buffer 0 are acknowledged
        assert_eq!(dw3000.read_rdb_status().await.unwrap(), RdbStatus::RXFR1);
        // manual mode leaves the buffer to the application
        assert_eq!(dw3000.ctx.rx_buffer, 0);

        // SYS_STATUS alone does not make a good frame in this mode
        dw3000.ll().bus().set32(0x00, 0x44, 0x0180_4000);
        assert_eq!(dw3000.isr().await.unwrap(), None);
    }

    #[test]
    fn buffer_events_move_to_buffer_zero() {
        let rdb = RdbStatus::RXFCG1 | RdbStatus::CP_ERR1 | RdbStatus::RXFR0;
        assert_eq!(rdb.of_buffer(1), RdbStatus::RXFCG0 | RdbStatus::CP_ERR0);
        assert_eq!(rdb.of_buffer(0), RdbStatus::RXFR0);
        assert_eq!(RdbStatus::buffer_events(1).bits(), 0xf0);
    }

    #[tokio::test]
    async fn interrupt_masks() {
        let mut chip = FakeChip::healthy(0xDECA_0302);
        chip.set32(0x00, 0x3C, 0x0000_0100);
        let mut dw3000 = ready(chip).await;

        dw3000
            .set_interrupt(SysStatus::TXFRS | SysStatus::CCA_FAIL, InterruptOption::Enable)
            .await
            .unwrap();
        assert_eq!(dw3000.ll().bus().get32(0x00, 0x3C), 0x0000_0180);
        assert_eq!(dw3000.ll().bus().get16(0x00, 0x40), 0x1000);

        dw3000
            .set_interrupt(SysStatus::RXPRD, InterruptOption::Disable)
            .await
            .unwrap();
        assert_eq!(dw3000.ll().bus().get32(0x00, 0x3C), 0x0000_0080);

        dw3000
            .set_interrupt(SysStatus::RXFCG, InterruptOption::EnableOnly)
            .await
            .unwrap();
        assert_eq!(dw3000.ll().bus().get32(0x00, 0x3C), 0x0000_4000);
        assert_eq!(dw3000.ll().bus().get16(0x00, 0x40), 0);

        let result = dw3000
            .set_interrupt(SysStatus::RXFCG, InterruptOption::EnableDualSpi)
            .await;
        assert!(matches!(result, Err(Error::InvalidConfiguration)));
    }
}
