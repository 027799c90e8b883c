//! Receive sequencing
//!
//! [`DW3000::rx_enable`] turns the receiver on, right away or at a time
//! relative to one of the [`DelayReference`]s. A reception ends with a good
//! frame, an error or a timeout; [`DW3000::r_wait`] polls for that outcome
//! and reads the frame, [`DW3000::isr`] does the same from the interrupt
//! line.
//!
//! With double buffering the chip alternates between two RX buffers, each
//! with its own copy of the frame information. The driver keeps track of the
//! buffer the next frame is read from.

use bitflags::bitflags;
use smoltcp::wire::Ieee802154Frame;

use super::{sending::delay_from_flags, DelayReference, RdbStatus, SysStatus};
use crate::{
    configs::ConfigError, maybe_async_attr, spi_type, time::Instant, Error, FastCommand, Ready,
    DW3000,
};

/// Size of each RX buffer
pub const RX_BUFFER_LEN: usize = 1024;

/// RX buffer 0, buffer 1 follows
const RX_BUFFER_0: u8 = 0x12;

/// Frame information of double buffer set 0, set 1 follows
pub(crate) const DB_DIAG_SET_0: u8 = 0x18;

/// Offset of the RX timestamp inside a double buffer set
pub(crate) const DB_RX_TIME: u16 = 0x04;

/// An incoming message
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Message<'l> {
    /// The time the message was received
    ///
    /// This time is based on the local system time, as defined in the SYS_TIME
    /// register.
    pub rx_time: Instant,

    /// Quality of the received message, if the diagnostics allow computing it
    pub rx_quality: Option<RxQuality>,

    /// The MAC frame
    pub frame: Ieee802154Frame<&'l [u8]>,
}

/// A struct representing the quality of the received message.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RxQuality {
    /// The confidence that there was Line Of Sight between the sender and the
    /// receiver.
    ///
    /// - 0 means it's very unlikely there was LOS.
    /// - 1 means it's very likely there was LOS.
    ///
    /// The number doesn't give a guarantee, but an indication.
    pub los_confidence_level: f32,
    /// The radio signal strength indicator in dBm.
    ///
    /// The value is an estimation that is quite accurate up to -85 dBm.
    /// Above -85 dBm, the estimation underestimates the actual value.
    pub rssi: f32,
}

/// RX_FINFO of the last frame
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RxFrameInfo {
    /// Frame length with FCS, not yet masked by the PHR mode
    pub length: u16,
    /// Ranging bit of the PHR
    pub ranging: bool,
    /// Data rate, 1 for 6.8 Mbps
    pub bitrate: u8,
    /// PRF of the frame
    pub prf: u8,
    /// Preamble symbols accumulated
    pub preamble_count: u16,
}

impl RxFrameInfo {
    /// Decodes the register value
    pub fn from_raw(raw: u32) -> Self {
        RxFrameInfo {
            length: (raw & 0x3ff) as u16,
            ranging: raw & (1 << 15) != 0,
            bitrate: ((raw >> 13) & 0x1) as u8,
            prf: ((raw >> 16) & 0x3) as u8,
            preamble_count: (raw >> 20) as u16,
        }
    }
}

bitflags! {
    /// Mode flags of a reception, as used by host protocols
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct RxModeFlags: u8 {
        /// Start at DX_TIME
        const DELAYED = 0x01;
        /// Stay idle if the start time already passed
        const IDLE_ON_DLY_ERR = 0x02;
        /// Start at DREF_TIME + DX_TIME
        const DLY_REF = 0x04;
        /// Start at the last RX timestamp + DX_TIME
        const DLY_RS = 0x08;
        /// Start at the last TX timestamp + DX_TIME
        const DLY_TS = 0x10;
    }
}

/// How the receiver is turned on
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RxMode {
    /// Delayed start, `None` turns the receiver on right away
    pub delay: Option<DelayReference>,
    /// If the start time already passed, stay idle instead of turning the
    /// receiver on immediately
    pub idle_on_delay_error: bool,
}

impl RxMode {
    /// Turn the receiver on right away
    pub const fn immediate() -> Self {
        RxMode {
            delay: None,
            idle_on_delay_error: false,
        }
    }

    /// Turn the receiver on at a time relative to `reference`
    pub const fn delayed(reference: DelayReference) -> Self {
        RxMode {
            delay: Some(reference),
            idle_on_delay_error: false,
        }
    }

    /// Builds a mode from its flags
    ///
    /// At most one delay reference may be set.
    pub fn from_flags(flags: RxModeFlags) -> Result<Self, ConfigError> {
        let delay = delay_from_flags(
            flags.contains(RxModeFlags::DELAYED),
            flags.contains(RxModeFlags::DLY_REF),
            flags.contains(RxModeFlags::DLY_RS),
            flags.contains(RxModeFlags::DLY_TS),
        )?;

        Ok(RxMode {
            delay,
            idle_on_delay_error: flags.contains(RxModeFlags::IDLE_ON_DLY_ERR),
        })
    }

    /// The fast command starting this reception
    pub fn fast_command(&self) -> FastCommand {
        match self.delay {
            None => FastCommand::Rx,
            Some(DelayReference::Absolute) => FastCommand::DelayedRx,
            Some(DelayReference::Reference) => FastCommand::DelayedRxFromRef,
            Some(DelayReference::RxTimestamp) => FastCommand::DelayedRxFromRx,
            Some(DelayReference::TxTimestamp) => FastCommand::DelayedRxFromTx,
        }
    }
}

/// Double buffer operation
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DoubleBufferMode {
    /// The receiver is re-enabled after every frame and the driver frees the
    /// buffer once the frame was handled
    Auto,
    /// The application frees each buffer with
    /// [`DW3000::signal_rx_buff_free`]
    Manual,
}

/// Duty cycle of SNIFF mode
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SniffMode {
    /// Receiver on time in PAC units, 1 to 15. The chip adds one PAC.
    pub on_time: u8,
    /// Receiver off time in microseconds, 1.0256 us units
    pub off_time: u8,
}

bitflags! {
    /// Frames accepted by the frame filter
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct FrameFilter: u16 {
        /// Beacon frames
        const BEACON = 0x0001;
        /// Data frames
        const DATA = 0x0002;
        /// ACK frames
        const ACK = 0x0004;
        /// MAC command frames
        const MAC = 0x0008;
        /// Reserved frame types
        const RSVD = 0x0010;
        /// Multipurpose frames
        const MULTI = 0x0020;
        /// Fragmented frames
        const FRAG = 0x0040;
        /// Extended frame types
        const EXTEND = 0x0080;
        /// Act as PAN coordinator
        const COORD = 0x0100;
        /// Accept broadcast addresses without a PAN
        const IMPBRCAST = 0x0200;
        /// Data pending for low energy address 0
        const MAC_LE0 = 0x0408;
        /// Data pending for low energy address 1
        const MAC_LE1 = 0x0808;
        /// Data pending for low energy address 2
        const MAC_LE2 = 0x1008;
        /// Data pending for low energy address 3
        const MAC_LE3 = 0x2008;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for FrameFilter {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "FrameFilter({=u16:#x})", self.bits())
    }
}

/// Maps the error events of a failed reception, the most specific first
fn rx_error<SPI>(status: SysStatus) -> Option<Error<SPI>>
where
    SPI: spi_type::spi::SpiDevice<u8>,
{
    None.or_else(|| status.contains(SysStatus::RXFCE).then_some(Error::Fcs))
        .or_else(|| status.contains(SysStatus::RXPHE).then_some(Error::Phy))
        .or_else(|| status.contains(SysStatus::RXFSL).then_some(Error::ReedSolomon))
        .or_else(|| status.contains(SysStatus::RXSTO).then_some(Error::SfdTimeout))
        .or_else(|| {
            status
                .contains(SysStatus::ARFE)
                .then_some(Error::FrameFilteringRejection)
        })
        .or_else(|| status.contains(SysStatus::RXFTO).then_some(Error::FrameWaitTimeout))
        .or_else(|| status.contains(SysStatus::RXOVRR).then_some(Error::Overrun))
        .or_else(|| {
            status
                .contains(SysStatus::RXPTO)
                .then_some(Error::PreambleDetectionTimeout)
        })
}

impl<SPI> DW3000<SPI, Ready>
where
    SPI: spi_type::spi::SpiDevice<u8>,
{
    /// Returns the RX state of the DW3000
    #[maybe_async_attr]
    pub async fn rx_state(&mut self) -> Result<u8, Error<SPI>> {
        Ok(self.ll.sys_state().read().await?.rx_state())
    }

    /// Turns the receiver on
    ///
    /// For delayed modes the chip reports with HPDWARN that the start time
    /// had already passed. The transceiver is then turned off and, unless
    /// `idle_on_delay_error` is set, the receiver is turned on right away.
    /// [`Error::DelayedRxLate`] is returned in both cases.
    #[maybe_async_attr]
    pub async fn rx_enable(&mut self, mode: RxMode) -> Result<(), Error<SPI>> {
        self.ll.fast_command(mode.fast_command() as u8).await?;

        if mode.delay.is_some() {
            let status = self.read_sys_status().await?;
            if status.contains(SysStatus::HPDWARN) {
                #[cfg(feature = "defmt")]
                defmt::warn!(
                    "delayed RX too late, {:?}, staying idle: {=bool}",
                    mode.delay,
                    mode.idle_on_delay_error
                );

                self.force_trx_off().await?;
                if !mode.idle_on_delay_error {
                    self.ll.fast_command(FastCommand::Rx as u8).await?;
                }
                return Err(Error::DelayedRxLate);
            }
        }

        Ok(())
    }

    /// Sets the frame wait timeout in UWB microseconds, 0 disables it
    #[maybe_async_attr]
    pub async fn set_rx_timeout(&mut self, timeout: u32) -> Result<(), Error<SPI>> {
        if timeout == 0 {
            self.ll.sys_cfg().and_or(|w| w.rxwtoe(0)).await?;
        } else {
            self.ll
                .rx_fwto()
                .write(|w| w.value(timeout & 0x000f_ffff))
                .await?;
            self.ll.sys_cfg().and_or(|w| w.rxwtoe(1)).await?;
        }
        Ok(())
    }

    /// Sets the preamble detection timeout
    ///
    /// The receiver gives up after `timeout + 1` PACs without preamble. 0
    /// disables the timeout.
    #[maybe_async_attr]
    pub async fn set_preamble_detect_timeout(&mut self, timeout: u16) -> Result<(), Error<SPI>> {
        self.ll.pre_toc().write(|w| w.value(timeout)).await?;
        Ok(())
    }

    /// Enables SNIFF mode, or disables it with `None`
    #[maybe_async_attr]
    pub async fn set_sniff_mode(&mut self, mode: Option<SniffMode>) -> Result<(), Error<SPI>> {
        let (on_time, off_time) = match mode {
            Some(mode) => {
                if mode.on_time == 0 || mode.on_time > 15 {
                    return Err(Error::InvalidConfiguration);
                }
                (mode.on_time, mode.off_time)
            }
            None => (0, 0),
        };

        self.ll
            .rx_sniff()
            .write(|w| w.sniff_on(on_time).sniff_off(off_time))
            .await?;
        Ok(())
    }

    /// Enables double buffering, or disables it with `None`
    ///
    /// The next frame is read from buffer 0.
    #[maybe_async_attr]
    pub async fn set_double_buffer_mode(
        &mut self,
        mode: Option<DoubleBufferMode>,
    ) -> Result<(), Error<SPI>> {
        let (dis_drxb, rxautr) = match mode {
            None => (1, 0),
            Some(DoubleBufferMode::Auto) => (0, 1),
            Some(DoubleBufferMode::Manual) => (0, 0),
        };

        self.ll
            .sys_cfg()
            .and_or(|w| w.dis_drxb(dis_drxb).rxautr(rxautr))
            .await?;

        self.ctx.double_buffer = mode;
        self.ctx.rx_buffer = 0;
        Ok(())
    }

    /// Tells the chip that the host is done with the current RX buffer
    ///
    /// Diagnostics of that buffer must not be read afterwards.
    #[maybe_async_attr]
    pub async fn signal_rx_buff_free(&mut self) -> Result<(), Error<SPI>> {
        self.ll.fast_command(FastCommand::DbToggle as u8).await?;
        self.ctx.rx_buffer ^= 1;
        Ok(())
    }

    /// Buffer the next frame is read from
    pub fn rx_buffer_index(&self) -> u8 {
        self.ctx.rx_buffer
    }

    /// Frame information of the current buffer
    #[maybe_async_attr]
    pub async fn read_rx_finfo(&mut self) -> Result<RxFrameInfo, Error<SPI>> {
        let raw = match self.ctx.double_buffer {
            Some(_) => self.ll.read32(DB_DIAG_SET_0 + self.ctx.rx_buffer, 0).await?,
            None => self.ll.read32(0x00, 0x4C).await?,
        };
        Ok(RxFrameInfo::from_raw(raw))
    }

    /// Copies received bytes, starting at `offset` of the current buffer
    #[maybe_async_attr]
    pub async fn read_rx_data(&mut self, buffer: &mut [u8], offset: u16) -> Result<(), Error<SPI>> {
        if offset as usize + buffer.len() > RX_BUFFER_LEN {
            return Err(Error::InvalidConfiguration);
        }

        let file = match self.ctx.double_buffer {
            Some(_) => RX_BUFFER_0 + self.ctx.rx_buffer,
            None => RX_BUFFER_0,
        };
        self.ll.read_bytes(file, offset, buffer).await?;
        Ok(())
    }

    /// Selects which frames pass the filter, `None` accepts everything
    #[maybe_async_attr]
    pub async fn configure_frame_filter(
        &mut self,
        filter: Option<FrameFilter>,
    ) -> Result<(), Error<SPI>> {
        match filter {
            Some(filter) => {
                self.ll.ff_cfg().write(|w| w.value(filter.bits())).await?;
                self.ll.sys_cfg().and_or(|w| w.ffen(1)).await?;
            }
            None => {
                self.ll.sys_cfg().and_or(|w| w.ffen(0)).await?;
                self.ll.ff_cfg().write(|w| w.value(0)).await?;
            }
        }
        Ok(())
    }

    /// Sets the PAN identifier used by the frame filter
    #[maybe_async_attr]
    pub async fn set_pan_id(&mut self, pan_id: u16) -> Result<(), Error<SPI>> {
        self.ll.panadr().and_or(|w| w.pan_id(pan_id)).await?;
        Ok(())
    }

    /// Sets the 16-bit short address used by the frame filter
    #[maybe_async_attr]
    pub async fn set_short_address(&mut self, address: u16) -> Result<(), Error<SPI>> {
        self.ll.panadr().and_or(|w| w.short_addr(address)).await?;
        Ok(())
    }

    /// Sets the 64-bit extended address
    #[maybe_async_attr]
    pub async fn set_eui(&mut self, eui: u64) -> Result<(), Error<SPI>> {
        self.ll.eui().write(|w| w.value(eui)).await?;
        Ok(())
    }

    /// Stores one of the four low energy addresses with pending data
    #[maybe_async_attr]
    pub async fn configure_le_address(&mut self, address: u16, index: u8) -> Result<(), Error<SPI>> {
        match index {
            0 => self.ll.le_pend_01().and_or(|w| w.le_addr0(address)).await?,
            1 => self.ll.le_pend_01().and_or(|w| w.le_addr1(address)).await?,
            2 => self.ll.le_pend_23().and_or(|w| w.le_addr2(address)).await?,
            3 => self.ll.le_pend_23().and_or(|w| w.le_addr3(address)).await?,
            _ => return Err(Error::InvalidConfiguration),
        }
        Ok(())
    }

    /// Enables or disables automatic ACKs
    ///
    /// `response_delay` is the turnaround in symbols. Frame filtering has to
    /// be on for the chip to acknowledge anything.
    #[maybe_async_attr]
    pub async fn enable_auto_ack(
        &mut self,
        response_delay: u8,
        enable: bool,
    ) -> Result<(), Error<SPI>> {
        self.ll
            .ack_resp()
            .and_or(|w| w.ack_tim(response_delay))
            .await?;
        self.ll
            .sys_cfg()
            .and_or(|w| w.auto_ack(enable as u8))
            .await?;
        Ok(())
    }

    /// Waits for a frame and returns it as an IEEE 802.15.4 frame
    ///
    /// Returns `WouldBlock` while the reception is still going on. A failed
    /// reception is acknowledged and reported as the error of its most
    /// specific event. Use it with `block!` or together with the RX
    /// interrupts.
    #[maybe_async_attr]
    pub async fn r_wait<'b>(&mut self, buffer: &'b mut [u8]) -> nb::Result<Message<'b>, Error<SPI>> {
        let (len, rx_time) = self.receive_frame(buffer).await?;

        #[cfg(feature = "rssi")]
        let rx_quality = self.rx_quality().await.ok();
        #[cfg(not(feature = "rssi"))]
        let rx_quality = None;

        self.finish_frame().await.map_err(nb::Error::Other)?;

        let frame = Ieee802154Frame::new_checked(&buffer[..len])
            .map_err(|_| nb::Error::Other(Error::InvalidFrame))?;

        Ok(Message {
            rx_time,
            rx_quality,
            frame,
        })
    }

    /// Waits for a frame and copies its bytes into `buffer`
    ///
    /// Returns the frame length, FCS included, and the RX timestamp.
    #[maybe_async_attr]
    pub async fn r_wait_buf(&mut self, buffer: &mut [u8]) -> nb::Result<(usize, Instant), Error<SPI>> {
        let received = self.receive_frame(buffer).await?;
        self.finish_frame().await.map_err(nb::Error::Other)?;
        Ok(received)
    }

    #[maybe_async_attr]
    async fn receive_frame(&mut self, buffer: &mut [u8]) -> nb::Result<(usize, Instant), Error<SPI>> {
        let status = self.read_sys_status().await.map_err(nb::Error::Other)?;
        let frame_good = match self.ctx.double_buffer {
            Some(_) => self
                .current_buffer_events()
                .await
                .map_err(nb::Error::Other)?
                .contains(RdbStatus::RXFCG0),
            None => status.contains(SysStatus::RXFCG),
        };

        if !frame_good {
            let Some(error) = rx_error::<SPI>(status) else {
                return Err(nb::Error::WouldBlock);
            };

            self.clear_sys_status(SysStatus::ALL_RX_ERR | SysStatus::ALL_RX_TO | SysStatus::RXOVRR)
                .await
                .map_err(nb::Error::Other)?;

            return Err(nb::Error::Other(error));
        }

        let finfo = self.read_rx_finfo().await.map_err(nb::Error::Other)?;
        let len = (finfo.length & self.ctx.config.phr_mode.frame_length_mask()) as usize;
        if buffer.len() < len {
            return Err(nb::Error::Other(Error::BufferTooSmall { required_len: len }));
        }

        self.read_rx_data(&mut buffer[..len], 0)
            .await
            .map_err(nb::Error::Other)?;
        let rx_time = self.read_rx_timestamp().await.map_err(nb::Error::Other)?;

        Ok((len, rx_time))
    }

    /// Acknowledges the frame and frees its buffer in automatic mode
    #[maybe_async_attr]
    async fn finish_frame(&mut self) -> Result<(), Error<SPI>> {
        self.clear_sys_status(SysStatus::ALL_RX_GOOD).await?;
        if self.ctx.double_buffer.is_some() {
            self.clear_rdb_status(RdbStatus::buffer_events(self.ctx.rx_buffer))
                .await?;
        }
        if self.ctx.double_buffer == Some(DoubleBufferMode::Auto) {
            self.signal_rx_buff_free().await?;
        }
        Ok(())
    }
}
