//! Enumeration for fast commands
//!
//! Fast commands are single octet SPI transactions that start or stop the
//! transceiver without touching any register.

/// Fast command enumeration to easily control the module
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum FastCommand {
    /// Go to IDLE and clear any events
    TxRxOff = 0x00,
    /// Start transmission immediately
    Tx = 0x01,
    /// Enable RX immediately
    Rx = 0x02,
    /// Delayed TX w.r.t. DX_TIME
    DelayedTx = 0x03,
    /// Delayed RX w.r.t. DX_TIME
    DelayedRx = 0x04,
    /// Delayed TX w.r.t. TX timestamp + DX_TIME
    DelayedTxFromTx = 0x05,
    /// Delayed RX w.r.t. TX timestamp + DX_TIME
    DelayedRxFromTx = 0x06,
    /// Delayed TX w.r.t. RX timestamp + DX_TIME
    DelayedTxFromRx = 0x07,
    /// Delayed RX w.r.t. RX timestamp + DX_TIME
    DelayedRxFromRx = 0x08,
    /// Delayed TX w.r.t. DREF_TIME + DX_TIME
    DelayedTxFromRef = 0x09,
    /// Delayed RX w.r.t. DREF_TIME + DX_TIME
    DelayedRxFromRef = 0x0A,
    /// TX if no preamble is detected
    CcaTx = 0x0B,
    /// Start TX immediately, then enable the receiver
    TxW4r = 0x0C,
    /// Delayed TX w.r.t. DX_TIME, then enable the receiver
    DelayedTxW4r = 0x0D,
    /// Delayed TX w.r.t. TX timestamp + DX_TIME, then enable the receiver
    DelayedTxFromTxW4r = 0x0E,
    /// Delayed TX w.r.t. RX timestamp + DX_TIME, then enable the receiver
    DelayedTxFromRxW4r = 0x0F,
    /// Delayed TX w.r.t. DREF_TIME + DX_TIME, then enable the receiver
    DelayedTxFromRefW4r = 0x10,
    /// TX if no preamble is detected, then enable the receiver
    CcaTxW4r = 0x11,
    /// Clear all interrupt events
    ClearIrqs = 0x12,
    /// Toggle the double buffer pointer, the host is done with the current
    /// buffer
    DbToggle = 0x13,
}

impl FastCommand {
    /// The octet that goes on the wire
    pub fn opcode(self) -> u8 {
        0x81 | ((self as u8) << 1)
    }
}
