use core::fmt;

#[cfg(feature = "defmt")]
use defmt::Format;

use crate::{configs::ConfigError, ll, spi_type};
use spi_type::spi;

/// General failure
pub const ERROR: i32 = -1;
/// The PLL did not lock
pub const ERR_PLL_LOCK: i32 = -2;
/// PGF calibration did not complete
pub const ERR_RX_CAL_PGF: i32 = -3;
/// I branch resistor calibration failed
pub const ERR_RX_CAL_RESI: i32 = -4;
/// Q branch resistor calibration failed
pub const ERR_RX_CAL_RESQ: i32 = -5;
/// ADC offset calibration failed
pub const ERR_RX_ADC_CAL: i32 = -6;
/// Operation not allowed in the current state
pub const ERR_WRONG_STATE: i32 = -9;

/// Invalid AES job parameters
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
pub enum AesError {
    /// Header plus payload don't fit in the source memory
    DataSize,
    /// The mode does not fit the key or the core
    WrongMode,
    /// MIC size not supported by the selected core
    WrongMicSize,
    /// The payload is longer than the core can handle
    PayloadSize,
}

impl AesError {
    /// Numeric code of the error
    pub fn code(&self) -> i32 {
        match self {
            AesError::DataSize => -1,
            AesError::WrongMode => -2,
            AesError::WrongMicSize => -3,
            AesError::PayloadSize => -4,
        }
    }
}

/// An error that can occur when driving the transceiver
pub enum Error<SPI>
where
    SPI: spi::ErrorType,
{
    /// Error occured while using SPI bus
    Spi(ll::Error<SPI>),

    /// DEV_ID did not match any supported chip
    UnknownDevice(u32),

    /// The PLL did not lock within the retry budget
    PllLock,

    /// PGF calibration did not finish
    RxCalPgf,

    /// Resistor calibration of the I branch failed
    RxCalResI,

    /// Resistor calibration of the Q branch failed
    RxCalResQ,

    /// ADC offset calibration failed
    RxAdcCal,

    /// A delayed transmission was too late, the transmitter was turned off
    DelayedTooLate,

    /// A delayed reception was too late
    ///
    /// Unless the receive mode asked to stay idle, the receiver was enabled
    /// immediately instead.
    DelayedRxLate,

    /// Clear channel assessment saw a preamble, nothing was sent
    ChannelBusy,

    /// The chip is not in a state that allows the operation
    WrongState,

    /// The wake up line could not be driven
    WakeUp,

    /// The configuration was not valid. Some combinations of settings are not
    /// allowed.
    InvalidConfiguration,

    /// Invalid AES parameters
    Aes(AesError),

    /// Receiver FCS error
    Fcs,

    /// PHY header error
    Phy,

    /// Receiver Reed Solomon Frame Sync Loss
    ReedSolomon,

    /// Receiver SFD Timeout
    SfdTimeout,

    /// Receiver Frame Wait Timeout
    FrameWaitTimeout,

    /// Preamble Detection Timeout
    PreambleDetectionTimeout,

    /// Receiver Overrun
    Overrun,

    /// Frame was rejected because due to automatic frame filtering
    FrameFilteringRejection,

    /// The received bytes are not an IEEE 802.15.4 frame
    InvalidFrame,

    /// Buffer too small
    BufferTooSmall {
        /// Indicates how large a buffer would have been required
        required_len: usize,
    },

    /// The RSSI was not calculable.
    RssiNotCalculable,

    /// Read back of a programmed OTP word did not match
    OtpVerify,
}

impl<SPI> Error<SPI>
where
    SPI: spi::ErrorType,
{
    /// Numeric status code of the error
    ///
    /// Errors without a dedicated code report the general failure code.
    pub fn code(&self) -> i32 {
        match self {
            Error::PllLock => ERR_PLL_LOCK,
            Error::RxCalPgf => ERR_RX_CAL_PGF,
            Error::RxCalResI => ERR_RX_CAL_RESI,
            Error::RxCalResQ => ERR_RX_CAL_RESQ,
            Error::RxAdcCal => ERR_RX_ADC_CAL,
            Error::WrongState => ERR_WRONG_STATE,
            Error::Aes(error) => error.code(),
            _ => ERROR,
        }
    }

    /// Whether the error leaves the chip in an undefined configuration
    ///
    /// The only recovery is a reset followed by a new initialisation.
    pub fn needs_reset(&self) -> bool {
        matches!(
            self,
            Error::UnknownDevice(_)
                | Error::PllLock
                | Error::RxCalPgf
                | Error::RxCalResI
                | Error::RxCalResQ
                | Error::RxAdcCal
        )
    }
}

impl<SPI> From<ll::Error<SPI>> for Error<SPI>
where
    SPI: spi::ErrorType,
{
    fn from(error: ll::Error<SPI>) -> Self {
        Error::Spi(error)
    }
}

impl<SPI> From<ConfigError> for Error<SPI>
where
    SPI: spi::ErrorType,
{
    fn from(_: ConfigError) -> Self {
        Error::InvalidConfiguration
    }
}

impl<SPI> From<AesError> for Error<SPI>
where
    SPI: spi::ErrorType,
{
    fn from(error: AesError) -> Self {
        Error::Aes(error)
    }
}

// We can't derive this implementation, as `Debug` is only implemented
// conditionally for `ll::Debug`.
impl<SPI> fmt::Debug for Error<SPI>
where
    SPI: spi::ErrorType,
    SPI::Error: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Spi(error) => write!(f, "Spi({:?})", error),
            Error::UnknownDevice(id) => write!(f, "UnknownDevice({:#010x})", id),
            Error::PllLock => write!(f, "PllLock"),
            Error::RxCalPgf => write!(f, "RxCalPgf"),
            Error::RxCalResI => write!(f, "RxCalResI"),
            Error::RxCalResQ => write!(f, "RxCalResQ"),
            Error::RxAdcCal => write!(f, "RxAdcCal"),
            Error::DelayedTooLate => write!(f, "DelayedTooLate"),
            Error::DelayedRxLate => write!(f, "DelayedRxLate"),
            Error::ChannelBusy => write!(f, "ChannelBusy"),
            Error::WrongState => write!(f, "WrongState"),
            Error::WakeUp => write!(f, "WakeUp"),
            Error::InvalidConfiguration => write!(f, "InvalidConfiguration"),
            Error::Aes(error) => write!(f, "Aes({:?})", error),
            Error::Fcs => write!(f, "Fcs"),
            Error::Phy => write!(f, "Phy"),
            Error::ReedSolomon => write!(f, "ReedSolomon"),
            Error::SfdTimeout => write!(f, "SfdTimeout"),
            Error::FrameWaitTimeout => write!(f, "FrameWaitTimeout"),
            Error::PreambleDetectionTimeout => write!(f, "PreambleDetectionTimeout"),
            Error::Overrun => write!(f, "Overrun"),
            Error::FrameFilteringRejection => write!(f, "FrameFilteringRejection"),
            Error::InvalidFrame => write!(f, "InvalidFrame"),
            Error::BufferTooSmall { required_len } => {
                write!(f, "BufferTooSmall {{ required_len: {:?} }}", required_len,)
            }
            Error::RssiNotCalculable => write!(f, "RssiNotCalculable"),
            Error::OtpVerify => write!(f, "OtpVerify"),
        }
    }
}

#[cfg(feature = "defmt")]
impl<SPI> Format for Error<SPI>
where
    SPI: spi::ErrorType,
{
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::Spi(error) => defmt::write!(f, "Spi({:?})", error),
            Error::UnknownDevice(id) => defmt::write!(f, "UnknownDevice({=u32:#x})", id),
            Error::PllLock => defmt::write!(f, "PllLock"),
            Error::RxCalPgf => defmt::write!(f, "RxCalPgf"),
            Error::RxCalResI => defmt::write!(f, "RxCalResI"),
            Error::RxCalResQ => defmt::write!(f, "RxCalResQ"),
            Error::RxAdcCal => defmt::write!(f, "RxAdcCal"),
            Error::DelayedTooLate => defmt::write!(f, "DelayedTooLate"),
            Error::DelayedRxLate => defmt::write!(f, "DelayedRxLate"),
            Error::ChannelBusy => defmt::write!(f, "ChannelBusy"),
            Error::WrongState => defmt::write!(f, "WrongState"),
            Error::WakeUp => defmt::write!(f, "WakeUp"),
            Error::InvalidConfiguration => defmt::write!(f, "InvalidConfiguration"),
            Error::Aes(error) => defmt::write!(f, "Aes({:?})", error),
            Error::Fcs => defmt::write!(f, "Fcs"),
            Error::Phy => defmt::write!(f, "Phy"),
            Error::ReedSolomon => defmt::write!(f, "ReedSolomon"),
            Error::SfdTimeout => defmt::write!(f, "SfdTimeout"),
            Error::FrameWaitTimeout => defmt::write!(f, "FrameWaitTimeout"),
            Error::PreambleDetectionTimeout => defmt::write!(f, "PreambleDetectionTimeout"),
            Error::Overrun => defmt::write!(f, "Overrun"),
            Error::FrameFilteringRejection => defmt::write!(f, "FrameFilteringRejection"),
            Error::InvalidFrame => defmt::write!(f, "InvalidFrame"),
            Error::BufferTooSmall { required_len } => {
                defmt::write!(f, "BufferTooSmall {{ required_len: {=usize} }}", required_len)
            }
            Error::RssiNotCalculable => defmt::write!(f, "RssiNotCalculable"),
            Error::OtpVerify => defmt::write!(f, "OtpVerify"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use embedded_hal_mock::eh1::spi::Mock as SpiMock;

    #[test]
    fn status_codes() {
        assert_eq!(Error::<SpiMock<u8>>::PllLock.code(), -2);
        assert_eq!(Error::<SpiMock<u8>>::RxAdcCal.code(), -6);
        assert_eq!(Error::<SpiMock<u8>>::WrongState.code(), -9);
        assert_eq!(Error::<SpiMock<u8>>::DelayedTooLate.code(), -1);
        assert_eq!(Error::<SpiMock<u8>>::Aes(AesError::WrongMicSize).code(), -3);
        assert!(Error::<SpiMock<u8>>::RxCalResQ.needs_reset());
        assert!(!Error::<SpiMock<u8>>::DelayedRxLate.needs_reset());
    }

    #[cfg(feature = "defmt")]
    #[test]
    fn test_defmt() {
        let error = Error::<SpiMock<u8>>::BufferTooSmall { required_len: 42 };

        defmt::info!("error: {:?}", error);
    }
}
