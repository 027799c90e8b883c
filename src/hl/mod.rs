//! High-level interface to the DW3xxx
//!
//! The entry point to this API is the [DW3000] struct. Please refer to the
//! documentation there for more details.
//!
//! This module implements a high-level interface to the DW3000 and QM33xxx.
//! This is the recommended way to access the chip using this crate, unless you
//! need the greater flexibility provided by the [register-level interface].
//!
//! The driver is a plain value owned by the caller. Every operation takes
//! `&mut self`, so there is no hidden global state and several chips can be
//! driven side by side. If an interrupt handler and the main code share one
//! chip, the caller puts the driver behind its own mutex.
//!
//! [register-level interface]: ../ll/index.html

use core::{fmt, num::Wrapping};

pub use aes::*;
pub use awake::*;
pub use calibration::*;
pub use carrier_freq_offset::*;
pub use cir::*;
pub use diagnostics::*;
pub use error::*;
pub use events::*;
pub use nlos::*;
pub use otp::*;
pub use ranging::*;
pub use receiving::*;
pub use sending::*;
pub use sleeping::*;
pub use state::*;
pub use txpower::*;
pub use uninitialized::*;

use crate::{configs::Config, ll};

mod aes;
mod awake;
mod calibration;
mod carrier_freq_offset;
mod cir;
mod configure;
mod diagnostics;
mod error;
mod events;
mod nlos;
mod otp;
mod ranging;
mod ready;
mod receiving;
mod retry;
mod sending;
mod sleeping;
mod state;
mod txpower;
mod uninitialized;

#[cfg(test)]
pub(crate) mod fake;

/// Entry point to the DW3xxx driver API
pub struct DW3000<SPI, State> {
    ll: ll::DW3000<SPI>,
    seq: Wrapping<u8>,
    state: State,
    ctx: Context,
}

// Can't be derived without putting requirements on `SPI`.
impl<SPI, State> fmt::Debug for DW3000<SPI, State>
where
    State: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "DW3000 {{ state: ")?;
        self.state.fmt(f)?;
        write!(f, ", variant: {:?}, .. }}", self.ctx.variant)?;

        Ok(())
    }
}

impl<SPI, State> DW3000<SPI, State> {
    /// Moves the driver into another lifecycle state, keeping the context
    fn into_state<Next>(self, state: Next) -> DW3000<SPI, Next> {
        DW3000 {
            ll: self.ll,
            seq: self.seq,
            state,
            ctx: self.ctx,
        }
    }
}

/// Everything the driver remembers about one chip
#[derive(Clone, Debug)]
pub(crate) struct Context {
    /// Set by `identify`
    pub(crate) variant: Option<ChipVariant>,
    pub(crate) otp: OtpData,
    /// Last configuration applied with `configure`
    pub(crate) config: Config,
    pub(crate) xtal_trim: u8,
    /// On-wake behaviour programmed by `configure_sleep`
    pub(crate) on_wake: OnWake,
    pub(crate) double_buffer: Option<DoubleBufferMode>,
    /// Buffer the next good frame is read from
    pub(crate) rx_buffer: u8,
    pub(crate) handlers: Handlers,
    /// PLL coarse code that locked last, per channel
    pub(crate) pll_coarse_code: [Option<u32>; 2],
    pub(crate) cia_diag: CiaDiagLog,
    /// Follows the STS length of `config`
    pub(crate) sts_quality_threshold: i16,
    /// Set by `configure_aes`
    pub(crate) aes: Option<AesConfig>,
}

impl Default for Context {
    fn default() -> Self {
        Context {
            variant: None,
            otp: OtpData::default(),
            config: Config::default(),
            xtal_trim: DEFAULT_XTAL_TRIM,
            on_wake: OnWake::empty(),
            double_buffer: None,
            rx_buffer: 0,
            handlers: Handlers::new(),
            pll_coarse_code: [None; 2],
            cia_diag: CiaDiagLog::Off,
            sts_quality_threshold: configure::sts_quality_threshold(Config::default().sts_length),
            aes: None,
        }
    }
}

/// Indicates that the `DW3000` instance is not initialized yet
#[derive(Debug)]
pub struct Uninitialized;

/// Indicates that the `DW3000` instance is ready to be used
#[derive(Debug)]
pub struct Ready;

/// Indicates that the `DW3000` instance is sleeping or in deep sleep
#[derive(Debug)]
pub struct Sleeping;

/// Any state where the chip answers SPI transactions
pub trait Awake {}

impl Awake for Uninitialized {}
impl Awake for Ready {}
