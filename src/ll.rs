//! Low-level interface to the DW3xxx
//!
//! This module implements a register-level interface to the DW3000 and the
//! QM33xxx family. Users of this library should typically not need to use
//! this. Please consider using the [high-level interface] instead.
//!
//! Every register access is a single SPI transaction using two-octet
//! addressing. On top of plain reads and writes, the chip supports a masked
//! write mode where the written value is `(old & and_mask) | or_mask`, which
//! gives read-modify-write semantics without a second transaction. Registers
//! that are 1, 2 or 4 bytes wide can use [`RegAccessor::and_or`] for that.
//!
//! **NOTE**: Many field access methods accept types that have a larger number
//! of bits than the field actually consists of. If you use such a method to
//! pass a value that is too large to be written to the field, it will be
//! silently truncated.
//!
//! [high-level interface]: ../hl/index.html

use core::{fmt, marker::PhantomData};

use crate::{maybe_async_attr, spi_type};
use spi_type::spi::{Operation, SpiDevice};

/// CRC-8 used by the SPI CRC mode (polynomial 0x07, zero initial value)
pub const SPI_CRC: crc::Crc<u8> = crc::Crc::<u8>::new(&crc::CRC_8_SMBUS);

/// Largest sub-address reachable with the two-octet header. Anything above
/// has to go through the indirect pointer.
const MAX_DIRECT_OFFSET: u16 = 0x7F;

/// SPI CRC protection of register traffic
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SpiCrcMode {
    /// No CRC
    Off,
    /// A CRC byte is appended to every write
    Write,
    /// Writes carry a CRC and every read is checked against SPI_RD_CRC
    WriteRead,
}

/// Entry point to the DW3xxx driver's low-level API
///
/// Please consider using [hl::DW3000] instead.
///
/// [hl::DW3000]: ../hl/struct.DW3000.html
pub struct DW3000<SPI> {
    pub(crate) spi: SPI,
    crc: SpiCrcMode,
    crc_read_error: bool,
}

impl<SPI> DW3000<SPI> {
    /// Create a new instance of `DW3000`
    ///
    /// Requires the SPI device that is connected to the chip. Chip select is
    /// handled by the `SpiDevice` implementation.
    pub fn new(spi: SPI) -> Self {
        DW3000 {
            spi,
            crc: SpiCrcMode::Off,
            crc_read_error: false,
        }
    }

    /// Allow access to the SPI bus
    pub fn bus(&mut self) -> &mut SPI {
        &mut self.spi
    }

    /// Give the SPI device back
    pub fn release(self) -> SPI {
        self.spi
    }

    /// Select how register traffic is protected
    ///
    /// This only changes what the host does. The chip side is switched with
    /// `SYS_CFG.spi_crcen`, which the high-level driver takes care of.
    pub fn set_crc_mode(&mut self, mode: SpiCrcMode) {
        self.crc = mode;
    }

    /// Current SPI CRC mode
    pub fn crc_mode(&self) -> SpiCrcMode {
        self.crc
    }

    /// Returns and clears the latched read CRC mismatch flag
    pub fn take_crc_read_error(&mut self) -> bool {
        core::mem::replace(&mut self.crc_read_error, false)
    }

    fn write_crc(&self, parts: &[&[u8]]) -> Option<u8> {
        if self.crc == SpiCrcMode::Off {
            return None;
        }
        let mut digest = SPI_CRC.digest();
        for part in parts {
            digest.update(part);
        }
        Some(digest.finalize())
    }
}

impl<SPI> DW3000<SPI>
where
    SPI: SpiDevice<u8>,
{
    /// Send a fast command
    ///
    /// Fast commands are a single octet and never carry a CRC.
    #[maybe_async_attr]
    pub async fn fast_command(&mut self, fast: u8) -> Result<(), Error<SPI>> {
        let buffer = [0x81 | ((fast << 1) & 0x3e)];
        self.spi.write(&buffer).await.map_err(Error::Write)
    }

    /// Holds chip select low for `hold_us` without clocking any data
    ///
    /// This wakes the chip from sleep when wake on chip select is enabled.
    #[maybe_async_attr]
    pub async fn wake_up(&mut self, hold_us: u32) -> Result<(), Error<SPI>> {
        self.spi
            .transaction(&mut [Operation::DelayNs(hold_us.saturating_mul(1000))])
            .await
            .map_err(Error::Transfer)
    }

    /// Reads `data.len()` bytes starting at `offset` of register file `id`
    ///
    /// Offsets above 127 are reached through indirect pointer A.
    #[maybe_async_attr]
    pub async fn read_bytes(
        &mut self,
        id: u8,
        offset: u16,
        data: &mut [u8],
    ) -> Result<(), Error<SPI>> {
        let (id, sub) = self.route(id, offset).await?;
        let header = header(false, id, sub, 0);

        self.spi
            .transaction(&mut [Operation::Write(&header), Operation::Read(data)])
            .await
            .map_err(Error::Transfer)?;

        if self.crc == SpiCrcMode::WriteRead {
            let mut digest = SPI_CRC.digest();
            digest.update(&header);
            digest.update(data);
            self.check_read_crc(digest.finalize()).await?;
        }

        Ok(())
    }

    /// Writes `data` starting at `offset` of register file `id`
    #[maybe_async_attr]
    pub async fn write_bytes(&mut self, id: u8, offset: u16, data: &[u8]) -> Result<(), Error<SPI>> {
        let (id, sub) = self.route(id, offset).await?;
        let header = header(true, id, sub, 0);

        self.write_parts(&header, data, &[]).await
    }

    /// Reads a single byte
    #[maybe_async_attr]
    pub async fn read8(&mut self, id: u8, offset: u16) -> Result<u8, Error<SPI>> {
        let mut buf = [0; 1];
        self.read_bytes(id, offset, &mut buf).await?;
        Ok(buf[0])
    }

    /// Reads a little-endian 16-bit word
    #[maybe_async_attr]
    pub async fn read16(&mut self, id: u8, offset: u16) -> Result<u16, Error<SPI>> {
        let mut buf = [0; 2];
        self.read_bytes(id, offset, &mut buf).await?;
        Ok(u16::from_le_bytes(buf))
    }

    /// Reads a little-endian 32-bit word
    #[maybe_async_attr]
    pub async fn read32(&mut self, id: u8, offset: u16) -> Result<u32, Error<SPI>> {
        let mut buf = [0; 4];
        self.read_bytes(id, offset, &mut buf).await?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Writes a single byte
    #[maybe_async_attr]
    pub async fn write8(&mut self, id: u8, offset: u16, value: u8) -> Result<(), Error<SPI>> {
        self.write_bytes(id, offset, &[value]).await
    }

    /// Writes a little-endian 16-bit word
    #[maybe_async_attr]
    pub async fn write16(&mut self, id: u8, offset: u16, value: u16) -> Result<(), Error<SPI>> {
        self.write_bytes(id, offset, &value.to_le_bytes()).await
    }

    /// Writes a little-endian 32-bit word
    #[maybe_async_attr]
    pub async fn write32(&mut self, id: u8, offset: u16, value: u32) -> Result<(), Error<SPI>> {
        self.write_bytes(id, offset, &value.to_le_bytes()).await
    }

    /// Masked write of a byte: `reg = (reg & and) | or`
    #[maybe_async_attr]
    pub async fn and_or8(&mut self, id: u8, offset: u8, and: u8, or: u8) -> Result<(), Error<SPI>> {
        self.masked_write(id, offset, 1, &[and], &[or]).await
    }

    /// Masked write of a 16-bit word: `reg = (reg & and) | or`
    #[maybe_async_attr]
    pub async fn and_or16(
        &mut self,
        id: u8,
        offset: u8,
        and: u16,
        or: u16,
    ) -> Result<(), Error<SPI>> {
        self.masked_write(id, offset, 2, &and.to_le_bytes(), &or.to_le_bytes())
            .await
    }

    /// Masked write of a 32-bit word: `reg = (reg & and) | or`
    #[maybe_async_attr]
    pub async fn and_or32(
        &mut self,
        id: u8,
        offset: u8,
        and: u32,
        or: u32,
    ) -> Result<(), Error<SPI>> {
        self.masked_write(id, offset, 3, &and.to_le_bytes(), &or.to_le_bytes())
            .await
    }

    #[maybe_async_attr]
    async fn masked_write(
        &mut self,
        id: u8,
        offset: u8,
        mode: u8,
        and: &[u8],
        or: &[u8],
    ) -> Result<(), Error<SPI>> {
        let header = header(true, id, offset, mode);
        self.write_parts(&header, and, or).await
    }

    /// Points indirect pointer A at `id:offset` when the offset is out of
    /// direct reach. Returns the address to use for the actual access.
    #[maybe_async_attr]
    async fn route(&mut self, id: u8, offset: u16) -> Result<(u8, u8), Error<SPI>> {
        if offset <= MAX_DIRECT_OFFSET {
            return Ok((id, offset as u8));
        }

        let base = header(true, PTR_ADDR_A::ID, PTR_ADDR_A::SUB_ID, 0);
        self.write_parts(&base, &[id & 0x1f], &[]).await?;
        let ofs = header(true, PTR_OFFSET_A::ID, PTR_OFFSET_A::SUB_ID, 0);
        self.write_parts(&ofs, &(offset & 0x7fff).to_le_bytes(), &[])
            .await?;

        Ok((INDIRECT_PTR_A::ID, INDIRECT_PTR_A::SUB_ID))
    }

    #[maybe_async_attr]
    async fn write_parts(
        &mut self,
        header: &[u8],
        first: &[u8],
        second: &[u8],
    ) -> Result<(), Error<SPI>> {
        let crc = self.write_crc(&[header, first, second]);

        let result = match (second.is_empty(), crc) {
            (true, None) => {
                self.spi
                    .transaction(&mut [Operation::Write(header), Operation::Write(first)])
                    .await
            }
            (true, Some(crc)) => {
                self.spi
                    .transaction(&mut [
                        Operation::Write(header),
                        Operation::Write(first),
                        Operation::Write(&[crc]),
                    ])
                    .await
            }
            (false, None) => {
                self.spi
                    .transaction(&mut [
                        Operation::Write(header),
                        Operation::Write(first),
                        Operation::Write(second),
                    ])
                    .await
            }
            (false, Some(crc)) => {
                self.spi
                    .transaction(&mut [
                        Operation::Write(header),
                        Operation::Write(first),
                        Operation::Write(second),
                        Operation::Write(&[crc]),
                    ])
                    .await
            }
        };

        result.map_err(Error::Write)
    }

    /// Reads a whole register buffer (header included) in place
    #[maybe_async_attr]
    async fn transfer_read(&mut self, buffer: &mut [u8]) -> Result<(), Error<SPI>> {
        let header = [buffer[0], buffer[1]];
        self.spi
            .transfer_in_place(buffer)
            .await
            .map_err(Error::Transfer)?;

        if self.crc == SpiCrcMode::WriteRead {
            let mut digest = SPI_CRC.digest();
            digest.update(&header);
            digest.update(&buffer[2..]);
            self.check_read_crc(digest.finalize()).await?;
        }

        Ok(())
    }

    /// Writes a whole register buffer (header included)
    #[maybe_async_attr]
    async fn transfer_write(&mut self, buffer: &[u8]) -> Result<(), Error<SPI>> {
        match self.write_crc(&[buffer]) {
            None => self.spi.write(buffer).await,
            Some(crc) => {
                self.spi
                    .transaction(&mut [Operation::Write(buffer), Operation::Write(&[crc])])
                    .await
            }
        }
        .map_err(Error::Write)
    }

    #[maybe_async_attr]
    async fn check_read_crc(&mut self, expected: u8) -> Result<(), Error<SPI>> {
        let mut buffer = [0; 3];
        let header = header(false, SPI_RD_CRC::ID, SPI_RD_CRC::SUB_ID, 0);
        buffer[..2].copy_from_slice(&header);
        self.spi
            .transfer_in_place(&mut buffer)
            .await
            .map_err(Error::Transfer)?;

        if buffer[2] != expected {
            #[cfg(feature = "defmt")]
            defmt::warn!(
                "SPI read CRC mismatch: chip {=u8:x}, host {=u8:x}",
                buffer[2],
                expected
            );
            self.crc_read_error = true;
        }

        Ok(())
    }
}

/// Provides access to a register
///
/// You can get an instance for a given register using one of the methods on
/// [`DW3000`].
pub struct RegAccessor<'s, R, SPI>(&'s mut DW3000<SPI>, PhantomData<R>);

impl<'s, R, SPI> RegAccessor<'s, R, SPI>
where
    SPI: SpiDevice<u8>,
{
    /// Read from the register
    #[inline]
    #[maybe_async_attr]
    pub async fn read(&mut self) -> Result<R::Read, Error<SPI>>
    where
        R: Register + Readable,
    {
        let mut r = R::read();
        let buffer = R::buffer(&mut r);
        buffer[..2].copy_from_slice(&header(false, R::ID, R::SUB_ID, 0));

        self.0.transfer_read(buffer).await?;

        Ok(r)
    }

    /// Write to the register
    ///
    /// Fields that `f` does not touch are written as zero.
    #[inline]
    #[maybe_async_attr]
    pub async fn write<F>(&mut self, f: F) -> Result<(), Error<SPI>>
    where
        R: Register + Writable,
        F: FnOnce(&mut R::Write) -> &mut R::Write,
    {
        let mut w = R::write();
        f(&mut w);

        let buffer = R::buffer(&mut w);
        buffer[..2].copy_from_slice(&header(true, R::ID, R::SUB_ID, 0));

        self.0.transfer_write(buffer).await
    }

    /// Modify the register
    ///
    /// Reads the register, lets `f` change some fields and writes the result
    /// back. This takes two transactions, see [`RegAccessor::and_or`] for a
    /// single transaction variant.
    #[inline]
    #[maybe_async_attr]
    pub async fn modify<F>(&mut self, f: F) -> Result<(), Error<SPI>>
    where
        R: Register + Readable + Writable,
        F: for<'r> FnOnce(&mut R::Read, &'r mut R::Write) -> &'r mut R::Write,
    {
        let mut r = self.read().await?;
        let mut w = R::write();

        <R as Writable>::buffer(&mut w).copy_from_slice(<R as Readable>::buffer(&mut r));

        f(&mut r, &mut w);

        let buffer = <R as Writable>::buffer(&mut w);
        buffer[..2].copy_from_slice(&header(true, R::ID, R::SUB_ID, 0));

        self.0.transfer_write(buffer).await
    }

    /// Change the fields set by `f` in a single masked write
    ///
    /// `f` is evaluated twice, once on an all-zero and once on an all-ones
    /// register image. Bits that differ between the two results were not
    /// touched by `f` and end up in the AND mask, the rest is the OR value.
    /// Registers that are not 1, 2 or 4 bytes wide fall back to
    /// [`RegAccessor::modify`].
    #[maybe_async_attr]
    pub async fn and_or<F>(&mut self, f: F) -> Result<(), Error<SPI>>
    where
        R: Register + Readable + Writable,
        F: Fn(&mut R::Write) -> &mut R::Write,
    {
        let mode = match R::LEN {
            1 => 1,
            2 => 2,
            4 => 3,
            _ => return self.modify(|_, w| f(w)).await,
        };

        let mut zeros = R::write();
        f(&mut zeros);
        let mut ones = R::write();
        <R as Writable>::buffer(&mut ones).fill(0xff);
        f(&mut ones);

        let zeros = &<R as Writable>::buffer(&mut zeros)[2..];
        let ones = &<R as Writable>::buffer(&mut ones)[2..];

        let mut and = [0u8; 4];
        let mut or = [0u8; 4];
        for i in 0..R::LEN {
            and[i] = zeros[i] ^ ones[i];
            or[i] = zeros[i];
        }

        self.0
            .masked_write(R::ID, R::SUB_ID, mode, &and[..R::LEN], &or[..R::LEN])
            .await
    }
}

/// An SPI error that can occur when communicating with the DW3xxx
pub enum Error<SPI>
where
    SPI: spi_type::spi::ErrorType,
{
    /// SPI error occured during a transfer transaction
    Transfer(SPI::Error),

    /// SPI error occured during a write transaction
    Write(SPI::Error),
}

// We can't derive this implementation, as the compiler will complain that the
// associated error type doesn't implement `Debug`.
impl<SPI> fmt::Debug for Error<SPI>
where
    SPI: spi_type::spi::ErrorType,
    SPI::Error: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Transfer(error) => write!(f, "Transfer({:?})", error),
            Error::Write(error) => write!(f, "Write({:?})", error),
        }
    }
}

#[cfg(feature = "defmt")]
impl<SPI> defmt::Format for Error<SPI>
where
    SPI: spi_type::spi::ErrorType,
{
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::Transfer(_) => defmt::write!(f, "Transfer()"),
            Error::Write(_) => defmt::write!(f, "Write()"),
        }
    }
}

/// Builds the two-octet SPI header
///
/// `mode` selects the masked write width (0: plain, 1: 8 bit, 2: 16 bit,
/// 3: 32 bit).
#[inline(always)]
pub fn header(write: bool, id: u8, sub_id: u8, mode: u8) -> [u8; 2] {
    [
        ((write as u8) << 7) | 0x40 | ((id << 1) & 0x3e) | ((sub_id >> 6) & 0x01),
        (sub_id << 2) | (mode & 0x03),
    ]
}

/// Implemented for all registers
///
/// This is a mostly internal crate that should not be implemented or used
/// directly by users of this crate. It is exposed through the public API
/// though, so it can't be made private.
pub trait Register {
    /// The register file index
    const ID: u8;

    /// The register's offset within its file
    const SUB_ID: u8;

    /// The length of the register in bytes
    const LEN: usize;
}

/// Marker trait for registers that can be read from
pub trait Readable {
    /// The type that is used to read from the register
    type Read;

    /// Return the read type for this register
    fn read() -> Self::Read;

    /// Return the read type's internal buffer
    fn buffer(r: &mut Self::Read) -> &mut [u8];
}

/// Marker trait for registers that can be written to
pub trait Writable {
    /// The type that is used to write to the register
    type Write;

    /// Return the write type for this register
    fn write() -> Self::Write;

    /// Return the write type's internal buffer
    fn buffer(w: &mut Self::Write) -> &mut [u8];
}

/// Integer types a register field can be read as
pub(crate) trait FieldValue: Copy {
    fn from_raw(raw: u128) -> Self;
    fn into_raw(self) -> u128;
}

macro_rules! impl_field_value {
    ($($ty:ty),*) => {
        $(
            impl FieldValue for $ty {
                #[inline(always)]
                fn from_raw(raw: u128) -> Self {
                    raw as $ty
                }

                #[inline(always)]
                fn into_raw(self) -> u128 {
                    self as u128
                }
            }
        )*
    };
}

impl_field_value!(u8, u16, u32, u64, u128);

#[inline(always)]
fn field_mask(first: usize, last: usize) -> u128 {
    let bits = last - first + 1;
    if bits >= 128 {
        u128::MAX
    } else {
        (1u128 << bits) - 1
    }
}

/// Extracts bits `first..=last` of a little-endian register image
#[inline(always)]
pub(crate) fn get_field(data: &[u8], first: usize, last: usize) -> u128 {
    let mut raw = 0u128;
    for (i, b) in data[first / 8..=last / 8].iter().enumerate() {
        raw |= (*b as u128) << (8 * i);
    }
    (raw >> (first % 8)) & field_mask(first, last)
}

/// Replaces bits `first..=last` of a little-endian register image
#[inline(always)]
pub(crate) fn set_field(data: &mut [u8], first: usize, last: usize, value: u128) {
    let shift = first % 8;
    let mask = field_mask(first, last) << shift;
    let value = (value << shift) & mask;
    for (i, b) in data[first / 8..=last / 8].iter_mut().enumerate() {
        let m = (mask >> (8 * i)) as u8;
        *b = (*b & !m) | ((value >> (8 * i)) as u8 & m);
    }
}

/// Generates register implementations
macro_rules! impl_register {
    (
        $(
            $id:expr,
            $sub_id:expr,
            $len:expr,
            $rw:tt,
            $name:ident($name_lower:ident) {
            #[$doc:meta]
            $(
                $field:ident,
                $first_bit:expr,
                $last_bit:expr,
                $ty:ty;
                #[$field_doc:meta]
            )*
            }
        )*
    ) => {
        $(
            #[$doc]
            #[allow(non_camel_case_types)]
            pub struct $name;

            impl Register for $name {
                const ID:     u8    = $id;
                const SUB_ID: u8    = $sub_id;
                const LEN:    usize = $len;
            }

            #[$doc]
            pub mod $name_lower {
                use core::fmt;

                const HEADER_LEN: usize = 2;

                /// Used to read from the register
                pub struct R(pub(crate) [u8; HEADER_LEN + $len]);

                impl R {
                    $(
                        #[$field_doc]
                        #[inline(always)]
                        pub fn $field(&self) -> $ty {
                            use crate::ll::FieldValue;

                            <$ty as FieldValue>::from_raw(crate::ll::get_field(
                                &self.0[HEADER_LEN..],
                                $first_bit,
                                $last_bit,
                            ))
                        }
                    )*

                    /// Raw register content, without the SPI header
                    pub fn raw(&self) -> &[u8] {
                        &self.0[HEADER_LEN..]
                    }
                }

                impl fmt::Debug for R {
                    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                        write!(f, "0x")?;
                        for i in (0 .. $len).rev() {
                            write!(f, "{:02x}", self.0[HEADER_LEN + i])?;
                        }

                        Ok(())
                    }
                }

                #[cfg(feature = "defmt")]
                impl defmt::Format for R {
                    fn format(&self, f: defmt::Formatter) {
                        defmt::write!(f, "0x");
                        for i in (0 .. $len).rev() {
                            defmt::write!(f, "{:02x}", self.0[HEADER_LEN + i]);
                        }
                    }
                }

                /// Used to write to the register
                pub struct W(pub(crate) [u8; HEADER_LEN + $len]);

                impl W {
                    $(
                        #[$field_doc]
                        #[inline(always)]
                        pub fn $field(&mut self, value: $ty) -> &mut Self {
                            use crate::ll::FieldValue;

                            crate::ll::set_field(
                                &mut self.0[HEADER_LEN..],
                                $first_bit,
                                $last_bit,
                                value.into_raw(),
                            );
                            self
                        }
                    )*
                }
            }

            impl_rw!($rw, $name, $name_lower, $len);
        )*


        impl<SPI> DW3000<SPI> {
            $(
                #[$doc]
                pub fn $name_lower(&mut self) -> RegAccessor<$name, SPI> {
                    RegAccessor(self, PhantomData)
                }
            )*
        }
    }
}

// Helper macro, used internally by `impl_register!`
macro_rules! impl_rw {
    (RO, $name:ident, $name_lower:ident, $len:expr) => {
        impl_rw!(@R, $name, $name_lower, $len);
    };
    (RW, $name:ident, $name_lower:ident, $len:expr) => {
        impl_rw!(@R, $name, $name_lower, $len);
        impl_rw!(@W, $name, $name_lower, $len);
    };

    (@R, $name:ident, $name_lower:ident, $len:expr) => {
        impl Readable for $name {
            type Read = $name_lower::R;

            fn read() -> Self::Read {
                $name_lower::R([0; 2 + $len])
            }

            fn buffer(r: &mut Self::Read) -> &mut [u8] {
                &mut r.0
            }
        }
    };
    (@W, $name:ident, $name_lower:ident, $len:expr) => {
        impl Writable for $name {
            type Write = $name_lower::W;

            fn write() -> Self::Write {
                $name_lower::W([0; 2 + $len])
            }

            fn buffer(w: &mut Self::Write) -> &mut [u8] {
                &mut w.0
            }
        }
    };
}

/// Register file indices that are accessed as raw memory
pub mod file {
    /// Receive data buffer 0
    pub const RX_BUFFER_0: u8 = 0x12;
    /// Receive data buffer 1
    pub const RX_BUFFER_1: u8 = 0x13;
    /// Transmit data buffer
    pub const TX_BUFFER: u8 = 0x14;
    /// Accumulator (CIR) memory
    pub const ACC_MEM: u8 = 0x15;
    /// Scratch RAM
    pub const SCRATCH_RAM: u8 = 0x16;
    /// AES key RAM
    pub const AES_KEY_RAM: u8 = 0x17;
    /// Double buffer diagnostic register sets
    pub const DB_DIAG: u8 = 0x18;
}

// All registers are declared in this macro invocation:
// <id>, <sub-id>, <size-bytes>, <RO/RW>, <NAME>(<name>) { /// <doc>
//     <field>, <first-bit>, <last-bit>, <type>; /// <doc>
// }
impl_register! {

    // 0x00: general configuration
    0x00, 0x00, 4, RO, DEV_ID(dev_id) { /// Device identifier
        rev,     0,  3, u8;  /// Revision
        ver,     4,  7, u8;  /// Version
        model,   8, 15, u8;  /// Model
        ridtag, 16, 31, u16; /// Register identification tag (0xDECA)
        value,   0, 31, u32; /// Whole identifier
    }
    0x00, 0x04, 8, RW, EUI(eui) { /// Extended unique identifier
        value, 0, 63, u64; /// EUI-64
    }
    0x00, 0x0C, 4, RW, PANADR(panadr) { /// PAN identifier and short address
        short_addr,  0, 15, u16; /// Short address
        pan_id,     16, 31, u16; /// PAN identifier
    }
    0x00, 0x10, 4, RW, SYS_CFG(sys_cfg) { /// System configuration
        ffen,        0,  0, u8; /// Frame filtering enable
        dis_fcs_tx,  1,  1, u8; /// Disable automatic FCS on transmit
        dis_fce,     2,  2, u8; /// Disable frame check error handling
        dis_drxb,    3,  3, u8; /// Disable double RX buffer
        phr_mode,    4,  4, u8; /// Extended PHR mode
        phr_6m8,     5,  5, u8; /// PHR sent at the data rate
        spi_crcen,   6,  6, u8; /// SPI CRC enable
        cia_ipatov,  7,  7, u8; /// Run the CIA on the Ipatov CIR
        cia_sts,     8,  8, u8; /// Run the CIA on the STS CIR
        rxwtoe,      9,  9, u8; /// Receive wait timeout enable
        rxautr,     10, 10, u8; /// Receiver auto re-enable
        auto_ack,   11, 11, u8; /// Automatic acknowledge enable
        cp_spc,     12, 13, u8; /// STS packet configuration
        cp_sdc,     15, 15, u8; /// STS deterministic code
        pdoa_mode,  16, 17, u8; /// PDoA mode
        fast_aat,   18, 18, u8; /// Fast RX to TX turn around
    }
    0x00, 0x14, 2, RW, FF_CFG(ff_cfg) { /// Frame filter configuration
        value,  0, 15, u16; /// Allowed frame types and behaviour
    }
    0x00, 0x18, 1, RO, SPI_RD_CRC(spi_rd_crc) { /// CRC of the last SPI read
        value, 0, 7, u8; /// CRC-8
    }
    0x00, 0x1C, 4, RO, SYS_TIME(sys_time) { /// System time counter (bits 8..40)
        value, 0, 31, u32; /// System time
    }
    0x00, 0x24, 6, RW, TX_FCTRL(tx_fctrl) { /// TX frame control
        txflen,      0,  9, u16; /// Frame length including FCS
        txbr,       10, 10, u8;  /// Bit rate
        tr,         11, 11, u8;  /// Ranging bit
        txpsr,      12, 15, u8;  /// Preamble symbol repetitions
        txb_offset, 16, 25, u16; /// Offset of the frame in the TX buffer
        fine_plen,  40, 47, u8;  /// Fine preamble length
    }
    0x00, 0x2C, 4, RW, DX_TIME(dx_time) { /// Delayed TX/RX time (bits 8..40)
        value, 0, 31, u32; /// Delay time
    }
    0x00, 0x30, 4, RW, DREF_TIME(dref_time) { /// Delayed TX/RX reference time
        value, 0, 31, u32; /// Reference time
    }
    0x00, 0x34, 3, RW, RX_FWTO(rx_fwto) { /// Frame wait timeout
        value, 0, 19, u32; /// Timeout in 1.0256 us units
    }
    0x00, 0x38, 1, RW, SYS_CTRL(sys_ctrl) { /// System control
        value, 0, 7, u8; /// System control
    }
    0x00, 0x3C, 6, RW, SYS_ENABLE(sys_enable) { /// Interrupt enable mask, same layout as SYS_STATUS
        lo,     0, 31, u32; /// Events 0..32
        hi,    32, 47, u16; /// Events 32..48
    }
    0x00, 0x44, 6, RW, SYS_STATUS(sys_status) { /// System event status, write 1 to clear
        lo,         0, 31, u32; /// Events 0..32
        hi,        32, 47, u16; /// Events 32..48
        value,      0, 47, u64; /// All events
        cplock,     1,  1, u8; /// Clock PLL lock
        txfrs,      7,  7, u8; /// TX frame sent
        ciadone,   10, 10, u8; /// CIA processing done
        rxfcg,     14, 14, u8; /// RX FCS good
        spirdy,    23, 23, u8; /// SPI ready
        rcinit,    24, 24, u8; /// IDLE_RC reached
        hpdwarn,   27, 27, u8; /// Half period delay warning
    }
    0x00, 0x4C, 4, RO, RX_FINFO(rx_finfo) { /// RX frame information
        rxflen,  0,  9, u16; /// Frame length
        rxnspl, 11, 12, u8;  /// Non-standard preamble length
        rxbr,   13, 13, u8;  /// Bit rate
        rng,    15, 15, u8;  /// Ranging bit
        rxprf,  16, 17, u8;  /// PRF
        rxpsr,  18, 19, u8;  /// Preamble repetition
        rxpacc, 20, 31, u16; /// Preamble accumulation count
    }
    0x00, 0x64, 16, RO, RX_TIME(rx_time) { /// RX time stamp
        rx_stamp,  0, 39, u64; /// Adjusted time stamp
        rx_rawst, 64, 95, u32; /// Raw time stamp (bits 8..40)
    }
    0x00, 0x74, 5, RO, TX_TIME(tx_time) { /// TX time stamp
        tx_stamp,  0, 39, u64; /// Adjusted time stamp
    }

    // 0x01: general configuration and AES
    0x01, 0x00, 4, RO, TX_RAWST(tx_rawst) { /// TX raw time stamp (bits 8..40)
        value, 0, 31, u32; /// Raw time stamp
    }
    0x01, 0x04, 2, RW, TX_ANTD(tx_antd) { /// TX antenna delay
        value, 0, 15, u16; /// Delay in device time units
    }
    0x01, 0x08, 4, RW, ACK_RESP(ack_resp) { /// Response and ACK turnaround
        w4r_tim,  0, 19, u32; /// Wait for response delay in 1.0256 us units
        ack_tim, 24, 31, u8;  /// Auto ACK turnaround in symbols
    }
    0x01, 0x0C, 4, RW, TX_POWER(tx_power) { /// TX power per frame segment
        value, 0, 31, u32; /// Packed power settings
    }
    0x01, 0x14, 2, RW, CHAN_CTRL(chan_ctrl) { /// Channel control
        rf_chan,   0,  0, u8; /// 0: channel 5, 1: channel 9
        sfd_type,  1,  2, u8; /// SFD type
        tx_pcode,  3,  7, u8; /// TX preamble code
        rx_pcode,  8, 12, u8; /// RX preamble code
    }
    0x01, 0x18, 4, RW, LE_PEND_01(le_pend_01) { /// Low energy addresses 0 and 1
        le_addr0,  0, 15, u16; /// Address 0
        le_addr1, 16, 31, u16; /// Address 1
    }
    0x01, 0x1C, 4, RW, LE_PEND_23(le_pend_23) { /// Low energy addresses 2 and 3
        le_addr2,  0, 15, u16; /// Address 2
        le_addr3, 16, 31, u16; /// Address 3
    }
    0x01, 0x24, 1, RW, RDB_STATUS(rdb_status) { /// Double buffer status, write 1 to clear
        value, 0, 7, u8; /// Status of both buffers
    }
    0x01, 0x28, 1, RW, RDB_DIAG(rdb_diag) { /// Double buffer diagnostic mode
        rdb_dmode, 0, 2, u8; /// Diagnostic set copied per buffer
    }
    0x01, 0x30, 2, RW, AES_CFG(aes_cfg) { /// AES configuration
        mode,       0,  0, u8; /// 0: encrypt, 1: decrypt
        key_size,   1,  2, u8; /// 128, 192, 256 bits
        key_addr,   3,  5, u8; /// Key RAM slot
        key_load,   6,  6, u8; /// Load the key
        key_src,    7,  7, u8; /// 0: AES_KEY, 1: RAM or OTP
        tag_size,   8, 10, u8; /// MIC size
        core_sel,  11, 11, u8; /// 0: GCM, 1: CCM*
        key_otp,   12, 12, u8; /// Key from OTP
        key_otp_sel, 13, 13, u8; /// OTP key block: 0 first, 1 second 128 bits
    }
    0x01, 0x34, 16, RW, AES_IV(aes_iv) { /// AES nonce
        value, 0, 127, u128; /// Nonce, 96 bits used
    }
    0x01, 0x44, 8, RW, DMA_CFG(dma_cfg) { /// AES DMA configuration
        src_port,    0,  2, u8;  /// Source memory
        src_addr,    3, 12, u16; /// Source offset
        dst_port,   13, 15, u8;  /// Destination memory
        dst_addr,   16, 25, u16; /// Destination offset
        cp_end_sel, 26, 26, u8;  /// Endianness
        hdr_size,   32, 38, u8;  /// Header size
        pyld_size,  39, 48, u16; /// Payload size
    }
    0x01, 0x4C, 1, RW, AES_START(aes_start) { /// Start the AES job
        value, 0, 0, u8; /// Start
    }
    0x01, 0x50, 4, RW, AES_STS(aes_sts) { /// AES status, write 1 to clear
        value, 0, 5, u8; /// Status flags
    }
    0x01, 0x54, 16, RW, AES_KEY(aes_key) { /// AES key register
        value, 0, 127, u128; /// Key
    }

    // 0x02: STS
    0x02, 0x00, 2, RW, STS_CFG(sts_cfg) { /// STS length
        cps_len, 0, 7, u8; /// Length in blocks of 8 chips, minus one
    }
    0x02, 0x04, 1, RW, STS_CTRL(sts_ctrl) { /// STS control
        load_iv,  0, 0, u8; /// Load the IV into the counter
        rst_last, 1, 1, u8; /// Restart from the last counter value
    }
    0x02, 0x08, 2, RO, STS_STS(sts_sts) { /// STS status
        acc_qual, 0, 11, u16; /// Accumulation quality, 12-bit signed
    }
    0x02, 0x0C, 16, RW, STS_KEY(sts_key) { /// STS key
        value, 0, 127, u128; /// Key
    }
    0x02, 0x1C, 16, RW, STS_IV(sts_iv) { /// STS IV
        value, 0, 127, u128; /// IV
    }

    // 0x03: RX tuning
    0x03, 0x18, 2, RW, DGC_CFG(dgc_cfg) { /// DGC configuration
        rx_tune_en,  0,  0, u8; /// DGC enable
        thr_64,      9, 14, u8; /// 64 MHz PRF threshold
    }
    0x03, 0x1C, 4, RW, DGC_CFG0(dgc_cfg0) { /// DGC configuration 0
        value, 0, 31, u32; /// Tuning value
    }
    0x03, 0x20, 4, RW, DGC_CFG1(dgc_cfg1) { /// DGC configuration 1
        value, 0, 31, u32; /// Tuning value
    }
    0x03, 0x60, 4, RO, DGC_DBG(dgc_dbg) { /// DGC debug
        dgc_decision, 28, 30, u8; /// DGC decision index
    }

    // 0x04: external sync and RX calibration
    0x04, 0x00, 4, RW, EC_CTRL(ec_ctrl) { /// External clock synchronisation
        osts_wait,  3, 10, u8; /// Wait counter for one-shot timebase reset
        ostr_mode, 11, 11, u8; /// One-shot timebase reset mode
    }
    0x04, 0x0C, 4, RW, RX_CAL(rx_cal) { /// RX calibration
        cal_mode,  0,  1, u8; /// Calibration mode
        cal_en,    4,  7, u8; /// Calibration enable
        comp_dly, 16, 19, u8; /// Comparator delay
        value,     0, 31, u32; /// Whole register
    }
    0x04, 0x14, 4, RO, RX_CAL_RESI(rx_cal_resi) { /// RX calibration result, I branch
        value, 0, 28, u32; /// Result
    }
    0x04, 0x1C, 4, RO, RX_CAL_RESQ(rx_cal_resq) { /// RX calibration result, Q branch
        value, 0, 28, u32; /// Result
    }
    0x04, 0x20, 1, RW, RX_CAL_STS(rx_cal_sts) { /// RX calibration status
        value, 0, 0, u8; /// Done
    }

    // 0x05: GPIO
    0x05, 0x00, 4, RW, GPIO_MODE(gpio_mode) { /// GPIO mode
        msgp0,  0,  2, u8; /// GPIO0 mode
        msgp1,  3,  5, u8; /// GPIO1 mode
        msgp2,  6,  8, u8; /// GPIO2 mode (RXLED)
        msgp3,  9, 11, u8; /// GPIO3 mode (TXLED)
        msgp4, 12, 14, u8; /// GPIO4 mode
        msgp5, 15, 17, u8; /// GPIO5 mode
        msgp6, 18, 20, u8; /// GPIO6 mode
    }

    // 0x06: digital receiver
    0x06, 0x00, 2, RW, DTUNE0(dtune0) { /// Digital tuning 0
        pac,   0, 1, u8; /// PAC size
        dt0b4, 4, 4, u8; /// Tuning bit 4
    }
    0x06, 0x02, 2, RW, RX_SFD_TOC(rx_sfd_toc) { /// SFD timeout
        value, 0, 15, u16; /// Timeout in symbols
    }
    0x06, 0x04, 2, RW, PRE_TOC(pre_toc) { /// Preamble detection timeout
        value, 0, 15, u16; /// Timeout in PAC units
    }
    0x06, 0x0C, 4, RW, DTUNE3(dtune3) { /// Digital tuning 3
        value, 0, 31, u32; /// Tuning value
    }
    0x06, 0x29, 3, RO, DRX_CAR_INT(drx_car_int) { /// Carrier recovery integrator
        value, 0, 20, u32; /// 21-bit signed integrator value
    }

    // 0x07: analog RF
    0x07, 0x00, 4, RW, RF_ENABLE(rf_enable) { /// RF block enables
        value, 0, 31, u32; /// Enables
    }
    0x07, 0x04, 4, RW, RF_CTRL_MASK(rf_ctrl_mask) { /// RF enable mask
        value, 0, 31, u32; /// Mask
    }
    0x07, 0x10, 4, RW, RF_RX_CTRL_HI(rf_rx_ctrl_hi) { /// RX front end tuning
        value, 0, 31, u32; /// Tuning value
    }
    0x07, 0x14, 4, RW, RF_SWITCH(rf_switch) { /// RF port switch
        antswnotoggle,  0,  0, u8; /// Disable automatic toggling in PDoA
        antswpdoaport,  1,  1, u8; /// Starting port in PDoA
        antswen,        8,  8, u8; /// Manual antenna switch
        antswctl,      12, 14, u8; /// Manual antenna switch control
        trxswen,       16, 16, u8; /// Manual TX/RX switch
        trxswctl,      24, 29, u8; /// Manual TX/RX switch control
    }
    0x07, 0x1A, 1, RW, RF_TX_CTRL_1(rf_tx_ctrl_1) { /// TX front end tuning 1
        value, 0, 7, u8; /// Tuning value
    }
    0x07, 0x1C, 4, RW, RF_TX_CTRL_2(rf_tx_ctrl_2) { /// TX front end tuning 2
        pg_delay, 0,  5, u8;  /// Pulse generator delay
        value,    0, 31, u32; /// Whole register
    }
    0x07, 0x28, 1, RW, TX_TEST(tx_test) { /// TX test
        value, 0, 3, u8; /// Test mode
    }
    0x07, 0x34, 1, RW, SAR_TEST(sar_test) { /// SAR test
        sar_rdtemp, 2, 2, u8; /// Enable the temperature sensor
    }
    0x07, 0x40, 8, RW, LDO_TUNE(ldo_tune) { /// LDO tuning
        value, 0, 63, u64; /// Tuning value
    }
    0x07, 0x48, 4, RW, LDO_CTRL(ldo_ctrl) { /// LDO control
        value, 0, 31, u32; /// Enables
    }
    0x07, 0x51, 1, RW, LDO_RLOAD(ldo_rload) { /// LDO load tuning
        value, 0, 7, u8; /// Tuning value
    }

    // 0x08: TX calibration and SAR
    0x08, 0x00, 1, RW, SAR_CTRL(sar_ctrl) { /// SAR control
        sar_start, 0, 0, u8; /// Start a conversion
    }
    0x08, 0x04, 1, RO, SAR_STATUS(sar_status) { /// SAR status
        sar_done, 0, 0, u8; /// Conversion done
    }
    0x08, 0x08, 3, RO, SAR_READING(sar_reading) { /// Latest SAR readings
        sar_lvbat,  0,  7, u8; /// Battery voltage
        sar_ltemp,  8, 15, u8; /// Temperature
    }
    0x08, 0x0C, 2, RO, SAR_WAKE_RD(sar_wake_rd) { /// SAR readings at wake up
        sar_wvbat, 0,  7, u8; /// Battery voltage
        sar_wtemp, 8, 15, u8; /// Temperature
    }
    0x08, 0x10, 2, RW, PGC_CTRL(pgc_ctrl) { /// Pulse generator calibration control
        pg_start,     0, 0, u8; /// Start
        pgc_auto_cal, 1, 1, u8; /// Automatic calibration
        pgc_tmeas,    2, 5, u8; /// Measurement time
    }
    0x08, 0x14, 2, RO, PGC_STATUS(pgc_status) { /// Pulse generator calibration status
        pg_delay_cnt,   0, 11, u16; /// Count
        autocal_done,  12, 12, u8;  /// Done
    }
    0x08, 0x1C, 2, RW, PG_CAL_TARGET(pg_cal_target) { /// Pulse generator count target
        value, 0, 11, u16; /// Target
    }

    // 0x09: frequency synthesiser
    0x09, 0x00, 2, RW, PLL_CFG(pll_cfg) { /// PLL configuration
        value, 0, 15, u16; /// Configuration
    }
    0x09, 0x04, 4, RW, PLL_CC(pll_cc) { /// PLL coarse code
        ch9_code, 0,  7, u8;  /// Channel 9 starting code
        ch5_code, 8, 21, u16; /// Channel 5 starting code
    }
    0x09, 0x08, 2, RW, PLL_CAL(pll_cal) { /// PLL calibration
        use_old,    1, 1, u8; /// Use the previous coarse code
        pll_cfg_ld, 4, 7, u8; /// Loop filter setting
        cal_en,     8, 8, u8; /// Calibration enable
        value,      0, 15, u16; /// Whole register
    }
    0x09, 0x14, 1, RW, XTAL(xtal) { /// Crystal trim
        xtal_trim, 0, 5, u8; /// Trim code
        value,     0, 7, u8; /// Whole register
    }

    // 0x0A: always-on
    0x0A, 0x00, 3, RW, AON_DIG_CFG(aon_dig_cfg) { /// On-wake behaviour
        value, 0, 11, u16; /// Wake configuration bits
    }
    0x0A, 0x04, 1, RW, AON_CTRL(aon_ctrl) { /// AON control
        value, 0, 7, u8; /// Control bits
    }
    0x0A, 0x08, 1, RO, AON_RDATA(aon_rdata) { /// AON read data
        value, 0, 7, u8; /// Data
    }
    0x0A, 0x0C, 2, RW, AON_ADDR(aon_addr) { /// AON address
        value, 0, 15, u16; /// Address
    }
    0x0A, 0x10, 1, RW, AON_WDATA(aon_wdata) { /// AON write data
        value, 0, 7, u8; /// Data
    }
    0x0A, 0x14, 1, RW, AON_CFG(aon_cfg) { /// AON configuration
        value, 0, 7, u8; /// Sleep and wake bits
    }

    // 0x0B: OTP
    0x0B, 0x00, 4, RW, OTP_WDATA(otp_wdata) { /// OTP write data
        value, 0, 31, u32; /// Data
    }
    0x0B, 0x04, 2, RW, OTP_ADDR(otp_addr) { /// OTP address
        value, 0, 10, u16; /// Address
    }
    0x0B, 0x08, 2, RW, OTP_CFG(otp_cfg) { /// OTP configuration
        otp_man,   0,  0, u8; /// Manual control
        otp_read,  1,  1, u8; /// Read
        otp_write, 2,  2, u8; /// Write
        dgc_kick,  6,  6, u8; /// Load DGC values from OTP
        ldo_kick,  7,  7, u8; /// Load LDO tune from OTP
        bias_kick, 8,  8, u8; /// Load bias tune from OTP
        ops_kick, 10, 10, u8; /// Load operating parameter set
        ops_sel,  11, 12, u8; /// Operating parameter set
        dgc_sel,  13, 13, u8; /// DGC table: 0 channel 5, 1 channel 9
        value,     0, 15, u16; /// Whole register
    }
    0x0B, 0x0C, 1, RW, OTP_STAT(otp_stat) { /// OTP status
        otp_prog_done, 0, 0, u8; /// Programming done
        otp_vpp_ok,    1, 1, u8; /// Programming voltage ok
    }
    0x0B, 0x10, 4, RO, OTP_RDATA(otp_rdata) { /// OTP read data
        value, 0, 31, u32; /// Data
    }

    // 0x0C-0x0D: CIA results
    0x0C, 0x00, 8, RO, IP_TS(ip_ts) { /// Ipatov time of arrival
        ip_toa,    0, 39, u64; /// Time of arrival
        ip_poa,   40, 53, u16; /// Phase of arrival
        ip_toast, 56, 63, u8;  /// Status
    }
    0x0C, 0x08, 8, RO, STS_TS(sts_ts) { /// STS time of arrival
        sts_toa,    0, 39, u64; /// Time of arrival
        sts_poa,   40, 53, u16; /// Phase of arrival
        sts_toast, 55, 63, u16; /// Status
    }
    0x0C, 0x10, 8, RO, STS1_TS(sts1_ts) { /// Second STS time of arrival
        sts1_toa,    0, 39, u64; /// Time of arrival
        sts1_poa,   40, 53, u16; /// Phase of arrival
        sts1_toast, 55, 63, u16; /// Status
    }
    0x0C, 0x18, 6, RO, TDOA(tdoa) { /// TDoA between the two CIRs
        value, 0, 40, u64; /// 41-bit signed TDoA
    }
    0x0C, 0x1E, 2, RO, PDOA(pdoa) { /// PDoA between the two CIRs
        pdoa,      0, 13, u16; /// Phase difference, s[1:-11] radians
        fp_th_md, 14, 14, u8;  /// First path threshold test mode
    }
    0x0C, 0x20, 4, RO, CIA_DIAG_0(cia_diag_0) { /// CIA diagnostic 0
        coe_ppm, 0, 12, u16; /// Clock offset estimate
    }
    0x0C, 0x24, 4, RO, CIA_DIAG_1(cia_diag_1) { /// CIA diagnostic 1
        value, 0, 31, u32; /// Diagnostics common to both sequences
    }
    0x0C, 0x28, 4, RO, IP_DIAG_0(ip_diag_0) { /// Ipatov peak
        ip_peaka,  0, 20, u32; /// Peak amplitude
        ip_peaki, 21, 30, u16; /// Peak index
        value,     0, 31, u32; /// Whole register
    }
    0x0C, 0x2C, 4, RO, IP_DIAG_1(ip_diag_1) { /// Ipatov channel area
        ip_carea, 0, 16, u32; /// Channel area
    }
    0x0C, 0x30, 4, RO, IP_DIAG_2(ip_diag_2) { /// Ipatov magnitude at FP + 1
        ip_fp1m, 0, 21, u32; /// Magnitude
    }
    0x0C, 0x34, 4, RO, IP_DIAG_3(ip_diag_3) { /// Ipatov magnitude at FP + 2
        ip_fp2m, 0, 21, u32; /// Magnitude
    }
    0x0C, 0x38, 4, RO, IP_DIAG_4(ip_diag_4) { /// Ipatov magnitude at FP + 3
        ip_fp3m, 0, 21, u32; /// Magnitude
    }
    0x0C, 0x48, 4, RO, IP_DIAG_8(ip_diag_8) { /// Ipatov first path
        ip_fp, 0, 15, u16; /// First path index, 10.6 fixed point
    }
    0x0C, 0x58, 4, RO, IP_DIAG_12(ip_diag_12) { /// Ipatov accumulated symbols
        ip_nacc, 0, 11, u16; /// Symbol count
    }
    0x0C, 0x5C, 4, RO, STS_DIAG_0(sts_diag_0) { /// STS peak
        cp0_peaka,  0, 20, u32; /// Peak amplitude
        cp0_peaki, 21, 29, u16; /// Peak index
        value,      0, 31, u32; /// Whole register
    }
    0x0C, 0x60, 4, RO, STS_DIAG_1(sts_diag_1) { /// STS channel area
        cp0_carea, 0, 15, u32; /// Channel area
    }
    0x0C, 0x64, 4, RO, STS_DIAG_2(sts_diag_2) { /// STS magnitude at FP + 1
        cp0_fp1m, 0, 21, u32; /// Magnitude
    }
    0x0C, 0x68, 4, RO, STS_DIAG_3(sts_diag_3) { /// STS magnitude at FP + 2
        cp0_fp2m, 0, 21, u32; /// Magnitude
    }
    0x0D, 0x00, 4, RO, STS_DIAG_4(sts_diag_4) { /// STS magnitude at FP + 3
        cp0_fp3m, 0, 21, u32; /// Magnitude
    }
    0x0D, 0x10, 4, RO, STS_DIAG_8(sts_diag_8) { /// STS first path
        cp0_fp, 0, 14, u16; /// First path index, 9.6 fixed point
    }
    0x0D, 0x20, 4, RO, STS_DIAG_12(sts_diag_12) { /// STS accumulated length
        cp0_nacc, 0, 10, u16; /// Accumulated STS length
    }
    0x0D, 0x38, 4, RO, STS1_DIAG_0(sts1_diag_0) { /// Second STS peak
        cp1_peaka,  0, 20, u32; /// Peak amplitude
        cp1_peaki, 21, 29, u16; /// Peak index
        value,      0, 31, u32; /// Whole register
    }
    0x0D, 0x3C, 4, RO, STS1_DIAG_1(sts1_diag_1) { /// Second STS channel area
        cp1_carea, 0, 15, u32; /// Channel area
    }
    0x0D, 0x40, 4, RO, STS1_DIAG_2(sts1_diag_2) { /// Second STS magnitude at FP + 1
        cp1_fp1m, 0, 21, u32; /// Magnitude
    }
    0x0D, 0x44, 4, RO, STS1_DIAG_3(sts1_diag_3) { /// Second STS magnitude at FP + 2
        cp1_fp2m, 0, 21, u32; /// Magnitude
    }
    0x0D, 0x48, 4, RO, STS1_DIAG_4(sts1_diag_4) { /// Second STS magnitude at FP + 3
        cp1_fp3m, 0, 21, u32; /// Magnitude
    }
    0x0D, 0x58, 4, RO, STS1_DIAG_8(sts1_diag_8) { /// Second STS first path
        cp1_fp, 0, 14, u16; /// First path index, 9.6 fixed point
    }
    0x0D, 0x68, 4, RO, STS1_DIAG_12(sts1_diag_12) { /// Second STS accumulated length
        cp1_nacc, 0, 10, u16; /// Accumulated STS length
    }

    // 0x0E: CIA configuration
    0x0E, 0x00, 4, RW, CIA_CONF(cia_conf) { /// CIA configuration
        rxantd,   0, 15, u16; /// RX antenna delay
        mindiag, 20, 20, u8;  /// Minimum diagnostics
        eq_en,   21, 21, u8;  /// Equaliser, QM33xxx only
    }
    0x0E, 0x12, 4, RW, STS_CONF_0(sts_conf_0) { /// CIA STS configuration 0
        sts_ntm,   0,  4, u8; /// Noise threshold multiplier
        sts_pmult, 5,  6, u8; /// Peak multiplier
        sts_rtm,  16, 22, u8; /// Replica threshold multiplier
    }
    0x0E, 0x16, 4, RW, STS_CONF_1(sts_conf_1) { /// CIA STS configuration 1
        res_b0,        0,  7, u8; /// Minimum correlation threshold
        fp_agreed_en, 28, 28, u8; /// First path agreement check
        sts_cq_en,    29, 29, u8; /// Consistency check
        sts_ss_en,    30, 30, u8; /// Sampling statistics check
        sts_pgr_en,   31, 31, u8; /// Growth rate check
    }
    0x0E, 0x1A, 2, RW, CIA_ADJUST(cia_adjust) { /// PDoA adjustment
        value, 0, 13, u16; /// Offset added to the PDoA
    }

    // 0x0F: digital diagnostics
    0x0F, 0x00, 1, RW, EVC_CTRL(evc_ctrl) { /// Event counter control
        evc_en,  0, 0, u8; /// Enable
        evc_clr, 1, 1, u8; /// Clear
    }
    0x0F, 0x04, 24, RO, EVC_COUNTERS(evc_counters) { /// Event counters
        phe,    0,  11, u16; /// PHR errors
        rse,   16,  27, u16; /// Sync loss
        fcg,   32,  43, u16; /// FCS good
        fce,   48,  59, u16; /// FCS errors
        ffr,   64,  71, u8;  /// Frame filter rejections
        ovr,   80,  87, u8;  /// Overruns
        sto,   96, 107, u16; /// SFD timeouts
        pto,  112, 123, u16; /// Preamble timeouts
        fwto, 128, 135, u8;  /// Frame wait timeouts
        txfs, 144, 155, u16; /// Frames sent
        hpw,  160, 167, u8;  /// Half period warnings
        swce, 176, 183, u8;  /// SPI write CRC errors
    }
    0x0F, 0x24, 4, RW, DIAG_TMC(diag_tmc) { /// Test mode control
        tx_pstm,    4,  4, u8; /// Power spectrum test mode
        hirq_pol,  21, 21, u8; /// IRQ polarity
        cia_wden,  24, 24, u8; /// CIA watchdog
        cia_run,   26, 26, u8; /// Run the CIA manually
    }
    0x0F, 0x28, 1, RO, EVC_CPQE(evc_cpqe) { /// STS quality errors
        value, 0, 7, u8; /// Count
    }
    0x0F, 0x2A, 1, RO, EVC_VWARN(evc_vwarn) { /// Low voltage warnings
        value, 0, 7, u8; /// Count
    }
    0x0F, 0x30, 4, RO, SYS_STATE(sys_state) { /// Internal state machines
        tx_state,    0,  3, u8; /// TX state
        rx_state,    8, 11, u8; /// RX state
        pmsc_state, 16, 23, u8; /// Power management state
    }
    0x0F, 0x3C, 1, RO, FCMD_STAT(fcmd_stat) { /// Fast command status
        value, 0, 4, u8; /// Last command
    }
    0x0F, 0x48, 4, RO, CTR_DBG(ctr_dbg) { /// STS IV counter, low word
        value, 0, 31, u32; /// Counter
    }

    // 0x11: power management and sequencing
    0x11, 0x00, 2, RW, SOFT_RST(soft_rst) { /// Soft reset
        value, 0, 8, u16; /// Reset bits, active low
    }
    0x11, 0x04, 4, RW, CLK_CTRL(clk_ctrl) { /// Clock control
        sys_clk,       0,  1, u8; /// System clock
        rx_clk,        2,  3, u8; /// RX clock
        tx_clk,        4,  5, u8; /// TX clock
        acc_clk_en,    6,  6, u8; /// Accumulator clock
        sar_clk_en,   10, 10, u8; /// SAR clock
        acc_mclk_en,  15, 15, u8; /// Accumulator memory clock
        gpio_clk_en,  16, 16, u8; /// GPIO clock
        gpio_dclk_en, 18, 18, u8; /// GPIO debounce clock
        gpio_drst_n,  19, 19, u8; /// GPIO debounce reset, active low
        lp_clk_en,    23, 23, u8; /// Kilohertz clock
        value,         0, 31, u32; /// Whole register
    }
    0x11, 0x08, 4, RW, SEQ_CTRL(seq_ctrl) { /// Sequencing control
        ainit2idle,  8,  8, u8; /// IDLE_RC to IDLE_PLL automatically
        atx2slp,    11, 11, u8; /// Sleep after TX
        arx2slp,    12, 12, u8; /// Sleep after RX
        ciarune,    17, 17, u8; /// CIA run enable
        force2init, 23, 23, u8; /// Force to IDLE_RC
        lp_clk_div, 26, 31, u8; /// Kilohertz clock divisor
    }
    0x11, 0x16, 4, RW, LED_CTRL(led_ctrl) { /// LED control
        blink_tim,   0,  7, u8; /// Blink time in 14 ms units
        blink_en,    8,  8, u8; /// Blink enable
        force_trig, 16, 19, u8; /// Force a blink
    }
    0x11, 0x1A, 4, RW, RX_SNIFF(rx_sniff) { /// SNIFF mode
        sniff_on,  0,  3, u8; /// On time in PAC units
        sniff_off, 8, 15, u8; /// Off time in microseconds
    }
    0x11, 0x1F, 2, RW, BIAS_CTRL(bias_ctrl) { /// Analog bias trims
        value, 0, 13, u16; /// Trims
    }

    // 0x1D-0x1F: indirect access and fast interrupt status
    0x1D, 0x00, 4, RW, INDIRECT_PTR_A(indirect_ptr_a) { /// Indirect pointer A window
        value, 0, 31, u32; /// Data
    }
    0x1F, 0x00, 1, RO, FINT_STAT(fint_stat) { /// Fast interrupt status
        value, 0, 7, u8; /// Grouped event flags
    }
    0x1F, 0x04, 1, RW, PTR_ADDR_A(ptr_addr_a) { /// Indirect pointer A base
        ptra_base, 0, 4, u8; /// Register file
    }
    0x1F, 0x08, 2, RW, PTR_OFFSET_A(ptr_offset_a) { /// Indirect pointer A offset
        ptra_ofs, 0, 14, u16; /// Offset
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use embedded_hal_mock::eh1::spi::{Mock as SpiMock, Transaction as SpiTransaction};

    #[test]
    fn header_layout() {
        assert_eq!(header(false, 0x00, 0x00, 0), [0x40, 0x00]);
        assert_eq!(header(false, 0x00, 0x0C, 0), [0x40, 0x30]);
        assert_eq!(header(true, 0x0E, 0x1A, 0), [0xdc, 0x68]);
        // Sub addresses above 63 spill into the first octet
        assert_eq!(header(true, 0x07, 0x51, 0), [0xcf, 0x44]);
        assert_eq!(header(true, 0x11, 0x08, 3), [0xe2, 0x23]);
    }

    #[test]
    fn fields_straddle_bytes() {
        let mut data = [0xffu8; 6];
        set_field(&mut data, 10, 10, 0);
        set_field(&mut data, 16, 25, 0x155);
        assert_eq!(get_field(&data, 10, 10), 0);
        assert_eq!(get_field(&data, 16, 25), 0x155);
        assert_eq!(get_field(&data, 0, 9), 0x3ff);
        assert_eq!(data[3] & 0xfc, 0xfc);
    }

    #[tokio::test]
    async fn and_or_builds_masks() {
        // DTUNE0.pac = 3, all other bits untouched
        let spi = SpiMock::new(&[
            SpiTransaction::transaction_start(),
            SpiTransaction::write_vec(vec![0xcc, 0x02]),
            SpiTransaction::write_vec(vec![0xfc, 0xff]),
            SpiTransaction::write_vec(vec![0x03, 0x00]),
            SpiTransaction::transaction_end(),
        ]);

        let mut dw3000 = DW3000::new(spi);
        dw3000.dtune0().and_or(|w| w.pac(3)).await.unwrap();

        dw3000.spi.done();
    }

    #[tokio::test]
    async fn fast_command_byte() {
        let spi = SpiMock::new(&[
            SpiTransaction::transaction_start(),
            SpiTransaction::write_vec(vec![0x81 | (0x13 << 1)]),
            SpiTransaction::transaction_end(),
        ]);

        let mut dw3000 = DW3000::new(spi);
        dw3000.fast_command(0x13).await.unwrap();

        dw3000.spi.done();
    }

    #[tokio::test]
    async fn crc_is_appended_to_writes() {
        let payload = [0x40, 0x00, 0x00, 0x00];
        let head = header(true, 0x00, 0x2C, 0);
        let mut digest = SPI_CRC.digest();
        digest.update(&head);
        digest.update(&payload);
        let crc = digest.finalize();

        let spi = SpiMock::new(&[
            SpiTransaction::transaction_start(),
            SpiTransaction::write_vec(head.to_vec()),
            SpiTransaction::write_vec(payload.to_vec()),
            SpiTransaction::write_vec(vec![crc]),
            SpiTransaction::transaction_end(),
        ]);

        let mut dw3000 = DW3000::new(spi);
        dw3000.set_crc_mode(SpiCrcMode::Write);
        dw3000.write32(0x00, 0x2C, 0x40).await.unwrap();

        dw3000.spi.done();
    }

    #[tokio::test]
    async fn far_offsets_use_indirect_pointer() {
        let spi = SpiMock::new(&[
            SpiTransaction::transaction_start(),
            SpiTransaction::write_vec(header(true, 0x1F, 0x04, 0).to_vec()),
            SpiTransaction::write_vec(vec![0x15]),
            SpiTransaction::transaction_end(),
            SpiTransaction::transaction_start(),
            SpiTransaction::write_vec(header(true, 0x1F, 0x08, 0).to_vec()),
            SpiTransaction::write_vec(vec![0x00, 0x02]),
            SpiTransaction::transaction_end(),
            SpiTransaction::transaction_start(),
            SpiTransaction::write_vec(header(false, 0x1D, 0x00, 0).to_vec()),
            SpiTransaction::read_vec(vec![0xaa, 0xbb]),
            SpiTransaction::transaction_end(),
        ]);

        let mut dw3000 = DW3000::new(spi);
        let mut data = [0; 2];
        dw3000.read_bytes(0x15, 0x200, &mut data).await.unwrap();
        assert_eq!(data, [0xaa, 0xbb]);

        dw3000.spi.done();
    }
}
