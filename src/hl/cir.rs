//! Channel impulse response
//!
//! The accumulator memory holds the CIR of the Ipatov preamble followed by
//! the CIRs of the two STS blocks. Each sample is a complex number of two
//! 24-bit two's complement values, real part first. Every read of the
//! memory starts with one dummy octet.

use crate::{configs::Prf, maybe_async_attr, spi_type, Error, Ready, DW3000};

/// Accumulator memory
const ACC_MEM: u8 = 0x15;

/// Octets of one full precision sample
const SAMPLE_LEN: usize = 6;

/// Samples per SPI burst
const CHUNK_SAMPLES: usize = 16;

/// Samples of the STS CIRs
pub const CIR_LEN_STS: u16 = 512;
/// Samples of the Ipatov CIR at 16 MHz PRF
pub const CIR_LEN_IP_PRF16: u16 = 992;
/// Samples of the Ipatov CIR at 64 MHz PRF
pub const CIR_LEN_IP_PRF64: u16 = 1016;

/// One of the three CIRs
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AccumulatorIndex {
    /// Ipatov preamble
    Ipatov = 0,
    /// First STS block
    Sts0 = 1,
    /// Second STS block, PDoA mode 3 only
    Sts1 = 2,
}

impl AccumulatorIndex {
    /// First sample in the accumulator memory
    fn base(&self) -> u16 {
        match self {
            AccumulatorIndex::Ipatov => 0,
            AccumulatorIndex::Sts0 => 1024,
            AccumulatorIndex::Sts1 => 1536,
        }
    }

    /// Number of samples
    pub fn len(&self, prf: Prf) -> u16 {
        match (self, prf) {
            (AccumulatorIndex::Ipatov, Prf::Mhz16) => CIR_LEN_IP_PRF16,
            (AccumulatorIndex::Ipatov, Prf::Mhz64) => CIR_LEN_IP_PRF64,
            _ => CIR_LEN_STS,
        }
    }
}

/// Precision of the returned samples
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CirReadMode {
    /// 24 bits per component
    #[default]
    Full = 0,
    /// Bits 15..0 per component
    Lo = 1,
    /// Bits 16..1 per component
    Mid = 2,
    /// Bits 17..2 per component
    Hi = 3,
}

/// A complex CIR sample
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CirSample {
    /// Real part
    pub re: i32,
    /// Imaginary part
    pub im: i32,
}

fn sign_extend_24(bytes: &[u8]) -> i32 {
    let raw = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]);
    (raw << 8) >> 8
}

fn reduce(value: i32, mode: CirReadMode) -> i32 {
    match mode {
        CirReadMode::Full => value,
        CirReadMode::Lo => value as i16 as i32,
        CirReadMode::Mid => (value >> 1) as i16 as i32,
        CirReadMode::Hi => (value >> 2) as i16 as i32,
    }
}

/// Decodes full precision samples
///
/// `raw` starts with the dummy octet of the read.
pub fn decode_cir(raw: &[u8], samples: &mut [CirSample], mode: CirReadMode) {
    for (sample, bytes) in samples
        .iter_mut()
        .zip(raw.get(1..).unwrap_or_default().chunks_exact(SAMPLE_LEN))
    {
        *sample = CirSample {
            re: reduce(sign_extend_24(&bytes[..3]), mode),
            im: reduce(sign_extend_24(&bytes[3..]), mode),
        };
    }
}

impl<SPI> DW3000<SPI, Ready>
where
    SPI: spi_type::spi::SpiDevice<u8>,
{
    /// Reads `samples.len()` CIR samples, starting at sample `start`
    ///
    /// The range has to lie inside the accumulator for the configured PRF.
    #[maybe_async_attr]
    pub async fn read_cir(
        &mut self,
        accumulator: AccumulatorIndex,
        start: u16,
        samples: &mut [CirSample],
        mode: CirReadMode,
    ) -> Result<(), Error<SPI>> {
        let len = accumulator.len(self.ctx.config.prf()) as usize;
        if start as usize + samples.len() > len {
            return Err(Error::InvalidConfiguration);
        }

        let mut raw = [0u8; 1 + CHUNK_SAMPLES * SAMPLE_LEN];
        let mut index = (accumulator.base() + start) as usize;
        for chunk in samples.chunks_mut(CHUNK_SAMPLES) {
            let buffer = &mut raw[..1 + chunk.len() * SAMPLE_LEN];
            self.ll
                .read_bytes(ACC_MEM, (index * SAMPLE_LEN) as u16, buffer)
                .await?;
            decode_cir(buffer, chunk, mode);
            index += chunk.len();
        }

        Ok(())
    }
}
