//! AES engine
//!
//! The engine runs CCM* or GCM over data already in chip memory. A job names
//! a source and a destination memory; the header is authenticated only, the
//! payload is encrypted or decrypted in place of the destination, followed by
//! the MIC.
//!
//! The key comes from the AES_KEY register, the key RAM or OTP, as selected
//! by [`AesConfig`].

use bitflags::bitflags;

use super::{
    retry::{Outcome, Retry, POLL_DELAY_US, SHORT_JOB_POLLS},
    AesError,
};
use crate::{delay_type, ll::file, maybe_async_attr, spi_type, Error, Ready, DW3000};

/// Longest nonce the engine takes
pub const AES_NONCE_MAX_LEN: usize = 16;
/// Longest header, in octets
pub const AES_HEADER_MAX_LEN: usize = 127;
/// Longest payload, in octets
pub const AES_PAYLOAD_MAX_LEN: usize = 1023;
/// Payload length when the destination is the STS key
pub const STS_KEY_LEN: usize = 16;

const SCRATCH_LEN: usize = 127;
const RX_BUFFER_LEN: usize = 1023;
const TX_BUFFER_LEN: usize = 1024;

/// Encryption or decryption
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AesMode {
    /// Encrypt the payload and compute the MIC
    #[default]
    Encrypt = 0,
    /// Decrypt the payload and check the MIC
    Decrypt = 1,
}

/// Key length
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AesKeySize {
    /// 128 bits
    #[default]
    Bits128 = 0,
    /// 192 bits
    Bits192 = 1,
    /// 256 bits
    Bits256 = 2,
}

impl AesKeySize {
    /// Key length in octets
    pub fn octets(&self) -> usize {
        match self {
            AesKeySize::Bits128 => 16,
            AesKeySize::Bits192 => 24,
            AesKeySize::Bits256 => 32,
        }
    }
}

/// Cipher mode of the core
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AesCore {
    /// Galois counter mode
    Gcm = 0,
    /// CCM*, as used by IEEE 802.15.4
    #[default]
    Ccm = 1,
}

/// Where the key is taken from
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AesKeySource {
    /// The AES_KEY register, see [`DW3000::set_aes_key`]
    #[default]
    Register,
    /// A slot of the key RAM
    Ram(u8),
    /// OTP, first or second 128-bit block
    Otp {
        /// Use the second block
        second_block: bool,
    },
}

/// MIC length
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MicSize {
    /// No MIC, CCM* only
    Mic0 = 0,
    /// 4 octets
    Mic4 = 1,
    /// 6 octets
    Mic6 = 2,
    /// 8 octets
    #[default]
    Mic8 = 3,
    /// 10 octets
    Mic10 = 4,
    /// 12 octets
    Mic12 = 5,
    /// 14 octets
    Mic14 = 6,
    /// 16 octets
    Mic16 = 7,
}

impl MicSize {
    /// Length in octets
    pub fn octets(&self) -> usize {
        match self {
            MicSize::Mic0 => 0,
            other => 2 + 2 * *other as usize,
        }
    }
}

/// MIC size for a length in octets
///
/// Only 0 and the even lengths from 4 to 16 exist.
pub fn mic_size_from_bytes(bytes: u8) -> Option<MicSize> {
    match bytes {
        0 => Some(MicSize::Mic0),
        4 => Some(MicSize::Mic4),
        6 => Some(MicSize::Mic6),
        8 => Some(MicSize::Mic8),
        10 => Some(MicSize::Mic10),
        12 => Some(MicSize::Mic12),
        14 => Some(MicSize::Mic14),
        16 => Some(MicSize::Mic16),
        _ => None,
    }
}

/// AES engine configuration
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AesConfig {
    /// Default direction, a job may override it
    pub mode: AesMode,
    /// Key length
    pub key_size: AesKeySize,
    /// Cipher mode
    pub core: AesCore,
    /// Default MIC length, a job may override it
    pub mic: MicSize,
    /// Key location
    pub key_source: AesKeySource,
}

/// Memory the engine reads from or writes to
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AesPort {
    /// Scratch RAM
    Scratch = 0,
    /// First RX buffer
    RxBuffer0 = 1,
    /// Second RX buffer
    RxBuffer1 = 2,
    /// TX buffer
    TxBuffer = 3,
    /// The STS key, destination only
    StsKey = 4,
}

impl AesPort {
    fn file(&self) -> u8 {
        match self {
            AesPort::Scratch => file::SCRATCH_RAM,
            AesPort::RxBuffer0 => file::RX_BUFFER_0,
            AesPort::RxBuffer1 => file::RX_BUFFER_1,
            AesPort::TxBuffer => file::TX_BUFFER,
            AesPort::StsKey => 0x02,
        }
    }

    fn capacity(&self) -> usize {
        match self {
            AesPort::Scratch => SCRATCH_LEN,
            AesPort::RxBuffer0 | AesPort::RxBuffer1 => RX_BUFFER_LEN,
            AesPort::TxBuffer => TX_BUFFER_LEN,
            AesPort::StsKey => STS_KEY_LEN,
        }
    }

    /// The host fills the source itself, except for received frames
    fn host_written(&self) -> bool {
        matches!(self, AesPort::Scratch | AesPort::TxBuffer)
    }
}

/// One pass of the engine
///
/// For encryption `payload` holds the plain text and receives the cipher
/// text, `mic` receives the MIC. For decryption it is the other way round and
/// `mic` carries the MIC to check. With an RX buffer as source the frame is
/// already in the chip, and `header`/`payload` only give the lengths.
#[derive(Debug)]
pub struct AesJob<'a> {
    /// Nonce, at most 16 octets
    pub nonce: &'a [u8],
    /// Authenticated, not encrypted
    pub header: &'a [u8],
    /// Encrypted or decrypted
    pub payload: &'a mut [u8],
    /// MIC, its length selects the MIC size
    pub mic: &'a mut [u8],
    /// Source memory
    pub src_port: AesPort,
    /// Destination memory
    pub dst_port: AesPort,
    /// Direction
    pub mode: AesMode,
}

impl<'a> AesJob<'a> {
    /// Checks the job against the engine configuration
    pub fn validate(&self, config: &AesConfig) -> Result<MicSize, AesError> {
        let mic = u8::try_from(self.mic.len())
            .ok()
            .and_then(mic_size_from_bytes)
            .ok_or(AesError::WrongMicSize)?;
        if config.core == AesCore::Gcm && mic == MicSize::Mic0 {
            return Err(AesError::WrongMicSize);
        }

        if self.src_port == AesPort::StsKey {
            return Err(AesError::WrongMode);
        }
        if self.dst_port == AesPort::StsKey && self.mode == AesMode::Encrypt {
            return Err(AesError::WrongMode);
        }
        if matches!(config.key_source, AesKeySource::Otp { .. })
            && config.key_size != AesKeySize::Bits128
        {
            return Err(AesError::WrongMode);
        }

        if self.payload.len() > AES_PAYLOAD_MAX_LEN {
            return Err(AesError::PayloadSize);
        }
        if self.dst_port == AesPort::StsKey && self.payload.len() != STS_KEY_LEN {
            return Err(AesError::PayloadSize);
        }

        let total = self.header.len() + self.payload.len() + self.mic.len();
        if self.nonce.len() > AES_NONCE_MAX_LEN
            || self.header.len() > AES_HEADER_MAX_LEN
            || total > self.src_port.capacity()
            || (self.dst_port != AesPort::StsKey && total > self.dst_port.capacity())
        {
            return Err(AesError::DataSize);
        }

        Ok(mic)
    }
}

bitflags! {
    /// AES_STS
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct AesStatus: u8 {
        /// The job completed
        const DONE = 0x01;
        /// The MIC did not match
        const AUTH_ERROR = 0x02;
        /// The DMA transfer failed
        const TRANSFER_ERROR = 0x04;
        /// Source and destination overlap in a way the engine can't handle
        const MEM_CONFLICT = 0x08;
        /// The key RAM is empty
        const RAM_EMPTY = 0x10;
        /// The key RAM is full
        const RAM_FULL = 0x20;

        /// Any failure of the job
        const ERRORS = Self::AUTH_ERROR.bits()
            | Self::TRANSFER_ERROR.bits()
            | Self::MEM_CONFLICT.bits();
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for AesStatus {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "AesStatus({=u8:#x})", self.bits())
    }
}

impl AesStatus {
    /// The job completed without error
    pub fn is_ok(&self) -> bool {
        self.contains(AesStatus::DONE) && !self.intersects(AesStatus::ERRORS)
    }
}

impl<SPI> DW3000<SPI, Ready>
where
    SPI: spi_type::spi::SpiDevice<u8>,
{
    /// Programs the AES engine
    #[maybe_async_attr]
    pub async fn configure_aes(&mut self, config: AesConfig) -> Result<(), Error<SPI>> {
        let (key_src, key_load, key_addr, key_otp, key_otp_sel) = match config.key_source {
            AesKeySource::Register => (0, 0, 0, 0, 0),
            AesKeySource::Ram(slot) => (1, 1, slot & 0x07, 0, 0),
            AesKeySource::Otp { second_block } => (1, 1, 0, 1, second_block as u8),
        };

        self.ll
            .aes_cfg()
            .write(|w| {
                w.mode(config.mode as u8)
                    .key_size(config.key_size as u8)
                    .key_addr(key_addr)
                    .key_load(key_load)
                    .key_src(key_src)
                    .tag_size(config.mic as u8)
                    .core_sel(config.core as u8)
                    .key_otp(key_otp)
                    .key_otp_sel(key_otp_sel)
            })
            .await?;

        self.ctx.aes = Some(config);
        Ok(())
    }

    /// Loads a 128, 192 or 256-bit key into the AES_KEY register
    #[maybe_async_attr]
    pub async fn set_aes_key(&mut self, key: &[u8]) -> Result<(), Error<SPI>> {
        if !matches!(key.len(), 16 | 24 | 32) {
            return Err(Error::InvalidConfiguration);
        }
        self.ll.write_bytes(0x01, 0x54, key).await?;
        Ok(())
    }

    /// Loads the nonce of the next job
    #[maybe_async_attr]
    pub async fn set_aes_iv(&mut self, nonce: &[u8]) -> Result<(), Error<SPI>> {
        if nonce.len() > AES_NONCE_MAX_LEN {
            return Err(Error::Aes(AesError::DataSize));
        }
        self.ll.write_bytes(0x01, 0x34, nonce).await?;
        Ok(())
    }

    /// Runs one job and waits for it
    ///
    /// Parameter errors come back as [`Error::Aes`] before anything is
    /// written. Otherwise the status of the engine is returned, and the
    /// results are only copied back when [`AesStatus::is_ok`].
    #[maybe_async_attr]
    pub async fn do_aes<DELAY>(
        &mut self,
        delay: &mut DELAY,
        job: &mut AesJob<'_>,
    ) -> Result<AesStatus, Error<SPI>>
    where
        DELAY: delay_type::delay::DelayNs,
    {
        let config = self.ctx.aes.ok_or(Error::Aes(AesError::WrongMode))?;
        let mic = job.validate(&config)?;

        let header_len = job.header.len();
        let payload_len = job.payload.len();

        self.set_aes_iv(job.nonce).await?;

        if job.src_port.host_written() {
            let src = job.src_port.file();
            self.ll.write_bytes(src, 0, job.header).await?;
            self.ll
                .write_bytes(src, header_len as u16, job.payload)
                .await?;
            if job.mode == AesMode::Decrypt {
                self.ll
                    .write_bytes(src, (header_len + payload_len) as u16, job.mic)
                    .await?;
            }
        }

        self.ll
            .aes_cfg()
            .and_or(|w| w.mode(job.mode as u8).tag_size(mic as u8))
            .await?;
        self.ll
            .dma_cfg()
            .write(|w| {
                w.src_port(job.src_port as u8)
                    .src_addr(0)
                    .dst_port(job.dst_port as u8)
                    .dst_addr(0)
                    .cp_end_sel(1)
                    .hdr_size(header_len as u8)
                    .pyld_size(payload_len as u16)
            })
            .await?;
        self.ll.aes_start().write(|w| w.value(1)).await?;

        let mut status = AesStatus::empty();
        let mut retry = Retry::new(SHORT_JOB_POLLS, POLL_DELAY_US);
        while retry.next_attempt() {
            status = AesStatus::from_bits_truncate(self.ll.aes_sts().read().await?.value());
            if status.intersects(AesStatus::DONE | AesStatus::ERRORS) {
                retry.finish();
            } else {
                delay.delay_us(retry.delay_us()).await;
            }
        }
        if retry.outcome() == Outcome::Exhausted {
            #[cfg(feature = "defmt")]
            defmt::warn!("AES job did not complete");
            return Err(Error::WrongState);
        }

        self.ll.aes_sts().write(|w| w.value(status.bits())).await?;

        if !status.is_ok() {
            #[cfg(feature = "defmt")]
            defmt::warn!("AES job failed: {:?}", status);
            return Ok(status);
        }

        if job.dst_port != AesPort::StsKey {
            let dst = job.dst_port.file();
            self.ll
                .read_bytes(dst, header_len as u16, job.payload)
                .await?;
            if job.mode == AesMode::Encrypt {
                self.ll
                    .read_bytes(dst, (header_len + payload_len) as u16, job.mic)
                    .await?;
            }
        }

        Ok(status)
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
    fn mic_sizes() {
        assert_eq!(mic_size_from_bytes(0), Some(MicSize::Mic0));
        assert_eq!(mic_size_from_bytes(8), Some(MicSize::Mic8));
        assert_eq!(mic_size_from_bytes(16), Some(MicSize::Mic16));
        assert_eq!(mic_size_from_bytes(5), None);
        assert_eq!(mic_size_from_bytes(18), None);
        assert_eq!(MicSize::Mic14.octets(), 14);
        assert_eq!(MicSize::Mic0.octets(), 0);
    }

    #[test]
    fn job_validation_sentinels() {
        let config = AesConfig::default();
        let header = [0u8; 10];
        let mut payload = [0u8; 20];
        let mut mic = [0u8; 5];

        let mut job = AesJob {
            nonce: &[0; 13],
            header: &header,
            payload: &mut payload,
            mic: &mut mic,
            src_port: AesPort::Scratch,
            dst_port: AesPort::Scratch,
            mode: AesMode::Encrypt,
        };
        let error = job.validate(&config).unwrap_err();
        assert_eq!(error, AesError::WrongMicSize);
        assert_eq!(error.code(), -3);

        let mut mic = [0u8; 8];
        job.mic = &mut mic;
        assert_eq!(job.validate(&config), Ok(MicSize::Mic8));

        // 10 + 120 + 8 octets don't fit the scratch RAM
        let mut long = [0u8; 120];
        job.payload = &mut long;
        assert_eq!(job.validate(&config), Err(AesError::DataSize));
        job.src_port = AesPort::TxBuffer;
        job.dst_port = AesPort::TxBuffer;
        assert!(job.validate(&config).is_ok());

        let mut short_key = [0u8; 8];
        job.payload = &mut short_key;
        job.dst_port = AesPort::StsKey;
        assert_eq!(job.validate(&config), Err(AesError::WrongMode));
        job.mode = AesMode::Decrypt;
        let error = job.validate(&config).unwrap_err();
        assert_eq!(error, AesError::PayloadSize);
        assert_eq!(error.code(), -4);

        let mut no_mic = [0u8; 0];
        job.mic = &mut no_mic;
        let gcm = AesConfig {
            core: AesCore::Gcm,
            ..config
        };
        assert_eq!(job.validate(&gcm), Err(AesError::WrongMicSize));
    }

    #[tokio::test]
    async fn key_and_configuration() {
        let mut dw3000 = ready(FakeChip::healthy(0xDECA_0304)).await;

        dw3000
            .configure_aes(AesConfig {
                mode: AesMode::Decrypt,
                key_size: AesKeySize::Bits128,
                core: AesCore::Ccm,
                mic: MicSize::Mic16,
                key_source: AesKeySource::Otp { second_block: true },
            })
            .await
            .unwrap();
        // decrypt, OTP key, second block, load from RAM or OTP, CCM*, MIC 16
        assert_eq!(dw3000.ll().bus().get16(0x01, 0x30), 0x3fc1);

        let key: [u8; 16] = core::array::from_fn(|i| i as u8);
        dw3000.set_aes_key(&key).await.unwrap();
        assert_eq!(dw3000.ll().bus().get_bytes(0x01, 0x54, 16), key.to_vec());

        assert!(matches!(
            dw3000.set_aes_key(&key[..10]).await,
            Err(Error::InvalidConfiguration)
        ));
    }

    #[tokio::test]
    async fn job_without_configuration_is_rejected() {
        let mut dw3000 = ready(FakeChip::healthy(0xDECA_0302)).await;
        let mut payload = [0u8; 4];
        let mut mic = [0u8; 8];
        let mut job = AesJob {
            nonce: &[0; 13],
            header: &[],
            payload: &mut payload,
            mic: &mut mic,
            src_port: AesPort::Scratch,
            dst_port: AesPort::Scratch,
            mode: AesMode::Encrypt,
        };

        let result = dw3000.do_aes(&mut NoopDelay::new(), &mut job).await;
        assert!(matches!(result, Err(Error::Aes(AesError::WrongMode))));
        assert!(dw3000.ll().bus().writes.iter().all(|w| w.0 != 0x16));
    }

    #[tokio::test]
    async fn encryption_job() {
        let mut chip = FakeChip::healthy(0xDECA_0302);
        // the engine reports completion right away
        chip.set8(0x01, 0x50, 0x01);
        let mut dw3000 = ready(chip).await;
        dw3000.configure_aes(AesConfig::default()).await.unwrap();

        let header = [0xa0, 0xa1];
        let mut payload = [1, 2, 3, 4];
        let mut mic = [0u8; 8];
        let mut job = AesJob {
            nonce: &[0x55; 13],
            header: &header,
            payload: &mut payload,
            mic: &mut mic,
            src_port: AesPort::Scratch,
            dst_port: AesPort::Scratch,
            mode: AesMode::Encrypt,
        };

        let status = dw3000
            .do_aes(&mut NoopDelay::new(), &mut job)
            .await
            .unwrap();
        assert!(status.is_ok());

        let chip = dw3000.ll().bus();
        assert_eq!(chip.get_bytes(0x16, 0, 6), vec![0xa0, 0xa1, 1, 2, 3, 4]);
        assert_eq!(chip.get_bytes(0x01, 0x34, 13), vec![0x55; 13]);
        assert_eq!(chip.get8(0x01, 0x4C), 1);
        // status cleared
        assert_eq!(chip.get8(0x01, 0x50), 0);
        // header and payload sizes in the upper word of DMA_CFG
        let dma_hi = chip.get32(0x01, 0x48);
        assert_eq!(dma_hi & 0x7f, 2);
        assert_eq!((dma_hi >> 7) & 0x3ff, 4);
    }

    #[tokio::test]
    async fn failed_job_reports_status() {
        let mut chip = FakeChip::healthy(0xDECA_0302);
        chip.set8(0x01, 0x50, 0x03);
        let mut dw3000 = ready(chip).await;
        dw3000.configure_aes(AesConfig::default()).await.unwrap();

        let mut payload = [0xee; 4];
        let mut mic = [0u8; 8];
        let mut job = AesJob {
            nonce: &[0; 13],
            header: &[],
            payload: &mut payload,
            mic: &mut mic,
            src_port: AesPort::RxBuffer0,
            dst_port: AesPort::Scratch,
            mode: AesMode::Decrypt,
        };

        let status = dw3000
            .do_aes(&mut NoopDelay::new(), &mut job)
            .await
            .unwrap();
        assert!(status.contains(AesStatus::AUTH_ERROR));
        assert!(!status.is_ok());
        // nothing copied back
        assert_eq!(payload, [0xee; 4]);
    }

    #[tokio::test]
    async fn stuck_engine() {
        let mut dw3000 = ready(FakeChip::healthy(0xDECA_0302)).await;
        dw3000.configure_aes(AesConfig::default()).await.unwrap();

        let mut payload = [0u8; 4];
        let mut mic = [0u8; 4];
        let mut job = AesJob {
            nonce: &[0; 13],
            header: &[],
            payload: &mut payload,
            mic: &mut mic,
            src_port: AesPort::TxBuffer,
            dst_port: AesPort::TxBuffer,
            mode: AesMode::Encrypt,
        };

        let result = dw3000.do_aes(&mut NoopDelay::new(), &mut job).await;
        assert!(matches!(result, Err(Error::WrongState)));
    }
}
