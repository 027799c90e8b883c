//! A register file model of the chip for scenario tests
//!
//! `FakeChip` decodes the two-octet SPI header and serves plain reads, plain
//! writes and masked AND/OR writes from a flat, sparse register space.
//! Registers that the chip clears on writing 1 (SYS_STATUS, RDB_STATUS,
//! AES_STS) behave that way. Bits registered with `force` read back as set no
//! matter what was written, which stands in for hardware that sets a flag on
//! its own (PLL lock, calibration done). OTP words are served through the
//! OTP_ADDR/OTP_CFG/OTP_RDATA read sequence, the AON array through
//! AON_ADDR/AON_CTRL.

use std::collections::HashMap;
use std::vec::Vec;

use embedded_hal::spi::{ErrorType, Operation};

/// Address inside the fake: register file in the upper half, byte offset in
/// the lower half
fn addr(file: u8, offset: u16) -> u32 {
    ((file as u32) << 16) | offset as u32
}

const WRITE_ONE_TO_CLEAR: &[(u8, u16, u16)] = &[(0x00, 0x44, 6), (0x01, 0x24, 1), (0x01, 0x50, 4)];

#[derive(Default)]
pub(crate) struct FakeChip {
    regs: HashMap<u32, u8>,
    forced: HashMap<u32, u8>,
    otp: HashMap<u16, u32>,
    aon: HashMap<u16, u8>,
    /// Fast commands in the order they were received
    pub(crate) fast_commands: Vec<u8>,
    /// `(file, offset, data)` of every plain write
    pub(crate) writes: Vec<(u8, u16, Vec<u8>)>,
    /// Strip a trailing CRC octet from writes
    pub(crate) crc: bool,
}

impl FakeChip {
    pub(crate) fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        Self::default()
    }

    pub(crate) fn get8(&self, file: u8, offset: u16) -> u8 {
        let a = addr(file, offset);
        self.regs.get(&a).copied().unwrap_or(0) | self.forced.get(&a).copied().unwrap_or(0)
    }

    pub(crate) fn set8(&mut self, file: u8, offset: u16, value: u8) {
        self.regs.insert(addr(file, offset), value);
    }

    pub(crate) fn get_bytes(&self, file: u8, offset: u16, len: usize) -> Vec<u8> {
        (0..len).map(|i| self.get8(file, offset + i as u16)).collect()
    }

    pub(crate) fn set_bytes(&mut self, file: u8, offset: u16, data: &[u8]) {
        for (i, b) in data.iter().enumerate() {
            self.set8(file, offset + i as u16, *b);
        }
    }

    pub(crate) fn get32(&self, file: u8, offset: u16) -> u32 {
        let b = self.get_bytes(file, offset, 4);
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    pub(crate) fn set32(&mut self, file: u8, offset: u16, value: u32) {
        self.set_bytes(file, offset, &value.to_le_bytes());
    }

    pub(crate) fn get16(&self, file: u8, offset: u16) -> u16 {
        let b = self.get_bytes(file, offset, 2);
        u16::from_le_bytes([b[0], b[1]])
    }

    pub(crate) fn set16(&mut self, file: u8, offset: u16, value: u16) {
        self.set_bytes(file, offset, &value.to_le_bytes());
    }

    /// Programs a word of the fake OTP
    pub(crate) fn set_otp(&mut self, address: u16, value: u32) {
        self.otp.insert(address, value);
    }

    pub(crate) fn get_aon(&self, address: u16) -> u8 {
        self.aon.get(&address).copied().unwrap_or(0)
    }

    pub(crate) fn set_aon(&mut self, address: u16, value: u8) {
        self.aon.insert(address, value);
    }

    /// Bits that read back as set regardless of writes
    pub(crate) fn force(&mut self, file: u8, offset: u16, mask: u8) {
        *self.forced.entry(addr(file, offset)).or_insert(0) |= mask;
    }

    pub(crate) fn unforce(&mut self, file: u8, offset: u16) {
        self.forced.remove(&addr(file, offset));
    }

    /// A chip that came out of reset fine: known DEV_ID, PLL locks, RX
    /// calibration completes
    pub(crate) fn healthy(dev_id: u32) -> Self {
        let mut chip = FakeChip::new();
        chip.set32(0x00, 0x00, dev_id);
        // SPIRDY, RCINIT
        chip.set8(0x00, 0x46, 0x80);
        chip.set8(0x00, 0x47, 0x01);
        // CPLOCK
        chip.force(0x00, 0x44, 0x02);
        // RX_CAL_STS done
        chip.force(0x04, 0x20, 0x01);
        chip
    }

    fn is_write_one_to_clear(file: u8, offset: u16) -> bool {
        WRITE_ONE_TO_CLEAR
            .iter()
            .any(|&(f, o, len)| f == file && offset >= o && offset < o + len)
    }

    /// Resolves indirect pointer A
    fn resolve(&self, file: u8, offset: u16) -> (u8, u16) {
        if file == 0x1D {
            let base = self.get8(0x1F, 0x04) & 0x1f;
            let ofs = self.get16(0x1F, 0x08) & 0x7fff;
            (base, ofs + offset)
        } else {
            (file, offset)
        }
    }

    fn store(&mut self, file: u8, offset: u16, data: &[u8]) {
        let (file, offset) = self.resolve(file, offset);
        self.writes.push((file, offset, data.to_vec()));
        for (i, b) in data.iter().enumerate() {
            let o = offset + i as u16;
            if Self::is_write_one_to_clear(file, o) {
                let old = self.regs.get(&addr(file, o)).copied().unwrap_or(0);
                self.set8(file, o, old & !b);
            } else {
                self.set8(file, o, *b);
            }
        }
    }

    fn masked(&mut self, file: u8, offset: u16, data: &[u8]) {
        let (file, offset) = self.resolve(file, offset);
        let width = data.len() / 2;
        for i in 0..width {
            let o = offset + i as u16;
            let old = self.regs.get(&addr(file, o)).copied().unwrap_or(0);
            self.set8(file, o, (old & data[i]) | data[width + i]);
        }
    }

    fn load(&self, file: u8, offset: u16, out: &mut [u8]) {
        let (file, offset) = self.resolve(file, offset);
        for (i, b) in out.iter_mut().enumerate() {
            *b = self.get8(file, offset + i as u16);
        }
    }

    pub(crate) fn execute(&mut self, operations: &mut [Operation<'_, u8>]) {
        // Everything the host clocks out, and where the read data goes
        let mut out: Vec<u8> = Vec::new();
        for op in operations.iter() {
            match op {
                Operation::Write(data) => out.extend_from_slice(data),
                Operation::TransferInPlace(data) => out.extend_from_slice(data),
                Operation::Transfer(_, write) => out.extend_from_slice(write),
                _ => {}
            }
        }

        if out.is_empty() {
            return;
        }

        if out[0] & 0x40 == 0 {
            log::trace!("fast command {:#04x}", (out[0] >> 1) & 0x1f);
            self.fast_commands.push((out[0] >> 1) & 0x1f);
            return;
        }

        let write = out[0] & 0x80 != 0;
        let file = (out[0] >> 1) & 0x1f;
        let offset = ((((out[0] & 0x01) << 6) | (out[1] >> 2)) & 0x7f) as u16;
        let mode = out[1] & 0x03;
        log::trace!(
            "{} {:#04x}:{:#04x} mode {}",
            if write { "write" } else { "read" },
            file,
            offset,
            mode
        );

        if write {
            let mut data = &out[2..];
            if self.crc && !data.is_empty() {
                data = &data[..data.len() - 1];
            }
            let data = data.to_vec();
            if mode == 0 {
                self.store(file, offset, &data);
                // OTP read strobe
                if (file, offset) == (0x0B, 0x08) && data.first().map_or(false, |b| b & 0x02 != 0) {
                    let address = self.get16(0x0B, 0x04) & 0x7ff;
                    let word = self.otp.get(&address).copied().unwrap_or(0);
                    self.set32(0x0B, 0x10, word);
                }
                // AON array access through AON_CTRL
                if (file, offset) == (0x0A, 0x04) {
                    let ctrl = data.first().copied().unwrap_or(0);
                    let address = self.get16(0x0A, 0x0C);
                    if ctrl & 0x88 == 0x88 {
                        let value = self.get_aon(address);
                        self.set8(0x0A, 0x08, value);
                    } else if ctrl & 0x90 == 0x90 {
                        let value = self.get8(0x0A, 0x10);
                        self.set_aon(address, value);
                    }
                }
            } else {
                self.masked(file, offset, &data);
            }
            return;
        }

        // Reads: fill whatever the host reads after the header
        let mut position = 0usize;
        for op in operations.iter_mut() {
            match op {
                Operation::Write(data) => position += data.len(),
                Operation::Read(buffer) => {
                    let start = position.saturating_sub(2) as u16;
                    self.load(file, offset + start, buffer);
                    position += buffer.len();
                }
                Operation::TransferInPlace(buffer) => {
                    let len = buffer.len();
                    if len > 2 {
                        self.load(file, offset, &mut buffer[2..]);
                    }
                    position += len;
                }
                _ => {}
            }
        }
    }
}

impl ErrorType for FakeChip {
    type Error = core::convert::Infallible;
}

impl embedded_hal::spi::SpiDevice<u8> for FakeChip {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Self::Error> {
        self.execute(operations);
        Ok(())
    }
}

#[cfg(feature = "async")]
impl embedded_hal_async::spi::SpiDevice<u8> for FakeChip {
    async fn transaction(
        &mut self,
        operations: &mut [Operation<'_, u8>],
    ) -> Result<(), Self::Error> {
        self.execute(operations);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ll;

    #[tokio::test]
    async fn register_round_trips() {
        let mut dw3000 = ll::DW3000::new(FakeChip::new());

        dw3000.write8(0x11, 0x16, 0xa5).await.unwrap();
        dw3000.write16(0x01, 0x04, 0x4015).await.unwrap();
        dw3000.write32(0x00, 0x2C, 0xdead_beef).await.unwrap();

        assert_eq!(dw3000.read8(0x11, 0x16).await.unwrap(), 0xa5);
        assert_eq!(dw3000.read16(0x01, 0x04).await.unwrap(), 0x4015);
        assert_eq!(dw3000.read32(0x00, 0x2C).await.unwrap(), 0xdead_beef);
        assert_eq!(dw3000.dx_time().read().await.unwrap().value(), 0xdead_beef);
    }

    #[tokio::test]
    async fn masked_writes_keep_other_bits() {
        let mut chip = FakeChip::new();
        chip.set32(0x0E, 0x00, 0xffff_ffff);
        let mut dw3000 = ll::DW3000::new(chip);

        dw3000.cia_conf().and_or(|w| w.mindiag(0)).await.unwrap();
        assert_eq!(dw3000.bus().get32(0x0E, 0x00), 0xffef_ffff);

        dw3000.and_or8(0x0E, 0x00, 0x0f, 0x50).await.unwrap();
        assert_eq!(dw3000.bus().get32(0x0E, 0x00), 0xffef_ff5f);

        dw3000.and_or16(0x0E, 0x00, 0x00ff, 0x1200).await.unwrap();
        assert_eq!(dw3000.bus().get32(0x0E, 0x00), 0xffef_125f);
    }

    #[tokio::test]
    async fn status_is_write_one_to_clear() {
        let mut chip = FakeChip::new();
        chip.set32(0x00, 0x44, 0xab12_cd34);
        let mut dw3000 = ll::DW3000::new(chip);

        dw3000.write32(0x00, 0x44, 0x0000_0034).await.unwrap();
        assert_eq!(dw3000.read32(0x00, 0x44).await.unwrap(), 0xab12_cd00);
    }
}
