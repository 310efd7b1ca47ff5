use super::*;
use core::convert::TryFrom;
use static_assertions::{const_assert, const_assert_eq};

/// Widest block the single-block-length register describes.
pub const MAX_BLOCK_SIZE: u32 = 512;
/// Widest count the CSR block-count field holds.
pub const MAX_BLOCK_COUNT: u32 = 255;
/// DMA start addresses must be word aligned.
pub const DMA_ALIGN: usize = 4;

const_assert_eq!(CSR_BLK_CNT_MASK >> CSR_BLK_CNT_SHIFT, MAX_BLOCK_COUNT);
const_assert!(MAX_BLOCK_SIZE as usize % DMA_ALIGN == 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataDirection {
    Read,
    Write,
}

/// Data phase attached to a command.
///
/// `buf` is the bus address the DMA engine reads from (write) or fills (read).
/// The caller keeps the buffer alive and untouched until the command returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmcData {
    pub direction: DataDirection,
    pub blocksize: u32,
    pub blocks: u32,
    pub buf: PhysAddr,
}

impl MmcData {
    pub fn read(buf: PhysAddr, blocksize: u32, blocks: u32) -> Self {
        Self {
            direction: DataDirection::Read,
            blocksize,
            blocks,
            buf,
        }
    }

    pub fn write(buf: PhysAddr, blocksize: u32, blocks: u32) -> Self {
        Self {
            direction: DataDirection::Write,
            blocksize,
            blocks,
            buf,
        }
    }

    pub fn is_write(&self) -> bool {
        self.direction == DataDirection::Write
    }

    pub fn byte_count(&self) -> usize {
        self.blocksize as usize * self.blocks as usize
    }

    /// Reject anything the hardware fields would silently truncate.
    pub fn validate(&self) -> SdResult {
        if self.blocksize == 0 {
            return Err(SdError::BlockSizeZero);
        }
        if self.blocksize > MAX_BLOCK_SIZE {
            return Err(SdError::BlockSizeTooLarge);
        }
        if self.blocks > MAX_BLOCK_COUNT {
            return Err(SdError::BlockCountTooLarge);
        }
        if self.buf & (DMA_ALIGN - 1) != 0 {
            return Err(SdError::MisalignedBuffer);
        }
        if self.dma_address().is_err() {
            return Err(SdError::BufferOutOfRange);
        }
        Ok(())
    }

    /// Value for the 32-bit DMA start address register.
    pub fn dma_address(&self) -> SdResult<u32> {
        u32::try_from(self.buf).map_err(|_| SdError::BufferOutOfRange)
    }

    /// BLEN register value.
    pub fn block_length_field(&self) -> u32 {
        self.blocksize - 1
    }

    /// Block count placed into the CSR.
    pub fn block_count_field(&self) -> u32 {
        (self.blocks << CSR_BLK_CNT_SHIFT) & CSR_BLK_CNT_MASK
    }
}

/// The controller's DMA engine (DMACCSR and friends).
#[derive(Debug, Clone, Copy)]
pub struct DmaEngine {
    csr: PhysAddr,
    sar: PhysAddr,
    bcr: PhysAddr,
    ier: PhysAddr,
    isr: PhysAddr,
}

impl DmaEngine {
    pub fn new(layout: &RegisterLayout) -> Self {
        Self {
            csr: layout.reg(DMAC_CSR),
            sar: layout.reg(DMAC_SAR),
            bcr: layout.reg(DMAC_BCR),
            ier: layout.reg(DMAC_IER),
            isr: layout.reg(DMAC_ISR),
        }
    }

    /// Software reset, then wait for the reset bit to drop.
    pub fn reset(&self, io: &dyn Mmio, budget: usize) -> SdResult {
        io.write(self.csr, DmacCsr::SW_RST.bits());
        polling(budget, SdError::ResetTimeout, || {
            if io.read(self.csr) & DmacCsr::SW_RST.bits() == 0 {
                Ok(())
            } else {
                Err(nb::Error::WouldBlock)
            }
        })
    }

    /// Enable the engine with its interrupts masked; completion is polled.
    pub fn enable(&self, io: &dyn Mmio) {
        io.write(self.ier, 0);
        io.write(self.isr, io.read(self.isr));
        io.write(self.csr, DmacCsr::DMACEN.bits());
    }

    pub fn set_address(&self, io: &dyn Mmio, data: &MmcData) -> SdResult {
        io.write(self.sar, data.dma_address()?);
        Ok(())
    }

    /// Bytes the engine still has to move.
    pub fn remaining(&self, io: &dyn Mmio) -> u32 {
        io.read(self.bcr)
    }
}
