use super::*;

/* #REF: NUC980 Technical Reference Manual, SD Host (SDH) and FMI chapters */

pub const SDH_BA: PhysAddr = 0xB001_8000;
pub const FMI_BA: PhysAddr = 0xB001_9000;

/* system manager / clock controller */
pub const REG_HCLKEN: PhysAddr = 0xB000_0210;
pub const REG_CLKDIVCTL3: PhysAddr = 0xB000_022C; // eMMC
pub const REG_CLKDIVCTL9: PhysAddr = 0xB000_0244; // SDH

/* offsets from the controller base, identical for SDH and FMI */
pub const DMAC_CSR: usize = 0x400;
pub const DMAC_SAR: usize = 0x408;
pub const DMAC_BCR: usize = 0x40C;
pub const DMAC_IER: usize = 0x410;
pub const DMAC_ISR: usize = 0x414;

pub const GCTL: usize = 0x800;
pub const GINTEN: usize = 0x804;
pub const GINTSTS: usize = 0x808;

pub const CSR: usize = 0x820;
pub const ARG: usize = 0x824;
pub const IER: usize = 0x828;
pub const ISR: usize = 0x82C;
pub const RSP0: usize = 0x830;
pub const RSP1: usize = 0x834;
pub const BLEN: usize = 0x838;
pub const TMOUT: usize = 0x83C;

/// Byte length of the R2 response window at the controller base.
pub const RESPONSE_WINDOW_LEN: usize = 20;

/* CSR fields */
pub const CSR_CMD_SHIFT: u32 = 8;
pub const CSR_CMD_MASK: u32 = 0x3F << CSR_CMD_SHIFT;
pub const CSR_BLK_CNT_SHIFT: u32 = 16;
pub const CSR_BLK_CNT_MASK: u32 = 0xFF << CSR_BLK_CNT_SHIFT;
/// SDNWR = 9, BLK_CNT = 1; the block count is replaced when data is attached.
pub const CSR_NWR_DEFAULT: u32 = 0x0901_0000;

bitflags::bitflags! {
    pub struct SdCsr : u32 {
        const CO_EN = 1 << 0;
        const RI_EN = 1 << 1;
        const DI_EN = 1 << 2;
        const DO_EN = 1 << 3;
        const R2_EN = 1 << 4;
        const CLK74_OE = 1 << 5;
        const CLK8_OE = 1 << 6;
        const CLK_KEEP0 = 1 << 7;
        // 13:8 - command index
        const DBW = 1 << 15;
        // 23:16 - block count
        // 27:24 - SDNWR

        const ACTIVE = SdCsr::CO_EN.bits | SdCsr::RI_EN.bits | SdCsr::DI_EN.bits | SdCsr::DO_EN.bits;
    }

    pub struct SdIsr : u32 {
        const BLKD_IF = 1 << 0;
        const CRC_IF = 1 << 1;
        const CRC_7 = 1 << 2;
        const CRC_16 = 1 << 3;
        const SDDAT0 = 1 << 7;
        const RITO_IF = 1 << 12;
        const DITO_IF = 1 << 13;
        const CDSTS = 1 << 16;

        const ARMED = SdIsr::CRC_IF.bits | SdIsr::RITO_IF.bits | SdIsr::DITO_IF.bits;
    }

    pub struct SdIer : u32 {
        const BLKD_IE = 1 << 0;
        const CRC_IE = 1 << 1;
        const CD_IE = 1 << 8;
        const RITO_IE = 1 << 12;
        const DITO_IE = 1 << 13;
        // 0 -> DAT3 detect, 1 -> GPIO detect
        const CDSRC = 1 << 30;
    }

    pub struct GlobalCtl : u32 {
        const GCTL_RST = 1 << 0;
        // SD_EN on SDH, EMMC_EN on FMI
        const FUNC_EN = 1 << 1;
    }

    pub struct DmacCsr : u32 {
        const DMACEN = 1 << 0;
        const SW_RST = 1 << 1;
    }
}

/// Where one controller's registers live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterLayout {
    pub base: PhysAddr,
    pub clkdiv: PhysAddr,
    pub hclken: PhysAddr,
}

impl RegisterLayout {
    pub const fn sd() -> Self {
        Self {
            base: SDH_BA,
            clkdiv: REG_CLKDIVCTL9,
            hclken: REG_HCLKEN,
        }
    }

    pub const fn emmc() -> Self {
        Self {
            base: FMI_BA,
            clkdiv: REG_CLKDIVCTL3,
            hclken: REG_HCLKEN,
        }
    }

    #[inline]
    pub const fn reg(&self, offset: usize) -> PhysAddr {
        self.base + offset
    }

    /// 136-bit responses are read back through a byte alias of the buffer at the base.
    #[inline]
    pub const fn response_window(&self) -> PhysAddr {
        self.base
    }
}
