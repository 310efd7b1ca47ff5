//! In-memory stand-in for the SDH/FMI register block, for unit tests.
//!
//! Reacts to control-register writes the way the controller does: command,
//! response and clock-probe bits self-clear (unless stuck), status flags are
//! write-one-to-clear, and scripted response words land in RSP0/RSP1.

use super::*;
use core::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::vec::Vec;

const SELF_CLEARING: u32 = SdCsr::CO_EN.bits()
    | SdCsr::RI_EN.bits()
    | SdCsr::DI_EN.bits()
    | SdCsr::DO_EN.bits()
    | SdCsr::R2_EN.bits()
    | SdCsr::CLK74_OE.bits()
    | SdCsr::CLK8_OE.bits();

const W1C_FLAGS: u32 = SdIsr::BLKD_IF.bits()
    | SdIsr::CRC_IF.bits()
    | SdIsr::RITO_IF.bits()
    | SdIsr::DITO_IF.bits();

pub struct Script {
    /// CSR bits that never self-clear.
    pub stuck_csr: u32,
    /// RSP0 / RSP1 loaded when a command with a response goes out.
    pub rsp: (u32, u32),
    pub crc_ok: bool,
    /// Raise RITO_IF instead of answering.
    pub response_timeout: bool,
    pub block_done: bool,
    /// Raise DITO_IF instead of finishing a read.
    pub data_timeout: bool,
    /// DAT0 level.
    pub dat0: bool,
    /// DAT0 rises once CLK_KEEP0 is set.
    pub dat0_on_keep: bool,
    /// DAT0 rises once this many 8-clock bursts went out; zero disables.
    pub dat0_after_probes: usize,
    /// Card-detect status bit.
    pub cd_status: bool,
    pub window: [u8; RESPONSE_WINDOW_LEN],
}

impl Default for Script {
    fn default() -> Self {
        Self {
            stuck_csr: 0,
            rsp: (0, 0),
            crc_ok: true,
            response_timeout: false,
            block_done: true,
            data_timeout: false,
            dat0: true,
            dat0_on_keep: false,
            dat0_after_probes: 0,
            cd_status: false,
            window: [0; RESPONSE_WINDOW_LEN],
        }
    }
}

/// One control word the driver started, with the argument it carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Issued {
    pub csr: u32,
    pub arg: u32,
}

pub struct FakeSdh {
    layout: RegisterLayout,
    regs: RefCell<BTreeMap<PhysAddr, u32>>,
    flags: Cell<u32>,
    pub script: RefCell<Script>,
    pub probes: Cell<usize>,
    /// Every write to CSR, including the ones that start nothing.
    pub csr_writes: Cell<usize>,
    pub issued: RefCell<Vec<Issued>>,
}

impl FakeSdh {
    pub fn new(layout: RegisterLayout) -> Self {
        Self {
            layout,
            regs: RefCell::new(BTreeMap::new()),
            flags: Cell::new(0),
            script: RefCell::new(Script::default()),
            probes: Cell::new(0),
            csr_writes: Cell::new(0),
            issued: RefCell::new(Vec::new()),
        }
    }

    pub fn sd() -> Self {
        Self::new(RegisterLayout::sd())
    }

    pub fn emmc() -> Self {
        Self::new(RegisterLayout::emmc())
    }

    pub fn script<F: FnOnce(&mut Script)>(&self, f: F) {
        f(&mut self.script.borrow_mut())
    }

    pub fn raw(&self, addr: PhysAddr) -> u32 {
        *self.regs.borrow().get(&addr).unwrap_or(&0)
    }

    pub fn poke(&self, addr: PhysAddr, val: u32) {
        self.regs.borrow_mut().insert(addr, val);
    }

    /// Register at `offset` from the controller base.
    pub fn at(&self, offset: usize) -> u32 {
        self.read(self.layout.reg(offset))
    }

    pub fn last_issued(&self) -> Option<Issued> {
        self.issued.borrow().last().copied()
    }

    fn isr(&self) -> u32 {
        let script = self.script.borrow();
        let mut isr = self.flags.get();
        let keep = self.raw(self.layout.reg(CSR)) & SdCsr::CLK_KEEP0.bits() != 0;
        let probed =
            script.dat0_after_probes != 0 && self.probes.get() >= script.dat0_after_probes;
        if script.dat0 || (script.dat0_on_keep && keep) || probed {
            isr |= SdIsr::SDDAT0.bits();
        }
        if script.cd_status {
            isr |= SdIsr::CDSTS.bits();
        }
        isr
    }

    fn write_csr(&self, val: u32) {
        let addr = self.layout.reg(CSR);
        let prev = self.raw(addr);
        self.csr_writes.set(self.csr_writes.get() + 1);
        if val & SdCsr::CLK8_OE.bits() != 0 {
            self.probes.set(self.probes.get() + 1);
        }
        let script = self.script.borrow();
        if val & SdCsr::CO_EN.bits() != 0 && prev & SdCsr::CO_EN.bits() == 0 {
            let arg = self.raw(self.layout.reg(ARG));
            self.issued.borrow_mut().push(Issued { csr: val, arg });
            let mut flags = self.flags.get() & !SdIsr::CRC_7.bits();
            if val & (SdCsr::RI_EN | SdCsr::R2_EN).bits() != 0 {
                if script.response_timeout {
                    flags |= SdIsr::RITO_IF.bits();
                } else {
                    self.poke(self.layout.reg(RSP0), script.rsp.0);
                    self.poke(self.layout.reg(RSP1), script.rsp.1);
                }
            }
            if script.crc_ok {
                flags |= SdIsr::CRC_7.bits();
            }
            if val & SdCsr::DI_EN.bits() != 0 && script.data_timeout {
                flags |= SdIsr::DITO_IF.bits();
            } else if val & (SdCsr::DI_EN | SdCsr::DO_EN).bits() != 0 && script.block_done {
                flags |= SdIsr::BLKD_IF.bits();
            }
            self.flags.set(flags);
        }
        let cleared = SELF_CLEARING & !script.stuck_csr;
        self.poke(addr, val & !cleared);
    }
}

impl Mmio for FakeSdh {
    fn read(&self, addr: PhysAddr) -> u32 {
        if addr == self.layout.reg(ISR) {
            self.isr()
        } else {
            self.raw(addr)
        }
    }

    fn write(&self, addr: PhysAddr, val: u32) {
        let l = self.layout;
        if addr == l.reg(CSR) {
            self.write_csr(val);
        } else if addr == l.reg(ISR) {
            self.flags.set(self.flags.get() & !(val & W1C_FLAGS));
        } else if addr == l.reg(GCTL) {
            self.poke(addr, val & !GlobalCtl::GCTL_RST.bits());
        } else if addr == l.reg(DMAC_CSR) {
            self.poke(addr, val & !DmacCsr::SW_RST.bits());
        } else {
            self.poke(addr, val);
        }
    }

    fn read_u8(&self, addr: PhysAddr) -> u8 {
        let off = addr - self.layout.response_window();
        self.script.borrow().window[off]
    }
}

/// Records requested delays instead of spinning.
#[derive(Default)]
pub struct FakeDelay {
    pub calls: Cell<usize>,
    pub total_us: Cell<u32>,
}

impl DelayUs<u32> for &FakeDelay {
    fn delay_us(&mut self, us: u32) {
        self.calls.set(self.calls.get() + 1);
        self.total_us.set(self.total_us.get() + us);
    }
}
