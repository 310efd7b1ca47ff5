use super::*;

/// Response/data-in timeout armed for SD commands.
pub const SD_RESPONSE_TIMEOUT: u32 = 0xFF_FFFF;
/// Response timeout armed for eMMC commands.
pub const EMMC_RESPONSE_TIMEOUT: u32 = 0xFFFF;

const EMMC_SETTLE_US: u32 = 300;
const EMMC_APP_CMD_SETTLE_US: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Sd,
    Emmc,
}

impl Variant {
    /// Device-tree "mode" property: non-zero selects the eMMC port.
    pub fn from_mode(mode: u32) -> Self {
        if mode != 0 {
            Variant::Emmc
        } else {
            Variant::Sd
        }
    }

    pub fn port(self) -> &'static dyn SdhPort {
        match self {
            Variant::Sd => &SD_PORT,
            Variant::Emmc => &EMMC_PORT,
        }
    }
}

/// What differs between the SD host and the FMI eMMC port.
///
/// Both expose the same register roles; a port is picked once when the host
/// is built and every operation goes through it.
pub trait SdhPort: Sync {
    fn variant(&self) -> Variant;

    fn name(&self) -> &'static str;

    fn default_layout(&self) -> RegisterLayout;

    fn clock_range(&self) -> ClockRange;

    /// Value armed into TMOUT before a command that expects a response.
    fn response_timeout(&self) -> u32;

    /// Whether read transfers also arm the data-in timeout.
    fn arms_data_timeout(&self) -> bool;

    /// Controller global reset; completion is polled by the caller.
    fn reset_controller(&self, io: &dyn Mmio, layout: &RegisterLayout);

    /// The ready probe gave up. `Ok` lets the command go out anyway.
    fn busy_fallback(&self, _io: &dyn Mmio, _layout: &RegisterLayout, err: SdError) -> SdResult {
        Err(err)
    }

    /// Argument first; the CSR write starts the command.
    fn issue(
        &self,
        io: &dyn Mmio,
        layout: &RegisterLayout,
        _delay: &mut dyn DelayUs<u32>,
        cmd: &MmcCommand,
        csr: u32,
    ) {
        io.write(layout.reg(ARG), cmd.arg);
        io.write(layout.reg(CSR), csr);
    }

    fn decode_response(
        &self,
        io: &dyn Mmio,
        layout: &RegisterLayout,
        class: ResponseClass,
        budget: &PollBudget,
    ) -> SdResult<Response> {
        let mut resp = [0u32; 4];
        match class {
            ResponseClass::None => {}
            ResponseClass::R2 => {
                wait_response(io, layout, SdCsr::R2_EN, budget.response)?;
                let mut raw = [0u8; RESPONSE_WINDOW_LEN];
                let window = layout.response_window();
                for (i, byte) in raw.iter_mut().enumerate() {
                    *byte = io.read_u8(window + i);
                }
                resp = reassemble_long_response(&raw);
            }
            ResponseClass::R1 | ResponseClass::R1b | ResponseClass::R3 => {
                wait_response(io, layout, SdCsr::RI_EN, budget.response)?;
                resp[0] = (io.read(layout.reg(RSP0)) << 8) | (io.read(layout.reg(RSP1)) & 0xFF);
            }
        }
        Ok(resp)
    }

    /// Wait out the DMA of an issued data command and release the bus.
    fn wait_transfer_done(
        &self,
        io: &dyn Mmio,
        layout: &RegisterLayout,
        data: &MmcData,
        budget: &PollBudget,
    ) -> SdResult {
        let isr = layout.reg(ISR);
        polling(budget.transfer, SdError::TransferTimeout, || {
            let status = io.read(isr);
            if status & SdIsr::BLKD_IF.bits() != 0 {
                Ok(())
            } else if status & SdIsr::DITO_IF.bits() != 0 {
                io.write(isr, SdIsr::DITO_IF.bits());
                io.write(layout.reg(TMOUT), 0);
                Err(nb::Error::Other(SdError::DataTimeout))
            } else {
                Err(nb::Error::WouldBlock)
            }
        })?;
        io.write(isr, SdIsr::BLKD_IF.bits());
        trace!("block done, dma remaining 0x{:x}", io.read(layout.reg(DMAC_BCR)));

        if data.is_write() {
            // the card programs its flash after block-done; keep clocking until DAT0 rises
            wait_card_idle(io, layout, budget.card_busy)?;
        }
        Ok(())
    }

    fn set_clock_registers(&self, io: &dyn Mmio, layout: &RegisterLayout, clk: &ClockSetting) {
        io.update(
            layout.clkdiv,
            ClkDivCtl::SRC_MASK.bits(),
            clk.source.select_bits(),
        );
        io.update(
            layout.clkdiv,
            CLKDIV_N_MASK,
            clk.divider_field() << CLKDIV_N_SHIFT,
        );
    }
}

/// Poll until `enable` self-clears, failing early on a response timeout.
fn wait_response(io: &dyn Mmio, layout: &RegisterLayout, enable: SdCsr, budget: usize) -> SdResult {
    let csr = layout.reg(CSR);
    let isr = layout.reg(ISR);
    polling(budget, SdError::ResponseTimeout, || {
        if io.read(isr) & SdIsr::RITO_IF.bits() != 0 {
            io.write(isr, SdIsr::RITO_IF.bits());
            io.write(layout.reg(TMOUT), 0);
            return Err(nb::Error::Other(SdError::ResponseTimeout));
        }
        if io.read(csr) & enable.bits() == 0 {
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    })
}

/// Keep the bus clock running until the card releases DAT0.
///
/// CLK_KEEP0 is dropped on every exit path.
pub fn wait_card_idle(io: &dyn Mmio, layout: &RegisterLayout, budget: usize) -> SdResult {
    let csr = layout.reg(CSR);
    let isr = layout.reg(ISR);
    io.set_bits(csr, SdCsr::CLK_KEEP0.bits());
    let rst = polling(budget, SdError::CardBusyTimeout, || {
        if io.read(isr) & SdIsr::SDDAT0.bits() != 0 {
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    });
    io.clear_bits(csr, SdCsr::CLK_KEEP0.bits());
    rst
}

/// Rebuild the 128 visible bits of an R2 reply from the 20-byte window.
///
/// The window holds five big-endian words shifted by one byte: output word `i`
/// is the low three bytes of raw word `i` followed by the top byte of word `i + 1`.
pub fn reassemble_long_response(raw: &[u8; RESPONSE_WINDOW_LEN]) -> Response {
    let mut tmp = [0u32; 5];
    for (word, chunk) in tmp.iter_mut().zip(raw.chunks_exact(4)) {
        *word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    let mut resp = [0u32; 4];
    for i in 0..4 {
        resp[i] = ((tmp[i] & 0x00FF_FFFF) << 8) | ((tmp[i + 1] & 0xFF00_0000) >> 24);
    }
    resp
}

pub struct SdPort;

pub static SD_PORT: SdPort = SdPort;

impl SdhPort for SdPort {
    fn variant(&self) -> Variant {
        Variant::Sd
    }

    fn name(&self) -> &'static str {
        "NUC980 SD"
    }

    fn default_layout(&self) -> RegisterLayout {
        RegisterLayout::sd()
    }

    fn clock_range(&self) -> ClockRange {
        ClockRange::new(200_000, 20_000_000)
    }

    fn response_timeout(&self) -> u32 {
        SD_RESPONSE_TIMEOUT
    }

    fn arms_data_timeout(&self) -> bool {
        true
    }

    fn reset_controller(&self, io: &dyn Mmio, layout: &RegisterLayout) {
        io.write(layout.reg(GCTL), GlobalCtl::GCTL_RST.bits());
    }

    fn busy_fallback(&self, io: &dyn Mmio, layout: &RegisterLayout, err: SdError) -> SdResult {
        // DAT0 may have risen after the last probe
        if io.read(layout.reg(ISR)) & SdIsr::SDDAT0.bits() != 0 {
            warn!("ready probe exhausted, DAT0 high, sending anyway");
            Ok(())
        } else {
            Err(err)
        }
    }
}

pub struct EmmcPort;

pub static EMMC_PORT: EmmcPort = EmmcPort;

impl SdhPort for EmmcPort {
    fn variant(&self) -> Variant {
        Variant::Emmc
    }

    fn name(&self) -> &'static str {
        "NUC980 eMMC"
    }

    fn default_layout(&self) -> RegisterLayout {
        RegisterLayout::emmc()
    }

    fn clock_range(&self) -> ClockRange {
        ClockRange::new(200_000, 2_000_000)
    }

    fn response_timeout(&self) -> u32 {
        EMMC_RESPONSE_TIMEOUT
    }

    fn arms_data_timeout(&self) -> bool {
        false
    }

    fn reset_controller(&self, io: &dyn Mmio, layout: &RegisterLayout) {
        io.set_bits(layout.reg(GCTL), GlobalCtl::GCTL_RST.bits());
    }

    fn issue(
        &self,
        io: &dyn Mmio,
        layout: &RegisterLayout,
        delay: &mut dyn DelayUs<u32>,
        cmd: &MmcCommand,
        csr: u32,
    ) {
        io.write(layout.reg(ARG), cmd.arg);
        io.write(layout.reg(CSR), csr);
        delay.delay_us(EMMC_SETTLE_US);
        if cmd.index == u8::from(MmcCmd::APP_CMD) {
            delay.delay_us(EMMC_APP_CMD_SETTLE_US);
        }
    }
}
