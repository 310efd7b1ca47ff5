use super::*;
use spin::Mutex;

/// Ready probes (8 clocks each) before a busy card is given up on.
pub const READY_PROBE_ATTEMPTS: usize = 10;

pub struct MmcHost<M: Mmio, D: DelayUs<u32>> {
    inner: Mutex<MmcHostInner<M, D>>,
}

impl<M: Mmio, D: DelayUs<u32>> MmcHost<M, D> {
    pub fn new(io: M, delay: D, config: SdhConfig) -> Self {
        Self {
            inner: Mutex::new(MmcHostInner::new(io, delay, config)),
        }
    }

    /// Bring the controller up: clocks, resets, DMA, card detect, bus width.
    pub fn probe(&self) -> SdResult {
        self.inner.lock().probe()
    }

    /// Issue one command, with an optional DMA data phase, and wait for it.
    ///
    /// `resp` receives the decoded reply when `cmd` expects one.
    pub fn send_command(
        &self,
        cmd: &MmcCommand,
        data: Option<&MmcData>,
        resp: &mut Response,
    ) -> SdResult {
        self.inner.lock().send(cmd, data, resp)
    }

    pub fn set_clock(&self, hz: u32) {
        self.inner.lock().set_clock(hz)
    }

    pub fn set_bus_width(&self, width: BusWidth) {
        self.inner.lock().set_bus_width(width)
    }

    /// Clock (skipped when zero), then bus width.
    pub fn set_ios(&self, clock: u32, width: BusWidth) {
        let mut inner = self.inner.lock();
        if clock != 0 {
            inner.set_clock(clock);
        }
        inner.set_bus_width(width);
    }

    pub fn card_present(&self) -> bool {
        self.inner.lock().card_present()
    }

    pub fn wait_ready(&self) -> SdResult {
        self.inner.lock().wait_ready()
    }

    pub fn context(&self) -> ControllerContext {
        self.inner.lock().ctx
    }

    /// Bytes the DMA engine has not yet moved.
    pub fn dma_remaining(&self) -> u32 {
        let inner = self.inner.lock();
        inner.dma.remaining(&inner.io)
    }
}

/// Volatile state of one controller, owned by its host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerContext {
    pub variant: Variant,
    pub layout: RegisterLayout,
    pub range: ClockRange,
    pub bus_width: BusWidth,
    pub card_detect: CardDetect,
    /// Last programmed clock, `None` before the first `set_clock`.
    pub clock: Option<ClockSetting>,
}

struct MmcHostInner<M: Mmio, D: DelayUs<u32>> {
    io: M,
    delay: D,
    port: &'static dyn SdhPort,
    ctx: ControllerContext,
    dma: DmaEngine,
    budget: PollBudget,
}

impl<M: Mmio, D: DelayUs<u32>> MmcHostInner<M, D> {
    fn new(io: M, delay: D, config: SdhConfig) -> Self {
        let port = config.variant.port();
        let layout = config.layout.unwrap_or_else(|| port.default_layout());
        Self {
            io,
            delay,
            port,
            ctx: ControllerContext {
                variant: port.variant(),
                layout,
                range: port.clock_range().capped(config.max_clock),
                bus_width: config.bus_width,
                card_detect: config.card_detect,
                clock: None,
            },
            dma: DmaEngine::new(&layout),
            budget: config.budget,
        }
    }

    #[inline]
    fn reg(&self, offset: usize) -> PhysAddr {
        self.ctx.layout.reg(offset)
    }

    fn probe(&mut self) -> SdResult {
        let layout = self.ctx.layout;
        debug!("STEP1");
        self.io.set_bits(layout.hclken, HclkEn::SDH.bits());
        self.set_clock(self.ctx.range.f_min);

        debug!("STEP2");
        /* 74 clocks before the first command */
        let csr = self.reg(CSR);
        self.io.set_bits(csr, SdCsr::CLK74_OE.bits());
        self.poll_clear(csr, SdCsr::CLK74_OE.bits(), self.budget.reset, SdError::ResetTimeout)?;

        debug!("STEP3");
        /* Reset controller and DMA engine */
        self.port.reset_controller(&self.io, &layout);
        self.dma.reset(&self.io, self.budget.reset)?;
        let gctl = self.reg(GCTL);
        self.poll_clear(gctl, GlobalCtl::GCTL_RST.bits(), self.budget.reset, SdError::ResetTimeout)?;
        self.io.write(gctl, GlobalCtl::FUNC_EN.bits());
        self.io.write(self.reg(GINTEN), 0);
        self.dma.enable(&self.io);

        debug!("STEP4");
        let ier = self.reg(IER);
        match self.ctx.card_detect {
            CardDetect::Gpio => self.io.set_bits(ier, SdIer::CDSRC.bits()),
            CardDetect::Dat3 => self.io.clear_bits(ier, SdIer::CDSRC.bits()),
        }
        self.set_bus_width(self.ctx.bus_width);
        info!("{} configured", self.port.name());
        Ok(())
    }

    fn send(&mut self, cmd: &MmcCommand, data: Option<&MmcData>, resp: &mut Response) -> SdResult {
        debug!("[CMD] SEND CMD {} arg 0x{:x}", cmd.index, cmd.arg);
        if let Err(e) = cmd.validate() {
            error!("rejecting CMD {}: {}", cmd.index, e);
            return Err(e);
        }
        if let Some(data) = data {
            if let Err(e) = data.validate() {
                error!(
                    "rejecting data phase of CMD {}: {} (blocksize {}, blocks {}, buf 0x{:x})",
                    cmd.index, e, data.blocksize, data.blocks, data.buf
                );
                return Err(e);
            }
        }
        let layout = self.ctx.layout;
        let port = self.port;
        let csr_reg = self.reg(CSR);
        let isr_reg = self.reg(ISR);
        let tmout_reg = self.reg(TMOUT);

        if self.io.read(csr_reg) & SdCsr::ACTIVE.bits() != 0 {
            if let Err(e) = self.wait_ready() {
                port.busy_fallback(&self.io, &layout, e).map_err(|e| {
                    error!("CMD {}: card busy, ISR 0x{:x}", cmd.index, self.io.read(isr_reg));
                    e
                })?;
            }
        }

        /*
         * CSR
         * CSR[0]       : Command out
         * CSR[1]       : Response in
         * CSR[2]       : Data in
         * CSR[3]       : Data out
         * CSR[4]       : R2 response in
         * CSR[13:8]    : Command index
         * CSR[15]      : 4-bit bus
         * CSR[23:16]   : Block count
         * CSR[27:24]   : SDNWR
         */
        // keep bus width, everything else is rebuilt per command
        let mut csr = self.io.read(csr_reg) & SdCsr::DBW.bits();
        match cmd.class {
            ResponseClass::R1 | ResponseClass::R1b | ResponseClass::R3 => {
                csr |= SdCsr::RI_EN.bits();
            }
            ResponseClass::R2 => csr |= SdCsr::R2_EN.bits(),
            ResponseClass::None => {}
        }
        if cmd.class.is_present() {
            self.io.write(isr_reg, SdIsr::RITO_IF.bits());
            self.io.write(tmout_reg, port.response_timeout());
        }
        csr |= CSR_NWR_DEFAULT;
        csr |= (cmd.index as u32) << CSR_CMD_SHIFT;
        csr |= SdCsr::CO_EN.bits();

        if let Some(data) = data {
            self.io.write(self.reg(BLEN), data.block_length_field());
            csr = (csr & !CSR_BLK_CNT_MASK) | data.block_count_field();
            match data.direction {
                DataDirection::Read => {
                    if port.arms_data_timeout() {
                        self.io.write(isr_reg, SdIsr::DITO_IF.bits());
                        self.io.write(tmout_reg, port.response_timeout());
                    }
                    csr |= SdCsr::DI_EN.bits();
                }
                DataDirection::Write => csr |= SdCsr::DO_EN.bits(),
            }
            self.dma.set_address(&self.io, data)?;
        }

        debug!("CSR: 0x{:x}", csr);
        port.issue(&self.io, &layout, &mut self.delay, cmd, csr);

        let rst = self.complete(cmd, data, resp);
        if let Err(e) = rst {
            error!("CMD {} failed: {}", cmd.index, e);
            self.dumpinfo();
            self.disarm();
        }
        rst
    }

    /// Everything after the control word went out.
    fn complete(&mut self, cmd: &MmcCommand, data: Option<&MmcData>, resp: &mut Response) -> SdResult {
        let layout = self.ctx.layout;
        let isr_reg = self.reg(ISR);
        self.poll_clear(
            self.reg(CSR),
            SdCsr::CO_EN.bits(),
            self.budget.command,
            SdError::CommandTimeout,
        )?;

        if cmd.class.is_present() {
            *resp = self
                .port
                .decode_response(&self.io, &layout, cmd.class, &self.budget)?;
            debug!(
                "RESPONSES:   [0x{:x}, 0x{:x}, 0x{:x}, 0x{:x}]",
                resp[0], resp[1], resp[2], resp[3]
            );
        }

        if self.io.read(isr_reg) & SdIsr::CRC_7.bits() == 0 {
            self.io.write(isr_reg, SdIsr::CRC_IF.bits());
            if cmd.check_crc && cmd.class.is_present() {
                return Err(SdError::ResponseCrc);
            }
        }

        if let Some(data) = data {
            self.port
                .wait_transfer_done(&self.io, &layout, data, &self.budget)?;
        }
        if cmd.busy {
            wait_card_idle(&self.io, &layout, self.budget.card_busy)?;
        }
        Ok(())
    }

    /// Drop whatever a failed command left armed so the next one starts clean.
    fn disarm(&mut self) {
        self.io.write(self.reg(ISR), SdIsr::ARMED.bits());
        self.io.write(self.reg(TMOUT), 0);
    }

    /// Clock the card in bursts of 8 until it drives DAT0 high.
    fn wait_ready(&mut self) -> SdResult {
        let csr = self.reg(CSR);
        let isr = self.reg(ISR);
        for _ in 0..READY_PROBE_ATTEMPTS {
            self.io.set_bits(csr, SdCsr::CLK8_OE.bits());
            self.poll_clear(csr, SdCsr::CLK8_OE.bits(), self.budget.command, SdError::CommandTimeout)?;
            if self.io.read(isr) & SdIsr::SDDAT0.bits() != 0 {
                return Ok(());
            }
        }
        Err(SdError::BusyTimeout)
    }

    fn set_clock(&mut self, hz: u32) {
        let clk = ClockSetting::compute(hz, &self.ctx.range);
        self.port
            .set_clock_registers(&self.io, &self.ctx.layout, &clk);
        info!(
            "{} clock {} Hz -> {:?} / {} = {} Hz",
            self.port.name(),
            hz,
            clk.source,
            clk.divisor,
            clk.rate()
        );
        self.ctx.clock = Some(clk);
    }

    fn set_bus_width(&mut self, width: BusWidth) {
        let csr = self.reg(CSR);
        match width {
            BusWidth::Four => self.io.set_bits(csr, SdCsr::DBW.bits()),
            BusWidth::One => self.io.clear_bits(csr, SdCsr::DBW.bits()),
        }
        self.ctx.bus_width = width;
    }

    fn card_present(&self) -> bool {
        let gpio_detect = self.io.read(self.reg(IER)) & SdIer::CDSRC.bits() != 0;
        let status = self.io.read(self.reg(ISR)) & SdIsr::CDSTS.bits() != 0;
        if gpio_detect {
            !status
        } else {
            status
        }
    }

    fn dumpinfo(&self) {
        debug!("GCTL:    0x{:x}", self.io.read(self.reg(GCTL)));
        debug!("GINTSTS: 0x{:x}", self.io.read(self.reg(GINTSTS)));
        debug!("CSR:     0x{:x}", self.io.read(self.reg(CSR)));
        debug!("ISR:     0x{:x}", self.io.read(self.reg(ISR)));
        debug!("TMOUT:   0x{:x}", self.io.read(self.reg(TMOUT)));
        debug!(
            "DMAC:    csr 0x{:x} isr 0x{:x} remaining 0x{:x}",
            self.io.read(self.reg(DMAC_CSR)),
            self.io.read(self.reg(DMAC_ISR)),
            self.dma.remaining(&self.io)
        );
    }

    fn poll_clear(&self, addr: PhysAddr, bits: u32, budget: usize, timeout_ret: SdError) -> SdResult {
        let io = &self.io;
        polling(budget, timeout_ret, || {
            if io.read(addr) & bits == 0 {
                Ok(())
            } else {
                Err(nb::Error::WouldBlock)
            }
        })
    }
}
