use super::*;
use alloc::sync::Arc;

mod clk;
mod cmd;
mod config;
mod dma;
#[cfg(test)]
mod fake;
mod host;
mod port;
mod regs;

pub use clk::*;
pub use cmd::*;
pub use config::*;
pub use dma::*;
pub use host::{ControllerContext, MmcHost, READY_PROBE_ATTEMPTS};
pub use port::*;
pub use regs::*;

pub fn host<M: Mmio, D: DelayUs<u32>>(io: M, delay: D, config: SdhConfig) -> Arc<MmcHost<M, D>> {
    let mmc = MmcHost::new(io, delay, config);
    Arc::new(mmc)
}

pub fn init<M: Mmio, D: DelayUs<u32>>(host: &Arc<MmcHost<M, D>>) -> SdResult {
    host.probe()
}
