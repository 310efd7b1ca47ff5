//! Polling driver for the NUC980 SD host (SDH) and eMMC (FMI) controllers.
//!
//! Both ports share one command/response/DMA engine; the register block and a
//! handful of timing quirks differ and are captured by [`mmc::SdhPort`].

#![cfg_attr(not(test), no_std)]

extern crate alloc;
#[macro_use]
extern crate log;

mod error;
pub mod hal;
pub mod mmc;

pub use error::*;
use hal::*;
