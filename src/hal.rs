use core::fmt;
use core::ops::Deref;

pub use embedded_hal::blocking::delay::DelayUs;

pub type VirtAddr = usize;
pub type PhysAddr = usize;

pub struct Reg(volatile_register::RW<u32>);

impl fmt::Debug for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("Reg[RW] {}", self.0.read()))
    }
}

/// #Safety: the safety of register should be ensured by busy-bit of control register
unsafe impl Sync for Reg {}

impl Reg {
    pub fn write(&self, reg: u32) {
        unsafe { self.0.write(reg) };
    }

    pub fn read(&self) -> u32 {
        self.0.read()
    }
}

pub struct Wapper<'a, T> {
    ptr: &'a T,
}

impl<T> Wapper<'_, T> {
    /// # Safety
    ///
    /// `vaddr` must be a mapped, suitably aligned address of a `T` that outlives the wrapper.
    pub unsafe fn from_raw(vaddr: VirtAddr) -> Self {
        Self {
            ptr: &*(vaddr as *const T),
        }
    }
}

impl<T> Deref for Wapper<'_, T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        self.ptr
    }
}

/// Word access to memory-mapped controller registers, by physical address.
///
/// Every register the driver touches goes through this trait, so a controller
/// can be driven against real hardware ([`DirectMmio`]) or a simulated register
/// file in tests.
pub trait Mmio {
    fn read(&self, addr: PhysAddr) -> u32;

    fn write(&self, addr: PhysAddr, val: u32);

    /// Byte read, for windows the hardware only aliases byte-wise.
    fn read_u8(&self, addr: PhysAddr) -> u8;

    fn set_bits(&self, addr: PhysAddr, bits: u32) {
        let val = self.read(addr);
        self.write(addr, val | bits);
    }

    fn clear_bits(&self, addr: PhysAddr, bits: u32) {
        let val = self.read(addr);
        self.write(addr, val & !bits);
    }

    /// Replace the bits under `mask` with `val`.
    fn update(&self, addr: PhysAddr, mask: u32, val: u32) {
        let old = self.read(addr);
        self.write(addr, (old & !mask) | (val & mask));
    }
}

impl<T: Mmio + ?Sized> Mmio for &T {
    fn read(&self, addr: PhysAddr) -> u32 {
        (**self).read(addr)
    }

    fn write(&self, addr: PhysAddr, val: u32) {
        (**self).write(addr, val)
    }

    fn read_u8(&self, addr: PhysAddr) -> u8 {
        (**self).read_u8(addr)
    }
}

/// Volatile access through a fixed physical-to-virtual offset.
#[derive(Debug, Clone, Copy)]
pub struct DirectMmio {
    virt_offset: usize,
}

impl DirectMmio {
    /// # Safety
    ///
    /// Every register address the driver is configured with, plus `virt_offset`,
    /// must be mapped device memory for as long as this value is used.
    pub const unsafe fn new(virt_offset: usize) -> Self {
        Self { virt_offset }
    }

    pub fn phys_to_virt(&self, paddr: PhysAddr) -> VirtAddr {
        paddr.wrapping_add(self.virt_offset)
    }
}

impl Mmio for DirectMmio {
    fn read(&self, addr: PhysAddr) -> u32 {
        let reg: Wapper<'_, Reg> = unsafe { Wapper::from_raw(self.phys_to_virt(addr)) };
        reg.read()
    }

    fn write(&self, addr: PhysAddr, val: u32) {
        let reg: Wapper<'_, Reg> = unsafe { Wapper::from_raw(self.phys_to_virt(addr)) };
        reg.write(val)
    }

    fn read_u8(&self, addr: PhysAddr) -> u8 {
        unsafe { core::ptr::read_volatile(self.phys_to_virt(addr) as *const u8) }
    }
}

/// Spin on `poll` until it stops returning `WouldBlock`, at most `budget` times.
///
/// Exhausting the budget yields `timeout_ret`.
pub fn polling<T, E, F>(budget: usize, timeout_ret: E, mut poll: F) -> Result<T, E>
where
    F: FnMut() -> nb::Result<T, E>,
{
    for _ in 0..budget {
        match poll() {
            Ok(v) => return Ok(v),
            Err(nb::Error::Other(e)) => return Err(e),
            Err(nb::Error::WouldBlock) => core::hint::spin_loop(),
        }
    }
    Err(timeout_ret)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polling_stops_at_budget() {
        let mut tries = 0;
        let rst: Result<(), &str> = polling(7, "timeout", || {
            tries += 1;
            Err(nb::Error::WouldBlock)
        });
        assert_eq!(rst, Err("timeout"));
        assert_eq!(tries, 7);
    }

    #[test]
    fn polling_returns_first_ready_value() {
        let mut tries = 0;
        let rst: Result<u32, &str> = polling(100, "timeout", || {
            tries += 1;
            if tries == 3 {
                Ok(0xAA)
            } else {
                Err(nb::Error::WouldBlock)
            }
        });
        assert_eq!(rst, Ok(0xAA));
        assert_eq!(tries, 3);
    }

    #[test]
    fn polling_propagates_hard_errors() {
        let rst: Result<(), &str> = polling(100, "timeout", || Err(nb::Error::Other("fault")));
        assert_eq!(rst, Err("fault"));
    }

    #[test]
    fn direct_mmio_reads_plain_memory() {
        let word: u32 = 0x1122_3344;
        let io = unsafe { DirectMmio::new(0) };
        let addr = &word as *const u32 as usize;
        assert_eq!(io.read(addr), 0x1122_3344);
        assert_eq!(io.read_u8(addr), 0x1122_3344u32.to_ne_bytes()[0]);
    }
}
