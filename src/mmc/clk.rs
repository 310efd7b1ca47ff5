/* #REF: NUC980 Technical Reference Manual, Clock Controller: HCLKEN, CLKDIVCTL3, CLKDIVCTL9 */

/// UCLKout, the high speed source.
pub const UCLKOUT_HZ: u32 = 300_000_000;
/// HXT crystal, the low speed source.
pub const HXT_HZ: u32 = 12_000_000;
/// Requests at or above this rate run from UCLKout.
pub const HIGH_SPEED_THRESHOLD: u32 = 2_000_000;

pub const CLKDIV_N_SHIFT: u32 = 8;
pub const CLKDIV_N_MASK: u32 = 0xFF << CLKDIV_N_SHIFT;
/// The divider field holds N - 1.
pub const MAX_DIVISOR: u32 = (CLKDIV_N_MASK >> CLKDIV_N_SHIFT) + 1;

bitflags::bitflags! {
    pub struct ClkDivCtl : u32 {
        /* bit 4:3 : clock src select */
        const SRC_HXT = 0 << 3;
        const SRC_UCLKOUT = 0x3 << 3;
        const SRC_MASK = 0x3 << 3;
        /* bit 15:8 : divider N, clock = src / (N + 1) */
    }

    pub struct HclkEn : u32 {
        const SDH = 1 << 30;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSource {
    Hxt,
    UclkOut,
}

impl ClockSource {
    pub fn hz(self) -> u32 {
        match self {
            ClockSource::Hxt => HXT_HZ,
            ClockSource::UclkOut => UCLKOUT_HZ,
        }
    }

    pub fn select_bits(self) -> u32 {
        match self {
            ClockSource::Hxt => ClkDivCtl::SRC_HXT.bits(),
            ClockSource::UclkOut => ClkDivCtl::SRC_UCLKOUT.bits(),
        }
    }
}

/// Bus clock limits of one variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockRange {
    pub f_min: u32,
    pub f_max: u32,
}

impl ClockRange {
    pub const fn new(f_min: u32, f_max: u32) -> Self {
        Self { f_min, f_max }
    }

    /// Lower the ceiling, never below `f_min`.
    pub fn capped(self, max: Option<u32>) -> Self {
        match max {
            Some(hz) => Self {
                f_min: self.f_min,
                f_max: hz.max(self.f_min).min(self.f_max),
            },
            None => self,
        }
    }

    pub fn clamp(&self, hz: u32) -> u32 {
        hz.max(self.f_min).min(self.f_max)
    }
}

/// Source and divisor chosen for a requested bus rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSetting {
    pub source: ClockSource,
    pub divisor: u32,
}

impl ClockSetting {
    pub fn compute(requested_hz: u32, range: &ClockRange) -> Self {
        let clock = range.clamp(requested_hz);
        let source = if clock >= HIGH_SPEED_THRESHOLD {
            ClockSource::UclkOut
        } else {
            ClockSource::Hxt
        };
        let sclk_hz = source.hz();
        let mut div = sclk_hz / clock;
        // round up so the card never runs faster than asked
        if sclk_hz % clock != 0 {
            div += 1;
        }
        debug_assert!(
            (1..=MAX_DIVISOR).contains(&div),
            "divisor {} for {} Hz out of the divider field",
            div,
            clock
        );
        Self {
            source,
            divisor: div,
        }
    }

    /// Value programmed into the divider field.
    pub fn divider_field(&self) -> u32 {
        self.divisor - 1
    }

    pub fn rate(&self) -> u32 {
        self.source.hz() / self.divisor
    }
}
