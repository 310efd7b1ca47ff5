use super::*;

/// Wait for CO_EN / CLK8_OE to self-clear.
const COMMAND_TIMEOUT: usize = 0xF_FFFF;
/// Wait for RI_EN / R2_EN; the hardware TMOUT normally fires first.
const RESP_TIMEOUT: usize = 0xFF_FFFF;
/// Wait for block-done.
const DATA_TIMEOUT: usize = 0xFF_FFFF;
/// Wait for the card to release DAT0 after a write or a busy response.
const BUSY_TIMEOUT: usize = 4 * 0xFF_FFFF;
/// Wait for reset and initialization clocks to self-clear.
const RESET_TIMEOUT: usize = 0xFFFF;

/// Iteration bounds for every busy-wait on a register bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    pub command: usize,
    pub response: usize,
    pub transfer: usize,
    pub card_busy: usize,
    pub reset: usize,
}

impl Default for PollBudget {
    fn default() -> Self {
        Self {
            command: COMMAND_TIMEOUT,
            response: RESP_TIMEOUT,
            transfer: DATA_TIMEOUT,
            card_busy: BUSY_TIMEOUT,
            reset: RESET_TIMEOUT,
        }
    }
}

impl PollBudget {
    pub const fn uniform(iterations: usize) -> Self {
        Self {
            command: iterations,
            response: iterations,
            transfer: iterations,
            card_busy: iterations,
            reset: iterations,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusWidth {
    One,
    Four,
}

/// Where card presence is sensed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardDetect {
    /// DAT3 pull-up; status bit set means present.
    Dat3,
    /// Dedicated CD GPIO, active low; status bit set means absent.
    Gpio,
}

/// Board inputs for one controller.
#[derive(Debug, Clone, Copy)]
pub struct SdhConfig {
    pub variant: Variant,
    /// Register addresses; the variant's defaults when `None`.
    pub layout: Option<RegisterLayout>,
    pub bus_width: BusWidth,
    /// Board limit below the variant's own f_max.
    pub max_clock: Option<u32>,
    pub card_detect: CardDetect,
    pub budget: PollBudget,
}

impl SdhConfig {
    pub fn new(variant: Variant) -> Self {
        Self {
            variant,
            layout: None,
            bus_width: BusWidth::One,
            max_clock: None,
            card_detect: match variant {
                Variant::Sd => CardDetect::Gpio,
                Variant::Emmc => CardDetect::Dat3,
            },
            budget: PollBudget::default(),
        }
    }

    pub fn with_layout(mut self, layout: RegisterLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn with_bus_width(mut self, bus_width: BusWidth) -> Self {
        self.bus_width = bus_width;
        self
    }

    pub fn with_max_clock(mut self, hz: u32) -> Self {
        self.max_clock = Some(hz);
        self
    }

    pub fn with_card_detect(mut self, card_detect: CardDetect) -> Self {
        self.card_detect = card_detect;
        self
    }

    pub fn with_budget(mut self, budget: PollBudget) -> Self {
        self.budget = budget;
        self
    }
}

impl Default for SdhConfig {
    fn default() -> Self {
        Self::new(Variant::Sd)
    }
}
