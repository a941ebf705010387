//! Programmable down-counters
//!
//! The card carries two Adlib-style timers ticking at 80 µs and 320 µs
//! per count. Each is a one-shot re-armable countdown: starting it asks
//! the host scheduler for an event `delay` seconds out, and expiry
//! re-arms it for as long as the running bit stays set.

/// Tick period of timer 0 in seconds.
pub(crate) const TIMER0_BASE_PERIOD: f64 = 80e-6;
/// Tick period of timer 1 in seconds.
pub(crate) const TIMER1_BASE_PERIOD: f64 = 320e-6;

/// One programmable countdown timer
#[derive(Clone, Debug)]
pub(crate) struct Timer {
    base_period: f64,
    /// 8-bit reload value; the delay spans `256 - value` ticks.
    pub value: u8,
    /// Seconds between start (or re-arm) and expiry.
    pub delay: f64,
    pub reached: bool,
    pub raise_irq: bool,
    pub masked: bool,
    pub running: bool,
}

impl Timer {
    pub fn new(base_period: f64) -> Self {
        let mut timer = Self {
            base_period,
            value: 0,
            delay: 0.0,
            reached: false,
            raise_irq: false,
            masked: false,
            running: false,
        };
        timer.reset();
        timer
    }

    /// Restore the power-on state: reload 0xFF, one base period delay,
    /// all flags clear.
    pub fn reset(&mut self) {
        self.value = 0xFF;
        self.delay = self.base_period;
        self.reached = false;
        self.raise_irq = false;
        self.running = false;
    }

    /// Write the reload value and re-derive the expiry delay.
    pub fn write_value(&mut self, value: u8) {
        self.value = value;
        self.delay = (0x100 - self.value as u32) as f64 * self.base_period;
    }
}
