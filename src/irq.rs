//! Voice interrupt aggregation
//!
//! Wave and ramp boundary events from all 32 voices land in two pending
//! bitmaps. The aggregator folds them into the card's 8-bit IRQ status
//! byte and keeps a round-robin cursor so the host can drain one voice at
//! a time through the general voice IRQ register.

/// IRQ status bit: DMA terminal count.
pub(crate) const IRQ_STATUS_DMA_TC: u8 = 0x80;
/// IRQ status bit: some voice has a pending ramp IRQ.
pub(crate) const IRQ_STATUS_RAMP: u8 = 0x40;
/// IRQ status bit: some voice has a pending wave IRQ.
pub(crate) const IRQ_STATUS_WAVE: u8 = 0x20;
/// IRQ status bit: timer 0 expired with raise-irq set.
pub(crate) const IRQ_STATUS_TIMER0: u8 = 0x04;

/// Consolidated voice IRQ state
#[derive(Clone, Debug, Default)]
pub(crate) struct IrqAggregator {
    /// Bit per voice: pending wave IRQ.
    pub wave: u32,
    /// Bit per voice: pending ramp IRQ.
    pub ramp: u32,
    /// Card IRQ status byte (bit 7 DMA-TC, 6 ramp, 5 wave, 3..2 timers).
    pub status: u8,
    /// Round-robin reporting cursor.
    pub channel: u8,
}

impl IrqAggregator {
    /// Recompute status bits 5..6 and advance the reporting cursor.
    ///
    /// Only bits inside `active_mask` can be reported; a disabled voice
    /// index can never raise a phantom interrupt. Returns true when any
    /// masked voice IRQ is pending, in which case the caller should edge
    /// the host IRQ line.
    pub fn refresh(&mut self, active_mask: u32, active_voices: u8) -> bool {
        self.status &= !(IRQ_STATUS_RAMP | IRQ_STATUS_WAVE);
        let total = (self.ramp | self.wave) & active_mask;
        if total == 0 {
            return false;
        }
        if self.ramp != 0 {
            self.status |= IRQ_STATUS_RAMP;
        }
        if self.wave != 0 {
            self.status |= IRQ_STATUS_WAVE;
        }
        // total is non-zero and confined to the low active_voices bits,
        // so the cursor always lands on a pending voice
        loop {
            if total & (1 << self.channel) != 0 {
                return true;
            }
            self.channel += 1;
            if self.channel >= active_voices {
                self.channel = 0;
            }
        }
    }
}
