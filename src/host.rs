//! Host collaborator traits
//!
//! The synthesizer core runs single-threaded inside a host emulator and
//! touches the outside world only through these narrow interfaces: the
//! downstream mixer consuming stereo frames, the interrupt controller,
//! the event scheduler backing the two timers, and the DMA controller's
//! channels.

/// Downstream mixer consuming the rendered output
///
/// The mixer owns sample-rate and format conversion; the core only hands
/// it interleaved left/right frames and rate/enable changes.
pub trait AudioSink {
    /// Consume one rendered block of interleaved stereo frames.
    fn queue_frames(&mut self, frames: &[[i16; 2]]);

    /// Apply a new base mix rate in Hz.
    fn set_frequency(&mut self, hz: u32);

    /// Enable or disable the card's mixer channel.
    fn enable(&mut self, enabled: bool);
}

/// Programmable interrupt controller
pub trait InterruptLine {
    /// Edge the given host IRQ line.
    fn activate_irq(&mut self, irq: u8);
}

/// Event scheduler backing the two card timers
///
/// The host must call [`crate::Gf1::timer_expired`] with the same timer
/// index once the delay has elapsed on the emulation thread.
pub trait TimerScheduler {
    /// Schedule an expiry event for timer `timer` after `delay_secs`.
    fn schedule(&mut self, timer: usize, delay_secs: f64);
}

/// One channel of the host DMA controller
///
/// Counts are in channel-width units: on a 16-bit channel every unit
/// moves two bytes.
pub trait DmaChannel {
    /// Remaining transfer count as programmed by the host, minus one.
    fn current_count(&self) -> u16;

    /// Whether this is a 16-bit channel.
    fn is_16bit(&self) -> bool;

    /// Copy up to `words` units from host memory into `dst`; returns the
    /// units actually copied.
    fn read(&mut self, words: usize, dst: &mut [u8]) -> usize;

    /// Copy up to `words` units from `src` into host memory; returns the
    /// units actually copied.
    fn write(&mut self, words: usize, src: &[u8]) -> usize;
}

/// Everything the engine needs from its host machine
///
/// A blanket implementation covers any type providing the three
/// sub-traits, so a test bench or an emulator bridge implements those
/// and gets `Host` for free.
pub trait Host: AudioSink + InterruptLine + TimerScheduler {}

impl<T: AudioSink + InterruptLine + TimerScheduler> Host for T {}
