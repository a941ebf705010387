//! Gravis UltraSound GF1 Synthesizer Core
//!
//! An emulation of the GF1 wavetable synthesizer from the Gravis
//! UltraSound ISA sound card: 32 independent voices reading 8-bit and
//! 16-bit samples out of 1 MiB of on-card DRAM, driven by 20.9
//! fixed-point phase accumulators with sub-sample linear interpolation,
//! shaped by logarithmic volume ramps and constant-power panning, and
//! mixed into a soft-limited stereo stream.
//!
//! # Features
//! - Full global register file behind the 0x3X2..0x3X7 select/data ports
//! - Per-voice loop, bidirectional and rollover playback with coalesced
//!   wave/ramp IRQ reporting
//! - Two Adlib-compatible timers and IRQ/DMA line reassignment
//! - DMA uploads with banked 16-bit addressing and sign conversion
//! - Peak-tracking soft limiter with slow release
//!
//! # Host integration
//! The card is single-threaded and reaches the outside world only
//! through the traits in [`AudioSink`], [`InterruptLine`],
//! [`TimerScheduler`] and [`DmaChannel`]: the host emulator implements
//! them, calls [`Gf1::render`] from its mixer callback,
//! [`Gf1::timer_expired`] from its scheduler and [`Gf1::dma_unmasked`]
//! when the card's DMA channel is unmasked.
//!
//! # Quick start
//! ```no_run
//! use gf1::{Gf1, Gf1Settings};
//! # struct Bridge;
//! # impl gf1::AudioSink for Bridge {
//! #     fn queue_frames(&mut self, _: &[[i16; 2]]) {}
//! #     fn set_frequency(&mut self, _: u32) {}
//! #     fn enable(&mut self, _: bool) {}
//! # }
//! # impl gf1::InterruptLine for Bridge {
//! #     fn activate_irq(&mut self, _: u8) {}
//! # }
//! # impl gf1::TimerScheduler for Bridge {
//! #     fn schedule(&mut self, _: usize, _: f64) {}
//! # }
//!
//! let mut gus = Gf1::new(Gf1Settings::default(), Bridge);
//! gus.upload(0, &[0u8; 256]).unwrap();   // sample data into card DRAM
//! gus.io_write_u8(0x543, 0x0E);          // select: active voices
//! gus.io_write_u8(0x545, 13);            // 14 voices at 44100 Hz
//! gus.render(64);                        // one block to the mixer
//! ```

#![warn(missing_docs)]

mod chip;
mod dma;
mod host;
mod irq;
mod limiter;
mod memory;
mod registers;
mod tables;
mod timer;
mod voice;

/// Error type for GF1 card operations
///
/// The register interface itself has no recoverable errors: invalid
/// writes are silently ignored or clamped like the hardware does. Only
/// the library-level bulk upload surface can fail.
#[derive(thiserror::Error, Debug)]
pub enum Gf1Error {
    /// A bulk sample upload would extend past the end of card DRAM.
    #[error("upload of {len} bytes at {offset:#07x} exceeds the 1 MiB sample memory")]
    UploadOverflow {
        /// Requested start offset in DRAM.
        offset: u32,
        /// Length of the rejected upload.
        len: usize,
    },
}

/// Result type for GF1 card operations
pub type Result<T> = std::result::Result<T, Gf1Error>;

// Public API exports
pub use chip::{Gf1, Gf1Settings, BUFFER_FRAMES, NUM_VOICES};
pub use host::{AudioSink, DmaChannel, Host, InterruptLine, TimerScheduler};
pub use memory::{SampleMemory, RAM_SIZE};
pub use registers::{MAX_VOICES, MIN_VOICES};
pub use tables::{
    Frame, PanTable, VolumeTable, PAN_POSITIONS, VOLUME_POSITIONS, VOLUME_SCALE_DIV,
};
pub use voice::{
    SampleFormat, Voice, CTRL_16BIT, CTRL_BIDIRECTIONAL, CTRL_DECREASING, CTRL_IRQ_ENABLED,
    CTRL_IRQ_PENDING, CTRL_LOOP, CTRL_STOP, CTRL_STOPPED,
};
