//! GF1 synthesizer engine
//!
//! Ties the components together behind the card's I/O port interface:
//! register access through the select/data latches, the render callback
//! feeding the downstream mixer, timer expiry, and DMA servicing. All
//! entry points run on the single host emulation thread and complete
//! synchronously.

use log::{debug, info, trace};

use crate::dma::DmaEngine;
use crate::host::{DmaChannel, Host};
use crate::irq::{IrqAggregator, IRQ_STATUS_DMA_TC, IRQ_STATUS_TIMER0};
use crate::limiter::SoftLimiter;
use crate::memory::SampleMemory;
use crate::registers::{GlobalRegs, DMA_LUT, IRQ_LUT};
use crate::tables::{Frame, PanTable, VolumeTable};
use crate::timer::{Timer, TIMER0_BASE_PERIOD, TIMER1_BASE_PERIOD};
use crate::voice::Voice;
use crate::Result;

/// Number of wavetable voices on the card.
pub const NUM_VOICES: usize = 32;

/// Largest block the render callback will produce in one call.
pub const BUFFER_FRAMES: usize = 64;

/// Mix-control bit: card IRQ line output enabled.
const MIX_CTRL_IRQ_ENABLE: u8 = 0x08;
/// Mix-control bit: the next 0x20B write selects an IRQ (set) or DMA
/// (clear) assignment.
const MIX_CTRL_SELECT_IRQ: u8 = 0x40;

/// Construction-time card configuration
///
/// Mirrors the DOS-side setup: the base I/O port and the IRQ/DMA lines
/// the card is jumpered to, plus the directory advertised through
/// `ULTRADIR`.
#[derive(Clone, Debug)]
pub struct Gf1Settings {
    /// Base I/O port; register offsets 0x200..0x307 are added to it.
    pub port_base: u16,
    /// Host DMA channel for both recording and playback.
    pub dma: u8,
    /// Host IRQ line for both playback and MIDI.
    pub irq: u8,
    /// Value of the `ULTRADIR` environment variable.
    pub ultradir: String,
}

impl Default for Gf1Settings {
    fn default() -> Self {
        Self {
            port_base: 0x240,
            dma: 3,
            irq: 5,
            ultradir: "C:\\ULTRASND".into(),
        }
    }
}

/// The GF1 wavetable synthesizer
///
/// Owns the 32 voices, the 1 MiB sample memory, the gain tables, the IRQ
/// bookkeeping, the two timers, and the DMA engine, plus the host bridge
/// it reports into.
///
/// # Example
///
/// ```no_run
/// use gf1::{Gf1, Gf1Settings};
/// # struct Bridge;
/// # impl gf1::AudioSink for Bridge {
/// #     fn queue_frames(&mut self, _: &[[i16; 2]]) {}
/// #     fn set_frequency(&mut self, _: u32) {}
/// #     fn enable(&mut self, _: bool) {}
/// # }
/// # impl gf1::InterruptLine for Bridge {
/// #     fn activate_irq(&mut self, _: u8) {}
/// # }
/// # impl gf1::TimerScheduler for Bridge {
/// #     fn schedule(&mut self, _: usize, _: f64) {}
/// # }
///
/// let mut gus = Gf1::new(Gf1Settings::default(), Bridge);
/// gus.io_write_u8(0x543, 0x0E);       // select: active voices
/// gus.io_write_u8(0x545, 13);         // 14 voices
/// gus.render(64);                     // one block to the mixer
/// ```
pub struct Gf1<H: Host> {
    host: H,
    settings: Gf1Settings,
    regs: GlobalRegs,
    voices: Box<[Voice; NUM_VOICES]>,
    ram: SampleMemory,
    volume: VolumeTable,
    pan: PanTable,
    irq: IrqAggregator,
    timers: [Timer; 2],
    dma: DmaEngine,
    limiter: SoftLimiter,
}

impl<H: Host> Gf1<H> {
    /// Build the synthesizer and perform a full power-on reset.
    pub fn new(settings: Gf1Settings, host: H) -> Self {
        let voices = Box::new(std::array::from_fn(|index| Voice::new(index as u8)));
        let mut gf1 = Self {
            regs: GlobalRegs::new(settings.irq, settings.dma),
            host,
            settings,
            voices,
            ram: SampleMemory::new(),
            volume: VolumeTable::new(),
            pan: PanTable::new(),
            irq: IrqAggregator::default(),
            timers: [
                Timer::new(TIMER0_BASE_PERIOD),
                Timer::new(TIMER1_BASE_PERIOD),
            ],
            dma: DmaEngine::default(),
            limiter: SoftLimiter::new(),
        };
        gf1.synth_reset(0x01);
        gf1
    }

    // =========================================================================
    // I/O port interface
    // =========================================================================

    /// 8-bit read from an absolute I/O port.
    pub fn io_read_u8(&mut self, port: u16) -> u8 {
        match port.wrapping_sub(self.settings.port_base) {
            0x206 => self.irq.status,
            0x208 => self.adlib_timer_status(),
            0x20a => self.regs.adlib_command,
            0x302 => self.regs.cur_voice as u8,
            0x303 => self.regs.reg_select,
            0x304 => (self.execute_global_read() & 0xff) as u8,
            0x305 => (self.execute_global_read() >> 8) as u8,
            0x307 => self.ram.peek(self.regs.dram_addr),
            offset => {
                trace!("GUS: read from unhandled port offset {offset:#x}");
                0xff
            }
        }
    }

    /// 16-bit read from an absolute I/O port; only the data port 0x304
    /// returns both bytes at once.
    pub fn io_read_u16(&mut self, port: u16) -> u16 {
        if port.wrapping_sub(self.settings.port_base) == 0x304 {
            self.execute_global_read()
        } else {
            self.io_read_u8(port) as u16
        }
    }

    /// 8-bit write to an absolute I/O port.
    pub fn io_write_u8(&mut self, port: u16, value: u8) {
        match port.wrapping_sub(self.settings.port_base) {
            0x200 => {
                self.regs.mix_control = value;
                self.regs.change_irq_dma = true;
            }
            0x208 => self.regs.adlib_command = value,
            0x209 => self.write_timer_command(value),
            0x20b => self.apply_irq_dma_assignment(value),
            0x302 => self.regs.cur_voice = (value & 31) as usize,
            0x303 => {
                self.regs.reg_select = value;
                self.regs.reg_data = 0;
            }
            0x304 => self.regs.reg_data = value as u16,
            0x305 => {
                self.regs.reg_data = (self.regs.reg_data & 0x00ff) | ((value as u16) << 8);
                self.execute_global_write();
            }
            0x307 => self.ram.poke(self.regs.dram_addr, value),
            offset => trace!("GUS: write to unhandled port offset {offset:#x} value {value:#04x}"),
        }
    }

    /// 16-bit write to an absolute I/O port; a 16-bit write to the data
    /// port 0x304 latches both bytes and executes immediately.
    pub fn io_write_u16(&mut self, port: u16, value: u16) {
        if port.wrapping_sub(self.settings.port_base) == 0x304 {
            self.regs.reg_data = value;
            self.execute_global_write();
        } else {
            self.io_write_u8(port, value as u8);
        }
    }

    // =========================================================================
    // Global register file
    // =========================================================================

    fn execute_global_write(&mut self) {
        let data = self.regs.reg_data;
        let data_high = (data >> 8) as u8;
        let cur = self.regs.cur_voice;
        match self.regs.reg_select {
            // Voice wave control
            0x00 => {
                if self.voices[cur].write_wave_ctrl(data_high, &mut self.irq.wave) {
                    self.refresh_voice_irq();
                }
            }
            // Voice frequency
            0x01 => self.voices[cur].write_wave_freq(data),
            // Wave start, high-13/low-16 halves
            0x02 => {
                let voice = &mut self.voices[cur];
                voice.wave_start =
                    (voice.wave_start & 0xffff) | ((data as u32 & 0x1fff) << 16);
            }
            0x03 => {
                let voice = &mut self.voices[cur];
                voice.wave_start = (voice.wave_start & 0xffff_0000) | data as u32;
            }
            // Wave end, high-13/low-16 halves
            0x04 => {
                let voice = &mut self.voices[cur];
                voice.wave_end = (voice.wave_end & 0xffff) | ((data as u32 & 0x1fff) << 16);
            }
            0x05 => {
                let voice = &mut self.voices[cur];
                voice.wave_end = (voice.wave_end & 0xffff_0000) | data as u32;
            }
            // Ramp rate
            0x06 => self.voices[cur].write_ramp_rate(data_high),
            // Ramp start/end indices
            0x07 => self.voices[cur].vol_start = (data_high as u32) << 4,
            0x08 => self.voices[cur].vol_end = (data_high as u32) << 4,
            // Current volume index
            0x09 => self.voices[cur].vol_cur = (data >> 4) as u32,
            // Current address, high-13/low-16 halves
            0x0a => {
                let voice = &mut self.voices[cur];
                voice.wave_addr = (voice.wave_addr & 0xffff) | ((data as u32 & 0x1fff) << 16);
            }
            0x0b => {
                let voice = &mut self.voices[cur];
                voice.wave_addr = (voice.wave_addr & 0xffff_0000) | data as u32;
            }
            // Pan position
            0x0c => self.voices[cur].write_pan_pot(data_high),
            // Ramp control
            0x0d => {
                if self.voices[cur].write_ramp_ctrl(data_high, &mut self.irq.ramp) {
                    self.refresh_voice_irq();
                }
            }
            // Active voice count; also reloads the register select latch
            0x0e => {
                self.regs.reg_select = data_high;
                let requested = 1 + (data_high & 63);
                if self.regs.set_active_voices(requested) {
                    info!(
                        "GUS: activated {} voices running at {} Hz",
                        self.regs.active_voices, self.regs.base_freq
                    );
                    self.host.set_frequency(self.regs.base_freq);
                }
                // Always re-derive the per-frame rates, they depend on
                // the frame rate just applied
                for voice in &mut self.voices[..self.regs.active_voices as usize] {
                    voice.refresh_rates();
                }
                self.host.enable(true);
            }
            // Fast Tracker 2 pokes this undocumented register
            0x10 => {}
            // DMA control
            0x41 => {
                self.dma.write_control(data_high);
                debug!(
                    "GUS: DMA control {:#04x}, engine {}",
                    data_high,
                    if self.dma.armed { "armed" } else { "disarmed" }
                );
            }
            // DMA address
            0x42 => self.dma.addr = data,
            // DRAM peek/poke pointer halves
            0x43 => self.regs.dram_addr = (self.regs.dram_addr & 0xff_0000) | data as u32,
            0x44 => {
                self.regs.dram_addr =
                    (self.regs.dram_addr & 0xffff) | ((data_high as u32) << 16);
            }
            // Timer control, Adlib semantics
            0x45 => {
                self.regs.timer_control = data_high;
                self.timers[0].raise_irq = data_high & 0x04 != 0;
                if !self.timers[0].raise_irq {
                    self.irq.status &= !IRQ_STATUS_TIMER0;
                }
                self.timers[1].raise_irq = data_high & 0x08 != 0;
                if !self.timers[1].raise_irq {
                    self.irq.status &= !(IRQ_STATUS_TIMER0 << 1);
                }
            }
            // Timer reload values
            0x46 => self.timers[0].write_value(data_high),
            0x47 => self.timers[1].write_value(data_high),
            // Sampling control; bit 0 arms the DMA engine as well
            0x49 => {
                self.regs.samp_control = data_high;
                self.dma.armed = data_high & 0x01 != 0;
            }
            // Synthesizer reset
            0x4c => self.synth_reset(data_high),
            other => debug!("GUS: unimplemented global register {other:#04x} write {data:#06x}"),
        }
    }

    fn execute_global_read(&mut self) -> u16 {
        let cur = self.regs.cur_voice;
        match self.regs.reg_select {
            // DMA control; reading acknowledges the terminal-count IRQ
            0x41 => {
                let mut value = self.dma.control & 0xbf;
                value |= (self.irq.status & IRQ_STATUS_DMA_TC) >> 1;
                self.irq.status &= !IRQ_STATUS_DMA_TC;
                (value as u16) << 8
            }
            0x42 => self.dma.addr,
            0x45 => (self.regs.timer_control as u16) << 8,
            // Sampling status carries the pending TC bit without the ack
            0x49 => {
                let mut value = self.dma.control & 0xbf;
                value |= (self.irq.status & IRQ_STATUS_DMA_TC) >> 1;
                (value as u16) << 8
            }
            0x80 => (self.voices[cur].read_wave_ctrl(self.irq.wave) as u16) << 8,
            0x82 => (self.voices[cur].wave_start >> 16) as u16,
            0x83 => self.voices[cur].wave_start as u16,
            0x89 => (self.voices[cur].vol_cur << 4) as u16,
            0x8a => (self.voices[cur].wave_addr >> 16) as u16,
            0x8b => self.voices[cur].wave_addr as u16,
            0x8d => (self.voices[cur].read_ramp_ctrl(self.irq.ramp) as u16) << 8,
            // General voice IRQ status; reading drains the reported voice
            0x8f => {
                let mut value = self.irq.channel | 0x20;
                let mask = 1u32 << self.irq.channel;
                if self.irq.ramp & mask == 0 {
                    value |= 0x40;
                }
                if self.irq.wave & mask == 0 {
                    value |= 0x80;
                }
                self.irq.ramp &= !mask;
                self.irq.wave &= !mask;
                self.refresh_voice_irq();
                (value as u16) << 8
            }
            other => {
                debug!("GUS: read of global register {other:#04x}");
                self.regs.reg_data
            }
        }
    }

    // =========================================================================
    // Reset
    // =========================================================================

    /// Full synthesizer reset driven by the written data byte of global
    /// register 0x4C: bit 0 performs the reset, bit 2 gates card-wide IRQ
    /// generation.
    fn synth_reset(&mut self, data: u8) {
        if data & 0x01 != 0 {
            self.log_stats();

            self.regs.adlib_command = 85;
            self.irq.status = 0;
            for timer in &mut self.timers {
                timer.reset();
            }
            self.regs.change_irq_dma = false;
            self.regs.mix_control = 0x0b; // latches enabled, lines disabled

            // Stop every voice; the control writes also clear its IRQ bits
            for index in 0..NUM_VOICES {
                let voice = &mut self.voices[index];
                voice.vol_cur = 0;
                voice.write_wave_ctrl(0x1, &mut self.irq.wave);
                voice.write_ramp_ctrl(0x1, &mut self.irq.ramp);
                voice.write_pan_pot(7);
                voice.clear_stats();
            }
            self.irq.channel = 0;
            self.limiter.reset();
        }
        self.regs.irq_enabled = data & 0x04 != 0;
    }

    /// Log a playback summary, mirroring what the card reported at reset.
    fn log_stats(&self) {
        let mut blocks_8bit = 0u64;
        let mut blocks_16bit = 0u64;
        let mut voices_8bit = 0u32;
        let mut voices_16bit = 0u32;
        for voice in self.voices.iter() {
            if voice.generated_8bit_blocks > 0 {
                blocks_8bit += voice.generated_8bit_blocks as u64;
                voices_8bit += 1;
            }
            if voice.generated_16bit_blocks > 0 {
                blocks_16bit += voice.generated_16bit_blocks as u64;
                voices_16bit += 1;
            }
        }
        let combined = blocks_8bit + blocks_16bit;

        // Not enough playback to be worth reporting
        let peak = self.limiter.peak;
        if combined < 10_000 || (peak.left + peak.right) < 10.0 {
            return;
        }

        if voices_16bit == 0 {
            info!("GUS: audio comprised of 8-bit samples from {voices_8bit} voices");
        } else if voices_8bit == 0 {
            info!("GUS: audio comprised of 16-bit samples from {voices_16bit} voices");
        } else {
            let ratio_8bit = (100 * blocks_8bit).div_ceil(combined);
            let ratio_16bit = (100 * blocks_16bit).div_ceil(combined);
            info!(
                "GUS: audio was made up of {ratio_8bit}% 8-bit {voices_8bit}-voice and \
                 {ratio_16bit}% 16-bit {voices_16bit}-voice samples"
            );
        }

        let peak_ratio = (peak.left.max(peak.right) / i16::MAX as f32).min(1.0);
        info!("GUS: peak amplitude reached {:.0}% of max", 100.0 * peak_ratio);
    }

    // =========================================================================
    // IRQ plumbing
    // =========================================================================

    fn refresh_voice_irq(&mut self) {
        if self
            .irq
            .refresh(self.regs.active_mask, self.regs.active_voices)
        {
            self.raise_host_irq();
        }
    }

    fn raise_host_irq(&mut self) {
        if self.irq.status != 0 && self.regs.mix_control & MIX_CTRL_IRQ_ENABLE != 0 {
            self.host.activate_irq(self.regs.irq1);
        }
    }

    fn apply_irq_dma_assignment(&mut self, value: u8) {
        if !self.regs.change_irq_dma {
            return;
        }
        self.regs.change_irq_dma = false;
        if self.regs.mix_control & MIX_CTRL_SELECT_IRQ != 0 {
            let irq = IRQ_LUT[(value & 0x7) as usize];
            if irq != 0 {
                self.regs.irq1 = irq;
                debug!("GUS: assigned to IRQ {irq}");
            }
        } else {
            let dma = DMA_LUT[(value & 0x7) as usize];
            if dma != 0 {
                self.regs.dma1 = dma;
                debug!("GUS: assigned to DMA {dma}");
            }
        }
    }

    // =========================================================================
    // Timers
    // =========================================================================

    fn write_timer_command(&mut self, value: u8) {
        if value & 0x80 != 0 {
            self.timers[0].reached = false;
            self.timers[1].reached = false;
            return;
        }
        self.timers[0].masked = value & 0x40 != 0;
        self.timers[1].masked = value & 0x20 != 0;
        for (index, start_bit) in [(0usize, 0x01u8), (1, 0x02)] {
            if value & start_bit != 0 {
                if !self.timers[index].running {
                    self.host.schedule(index, self.timers[index].delay);
                    self.timers[index].running = true;
                }
            } else {
                self.timers[index].running = false;
            }
        }
    }

    /// Expire a previously scheduled timer event.
    ///
    /// The host scheduler calls this once the delay passed to
    /// [`TimerScheduler::schedule`](crate::TimerScheduler::schedule) has
    /// elapsed. A still-running timer is immediately re-armed.
    pub fn timer_expired(&mut self, timer: usize) {
        let timer = timer & 1;
        if !self.timers[timer].masked {
            self.timers[timer].reached = true;
        }
        if self.timers[timer].raise_irq {
            self.irq.status |= IRQ_STATUS_TIMER0 << timer;
            self.raise_host_irq();
        }
        if self.timers[timer].running {
            self.host.schedule(timer, self.timers[timer].delay);
        }
    }

    fn adlib_timer_status(&self) -> u8 {
        let mut status = 0u8;
        if self.timers[0].reached {
            status |= 1 << 6;
        }
        if self.timers[1].reached {
            status |= 1 << 5;
        }
        if status & 0x60 != 0 {
            status |= 1 << 7;
        }
        if self.irq.status & IRQ_STATUS_TIMER0 != 0 {
            status |= 1 << 2;
        }
        if self.irq.status & (IRQ_STATUS_TIMER0 << 1) != 0 {
            status |= 1 << 1;
        }
        status
    }

    // =========================================================================
    // DMA
    // =========================================================================

    /// Service the host DMA channel after it was unmasked.
    ///
    /// Does nothing unless a DMA-control or sampling-control write armed
    /// the engine; one transfer is run per arming. Raises the
    /// terminal-count IRQ when requested.
    pub fn dma_unmasked(&mut self, channel: &mut dyn DmaChannel) {
        if !self.dma.armed {
            return;
        }
        if self.dma.transfer(channel, &mut self.ram) {
            self.irq.status |= IRQ_STATUS_DMA_TC;
            self.raise_host_irq();
        }
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    /// Render one block of up to [`BUFFER_FRAMES`] frames into the
    /// downstream mixer and re-evaluate the voice IRQ state.
    pub fn render(&mut self, frames: usize) {
        debug_assert!(frames <= BUFFER_FRAMES);
        let len = frames.min(BUFFER_FRAMES);

        let mut accumulator = [Frame::default(); BUFFER_FRAMES];
        for voice in &mut self.voices[..self.regs.active_voices as usize] {
            voice.generate_into(
                &self.ram,
                &self.volume,
                &self.pan,
                &mut accumulator[..len],
                &mut self.limiter.peak,
                &mut self.irq.wave,
                &mut self.irq.ramp,
            );
        }

        let mut scaled = [[0i16; 2]; BUFFER_FRAMES];
        self.limiter.process(&accumulator[..len], &mut scaled[..len]);
        self.host.queue_frames(&scaled[..len]);
        self.refresh_voice_irq();
    }

    // =========================================================================
    // Library surface
    // =========================================================================

    /// Bulk-load sample data into the card DRAM without going through
    /// DMA.
    ///
    /// # Errors
    ///
    /// Fails if the data would extend past the 1 MiB DRAM.
    pub fn upload(&mut self, offset: u32, data: &[u8]) -> Result<()> {
        self.ram.load(offset, data)
    }

    /// The `SET ULTRASND=...` and `SET ULTRADIR=...` lines the DOS shell
    /// collaborator should export.
    pub fn autoexec_lines(&self) -> [String; 2] {
        [
            format!(
                "SET ULTRASND={:x},{},{},{},{}",
                self.settings.port_base,
                self.regs.dma1,
                self.regs.dma2,
                self.regs.irq1,
                self.regs.irq2
            ),
            format!("SET ULTRADIR={}", self.settings.ultradir),
        ]
    }

    /// Card IRQ status byte (also readable through port offset 0x206).
    #[inline]
    pub fn irq_status(&self) -> u8 {
        self.irq.status
    }

    /// Pending wave IRQ bitmap, one bit per voice.
    #[inline]
    pub fn wave_irq(&self) -> u32 {
        self.irq.wave
    }

    /// Pending ramp IRQ bitmap, one bit per voice.
    #[inline]
    pub fn ramp_irq(&self) -> u32 {
        self.irq.ramp
    }

    /// Inspect a voice; the index is masked to the valid range.
    #[inline]
    pub fn voice(&self, index: usize) -> &Voice {
        &self.voices[index & (NUM_VOICES - 1)]
    }

    /// Current active-voice count.
    #[inline]
    pub fn active_voices(&self) -> u8 {
        self.regs.active_voices
    }

    /// Current base mix rate in Hz.
    #[inline]
    pub fn base_frequency(&self) -> u32 {
        self.regs.base_freq
    }

    /// Running output peak per channel, as tracked by the soft limiter.
    #[inline]
    pub fn peak_amplitude(&self) -> Frame {
        self.limiter.peak
    }

    /// Construction settings.
    #[inline]
    pub fn settings(&self) -> &Gf1Settings {
        &self.settings
    }

    /// The owned host bridge.
    #[inline]
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Mutable access to the owned host bridge.
    #[inline]
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }
}

impl<H: Host> Drop for Gf1<H> {
    fn drop(&mut self) {
        // Matches power-off on the real card and flushes the stats log
        self.synth_reset(0x01);
    }
}

impl<H: Host> std::fmt::Debug for Gf1<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gf1")
            .field("port_base", &self.settings.port_base)
            .field("active_voices", &self.regs.active_voices)
            .field("base_freq", &self.regs.base_freq)
            .field("irq_status", &self.irq.status)
            .field("irq_enabled", &self.regs.irq_enabled)
            .field("samp_control", &self.regs.samp_control)
            .finish_non_exhaustive()
    }
}
