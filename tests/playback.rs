//! End-to-end playback scenarios driven through the I/O port interface.

use gf1::{
    AudioSink, DmaChannel, Gf1, Gf1Settings, InterruptLine, TimerScheduler, CTRL_16BIT,
    CTRL_BIDIRECTIONAL, CTRL_DECREASING, CTRL_IRQ_ENABLED, CTRL_LOOP, CTRL_STOPPED,
};

const BASE: u16 = 0x240;

#[derive(Default)]
struct CaptureHost {
    frames: Vec<[i16; 2]>,
    frequency: Option<u32>,
    enabled: bool,
    irqs: Vec<u8>,
    scheduled: Vec<(usize, f64)>,
}

impl AudioSink for CaptureHost {
    fn queue_frames(&mut self, frames: &[[i16; 2]]) {
        self.frames.extend_from_slice(frames);
    }
    fn set_frequency(&mut self, hz: u32) {
        self.frequency = Some(hz);
    }
    fn enable(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

impl InterruptLine for CaptureHost {
    fn activate_irq(&mut self, irq: u8) {
        self.irqs.push(irq);
    }
}

impl TimerScheduler for CaptureHost {
    fn schedule(&mut self, timer: usize, delay_secs: f64) {
        self.scheduled.push((timer, delay_secs));
    }
}

fn new_card() -> Gf1<CaptureHost> {
    let mut card = Gf1::new(
        Gf1Settings {
            port_base: BASE,
            ..Default::default()
        },
        CaptureHost::default(),
    );
    // 14 active voices, IRQ line output enabled
    card.io_write_u8(BASE + 0x200, 0x08);
    write_reg8(&mut card, 0x0E, 13);
    card
}

fn write_reg8(card: &mut Gf1<CaptureHost>, reg: u8, value: u8) {
    card.io_write_u8(BASE + 0x303, reg);
    card.io_write_u8(BASE + 0x305, value);
}

fn write_reg16(card: &mut Gf1<CaptureHost>, reg: u8, value: u16) {
    card.io_write_u8(BASE + 0x303, reg);
    card.io_write_u16(BASE + 0x304, value);
}

/// Program one voice to sweep addresses [0, end] at one byte per frame
/// with unity volume and centered pan.
fn setup_voice(card: &mut Gf1<CaptureHost>, voice: u8, end: u32, wave_ctrl: u8) {
    card.io_write_u8(BASE + 0x302, voice);
    write_reg16(card, 0x02, 0);
    write_reg16(card, 0x03, 0);
    write_reg16(card, 0x04, (end >> 16) as u16);
    write_reg16(card, 0x05, end as u16);
    write_reg16(card, 0x0A, 0);
    write_reg16(card, 0x0B, 0);
    write_reg16(card, 0x01, 1024); // wave_add = 512, one byte per frame
    write_reg16(card, 0x09, 4095 << 4); // unity gain
    write_reg8(card, 0x0C, 7); // centered
    write_reg8(card, 0x00, wave_ctrl);
}

fn signed_ramp() -> Vec<u8> {
    (0..256).map(|i| (i as i32 - 128) as i8 as u8).collect()
}

const CENTER_PAN: f32 = std::f32::consts::FRAC_1_SQRT_2;

#[test]
fn silence_after_reset() {
    let mut card = new_card();
    card.upload(0, &signed_ramp()).unwrap();
    setup_voice(&mut card, 0, 255 << 9, CTRL_LOOP);

    // Full synthesizer reset through the data high byte of register 0x4C
    write_reg8(&mut card, 0x4C, 0x01);

    card.render(64);
    assert_eq!(card.host().frames.len(), 64);
    assert!(card.host().frames.iter().all(|f| f == &[0, 0]));
}

#[test]
fn single_8bit_forward_play() {
    let mut card = new_card();
    card.upload(0, &signed_ramp()).unwrap();
    setup_voice(&mut card, 0, 255 << 9, 0);

    for _ in 0..4 {
        card.render(64);
    }

    let frames = &card.host().frames;
    assert_eq!(frames.len(), 256);
    for (k, frame) in frames.iter().enumerate() {
        let expected = ((k as i32 - 128) * 256) as f32 * CENTER_PAN;
        assert_eq!(frame[0], expected as i16, "left frame {k}");
    }

    // The voice stopped on the final frame without raising an IRQ
    assert_ne!(card.voice(0).wave_ctrl() & CTRL_STOPPED, 0);
    assert_eq!(card.voice(0).wave_addr(), 255 << 9);
    assert_eq!(card.wave_irq(), 0);

    // Further rendering is silence
    card.host_mut().frames.clear();
    card.render(64);
    assert!(card.host().frames.iter().all(|f| f == &[0, 0]));
}

#[test]
fn looping_with_irq() {
    let mut card = new_card();
    card.upload(0, &signed_ramp()).unwrap();
    setup_voice(&mut card, 0, 255 << 9, CTRL_LOOP | CTRL_IRQ_ENABLED);

    for _ in 0..5 {
        card.render(64);
    }

    assert_eq!(card.wave_irq(), 1);
    assert_eq!(card.irq_status() & 0x20, 0x20);
    assert!(
        !card.host().irqs.is_empty(),
        "host IRQ line must have been edged"
    );
    let addr = card.voice(0).wave_addr();
    assert!(addr <= 255 << 9, "address must have wrapped back in range");
    assert_eq!(card.voice(0).wave_ctrl() & CTRL_STOPPED, 0);
}

#[test]
fn voice_irq_drains_by_repeated_status_reads() {
    let mut card = new_card();
    card.upload(0, &signed_ramp()).unwrap();
    setup_voice(&mut card, 0, 255 << 9, CTRL_LOOP | CTRL_IRQ_ENABLED);

    for _ in 0..5 {
        card.render(64);
    }
    assert_ne!(card.irq_status() & 0x60, 0);

    card.io_write_u8(BASE + 0x303, 0x8F);
    let mut reads = 0;
    while card.irq_status() & 0x60 != 0 {
        card.io_read_u8(BASE + 0x305);
        reads += 1;
        assert!(reads < 64, "IRQ status failed to drain");
    }
}

#[test]
fn bidirectional_loop_oscillates_between_bounds() {
    let mut card = new_card();
    card.upload(0, &signed_ramp()).unwrap();
    setup_voice(&mut card, 0, 255 << 9, CTRL_LOOP | CTRL_BIDIRECTIONAL);

    let mut directions = Vec::new();
    for _ in 0..32 {
        card.render(64);
        let voice = card.voice(0);
        assert!(
            voice.wave_addr() <= 255 << 9,
            "address escaped the loop bounds"
        );
        let decreasing = voice.wave_ctrl() & CTRL_DECREASING != 0;
        if directions.last() != Some(&decreasing) {
            directions.push(decreasing);
        }
    }
    assert!(
        directions.len() >= 3,
        "direction must keep flipping, saw {directions:?}"
    );
}

#[test]
fn centered_pan_is_equal_power() {
    let mut card = new_card();
    card.upload(0, &[100u8; 256]).unwrap();
    setup_voice(&mut card, 0, 255 << 9, CTRL_LOOP);

    card.render(64);
    for frame in &card.host().frames {
        assert!(frame[0] != 0);
        assert!(
            (frame[0] - frame[1]).abs() <= 1,
            "center pan must be equal within 1 ULP: {frame:?}"
        );
    }
}

#[test]
fn sixteen_bit_playback() {
    let mut card = new_card();
    // Words 0..256 with value 100*k, little endian, flat in bank 0
    let mut data = Vec::new();
    for k in 0..256u32 {
        let word = (100 * k) as u16;
        data.push(word as u8);
        data.push((word >> 8) as u8);
    }
    card.upload(0, &data).unwrap();
    setup_voice(&mut card, 0, 255 << 9, CTRL_16BIT);

    for _ in 0..4 {
        card.render(64);
    }
    let frames = &card.host().frames;
    for (k, frame) in frames.iter().enumerate() {
        let expected = (100 * k) as f32 * CENTER_PAN;
        assert_eq!(frame[0], expected as i16, "left frame {k}");
    }
}

#[test]
fn soft_limiter_scales_and_releases() {
    let mut card = new_card();
    // 14 voices all playing a loud constant at center pan overshoot the
    // 16-bit output range roughly ten-fold
    card.upload(0, &[127u8; 256]).unwrap();
    for voice in 0..14 {
        setup_voice(&mut card, voice, 255 << 9, CTRL_LOOP);
    }

    card.render(64);
    let peak = card.peak_amplitude();
    assert!(peak.left > (i16::MAX - 1) as f32);
    assert!(card
        .host()
        .frames
        .iter()
        .all(|f| f[0] <= i16::MAX - 1 && f[1] <= i16::MAX - 1));

    // Stop every voice, then keep rendering: the held peak releases one
    // volume step per block until the limiter disengages
    for voice in 0..14 {
        card.io_write_u8(BASE + 0x302, voice);
        write_reg8(&mut card, 0x00, 0x03);
    }
    let mut last = card.peak_amplitude().left;
    let mut blocks = 0u32;
    while card.peak_amplitude().left >= (i16::MAX - 1) as f32 {
        card.render(64);
        let now = card.peak_amplitude().left;
        assert!(now < last, "peak must decrease strictly");
        last = now;
        blocks += 1;
        assert!(blocks < 20_000, "limiter failed to release");
    }
}

#[test]
fn stopped_voice_neither_advances_nor_emits() {
    let mut card = new_card();
    card.upload(0, &signed_ramp()).unwrap();
    setup_voice(&mut card, 0, 255 << 9, CTRL_STOPPED);

    let addr = card.voice(0).wave_addr();
    card.render(64);
    assert_eq!(card.voice(0).wave_addr(), addr);
    assert!(card.host().frames.iter().all(|f| f == &[0, 0]));
}

#[test]
fn frequency_register_round_trip() {
    let mut card = new_card();
    card.io_write_u8(BASE + 0x302, 0);
    for freq in [1u16, 2, 511, 512, 1024, 0x7FFF, 0xFFFF] {
        write_reg16(&mut card, 0x01, freq);
        assert_eq!(card.voice(0).wave_freq(), freq);
        assert_eq!(card.voice(0).wave_add(), freq.div_ceil(2) as u32);
    }
}

#[test]
fn active_voice_count_bounds_and_rate() {
    let mut card = new_card();
    // Each request changes the count: 32, 14, 21, 32, 14
    for data in [31u8, 0, 20, 63, 13] {
        write_reg8(&mut card, 0x0E, data);
        let voices = card.active_voices();
        assert!((14..=32).contains(&voices));
        let expected =
            (0.5 + 1_000_000.0 / (1.619695497 * voices as f64)) as u32;
        assert_eq!(card.base_frequency(), expected);
        assert_eq!(card.host().frequency, Some(expected));
        assert!(card.host().enabled);
    }
}

#[test]
fn dma_upload_feeds_playback() {
    struct RampChannel;
    impl DmaChannel for RampChannel {
        fn current_count(&self) -> u16 {
            255
        }
        fn is_16bit(&self) -> bool {
            false
        }
        fn read(&mut self, words: usize, dst: &mut [u8]) -> usize {
            for (i, byte) in dst[..words].iter_mut().enumerate() {
                *byte = i as u8; // unsigned ramp, converted by the engine
            }
            words
        }
        fn write(&mut self, _: usize, _: &[u8]) -> usize {
            0
        }
    }

    let mut card = new_card();
    write_reg16(&mut card, 0x42, 0); // card address 0
    write_reg8(&mut card, 0x41, 0x81); // enable + two's-complement conversion
    card.dma_unmasked(&mut RampChannel);

    setup_voice(&mut card, 0, 255 << 9, 0);
    card.render(64);

    // Byte k arrived as k ^ 0x80, read back as signed k - 128
    for (k, frame) in card.host().frames.iter().enumerate() {
        let expected = ((k as i32 - 128) * 256) as f32 * CENTER_PAN;
        assert_eq!(frame[0], expected as i16, "left frame {k}");
    }
}
