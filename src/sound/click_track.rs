//!
//! object to provide a click track on beat changes
//!
use std::f32::consts::PI;

pub struct ClickTrack {
    gain: f32,
    mute: bool,
    beats_per_accent: u16,
    beat: u16,
    tic: Vec<f32>,
    toc: Vec<f32>,
    idx: usize,
}

// the click is 100 msec long
fn click_frames(sample_rate: u32) -> usize {
    (sample_rate / 10) as usize
}

fn build_click(freq: f32, amplitude: f32, sample_rate: u32) -> Vec<f32> {
    let frames = click_frames(sample_rate);
    let step = 2.0 * PI * freq / sample_rate as f32;
    let mut click = Vec::with_capacity(frames);
    let mut phase: f32 = 0.0;
    for _ in 0..frames {
        click.push(amplitude * phase.sin());
        phase += step;
    }
    click
}

impl ClickTrack {
    pub fn new(sample_rate: u32) -> ClickTrack {
        ClickTrack {
            gain: 1.0,
            mute: true,
            beats_per_accent: 0,
            beat: 0,
            tic: build_click(330.0, 1.0, sample_rate),
            toc: build_click(300.0, 0.7, sample_rate),
            idx: 0,
        }
    }
    pub fn get_gain(&self) -> f64 {
        self.gain as f64
    }
    pub fn get_mute(&self) -> bool {
        self.mute
    }
    pub fn set_gain(&mut self, gain: f64) -> () {
        self.gain = gain as f32;
    }
    pub fn set_mute(&mut self, mute: bool) -> () {
        self.mute = mute;
    }
    /// 0 means accent only on the interval's first beat
    pub fn set_beats_per_accent(&mut self, beats_per_accent: u16) -> () {
        self.beats_per_accent = beats_per_accent;
    }
    /// the click length is in samples, so a rate change rebuilds the tables
    pub fn set_sample_rate(&mut self, sample_rate: u32) -> () {
        if self.tic.len() == click_frames(sample_rate) {
            return;
        }
        self.tic = build_click(330.0, 1.0, sample_rate);
        self.toc = build_click(300.0, 0.7, sample_rate);
        self.idx = 0;
    }
    fn accent(&self, beat: u16) -> bool {
        if self.beats_per_accent > 0 {
            beat % self.beats_per_accent == 0
        } else {
            beat == 0
        }
    }
    pub fn mix_into(&mut self, beat: u16, out_a: &mut [f32], out_b: &mut [f32]) -> () {
        // this is where we mix in the click
        if beat != self.beat {
            self.beat = beat;
            self.idx = 0;
        }
        if self.mute {
            return;
        }
        let accent = self.accent(beat);
        let frames = out_a.len().min(out_b.len());
        let mut i: usize = 0;
        while i < frames && self.idx < self.tic.len() {
            let s = if accent {
                self.tic[self.idx]
            } else {
                self.toc[self.idx]
            };
            out_a[i] += self.gain * s;
            out_b[i] += self.gain * s;
            i += 1;
            self.idx += 1;
        }
    }
}
