//! the shared beat grid: beats per interval, tempo, and the arithmetic
//! position counter the scheduler drives from
//!
//! Boundary detection is pure integer arithmetic on the position counter.
//! Block size and beat length do not divide evenly in general, so a beat
//! or interval edge can land anywhere inside an audio block.
use std::fmt;

pub struct BeatGrid {
    bpm: u16,
    bpi: u16,
    sample_rate: u32,
    samples_in_interval: u64,
    interval_position: u64,
    last_beat: u16,
}

impl BeatGrid {
    pub fn new(bpm: u16, bpi: u16, sample_rate: u32) -> BeatGrid {
        let mut grid = BeatGrid {
            bpm: bpm.max(1),
            bpi: bpi.max(1),
            sample_rate: sample_rate,
            samples_in_interval: 0,
            interval_position: 0,
            last_beat: 0,
        };
        grid.recompute();
        grid
    }
    pub fn bpm(&self) -> u16 {
        self.bpm
    }
    pub fn bpi(&self) -> u16 {
        self.bpi
    }
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
    pub fn samples_in_interval(&self) -> u64 {
        self.samples_in_interval
    }
    pub fn interval_position(&self) -> u64 {
        self.interval_position
    }
    pub fn samples_per_beat(&self) -> u64 {
        60 * self.sample_rate as u64 / self.bpm as u64
    }
    pub fn set_bpm(&mut self, bpm: u16) -> () {
        if bpm > 0 {
            self.bpm = bpm;
            self.recompute();
        }
    }
    pub fn set_bpi(&mut self, bpi: u16) -> () {
        if bpi > 0 {
            self.bpi = bpi;
            self.recompute();
        }
    }
    /// rate change keeps the position at the same musical spot
    pub fn set_sample_rate(&mut self, sample_rate: u32) -> () {
        if sample_rate == 0 || sample_rate == self.sample_rate {
            return;
        }
        let pos = self.interval_position * sample_rate as u64 / self.sample_rate as u64;
        self.sample_rate = sample_rate;
        self.recompute();
        self.interval_position = pos % self.samples_in_interval;
    }
    fn recompute(&mut self) -> () {
        self.samples_in_interval = self.samples_per_beat() * self.bpi as u64;
    }
    /// advance at most to the interval boundary.  Returns how many frames
    /// were consumed and whether the boundary was hit; the caller resets
    /// the position once the new interval has been applied.
    pub fn advance(&mut self, frames: u64) -> (u64, bool) {
        let remaining = self.samples_in_interval - self.interval_position;
        let consumed = frames.min(remaining);
        self.interval_position += consumed;
        (consumed, self.interval_position == self.samples_in_interval)
    }
    pub fn reset_position(&mut self) -> () {
        self.interval_position = 0;
        self.last_beat = 0;
    }
    pub fn current_beat(&self) -> u16 {
        let beat = self.interval_position / self.samples_per_beat();
        (beat as u16).min(self.bpi - 1)
    }
    /// edge triggered beat detection: reports each crossed beat index once.
    /// A large advance can span several beats, so callers drain this until
    /// None to avoid swallowing intermediate beats.
    pub fn crossed_beat(&mut self) -> Option<u16> {
        if self.current_beat() > self.last_beat {
            self.last_beat += 1;
            return Some(self.last_beat);
        }
        None
    }
}

impl fmt::Display for BeatGrid {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{{ bpm: {}, bpi: {}, pos: {}/{} }}",
            self.bpm, self.bpi, self.interval_position, self.samples_in_interval
        )
    }
}
