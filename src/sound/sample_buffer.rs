//! interleaved float sample block passed across the audio boundary
use std::fmt;

pub struct SamplesBuffer {
    channels: usize,
    data: Vec<f32>,
}

impl SamplesBuffer {
    pub fn new(channels: usize, frames: usize) -> SamplesBuffer {
        SamplesBuffer {
            channels: channels,
            data: vec![0.0; channels * frames],
        }
    }
    /// wrap an existing interleaved slice (as delivered by the audio driver)
    pub fn from_interleaved(channels: usize, data: &[f32]) -> SamplesBuffer {
        SamplesBuffer {
            channels: channels,
            data: data.to_vec(),
        }
    }
    pub fn channels(&self) -> usize {
        self.channels
    }
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.data.len() / self.channels
    }
    pub fn zero(&mut self) -> () {
        for s in &mut self.data {
            *s = 0.0;
        }
    }
    /// sample at (frame, channel), zero when out of range
    pub fn get(&self, frame: usize, channel: usize) -> f32 {
        if channel >= self.channels || frame >= self.frames() {
            return 0.0;
        }
        self.data[frame * self.channels + channel]
    }
    pub fn add(&mut self, frame: usize, channel: usize, value: f32) -> () {
        if channel >= self.channels || frame >= self.frames() {
            return;
        }
        self.data[frame * self.channels + channel] += value;
    }
    pub fn data(&self) -> &[f32] {
        &self.data
    }
    pub fn into_data(self) -> Vec<f32> {
        self.data
    }
}

impl fmt::Display for SamplesBuffer {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{{ channels: {}, frames: {} }}",
            self.channels,
            self.frames()
        )
    }
}

#[cfg(test)]
mod test_sample_buffer {
    use super::*;

    #[test]
    fn build() {
        let buf = SamplesBuffer::new(2, 128);
        assert_eq!(buf.channels(), 2);
        assert_eq!(buf.frames(), 128);
    }
    #[test]
    fn get_and_add() {
        // It should accumulate samples with straight addition
        let mut buf = SamplesBuffer::new(2, 4);
        buf.add(1, 0, 0.25);
        buf.add(1, 0, 0.25);
        assert_eq!(buf.get(1, 0), 0.5);
        assert_eq!(buf.get(1, 1), 0.0);
    }
    #[test]
    fn out_of_range_is_silent() {
        let mut buf = SamplesBuffer::new(1, 2);
        buf.add(5, 0, 1.0);
        assert_eq!(buf.get(5, 0), 0.0);
        assert_eq!(buf.get(0, 3), 0.0);
    }
    #[test]
    fn wrap_interleaved() {
        let buf = SamplesBuffer::from_interleaved(2, &[0.1, 0.2, 0.3, 0.4]);
        assert_eq!(buf.frames(), 2);
        assert_eq!(buf.get(1, 1), 0.4);
    }
}
