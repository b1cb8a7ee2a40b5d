//! encode-only codec path: raw frames in, length-prefixed packets out
//!
//! One encoder lives for exactly one (sample rate, channel count)
//! configuration.  Shape changes get a fresh encoder, never a reset.
use super::{frames_per_packet, opus_channels, MAX_PACKET_BYTES};
use crate::common::box_error::BoxError;
use byteorder::{BigEndian, ByteOrder};
use log::warn;
use opus::{Application, Encoder};

pub struct ChunkEncoder {
    encoder: Encoder,
    channels: usize,
    sample_rate: u32,
    packet_frames: usize,
    staged: Vec<f32>, // interleaved samples waiting for a full packet
    bytes: Vec<u8>,   // length-prefixed packets ready to take
}

impl ChunkEncoder {
    pub fn new(sample_rate: u32, channels: usize) -> Result<ChunkEncoder, BoxError> {
        let encoder = Encoder::new(sample_rate, opus_channels(channels)?, Application::Audio)?;
        Ok(ChunkEncoder {
            encoder: encoder,
            channels: channels,
            sample_rate: sample_rate,
            packet_frames: frames_per_packet(sample_rate),
            staged: vec![],
            bytes: vec![],
        })
    }
    pub fn channels(&self) -> usize {
        self.channels
    }
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
    /// interleaved samples staged but not yet encoded
    pub fn staged_samples(&self) -> usize {
        self.staged.len()
    }
    /// feed interleaved frames; every full packet worth of samples is
    /// compressed right away
    pub fn put_frames(&mut self, interleaved: &[f32]) -> () {
        self.staged.extend_from_slice(interleaved);
        let samples_per_packet = self.packet_frames * self.channels;
        while self.staged.len() >= samples_per_packet {
            let packet: Vec<f32> = self.staged.drain(..samples_per_packet).collect();
            self.encode_packet(&packet);
        }
    }
    /// close out the stream at an interval boundary: the partial tail is
    /// padded with silence so the final packet is whole
    pub fn flush(&mut self) -> () {
        if self.staged.is_empty() {
            return;
        }
        let samples_per_packet = self.packet_frames * self.channels;
        self.staged.resize(samples_per_packet, 0.0);
        let packet: Vec<f32> = self.staged.drain(..).collect();
        self.encode_packet(&packet);
    }
    /// drain everything compressed since the last take
    pub fn take_bytes(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.bytes)
    }
    fn encode_packet(&mut self, samples: &[f32]) -> () {
        match self.encoder.encode_vec_float(samples, MAX_PACKET_BYTES) {
            Ok(packet) => {
                let mut len = [0u8; super::PACKET_LEN_BYTES];
                BigEndian::write_u16(&mut len, packet.len() as u16);
                self.bytes.extend_from_slice(&len);
                self.bytes.extend_from_slice(&packet);
            }
            Err(e) => {
                // drop the packet, the stream stays aligned on the next one
                warn!("opus encode failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod test_chunk_encoder {
    use super::super::PACKET_LEN_BYTES;
    use super::*;

    #[test]
    fn build() {
        let enc = ChunkEncoder::new(48000, 2).unwrap();
        assert_eq!(enc.channels(), 2);
        assert_eq!(enc.sample_rate(), 48000);
    }
    #[test]
    fn bad_shape_fails() {
        assert!(ChunkEncoder::new(48000, 5).is_err());
    }
    #[test]
    fn partial_packet_stays_staged() {
        // It should not emit anything until a full packet is staged
        let mut enc = ChunkEncoder::new(48000, 1).unwrap();
        enc.put_frames(&vec![0.0; 100]);
        assert!(enc.take_bytes().is_empty());
        assert_eq!(enc.staged_samples(), 100);
    }
    #[test]
    fn full_packet_is_length_prefixed() {
        let mut enc = ChunkEncoder::new(48000, 1).unwrap();
        enc.put_frames(&vec![0.0; 480]);
        let bytes = enc.take_bytes();
        assert!(bytes.len() > PACKET_LEN_BYTES);
        let len = BigEndian::read_u16(&bytes[..2]) as usize;
        assert_eq!(bytes.len(), PACKET_LEN_BYTES + len);
        // the accumulator drains on take
        assert!(enc.take_bytes().is_empty());
    }
    #[test]
    fn flush_pads_the_tail() {
        let mut enc = ChunkEncoder::new(48000, 1).unwrap();
        enc.put_frames(&vec![0.1; 100]);
        enc.flush();
        assert_eq!(enc.staged_samples(), 0);
        assert!(!enc.take_bytes().is_empty());
    }
}
