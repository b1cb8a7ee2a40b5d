//! decode-only codec path: compressed bytes in, float frames out
//!
//! Bytes arrive from the network in arbitrary slices; only complete
//! length-prefixed packets are handed to the codec.  An incomplete tail
//! stays pending until more bytes show up.
use super::{opus_channels, PACKET_LEN_BYTES};
use crate::common::box_error::BoxError;
use byteorder::{BigEndian, ByteOrder};
use log::warn;
use opus::Decoder;

pub struct ChunkDecoder {
    decoder: Decoder,
    channels: usize,
    sample_rate: u32,
    input: Vec<u8>,    // compressed bytes not yet consumed
    scratch: Vec<f32>, // reused decode buffer, sized for the max opus frame
}

impl ChunkDecoder {
    pub fn new(sample_rate: u32, channels: usize) -> Result<ChunkDecoder, BoxError> {
        let decoder = Decoder::new(sample_rate, opus_channels(channels)?)?;
        // 120 msec is the largest frame opus will hand back
        let scratch = vec![0.0; sample_rate as usize * channels * 120 / 1000];
        Ok(ChunkDecoder {
            decoder: decoder,
            channels: channels,
            sample_rate: sample_rate,
            input: vec![],
            scratch: scratch,
        })
    }
    pub fn channels(&self) -> usize {
        self.channels
    }
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
    pub fn put_bytes(&mut self, bytes: &[u8]) -> () {
        self.input.extend_from_slice(bytes);
    }
    pub fn pending_bytes(&self) -> usize {
        self.input.len()
    }
    /// hand back the undecoded bytes (used when the decoder is replaced)
    pub fn take_pending(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.input)
    }
    pub fn clear(&mut self) -> () {
        self.input.clear();
    }
    /// decode pending packets until at least `min_frames` frames come out
    /// or the input runs dry.  A packet the codec rejects is dropped with a
    /// warning and contributes nothing; the stream keeps going.
    pub fn decode_frames(&mut self, min_frames: usize) -> Vec<f32> {
        let mut out: Vec<f32> = vec![];
        while out.len() < min_frames * self.channels {
            if self.input.len() < PACKET_LEN_BYTES {
                break;
            }
            let len = BigEndian::read_u16(&self.input[..PACKET_LEN_BYTES]) as usize;
            if self.input.len() < PACKET_LEN_BYTES + len {
                // incomplete packet, wait for the rest
                break;
            }
            let packet: Vec<u8> = self
                .input
                .drain(..PACKET_LEN_BYTES + len)
                .skip(PACKET_LEN_BYTES)
                .collect();
            match self.decoder.decode_float(&packet, &mut self.scratch, false) {
                Ok(frames) => {
                    out.extend_from_slice(&self.scratch[..frames * self.channels]);
                }
                Err(e) => {
                    warn!("opus decode failed, dropping packet: {}", e);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod test_chunk_decoder {
    use super::*;
    use crate::codec::encoder::ChunkEncoder;

    #[test]
    fn build() {
        let dec = ChunkDecoder::new(48000, 2).unwrap();
        assert_eq!(dec.channels(), 2);
    }
    #[test]
    fn incomplete_packet_stays_pending() {
        // It should not decode until the whole packet has arrived
        let mut dec = ChunkDecoder::new(48000, 1).unwrap();
        // length prefix claims 100 bytes, only 5 are here
        dec.put_bytes(&[0x00, 0x64, 1, 2, 3, 4, 5]);
        let out = dec.decode_frames(480);
        assert!(out.is_empty());
        assert_eq!(dec.pending_bytes(), 7);
    }
    #[test]
    fn decodes_what_the_encoder_produced() {
        let mut enc = ChunkEncoder::new(48000, 1).unwrap();
        let mut dec = ChunkDecoder::new(48000, 1).unwrap();
        enc.put_frames(&vec![0.1; 960]); // two packets
        dec.put_bytes(&enc.take_bytes());
        let out = dec.decode_frames(960);
        assert_eq!(out.len(), 960);
        assert_eq!(dec.pending_bytes(), 0);
    }
    #[test]
    fn pending_survives_replacement() {
        let mut dec = ChunkDecoder::new(48000, 1).unwrap();
        dec.put_bytes(&[0x00, 0x64, 9]);
        let pending = dec.take_pending();
        assert_eq!(pending.len(), 3);
        assert_eq!(dec.pending_bytes(), 0);
    }
}
