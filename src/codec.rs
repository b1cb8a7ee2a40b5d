//! lossy codec adapters behind a byte-stream interface
//!
//! Compressed audio crosses the network as chunks of length-prefixed opus
//! packets.  The encoder side feeds raw frames in and pulls chunk bytes
//! out; the decoder side feeds chunk bytes in and pulls decoded frames
//! out.  Neither side assumes packet boundaries line up with chunk
//! boundaries.
use crate::common::box_error::BoxError;
use simple_error::bail;

pub mod decoder;
pub mod encoder;

/// bytes in the big-endian packet length prefix
pub const PACKET_LEN_BYTES: usize = 2;
/// worst case opus packet is ~1275 bytes, leave headroom
pub const MAX_PACKET_BYTES: usize = 4000;

/// opus frames are fixed at 10 msec
pub fn frames_per_packet(sample_rate: u32) -> usize {
    (sample_rate / 100) as usize
}

pub fn opus_channels(channels: usize) -> Result<opus::Channels, BoxError> {
    match channels {
        1 => Ok(opus::Channels::Mono),
        2 => Ok(opus::Channels::Stereo),
        _ => bail!("unsupported channel count: {}", channels),
    }
}

#[cfg(test)]
mod test_codec {
    use super::*;

    #[test]
    fn packet_frames() {
        assert_eq!(frames_per_packet(48000), 480);
    }
    #[test]
    fn channel_mapping() {
        assert!(opus_channels(1).is_ok());
        assert!(opus_channels(2).is_ok());
        assert!(opus_channels(3).is_err());
    }
}
