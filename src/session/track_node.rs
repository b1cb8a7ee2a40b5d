//! per remote user channel decode and playout state
//!
//! One node per (username, channel name).  The node owns its decoder and
//! the bytes downloaded for it; mixing only borrows decoded samples.  A
//! corrupt stream degrades this node to silence and nothing else.
use crate::codec::decoder::ChunkDecoder;
use crate::common::box_error::BoxError;
use log::debug;
use std::fmt;

pub struct RemoteTrackNode {
    user: String,
    channel_name: String,
    channels: usize,
    sample_rate: u32,
    decoder: ChunkDecoder,
    playout: Vec<f32>, // decoded interleaved stereo waiting to be mixed
    interval_bytes: usize,
    expected_bytes: usize, // size of the last complete interval
}

impl RemoteTrackNode {
    pub fn new(
        user: &str,
        channel_name: &str,
        channels: usize,
        sample_rate: u32,
    ) -> Result<RemoteTrackNode, BoxError> {
        Ok(RemoteTrackNode {
            user: String::from(user),
            channel_name: String::from(channel_name),
            channels: channels,
            sample_rate: sample_rate,
            decoder: ChunkDecoder::new(sample_rate, channels)?,
            playout: vec![],
            interval_bytes: 0,
            expected_bytes: 0,
        })
    }
    pub fn user(&self) -> &str {
        &self.user
    }
    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }
    pub fn set_channel_name(&mut self, name: &str) -> () {
        self.channel_name = String::from(name);
    }
    pub fn channels(&self) -> usize {
        self.channels
    }
    /// append downloaded compressed bytes.  First/last markers bound one
    /// interval's worth of chunks for progress tracking.
    pub fn feed(&mut self, bytes: &[u8], is_first: bool, is_last: bool) -> () {
        if is_first {
            self.interval_bytes = 0;
        }
        self.decoder.put_bytes(bytes);
        self.interval_bytes += bytes.len();
        if is_last {
            // the finished interval sizes the progress estimate for the next
            self.expected_bytes = self.interval_bytes;
        }
    }
    /// the network layer said the interval is complete without a last-part
    /// flagged chunk; finalizes the expected-bytes figure the same way
    pub fn finish_interval(&mut self) -> () {
        self.expected_bytes = self.interval_bytes;
    }
    /// buffering percentage against the last complete interval; None until
    /// a full interval has landed to size the estimate
    pub fn download_progress(&self) -> Option<u8> {
        if self.expected_bytes == 0 {
            return None;
        }
        Some((self.interval_bytes * 100 / self.expected_bytes).min(100) as u8)
    }
    /// channel-updated handling: the codec state is fixed to one channel
    /// shape, so a shape change gets a fresh decoder.  Buffered audio and
    /// undecoded bytes survive the swap.
    pub fn reconfigure(&mut self, channels: usize) -> Result<(), BoxError> {
        if channels == self.channels {
            return Ok(());
        }
        let pending = self.decoder.take_pending();
        let mut decoder = ChunkDecoder::new(self.sample_rate, channels)?;
        decoder.put_bytes(&pending);
        self.decoder = decoder;
        self.channels = channels;
        debug!("track node {} reconfigured to {} channels", self, channels);
        Ok(())
    }
    pub fn set_sample_rate(&mut self, sample_rate: u32) -> Result<(), BoxError> {
        if sample_rate == self.sample_rate {
            return Ok(());
        }
        let pending = self.decoder.take_pending();
        let mut decoder = ChunkDecoder::new(sample_rate, self.channels)?;
        decoder.put_bytes(&pending);
        self.decoder = decoder;
        self.sample_rate = sample_rate;
        Ok(())
    }
    /// throw away downloaded-but-unconsumed bytes
    pub fn discard_pending(&mut self) -> () {
        self.decoder.clear();
        self.interval_bytes = 0;
    }
    pub fn clear_playout(&mut self) -> () {
        self.playout.clear();
    }
    pub fn buffered_frames(&self) -> usize {
        self.playout.len() / 2
    }
    /// pull exactly `frames` interleaved stereo frames for mixing.  Decode
    /// failures and underruns come back zero-filled so one bad remote
    /// stream never halts the mix.
    pub fn decode(&mut self, frames: usize) -> Vec<f32> {
        if self.buffered_frames() < frames {
            let want = frames - self.buffered_frames();
            let decoded = self.decoder.decode_frames(want);
            match self.channels {
                1 => {
                    for s in decoded {
                        self.playout.push(s);
                        self.playout.push(s);
                    }
                }
                _ => self.playout.extend_from_slice(&decoded),
            }
        }
        let take = (frames * 2).min(self.playout.len());
        let mut out: Vec<f32> = self.playout.drain(..take).collect();
        out.resize(frames * 2, 0.0);
        out
    }
}

impl fmt::Display for RemoteTrackNode {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.user, self.channel_name)
    }
}

#[cfg(test)]
mod test_track_node {
    use super::*;
    use crate::codec::encoder::ChunkEncoder;

    #[test]
    fn empty_node_plays_silence() {
        let mut node = RemoteTrackNode::new("alice", "guitar", 1, 48000).unwrap();
        let out = node.decode(128);
        assert_eq!(out.len(), 256);
        assert!(out.iter().all(|s| *s == 0.0));
    }
    #[test]
    fn truncated_chunk_plays_silence() {
        // a length prefix with no body never reaches the codec
        let mut node = RemoteTrackNode::new("alice", "guitar", 1, 48000).unwrap();
        node.feed(&[0x01, 0x00, 5, 5, 5], true, false);
        let out = node.decode(128);
        assert_eq!(out.len(), 256);
        assert!(out.iter().all(|s| *s == 0.0));
    }
    #[test]
    fn mono_upmixes_to_stereo() {
        let mut enc = ChunkEncoder::new(48000, 1).unwrap();
        let mut node = RemoteTrackNode::new("bob", "bass", 1, 48000).unwrap();
        enc.put_frames(&vec![0.5; 480]);
        node.feed(&enc.take_bytes(), true, true);
        let out = node.decode(480);
        assert_eq!(out.len(), 960);
        // left and right carry the same decoded sample
        assert_eq!(out[100], out[101]);
    }
    #[test]
    fn progress_tracks_last_complete_interval() {
        let mut node = RemoteTrackNode::new("alice", "guitar", 1, 48000).unwrap();
        assert_eq!(node.download_progress(), None);
        node.feed(&[0u8; 100], true, false);
        node.feed(&[0u8; 100], false, true);
        assert_eq!(node.download_progress(), Some(100));
        node.feed(&[0u8; 100], true, false);
        assert_eq!(node.download_progress(), Some(50));
    }
    #[test]
    fn finish_interval_matches_last_part_flag() {
        let mut node = RemoteTrackNode::new("alice", "guitar", 1, 48000).unwrap();
        node.feed(&[0u8; 100], true, false);
        node.feed(&[0u8; 100], false, false);
        assert_eq!(node.download_progress(), None);
        node.finish_interval();
        assert_eq!(node.download_progress(), Some(100));
        node.feed(&[0u8; 100], true, false);
        assert_eq!(node.download_progress(), Some(50));
    }
    #[test]
    fn reconfigure_keeps_buffered_audio() {
        let mut enc = ChunkEncoder::new(48000, 1).unwrap();
        let mut node = RemoteTrackNode::new("bob", "keys", 1, 48000).unwrap();
        enc.put_frames(&vec![0.5; 480]);
        node.feed(&enc.take_bytes(), true, true);
        // pull half into the playout buffer, then reshape
        let _ = node.decode(240);
        node.reconfigure(2).unwrap();
        assert_eq!(node.channels(), 2);
        assert!(node.buffered_frames() > 0);
    }
}
