//! groups local input channels that get encoded together as one logical
//! channel (a stereo pair, a mono instrument, a midi synth track)
use super::sample_buffer::SamplesBuffer;
use log::error;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputSourceKind {
    /// live audio input spanning `channels` device channels
    Audio { channels: usize },
    Midi,
    /// no live source, kept around for stereo effect processing on silence
    NoInput,
}

#[derive(Debug, Clone)]
pub struct InputSource {
    pub device_channel: usize,
    pub kind: InputSourceKind,
    pub muted: bool,
}

impl InputSource {
    pub fn audio(device_channel: usize, channels: usize) -> InputSource {
        InputSource {
            device_channel: device_channel,
            kind: InputSourceKind::Audio { channels: channels },
            muted: false,
        }
    }
    pub fn midi() -> InputSource {
        InputSource {
            device_channel: 0,
            kind: InputSourceKind::Midi,
            muted: false,
        }
    }
    pub fn no_input() -> InputSource {
        InputSource {
            device_channel: 0,
            kind: InputSourceKind::NoInput,
            muted: false,
        }
    }
}

pub struct InputGroup {
    index: usize,
    inputs: Vec<InputSource>,
    transmitting: bool,
}

impl InputGroup {
    pub fn new(index: usize) -> InputGroup {
        InputGroup {
            index: index,
            inputs: vec![],
            transmitting: true,
        }
    }
    pub fn index(&self) -> usize {
        self.index
    }
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }
    pub fn add_input(&mut self, input: InputSource) -> () {
        self.inputs.push(input);
    }
    pub fn remove_input(&mut self, idx: usize) -> () {
        if idx < self.inputs.len() {
            self.inputs.remove(idx);
        } else {
            error!("the input track was not removed!");
        }
    }
    pub fn set_input_muted(&mut self, idx: usize, muted: bool) -> () {
        if idx < self.inputs.len() {
            self.inputs[idx].muted = muted;
        }
    }
    pub fn is_transmitting(&self) -> bool {
        self.transmitting
    }
    pub fn set_transmitting(&mut self, transmitting: bool) -> () {
        self.transmitting = transmitting;
    }
    /// sum all non-muted member inputs into `out`, straight sample addition.
    /// Gain staging belongs to the mixing stage, not here.  Mono members fan
    /// out to every output channel; multi-channel members map channel-wise.
    pub fn mix_grouped_inputs(
        &self,
        device: &SamplesBuffer,
        from_frame: usize,
        out: &mut SamplesBuffer,
    ) -> () {
        for input in &self.inputs {
            if input.muted {
                continue;
            }
            let channels = match input.kind {
                InputSourceKind::Audio { channels } => channels,
                // midi and no-input members produce no audio at this layer
                _ => continue,
            };
            for f in 0..out.frames() {
                if channels == 1 {
                    let v = device.get(from_frame + f, input.device_channel);
                    for c in 0..out.channels() {
                        out.add(f, c, v);
                    }
                } else {
                    for c in 0..channels.min(out.channels()) {
                        let v = device.get(from_frame + f, input.device_channel + c);
                        out.add(f, c, v);
                    }
                }
            }
        }
    }
    /// how many channels the encoder for this group should run with
    pub fn max_input_channels_for_encoding(&self) -> usize {
        if self.inputs.len() > 1 {
            return 2; // stereo encoding
        }
        match self.inputs.first() {
            Some(input) => match input.kind {
                InputSourceKind::Midi => 2, // just one midi track, use stereo encoding
                InputSourceKind::Audio { channels } => channels,
                InputSourceKind::NoInput => 2, // allow stereo effect processing on silence
            },
            None => 0, // no channels to encode
        }
    }
}

#[cfg(test)]
mod test_input_group {
    use super::*;

    #[test]
    fn encoding_channel_rules() {
        // It should resolve the encoder channel count from its members
        let mut group = InputGroup::new(0);
        assert_eq!(group.max_input_channels_for_encoding(), 0);
        group.add_input(InputSource::audio(0, 1));
        assert_eq!(group.max_input_channels_for_encoding(), 1);
        group.add_input(InputSource::audio(1, 1));
        assert_eq!(group.max_input_channels_for_encoding(), 2);
    }
    #[test]
    fn midi_and_no_input_are_stereo() {
        let mut group = InputGroup::new(0);
        group.add_input(InputSource::midi());
        assert_eq!(group.max_input_channels_for_encoding(), 2);
        let mut group = InputGroup::new(1);
        group.add_input(InputSource::no_input());
        assert_eq!(group.max_input_channels_for_encoding(), 2);
    }
    #[test]
    fn native_channels_for_single_audio() {
        let mut group = InputGroup::new(0);
        group.add_input(InputSource::audio(0, 2));
        assert_eq!(group.max_input_channels_for_encoding(), 2);
    }
    #[test]
    fn mix_is_straight_addition() {
        let mut group = InputGroup::new(0);
        group.add_input(InputSource::audio(0, 1));
        group.add_input(InputSource::audio(1, 1));
        let device = SamplesBuffer::from_interleaved(2, &[0.25, 0.5, 0.25, 0.5]);
        let mut out = SamplesBuffer::new(2, 2);
        group.mix_grouped_inputs(&device, 0, &mut out);
        // both mono members fan out to both channels and sum
        assert_eq!(out.get(0, 0), 0.75);
        assert_eq!(out.get(0, 1), 0.75);
        assert_eq!(out.get(1, 0), 0.75);
    }
    #[test]
    fn muted_member_is_skipped() {
        let mut group = InputGroup::new(0);
        group.add_input(InputSource::audio(0, 1));
        group.set_input_muted(0, true);
        let device = SamplesBuffer::from_interleaved(1, &[0.5, 0.5]);
        let mut out = SamplesBuffer::new(2, 2);
        group.mix_grouped_inputs(&device, 0, &mut out);
        assert_eq!(out.get(0, 0), 0.0);
    }
    #[test]
    fn mix_honors_frame_offset() {
        let mut group = InputGroup::new(0);
        group.add_input(InputSource::audio(0, 1));
        let device = SamplesBuffer::from_interleaved(1, &[0.1, 0.2, 0.3, 0.4]);
        let mut out = SamplesBuffer::new(1, 2);
        group.mix_grouped_inputs(&device, 2, &mut out);
        assert_eq!(out.get(0, 0), 0.3);
        assert_eq!(out.get(1, 0), 0.4);
    }
}
