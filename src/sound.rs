//! local audio plumbing: interleaved sample blocks, input grouping and the
//! metronome click
pub mod click_track;
pub mod input_group;
pub mod sample_buffer;
