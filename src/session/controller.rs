//! the session controller: hub of the interval/beat scheduler
//!
//! The audio callback drives [`SessionController::process`] once per fixed
//! size block.  The network receive path calls the `on_*` methods
//! concurrently.  The main lock guards the beat grid, the scheduled change
//! queue and the track node table; it is held for short critical sections
//! and never across an encode or decode.  The encoder table lives behind
//! its own lock inside the encode worker pipeline.
//!
//! Tempo, signature, transmit flips and encoder shape changes never land
//! mid-interval: they queue up and apply atomically when the position
//! counter crosses the interval boundary.
use crate::common::box_error::BoxError;
use crate::sound::click_track::ClickTrack;
use crate::sound::input_group::{InputGroup, InputSource};
use crate::sound::sample_buffer::SamplesBuffer;
use log::{debug, error, info};
use std::collections::{HashMap, HashSet};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;

use super::beat_grid::BeatGrid;
use super::encode_worker::{spawn_encode_worker, EncodeJob, EncoderTable, JobQueue};
use super::events::{ChannelInfo, SessionNotification};
use super::scheduled::{ChangeQueue, ScheduledEvent};
use super::track_node::RemoteTrackNode;

/// complete intervals of lead-in before chunks are announced as sendable.
/// Encoders need at least one full interval so their stream state is
/// meaningful to a newly joined session.
pub const TOTAL_PREPARED_INTERVALS: u32 = 2;

const DEFAULT_BPM: u16 = 120;
const DEFAULT_BPI: u16 = 16;
const DEFAULT_SAMPLE_RATE: u32 = 48000;

// server robots that should not show up as players
const BOT_NAMES: [&str; 4] = ["ninbot", "ninjamer.com", "mutantlab.com", "jambot"];

/// lead-in state before this client starts transmitting.  Monotonic: once
/// preparation starts it never regresses to NotPreparing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransmitPrepare {
    NotPreparing,
    Preparing(u32),
    Prepared,
}

struct GroupState {
    group: InputGroup,
    /// encoder channel shape currently in effect; shape changes wait for
    /// the interval boundary
    enc_channels: usize,
    /// transmit flip waiting for the interval boundary
    pending_xmit: Option<bool>,
}

struct SessionState {
    running: bool,
    grid: BeatGrid,
    queue: ChangeQueue,
    groups: HashMap<usize, GroupState>,
    tracks: HashMap<String, Arc<Mutex<RemoteTrackNode>>>,
    prepare: TransmitPrepare,
    click: ClickTrack,
    // lives for the whole process, not per connection
    chat_blocked: HashSet<String>,
}

pub struct SessionController {
    state: Mutex<SessionState>,
    encoders: Arc<Mutex<EncoderTable>>,
    jobs: Arc<JobQueue>,
    worker: Mutex<Option<JoinHandle<()>>>,
    notify_tx: mpsc::Sender<SessionNotification>,
}

impl SessionController {
    /// build the controller and spawn its encode worker.  All
    /// notifications (chunks for the network, events for the U/X) come out
    /// through `notify_tx`; the core never blocks on whoever consumes them.
    pub fn new(
        notify_tx: mpsc::Sender<SessionNotification>,
    ) -> Result<Arc<SessionController>, BoxError> {
        let encoders: Arc<Mutex<EncoderTable>> = Arc::new(Mutex::new(HashMap::new()));
        let jobs = Arc::new(JobQueue::new());
        let worker = spawn_encode_worker(jobs.clone(), encoders.clone(), notify_tx.clone())?;
        Ok(Arc::new(SessionController {
            state: Mutex::new(SessionState {
                running: false,
                grid: BeatGrid::new(DEFAULT_BPM, DEFAULT_BPI, DEFAULT_SAMPLE_RATE),
                queue: ChangeQueue::new(),
                groups: HashMap::new(),
                tracks: HashMap::new(),
                prepare: TransmitPrepare::NotPreparing,
                click: ClickTrack::new(DEFAULT_SAMPLE_RATE),
                chat_blocked: HashSet::new(),
            }),
            encoders: encoders,
            jobs: jobs,
            worker: Mutex::new(Some(worker)),
            notify_tx: notify_tx,
        }))
    }
    pub fn is_running(&self) -> bool {
        self.state.lock().unwrap().running
    }
    /// join a session at the server's current tempo and signature
    pub fn start(&self, bpm: u16, bpi: u16, sample_rate: u32) -> () {
        let mut st = self.state.lock().unwrap();
        st.running = true;
        st.grid = BeatGrid::new(bpm, bpi, sample_rate);
        st.queue.clear();
        st.tracks.clear();
        st.prepare = TransmitPrepare::NotPreparing;
        st.click.set_sample_rate(sample_rate);
        info!("session started: bpm {} bpi {} at {}", bpm, bpi, sample_rate);
    }
    /// leave the session: pending changes are discarded, encoders closed,
    /// remote tracks destroyed.  Safe to call twice.
    pub fn stop(&self) -> () {
        let channels: Vec<usize>;
        {
            let mut st = self.state.lock().unwrap();
            if !st.running {
                return; // idempotent
            }
            st.running = false;
            st.queue.clear();
            st.tracks.clear();
            st.prepare = TransmitPrepare::NotPreparing;
            channels = st.groups.keys().cloned().collect();
        }
        // stale raw buffers would hit the create-on-demand path and
        // resurrect an encoder after the close; purge them first, then let
        // a Remove per channel sweep up anything the worker was mid-way
        // through
        self.jobs.purge_blocks();
        for channel in channels {
            self.jobs.push(EncodeJob::Remove { channel: channel });
        }
        self.encoders.lock().unwrap().clear();
        self.emit(SessionNotification::Stopped);
        info!("session stopped");
    }
    /// discard downloaded-but-unconsumed interval data and rewind the
    /// position counter; optionally keep already decoded audio around for
    /// late-join mix continuity
    pub fn reset(&self, keep_recent_intervals: bool) -> () {
        let tracks: Vec<Arc<Mutex<RemoteTrackNode>>>;
        {
            let mut st = self.state.lock().unwrap();
            st.grid.reset_position();
            tracks = st.tracks.values().cloned().collect();
        }
        for track in tracks {
            let mut node = track.lock().unwrap();
            node.discard_pending();
            if !keep_recent_intervals {
                node.clear_playout();
            }
        }
    }

    // ----- beat grid access -----

    pub fn bpm(&self) -> u16 {
        self.state.lock().unwrap().grid.bpm()
    }
    pub fn bpi(&self) -> u16 {
        self.state.lock().unwrap().grid.bpi()
    }
    pub fn samples_in_interval(&self) -> u64 {
        self.state.lock().unwrap().grid.samples_in_interval()
    }
    pub fn interval_position(&self) -> u64 {
        self.state.lock().unwrap().grid.interval_position()
    }

    // ----- tempo / signature changes: enqueue only, never mutate direct -----

    /// vote for a new tempo.  The local grid change waits for the interval
    /// boundary; the vote itself rides the chat path to the server.
    pub fn vote_bpm(&self, bpm: u16) -> () {
        self.state
            .lock()
            .unwrap()
            .queue
            .enqueue(ScheduledEvent::BpmChange(bpm));
        self.emit(SessionNotification::ChatSend {
            message: format!("!vote bpm {}", bpm),
        });
    }
    pub fn vote_bpi(&self, bpi: u16) -> () {
        self.state
            .lock()
            .unwrap()
            .queue
            .enqueue(ScheduledEvent::BpiChange(bpi));
        self.emit(SessionNotification::ChatSend {
            message: format!("!vote bpi {}", bpi),
        });
    }
    /// authoritative tempo set; still applies only at the interval start so
    /// the grid never shifts mid-interval
    pub fn set_bpm(&self, bpm: u16) -> () {
        self.state
            .lock()
            .unwrap()
            .queue
            .enqueue(ScheduledEvent::BpmChange(bpm));
    }
    pub fn on_server_bpm_changed(&self, bpm: u16) -> () {
        self.state
            .lock()
            .unwrap()
            .queue
            .enqueue(ScheduledEvent::BpmChange(bpm));
    }
    pub fn on_server_bpi_changed(&self, bpi: u16) -> () {
        self.state
            .lock()
            .unwrap()
            .queue
            .enqueue(ScheduledEvent::BpiChange(bpi));
    }
    pub fn schedule_encoder_change(&self, channel: usize) -> () {
        self.state
            .lock()
            .unwrap()
            .queue
            .enqueue(ScheduledEvent::InputShapeChange(channel));
    }
    /// flip a channel's outgoing stream on or off at the next boundary so
    /// it never starts or stops mid-interval
    pub fn schedule_xmit_change(&self, channel: usize, transmitting: bool) -> () {
        let mut st = self.state.lock().unwrap();
        if let Some(gs) = st.groups.get_mut(&channel) {
            gs.pending_xmit = Some(transmitting);
        }
    }

    /// the audio driver renegotiated; the grid is recomputed right away and
    /// every encoder gets a fresh configuration through the job queue
    pub fn set_sample_rate(&self, sample_rate: u32) -> () {
        let mut recreates: Vec<(usize, usize)> = vec![];
        let tracks: Vec<Arc<Mutex<RemoteTrackNode>>>;
        {
            let mut st = self.state.lock().unwrap();
            st.grid.set_sample_rate(sample_rate);
            st.click.set_sample_rate(sample_rate);
            for (idx, gs) in st.groups.iter() {
                if gs.enc_channels > 0 {
                    recreates.push((*idx, gs.enc_channels));
                }
            }
            tracks = st.tracks.values().cloned().collect();
        }
        for (channel, channels) in recreates {
            // close the open chunk before the encoder is replaced so the
            // in-progress interval still gets its last-part marker
            self.jobs.push(EncodeJob::FinishInterval { channel: channel });
            self.jobs.push(EncodeJob::Recreate {
                channel: channel,
                channels: channels,
                sample_rate: sample_rate,
            });
        }
        for track in tracks {
            if let Err(e) = track.lock().unwrap().set_sample_rate(sample_rate) {
                error!("decoder recreate failed after rate change: {}", e);
            }
        }
        info!("sample rate changed to {}", sample_rate);
    }

    // ----- local input groups -----

    /// group membership changes are immediate; only the resulting encoder
    /// shape change waits for the boundary
    pub fn add_input(&self, group_index: usize, input: InputSource) -> () {
        let mut st = self.state.lock().unwrap();
        let gs = st.groups.entry(group_index).or_insert(GroupState {
            group: InputGroup::new(group_index),
            enc_channels: 0,
            pending_xmit: None,
        });
        gs.group.add_input(input);
        let desired = gs.group.max_input_channels_for_encoding();
        if gs.enc_channels == 0 {
            // first member, nothing is encoding yet
            gs.enc_channels = desired;
        } else if desired != gs.enc_channels {
            debug!(
                "channel {} shape {} -> {} at next interval",
                group_index, gs.enc_channels, desired
            );
            st.queue
                .enqueue(ScheduledEvent::InputShapeChange(group_index));
        }
    }
    pub fn remove_input(&self, group_index: usize, input_idx: usize) -> () {
        let mut st = self.state.lock().unwrap();
        let mut drop_group = false;
        let mut reshape = false;
        if let Some(gs) = st.groups.get_mut(&group_index) {
            gs.group.remove_input(input_idx);
            if gs.group.input_count() == 0 {
                drop_group = true;
            } else if gs.group.max_input_channels_for_encoding() != gs.enc_channels {
                reshape = true;
            }
        }
        if reshape {
            st.queue
                .enqueue(ScheduledEvent::InputShapeChange(group_index));
        }
        if drop_group {
            st.groups.remove(&group_index);
            drop(st);
            // the encoder may hold an open chunk; close it before it goes
            // away so the channel's final interval gets its last-part marker
            self.jobs.push(EncodeJob::FinishInterval {
                channel: group_index,
            });
            self.jobs.push(EncodeJob::Remove {
                channel: group_index,
            });
        }
    }
    pub fn set_input_muted(&self, group_index: usize, input_idx: usize, muted: bool) -> () {
        let mut st = self.state.lock().unwrap();
        if let Some(gs) = st.groups.get_mut(&group_index) {
            gs.group.set_input_muted(input_idx, muted);
        }
    }
    /// live encoders on the worker side, for status display
    pub fn encoder_count(&self) -> usize {
        self.encoders.lock().unwrap().len()
    }

    // ----- metronome -----

    pub fn set_metronome_muted(&self, muted: bool) -> () {
        self.state.lock().unwrap().click.set_mute(muted);
    }
    pub fn set_metronome_gain(&self, gain: f64) -> () {
        self.state.lock().unwrap().click.set_gain(gain);
    }
    pub fn set_metronome_beats_per_accent(&self, beats_per_accent: u16) -> () {
        self.state
            .lock()
            .unwrap()
            .click
            .set_beats_per_accent(beats_per_accent);
    }

    // ----- preparation for transmission -----

    /// begin the lead-in.  After TOTAL_PREPARED_INTERVALS boundaries the
    /// controller flips to Prepared and signals once.
    pub fn start_transmission(&self) -> () {
        {
            let mut st = self.state.lock().unwrap();
            if st.prepare != TransmitPrepare::NotPreparing {
                return; // monotonic, never restart the lead-in
            }
            st.prepare = TransmitPrepare::Preparing(0);
        }
        self.emit(SessionNotification::PreparingTransmission);
    }
    pub fn is_prepared_for_transmit(&self) -> bool {
        self.state.lock().unwrap().prepare == TransmitPrepare::Prepared
    }

    // ----- chat -----

    pub fn send_chat_message(&self, message: &str) -> () {
        self.emit(SessionNotification::ChatSend {
            message: String::from(message),
        });
    }
    pub fn on_chat_message(&self, user: &str, message: &str) -> () {
        if self.user_is_blocked_in_chat(user) {
            debug!("suppressing chat from blocked user {}", user);
            return;
        }
        self.emit(SessionNotification::ChatReceived {
            user: String::from(user),
            message: String::from(message),
        });
    }
    pub fn block_user_in_chat(&self, user: &str) -> () {
        let inserted = self
            .state
            .lock()
            .unwrap()
            .chat_blocked
            .insert(String::from(user));
        if inserted {
            self.emit(SessionNotification::UserBlockedInChat(String::from(user)));
        }
    }
    pub fn unblock_user_in_chat(&self, user: &str) -> () {
        let removed = self.state.lock().unwrap().chat_blocked.remove(user);
        if removed {
            self.emit(SessionNotification::UserUnblockedInChat(String::from(
                user,
            )));
        }
    }
    pub fn user_is_blocked_in_chat(&self, user: &str) -> bool {
        self.state.lock().unwrap().chat_blocked.contains(user)
    }
    pub fn user_is_bot(user: &str) -> bool {
        let lower = user.to_lowercase();
        BOT_NAMES.iter().any(|b| lower.contains(b))
    }

    // ----- remote channel lifecycle -----

    fn channel_key(user: &str, channel_name: &str) -> String {
        // stable per user per channel; network channel indices get reused
        // across reconnects and cannot key anything
        format!("{}/{}", user, channel_name)
    }
    pub fn remote_track_count(&self) -> usize {
        self.state.lock().unwrap().tracks.len()
    }
    pub fn has_remote_track(&self, user: &str, channel_name: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .tracks
            .contains_key(&Self::channel_key(user, channel_name))
    }
    pub fn on_user_entered(&self, user: &str) -> () {
        if Self::user_is_bot(user) {
            return;
        }
        self.emit(SessionNotification::UserEntered(String::from(user)));
    }
    /// a user left: every one of their track nodes goes away along with
    /// any buffered bytes
    pub fn on_user_exited(&self, user: &str) -> () {
        let prefix = format!("{}/", user);
        {
            let mut st = self.state.lock().unwrap();
            let keys: Vec<String> = st
                .tracks
                .keys()
                .filter(|k| k.starts_with(&prefix))
                .cloned()
                .collect();
            for key in keys {
                st.tracks.remove(&key);
                debug!("removed track {} on user exit", key);
            }
        }
        if !Self::user_is_bot(user) {
            self.emit(SessionNotification::UserExited(String::from(user)));
        }
    }
    pub fn on_user_channel_created(&self, user: &str, channel: ChannelInfo) -> () {
        let sample_rate = self.state.lock().unwrap().grid.sample_rate();
        // codec init happens outside the main lock
        match RemoteTrackNode::new(user, &channel.name, channel.channels, sample_rate) {
            Ok(node) => {
                let key = Self::channel_key(user, &channel.name);
                // collisions overwrite: the fresh node wins
                self.state
                    .lock()
                    .unwrap()
                    .tracks
                    .insert(key, Arc::new(Mutex::new(node)));
                self.emit(SessionNotification::ChannelAdded {
                    user: String::from(user),
                    channel: channel,
                });
            }
            Err(e) => {
                error!("could not create track node for {}: {}", user, e);
            }
        }
    }
    /// channel metadata changed (rename or shape); buffered audio survives
    pub fn on_user_channel_updated(&self, user: &str, channel_name: &str, channel: ChannelInfo) -> () {
        let track: Option<Arc<Mutex<RemoteTrackNode>>>;
        {
            let mut st = self.state.lock().unwrap();
            let old_key = Self::channel_key(user, channel_name);
            track = st.tracks.remove(&old_key);
            if let Some(ref arc) = track {
                let new_key = Self::channel_key(user, &channel.name);
                st.tracks.insert(new_key, arc.clone());
            }
        }
        let arc = match track {
            Some(arc) => arc,
            None => return, // unknown channel reference is a no-op
        };
        {
            let mut node = arc.lock().unwrap();
            node.set_channel_name(&channel.name);
            if let Err(e) = node.reconfigure(channel.channels) {
                error!("track reconfigure failed for {}: {}", user, e);
            }
        }
        self.emit(SessionNotification::ChannelUpdated {
            user: String::from(user),
            channel: channel,
        });
    }
    pub fn on_user_channel_removed(&self, user: &str, channel_name: &str) -> () {
        let removed = self
            .state
            .lock()
            .unwrap()
            .tracks
            .remove(&Self::channel_key(user, channel_name));
        if removed.is_some() {
            self.emit(SessionNotification::ChannelRemoved {
                user: String::from(user),
                channel: String::from(channel_name),
            });
        }
        // removal of a channel never created is a no-op, not an error
    }
    /// downloaded compressed bytes for one remote channel.  Arrival order
    /// across channels carries no guarantee; each node is independent.
    pub fn on_audio_chunk(
        &self,
        user: &str,
        channel_name: &str,
        bytes: &[u8],
        is_first: bool,
        is_last: bool,
    ) -> () {
        let arc = {
            let st = self.state.lock().unwrap();
            match st.tracks.get(&Self::channel_key(user, channel_name)) {
                Some(arc) => arc.clone(),
                None => return, // unknown channel reference is a no-op
            }
        };
        let progress = {
            let mut node = arc.lock().unwrap();
            node.feed(bytes, is_first, is_last);
            node.download_progress()
        };
        if let Some(percent) = progress {
            self.emit(SessionNotification::ChunkDownloadProgress {
                user: String::from(user),
                channel: String::from(channel_name),
                percent: percent,
            });
        }
        if is_last {
            self.emit(SessionNotification::ChunkFullyDownloaded {
                user: String::from(user),
                channel: String::from(channel_name),
            });
        }
    }
    /// the network layer declared the channel's interval complete without a
    /// last-part flagged chunk (some servers signal completion separately)
    pub fn on_interval_downloaded(&self, user: &str, channel_name: &str) -> () {
        let arc = {
            let st = self.state.lock().unwrap();
            match st.tracks.get(&Self::channel_key(user, channel_name)) {
                Some(arc) => arc.clone(),
                None => return, // unknown channel reference is a no-op
            }
        };
        arc.lock().unwrap().finish_interval();
        self.emit(SessionNotification::ChunkFullyDownloaded {
            user: String::from(user),
            channel: String::from(channel_name),
        });
    }

    // ----- the per-block engine -----

    /// called once per fixed size audio block by the audio callback.  In
    /// order: mix transmitting input groups and hand them to the encode
    /// pipeline, advance the beat grid (splitting the block at an interval
    /// boundary), apply everything scheduled for the boundary, then mix
    /// every remote track into the output.
    pub fn process(&self, input: &SamplesBuffer, out_left: &mut [f32], out_right: &mut [f32]) -> () {
        for s in out_left.iter_mut() {
            *s = 0.0;
        }
        for s in out_right.iter_mut() {
            *s = 0.0;
        }
        let frames = out_left.len().min(out_right.len());
        let mut notes: Vec<SessionNotification> = vec![];
        let mut tracks: Vec<Arc<Mutex<RemoteTrackNode>>> = vec![];
        {
            let mut st = self.state.lock().unwrap();
            if !st.running {
                return;
            }
            let mut offset: usize = 0;
            while offset < frames {
                let (consumed, boundary) = st.grid.advance((frames - offset) as u64);
                let consumed = consumed as usize;
                if consumed > 0 {
                    self.encode_segment(&st, input, offset, consumed);
                    // a large block can span several beats
                    while let Some(beat) = st.grid.crossed_beat() {
                        notes.push(SessionNotification::BeatChanged(beat));
                    }
                }
                if boundary {
                    self.handle_new_interval(&mut st, &mut notes);
                }
                offset += consumed;
            }
            let beat = st.grid.current_beat();
            st.click.mix_into(beat, out_left, out_right);
            tracks.extend(st.tracks.values().cloned());
        }
        // remote playback mixes outside the main lock; each node is locked
        // only around its own decode
        for track in tracks {
            let buf = track.lock().unwrap().decode(frames);
            for i in 0..frames {
                out_left[i] += buf[2 * i];
                out_right[i] += buf[2 * i + 1];
            }
        }
        for note in notes {
            self.emit(note);
        }
    }

    /// mix and enqueue one contiguous run of frames that stays inside the
    /// current interval
    fn encode_segment(
        &self,
        st: &SessionState,
        input: &SamplesBuffer,
        offset: usize,
        frames: usize,
    ) -> () {
        if st.prepare != TransmitPrepare::Prepared {
            return;
        }
        let sample_rate = st.grid.sample_rate();
        for (idx, gs) in st.groups.iter() {
            if !gs.group.is_transmitting() || gs.enc_channels == 0 {
                continue;
            }
            let mut mixed = SamplesBuffer::new(gs.enc_channels, frames);
            gs.group.mix_grouped_inputs(input, offset, &mut mixed);
            // non-blocking: a full queue sheds the oldest buffer, the
            // callback never waits on the codec
            self.jobs.push(EncodeJob::Block {
                channel: *idx,
                channels: gs.enc_channels,
                sample_rate: sample_rate,
                samples: mixed.into_data(),
            });
        }
    }

    /// the interval boundary: close outgoing chunks, flip transmit flags,
    /// apply scheduled changes atomically, restart the position counter
    fn handle_new_interval(
        &self,
        st: &mut SessionState,
        notes: &mut Vec<SessionNotification>,
    ) -> () {
        // close the open chunk of every channel that was transmitting this
        // interval; the flush rides the same queue as the raw buffers so
        // per channel ordering holds
        if st.prepare == TransmitPrepare::Prepared {
            for (idx, gs) in st.groups.iter() {
                if gs.group.is_transmitting() && gs.enc_channels > 0 {
                    self.jobs.push(EncodeJob::FinishInterval { channel: *idx });
                }
            }
        }
        // transmit flips land exactly here, never mid-interval
        for (idx, gs) in st.groups.iter_mut() {
            if let Some(xmit) = gs.pending_xmit.take() {
                if xmit != gs.group.is_transmitting() {
                    gs.group.set_transmitting(xmit);
                    notes.push(SessionNotification::ChannelXmitChanged {
                        channel: *idx,
                        transmitting: xmit,
                    });
                }
            }
        }
        // scheduled events apply as one atomic step
        let applied = st.queue.apply_all(&mut st.grid);
        if let Some(bpm) = applied.bpm {
            notes.push(SessionNotification::BpmChanged(bpm));
        }
        if let Some(bpi) = applied.bpi {
            notes.push(SessionNotification::BpiChanged(bpi));
        }
        let sample_rate = st.grid.sample_rate();
        for channel in applied.reshaped {
            if let Some(gs) = st.groups.get_mut(&channel) {
                gs.enc_channels = gs.group.max_input_channels_for_encoding();
                if gs.enc_channels > 0 {
                    self.jobs.push(EncodeJob::Recreate {
                        channel: channel,
                        channels: gs.enc_channels,
                        sample_rate: sample_rate,
                    });
                } else {
                    self.jobs.push(EncodeJob::Remove { channel: channel });
                }
            }
        }
        st.grid.reset_position();
        st.prepare = match st.prepare {
            TransmitPrepare::NotPreparing => TransmitPrepare::NotPreparing,
            TransmitPrepare::Preparing(waited) => {
                let waited = waited + 1;
                if waited >= TOTAL_PREPARED_INTERVALS {
                    notes.push(SessionNotification::PreparedToTransmit);
                    TransmitPrepare::Prepared
                } else {
                    TransmitPrepare::Preparing(waited)
                }
            }
            TransmitPrepare::Prepared => TransmitPrepare::Prepared,
        };
        notes.push(SessionNotification::IntervalStarted {
            bpm: st.grid.bpm(),
            bpi: st.grid.bpi(),
        });
    }

    fn emit(&self, note: SessionNotification) -> () {
        // a gone receiver must never take the audio path down with it
        let _res = self.notify_tx.send(note);
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.jobs.push(EncodeJob::Shutdown);
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _res = handle.join();
        }
    }
}

#[cfg(test)]
mod test_session_controller {
    use super::*;

    fn build_one() -> (Arc<SessionController>, mpsc::Receiver<SessionNotification>) {
        let (tx, rx) = mpsc::channel();
        (SessionController::new(tx).unwrap(), rx)
    }

    #[test]
    fn starts_stopped() {
        let (controller, _rx) = build_one();
        assert!(!controller.is_running());
        controller.start(120, 4, 48000);
        assert!(controller.is_running());
        assert_eq!(controller.samples_in_interval(), 96000);
    }
    #[test]
    fn stop_is_idempotent() {
        let (controller, rx) = build_one();
        controller.start(120, 4, 48000);
        controller.stop();
        controller.stop();
        let stops: Vec<SessionNotification> = rx
            .try_iter()
            .filter(|n| *n == SessionNotification::Stopped)
            .collect();
        assert_eq!(stops.len(), 1);
    }
    #[test]
    fn block_list_survives_stop() {
        let (controller, _rx) = build_one();
        controller.start(120, 4, 48000);
        controller.block_user_in_chat("dave");
        controller.stop();
        controller.start(100, 8, 48000);
        assert!(controller.user_is_blocked_in_chat("dave"));
    }
    #[test]
    fn bots_are_filtered() {
        assert!(SessionController::user_is_bot("Jambot"));
        assert!(SessionController::user_is_bot("ninbot@server"));
        assert!(!SessionController::user_is_bot("alice"));
    }
    #[test]
    fn unknown_channel_events_are_noops() {
        let (controller, rx) = build_one();
        controller.start(120, 4, 48000);
        controller.on_user_channel_removed("ghost", "nope");
        controller.on_audio_chunk("ghost", "nope", &[1, 2, 3], true, false);
        controller.on_interval_downloaded("ghost", "nope");
        assert!(rx.try_iter().all(|n| !matches!(
            n,
            SessionNotification::ChannelRemoved { .. }
                | SessionNotification::ChunkFullyDownloaded { .. }
        )));
    }
    #[test]
    fn xmit_flip_waits_for_boundary() {
        let (controller, rx) = build_one();
        controller.start(120, 1, 48000); // 24000 frame interval
        controller.add_input(0, InputSource::audio(0, 1));
        controller.schedule_xmit_change(0, false);
        let input = SamplesBuffer::new(1, 12000);
        let mut left = vec![0.0; 12000];
        let mut right = vec![0.0; 12000];
        controller.process(&input, &mut left, &mut right);
        // mid interval: no flip yet
        assert!(rx
            .try_iter()
            .all(|n| !matches!(n, SessionNotification::ChannelXmitChanged { .. })));
        controller.process(&input, &mut left, &mut right);
        let flips: Vec<SessionNotification> = rx
            .try_iter()
            .filter(|n| matches!(n, SessionNotification::ChannelXmitChanged { .. }))
            .collect();
        assert_eq!(
            flips,
            vec![SessionNotification::ChannelXmitChanged {
                channel: 0,
                transmitting: false
            }]
        );
    }
}
