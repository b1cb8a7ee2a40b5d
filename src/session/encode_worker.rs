//! background encoding pipeline
//!
//! The audio callback never runs the codec.  It pushes raw buffers onto a
//! bounded job queue and returns; a worker thread drains the queue, runs
//! the encoders and emits chunk notifications.  The encoder table sits
//! behind its own lock, independent of the controller's main lock, so
//! encoder replacement at interval boundaries cannot deadlock against an
//! in-flight encode.
use crate::codec::encoder::ChunkEncoder;
use crate::common::box_error::BoxError;
use log::{debug, error, info, trace};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use thread_priority::{ThreadBuilder, ThreadPriority};

use super::events::SessionNotification;

/// raw buffers allowed in flight before the queue starts shedding
pub const MAX_QUEUED_JOBS: usize = 64;

pub enum EncodeJob {
    /// one audio block for one channel, interleaved at the encoder shape
    Block {
        channel: usize,
        channels: usize,
        sample_rate: u32,
        samples: Vec<f32>,
    },
    /// interval boundary: flush and close the channel's open chunk
    FinishInterval { channel: usize },
    /// replace the channel's encoder with a fresh configuration
    Recreate {
        channel: usize,
        channels: usize,
        sample_rate: u32,
    },
    Remove { channel: usize },
    Shutdown,
}

impl EncodeJob {
    fn block_channel(&self) -> Option<usize> {
        match self {
            EncodeJob::Block { channel, .. } => Some(*channel),
            _ => None,
        }
    }
}

/// bounded job queue between the audio callback and the worker.
/// Push never blocks: when full, the oldest raw buffer for the same
/// channel gets dropped (or the oldest of any channel).  Control jobs are
/// always accepted so chunk framing stays intact.
pub struct JobQueue {
    jobs: Mutex<VecDeque<EncodeJob>>,
    ready: Condvar,
    dropped: AtomicUsize,
}

impl JobQueue {
    pub fn new() -> JobQueue {
        JobQueue {
            jobs: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
            dropped: AtomicUsize::new(0),
        }
    }
    pub fn push(&self, job: EncodeJob) -> () {
        let mut jobs = self.jobs.lock().unwrap();
        if jobs.len() >= MAX_QUEUED_JOBS {
            let same_channel = job.block_channel();
            let victim = jobs
                .iter()
                .position(|j| j.block_channel().is_some() && j.block_channel() == same_channel)
                .or_else(|| jobs.iter().position(|j| j.block_channel().is_some()));
            match victim {
                Some(idx) => {
                    jobs.remove(idx);
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    trace!("encode queue full, dropped oldest buffer");
                }
                None => {
                    // nothing sheddable queued; a raw buffer gets dropped,
                    // control jobs go through regardless
                    if job.block_channel().is_some() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        return;
                    }
                }
            }
        }
        jobs.push_back(job);
        self.ready.notify_one();
    }
    /// blocking pop, worker side only
    pub fn pop(&self) -> EncodeJob {
        let mut jobs = self.jobs.lock().unwrap();
        loop {
            if let Some(job) = jobs.pop_front() {
                return job;
            }
            jobs = self.ready.wait(jobs).unwrap();
        }
    }
    /// drop every queued raw buffer, keeping control jobs.  Used on session
    /// teardown so stale buffers cannot resurrect a closed encoder.
    pub fn purge_blocks(&self) -> () {
        let mut jobs = self.jobs.lock().unwrap();
        jobs.retain(|j| j.block_channel().is_none());
    }
    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// one live encoder per transmitting channel plus its chunk framing state
pub struct ChannelEncoder {
    pub codec: ChunkEncoder,
    pub next_is_first: bool,
}

pub type EncoderTable = HashMap<usize, ChannelEncoder>;

/// spawn the worker below the audio callback's priority; codec cpu cost
/// must never risk an underrun
pub fn spawn_encode_worker(
    queue: Arc<JobQueue>,
    encoders: Arc<Mutex<EncoderTable>>,
    notify_tx: mpsc::Sender<SessionNotification>,
) -> Result<JoinHandle<()>, BoxError> {
    let builder = ThreadBuilder::default()
        .name("Encode Worker".to_string())
        .priority(ThreadPriority::Min);
    let handle = builder.spawn(move |_result| {
        run_worker(queue, encoders, notify_tx);
        debug!("encode worker ended");
    })?;
    Ok(handle)
}

fn run_worker(
    queue: Arc<JobQueue>,
    encoders: Arc<Mutex<EncoderTable>>,
    notify_tx: mpsc::Sender<SessionNotification>,
) -> () {
    loop {
        match queue.pop() {
            EncodeJob::Block {
                channel,
                channels,
                sample_rate,
                samples,
            } => {
                let mut table = encoders.lock().unwrap();
                let enc = match table.entry(channel) {
                    Entry::Occupied(entry) => entry.into_mut(),
                    Entry::Vacant(entry) => match ChunkEncoder::new(sample_rate, channels) {
                        Ok(codec) => entry.insert(ChannelEncoder {
                            codec: codec,
                            next_is_first: true,
                        }),
                        Err(e) => {
                            // transmission for this channel stays suppressed
                            // until a recreate succeeds at a boundary
                            error!("encoder init failed for channel {}: {}", channel, e);
                            continue;
                        }
                    },
                };
                enc.codec.put_frames(&samples);
                let bytes = enc.codec.take_bytes();
                if !bytes.is_empty() {
                    let is_first = enc.next_is_first;
                    enc.next_is_first = false;
                    drop(table); // emit outside the encoder lock
                    let _res = notify_tx.send(SessionNotification::ChunkReady {
                        channel: channel,
                        bytes: bytes,
                        is_first: is_first,
                        is_last: false,
                    });
                }
            }
            EncodeJob::FinishInterval { channel } => {
                let mut table = encoders.lock().unwrap();
                if let Some(enc) = table.get_mut(&channel) {
                    enc.codec.flush();
                    let bytes = enc.codec.take_bytes();
                    let is_first = enc.next_is_first;
                    enc.next_is_first = true;
                    drop(table);
                    // an empty closing chunk still carries the last-part
                    // marker, the receiving side needs it to reassemble
                    let _res = notify_tx.send(SessionNotification::ChunkReady {
                        channel: channel,
                        bytes: bytes,
                        is_first: is_first,
                        is_last: true,
                    });
                }
            }
            EncodeJob::Recreate {
                channel,
                channels,
                sample_rate,
            } => {
                let mut table = encoders.lock().unwrap();
                match ChunkEncoder::new(sample_rate, channels) {
                    Ok(codec) => {
                        table.insert(
                            channel,
                            ChannelEncoder {
                                codec: codec,
                                next_is_first: true,
                            },
                        );
                        info!(
                            "recreated encoder for channel {}: {} channels at {}",
                            channel, channels, sample_rate
                        );
                    }
                    Err(e) => {
                        table.remove(&channel);
                        error!(
                            "encoder recreate failed for channel {}, transmission suppressed: {}",
                            channel, e
                        );
                    }
                }
            }
            EncodeJob::Remove { channel } => {
                let mut table = encoders.lock().unwrap();
                if table.remove(&channel).is_some() {
                    debug!("removed encoder for channel {}", channel);
                }
            }
            EncodeJob::Shutdown => break,
        }
    }
}

#[cfg(test)]
mod test_job_queue {
    use super::*;

    fn block(channel: usize) -> EncodeJob {
        EncodeJob::Block {
            channel: channel,
            channels: 1,
            sample_rate: 48000,
            samples: vec![0.0; 4],
        }
    }

    #[test]
    fn push_pop() {
        let queue = JobQueue::new();
        queue.push(block(0));
        assert_eq!(queue.len(), 1);
        match queue.pop() {
            EncodeJob::Block { channel, .. } => assert_eq!(channel, 0),
            _ => panic!("wrong job"),
        }
    }
    #[test]
    fn full_queue_sheds_oldest_same_channel() {
        let queue = JobQueue::new();
        for _ in 0..MAX_QUEUED_JOBS {
            queue.push(block(1));
        }
        queue.push(block(1));
        assert_eq!(queue.len(), MAX_QUEUED_JOBS);
        assert_eq!(queue.dropped(), 1);
    }
    #[test]
    fn control_jobs_are_never_dropped() {
        let queue = JobQueue::new();
        for _ in 0..MAX_QUEUED_JOBS {
            queue.push(EncodeJob::FinishInterval { channel: 1 });
        }
        // a full queue of control jobs still accepts another control job
        queue.push(EncodeJob::FinishInterval { channel: 2 });
        assert_eq!(queue.len(), MAX_QUEUED_JOBS + 1);
        assert_eq!(queue.dropped(), 0);
        // but an incoming raw buffer gets shed
        queue.push(block(3));
        assert_eq!(queue.len(), MAX_QUEUED_JOBS + 1);
        assert_eq!(queue.dropped(), 1);
    }
    #[test]
    fn purge_drops_only_raw_buffers() {
        let queue = JobQueue::new();
        queue.push(block(1));
        queue.push(EncodeJob::FinishInterval { channel: 1 });
        queue.push(block(2));
        queue.purge_blocks();
        assert_eq!(queue.len(), 1);
        match queue.pop() {
            EncodeJob::FinishInterval { channel } => assert_eq!(channel, 1),
            _ => panic!("wrong job"),
        }
    }
    #[test]
    fn sheds_other_channel_when_needed() {
        let queue = JobQueue::new();
        queue.push(block(7));
        for _ in 0..MAX_QUEUED_JOBS - 1 {
            queue.push(EncodeJob::FinishInterval { channel: 1 });
        }
        // incoming block for channel 2; the only sheddable job is channel 7
        queue.push(block(2));
        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.len(), MAX_QUEUED_JOBS);
    }
}
