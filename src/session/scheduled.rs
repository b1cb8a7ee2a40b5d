//! pending state changes that apply atomically at the next interval
//! boundary, never mid-interval
use super::beat_grid::BeatGrid;
use log::warn;

// NINJAM servers reject values outside these ranges
pub const MIN_BPM: u16 = 20;
pub const MAX_BPM: u16 = 400;
pub const MIN_BPI: u16 = 1;
pub const MAX_BPI: u16 = 64;

/// one closed set of rarely extended variants, so a tagged enum instead of
/// a trait object hierarchy
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScheduledEvent {
    BpmChange(u16),
    BpiChange(u16),
    /// the input group's channel shape changed, its encoder must be
    /// recreated with the new channel count
    InputShapeChange(usize),
}

/// what a boundary application actually changed
#[derive(Debug, Default)]
pub struct AppliedChanges {
    pub bpm: Option<u16>,
    pub bpi: Option<u16>,
    pub reshaped: Vec<usize>,
}

pub struct ChangeQueue {
    events: Vec<ScheduledEvent>,
}

impl ChangeQueue {
    pub fn new() -> ChangeQueue {
        ChangeQueue { events: vec![] }
    }
    pub fn enqueue(&mut self, event: ScheduledEvent) -> () {
        self.events.push(event);
    }
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
    pub fn len(&self) -> usize {
        self.events.len()
    }
    pub fn clear(&mut self) -> () {
        self.events.clear();
    }
    /// drain the queue in FIFO order and apply every event to the grid.
    /// An event that fails validation is dropped with a warning; the rest
    /// still apply.  One bad vote must not block a tempo change.
    pub fn apply_all(&mut self, grid: &mut BeatGrid) -> AppliedChanges {
        let mut applied = AppliedChanges::default();
        for event in self.events.drain(..) {
            match event {
                ScheduledEvent::BpmChange(bpm) => {
                    if (MIN_BPM..=MAX_BPM).contains(&bpm) {
                        grid.set_bpm(bpm);
                        applied.bpm = Some(bpm);
                    } else {
                        warn!("dropping out of range bpm change: {}", bpm);
                    }
                }
                ScheduledEvent::BpiChange(bpi) => {
                    if (MIN_BPI..=MAX_BPI).contains(&bpi) {
                        grid.set_bpi(bpi);
                        applied.bpi = Some(bpi);
                    } else {
                        warn!("dropping out of range bpi change: {}", bpi);
                    }
                }
                ScheduledEvent::InputShapeChange(channel) => {
                    if !applied.reshaped.contains(&channel) {
                        applied.reshaped.push(channel);
                    }
                }
            }
        }
        applied
    }
}

#[cfg(test)]
mod test_change_queue {
    use super::*;

    #[test]
    fn fifo_apply() {
        // It should apply in order, last write wins
        let mut grid = BeatGrid::new(120, 4, 48000);
        let mut queue = ChangeQueue::new();
        queue.enqueue(ScheduledEvent::BpmChange(100));
        queue.enqueue(ScheduledEvent::BpmChange(90));
        let applied = queue.apply_all(&mut grid);
        assert_eq!(applied.bpm, Some(90));
        assert_eq!(grid.bpm(), 90);
        assert!(queue.is_empty());
    }
    #[test]
    fn invalid_event_does_not_block_the_rest() {
        let mut grid = BeatGrid::new(120, 4, 48000);
        let mut queue = ChangeQueue::new();
        queue.enqueue(ScheduledEvent::BpiChange(0));
        queue.enqueue(ScheduledEvent::BpmChange(90));
        let applied = queue.apply_all(&mut grid);
        assert_eq!(applied.bpi, None);
        assert_eq!(grid.bpi(), 4); // unchanged
        assert_eq!(grid.bpm(), 90); // still applied
        assert_eq!(applied.bpm, Some(90));
    }
    #[test]
    fn reshape_is_deduplicated() {
        let mut grid = BeatGrid::new(120, 4, 48000);
        let mut queue = ChangeQueue::new();
        queue.enqueue(ScheduledEvent::InputShapeChange(3));
        queue.enqueue(ScheduledEvent::InputShapeChange(3));
        queue.enqueue(ScheduledEvent::InputShapeChange(1));
        let applied = queue.apply_all(&mut grid);
        assert_eq!(applied.reshaped, vec![3, 1]);
    }
}
