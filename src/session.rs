/// Session state - ties the sequence store, playback clock and device
/// binding together so the GUI stays a thin view.
use std::sync::{Arc, Mutex};

use crate::device::{select_device, DeviceInfo, HapticOutput};
use crate::sequencer::playback::{PlaybackClock, PlaybackEvent};
use crate::sequencer::{Sequence, SequenceStore};
use crate::storage::{SharedStorage, StorageError, DEVICE_INDEX_KEY};

struct ActiveDevice {
    info: DeviceInfo,
    output: Box<dyn HapticOutput>,
}

pub struct Session {
    store: SequenceStore,
    storage: SharedStorage,
    clock: PlaybackClock,
    device: Option<ActiveDevice>,
    /// Index of the sequence whose clock is running. At most one.
    playing: Option<usize>,
    /// Per-sequence play-heads; kept across pause/resume, dropped on remove.
    playheads: Vec<usize>,
    /// Live copy of the playing sequence shared with the clock thread.
    live: Option<Arc<Mutex<Sequence>>>,
}

impl Session {
    pub fn new(storage: SharedStorage) -> Self {
        let store = SequenceStore::load(Arc::clone(&storage));
        let playheads = vec![0; store.len()];

        Self {
            store,
            storage,
            clock: PlaybackClock::new(),
            device: None,
            playing: None,
            playheads,
            live: None,
        }
    }

    pub fn sequence_count(&self) -> usize {
        self.store.len()
    }

    pub fn sequence(&self, index: usize) -> Option<&Sequence> {
        self.store.get(index)
    }

    pub fn playhead(&self, index: usize) -> usize {
        self.playheads.get(index).copied().unwrap_or(0)
    }

    pub fn playing(&self) -> Option<usize> {
        self.playing
    }

    pub fn device(&self) -> Option<&DeviceInfo> {
        self.device.as_ref().map(|device| &device.info)
    }

    pub fn stored_device_index(&self) -> Option<String> {
        self.storage.lock().unwrap().get(DEVICE_INDEX_KEY)
    }

    pub fn add_sequence(&mut self) -> Result<(), StorageError> {
        self.playheads.push(0);
        self.store.add()
    }

    pub fn remove_sequence(&mut self, index: usize) -> Result<(), StorageError> {
        if index >= self.store.len() {
            return Ok(());
        }

        match self.playing {
            Some(playing) if playing == index => {
                self.clock.stop();
                if let Some(device) = &self.device {
                    device.output.stop();
                }
                self.playing = None;
                self.live = None;
            }
            // Keep the same sequence playing when an earlier one goes away.
            Some(playing) if playing > index => self.playing = Some(playing - 1),
            _ => {}
        }

        self.playheads.remove(index);
        self.store.remove(index)
    }

    pub fn set_value(&mut self, index: usize, step: usize, level: u8) -> Result<(), StorageError> {
        let Some(mut sequence) = self.store.get(index).cloned() else {
            return Ok(());
        };
        sequence.set_value(step, level);
        self.update_sequence(index, sequence)
    }

    pub fn set_duration(&mut self, index: usize, duration: u64) -> Result<(), StorageError> {
        let Some(mut sequence) = self.store.get(index).cloned() else {
            return Ok(());
        };
        sequence.duration = duration;
        self.update_sequence(index, sequence)
    }

    fn update_sequence(&mut self, index: usize, sequence: Sequence) -> Result<(), StorageError> {
        if self.playing == Some(index) {
            if let Some(live) = &self.live {
                *live.lock().unwrap() = sequence.clone();
            }
        }
        self.store.update(index, sequence)
    }

    /// Starts playback on `index`, resuming from its remembered play-head.
    /// Any other running sequence loses its timer, but no stop command is
    /// sent to the device; only pause and remove do that.
    pub fn play(&mut self, index: usize) {
        if index >= self.store.len() || self.device.is_none() {
            return;
        }

        self.clock.stop();

        let live = Arc::new(Mutex::new(
            self.store.get(index).cloned().unwrap_or_default(),
        ));
        self.clock.start(Arc::clone(&live), self.playhead(index));
        self.live = Some(live);
        self.playing = Some(index);
    }

    /// Cancels the timer, then tells the device to stop, exactly once.
    pub fn pause(&mut self) {
        self.clock.stop();
        if let Some(device) = &self.device {
            device.output.stop();
        }
        self.playing = None;
        self.live = None;
    }

    pub fn toggle_play(&mut self, index: usize) {
        if self.playing == Some(index) {
            self.pause();
        } else {
            self.play(index);
        }
    }

    /// Binds the device named by `raw` if it parses and matches an entry in
    /// `devices`, persisting the index; otherwise a silent no-op. Returns
    /// whether a device was bound.
    pub fn select_device<F>(&mut self, raw: &str, devices: &[DeviceInfo], output_for: F) -> bool
    where
        F: FnOnce(&DeviceInfo) -> Box<dyn HapticOutput>,
    {
        let Some(info) = select_device(raw, devices) else {
            return false;
        };

        if let Err(e) = self
            .storage
            .lock()
            .unwrap()
            .set(DEVICE_INDEX_KEY, &info.index.to_string())
        {
            tracing::warn!("failed to persist device index: {e}");
        }

        self.device = Some(ActiveDevice {
            info: info.clone(),
            output: output_for(info),
        });
        true
    }

    /// Re-applies the last persisted selection against a fresh device list,
    /// so a previously chosen device re-binds on reconnect without user
    /// action.
    pub fn rebind_device<F>(&mut self, devices: &[DeviceInfo], output_for: F)
    where
        F: FnOnce(&DeviceInfo) -> Box<dyn HapticOutput>,
    {
        if let Some(stored) = self.stored_device_index() {
            self.select_device(&stored, devices, output_for);
        }
    }

    /// Drains clock ticks: moves the playing sequence's play-head and
    /// forwards the actuation strength to the bound device.
    pub fn pump(&mut self) {
        for event in self.clock.poll_events() {
            let PlaybackEvent::Tick { step, strength } = event;
            if let Some(playing) = self.playing {
                if let Some(playhead) = self.playheads.get_mut(playing) {
                    *playhead = step;
                }
                if let Some(device) = &self.device {
                    device.output.vibrate(strength);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{shared, MemoryStorage};

    #[derive(Clone, Default)]
    struct RecordingOutput {
        vibrations: Arc<Mutex<Vec<f64>>>,
        stops: Arc<Mutex<usize>>,
    }

    impl RecordingOutput {
        fn stops(&self) -> usize {
            *self.stops.lock().unwrap()
        }
    }

    impl HapticOutput for RecordingOutput {
        fn vibrate(&self, strength: f64) {
            self.vibrations.lock().unwrap().push(strength);
        }

        fn stop(&self) {
            *self.stops.lock().unwrap() += 1;
        }
    }

    fn devices() -> Vec<DeviceInfo> {
        vec![DeviceInfo {
            index: 2,
            name: "test wand".to_string(),
        }]
    }

    fn bound_session() -> (Session, RecordingOutput) {
        let mut session = Session::new(shared(MemoryStorage::new()));
        let output = RecordingOutput::default();
        let handle = output.clone();
        let bound = session.select_device("2", &devices(), move |_| -> Box<dyn HapticOutput> {
            Box::new(handle)
        });
        assert!(bound);
        (session, output)
    }

    #[test]
    fn test_default_then_add_then_remove() {
        let mut session = Session::new(shared(MemoryStorage::new()));
        assert_eq!(session.sequence_count(), 1);
        assert_eq!(session.sequence(0), Some(&Sequence::default()));

        session.add_sequence().unwrap();
        assert_eq!(session.sequence_count(), 2);
        assert_eq!(session.sequence(0), session.sequence(1));

        session.set_value(1, 4, 3).unwrap();
        session.remove_sequence(0).unwrap();
        assert_eq!(session.sequence_count(), 1);
        assert_eq!(session.sequence(0).unwrap().value_at(4), 3);
    }

    #[test]
    fn test_select_device_garbage_is_noop() {
        let mut session = Session::new(shared(MemoryStorage::new()));
        let bound = session.select_device("abc", &devices(), |_| -> Box<dyn HapticOutput> {
            Box::new(RecordingOutput::default())
        });
        assert!(!bound);
        assert!(session.device().is_none());
        assert_eq!(session.stored_device_index(), None);
    }

    #[test]
    fn test_select_device_persists_index() {
        let (session, _) = bound_session();
        assert_eq!(session.device().map(|d| d.index), Some(2));
        assert_eq!(session.stored_device_index(), Some("2".to_string()));
    }

    #[test]
    fn test_rebind_uses_persisted_index() {
        let (mut session, _) = bound_session();
        session.device = None;

        session.rebind_device(&devices(), |_| -> Box<dyn HapticOutput> {
            Box::new(RecordingOutput::default())
        });
        assert_eq!(session.device().map(|d| d.index), Some(2));
    }

    #[test]
    fn test_play_requires_device() {
        let mut session = Session::new(shared(MemoryStorage::new()));
        session.play(0);
        assert_eq!(session.playing(), None);
    }

    #[test]
    fn test_pause_stops_device_once() {
        let (mut session, output) = bound_session();
        session.play(0);
        assert_eq!(session.playing(), Some(0));

        session.pause();
        assert_eq!(session.playing(), None);
        assert_eq!(output.stops(), 1);
    }

    #[test]
    fn test_switching_sequences_sends_no_stop() {
        let (mut session, output) = bound_session();
        session.add_sequence().unwrap();

        session.play(0);
        session.play(1);
        assert_eq!(session.playing(), Some(1));
        assert_eq!(output.stops(), 0);
    }

    #[test]
    fn test_edits_to_playing_sequence_reach_the_clock_copy() {
        let (mut session, _) = bound_session();
        session.play(0);

        session.set_value(0, 7, 3).unwrap();
        session.set_duration(0, 2500).unwrap();

        let live = session.live.as_ref().unwrap().lock().unwrap().clone();
        assert_eq!(live.value_at(7), 3);
        assert_eq!(live.duration, 2500);

        // Edits to a sequence that is not playing stay out of the copy.
        session.add_sequence().unwrap();
        session.set_value(1, 0, 4).unwrap();
        let live = session.live.as_ref().unwrap().lock().unwrap().clone();
        assert_eq!(live.value_at(0), 0);
    }

    #[test]
    fn test_removing_playing_sequence_stops_device() {
        let (mut session, output) = bound_session();
        session.play(0);

        session.remove_sequence(0).unwrap();
        assert_eq!(session.playing(), None);
        assert_eq!(session.sequence_count(), 0);
        assert_eq!(output.stops(), 1);
    }

    #[test]
    fn test_removing_earlier_sequence_keeps_later_playing() {
        let (mut session, output) = bound_session();
        session.add_sequence().unwrap();

        session.play(1);
        session.remove_sequence(0).unwrap();
        assert_eq!(session.playing(), Some(0));
        assert_eq!(output.stops(), 0);
    }

    #[test]
    fn test_state_survives_reload() {
        let storage = shared(MemoryStorage::new());

        let mut session = Session::new(Arc::clone(&storage));
        session.add_sequence().unwrap();
        session.set_duration(0, 1500).unwrap();
        drop(session);

        let session = Session::new(storage);
        assert_eq!(session.sequence_count(), 2);
        assert_eq!(session.sequence(0).unwrap().duration, 1500);
    }
}
