/// Core sequencer logic - pattern state and the persisted sequence store.
use serde::{Deserialize, Serialize};

use crate::storage::{SharedStorage, StorageError, SEQUENCES_KEY};

pub mod playback;

/// Steps per pattern.
pub const STEP_COUNT: usize = 20;
/// Highest intensity level of a step (levels run 0..=4).
pub const LEVEL_MAX: u8 = 4;
/// Step duration bounds, milliseconds.
pub const DURATION_MIN_MS: u64 = 500;
pub const DURATION_MAX_MS: u64 = 3000;
pub const DURATION_STEP_MS: u64 = 500;

/// One loopable vibration pattern: 20 steps, each holding an intensity
/// level in 0..=4, stepped every `duration` milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    pub values: Vec<u8>,
    pub duration: u64,
}

impl Default for Sequence {
    fn default() -> Self {
        Self {
            values: vec![0; STEP_COUNT],
            duration: DURATION_MIN_MS,
        }
    }
}

impl Sequence {
    pub fn value_at(&self, step: usize) -> u8 {
        self.values.get(step).copied().unwrap_or(0)
    }

    pub fn set_value(&mut self, step: usize, level: u8) {
        if let Some(value) = self.values.get_mut(step) {
            *value = level.min(LEVEL_MAX);
        }
    }

    /// Normalized actuation strength for a step: level 0..=4 scaled to
    /// 0.0..=1.0.
    pub fn strength_at(&self, step: usize) -> f64 {
        f64::from(self.value_at(step)) / f64::from(LEVEL_MAX)
    }
}

/// Advances the play-head one step, wrapping at the pattern length.
pub fn next_step(step: usize) -> usize {
    (step + 1) % STEP_COUNT
}

/// Ordered collection of sequences, written back to storage in full on
/// every mutation. Index is identity: the UI addresses sequences by
/// position.
pub struct SequenceStore {
    sequences: Vec<Sequence>,
    storage: SharedStorage,
}

impl SequenceStore {
    /// Loads the persisted list, falling back to a single default sequence
    /// on first run or when the stored state cannot be parsed.
    pub fn load(storage: SharedStorage) -> Self {
        let sequences = match storage.lock().unwrap().get(SEQUENCES_KEY) {
            Some(text) => match serde_json::from_str(&text) {
                Ok(sequences) => sequences,
                Err(e) => {
                    tracing::warn!("discarding unreadable sequence list: {e}");
                    vec![Sequence::default()]
                }
            },
            None => vec![Sequence::default()],
        };
        Self { sequences, storage }
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Sequence> {
        self.sequences.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sequence> {
        self.sequences.iter()
    }

    /// Appends a default sequence.
    pub fn add(&mut self) -> Result<(), StorageError> {
        self.sequences.push(Sequence::default());
        self.persist()
    }

    /// Deletes the sequence at `index`; out-of-range indices are ignored.
    pub fn remove(&mut self, index: usize) -> Result<(), StorageError> {
        if index < self.sequences.len() {
            self.sequences.remove(index);
        }
        self.persist()
    }

    /// Replaces the sequence at `index` wholesale.
    pub fn update(&mut self, index: usize, sequence: Sequence) -> Result<(), StorageError> {
        if let Some(slot) = self.sequences.get_mut(index) {
            *slot = sequence;
        }
        self.persist()
    }

    fn persist(&mut self) -> Result<(), StorageError> {
        let text = serde_json::to_string(&self.sequences)?;
        self.storage.lock().unwrap().set(SEQUENCES_KEY, &text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{shared, MemoryStorage};
    use std::sync::Arc;

    #[test]
    fn test_default_sequence_shape() {
        let sequence = Sequence::default();
        assert_eq!(sequence.values, vec![0; STEP_COUNT]);
        assert_eq!(sequence.duration, DURATION_MIN_MS);
    }

    #[test]
    fn test_set_value_preserves_the_rest() {
        let mut sequence = Sequence::default();
        sequence.set_value(3, 4);
        for step in 0..STEP_COUNT {
            let expected = if step == 3 { 4 } else { 0 };
            assert_eq!(sequence.value_at(step), expected);
        }
        assert_eq!(sequence.duration, DURATION_MIN_MS);
    }

    #[test]
    fn test_set_value_clamps_level() {
        let mut sequence = Sequence::default();
        sequence.set_value(0, 9);
        assert_eq!(sequence.value_at(0), LEVEL_MAX);
    }

    #[test]
    fn test_strength_scaling() {
        let mut sequence = Sequence::default();
        sequence.set_value(0, 4);
        sequence.set_value(1, 2);
        assert_eq!(sequence.strength_at(0), 1.0);
        assert_eq!(sequence.strength_at(1), 0.5);
        assert_eq!(sequence.strength_at(2), 0.0);
    }

    #[test]
    fn test_play_head_cycles() {
        let mut step = 7;
        for _ in 0..STEP_COUNT {
            step = next_step(step);
        }
        assert_eq!(step, 7);
    }

    #[test]
    fn test_sequence_list_json_round_trip() {
        let mut sequence = Sequence::default();
        sequence.set_value(5, 3);
        sequence.duration = 1500;
        let list = vec![Sequence::default(), sequence];

        let text = serde_json::to_string(&list).unwrap();
        let parsed: Vec<Sequence> = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, list);
    }

    #[test]
    fn test_store_default_add_remove() {
        let mut store = SequenceStore::load(shared(MemoryStorage::new()));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(0), Some(&Sequence::default()));

        store.add().unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(0), store.get(1));

        let mut second = Sequence::default();
        second.set_value(0, 1);
        store.update(1, second.clone()).unwrap();

        store.remove(0).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(0), Some(&second));
    }

    #[test]
    fn test_store_persists_every_mutation() {
        let storage = shared(MemoryStorage::new());

        let mut store = SequenceStore::load(Arc::clone(&storage));
        store.add().unwrap();
        let mut edited = Sequence::default();
        edited.set_value(10, 2);
        edited.duration = 2000;
        store.update(0, edited.clone()).unwrap();

        let reloaded = SequenceStore::load(storage);
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get(0), Some(&edited));
        assert_eq!(reloaded.get(1), Some(&Sequence::default()));
    }
}
