/// VIBESEQ - a haptic pattern step sequencer
///
/// This library provides the core components for a vibration-pattern
/// control panel:
/// - 20-step, 5-level sequences with a JSON-persisted sequence store
/// - Playback clock driving a play-head at a per-sequence step duration
/// - Device binding over a narrow haptic-output capability
/// - Session tying store, clock and device together for the GUI

pub mod device;
pub mod sequencer;
pub mod session;
pub mod storage;

// Re-export commonly used types
pub use device::{select_device, DeviceInfo, HapticOutput};
pub use sequencer::playback::{PlaybackClock, PlaybackEvent};
pub use sequencer::{next_step, Sequence, SequenceStore};
pub use session::Session;
pub use storage::{shared, FileStorage, MemoryStorage, SharedStorage, Storage, StorageError};
