/// Playback clock - fixed-interval ticker advancing the play-head.
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use super::{next_step, Sequence};

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// The play-head advanced to `step`; the device should actuate at
    /// `strength` (0.0..=1.0).
    Tick { step: usize, strength: f64 },
}

/// Drives at most one sequence at a time. The worker thread re-reads the
/// shared sequence every pass, so cell edits are picked up on the next tick
/// and a duration edit restarts the period without drift. The play-head is
/// never reset here; callers pass the step to resume from.
pub struct PlaybackClock {
    sender: Sender<PlaybackEvent>,
    receiver: Receiver<PlaybackEvent>,
    is_running: Arc<Mutex<bool>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl PlaybackClock {
    pub fn new() -> Self {
        let (sender, receiver) = channel();

        Self {
            sender,
            receiver,
            is_running: Arc::new(Mutex::new(false)),
            worker: None,
        }
    }

    pub fn start(&mut self, sequence: Arc<Mutex<Sequence>>, start_step: usize) {
        if *self.is_running.lock().unwrap() {
            return;
        }

        // Ticks queued by a previous run belong to another sequence.
        while self.receiver.try_recv().is_ok() {}

        *self.is_running.lock().unwrap() = true;

        let is_running = Arc::clone(&self.is_running);
        let sender = self.sender.clone();

        self.worker = Some(thread::spawn(move || {
            let mut step = start_step;
            let mut last_tick = Instant::now();
            let mut period = Duration::from_millis(sequence.lock().unwrap().duration);

            while *is_running.lock().unwrap() {
                // A duration edit tears the interval down: the new period
                // counts from the moment of the change, not from the last
                // tick. The play-head is untouched.
                let current = Duration::from_millis(sequence.lock().unwrap().duration);
                if current != period {
                    period = current;
                    last_tick = Instant::now();
                }

                if last_tick.elapsed() >= period {
                    let strength = {
                        let sequence = sequence.lock().unwrap();
                        step = next_step(step);
                        sequence.strength_at(step)
                    };
                    let _ = sender.send(PlaybackEvent::Tick { step, strength });
                    last_tick = Instant::now();
                }

                thread::sleep(Duration::from_millis(1));
            }
        }));
    }

    /// Cancels the timer and waits for the worker to exit, so no tick can
    /// land after this returns. Sends nothing to the device; stopping the
    /// actuator is the transport control's job.
    pub fn stop(&mut self) {
        *self.is_running.lock().unwrap() = false;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }

    pub fn is_running(&self) -> bool {
        *self.is_running.lock().unwrap()
    }

    pub fn poll_events(&self) -> Vec<PlaybackEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PlaybackClock {
    fn drop(&mut self) {
        self.stop();
    }
}
