//! Playback clock - owns the sequencer and drives it from a repeating timer
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::{ClockEvent, Sequencer};
use crate::error::Result;

fn lock(sequencer: &Mutex<Sequencer>) -> MutexGuard<'_, Sequencer> {
    sequencer.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cancellable repeating timer. A tick that overruns the period delays the
/// next one; ticks never overlap.
struct Ticker {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl Ticker {
    fn spawn(
        period: Duration,
        sequencer: Arc<Mutex<Sequencer>>,
        sender: Sender<ClockEvent>,
    ) -> Self {
        let (stop, stop_rx) = channel::<()>();

        let handle = thread::spawn(move || loop {
            match stop_rx.recv_timeout(period) {
                Err(RecvTimeoutError::Timeout) => {
                    let events = lock(&sequencer).tick();
                    for event in events {
                        if sender.send(event).is_err() {
                            return;
                        }
                    }
                }
                // Stop requested or the clock was dropped
                _ => return,
            }
        });

        Self { stop, handle }
    }

    fn cancel(self) {
        let _ = self.stop.send(());
        if self.handle.join().is_err() {
            tracing::error!("Clock timer thread panicked");
        }
    }
}

pub struct Clock {
    sequencer: Arc<Mutex<Sequencer>>,
    ticker: Option<Ticker>,
    sender: Sender<ClockEvent>,
    receiver: Receiver<ClockEvent>,
}

impl Clock {
    pub fn new() -> Self {
        Self::with_sequencer(Sequencer::new())
    }

    pub fn with_sequencer(sequencer: Sequencer) -> Self {
        let (sender, receiver) = channel();

        Self {
            sequencer: Arc::new(Mutex::new(sequencer)),
            ticker: None,
            sender,
            receiver,
        }
    }

    /// Start the transport. Returns false when it was already running.
    pub fn start(&mut self) -> bool {
        let started = lock(&self.sequencer).start();
        match started {
            Some(period) => {
                self.spawn_ticker(period);
                tracing::info!("Sequencer started ({:?} per step)", period);
                true
            }
            None => false,
        }
    }

    /// Stop the transport. No tick fires once this returns.
    /// Returns the step whose playing marker was cleared.
    pub fn stop(&mut self) -> Option<usize> {
        self.cancel_ticker();
        let cleared = lock(&self.sequencer).stop();
        tracing::info!("Sequencer stopped");
        cleared
    }

    /// Change tempo. Returns true when a running transport was restarted.
    pub fn set_bpm(&mut self, bpm: u32) -> Result<bool> {
        self.cancel_ticker();
        let result = lock(&self.sequencer).set_bpm(bpm);

        // Restarted, or left running after a rejected tempo
        let (running, period) = {
            let seq = lock(&self.sequencer);
            (seq.is_running(), seq.step_period())
        };
        if running {
            self.spawn_ticker(period);
        }

        let restarted = result?.is_some();
        tracing::info!("Clock tempo set to {} BPM", bpm);
        Ok(restarted)
    }

    pub fn is_running(&self) -> bool {
        lock(&self.sequencer).is_running()
    }

    pub fn bpm(&self) -> u32 {
        lock(&self.sequencer).bpm()
    }

    pub fn cursor(&self) -> usize {
        lock(&self.sequencer).cursor()
    }

    pub fn step_period(&self) -> Duration {
        lock(&self.sequencer).step_period()
    }

    /// Read sequencer state without racing the timer
    pub fn read<T>(&self, f: impl FnOnce(&Sequencer) -> T) -> T {
        f(&lock(&self.sequencer))
    }

    /// Mutate sequencer state (pattern edits, recording flag)
    pub fn edit<T>(&self, f: impl FnOnce(&mut Sequencer) -> T) -> T {
        f(&mut lock(&self.sequencer))
    }

    pub fn poll_events(&self) -> Vec<ClockEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    /// Block until the next clock event or the timeout elapses
    pub fn wait_event(&self, timeout: Duration) -> Option<ClockEvent> {
        self.receiver.recv_timeout(timeout).ok()
    }

    fn spawn_ticker(&mut self, period: Duration) {
        self.cancel_ticker();
        self.ticker = Some(Ticker::spawn(
            period,
            Arc::clone(&self.sequencer),
            self.sender.clone(),
        ));
    }

    fn cancel_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.cancel();
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Clock {
    fn drop(&mut self) {
        self.cancel_ticker();
    }
}
