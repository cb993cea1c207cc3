//! A scripted `TextGenerator` for exercising the worker and bridge without a model.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use rand::Rng;

use super::TextGenerator;

/// Counters shared between a `ScriptedModel` and the test observing it.
#[derive(Debug, Default)]
pub(crate) struct Probe {
    pub calls: AtomicUsize,
    pub emitted: AtomicUsize,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub returned: AtomicUsize,
}

impl Probe {
    pub fn emitted(&self) -> usize {
        self.emitted.load(Ordering::SeqCst)
    }

    pub fn returned(&self) -> usize {
        self.returned.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

struct ActiveGuard<'a>(&'a Probe);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
        self.0.returned.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) struct ScriptedModel {
    pieces: Vec<String>,
    failure: Option<String>,
    panic_message: Option<String>,
    endless: bool,
    delay: Duration,
    jitter: Option<Duration>,
    rendezvous: Option<Arc<Barrier>>,
    probe: Arc<Probe>,
}

impl ScriptedModel {
    pub fn new<I, S>(pieces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pieces: pieces.into_iter().map(Into::into).collect(),
            failure: None,
            panic_message: None,
            endless: false,
            delay: Duration::ZERO,
            jitter: None,
            rendezvous: None,
            probe: Arc::new(Probe::default()),
        }
    }

    /// Emits `0`, `1`, `2`, ... for `count` tokens.
    pub fn numbered(count: usize) -> Self {
        Self::new((0..count).map(|i| format!("{} ", i)))
    }

    /// Returns an error after the scripted pieces.
    pub fn failing_with(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    pub fn panicking_with(mut self, message: &str) -> Self {
        self.panic_message = Some(message.to_string());
        self
    }

    /// Cycles through the pieces until told to stop.
    pub fn endless(mut self) -> Self {
        self.endless = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Sleeps a random duration up to `max` before each piece.
    pub fn with_jitter(mut self, max: Duration) -> Self {
        self.jitter = Some(max);
        self
    }

    /// Every call waits on `barrier` before emitting anything.
    pub fn with_rendezvous(mut self, barrier: Arc<Barrier>) -> Self {
        self.rendezvous = Some(barrier);
        self
    }

    pub fn probe(&self) -> Arc<Probe> {
        Arc::clone(&self.probe)
    }

    pub fn script(&self) -> String {
        self.pieces.concat()
    }
}

impl TextGenerator for ScriptedModel {
    fn generate(
        &self,
        _prompt: &str,
        _max_tokens: usize,
        emit: &mut dyn FnMut(String) -> ControlFlow<()>,
    ) -> Result<()> {
        let probe = &self.probe;
        probe.calls.fetch_add(1, Ordering::SeqCst);
        let now_active = probe.active.fetch_add(1, Ordering::SeqCst) + 1;
        probe.max_active.fetch_max(now_active, Ordering::SeqCst);
        let _active = ActiveGuard(probe);

        if let Some(barrier) = &self.rendezvous {
            barrier.wait();
        }

        let mut index = 0;
        while !self.pieces.is_empty() && (self.endless || index < self.pieces.len()) {
            if !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
            if let Some(max) = self.jitter {
                let micros = rand::thread_rng().gen_range(0..=max.as_micros() as u64);
                thread::sleep(Duration::from_micros(micros));
            }
            let piece = self.pieces[index % self.pieces.len()].clone();
            probe.emitted.fetch_add(1, Ordering::SeqCst);
            if emit(piece).is_break() {
                return Ok(());
            }
            index += 1;
        }

        if let Some(message) = &self.panic_message {
            panic!("{}", message);
        }
        match &self.failure {
            Some(message) => Err(anyhow!("{}", message)),
            None => Ok(()),
        }
    }
}
