mod mistral;
#[cfg(test)]
pub(crate) mod testing;

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use anyhow::Result;
use log::{debug, info};

use crate::config::AppConfig;

pub use mistral::MistralServerModel;

/// A blocking, stateful text-generation entry point.
///
/// `generate` pushes each newly decoded piece of the continuation (never the
/// prompt) into `emit` as soon as it exists, and returns once generation has
/// finished. Returning `ControlFlow::Break` from `emit` asks the generator to
/// stop early; implementations check it between tokens.
pub trait TextGenerator: Send + Sync + 'static {
    fn generate(
        &self,
        prompt: &str,
        max_tokens: usize,
        emit: &mut dyn FnMut(String) -> ControlFlow<()>,
    ) -> Result<()>;

    /// Non-streaming variant: the concatenation of everything `generate`
    /// would have emitted under the same token cap.
    fn complete(&self, prompt: &str, max_tokens: usize) -> Result<String> {
        let mut budget = TokenBudget::new(max_tokens);
        let mut text = String::new();
        self.generate(prompt, max_tokens, &mut |piece| {
            if !budget.admit() {
                return ControlFlow::Break(());
            }
            text.push_str(&piece);
            budget.next_step()
        })?;
        Ok(text)
    }
}

/// Counts emitted tokens against the per-reply cap.
#[derive(Debug, Clone, Copy)]
pub struct TokenBudget {
    limit: usize,
    used: usize,
}

impl TokenBudget {
    pub fn new(limit: usize) -> Self {
        Self { limit, used: 0 }
    }

    /// Claims one slot; `false` once the cap is reached.
    pub fn admit(&mut self) -> bool {
        if self.used >= self.limit {
            return false;
        }
        self.used += 1;
        true
    }

    /// What to tell the generator after a piece was accepted.
    pub fn next_step(&self) -> ControlFlow<()> {
        if self.used >= self.limit {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    pub fn used(&self) -> usize {
        self.used
    }
}

/// The single shared model handle, injected into every generation.
///
/// When `serialize` is on, generations queue behind one lock instead of
/// entering the backend concurrently.
pub struct ModelManager {
    generator: Arc<dyn TextGenerator>,
    gate: Option<Mutex<()>>,
}

impl ModelManager {
    pub fn new(generator: Arc<dyn TextGenerator>, serialize: bool) -> Self {
        Self {
            generator,
            gate: serialize.then(|| Mutex::new(())),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let model = MistralServerModel::new(config);
        info!(
            "Using mistral.rs server at: {} (serialized generations: {})",
            config.server_url, config.serialize_generations
        );
        Self::new(Arc::new(model), config.serialize_generations)
    }

    /// Waits for exclusive use of the model when serialization is on.
    /// Blocking; call from a blocking context only.
    pub fn acquire(&self) -> ModelLease<'_> {
        // The gate protects no data, so a poisoned lock is still usable.
        let guard = self.gate.as_ref().map(|gate| match gate.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                debug!("Model busy, queueing generation");
                gate.lock().unwrap_or_else(PoisonError::into_inner)
            }
        });
        ModelLease {
            generator: &*self.generator,
            _guard: guard,
        }
    }
}

/// Permission to run one generation against the shared model.
pub struct ModelLease<'a> {
    generator: &'a dyn TextGenerator,
    _guard: Option<MutexGuard<'a, ()>>,
}

impl ModelLease<'_> {
    pub fn generate(
        &self,
        prompt: &str,
        max_tokens: usize,
        emit: &mut dyn FnMut(String) -> ControlFlow<()>,
    ) -> Result<()> {
        self.generator.generate(prompt, max_tokens, emit)
    }

}
