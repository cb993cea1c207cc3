use std::any::Any;
use std::ops::ControlFlow;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use futures::StreamExt;
use log::{debug, error, info};

use super::bridge::{self, Sink, Source};
use crate::config::AppConfig;
use crate::error::ChatResult;
use crate::model::{ModelManager, TokenBudget};

/// Turns one prompt into one token stream, running the model off the async runtime.
#[derive(Clone)]
pub struct GenerationWorker {
    model: Arc<ModelManager>,
    max_tokens: usize,
    buffer: usize,
    timeout: Option<Duration>,
}

impl GenerationWorker {
    pub fn new(model: Arc<ModelManager>, max_tokens: usize, buffer: usize) -> Self {
        Self {
            model,
            max_tokens,
            buffer,
            timeout: None,
        }
    }

    pub fn from_config(model: Arc<ModelManager>, config: &AppConfig) -> Self {
        Self::new(model, config.max_tokens, config.stream_buffer).with_timeout(config.generation_timeout)
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Starts generating on the blocking pool and returns the consumer side
    /// immediately. Must be called from within a Tokio runtime.
    pub fn generate(&self, prompt: String) -> Source {
        let (sink, source) = bridge::open(self.buffer);
        let model = Arc::clone(&self.model);
        let max_tokens = self.max_tokens;
        tokio::task::spawn_blocking(move || run_generation(&model, &prompt, max_tokens, sink));

        match self.timeout {
            Some(timeout) => source.with_deadline(timeout),
            None => source,
        }
    }

    /// The whole reply at once. Runs through the same stream as `generate`,
    /// so the token cap, the timeout and cancellation on drop all apply.
    pub async fn complete(&self, prompt: String) -> ChatResult<String> {
        let mut source = self.generate(prompt);
        let mut response = String::new();
        while let Some(chunk) = source.next().await {
            response.push_str(&chunk?);
        }
        Ok(response)
    }
}

fn run_generation(model: &ModelManager, prompt: &str, max_tokens: usize, sink: Sink) {
    let lease = model.acquire();
    if sink.is_cancelled() {
        info!("Consumer left while generation was queued, skipping");
        return;
    }

    info!("Generating response for prompt with max_tokens: {}", max_tokens);
    debug!("Prompt: {}", prompt);

    let mut budget = TokenBudget::new(max_tokens);
    let mut abandoned = false;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        lease.generate(prompt, max_tokens, &mut |piece| {
            if !budget.admit() {
                return ControlFlow::Break(());
            }
            if sink.push(piece).is_err() {
                abandoned = true;
                return ControlFlow::Break(());
            }
            budget.next_step()
        })
    }));
    drop(lease);

    let result = outcome.unwrap_or_else(|payload| {
        Err(anyhow!("generation panicked: {}", panic_message(payload.as_ref())))
    });

    match result {
        Ok(()) if abandoned => {
            info!("Generation abandoned after {} tokens: consumer went away", budget.used());
        }
        Ok(()) => {
            info!("Generation finished with {} tokens", budget.used());
            let _ = sink.finish();
        }
        Err(err) => {
            error!("Generation failed after {} tokens: {:#}", budget.used(), err);
            let _ = sink.fail(err.to_string());
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
