pub mod bridge;
pub mod prompt;
pub mod worker;

pub use bridge::{Cancelled, Sink, Source, StreamState};
pub use prompt::{build_prompt, render_prompt};
pub use worker::GenerationWorker;
