//! Generation tokens for stale-result detection
//!
//! A round trip through the host cannot be aborted once sent. Instead every
//! navigation advances a shared generation counter and each pipeline carries
//! the generation it started under. Before committing anything to shared
//! state the pipeline checks that its generation is still the current one;
//! superseded pipelines finish their in-flight call and drop the result.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// Shared, monotonically increasing generation
#[derive(Clone, Debug, Default)]
pub struct GenerationCounter {
    current: Arc<AtomicU64>,
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new generation, invalidating every earlier token
    pub fn advance(&self) -> GenerationToken {
        let generation = self.current.fetch_add(1, Ordering::AcqRel) + 1;
        GenerationToken {
            generation,
            current: self.current.clone(),
        }
    }

    /// Token for the current generation, without advancing
    pub fn token(&self) -> GenerationToken {
        GenerationToken {
            generation: self.current(),
            current: self.current.clone(),
        }
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }
}

/// The generation a pipeline was started under
#[derive(Clone, Debug)]
pub struct GenerationToken {
    generation: u64,
    current: Arc<AtomicU64>,
}

impl GenerationToken {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether no newer generation has been started since this token
    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::Acquire) == self.generation
    }

    pub fn is_stale(&self) -> bool {
        !self.is_current()
    }
}
