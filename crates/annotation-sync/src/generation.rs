use std::future::Future;

use tokio_util::sync::CancellationToken;

/// One cancellation token per active-segment generation.
///
/// Advancing cancels the previous token, so anything still computing for an
/// older segment stops (or at least has its result dropped).
#[derive(Debug)]
pub struct Generations {
    current: u64,
    token: CancellationToken,
}

impl Generations {
    pub fn new() -> Self {
        Self {
            current: 0,
            token: CancellationToken::new(),
        }
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn advance(&mut self, generation: u64) {
        if generation == self.current {
            return;
        }
        self.token.cancel();
        self.token = CancellationToken::new();
        self.current = generation;
    }

    pub fn guard(&self) -> GenerationGuard {
        GenerationGuard {
            generation: self.current,
            token: self.token.clone(),
        }
    }
}

impl Default for Generations {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Generations {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[derive(Debug, Clone)]
pub struct GenerationGuard {
    generation: u64,
    token: CancellationToken,
}

impl GenerationGuard {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// `None` if the generation ended before `fut` finished.
    pub async fn run<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            out = fut => Some(out),
        }
    }
}
