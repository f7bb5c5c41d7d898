//! Shared harness for the end-to-end journeys.
//!
//! Provides a temp-dir engine factory plus deterministic mock collaborators
//! so the journeys exercise the real storage/journal/vector plumbing
//! without network providers.

use std::sync::Arc;

use mnemo_core::{
    Chat, ChatOptions, Embedder, Memory, MemoryConfig, ProviderError,
};

/// Open an engine rooted in `dir` with no collaborators
pub fn engine_in(dir: &std::path::Path) -> Memory {
    Memory::open(MemoryConfig::in_dir(dir)).expect("engine opens")
}

/// Open an engine with the deterministic mock embedder wired in
pub fn engine_with_embedder(dir: &std::path::Path) -> Memory {
    let mut config = MemoryConfig::in_dir(dir);
    config.embedder = Some(Arc::new(MockEmbedder::default()));
    Memory::open(config).expect("engine opens")
}

/// Deterministic bag-of-characters embedder. Texts sharing vocabulary get
/// nearby vectors, which is all the ANN journeys need.
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    pub dimensions: usize,
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self { dimensions: 64 }
    }
}

impl Embedder for MockEmbedder {
    fn dim(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let mut vector = vec![0.0_f32; self.dimensions];
        for token in text.to_lowercase().split_whitespace() {
            let mut bucket = 0usize;
            for byte in token.bytes() {
                bucket = (bucket * 31 + byte as usize) % self.dimensions;
            }
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }
}

/// Chat stub that answers every classification with a fixed line
pub struct ScriptedChat {
    pub reply: String,
}

impl Chat for ScriptedChat {
    fn complete(
        &self,
        _model: &str,
        _prompt: &str,
        _opts: &ChatOptions,
    ) -> Result<String, ProviderError> {
        Ok(self.reply.clone())
    }
}
