//! Rank candidate labels by word-embedding similarity to a query word.
//!
//! The library loads pretrained word vectors (fastText/GloVe text format,
//! with an optional binary cache for fast reloads), obtains models through
//! a [`ModelProvider`], and ranks label lists with a deterministic
//! tie-break. The `rank_words` and `fetch_model` binaries are thin CLI
//! wrappers over this API.

pub mod error;
pub mod labels;
pub mod provider;
pub mod ranker;
pub mod word_vectors;

pub use error::{ModelError, RankError};
pub use labels::read_labels;
pub use provider::{
    default_models_dir, lookup_model, CachedFetcher, LocalModel, ModelProvider, ModelSpec,
    PreloadedModel, DEFAULT_MODEL, MODEL_CATALOG,
};
pub use ranker::{rank_labels, similar_words, Match};
pub use word_vectors::WordVectors;
