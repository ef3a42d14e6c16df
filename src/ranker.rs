use std::path::Path;

use log::{debug, warn};
use rayon::prelude::*;

use crate::error::RankError;
use crate::labels::read_labels;
use crate::provider::ModelProvider;
use crate::word_vectors::{dot, top_n, WordVectors};

/// One ranked candidate. `index` is the label's position in the input
/// list, which is also the tie-break rank for equal scores.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub index: usize,
    pub label: String,
    pub score: f64,
}

/// Rank candidate labels by cosine similarity to `word` and return the
/// top `n` in descending-score order.
///
/// Labels that are fully out of vocabulary score 0.0. Equal scores
/// resolve to the label that appears first in the input, so the result
/// is identical across runs and thread counts. An out-of-vocabulary
/// query is an error - every score would be meaningless.
pub fn rank_labels(
    model: &WordVectors,
    word: &str,
    labels: &[String],
    n: usize,
) -> Result<Vec<Match>, RankError> {
    let Some(target) = model.embed(word) else {
        return Err(RankError::UnknownWord(word.to_string()));
    };

    let scores: Vec<(usize, f64)> = labels
        .par_iter()
        .enumerate()
        .map(|(i, label)| {
            let score = match model.embed(label) {
                Some(v) => dot(&v, &target),
                None => 0.0,
            };
            (i, score)
        })
        .collect();

    let matches = top_n(scores, n)
        .into_iter()
        .map(|(index, score)| Match {
            index,
            label: labels[index].clone(),
            score,
        })
        .collect();

    Ok(matches)
}

/// End-to-end pipeline: read the names file, obtain a model from the
/// provider, rank. Failures are typed; nothing here touches the exit
/// code.
pub fn similar_words(
    provider: &dyn ModelProvider,
    word: &str,
    names_path: &Path,
    n: usize,
) -> Result<Vec<Match>, RankError> {
    let labels = read_labels(names_path)?;
    if labels.is_empty() {
        warn!("no labels in {}", names_path.display());
        return Ok(Vec::new());
    }

    let model = provider.provide()?;
    debug!(
        "ranking {} labels against '{word}' in a {}-dim model",
        labels.len(),
        model.dims()
    );

    rank_labels(&model, word, &labels, n)
}
