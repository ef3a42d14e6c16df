use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::debug;
use rayon::prelude::*;

use crate::error::ModelError;

const EPS: f64 = 1e-8;

// Binary cache layout: magic, version, word count, dims, length-prefixed
// word table, then the raw little-endian f64 block.
const BINARY_MAGIC: &[u8; 4] = b"WVEC";
const BINARY_VERSION: u32 = 1;

// Caps so a corrupt cache header cannot demand absurd allocations.
const MAX_WORD_LEN: usize = 4096;
const MAX_DIMS: usize = 4096;
const MAX_WORDS: usize = 1 << 27;

// A struct to hold word vectors in a contiguous array for performance.
// Every stored vector is unit length (or exactly zero), so cosine
// similarity between any two of them is a plain dot product.
#[derive(Clone, Debug)]
pub struct WordVectors {
    words: Vec<String>,               // vocabulary - index to word map
    word_map: HashMap<String, usize>, // word to index map
    vectors: Vec<f64>,                // A single, flattened Vec of all vector data
    dims: usize,                      // The dimension of each vector
}

impl WordVectors {
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn get_word(&self, idx: usize) -> &str {
        &self.words[idx]
    }

    pub fn get_index(&self, word: &str) -> Option<usize> {
        self.word_map.get(word).copied()
    }

    fn get_vector(&self, idx: usize) -> &[f64] {
        &self.vectors[idx * self.dims..(idx + 1) * self.dims]
    }

    // Read word vectors from a text file - normalises vectors it reads to
    // unit length. Accepts both the plain GloVe layout (one vector per line)
    // and the word2vec text layout with a "<count> <dims>" first line.
    pub fn from_text_file(path: &Path) -> Result<WordVectors, ModelError> {
        let file = File::open(path).map_err(|e| ModelError::io(path, e))?;
        let reader = BufReader::new(file);

        let mut words: Vec<String> = Vec::new();
        let mut word_map: HashMap<String, usize> = HashMap::new();
        let mut vectors: Vec<f64> = Vec::new();
        let mut dims: usize = 0; // Dimension will be determined from the first vector

        for (index, line_result) in reader.lines().enumerate() {
            let line = line_result.map_err(|e| ModelError::io(path, e))?;

            if index == 0 {
                if let Some((count, d)) = parse_header(&line) {
                    words.reserve(count);
                    word_map.reserve(count);
                    vectors.reserve(count.saturating_mul(d));
                    continue;
                }
            }

            let mut parts = line.split_whitespace();
            let Some(key) = parts.next() else {
                continue; // blank line
            };

            let mut values: Vec<f64> = parts
                .map(|s| s.parse::<f64>())
                .collect::<Result<_, _>>()
                .map_err(|e| ModelError::malformed(path, format!("line {}: {e}", index + 1)))?;

            if values.iter().any(|v| !v.is_finite()) {
                return Err(ModelError::malformed(
                    path,
                    format!("line {}: non-finite value", index + 1),
                ));
            }

            if dims == 0 {
                dims = values.len();
                if dims == 0 {
                    return Err(ModelError::malformed(
                        path,
                        format!("line {}: first vector has zero dimensions", index + 1),
                    ));
                }
            } else if values.len() != dims {
                // Ensure all subsequent vectors have the same dimension
                return Err(ModelError::malformed(
                    path,
                    format!(
                        "line {}: vector for '{key}' has dimension {} which differs from initial dimension {dims}",
                        index + 1,
                        values.len()
                    ),
                ));
            }

            let norm: f64 = values.iter().map(|x| x * x).sum::<f64>().sqrt();
            if norm > EPS {
                values.iter_mut().for_each(|e| *e /= norm);
            }

            word_map.insert(key.to_string(), words.len());
            words.push(key.to_string());
            vectors.extend_from_slice(&values);
        }

        if words.is_empty() {
            return Err(ModelError::malformed(path, "no word vectors found"));
        }

        debug!(
            "loaded {} words of {} dims from {}",
            words.len(),
            dims,
            path.display()
        );

        Ok(WordVectors {
            words,
            word_map,
            vectors,
            dims,
        })
    }

    /// Write the model in the crate's compact binary cache format.
    /// Loading it back is much faster than re-parsing the text file.
    pub fn write_binary(&self, path: &Path) -> Result<(), ModelError> {
        self.write_binary_inner(path)
            .map_err(|e| ModelError::io(path, e))
    }

    fn write_binary_inner(&self, path: &Path) -> std::io::Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        out.write_all(BINARY_MAGIC)?;
        out.write_u32::<LittleEndian>(BINARY_VERSION)?;
        out.write_u32::<LittleEndian>(self.words.len() as u32)?;
        out.write_u32::<LittleEndian>(self.dims as u32)?;
        for word in &self.words {
            out.write_u32::<LittleEndian>(word.len() as u32)?;
            out.write_all(word.as_bytes())?;
        }
        out.write_all(bytemuck::cast_slice(&self.vectors))?;
        out.flush()
    }

    /// Read a model previously written with [`WordVectors::write_binary`].
    pub fn read_binary(path: &Path) -> Result<WordVectors, ModelError> {
        let io = |e: std::io::Error| ModelError::io(path, e);
        let mut reader = BufReader::new(File::open(path).map_err(io)?);

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic).map_err(io)?;
        if &magic != BINARY_MAGIC {
            return Err(ModelError::malformed(path, "not a word-vector cache"));
        }
        let version = reader.read_u32::<LittleEndian>().map_err(io)?;
        if version != BINARY_VERSION {
            return Err(ModelError::malformed(
                path,
                format!("unsupported cache version {version}"),
            ));
        }

        let count = reader.read_u32::<LittleEndian>().map_err(io)? as usize;
        let dims = reader.read_u32::<LittleEndian>().map_err(io)? as usize;
        if count == 0 || count > MAX_WORDS || dims == 0 || dims > MAX_DIMS {
            return Err(ModelError::malformed(
                path,
                format!("implausible shape: {count} words, {dims} dims"),
            ));
        }

        let mut words: Vec<String> = Vec::with_capacity(count);
        let mut word_map: HashMap<String, usize> = HashMap::with_capacity(count);
        for _ in 0..count {
            let len = reader.read_u32::<LittleEndian>().map_err(io)? as usize;
            if len > MAX_WORD_LEN {
                return Err(ModelError::malformed(path, "implausible word length"));
            }
            let mut buf = vec![0u8; len];
            reader.read_exact(&mut buf).map_err(io)?;
            let word = String::from_utf8(buf)
                .map_err(|_| ModelError::malformed(path, "invalid utf-8 in word table"))?;
            word_map.insert(word.clone(), words.len());
            words.push(word);
        }

        let mut vectors = vec![0.0f64; count * dims];
        reader
            .read_exact(bytemuck::cast_slice_mut::<f64, u8>(vectors.as_mut_slice()))
            .map_err(io)?;
        if vectors.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::malformed(path, "non-finite value in vector block"));
        }

        debug!(
            "loaded {count} words of {dims} dims from cache {}",
            path.display()
        );

        Ok(WordVectors {
            words,
            word_map,
            vectors,
            dims,
        })
    }

    /// Embedding of a word or whitespace-separated phrase: tokens are
    /// lowercased, the vectors of in-vocabulary tokens are summed and the
    /// sum is normalized. Returns `None` when no token is in vocabulary.
    pub fn embed(&self, text: &str) -> Option<Vec<f64>> {
        let mut sum = vec![0.0; self.dims];
        let mut known = 0usize;

        for token in text.split_whitespace() {
            let token = token.to_lowercase();
            if let Some(idx) = self.get_index(&token) {
                let word_vec = self.get_vector(idx);
                for (s, v) in sum.iter_mut().zip(word_vec) {
                    *s += v;
                }
                known += 1;
            }
        }

        if known == 0 {
            return None;
        }

        let norm: f64 = sum.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm > EPS {
            sum.iter_mut().for_each(|e| *e /= norm);
        }

        Some(sum)
    }

    /// Cosine similarity between the phrase embeddings of `a` and `b`;
    /// `None` when either side is fully out of vocabulary.
    pub fn similarity(&self, a: &str, b: &str) -> Option<f64> {
        let va = self.embed(a)?;
        let vb = self.embed(b)?;
        Some(dot(&va, &vb))
    }

    /// Top-`n` vocabulary words nearest to the phrase embedding of `text`,
    /// excluding the query's own tokens. Returns `(index, score)` pairs in
    /// descending-score order; equal scores resolve to the lower index.
    pub fn nearest(&self, text: &str, n: usize) -> Option<Vec<(usize, f64)>> {
        let target = self.embed(text)?;

        let exclude: HashSet<usize> = text
            .split_whitespace()
            .filter_map(|t| self.get_index(&t.to_lowercase()))
            .collect();

        // Parallel scan over contiguous memory; collect keeps index order.
        let scores: Vec<(usize, f64)> = self
            .vectors
            .par_chunks_exact(self.dims)
            .enumerate()
            .filter(|(i, _)| !exclude.contains(i))
            .map(|(i, v_slice)| (i, dot(v_slice, &target)))
            .collect();

        Some(top_n(scores, n))
    }
}

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

// word2vec-style text files carry a "<count> <dims>" first line; GloVe
// files start directly with a vector.
fn parse_header(line: &str) -> Option<(usize, usize)> {
    let mut parts = line.split_whitespace();
    let count = parts.next()?.parse().ok()?;
    let dims = parts.next()?.parse().ok()?;
    match parts.next() {
        None => Some((count, dims)),
        Some(_) => None,
    }
}

// Partial top-n selection over (index, score) pairs. Generally faster
// than a full sort when n is small compared to scores.len().
//
// The comparator is a total order - score descending, then index
// ascending - so equal scores resolve to input order and the result never
// depends on selection internals or thread count.
pub(crate) fn top_n(mut scores: Vec<(usize, f64)>, n: usize) -> Vec<(usize, f64)> {
    if n == 0 {
        return Vec::new();
    }
    if n < scores.len() {
        scores.select_nth_unstable_by(n, rank_cmp);
        scores.truncate(n);
    }
    scores.sort_by(rank_cmp);
    scores
}

fn rank_cmp(a: &(usize, f64), b: &(usize, f64)) -> Ordering {
    b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    // dog/puppy point the same general way, the rest are orthogonal.
    pub(crate) const FIXTURE: &str = "\
dog 1 0 0 0
puppy 0.8 0.6 0 0
cat 0 1 0 0
car 0 0 1 0
banana 0 0 0 1
";

    pub(crate) fn fixture_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    pub(crate) fn fixture_model() -> WordVectors {
        let file = fixture_file(FIXTURE);
        WordVectors::from_text_file(file.path()).unwrap()
    }

    #[test]
    fn loads_plain_text_format() {
        let model = fixture_model();
        assert_eq!(model.len(), 5);
        assert_eq!(model.dims(), 4);
        assert_eq!(model.get_index("dog"), Some(0));
        assert_eq!(model.get_word(0), "dog");
        assert_eq!(model.get_index("zebra"), None);
    }

    #[test]
    fn loads_word2vec_header_format() {
        let file = fixture_file(&format!("5 4\n{FIXTURE}"));
        let model = WordVectors::from_text_file(file.path()).unwrap();
        assert_eq!(model.len(), 5);
        assert_eq!(model.dims(), 4);
        assert_eq!(model.get_index("banana"), Some(4));
    }

    #[test]
    fn vectors_are_normalized_on_load() {
        let file = fixture_file("big 3 0 0 0\ndog 1 0 0 0\n");
        let model = WordVectors::from_text_file(file.path()).unwrap();
        let sim = model.similarity("big", "dog").unwrap();
        assert!((sim - 1.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_dimension_mismatch() {
        let file = fixture_file("dog 1 0\ncat 1\n");
        let err = WordVectors::from_text_file(file.path()).unwrap_err();
        assert!(matches!(err, ModelError::Malformed { .. }));
        assert!(err.to_string().contains("cat"));
    }

    #[test]
    fn rejects_unparsable_value() {
        let file = fixture_file("dog 1 x\n");
        let err = WordVectors::from_text_file(file.path()).unwrap_err();
        assert!(matches!(err, ModelError::Malformed { .. }));
    }

    #[test]
    fn rejects_empty_file() {
        let file = fixture_file("");
        let err = WordVectors::from_text_file(file.path()).unwrap_err();
        assert!(matches!(err, ModelError::Malformed { .. }));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = WordVectors::from_text_file(Path::new("no/such/vectors.txt")).unwrap_err();
        assert!(matches!(err, ModelError::Io { .. }));
    }

    #[test]
    fn embed_sums_and_normalizes_phrases() {
        let model = fixture_model();
        let v = model.embed("dog cat").unwrap();
        // normalize((1,1,0,0)) dotted with (1,0,0,0)
        let sim = dot(&v, &model.embed("dog").unwrap());
        assert!((sim - 1.0 / 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn embed_ignores_unknown_tokens() {
        let model = fixture_model();
        let with_noise = model.embed("dog xyzzy").unwrap();
        let plain = model.embed("dog").unwrap();
        assert_eq!(with_noise, plain);
        assert!(model.embed("xyzzy quux").is_none());
    }

    #[test]
    fn embed_lowercases_tokens() {
        let model = fixture_model();
        let sim = model.similarity("DOG", "dog").unwrap();
        assert!((sim - 1.0).abs() < 1e-12);
    }

    #[test]
    fn binary_cache_round_trips() {
        let model = fixture_model();
        let out = NamedTempFile::new().unwrap();
        model.write_binary(out.path()).unwrap();

        let reloaded = WordVectors::read_binary(out.path()).unwrap();
        assert_eq!(reloaded.len(), model.len());
        assert_eq!(reloaded.dims(), model.dims());
        assert_eq!(reloaded.get_index("puppy"), model.get_index("puppy"));
        let sim = reloaded.similarity("dog", "puppy").unwrap();
        assert!((sim - 0.8).abs() < 1e-12);
    }

    #[test]
    fn read_binary_rejects_foreign_files() {
        let file = fixture_file("definitely not a cache file");
        let err = WordVectors::read_binary(file.path()).unwrap_err();
        assert!(matches!(err, ModelError::Malformed { .. }));
    }

    #[test]
    fn read_binary_rejects_non_finite_values() {
        // A well-formed cache whose vector block smuggles in a NaN.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(BINARY_MAGIC);
        bytes.write_u32::<LittleEndian>(BINARY_VERSION).unwrap();
        bytes.write_u32::<LittleEndian>(1).unwrap(); // count
        bytes.write_u32::<LittleEndian>(2).unwrap(); // dims
        bytes.write_u32::<LittleEndian>(1).unwrap();
        bytes.extend_from_slice(b"a");
        bytes.write_f64::<LittleEndian>(f64::NAN).unwrap();
        bytes.write_f64::<LittleEndian>(0.5).unwrap();

        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), &bytes).unwrap();

        let err = WordVectors::read_binary(file.path()).unwrap_err();
        assert!(matches!(err, ModelError::Malformed { .. }));
        assert!(err.to_string().contains("non-finite"));
    }

    #[test]
    fn nearest_excludes_query_and_breaks_ties_by_index() {
        let model = fixture_model();
        let hits = model.nearest("dog", 2).unwrap();
        // puppy scores 0.8; cat/car/banana all tie at 0.0, so the lowest
        // index (cat) takes the second slot.
        assert_eq!(hits.len(), 2);
        assert_eq!(model.get_word(hits[0].0), "puppy");
        assert!((hits[0].1 - 0.8).abs() < 1e-12);
        assert_eq!(model.get_word(hits[1].0), "cat");
    }

    #[test]
    fn nearest_of_unknown_text_is_none() {
        let model = fixture_model();
        assert!(model.nearest("xyzzy", 3).is_none());
    }

    #[test]
    fn top_n_handles_degenerate_counts() {
        let scores = vec![(0, 0.1), (1, 0.9), (2, 0.5)];
        assert!(top_n(scores.clone(), 0).is_empty());
        assert_eq!(top_n(scores.clone(), 3), vec![(1, 0.9), (2, 0.5), (0, 0.1)]);
        assert_eq!(top_n(scores, 10), vec![(1, 0.9), (2, 0.5), (0, 0.1)]);
    }

    #[test]
    fn top_n_ties_resolve_to_input_order() {
        let scores = vec![(0, 0.5), (1, 0.5), (2, 0.5), (3, 0.5)];
        assert_eq!(top_n(scores, 2), vec![(0, 0.5), (1, 0.5)]);
    }

    #[test]
    fn top_n_stays_total_for_non_finite_scores() {
        // Loaders reject non-finite values, but the comparator must stay a
        // total order for anything it is handed or the sort can panic.
        let scores = vec![(0, f64::NAN), (1, 0.9), (2, f64::NAN), (3, 0.5)];
        let got = top_n(scores, 4);
        assert_eq!(got.len(), 4);
        let finite: Vec<usize> = got
            .iter()
            .filter(|(_, s)| s.is_finite())
            .map(|(i, _)| *i)
            .collect();
        assert_eq!(finite, vec![1, 3]);
    }
}
