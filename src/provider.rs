use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use reqwest::blocking::Client;

use crate::error::ModelError;
use crate::word_vectors::WordVectors;

pub const DEFAULT_MODEL: &str = "fasttext-simple";

const DOWNLOAD_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(250);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("wordrank-rs/", env!("CARGO_PKG_VERSION"));

/// Source of a loaded model. Ranking code takes a provider instead of a
/// path or URL, so callers choose where vectors come from - memory, a
/// local file, or the download cache.
pub trait ModelProvider {
    fn provide(&self) -> Result<WordVectors, ModelError>;
}

/// A pretrained model the fetcher knows how to obtain.
#[derive(Debug)]
pub struct ModelSpec {
    pub id: &'static str,
    pub file_name: &'static str,
    pub url: &'static str,
    pub dims: usize,
    pub approx_mb: u64,
    pub description: &'static str,
}

pub static MODEL_CATALOG: &[ModelSpec] = &[
    ModelSpec {
        id: "fasttext-simple",
        file_name: "wiki.simple.vec",
        url: "https://dl.fbaipublicfiles.com/fasttext/vectors-wiki/wiki.simple.vec",
        dims: 300,
        approx_mb: 293,
        description: "English fastText vectors trained on Simple English Wikipedia",
    },
    ModelSpec {
        id: "fasttext-en",
        file_name: "wiki.en.vec",
        url: "https://dl.fbaipublicfiles.com/fasttext/vectors-wiki/wiki.en.vec",
        dims: 300,
        approx_mb: 6600,
        description: "English fastText vectors trained on full English Wikipedia",
    },
    ModelSpec {
        id: "fasttext-en-aligned",
        file_name: "wiki.en.align.vec",
        url: "https://dl.fbaipublicfiles.com/fasttext/vectors-aligned/wiki.en.align.vec",
        dims: 300,
        approx_mb: 6500,
        description: "English fastText vectors aligned across languages",
    },
];

pub fn lookup_model(id: &str) -> Option<&'static ModelSpec> {
    MODEL_CATALOG.iter().find(|spec| spec.id == id)
}

/// Cache directory: `WORDRANK_MODELS_DIR` if set, else `models/` under
/// the working directory.
pub fn default_models_dir() -> PathBuf {
    std::env::var_os("WORDRANK_MODELS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("models"))
}

/// A model already in memory.
pub struct PreloadedModel {
    model: WordVectors,
}

impl PreloadedModel {
    pub fn new(model: WordVectors) -> Self {
        PreloadedModel { model }
    }
}

impl ModelProvider for PreloadedModel {
    fn provide(&self) -> Result<WordVectors, ModelError> {
        Ok(self.model.clone())
    }
}

/// A model at an explicit path; never touches the network. Files ending
/// in `.bin` are read as the binary cache format, anything else as text.
pub struct LocalModel {
    path: PathBuf,
}

impl LocalModel {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        LocalModel { path: path.into() }
    }
}

impl ModelProvider for LocalModel {
    fn provide(&self) -> Result<WordVectors, ModelError> {
        if !self.path.exists() {
            return Err(ModelError::NotFound {
                path: self.path.clone(),
            });
        }
        match self.path.extension().and_then(|e| e.to_str()) {
            Some("bin") => WordVectors::read_binary(&self.path),
            _ => WordVectors::from_text_file(&self.path),
        }
    }
}

/// Downloads a catalog model on first use and serves it from the cache
/// directory afterwards. After the first text-format load a `.bin`
/// sibling is written, and later provisions read that instead as long as
/// it is at least as new as the text file.
#[derive(Debug)]
pub struct CachedFetcher {
    spec: &'static ModelSpec,
    models_dir: PathBuf,
    progress: bool,
    offline: bool,
}

impl CachedFetcher {
    pub fn new(id: &str, models_dir: Option<PathBuf>) -> Result<CachedFetcher, ModelError> {
        let Some(spec) = lookup_model(id) else {
            return Err(ModelError::UnknownModel(id.to_string()));
        };
        Ok(CachedFetcher::for_spec(spec, models_dir))
    }

    pub fn for_spec(spec: &'static ModelSpec, models_dir: Option<PathBuf>) -> CachedFetcher {
        CachedFetcher {
            spec,
            models_dir: models_dir.unwrap_or_else(default_models_dir),
            progress: false,
            offline: false,
        }
    }

    /// Show an indicatif byte bar while downloading. Off by default so
    /// library use stays quiet.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Never open a connection: provisioning a model that is not already
    /// in the cache directory fails with [`ModelError::NotFound`]. The
    /// binary-cache fast path still applies.
    pub fn with_offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    pub fn spec(&self) -> &'static ModelSpec {
        self.spec
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn vectors_path(&self) -> PathBuf {
        self.models_dir.join(self.spec.file_name)
    }

    pub fn binary_path(&self) -> PathBuf {
        self.vectors_path().with_extension("bin")
    }

    pub fn is_cached(&self) -> bool {
        is_present(&self.vectors_path())
    }

    /// Make sure the text-format model file exists locally, downloading
    /// it if needed, and return its path.
    pub fn ensure(&self) -> Result<PathBuf, ModelError> {
        let dest = self.vectors_path();
        if is_present(&dest) {
            debug!("{} already cached at {}", self.spec.id, dest.display());
            return Ok(dest);
        }
        if self.offline {
            return Err(ModelError::NotFound { path: dest });
        }

        fs::create_dir_all(&self.models_dir).map_err(|e| ModelError::io(&self.models_dir, e))?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.download_once(&dest) {
                Ok(()) => return Ok(dest),
                Err(e) if attempt < DOWNLOAD_ATTEMPTS => {
                    warn!("download attempt {attempt} failed: {e}; retrying");
                    thread::sleep(RETRY_DELAY);
                }
                Err(e) => return Err(e),
            }
        }
    }

    // Stream the model into `<file>.part` and rename into place only on
    // success, so an interrupted download never leaves a plausible file
    // at the final path.
    fn download_once(&self, dest: &Path) -> Result<(), ModelError> {
        let url = self.spec.url;
        info!(
            "downloading {} (~{} MB) from {url}",
            self.spec.id, self.spec.approx_mb
        );

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(None::<Duration>) // model files are large; no overall deadline
            .build()
            .map_err(|e| ModelError::fetch(url, e))?;

        let response = client.get(url).send().map_err(|e| ModelError::fetch(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ModelError::HttpStatus {
                url: url.to_string(),
                status,
            });
        }

        let total = response.content_length();
        let part = self.models_dir.join(format!("{}.part", self.spec.file_name));
        let mut out = File::create(&part).map_err(|e| ModelError::io(&part, e))?;

        let copied = if self.progress {
            let bar = download_bar(total);
            let mut reader = bar.wrap_read(response);
            let copied = io::copy(&mut reader, &mut out);
            bar.finish_and_clear();
            copied
        } else {
            let mut reader = response;
            io::copy(&mut reader, &mut out)
        };

        let written = match copied {
            Ok(n) => n,
            Err(e) => {
                let _ = fs::remove_file(&part);
                return Err(ModelError::io(&part, e));
            }
        };
        drop(out);

        if let Some(expected) = total {
            if written != expected {
                let _ = fs::remove_file(&part);
                return Err(ModelError::malformed(
                    &part,
                    format!("incomplete download: {written} of {expected} bytes"),
                ));
            }
        }

        fs::rename(&part, dest).map_err(|e| ModelError::io(dest, e))?;
        info!("downloaded {} ({written} bytes) to {}", self.spec.id, dest.display());
        Ok(())
    }

    /// Delete the cache directory and everything in it.
    pub fn clear_cache(&self) -> Result<(), ModelError> {
        match fs::remove_dir_all(&self.models_dir) {
            Ok(()) => {
                info!("removed model cache {}", self.models_dir.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ModelError::io(&self.models_dir, e)),
        }
    }

    /// Total bytes of all files in the cache directory.
    pub fn cache_size(&self) -> Result<u64, ModelError> {
        let entries = match fs::read_dir(&self.models_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(ModelError::io(&self.models_dir, e)),
        };

        let mut total = 0;
        for entry in entries {
            let entry = entry.map_err(|e| ModelError::io(&self.models_dir, e))?;
            let meta = entry
                .metadata()
                .map_err(|e| ModelError::io(&entry.path(), e))?;
            if meta.is_file() {
                total += meta.len();
            }
        }
        Ok(total)
    }
}

impl ModelProvider for CachedFetcher {
    fn provide(&self) -> Result<WordVectors, ModelError> {
        let text = self.ensure()?;
        let bin = self.binary_path();

        if binary_is_fresh(&bin, &text) {
            match WordVectors::read_binary(&bin) {
                Ok(model) => return Ok(model),
                Err(e) => warn!("ignoring unreadable cache {}: {e}", bin.display()),
            }
        }

        let model = WordVectors::from_text_file(&text)?;
        match model.write_binary(&bin) {
            Ok(()) => info!("wrote binary cache {}", bin.display()),
            Err(e) => warn!("could not write binary cache {}: {e}", bin.display()),
        }
        Ok(model)
    }
}

fn is_present(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file() && m.len() > 0).unwrap_or(false)
}

// A stale binary cache shadowing a newer text file would serve old
// vectors, so freshness is mtime-based and doubt means stale.
fn binary_is_fresh(bin: &Path, text: &Path) -> bool {
    let (Ok(bin_meta), Ok(text_meta)) = (fs::metadata(bin), fs::metadata(text)) else {
        return false;
    };
    if bin_meta.len() == 0 {
        return false;
    }
    match (bin_meta.modified(), text_meta.modified()) {
        (Ok(b), Ok(t)) => b >= t,
        _ => false,
    }
}

fn download_bar(total: Option<u64>) -> ProgressBar {
    match total {
        Some(len) => {
            let bar = ProgressBar::new(len);
            bar.set_style(
                ProgressStyle::with_template(
                    "[{bar:30.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, eta {eta})",
                )
                .unwrap()
                .progress_chars("#>-"),
            );
            bar
        }
        None => {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template("{spinner} {bytes} ({bytes_per_sec})").unwrap(),
            );
            bar
        }
    }
}
