use std::fs;
use std::io;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use wordrank_rs::{CachedFetcher, ModelProvider, DEFAULT_MODEL, MODEL_CATALOG};

#[derive(Parser, Debug)]
#[command(author, version, about = "Download and cache word-vector models", long_about = None)]
struct Args {
    /// Catalog id of the model to fetch
    #[arg(value_name = "MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Model cache directory (else WORDRANK_MODELS_DIR, else models/)
    #[arg(long, value_name = "DIR")]
    models_dir: Option<PathBuf>,

    /// List catalog models and their cache status
    #[arg(long)]
    list: bool,

    /// Re-download even when the model is already cached
    #[arg(long)]
    force: bool,

    /// Delete the model cache directory
    #[arg(long)]
    clear: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.list {
        list_catalog(&args);
        return Ok(());
    }

    let fetcher = CachedFetcher::new(&args.model, args.models_dir.clone())?.with_progress(true);

    if args.clear {
        let freed = fetcher.cache_size()?;
        fetcher.clear_cache()?;
        println!(
            "Cleared {} ({} MB)",
            fetcher.models_dir().display(),
            freed / (1024 * 1024)
        );
        return Ok(());
    }

    if args.force {
        for path in [fetcher.vectors_path(), fetcher.binary_path()] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("removing {}", path.display()));
                }
            }
        }
    }

    let path = fetcher.ensure().context("fetching model")?;
    // Load once now; this also writes the binary cache, so the first
    // rank_words run starts fast.
    let model = fetcher.provide().context("loading model")?;
    println!(
        "{}: {} words, {} dims at {}",
        fetcher.spec().id,
        model.len(),
        model.dims(),
        path.display()
    );

    Ok(())
}

fn list_catalog(args: &Args) {
    println!(
        "{:<20} {:>5} {:>9} {:>7}  Description",
        "Id", "Dims", "Size", "Cached"
    );
    println!("{}", "-".repeat(78));
    for spec in MODEL_CATALOG {
        let fetcher = CachedFetcher::for_spec(spec, args.models_dir.clone());
        println!(
            "{:<20} {:>5} {:>6} MB {:>7}  {}",
            spec.id,
            spec.dims,
            spec.approx_mb,
            if fetcher.is_cached() { "yes" } else { "no" },
            spec.description
        );
    }
}
