use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;

use wordrank_rs::{
    lookup_model, rank_labels, read_labels, similar_words, CachedFetcher, LocalModel, Match,
    ModelProvider, DEFAULT_MODEL,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Rank candidate labels by similarity to a query word", long_about = None)]
struct Args {
    /// Newline-delimited candidate labels
    #[arg(long, default_value = "data/coco.names", value_name = "FILE")]
    names: PathBuf,

    /// How many matches to print
    #[arg(short = 'n', long = "top", default_value_t = 3, value_name = "N")]
    top: usize,

    /// Catalog model id or path to a local vector file
    #[arg(long, default_value = DEFAULT_MODEL, value_name = "ID|PATH")]
    model: String,

    /// Model cache directory (else WORDRANK_MODELS_DIR, else models/)
    #[arg(long, value_name = "DIR")]
    models_dir: Option<PathBuf>,

    /// Never download; use only models already on disk
    #[arg(long)]
    offline: bool,

    /// Print the similarity score column
    #[arg(long)]
    scores: bool,

    /// Query words (reads words interactively when omitted)
    #[arg(value_name = "WORD")]
    words: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let provider = resolve_provider(&args)?;

    if args.words.is_empty() {
        interactive(provider.as_ref(), &args)
    } else {
        for word in &args.words {
            let matches = similar_words(provider.as_ref(), word, &args.names, args.top)
                .with_context(|| format!("ranking '{word}'"))?;
            print_matches(word, &matches, args.scores);
        }
        Ok(())
    }
}

// A catalog id resolves to the download cache (which never touches the
// network with --offline); anything else must be a vector file on disk.
fn resolve_provider(args: &Args) -> anyhow::Result<Box<dyn ModelProvider>> {
    if let Some(spec) = lookup_model(&args.model) {
        let fetcher = CachedFetcher::for_spec(spec, args.models_dir.clone())
            .with_progress(true)
            .with_offline(args.offline);
        return Ok(Box::new(fetcher));
    }

    let path = Path::new(&args.model);
    if path.exists() {
        return Ok(Box::new(LocalModel::new(path)));
    }
    anyhow::bail!(
        "'{}' is neither a catalog model id nor an existing file (see fetch_model --list)",
        args.model
    );
}

fn interactive(provider: &dyn ModelProvider, args: &Args) -> anyhow::Result<()> {
    let labels = read_labels(&args.names)
        .with_context(|| format!("reading labels from {}", args.names.display()))?;
    let model = provider.provide().context("loading model")?;

    println!("Rank Words Tool - Type 'EXIT' to quit\n");
    loop {
        print!("Enter a query word: ");
        io::stdout().flush()?;
        let Some(word) = get_input()? else {
            println!("Goodbye!");
            break;
        };
        if word == "EXIT" {
            println!("Goodbye!");
            break;
        }
        if word.is_empty() {
            println!("No word was input. Try again");
            continue;
        }

        match rank_labels(&model, &word, &labels, args.top) {
            Ok(matches) => print_matches(&word, &matches, args.scores),
            Err(e) => println!("{e}"),
        }
    }

    Ok(())
}

// None on EOF, so a piped stdin ends the loop cleanly.
fn get_input() -> io::Result<Option<String>> {
    let mut s = String::new();
    if io::stdin().read_line(&mut s)? == 0 {
        return Ok(None);
    }
    Ok(Some(s.trim().to_string()))
}

fn print_matches(word: &str, matches: &[Match], scores: bool) {
    if matches.is_empty() {
        println!("No matches for '{word}'");
        return;
    }

    println!("\nLabels most similar to '{word}':");
    if scores {
        println!("{:>4} {:>10} Label", "Rank", "Score");
        println!("{}", "-".repeat(30));
        for (i, m) in matches.iter().enumerate() {
            println!("{:4}: {:10.6} {}", i + 1, m.score, m.label);
        }
    } else {
        for (i, m) in matches.iter().enumerate() {
            println!("{:4}: {}", i + 1, m.label);
        }
    }
}
