use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use gm_core::{Classifier, ClassifierConfig, HAM_CUTOFF, SPAM_CUTOFF, WordStore};
use gm_store::{ImmutableHashStore, IncrementalStore, SnapshotStore};

#[derive(Parser)]
#[command(name = "gm", about = "Statistical graymail classifier")]
struct Cli {
    /// Database file (default: GM_DB env var, then ./graymail.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Storage backend
    #[arg(long, global = true, value_enum, default_value_t = Backend::Snapshot)]
    backend: Backend,

    /// Also train and score adjacent token pairs
    #[arg(long, global = true)]
    bigrams: bool,

    /// TOML file overriding classifier tuning knobs
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// JSON snapshot rewritten on every save
    Snapshot,
    /// SQLite database with incremental flushes
    Sqlite,
    /// Constant-database file rebuilt on save
    Cdb,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Class {
    Spam,
    Ham,
}

impl Class {
    fn label(self) -> &'static str {
        match self {
            Class::Spam => "spam",
            Class::Ham => "ham",
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Learn each input file as one message of the given class
    Train {
        #[arg(value_enum)]
        class: Class,

        /// Message file(s), one message per file
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Reverse an earlier training pass
    Untrain {
        #[arg(value_enum)]
        class: Class,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Score each input file, printing score and verdict
    Score {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Also print the clues behind each verdict
        #[arg(long)]
        evidence: bool,
    },

    /// Show database statistics
    Info,
}

fn db_path(cli: &Cli) -> PathBuf {
    cli.db
        .clone()
        .or_else(|| std::env::var("GM_DB").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("graymail.db"))
}

fn load_config(cli: &Cli) -> Result<ClassifierConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str(&text)
                .with_context(|| format!("failed to parse {}", path.display()))?
        }
        None => ClassifierConfig::default(),
    };
    if cli.bigrams {
        config.use_bigrams = true;
    }
    Ok(config)
}

fn open_classifier(cli: &Cli) -> Result<Classifier<Box<dyn WordStore>>> {
    let path = db_path(cli);
    let store: Box<dyn WordStore> = match cli.backend {
        Backend::Snapshot => Box::new(SnapshotStore::open(&path)),
        Backend::Sqlite => Box::new(
            IncrementalStore::open(&path)
                .with_context(|| format!("failed to open {}", path.display()))?,
        ),
        Backend::Cdb => Box::new(ImmutableHashStore::open(&path)),
    };
    Classifier::with_config(store, load_config(cli)?).context("failed to load database")
}

/// Lowercased whitespace-separated words. Deliberately simple; anything
/// smarter belongs in a dedicated tokenizer feeding the library directly.
fn tokenize(text: &str) -> Vec<Vec<u8>> {
    text.split_whitespace()
        .map(|w| w.to_lowercase().into_bytes())
        .collect()
}

fn read_message(path: &PathBuf) -> Result<Vec<Vec<u8>>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(tokenize(&text))
}

fn verdict(score: f64) -> &'static str {
    if score >= SPAM_CUTOFF {
        "spam"
    } else if score <= HAM_CUTOFF {
        "ham"
    } else {
        "unsure"
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Train { class, files } => cmd_train(&cli, *class, files, false),
        Commands::Untrain { class, files } => cmd_train(&cli, *class, files, true),
        Commands::Score { files, evidence } => cmd_score(&cli, files, *evidence),
        Commands::Info => cmd_info(&cli),
    }
}

fn cmd_train(cli: &Cli, class: Class, files: &[PathBuf], reverse: bool) -> Result<()> {
    let mut classifier = open_classifier(cli)?;

    for path in files {
        let tokens = read_message(path)?;
        if reverse {
            classifier
                .unlearn(&tokens, class == Class::Spam)
                .with_context(|| format!("failed to untrain {}", path.display()))?;
        } else {
            classifier
                .learn(&tokens, class == Class::Spam)
                .with_context(|| format!("failed to train {}", path.display()))?;
        }
    }

    classifier.store().context("failed to save database")?;
    classifier.close().context("failed to close database")?;

    let action = if reverse { "untrained" } else { "trained" };
    println!(
        "{action} {} {} message(s). nspam={}, nham={}",
        files.len(),
        class.label(),
        classifier.nspam(),
        classifier.nham()
    );
    Ok(())
}

fn cmd_score(cli: &Cli, files: &[PathBuf], evidence: bool) -> Result<()> {
    let mut classifier = open_classifier(cli)?;

    for path in files {
        let tokens = read_message(path)?;
        if evidence {
            let (score, clues) = classifier
                .spamprob_with_evidence(&tokens)
                .context("failed to score message")?;
            println!("{score:.4} {} {}", verdict(score), path.display());
            for clue in clues {
                println!(
                    "    {:.4} {}",
                    clue.prob,
                    String::from_utf8_lossy(&clue.token)
                );
            }
        } else {
            let score = classifier
                .spamprob(&tokens)
                .context("failed to score message")?;
            println!("{score:.4} {} {}", verdict(score), path.display());
        }
    }

    classifier.close().context("failed to close database")?;
    Ok(())
}

fn cmd_info(cli: &Cli) -> Result<()> {
    let mut classifier = open_classifier(cli)?;
    let words = classifier.keys().context("failed to list tokens")?.len();

    println!("database:  {}", db_path(cli).display());
    println!("nspam:     {}", classifier.nspam());
    println!("nham:      {}", classifier.nham());
    println!("words:     {words}");
    println!("cutoffs:   ham<={HAM_CUTOFF}, spam>={SPAM_CUTOFF}");

    classifier.close().context("failed to close database")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_lowercases_and_splits() {
        assert_eq!(
            tokenize("Buy NOW  cheap\tpills\n"),
            vec![
                b"buy".to_vec(),
                b"now".to_vec(),
                b"cheap".to_vec(),
                b"pills".to_vec()
            ]
        );
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn test_verdict_respects_cutoffs() {
        assert_eq!(verdict(0.95), "spam");
        assert_eq!(verdict(0.05), "ham");
        assert_eq!(verdict(0.5), "unsure");
        assert_eq!(verdict(SPAM_CUTOFF), "spam");
        assert_eq!(verdict(HAM_CUTOFF), "ham");
    }
}
