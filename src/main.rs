//! revwiki command-line interface

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use revwiki::config::WikiConfig;
use revwiki::search::{CancellationToken, IndexBuilder, SearchIndex};
use revwiki::storage::{Expected, Revision};
use revwiki::vc::{ChangeInfo, PageReference, PageStore};

#[derive(Parser, Debug)]
#[command(name = "revwiki")]
#[command(version = "0.1.0")]
#[command(about = "A wiki page store backed by a revision-numbered Git repository")]
struct Cli {
    /// Path to the wiki repository
    #[arg(short, long, default_value = ".revwiki", global = true)]
    repo: PathBuf,

    /// Name of the wiki
    #[arg(long, default_value = "wiki", global = true)]
    wiki: String,

    /// Author name for commits and locks
    #[arg(long, default_value = "revwiki", global = true)]
    author: String,

    /// Author email for commits
    #[arg(long, default_value = "revwiki@localhost", global = true)]
    email: String,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize a new wiki repository
    Init,

    /// Print a page
    Get {
        page: String,
        #[arg(short = 'R', long)]
        revision: Option<u64>,
    },

    /// Write a page from a file or stdin
    Set {
        page: String,
        /// Read content from this file instead of stdin
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Revision the edit is based on
        #[arg(short, long)]
        expect: Option<u64>,
        /// The page must not exist yet
        #[arg(long, conflicts_with = "expect")]
        new: bool,
        #[arg(short, long, default_value = "")]
        message: String,
    },

    /// Delete a page
    Delete {
        page: String,
        #[arg(short, long)]
        expect: Option<u64>,
        #[arg(short, long, default_value = "")]
        message: String,
    },

    /// Rename a page
    Rename {
        from: String,
        to: String,
        /// Move the page's attachments too
        #[arg(short, long)]
        attachments: bool,
        #[arg(short, long)]
        expect: Option<u64>,
        #[arg(short, long, default_value = "")]
        message: String,
    },

    /// Show a page's history across renames
    History { page: String },

    /// List pages changed between two revisions (inclusive)
    Changed { from: u64, to: Option<u64> },

    /// Attach a file to a page
    Attach {
        page: String,
        file: PathBuf,
        /// Attachment name (defaults to the file name)
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long)]
        expect: Option<u64>,
        #[arg(short, long, default_value = "")]
        message: String,
    },

    /// List a page's attachments
    Attachments { page: String },

    /// List all pages
    List,

    /// Show recent changes
    Recent {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Bring the search index up to date, then optionally search it
    Index {
        /// File keeping the highest indexed revision
        #[arg(long)]
        marker: Option<PathBuf>,
        #[arg(short, long)]
        search: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_filter = if cli.verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    let mut config = WikiConfig::new(&cli.repo)
        .wiki_name(&cli.wiki)
        .author(&cli.author, &cli.email)
        .create_if_missing(matches!(cli.command, Commands::Init));

    match cli.command {
        Commands::Init => {
            let repo = config.open_repository()?;
            println!("Initialized wiki repository at {}", repo.path().display());
            print!("{}", repo.stats()?);
        }

        Commands::Get { page, revision } => {
            let store = config.open_store()?;
            let info = store.get(&page_ref(&page)?, revision.map(Revision::new))?;
            if info.is_new_page() {
                bail!("{} does not exist yet", page);
            }
            print!("{}", info.content);
        }

        Commands::Set {
            page,
            file,
            expect,
            new,
            message,
        } => {
            let content = match file {
                Some(path) => std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf
                }
            };
            let expected = if new { Expected::Absent } else { expected(expect) };
            let store = config.open_store()?;
            let revision = store.set(&page_ref(&page)?, expected, &content, &message)?;
            println!("Committed {}", revision);
        }

        Commands::Delete { page, expect, message } => {
            let store = config.open_store()?;
            let revision = store.delete(&page_ref(&page)?, expected(expect), &message)?;
            println!("Deleted {} in {}", page, revision);
        }

        Commands::Rename {
            from,
            to,
            attachments,
            expect,
            message,
        } => {
            let store = config.open_store()?;
            let revision = store.rename(&page_ref(&from)?, &page_ref(&to)?, attachments, expected(expect), &message)?;
            println!("Renamed {} to {} in {}", from, to, revision);
        }

        Commands::History { page } => {
            let store = config.open_store()?;
            for change in store.history(&page_ref(&page)?)? {
                print_change(&change);
            }
        }

        Commands::Changed { from, to } => {
            let store = config.open_store()?;
            let to = match to {
                Some(to) => Revision::new(to),
                None => store.latest_revision()?,
            };
            for page in store.changed_between(Revision::new(from), to)? {
                println!("{}", page);
            }
        }

        Commands::Attach {
            page,
            file,
            name,
            expect,
            message,
        } => {
            let name = match name {
                Some(name) => name,
                None => file
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
                    .context("attachment needs a name")?,
            };
            let content = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let store = config.open_store()?;
            let revision = store.attach(&page_ref(&page)?, &name, expected(expect), &content, &message)?;
            println!("Attached {} to {} in {}", name, page, revision);
        }

        Commands::Attachments { page } => {
            let store = config.open_store()?;
            for attachment in store.attachments(&page_ref(&page)?)? {
                let state = if attachment.deleted { " (deleted)" } else { "" };
                let latest = attachment
                    .latest()
                    .map(|change| change.revision.to_string())
                    .unwrap_or_default();
                println!("{}\t{}{}", attachment.name, latest, state);
            }
        }

        Commands::List => {
            let store = config.open_store()?;
            for page in store.list()? {
                println!("{}", page);
            }
        }

        Commands::Recent { limit } => {
            let store = config.open_store()?;
            for change in store.recent_changes(limit)? {
                print_change(&change);
            }
        }

        Commands::Index { marker, search } => {
            if let Some(marker) = marker {
                config = config.index_marker(marker);
            }
            let store = Arc::new(config.open_store()?);
            let index = Arc::new(config.open_index()?);

            let builder = IndexBuilder::new(store, index.clone());
            let outcome = builder.build(&CancellationToken::new())?;
            println!("{:?}", outcome);
            println!(
                "Highest indexed revision: {}",
                index
                    .highest_indexed_revision()?
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "none".to_string())
            );

            if let Some(query) = search {
                for page in index.search(&query) {
                    println!("{}", page);
                }
            }
        }
    }

    Ok(())
}

fn page_ref(name: &str) -> Result<PageReference> {
    PageReference::new(name).with_context(|| format!("invalid page name {:?}", name))
}

fn expected(expect: Option<u64>) -> Expected {
    match expect {
        Some(revision) => Expected::At(Revision::new(revision)),
        None => Expected::Any,
    }
}

fn print_change(change: &ChangeInfo) {
    println!(
        "{}\t{}\t{}\t{}\t{}\t{}",
        change.revision,
        change.timestamp.format("%Y-%m-%d %H:%M:%S"),
        change.author,
        change.path,
        change.change_type,
        change.message.lines().next().unwrap_or("")
    );
}
