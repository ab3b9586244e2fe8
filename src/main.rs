use std::{
    fs,
    path::{Path, PathBuf},
    process,
    sync::Arc,
};

use anyhow::{Context, Result};
use bangumi_card::{
    lint, node::Node, render_markdown, simulate, BangumiCard, BangumiEngine, CardIds, CardLayout,
    Config, FetchOutcome,
};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "bangumi-card")]
#[command(about = "Render Bangumi profile cards from markdown directives.", long_about = None)]
#[command(version, long_version = env!("BUILD_INFO"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Render a markdown document to a HTML fragment.
    #[command(arg_required_else_help = true)]
    Render {
        /// The markdown file.
        input: PathBuf,
        /// The output file. Print to stdout if absent.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// The config file. Default to `bangumi.toml` next to the input.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Build every markdown file of a directory into HTML pages.
    #[command(arg_required_else_help = true)]
    Build {
        /// The source directory.
        source: PathBuf,
        /// The destination directory. Default dest dir is `build`.
        dest: Option<PathBuf>,
    },
    /// Print the card of a single user.
    #[command(arg_required_else_help = true)]
    Card {
        /// The Bangumi username.
        user: String,
        #[arg(short, long, value_enum, default_value_t = CardLayout::Classic)]
        layout: CardLayout,
    },
    /// Run the client lifecycle of a card offline.
    #[command(arg_required_else_help = true)]
    Simulate {
        /// The Bangumi username.
        user: String,
        /// The HTTP status of the profile response.
        #[arg(short, long, default_value_t = 200)]
        status: u16,
        /// A JSON file used as the profile response body.
        #[arg(short, long, conflicts_with = "network_error")]
        body: Option<PathBuf>,
        /// Fail the request before any response.
        #[arg(long)]
        network_error: bool,
    },
    /// Check rendered HTML files for duplicated element ids.
    #[command(arg_required_else_help = true)]
    Lint {
        /// The directory of rendered pages.
        dir: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Commands::Render {
            input,
            output,
            config,
        } => {
            let config = match config {
                Some(path) => Config::load(path)?,
                None => Config::load_from_dir(input.parent().unwrap_or_else(|| Path::new(".")))?,
            };
            let markdown = fs::read_to_string(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let html = render_markdown(&markdown, &config)?;
            match output {
                Some(output) => fs::write(output, html)?,
                None => print!("{html}"),
            }
        }
        Commands::Build { source, dest } => {
            let dest = dest.unwrap_or_else(|| "build".into());
            let config = Config::load_from_dir(&source)?;
            BangumiEngine::new(&source, &dest, config)?.build()?;
        }
        Commands::Card { user, layout } => {
            let mut config = Config::load_from_dir(".")?;
            config.card.layout = layout;
            let card = card_component(&config)?.render_card(&user)?;
            println!("{}", Node::from(card));
        }
        Commands::Simulate {
            user,
            status,
            body,
            network_error,
        } => {
            let outcome = if network_error {
                FetchOutcome::NetworkError("TypeError: Failed to fetch".into())
            } else {
                let body = match body {
                    Some(path) => fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read {}", path.display()))?,
                    None => String::from("{}"),
                };
                FetchOutcome::Response { status, body }
            };
            let config = Config::load_from_dir(".")?;
            let card = card_component(&config)?.render_card(&user)?;
            print!("{}", simulate(&card, &outcome)?);
        }
        Commands::Lint { dir } => {
            if !lint::lint_dir(dir)? {
                process::exit(1);
            }
        }
    }

    Ok(())
}

fn card_component(config: &Config) -> Result<BangumiCard> {
    let ids = Arc::new(CardIds::new(&config.card.id_prefix)?);
    Ok(BangumiCard::new(config.card.clone(), ids))
}
