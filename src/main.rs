//! `marquee` CLI - browse and resolve media through any registered provider

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use marquee::{Config, Episode, Media, Provider, ProviderRegistry, Quality, Season};

#[derive(Parser)]
#[command(name = "marquee")]
#[command(about = "Search and stream media through native sites and script plugins")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.config/marquee/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered providers and plugins that failed to load
    Providers,

    /// Search one provider
    Search {
        /// Provider name
        provider: String,

        /// Search query
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },

    /// Trending titles
    Trending {
        /// Provider name
        provider: String,
    },

    /// Recently added titles
    Recent {
        /// Provider name
        provider: String,
    },

    /// Full metadata for one title
    Info {
        /// Provider name
        provider: String,

        /// Media id from a search result
        id: String,
    },

    /// Seasons of a title
    Seasons {
        /// Provider name
        provider: String,

        /// Media id
        media_id: String,
    },

    /// Episodes of a season
    Episodes {
        /// Provider name
        provider: String,

        /// Season id from `seasons`
        season_id: String,
    },

    /// Quality labels available for an episode
    Qualities {
        /// Provider name
        provider: String,

        /// Episode id from `episodes`
        episode_id: String,
    },

    /// Resolve a playable stream URL
    Stream {
        /// Provider name
        provider: String,

        /// Episode id from `episodes`
        episode_id: String,

        /// Preferred quality label
        #[arg(short, long, default_value = "auto")]
        quality: String,
    },

    /// Check that providers are reachable
    Health {
        /// Only this provider
        provider: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let registry = ProviderRegistry::from_config(&config)
        .await
        .context("failed to set up providers")?;
    let json = cli.json;

    match cli.command {
        Commands::Providers => cmd_providers(&registry, json)?,
        Commands::Search { provider, query } => {
            let p = lookup(&registry, &provider)?;
            print_media(&p.search(&query.join(" ")).await?, json)?;
        }
        Commands::Trending { provider } => {
            let p = lookup(&registry, &provider)?;
            print_media(&p.get_trending().await?, json)?;
        }
        Commands::Recent { provider } => {
            let p = lookup(&registry, &provider)?;
            print_media(&p.get_recent().await?, json)?;
        }
        Commands::Info { provider, id } => {
            let p = lookup(&registry, &provider)?;
            // Info is free-form, so it is always JSON.
            println!("{}", serde_json::to_string_pretty(&p.get_info(&id).await?)?);
        }
        Commands::Seasons { provider, media_id } => {
            let p = lookup(&registry, &provider)?;
            print_seasons(&p.get_seasons(&media_id).await?, json)?;
        }
        Commands::Episodes { provider, season_id } => {
            let p = lookup(&registry, &provider)?;
            print_episodes(&p.get_episodes(&season_id).await?, json)?;
        }
        Commands::Qualities { provider, episode_id } => {
            let p = lookup(&registry, &provider)?;
            let qualities = p.get_available_qualities(&episode_id).await?;
            if json {
                print_json(&qualities)?;
            } else {
                for q in &qualities {
                    println!("{q}");
                }
            }
        }
        Commands::Stream {
            provider,
            episode_id,
            quality,
        } => {
            let p = lookup(&registry, &provider)?;
            let stream = p.get_stream_url(&episode_id, &Quality::new(quality)).await?;
            if json {
                print_json(&stream)?;
            } else {
                println!("{}", stream.url);
                if !stream.referer.is_empty() {
                    eprintln!("referer: {}", stream.referer);
                }
                for sub in &stream.subtitles {
                    eprintln!("subtitle [{}]: {}", sub.lang, sub.url);
                }
            }
        }
        Commands::Health { provider } => cmd_health(&registry, provider.as_deref(), json).await?,
    }

    Ok(())
}

/// `RUST_LOG` wins; otherwise `info`, or `debug` with `--verbose`.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn lookup(registry: &ProviderRegistry, name: &str) -> Result<Arc<dyn Provider>> {
    registry.get(name).ok_or_else(|| {
        anyhow!(
            "unknown provider '{name}' (available: {})",
            registry.names().join(", ")
        )
    })
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_providers(registry: &ProviderRegistry, json: bool) -> Result<()> {
    #[derive(Serialize)]
    struct Row<'a> {
        name: &'a str,
        kind: String,
    }

    #[derive(Serialize)]
    struct Failed {
        path: String,
        error: String,
    }

    let rows: Vec<Row<'_>> = registry
        .providers()
        .iter()
        .map(|p| Row {
            name: p.name(),
            kind: p.kind().to_string(),
        })
        .collect();
    let failed: Vec<Failed> = registry
        .failed_plugins()
        .iter()
        .map(|(path, e)| Failed {
            path: path.display().to_string(),
            error: e.to_string(),
        })
        .collect();

    if json {
        return print_json(&serde_json::json!({ "providers": rows, "failed": failed }));
    }

    for row in &rows {
        println!("{:<20} {}", row.name, row.kind);
    }
    for f in &failed {
        eprintln!("failed to load {}: {}", f.path, f.error);
    }
    Ok(())
}

async fn cmd_health(registry: &ProviderRegistry, only: Option<&str>, json: bool) -> Result<()> {
    let results = match only {
        Some(name) => {
            let p = lookup(registry, name)?;
            vec![(p.name().to_string(), p.health_check().await)]
        }
        None => registry.health_check_all().await,
    };

    let unhealthy = results.iter().filter(|(_, r)| r.is_err()).count();

    if json {
        let rows: Vec<_> = results
            .iter()
            .map(|(name, r)| {
                serde_json::json!({
                    "name": name,
                    "healthy": r.is_ok(),
                    "error": r.as_ref().err().map(ToString::to_string),
                })
            })
            .collect();
        print_json(&rows)?;
    } else {
        for (name, r) in &results {
            match r {
                Ok(()) => println!("{name:<20} ok"),
                Err(e) => println!("{name:<20} FAIL  {e}"),
            }
        }
    }

    if unhealthy > 0 {
        return Err(anyhow!("{unhealthy} of {} providers unhealthy", results.len()));
    }
    Ok(())
}

fn print_media(items: &[Media], json: bool) -> Result<()> {
    if json {
        return print_json(items);
    }
    for m in items {
        let year = m.year.map(|y| format!(" ({y})")).unwrap_or_default();
        println!("{:<32} {}{year}  [{}]", m.id, m.title, m.kind);
    }
    Ok(())
}

fn print_seasons(items: &[Season], json: bool) -> Result<()> {
    if json {
        return print_json(items);
    }
    for s in items {
        println!("{:<32} {}", s.id, s.title);
    }
    Ok(())
}

fn print_episodes(items: &[Episode], json: bool) -> Result<()> {
    if json {
        return print_json(items);
    }
    for e in items {
        println!("{:<32} S{:02}E{:02} {}", e.id, e.season, e.number, e.title);
    }
    Ok(())
}
