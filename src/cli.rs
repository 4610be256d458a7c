//! CLI implementation for dealscout

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use dealscout::cache;
use dealscout::config::Config;
use dealscout::embedder::{Encoder, HttpEncoder};
use dealscout::expand::{search_expanded, LlmExpander, QueryExpander};
use dealscout::record::RecordStore;
use dealscout::search::{Deal, Engine};

#[derive(Parser)]
#[command(name = "dealscout")]
#[command(about = "Hybrid search for grocery deals and coupons")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Search query (quote multi-word queries); omit for interactive mode
    query: Option<String>,

    /// Max deals to return
    #[arg(short = 'n', long)]
    top_k: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    json: bool,

    /// Disable LLM query expansion
    #[arg(long)]
    no_expand: bool,

    /// Deals document path
    #[arg(long)]
    deals: Option<PathBuf>,

    /// Qualifying-products document path
    #[arg(long)]
    products: Option<PathBuf>,

    /// Embedding cache directory
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// API key for the embeddings endpoint
    #[arg(long, env = "DEALSCOUT_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build or refresh the embedding cache
    Index {
        /// Re-encode even when the cache is up to date
        #[arg(long)]
        force: bool,
    },
}

pub fn run_with(cli: Cli) -> Result<()> {
    let config = Config::load(std::path::Path::new("."));

    match cli.command {
        Some(Commands::Index { force }) => cmd_index(&cli, &config, force),
        None => match &cli.query {
            Some(query) => cmd_search(&cli, &config, query),
            None => cmd_repl(&cli, &config),
        },
    }
}

fn deals_path(cli: &Cli, config: &Config) -> PathBuf {
    cli.deals.clone().unwrap_or_else(|| config.deals_path_or_default())
}

fn products_path(cli: &Cli, config: &Config) -> PathBuf {
    cli.products
        .clone()
        .unwrap_or_else(|| config.products_path_or_default())
}

fn cache_dir(cli: &Cli, config: &Config) -> PathBuf {
    cli.cache_dir
        .clone()
        .unwrap_or_else(|| config.cache_dir_or_default())
}

fn load_store(cli: &Cli, config: &Config) -> Result<(RecordStore, String)> {
    let deals = deals_path(cli, config);
    let products = products_path(cli, config);
    let deals_json = std::fs::read_to_string(&deals)
        .with_context(|| format!("Failed to read {}", deals.display()))?;
    let products_json = std::fs::read_to_string(&products)
        .with_context(|| format!("Failed to read {}", products.display()))?;
    let hash = cache::source_hash(&deals_json, &products_json);
    let store = RecordStore::from_json_strs(&deals_json, &products_json)
        .context("Failed to parse source documents")?;
    Ok((store, hash))
}

fn make_encoder(cli: &Cli, config: &Config) -> Result<HttpEncoder> {
    HttpEncoder::new(
        config.encoder_endpoint_or_default(),
        config.encoder_model_or_default(),
        cli.api_key.clone(),
    )
    .context("Failed to build encoder client")
}

fn encode_corpus(store: &RecordStore, encoder: &HttpEncoder) -> Result<dealscout::embedder::EmbeddingMatrix> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!("Encoding {} records...", store.len()));
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));
    let texts = store.search_texts();
    let matrix = encoder
        .encode_corpus(&texts)
        .context("Corpus encoding failed")?;
    spinner.finish_and_clear();
    Ok(matrix)
}

/// Load records and embeddings (cached when fresh), build the engine.
fn build_engine(cli: &Cli, config: &Config) -> Result<Engine> {
    let (store, hash) = load_store(cli, config)?;
    eprintln!("{} records indexed", store.len());

    let dir = cache_dir(cli, config);
    let matrix = match cache::load(&dir, &hash, store.len())? {
        Some(matrix) => {
            tracing::debug!("Loaded cached embeddings");
            matrix
        }
        None => {
            let encoder = make_encoder(cli, config)?;
            let matrix = encode_corpus(&store, &encoder)?;
            cache::save(&dir, &matrix, &hash)?;
            matrix
        }
    };

    let encoder: Arc<dyn Encoder> = Arc::new(make_encoder(cli, config)?);
    Engine::new(store, matrix, encoder).context("Failed to build search engine")
}

fn make_expander(cli: &Cli, config: &Config) -> Option<LlmExpander> {
    if cli.no_expand || !config.expand_or_default() {
        return None;
    }
    LlmExpander::from_env()
}

fn cmd_index(cli: &Cli, config: &Config, force: bool) -> Result<()> {
    let (store, hash) = load_store(cli, config)?;
    let dir = cache_dir(cli, config);

    if !force {
        if cache::load(&dir, &hash, store.len())?.is_some() {
            println!("Embedding cache is up to date ({} records)", store.len());
            return Ok(());
        }
    }

    let encoder = make_encoder(cli, config)?;
    let matrix = encode_corpus(&store, &encoder)?;
    cache::save(&dir, &matrix, &hash)?;
    println!(
        "Encoded {} records ({}-dim) into {}",
        matrix.rows(),
        matrix.dim(),
        dir.display()
    );
    Ok(())
}

fn cmd_search(cli: &Cli, config: &Config, query: &str) -> Result<()> {
    let engine = build_engine(cli, config)?;
    let expander = make_expander(cli, config);
    let top_k = cli.top_k.unwrap_or_else(|| config.top_k_or_default());

    let start = Instant::now();
    let result = search_expanded(
        &engine,
        expander.as_ref().map(|e| e as &dyn QueryExpander),
        query,
        top_k,
    )?;
    let elapsed = start.elapsed();

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result.deals)?);
        return Ok(());
    }

    if let Some(expanded) = &result.expanded {
        println!("{} {}", "expanded:".dimmed(), expanded.dimmed());
    }
    print_deals(&result.deals, elapsed.as_secs_f64());
    Ok(())
}

fn cmd_repl(cli: &Cli, config: &Config) -> Result<()> {
    let engine = build_engine(cli, config)?;
    let expander = make_expander(cli, config);
    let top_k = cli.top_k.unwrap_or_else(|| config.top_k_or_default());

    println!("Type a search query (or 'quit' to exit)\n");
    let mut editor = rustyline::DefaultEditor::new()?;
    loop {
        let line = match editor.readline("search> ") {
            Ok(line) => line,
            Err(rustyline::error::ReadlineError::Interrupted)
            | Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if matches!(query.to_lowercase().as_str(), "quit" | "exit" | "q") {
            break;
        }
        let _ = editor.add_history_entry(query);

        let start = Instant::now();
        let result = search_expanded(
            &engine,
            expander.as_ref().map(|e| e as &dyn QueryExpander),
            query,
            top_k,
        )?;
        if let Some(expanded) = &result.expanded {
            println!("{} {}", "expanded:".dimmed(), expanded.dimmed());
        }
        print_deals(&result.deals, start.elapsed().as_secs_f64());
    }
    println!("Bye!");
    Ok(())
}

fn print_deals(deals: &[Deal], elapsed_secs: f64) {
    println!(
        "\n{} deals found ({:.3}s)\n",
        deals.len().to_string().bold(),
        elapsed_secs
    );
    if deals.is_empty() {
        println!("  No deals found.");
        return;
    }
    for (i, deal) in deals.iter().enumerate() {
        println!("{}", format_deal(deal, i + 1));
        println!();
    }
}

fn format_deal(deal: &Deal, rank: usize) -> String {
    let sources = deal
        .sources
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let mut lines = vec![
        format!(
            "  {}. {}  {}",
            rank,
            deal.offer_name.bold(),
            format!("[{:.3} via {}]", deal.score, sources).dimmed()
        ),
        format!(
            "     {} | {} | Offer ID: {}",
            deal.offer_price.green(),
            deal.offer_category,
            deal.offer_id
        ),
    ];
    if !deal.offer_description.is_empty() {
        lines.push(format!("     {}", deal.offer_description));
    }

    if !deal.matching_products.is_empty() {
        lines.push(format!(
            "     Matching products ({}):",
            deal.matching_products.len()
        ));
        for p in &deal.matching_products {
            let price = if p.product_price > 0.0 {
                format!("${:.2}", p.product_price)
            } else {
                "N/A".to_string()
            };
            let mut parts = vec![price];
            if !p.product_size.is_empty() {
                parts.push(p.product_size.clone());
            }
            if !p.product_aisle.is_empty() {
                parts.push(p.product_aisle.clone());
            }
            lines.push(format!("       - {}", p.product_name));
            lines.push(format!("         {}", parts.join(" | ").dimmed()));
        }
    }

    lines.join("\n")
}
