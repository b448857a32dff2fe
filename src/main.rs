use anyhow::Result;
use opsearch::cache::QueryCache;
use opsearch::config::Config;
use opsearch::embeddings::HttpEmbedder;
use opsearch::index::{Bm25Index, DenseIndex, IndexManager, SharedIndex};
use opsearch::models::SearchRequest;
use opsearch::search::service::{SearchOptions, SearchService};
use opsearch::store::SqliteStore;
use std::sync::Arc;

/// Application root: every component is constructed here and threaded
/// through explicitly; there is no module-level state.
struct App {
    manager: IndexManager,
    service: SearchService,
}

fn build_app(config: &Config) -> App {
    // An absent API key only matters once an embedding call is made, so
    // BM25-only operation works without one.
    let api_key = config.embedding_api_key().unwrap_or_else(|_| {
        log::warn!(
            "{} not set; dense retrieval will fail until it is",
            config.embeddings.api_key_env
        );
        String::new()
    });

    let embedder = Arc::new(HttpEmbedder::new(
        config.embeddings.api_url.clone(),
        api_key,
        config.embeddings.model.clone(),
        config.embeddings.dimensions,
        config.embeddings.batch_size,
    ));
    let store = Arc::new(SqliteStore::new(&config.store.db_path));
    let bm25: Arc<SharedIndex<Bm25Index>> = Arc::new(SharedIndex::new());
    let dense: Arc<SharedIndex<DenseIndex>> = Arc::new(SharedIndex::new());
    let cache = Arc::new(QueryCache::new(
        config.cache.max_size,
        config.cache.ttl_seconds,
    ));

    let manager = IndexManager::new(
        config.index.index_dir.clone(),
        config.index.indexes_url.clone(),
        config.search.bm25_k1,
        config.search.bm25_b,
        bm25.clone(),
        dense.clone(),
        store.clone(),
        embedder.clone(),
    );

    let service = SearchService::new(
        bm25,
        dense,
        embedder,
        store,
        cache,
        SearchOptions::from(&config.search),
    );

    App { manager, service }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger from environment variable or default to info level
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "info")).init();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("status");

    match command {
        "build" => run_build(&args[2..]).await,
        "search" => run_search(&args[2..]).await,
        "status" => run_status().await,
        other => {
            eprintln!("Unknown command: {}", other);
            eprintln!("Usage: opsearch <build [--no-vectors] | search <query> [--top-k N] | status>");
            std::process::exit(2);
        }
    }
}

/// Build new indexes from the metadata store and activate them.
async fn run_build(args: &[String]) -> Result<()> {
    let config = Config::load()?;
    let app = build_app(&config);

    let include_vectors = !args.iter().any(|a| a == "--no-vectors");

    let version = app.manager.build_indexes(include_vectors).await?;
    println!("Built index version: {}", version);

    Ok(())
}

/// Parse CLI args: optional --top-k <n>; first positional is the query.
fn parse_search_args(args: &[String], default_top_k: usize) -> Result<(String, usize)> {
    let mut query = None;
    let mut top_k = default_top_k;
    let mut next_top_k = false;

    for arg in args {
        if next_top_k {
            top_k = arg.parse()?;
            next_top_k = false;
            continue;
        }
        if arg == "--top-k" {
            next_top_k = true;
            continue;
        }
        if arg.starts_with("--") {
            continue;
        }
        if query.is_none() {
            query = Some(arg.clone());
        }
    }

    let query = query.ok_or_else(|| {
        anyhow::anyhow!("Usage: opsearch search <query> [--top-k N]")
    })?;

    Ok((query, top_k))
}

/// Load the active indexes and run one search.
async fn run_search(args: &[String]) -> Result<()> {
    let config = Config::load()?;
    let app = build_app(&config);

    let (query, top_k) = parse_search_args(args, config.search.default_top_k)?;

    if !app.manager.load_indexes() {
        return Err(opsearch::OpsearchError::NotReady(
            "no loadable index; run `opsearch build` first".into(),
        )
        .into());
    }

    let mut request = SearchRequest::new(query.clone());
    request.top_k = Some(top_k);

    let response = app.service.search(request).await?;

    println!("Query: {:?}", query);
    println!(
        "Mode: {}  Results: {}  Latency: {:.1}ms",
        response.retrieval_mode, response.total_results, response.latency_ms
    );

    if response.results.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    for (rank, result) in response.results.iter().enumerate() {
        println!("-------------------------------------------------------------");
        println!(
            "#{} [{}] {} (score: {:.4})",
            rank + 1,
            result.source_type,
            result.title,
            result.scores.final_score
        );
        println!("   {} | {}", result.project, result.url);
        println!("   {}", result.snippet);
    }

    Ok(())
}

/// Report index readiness and cache statistics.
async fn run_status() -> Result<()> {
    let config = Config::load()?;
    let app = build_app(&config);

    if !app.manager.ensure_indexes_present().await? {
        log::warn!("No indexes available yet");
    }
    let _ = app.manager.load_indexes();

    let status = app.manager.get_status();
    println!("{}", serde_json::to_string_pretty(&status)?);
    println!(
        "cache: {}",
        serde_json::to_string(&app.service.cache_stats())?
    );

    Ok(())
}
