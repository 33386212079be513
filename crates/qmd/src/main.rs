//! QMD — a personal Markdown document search engine.
//!
//! The CLI shell, grounded in the teacher's `ctx` binary: a `clap` derive
//! `Cli`/`Commands`, one `run_*` function per subcommand, dispatched from
//! `#[tokio::main] async fn main()`.

mod config;
mod db;
mod gateway_local;
mod gateway_remote;
mod migrate;
mod sqlite_index;
mod sync;
mod vecutil;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use qmd_core::chunk::{chunk_body, max_embed_file_bytes_from_env};
use qmd_core::context::resolve_context;
use qmd_core::gateway::{CancelToken, Gateway};
use qmd_core::retrieval::{deep_search, keyword_search, semantic_search, SearchHit, SearchOptions};
use qmd_core::scope::{check_scope_guard, normalize_scope, ConfiguredBackend};
use qmd_core::store::{ChunkVectorInsert, Index, NewHistoryEntry};

use crate::config::{CollectionConfig, Config, GatewayBackendSetting, GatewaySettings};
use crate::gateway_local::LocalGateway;
use crate::gateway_remote::RemoteGateway;
use crate::sqlite_index::SqliteIndex;

#[derive(Parser)]
#[command(name = "qmd", about = "Personal Markdown document search engine", version)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the index database and register configured collections.
    Init,

    /// Walk a collection's root and upsert/deactivate documents.
    Sync {
        /// Collection name; syncs every configured collection if omitted.
        collection: Option<String>,
    },

    /// Search indexed documents.
    Search {
        query: String,

        /// keyword | semantic | deep
        #[arg(long, default_value = "keyword")]
        mode: String,

        #[arg(long = "collection")]
        collections: Vec<String>,

        #[arg(long, default_value_t = 10)]
        limit: usize,

        #[arg(long)]
        min_score: Option<f64>,

        /// A free-form phrase biasing chunk/snippet selection.
        #[arg(long)]
        intent: Option<String>,
    },

    /// Retrieve a document by its 6-hex-character docid.
    Get { docid: String },

    /// Manage chunk embeddings.
    Embed {
        #[arg(long, default_value_t = 256)]
        limit: usize,

        /// Clear existing vectors and scope metadata, then re-embed
        /// everything (`qmd embed -f`, per the Scope Guard's remediation).
        #[arg(short = 'f', long)]
        force: bool,
    },

    /// Attach free-form context text to a path prefix or the whole index.
    Context {
        #[command(subcommand)]
        action: ContextAction,
    },

    /// Print index-wide counts.
    Stats,
}

#[derive(Subcommand)]
enum ContextAction {
    SetPath {
        collection: String,
        prefix: String,
        text: String,
    },
    SetGlobal {
        text: String,
    },
}

fn configured_backend(setting: GatewayBackendSetting) -> ConfiguredBackend {
    match setting {
        GatewayBackendSetting::Local => ConfiguredBackend::Local,
        GatewayBackendSetting::Api => ConfiguredBackend::Api,
        GatewayBackendSetting::Unknown => ConfiguredBackend::Unknown,
    }
}

fn build_gateway(settings: GatewaySettings) -> (Arc<dyn Gateway>, GatewayBackendSetting) {
    let backend = settings.backend;
    let gateway: Arc<dyn Gateway> = match backend {
        GatewayBackendSetting::Api => Arc::new(RemoteGateway::new(settings)),
        GatewayBackendSetting::Local | GatewayBackendSetting::Unknown => {
            Arc::new(LocalGateway::default())
        }
    };
    (gateway, backend)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(config::default_config_path);
    let cfg = config::load_config(&config_path)?;

    let pool = db::connect(&cfg.index.path).await?;
    migrate::run_migrations(&pool).await?;
    let index: Arc<dyn Index> = Arc::new(SqliteIndex::new(pool));

    let (gateway, backend_setting) = build_gateway(GatewaySettings::from_env());

    match cli.command {
        Commands::Init => run_init(&index, &cfg).await?,
        Commands::Sync { collection } => run_sync(&index, &cfg, collection.as_deref()).await?,
        Commands::Search {
            query,
            mode,
            collections,
            limit,
            min_score,
            intent,
        } => {
            run_search(
                &index,
                &gateway,
                &query,
                &mode,
                collections,
                limit,
                min_score,
                intent,
            )
            .await?
        }
        Commands::Get { docid } => run_get(&index, &docid).await?,
        Commands::Embed { limit, force } => {
            run_embed(&index, &gateway, backend_setting, limit, force).await?
        }
        Commands::Context { action } => run_context(&index, action).await?,
        Commands::Stats => run_stats(&index).await?,
    }

    Ok(())
}

async fn run_init(index: &Arc<dyn Index>, cfg: &Config) -> anyhow::Result<()> {
    for (name, collection) in &cfg.collections {
        index
            .upsert_collection(
                name,
                &collection.root.display().to_string(),
                &collection.pattern,
                collection.context.as_deref(),
            )
            .await?;
    }
    println!(
        "Index initialized at {} with {} collection(s).",
        cfg.index.path.display(),
        cfg.collections.len()
    );
    Ok(())
}

async fn run_sync(index: &Arc<dyn Index>, cfg: &Config, only: Option<&str>) -> anyhow::Result<()> {
    let targets: Vec<(&String, &CollectionConfig)> = cfg
        .collections
        .iter()
        .filter(|(name, _)| only.map_or(true, |o| o == name.as_str()))
        .collect();

    if targets.is_empty() {
        anyhow::bail!("no matching collection configured");
    }

    for (name, collection) in targets {
        let report = sync::sync_collection(index.as_ref(), name, collection).await?;
        println!(
            "{name}: {} inserted, {} replaced, {} unchanged, {} deactivated",
            report.inserted, report.replaced, report.unchanged, report.deactivated
        );
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_search(
    index: &Arc<dyn Index>,
    gateway: &Arc<dyn Gateway>,
    query: &str,
    mode: &str,
    collections: Vec<String>,
    limit: usize,
    min_score: Option<f64>,
    intent: Option<String>,
) -> anyhow::Result<()> {
    let opts = SearchOptions {
        limit,
        min_score,
        collections,
        intent,
    };

    let hits = match mode {
        "keyword" => keyword_search(index, query, &opts).await?,
        "semantic" => semantic_search(index, gateway, query, &opts).await?,
        "deep" => deep_search(index, gateway, query, &opts).await?,
        other => anyhow::bail!("unknown search mode {other:?}; expected keyword, semantic, or deep"),
    };

    print_hits(&hits);

    index
        .record_history(NewHistoryEntry {
            ts: chrono::Utc::now().timestamp(),
            kind: mode.to_string(),
            query: query.to_string(),
            result_count: hits.len() as i64,
            index_name: "default".to_string(),
        })
        .await?;

    Ok(())
}

fn print_hits(hits: &[SearchHit]) {
    if hits.is_empty() {
        println!("No results.");
        return;
    }
    for (rank, hit) in hits.iter().enumerate() {
        println!(
            "{:>2}. [{}] {:.3}  {}  ({}/{})  id: {}",
            rank + 1,
            hit.source.as_str(),
            hit.score,
            hit.title,
            hit.collection,
            hit.path,
            hit.docid
        );
        println!("    {}", hit.snippet.replace('\n', " "));
    }
}

async fn run_get(index: &Arc<dyn Index>, docid: &str) -> anyhow::Result<()> {
    let doc = index.document_by_docid(docid).await?;
    let body = index
        .content_body(&doc.hash)
        .await?
        .ok_or_else(|| anyhow::anyhow!("content missing for hash {}", doc.hash))?;

    let path_contexts = index.path_contexts(&doc.collection).await?;
    let global = index.global_context().await?;
    let context = resolve_context(&doc.path, &path_contexts, global.as_deref());

    println!("docid:      {}", doc.docid());
    println!("title:      {}", doc.title);
    println!("collection: {}", doc.collection);
    println!("path:       {}", doc.shown_path());
    println!("modified:   {}", doc.modified_at);
    if let Some(context) = context {
        println!("context:    {context}");
    }
    println!();
    println!("{body}");
    Ok(())
}

async fn run_embed(
    index: &Arc<dyn Index>,
    gateway: &Arc<dyn Gateway>,
    backend_setting: GatewayBackendSetting,
    limit: usize,
    force: bool,
) -> anyhow::Result<()> {
    let backend = configured_backend(backend_setting);
    let model_info = gateway.model_info();
    let current_scope = match (backend, &model_info.embed_base_url, &model_info.embed_model) {
        (ConfiguredBackend::Api, Some(base_url), Some(model)) => {
            Some(normalize_scope(base_url, model))
        }
        _ => None,
    };

    if force {
        for content in index.all_content().await? {
            index.replace_chunk_vectors(&content.hash, &[]).await?;
        }
        index.clear_scope_meta().await?;
        println!("Cleared existing vectors and scope metadata.");
    }

    let stored_scope = index.get_scope_meta().await?;
    let any_vectors = index.any_vectors_exist().await?;
    check_scope_guard(backend, stored_scope.as_ref(), current_scope.as_ref(), any_vectors)?;

    let max_bytes = max_embed_file_bytes_from_env();
    let pending = if force {
        index.all_content().await?
    } else {
        index.pending_embeds(max_bytes, limit).await?
    };

    let cancel = CancelToken::new();
    let mut embedded_hashes = 0usize;
    let mut skipped = 0usize;

    for content in pending {
        let chunks = chunk_body(&content.body);
        if chunks.is_empty() {
            continue;
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = gateway.embed_batch(&texts, &cancel).await?;

        if embeddings.iter().any(|e| e.is_none()) {
            tracing::warn!(hash = %content.hash, "embedding provider returned no vector for one or more chunks; leaving pending");
            skipped += 1;
            continue;
        }

        let vectors: Vec<ChunkVectorInsert> = chunks
            .iter()
            .zip(embeddings.into_iter())
            .map(|(chunk, embedding)| {
                let embedding = embedding.expect("checked above: no None entries remain");
                ChunkVectorInsert {
                    seq: chunk.seq,
                    pos: chunk.pos,
                    embedding: embedding.vector,
                    model: embedding.model,
                }
            })
            .collect();

        index.replace_chunk_vectors(&content.hash, &vectors).await?;
        embedded_hashes += 1;
    }

    if embedded_hashes > 0 {
        if let Some(scope) = current_scope {
            if stored_scope.is_none() {
                index.set_scope_meta(scope).await?;
            }
        }
    }

    println!("Embedded {embedded_hashes} document(s); {skipped} left pending.");
    Ok(())
}

async fn run_context(index: &Arc<dyn Index>, action: ContextAction) -> anyhow::Result<()> {
    match action {
        ContextAction::SetPath {
            collection,
            prefix,
            text,
        } => {
            index.set_path_context(&collection, &prefix, &text).await?;
            println!("Context set for {collection}:{prefix}");
        }
        ContextAction::SetGlobal { text } => {
            index.set_global_context(&text).await?;
            println!("Global context set.");
        }
    }
    Ok(())
}

async fn run_stats(index: &Arc<dyn Index>) -> anyhow::Result<()> {
    let stats = index.stats().await?;
    println!("collections:      {}", stats.collections);
    println!("active documents: {}", stats.active_documents);
    println!("content rows:     {}", stats.content_rows);
    println!("embedded chunks:  {}", stats.embedded_chunks);
    match stats.vector_dims {
        Some(dims) => println!("vector dims:      {dims}"),
        None => println!("vector dims:      (none embedded yet)"),
    }
    Ok(())
}
