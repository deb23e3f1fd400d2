use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use docflow_config::IntakeConfig;
use docflow_core::io::BlobStore;
use docflow_core::store::DocumentStore;
use docflow_engine::{Activities, ActivityOptions, IntakeRuntime, RuntimeOptions};
use docflow_llm::{ChatClient, HttpChatClient, HttpChatClientConfig};
use docflow_server::{router, run_event_pump, AppState};
use docflow_stores::{InMemoryBlobStore, InMemoryDocumentStore, LocalDirBlobStore};
use docflow_stores_backends::{run_migrations, PostgresDocumentStore};

static TRACING_INIT: OnceLock<()> = OnceLock::new();

#[derive(Debug, Parser)]
#[command(name = "docflow-server", about = "Document-intake ingress and workflow runtime")]
struct Args {
    /// Document store backend: postgres (default) or memory for local runs.
    #[arg(long, default_value = "postgres")]
    store_backend: String,

    /// Object store backend: local (default) or memory for local runs.
    #[arg(long, default_value = "local")]
    blob_backend: String,

    /// Root directory for the local object store backend.
    #[arg(long, default_value = "./data/blobs")]
    blob_root: PathBuf,

    /// Preserve the `unknown` classification and route unmatched documents to
    /// review instead of defaulting them to invoice.
    #[arg(long)]
    preserve_unknown_doc_type: bool,
}

fn init_tracing() {
    TRACING_INIT.get_or_init(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .init();
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();
    let config = IntakeConfig::from_env().context("load configuration")?;

    let store: Arc<dyn DocumentStore> = match args.store_backend.trim().to_ascii_lowercase().as_str()
    {
        "postgres" | "postgresql" | "pgsql" => {
            let store = PostgresDocumentStore::connect(&config.postgres_dsn)
                .await
                .context("connect document store")?;
            run_migrations(store.pool())
                .await
                .context("apply schema migrations")?;
            Arc::new(store)
        }
        "in_memory" | "memory" => Arc::new(InMemoryDocumentStore::new()),
        backend => bail!("unsupported document store backend: {backend}"),
    };

    let blob: Arc<dyn BlobStore> = match args.blob_backend.trim().to_ascii_lowercase().as_str() {
        "local" => Arc::new(LocalDirBlobStore::new(args.blob_root.clone())),
        "in_memory" | "memory" => Arc::new(InMemoryBlobStore::new()),
        "s3" | "minio" => bail!(
            "object-store backend '{}' requires a custom client; endpoint {} is described by \
             the MINIO_* settings but is not served by this binary",
            args.blob_backend,
            config.minio_endpoint,
        ),
        backend => bail!("unsupported object store backend: {backend}"),
    };

    let chat: Arc<dyn ChatClient> = Arc::new(
        HttpChatClient::new(HttpChatClientConfig {
            api_key: (!config.openai_api_key.is_empty()).then(|| config.openai_api_key.clone()),
            ..HttpChatClientConfig::default()
        })
        .context("build chat client")?,
    );

    let activities = Arc::new(
        Activities::new(store.clone(), blob.clone(), chat).with_options(ActivityOptions {
            model: config.openai_model.clone(),
            request_timeout: Duration::from_secs(config.openai_timeout_sec),
            classify_unmatched_as_invoice: !args.preserve_unknown_doc_type,
            ..ActivityOptions::default()
        }),
    );
    let runtime = Arc::new(IntakeRuntime::with_options(
        activities,
        RuntimeOptions {
            workflow_id_prefix: config.workflow_id_prefix.clone(),
        },
    ));

    let (events, source) = docflow_events::channel();
    tokio::spawn(run_event_pump(source, blob.clone(), runtime.clone()));

    let state = AppState {
        store,
        blob,
        runtime,
        events,
        max_upload_bytes: config.max_upload_bytes,
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind server listener")?;
    tracing::info!(%addr, "docflow-server listening");
    axum::serve(listener, router(state))
        .await
        .context("server terminated with error")
}
