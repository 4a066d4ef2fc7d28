mod web;

use azure_rag_core::{
    ask, embed_folder, publish_embeddings, AzureOpenAiClient, AzureSearchStore, ChatOrchestrator,
    ChatSession, ChunkingConfig, CompletionParams, IndexDefinition, LopdfExtractor, OpenAiConfig,
    RetrievalMode, RetrievalOptions, SearchServiceConfig, DEFAULT_CHUNK_LENGTH,
    DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_QNA_WINDOW,
};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const IDLE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "azure-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Azure OpenAI resource endpoint
    #[arg(long, env = "AZURE_OPENAI_ENDPOINT", global = true)]
    openai_endpoint: Option<String>,

    /// Azure OpenAI API key
    #[arg(long, env = "AZURE_OPENAI_KEY", hide_env_values = true, global = true)]
    openai_key: Option<String>,

    /// Deployment used for embeddings
    #[arg(long, env = "EMBEDDING_DEPLOYMENT_NAME", global = true)]
    embedding_deployment: Option<String>,

    /// Deployment used for chat completions
    #[arg(long, env = "CHAT_DEPLOYMENT_NAME", global = true)]
    chat_deployment: Option<String>,

    /// Azure AI Search service endpoint
    #[arg(long, env = "AZURE_SEARCH_SERVICE_ENDPOINT", global = true)]
    search_endpoint: Option<String>,

    /// Azure AI Search index name
    #[arg(long, env = "AZURE_SEARCH_INDEX_NAME", global = true)]
    search_index: Option<String>,

    /// Azure AI Search admin key
    #[arg(long, env = "AZURE_SEARCH_ADMIN_KEY", hide_env_values = true, global = true)]
    search_admin_key: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Extract, chunk, and embed every PDF of a folder into JSON files.
    Embed {
        /// Folder that contains the PDFs (not searched recursively).
        #[arg(long, default_value = "../../data")]
        data_dir: PathBuf,
        /// Folder that receives one `<file>.pdf.json` per PDF.
        #[arg(long, default_value = "../output")]
        output_dir: PathBuf,
        /// Maximum chunk length in characters.
        #[arg(long, default_value_t = DEFAULT_CHUNK_LENGTH)]
        chunk_length: usize,
    },
    /// Create or update the search index and upload the embedded chunks.
    SetupIndex {
        /// Folder holding the JSON files written by `embed`.
        #[arg(long, default_value = "../output")]
        output_dir: PathBuf,
        /// Dimensions of the embedding vectors.
        #[arg(long, default_value_t = DEFAULT_EMBEDDING_DIMENSIONS)]
        dimensions: usize,
    },
    /// Serve the retrieval-augmented chat page.
    Chat {
        /// Address to bind the HTTP server to (host:port).
        #[arg(long, env = "RAG_CHAT_BIND", default_value = "127.0.0.1:8501")]
        bind: String,
        /// Number of chunks retrieved per question.
        #[arg(long, default_value_t = 3)]
        top: usize,
        /// Use the semantic ranker instead of plain full-text search.
        #[arg(long, default_value_t = false)]
        semantic: bool,
        /// Minutes without a new turn after which a session is dropped.
        #[arg(long, default_value_t = web::DEFAULT_IDLE_TIMEOUT.as_secs() / 60)]
        idle_minutes: u64,
    },
    /// Terminal chat with the model, without retrieval.
    Qna {
        /// Number of previous exchanges sent with each question.
        #[arg(long, default_value_t = DEFAULT_QNA_WINDOW)]
        window: usize,
    },
}

impl Cli {
    fn openai_config(
        &self,
        require_embeddings: bool,
    ) -> Result<OpenAiConfig, azure_rag_core::ConfigError> {
        OpenAiConfig::from_values(
            self.openai_endpoint.clone(),
            self.openai_key.clone(),
            self.embedding_deployment.clone(),
            self.chat_deployment.clone(),
            require_embeddings,
        )
    }

    fn search_config(&self) -> Result<SearchServiceConfig, azure_rag_core::ConfigError> {
        SearchServiceConfig::from_values(
            self.search_endpoint.clone(),
            self.search_index.clone(),
            self.search_admin_key.clone(),
        )
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    if let Err(error) = dotenvy::dotenv() {
        if !error.not_found() {
            return Err(error.into());
        }
    }

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "azure-rag boot"
    );

    match &cli.command {
        Command::Embed {
            data_dir,
            output_dir,
            chunk_length,
        } => {
            let client = AzureOpenAiClient::new(&cli.openai_config(true)?);
            let report = embed_folder(
                &LopdfExtractor,
                &client,
                data_dir,
                output_dir,
                ChunkingConfig {
                    chunk_length: *chunk_length,
                },
            )
            .await?;

            for skipped in &report.skipped_files {
                warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
            }
            for file in &report.files {
                for chunk in &file.skipped_chunks {
                    warn!(
                        file = %chunk.filename,
                        chunk = %chunk.id,
                        reason = %chunk.reason,
                        "skipped chunk"
                    );
                }
            }

            println!(
                "{} chunks embedded from {} pdf(s) into {} ({} chunks skipped, {} pdf(s) unreadable)",
                report.embedded_total(),
                report.files.len(),
                output_dir.display(),
                report.skipped_chunk_total(),
                report.skipped_files.len()
            );
        }
        Command::SetupIndex {
            output_dir,
            dimensions,
        } => {
            let config = cli.search_config()?;
            info!(endpoint = %config.endpoint, index = %config.index_name, "search client ready");

            let store = AzureSearchStore::new(&config);
            let definition = IndexDefinition::chunk_index(store.index_name(), *dimensions);
            let report = publish_embeddings(&store, &definition, output_dir).await?;

            println!("{} created or updated successfully.", report.index_name);
            println!(
                "Uploaded {} documents to the index \"{}\" ({} rejected).",
                report.upload.uploaded,
                report.index_name,
                report.upload.failed.len()
            );
        }
        Command::Chat {
            bind,
            top,
            semantic,
            idle_minutes,
        } => {
            let search = cli.search_config()?;
            let openai = cli.openai_config(false)?;

            let retrieval = RetrievalOptions {
                top: (*top).max(1),
                mode: if *semantic {
                    RetrievalMode::Semantic
                } else {
                    RetrievalMode::Simple
                },
            };
            let orchestrator = ChatOrchestrator::new(
                AzureSearchStore::new(&search).with_retrieval(retrieval),
                AzureOpenAiClient::new(&openai),
            );
            let state = web::AppState::new(orchestrator)
                .with_idle_timeout(Duration::from_secs(idle_minutes.saturating_mul(60)));
            let _sweep = web::spawn_idle_sweep(state.clone(), IDLE_SWEEP_INTERVAL);
            let app = web::router(state);

            let addr: SocketAddr = bind
                .parse()
                .map_err(|error| anyhow::anyhow!("invalid bind address {bind}: {error}"))?;
            let listener = tokio::net::TcpListener::bind(addr).await?;
            info!(%addr, index = %search.index_name, "chat listening");
            println!("chat available at http://{addr}");
            axum::serve(listener, app).await?;
        }
        Command::Qna { window } => {
            let client = AzureOpenAiClient::new(&cli.openai_config(false)?);
            run_qna(&client, *window).await?;
        }
    }

    Ok(())
}

async fn run_qna(client: &AzureOpenAiClient, window: usize) -> anyhow::Result<()> {
    let params = CompletionParams::qna();
    let mut session = ChatSession::qna(window);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"Enter your question here: ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let answer = ask(client, &mut session, &params, &line).await?;
        stdout.write_all(format!("{answer}\n").as_bytes()).await?;
    }

    info!(session = %session.id(), turns = session.len(), "qna session ended");
    Ok(())
}
