mod bot;
mod config;
mod dataset;
mod lang;
mod ocr;
mod ollama;
mod rag;
mod store;
mod telegram;
mod text;
mod translate;

pub const USER_AGENT: &str = concat!("medibot/", env!("CARGO_PKG_VERSION"));

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use reqwest::Client;
use tracing::{error, info};

use bot::Bot;
use config::Settings;
use ocr::Ocr;
use ollama::{Embedder, OllamaClient};
use rag::Assistant;
use store::VectorStore;
use telegram::TelegramClient;
use translate::GoogleTranslator;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Bilingual (English/Bangla) medication assistant.
#[derive(Parser)]
#[command(name = "medibot", version, about, long_about = None)]
struct Cli {
    /// Vector index directory [env: INDEX_DIR]
    #[arg(long, global = true, value_name = "DIR")]
    index_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the Telegram bot (long polling)
    Bot,
    /// Answer one question through the retrieval pipeline
    Ask {
        #[arg(value_name = "QUERY")]
        query: String,
    },
    /// Embed the drug dataset into the vector index (resumable)
    Index {
        #[arg(long, default_value = "data", value_name = "DIR")]
        data_dir: PathBuf,
        /// File name glob
        #[arg(long, default_value = store::records::DEFAULT_PATTERN)]
        pattern: String,
        /// Documents embedded per request; the index is saved after each
        #[arg(long, default_value_t = store::build::DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,
    },
    /// Print the number of embedded documents
    Inspect,
    /// Similarity search without generation
    Search {
        #[arg(value_name = "QUERY")]
        query: String,
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// Generate an evaluation query set from the JSON dataset
    GenQueries {
        #[arg(long, default_value = "data/modified_drug_dataset.json")]
        input: PathBuf,
        #[arg(long, default_value = "data/test_hundred_queries.json")]
        output: PathBuf,
        #[arg(long, default_value_t = dataset::DEFAULT_TOTAL)]
        total: usize,
    },
    /// Add Bangla translations of selected columns to a CSV
    TranslateDataset {
        #[arg(long, default_value = "data/medicine_data.csv")]
        input: PathBuf,
        #[arg(long, default_value = "data/medicine_data_bilingual.csv")]
        output: PathBuf,
        /// Column to translate (repeatable)
        #[arg(long = "column", value_name = "NAME")]
        columns: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("medibot=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::from_env()?;
    if let Some(dir) = cli.index_dir {
        settings.index_dir = dir;
    }

    let http = Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(HTTP_TIMEOUT)
        .build()?;
    let ollama = || {
        OllamaClient::new(
            http.clone(),
            &settings.ollama_host,
            &settings.chat_model,
            &settings.embedding_model,
        )
    };

    match cli.command {
        Commands::Bot => {
            let token = config::bot_token_from_env()?;
            let assistant = assistant(&settings, ollama(), http.clone())?;
            let bot = Bot::new(
                TelegramClient::new(http.clone(), token),
                assistant,
                Ocr::tesseract(&settings.tesseract_cmd),
                &settings.bot_username,
            );
            info!("starting medibot");
            tokio::select! {
                result = bot.run() => {
                    result.inspect_err(|e| error!("bot stopped: {e}"))?;
                }
                _ = tokio::signal::ctrl_c() => info!("shutting down"),
            }
        }
        Commands::Ask { query } => {
            let assistant = assistant(&settings, ollama(), http.clone())?;
            println!("{}", assistant.answer(&query).await);
        }
        Commands::Index {
            data_dir,
            pattern,
            chunk_size,
        } => {
            let documents = store::records::load_documents(&data_dir, &pattern)?;
            let report =
                store::build::build_index(&ollama(), documents, &settings.index_dir, chunk_size)
                    .await?;
            println!(
                "Indexed {} documents ({} already embedded, {} added) into {}",
                report.total,
                report.already_embedded,
                report.added,
                settings.index_dir.display()
            );
        }
        Commands::Inspect => match VectorStore::open(&settings.index_dir)? {
            Some(store) => println!(
                "Total embedded documents: {} (model {}, {} dimensions)",
                store.len(),
                store.model(),
                store.dimensions()
            ),
            None => println!("No index at {}", settings.index_dir.display()),
        },
        Commands::Search { query, k } => {
            let store = open_store(&settings.index_dir, &settings.embedding_model)?;
            let embedder = ollama();
            let embedding = embedder
                .embed(&[query])
                .await?
                .into_iter()
                .next()
                .unwrap_or_default();
            let hits = store.similarity_search(&embedding, k.unwrap_or(settings.retrieval_k))?;
            if hits.is_empty() {
                println!("No results.");
            }
            for (i, hit) in hits.iter().enumerate() {
                println!(
                    "## {}. {} ({}) score {:.4}\n{}\n",
                    i + 1,
                    hit.document.metadata.name,
                    hit.document.metadata.source,
                    hit.score,
                    hit.document.content
                );
            }
        }
        Commands::GenQueries {
            input,
            output,
            total,
        } => {
            let count = dataset::generate_test_queries(&input, &output, total)?;
            println!("Generated {count} test queries at {}", output.display());
        }
        Commands::TranslateDataset {
            input,
            output,
            columns,
        } => {
            let columns = if columns.is_empty() {
                dataset::DEFAULT_COLUMNS.map(String::from).to_vec()
            } else {
                columns
            };
            let translator = GoogleTranslator::new(http.clone());
            let rows = dataset::translate_dataset(&translator, &input, &output, &columns).await?;
            println!("Bilingual CSV created: {} ({rows} rows)", output.display());
        }
    }
    Ok(())
}

/// Loads the index, or an empty one when none has been built yet.
fn open_store(dir: &Path, embedding_model: &str) -> Result<VectorStore, store::StoreError> {
    match VectorStore::open(dir)? {
        Some(store) => {
            store.ensure_model(embedding_model)?;
            info!(documents = store.len(), dir = %dir.display(), "index loaded");
            Ok(store)
        }
        None => {
            tracing::warn!(dir = %dir.display(), "no index found; answers will have no context");
            Ok(VectorStore::new(embedding_model))
        }
    }
}

fn assistant(
    settings: &Settings,
    ollama: OllamaClient,
    http: Client,
) -> Result<Assistant<OllamaClient, OllamaClient, GoogleTranslator>, store::StoreError> {
    let store = open_store(&settings.index_dir, &settings.embedding_model)?;
    Ok(Assistant::new(
        ollama.clone(),
        ollama,
        GoogleTranslator::new(http),
        store,
        settings.retrieval_k,
    ))
}
