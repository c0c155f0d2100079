use clap::{Parser, Subcommand};
use qna_search_core::stores::flatfile::parse_fallback_table;
use qna_search_core::{
    AnswerPipeline, CharacterNgramEmbedder, Embedder, FlatFileIndex, PipelineConfig, SqliteStore,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "qna-search", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// SQLite knowledge base path
    #[arg(long, env = "QNA_DB", default_value = "qna.db")]
    db: String,

    /// Flat-file fallback path
    #[arg(long, env = "QNA_FALLBACK", default_value = "meus_qna.csv")]
    fallback: String,
}

#[derive(Subcommand)]
enum Command {
    /// Answer one question against the knowledge base.
    Ask {
        /// The question text
        #[arg(long)]
        question: String,
        /// Skip the primary store and answer from the fallback file only.
        #[arg(long, default_value_t = false)]
        no_store: bool,
        /// Print the retrieval trace.
        #[arg(long, default_value_t = false)]
        explain: bool,
        /// Weight of embedding similarity in the fused score.
        #[arg(long, env = "QNA_EMB_WEIGHT", default_value = "0.75")]
        weight_embedding: f64,
        /// Minimum fused score for an unqualified accept.
        #[arg(long, env = "QNA_THRESHOLD", default_value = "0.62")]
        threshold: f64,
        /// Candidates kept per source before pooling.
        #[arg(long, default_value = "3")]
        top_k: usize,
        /// Cap on candidates pulled per store strategy.
        #[arg(long, env = "QNA_STORE_LIMIT", default_value = "80")]
        store_limit: usize,
    },
    /// Import a QnA CSV into the store, normalizing and embedding rows.
    Import {
        /// CSV with pergunta/resposta (or question/answer) columns.
        #[arg(long)]
        csv: String,
    },
    /// Fill missing normalized-text and embedding columns.
    Backfill,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let embedder = CharacterNgramEmbedder::default();

    match cli.command {
        Command::Ask {
            question,
            no_store,
            explain,
            weight_embedding,
            threshold,
            top_k,
            store_limit,
        } => {
            let config = PipelineConfig {
                weight_embedding,
                confidence_threshold: threshold,
                top_k,
                store_limit,
                ..PipelineConfig::default()
            };

            let store = if no_store {
                None
            } else {
                Some(
                    SqliteStore::open(&cli.db)
                        .map_err(|error| anyhow::anyhow!(error.to_string()))?
                        .with_min_token_len(config.min_indexed_token_len),
                )
            };
            let fallback = FlatFileIndex::new(&cli.fallback);

            let pipeline = AnswerPipeline::new(store, fallback, embedder, config)
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            let result = pipeline.find_answer(&question).await;

            println!("{}", result.text);
            println!();
            println!(
                "score={:.4} source={} id={} fuzzy={}",
                result.score,
                result.source,
                result.id.as_deref().unwrap_or("-"),
                result.fuzzy
            );
            if explain {
                println!("{}", serde_json::to_string_pretty(&result.trace)?);
            }
        }
        Command::Import { csv } => {
            let content = tokio::fs::read_to_string(&csv).await?;
            let rows = parse_fallback_table(&content);
            if rows.is_empty() {
                println!("0 rows imported (no parseable QnA rows in {csv})");
                return Ok(());
            }

            let store = SqliteStore::open(&cli.db)
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            let mut imported = 0usize;
            for row in &rows {
                let (_, answer_id) = store
                    .insert_qna(&row.question_text, &row.answer_text)
                    .map_err(|error| anyhow::anyhow!(error.to_string()))?;
                let embedding = row
                    .answer_embedding
                    .clone()
                    .unwrap_or_else(|| embedder.embed(&row.answer_norm));
                store
                    .set_answer_embedding(answer_id, &embedding)
                    .map_err(|error| anyhow::anyhow!(error.to_string()))?;
                imported += 1;
            }

            info!(csv = %csv, imported, "import finished");
            println!("{imported} rows imported into {}", cli.db);
        }
        Command::Backfill => {
            let store = SqliteStore::open(&cli.db)
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            let normalized = store
                .backfill_normalized()
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            let embedded = store
                .backfill_embeddings(&embedder)
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            println!("{normalized} rows normalized, {embedded} embeddings computed");
        }
    }

    Ok(())
}
