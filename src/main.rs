use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use export_pipeline::catalog::GlueCatalog;
use export_pipeline::config::PipelineConfig;
use export_pipeline::events::{ObjectStoreNotification, QueryStateChangeEvent};
use export_pipeline::execution::{AthenaEngine, QueryExecutor};
use export_pipeline::export::{DynamoDbExportService, ExportTrigger};
use export_pipeline::pipeline::{ExportCompletedPipeline, QueryFinishedHandler};
use export_pipeline::tables::TableLifecycleManager;
use serde::de::DeserializeOwned;
use std::io::Read;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "export-pipeline")]
#[command(about = "Builds query tables over table exports and harvests derived aggregates")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a point-in-time export of every configured source table
    StartExport,
    /// Handle an export completion notification (object-storage event JSON)
    ExportCompleted {
        /// Event file; reads stdin when omitted
        #[arg(short, long)]
        event: Option<PathBuf>,
    },
    /// Handle a query state change notification
    QueryStateChanged {
        /// Event file; reads stdin when omitted
        #[arg(short, long)]
        event: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = PipelineConfig::from_env().context("Failed to load configuration")?;
    let aws = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

    match args.command {
        Commands::StartExport => {
            let service = DynamoDbExportService::new(aws_sdk_dynamodb::Client::new(&aws));
            let trigger = ExportTrigger::new(&service, config.bucket.clone(), config.export_mode);
            let exports = trigger
                .run(&config.source_tables()?, chrono::Utc::now())
                .await?;
            info!("Started {} exports", exports.len());
        }
        Commands::ExportCompleted { event } => {
            let notification: ObjectStoreNotification = read_event(event)?;
            let engine = AthenaEngine::new(
                aws_sdk_athena::Client::new(&aws),
                config.database()?.to_string(),
                config.work_group()?.to_string(),
            );
            let catalog = GlueCatalog::new(aws_sdk_glue::Client::new(&aws));
            let executor = QueryExecutor::new(&engine, config.poll_policy);
            let tables = TableLifecycleManager::new(&executor, &catalog, config.database()?.to_string());
            let pipeline =
                ExportCompletedPipeline::new(&executor, &tables, config.export_mode, config.bucket.clone());

            let submitted = pipeline
                .handle(&notification, chrono::Utc::now().date_naive())
                .await?;
            info!("Submitted {} aggregate queries", submitted.len());
        }
        Commands::QueryStateChanged { event } => {
            let event: QueryStateChangeEvent = read_event(event)?;
            let engine = AthenaEngine::new(
                aws_sdk_athena::Client::new(&aws),
                config.database()?.to_string(),
                config.work_group()?.to_string(),
            );
            QueryFinishedHandler::new(&engine).handle(&event.detail).await?;
        }
    }

    Ok(())
}

fn read_event<T: DeserializeOwned>(path: Option<PathBuf>) -> Result<T> {
    let raw = match path {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read event file {:?}", path))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read event from stdin")?;
            buf
        }
    };
    serde_json::from_str(&raw).context("Failed to parse event JSON")
}
