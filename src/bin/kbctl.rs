use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use kbcore::index::ChatType;
use kbcore::pipeline::{IngestRequest, KnowledgeBase, KnowledgeBaseApi, build_from_config};
use kbcore::{config, logging};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(
    name = "kbctl",
    about = "Operator commands for the knowledge base: index admin, bulk ingest, repair, citations"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the vector index when it does not exist.
    EnsureIndex,
    /// Drop and rebuild the vector index, losing every chunk.
    RecreateIndex {
        #[arg(long)]
        yes: bool,
    },
    /// Ingest a file, or every file under a directory, and wait for processing.
    Ingest {
        path: PathBuf,
        #[arg(long)]
        department: String,
        #[arg(long, default_value = "doc")]
        chat_type: String,
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        thread: Option<String>,
    },
    /// Re-run every blank or error document.
    Repair,
    /// Print the citations resolved for a thread.
    Citations { thread_id: String },
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = config::init_config().context("failed to load configuration")?;
    logging::init_tracing();
    let service = build_from_config(config).await?;

    match cli.command {
        Command::EnsureIndex => {
            service.ensure_index_created().await?;
            println!("index ready");
        }
        Command::RecreateIndex { yes } => {
            if !yes {
                bail!("recreating the index deletes every chunk; pass --yes to confirm");
            }
            service.force_recreate_index().await?;
            println!("index recreated");
        }
        Command::Ingest {
            path,
            department,
            chat_type,
            user,
            thread,
        } => {
            let chat_type: ChatType = chat_type.parse().map_err(anyhow::Error::msg)?;
            ingest_path(&service, &path, &department, chat_type, user, thread).await?;
        }
        Command::Repair => {
            let report = service.repair_blank_or_error_documents().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.failed > 0 {
                bail!("{} of {} documents still failing", report.failed, report.attempted);
            }
        }
        Command::Citations { thread_id } => {
            let resolution = service.resolve(&thread_id).await;
            println!("{}", serde_json::to_string_pretty(&resolution)?);
        }
    }
    Ok(())
}

async fn ingest_path(
    service: &KnowledgeBase,
    path: &Path,
    department: &str,
    chat_type: ChatType,
    user: Option<String>,
    thread: Option<String>,
) -> Result<()> {
    let mut accepted = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", path.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().into_owned();
        let bytes = tokio::fs::read(entry.path())
            .await
            .with_context(|| format!("failed to read {}", entry.path().display()))?;

        let mut request = IngestRequest::new(bytes, file_name.clone(), department);
        request.chat_type = chat_type;
        request.user = user.clone();
        request.chat_thread_id = thread.clone();
        if let Some(user) = &user {
            request.uploaded_by = user.clone();
        }

        match service.ingest_with(request).await {
            Ok(document_id) => accepted.push((file_name, document_id)),
            Err(error) => eprintln!("skipped {file_name}: {error}"),
        }
    }

    service.supervisor().wait_idle().await;

    let mut failed = 0;
    for (file_name, document_id) in &accepted {
        let document = service.tracker().get(document_id).await?;
        match &document.error_reason {
            Some(reason) => {
                failed += 1;
                println!("{file_name}\t{document_id}\t{}\t{reason}", document.status);
            }
            None => println!(
                "{file_name}\t{document_id}\t{}\t{} pages",
                document.status, document.pages
            ),
        }
    }
    if failed > 0 {
        bail!("{failed} of {} documents failed", accepted.len());
    }
    Ok(())
}
