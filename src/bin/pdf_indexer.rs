use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use pdf_qa::config::Settings;
use pdf_qa::indexer::chunker::RecursiveSplitter;
use pdf_qa::indexer::process_pdf;
use pdf_qa::indexer::walker::walk_pdfs;
use pdf_qa::rag::RAGEngine;
use pdf_qa::tempfiles::sanitize_file_name;

#[derive(Parser, Debug)]
#[command(name = "pdf-indexer")]
#[command(about = "Bulk-index PDFs into the configured vector store")]
struct Args {
    /// Directory to recursively index
    #[arg(short, long, required_unless_present_any = ["delete", "reset"])]
    dir: Option<PathBuf>,

    /// Remove one document (by file name) from the index
    #[arg(long, value_name = "FILE_NAME", conflicts_with = "reset")]
    delete: Option<String>,

    /// Clear the whole index before doing anything else
    #[arg(long)]
    reset: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load()?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();

    println!("Opening {} vector store...", settings.vector_backend);
    let rag = RAGEngine::from_settings(&settings).await?;

    if args.reset {
        rag.reset().await?;
        println!("Index cleared.");
    }

    if let Some(file_name) = &args.delete {
        let file_name = sanitize_file_name(file_name);
        let removed = rag.delete_document(&file_name).await?;
        println!("Removed {} chunks of {}", removed, file_name);
    }

    let Some(dir) = &args.dir else {
        return Ok(());
    };
    if !dir.exists() {
        anyhow::bail!("Directory does not exist: {}", dir.display());
    }

    let splitter = RecursiveSplitter::new(settings.chunk_size, settings.chunk_overlap)?;

    println!("Scanning directory: {}", dir.display());
    let files = walk_pdfs(dir);
    println!("Found {} PDF files", files.len());

    if files.is_empty() {
        println!("No PDF files found. Exiting.");
        return Ok(());
    }

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let mut success_count = 0usize;
    let mut total_chunks = 0usize;
    let mut failed_files: Vec<(PathBuf, String)> = Vec::new();

    for path in &files {
        let file_name = sanitize_file_name(&path.file_name().unwrap_or_default().to_string_lossy());
        pb.set_message(file_name.clone());

        match index_file(&rag, path, &file_name, splitter).await {
            Ok(chunk_count) => {
                success_count += 1;
                total_chunks += chunk_count;
            }
            Err(e) => {
                tracing::warn!("Failed to index {}: {:#}", path.display(), e);
                failed_files.push((path.clone(), format!("{:#}", e)));
            }
        }

        pb.inc(1);
    }

    pb.finish_with_message("done");

    println!("\nIndexing complete!");
    println!("  Files indexed:  {}/{}", success_count, files.len());
    println!("  Files failed:   {}", failed_files.len());
    println!("  Total chunks:   {}", total_chunks);
    println!("  Backend:        {}", rag.backend_name());
    println!("  Index:          {}", settings.index_name);

    if !failed_files.is_empty() {
        println!("\nFailed files:");
        for (path, err) in &failed_files {
            println!("  {}: {}", path.display(), err);
        }
    }

    Ok(())
}

async fn index_file(rag: &RAGEngine, path: &Path, file_name: &str, splitter: RecursiveSplitter) -> Result<usize> {
    let path_owned = path.to_path_buf();
    let name = file_name.to_string();
    let chunks = tokio::task::spawn_blocking(move || process_pdf(&path_owned, &name, &splitter)).await??;

    if chunks.is_empty() {
        anyhow::bail!("no extractable text");
    }

    rag.replace_document(file_name, &chunks).await
}
