use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error};

/// Writes a string to a file, creating the file or replacing its contents.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path of the file to write
    writefile: PathBuf,

    /// Text written to the file as-is
    writestr: String,
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = Args::parse();
    if let Err(err) = write_file(&args).await {
        error!(file = %args.writefile.display(), "failed to write: {err:?}");
        return Err(err);
    }
    Ok(())
}

async fn write_file(args: &Args) -> Result<()> {
    debug!(file = %args.writefile.display(), text = %args.writestr, "writing");
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&args.writefile)
        .await
        .with_context(|| format!("failed to open {}", args.writefile.display()))?;
    file.write_all(args.writestr.as_bytes())
        .await
        .with_context(|| format!("failed to write {}", args.writefile.display()))?;
    file.flush().await?;
    Ok(())
}
