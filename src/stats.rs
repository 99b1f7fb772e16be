//! Index statistics.
//!
//! Summarises what was built: source document, split parameters, embedding
//! identity, chunk count, artifact sizes, and when the build happened. Used
//! by `askdoc stats` to check an index before querying it.

use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::index::{IndexManifest, VectorIndex};

/// Run the stats command: read the manifest and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let manifest = VectorIndex::load_manifest(&config.index.dir).await?;
    let index_size = std::fs::metadata(db::index_path(&config.index.dir))
        .map(|m| m.len())
        .unwrap_or(0);
    let chunks_size = std::fs::metadata(&config.index.chunks_path)
        .map(|m| m.len())
        .ok();

    print!("{}", render(config, &manifest, index_size, chunks_size));
    Ok(())
}

fn render(
    config: &Config,
    manifest: &IndexManifest,
    index_size: u64,
    chunks_size: Option<u64>,
) -> String {
    let built = manifest.built_at.timestamp();
    let mut out = String::new();
    out.push_str("askdoc index stats\n");
    out.push_str("==================\n\n");
    out.push_str(&format!("  Index:       {}\n", config.index.dir.display()));
    out.push_str(&format!("  Size:        {}\n", format_bytes(index_size)));
    out.push_str(&format!(
        "  Chunk store: {} ({})\n",
        config.index.chunks_path.display(),
        chunks_size
            .map(format_bytes)
            .unwrap_or_else(|| "missing".to_string())
    ));
    out.push('\n');
    out.push_str(&format!("  Source:      {}\n", manifest.source_path));
    out.push_str(&format!("  SHA-256:     {}\n", manifest.source_sha256));
    out.push_str(&format!(
        "  Chunking:    size {}, overlap {}\n",
        manifest.chunk_size, manifest.chunk_overlap
    ));
    out.push_str(&format!("  Chunks:      {}\n", manifest.chunk_count));
    out.push_str(&format!("  Embedding:   {}\n", manifest.embedding_identity()));
    out.push_str(&format!(
        "  Built:       {} ({})\n",
        format_ts_iso(built),
        format_ts_relative(built)
    ));
    out
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}
