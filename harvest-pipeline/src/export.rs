use chrono::{DateTime, Utc};
use harvest_core::{CoreError, Dataset};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// `reddit_comments_{query}_{unix}.json` in the working directory.
pub fn default_output_path(query: &str, now: DateTime<Utc>) -> PathBuf {
    let slug: String = query
        .trim()
        .chars()
        .map(|c| {
            if c.is_whitespace() || c == '/' || c == '\\' {
                '_'
            } else {
                c
            }
        })
        .collect();
    PathBuf::from(format!("reddit_comments_{}_{}.json", slug, now.timestamp()))
}

/// Writes the dataset as pretty-printed JSON, creating parent directories.
pub fn export_dataset(dataset: &Dataset, path: &Path) -> Result<(), CoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, dataset)?;
    writer.write_all(b"\n")?;
    writer.flush()?;

    info!(
        "Exported {} posts and {} comments to {}",
        dataset.metadata().total_posts,
        dataset.metadata().total_comments,
        path.display()
    );
    Ok(())
}
