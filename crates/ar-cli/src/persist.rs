//! Best-effort persistence of the serialized activity document.

use std::path::{Path, PathBuf};

use chrono::Local;

/// Writes the document to a timestamped file under `out_dir`.
///
/// Returns `None` on any filesystem failure; persistence is never fatal
/// to the analysis.
pub async fn persist_xml(out_dir: &Path, document: &str) -> Option<PathBuf> {
    let result = async {
        tokio::fs::create_dir_all(out_dir).await?;
        let stamp = Local::now().format("%Y%m%d-%H%M%S");
        let path = out_dir.join(format!("{stamp}.xml"));
        tokio::fs::write(&path, document).await?;
        Ok::<_, std::io::Error>(path)
    }
    .await;

    match result {
        Ok(path) => Some(path),
        Err(err) => {
            tracing::error!(dir = %out_dir.display(), error = %err, "failed to write XML file");
            None
        }
    }
}
