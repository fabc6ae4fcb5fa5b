pub mod client;
pub mod describe;
pub mod ingest;
pub mod rank;
pub mod store;

pub use client::{ChatModel, OpenAiClient};
pub use ingest::{ingest_dir, ingest_one, IngestReport, ItemStatus};
pub use rank::{rank, RankError, RankedResult};
pub use store::DescriptionStore;

/// Image file extensions the ingestion pipeline accepts, matched case-insensitively.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];

/// Check whether a path carries one of the supported image extensions.
pub fn is_supported_image<P: AsRef<std::path::Path>>(path: P) -> bool {
    path.as_ref()
        .extension()
        .and_then(|s| s.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}
