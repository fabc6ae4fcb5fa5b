use crate::client::ChatModel;
use crate::describe::describe_image;
use crate::store::DescriptionStore;
use anyhow::{anyhow, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Outcome of ingesting one candidate image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemStatus {
    /// Newly described and inserted into the store.
    Indexed,
    /// Identifier was already a store key; nothing was re-described or overwritten.
    Skipped,
    /// Describe (or file read) failed; the store is unchanged for this identifier.
    Failed(String),
}

impl ItemStatus {
    /// Consumer-facing status label.
    pub fn label(&self) -> &'static str {
        match self {
            ItemStatus::Indexed => "success",
            ItemStatus::Skipped => "skipped",
            ItemStatus::Failed(_) => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ItemOutcome {
    pub identifier: String,
    pub status: ItemStatus,
}

/// Aggregated result of a batch ingestion run.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub outcomes: Vec<ItemOutcome>,
}

impl IngestReport {
    pub fn indexed(&self) -> usize {
        self.count(|s| matches!(s, ItemStatus::Indexed))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, ItemStatus::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, ItemStatus::Failed(_)))
    }

    fn count(&self, pred: impl Fn(&ItemStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

/// Ingest a single externally-supplied image into the in-memory store.
///
/// Dedup comes first: an identifier that is already a key is skipped without
/// any model call, which is what makes ingestion idempotent. A failed describe
/// leaves the store untouched for that identifier. Persisting the store is the
/// caller's job, once per batch.
pub async fn ingest_one(
    model: &dyn ChatModel,
    identifier: &str,
    image: &[u8],
    store: &mut DescriptionStore,
) -> ItemStatus {
    if store.contains(identifier) {
        tracing::debug!(identifier, "already indexed, skipping");
        return ItemStatus::Skipped;
    }
    match describe_image(model, identifier, image).await {
        Some(description) => {
            store.insert(identifier.to_string(), description);
            ItemStatus::Indexed
        }
        None => ItemStatus::Failed("failed to describe image".to_string()),
    }
}

/// Batch mode: scan `folder` (top level only) for supported image files,
/// ingest every one not yet in the store at `store_path`, then persist the
/// store exactly once. Per-item failures are recorded in the report and never
/// abort the rest of the batch.
pub async fn ingest_dir(
    model: &dyn ChatModel,
    folder: &Path,
    store_path: &Path,
) -> Result<IngestReport> {
    if !folder.is_dir() {
        return Err(anyhow!("folder '{}' does not exist", folder.display()));
    }

    let mut store = DescriptionStore::load(store_path);
    let candidates = discover_images(folder);
    tracing::info!(count = candidates.len(), folder = %folder.display(), "found candidate images");

    let mut report = IngestReport::default();
    for path in candidates {
        let identifier = path.to_string_lossy().to_string();
        if store.contains(&identifier) {
            tracing::info!(%identifier, "skipping (already processed)");
            report.outcomes.push(ItemOutcome { identifier, status: ItemStatus::Skipped });
            continue;
        }

        tracing::info!(%identifier, "processing");
        let status = match fs::read(&path) {
            Ok(bytes) => ingest_one(model, &identifier, &bytes, &mut store).await,
            Err(err) => ItemStatus::Failed(format!("unreadable file: {err}")),
        };
        if let ItemStatus::Failed(reason) = &status {
            tracing::warn!(%identifier, reason = %reason, "ingest failed for item");
        }
        report.outcomes.push(ItemOutcome { identifier, status });
    }

    store.save(store_path)?;
    tracing::info!(
        indexed = report.indexed(),
        skipped = report.skipped(),
        failed = report.failed(),
        total = store.len(),
        "ingestion complete"
    );
    Ok(report)
}

/// Supported images directly inside `folder`, in stable (sorted) order.
/// Depth 1 keeps the scan non-recursive.
fn discover_images(folder: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file() && crate::is_supported_image(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}
