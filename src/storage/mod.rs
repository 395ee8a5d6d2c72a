//! Form submission storage and pagination

mod submission_store;

pub use submission_store::SubmissionStore;

use crate::models::{FormSubmission, PaginatedSubmissions, SubmissionFilter};
use once_cell::sync::Lazy;
use std::sync::{Arc, Mutex};

static STORE: Lazy<Mutex<Option<Arc<SubmissionStore>>>> = Lazy::new(|| Mutex::new(None));

/// Initialize the global submission store if not already present
pub fn init_submission_store(storage_path: &str) -> anyhow::Result<()> {
    let mut guard = STORE
        .lock()
        .map_err(|e| anyhow::anyhow!("lock poisoned: {}", e))?;
    if guard.is_some() {
        return Ok(());
    }
    let store = Arc::new(SubmissionStore::new(storage_path)?);
    tracing::info!("Submission store opened at {:?}", store.path());
    *guard = Some(store);
    Ok(())
}

/// Reset the store for testing purposes. This allows tests to re-initialize
/// with a fresh storage path.
#[cfg(test)]
pub fn reset_store_for_tests(storage_path: &str) -> anyhow::Result<()> {
    let mut guard = STORE
        .lock()
        .map_err(|e| anyhow::anyhow!("lock poisoned: {}", e))?;
    *guard = None;
    let store = Arc::new(SubmissionStore::new(storage_path)?);
    *guard = Some(store);
    Ok(())
}

/// Drop the store so routes report the backend as unavailable.
#[cfg(test)]
pub fn clear_store_for_tests() {
    if let Ok(mut guard) = STORE.lock() {
        *guard = None;
    }
}

fn store() -> anyhow::Result<Arc<SubmissionStore>> {
    let guard = STORE
        .lock()
        .map_err(|e| anyhow::anyhow!("lock poisoned: {}", e))?;
    guard
        .clone()
        .ok_or_else(|| anyhow::anyhow!("submission store not initialized"))
}

pub fn is_initialized() -> bool {
    STORE.lock().map(|guard| guard.is_some()).unwrap_or(false)
}

/// Persist a validated submission.
pub async fn persist_submission(submission: FormSubmission) -> anyhow::Result<()> {
    let store = store()?;
    store.add(submission).await
}

/// Query submissions using pagination and an optional form type filter
pub async fn query_submissions(
    filter: &SubmissionFilter,
    page: u32,
    page_size: u32,
) -> anyhow::Result<PaginatedSubmissions> {
    let store = store()?;
    store.query(filter, page, page_size).await
}

/// Get a single submission by ID
pub async fn get_submission_by_id(id: &str) -> anyhow::Result<Option<FormSubmission>> {
    let store = store()?;
    store.get_by_id(id).await
}

pub async fn get_submission_count() -> anyhow::Result<u64> {
    let store = store()?;
    store.count().await
}
