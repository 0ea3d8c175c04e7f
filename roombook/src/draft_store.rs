use crate::draft::BookingDraft;
use crate::errors::Result;
use crate::types::UserId;
use anyhow::Context;
use async_trait::async_trait;
use dashmap::DashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Recoverable booking drafts, one per user.
#[async_trait]
pub trait DraftStore: Send + Sync {
    /// Store the draft, replacing any previous one for this user
    async fn save(&self, user_id: UserId, draft: &BookingDraft) -> Result<()>;

    /// Load the user's draft, if one was saved
    async fn load(&self, user_id: UserId) -> Result<Option<BookingDraft>>;

    /// Drop the user's draft. Discarding a missing draft is not an error.
    async fn discard(&self, user_id: UserId) -> Result<()>;

    async fn exists(&self, user_id: UserId) -> Result<bool> {
        Ok(self.load(user_id).await?.is_some())
    }
}

// ============================================================================
// In-memory Implementation
// ============================================================================

/// Drafts that live as long as the process
#[derive(Default)]
pub struct InMemoryDraftStore {
    drafts: DashMap<UserId, BookingDraft>,
}

impl InMemoryDraftStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DraftStore for InMemoryDraftStore {
    async fn save(&self, user_id: UserId, draft: &BookingDraft) -> Result<()> {
        self.drafts.insert(user_id, draft.clone());
        Ok(())
    }

    async fn load(&self, user_id: UserId) -> Result<Option<BookingDraft>> {
        Ok(self.drafts.get(&user_id).map(|d| d.value().clone()))
    }

    async fn discard(&self, user_id: UserId) -> Result<()> {
        self.drafts.remove(&user_id);
        Ok(())
    }

    async fn exists(&self, user_id: UserId) -> Result<bool> {
        Ok(self.drafts.contains_key(&user_id))
    }
}

// ============================================================================
// Local Filesystem Implementation
// ============================================================================

/// Drafts stored as `<user_id>.json` in a directory, so they survive restarts
pub struct FileDraftStore {
    base_path: PathBuf,
}

impl FileDraftStore {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn path(&self, user_id: UserId) -> PathBuf {
        self.base_path.join(format!("{user_id}.json"))
    }
}

#[async_trait]
impl DraftStore for FileDraftStore {
    async fn save(&self, user_id: UserId, draft: &BookingDraft) -> Result<()> {
        fs::create_dir_all(&self.base_path)
            .await
            .with_context(|| format!("Failed to create draft directory {}", self.base_path.display()))?;

        let path = self.path(user_id);
        let tmp_path = path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(draft).context("Failed to serialize draft")?;

        // Write then rename, so a crash never leaves a half-written draft behind
        let mut file = fs::File::create(&tmp_path)
            .await
            .with_context(|| format!("Failed to create {}", tmp_path.display()))?;
        file.write_all(&content)
            .await
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        file.sync_all().await.context("Failed to sync draft file")?;
        fs::rename(&tmp_path, &path)
            .await
            .with_context(|| format!("Failed to move draft into place at {}", path.display()))?;

        debug!(user_id, path = %path.display(), "Saved draft");
        Ok(())
    }

    async fn load(&self, user_id: UserId) -> Result<Option<BookingDraft>> {
        let path = self.path(user_id);
        let content = match fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(anyhow::Error::new(e).context(format!("Failed to read {}", path.display())).into()),
        };
        let draft = serde_json::from_slice(&content).with_context(|| format!("Corrupt draft file {}", path.display()))?;
        Ok(Some(draft))
    }

    async fn discard(&self, user_id: UserId) -> Result<()> {
        let path = self.path(user_id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(anyhow::Error::new(e).context(format!("Failed to remove {}", path.display())).into()),
        }
    }
}
