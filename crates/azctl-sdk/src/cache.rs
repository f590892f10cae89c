//! Durable credential cache
//!
//! One JSON file holds two logical collections: cached OAuth token entries
//! and saved service-principal credentials, distinguished on disk by which
//! fields are present. The file is shared by every concurrently-running
//! azctl process, so the cache re-reads it before each read-modify-write
//! and all writes are atomic replaces. No lock is ever held beyond the
//! rename itself: a crashed process must never be able to block others.
//!
//! A corrupt or unreadable file is treated as an empty cache (logged at
//! debug level) so that a fresh `azctl login` can always recover. Write
//! failures are fatal: credentials must not be lost silently.

use crate::error::{AuthError, AuthResult};
use crate::persist::write_atomic;
use crate::types::{ServicePrincipalEntry, ServicePrincipalSecret, TokenEntry, TokenQuery};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How flushes reach the disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistMode {
    /// Flush inline before the mutating call returns.
    #[default]
    Sync,
    /// Dispatch the flush as a background task so the command is not
    /// blocked; [`TokenCache::shutdown`] is the barrier that guarantees it
    /// completed before process exit.
    Deferred,
}

/// One element of the on-disk array. The two kinds are told apart by field
/// presence, matching the documented file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum CacheEntry {
    ServicePrincipal(ServicePrincipalEntry),
    User(TokenEntry),
}

/// The credential cache handle. Owned by the `Profile`; nothing else may
/// mutate the backing file.
#[derive(Debug)]
pub struct TokenCache {
    path: PathBuf,
    tokens: Vec<TokenEntry>,
    service_principals: Vec<ServicePrincipalEntry>,
    persist: PersistMode,
    inflight: Option<JoinHandle<AuthResult<()>>>,
}

impl TokenCache {
    /// Open the cache at `path`, loading current contents if the file
    /// exists.
    pub async fn open(path: impl Into<PathBuf>, persist: PersistMode) -> Self {
        let mut cache = Self {
            path: path.into(),
            tokens: Vec::new(),
            service_principals: Vec::new(),
            persist,
            inflight: None,
        };
        cache.load().await;
        cache
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// (Re)read the backing file. Missing or empty files produce an empty
    /// cache; corrupt files do too, with a debug log, so a re-login can
    /// recover.
    pub async fn load(&mut self) {
        self.tokens.clear();
        self.service_principals.clear();

        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return,
            Err(err) => {
                debug!("Credential cache at {} is unreadable ({err}), treating as empty", self.path.display());
                return;
            }
        };

        if raw.trim().is_empty() {
            return;
        }

        let entries: Vec<CacheEntry> = match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(err) => {
                debug!("Credential cache at {} is corrupt ({err}), treating as empty", self.path.display());
                return;
            }
        };

        for entry in entries {
            match entry {
                CacheEntry::User(token) => self.tokens.push(token),
                CacheEntry::ServicePrincipal(sp) => self.service_principals.push(sp),
            }
        }

        debug!(
            "Loaded {} token entries and {} service principals from {}",
            self.tokens.len(),
            self.service_principals.len(),
            self.path.display()
        );
    }

    /// All token entries whose fields are a superset-match of `query`.
    /// No match is an empty result, not an error.
    pub fn find(&self, query: &TokenQuery) -> Vec<TokenEntry> {
        self.tokens
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect()
    }

    /// Re-read from disk for a read-modify-write. Any in-flight deferred
    /// flush must land first, or the fresh read would miss it.
    async fn reload_for_update(&mut self) -> AuthResult<()> {
        self.barrier().await?;
        self.load().await;
        Ok(())
    }

    /// Insert or replace token entries, keyed by
    /// (authority, client id, user id). Also covers the silent-refresh
    /// path, where an existing entry gets a new access token and expiry.
    pub async fn upsert_token_entries(&mut self, entries: Vec<TokenEntry>) -> AuthResult<()> {
        self.reload_for_update().await?;
        for entry in entries {
            self.tokens.retain(|existing| {
                !(existing.authority.eq_ignore_ascii_case(&entry.authority)
                    && existing.client_id.eq_ignore_ascii_case(&entry.client_id)
                    && existing.user_id.eq_ignore_ascii_case(&entry.user_id)
                    && existing.resource.eq_ignore_ascii_case(&entry.resource))
            });
            self.tokens.push(entry);
        }
        self.flush().await
    }

    /// Upsert a service-principal credential, replacing any entry with the
    /// same principal id. Entries without usable credential material are a
    /// validation error.
    pub async fn save_service_principal_entry(
        &mut self,
        entry: ServicePrincipalEntry,
    ) -> AuthResult<()> {
        entry.validate().map_err(AuthError::Validation)?;

        self.reload_for_update().await?;
        self.service_principals
            .retain(|sp| !sp.service_principal_id.eq_ignore_ascii_case(&entry.service_principal_id));
        self.service_principals.push(entry);
        self.flush().await
    }

    /// The stored secret or certificate reference of a principal.
    pub fn retrieve_secret_of_service_principal(
        &self,
        sp_id: &str,
    ) -> AuthResult<&ServicePrincipalEntry> {
        self.service_principals
            .iter()
            .find(|sp| sp.service_principal_id.eq_ignore_ascii_case(sp_id))
            .ok_or_else(|| AuthError::NotFound {
                kind: "service principal",
                identifier: sp_id.to_string(),
            })
    }

    /// Remove every credential held for `identifier`. Logout does not know
    /// in advance whether the identifier names a user or a service
    /// principal, so both collections are checked.
    pub async fn remove_cached_creds(&mut self, identifier: &str) -> AuthResult<()> {
        self.reload_for_update().await?;

        let before = self.tokens.len() + self.service_principals.len();
        self.tokens
            .retain(|t| !t.user_id.eq_ignore_ascii_case(identifier));
        self.service_principals
            .retain(|sp| !sp.service_principal_id.eq_ignore_ascii_case(identifier));

        if before == self.tokens.len() + self.service_principals.len() {
            return Ok(());
        }
        self.flush().await
    }

    /// Drop all state and delete the backing file.
    pub async fn clear_all(&mut self) -> AuthResult<()> {
        self.barrier().await?;
        self.tokens.clear();
        self.service_principals.clear();

        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AuthError::Storage(format!(
                "could not delete {}: {err}",
                self.path.display()
            ))),
        }
    }

    /// Serialize current state back to the backing file.
    pub async fn flush(&mut self) -> AuthResult<()> {
        let entries: Vec<CacheEntry> = self
            .service_principals
            .iter()
            .cloned()
            .map(CacheEntry::ServicePrincipal)
            .chain(self.tokens.iter().cloned().map(CacheEntry::User))
            .collect();
        let contents = serde_json::to_string_pretty(&entries)?;

        match self.persist {
            PersistMode::Sync => write_atomic(&self.path, &contents)
                .await
                .map_err(|err| storage_error(&self.path, err)),
            PersistMode::Deferred => {
                // Await the previous flush first so writes land in order.
                self.barrier().await?;

                let path = self.path.clone();
                self.inflight = Some(tokio::spawn(async move {
                    write_atomic(&path, &contents)
                        .await
                        .map_err(|err| storage_error(&path, err))
                }));
                Ok(())
            }
        }
    }

    /// Process-exit barrier: waits for any in-flight deferred flush and
    /// surfaces its result. Callers must invoke this before exiting when
    /// running in [`PersistMode::Deferred`].
    pub async fn shutdown(&mut self) -> AuthResult<()> {
        self.barrier().await
    }

    async fn barrier(&mut self) -> AuthResult<()> {
        if let Some(handle) = self.inflight.take() {
            match handle.await {
                Ok(result) => result,
                Err(err) => {
                    warn!("Deferred credential flush task failed: {err}");
                    Err(AuthError::Storage(format!(
                        "background credential flush did not complete: {err}"
                    )))
                }
            }
        } else {
            Ok(())
        }
    }

    #[cfg(test)]
    pub(crate) fn token_count(&self) -> usize {
        self.tokens.len()
    }
}

fn storage_error(path: &Path, err: std::io::Error) -> AuthError {
    AuthError::Storage(format!("could not write {}: {err}", path.display()))
}
