//! Workspace Store - owns every agent workspace directory
//!
//! The store is created once at service start and is the only place that
//! creates or deletes workspace directories.
//!
//! # Lifecycle
//!
//! ```text
//! allocate() ──► agent_{uuid}/ created, id registered
//!      │
//!      ├──resolve(id)──► handlers run against the directory (shared lock)
//!      │
//!      ├──release(id)──► exclusive lock, directory deleted, id forgotten
//!      │
//!      └──sweep_expired(ttl)──► idle workspaces deleted in the background
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, SandboxError};
use crate::metrics::{WORKSPACES_ACTIVE, WORKSPACES_SWEPT_TOTAL};

/// Prefix of every agent id and workspace directory name
pub const AGENT_ID_PREFIX: &str = "agent_";

/// Shortest period the background sweeper will tick at
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

/// One agent's isolated directory
#[derive(Debug)]
pub struct Workspace {
    agent_id: String,
    dir: PathBuf,
    created_at: Instant,
    last_used: Mutex<Instant>,
    /// Shared for runs, exclusive for writes and deletion
    gate: RwLock<()>,
    released: AtomicBool,
}

impl Workspace {
    fn new(agent_id: String, dir: PathBuf) -> Self {
        let now = Instant::now();
        Self {
            agent_id,
            dir,
            created_at: now,
            last_used: Mutex::new(now),
            gate: RwLock::new(()),
            released: AtomicBool::new(false),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Time since the workspace was last resolved
    pub fn idle_for(&self) -> Duration {
        match self.last_used.lock() {
            Ok(last) => last.elapsed(),
            Err(poisoned) => poisoned.into_inner().elapsed(),
        }
    }

    fn touch(&self) {
        let mut last = match self.last_used.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *last = Instant::now();
    }

    /// Hold the workspace for a process run; many runs may overlap
    ///
    /// Fails with `UnknownAgent` if the workspace was released while waiting.
    pub async fn lock_shared(&self) -> Result<RwLockReadGuard<'_, ()>> {
        let guard = self.gate.read().await;
        if self.released.load(Ordering::Acquire) {
            return Err(SandboxError::UnknownAgent(self.agent_id.clone()));
        }
        Ok(guard)
    }

    /// Hold the workspace exclusively (file writes, deletion)
    pub async fn lock_exclusive(&self) -> Result<RwLockWriteGuard<'_, ()>> {
        let guard = self.gate.write().await;
        if self.released.load(Ordering::Acquire) {
            return Err(SandboxError::UnknownAgent(self.agent_id.clone()));
        }
        Ok(guard)
    }

    /// Delete the directory; caller must hold the exclusive gate
    async fn destroy(&self) {
        self.released.store(true, Ordering::Release);
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(agent_id = %self.agent_id, error = %e, "Failed to remove workspace directory");
            }
        }
    }
}

/// Maps agent ids to workspace directories under a single root
#[derive(Debug)]
pub struct WorkspaceStore {
    root: PathBuf,
    workspaces: RwLock<HashMap<String, Arc<Workspace>>>,
}

impl WorkspaceStore {
    /// Create a store rooted at `root`, creating the directory if needed
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let root = root.canonicalize()?;
        info!(root = %root.display(), "Workspace store ready");
        Ok(Self {
            root,
            workspaces: RwLock::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Mint a fresh agent id and create its empty directory
    ///
    /// Ids are `agent_` + a random v4 UUID. The directory is created with an
    /// exclusive `create_dir`, so two callers can never share one.
    pub async fn allocate(&self) -> Result<Arc<Workspace>> {
        let agent_id = format!("{}{}", AGENT_ID_PREFIX, Uuid::new_v4());
        let dir = self.root.join(&agent_id);
        tokio::fs::create_dir(&dir).await?;

        let workspace = Arc::new(Workspace::new(agent_id.clone(), dir));
        let mut map = self.workspaces.write().await;
        map.insert(agent_id.clone(), Arc::clone(&workspace));
        WORKSPACES_ACTIVE.set(map.len() as f64);

        debug!(agent_id = %agent_id, dir = %workspace.dir().display(), "Workspace allocated");
        Ok(workspace)
    }

    /// Look up a workspace by agent id
    ///
    /// `UnknownAgent` if the id was never allocated or has been released,
    /// `WorkspaceCorrupted` if the id is known but its directory is gone.
    pub async fn resolve(&self, agent_id: &str) -> Result<Arc<Workspace>> {
        let workspace = {
            let map = self.workspaces.read().await;
            map.get(agent_id)
                .cloned()
                .ok_or_else(|| SandboxError::UnknownAgent(agent_id.to_string()))?
        };

        if !tokio::fs::try_exists(workspace.dir()).await.unwrap_or(false) {
            return Err(SandboxError::WorkspaceCorrupted {
                agent_id: agent_id.to_string(),
                path: workspace.dir().to_path_buf(),
            });
        }

        workspace.touch();
        Ok(workspace)
    }

    /// Forget an agent id and delete its directory
    ///
    /// Waits for in-flight runs against the workspace to finish first.
    pub async fn release(&self, agent_id: &str) -> Result<()> {
        let workspace = {
            let mut map = self.workspaces.write().await;
            let removed = map
                .remove(agent_id)
                .ok_or_else(|| SandboxError::UnknownAgent(agent_id.to_string()))?;
            WORKSPACES_ACTIVE.set(map.len() as f64);
            removed
        };

        let _gate = workspace.gate.write().await;
        workspace.destroy().await;
        info!(agent_id = %agent_id, age_secs = workspace.age().as_secs(), "Workspace released");
        Ok(())
    }

    /// Delete every workspace idle for longer than `ttl`
    ///
    /// Busy workspaces (a run holds the gate) are skipped and retried on the
    /// next sweep. Returns how many were removed.
    pub async fn sweep_expired(&self, ttl: Duration) -> usize {
        let candidates: Vec<Arc<Workspace>> = {
            let map = self.workspaces.read().await;
            map.values()
                .filter(|ws| ws.idle_for() >= ttl)
                .cloned()
                .collect()
        };

        let mut swept = 0;
        for workspace in candidates {
            let Ok(_gate) = workspace.gate.try_write() else {
                debug!(agent_id = %workspace.agent_id(), "Skipping busy workspace");
                continue;
            };

            {
                let mut map = self.workspaces.write().await;
                // Re-check under the map lock: it may have been used meanwhile
                if workspace.idle_for() < ttl || map.remove(workspace.agent_id()).is_none() {
                    continue;
                }
                WORKSPACES_ACTIVE.set(map.len() as f64);
            }

            workspace.destroy().await;
            swept += 1;
        }

        if swept > 0 {
            WORKSPACES_SWEPT_TOTAL.inc_by(swept as f64);
            info!(swept, "Expired workspaces removed");
        }
        swept
    }

    /// Number of live workspaces
    pub async fn len(&self) -> usize {
        self.workspaces.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Delete every workspace; used on graceful shutdown
    pub async fn shutdown(&self) {
        info!("Shutting down workspace store");
        let all: Vec<Arc<Workspace>> = {
            let mut map = self.workspaces.write().await;
            map.drain().map(|(_, ws)| ws).collect()
        };
        WORKSPACES_ACTIVE.set(0.0);

        for workspace in all {
            let _gate = workspace.gate.write().await;
            workspace.destroy().await;
        }
        info!("Workspace store shutdown complete");
    }

    /// Start the background sweeper
    ///
    /// `interval` is floored at [`MIN_SWEEP_INTERVAL`].
    pub fn start_sweeper(store: Arc<WorkspaceStore>, interval: Duration, ttl: Duration) -> JoinHandle<()> {
        let interval = interval.max(MIN_SWEEP_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                store.sweep_expired(ttl).await;
            }
        })
    }
}
