//! Durable worker id assignment backed by a JSON file.
//!
//! Every process start registers a new [`WorkerNode`] and uses its id as the
//! worker id. Ids are never reused, so two launches can never embed the same
//! worker id even if one of them crashed without cleaning up.
//!
//! The file is rewritten through a temporary file and a rename, and a
//! sibling `.lock` file serializes concurrent launches on the same host. The
//! lock records the holder's pid and is broken once it is older than
//! [`STALE_LOCK_AGE`], so a launch killed while registering does not block
//! every later one.

use core::time::Duration;
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use ringflake::{Error, Result, WorkerIdAssigner};
use serde::{Deserialize, Serialize};

const LOCK_ATTEMPTS: u32 = 100;
const LOCK_BACKOFF: Duration = Duration::from_millis(20);

/// A registration holds the lock for a single read and rewrite, so a lock
/// this old was left behind by a process that died holding it.
pub const STALE_LOCK_AGE: Duration = Duration::from_secs(30);

/// Where a worker process runs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeType {
    /// Inside a container; the host name is the container's.
    Container,
    /// Directly on a host.
    Actual,
}

/// One registration in the worker registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerNode {
    /// The worker id handed to the generator.
    pub id: u64,
    pub host_name: String,
    pub port: u16,
    pub node_type: NodeType,
    /// Unix seconds of the launch that registered this node.
    pub launch_date: i64,
    /// Unix milliseconds when the record was written.
    pub created: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Registry {
    #[serde(default)]
    nodes: Vec<WorkerNode>,
}

/// Assigns worker ids by appending to a JSON registry file.
#[derive(Clone, Debug)]
pub struct FileWorkerNodeAssigner {
    path: PathBuf,
    host_name: String,
    port: u16,
    node_type: NodeType,
}

/// Removes the lock file when dropped.
struct LockGuard(PathBuf);

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.0) {
            tracing::warn!("Failed to remove registry lock {}: {e}", self.0.display());
        }
    }
}

impl FileWorkerNodeAssigner {
    pub fn new(
        path: impl Into<PathBuf>,
        host_name: impl Into<String>,
        port: u16,
        node_type: NodeType,
    ) -> Self {
        Self {
            path: path.into(),
            host_name: host_name.into(),
            port,
            node_type,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every node registered so far, oldest first.
    ///
    /// # Errors
    ///
    /// [`Error::WorkerAssignment`] if the file exists but cannot be read or
    /// parsed.
    pub fn nodes(&self) -> Result<Vec<WorkerNode>> {
        Ok(self.load()?.nodes)
    }

    /// Registers this launch and returns the new node.
    ///
    /// # Errors
    ///
    /// [`Error::WorkerAssignment`] on any I/O or format problem, or when the
    /// lock cannot be acquired.
    pub fn register(&self) -> Result<WorkerNode> {
        let _lock = self.lock()?;

        let mut registry = self.load()?;
        let id = registry.nodes.iter().map(|n| n.id).max().unwrap_or(0) + 1;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| assignment(format!("system clock before 1970: {e}")))?;
        let node = WorkerNode {
            id,
            host_name: self.host_name.clone(),
            port: self.port,
            node_type: self.node_type,
            launch_date: now.as_secs() as i64,
            created: now.as_millis() as i64,
        };
        registry.nodes.push(node.clone());
        self.store(&registry)?;

        tracing::info!(
            "Registered worker node {} ({}:{}, {:?}) in {}",
            node.id,
            node.host_name,
            node.port,
            node.node_type,
            self.path.display()
        );
        Ok(node)
    }

    fn load(&self) -> Result<Registry> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(Registry::default()),
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                assignment(format!("corrupt registry {}: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Registry::default()),
            Err(e) => Err(assignment(format!(
                "failed to read {}: {e}",
                self.path.display()
            ))),
        }
    }

    fn store(&self, registry: &Registry) -> Result<()> {
        let raw = serde_json::to_string_pretty(registry)
            .map_err(|e| assignment(format!("failed to encode registry: {e}")))?;
        let tmp = self.sibling(".tmp");
        fs::write(&tmp, raw)
            .map_err(|e| assignment(format!("failed to write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            assignment(format!(
                "failed to move {} to {}: {e}",
                tmp.display(),
                self.path.display()
            ))
        })
    }

    fn lock(&self) -> Result<LockGuard> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| assignment(format!("failed to create {}: {e}", parent.display())))?;
        }

        let lock = self.sibling(".lock");
        for _ in 0..LOCK_ATTEMPTS {
            match OpenOptions::new().write(true).create_new(true).open(&lock) {
                Ok(mut file) => {
                    // Only informs whoever finds the lock, the guard owns it either way.
                    let _ = writeln!(file, "{}", std::process::id());
                    return Ok(LockGuard(lock));
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if !Self::break_stale_lock(&lock) {
                        thread::sleep(LOCK_BACKOFF);
                    }
                }
                Err(e) => {
                    return Err(assignment(format!(
                        "failed to create {}: {e}",
                        lock.display()
                    )));
                }
            }
        }

        Err(assignment(format!(
            "registry is locked by another process ({0}); it is broken automatically after {1:?}, \
             or delete {0} by hand if no launch is in progress",
            lock.display(),
            STALE_LOCK_AGE
        )))
    }

    /// Removes `lock` if it is older than [`STALE_LOCK_AGE`]. Returns `true`
    /// when the caller should retry right away.
    fn break_stale_lock(lock: &Path) -> bool {
        let age = fs::metadata(lock)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok());
        let Some(age) = age.filter(|age| *age >= STALE_LOCK_AGE) else {
            return false;
        };

        let holder = fs::read_to_string(lock).unwrap_or_default();
        match fs::remove_file(lock) {
            Ok(()) => {
                tracing::warn!(
                    "Broke stale registry lock {} held by pid {} for {:?}",
                    lock.display(),
                    holder.trim(),
                    age
                );
                true
            }
            // Someone else broke or released it first.
            Err(e) if e.kind() == ErrorKind::NotFound => true,
            Err(e) => {
                tracing::warn!("Failed to break stale registry lock {}: {e}", lock.display());
                false
            }
        }
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(suffix);
        PathBuf::from(name)
    }
}

impl WorkerIdAssigner for FileWorkerNodeAssigner {
    fn assign_worker_id(&self) -> Result<u64> {
        self.register().map(|node| node.id)
    }
}

/// Host name recorded for this process: `$HOSTNAME` when set.
pub fn default_host_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

fn assignment(reason: String) -> Error {
    Error::WorkerAssignment { reason }
}
