use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::actor::{Coordinator, CoordinatorHandle, CoordinatorSettings};
use super::error::CoordinatorError;
use crate::spotify::TokenExchange;
use crate::storage::Database;

/// Logical name of the account's coordinator
pub const MAIN_TOKEN: &str = "MAIN_TOKEN";

/// How long shutdown waits for a coordinator to drain its mailbox
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

struct Instance {
    handle: CoordinatorHandle,
    task: JoinHandle<()>,
}

/// Resolves coordinator names to running instances, starting them lazily.
///
/// Each name maps to at most one running task. The load from storage
/// happens while the registry's write lock is held, so nothing can reach an
/// instance before its state is in memory.
pub struct CoordinatorRegistry {
    db: Database,
    exchange: Arc<dyn TokenExchange>,
    instances: RwLock<HashMap<String, Instance>>,
    names: Vec<String>,
    settings: CoordinatorSettings,
}

impl CoordinatorRegistry {
    /// A registry serving only [`MAIN_TOKEN`].
    pub fn new(
        db: Database,
        exchange: Arc<dyn TokenExchange>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            db,
            exchange,
            instances: RwLock::new(HashMap::new()),
            names: vec![MAIN_TOKEN.to_string()],
            settings,
        }
    }

    pub fn serves(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Get the running instance for `name`, starting it on first use.
    pub async fn resolve(&self, name: &str) -> Result<CoordinatorHandle, CoordinatorError> {
        if !self.serves(name) {
            return Err(CoordinatorError::NotFound(name.to_string()));
        }

        // Fast path: already running (read lock only)
        {
            let instances = self.instances.read().await;
            if let Some(instance) = instances.get(name) {
                if !instance.handle.is_closed() {
                    return Ok(instance.handle.clone());
                }
            }
        }

        // Slow path: start it (write lock)
        let mut instances = self.instances.write().await;

        // Double-check after acquiring write lock
        if let Some(instance) = instances.get(name) {
            if !instance.handle.is_closed() {
                return Ok(instance.handle.clone());
            }
            warn!(instance = %name, "Coordinator task stopped, restarting from storage");
        }

        let coordinator = Coordinator::load(
            name,
            self.db.clone(),
            Arc::clone(&self.exchange),
            &self.settings,
        )
        .await?;
        let (handle, task) = coordinator.spawn();
        instances.insert(
            name.to_string(),
            Instance {
                handle: handle.clone(),
                task,
            },
        );

        info!(instance = %name, "Coordinator started");
        Ok(handle)
    }

    /// The account's coordinator
    pub async fn main(&self) -> Result<CoordinatorHandle, CoordinatorError> {
        self.resolve(MAIN_TOKEN).await
    }

    /// Close every mailbox and wait for queued commands to finish.
    pub async fn shutdown(&self) {
        let drained: Vec<(String, Instance)> = self.instances.write().await.drain().collect();

        for (name, Instance { handle, task }) in drained {
            drop(handle);
            match tokio::time::timeout(DRAIN_TIMEOUT, task).await {
                Ok(Ok(())) => info!(instance = %name, "Coordinator stopped"),
                Ok(Err(e)) => warn!(instance = %name, error = %e, "Coordinator task failed"),
                Err(_) => warn!(instance = %name, "Coordinator still busy at shutdown"),
            }
        }
    }
}
