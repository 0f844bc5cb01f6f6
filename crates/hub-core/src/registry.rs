//! Agent registry with a periodic health sweep.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::agent::Agent;
use crate::error::Result;
use crate::model::{AgentCard, AgentHealth};

/// Per-agent deadline for one health probe.
pub const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// A registered agent with its captured card and latest health.
#[derive(Clone)]
pub struct RegisteredAgent {
    pub agent: Arc<dyn Agent>,
    pub card: AgentCard,
    pub health: AgentHealth,
    pub registered_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    agents: HashMap<String, RegisteredAgent>,
    order: Vec<String>,
}

/// Thread-safe agent set: concurrent reads, exclusive writes.
pub struct AgentRegistry {
    inner: Arc<RwLock<Inner>>,
    sweep: CancellationToken,
}

impl AgentRegistry {
    pub fn new() -> AgentRegistry {
        AgentRegistry {
            inner: Arc::new(RwLock::new(Inner::default())),
            sweep: CancellationToken::new(),
        }
    }

    /// Register an agent, capturing its card once and probing health
    /// synchronously. A prior instance under the same id is shut down
    /// first.
    pub async fn register(&self, agent: Arc<dyn Agent>) -> Result<()> {
        let id = agent.id().to_string();
        let card = agent.card();
        agent.initialize().await?;
        let health = probe(agent.as_ref()).await;

        let previous = {
            let inner = self.inner.read().await;
            inner.agents.get(&id).map(|entry| entry.agent.clone())
        };
        if let Some(previous) = previous {
            if let Err(err) = previous.shutdown().await {
                warn!(agent_id = %id, error = %err, "previous agent instance failed to shut down");
            }
        }

        let mut inner = self.inner.write().await;
        if !inner.agents.contains_key(&id) {
            inner.order.push(id.clone());
        }
        debug!(agent_id = %id, status = %health.status, "registering agent");
        inner.agents.insert(
            id,
            RegisteredAgent {
                agent,
                card,
                health,
                registered_at: Utc::now(),
            },
        );
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Option<RegisteredAgent> {
        self.inner.read().await.agents.get(id).cloned()
    }

    /// Snapshot copy in registration order.
    pub async fn list(&self) -> Vec<RegisteredAgent> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.agents.get(id))
            .cloned()
            .collect()
    }

    /// Spawn the periodic sweep. Probes run sequentially, each under its
    /// own 5-second deadline; the registry lock is only held to snapshot
    /// the agent list and to write results back.
    pub fn start_health_checks(self: &Arc<Self>, interval: Duration) {
        let registry = self.clone();
        let cancel = self.sweep.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => registry.sweep_once().await,
                    _ = cancel.cancelled() => return,
                }
            }
        });
    }

    /// Stop the health sweep.
    pub fn stop(&self) {
        self.sweep.cancel();
    }

    async fn sweep_once(&self) {
        let agents: Vec<(String, Arc<dyn Agent>)> = {
            let inner = self.inner.read().await;
            inner
                .agents
                .iter()
                .map(|(id, entry)| (id.clone(), entry.agent.clone()))
                .collect()
        };
        for (id, agent) in agents {
            let health = probe(agent.as_ref()).await;
            debug!(agent_id = %id, status = %health.status, "health sweep");
            let mut inner = self.inner.write().await;
            if let Some(entry) = inner.agents.get_mut(&id) {
                entry.health = health;
            }
        }
    }

    /// Re-probe one agent now and record the result.
    pub async fn refresh_health(&self, id: &str) -> Option<AgentHealth> {
        let agent = {
            let inner = self.inner.read().await;
            inner.agents.get(id).map(|entry| entry.agent.clone())
        }?;
        let health = probe(agent.as_ref()).await;
        let mut inner = self.inner.write().await;
        if let Some(entry) = inner.agents.get_mut(id) {
            entry.health = health.clone();
        }
        Some(health)
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

async fn probe(agent: &dyn Agent) -> AgentHealth {
    match tokio::time::timeout(HEALTH_PROBE_TIMEOUT, agent.check_health()).await {
        Ok(Ok(health)) => health,
        Ok(Err(err)) => AgentHealth::unhealthy(err.to_string()),
        Err(_) => AgentHealth::unhealthy("health check timed out"),
    }
}
