use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::config::CoordinatorConfig;
use crate::engine::CoordinatorApi;
use crate::registry::MinerRegistry;
use crate::template::TemplateManager;
use crate::types::{Role, StatsSnapshot, SubmitRequest, SubmitStatus, Template};
use crate::validator::SubmissionValidator;

/// Worker identity attached to a template poll; anonymous polls (the
/// monitoring side) skip registry accounting.
#[derive(Debug, Clone)]
pub struct Caller {
    pub miner_id: String,
    pub role: Role,
    pub attempts: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub current_generation: u64,
    pub timestamp: String,
}

/// The coordinator proper: template ownership, submission arbitration, and
/// stats aggregation behind one object. The HTTP server and in-process
/// tests drive exactly the same methods.
pub struct Coordinator {
    templates: Arc<TemplateManager>,
    validator: SubmissionValidator,
    registry: Arc<MinerRegistry>,
    start_time: Instant,
}

impl Coordinator {
    pub fn new(config: &CoordinatorConfig) -> Self {
        let templates = Arc::new(TemplateManager::new(config.difficulty_bits));
        let registry = Arc::new(MinerRegistry::new(config.recent_log_limit));
        let validator = SubmissionValidator::new(Arc::clone(&templates), Arc::clone(&registry));
        Self {
            templates,
            validator,
            registry,
            start_time: Instant::now(),
        }
    }

    pub fn template(&self, caller: Option<&Caller>) -> Arc<Template> {
        if let Some(caller) = caller {
            self.registry.touch(&caller.miner_id, caller.role, caller.attempts);
        }
        self.templates.current()
    }

    pub fn submit(&self, request: &SubmitRequest) -> SubmitStatus {
        self.validator
            .submit(request.generation, &request.miner_id, request.nonce)
    }

    pub fn stats(&self) -> StatsSnapshot {
        let current = self.templates.current();
        self.registry
            .snapshot(current.generation, current.difficulty_bits)
    }

    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            current_generation: self.templates.current().generation,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// In-process implementation of the worker contract, for tests and for
/// running engines inside the coordinator process.
#[derive(Clone)]
pub struct LocalApi {
    coordinator: Arc<Coordinator>,
    caller: Caller,
}

impl LocalApi {
    pub fn new(coordinator: Arc<Coordinator>, miner_id: &str, role: Role) -> Self {
        Self {
            coordinator,
            caller: Caller {
                miner_id: miner_id.to_string(),
                role,
                attempts: 0,
            },
        }
    }
}

impl CoordinatorApi for LocalApi {
    async fn fetch_template(&self, attempts: u64) -> Result<Template> {
        let caller = Caller {
            attempts,
            ..self.caller.clone()
        };
        Ok((*self.coordinator.template(Some(&caller))).clone())
    }

    async fn submit(&self, generation: u64, nonce: u64) -> Result<SubmitStatus> {
        Ok(self.coordinator.submit(&SubmitRequest {
            generation,
            miner_id: self.caller.miner_id.clone(),
            nonce,
        }))
    }
}
