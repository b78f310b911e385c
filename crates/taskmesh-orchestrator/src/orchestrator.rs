//! Orchestrator: health probing, task routing and preloading.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use futures::future::join_all;
use parking_lot::RwLock;
use reqwest::Client;
use taskmesh_core::{Capability, EndpointConfig, Error, Result, TaskEnvelope};
use tracing::{debug, info, warn};

use crate::preload::preload_target;
use crate::types::*;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Routes tasks to the registered backend capability services.
pub struct Orchestrator {
    endpoints: BTreeMap<Capability, EndpointConfig>,
    /// Result of the latest probe per capability.
    health: RwLock<HashMap<Capability, HealthState>>,
    /// `None` until `connect`, and again after `disconnect`.
    client: RwLock<Option<Client>>,
}

impl Orchestrator {
    /// Register endpoints. Later entries for the same capability replace
    /// earlier ones.
    pub fn new(endpoints: Vec<EndpointConfig>) -> Self {
        let endpoints: BTreeMap<Capability, EndpointConfig> = endpoints
            .into_iter()
            .map(|e| (e.capability, e))
            .collect();
        Self {
            endpoints,
            health: RwLock::new(HashMap::new()),
            client: RwLock::new(None),
        }
    }

    /// Open the HTTP client and probe every endpoint.
    ///
    /// A backend that is down only gets marked; connecting never fails
    /// because of it.
    pub async fn connect(&self) -> Result<()> {
        let client = Client::builder()
            .build()
            .map_err(|e| Error::Http(format!("failed to build HTTP client: {}", e)))?;
        *self.client.write() = Some(client);

        let health = self.probe_all().await;
        let healthy = health
            .values()
            .filter(|h| **h == HealthState::Healthy)
            .count();
        info!(
            "Orchestrator connected: {}/{} services healthy",
            healthy,
            self.endpoints.len()
        );
        Ok(())
    }

    /// Release the pooled HTTP client. Later calls fail as unavailable.
    pub fn disconnect(&self) {
        if self.client.write().take().is_some() {
            info!("Orchestrator disconnected");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.client.read().is_some()
    }

    fn client(&self) -> Result<Client> {
        self.client
            .read()
            .clone()
            .ok_or_else(|| Error::BackendUnavailable("orchestrator is not connected".into()))
    }

    // ----- Health -----

    /// Probe all endpoints concurrently and record the outcome.
    pub async fn probe_all(&self) -> HashMap<Capability, HealthState> {
        let client = match self.client() {
            Ok(c) => c,
            Err(e) => {
                warn!("Skipping health probes: {}", e);
                return self.health.read().clone();
            }
        };

        let probes = self.endpoints.values().map(|endpoint| {
            let client = client.clone();
            async move { (endpoint.capability, probe(&client, endpoint).await) }
        });
        let results = join_all(probes).await;

        let mut health = self.health.write();
        for (capability, state) in results {
            health.insert(capability, state);
        }
        health.clone()
    }

    /// Last recorded health per endpoint.
    pub fn service_status(&self) -> Vec<ServiceStatus> {
        let health = self.health.read();
        self.endpoints
            .values()
            .map(|e| ServiceStatus {
                capability: e.capability,
                name: e.name.clone(),
                url: e.url.clone(),
                health: health
                    .get(&e.capability)
                    .copied()
                    .unwrap_or(HealthState::Unknown),
            })
            .collect()
    }

    pub fn health(&self, capability: Capability) -> HealthState {
        self.health
            .read()
            .get(&capability)
            .copied()
            .unwrap_or(HealthState::Unknown)
    }

    // ----- Execution -----

    /// Execute a task. Never returns an error: failures are recorded in
    /// the result.
    pub async fn execute(&self, task: &TaskEnvelope) -> ExecutionResult {
        let started = Instant::now();

        let (status, outputs, error, called) = match task.category.capability() {
            Some(capability) => {
                let sub = self.call(capability, task).await;
                let status = if sub.is_ok() {
                    ExecutionStatus::Completed
                } else {
                    ExecutionStatus::Failed
                };
                let error = sub.error.clone();
                let mut outputs = BTreeMap::new();
                outputs.insert(capability.as_str().to_string(), sub);
                (status, outputs, error, vec![capability])
            }
            None => {
                let (outputs, called) = self.execute_composite(task).await;
                (ExecutionStatus::Completed, outputs, None, called)
            }
        };

        let result = ExecutionResult {
            task_id: task.id.clone(),
            status,
            outputs,
            error,
            elapsed_ms: started.elapsed().as_millis() as u64,
            called,
        };

        if result.is_partial_failure() {
            warn!(
                "Task {} partially failed: {:?}",
                task.id,
                result
                    .outputs
                    .iter()
                    .filter(|(_, r)| !r.is_ok())
                    .map(|(k, _)| k.as_str())
                    .collect::<Vec<_>>()
            );
        }
        debug!(
            "Task {} {:?} in {}ms",
            task.id, result.status, result.elapsed_ms
        );
        result
    }

    async fn execute_composite(
        &self,
        task: &TaskEnvelope,
    ) -> (BTreeMap<String, SubResult>, Vec<Capability>) {
        // One call per named service; repeats keep their first position.
        let mut targets: Vec<(&str, Option<Capability>)> = Vec::with_capacity(task.services.len());
        for service in &task.services {
            if targets.iter().any(|(name, _)| *name == service.as_str()) {
                debug!("Task {} lists {} more than once", task.id, service);
                continue;
            }
            targets.push((service.as_str(), Capability::parse(service)));
        }
        let called: Vec<Capability> = targets.iter().filter_map(|(_, c)| *c).collect();

        let results: Vec<(&str, SubResult)> = if task.parallel {
            join_all(
                targets
                    .iter()
                    .map(|(name, cap)| async move { (*name, self.call_named(*name, *cap, task).await) }),
            )
            .await
        } else {
            let mut results = Vec::with_capacity(targets.len());
            for (name, cap) in &targets {
                results.push((*name, self.call_named(name, *cap, task).await));
            }
            results
        };

        let outputs = results
            .into_iter()
            .map(|(name, sub)| (name.to_string(), sub))
            .collect();
        (outputs, called)
    }

    async fn call_named(
        &self,
        name: &str,
        capability: Option<Capability>,
        task: &TaskEnvelope,
    ) -> SubResult {
        match capability {
            Some(capability) => self.call(capability, task).await,
            None => {
                warn!("Task {} names unknown service {}", task.id, name);
                SubResult::failed(format!("unknown service: {}", name), 0)
            }
        }
    }

    /// One RPC to a capability's task route, captured as a sub-result.
    async fn call(&self, capability: Capability, task: &TaskEnvelope) -> SubResult {
        let started = Instant::now();
        if self.health(capability) == HealthState::Unavailable {
            debug!("Calling {} despite last probe: unavailable", capability);
        }
        let outcome = self.post_task(capability, task).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(value) => SubResult::ok(value, elapsed_ms),
            Err(e) => {
                warn!("Task {} on {} failed: {}", task.id, capability, e);
                SubResult::failed(e.to_string(), elapsed_ms)
            }
        }
    }

    async fn post_task(
        &self,
        capability: Capability,
        task: &TaskEnvelope,
    ) -> Result<serde_json::Value> {
        let client = self.client()?;
        let endpoint = self.endpoint(capability)?;
        let url = format!("{}{}", endpoint.url, capability.route());

        let response = client
            .post(&url)
            .timeout(Duration::from_secs(endpoint.timeout_secs))
            .json(task)
            .send()
            .await
            .map_err(|e| transport_error(endpoint, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(endpoint, e))?;
        if !status.is_success() {
            return Err(Error::Http(format!(
                "{} returned {}: {}",
                endpoint.name, status, body
            )));
        }
        if body.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(value) => Ok(value),
            Err(_) => Ok(serde_json::Value::String(body)),
        }
    }

    fn endpoint(&self, capability: Capability) -> Result<&EndpointConfig> {
        self.endpoints.get(&capability).ok_or_else(|| {
            Error::BackendUnavailable(format!("no endpoint registered for {}", capability))
        })
    }

    // ----- Preload -----

    /// Warm up backends for the given resource ids. Best effort: failures
    /// are logged and dropped, unmapped ids are skipped.
    pub async fn preload(&self, resource_ids: &[String]) {
        let targets: Vec<(Capability, &'static [&'static str])> = resource_ids
            .iter()
            .filter_map(|id| {
                let target = preload_target(id);
                if target.is_none() {
                    debug!("No preload mapping for {}", id);
                }
                target
            })
            .collect();
        if targets.is_empty() {
            return;
        }

        let calls = targets.into_iter().map(|(capability, models)| async move {
            (capability, self.preload_one(capability, models).await)
        });
        for (capability, outcome) in join_all(calls).await {
            match outcome {
                Ok(()) => debug!("Preloaded {} models", capability),
                Err(e) => warn!("Preload on {} failed: {}", capability, e),
            }
        }
    }

    async fn preload_one(&self, capability: Capability, models: &[&str]) -> Result<()> {
        let client = self.client()?;
        let endpoint = self.endpoint(capability)?;
        let url = format!("{}/preload", endpoint.url);

        let response = client
            .post(&url)
            .timeout(Duration::from_secs(endpoint.timeout_secs))
            .json(&serde_json::json!({ "models": models }))
            .send()
            .await
            .map_err(|e| Error::BackendUnavailable(format!("{}: {}", endpoint.name, e)))?;
        if !response.status().is_success() {
            return Err(Error::Http(format!(
                "{} preload returned {}",
                endpoint.name,
                response.status()
            )));
        }
        Ok(())
    }
}

fn transport_error(endpoint: &EndpointConfig, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::BackendUnavailable(format!(
            "{}: timed out after {}s",
            endpoint.name, endpoint.timeout_secs
        ))
    } else {
        Error::BackendUnavailable(format!("{}: {}", endpoint.name, e))
    }
}

async fn probe(client: &Client, endpoint: &EndpointConfig) -> HealthState {
    let url = format!("{}{}", endpoint.url, endpoint.health_check);
    match client.get(&url).timeout(PROBE_TIMEOUT).send().await {
        Ok(resp) if resp.status().is_success() => HealthState::Healthy,
        Ok(resp) => {
            warn!("{} health check returned {}", endpoint.name, resp.status());
            HealthState::Unhealthy
        }
        Err(e) => {
            warn!("{} unavailable: {}", endpoint.name, e);
            HealthState::Unavailable
        }
    }
}
