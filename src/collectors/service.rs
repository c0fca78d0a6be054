//! Service health collector.
//!
//! Checks systemd units via `systemctl is-active` and Docker containers
//! via `docker inspect`. A `docker-` prefix on the configured name
//! selects the Docker path; the prefix is stripped to get the container
//! name. Every check runs under a timeout so a wedged daemon cannot
//! stall the collection cycle.

use super::Collector;
use crate::error::Result;
use crate::metrics::{ServiceKind, ServiceStatus};
use crate::subprocess::{run_with_timeout, CommandResult};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

/// Timeout for each service check command.
const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Configured-name prefix that selects Docker container checks.
const DOCKER_PREFIX: &str = "docker-";

/// Parsed `docker inspect` state.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DockerState {
    status: String,
    running: bool,
    health: Option<String>,
    restart_count: u64,
}

/// Collector for configured service health.
#[derive(Debug)]
pub struct ServiceCollector {
    services: Vec<String>,
    docker_available: bool,
}

impl ServiceCollector {
    /// Creates a service collector for the configured service names.
    ///
    /// Docker support is probed once here; if the binary is missing,
    /// `docker-` prefixed names fall through to systemd checks like any
    /// other unit name.
    #[must_use]
    pub fn new(services: Vec<String>) -> Self {
        let docker_available =
            run_with_timeout("docker", &["--version"], CHECK_TIMEOUT).success();
        if docker_available {
            info!("Docker support enabled for service monitoring");
        } else {
            debug!("Docker not available, using systemd only");
        }

        Self { services, docker_available }
    }

    fn check_systemd(name: &str) -> ServiceStatus {
        let result = run_with_timeout("systemctl", &["is-active", name], CHECK_TIMEOUT);

        match result {
            CommandResult::Completed(_) => {
                let active = result.success();
                let status = result
                    .stdout_trimmed()
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| "unknown".to_string());
                systemd_status(active, status, None)
            }
            CommandResult::TimedOut => systemd_status(
                false,
                "timeout".to_string(),
                Some("systemctl timed out".to_string()),
            ),
            CommandResult::SpawnFailed(e) => {
                systemd_status(false, "error".to_string(), Some(e))
            }
        }
    }

    fn check_docker(container: &str) -> ServiceStatus {
        let format =
            "--format={{.State.Status}}|{{.State.Running}}|{{.State.Health.Status}}|{{.RestartCount}}";
        let result = run_with_timeout("docker", &["inspect", container, format], CHECK_TIMEOUT);

        match result {
            CommandResult::Completed(ref output) if output.status.success() => {
                match result.stdout_trimmed().as_deref().map(parse_docker_state) {
                    Some(state) => docker_status(container, &state),
                    None => docker_error(container, "empty inspect output".to_string()),
                }
            }
            CommandResult::Completed(_) => ServiceStatus {
                active: false,
                status: "not_found".to_string(),
                kind: ServiceKind::Docker,
                container_name: Some(container.to_string()),
                restart_count: None,
                health_status: None,
                error: Some(format!("Container {container} not found")),
            },
            CommandResult::TimedOut => ServiceStatus {
                active: false,
                status: "timeout".to_string(),
                kind: ServiceKind::Docker,
                container_name: Some(container.to_string()),
                restart_count: None,
                health_status: None,
                error: Some("Docker command timed out".to_string()),
            },
            CommandResult::SpawnFailed(e) => docker_error(container, e),
        }
    }
}

fn systemd_status(active: bool, status: String, error: Option<String>) -> ServiceStatus {
    ServiceStatus {
        active,
        status,
        kind: ServiceKind::Systemd,
        container_name: None,
        restart_count: None,
        health_status: None,
        error,
    }
}

fn docker_error(container: &str, error: String) -> ServiceStatus {
    ServiceStatus {
        active: false,
        status: "error".to_string(),
        kind: ServiceKind::Docker,
        container_name: Some(container.to_string()),
        restart_count: None,
        health_status: None,
        error: Some(error),
    }
}

/// Parses the `status|running|health|restarts` inspect output.
///
/// Containers without a health check render the health field empty or
/// as `<nil>` depending on the Docker version; both mean "no check".
fn parse_docker_state(stdout: &str) -> DockerState {
    let parts: Vec<&str> = stdout.split('|').collect();

    let status = parts.first().map_or("unknown", |s| s.trim()).to_string();
    let running = parts.get(1).is_some_and(|s| s.trim() == "true");
    let health = parts
        .get(2)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty() && *s != "<nil>")
        .map(str::to_string);
    let restart_count = parts
        .get(3)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0);

    DockerState { status, running, health, restart_count }
}

/// Activity rules: a running container with a failing health check is
/// down; one without a health check is up.
fn docker_status(container: &str, state: &DockerState) -> ServiceStatus {
    let (active, status) = if state.running {
        match &state.health {
            Some(health) => (
                health == "healthy",
                format!("{} ({health})", state.status),
            ),
            None => (true, state.status.clone()),
        }
    } else {
        (false, state.status.clone())
    };

    ServiceStatus {
        active,
        status,
        kind: ServiceKind::Docker,
        container_name: Some(container.to_string()),
        restart_count: Some(state.restart_count),
        health_status: state.health.clone(),
        error: None,
    }
}

impl Collector for ServiceCollector {
    type Sample = BTreeMap<String, ServiceStatus>;

    fn id(&self) -> &'static str {
        "services"
    }

    fn collect(&mut self) -> Result<Self::Sample> {
        let mut statuses = BTreeMap::new();

        for service in &self.services {
            let status = match service.strip_prefix(DOCKER_PREFIX) {
                Some(container) if self.docker_available => Self::check_docker(container),
                _ => Self::check_systemd(service),
            };
            debug!(service = %service, active = status.active, status = %status.status, "service checked");
            statuses.insert(service.clone(), status);
        }

        Ok(statuses)
    }
}
