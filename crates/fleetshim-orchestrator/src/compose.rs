//! docker compose orchestrator.
//!
//! Scaling runs `docker compose -p <project> up -d --no-recreate --scale
//! <service>=<n>`, followed by the optional post-scale hook. Listing runs
//! `docker ps` filtered on the compose project/service labels and then
//! `docker stats --no-stream` for CPU figures.

use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use fleetshim_core::config::OrchestratorConfig;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::orchestrator::{Orchestrator, ReplicaNode, ScaleAck};

pub struct ComposeOrchestrator {
    config: OrchestratorConfig,
}

impl ComposeOrchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self { config }
    }

    fn scale_args(&self, replicas: u32) -> Vec<String> {
        vec![
            "compose".to_string(),
            "-p".to_string(),
            self.config.project.clone(),
            "up".to_string(),
            "-d".to_string(),
            "--no-recreate".to_string(),
            "--scale".to_string(),
            format!("{}={replicas}", self.config.service),
        ]
    }

    fn ps_args(&self) -> Vec<String> {
        vec![
            "ps".to_string(),
            "--filter".to_string(),
            format!("label=com.docker.compose.project={}", self.config.project),
            "--filter".to_string(),
            format!("label=com.docker.compose.service={}", self.config.service),
            "--filter".to_string(),
            "status=running".to_string(),
            "--format".to_string(),
            "{{.Names}}".to_string(),
        ]
    }

    fn stats_args(names: &[String]) -> Vec<String> {
        let mut args = vec![
            "stats".to_string(),
            "--no-stream".to_string(),
            "--format".to_string(),
            "{{.Name}}:{{.CPUPerc}}".to_string(),
        ];
        args.extend(names.iter().cloned());
        args
    }

    fn command(&self, program: &str) -> Command {
        let mut cmd = Command::new(program);
        if let Some(dir) = &self.config.workdir {
            cmd.current_dir(dir);
        }
        if let Some(version) = &self.config.docker_api_version {
            cmd.env("DOCKER_API_VERSION", version);
        }
        cmd.kill_on_drop(true);
        cmd
    }

    /// Run the configured container CLI and return its stdout.
    async fn run(&self, args: &[String]) -> OrchestratorResult<String> {
        let mut cmd = self.command(&self.config.program);
        cmd.args(args);
        let rendered = format!("{} {}", self.config.program, args.join(" "));
        self.execute(cmd, rendered).await
    }

    async fn run_hook(&self, hook: &str) -> OrchestratorResult<String> {
        let mut cmd = self.command("sh");
        cmd.arg("-c").arg(hook);
        self.execute(cmd, hook.to_string()).await
    }

    async fn execute(&self, mut cmd: Command, rendered: String) -> OrchestratorResult<String> {
        debug!(command = %rendered, "running orchestrator command");
        let timeout = self.config.command_timeout();
        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(result) => result.map_err(|source| OrchestratorError::Spawn {
                program: rendered.clone(),
                source,
            })?,
            Err(_) => {
                return Err(OrchestratorError::Timeout {
                    command: rendered,
                    timeout,
                });
            }
        };
        check_status(rendered, output)
    }
}

fn check_status(command: String, output: Output) -> OrchestratorResult<String> {
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        Err(OrchestratorError::CommandFailed {
            command,
            status: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[async_trait]
impl Orchestrator for ComposeOrchestrator {
    async fn set_replica_count(&self, replicas: u32) -> OrchestratorResult<ScaleAck> {
        let mut output = self.run(&self.scale_args(replicas)).await?;

        if let Some(hook) = &self.config.post_scale_hook {
            let hook_output = self.run_hook(hook).await?;
            output.push_str(&hook_output);
        }

        info!(replicas, service = %self.config.service, "orchestrator acknowledged scale");
        Ok(ScaleAck { replicas, output })
    }

    async fn list_live_replicas(&self) -> OrchestratorResult<Vec<ReplicaNode>> {
        let names = parse_names(&self.run(&self.ps_args()).await?);
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let cpu = match self.run(&Self::stats_args(&names)).await {
            Ok(stdout) => parse_stats(&stdout),
            Err(e) => {
                warn!(error = %e, "replica stats unavailable, reporting names only");
                Vec::new()
            }
        };

        Ok(names
            .into_iter()
            .map(|name| {
                let cpu_percent = cpu
                    .iter()
                    .find(|(n, _)| *n == name)
                    .and_then(|(_, pct)| *pct);
                ReplicaNode {
                    name: strip_project_prefix(&name, &self.config.project),
                    cpu_percent,
                }
            })
            .collect())
    }
}

/// One container name per non-blank line.
fn parse_names(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

/// Parse `name:12.34%` lines. Unparseable percentages become `None`.
fn parse_stats(stdout: &str) -> Vec<(String, Option<f64>)> {
    stdout
        .lines()
        .filter_map(|line| {
            let (name, cpu) = line.trim().rsplit_once(':')?;
            if name.is_empty() {
                return None;
            }
            let pct = cpu.trim().trim_end_matches('%').parse::<f64>().ok();
            Some((name.to_string(), pct))
        })
        .collect()
}

fn strip_project_prefix(name: &str, project: &str) -> String {
    name.strip_prefix(project)
        .and_then(|rest| rest.strip_prefix('-').or_else(|| rest.strip_prefix('_')))
        .unwrap_or(name)
        .to_string()
}
