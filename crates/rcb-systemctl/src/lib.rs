//! systemd adapter (`sudo systemctl ...`) plus the host probe used by `/status`.

use std::{
    process::{ExitStatus, Stdio},
    time::Duration,
};

use async_trait::async_trait;
use tokio::process::Command;

use rcb_core::ports::{ServiceController, ServiceFailure};

mod probe;

pub use probe::HostProbe;

/// Upper bound for one `systemctl` invocation; the child is killed after it.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Runs `systemctl` through a configurable command prefix.
#[derive(Clone, Debug)]
pub struct Systemctl {
    prefix: Vec<String>,
    timeout: Duration,
}

impl Default for Systemctl {
    fn default() -> Self {
        Self::with_command(["sudo", "systemctl"])
    }
}

impl Systemctl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace `sudo systemctl` with another program and leading args.
    pub fn with_command<I, S>(prefix: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefix: prefix.into_iter().map(Into::into).collect(),
            timeout: COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run with `args` appended; returns the exit status and combined output.
    async fn run(&self, args: &[&str]) -> std::io::Result<(ExitStatus, String)> {
        let Some((program, lead)) = self.prefix.split_first() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "no command provided",
            ));
        };

        let child = Command::new(program)
            .args(lead)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();
        let out = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("systemctl did not finish within {:?}", self.timeout),
                )
            })??;

        let mut combined = String::from_utf8_lossy(&out.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&out.stderr));
        let combined = combined.trim_end_matches('\n').to_string();
        Ok((out.status, combined))
    }

    async fn toggle(&self, verb: &str, service: &str) -> Result<String, ServiceFailure> {
        match self.run(&[verb, service]).await {
            Ok((status, output)) if status.success() => Ok(output),
            Ok((status, output)) => {
                tracing::warn!(service, verb, "systemctl exited with {status}");
                Err(ServiceFailure {
                    reason: status.to_string(),
                    output,
                })
            }
            Err(e) => Err(ServiceFailure {
                reason: e.to_string(),
                output: String::new(),
            }),
        }
    }
}

#[async_trait]
impl ServiceController for Systemctl {
    async fn status(&self, services: &[String]) -> Vec<(String, String)> {
        if services.is_empty() {
            return Vec::new();
        }

        let mut args = vec!["is-active"];
        args.extend(services.iter().map(String::as_str));

        // is-active exits non-zero when any unit is inactive; the output is still valid.
        let output = match self.run(&args).await {
            Ok((_, output)) => output,
            Err(e) => {
                tracing::warn!("failed to run systemctl is-active: {e}");
                String::new()
            }
        };

        let mut lines = output.lines();
        services
            .iter()
            .map(|s| {
                let status = lines.next().unwrap_or("unknown").trim().to_string();
                (s.clone(), status)
            })
            .collect()
    }

    async fn start(&self, service: &str) -> Result<String, ServiceFailure> {
        self.toggle("start", service).await
    }

    async fn stop(&self, service: &str) -> Result<String, ServiceFailure> {
        self.toggle("stop", service).await
    }
}
