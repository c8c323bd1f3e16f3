//! aws CLI wrapper
//!
//! Every AWS call goes through the `aws` CLI with JSON input and output.

use crate::error::{AwsError, Result};
use serde::de::DeserializeOwned;
use std::process::Stdio;
use tokio::process::Command;

/// aws CLI wrapper
#[derive(Debug, Clone, Default)]
pub struct AwsCli {
    region: Option<String>,
    profile: Option<String>,
}

impl AwsCli {
    pub fn new(region: Option<String>, profile: Option<String>) -> Self {
        Self { region, profile }
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    fn global_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(region) = &self.region {
            args.push("--region".to_string());
            args.push(region.clone());
        }
        if let Some(profile) = &self.profile {
            args.push("--profile".to_string());
            args.push(profile.clone());
        }
        args
    }

    /// Run an aws command and return stdout
    pub async fn run(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new("aws");
        cmd.args(self.global_args());
        cmd.args(args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: aws {}", args.join(" "));

        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AwsError::AwsCliNotFound
            } else {
                AwsError::IoError(e)
            }
        })?;

        if !output.status.success() {
            let command = args.iter().take(2).copied().collect::<Vec<_>>().join(" ");
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(AwsError::CommandFailed { command, stderr });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run an aws command with `--output json` and parse the response
    pub async fn run_json<T: DeserializeOwned>(&self, args: &[&str]) -> Result<T> {
        let mut args = args.to_vec();
        args.extend(["--output", "json"]);
        let output = self.run(&args).await?;
        Ok(serde_json::from_str(&output)?)
    }

    /// Run `aws <service> <operation> --cli-input-json <input>`
    pub async fn call<T: DeserializeOwned>(
        &self,
        service: &str,
        operation: &str,
        input: &serde_json::Value,
    ) -> Result<T> {
        let input = input.to_string();
        self.run_json(&[service, operation, "--cli-input-json", &input])
            .await
    }

    /// Region from the CLI configuration when not given explicitly
    pub async fn resolve_region(&self) -> Result<String> {
        if let Some(region) = &self.region {
            return Ok(region.clone());
        }
        let region = self.run(&["configure", "get", "region"]).await?;
        let region = region.trim();
        if region.is_empty() {
            return Err(AwsError::UnexpectedResponse(
                "no region configured (set aws.region)".to_string(),
            ));
        }
        Ok(region.to_string())
    }
}
