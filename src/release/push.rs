//! Delivery of push batches to gateway instances.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use super::plan::{PushBatch, PushStage};

/// A gateway instance that receives configuration pushes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayTarget {
    pub name: String,
    pub url: Url,
}

/// How a target ended up after a push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum PushOutcome {
    Applied,
    Failed(String),
    Timeout,
    Cancelled,
}

impl PushOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, PushOutcome::Applied)
    }

    pub fn label(&self) -> &'static str {
        match self {
            PushOutcome::Applied => "applied",
            PushOutcome::Failed(_) => "failed",
            PushOutcome::Timeout => "timeout",
            PushOutcome::Cancelled => "cancelled",
        }
    }
}

/// Transport used by the release coordinator to reach gateway targets.
///
/// Implementations report a single attempt; retries and deadlines belong to
/// the caller.
#[async_trait]
pub trait GatewayPush: Send + Sync {
    async fn push(&self, target: &GatewayTarget, batch: &PushBatch) -> PushOutcome;
}

#[derive(Serialize)]
struct PruneBody<'a> {
    keep: &'a [Value],
}

/// Pushes each stage as a separate HTTP request, stopping at the first
/// failing stage.
///
/// ```text
/// PUT  {target}/config/base
/// PUT  {target}/config/{kind}          JSON array of entities
/// POST {target}/config/{kind}/prune    {"keep": [keys]}
/// ```
#[derive(Debug, Clone)]
pub struct HttpGatewayPush {
    client: Client,
}

impl HttpGatewayPush {
    pub fn new(connect_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(concat!("gateway-admin/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    async fn send_stage(
        &self,
        target: &GatewayTarget,
        batch: &PushBatch,
        stage: &PushStage,
    ) -> Result<(), PushOutcome> {
        let base = target.url.as_str().trim_end_matches('/');
        let request = match stage {
            PushStage::Base { base: info } => {
                self.client.put(format!("{base}/config/base")).json(info)
            }
            PushStage::Upsert { kind, entities } => {
                self.client.put(format!("{base}/config/{kind}")).json(entities)
            }
            PushStage::Prune { kind, keep } => self
                .client
                .post(format!("{base}/config/{kind}/prune"))
                .json(&PruneBody { keep }),
        };

        let response = request
            .header("x-release-id", batch.release_id.to_string())
            .header("x-config-version", batch.version.to_string())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PushOutcome::Timeout
                } else {
                    PushOutcome::Failed(format!("{}: {e}", stage.describe()))
                }
            })?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => Err(PushOutcome::Timeout),
            status => {
                let detail = response.text().await.unwrap_or_default();
                Err(PushOutcome::Failed(format!(
                    "{}: HTTP {status} {}",
                    stage.describe(),
                    detail.chars().take(256).collect::<String>()
                )))
            }
        }
    }
}

#[async_trait]
impl GatewayPush for HttpGatewayPush {
    async fn push(&self, target: &GatewayTarget, batch: &PushBatch) -> PushOutcome {
        for stage in &batch.stages {
            if let Err(outcome) = self.send_stage(target, batch, stage).await {
                tracing::debug!(
                    gateway = %target.name,
                    stage = %stage.describe(),
                    outcome = outcome.label(),
                    "Push stage rejected"
                );
                return outcome;
            }
        }
        PushOutcome::Applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outcome_wire_format() {
        assert_eq!(
            serde_json::to_value(PushOutcome::Failed("boom".into())).unwrap(),
            json!({"outcome": "failed", "reason": "boom"})
        );
        assert_eq!(
            serde_json::to_value(PushOutcome::Applied).unwrap(),
            json!({"outcome": "applied"})
        );
        assert!(PushOutcome::Applied.is_applied());
        assert!(!PushOutcome::Timeout.is_applied());
    }
}
