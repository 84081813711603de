//! HTTP implementation of the downstream seam used by the boundary process.

use crate::transport::Transport;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use switchboard_core::{BuiltRequest, CoreConfig, Downstream, DownstreamError};

/// Calls the configured downstream gateway; one base URL fronts every route.
#[derive(Clone)]
pub struct HttpDownstream {
    config: Arc<CoreConfig>,
    transport: Transport,
}

impl HttpDownstream {
    pub fn new(config: Arc<CoreConfig>) -> Result<Self, DownstreamError> {
        let transport = Transport::new(Duration::from_secs(config.downstream.timeout_secs))?;
        Ok(Self { config, transport })
    }

    pub fn with_transport(config: Arc<CoreConfig>, transport: Transport) -> Self {
        Self { config, transport }
    }

    pub fn url_for(&self, request: &BuiltRequest) -> String {
        self.config
            .downstream_url(request.route.path(&self.config.downstream.routes))
    }
}

#[async_trait]
impl Downstream for HttpDownstream {
    async fn call(&self, request: &BuiltRequest, bearer: Option<&str>) -> Result<Value, DownstreamError> {
        let url = self.url_for(request);
        let attempts = self.transport.retry().attempts_for(request.action);
        let started = Instant::now();
        let result = self
            .transport
            .post_json(&url, &request.payload, bearer, attempts)
            .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => tracing::info!(
                target: "switchboard::downstream",
                action = %request.action,
                variant = %request.variant_tag,
                route = %request.route,
                elapsed_ms,
                "downstream call succeeded"
            ),
            Err(e) => tracing::warn!(
                target: "switchboard::downstream",
                action = %request.action,
                variant = %request.variant_tag,
                route = %request.route,
                status = e.status().unwrap_or(0),
                elapsed_ms,
                error = %e,
                "downstream call failed"
            ),
        }
        result
    }
}
