//! The service object tying triggers and stream loops together.

use std::sync::Arc;

use async_trait::async_trait;
use crossline_core::{Acknowledgment, CallContext, PingPongService, RpcStatus, ServerStream};

use crate::registry::StreamRegistry;
use crate::stats::{CoordinatorStats, StatsSnapshot};
use crate::stream_loop::{StreamEnd, StreamLoop};
use crate::trigger::{TriggerOutcome, fire};
use crate::{CoordinatorConfig, CoordinatorError};

/// Shared entry point for both RPC methods.
///
/// Cloning is cheap and every clone sees the same registry, so one
/// coordinator can be handed to any number of concurrent calls.
#[derive(Clone, Debug)]
pub struct Coordinator {
    registry: Arc<StreamRegistry>,
    config: Arc<CoordinatorConfig>,
    stats: Arc<CoordinatorStats>,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new(CoordinatorConfig::default())
    }
}

impl Coordinator {
    /// Create a coordinator with an empty registry.
    pub fn new(config: CoordinatorConfig) -> Self {
        Self::with_registry(Arc::new(StreamRegistry::new()), config)
    }

    /// Create a coordinator around an existing registry.
    pub fn with_registry(registry: Arc<StreamRegistry>, config: CoordinatorConfig) -> Self {
        Self {
            registry,
            config: Arc::new(config),
            stats: Arc::new(CoordinatorStats::default()),
        }
    }

    /// The active-stream registry.
    pub fn registry(&self) -> &Arc<StreamRegistry> {
        &self.registry
    }

    /// The configuration in use.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Counters so far.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Push a ping into the active stream. See [`fire`].
    pub async fn trigger(&self, ctx: &CallContext) -> Result<TriggerOutcome, CoordinatorError> {
        self.stats.record_trigger();
        let outcome = fire(&self.registry, &self.config, ctx).await;
        tracing::info!("trigger call completed");
        outcome
    }

    /// Own `stream` until it ends.
    pub async fn serve_stream(&self, stream: ServerStream) -> Result<StreamEnd, CoordinatorError> {
        StreamLoop::start(
            stream,
            Arc::clone(&self.registry),
            &self.config,
            Arc::clone(&self.stats),
        )
        .run()
        .await
    }
}

#[async_trait]
impl PingPongService for Coordinator {
    async fn trigger(&self, ctx: CallContext) -> Result<Acknowledgment, RpcStatus> {
        Coordinator::trigger(self, &ctx)
            .await
            .map(Acknowledgment::from)
            .map_err(RpcStatus::from)
    }

    async fn ping_pong(&self, stream: ServerStream) -> Result<(), RpcStatus> {
        self.serve_stream(stream)
            .await
            .map(|_| ())
            .map_err(RpcStatus::from)
    }
}
