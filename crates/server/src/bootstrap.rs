use std::sync::Arc;

use tracing::info;

use hrdesk_agent::{AgentRuntime, HttpLlmClient};
use hrdesk_core::audit::TracingAuditSink;
use hrdesk_core::config::AppConfig;
use hrdesk_hrms::HttpLeaveService;
use hrdesk_rag::{ChunkerConfig, HttpEmbeddingClient, PolicyIndex};

pub struct Application {
    pub config: AppConfig,
    pub runtime: Arc<AgentRuntime>,
}

/// Wire the runtime from an already-loaded config. The policy index starts
/// empty; documents arrive through the ingestion endpoint.
pub fn bootstrap_with_config(config: AppConfig) -> Application {
    let llm = Arc::new(HttpLlmClient::new(
        &config.llm.base_url,
        config.llm.api_key.clone(),
        &config.llm.model,
        config.llm.timeout_secs,
    ));
    let embedder = Arc::new(HttpEmbeddingClient::new(
        &config.embedding.base_url,
        config.embedding.api_key.clone(),
        &config.embedding.model,
        config.embedding.timeout_secs,
    ));
    let index = Arc::new(PolicyIndex::new(
        embedder,
        ChunkerConfig {
            max_chars: config.retrieval.chunk_max_chars,
            overlap_fraction: config.retrieval.chunk_overlap_fraction,
        },
    ));
    let leave_service = Arc::new(HttpLeaveService::new(
        &config.leave_service.base_url,
        config.leave_service.timeout_secs,
    ));

    let runtime = Arc::new(AgentRuntime::new(
        &config,
        llm,
        index,
        leave_service,
        Arc::new(TracingAuditSink),
    ));

    info!(
        event_name = "system.bootstrap.runtime_wired",
        correlation_id = "bootstrap",
        llm_base_url = %config.llm.base_url,
        leave_service_base_url = %config.leave_service.base_url,
        "agent runtime wired"
    );

    Application { config, runtime }
}
