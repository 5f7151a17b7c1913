use alloy::primitives::{Address, B256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{BlockNumberOrTag, Filter};
use async_trait::async_trait;

use super::types::RawLog;
use crate::error::NodeError;

/// The node capabilities the fetcher depends on. Every call is fallible and
/// may be slow; retry and timeout policy live in the fetcher, not here.
#[async_trait]
pub trait NodeClient: Send + Sync {
    async fn fetch_logs(
        &self,
        contract: Address,
        event_signature: B256,
        start_block: u64,
        end_block: u64,
    ) -> Result<Vec<RawLog>, NodeError>;

    async fn fetch_block_timestamp(&self, block_number: u64) -> Result<u64, NodeError>;

    async fn current_block_height(&self) -> Result<u64, NodeError>;
}

/// JSON-RPC node reached through an alloy provider.
pub struct HttpNode<P> {
    provider: P,
}

impl<P: Provider> HttpNode<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

/// Connect to an HTTP JSON-RPC endpoint.
pub fn connect_http(rpc_url: &str) -> eyre::Result<HttpNode<impl Provider>> {
    let url = rpc_url
        .parse()
        .map_err(|e| eyre::eyre!("Invalid RPC URL '{}': {}", rpc_url, e))?;
    Ok(HttpNode::new(ProviderBuilder::new().connect_http(url)))
}

#[async_trait]
impl<P: Provider + Send + Sync> NodeClient for HttpNode<P> {
    async fn fetch_logs(
        &self,
        contract: Address,
        event_signature: B256,
        start_block: u64,
        end_block: u64,
    ) -> Result<Vec<RawLog>, NodeError> {
        let filter = Filter::new()
            .address(contract)
            .event_signature(event_signature)
            .from_block(start_block)
            .to_block(end_block);

        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|e| NodeError::classify(e.to_string()))?;

        Ok(logs.into_iter().map(RawLog::from).collect())
    }

    async fn fetch_block_timestamp(&self, block_number: u64) -> Result<u64, NodeError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(block_number))
            .await
            .map_err(|e| NodeError::classify(e.to_string()))?;

        block
            .map(|b| b.header.timestamp)
            .ok_or_else(|| NodeError::Malformed(format!("block {} not found", block_number)))
    }

    async fn current_block_height(&self) -> Result<u64, NodeError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| NodeError::classify(e.to_string()))
    }
}
