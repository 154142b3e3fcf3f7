//! ABI text, loaded once per run and shared read-only with every round.

use alloy_json_abi::JsonAbi;
use alloy_primitives::B256;
use log::debug;
use std::path::Path;
use std::sync::Arc;

use crate::{SyncError, SyncResult};

const ERC20_ABI_JSON: &str = include_str!("../abis/erc20.json");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbiText(Arc<str>);

impl AbiText {
    /// The bundled ERC-20 ABI
    pub fn erc20() -> Self {
        Self(Arc::from(ERC20_ABI_JSON))
    }

    pub fn parse(text: impl Into<String>) -> SyncResult<Self> {
        let text = text.into();
        serde_json::from_str::<JsonAbi>(&text)
            .map_err(|e| SyncError::AbiUnavailable(format!("invalid ABI JSON: {}", e)))?;
        Ok(Self(Arc::from(text)))
    }

    pub fn load(path: &Path) -> SyncResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SyncError::AbiUnavailable(format!("{}: {}", path.display(), e)))?;
        debug!("Loaded ABI from {} ({} bytes)", path.display(), text.len());
        Self::parse(text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn shared(&self) -> Arc<str> {
        self.0.clone()
    }

    /// Fails unless the ABI declares a non-anonymous event for every topic
    pub fn require_events(&self, topics: &[B256]) -> SyncResult<()> {
        let abi: JsonAbi = serde_json::from_str(&self.0)
            .map_err(|e| SyncError::AbiUnavailable(format!("invalid ABI JSON: {}", e)))?;
        for topic in topics {
            if !abi.events().any(|e| !e.anonymous && e.selector() == *topic) {
                return Err(SyncError::AbiUnavailable(format!(
                    "ABI has no event with selector {:#x}",
                    topic
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TRANSFER_TOPIC;

    #[test]
    fn test_bundled_abi_has_transfer() {
        let abi = AbiText::erc20();
        assert!(abi.require_events(&[TRANSFER_TOPIC]).is_ok());
        assert!(abi.require_events(&[B256::repeat_byte(1)]).is_err());
    }

    #[test]
    fn test_missing_file_is_abi_unavailable() {
        let err = AbiText::load(Path::new("/nonexistent/erc20.json")).unwrap_err();
        assert!(matches!(err, SyncError::AbiUnavailable(_)));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            AbiText::parse("not json"),
            Err(SyncError::AbiUnavailable(_))
        ));
    }
}
