//! Chain RPC endpoint supplied by the user

use crate::types::BridgeError;
use serde::{Deserialize, Serialize};

const SCHEMES: [&str; 2] = ["ws://", "wss://"];

/// WebSocket endpoint of a chain node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint(String);

impl Endpoint {
    /// Accepts only `ws://` and `wss://` URLs with a non-empty remainder
    pub fn parse(input: &str) -> Result<Self, BridgeError> {
        let input = input.trim();
        let valid = SCHEMES
            .iter()
            .any(|scheme| input.starts_with(scheme) && input.len() > scheme.len());

        if !valid {
            return Err(BridgeError::InvalidEndpoint(input.to_string()));
        }

        Ok(Self(input.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_secure(&self) -> bool {
        self.0.starts_with("wss://")
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Endpoint {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
