use serde::{Deserialize, Serialize};

/// Authentication metadata extracted from an inbound RPC, per §6
/// "Authentication metadata" — either a bearer JWT (clients) or an SSH
/// signature over `timestamp|nonce` (agents, packs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuthMetadata {
    Bearer(BearerAuth),
    Ssh(SshAuth),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BearerAuth {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshAuth {
    pub pubkey: String,
    pub signature: String,
    pub timestamp: i64,
    pub nonce: String,
}

impl SshAuth {
    /// The exact byte payload the signature covers.
    pub fn signed_payload(&self) -> String {
        format!("{}|{}", self.timestamp, self.nonce)
    }
}

/// JWT claims carried by a bearer token — principal id in `sub`, standard
/// `iat`/`exp`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}
