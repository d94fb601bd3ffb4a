use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use ed25519_dalek::{Signature, VerifyingKey};
use jsonwebtoken::{decode, DecodingKey, Validation};
use relaygate_core::ids::{PrincipalId, PrincipalKind, PrincipalStatus};
use relaygate_dedupe::DedupeCache;
use relaygate_ledger::Store;
use relaygate_protocol::auth::{AuthMetadata, Claims};
use sha2::{Digest, Sha256};
use tracing::instrument;

use crate::context::AuthContext;
use crate::error::{AuthError, Result};

/// Bound on `|now - timestamp|` for SSH-signed requests, per §5's
/// "SSH timestamp skew: bounded (implementation-defined)".
const SSH_TIMESTAMP_SKEW_SECS: i64 = 300;

pub struct AuthInterceptor {
    store: Arc<Store>,
    dedupe: Arc<DedupeCache>,
    jwt_secret: String,
    auto_register_unknown_fingerprints: bool,
    auto_registered_status: PrincipalStatus,
}

impl AuthInterceptor {
    pub fn new(
        store: Arc<Store>,
        dedupe: Arc<DedupeCache>,
        jwt_secret: String,
        auto_register_unknown_fingerprints: bool,
    ) -> Self {
        Self {
            store,
            dedupe,
            jwt_secret,
            auto_register_unknown_fingerprints,
            auto_registered_status: PrincipalStatus::Pending,
        }
    }

    /// Runs every step of §4.2's auth order and returns the attached
    /// auth-context, or a strictly classified error.
    #[instrument(skip(self, metadata))]
    pub fn authenticate(&self, metadata: AuthMetadata) -> Result<AuthContext> {
        let principal = match metadata {
            AuthMetadata::Ssh(ssh) => self.authenticate_ssh(ssh)?,
            AuthMetadata::Bearer(bearer) => self.authenticate_bearer(bearer)?,
        };

        self.check_status(&principal)?;

        let roles = self
            .store
            .list_roles(principal.kind, principal.id.as_str())
            .map_err(AuthError::from)?
            .into_iter()
            .map(|r| r.role_name)
            .collect();

        Ok(AuthContext {
            principal_id: principal.id,
            kind: principal.kind,
            roles,
        })
    }

    fn authenticate_ssh(&self, ssh: relaygate_protocol::auth::SshAuth) -> Result<relaygate_ledger::Principal> {
        let now = Utc::now().timestamp();
        if (now - ssh.timestamp).abs() > SSH_TIMESTAMP_SKEW_SECS {
            return Err(AuthError::Unauthenticated("stale timestamp".to_string()));
        }

        if self.dedupe.check_and_mark(&ssh.nonce) {
            return Err(AuthError::Unauthenticated("nonce replay".to_string()));
        }

        let pubkey_bytes = BASE64
            .decode(&ssh.pubkey)
            .map_err(|_| AuthError::Unauthenticated("malformed public key".to_string()))?;
        let verifying_key = VerifyingKey::try_from(pubkey_bytes.as_slice())
            .map_err(|_| AuthError::Unauthenticated("malformed public key".to_string()))?;

        let signature_bytes = BASE64
            .decode(&ssh.signature)
            .map_err(|_| AuthError::Unauthenticated("malformed signature".to_string()))?;
        let signature = Signature::try_from(signature_bytes.as_slice())
            .map_err(|_| AuthError::Unauthenticated("malformed signature".to_string()))?;

        verifying_key
            .verify_strict(ssh.signed_payload().as_bytes(), &signature)
            .map_err(|_| AuthError::Unauthenticated("signature verification failed".to_string()))?;

        let fingerprint = hex::encode(Sha256::digest(&pubkey_bytes));

        match self.store.get_principal_by_fingerprint(&fingerprint)? {
            Some(principal) => Ok(principal),
            None => {
                if !self.auto_register_unknown_fingerprints {
                    return Err(AuthError::Unauthenticated("unknown fingerprint".to_string()));
                }
                let suffix = &fingerprint[fingerprint.len().saturating_sub(8)..];
                let principal = self.store.create_principal(
                    PrincipalKind::Agent,
                    Some(&fingerprint),
                    &format!("agent-{suffix}"),
                    self.auto_registered_status,
                )?;
                Ok(principal)
            }
        }
    }

    fn authenticate_bearer(&self, bearer: relaygate_protocol::auth::BearerAuth) -> Result<relaygate_ledger::Principal> {
        let claims = decode::<Claims>(
            &bearer.token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| AuthError::Unauthenticated(format!("invalid token: {e}")))?
        .claims;

        let principal_id = PrincipalId::from(claims.sub);
        match self.store.get_principal(&principal_id) {
            Ok(principal) => Ok(principal),
            Err(relaygate_ledger::LedgerError::NotFound(_)) => {
                Err(AuthError::Unauthenticated("unknown principal".to_string()))
            }
            Err(e) => Err(AuthError::from(e)),
        }
    }

    fn check_status(&self, principal: &relaygate_ledger::Principal) -> Result<()> {
        match principal.status {
            PrincipalStatus::Approved | PrincipalStatus::Online | PrincipalStatus::Offline => Ok(()),
            // §8 scenario 4: the rejection message names `principal_id` so an
            // operator can approve the right auto-registered principal.
            PrincipalStatus::Pending => Err(AuthError::PermissionDenied(format!(
                "principal_id {} is pending approval",
                principal.id
            ))),
            PrincipalStatus::Revoked => Err(AuthError::PermissionDenied("principal is revoked".to_string())),
        }
    }
}
