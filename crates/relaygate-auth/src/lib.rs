pub mod context;
pub mod error;
pub mod interceptor;

pub use context::AuthContext;
pub use error::AuthError;
pub use interceptor::AuthInterceptor;

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use relaygate_core::ids::PrincipalStatus;
    use relaygate_dedupe::DedupeCache;
    use relaygate_ledger::Store;
    use relaygate_protocol::auth::{AuthMetadata, BearerAuth, Claims, SshAuth};
    use sha2::Digest;
    use std::sync::Arc;
    use std::time::Duration;

    fn interceptor() -> (AuthInterceptor, Arc<Store>) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let dedupe = DedupeCache::new(128, Duration::from_secs(300));
        let interceptor = AuthInterceptor::new(store.clone(), dedupe, "test-secret".to_string(), true);
        (interceptor, store)
    }

    fn sign_ssh(signing_key: &SigningKey, timestamp: i64, nonce: &str) -> SshAuth {
        use base64::engine::general_purpose::STANDARD as BASE64;
        use base64::Engine;

        let payload = format!("{timestamp}|{nonce}");
        let signature = signing_key.sign(payload.as_bytes());
        SshAuth {
            pubkey: BASE64.encode(signing_key.verifying_key().to_bytes()),
            signature: BASE64.encode(signature.to_bytes()),
            timestamp,
            nonce: nonce.to_string(),
        }
    }

    #[tokio::test]
    async fn ssh_auth_auto_registers_unknown_fingerprint_as_pending() {
        let (interceptor, _store) = interceptor();
        let signing_key = SigningKey::from_bytes(&[7u8; 32]);
        let ssh = sign_ssh(&signing_key, chrono::Utc::now().timestamp(), "nonce-1");

        let result = interceptor.authenticate(AuthMetadata::Ssh(ssh));
        match result {
            Err(AuthError::PermissionDenied(msg)) => {
                assert!(msg.contains("pending"));
                assert!(msg.contains("principal_id"), "message should name principal_id: {msg}");
            }
            other => panic!("expected pending permission_denied, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ssh_auth_rejects_nonce_replay() {
        let (interceptor, store) = interceptor();
        let signing_key = SigningKey::from_bytes(&[9u8; 32]);
        let ts = chrono::Utc::now().timestamp();

        let ssh1 = sign_ssh(&signing_key, ts, "nonce-reuse");
        let _ = interceptor.authenticate(AuthMetadata::Ssh(ssh1));

        // Approve the auto-registered principal so the second call reaches
        // the nonce check rather than failing on status first.
        let fingerprint = hex::encode(sha2::Sha256::digest(signing_key.verifying_key().to_bytes()));
        let principal = store.get_principal_by_fingerprint(&fingerprint).unwrap().unwrap();
        store
            .set_principal_status(&principal.id, PrincipalStatus::Approved)
            .unwrap();

        let ssh2 = sign_ssh(&signing_key, ts, "nonce-reuse");
        let result = interceptor.authenticate(AuthMetadata::Ssh(ssh2));
        assert!(matches!(result, Err(AuthError::Unauthenticated(_))));
    }

    #[tokio::test]
    async fn bearer_auth_rejects_unknown_principal() {
        let (interceptor, _store) = interceptor();
        let claims = Claims {
            sub: "nonexistent".to_string(),
            iat: chrono::Utc::now().timestamp(),
            exp: chrono::Utc::now().timestamp() + 3600,
        };
        let token = jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        let result = interceptor.authenticate(AuthMetadata::Bearer(BearerAuth { token }));
        assert!(matches!(result, Err(AuthError::Unauthenticated(_))));
    }

    #[tokio::test]
    async fn bearer_auth_succeeds_for_approved_principal() {
        let (interceptor, store) = interceptor();
        let principal = store
            .create_principal(
                relaygate_core::ids::PrincipalKind::Client,
                None,
                "alice",
                PrincipalStatus::Approved,
            )
            .unwrap();

        let claims = Claims {
            sub: principal.id.to_string(),
            iat: chrono::Utc::now().timestamp(),
            exp: chrono::Utc::now().timestamp() + 3600,
        };
        let token = jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        let ctx = interceptor
            .authenticate(AuthMetadata::Bearer(BearerAuth { token }))
            .unwrap();
        assert_eq!(ctx.principal_id, principal.id);
    }
}
