use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, VerifyingKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Principal, Role, UserId};

// Token signed by the auth service; clients present it to the API and the
// subscription channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionToken {
    pub user_id: UserId,
    pub role: Role,
    pub valid_until: DateTime<Utc>,
    pub signature: Vec<u8>,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TokenError {
    #[error("Malformed session token")]
    Malformed,

    #[error("Session token expired")]
    Expired,

    #[error("Invalid session token signature")]
    BadSignature,

    #[error("Issuer key is not a usable Ed25519 public key")]
    BadIssuerKey,
}

// payload = user_id || 0x00 || role || 0x00 || valid_until (rfc3339)
fn signing_payload(user_id: &UserId, role: Role, valid_until: &DateTime<Utc>) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(user_id.as_str().as_bytes());
    payload.push(0);
    payload.extend_from_slice(role.as_str().as_bytes());
    payload.push(0);
    payload.extend_from_slice(valid_until.to_rfc3339().as_bytes());
    payload
}

impl SessionToken {
    /// Hex-encoded JSON, suitable for an `Authorization: Bearer` header or a
    /// query parameter.
    pub fn encode(&self) -> String {
        // Serializing plain data into a Vec cannot fail.
        hex::encode(serde_json::to_vec(self).unwrap_or_default())
    }

    pub fn decode(bearer: &str) -> Result<Self, TokenError> {
        let bytes = hex::decode(bearer.trim()).map_err(|_| TokenError::Malformed)?;
        serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
    }

    /// Verify expiry and signature against the issuer key.
    ///
    /// Small-order issuer keys (the all-zero default among them) reject
    /// every token, and signatures are checked with `verify_strict`.
    pub fn verify(&self, issuer_pubkey: &[u8; 32]) -> Result<Principal, TokenError> {
        if Utc::now() > self.valid_until {
            return Err(TokenError::Expired);
        }

        let verifying_key =
            VerifyingKey::from_bytes(issuer_pubkey).map_err(|_| TokenError::BadIssuerKey)?;
        if verifying_key.is_weak() {
            return Err(TokenError::BadIssuerKey);
        }
        let signature =
            Signature::from_slice(&self.signature).map_err(|_| TokenError::BadSignature)?;

        let payload = signing_payload(&self.user_id, self.role, &self.valid_until);
        verifying_key
            .verify_strict(&payload, &signature)
            .map_err(|_| TokenError::BadSignature)?;

        Ok(Principal {
            user_id: self.user_id.clone(),
            role: self.role,
        })
    }
}

pub fn create_session_token(
    principal: &Principal,
    valid_until: DateTime<Utc>,
    issuer_signing_key: &ed25519_dalek::SigningKey,
) -> SessionToken {
    use ed25519_dalek::Signer;

    let payload = signing_payload(&principal.user_id, principal.role, &valid_until);
    let signature = issuer_signing_key.sign(&payload);

    SessionToken {
        user_id: principal.user_id.clone(),
        role: principal.role,
        valid_until,
        signature: signature.to_bytes().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    fn principal() -> Principal {
        Principal::new("u1", Role::Responder)
    }

    #[test]
    fn test_session_token_valid() {
        let issuer = SigningKey::generate(&mut OsRng);
        let pubkey = issuer.verifying_key().to_bytes();

        let token = create_session_token(&principal(), Utc::now() + Duration::hours(1), &issuer);
        assert_eq!(token.verify(&pubkey), Ok(principal()));
    }

    #[test]
    fn test_session_token_expired() {
        let issuer = SigningKey::generate(&mut OsRng);
        let pubkey = issuer.verifying_key().to_bytes();

        let token = create_session_token(&principal(), Utc::now() - Duration::minutes(1), &issuer);
        assert_eq!(token.verify(&pubkey), Err(TokenError::Expired));
    }

    #[test]
    fn test_session_token_wrong_issuer() {
        let issuer = SigningKey::generate(&mut OsRng);
        let other = SigningKey::generate(&mut OsRng).verifying_key().to_bytes();

        let token = create_session_token(&principal(), Utc::now() + Duration::hours(1), &issuer);
        assert_eq!(token.verify(&other), Err(TokenError::BadSignature));
    }

    #[test]
    fn test_role_cannot_be_escalated() {
        let issuer = SigningKey::generate(&mut OsRng);
        let pubkey = issuer.verifying_key().to_bytes();

        let mut token = create_session_token(
            &Principal::new("u1", Role::User),
            Utc::now() + Duration::hours(1),
            &issuer,
        );
        token.role = Role::Admin;
        assert_eq!(token.verify(&pubkey), Err(TokenError::BadSignature));
    }

    /// R = identity point, s = 0. Passes the lenient check against a
    /// small-order key for a fraction of messages.
    fn identity_signature() -> Vec<u8> {
        let mut sig = vec![0u8; 64];
        sig[0] = 1;
        sig
    }

    #[test]
    fn test_zero_issuer_key_rejects_forged_tokens() {
        let start = Utc::now() + Duration::hours(1);
        for i in 0..64 {
            let token = SessionToken {
                user_id: UserId::from("attacker"),
                role: Role::Admin,
                valid_until: start + Duration::seconds(i),
                signature: identity_signature(),
            };
            assert_eq!(token.verify(&[0u8; 32]), Err(TokenError::BadIssuerKey));
        }
    }

    #[test]
    fn test_identity_signature_fails_against_real_key() {
        let pubkey = SigningKey::generate(&mut OsRng).verifying_key().to_bytes();
        let token = SessionToken {
            user_id: UserId::from("attacker"),
            role: Role::Admin,
            valid_until: Utc::now() + Duration::hours(1),
            signature: identity_signature(),
        };
        assert_eq!(token.verify(&pubkey), Err(TokenError::BadSignature));
    }

    #[test]
    fn test_encode_decode() {
        let issuer = SigningKey::generate(&mut OsRng);
        let token = create_session_token(&principal(), Utc::now() + Duration::hours(1), &issuer);

        let decoded = SessionToken::decode(&token.encode()).unwrap();
        assert_eq!(decoded, token);
        assert_eq!(SessionToken::decode("not-hex"), Err(TokenError::Malformed));
    }
}
