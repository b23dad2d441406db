//! Token Service
//!
//! Issues and verifies bearer tokens. A token is a compact JWS
//! (`header.claims.signature`, base64url without padding) signed with
//! Ed25519 over a fixed claim set: it proves the caller obtained it from
//! this service, not who the caller is. Tokens do not expire.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey, SECRET_KEY_LENGTH};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AuthError, SigningKeyError};

/// Subject carried by every token
pub const TOKEN_SUBJECT: &str = "auth-token";

const TOKEN_ALGORITHM: &str = "EdDSA";
const TOKEN_TYPE: &str = "JWT";

#[derive(Debug, Serialize, Deserialize)]
struct TokenHeader {
    alg: String,
    typ: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenClaims {
    sub: String,
}

/// An issued bearer token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Signs and checks tokens with a single Ed25519 key
#[derive(Clone)]
pub struct TokenService {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    /// Encoded `header.claims`, identical for every token
    signing_input: String,
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("verifying_key", &self.verifying_key_hex())
            .finish_non_exhaustive()
    }
}

impl TokenService {
    /// Create a service around an existing key
    pub fn new(signing_key: SigningKey) -> Self {
        let header = encode_json(&TokenHeader {
            alg: TOKEN_ALGORITHM.to_string(),
            typ: TOKEN_TYPE.to_string(),
        });
        let claims = encode_json(&TokenClaims {
            sub: TOKEN_SUBJECT.to_string(),
        });

        Self {
            verifying_key: signing_key.verifying_key(),
            signing_key,
            signing_input: format!("{}.{}", header, claims),
        }
    }

    /// Load the key from a hex-encoded 32-byte seed
    pub fn from_hex_seed(seed_hex: &str) -> Result<Self, SigningKeyError> {
        let bytes =
            hex::decode(seed_hex.trim()).map_err(|e| SigningKeyError::InvalidHex(e.to_string()))?;
        let seed: [u8; SECRET_KEY_LENGTH] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| SigningKeyError::InvalidLength {
                    expected: SECRET_KEY_LENGTH,
                    actual: bytes.len(),
                })?;

        Ok(Self::new(SigningKey::from_bytes(&seed)))
    }

    /// Create a service with a fresh random key
    pub fn generate() -> Self {
        let seed: [u8; SECRET_KEY_LENGTH] = rand::random();
        Self::new(SigningKey::from_bytes(&seed))
    }

    /// Hex-encoded seed, suitable for `[token] signing_key`
    pub fn seed_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    /// Hex-encoded public half of the key
    pub fn verifying_key_hex(&self) -> String {
        hex::encode(self.verifying_key.to_bytes())
    }

    /// Issue a new token
    pub fn issue(&self) -> Token {
        let signature = self.signing_key.sign(self.signing_input.as_bytes());
        Token(format!(
            "{}.{}",
            self.signing_input,
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        ))
    }

    /// Check that `token` was issued by this service
    pub fn verify(&self, token: &str) -> Result<(), AuthError> {
        if token.is_empty() {
            return Err(AuthError::invalid("token is empty"));
        }

        let mut parts = token.split('.');
        let (Some(header), Some(claims), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::invalid("token must have three segments"));
        };

        let header: TokenHeader = decode_json(header, "header")?;
        if header.alg != TOKEN_ALGORITHM {
            return Err(AuthError::invalid(format!(
                "unsupported algorithm {}",
                header.alg
            )));
        }

        let claims_json: TokenClaims = decode_json(claims, "claims")?;
        if claims_json.sub != TOKEN_SUBJECT {
            return Err(AuthError::invalid("unexpected subject"));
        }

        let signature_bytes = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| AuthError::invalid("signature is not base64url"))?;
        let signature = Signature::from_slice(&signature_bytes)
            .map_err(|_| AuthError::invalid("signature has the wrong length"))?;

        // The signature covers the segments as transmitted
        let (signed, _) = token
            .rsplit_once('.')
            .ok_or_else(|| AuthError::invalid("token must have three segments"))?;

        self.verifying_key
            .verify_strict(signed.as_bytes(), &signature)
            .map_err(|_| AuthError::invalid("signature does not match"))
    }
}

fn encode_json<T: Serialize>(value: &T) -> String {
    // Serializing these plain structs cannot fail
    let json = serde_json::to_vec(value).unwrap_or_default();
    URL_SAFE_NO_PAD.encode(json)
}

fn decode_json<T: for<'de> Deserialize<'de>>(segment: &str, what: &str) -> Result<T, AuthError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| AuthError::invalid(format!("{} is not base64url", what)))?;
    serde_json::from_slice(&bytes).map_err(|_| AuthError::invalid(format!("{} is not valid JSON", what)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: &str = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";

    #[test]
    fn test_issue_and_verify() {
        let service = TokenService::generate();
        let token = service.issue();
        assert!(service.verify(token.as_str()).is_ok());
        assert_eq!(token.as_str().split('.').count(), 3);
    }

    #[test]
    fn test_tokens_are_deterministic_for_a_key() {
        let service = TokenService::from_hex_seed(SEED).unwrap();
        assert_eq!(service.issue(), service.issue());
    }

    #[test]
    fn test_token_from_other_key_rejected() {
        let issuer = TokenService::generate();
        let verifier = TokenService::generate();
        let token = issuer.issue();

        assert!(matches!(
            verifier.verify(token.as_str()),
            Err(AuthError::Invalid(_))
        ));
    }

    #[test]
    fn test_tampered_claims_rejected() {
        let service = TokenService::generate();
        let token = service.issue().into_string();
        let parts: Vec<&str> = token.split('.').collect();

        let forged_claims = URL_SAFE_NO_PAD.encode(br#"{"sub":"admin"}"#);
        let forged = format!("{}.{}.{}", parts[0], forged_claims, parts[2]);
        assert!(service.verify(&forged).is_err());

        // Same claims, re-encoded with padding, no longer matches the signature
        let padded = format!("{}.{}=.{}", parts[0], parts[1], parts[2]);
        assert!(service.verify(&padded).is_err());
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let service = TokenService::generate();
        let mut token = service.issue().into_string();
        let last = token.pop().unwrap();
        token.push(if last == 'A' { 'B' } else { 'A' });

        assert!(service.verify(&token).is_err());
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        let service = TokenService::generate();
        for token in [
            "",
            "AUTH",
            "a.b",
            "a.b.c.d",
            "...",
            "not base64!.x.y",
            "eyJhbGciOiJub25lIn0.eyJzdWIiOiJhdXRoLXRva2VuIn0.",
        ] {
            assert!(
                service.verify(token).is_err(),
                "token {:?} should be rejected",
                token
            );
        }
    }

    #[test]
    fn test_from_hex_seed() {
        let service = TokenService::from_hex_seed(SEED).unwrap();
        assert_eq!(service.seed_hex(), SEED);
        assert_eq!(service.verifying_key_hex().len(), 64);

        assert!(matches!(
            TokenService::from_hex_seed("zz"),
            Err(SigningKeyError::InvalidHex(_))
        ));
        assert_eq!(
            TokenService::from_hex_seed("abcd").unwrap_err(),
            SigningKeyError::InvalidLength {
                expected: 32,
                actual: 2
            }
        );
    }

    #[test]
    fn test_debug_hides_seed() {
        let service = TokenService::from_hex_seed(SEED).unwrap();
        let debug = format!("{:?}", service);
        assert!(!debug.contains(SEED));
        assert!(debug.contains(&service.verifying_key_hex()));
    }
}
