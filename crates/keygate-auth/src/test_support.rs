//! Shared test fixtures: a fake identity provider that mints RS256 tokens
//! and publishes the matching JWKS document.

use std::sync::OnceLock;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use rand::rngs::OsRng;
use rsa::RsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use time::OffsetDateTime;

use crate::token::BearerClaims;

/// PEM-encoded private key plus the public modulus/exponent for JWKS export.
struct KeyMaterial {
    private_pem: String,
    n: Vec<u8>,
    e: Vec<u8>,
}

/// RSA key generation is slow in debug builds; share one pair per test run.
fn shared_key() -> &'static KeyMaterial {
    static KEY: OnceLock<KeyMaterial> = OnceLock::new();
    KEY.get_or_init(|| {
        let private_key =
            RsaPrivateKey::new(&mut OsRng, 2048).expect("failed to generate RSA key");
        let public_key = private_key.to_public_key();

        KeyMaterial {
            private_pem: private_key
                .to_pkcs8_pem(LineEnding::LF)
                .expect("failed to encode private key")
                .to_string(),
            n: public_key.n().to_bytes_be(),
            e: public_key.e().to_bytes_be(),
        }
    })
}

/// A fake identity provider for tests.
///
/// Instances share one generated key pair per test run unless constructed
/// via [`TestIssuer::with_fresh_key`].
pub(crate) struct TestIssuer {
    pub issuer: String,
    pub audience: String,
    pub kid: String,
    encoding_key: EncodingKey,
    n: Vec<u8>,
    e: Vec<u8>,
}

impl TestIssuer {
    const DEFAULT_KID: &'static str = "test-key-1";

    /// A provider reusing the shared per-run key pair.
    pub fn new(issuer: &str, audience: &str) -> Self {
        Self::with_kid(issuer, audience, Self::DEFAULT_KID)
    }

    /// A provider with a private key unique to this instance.
    ///
    /// Tokens it signs do not verify against another instance's JWKS, which
    /// is what bad-signature tests rely on.
    pub fn with_fresh_key(issuer: &str, audience: &str) -> Self {
        let private_key =
            RsaPrivateKey::new(&mut OsRng, 2048).expect("failed to generate RSA key");
        let public_key = private_key.to_public_key();
        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .expect("failed to encode private key");

        Self {
            issuer: issuer.to_string(),
            audience: audience.to_string(),
            kid: Self::DEFAULT_KID.to_string(),
            encoding_key: EncodingKey::from_rsa_pem(private_pem.as_bytes())
                .expect("failed to load private key"),
            n: public_key.n().to_bytes_be(),
            e: public_key.e().to_bytes_be(),
        }
    }

    /// A provider reusing the shared per-run key pair, advertising `kid`.
    pub fn with_kid(issuer: &str, audience: &str, kid: &str) -> Self {
        let key = shared_key();
        Self {
            issuer: issuer.to_string(),
            audience: audience.to_string(),
            kid: kid.to_string(),
            encoding_key: EncodingKey::from_rsa_pem(key.private_pem.as_bytes())
                .expect("failed to load private key"),
            n: key.n.clone(),
            e: key.e.clone(),
        }
    }

    /// The provider's published key set.
    pub fn jwks(&self) -> serde_json::Value {
        serde_json::json!({
            "keys": [{
                "kty": "RSA",
                "kid": self.kid,
                "use": "sig",
                "alg": "RS256",
                "n": URL_SAFE_NO_PAD.encode(&self.n),
                "e": URL_SAFE_NO_PAD.encode(&self.e),
            }]
        })
    }

    /// A claim set for `sub`, valid for one hour.
    pub fn claims(&self, sub: &str) -> BearerClaims {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        BearerClaims {
            iss: self.issuer.clone(),
            sub: sub.to_string(),
            aud: vec![self.audience.clone()],
            exp: now + 3600,
            iat: Some(now),
            azp: None,
            scp: None,
            email: None,
            extra: std::collections::HashMap::new(),
        }
    }

    /// Signs `claims` into a token carrying this provider's `kid`.
    pub fn token(&self, claims: &BearerClaims) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone());
        encode(&header, claims, &self.encoding_key).expect("failed to sign token")
    }

    /// Signs `claims` into a token with no `kid` header.
    pub fn token_without_kid(&self, claims: &BearerClaims) -> String {
        let header = Header::new(Algorithm::RS256);
        encode(&header, claims, &self.encoding_key).expect("failed to sign token")
    }
}
