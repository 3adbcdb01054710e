use crate::clock::Clock;
use crate::models::{Payload, VerifyError};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Algorithms this gateway will ever accept, matching `spec.md` §4.3. `none`
/// and HMAC families are never in this set, by construction; there is no
/// code path that can add them.
pub const ALLOWED_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::ES512,
];

#[derive(Debug, Error)]
pub enum VerifierConfigError {
    #[error("failed to read key material at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse key material: {0}")]
    InvalidKey(String),
    #[error("algorithm {0:?} is not in the asymmetric allow-list")]
    DisallowedAlgorithm(Algorithm),
}

#[derive(Debug, Deserialize)]
struct RawClaims {
    sub: Option<String>,
    jti: Option<String>,
    exp: Option<i64>,
    iat: Option<i64>,
    nbf: Option<i64>,
}

/// Verifies bearer credentials: signature under a fixed asymmetric
/// algorithm, then manual temporal checks with clock-drift tolerance so
/// that the jsonwebtoken crate's own automatic `exp`/`nbf` handling can
/// never silently bypass the configured drift.
pub struct CredentialVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
    clock_drift_seconds: i64,
    clock: Arc<dyn Clock>,
}

impl CredentialVerifier {
    pub fn new(
        decoding_key: DecodingKey,
        algorithm: Algorithm,
        clock_drift_seconds: i64,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, VerifierConfigError> {
        if !ALLOWED_ALGORITHMS.contains(&algorithm) {
            return Err(VerifierConfigError::DisallowedAlgorithm(algorithm));
        }

        let mut validation = Validation::new(algorithm);
        // Required-claim and temporal enforcement happen by hand below, so
        // that `clock_drift_seconds` is the single source of tolerance.
        validation.required_spec_claims = HashSet::new();
        validation.validate_exp = false;
        validation.validate_nbf = false;

        Ok(Self {
            decoding_key,
            validation,
            clock_drift_seconds,
            clock,
        })
    }

    /// Load a PEM-encoded public key from disk and build a verifier for the
    /// given algorithm. Any failure here is meant to abort service
    /// initialization rather than defer to request time (`spec.md` §4.3).
    pub fn from_pem_file(
        path: impl AsRef<Path>,
        algorithm: Algorithm,
        clock_drift_seconds: i64,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, VerifierConfigError> {
        let path_ref = path.as_ref();
        let pem = fs::read(path_ref).map_err(|source| VerifierConfigError::Io {
            path: path_ref.display().to_string(),
            source,
        })?;

        let decoding_key = match algorithm {
            Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 => {
                DecodingKey::from_rsa_pem(&pem)
            }
            Algorithm::ES256 | Algorithm::ES384 | Algorithm::ES512 => {
                DecodingKey::from_ec_pem(&pem)
            }
            other => return Err(VerifierConfigError::DisallowedAlgorithm(other)),
        }
        .map_err(|err| VerifierConfigError::InvalidKey(err.to_string()))?;

        Self::new(decoding_key, algorithm, clock_drift_seconds, clock)
    }

    /// Verify a credential, returning the extracted payload or a tagged
    /// failure kind. Order of checks follows `spec.md` §4.3 exactly: empty
    /// check, signature, `exp` presence/expiry, `nbf`, then `sub`/`jti`.
    pub fn verify(&self, credential: &str) -> Result<Payload, VerifyError> {
        if credential.is_empty() {
            return Err(VerifyError::Malformed);
        }

        let token_data = decode::<RawClaims>(credential, &self.decoding_key, &self.validation)
            .map_err(|err| classify_decode_error(err.kind()))?;
        let claims = token_data.claims;

        let now = self.clock.now();

        let exp = claims.exp.ok_or(VerifyError::Malformed)?;
        if now > exp + self.clock_drift_seconds {
            return Err(VerifyError::Expired);
        }

        if let Some(nbf) = claims.nbf {
            if now < nbf - self.clock_drift_seconds {
                return Err(VerifyError::NotYetValid);
            }
        }

        let sub = claims.sub.filter(|s| !s.is_empty()).ok_or(VerifyError::Malformed)?;
        let jti = claims.jti.filter(|s| !s.is_empty()).ok_or(VerifyError::Malformed)?;

        Ok(Payload {
            sub,
            jti,
            exp,
            iat: claims.iat,
            nbf: claims.nbf,
        })
    }
}

fn classify_decode_error(kind: &ErrorKind) -> VerifyError {
    match kind {
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidAlgorithmName
        | ErrorKind::InvalidEcdsaKey
        | ErrorKind::InvalidRsaKey(_) => VerifyError::InvalidSignature,
        ErrorKind::ExpiredSignature => VerifyError::Expired,
        ErrorKind::ImmatureSignature => VerifyError::NotYetValid,
        _ => VerifyError::Malformed,
    }
}
