use std::str::FromStr;
use std::sync::Arc;

use chrono::Duration;
use jsonwebtoken::decode;
use jsonwebtoken::encode;
use jsonwebtoken::Algorithm;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::EncodingKey;
use jsonwebtoken::Header;
use jsonwebtoken::Validation;

use super::claims::Claims;
use super::errors::JwtError;
use crate::clock::Clock;
use crate::clock::SystemClock;

/// Parse a signing algorithm name, accepting only the HMAC family.
///
/// # Errors
/// * `UnsupportedAlgorithm` - Unknown name or an asymmetric algorithm
pub fn parse_algorithm(name: &str) -> Result<Algorithm, JwtError> {
    let algorithm = Algorithm::from_str(&name.to_ascii_uppercase())
        .map_err(|_| JwtError::UnsupportedAlgorithm(name.to_string()))?;

    match algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(algorithm),
        _ => Err(JwtError::UnsupportedAlgorithm(name.to_string())),
    }
}

/// Signs and verifies access tokens.
///
/// Uses a single process-wide secret and a fixed HMAC algorithm (HS256 by
/// default). Expiry is checked against the handler's clock with no leeway
/// unless one is configured.
pub struct JwtHandler {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    leeway_secs: i64,
    clock: Arc<dyn Clock>,
}

impl JwtHandler {
    /// Create a new JWT handler with a secret key, HS256 and the system clock.
    ///
    /// # Security Notes
    /// - The secret should be at least 256 bits (32 bytes) for HS256
    /// - Store secrets in environment variables or secure vaults, never in code
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            algorithm: Algorithm::HS256,
            leeway_secs: 0,
            clock: Arc::new(SystemClock),
        }
    }

    /// Use another HMAC algorithm.
    ///
    /// # Errors
    /// * `UnsupportedAlgorithm` - Algorithm is not HS256, HS384 or HS512
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Result<Self, JwtError> {
        match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                self.algorithm = algorithm;
                Ok(self)
            }
            other => Err(JwtError::UnsupportedAlgorithm(format!("{:?}", other))),
        }
    }

    /// Tolerate `leeway_secs` of clock skew when checking expiry.
    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.leeway_secs = i64::try_from(leeway_secs).unwrap_or(i64::MAX);
        self
    }

    /// Read time from `clock` instead of the system clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sign `claims` with an expiry of now + `ttl`.
    ///
    /// # Errors
    /// * `EncodingFailed` - Token encoding failed
    pub fn issue(&self, claims: &Claims, ttl: Duration) -> Result<String, JwtError> {
        let now = self.clock.now();
        let stamped = Claims {
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            ..claims.clone()
        };

        encode(&Header::new(self.algorithm), &stamped, &self.encoding_key)
            .map_err(|e| JwtError::EncodingFailed(e.to_string()))
    }

    /// Verify a token and return its claims.
    ///
    /// The HMAC signature is checked (in constant time) before the payload is
    /// deserialized, so no claim is read from an unauthenticated token.
    ///
    /// # Errors
    /// * `Malformed` - Token structure, encoding or payload is invalid
    /// * `InvalidSignature` - Signature does not match or algorithm differs
    /// * `Expired` - Current time is past `exp` (plus leeway)
    pub fn verify(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(self.algorithm);
        // Expiry is evaluated below against our own clock.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)?;
        let claims = token_data.claims;

        if claims.is_expired(self.clock.now().timestamp(), self.leeway_secs) {
            return Err(JwtError::Expired);
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::clock::ManualClock;

    const SECRET: &[u8] = b"my_secret_key_at_least_32_bytes_long!";

    fn handler_with_clock() -> (JwtHandler, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            chrono::DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
        ));
        let handler = JwtHandler::new(SECRET).with_clock(clock.clone());
        (handler, clock)
    }

    #[test]
    fn test_issue_and_verify() {
        let (handler, _clock) = handler_with_clock();
        let claims = Claims::new("user123", "a@x.com", "admin");

        let token = handler
            .issue(&claims, Duration::seconds(3600))
            .expect("Failed to issue token");
        assert!(!token.is_empty());

        let decoded = handler.verify(&token).expect("Failed to verify token");
        assert_eq!(decoded.sub, "user123");
        assert_eq!(decoded.email, "a@x.com");
        assert_eq!(decoded.role, "admin");
        assert_eq!(decoded.iat, 1_700_000_000);
        assert_eq!(decoded.exp, 1_700_003_600);
    }

    #[test]
    fn test_expired_after_ttl() {
        let (handler, clock) = handler_with_clock();
        let token = handler
            .issue(&Claims::new("user123", "a@x.com", "user"), Duration::seconds(60))
            .unwrap();

        clock.advance(Duration::seconds(60));
        assert!(handler.verify(&token).is_ok(), "valid exactly at expiry");

        clock.advance(Duration::seconds(1));
        assert_eq!(handler.verify(&token), Err(JwtError::Expired));
    }

    #[test]
    fn test_leeway() {
        let (handler, clock) = handler_with_clock();
        let handler = handler.with_leeway(30);
        let token = handler
            .issue(&Claims::new("user123", "a@x.com", "user"), Duration::seconds(60))
            .unwrap();

        clock.advance(Duration::seconds(90));
        assert!(handler.verify(&token).is_ok());

        clock.advance(Duration::seconds(1));
        assert_eq!(handler.verify(&token), Err(JwtError::Expired));
    }

    #[test]
    fn test_verify_invalid_token() {
        let handler = JwtHandler::new(SECRET);

        let result = handler.verify("invalid.token.here");
        assert!(matches!(result, Err(JwtError::Malformed(_))));

        let result = handler.verify("");
        assert!(matches!(result, Err(JwtError::Malformed(_))));
    }

    #[test]
    fn test_verify_with_wrong_secret() {
        let handler1 = JwtHandler::new(b"secret1_at_least_32_bytes_long_key!");
        let handler2 = JwtHandler::new(b"secret2_at_least_32_bytes_long_key!");

        let token = handler1
            .issue(&Claims::new("user123", "a@x.com", "user"), Duration::hours(1))
            .unwrap();

        assert_eq!(handler2.verify(&token), Err(JwtError::InvalidSignature));
    }

    #[test]
    fn test_signature_checked_before_expiry() {
        let (handler, clock) = handler_with_clock();
        let other = JwtHandler::new(b"another_secret_at_least_32_bytes!!").with_clock(clock.clone());
        let token = other
            .issue(&Claims::new("user123", "a@x.com", "user"), Duration::seconds(1))
            .unwrap();

        clock.advance(Duration::hours(1));

        assert_eq!(handler.verify(&token), Err(JwtError::InvalidSignature));
    }

    #[test]
    fn test_single_bit_flip_never_verifies() {
        let (handler, _clock) = handler_with_clock();
        let token = handler
            .issue(&Claims::new("user123", "a@x.com", "admin"), Duration::hours(1))
            .unwrap();
        let bytes = token.as_bytes();

        for index in 0..bytes.len() {
            // Low seven bits only, so the result stays ASCII.
            for bit in 0..7 {
                let mut tampered = bytes.to_vec();
                tampered[index] ^= 1 << bit;
                let tampered = String::from_utf8(tampered).expect("ascii stays utf-8");

                assert!(
                    handler.verify(&tampered).is_err(),
                    "flipping bit {} of byte {} produced a valid token",
                    bit,
                    index
                );
            }
        }
    }

    #[test]
    fn test_algorithm_mismatch_rejected() {
        let hs512 = JwtHandler::new(SECRET)
            .with_algorithm(Algorithm::HS512)
            .unwrap();
        let hs256 = JwtHandler::new(SECRET);

        let token = hs512
            .issue(&Claims::new("user123", "a@x.com", "user"), Duration::hours(1))
            .unwrap();

        assert!(hs512.verify(&token).is_ok());
        assert_eq!(hs256.verify(&token), Err(JwtError::InvalidSignature));
    }

    #[test]
    fn test_parse_algorithm() {
        assert_eq!(parse_algorithm("HS256").unwrap(), Algorithm::HS256);
        assert_eq!(parse_algorithm("hs384").unwrap(), Algorithm::HS384);
        assert!(matches!(
            parse_algorithm("RS256"),
            Err(JwtError::UnsupportedAlgorithm(_))
        ));
        assert!(matches!(
            parse_algorithm("none"),
            Err(JwtError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_with_algorithm_rejects_asymmetric() {
        let result = JwtHandler::new(SECRET).with_algorithm(Algorithm::RS256);
        assert!(matches!(result, Err(JwtError::UnsupportedAlgorithm(_))));
    }
}
