//! Compact signed identity tokens (JWT, HS256), built on `jsonwebtoken`.
//!
//! `header.claims.signature`, each segment base64url without padding. Everything after the
//! second `.` is the signature segment. Verification order: signature, then claim decode,
//! then expiry; nothing from the claims leaves this module unless all three pass.

use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::secret::SigningSecret;
use crate::error::{AuthError, FatalError};

/// Fixed token lifetime: one week.
pub const TOKEN_LIFETIME_HOURS: i64 = 168;

/// Claims set. All fields are required on decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub authorized: bool,
    pub email: String,
    pub exp: i64,
}

#[derive(Clone, Debug)]
pub struct TokenCodec {
    secret: SigningSecret,
}

impl TokenCodec {
    pub fn new(secret: SigningSecret) -> Self { Self { secret } }

    pub fn issue(&self, email: &str) -> Result<String, FatalError> {
        self.issue_at(email, Utc::now())
    }

    /// Deterministic for a given email and clock reading.
    pub fn issue_at(&self, email: &str, now: DateTime<Utc>) -> Result<String, FatalError> {
        let claims = Claims {
            authorized: true,
            email: email.to_string(),
            exp: (now + TimeDelta::hours(TOKEN_LIFETIME_HOURS)).timestamp(),
        };
        let key = EncodingKey::from_secret(self.secret.as_bytes());
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &key)
            .map_err(|e| FatalError::SigningFailure(e.to_string()))
    }

    /// Returns the `email` claim of a valid, unexpired token.
    pub fn verify(&self, token: &str) -> Result<String, AuthError> {
        self.verify_at(token, Utc::now())
    }

    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<String, AuthError> {
        let mut parts = token.splitn(3, '.');
        let (Some(header_b64), Some(claims_b64), Some(sig)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(AuthError::MalformedClaims);
        };
        // A stray dot can only come from a damaged signature.
        if sig.contains('.') {
            return Err(AuthError::InvalidSignature);
        }

        let key = DecodingKey::from_secret(self.secret.as_bytes());
        let signed = &token[..header_b64.len() + 1 + claims_b64.len()];
        match jsonwebtoken::crypto::verify(sig, signed.as_bytes(), &key, Algorithm::HS256) {
            Ok(true) => {}
            _ => return Err(AuthError::InvalidSignature),
        }

        let claims = jsonwebtoken::decode::<Claims>(token, &key, &validation())
            .map_err(classify)?
            .claims;
        if claims.email.is_empty() {
            return Err(AuthError::MalformedClaims);
        }
        if claims.exp <= now.timestamp() {
            return Err(AuthError::Expired);
        }
        Ok(claims.email)
    }
}

// Expiry is checked against the caller's clock in `verify_at`, not the system clock.
fn validation() -> Validation {
    let mut v = Validation::new(Algorithm::HS256);
    v.leeway = 0;
    v.validate_exp = false;
    v.validate_aud = false;
    v.set_required_spec_claims(&["exp"]);
    v
}

fn classify(err: jsonwebtoken::errors::Error) -> AuthError {
    match err.kind() {
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::ExpiredSignature => AuthError::Expired,
        // Json, Base64, Utf8, InvalidToken, InvalidAlgorithm, MissingRequiredClaim, ...
        _ => AuthError::MalformedClaims,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use chrono::TimeZone;

    fn codec(secret: &str) -> TokenCodec {
        TokenCodec::new(SigningSecret::new(secret).unwrap())
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    // Sign an arbitrary header/claims pair with `secret`.
    fn forge(secret: &str, header: &str, claims: &str) -> String {
        let signing_input = format!("{}.{}", URL_SAFE_NO_PAD.encode(header), URL_SAFE_NO_PAD.encode(claims));
        let key = EncodingKey::from_secret(secret.as_bytes());
        let sig = jsonwebtoken::crypto::sign(signing_input.as_bytes(), &key, Algorithm::HS256).unwrap();
        format!("{}.{}", signing_input, sig)
    }

    #[test]
    fn round_trip_returns_email() {
        let c = codec("secret-a");
        for email in ["a@b.com", "first.last+tag@example.org", "Üser@example.com"] {
            let tok = c.issue(email).unwrap();
            assert_eq!(c.verify(&tok), Ok(email.to_string()));
        }
    }

    #[test]
    fn wire_shape() {
        let c = codec("secret-a");
        let tok = c.issue_at("a@b.com", t0()).unwrap();
        let segs: Vec<&str> = tok.split('.').collect();
        assert_eq!(segs.len(), 3);
        let header: serde_json::Value = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(segs[0]).unwrap()).unwrap();
        assert_eq!(header["alg"], "HS256");
        assert_eq!(header["typ"], "JWT");
        let claims: serde_json::Value = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(segs[1]).unwrap()).unwrap();
        assert_eq!(claims["email"], "a@b.com");
        assert_eq!(claims["authorized"], true);
        assert_eq!(claims["exp"], t0().timestamp() + 168 * 3600);
        // deterministic for the same clock reading
        assert_eq!(tok, c.issue_at("a@b.com", t0()).unwrap());
    }

    #[test]
    fn every_signature_bit_matters() {
        let c = codec("secret-a");
        let tok = c.issue_at("a@b.com", t0()).unwrap();
        let (signed, sig_b64) = tok.rsplit_once('.').unwrap();
        let sig = URL_SAFE_NO_PAD.decode(sig_b64).unwrap();
        for bit in 0..sig.len() * 8 {
            let mut flipped = sig.clone();
            flipped[bit / 8] ^= 1 << (bit % 8);
            let bad = format!("{}.{}", signed, URL_SAFE_NO_PAD.encode(&flipped));
            assert_eq!(c.verify_at(&bad, t0()), Err(AuthError::InvalidSignature), "bit {}", bit);
        }
    }

    #[test]
    fn every_signature_character_bit_matters() {
        let c = codec("secret-a");
        for i in 0..50 {
            let email = format!("user{}@example.com", i);
            let tok = c.issue_at(&email, t0() + TimeDelta::seconds(i)).unwrap();
            let (signed, sig) = tok.rsplit_once('.').unwrap();
            for pos in 0..sig.len() {
                // 7-bit flips keep the text ASCII; some land on '.', '=', '+' or control bytes.
                for bit in 0..7 {
                    let mut text = sig.as_bytes().to_vec();
                    text[pos] ^= 1 << bit;
                    let bad = format!("{}.{}", signed, String::from_utf8(text).unwrap());
                    assert_eq!(
                        c.verify_at(&bad, t0()),
                        Err(AuthError::InvalidSignature),
                        "token {} pos {} bit {}",
                        i,
                        pos,
                        bit
                    );
                }
            }
        }
    }

    #[test]
    fn edited_claims_fail_signature() {
        let c = codec("secret-a");
        let tok = c.issue_at("a@b.com", t0()).unwrap();
        let segs: Vec<&str> = tok.split('.').collect();
        let other = URL_SAFE_NO_PAD.encode(r#"{"authorized":true,"email":"admin@b.com","exp":9999999999}"#);
        let bad = format!("{}.{}.{}", segs[0], other, segs[2]);
        assert_eq!(c.verify_at(&bad, t0()), Err(AuthError::InvalidSignature));
    }

    #[test]
    fn expiry_boundary() {
        let c = codec("secret-a");
        let tok = c.issue_at("a@b.com", t0()).unwrap();
        let window = TimeDelta::hours(TOKEN_LIFETIME_HOURS);
        assert_eq!(c.verify_at(&tok, t0() + window - TimeDelta::seconds(1)), Ok("a@b.com".to_string()));
        assert_eq!(c.verify_at(&tok, t0() + window), Err(AuthError::Expired));
        assert_eq!(c.verify_at(&tok, t0() + window + TimeDelta::seconds(1)), Err(AuthError::Expired));
    }

    #[test]
    fn other_secret_rejects() {
        let a = codec("secret-a");
        let b = codec("secret-b");
        let tok = a.issue_at("a@b.com", t0()).unwrap();
        assert_eq!(b.verify_at(&tok, t0()), Err(AuthError::InvalidSignature));
    }

    #[test]
    fn expired_token_under_wrong_secret_reports_signature() {
        let a = codec("secret-a");
        let b = codec("secret-b");
        let tok = a.issue_at("a@b.com", t0()).unwrap();
        let later = t0() + TimeDelta::hours(TOKEN_LIFETIME_HOURS * 2);
        assert_eq!(b.verify_at(&tok, later), Err(AuthError::InvalidSignature));
        assert_eq!(a.verify_at(&tok, later), Err(AuthError::Expired));
    }

    #[test]
    fn structurally_bad_tokens() {
        let c = codec("secret-a");
        assert_eq!(c.verify(""), Err(AuthError::MalformedClaims));
        assert_eq!(c.verify("abc"), Err(AuthError::MalformedClaims));
        assert_eq!(c.verify("abc.def"), Err(AuthError::MalformedClaims));
        // anything past the second dot is signature text
        assert_eq!(c.verify("a.b.c.d"), Err(AuthError::InvalidSignature));
        assert_eq!(c.verify("abc.def.!!!"), Err(AuthError::InvalidSignature));
        assert_eq!(c.verify("abc.def.ghi"), Err(AuthError::InvalidSignature));
        assert_eq!(c.verify("abc.def."), Err(AuthError::InvalidSignature));
    }

    #[test]
    fn signed_but_malformed_claims_fail_closed() {
        let c = codec("secret-a");
        let hdr = r#"{"alg":"HS256","typ":"JWT"}"#;
        let future = t0().timestamp() + 3600;
        let missing_exp = forge("secret-a", hdr, r#"{"authorized":true,"email":"a@b.com"}"#);
        let missing_email = forge("secret-a", hdr, &format!(r#"{{"authorized":true,"exp":{}}}"#, future));
        let empty_email = forge("secret-a", hdr, &format!(r#"{{"authorized":true,"email":"","exp":{}}}"#, future));
        let wrong_type = forge("secret-a", hdr, &format!(r#"{{"authorized":true,"email":7,"exp":{}}}"#, future));
        let not_json = forge("secret-a", hdr, "nope");
        for tok in [missing_exp, missing_email, empty_email, wrong_type, not_json] {
            assert_eq!(c.verify_at(&tok, t0()), Err(AuthError::MalformedClaims), "{}", tok);
        }
        let claims = format!(r#"{{"authorized":true,"email":"a@b.com","exp":{}}}"#, future);
        let alg_none = forge("secret-a", r#"{"alg":"none"}"#, &claims);
        assert_eq!(c.verify_at(&alg_none, t0()), Err(AuthError::MalformedClaims));
        let alg_other = forge("secret-a", r#"{"alg":"HS512","typ":"JWT"}"#, &claims);
        assert_eq!(c.verify_at(&alg_other, t0()), Err(AuthError::MalformedClaims));
    }

    #[test]
    fn extra_claims_are_ignored() {
        let c = codec("secret-a");
        let future = t0().timestamp() + 3600;
        let tok = forge(
            "secret-a",
            r#"{"alg":"HS256","typ":"JWT"}"#,
            &format!(r#"{{"authorized":true,"email":"a@b.com","exp":{},"iat":1,"role":"admin"}}"#, future),
        );
        assert_eq!(c.verify_at(&tok, t0()), Ok("a@b.com".to_string()));
    }

    #[test]
    fn decode_errors_classify() {
        assert_eq!(classify(ErrorKind::InvalidSignature.into()), AuthError::InvalidSignature);
        assert_eq!(classify(ErrorKind::ExpiredSignature.into()), AuthError::Expired);
        assert_eq!(classify(ErrorKind::InvalidToken.into()), AuthError::MalformedClaims);
        assert_eq!(classify(ErrorKind::InvalidAlgorithm.into()), AuthError::MalformedClaims);
    }
}
