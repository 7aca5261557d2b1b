use actix_web::{http::header::HeaderValue, HttpRequest};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::num::ParseIntError;

use crate::schemas::MemberId;

type HmacSha256 = Hmac<Sha256>;

/// The authenticated caller of a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Requester {
    pub member: MemberId,
}

/// Signs member tokens of the form `<member>.<hex hmac>`.
#[derive(Clone)]
pub struct TokenSigner {
    key: Vec<u8>,
}

impl TokenSigner {
    pub fn new(secret: &str) -> Self {
        let mut sha256_hasher = Sha256::new();
        sha256_hasher.update(secret.as_bytes());
        TokenSigner {
            key: sha256_hasher.finalize().to_vec(),
        }
    }

    pub fn issue_token(&self, member: &str) -> String {
        let signature = to_hex(&keyed_mac(&self.key, member.as_bytes()).finalize().into_bytes());
        format!("{member}.{signature}")
    }

    pub fn verify(&self, token: &str) -> Option<Requester> {
        let (member, signature) = token.rsplit_once('.')?;
        if member.is_empty() {
            return None;
        }
        let signature = from_hex(signature)?;
        keyed_mac(&self.key, member.as_bytes())
            .verify_slice(&signature)
            .ok()?;
        Some(Requester {
            member: member.to_string(),
        })
    }
}

const SALT_LEN: usize = 16;

/// Salted HMAC-SHA256 of `password`, stored as `<hex salt>$<hex digest>`.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let digest = keyed_mac(&salt, password.as_bytes()).finalize().into_bytes();
    format!("{}${}", to_hex(&salt), to_hex(&digest))
}

/// Checks `password` against a value produced by [`hash_password`]. Malformed
/// hashes never match.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt, digest)) = stored.split_once('$') else {
        return false;
    };
    match (from_hex(salt), from_hex(digest)) {
        (Some(salt), Some(digest)) if salt.len() == SALT_LEN => keyed_mac(&salt, password.as_bytes())
            .verify_slice(&digest)
            .is_ok(),
        _ => false,
    }
}

fn keyed_mac(key: &[u8], message: &[u8]) -> HmacSha256 {
    let mut hmac_hasher = HmacSha256::new_from_slice(key).expect("hmac takes keys of any size");
    hmac_hasher.update(message);
    hmac_hasher
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn from_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.is_empty() || hex.len() % 2 != 0 {
        return None;
    }
    hex.chars()
        .collect::<Vec<_>>()
        .chunks(2)
        .map(|n| u8::from_str_radix(&String::from_iter(n), 16))
        .collect::<Result<Vec<u8>, ParseIntError>>()
        .ok()
}

/// Reads `Authorization: Bearer <token>` and checks its signature.
pub fn authenticate(request: &HttpRequest, signer: &TokenSigner) -> Option<Requester> {
    let authorization = request
        .headers()
        .get(actix_web::http::header::AUTHORIZATION)
        .map(HeaderValue::to_str)?
        .ok()?;
    let token = authorization.strip_prefix("Bearer ")?;
    signer.verify(token.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn issued_tokens_verify() {
        let signer = TokenSigner::new("s3cret");
        let token = signer.issue_token("alice");
        assert!(token.starts_with("alice."));
        assert_eq!(
            signer.verify(&token),
            Some(Requester {
                member: "alice".to_string()
            })
        );
    }

    #[test]
    fn tampered_tokens_fail() {
        let signer = TokenSigner::new("s3cret");
        let token = signer.issue_token("alice");
        let forged = token.replacen("alice", "mallory", 1);
        assert_eq!(signer.verify(&forged), None);
        assert_eq!(TokenSigner::new("other").verify(&token), None);
        assert_eq!(signer.verify("alice"), None);
        assert_eq!(signer.verify("alice.zz"), None);
        assert_eq!(signer.verify(".abcd"), None);
    }

    #[test]
    fn passwords_verify_against_their_hash() {
        let stored = hash_password("correct horse");
        assert!(verify_password("correct horse", &stored));
        assert!(!verify_password("correct horse ", &stored));
        assert!(!verify_password("", &stored));

        // Same password, fresh salt.
        let again = hash_password("correct horse");
        assert_ne!(stored, again);
        assert!(verify_password("correct horse", &again));

        assert!(!verify_password("correct horse", ""));
        assert!(!verify_password("correct horse", "nodollar"));
        assert!(!verify_password("correct horse", "zz$zz"));
    }

    #[test]
    fn reads_bearer_header() {
        let signer = TokenSigner::new("s3cret");
        let token = signer.issue_token("bob");
        let request = TestRequest::default()
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_http_request();
        assert_eq!(authenticate(&request, &signer).map(|r| r.member), Some("bob".to_string()));

        let request = TestRequest::default()
            .insert_header(("Authorization", token))
            .to_http_request();
        assert_eq!(authenticate(&request, &signer), None);
        assert_eq!(authenticate(&TestRequest::default().to_http_request(), &signer), None);
    }
}
