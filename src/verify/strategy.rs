// src/verify/strategy.rs
//! Verification schemes. Each provider maps to one strategy instance; adding a
//! Git host means adding a row to the table in `strategy_for`.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;

use super::{Credentials, VerificationFailure};

type HmacSha256 = Hmac<Sha256>;
type HmacSha1 = Hmac<Sha1>;

pub trait VerificationStrategy: Send + Sync {
    /// Check `credentials` against `secret` over the exact `raw_body` bytes.
    fn check(
        &self,
        raw_body: &[u8],
        credentials: &Credentials<'_>,
        secret: &str,
    ) -> Result<(), VerificationFailure>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Sha1,
    Sha256,
}

/// One header that may carry a digest. `prefix` (e.g. `sha256=`) is mandatory when set.
#[derive(Debug, Clone, Copy)]
pub struct SignatureHeader {
    pub name: &'static str,
    pub algorithm: Algorithm,
    pub prefix: Option<&'static str>,
}

/// HMAC over the raw body; the first listed header present wins.
#[derive(Debug, Clone)]
pub struct HmacStrategy {
    headers: &'static [SignatureHeader],
}

impl HmacStrategy {
    pub const fn new(headers: &'static [SignatureHeader]) -> Self {
        Self { headers }
    }
}

impl VerificationStrategy for HmacStrategy {
    fn check(
        &self,
        raw_body: &[u8],
        credentials: &Credentials<'_>,
        secret: &str,
    ) -> Result<(), VerificationFailure> {
        let found = self
            .headers
            .iter()
            .find_map(|h| credentials.header(h.name).map(|v| (h, v)));
        let Some((spec, value)) = found else {
            let expected = self.headers.first().map(|h| h.name).unwrap_or("signature");
            return Err(VerificationFailure::MissingSignatureHeader(expected));
        };

        let hex_sig = match spec.prefix {
            Some(prefix) => value
                .strip_prefix(prefix)
                .ok_or(VerificationFailure::SignatureMismatch)?,
            None => value,
        };
        let claimed = parse_hex_signature(hex_sig).ok_or(VerificationFailure::SignatureMismatch)?;

        if verify_hmac(spec.algorithm, secret.as_bytes(), raw_body, &claimed) {
            Ok(())
        } else {
            Err(VerificationFailure::SignatureMismatch)
        }
    }
}

/// Shared token compared verbatim, from a header or (optionally) a query parameter.
#[derive(Debug, Clone)]
pub struct TokenStrategy {
    header: &'static str,
    query_param: Option<&'static str>,
}

impl TokenStrategy {
    pub const fn new(header: &'static str, query_param: Option<&'static str>) -> Self {
        Self {
            header,
            query_param,
        }
    }
}

impl VerificationStrategy for TokenStrategy {
    fn check(
        &self,
        _raw_body: &[u8],
        credentials: &Credentials<'_>,
        secret: &str,
    ) -> Result<(), VerificationFailure> {
        let token = credentials
            .header(self.header)
            .or_else(|| self.query_param.and_then(|q| credentials.query(q)))
            .ok_or(VerificationFailure::MissingSignatureHeader(self.header))?;

        if constant_time_eq(token.trim().as_bytes(), secret.as_bytes()) {
            Ok(())
        } else {
            Err(VerificationFailure::SignatureMismatch)
        }
    }
}

/// Hex digest (upper or lower case) to bytes; `None` on malformed input.
pub fn parse_hex_signature(s: &str) -> Option<Vec<u8>> {
    hex::decode(s.trim()).ok()
}

pub fn compute_hmac(algorithm: Algorithm, secret: &[u8], payload: &[u8]) -> Vec<u8> {
    match algorithm {
        Algorithm::Sha256 => {
            let mut mac =
                HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
            mac.update(payload);
            mac.finalize().into_bytes().to_vec()
        }
        Algorithm::Sha1 => {
            let mut mac = HmacSha1::new_from_slice(secret).expect("HMAC can take key of any size");
            mac.update(payload);
            mac.finalize().into_bytes().to_vec()
        }
    }
}

/// Constant-time via the HMAC library.
fn verify_hmac(algorithm: Algorithm, secret: &[u8], payload: &[u8], claimed: &[u8]) -> bool {
    match algorithm {
        Algorithm::Sha256 => match HmacSha256::new_from_slice(secret) {
            Ok(mut mac) => {
                mac.update(payload);
                mac.verify_slice(claimed).is_ok()
            }
            Err(_) => false,
        },
        Algorithm::Sha1 => match HmacSha1::new_from_slice(secret) {
            Ok(mut mac) => {
                mac.update(payload);
                mac.verify_slice(claimed).is_ok()
            }
            Err(_) => false,
        },
    }
}

/// Length leaks; content does not.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_basics() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secret1"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn hex_parsing_rejects_garbage() {
        assert_eq!(parse_hex_signature("1234abcd"), Some(vec![0x12, 0x34, 0xab, 0xcd]));
        assert_eq!(parse_hex_signature("ABCD"), Some(vec![0xab, 0xcd]));
        assert_eq!(parse_hex_signature("abc"), None);
        assert_eq!(parse_hex_signature("xyz0"), None);
    }

    #[test]
    fn digest_lengths_match_algorithm() {
        assert_eq!(compute_hmac(Algorithm::Sha256, b"k", b"p").len(), 32);
        assert_eq!(compute_hmac(Algorithm::Sha1, b"k", b"p").len(), 20);
    }
}
