//! Signed-query codec.
//!
//! Canonicalizes, signs, verifies, shortens and unshortens the query strings
//! used for remote (signed) URL creation. The canonical payload must be
//! byte-for-byte deterministic: two callers building the same logical query in
//! different field order have to produce an identical payload, and therefore an
//! identical signature, or interoperability with existing clients breaks.
//!
//! Everything here is a pure function; malformed input is reported through
//! typed errors, never side effects.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};

use crate::{LnurlError, Result};

/// An HTTP query as an ordered list of key/value pairs.
pub type Query = Vec<(String, String)>;

/// The query field carrying the signature; excluded from the signed payload.
pub const SIGNATURE_KEY: &str = "signature";

/// Signature algorithms accepted for signed queries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignatureAlgorithm {
    /// HMAC-SHA256 (protocol default).
    #[default]
    HmacSha256,
    /// HMAC-SHA512.
    HmacSha512,
}

/// Look up the first value for `key` in a query.
pub fn get<'a>(query: &'a [(String, String)], key: &str) -> Option<&'a str> {
    query
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// SHA-256 of a UTF-8 string, as lowercase hex.
///
/// Used for secret hashing and signed-creation secret derivation.
pub fn hash(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// The canonical signing payload: all pairs except `signature`, sorted by key
/// (ASCII ascending), form-url-encoded.
pub fn canonical_payload(query: &[(String, String)]) -> String {
    let mut pairs: Vec<&(String, String)> =
        query.iter().filter(|(k, _)| k != SIGNATURE_KEY).collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", form_encode(k), form_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Sign a canonical payload with an API key secret. Returns lowercase hex.
pub fn sign(payload: &str, secret: &[u8], algorithm: SignatureAlgorithm) -> Result<String> {
    let digest = match algorithm {
        SignatureAlgorithm::HmacSha256 => {
            let mut mac = Hmac::<Sha256>::new_from_slice(secret)
                .map_err(|e| LnurlError::Configuration(format!("invalid HMAC key: {}", e)))?;
            mac.update(payload.as_bytes());
            hex::encode(mac.finalize().into_bytes())
        }
        SignatureAlgorithm::HmacSha512 => {
            let mut mac = Hmac::<Sha512>::new_from_slice(secret)
                .map_err(|e| LnurlError::Configuration(format!("invalid HMAC key: {}", e)))?;
            mac.update(payload.as_bytes());
            hex::encode(mac.finalize().into_bytes())
        }
    };
    Ok(digest)
}

/// Verify the `signature` field of a query against an API key secret.
///
/// Recomputes the canonical payload (without `signature`) and compares digests
/// in constant time. Returns `false` for any malformed input; presence of the
/// required signed-query fields is a precondition checked by the caller.
pub fn verify(query: &[(String, String)], secret: &[u8], algorithm: SignatureAlgorithm) -> bool {
    let Some(signature) = get(query, SIGNATURE_KEY) else {
        return false;
    };
    let Ok(signature_bytes) = hex::decode(signature) else {
        return false;
    };
    let payload = canonical_payload(query);
    match algorithm {
        SignatureAlgorithm::HmacSha256 => {
            let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret) else {
                return false;
            };
            mac.update(payload.as_bytes());
            mac.verify_slice(&signature_bytes).is_ok()
        }
        SignatureAlgorithm::HmacSha512 => {
            let Ok(mut mac) = Hmac::<Sha512>::new_from_slice(secret) else {
                return false;
            };
            mac.update(payload.as_bytes());
            mac.verify_slice(&signature_bytes).is_ok()
        }
    }
}

// Fixed shortening tables. These are part of the wire format; changing them
// breaks every deployed client.

const QUERY_KEY_CODES: &[(&str, &str)] = &[("nonce", "n"), ("signature", "s"), ("tag", "t")];

const TAG_CODES: &[(&str, &str)] = &[
    ("channelRequest", "c"),
    ("login", "l"),
    ("payRequest", "p"),
    ("withdrawRequest", "w"),
];

fn param_codes(tag: &str) -> &'static [(&'static str, &'static str)] {
    match tag {
        "channelRequest" => &[("localAmt", "pl"), ("pushAmt", "pp")],
        "payRequest" => &[
            ("minSendable", "pn"),
            ("maxSendable", "px"),
            ("metadata", "pm"),
        ],
        "withdrawRequest" => &[
            ("minWithdrawable", "pn"),
            ("maxWithdrawable", "px"),
            ("defaultDescription", "pd"),
        ],
        _ => &[],
    }
}

fn forward(table: &'static [(&'static str, &'static str)], key: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(long, _)| *long == key)
        .map(|(_, short)| *short)
}

fn reverse(table: &'static [(&'static str, &'static str)], key: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(_, short)| *short == key)
        .map(|(long, _)| *long)
}

/// The full-form tag value of a query, whichever form the query is in.
fn full_tag(query: &[(String, String)]) -> Option<String> {
    let value = get(query, "tag").or_else(|| get(query, "t"))?;
    Some(
        reverse(TAG_CODES, value)
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
    )
}

/// Apply the shortening table: single/double-letter codes for the top-level
/// fields, the tag value, and the current tag's parameter names. Unmapped keys
/// pass through unchanged.
pub fn shorten(query: &[(String, String)]) -> Query {
    let tag = full_tag(query).unwrap_or_default();
    let params = param_codes(&tag);
    query
        .iter()
        .map(|(k, v)| {
            if k == "tag" || k == "t" {
                let code = forward(TAG_CODES, v).map(str::to_string);
                return ("t".to_string(), code.unwrap_or_else(|| v.clone()));
            }
            let key = forward(QUERY_KEY_CODES, k)
                .or_else(|| forward(params, k))
                .map(str::to_string)
                .unwrap_or_else(|| k.clone());
            (key, v.clone())
        })
        .collect()
}

/// Invert [`shorten`]. `unshorten(shorten(q)) == q` for any query restricted to
/// mappable keys; unknown keys round-trip as-is.
pub fn unshorten(query: &[(String, String)]) -> Query {
    let tag = full_tag(query).unwrap_or_default();
    let params = param_codes(&tag);
    query
        .iter()
        .map(|(k, v)| {
            if k == "tag" || k == "t" {
                return ("tag".to_string(), tag.clone());
            }
            let key = reverse(QUERY_KEY_CODES, k)
                .or_else(|| reverse(params, k))
                .map(str::to_string)
                .unwrap_or_else(|| k.clone());
            (key, v.clone())
        })
        .collect()
}

/// Percent-encode with the `encodeURIComponent` unreserved set, matching the
/// payloads produced by existing clients. Space becomes `%20`, not `+`.
fn form_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'-'
            | b'_'
            | b'.'
            | b'!'
            | b'~'
            | b'*'
            | b'\''
            | b'('
            | b')' => out.push(byte as char),
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> Query {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_hash_known_vector() {
        assert_eq!(
            hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_canonical_payload_sorts_and_excludes_signature() {
        let q = query(&[
            ("tag", "withdrawRequest"),
            ("id", "key1"),
            ("signature", "deadbeef"),
            ("nonce", "xyz"),
        ]);
        assert_eq!(
            canonical_payload(&q),
            "id=key1&nonce=xyz&tag=withdrawRequest"
        );
    }

    #[test]
    fn test_canonical_payload_encodes_values() {
        let q = query(&[("defaultDescription", "coffee & cake")]);
        assert_eq!(
            canonical_payload(&q),
            "defaultDescription=coffee%20%26%20cake"
        );
    }

    #[test]
    fn test_signature_invariant_under_permutation() {
        let secret = b"super-secret";
        let a = query(&[("id", "k"), ("nonce", "1"), ("tag", "login")]);
        let b = query(&[("tag", "login"), ("id", "k"), ("nonce", "1")]);
        let sig_a = sign(&canonical_payload(&a), secret, SignatureAlgorithm::HmacSha256).unwrap();
        let sig_b = sign(&canonical_payload(&b), secret, SignatureAlgorithm::HmacSha256).unwrap();
        assert_eq!(sig_a, sig_b);
        assert_eq!(sig_a.len(), 64);
        assert_eq!(sig_a, sig_a.to_lowercase());
    }

    #[test]
    fn test_verify_and_tamper_detection() {
        let secret = b"super-secret";
        let mut q = query(&[
            ("id", "k"),
            ("nonce", "1"),
            ("tag", "withdrawRequest"),
            ("minWithdrawable", "1000"),
        ]);
        let sig = sign(&canonical_payload(&q), secret, SignatureAlgorithm::HmacSha256).unwrap();
        q.push((SIGNATURE_KEY.to_string(), sig));
        assert!(verify(&q, secret, SignatureAlgorithm::HmacSha256));

        // Mutating any signed field breaks verification.
        for idx in 0..4 {
            let mut tampered = q.clone();
            tampered[idx].1.push('x');
            assert!(!verify(&tampered, secret, SignatureAlgorithm::HmacSha256));
        }
        assert!(!verify(&q, b"other-secret", SignatureAlgorithm::HmacSha256));
    }

    #[test]
    fn test_verify_tolerates_malformed_input() {
        let secret = b"s";
        // No signature field.
        assert!(!verify(&query(&[("id", "k")]), secret, SignatureAlgorithm::HmacSha256));
        // Signature is not hex.
        let q = query(&[("id", "k"), ("signature", "not-hex!")]);
        assert!(!verify(&q, secret, SignatureAlgorithm::HmacSha256));
    }

    #[test]
    fn test_shorten_withdraw() {
        let q = query(&[
            ("id", "key1"),
            ("nonce", "abc"),
            ("tag", "withdrawRequest"),
            ("minWithdrawable", "1000"),
            ("maxWithdrawable", "2000"),
            ("defaultDescription", ""),
            ("signature", "feed"),
        ]);
        let short = shorten(&q);
        assert_eq!(
            short,
            query(&[
                ("id", "key1"),
                ("n", "abc"),
                ("t", "w"),
                ("pn", "1000"),
                ("px", "2000"),
                ("pd", ""),
                ("s", "feed"),
            ])
        );
    }

    #[test]
    fn test_roundtrip_every_tag() {
        let cases: Vec<Query> = vec![
            query(&[
                ("id", "k"),
                ("nonce", "n1"),
                ("tag", "channelRequest"),
                ("localAmt", "2000"),
                ("pushAmt", "0"),
                ("signature", "aa"),
            ]),
            query(&[
                ("id", "k"),
                ("nonce", "n2"),
                ("tag", "payRequest"),
                ("minSendable", "1000"),
                ("maxSendable", "5000"),
                ("metadata", "[[\"text/plain\",\"x\"]]"),
                ("signature", "bb"),
            ]),
            query(&[
                ("id", "k"),
                ("nonce", "n3"),
                ("tag", "withdrawRequest"),
                ("minWithdrawable", "1000"),
                ("maxWithdrawable", "2000"),
                ("defaultDescription", "d"),
                ("signature", "cc"),
            ]),
            query(&[("id", "k"), ("nonce", "n4"), ("tag", "login"), ("signature", "dd")]),
        ];
        for q in cases {
            assert_eq!(unshorten(&shorten(&q)), q);
        }
    }

    #[test]
    fn test_unknown_keys_pass_through() {
        let q = query(&[("tag", "payRequest"), ("custom", "1"), ("pn", "9")]);
        let short = shorten(&q);
        assert!(short.contains(&("custom".to_string(), "1".to_string())));
        // "pn" is already a short code; shorten leaves it alone, unshorten maps it.
        let long = unshorten(&short);
        assert!(long.contains(&("minSendable".to_string(), "9".to_string())));
        assert!(long.contains(&("custom".to_string(), "1".to_string())));
    }

    #[test]
    fn test_unshorten_full_form_is_identity() {
        let q = query(&[
            ("id", "k"),
            ("nonce", "n"),
            ("tag", "withdrawRequest"),
            ("minWithdrawable", "1"),
        ]);
        assert_eq!(unshorten(&q), q);
    }
}
