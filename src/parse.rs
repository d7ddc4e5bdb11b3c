//! Serialization sniffing and one-call verification or decryption.

use std::sync::Arc;

use serde_json::Value;

use crate::common::*;
use crate::error::*;
use crate::header::JoseHeader;
use crate::jwe::{DecryptOptions, Decrypter, RawJwe};
use crate::jwk::Key;
use crate::jws::{RawJws, Verifier, VerifyOptions};
use crate::keystore::KeyStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Jws,
    Jwe,
}

impl Kind {
    pub fn name(&self) -> &'static str {
        match self {
            Kind::Jws => "JWS",
            Kind::Jwe => "JWE",
        }
    }
}

#[derive(Debug, Clone)]
enum Object {
    Jws(RawJws),
    Jwe(RawJwe),
}

/// A JWS or JWE whose structure has been checked but not its contents.
#[derive(Debug, Clone)]
pub struct Parsed {
    object: Object,
}

/// The result of [`Parsed::perform`] and the one-call helpers.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub header: Header,
    pub payload: Vec<u8>,
    pub key: Arc<Key>,
}

impl Parsed {
    pub fn kind(&self) -> Kind {
        match self.object {
            Object::Jws(_) => Kind::Jws,
            Object::Jwe(_) => Kind::Jwe,
        }
    }

    pub fn format(&self) -> Format {
        match &self.object {
            Object::Jws(jws) => jws.format,
            Object::Jwe(jwe) => jwe.format,
        }
    }

    /// Merged header of every signature or recipient, unverified.
    pub fn headers(&self) -> Vec<Header> {
        match &self.object {
            Object::Jws(jws) => jws
                .signatures
                .iter()
                .map(|s| JoseHeader::merge([&s.protected, &s.header]))
                .collect(),
            Object::Jwe(jwe) => jwe
                .recipients
                .iter()
                .map(|r| JoseHeader::merge([&jwe.protected, &jwe.unprotected, &r.header]))
                .collect(),
        }
    }

    /// Verifies or decrypts with the keys of `store`.
    pub fn perform(&self, store: &KeyStore) -> Result<Outcome, Error> {
        match &self.object {
            Object::Jws(jws) => {
                let verified = Verifier::new(store.clone()).verify_raw(jws)?;
                Ok(Outcome {
                    header: verified.header,
                    payload: verified.payload,
                    key: verified.key,
                })
            }
            Object::Jwe(jwe) => {
                let decrypted = Decrypter::new(store.clone()).decrypt_raw(jwe)?;
                Ok(Outcome {
                    header: decrypted.header,
                    payload: decrypted.payload,
                    key: decrypted.key,
                })
            }
        }
    }
}

/// Recognizes compact (three parts for JWS, five for JWE) or JSON text.
pub fn parse(input: &str) -> Result<Parsed, Error> {
    let trimmed = input.trim();
    if trimmed.starts_with('{') {
        let json: Value =
            serde_json::from_str(trimmed).map_err(|_| JoseError::CompactEncodingError)?;
        return parse_json(&json);
    }
    let object = match trimmed.split('.').count() {
        3 => Object::Jws(RawJws::from_compact(trimmed, MAX_HEADER_LENGTH)?),
        5 => Object::Jwe(RawJwe::from_compact(trimmed, MAX_HEADER_LENGTH)?),
        _ => bail!(JoseError::CompactEncodingError),
    };
    Ok(Parsed { object })
}

/// Recognizes a JSON serialization by its `signature(s)` or `ciphertext` member.
pub fn parse_json(input: &Value) -> Result<Parsed, Error> {
    let object = input.as_object().ok_or(JoseError::CompactEncodingError)?;
    let object = if object.contains_key("signatures") || object.contains_key("signature") {
        Object::Jws(RawJws::from_json(input, MAX_HEADER_LENGTH)?)
    } else if object.contains_key("ciphertext") {
        Object::Jwe(RawJwe::from_json(input, MAX_HEADER_LENGTH)?)
    } else {
        bail!(JoseError::CompactEncodingError)
    };
    Ok(Parsed { object })
}

/// Verifies a compact or JSON JWS against `store`.
pub fn verify_compact_or_json(
    input: &str,
    store: &KeyStore,
    options: VerifyOptions,
) -> Result<Outcome, Error> {
    let verified = Verifier::new(store.clone())
        .with_options(options)
        .verify(input)?;
    Ok(Outcome {
        header: verified.header,
        payload: verified.payload,
        key: verified.key,
    })
}

/// Decrypts a compact or JSON JWE with the keys of `store`.
pub fn decrypt_compact_or_json(
    input: &str,
    store: &KeyStore,
    options: DecryptOptions,
) -> Result<Outcome, Error> {
    let decrypted = Decrypter::new(store.clone())
        .with_options(options)
        .decrypt(input)?;
    Ok(Outcome {
        header: decrypted.header,
        payload: decrypted.payload,
        key: decrypted.key,
    })
}
