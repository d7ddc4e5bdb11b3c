//! JSON Web Signature: signing and verification in every serialization.

mod sign;
mod verify;

pub use self::sign::{sign, SignOptions, Signatory, Signer};
pub use crate::header::KeyReference;
pub use self::verify::{Verified, Verifier, VerifyOptions};

use serde_json::Value;

use crate::common::*;
use crate::error::*;

/// One signature of a parsed JWS, still encoded.
#[derive(Debug, Clone)]
pub(crate) struct RawSignature {
    pub protected_b64: String,
    pub protected: Header,
    pub header: Header,
    pub signature: Vec<u8>,
}

/// A parsed JWS in any serialization, normalized to the general shape.
#[derive(Debug, Clone)]
pub(crate) struct RawJws {
    pub format: Format,
    pub payload_b64: String,
    pub signatures: Vec<RawSignature>,
}

fn decode_protected(protected_b64: &str, max_header_length: usize) -> Result<Header, Error> {
    ensure!(
        protected_b64.len() <= max_header_length,
        JoseError::HeaderTooLarge
    );
    if protected_b64.is_empty() {
        return Ok(Header::new());
    }
    decode_json_part(protected_b64)
}

fn string_member<'v>(object: &'v Header, name: &str) -> Result<Option<&'v str>, Error> {
    match object.get(name) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => bail!(JoseError::CompactEncodingError),
    }
}

fn header_member(object: &Header) -> Result<Header, Error> {
    match object.get("header") {
        None => Ok(Header::new()),
        Some(Value::Object(header)) => Ok(header.clone()),
        Some(_) => bail!(JoseError::CompactEncodingError),
    }
}

fn raw_signature(object: &Header, max_header_length: usize) -> Result<RawSignature, Error> {
    let protected_b64 = string_member(object, "protected")?.unwrap_or_default();
    let signature = string_member(object, "signature")?.ok_or(JoseError::CompactEncodingError)?;
    Ok(RawSignature {
        protected: decode_protected(protected_b64, max_header_length)?,
        protected_b64: protected_b64.to_string(),
        header: header_member(object)?,
        signature: b64_decode(signature)?,
    })
}

impl RawJws {
    pub(crate) fn from_compact(input: &str, max_header_length: usize) -> Result<Self, Error> {
        let parts: Vec<&str> = input.split('.').collect();
        ensure!(parts.len() == 3, JoseError::CompactEncodingError);
        Ok(RawJws {
            format: Format::Compact,
            payload_b64: parts[1].to_string(),
            signatures: vec![RawSignature {
                protected: decode_protected(parts[0], max_header_length)?,
                protected_b64: parts[0].to_string(),
                header: Header::new(),
                signature: b64_decode(parts[2])?,
            }],
        })
    }

    pub(crate) fn from_json(input: &Value, max_header_length: usize) -> Result<Self, Error> {
        let object = input.as_object().ok_or(JoseError::CompactEncodingError)?;
        let payload_b64 = string_member(object, "payload")?
            .ok_or(JoseError::CompactEncodingError)?
            .to_string();
        if object.contains_key("signature") {
            return Ok(RawJws {
                format: Format::Flattened,
                payload_b64,
                signatures: vec![raw_signature(object, max_header_length)?],
            });
        }
        let signatures = object
            .get("signatures")
            .and_then(Value::as_array)
            .filter(|signatures| !signatures.is_empty())
            .ok_or(JoseError::CompactEncodingError)?
            .iter()
            .map(|s| {
                let s = s.as_object().ok_or(JoseError::CompactEncodingError)?;
                raw_signature(s, max_header_length)
            })
            .collect::<Result<Vec<_>, Error>>()?;
        Ok(RawJws {
            format: Format::General,
            payload_b64,
            signatures,
        })
    }

    /// Sniffs compact versus JSON text.
    pub(crate) fn parse(input: &str, max_header_length: usize) -> Result<Self, Error> {
        let trimmed = input.trim();
        if trimmed.starts_with('{') {
            let json: Value =
                serde_json::from_str(trimmed).map_err(|_| JoseError::CompactEncodingError)?;
            return Self::from_json(&json, max_header_length);
        }
        Self::from_compact(trimmed, max_header_length)
    }
}
