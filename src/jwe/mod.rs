//! JSON Web Encryption: encryption and decryption in every serialization.

mod decrypt;
mod encrypt;

pub use self::decrypt::{DecryptOptions, Decrypted, Decrypter};
pub use self::encrypt::{encrypt, EncryptOptions, Encrypter, Recipient, DEFAULT_CONTENT_ALG};

use std::io::{Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use serde_json::Value;

use crate::common::*;
use crate::error::*;

/// The only compression algorithm defined for JWE.
pub const ZIP_DEFLATE: &str = "DEF";

/// Upper bound on an inflated payload.
const MAX_INFLATED_LENGTH: u64 = 16 * 1024 * 1024;

pub(crate) fn check_zip(header: &Header) -> Result<bool, Error> {
    match header.get("zip") {
        None | Some(Value::Null) => Ok(false),
        Some(Value::String(zip)) if zip == ZIP_DEFLATE => Ok(true),
        Some(other) => bail!(JoseError::UnsupportedCompression(
            other.as_str().unwrap_or("?").to_string()
        )),
    }
}

pub(crate) fn deflate(data: &[u8]) -> Result<Vec<u8>, Error> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

pub(crate) fn inflate(data: &[u8]) -> Result<Vec<u8>, Error> {
    let mut inflated = Vec::new();
    DeflateDecoder::new(data)
        .take(MAX_INFLATED_LENGTH + 1)
        .read_to_end(&mut inflated)
        .map_err(|_| JoseError::InvalidParameter("zip".to_string()))?;
    ensure!(
        inflated.len() as u64 <= MAX_INFLATED_LENGTH,
        JoseError::InvalidParameter("zip".to_string())
    );
    Ok(inflated)
}

/// One recipient of a parsed JWE.
#[derive(Debug, Clone, Default)]
pub(crate) struct RawRecipient {
    pub header: Header,
    pub encrypted_key: Vec<u8>,
}

/// A parsed JWE in any serialization, normalized to the general shape.
#[derive(Debug, Clone)]
pub(crate) struct RawJwe {
    pub format: Format,
    pub protected_b64: String,
    pub protected: Header,
    pub unprotected: Header,
    pub recipients: Vec<RawRecipient>,
    pub aad_b64: Option<String>,
    pub iv: Vec<u8>,
    pub ciphertext: Vec<u8>,
    pub tag: Vec<u8>,
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

fn required_b64(object: &Header, name: &str) -> Result<Vec<u8>, Error> {
    let encoded = string_member(object, name)?.ok_or(JoseError::CompactEncodingError)?;
    b64_decode(encoded)
}

fn object_member(object: &Header, name: &str) -> Result<Header, Error> {
    match object.get(name) {
        None => Ok(Header::new()),
        Some(Value::Object(member)) => Ok(member.clone()),
        Some(_) => bail!(JoseError::CompactEncodingError),
    }
}

fn raw_recipient(object: &Header) -> Result<RawRecipient, Error> {
    let encrypted_key = match string_member(object, "encrypted_key")? {
        Some(encoded) => b64_decode(encoded)?,
        None => vec![],
    };
    Ok(RawRecipient {
        header: object_member(object, "header")?,
        encrypted_key,
    })
}

impl RawJwe {
    pub(crate) fn from_compact(input: &str, max_header_length: usize) -> Result<Self, Error> {
        let parts: Vec<&str> = input.split('.').collect();
        ensure!(parts.len() == 5, JoseError::CompactEncodingError);
        Ok(RawJwe {
            format: Format::Compact,
            protected: decode_protected(parts[0], max_header_length)?,
            protected_b64: parts[0].to_string(),
            unprotected: Header::new(),
            recipients: vec![RawRecipient {
                header: Header::new(),
                encrypted_key: b64_decode(parts[1])?,
            }],
            aad_b64: None,
            iv: b64_decode(parts[2])?,
            ciphertext: b64_decode(parts[3])?,
            tag: b64_decode(parts[4])?,
        })
    }

    pub(crate) fn from_json(input: &Value, max_header_length: usize) -> Result<Self, Error> {
        let object = input.as_object().ok_or(JoseError::CompactEncodingError)?;
        let protected_b64 = string_member(object, "protected")?.unwrap_or_default();
        let (format, recipients) = match object.get("recipients") {
            Some(Value::Array(recipients)) if !recipients.is_empty() => {
                let recipients = recipients
                    .iter()
                    .map(|r| raw_recipient(r.as_object().ok_or(JoseError::CompactEncodingError)?))
                    .collect::<Result<Vec<_>, Error>>()?;
                (Format::General, recipients)
            }
            Some(_) => bail!(JoseError::CompactEncodingError),
            None => (Format::Flattened, vec![raw_recipient(object)?]),
        };
        let aad_b64 = string_member(object, "aad")?.map(str::to_string);
        if let Some(aad_b64) = &aad_b64 {
            b64_decode(aad_b64)?;
        }
        Ok(RawJwe {
            format,
            protected: decode_protected(protected_b64, max_header_length)?,
            protected_b64: protected_b64.to_string(),
            unprotected: object_member(object, "unprotected")?,
            recipients,
            aad_b64,
            iv: required_b64(object, "iv")?,
            ciphertext: required_b64(object, "ciphertext")?,
            tag: required_b64(object, "tag")?,
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

    /// The bytes authenticated alongside the ciphertext.
    pub(crate) fn aad(&self) -> Vec<u8> {
        content_aad(&self.protected_b64, self.aad_b64.as_deref())
    }
}

pub(crate) fn content_aad(protected_b64: &str, aad_b64: Option<&str>) -> Vec<u8> {
    match aad_b64 {
        Some(aad_b64) => format!("{}.{}", protected_b64, aad_b64).into_bytes(),
        None => protected_b64.as_bytes().to_vec(),
    }
}
