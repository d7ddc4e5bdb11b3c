use ct_codecs::{Base64UrlSafeNoPadding, Decoder, Encoder};
use serde_json::{Map, Value};

use crate::error::*;

/// A JOSE header: an unordered set of named members.
pub type Header = Map<String, Value>;

/// Maximum length of a base64url-encoded protected header accepted by default.
pub const MAX_HEADER_LENGTH: usize = 8192;

/// Largest PBES2 iteration count (`p2c`) accepted on decryption by default.
pub const MAX_PBES2_COUNT: u32 = 1_000_000;

/// Wire encoding of a JWS or JWE object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// Dot-separated base64url parts; a single signatory or recipient.
    Compact,
    /// JSON with the single signature or recipient inlined.
    Flattened,
    /// JSON with a `signatures` or `recipients` array.
    #[default]
    General,
}

impl Format {
    pub fn name(&self) -> &'static str {
        match self {
            Format::Compact => "compact",
            Format::Flattened => "flattened",
            Format::General => "general",
        }
    }
}

/// Which header members end up integrity protected.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Protect {
    /// Every header member ("*").
    #[default]
    All,
    /// Only the named members.
    Fields(Vec<String>),
}

impl Protect {
    pub fn none() -> Self {
        Protect::Fields(vec![])
    }

    pub fn fields<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Protect::Fields(names.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, name: &str) -> bool {
        match self {
            Protect::All => true,
            Protect::Fields(names) => names.iter().any(|n| n == name),
        }
    }
}

/// A serialized JWS or JWE object.
#[derive(Debug, Clone, PartialEq)]
pub enum Serialized {
    Compact(String),
    Json(Value),
}

impl Serialized {
    pub fn as_compact(&self) -> Option<&str> {
        match self {
            Serialized::Compact(s) => Some(s),
            Serialized::Json(_) => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Serialized::Json(v) => Some(v),
            Serialized::Compact(_) => None,
        }
    }
}

impl std::fmt::Display for Serialized {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Serialized::Compact(s) => f.write_str(s),
            Serialized::Json(v) => write!(f, "{}", v),
        }
    }
}

pub(crate) fn b64_encode(bin: impl AsRef<[u8]>) -> Result<String, Error> {
    Ok(Base64UrlSafeNoPadding::encode_to_string(bin)?)
}

pub(crate) fn b64_decode(encoded: &str) -> Result<Vec<u8>, Error> {
    Base64UrlSafeNoPadding::decode_to_vec(encoded, None)
        .map_err(|_| JoseError::CompactEncodingError.into())
}

/// Decodes a base64url header member, failing with `InvalidParameter` naming the member.
pub(crate) fn b64_member(header: &Header, name: &str) -> Result<Option<Vec<u8>>, Error> {
    match header.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Base64UrlSafeNoPadding::decode_to_vec(s, None)
            .map(Some)
            .map_err(|_| JoseError::InvalidParameter(name.to_string()).into()),
        Some(_) => bail!(JoseError::InvalidParameter(name.to_string())),
    }
}

pub(crate) fn decode_json_part(encoded: &str) -> Result<Header, Error> {
    let raw = b64_decode(encoded)?;
    match serde_json::from_slice::<Value>(&raw) {
        Ok(Value::Object(map)) => Ok(map),
        _ => bail!(JoseError::CompactEncodingError),
    }
}

/// Constant-time comparison; lengths are not secret.
#[inline(never)]
pub(crate) fn timingsafe_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && ct_codecs::verify(a, b)
}
