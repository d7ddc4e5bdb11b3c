use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::*;
use crate::error::*;
use crate::jwk::{Key, KeyMaterial};

/// Typed view over a merged JWS or JWE header.
///
/// Members not listed here are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JoseHeader {
    /// Signature or key management algorithm
    #[serde(rename = "alg", default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,

    /// Content encryption algorithm (JWE only)
    #[serde(rename = "enc", default, skip_serializing_if = "Option::is_none")]
    pub encryption: Option<String>,

    #[serde(rename = "zip", default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<String>,

    #[serde(
        rename = "kid",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "string_or_number"
    )]
    pub key_id: Option<String>,

    #[serde(rename = "typ", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,

    #[serde(rename = "cty", default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// Extension members the recipient must understand
    #[serde(rename = "crit", default, skip_serializing_if = "Option::is_none")]
    pub critical: Option<Vec<String>>,

    /// Embedded public JWK
    #[serde(rename = "jwk", default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<Value>,

    /// X.509 certificate chain, leaf first, standard base64 DER
    #[serde(rename = "x5c", default, skip_serializing_if = "Option::is_none")]
    pub certificate_chain: Option<Vec<String>>,

    #[serde(rename = "x5t", default, skip_serializing_if = "Option::is_none")]
    pub certificate_sha1_thumbprint: Option<String>,

    #[serde(rename = "x5t#S256", default, skip_serializing_if = "Option::is_none")]
    pub certificate_sha256_thumbprint: Option<String>,

    #[serde(rename = "x5u", default, skip_serializing_if = "Option::is_none")]
    pub certificate_url: Option<String>,

    #[serde(rename = "jku", default, skip_serializing_if = "Option::is_none")]
    pub key_set_url: Option<String>,

    #[serde(flatten)]
    pub extra: Header,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(_) => Err(serde::de::Error::custom("kid must be a string")),
    }
}

impl JoseHeader {
    /// Parses a header map, validating the types of registered members.
    pub fn from_header(header: &Header) -> Result<Self, Error> {
        serde_json::from_value(Value::Object(header.clone()))
            .map_err(|e| JoseError::InvalidParameter(format!("header: {}", e)).into())
    }

    /// Merges header layers; members of earlier layers win.
    pub fn merge<'a>(layers: impl IntoIterator<Item = &'a Header>) -> Header {
        let mut merged = Header::new();
        for layer in layers {
            for (name, value) in layer {
                merged.entry(name.clone()).or_insert_with(|| value.clone());
            }
        }
        merged
    }

    /// The `alg` member, required everywhere.
    pub fn alg(&self) -> Result<&str, Error> {
        self.algorithm
            .as_deref()
            .ok_or_else(|| JoseError::InvalidParameter("alg".to_string()).into())
    }

    pub fn crit(&self) -> &[String] {
        self.critical.as_deref().unwrap_or_default()
    }
}

/// How a signature or recipient header points at its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyReference {
    /// `kid`, unless the header already carries a key reference.
    #[default]
    Kid,
    /// The public JWK, embedded as `jwk`.
    Jwk,
    /// The key's own `x5c` member.
    X5c,
    /// The key's own `x5t` member.
    X5t,
    None,
}

/// Members that already identify a key.
const REFERENCE_MEMBERS: [&str; 5] = ["kid", "jku", "x5c", "x5t", "x5u"];

impl KeyReference {
    pub(crate) fn apply(self, key: &Key, header: &mut Header) -> Result<(), Error> {
        match self {
            KeyReference::Kid => {
                if !REFERENCE_MEMBERS.iter().any(|m| header.contains_key(*m)) {
                    header.insert("kid".to_string(), Value::String(key.kid().to_string()));
                }
            }
            KeyReference::Jwk => {
                ensure!(
                    !matches!(key.material(), KeyMaterial::Octet(_)),
                    JoseError::CannotEmbedKey
                );
                header.insert("jwk".to_string(), key.to_jwk(false)?);
            }
            KeyReference::X5c | KeyReference::X5t => {
                let member = if self == KeyReference::X5c { "x5c" } else { "x5t" };
                if let Some(value) = key.extra().get(member) {
                    header.insert(member.to_string(), value.clone());
                }
            }
            KeyReference::None => {}
        }
        Ok(())
    }
}

/// Processing for a header extension listed in `crit`.
///
/// Every registered handler runs for every candidate, whether or not the
/// candidate lists its name.
pub trait CritHandler: Send + Sync {
    /// Runs with the merged header before the cryptographic check.
    fn prepare(&self, _header: &Header) -> Result<(), Error> {
        Ok(())
    }

    /// Runs with the merged header and the recovered payload after success.
    fn complete(&self, _header: &Header, _payload: &[u8]) -> Result<(), Error> {
        Ok(())
    }
}

/// Registered critical-extension handlers, by header member name.
#[derive(Clone, Default)]
pub struct CritHandlers(BTreeMap<String, Arc<dyn CritHandler>>);

impl std::fmt::Debug for CritHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}

impl CritHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, handler: impl CritHandler + 'static) -> Self {
        self.0.insert(name.into(), Arc::new(handler));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Fails closed on any `crit` member of the protected header that no
    /// handler understands.
    pub(crate) fn check(&self, protected: &Header) -> Result<(), Error> {
        let crit = match protected.get("crit") {
            None => return Ok(()),
            Some(Value::Array(crit)) if !crit.is_empty() => crit,
            Some(_) => bail!(JoseError::InvalidParameter("crit".to_string())),
        };
        for name in crit {
            let name = name
                .as_str()
                .ok_or_else(|| JoseError::InvalidParameter("crit".to_string()))?;
            ensure!(
                self.contains(name),
                JoseError::UnsupportedCritical(name.to_string())
            );
        }
        Ok(())
    }

    pub(crate) fn prepare(&self, header: &Header) -> Result<(), Error> {
        self.0.values().try_for_each(|h| h.prepare(header))
    }

    pub(crate) fn complete(&self, header: &Header, payload: &[u8]) -> Result<(), Error> {
        self.0.values().try_for_each(|h| h.complete(header, payload))
    }
}
