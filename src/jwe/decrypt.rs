use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use zeroize::Zeroizing;

use super::{check_zip, inflate, RawJwe, RawRecipient};
use crate::algorithms::{self, Params};
use crate::common::*;
use crate::error::*;
use crate::header::{CritHandlers, JoseHeader};
use crate::jwk::{Key, KeyMaterial, KeyUse, OctetKey};
use crate::keystore::{KeyQuery, KeyStore};

/// Additional features to enable during decryption.
#[derive(Debug, Clone, Default)]
pub struct DecryptOptions {
    /// Handlers for `crit` extensions. Unknown extensions are rejected.
    pub handlers: CritHandlers,
    /// Reject key management and content encryption algorithms not in this set
    pub allowed_algorithms: Option<HashSet<String>>,
    /// Maximum length of a compact input
    pub max_token_length: Option<usize>,
    /// Maximum length of a base64url protected header
    pub max_header_length: Option<usize>,
    /// Maximum PBES2 iteration count
    pub max_pbes2_count: Option<u32>,
}

/// A decrypted JWE.
#[derive(Clone)]
pub struct Decrypted {
    /// Merged protected, shared and per-recipient header.
    pub header: Header,
    /// Names of the integrity protected members.
    pub protected: Vec<String>,
    /// The key that unwrapped the CEK.
    pub key: Arc<Key>,
    pub payload: Vec<u8>,
    /// The decrypted content before decompression.
    pub plaintext: Vec<u8>,
    pub aad: Option<Vec<u8>>,
}

impl std::fmt::Debug for Decrypted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decrypted")
            .field("header", &self.header)
            .field("protected", &self.protected)
            .field("key", &self.key)
            .field("payload_len", &self.payload.len())
            .finish_non_exhaustive()
    }
}

/// Decrypts JWE objects with keys from a store or a single key.
#[derive(Debug, Clone)]
pub struct Decrypter {
    store: KeyStore,
    assumed_key: Option<Arc<Key>>,
    options: DecryptOptions,
}

struct Unwrapped {
    key: Arc<Key>,
    header: Header,
    cek: Zeroizing<Vec<u8>>,
    /// The CEK is random because an RSA1_5 unwrap failed.
    substituted: bool,
}

impl Decrypter {
    pub fn new(store: KeyStore) -> Self {
        Decrypter {
            store,
            assumed_key: None,
            options: DecryptOptions::default(),
        }
    }

    /// Decrypts with `key` for every recipient.
    pub fn with_key(key: Arc<Key>) -> Self {
        Decrypter {
            store: key.keystore().unwrap_or_default(),
            assumed_key: Some(key),
            options: DecryptOptions::default(),
        }
    }

    pub fn with_options(mut self, options: DecryptOptions) -> Self {
        self.options = options;
        self
    }

    /// Decrypts compact or JSON text.
    pub fn decrypt(&self, input: &str) -> Result<Decrypted, Error> {
        if let Some(max_token_length) = self.options.max_token_length {
            ensure!(input.len() <= max_token_length, JoseError::TokenTooLong);
        }
        let raw = RawJwe::parse(input, self.max_header_length())?;
        self.decrypt_raw(&raw)
    }

    pub fn decrypt_json(&self, input: &Value) -> Result<Decrypted, Error> {
        let raw = RawJwe::from_json(input, self.max_header_length())?;
        self.decrypt_raw(&raw)
    }

    fn max_header_length(&self) -> usize {
        self.options.max_header_length.unwrap_or(MAX_HEADER_LENGTH)
    }

    fn check_allowed(&self, alg: &str) -> Result<(), Error> {
        if let Some(allowed) = &self.options.allowed_algorithms {
            ensure!(
                allowed.contains(alg),
                JoseError::UnsupportedAlgorithm(alg.to_string())
            );
        }
        Ok(())
    }

    fn resolve_key(&self, header: &JoseHeader, alg: &str) -> Result<Arc<Key>, Error> {
        if let Some(key) = &self.assumed_key {
            return Ok(key.clone());
        }
        let mut query = KeyQuery::new().with_use(KeyUse::Enc).with_alg(alg);
        query.kid = header.key_id.clone();
        self.store
            .get(&query)
            .ok_or_else(|| JoseError::KeyNotFound.into())
    }

    fn check_pbes2_count(&self, header: &Header) -> Result<(), Error> {
        let max = self.options.max_pbes2_count.unwrap_or(MAX_PBES2_COUNT);
        if let Some(p2c) = header.get("p2c") {
            ensure!(
                p2c.as_u64().map_or(false, |p2c| p2c <= u64::from(max)),
                JoseError::InvalidParameter("p2c".to_string())
            );
        }
        Ok(())
    }

    fn try_recipient(&self, raw: &RawJwe, recipient: &RawRecipient) -> Result<Unwrapped, Error> {
        let merged = JoseHeader::merge([&raw.protected, &raw.unprotected, &recipient.header]);
        let header = JoseHeader::from_header(&merged)?;
        let alg = header.alg()?;
        self.check_allowed(alg)?;
        if alg.starts_with("PBES2") {
            self.check_pbes2_count(&merged)?;
        }
        let key = self.resolve_key(&header, alg)?;
        let params = Params {
            header: merged.clone(),
            ..Default::default()
        };
        let unwrapped = key.unwrap(alg, &recipient.encrypted_key, &params);
        let (cek, substituted) = if alg == "RSA1_5" {
            // RFC 7516 section 11.5: a bad padding or CEK length must look
            // like any other content authentication failure.
            let enc = match merged.get("enc") {
                Some(Value::String(enc)) => enc.as_str(),
                _ => bail!(JoseError::InvalidParameter("enc".to_string())),
            };
            let random = algorithms::generate_cek(enc)?;
            match unwrapped {
                Ok(cek) if cek.len() == random.len() => (Zeroizing::new(cek), false),
                _ => (random, true),
            }
        } else {
            (Zeroizing::new(unwrapped?), false)
        };
        if !substituted {
            tracing::debug!(kid = key.kid(), alg, "content key unwrapped");
        }
        Ok(Unwrapped {
            key,
            header: merged,
            cek,
            substituted,
        })
    }

    fn first_unwrapped(&self, raw: &RawJwe) -> Option<Unwrapped> {
        let mut substitute = None;
        for (index, recipient) in raw.recipients.iter().enumerate() {
            match self.try_recipient(raw, recipient) {
                Ok(unwrapped) if !unwrapped.substituted => return Some(unwrapped),
                Ok(unwrapped) => {
                    substitute.get_or_insert(unwrapped);
                }
                Err(err) => tracing::debug!(index, error = %err, "recipient rejected"),
            }
        }
        substitute
    }

    /// Uses the first recipient whose key unwraps the CEK.
    ///
    /// Every content decryption failure is reported as `MacCheckFailed`.
    pub(crate) fn decrypt_raw(&self, raw: &RawJwe) -> Result<Decrypted, Error> {
        self.options.handlers.check(&raw.protected)?;
        let unwrapped = self
            .first_unwrapped(raw)
            .ok_or(JoseError::NoUsableRecipient)?;
        let header = unwrapped.header;
        self.options.handlers.prepare(&header)?;

        let enc = match header.get("enc") {
            Some(Value::String(enc)) => enc.as_str(),
            _ => bail!(JoseError::InvalidParameter("enc".to_string())),
        };
        self.check_allowed(enc)?;
        let params = Params {
            iv: Some(raw.iv.clone()),
            tag: Some(raw.tag.clone()),
            aad: raw.aad(),
            ..Default::default()
        };
        let plaintext = OctetKey::from_bytes(unwrapped.cek.to_vec())
            .and_then(|cek| {
                algorithms::decrypt(enc, &KeyMaterial::Octet(cek), &raw.ciphertext, &params)
            })
            .map_err(|err| {
                tracing::debug!(enc, error = %err, "content decryption failed");
                JoseError::MacCheckFailed
            })?;
        let payload = if check_zip(&header)? {
            inflate(&plaintext)?
        } else {
            plaintext.clone()
        };

        self.options.handlers.complete(&header, &payload)?;
        let aad = raw.aad_b64.as_deref().map(b64_decode).transpose()?;
        Ok(Decrypted {
            protected: raw.protected.keys().cloned().collect(),
            header,
            key: unwrapped.key,
            payload,
            plaintext,
            aad,
        })
    }
}
