use std::sync::Arc;

use serde_json::{json, Value};
use zeroize::Zeroizing;

use super::{check_zip, content_aad, deflate, ZIP_DEFLATE};
use crate::algorithms::{self, generate_cek, generate_iv, Params};
use crate::common::*;
use crate::error::*;
use crate::header::KeyReference;
use crate::jwk::{Key, KeyMaterial, KeyOp, OctetKey};

/// Content encryption algorithm used when neither the options nor the
/// header name one.
pub const DEFAULT_CONTENT_ALG: &str = "A128CBC-HS256";

#[derive(Clone, Default)]
pub struct EncryptOptions {
    pub format: Format,
    /// Header members shared by every recipient.
    pub fields: Header,
    /// With several recipients, only shared members can be protected.
    pub protect: Protect,
    /// Overridden by an `enc` member in `fields`.
    pub content_alg: Option<String>,
    /// Compress the plaintext with DEFLATE.
    pub zip: bool,
    /// Additional authenticated data; JSON serializations only.
    pub aad: Option<Vec<u8>>,
    /// Use this CEK instead of a random one.
    pub cek: Option<Zeroizing<Vec<u8>>>,
    pub iv: Option<Vec<u8>>,
}

impl std::fmt::Debug for EncryptOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptOptions")
            .field("format", &self.format)
            .field("fields", &self.fields)
            .field("protect", &self.protect)
            .field("content_alg", &self.content_alg)
            .field("zip", &self.zip)
            .finish_non_exhaustive()
    }
}

/// A key together with its per-recipient header settings.
#[derive(Debug, Clone)]
pub struct Recipient {
    pub key: Arc<Key>,
    pub header: Header,
    pub reference: KeyReference,
    /// Ephemeral key for ECDH-ES; generated when absent.
    pub epk: Option<Arc<Key>>,
}

impl Recipient {
    pub fn new(key: Arc<Key>) -> Self {
        Recipient {
            key,
            header: Header::new(),
            reference: KeyReference::default(),
            epk: None,
        }
    }

    pub fn with_member(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.header.insert(name.into(), value.into());
        self
    }

    pub fn with_reference(mut self, reference: KeyReference) -> Self {
        self.reference = reference;
        self
    }

    pub fn with_epk(mut self, epk: Arc<Key>) -> Self {
        self.epk = Some(epk);
        self
    }
}

impl From<Arc<Key>> for Recipient {
    fn from(key: Arc<Key>) -> Self {
        Recipient::new(key)
    }
}

#[derive(Debug)]
struct Prepared {
    key: Arc<Key>,
    alg: String,
    header: Header,
    epk: Option<Arc<Key>>,
}

fn prepare(recipient: Recipient, fields: &Header) -> Result<Prepared, Error> {
    let key = recipient.key;
    let mut header = recipient.header;
    let alg = match header.get("alg").or_else(|| fields.get("alg")) {
        Some(Value::String(alg)) => alg.clone(),
        Some(_) => bail!(JoseError::InvalidParameter("alg".to_string())),
        None => key
            .algorithms(KeyOp::Wrap)
            .first()
            .map(|alg| alg.to_string())
            .ok_or_else(|| JoseError::UnsupportedAlgorithm(key.kty().to_string()))?,
    };
    header.insert("alg".to_string(), Value::String(alg.clone()));
    recipient.reference.apply(&key, &mut header)?;
    Ok(Prepared {
        key,
        alg,
        header,
        epk: recipient.epk,
    })
}

/// The ephemeral key for an ECDH-ES recipient, from a store scoped to this
/// operation unless the caller provided one.
fn ephemeral_key(recipient: &Prepared) -> Result<Arc<Key>, Error> {
    if let Some(epk) = &recipient.epk {
        return Ok(epk.clone());
    }
    let curve = recipient.key.material().ec()?.curve();
    let store = recipient.key.keystore().unwrap_or_default().temp();
    store.generate("EC", curve.name(), Default::default())
}

/// Accumulates a plaintext and encrypts it once for every recipient.
///
/// After [`Encrypter::finalize`] the encrypter refuses further use.
pub struct Encrypter {
    format: Format,
    fields: Header,
    protect: Protect,
    content_alg: Option<String>,
    aad: Option<Vec<u8>>,
    cek: Option<Zeroizing<Vec<u8>>>,
    iv: Option<Vec<u8>>,
    recipients: Vec<Prepared>,
    content: Vec<u8>,
    finalized: bool,
}

impl std::fmt::Debug for Encrypter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encrypter")
            .field("format", &self.format)
            .field("fields", &self.fields)
            .field("recipients", &self.recipients)
            .field("finalized", &self.finalized)
            .finish_non_exhaustive()
    }
}

impl Encrypter {
    pub fn new<R: Into<Recipient>>(
        options: EncryptOptions,
        recipients: impl IntoIterator<Item = R>,
    ) -> Result<Self, Error> {
        let mut fields = options.fields;
        if options.zip {
            fields.insert("zip".to_string(), Value::String(ZIP_DEFLATE.to_string()));
        }
        check_zip(&fields)?;

        let recipients = recipients
            .into_iter()
            .map(|r| prepare(r.into(), &fields))
            .collect::<Result<Vec<_>, _>>()?;
        ensure!(
            !recipients.is_empty(),
            JoseError::InvalidFormatOption("at least one recipient is required".to_string())
        );
        ensure!(
            options.format != Format::Compact || options.aad.is_none(),
            JoseError::InvalidFormatOption(
                "additional authenticated data cannot be used for compact serialization"
                    .to_string()
            )
        );
        ensure!(
            options.format == Format::General || recipients.len() == 1,
            JoseError::InvalidFormatOption(format!(
                "too many recipients for {} serialization",
                options.format.name()
            ))
        );
        let protect = match options.format {
            Format::Compact => Protect::All,
            _ => options.protect,
        };
        ensure!(
            protect != Protect::All || recipients.len() == 1,
            JoseError::InvalidFormatOption(
                "too many recipients to protect all header parameters".to_string()
            )
        );
        Ok(Encrypter {
            format: options.format,
            fields,
            protect,
            content_alg: options.content_alg,
            aad: options.aad,
            cek: options.cek,
            iv: options.iv,
            recipients,
            content: Vec::new(),
            finalized: false,
        })
    }

    pub fn update(&mut self, data: impl AsRef<[u8]>) -> Result<&mut Self, Error> {
        ensure!(!self.finalized, JoseError::AlreadyFinalized);
        self.content.extend_from_slice(data.as_ref());
        Ok(self)
    }

    fn content_alg(&self, one: bool) -> Result<String, Error> {
        match self.fields.get("enc") {
            Some(Value::String(enc)) => return Ok(enc.clone()),
            Some(_) => bail!(JoseError::InvalidParameter("enc".to_string())),
            None => {}
        }
        if let Some(enc) = &self.content_alg {
            return Ok(enc.clone());
        }
        // A direct key has no natural content algorithm.
        ensure!(
            !(one && self.recipients[0].alg == "dir"),
            JoseError::InvalidParameter("enc".to_string())
        );
        Ok(DEFAULT_CONTENT_ALG.to_string())
    }

    pub fn finalize(&mut self) -> Result<Serialized, Error> {
        ensure!(!self.finalized, JoseError::AlreadyFinalized);
        self.finalized = true;

        let one = self.recipients.len() == 1;
        let enc = self.content_alg(one)?;
        self.fields.insert("enc".to_string(), Value::String(enc.clone()));

        let mut cek = self.cek.take();
        if cek.is_none() && !(one && self.recipients[0].alg == "dir") {
            cek = Some(generate_cek(&enc)?);
        }
        let mut entries: Vec<(Header, Vec<u8>)> = Vec::with_capacity(self.recipients.len());
        for recipient in &self.recipients {
            let mut params = Params {
                header: self.fields.clone(),
                ..Default::default()
            };
            params.header.extend(recipient.header.clone());
            if recipient.alg.starts_with("ECDH-ES") {
                let epk = ephemeral_key(recipient)?;
                params.epk = Some(epk.material().ec()?.clone());
            }

            let wrapped = if recipient.alg == "dir" && one {
                recipient.key.wrap("dir", &[], &params)?
            } else {
                let content_key = cek
                    .as_deref()
                    .ok_or_else(|| JoseError::InternalError("no content key".to_string()))?;
                recipient.key.wrap(&recipient.alg, content_key, &params)?
            };
            ensure!(!wrapped.once || one, JoseError::MultipleRecipientsDirect);
            tracing::debug!(kid = recipient.key.kid(), alg = %recipient.alg, "recipient wrapped");

            let mut header = recipient.header.clone();
            header.extend(wrapped.header);
            let encrypted_key = if wrapped.direct {
                cek = Some(Zeroizing::new(wrapped.data));
                vec![]
            } else {
                wrapped.data
            };
            entries.push((header, encrypted_key));
        }
        let cek = cek.ok_or_else(|| JoseError::InternalError("no content key".to_string()))?;

        let mut protected = Header::new();
        let mut unprotected = self.fields.clone();
        if self.protect == Protect::All {
            protected = std::mem::take(&mut entries[0].0);
            protected.extend(std::mem::take(&mut unprotected));
        } else {
            for name in self.fields.keys() {
                if self.protect.contains(name) {
                    if let Some(value) = unprotected.remove(name) {
                        protected.insert(name.clone(), value);
                    }
                }
            }
        }
        let protected_b64 = if protected.is_empty() {
            String::new()
        } else {
            b64_encode(serde_json::to_vec(&protected)?)?
        };

        let plaintext = if self.fields.contains_key("zip") {
            deflate(&self.content)?
        } else {
            std::mem::take(&mut self.content)
        };
        let aad_b64 = self.aad.as_ref().map(b64_encode).transpose()?;
        let iv = match self.iv.take() {
            Some(iv) => iv,
            None => generate_iv(&enc)?,
        };
        let params = Params {
            iv: Some(iv.clone()),
            aad: content_aad(&protected_b64, aad_b64.as_deref()),
            ..Default::default()
        };
        let content_key = KeyMaterial::Octet(OctetKey::from_bytes(cek.to_vec())?);
        let encrypted = algorithms::encrypt(&enc, &content_key, &plaintext, &params)?;
        let tag = encrypted.tag.unwrap_or_default();

        let iv_b64 = b64_encode(&iv)?;
        let ciphertext_b64 = b64_encode(&encrypted.data)?;
        let tag_b64 = b64_encode(&tag)?;

        if self.format == Format::Compact {
            let encrypted_key = b64_encode(&entries[0].1)?;
            return Ok(Serialized::Compact(format!(
                "{}.{}.{}.{}.{}",
                protected_b64, encrypted_key, iv_b64, ciphertext_b64, tag_b64
            )));
        }

        let mut recipients = Vec::with_capacity(entries.len());
        for (header, encrypted_key) in entries {
            let mut entry = Header::new();
            if !header.is_empty() {
                entry.insert("header".to_string(), Value::Object(header));
            }
            if !encrypted_key.is_empty() {
                entry.insert(
                    "encrypted_key".to_string(),
                    Value::String(b64_encode(&encrypted_key)?),
                );
            }
            recipients.push(entry);
        }

        let mut jwe = Header::new();
        if !protected_b64.is_empty() {
            jwe.insert("protected".to_string(), Value::String(protected_b64));
        }
        if !unprotected.is_empty() {
            jwe.insert("unprotected".to_string(), Value::Object(unprotected));
        }
        match self.format {
            Format::Flattened => {
                if let Some(recipient) = recipients.pop() {
                    jwe.extend(recipient);
                }
            }
            _ => {
                recipients.retain(|entry| !entry.is_empty());
                if !recipients.is_empty() {
                    jwe.insert("recipients".to_string(), json!(recipients));
                }
            }
        }
        if let Some(aad_b64) = aad_b64 {
            jwe.insert("aad".to_string(), Value::String(aad_b64));
        }
        jwe.insert("iv".to_string(), Value::String(iv_b64));
        jwe.insert("ciphertext".to_string(), Value::String(ciphertext_b64));
        jwe.insert("tag".to_string(), Value::String(tag_b64));
        Ok(Serialized::Json(Value::Object(jwe)))
    }
}

/// Encrypts `plaintext` in one step.
pub fn encrypt<R: Into<Recipient>>(
    options: EncryptOptions,
    recipients: impl IntoIterator<Item = R>,
    plaintext: &[u8],
) -> Result<Serialized, Error> {
    let mut encrypter = Encrypter::new(options, recipients)?;
    encrypter.update(plaintext)?;
    encrypter.finalize()
}
