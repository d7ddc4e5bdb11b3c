use std::sync::Arc;

use serde_json::{json, Value};

use crate::common::*;
use crate::error::*;
use crate::header::KeyReference;
use crate::jwk::{Key, KeyOp};

#[derive(Debug, Clone, Default)]
pub struct SignOptions {
    pub format: Format,
    /// Header members shared by every signatory.
    pub fields: Header,
    pub protect: Protect,
}

/// A key together with its per-signature header settings.
#[derive(Debug, Clone)]
pub struct Signatory {
    pub key: Arc<Key>,
    pub header: Header,
    pub reference: KeyReference,
    /// Overrides [`SignOptions::protect`].
    pub protect: Option<Protect>,
}

impl Signatory {
    pub fn new(key: Arc<Key>) -> Self {
        Signatory {
            key,
            header: Header::new(),
            reference: KeyReference::default(),
            protect: None,
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

    pub fn with_protect(mut self, protect: Protect) -> Self {
        self.protect = Some(protect);
        self
    }
}

impl From<Arc<Key>> for Signatory {
    fn from(key: Arc<Key>) -> Self {
        Signatory::new(key)
    }
}

#[derive(Debug)]
struct Prepared {
    key: Arc<Key>,
    alg: String,
    protected: Header,
    unprotected: Header,
}

fn prepare(signatory: Signatory, options: &SignOptions) -> Result<Prepared, Error> {
    let key = signatory.key;
    let mut header = options.fields.clone();
    header.extend(signatory.header);

    let alg = match header.get("alg") {
        Some(Value::String(alg)) => alg.clone(),
        Some(_) => bail!(JoseError::InvalidParameter("alg".to_string())),
        None => key
            .algorithms(KeyOp::Sign)
            .first()
            .map(|alg| alg.to_string())
            .ok_or_else(|| JoseError::UnsupportedAlgorithm(key.kty().to_string()))?,
    };
    header.insert("alg".to_string(), Value::String(alg.clone()));

    signatory.reference.apply(&key, &mut header)?;

    let protect = match options.format {
        Format::Compact => Protect::All,
        _ => signatory.protect.unwrap_or_else(|| options.protect.clone()),
    };
    let (protected, unprotected) = header
        .into_iter()
        .partition::<Header, _>(|(name, _)| protect.contains(name));
    Ok(Prepared {
        key,
        alg,
        protected,
        unprotected,
    })
}

/// Accumulates a payload and signs it once with every signatory.
///
/// After [`Signer::finalize`] the signer refuses further use.
#[derive(Debug)]
pub struct Signer {
    format: Format,
    signatories: Vec<Prepared>,
    content: Vec<u8>,
    finalized: bool,
}

impl Signer {
    pub fn new<S: Into<Signatory>>(
        options: SignOptions,
        signatories: impl IntoIterator<Item = S>,
    ) -> Result<Self, Error> {
        let signatories = signatories
            .into_iter()
            .map(|s| prepare(s.into(), &options))
            .collect::<Result<Vec<_>, _>>()?;
        ensure!(
            !signatories.is_empty(),
            JoseError::InvalidFormatOption("at least one signatory is required".to_string())
        );
        ensure!(
            options.format == Format::General || signatories.len() == 1,
            JoseError::InvalidFormatOption(format!(
                "too many signatories for {} serialization",
                options.format.name()
            ))
        );
        Ok(Signer {
            format: options.format,
            signatories,
            content: Vec::new(),
            finalized: false,
        })
    }

    pub fn update(&mut self, data: impl AsRef<[u8]>) -> Result<&mut Self, Error> {
        ensure!(!self.finalized, JoseError::AlreadyFinalized);
        self.content.extend_from_slice(data.as_ref());
        Ok(self)
    }

    pub fn finalize(&mut self) -> Result<Serialized, Error> {
        ensure!(!self.finalized, JoseError::AlreadyFinalized);
        self.finalized = true;
        let payload_b64 = b64_encode(&self.content)?;

        let mut signatures = Vec::with_capacity(self.signatories.len());
        for signatory in &self.signatories {
            let protected_b64 = if signatory.protected.is_empty() {
                String::new()
            } else {
                b64_encode(serde_json::to_vec(&signatory.protected)?)?
            };
            let signing_input = format!("{}.{}", protected_b64, payload_b64);
            let signature = signatory
                .key
                .sign(&signatory.alg, signing_input.as_bytes())?;
            tracing::debug!(kid = signatory.key.kid(), alg = %signatory.alg, "signed");

            let mut entry = Header::new();
            if !protected_b64.is_empty() {
                entry.insert("protected".to_string(), Value::String(protected_b64));
            }
            if !signatory.unprotected.is_empty() {
                entry.insert(
                    "header".to_string(),
                    Value::Object(signatory.unprotected.clone()),
                );
            }
            entry.insert("signature".to_string(), Value::String(b64_encode(signature)?));
            signatures.push(entry);
        }

        Ok(match self.format {
            Format::Compact => {
                let entry = &signatures[0];
                let part = |name: &str| entry.get(name).and_then(Value::as_str).unwrap_or("");
                Serialized::Compact(format!(
                    "{}.{}.{}",
                    part("protected"),
                    payload_b64,
                    part("signature")
                ))
            }
            Format::Flattened => {
                let mut flattened = signatures.swap_remove(0);
                flattened.insert("payload".to_string(), Value::String(payload_b64));
                Serialized::Json(Value::Object(flattened))
            }
            Format::General => Serialized::Json(json!({
                "payload": payload_b64,
                "signatures": signatures,
            })),
        })
    }
}

/// Signs `payload` in one step.
pub fn sign<S: Into<Signatory>>(
    options: SignOptions,
    signatories: impl IntoIterator<Item = S>,
    payload: &[u8],
) -> Result<Serialized, Error> {
    let mut signer = Signer::new(options, signatories)?;
    signer.update(payload)?;
    signer.finalize()
}
