//! JSON Web Keys.
//!
//! A [`Key`] wraps one of three kinds of [`KeyMaterial`] together with the
//! JWK metadata (`kid`, `use`, `alg` and any other member). Every
//! cryptographic operation first checks that the requested algorithm is
//! among [`Key::algorithms`] for the operation, then dispatches to the
//! algorithm registry.

mod ec;
mod import;
mod oct;
mod rsa;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError, Weak};

use serde_json::Value;

pub use self::ec::{EcCurve, EcKey};
pub use self::import::KeyForm;
pub(crate) use self::import::{import_der, import_pem};
pub use self::oct::OctetKey;
pub use self::rsa::{RsaKey, MIN_MODULUS_BITS};

use crate::algorithms::{self, digest::HashAlg, Encrypted, Params};
use crate::common::*;
use crate::error::*;
use crate::keystore::{KeyStore, StoreInner};

/// Intended use of a key, as declared by the JWK `use` member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyUse {
    Sig,
    Enc,
}

impl KeyUse {
    pub fn from_name(name: &str) -> Result<Self, Error> {
        match name {
            "sig" => Ok(KeyUse::Sig),
            "enc" => Ok(KeyUse::Enc),
            _ => bail!(JoseError::InvalidParameter(format!("use: {}", name))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            KeyUse::Sig => "sig",
            KeyUse::Enc => "enc",
        }
    }

    pub fn permits(&self, op: KeyOp) -> bool {
        match self {
            KeyUse::Sig => matches!(op, KeyOp::Sign | KeyOp::Verify),
            KeyUse::Enc => !matches!(op, KeyOp::Sign | KeyOp::Verify),
        }
    }
}

/// An operation mode a key can be asked to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyOp {
    Sign,
    Verify,
    Encrypt,
    Decrypt,
    Wrap,
    Unwrap,
}

impl KeyOp {
    pub const ALL: [KeyOp; 6] = [
        KeyOp::Sign,
        KeyOp::Verify,
        KeyOp::Encrypt,
        KeyOp::Decrypt,
        KeyOp::Wrap,
        KeyOp::Unwrap,
    ];

    /// The RFC 7517 `key_ops` name.
    pub fn name(&self) -> &'static str {
        match self {
            KeyOp::Sign => "sign",
            KeyOp::Verify => "verify",
            KeyOp::Encrypt => "encrypt",
            KeyOp::Decrypt => "decrypt",
            KeyOp::Wrap => "wrapKey",
            KeyOp::Unwrap => "unwrapKey",
        }
    }
}

/// What every kind of key material provides.
pub trait KeyOperations {
    fn kty(&self) -> &'static str;

    /// Size in bits: octet count, modulus size or curve size.
    fn length(&self) -> usize;

    fn is_private(&self) -> bool;

    fn has_public(&self) -> bool;

    /// Algorithms usable for `op` given only the material itself.
    fn candidate_algorithms(&self, op: KeyOp) -> Vec<&'static str>;

    fn public_members(&self) -> Result<Header, Error>;

    fn private_members(&self) -> Result<Header, Error>;

    /// Every JWK member name owned by this key type.
    fn member_names(&self) -> &'static [&'static str];

    /// The RFC 7638 required members, including `kty`.
    fn thumbprint_members(&self) -> Result<BTreeMap<&'static str, String>, Error>;

    fn to_pem(&self, include_private: bool) -> Result<String, Error>;
}

/// Key material of one of the supported key types.
#[derive(Debug, Clone)]
pub enum KeyMaterial {
    Octet(OctetKey),
    Rsa(RsaKey),
    Ec(EcKey),
}

impl KeyMaterial {
    fn inner(&self) -> &dyn KeyOperations {
        match self {
            KeyMaterial::Octet(k) => k,
            KeyMaterial::Rsa(k) => k,
            KeyMaterial::Ec(k) => k,
        }
    }

    pub(crate) fn from_jwk(kty: &str, members: &Header) -> Result<Self, Error> {
        match kty {
            "oct" => Ok(KeyMaterial::Octet(OctetKey::from_jwk(members)?)),
            "RSA" => Ok(KeyMaterial::Rsa(RsaKey::from_jwk(members)?)),
            "EC" => Ok(KeyMaterial::Ec(EcKey::from_jwk(members)?)),
            _ => bail!(JoseError::UnsupportedKeyType(kty.to_string())),
        }
    }

    pub fn octets(&self) -> Result<&[u8], Error> {
        match self {
            KeyMaterial::Octet(k) => Ok(k.as_bytes()),
            _ => bail!(JoseError::UnsupportedKeyType(self.kty().to_string())),
        }
    }

    pub fn rsa(&self) -> Result<&RsaKey, Error> {
        match self {
            KeyMaterial::Rsa(k) => Ok(k),
            _ => bail!(JoseError::UnsupportedKeyType(self.kty().to_string())),
        }
    }

    pub fn ec(&self) -> Result<&EcKey, Error> {
        match self {
            KeyMaterial::Ec(k) => Ok(k),
            _ => bail!(JoseError::UnsupportedKeyType(self.kty().to_string())),
        }
    }
}

impl KeyOperations for KeyMaterial {
    fn kty(&self) -> &'static str {
        self.inner().kty()
    }

    fn length(&self) -> usize {
        self.inner().length()
    }

    fn is_private(&self) -> bool {
        self.inner().is_private()
    }

    fn has_public(&self) -> bool {
        self.inner().has_public()
    }

    fn candidate_algorithms(&self, op: KeyOp) -> Vec<&'static str> {
        self.inner().candidate_algorithms(op)
    }

    fn public_members(&self) -> Result<Header, Error> {
        self.inner().public_members()
    }

    fn private_members(&self) -> Result<Header, Error> {
        self.inner().private_members()
    }

    fn member_names(&self) -> &'static [&'static str] {
        self.inner().member_names()
    }

    fn thumbprint_members(&self) -> Result<BTreeMap<&'static str, String>, Error> {
        self.inner().thumbprint_members()
    }

    fn to_pem(&self, include_private: bool) -> Result<String, Error> {
        self.inner().to_pem(include_private)
    }
}

/// JWK metadata applied when a key is generated or imported.
#[derive(Debug, Clone, Default)]
pub struct KeyProps {
    pub kid: Option<String>,
    pub key_use: Option<KeyUse>,
    pub alg: Option<String>,
    /// Any other JWK members (`x5c`, `x5t`, `key_ops`...), kept verbatim.
    pub extra: Header,
}

impl KeyProps {
    pub fn with_kid(mut self, kid: impl Into<String>) -> Self {
        self.kid = Some(kid.into());
        self
    }

    pub fn with_use(mut self, key_use: KeyUse) -> Self {
        self.key_use = Some(key_use);
        self
    }

    pub fn with_alg(mut self, alg: impl Into<String>) -> Self {
        self.alg = Some(alg.into());
        self
    }

    pub fn with_member(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }

    /// Fills in what is unset here from `other`.
    pub(crate) fn or(mut self, other: KeyProps) -> Self {
        self.kid = self.kid.or(other.kid);
        self.key_use = self.key_use.or(other.key_use);
        self.alg = self.alg.or(other.alg);
        for (name, value) in other.extra {
            self.extra.entry(name).or_insert(value);
        }
        self
    }

    fn from_members(members: &Header, owned: &[&str]) -> Result<Self, Error> {
        let kid = match members.get("kid") {
            None | Some(Value::Null) => None,
            Some(Value::String(kid)) => Some(kid.clone()),
            Some(Value::Number(kid)) => Some(kid.to_string()),
            Some(_) => bail!(JoseError::InvalidKeyFormat),
        };
        let key_use = members
            .get("use")
            .and_then(Value::as_str)
            .map(KeyUse::from_name)
            .transpose()?;
        let alg = members.get("alg").and_then(Value::as_str).map(String::from);
        let extra = members
            .iter()
            .filter(|(name, _)| {
                !["kty", "kid", "use", "alg"].contains(&name.as_str())
                    && !owned.contains(&name.as_str())
            })
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Ok(KeyProps {
            kid,
            key_use,
            alg,
            extra,
        })
    }
}

/// A key with its JWK metadata.
///
/// Keys are immutable; only the thumbprint and PEM caches fill in lazily.
pub struct Key {
    material: KeyMaterial,
    kid: String,
    key_use: Option<KeyUse>,
    alg: Option<String>,
    extra: Header,
    store: Weak<StoreInner>,
    thumbprints: Mutex<HashMap<HashAlg, Vec<u8>>>,
    pems: Mutex<HashMap<bool, String>>,
}

impl std::fmt::Debug for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Key")
            .field("kty", &self.kty())
            .field("kid", &self.kid)
            .field("use", &self.key_use)
            .field("alg", &self.alg)
            .field("material", &self.material)
            .finish_non_exhaustive()
    }
}

impl Key {
    /// A key that belongs to no store.
    pub fn new(material: KeyMaterial, props: KeyProps) -> Self {
        Self::with_store(material, props, Weak::new())
    }

    pub(crate) fn with_store(
        material: KeyMaterial,
        props: KeyProps,
        store: Weak<StoreInner>,
    ) -> Self {
        Key {
            material,
            kid: props
                .kid
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            key_use: props.key_use,
            alg: props.alg,
            extra: props.extra,
            store,
            thumbprints: Mutex::new(HashMap::new()),
            pems: Mutex::new(HashMap::new()),
        }
    }

    /// Parses a JWK object into a key that belongs to no store.
    pub fn from_jwk(jwk: &Value) -> Result<Self, Error> {
        Self::from_jwk_with(jwk, KeyProps::default(), Weak::new())
    }

    pub(crate) fn from_jwk_with(
        jwk: &Value,
        overrides: KeyProps,
        store: Weak<StoreInner>,
    ) -> Result<Self, Error> {
        let members = jwk.as_object().ok_or(JoseError::InvalidKeyFormat)?;
        let kty = members
            .get("kty")
            .and_then(Value::as_str)
            .ok_or(JoseError::InvalidKeyFormat)?;
        let material = KeyMaterial::from_jwk(kty, members)?;
        let props = overrides.or(KeyProps::from_members(members, material.member_names())?);
        Ok(Self::with_store(material, props, store))
    }

    pub fn kty(&self) -> &'static str {
        self.material.kty()
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn key_use(&self) -> Option<KeyUse> {
        self.key_use
    }

    pub fn alg(&self) -> Option<&str> {
        self.alg.as_deref()
    }

    pub fn length(&self) -> usize {
        self.material.length()
    }

    pub fn is_private(&self) -> bool {
        self.material.is_private()
    }

    pub fn has_public(&self) -> bool {
        self.material.has_public()
    }

    pub fn material(&self) -> &KeyMaterial {
        &self.material
    }

    /// JWK members other than the standard and key-type ones.
    pub fn extra(&self) -> &Header {
        &self.extra
    }

    /// The store this key was created in, if it is still alive.
    pub fn keystore(&self) -> Option<KeyStore> {
        self.store.upgrade().map(KeyStore::from_inner)
    }

    /// Algorithms usable for `op`, after the `use` and `alg` restrictions.
    /// Symmetric keys restricted to one algorithm still allow `dir`.
    pub fn algorithms(&self, op: KeyOp) -> Vec<&'static str> {
        if matches!(self.key_use, Some(key_use) if !key_use.permits(op)) {
            return vec![];
        }
        let mut algs = self.material.candidate_algorithms(op);
        if let Some(restricted) = &self.alg {
            let is_oct = matches!(self.material, KeyMaterial::Octet(_));
            algs.retain(|alg| alg == restricted || (is_oct && *alg == "dir"));
        }
        algs
    }

    pub fn supports(&self, alg: &str, op: KeyOp) -> bool {
        self.algorithms(op).contains(&alg)
    }

    fn check(&self, alg: &str, op: KeyOp) -> Result<(), Error> {
        ensure!(
            self.supports(alg, op),
            JoseError::UnsupportedAlgorithm(alg.to_string())
        );
        Ok(())
    }

    pub fn sign(&self, alg: &str, data: &[u8]) -> Result<Vec<u8>, Error> {
        self.check(alg, KeyOp::Sign)?;
        algorithms::sign(alg, &self.material, data)
    }

    pub fn verify(&self, alg: &str, data: &[u8], signature: &[u8]) -> Result<(), Error> {
        self.check(alg, KeyOp::Verify)?;
        algorithms::verify(alg, &self.material, data, signature)
    }

    /// Content encryption with this key as the CEK.
    pub fn encrypt(&self, alg: &str, plaintext: &[u8], params: &Params) -> Result<Encrypted, Error> {
        self.check(alg, KeyOp::Encrypt)?;
        algorithms::encrypt(alg, &self.material, plaintext, params)
    }

    pub fn decrypt(&self, alg: &str, ciphertext: &[u8], params: &Params) -> Result<Vec<u8>, Error> {
        self.check(alg, KeyOp::Decrypt)?;
        algorithms::decrypt(alg, &self.material, ciphertext, params)
    }

    /// Key management: protects (or, for `dir` and ECDH-ES, derives) a CEK.
    pub fn wrap(&self, alg: &str, cek: &[u8], params: &Params) -> Result<Encrypted, Error> {
        self.check(alg, KeyOp::Wrap)?;
        algorithms::encrypt(alg, &self.material, cek, params)
    }

    pub fn unwrap(&self, alg: &str, encrypted_key: &[u8], params: &Params) -> Result<Vec<u8>, Error> {
        self.check(alg, KeyOp::Unwrap)?;
        algorithms::decrypt(alg, &self.material, encrypted_key, params)
    }

    /// The JWK representation; private members only when asked for.
    pub fn to_jwk(&self, include_private: bool) -> Result<Value, Error> {
        let mut jwk = Header::new();
        jwk.insert("kty".to_string(), Value::String(self.kty().to_string()));
        jwk.insert("kid".to_string(), Value::String(self.kid.clone()));
        if let Some(key_use) = self.key_use {
            jwk.insert("use".to_string(), Value::String(key_use.name().to_string()));
        }
        if let Some(alg) = &self.alg {
            jwk.insert("alg".to_string(), Value::String(alg.clone()));
        }
        jwk.extend(self.extra.clone());
        jwk.extend(self.material.public_members()?);
        if include_private {
            jwk.extend(self.material.private_members()?);
        }
        Ok(Value::Object(jwk))
    }

    /// RFC 7638 thumbprint, computed once per hash function.
    pub fn thumbprint(&self, hash: HashAlg) -> Result<Vec<u8>, Error> {
        let mut cache = self
            .thumbprints
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(thumbprint) = cache.get(&hash) {
            return Ok(thumbprint.clone());
        }
        let canonical = serde_json::to_vec(&self.material.thumbprint_members()?)?;
        let thumbprint = hash.hash(&canonical);
        cache.insert(hash, thumbprint.clone());
        Ok(thumbprint)
    }

    /// SPKI or PKCS#8 PEM; cached.
    pub fn to_pem(&self, include_private: bool) -> Result<String, Error> {
        let mut cache = self.pems.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pem) = cache.get(&include_private) {
            return Ok(pem.clone());
        }
        let pem = self.material.to_pem(include_private)?;
        cache.insert(include_private, pem.clone());
        Ok(pem)
    }
}
