//! Key stores: collections of keys with criteria lookup and a parent chain.

use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;

use crate::error::*;
use crate::jwk::{
    import_der, import_pem, EcCurve, EcKey, Key, KeyForm, KeyMaterial, KeyOp, KeyOperations,
    KeyProps, KeyUse, OctetKey, RsaKey,
};

/// Size argument of [`KeyStore::generate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySize {
    /// Key bits, modulus bits, or curve bits.
    Bits(usize),
    /// A curve name such as `P-256`.
    Named(String),
}

impl From<usize> for KeySize {
    fn from(bits: usize) -> Self {
        KeySize::Bits(bits)
    }
}

impl From<&str> for KeySize {
    fn from(name: &str) -> Self {
        KeySize::Named(name.to_string())
    }
}

/// Lookup criteria for [`KeyStore::all`] and [`KeyStore::get`].
///
/// Unset fields match anything. `alg` matches keys that support the
/// algorithm for some operation.
#[derive(Debug, Clone, Default)]
pub struct KeyQuery {
    pub kty: Option<String>,
    pub key_use: Option<KeyUse>,
    pub alg: Option<String>,
    pub kid: Option<String>,
    /// Do not consult parent stores.
    pub local: bool,
}

impl KeyQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kty(mut self, kty: impl Into<String>) -> Self {
        self.kty = Some(kty.into());
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

    pub fn with_kid(mut self, kid: impl Into<String>) -> Self {
        self.kid = Some(kid.into());
        self
    }

    pub fn local(mut self) -> Self {
        self.local = true;
        self
    }

    fn matches(&self, key: &Key) -> bool {
        if matches!(&self.kid, Some(kid) if kid != key.kid()) {
            return false;
        }
        if matches!(&self.kty, Some(kty) if kty != key.kty()) {
            return false;
        }
        if let (Some(wanted), Some(declared)) = (self.key_use, key.key_use()) {
            if wanted != declared {
                return false;
            }
        }
        match &self.alg {
            None => true,
            Some(alg) => {
                if alg != "dir" && matches!(key.alg(), Some(declared) if declared != alg) {
                    return false;
                }
                KeyOp::ALL.iter().any(|&op| key.supports(alg, op))
            }
        }
    }
}

pub(crate) struct StoreInner {
    keys: RwLock<Vec<Arc<Key>>>,
    parent: Option<KeyStore>,
}

/// A shared, clonable handle on a set of keys.
///
/// Several keys may share a `kid`; lookups tell them apart with `alg` and
/// `use`. Mutation takes a write lock, lookups a read lock.
#[derive(Clone)]
pub struct KeyStore {
    inner: Arc<StoreInner>,
}

impl Default for KeyStore {
    fn default() -> Self {
        Self::with_parent(None)
    }
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore")
            .field("len", &self.len())
            .field("has_parent", &self.inner.parent.is_some())
            .finish()
    }
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_parent(parent: Option<KeyStore>) -> Self {
        KeyStore {
            inner: Arc::new(StoreInner {
                keys: RwLock::new(Vec::new()),
                parent,
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<StoreInner>) -> Self {
        KeyStore { inner }
    }

    /// Builds a store from a JWK Set `{"keys": [...]}`.
    pub fn from_jwks(jwks: &Value) -> Result<Self, Error> {
        let keys = jwks
            .get("keys")
            .and_then(Value::as_array)
            .ok_or(JoseError::InvalidKeyFormat)?;
        let store = Self::new();
        for jwk in keys {
            store.add_jwk(jwk, KeyProps::default())?;
        }
        Ok(store)
    }

    /// A child store; lookups fall through to `self` unless local.
    pub fn temp(&self) -> KeyStore {
        Self::with_parent(Some(self.clone()))
    }

    pub fn parent(&self) -> Option<&KeyStore> {
        self.inner.parent.as_ref()
    }

    fn push(&self, key: Key) -> Arc<Key> {
        tracing::debug!(kid = key.kid(), kty = key.kty(), "key added");
        let key = Arc::new(key);
        self.inner
            .keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(key.clone());
        key
    }

    /// Generates a random key of type `oct`, `RSA` or `EC`.
    pub fn generate(
        &self,
        kty: &str,
        size: impl Into<KeySize>,
        props: KeyProps,
    ) -> Result<Arc<Key>, Error> {
        let size = size.into();
        let material = match (kty, &size) {
            ("oct", KeySize::Bits(bits)) => KeyMaterial::Octet(OctetKey::generate(*bits)?),
            ("RSA", KeySize::Bits(bits)) => KeyMaterial::Rsa(RsaKey::generate(*bits)?),
            ("EC", KeySize::Bits(bits)) => {
                KeyMaterial::Ec(EcKey::generate(EcCurve::from_bits(*bits)?)?)
            }
            ("EC", KeySize::Named(name)) => {
                KeyMaterial::Ec(EcKey::generate(EcCurve::from_name(name)?)?)
            }
            ("oct" | "RSA", KeySize::Named(_)) => bail!(JoseError::InvalidKeySize),
            _ => bail!(JoseError::UnsupportedKeyType(kty.to_string())),
        };
        tracing::debug!(kty, length = material.length(), "key generated");
        Ok(self.push(Key::with_store(
            material,
            props,
            Arc::downgrade(&self.inner),
        )))
    }

    /// Imports serialized key material. `props` wins over anything the
    /// input declares.
    pub fn add(&self, input: &[u8], form: KeyForm, props: KeyProps) -> Result<Arc<Key>, Error> {
        let imported = match form {
            KeyForm::Json => {
                let jwk: Value =
                    serde_json::from_slice(input).map_err(|_| JoseError::InvalidKeyFormat)?;
                return self.add_jwk(&jwk, props);
            }
            KeyForm::Pem => import_pem(input)?,
            _ => import_der(input, form)?,
        };
        let mut found = KeyProps {
            kid: imported.kid,
            ..Default::default()
        };
        if let Some(x5t) = imported.x5t {
            found = found.with_member("x5t", x5t);
        }
        Ok(self.push(Key::with_store(
            imported.material,
            props.or(found),
            Arc::downgrade(&self.inner),
        )))
    }

    pub fn add_jwk(&self, jwk: &Value, props: KeyProps) -> Result<Arc<Key>, Error> {
        let key = Key::from_jwk_with(jwk, props, Arc::downgrade(&self.inner))?;
        Ok(self.push(key))
    }

    /// Adds a copy of a key that may belong to another store.
    pub fn add_key(&self, key: &Key) -> Result<Arc<Key>, Error> {
        self.add_jwk(&key.to_jwk(true)?, KeyProps::default())
    }

    /// Removes a key; returns whether it was present.
    pub fn remove(&self, key: &Key) -> bool {
        let mut keys = self
            .inner
            .keys
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = keys.len();
        keys.retain(|k| !std::ptr::eq(Arc::as_ptr(k), key));
        let removed = keys.len() != before;
        if removed {
            tracing::debug!(kid = key.kid(), "key removed");
        }
        removed
    }

    /// Every matching key: local keys first, then the parent chain's.
    pub fn all(&self, query: &KeyQuery) -> Vec<Arc<Key>> {
        let mut found: Vec<Arc<Key>> = self
            .inner
            .keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|key| query.matches(key))
            .cloned()
            .collect();
        if let (false, Some(parent)) = (query.local, &self.inner.parent) {
            found.extend(parent.all(query));
        }
        found
    }

    /// The first matching key, consulting the parent only when nothing
    /// local matches.
    pub fn get(&self, query: &KeyQuery) -> Option<Arc<Key>> {
        let local = self
            .inner
            .keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|key| query.matches(key))
            .cloned();
        match (local, query.local, &self.inner.parent) {
            (Some(key), _, _) => Some(key),
            (None, false, Some(parent)) => parent.get(query),
            _ => None,
        }
    }

    /// Local keys as a JWK Set.
    pub fn to_jwks(&self, include_private: bool) -> Result<Value, Error> {
        let keys = self
            .inner
            .keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|key| key.to_jwk(include_private))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(serde_json::json!({ "keys": keys }))
    }

    pub fn len(&self) -> usize {
        self.inner
            .keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn generate_each_type() {
        let store = KeyStore::new();
        let oct = store.generate("oct", 256, KeyProps::default()).unwrap();
        assert_eq!(oct.length(), 256);
        let ec = store.generate("EC", "P-384", KeyProps::default()).unwrap();
        assert_eq!(ec.length(), 384);
        let ec = store.generate("EC", 521, KeyProps::default()).unwrap();
        assert_eq!(ec.kty(), "EC");
        assert_eq!(store.len(), 3);

        assert!(store.generate("oct", 255, KeyProps::default()).is_err());
        assert!(store.generate("RSA", 512, KeyProps::default()).is_err());
        assert!(store.generate("RSA", "P-256", KeyProps::default()).is_err());
        let err = store.generate("OKP", 256, KeyProps::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<JoseError>(),
            Some(JoseError::UnsupportedKeyType(_))
        ));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn keys_remember_their_store() {
        let store = KeyStore::new();
        let key = store.generate("oct", 128, KeyProps::default()).unwrap();
        let owner = key.keystore().unwrap();
        assert_eq!(owner.len(), 1);
        assert!(Key::from_jwk(&key.to_jwk(true).unwrap())
            .unwrap()
            .keystore()
            .is_none());
    }

    #[test]
    fn duplicate_kids_are_told_apart_by_alg() {
        let store = KeyStore::new();
        let props = KeyProps::default().with_kid("shared");
        store
            .generate("oct", 256, props.clone().with_alg("HS256"))
            .unwrap();
        store.generate("EC", "P-256", props).unwrap();
        let query = KeyQuery::new().with_kid("shared");
        assert_eq!(store.all(&query).len(), 2);
        let ec = store.get(&query.clone().with_alg("ES256")).unwrap();
        assert_eq!(ec.kty(), "EC");
        let oct = store.get(&query.clone().with_alg("HS256")).unwrap();
        assert_eq!(oct.kty(), "oct");
        assert!(store.get(&query.with_alg("HS512")).is_none());
    }

    #[test]
    fn dir_matches_restricted_oct_keys() {
        let store = KeyStore::new();
        store
            .generate("oct", 256, KeyProps::default().with_alg("A256KW"))
            .unwrap();
        assert!(store.get(&KeyQuery::new().with_alg("dir")).is_some());
        assert!(store.get(&KeyQuery::new().with_alg("A256GCMKW")).is_none());
    }

    #[test]
    fn use_filter_only_applies_when_declared() {
        let store = KeyStore::new();
        store
            .generate("EC", "P-256", KeyProps::default().with_use(KeyUse::Sig))
            .unwrap();
        store.generate("EC", "P-256", KeyProps::default()).unwrap();
        assert_eq!(store.all(&KeyQuery::new().with_use(KeyUse::Enc)).len(), 1);
        assert_eq!(store.all(&KeyQuery::new().with_use(KeyUse::Sig)).len(), 2);
        assert_eq!(store.all(&KeyQuery::new().with_kty("RSA")).len(), 0);
    }

    #[test]
    fn temp_store_falls_through_to_parent() {
        let parent = KeyStore::new();
        parent
            .generate("oct", 128, KeyProps::default().with_kid("p"))
            .unwrap();
        let child = parent.temp();
        child
            .generate("oct", 128, KeyProps::default().with_kid("c"))
            .unwrap();
        assert!(child.get(&KeyQuery::new().with_kid("p")).is_some());
        assert!(child.get(&KeyQuery::new().with_kid("p").local()).is_none());
        assert_eq!(child.all(&KeyQuery::new()).len(), 2);
        assert_eq!(child.all(&KeyQuery::new().local()).len(), 1);
        assert_eq!(parent.all(&KeyQuery::new()).len(), 1);
        assert!(child.parent().is_some());
    }

    #[test]
    fn remove_and_jwks() {
        let store = KeyStore::new();
        let a = store.generate("oct", 128, KeyProps::default()).unwrap();
        let b = store.generate("EC", "P-256", KeyProps::default()).unwrap();
        assert!(store.remove(&a));
        assert!(!store.remove(&a));
        assert_eq!(store.len(), 1);

        let public = store.to_jwks(false).unwrap();
        assert_eq!(public["keys"][0]["kid"], b.kid());
        assert!(public["keys"][0].get("d").is_none());

        let copy = KeyStore::from_jwks(&store.to_jwks(true).unwrap()).unwrap();
        let copied = copy.get(&KeyQuery::new().with_kid(b.kid())).unwrap();
        assert!(copied.is_private());
        assert!(KeyStore::from_jwks(&json!({"keys": "nope"})).is_err());
    }

    #[test]
    fn add_props_override_input() {
        let store = KeyStore::new();
        let jwk = json!({"kty": "oct", "k": "AAECAwQFBgcICQoLDA0ODw", "kid": "from-jwk"});
        let key = store
            .add(
                jwk.to_string().as_bytes(),
                KeyForm::Json,
                KeyProps::default().with_kid("explicit"),
            )
            .unwrap();
        assert_eq!(key.kid(), "explicit");
        let copy = KeyStore::new().add_key(&key).unwrap();
        assert_eq!(copy.kid(), "explicit");
        assert!(store.add(b"not json", KeyForm::Json, KeyProps::default()).is_err());

        let raw = store
            .add(&[0x42u8; 32], KeyForm::Raw, KeyProps::default().with_use(KeyUse::Enc))
            .unwrap();
        assert_eq!(raw.kty(), "oct");
        assert_eq!(raw.length(), 256);
        assert!(raw.supports("A128CBC-HS256", KeyOp::Encrypt));
    }
}
