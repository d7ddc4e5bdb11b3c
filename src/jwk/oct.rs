use std::collections::BTreeMap;

use rand::RngCore;
use serde_json::Value;
use zeroize::Zeroizing;

use super::{KeyOp, KeyOperations};
use crate::common::*;
use crate::error::*;

const SIG_ALGS: [(&str, usize); 3] = [("HS256", 256), ("HS384", 384), ("HS512", 512)];

const ENC_ALGS: [(&str, usize); 6] = [
    ("A128GCM", 128),
    ("A192GCM", 192),
    ("A256GCM", 256),
    ("A128CBC-HS256", 256),
    ("A192CBC-HS384", 384),
    ("A256CBC-HS512", 512),
];

const WRAP_ALGS: [(&str, Option<usize>); 10] = [
    ("A128KW", Some(128)),
    ("A192KW", Some(192)),
    ("A256KW", Some(256)),
    ("A128GCMKW", Some(128)),
    ("A192GCMKW", Some(192)),
    ("A256GCMKW", Some(256)),
    ("PBES2-HS256+A128KW", None),
    ("PBES2-HS384+A192KW", None),
    ("PBES2-HS512+A256KW", None),
    ("dir", None),
];

/// A symmetric key: raw octets.
#[derive(Clone)]
pub struct OctetKey {
    k: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for OctetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OctetKey")
            .field("length", &self.length())
            .finish_non_exhaustive()
    }
}

impl OctetKey {
    pub fn from_bytes(k: impl Into<Vec<u8>>) -> Result<Self, Error> {
        let k = Zeroizing::new(k.into());
        ensure!(!k.is_empty(), JoseError::InvalidKeySize);
        Ok(OctetKey { k })
    }

    /// Generates a random key of `bits` bits; `bits` must be a positive multiple of 8.
    pub fn generate(bits: usize) -> Result<Self, Error> {
        ensure!(bits > 0 && bits % 8 == 0, JoseError::InvalidKeySize);
        let mut k = Zeroizing::new(vec![0u8; bits / 8]);
        rand::thread_rng().fill_bytes(&mut k);
        Ok(OctetKey { k })
    }

    pub(crate) fn from_jwk(members: &Header) -> Result<Self, Error> {
        let k = b64_member(members, "k")
            .map_err(|_| JoseError::InvalidKeyFormat)?
            .ok_or(JoseError::InvalidKeyFormat)?;
        Self::from_bytes(k)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.k
    }
}

impl KeyOperations for OctetKey {
    fn kty(&self) -> &'static str {
        "oct"
    }

    fn length(&self) -> usize {
        self.k.len() * 8
    }

    fn is_private(&self) -> bool {
        true
    }

    fn has_public(&self) -> bool {
        false
    }

    fn candidate_algorithms(&self, op: KeyOp) -> Vec<&'static str> {
        let len = self.length();
        match op {
            KeyOp::Sign | KeyOp::Verify => SIG_ALGS
                .iter()
                .filter(|(_, min)| len >= *min)
                .map(|(alg, _)| *alg)
                .collect(),
            KeyOp::Encrypt | KeyOp::Decrypt => ENC_ALGS
                .iter()
                .filter(|(_, required)| len == *required)
                .map(|(alg, _)| *alg)
                .collect(),
            KeyOp::Wrap | KeyOp::Unwrap => WRAP_ALGS
                .iter()
                .filter(|(_, required)| required.map_or(true, |required| len == required))
                .map(|(alg, _)| *alg)
                .collect(),
        }
    }

    fn public_members(&self) -> Result<Header, Error> {
        Ok(Header::new())
    }

    fn private_members(&self) -> Result<Header, Error> {
        let mut members = Header::new();
        members.insert("k".to_string(), Value::String(b64_encode(&self.k[..])?));
        Ok(members)
    }

    fn member_names(&self) -> &'static [&'static str] {
        &["k"]
    }

    fn thumbprint_members(&self) -> Result<BTreeMap<&'static str, String>, Error> {
        let mut members = BTreeMap::new();
        members.insert("k", b64_encode(&self.k[..])?);
        members.insert("kty", self.kty().to_string());
        Ok(members)
    }

    fn to_pem(&self, _include_private: bool) -> Result<String, Error> {
        bail!(JoseError::UnsupportedKeyType(self.kty().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algorithms_follow_length() {
        let key = OctetKey::generate(256).unwrap();
        assert_eq!(
            key.candidate_algorithms(KeyOp::Encrypt),
            vec!["A256GCM", "A128CBC-HS256"]
        );
        assert_eq!(key.candidate_algorithms(KeyOp::Sign), vec!["HS256"]);
        assert_eq!(
            key.candidate_algorithms(KeyOp::Wrap),
            vec![
                "A256KW",
                "A256GCMKW",
                "PBES2-HS256+A128KW",
                "PBES2-HS384+A192KW",
                "PBES2-HS512+A256KW",
                "dir"
            ]
        );

        let key = OctetKey::generate(512).unwrap();
        assert_eq!(
            key.candidate_algorithms(KeyOp::Sign),
            vec!["HS256", "HS384", "HS512"]
        );
        assert_eq!(key.candidate_algorithms(KeyOp::Decrypt), vec!["A256CBC-HS512"]);
    }

    #[test]
    fn generate_rejects_partial_bytes() {
        assert!(OctetKey::generate(0).is_err());
        assert!(OctetKey::generate(129).is_err());
        assert_eq!(OctetKey::generate(136).unwrap().length(), 136);
    }

    #[test]
    fn jwk_k_member() {
        let mut members = Header::new();
        members.insert("k".into(), "AAECAwQFBgcICQoLDA0ODw".into());
        let key = OctetKey::from_jwk(&members).unwrap();
        assert_eq!(key.as_bytes(), (0u8..16).collect::<Vec<_>>().as_slice());
        assert_eq!(key.private_members().unwrap(), members);
        assert!(OctetKey::from_jwk(&Header::new()).is_err());
        assert!(key.to_pem(true).is_err());
    }
}
