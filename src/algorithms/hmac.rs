//! HMAC-SHA2 signatures (HS256, HS384, HS512).

use crate::algorithms::digest::HashAlg;
use crate::common::timingsafe_eq;
use crate::error::*;

/// An HMAC signing algorithm, identified by its SHA-2 size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HmacAlg {
    hash: HashAlg,
}

impl HmacAlg {
    pub fn from_alg_name(alg: &str) -> Result<Self, Error> {
        let hash = match alg {
            "HS256" => HashAlg::Sha256,
            "HS384" => HashAlg::Sha384,
            "HS512" => HashAlg::Sha512,
            _ => bail!(JoseError::UnsupportedAlgorithm(alg.to_string())),
        };
        Ok(HmacAlg { hash })
    }

    /// Minimum key size in bytes: the hash output size.
    pub fn min_key_len(&self) -> usize {
        self.hash.output_len()
    }

    pub fn sign(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
        ensure!(key.len() >= self.min_key_len(), JoseError::InvalidKeySize);
        Ok(self.hash.hmac(key, data))
    }

    /// Recomputes the MAC and compares it in constant time.
    pub fn verify(&self, key: &[u8], data: &[u8], mac: &[u8]) -> Result<(), Error> {
        let expected = self.sign(key, data)?;
        ensure!(timingsafe_eq(&expected, mac), JoseError::MacCheckFailed);
        Ok(())
    }
}
