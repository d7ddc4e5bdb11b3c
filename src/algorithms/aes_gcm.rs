//! AES-GCM content encryption (A128GCM, A192GCM, A256GCM) and
//! AES-GCM key wrap (A128GCMKW, A192GCMKW, A256GCMKW).
//!
//! Content is sealed in one pass over an in-memory buffer. There is no
//! chunked or streaming interface; inputs must fit in memory.

use aes::Aes192;
use aes_gcm::aead::{self, consts::U12, AeadInPlace, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm};
use rand::RngCore;

use crate::error::*;

type Aes192Gcm = AesGcm<Aes192, U12>;

pub const IV_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// AES-GCM with a 128, 192 or 256-bit key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AesGcmAlg {
    key_len: usize,
}

impl AesGcmAlg {
    /// Parse a content encryption name (`A256GCM`) or a key wrap name (`A256GCMKW`).
    pub fn from_alg_name(alg: &str) -> Result<Self, Error> {
        let key_len = match alg.trim_end_matches("KW") {
            "A128GCM" => 16,
            "A192GCM" => 24,
            "A256GCM" => 32,
            _ => bail!(JoseError::UnsupportedAlgorithm(alg.to_string())),
        };
        Ok(AesGcmAlg { key_len })
    }

    pub fn key_len(&self) -> usize {
        self.key_len
    }

    pub fn generate_iv() -> Vec<u8> {
        let mut iv = vec![0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);
        iv
    }

    /// Returns `(ciphertext, tag)`.
    pub fn encrypt(
        &self,
        key: &[u8],
        iv: &[u8],
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<(Vec<u8>, Vec<u8>), Error> {
        ensure!(key.len() == self.key_len, JoseError::InvalidKeySize);
        ensure!(
            iv.len() == IV_LEN,
            JoseError::InvalidParameter("iv".to_string())
        );
        match self.key_len {
            16 => seal::<Aes128Gcm>(key, iv, aad, plaintext),
            24 => seal::<Aes192Gcm>(key, iv, aad, plaintext),
            _ => seal::<Aes256Gcm>(key, iv, aad, plaintext),
        }
    }

    pub fn decrypt(
        &self,
        key: &[u8],
        iv: &[u8],
        aad: &[u8],
        ciphertext: &[u8],
        tag: &[u8],
    ) -> Result<Vec<u8>, Error> {
        ensure!(key.len() == self.key_len, JoseError::InvalidKeySize);
        ensure!(
            iv.len() == IV_LEN,
            JoseError::InvalidParameter("iv".to_string())
        );
        ensure!(tag.len() == TAG_LEN, JoseError::DecryptionFailed);
        match self.key_len {
            16 => open::<Aes128Gcm>(key, iv, aad, ciphertext, tag),
            24 => open::<Aes192Gcm>(key, iv, aad, ciphertext, tag),
            _ => open::<Aes256Gcm>(key, iv, aad, ciphertext, tag),
        }
    }

    /// Key wrap: encrypts `cek` under a fresh IV; returns `(encrypted_key, iv, tag)`.
    pub fn wrap(&self, kek: &[u8], cek: &[u8]) -> Result<(Vec<u8>, Vec<u8>, Vec<u8>), Error> {
        let iv = Self::generate_iv();
        let (encrypted_key, tag) = self.encrypt(kek, &iv, &[], cek)?;
        Ok((encrypted_key, iv, tag))
    }

    pub fn unwrap(
        &self,
        kek: &[u8],
        encrypted_key: &[u8],
        iv: &[u8],
        tag: &[u8],
    ) -> Result<Vec<u8>, Error> {
        self.decrypt(kek, iv, &[], encrypted_key, tag)
    }
}

fn seal<C: KeyInit + AeadInPlace>(
    key: &[u8],
    iv: &[u8],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<(Vec<u8>, Vec<u8>), Error> {
    let cipher = C::new_from_slice(key).map_err(|_| JoseError::InvalidKeySize)?;
    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(aead::Nonce::<C>::from_slice(iv), aad, &mut buffer)
        .map_err(|_| JoseError::InternalError("AES-GCM encryption failed".to_string()))?;
    Ok((buffer, tag.to_vec()))
}

fn open<C: KeyInit + AeadInPlace>(
    key: &[u8],
    iv: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
) -> Result<Vec<u8>, Error> {
    let cipher = C::new_from_slice(key).map_err(|_| JoseError::InvalidKeySize)?;
    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(
            aead::Nonce::<C>::from_slice(iv),
            aad,
            &mut buffer,
            aead::Tag::<C>::from_slice(tag),
        )
        .map_err(|_| JoseError::DecryptionFailed)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_all_key_sizes() {
        for name in ["A128GCM", "A192GCM", "A256GCM"] {
            let alg = AesGcmAlg::from_alg_name(name).unwrap();
            let key = vec![9u8; alg.key_len()];
            let iv = AesGcmAlg::generate_iv();
            for len in [0usize, 1, 1023, 100_000] {
                let plaintext = vec![0x11u8; len];
                let (ciphertext, tag) = alg.encrypt(&key, &iv, b"aad", &plaintext).unwrap();
                assert_eq!(ciphertext.len(), len);
                assert_eq!(tag.len(), TAG_LEN);
                let decrypted = alg.decrypt(&key, &iv, b"aad", &ciphertext, &tag).unwrap();
                assert_eq!(decrypted, plaintext);
            }
        }
    }

    #[test]
    fn tampered_tag_fails() {
        let alg = AesGcmAlg::from_alg_name("A256GCM").unwrap();
        let key = [4u8; 32];
        let iv = AesGcmAlg::generate_iv();
        let (ciphertext, mut tag) = alg.encrypt(&key, &iv, b"", b"secret").unwrap();
        tag[15] ^= 0x80;
        let err = alg.decrypt(&key, &iv, b"", &ciphertext, &tag).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<JoseError>(),
            Some(JoseError::DecryptionFailed)
        ));
    }

    #[test]
    fn key_size_must_match() {
        let alg = AesGcmAlg::from_alg_name("A128GCM").unwrap();
        let err = alg.encrypt(&[0u8; 32], &[0u8; 12], b"", b"x").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<JoseError>(),
            Some(JoseError::InvalidKeySize)
        ));
    }

    #[test]
    fn gcm_key_wrap() {
        let alg = AesGcmAlg::from_alg_name("A192GCMKW").unwrap();
        let kek = [7u8; 24];
        let cek = [1u8; 32];
        let (wrapped, iv, tag) = alg.wrap(&kek, &cek).unwrap();
        assert_eq!(iv.len(), IV_LEN);
        assert_eq!(alg.unwrap(&kek, &wrapped, &iv, &tag).unwrap(), cek);
        assert!(alg.unwrap(&[8u8; 24], &wrapped, &iv, &tag).is_err());
    }
}
