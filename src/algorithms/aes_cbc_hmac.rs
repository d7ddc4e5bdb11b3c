//! AES-CBC with HMAC-SHA2 authenticated encryption (RFC 7518 §5.2).

use aes::{Aes128, Aes192, Aes256};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::algorithms::digest::HashAlg;
use crate::common::timingsafe_eq;
use crate::error::*;

pub const IV_LEN: usize = 16;

/// One of A128CBC-HS256, A192CBC-HS384, A256CBC-HS512.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AesCbcHmac {
    half_len: usize,
    hash: HashAlg,
}

impl AesCbcHmac {
    pub fn from_alg_name(alg: &str) -> Result<Self, Error> {
        let (half_len, hash) = match alg {
            "A128CBC-HS256" => (16, HashAlg::Sha256),
            "A192CBC-HS384" => (24, HashAlg::Sha384),
            "A256CBC-HS512" => (32, HashAlg::Sha512),
            _ => bail!(JoseError::UnsupportedAlgorithm(alg.to_string())),
        };
        Ok(AesCbcHmac { half_len, hash })
    }

    /// Composite key size in bytes (MAC key followed by encryption key).
    pub fn key_len(&self) -> usize {
        self.half_len * 2
    }

    pub fn tag_len(&self) -> usize {
        self.half_len
    }

    fn split<'k>(&self, key: &'k [u8]) -> Result<(&'k [u8], &'k [u8]), Error> {
        ensure!(key.len() == self.key_len(), JoseError::InvalidKeySize);
        Ok(key.split_at(self.half_len))
    }

    fn tag(&self, mac_key: &[u8], aad: &[u8], iv: &[u8], ciphertext: &[u8]) -> Vec<u8> {
        let aad_bits = (aad.len() as u64) * 8;
        let mut mac_input = Vec::with_capacity(aad.len() + iv.len() + ciphertext.len() + 8);
        mac_input.extend_from_slice(aad);
        mac_input.extend_from_slice(iv);
        mac_input.extend_from_slice(ciphertext);
        mac_input.extend_from_slice(&aad_bits.to_be_bytes());
        let mut tag = self.hash.hmac(mac_key, &mac_input);
        tag.truncate(self.tag_len());
        tag
    }

    /// Returns `(ciphertext, tag)`.
    pub fn encrypt(
        &self,
        key: &[u8],
        iv: &[u8],
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<(Vec<u8>, Vec<u8>), Error> {
        let (mac_key, enc_key) = self.split(key)?;
        ensure!(
            iv.len() == IV_LEN,
            JoseError::InvalidParameter("iv".to_string())
        );
        let ciphertext = match enc_key.len() {
            16 => cbc::Encryptor::<Aes128>::new_from_slices(enc_key, iv)
                .map_err(|_| JoseError::InvalidKeySize)?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
            24 => cbc::Encryptor::<Aes192>::new_from_slices(enc_key, iv)
                .map_err(|_| JoseError::InvalidKeySize)?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
            _ => cbc::Encryptor::<Aes256>::new_from_slices(enc_key, iv)
                .map_err(|_| JoseError::InvalidKeySize)?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        };
        let tag = self.tag(mac_key, aad, iv, &ciphertext);
        Ok((ciphertext, tag))
    }

    /// The tag is checked before any decryption happens.
    pub fn decrypt(
        &self,
        key: &[u8],
        iv: &[u8],
        aad: &[u8],
        ciphertext: &[u8],
        tag: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let (mac_key, enc_key) = self.split(key)?;
        ensure!(
            iv.len() == IV_LEN,
            JoseError::InvalidParameter("iv".to_string())
        );
        let expected = self.tag(mac_key, aad, iv, ciphertext);
        ensure!(timingsafe_eq(&expected, tag), JoseError::MacCheckFailed);

        let plaintext = match enc_key.len() {
            16 => cbc::Decryptor::<Aes128>::new_from_slices(enc_key, iv)
                .map_err(|_| JoseError::InvalidKeySize)?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
            24 => cbc::Decryptor::<Aes192>::new_from_slices(enc_key, iv)
                .map_err(|_| JoseError::InvalidKeySize)?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
            _ => cbc::Decryptor::<Aes256>::new_from_slices(enc_key, iv)
                .map_err(|_| JoseError::InvalidKeySize)?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        };
        plaintext.map_err(|_| JoseError::DecryptionFailed.into())
    }
}
