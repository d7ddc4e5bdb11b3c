//! AES Key Wrap (RFC 3394): A128KW, A192KW, A256KW.

use aes::cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes192, Aes256};
use zeroize::Zeroizing;

use crate::common::timingsafe_eq;
use crate::error::*;

const DEFAULT_IV: [u8; 8] = [0xa6; 8];

/// A raw AES block cipher of any standard key size.
pub(crate) enum AesBlock {
    A128(Aes128),
    A192(Aes192),
    A256(Aes256),
}

impl AesBlock {
    pub(crate) fn new(key: &[u8]) -> Result<Self, Error> {
        let cipher = match key.len() {
            16 => Aes128::new_from_slice(key).map(AesBlock::A128),
            24 => Aes192::new_from_slice(key).map(AesBlock::A192),
            32 => Aes256::new_from_slice(key).map(AesBlock::A256),
            _ => bail!(JoseError::InvalidKeySize),
        };
        cipher.map_err(|_| JoseError::InvalidKeySize.into())
    }

    fn encrypt(&self, block: &mut [u8; 16]) {
        let block = GenericArray::from_mut_slice(block);
        match self {
            AesBlock::A128(c) => c.encrypt_block(block),
            AesBlock::A192(c) => c.encrypt_block(block),
            AesBlock::A256(c) => c.encrypt_block(block),
        }
    }

    fn decrypt(&self, block: &mut [u8; 16]) {
        let block = GenericArray::from_mut_slice(block);
        match self {
            AesBlock::A128(c) => c.decrypt_block(block),
            AesBlock::A192(c) => c.decrypt_block(block),
            AesBlock::A256(c) => c.decrypt_block(block),
        }
    }
}

/// Key size in bytes for a key wrap algorithm name.
pub fn key_len_for(alg: &str) -> Result<usize, Error> {
    match alg {
        "A128KW" => Ok(16),
        "A192KW" => Ok(24),
        "A256KW" => Ok(32),
        _ => bail!(JoseError::UnsupportedAlgorithm(alg.to_string())),
    }
}

/// Wraps `data` (a multiple of 8 bytes, at least 16) under `kek`.
pub fn wrap(kek: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
    ensure!(
        data.len() % 8 == 0 && data.len() >= 16,
        JoseError::InvalidParameter("key wrap input length".to_string())
    );
    let cipher = AesBlock::new(kek)?;
    let n = data.len() / 8;

    let mut a = DEFAULT_IV;
    let mut r = Zeroizing::new(data.to_vec());
    let mut block = Zeroizing::new([0u8; 16]);
    for j in 0..6 {
        for i in 0..n {
            block[..8].copy_from_slice(&a);
            block[8..].copy_from_slice(&r[i * 8..i * 8 + 8]);
            cipher.encrypt(&mut block);
            let t = ((n * j) + i + 1) as u64;
            a.copy_from_slice(&block[..8]);
            a.iter_mut()
                .zip(t.to_be_bytes().iter())
                .for_each(|(x, y)| *x ^= y);
            r[i * 8..i * 8 + 8].copy_from_slice(&block[8..]);
        }
    }

    let mut wrapped = Vec::with_capacity(data.len() + 8);
    wrapped.extend_from_slice(&a);
    wrapped.extend_from_slice(&r);
    Ok(wrapped)
}

/// Unwraps `wrapped`, failing with `DecryptionFailed` if the integrity check value differs.
pub fn unwrap(kek: &[u8], wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>, Error> {
    ensure!(
        wrapped.len() % 8 == 0 && wrapped.len() >= 24,
        JoseError::InvalidParameter("key unwrap input length".to_string())
    );
    let cipher = AesBlock::new(kek)?;
    let n = wrapped.len() / 8 - 1;

    let mut a = [0u8; 8];
    a.copy_from_slice(&wrapped[..8]);
    let mut r = Zeroizing::new(wrapped[8..].to_vec());
    let mut block = Zeroizing::new([0u8; 16]);
    for j in (0..6).rev() {
        for i in (0..n).rev() {
            let t = ((n * j) + i + 1) as u64;
            a.iter_mut()
                .zip(t.to_be_bytes().iter())
                .for_each(|(x, y)| *x ^= y);
            block[..8].copy_from_slice(&a);
            block[8..].copy_from_slice(&r[i * 8..i * 8 + 8]);
            cipher.decrypt(&mut block);
            a.copy_from_slice(&block[..8]);
            r[i * 8..i * 8 + 8].copy_from_slice(&block[8..]);
        }
    }
    ensure!(timingsafe_eq(&a, &DEFAULT_IV), JoseError::DecryptionFailed);
    Ok(r)
}
