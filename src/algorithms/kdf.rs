//! Key derivation: Concat-KDF (NIST SP 800-56A), HKDF (RFC 5869) and PBKDF2 (RFC 8018).

use zeroize::Zeroizing;

use crate::algorithms::digest::HashAlg;
use crate::error::*;

/// `len32(alg) || alg || len32(apu) || apu || len32(apv) || apv || be32(key_bits)`
pub fn concat_other_info(alg_id: &str, apu: &[u8], apv: &[u8], key_bits: usize) -> Vec<u8> {
    let mut other_info = Vec::with_capacity(16 + alg_id.len() + apu.len() + apv.len());
    for part in [alg_id.as_bytes(), apu, apv] {
        other_info.extend_from_slice(&(part.len() as u32).to_be_bytes());
        other_info.extend_from_slice(part);
    }
    other_info.extend_from_slice(&(key_bits as u32).to_be_bytes());
    other_info
}

/// Concat-KDF: `hash(be32(counter) || z || other_info)` rounds, truncated to `key_len` bytes.
pub fn concat_kdf(
    hash: HashAlg,
    z: &[u8],
    other_info: &[u8],
    key_len: usize,
) -> Result<Zeroizing<Vec<u8>>, Error> {
    ensure!(
        key_len > 0,
        JoseError::InvalidParameter("key length".to_string())
    );
    let mut derived = Zeroizing::new(Vec::with_capacity(key_len + hash.output_len()));
    let mut input = Zeroizing::new(Vec::with_capacity(4 + z.len() + other_info.len()));
    let mut counter: u32 = 1;
    while derived.len() < key_len {
        input.clear();
        input.extend_from_slice(&counter.to_be_bytes());
        input.extend_from_slice(z);
        input.extend_from_slice(other_info);
        derived.extend_from_slice(&hash.hash(&input));
        counter += 1;
    }
    derived.truncate(key_len);
    Ok(derived)
}

/// HKDF extract-then-expand. An empty salt means `hash_len` zero bytes.
pub fn hkdf(
    hash: HashAlg,
    ikm: &[u8],
    salt: &[u8],
    info: &[u8],
    key_len: usize,
) -> Result<Zeroizing<Vec<u8>>, Error> {
    let hash_len = hash.output_len();
    ensure!(
        key_len > 0 && key_len <= 255 * hash_len,
        JoseError::InvalidParameter("key length".to_string())
    );
    let zero_salt;
    let salt = if salt.is_empty() {
        zero_salt = vec![0u8; hash_len];
        &zero_salt[..]
    } else {
        salt
    };
    let prk = Zeroizing::new(hash.hmac(salt, ikm));

    let mut okm = Zeroizing::new(Vec::with_capacity(key_len + hash_len));
    let mut t: Zeroizing<Vec<u8>> = Zeroizing::new(vec![]);
    let mut block = Zeroizing::new(Vec::new());
    let mut counter: u8 = 1;
    while okm.len() < key_len {
        block.clear();
        block.extend_from_slice(&t);
        block.extend_from_slice(info);
        block.push(counter);
        t = Zeroizing::new(hash.hmac(&prk, &block));
        okm.extend_from_slice(&t);
        counter = counter.wrapping_add(1);
    }
    okm.truncate(key_len);
    Ok(okm)
}

/// PBKDF2 with HMAC over `hash`.
pub fn pbkdf2(
    hash: HashAlg,
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    key_len: usize,
) -> Result<Zeroizing<Vec<u8>>, Error> {
    ensure!(
        iterations > 0,
        JoseError::InvalidParameter("iteration count".to_string())
    );
    ensure!(
        key_len > 0,
        JoseError::InvalidParameter("key length".to_string())
    );
    let mut derived = Zeroizing::new(Vec::with_capacity(key_len + hash.output_len()));
    let mut block_index: u32 = 1;
    while derived.len() < key_len {
        let mut first = Zeroizing::new(Vec::with_capacity(salt.len() + 4));
        first.extend_from_slice(salt);
        first.extend_from_slice(&block_index.to_be_bytes());
        let mut u = Zeroizing::new(hash.hmac(password, &first));
        let mut t = u.clone();
        for _ in 1..iterations {
            u = Zeroizing::new(hash.hmac(password, &u));
            t.iter_mut().zip(u.iter()).for_each(|(a, b)| *a ^= b);
        }
        derived.extend_from_slice(&t);
        block_index += 1;
    }
    derived.truncate(key_len);
    Ok(derived)
}
