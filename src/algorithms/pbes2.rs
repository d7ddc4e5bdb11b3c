//! PBES2 password-based key wrapping (RFC 7518 section 4.8).

use rand::RngCore;
use serde_json::Value;
use zeroize::Zeroizing;

use super::digest::HashAlg;
use super::{aes_kw, kdf, Encrypted};
use crate::common::*;
use crate::error::*;

pub const DEFAULT_ITERATIONS: u32 = 8192;
pub const DEFAULT_SALT_LEN: usize = 16;
const MIN_SALT_LEN: usize = 8;

/// Returns the PRF hash and the AES-KW key size in bytes.
fn params_for(alg: &str) -> Result<(HashAlg, usize), Error> {
    match alg {
        "PBES2-HS256+A128KW" => Ok((HashAlg::Sha256, 16)),
        "PBES2-HS384+A192KW" => Ok((HashAlg::Sha384, 24)),
        "PBES2-HS512+A256KW" => Ok((HashAlg::Sha512, 32)),
        _ => bail!(JoseError::UnsupportedAlgorithm(alg.to_string())),
    }
}

fn iterations(header: &Header) -> Result<Option<u32>, Error> {
    match header.get("p2c") {
        None => Ok(None),
        Some(p2c) => {
            let count = p2c
                .as_u64()
                .filter(|&count| count > 0)
                .and_then(|count| u32::try_from(count).ok())
                .ok_or_else(|| JoseError::InvalidParameter("p2c".to_string()))?;
            Ok(Some(count))
        }
    }
}

fn derive_kek(
    alg: &str,
    password: &[u8],
    p2s: &[u8],
    p2c: u32,
) -> Result<Zeroizing<Vec<u8>>, Error> {
    let (hash, key_len) = params_for(alg)?;
    ensure!(
        p2s.len() >= MIN_SALT_LEN,
        JoseError::InvalidParameter("p2s".to_string())
    );
    let mut salt = Vec::with_capacity(alg.len() + 1 + p2s.len());
    salt.extend_from_slice(alg.as_bytes());
    salt.push(0);
    salt.extend_from_slice(p2s);
    kdf::pbkdf2(hash, password, &salt, p2c, key_len)
}

/// Wraps the CEK under a key derived from the password.
///
/// `p2s` and `p2c` are taken from the header when present, otherwise a
/// random salt and the default count are used. Both are returned in the
/// recipient header.
pub fn wrap(alg: &str, password: &[u8], cek: &[u8], header: &Header) -> Result<Encrypted, Error> {
    let p2s = match b64_member(header, "p2s")? {
        Some(p2s) => p2s,
        None => {
            let mut p2s = vec![0u8; DEFAULT_SALT_LEN];
            rand::thread_rng().fill_bytes(&mut p2s);
            p2s
        }
    };
    let p2c = iterations(header)?.unwrap_or(DEFAULT_ITERATIONS);
    let kek = derive_kek(alg, password, &p2s, p2c)?;
    let mut members = Header::new();
    members.insert("p2s".to_string(), Value::String(b64_encode(&p2s)?));
    members.insert("p2c".to_string(), Value::from(p2c));
    Ok(Encrypted {
        data: aes_kw::wrap(&kek, cek)?,
        header: members,
        ..Default::default()
    })
}

pub fn unwrap(
    alg: &str,
    password: &[u8],
    encrypted_key: &[u8],
    header: &Header,
) -> Result<Zeroizing<Vec<u8>>, Error> {
    let p2s =
        b64_member(header, "p2s")?.ok_or_else(|| JoseError::InvalidParameter("p2s".to_string()))?;
    let p2c = iterations(header)?.ok_or_else(|| JoseError::InvalidParameter("p2c".to_string()))?;
    let kek = derive_kek(alg, password, &p2s, p2c)?;
    aes_kw::unwrap(&kek, encrypted_key)
}
