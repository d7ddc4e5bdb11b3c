//! The algorithm registry.
//!
//! Every primitive is reachable by its JOSE algorithm identifier through
//! [`digest`], [`sign`], [`verify`], [`encrypt`], [`decrypt`] and [`derive`].
//! Key management algorithms (`A128KW`, `RSA-OAEP`, `ECDH-ES`, `dir`...) go
//! through `encrypt` / `decrypt` like content encryption algorithms do.
//! Unknown identifiers fail with [`JoseError::UnsupportedAlgorithm`].

pub mod aes_cbc_hmac;
pub mod aes_gcm;
pub mod aes_kw;
pub mod digest;
pub mod ecdh;
pub mod ecdsa;
pub mod hmac;
pub mod kdf;
pub mod pbes2;
pub mod rsa;

use rand::RngCore;
use zeroize::Zeroizing;

use self::aes_cbc_hmac::AesCbcHmac;
use self::aes_gcm::AesGcmAlg;
use self::digest::HashAlg;
use self::hmac::HmacAlg;
use crate::common::*;
use crate::error::*;
use crate::jwk::{EcKey, KeyMaterial};

/// Inputs to [`encrypt`] and [`decrypt`] beyond the key and the data.
#[derive(Debug, Clone, Default)]
pub struct Params {
    /// Content encryption IV. Generated on encryption when absent.
    pub iv: Option<Vec<u8>>,
    /// Additional authenticated data for content encryption.
    pub aad: Vec<u8>,
    /// Authentication tag, for content decryption.
    pub tag: Option<Vec<u8>>,
    /// Header members read by key management: `enc`, `epk`, `apu`, `apv`,
    /// `p2s`, `p2c`, and `iv`/`tag` for AES-GCM key wrap.
    pub header: Header,
    /// Ephemeral private key for ECDH-ES on encryption.
    pub epk: Option<EcKey>,
}

/// Output of [`encrypt`].
#[derive(Clone, Default)]
pub struct Encrypted {
    /// Ciphertext, encrypted key, or for direct key agreement the CEK itself.
    pub data: Vec<u8>,
    pub iv: Option<Vec<u8>>,
    pub tag: Option<Vec<u8>>,
    /// Members to add to the recipient header.
    pub header: Header,
    /// Only valid for a single recipient.
    pub once: bool,
    /// `data` is the CEK, not an encrypted key.
    pub direct: bool,
}

impl std::fmt::Debug for Encrypted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encrypted")
            .field("len", &self.data.len())
            .field("header", &self.header)
            .field("once", &self.once)
            .field("direct", &self.direct)
            .finish_non_exhaustive()
    }
}

/// Inputs to [`derive`].
#[derive(Debug, Clone, Default)]
pub struct DeriveParams {
    /// Output size in bytes. HKDF and ECDH default to a natural size.
    pub length: Option<usize>,
    pub salt: Vec<u8>,
    pub info: Vec<u8>,
    /// Concat-KDF `OtherInfo`.
    pub other_info: Vec<u8>,
    pub iterations: u32,
    /// Peer public key for the ECDH family.
    pub public: Option<EcKey>,
}

/// CEK size in bits for a content encryption algorithm.
pub fn key_length(enc: &str) -> Result<usize, Error> {
    match enc {
        "A128GCM" | "A128KW" | "A128GCMKW" => Ok(128),
        "A192GCM" | "A192KW" | "A192GCMKW" => Ok(192),
        "A256GCM" | "A256KW" | "A256GCMKW" => Ok(256),
        "A128CBC-HS256" => Ok(256),
        "A192CBC-HS384" => Ok(384),
        "A256CBC-HS512" => Ok(512),
        _ => bail!(JoseError::UnsupportedAlgorithm(enc.to_string())),
    }
}

/// IV size in bits for a content encryption algorithm.
pub fn nonce_length(enc: &str) -> Result<usize, Error> {
    match enc {
        "A128GCM" | "A192GCM" | "A256GCM" => Ok(aes_gcm::IV_LEN * 8),
        "A128CBC-HS256" | "A192CBC-HS384" | "A256CBC-HS512" => Ok(aes_cbc_hmac::IV_LEN * 8),
        _ => bail!(JoseError::UnsupportedAlgorithm(enc.to_string())),
    }
}

/// Generates a random CEK for a content encryption algorithm.
pub fn generate_cek(enc: &str) -> Result<Zeroizing<Vec<u8>>, Error> {
    let mut cek = Zeroizing::new(vec![0u8; key_length(enc)? / 8]);
    rand::thread_rng().fill_bytes(&mut cek);
    Ok(cek)
}

/// Generates a random IV for a content encryption algorithm.
pub fn generate_iv(enc: &str) -> Result<Vec<u8>, Error> {
    let mut iv = vec![0u8; nonce_length(enc)? / 8];
    rand::thread_rng().fill_bytes(&mut iv);
    Ok(iv)
}

pub fn digest(alg: &str, data: &[u8]) -> Result<Vec<u8>, Error> {
    tracing::trace!(alg, "digest");
    Ok(HashAlg::from_name(alg)?.hash(data))
}

pub fn sign(alg: &str, key: &KeyMaterial, data: &[u8]) -> Result<Vec<u8>, Error> {
    tracing::trace!(alg, "sign");
    match alg {
        "HS256" | "HS384" | "HS512" => HmacAlg::from_alg_name(alg)?.sign(key.octets()?, data),
        "RS256" | "RS384" | "RS512" | "PS256" | "PS384" | "PS512" => {
            rsa::sign(alg, key.rsa()?, data)
        }
        "ES256" | "ES384" | "ES512" => ecdsa::sign(alg, key.ec()?, data),
        _ => bail!(JoseError::UnsupportedAlgorithm(alg.to_string())),
    }
}

pub fn verify(alg: &str, key: &KeyMaterial, data: &[u8], signature: &[u8]) -> Result<(), Error> {
    tracing::trace!(alg, "verify");
    match alg {
        "HS256" | "HS384" | "HS512" => {
            HmacAlg::from_alg_name(alg)?.verify(key.octets()?, data, signature)
        }
        "RS256" | "RS384" | "RS512" | "PS256" | "PS384" | "PS512" => {
            rsa::verify(alg, key.rsa()?, data, signature)
        }
        "ES256" | "ES384" | "ES512" => ecdsa::verify(alg, key.ec()?, data, signature),
        _ => bail!(JoseError::UnsupportedAlgorithm(alg.to_string())),
    }
}

pub fn encrypt(
    alg: &str,
    key: &KeyMaterial,
    data: &[u8],
    params: &Params,
) -> Result<Encrypted, Error> {
    tracing::trace!(alg, "encrypt");
    match alg {
        "A128GCM" | "A192GCM" | "A256GCM" => {
            let iv = params.iv.clone().unwrap_or_else(AesGcmAlg::generate_iv);
            let (data, tag) =
                AesGcmAlg::from_alg_name(alg)?.encrypt(key.octets()?, &iv, &params.aad, data)?;
            Ok(Encrypted {
                data,
                iv: Some(iv),
                tag: Some(tag),
                ..Default::default()
            })
        }
        "A128CBC-HS256" | "A192CBC-HS384" | "A256CBC-HS512" => {
            let iv = match &params.iv {
                Some(iv) => iv.clone(),
                None => generate_iv(alg)?,
            };
            let (data, tag) =
                AesCbcHmac::from_alg_name(alg)?.encrypt(key.octets()?, &iv, &params.aad, data)?;
            Ok(Encrypted {
                data,
                iv: Some(iv),
                tag: Some(tag),
                ..Default::default()
            })
        }
        "A128KW" | "A192KW" | "A256KW" => {
            let kek = key.octets()?;
            ensure!(
                kek.len() == aes_kw::key_len_for(alg)?,
                JoseError::InvalidKeySize
            );
            Ok(Encrypted {
                data: aes_kw::wrap(kek, data)?,
                ..Default::default()
            })
        }
        "A128GCMKW" | "A192GCMKW" | "A256GCMKW" => {
            let (data, iv, tag) = AesGcmAlg::from_alg_name(alg)?.wrap(key.octets()?, data)?;
            let mut header = Header::new();
            header.insert("iv".to_string(), b64_encode(&iv)?.into());
            header.insert("tag".to_string(), b64_encode(&tag)?.into());
            Ok(Encrypted {
                data,
                header,
                ..Default::default()
            })
        }
        "RSA-OAEP" | "RSA-OAEP-256" | "RSA1_5" => Ok(Encrypted {
            data: rsa::encrypt(alg, key.rsa()?, data)?,
            ..Default::default()
        }),
        "ECDH-ES" | "ECDH-ES+A128KW" | "ECDH-ES+A192KW" | "ECDH-ES+A256KW" => {
            ecdh::wrap(alg, key.ec()?, data, params)
        }
        "PBES2-HS256+A128KW" | "PBES2-HS384+A192KW" | "PBES2-HS512+A256KW" => {
            pbes2::wrap(alg, key.octets()?, data, &params.header)
        }
        "dir" => Ok(Encrypted {
            data: key.octets()?.to_vec(),
            once: true,
            direct: true,
            ..Default::default()
        }),
        _ => bail!(JoseError::UnsupportedAlgorithm(alg.to_string())),
    }
}

fn required_iv_and_tag(params: &Params) -> Result<(&[u8], &[u8]), Error> {
    let iv = params
        .iv
        .as_deref()
        .ok_or_else(|| JoseError::InvalidParameter("iv".to_string()))?;
    let tag = params
        .tag
        .as_deref()
        .ok_or_else(|| JoseError::InvalidParameter("tag".to_string()))?;
    Ok((iv, tag))
}

pub fn decrypt(
    alg: &str,
    key: &KeyMaterial,
    data: &[u8],
    params: &Params,
) -> Result<Vec<u8>, Error> {
    tracing::trace!(alg, "decrypt");
    match alg {
        "A128GCM" | "A192GCM" | "A256GCM" => {
            let (iv, tag) = required_iv_and_tag(params)?;
            AesGcmAlg::from_alg_name(alg)?.decrypt(key.octets()?, iv, &params.aad, data, tag)
        }
        "A128CBC-HS256" | "A192CBC-HS384" | "A256CBC-HS512" => {
            let (iv, tag) = required_iv_and_tag(params)?;
            AesCbcHmac::from_alg_name(alg)?.decrypt(key.octets()?, iv, &params.aad, data, tag)
        }
        "A128KW" | "A192KW" | "A256KW" => {
            let kek = key.octets()?;
            ensure!(
                kek.len() == aes_kw::key_len_for(alg)?,
                JoseError::InvalidKeySize
            );
            Ok(aes_kw::unwrap(kek, data)?.to_vec())
        }
        "A128GCMKW" | "A192GCMKW" | "A256GCMKW" => {
            let iv = b64_member(&params.header, "iv")?
                .ok_or_else(|| JoseError::InvalidParameter("iv".to_string()))?;
            let tag = b64_member(&params.header, "tag")?
                .ok_or_else(|| JoseError::InvalidParameter("tag".to_string()))?;
            AesGcmAlg::from_alg_name(alg)?.unwrap(key.octets()?, data, &iv, &tag)
        }
        "RSA-OAEP" | "RSA-OAEP-256" | "RSA1_5" => rsa::decrypt(alg, key.rsa()?, data),
        "ECDH-ES" | "ECDH-ES+A128KW" | "ECDH-ES+A192KW" | "ECDH-ES+A256KW" => {
            Ok(ecdh::unwrap(alg, key.ec()?, data, params)?.to_vec())
        }
        "PBES2-HS256+A128KW" | "PBES2-HS384+A192KW" | "PBES2-HS512+A256KW" => {
            Ok(pbes2::unwrap(alg, key.octets()?, data, &params.header)?.to_vec())
        }
        "dir" => Ok(key.octets()?.to_vec()),
        _ => bail!(JoseError::UnsupportedAlgorithm(alg.to_string())),
    }
}

/// Key derivation: `CONCAT-SHA-*`, `HKDF-SHA-*`, `PBKDF2-SHA-*` over an
/// octet key, or `ECDH`, `ECDH-CONCAT`, `ECDH-HKDF` over an EC private key
/// and `params.public`.
pub fn derive(
    alg: &str,
    key: &KeyMaterial,
    params: &DeriveParams,
) -> Result<Zeroizing<Vec<u8>>, Error> {
    tracing::trace!(alg, "derive");
    let missing_length = || JoseError::InvalidParameter("length".to_string());
    if let Some(hash) = alg.strip_prefix("CONCAT-") {
        let hash = HashAlg::from_name(hash)?;
        ensure!(
            !params.other_info.is_empty(),
            JoseError::InvalidParameter("otherInfo".to_string())
        );
        let length = params.length.ok_or_else(missing_length)?;
        return kdf::concat_kdf(hash, key.octets()?, &params.other_info, length);
    }
    if let Some(hash) = alg.strip_prefix("HKDF-") {
        let hash = HashAlg::from_name(hash)?;
        let length = params.length.unwrap_or(hash.output_len());
        return kdf::hkdf(hash, key.octets()?, &params.salt, &params.info, length);
    }
    if let Some(hash) = alg.strip_prefix("PBKDF2-") {
        let hash = HashAlg::from_name(hash)?;
        ensure!(
            hash != HashAlg::Sha1,
            JoseError::UnsupportedAlgorithm(alg.to_string())
        );
        let length = params.length.ok_or_else(missing_length)?;
        return kdf::pbkdf2(
            hash,
            key.octets()?,
            &params.salt,
            params.iterations,
            length,
        );
    }
    match alg {
        "ECDH" | "ECDH-CONCAT" | "ECDH-HKDF" => {
            let public = params
                .public
                .as_ref()
                .ok_or_else(|| JoseError::InvalidParameter("public".to_string()))?;
            let shared = ecdh::shared_secret(key.ec()?, public)?;
            match alg {
                "ECDH" => {
                    let length = params.length.unwrap_or(shared.len());
                    ensure!(length <= shared.len(), missing_length());
                    Ok(Zeroizing::new(shared[..length].to_vec()))
                }
                "ECDH-CONCAT" => {
                    let length = params.length.ok_or_else(missing_length)?;
                    kdf::concat_kdf(HashAlg::Sha256, &shared, &params.other_info, length)
                }
                _ => {
                    let length = params.length.unwrap_or(HashAlg::Sha256.output_len());
                    kdf::hkdf(HashAlg::Sha256, &shared, &params.salt, &params.info, length)
                }
            }
        }
        _ => bail!(JoseError::UnsupportedAlgorithm(alg.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwk::{EcCurve, OctetKey};

    fn oct(len: usize) -> KeyMaterial {
        KeyMaterial::Octet(OctetKey::generate(len * 8).unwrap())
    }

    #[test]
    fn unknown_algorithms() {
        let key = oct(32);
        for result in [
            sign("none", &key, b"x").map(|_| ()),
            encrypt("A128CTR", &key, b"x", &Params::default()).map(|_| ()),
            decrypt("RSA-OAEP-384", &key, b"x", &Params::default()).map(|_| ()),
            digest("MD5", b"x").map(|_| ()),
            derive("SCRYPT", &key, &DeriveParams::default()).map(|_| ()),
        ] {
            assert!(matches!(
                result.unwrap_err().downcast_ref::<JoseError>(),
                Some(JoseError::UnsupportedAlgorithm(_))
            ));
        }
    }

    #[test]
    fn content_roundtrip_through_registry() {
        for enc in [
            "A128GCM",
            "A192GCM",
            "A256GCM",
            "A128CBC-HS256",
            "A192CBC-HS384",
            "A256CBC-HS512",
        ] {
            let key = oct(key_length(enc).unwrap() / 8);
            let params = Params {
                aad: b"header".to_vec(),
                ..Default::default()
            };
            let encrypted = encrypt(enc, &key, b"hello world", &params).unwrap();
            let iv = encrypted.iv.clone().unwrap();
            assert_eq!(iv.len() * 8, nonce_length(enc).unwrap());
            let params = Params {
                iv: Some(iv),
                tag: encrypted.tag.clone(),
                ..params
            };
            assert_eq!(
                decrypt(enc, &key, &encrypted.data, &params).unwrap(),
                b"hello world"
            );
        }
    }

    #[test]
    fn gcm_key_wrap_uses_header() {
        let key = oct(16);
        let cek = generate_cek("A128CBC-HS256").unwrap();
        let wrapped = encrypt("A128GCMKW", &key, &cek, &Params::default()).unwrap();
        assert!(wrapped.header.contains_key("iv") && wrapped.header.contains_key("tag"));
        let params = Params {
            header: wrapped.header.clone(),
            ..Default::default()
        };
        assert_eq!(
            decrypt("A128GCMKW", &key, &wrapped.data, &params).unwrap(),
            cek.to_vec()
        );
        assert!(decrypt("A128GCMKW", &key, &wrapped.data, &Params::default()).is_err());
    }

    #[test]
    fn dir_is_single_use() {
        let key = oct(32);
        let result = encrypt("dir", &key, &[], &Params::default()).unwrap();
        assert!(result.once && result.direct);
        assert_eq!(result.data, key.octets().unwrap());
    }

    #[test]
    fn kw_rejects_wrong_kek_size() {
        let err = encrypt("A256KW", &oct(16), &[0u8; 16], &Params::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<JoseError>(),
            Some(JoseError::InvalidKeySize)
        ));
    }

    #[test]
    fn derive_families() {
        let key = KeyMaterial::Octet(OctetKey::from_bytes(vec![0x0b; 22]).unwrap());
        let okm = derive(
            "HKDF-SHA-256",
            &key,
            &DeriveParams {
                length: Some(42),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(okm.len(), 42);
        assert!(derive("CONCAT-SHA-256", &key, &DeriveParams::default()).is_err());

        let alice = EcKey::generate(EcCurve::P256).unwrap();
        let bob = EcKey::generate(EcCurve::P256).unwrap();
        let params = |public: &EcKey| DeriveParams {
            public: Some(public.to_public()),
            ..Default::default()
        };
        let ab = derive("ECDH", &KeyMaterial::Ec(alice.clone()), &params(&bob)).unwrap();
        let ba = derive("ECDH", &KeyMaterial::Ec(bob), &params(&alice)).unwrap();
        assert_eq!(ab.len(), 32);
        assert_eq!(ab, ba);
    }
}
