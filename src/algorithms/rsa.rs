//! RSASSA-PKCS1-v1_5, RSASSA-PSS, RSAES-OAEP and RSAES-PKCS1-v1_5.

use rsa::traits::PublicKeyParts;
use rsa::{Oaep, Pkcs1v15Encrypt, Pkcs1v15Sign, Pss};

use super::digest::HashAlg;
use crate::error::*;
use crate::jwk::RsaKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Padding {
    Pkcs1,
    Pss,
}

fn signature_params(alg: &str) -> Result<(Padding, HashAlg), Error> {
    let padding = match alg.get(..2) {
        Some("RS") => Padding::Pkcs1,
        Some("PS") => Padding::Pss,
        _ => bail!(JoseError::UnsupportedAlgorithm(alg.to_string())),
    };
    let bits = alg[2..]
        .parse::<usize>()
        .map_err(|_| JoseError::UnsupportedAlgorithm(alg.to_string()))?;
    Ok((padding, HashAlg::from_bits(bits)?))
}

macro_rules! with_digest {
    ($hash:expr, $scheme:ident) => {
        match $hash {
            HashAlg::Sha256 => $scheme::new::<sha2::Sha256>(),
            HashAlg::Sha384 => $scheme::new::<sha2::Sha384>(),
            HashAlg::Sha512 => $scheme::new::<sha2::Sha512>(),
            HashAlg::Sha1 => $scheme::new::<sha1::Sha1>(),
        }
    };
}

/// Whether a modulus of `bits` leaves room for the padding and digest.
fn fits(padding: Padding, hash: HashAlg, bits: usize) -> bool {
    match padding {
        // 0x00 0x01, at least 8 bytes of 0xff, 0x00, then the DigestInfo.
        Padding::Pkcs1 => (bits + 7) / 8 >= 11 + 19 + hash.output_len(),
        // Salt as long as the digest, plus the 0x01 separator and 0xbc trailer.
        Padding::Pss => (bits + 6) / 8 >= 2 * hash.output_len() + 2,
    }
}

pub fn sign(alg: &str, key: &RsaKey, data: &[u8]) -> Result<Vec<u8>, Error> {
    let (padding, hash) = signature_params(alg)?;
    let private = key.private_key().ok_or(JoseError::MissingPrivateKey)?;
    ensure!(
        fits(padding, hash, private.n().bits()),
        JoseError::InvalidKeySize
    );
    let digest = hash.hash(data);
    let mut rng = rand::thread_rng();
    let signature = match padding {
        Padding::Pkcs1 => {
            private.sign_with_rng(&mut rng, with_digest!(hash, Pkcs1v15Sign), &digest)
        }
        Padding::Pss => private.sign_with_rng(&mut rng, with_digest!(hash, Pss), &digest),
    };
    signature.map_err(|_| JoseError::InternalError("RSA signing failed".to_string()).into())
}

pub fn verify(alg: &str, key: &RsaKey, data: &[u8], signature: &[u8]) -> Result<(), Error> {
    let (padding, hash) = signature_params(alg)?;
    let digest = hash.hash(data);
    let public = key.public_key();
    let verified = match padding {
        Padding::Pkcs1 => public.verify(with_digest!(hash, Pkcs1v15Sign), &digest, signature),
        Padding::Pss => public.verify(with_digest!(hash, Pss), &digest, signature),
    };
    verified.map_err(|_| JoseError::InvalidSignature.into())
}

pub fn encrypt(alg: &str, key: &RsaKey, data: &[u8]) -> Result<Vec<u8>, Error> {
    let public = key.public_key();
    let mut rng = rand::thread_rng();
    let encrypted = match alg {
        "RSA-OAEP" => public.encrypt(&mut rng, Oaep::new::<sha1::Sha1>(), data),
        "RSA-OAEP-256" => public.encrypt(&mut rng, Oaep::new::<sha2::Sha256>(), data),
        "RSA1_5" => public.encrypt(&mut rng, Pkcs1v15Encrypt, data),
        _ => bail!(JoseError::UnsupportedAlgorithm(alg.to_string())),
    };
    encrypted.map_err(|_| JoseError::InvalidParameter("message too long".to_string()).into())
}

pub fn decrypt(alg: &str, key: &RsaKey, data: &[u8]) -> Result<Vec<u8>, Error> {
    let private = key.private_key().ok_or(JoseError::MissingPrivateKey)?;
    let mut rng = rand::thread_rng();
    let decrypted = match alg {
        "RSA-OAEP" => private.decrypt_blinded(&mut rng, Oaep::new::<sha1::Sha1>(), data),
        "RSA-OAEP-256" => private.decrypt_blinded(&mut rng, Oaep::new::<sha2::Sha256>(), data),
        "RSA1_5" => private.decrypt_blinded(&mut rng, Pkcs1v15Encrypt, data),
        _ => bail!(JoseError::UnsupportedAlgorithm(alg.to_string())),
    };
    decrypted.map_err(|_| JoseError::DecryptionFailed.into())
}
