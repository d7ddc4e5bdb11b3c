//! ECDSA over P-256, P-384 and P-521 with the JOSE fixed-width `r || s` encoding.

use p256::ecdsa::signature::{RandomizedSigner, Verifier};

use crate::error::*;
use crate::jwk::{EcCurve, EcKey};

macro_rules! ecdsa_sign {
    ($curve:ident, $d:expr, $data:expr) => {{
        let sk = $curve::ecdsa::SigningKey::from_slice($d)
            .map_err(|_| JoseError::InvalidKeyFormat)?;
        let signature: $curve::ecdsa::Signature = sk
            .try_sign_with_rng(&mut rand::thread_rng(), $data)
            .map_err(|_| JoseError::InternalError("ECDSA signing failed".to_string()))?;
        signature.to_bytes().to_vec()
    }};
}

macro_rules! ecdsa_verify {
    ($curve:ident, $sec1:expr, $data:expr, $signature:expr) => {{
        let vk = $curve::ecdsa::VerifyingKey::from_sec1_bytes($sec1)
            .map_err(|_| JoseError::InvalidKeyFormat)?;
        let signature = $curve::ecdsa::Signature::from_slice($signature)
            .map_err(|_| JoseError::InvalidSignature)?;
        vk.verify($data, &signature)
            .map_err(|_| JoseError::InvalidSignature)?
    }};
}

/// The curve is fixed by the algorithm, and must be the key's.
fn check_curve(alg: &str, key: &EcKey) -> Result<EcCurve, Error> {
    let curve = key.curve();
    ensure!(
        curve.signature_alg() == alg,
        JoseError::UnsupportedAlgorithm(alg.to_string())
    );
    Ok(curve)
}

/// Signs with a fresh random nonce; the result is `r || s`.
pub fn sign(alg: &str, key: &EcKey, data: &[u8]) -> Result<Vec<u8>, Error> {
    let curve = check_curve(alg, key)?;
    let d = key.d().ok_or(JoseError::MissingPrivateKey)?;
    Ok(match curve {
        EcCurve::P256 => ecdsa_sign!(p256, d, data),
        EcCurve::P384 => ecdsa_sign!(p384, d, data),
        EcCurve::P521 => ecdsa_sign!(p521, d, data),
    })
}

/// Rejects signatures of the wrong size and `r`, `s` outside `[1, n-1]`.
pub fn verify(alg: &str, key: &EcKey, data: &[u8], signature: &[u8]) -> Result<(), Error> {
    let curve = check_curve(alg, key)?;
    ensure!(
        signature.len() == 2 * curve.coordinate_len(),
        JoseError::InvalidSignature
    );
    let sec1 = key.sec1_uncompressed();
    match curve {
        EcCurve::P256 => ecdsa_verify!(p256, &sec1, data, signature),
        EcCurve::P384 => ecdsa_verify!(p384, &sec1, data, signature),
        EcCurve::P521 => ecdsa_verify!(p521, &sec1, data, signature),
    }
    Ok(())
}
