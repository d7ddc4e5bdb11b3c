//! ECDH-ES key agreement (RFC 7518 section 4.6), direct and with AES key wrap.

use serde_json::Value;
use zeroize::Zeroizing;

use super::digest::HashAlg;
use super::{aes_kw, kdf, key_length, Encrypted, Params};
use crate::common::*;
use crate::error::*;
use crate::jwk::{EcCurve, EcKey, KeyOperations};

macro_rules! agree {
    ($curve:ident, $d:expr, $peer:expr) => {{
        let sk = $curve::SecretKey::from_slice($d).map_err(|_| JoseError::InvalidKeyFormat)?;
        let pk = $curve::PublicKey::from_sec1_bytes($peer)
            .map_err(|_| JoseError::InvalidKeyFormat)?;
        let shared = $curve::ecdh::diffie_hellman(sk.to_nonzero_scalar(), pk.as_affine());
        Zeroizing::new(shared.raw_secret_bytes().to_vec())
    }};
}

/// The raw shared secret `Z` between a private key and a peer public key.
pub fn shared_secret(private: &EcKey, public: &EcKey) -> Result<Zeroizing<Vec<u8>>, Error> {
    ensure!(
        private.curve() == public.curve(),
        JoseError::UnsupportedCurve(public.curve().name().to_string())
    );
    let d = private.d().ok_or(JoseError::MissingPrivateKey)?;
    let peer = public.sec1_uncompressed();
    Ok(match private.curve() {
        EcCurve::P256 => agree!(p256, d, &peer),
        EcCurve::P384 => agree!(p384, d, &peer),
        EcCurve::P521 => agree!(p521, d, &peer),
    })
}

/// Direct agreement derives a key for the `enc` algorithm; the wrapping
/// variants derive a key for their AES-KW suffix.
fn algorithm_id<'h>(alg: &'h str, header: &'h Header) -> Result<&'h str, Error> {
    if alg == "ECDH-ES" {
        return header
            .get("enc")
            .and_then(Value::as_str)
            .ok_or_else(|| JoseError::InvalidParameter("enc".to_string()).into());
    }
    alg.strip_prefix("ECDH-ES+")
        .ok_or_else(|| JoseError::UnsupportedAlgorithm(alg.to_string()).into())
}

fn derive_key(
    alg: &str,
    private: &EcKey,
    public: &EcKey,
    header: &Header,
) -> Result<Zeroizing<Vec<u8>>, Error> {
    let alg_id = algorithm_id(alg, header)?;
    let key_bits = key_length(alg_id)?;
    let apu = b64_member(header, "apu")?.unwrap_or_default();
    let apv = b64_member(header, "apv")?.unwrap_or_default();
    let shared = shared_secret(private, public)?;
    let other_info = kdf::concat_other_info(alg_id, &apu, &apv, key_bits);
    kdf::concat_kdf(HashAlg::Sha256, &shared, &other_info, key_bits / 8)
}

fn epk_member(epk: &EcKey) -> Result<Value, Error> {
    let mut members = epk.public_members()?;
    members.insert("kty".to_string(), Value::String("EC".to_string()));
    Ok(Value::Object(members))
}

/// Agrees on a key with the recipient's static public key.
///
/// An ephemeral key is generated unless `params.epk` provides one. Its public
/// half is returned in the `epk` header member.
pub fn wrap(alg: &str, recipient: &EcKey, cek: &[u8], params: &Params) -> Result<Encrypted, Error> {
    let epk = match &params.epk {
        Some(epk) => epk.clone(),
        None => EcKey::generate(recipient.curve())?,
    };
    let derived = derive_key(alg, &epk, recipient, &params.header)?;
    let mut header = Header::new();
    header.insert("epk".to_string(), epk_member(&epk)?);
    if alg == "ECDH-ES" {
        return Ok(Encrypted {
            data: derived.to_vec(),
            header,
            once: true,
            direct: true,
            ..Default::default()
        });
    }
    Ok(Encrypted {
        data: aes_kw::wrap(&derived, cek)?,
        header,
        ..Default::default()
    })
}

/// Recovers the CEK using the `epk` header member and the static private key.
pub fn unwrap(
    alg: &str,
    recipient: &EcKey,
    encrypted_key: &[u8],
    params: &Params,
) -> Result<Zeroizing<Vec<u8>>, Error> {
    ensure!(recipient.d().is_some(), JoseError::MissingPrivateKey);
    let epk = match params.header.get("epk") {
        Some(Value::Object(members)) => EcKey::from_jwk(members)?.to_public(),
        _ => bail!(JoseError::InvalidParameter("epk".to_string())),
    };
    let derived = derive_key(alg, recipient, &epk, &params.header)?;
    if alg == "ECDH-ES" {
        return Ok(derived);
    }
    aes_kw::unwrap(&derived, encrypted_key)
}
