//! Key import from PEM armor and DER structures.

use p256::pkcs8::spki::SubjectPublicKeyInfoRef;
use p256::pkcs8::{ObjectIdentifier, PrivateKeyInfo};
use x509_parser::pem::Pem;

use super::{EcCurve, EcKey, KeyMaterial, OctetKey, RsaKey};
use crate::algorithms::digest::HashAlg;
use crate::common::*;
use crate::error::*;

const OID_RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const OID_EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");

/// Encoding of serialized key input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyForm {
    /// JWK JSON text.
    Json,
    /// PEM armor around any of the DER forms below.
    Pem,
    /// PKCS#8 `PrivateKeyInfo`.
    Pkcs8,
    /// `SubjectPublicKeyInfo`.
    Spki,
    /// An X.509 certificate.
    Pkix,
    /// PKCS#1 `RSAPrivateKey`.
    Pkcs1,
    /// PKCS#1 `RSAPublicKey`.
    Pkcs1Public,
    /// SEC1 `ECPrivateKey`.
    Sec1,
    /// Either PKCS#1 or SEC1 private key.
    Private,
    /// Symmetric key octets, as is.
    Raw,
}

impl KeyForm {
    pub fn from_name(name: &str) -> Result<Self, Error> {
        match name.to_ascii_lowercase().as_str() {
            "json" => Ok(KeyForm::Json),
            "pem" => Ok(KeyForm::Pem),
            "pkcs8" => Ok(KeyForm::Pkcs8),
            "spki" | "public" => Ok(KeyForm::Spki),
            "pkix" | "x509" => Ok(KeyForm::Pkix),
            "pkcs1" => Ok(KeyForm::Pkcs1),
            "sec1" => Ok(KeyForm::Sec1),
            "private" => Ok(KeyForm::Private),
            "raw" | "oct" => Ok(KeyForm::Raw),
            _ => bail!(JoseError::InvalidParameter(format!("key form: {}", name))),
        }
    }

    fn from_pem_label(label: &str) -> Option<Self> {
        match label {
            "CERTIFICATE" => Some(KeyForm::Pkix),
            "PUBLIC KEY" => Some(KeyForm::Spki),
            "PRIVATE KEY" => Some(KeyForm::Pkcs8),
            "RSA PRIVATE KEY" => Some(KeyForm::Pkcs1),
            "RSA PUBLIC KEY" => Some(KeyForm::Pkcs1Public),
            "EC PRIVATE KEY" => Some(KeyForm::Sec1),
            _ => None,
        }
    }
}

/// Key material decoded from DER, plus what a certificate says about it.
#[derive(Debug)]
pub(crate) struct Imported {
    pub material: KeyMaterial,
    pub kid: Option<String>,
    pub x5t: Option<String>,
}

impl From<KeyMaterial> for Imported {
    fn from(material: KeyMaterial) -> Self {
        Imported {
            material,
            kid: None,
            x5t: None,
        }
    }
}

/// Imports the first PEM block with a supported label.
pub(crate) fn import_pem(pem: &[u8]) -> Result<Imported, Error> {
    for block in Pem::iter_from_buffer(pem) {
        let block = block.map_err(|_| JoseError::InvalidKeyFormat)?;
        if let Some(form) = KeyForm::from_pem_label(&block.label) {
            return import_der(&block.contents, form);
        }
    }
    bail!(JoseError::InvalidKeyFormat)
}

pub(crate) fn import_der(der: &[u8], form: KeyForm) -> Result<Imported, Error> {
    let material = match form {
        KeyForm::Json | KeyForm::Pem => {
            bail!(JoseError::InvalidParameter("DER key form".to_string()))
        }
        KeyForm::Pkcs8 => from_pkcs8(der)?,
        KeyForm::Spki => from_spki(der)?,
        KeyForm::Pkix => return from_certificate(der),
        KeyForm::Pkcs1 => KeyMaterial::Rsa(RsaKey::from_pkcs1_der(der)?),
        KeyForm::Pkcs1Public => KeyMaterial::Rsa(RsaKey::from_pkcs1_public_der(der)?),
        KeyForm::Sec1 => KeyMaterial::Ec(EcKey::from_sec1_der(der)?),
        KeyForm::Private => match RsaKey::from_pkcs1_der(der) {
            Ok(key) => KeyMaterial::Rsa(key),
            Err(_) => KeyMaterial::Ec(EcKey::from_sec1_der(der)?),
        },
        KeyForm::Raw => KeyMaterial::Octet(OctetKey::from_bytes(der)?),
    };
    Ok(material.into())
}

fn from_pkcs8(der: &[u8]) -> Result<KeyMaterial, Error> {
    let info = PrivateKeyInfo::try_from(der).map_err(|_| JoseError::InvalidKeyFormat)?;
    let oid = info.algorithm.oid;
    if oid == OID_RSA_ENCRYPTION {
        Ok(KeyMaterial::Rsa(RsaKey::from_pkcs8_der(der)?))
    } else if oid == OID_EC_PUBLIC_KEY {
        let curve_oid = info
            .algorithm
            .parameters_oid()
            .map_err(|_| JoseError::InvalidKeyFormat)?;
        let curve = EcCurve::from_oid(&curve_oid)?;
        Ok(KeyMaterial::Ec(EcKey::from_pkcs8_der(curve, der)?))
    } else {
        bail!(JoseError::UnsupportedKeyType(oid.to_string()))
    }
}

fn from_spki(der: &[u8]) -> Result<KeyMaterial, Error> {
    let info = SubjectPublicKeyInfoRef::try_from(der).map_err(|_| JoseError::InvalidKeyFormat)?;
    let oid = info.algorithm.oid;
    if oid == OID_RSA_ENCRYPTION {
        Ok(KeyMaterial::Rsa(RsaKey::from_spki_der(der)?))
    } else if oid == OID_EC_PUBLIC_KEY {
        let curve_oid = info
            .algorithm
            .parameters_oid()
            .map_err(|_| JoseError::InvalidKeyFormat)?;
        let curve = EcCurve::from_oid(&curve_oid)?;
        Ok(KeyMaterial::Ec(EcKey::from_spki_der(curve, der)?))
    } else {
        bail!(JoseError::UnsupportedKeyType(oid.to_string()))
    }
}

/// The subject key of a certificate. The subject CN becomes the suggested
/// `kid` and the SHA-1 of the DER becomes `x5t`.
fn from_certificate(der: &[u8]) -> Result<Imported, Error> {
    let (_, cert) =
        x509_parser::parse_x509_certificate(der).map_err(|_| JoseError::InvalidKeyFormat)?;
    let material = from_spki(cert.public_key().raw)?;
    let kid = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(String::from);
    let x5t = Some(b64_encode(HashAlg::Sha1.hash(der))?);
    Ok(Imported { material, kid, x5t })
}
