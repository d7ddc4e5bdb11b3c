//! SHA-1 and SHA-2 digests and HMACs.

use hmac_sha512::sha384;

use crate::error::*;

/// A hash function usable for digests, HMACs and key derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlg {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlg {
    /// Parse a registry name such as `SHA-256`.
    pub fn from_name(name: &str) -> Result<Self, Error> {
        match name {
            "SHA-1" => Ok(HashAlg::Sha1),
            "SHA-256" => Ok(HashAlg::Sha256),
            "SHA-384" => Ok(HashAlg::Sha384),
            "SHA-512" => Ok(HashAlg::Sha512),
            _ => bail!(JoseError::UnsupportedAlgorithm(name.to_string())),
        }
    }

    /// The hash paired with a SHA-2 bit size (256, 384 or 512).
    pub fn from_bits(bits: usize) -> Result<Self, Error> {
        match bits {
            256 => Ok(HashAlg::Sha256),
            384 => Ok(HashAlg::Sha384),
            512 => Ok(HashAlg::Sha512),
            _ => bail!(JoseError::UnsupportedAlgorithm(format!("SHA-{}", bits))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HashAlg::Sha1 => "SHA-1",
            HashAlg::Sha256 => "SHA-256",
            HashAlg::Sha384 => "SHA-384",
            HashAlg::Sha512 => "SHA-512",
        }
    }

    /// Output size in bytes.
    pub fn output_len(&self) -> usize {
        match self {
            HashAlg::Sha1 => 20,
            HashAlg::Sha256 => 32,
            HashAlg::Sha384 => 48,
            HashAlg::Sha512 => 64,
        }
    }

    pub fn hash(&self, data: &[u8]) -> Vec<u8> {
        match self {
            HashAlg::Sha1 => hmac_sha1_compact::Hash::hash(data).to_vec(),
            HashAlg::Sha256 => hmac_sha256::Hash::hash(data).to_vec(),
            HashAlg::Sha384 => sha384::Hash::hash(data).to_vec(),
            HashAlg::Sha512 => hmac_sha512::Hash::hash(data).to_vec(),
        }
    }

    pub fn hmac(&self, key: &[u8], data: &[u8]) -> Vec<u8> {
        match self {
            HashAlg::Sha1 => hmac_sha1_compact::HMAC::mac(data, key).to_vec(),
            HashAlg::Sha256 => hmac_sha256::HMAC::mac(data, key).to_vec(),
            HashAlg::Sha384 => sha384::HMAC::mac(data, key).to_vec(),
            HashAlg::Sha512 => hmac_sha512::HMAC::mac(data, key).to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_abc() {
        let digest = HashAlg::Sha256.hash(b"abc");
        assert_eq!(
            digest[..4],
            [0xba, 0x78, 0x16, 0xbf],
            "FIPS 180-2 test vector prefix"
        );
        assert_eq!(digest.len(), HashAlg::Sha256.output_len());
    }

    #[test]
    fn output_lengths() {
        for h in [HashAlg::Sha1, HashAlg::Sha256, HashAlg::Sha384, HashAlg::Sha512] {
            assert_eq!(h.hash(b"").len(), h.output_len());
            assert_eq!(h.hmac(b"k", b"").len(), h.output_len());
            assert_eq!(HashAlg::from_name(h.name()).unwrap(), h);
        }
        assert!(HashAlg::from_name("MD5").is_err());
    }
}
