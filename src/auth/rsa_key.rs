//! RSA key exchange used by `caching_sha2_password` and `sha256_password`
//! when the channel is not already secure.

use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Oaep, RsaPublicKey};
use sha1::Sha1;

use crate::auth::xor_bytes;
use crate::error::{Error, Result};

/// Parse the PEM public key a server sends in reply to a key request.
/// Servers emit both SPKI and PKCS#1 encodings depending on version.
pub fn parse_public_key(pem: &[u8]) -> Result<RsaPublicKey> {
    let pem = simdutf8::basic::from_utf8(pem).map_err(|_| Error::MalformedPacket)?;
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|_| Error::MalformedPacket)
}

/// Encrypt `(password ++ NUL) XOR seed` with RSA-OAEP(SHA1).
pub fn encrypt_password(password: &str, seed: &[u8], key: &RsaPublicKey) -> Result<Vec<u8>> {
    let mut plain = Vec::with_capacity(password.len() + 1);
    plain.extend_from_slice(password.as_bytes());
    plain.push(0);
    xor_bytes(&mut plain, seed);

    key.encrypt(&mut rand::rngs::OsRng, Oaep::new::<Sha1>(), &plain)
        .map_err(Error::from_debug)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::RsaPrivateKey;
    use rsa::pkcs8::EncodePublicKey;
    use rsa::traits::PublicKeyParts;

    fn test_key() -> RsaPrivateKey {
        // Small key to keep the test fast; real servers use 2048 bits.
        RsaPrivateKey::new(&mut rand::rngs::OsRng, 1024).unwrap()
    }

    #[test]
    fn pem_parse_spki() {
        let key = test_key();
        let pem = key
            .to_public_key()
            .to_public_key_pem(rsa::pkcs8::LineEnding::LF)
            .unwrap();
        let parsed = parse_public_key(pem.as_bytes()).unwrap();
        assert_eq!(parsed.n(), key.to_public_key().n());
    }

    #[test]
    fn encrypted_password_decrypts_to_xored_plaintext() {
        let key = test_key();
        let seed = [7u8; 20];
        let ciphertext = encrypt_password("secret", &seed, &key.to_public_key()).unwrap();
        let plain = key.decrypt(Oaep::new::<Sha1>(), &ciphertext).unwrap();

        let mut expected = b"secret\0".to_vec();
        xor_bytes(&mut expected, &seed);
        assert_eq!(plain, expected);
    }

    #[test]
    fn garbage_pem_is_refused() {
        assert!(parse_public_key(b"not a key").is_err());
    }
}
