//! AES and SHA-1 primitives used by the SPC and CKC pipelines.
//!
//! FairPlay payloads are always block aligned, so CBC runs without padding.

use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;
use cbc::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use sha1::{Digest, Sha1};

use crate::constants::{AES128_BLOCK_SIZE, AES128_KEY_SZ};
use crate::error::{Result, Status};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// AES-128-CBC decrypt a block aligned buffer.
pub fn aes_cbc_decrypt(key: &[u8; 16], iv: &[u8; 16], data: &[u8]) -> Result<Vec<u8>> {
    fps_ensure!(
        !data.is_empty() && data.len() % AES128_BLOCK_SIZE == 0,
        Status::ParamErr,
        "ciphertext length {} is not a non-zero multiple of {}",
        data.len(),
        AES128_BLOCK_SIZE
    );

    let mut buffer = data.to_vec();
    let decryptor = Aes128CbcDec::new(key.into(), iv.into());
    match decryptor.decrypt_padded_mut::<NoPadding>(&mut buffer) {
        Ok(plain) => Ok(plain.to_vec()),
        Err(e) => fps_bail!(Status::InternalErr, "AES-CBC decryption failed: {}", e),
    }
}

/// AES-128-CBC encrypt a block aligned buffer.
pub fn aes_cbc_encrypt(key: &[u8; 16], iv: &[u8; 16], data: &[u8]) -> Result<Vec<u8>> {
    fps_ensure!(
        data.len() % AES128_BLOCK_SIZE == 0,
        Status::ParamErr,
        "plaintext length {} is not a multiple of {}",
        data.len(),
        AES128_BLOCK_SIZE
    );

    let mut buffer = data.to_vec();
    let len = buffer.len();
    let encryptor = Aes128CbcEnc::new(key.into(), iv.into());
    match encryptor.encrypt_padded_mut::<NoPadding>(&mut buffer, len) {
        Ok(cipher) => Ok(cipher.to_vec()),
        Err(e) => fps_bail!(Status::InternalErr, "AES-CBC encryption failed: {}", e),
    }
}

/// AES-128-ECB encrypt a single block.
#[must_use]
pub fn aes_ecb_encrypt_block(key: &[u8; 16], block: &[u8; 16]) -> [u8; 16] {
    let cipher = Aes128::new(key.into());
    let mut out = aes::Block::from(*block);
    cipher.encrypt_block(&mut out);
    out.into()
}

/// First 16 bytes of SHA-1(`data`).
#[must_use]
pub fn sha1_truncated(data: &[u8]) -> [u8; AES128_KEY_SZ] {
    let digest = Sha1::digest(data);
    let mut out = [0u8; AES128_KEY_SZ];
    out.copy_from_slice(&digest[..AES128_KEY_SZ]);
    out
}

#[cfg(test)]
mod tests {
    use super::{aes_cbc_decrypt, aes_cbc_encrypt, aes_ecb_encrypt_block, sha1_truncated};
    use crate::error::Status;

    #[test]
    fn cbc_decrypt_inverts_encrypt() {
        let key = [1u8; 16];
        let iv = [2u8; 16];
        let plain = (0u8..48).collect::<Vec<_>>();
        let cipher = aes_cbc_encrypt(&key, &iv, &plain).expect("encrypt");
        assert_ne!(cipher, plain);
        assert_eq!(aes_cbc_decrypt(&key, &iv, &cipher).expect("decrypt"), plain);
    }

    #[test]
    fn cbc_rejects_unaligned() {
        let err = aes_cbc_decrypt(&[0; 16], &[0; 16], &[0u8; 17]).expect_err("unaligned");
        assert_eq!(err.status(), Status::ParamErr);
        let err = aes_cbc_decrypt(&[0; 16], &[0; 16], &[]).expect_err("empty");
        assert_eq!(err.status(), Status::ParamErr);
    }

    #[test]
    fn ecb_known_answer() {
        // FIPS-197 appendix C.1
        let key: [u8; 16] = hex::decode("000102030405060708090a0b0c0d0e0f")
            .expect("hex")
            .try_into()
            .expect("16 bytes");
        let plain: [u8; 16] = hex::decode("00112233445566778899aabbccddeeff")
            .expect("hex")
            .try_into()
            .expect("16 bytes");
        assert_eq!(
            hex::encode(aes_ecb_encrypt_block(&key, &plain)),
            "69c4e0d86a7b0430d8cdb78070b4c55a"
        );
    }

    #[test]
    fn sha1_is_truncated() {
        // SHA-1("abc") = a9993e364706816aba3e25717850c26c9cd0d89d
        assert_eq!(
            hex::encode(sha1_truncated(b"abc")),
            "a9993e364706816aba3e25717850c26c"
        );
    }
}
