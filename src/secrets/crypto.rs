//! 시크릿 암호화/복호화 (Crypto Engine)
//!
//! 저장 포맷 (v1):
//! - magic: `SKM1` (4 bytes)
//! - nonce: 24 bytes (XChaCha20-Poly1305)
//! - ciphertext: AEAD 결과 (= 암호문 + 태그)
//!
//! AAD: magic + 네임스페이스 + 시크릿 이름. 행을 다른 이름/네임스페이스로 옮기면 복호화가 실패합니다.
//! 키는 호출마다 인자로만 받으며 이 모듈은 키를 캐시하지 않습니다.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::Rng;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// 포맷 매직 (4 bytes)
pub const CIPHERTEXT_MAGIC: &[u8; 4] = b"SKM1";

/// 마스터키 길이 (256-bit)
pub const MASTER_KEY_LEN: usize = 32;

/// Nonce 길이 (XChaCha20-Poly1305용 24 bytes)
pub const NONCE_LEN: usize = 24;

/// Poly1305 태그 길이
pub const TAG_LEN: usize = 16;

/// 암호화 오류
///
/// 상위 레이어에서 시크릿 이름을 붙여 `KeyManagerError`로 변환합니다.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("ciphertext too short ({0} bytes)")]
    Truncated(usize),

    #[error("unknown ciphertext format")]
    InvalidMagic,

    #[error("authentication failed (corrupted data or wrong key)")]
    Authentication,

    #[error("encryption failed")]
    Encryption,
}

/// Zeroize가 적용된 마스터키
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    bytes: [u8; MASTER_KEY_LEN],
}

impl MasterKey {
    /// 마스터키 생성 (CSPRNG)
    pub fn generate() -> Self {
        let mut bytes = [0u8; MASTER_KEY_LEN];
        rand::thread_rng().fill(&mut bytes);
        Self { bytes }
    }

    /// 길이가 맞지 않으면 `None`
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != MASTER_KEY_LEN {
            return None;
        }
        let mut key = [0u8; MASTER_KEY_LEN];
        key.copy_from_slice(bytes);
        Some(Self { bytes: key })
    }

    pub(crate) fn as_bytes(&self) -> &[u8; MASTER_KEY_LEN] {
        &self.bytes
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey([REDACTED])")
    }
}

/// 네임스페이스/이름 바인딩용 AAD
fn associated_data(namespace: &str, name: &str) -> Vec<u8> {
    let mut aad = Vec::with_capacity(CIPHERTEXT_MAGIC.len() + 4 + namespace.len() + name.len());
    aad.extend_from_slice(CIPHERTEXT_MAGIC);
    aad.extend_from_slice(&(namespace.len() as u32).to_be_bytes());
    aad.extend_from_slice(namespace.as_bytes());
    aad.extend_from_slice(name.as_bytes());
    aad
}

/// 평문을 암호화 (`magic || nonce || ciphertext+tag`)
///
/// 호출마다 새 랜덤 nonce를 쓰므로 같은 평문도 매번 다른 암호문이 됩니다.
pub fn encrypt(
    key: &MasterKey,
    namespace: &str,
    name: &str,
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    // 랜덤 nonce 생성
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill(&mut nonce);

    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let aad = associated_data(namespace, name);

    let sealed = cipher
        .encrypt(
            XNonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: &aad,
            },
        )
        .map_err(|_| CryptoError::Encryption)?;

    let mut out = Vec::with_capacity(CIPHERTEXT_MAGIC.len() + NONCE_LEN + sealed.len());
    out.extend_from_slice(CIPHERTEXT_MAGIC);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// [`encrypt`] 결과를 복호화
///
/// 변조, 잘림, 다른 키, 다른 이름/네임스페이스 모두 에러이며 절대 깨진 평문을 돌려주지 않습니다.
pub fn decrypt(
    key: &MasterKey,
    namespace: &str,
    name: &str,
    data: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let header_len = CIPHERTEXT_MAGIC.len() + NONCE_LEN;
    if data.len() < header_len + TAG_LEN {
        return Err(CryptoError::Truncated(data.len()));
    }

    // Magic 검증
    let (magic, rest) = data.split_at(CIPHERTEXT_MAGIC.len());
    if magic != CIPHERTEXT_MAGIC {
        return Err(CryptoError::InvalidMagic);
    }
    let (nonce, sealed) = rest.split_at(NONCE_LEN);

    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let aad = associated_data(namespace, name);

    cipher
        .decrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: sealed,
                aad: &aad,
            },
        )
        .map_err(|_| CryptoError::Authentication)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = MasterKey::generate();
        let sealed = encrypt(&key, "acme", "openai_api_key", b"sk-test123").unwrap();
        let opened = decrypt(&key, "acme", "openai_api_key", &sealed).unwrap();
        assert_eq!(opened, b"sk-test123");
    }

    #[test]
    fn test_same_plaintext_yields_distinct_ciphertext() {
        let key = MasterKey::generate();
        let a = encrypt(&key, "acme", "k", b"same").unwrap();
        let b = encrypt(&key, "acme", "k", b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails() {
        let key1 = MasterKey::generate();
        let key2 = MasterKey::generate();
        let sealed = encrypt(&key1, "acme", "k", b"secret").unwrap();

        // 다른 키로 복호화 시도하면 실패해야 함
        let result = decrypt(&key2, "acme", "k", &sealed);
        assert!(matches!(result, Err(CryptoError::Authentication)));
    }

    #[test]
    fn test_every_flipped_byte_is_detected() {
        let key = MasterKey::generate();
        let sealed = encrypt(&key, "acme", "k", b"secret-value").unwrap();
        for i in 0..sealed.len() {
            let mut tampered = sealed.clone();
            tampered[i] ^= 0x01;
            assert!(decrypt(&key, "acme", "k", &tampered).is_err(), "byte {} not detected", i);
        }
    }

    #[test]
    fn test_row_moved_to_other_name_or_namespace_fails() {
        let key = MasterKey::generate();
        let sealed = encrypt(&key, "acme", "k1", b"secret").unwrap();
        assert!(decrypt(&key, "acme", "k2", &sealed).is_err());
        assert!(decrypt(&key, "other", "k1", &sealed).is_err());
    }

    #[test]
    fn test_truncated_input() {
        let key = MasterKey::generate();
        let result = decrypt(&key, "acme", "k", b"SKM1short");
        assert!(matches!(result, Err(CryptoError::Truncated(9))));
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = MasterKey::from_slice(&[7u8; MASTER_KEY_LEN]).unwrap();
        assert_eq!(format!("{:?}", key), "MasterKey([REDACTED])");
        assert!(MasterKey::from_slice(&[0u8; 16]).is_none());
    }
}
