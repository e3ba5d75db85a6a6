//! Secure Key Manager Error Types
//!
//! 키 매니저 전역 에러 타입 정의

use serde::Serialize;
use thiserror::Error;

/// 키 매니저 에러
///
/// 호출자는 "키 없음", "복호화 실패(손상/변조)", "스토리지 장애"를 구분할 수 있어야 하므로
/// 어떤 경우에도 bool 하나로 뭉개지 않습니다. 메시지에는 시크릿 값이나 키 바이트를 넣지 않습니다.
#[derive(Error, Debug)]
pub enum KeyManagerError {
    #[error("Secret not found: {name}")]
    NotFound { name: String },

    #[error("Decryption failed for secret '{name}': {reason}")]
    DecryptionFailed { name: String, reason: String },

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Master key unreadable for namespace '{namespace}': {reason}")]
    MasterKeyUnreadable { namespace: String, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid secret name: {0}")]
    InvalidName(String),

    #[error("Invalid secret value: {0}")]
    InvalidValue(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Env file error: {0}")]
    EnvFile(String),
}

impl KeyManagerError {
    /// 호출자/CLI용 고정 에러 코드
    pub fn code(&self) -> &'static str {
        match self {
            KeyManagerError::NotFound { .. } => "NOT_FOUND",
            KeyManagerError::DecryptionFailed { .. } => "DECRYPTION_FAILED",
            KeyManagerError::EncryptionFailed(_) => "ENCRYPTION_FAILED",
            KeyManagerError::MasterKeyUnreadable { .. } => "MASTER_KEY_UNREADABLE",
            KeyManagerError::Database(_) | KeyManagerError::Io(_) => "STORAGE_IO_ERROR",
            KeyManagerError::InvalidName(_) => "INVALID_NAME",
            KeyManagerError::InvalidValue(_) => "INVALID_VALUE",
            KeyManagerError::InvalidConfig(_) => "INVALID_CONFIG",
            KeyManagerError::EnvFile(_) => "ENV_FILE_ERROR",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, KeyManagerError::NotFound { .. })
    }

    /// rusqlite/IO 모두 StorageIOError 계열
    pub fn is_storage(&self) -> bool {
        matches!(self, KeyManagerError::Database(_) | KeyManagerError::Io(_))
    }

    pub(crate) fn poisoned(what: &str) -> Self {
        KeyManagerError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("{} lock poisoned", what),
        ))
    }
}

/// 직렬화 가능한 에러 (CLI `--json` 출력용)
#[derive(Debug, Serialize)]
pub struct CommandError {
    pub code: String,
    pub message: String,
}

impl From<&KeyManagerError> for CommandError {
    fn from(error: &KeyManagerError) -> Self {
        CommandError {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, KeyManagerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        let err = KeyManagerError::NotFound {
            name: "openai_api_key".to_string(),
        };
        assert_eq!(err.code(), "NOT_FOUND");
        assert!(err.is_not_found());
        assert!(!err.is_storage());

        let err = KeyManagerError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        assert_eq!(err.code(), "STORAGE_IO_ERROR");
        assert!(err.is_storage());
    }

    #[test]
    fn test_command_error_carries_code_and_message() {
        let err = KeyManagerError::MasterKeyUnreadable {
            namespace: "acme".to_string(),
            reason: "checksum mismatch".to_string(),
        };
        let cmd = CommandError::from(&err);
        assert_eq!(cmd.code, "MASTER_KEY_UNREADABLE");
        assert!(cmd.message.contains("acme"));
    }
}
