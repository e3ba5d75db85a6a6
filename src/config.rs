//! 키 매니저 설정
//!
//! `app_name` 하나만 필수이며, 나머지는 기본값 또는 환경 변수(`SKM_*`)로 덮어씁니다.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{KeyManagerError, Result};

/// 데이터 디렉토리 덮어쓰기
pub const ENV_DATA_DIR: &str = "SKM_DATA_DIR";
/// 마스터키 백엔드 선택 (`file` | `keyring`)
pub const ENV_MASTER_KEY_BACKEND: &str = "SKM_MASTER_KEY_BACKEND";

/// 기본 데이터 디렉토리 이름 (`dirs::data_dir()` 하위)
const DEFAULT_DIR_NAME: &str = "secure-key-manager";
const STORE_FILE_NAME: &str = "secrets.db";
const MASTER_KEY_FILE_NAME: &str = "master.key";

/// 대부분의 파일시스템이 허용하는 경로 구성요소 최대 길이 (bytes)
const MAX_COMPONENT_LEN: usize = 255;
/// 긴 이름을 줄일 때 남기는 이스케이프 접두어 길이
const HASHED_PREFIX_LEN: usize = 64;

/// 마스터키 보관 위치
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MasterKeyBackend {
    /// 네임스페이스 디렉토리의 `master.key` (0600)
    #[default]
    File,
    /// OS 키체인/키링
    Keyring,
}

impl std::str::FromStr for MasterKeyBackend {
    type Err = KeyManagerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(MasterKeyBackend::File),
            "keyring" | "keychain" => Ok(MasterKeyBackend::Keyring),
            other => Err(KeyManagerError::InvalidConfig(format!(
                "unknown master key backend '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct KeyManagerConfig {
    pub app_name: String,
    pub data_dir: Option<PathBuf>,
    pub master_key_backend: MasterKeyBackend,
}

impl KeyManagerConfig {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            data_dir: None,
            master_key_backend: MasterKeyBackend::default(),
        }
    }

    /// `SKM_DATA_DIR`, `SKM_MASTER_KEY_BACKEND` 반영
    pub fn from_env(app_name: impl Into<String>) -> Result<Self> {
        let mut config = Self::new(app_name);
        if let Some(dir) = non_empty_var(ENV_DATA_DIR) {
            config.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(backend) = non_empty_var(ENV_MASTER_KEY_BACKEND) {
            config.master_key_backend = backend.parse()?;
        }
        Ok(config)
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn with_master_key_backend(mut self, backend: MasterKeyBackend) -> Self {
        self.master_key_backend = backend;
        self
    }

    /// 설정을 검증하고 네임스페이스 경로를 확정
    pub fn namespace(&self) -> Result<Namespace> {
        let base = match &self.data_dir {
            Some(dir) => dir.clone(),
            None => dirs::data_dir()
                .ok_or_else(|| {
                    KeyManagerError::InvalidConfig("no per-user data directory available".into())
                })?
                .join(DEFAULT_DIR_NAME),
        };
        Namespace::new(&self.app_name, &base)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// 앱 이름으로 식별되는 격리 단위
///
/// 저장소 파일과 마스터키 파일은 모두 `dir` 아래에 있으며, 다른 네임스페이스와 절대 공유되지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    name: String,
    dir: PathBuf,
}

impl Namespace {
    pub fn new(app_name: &str, base_dir: &Path) -> Result<Self> {
        if app_name.trim().is_empty() {
            return Err(KeyManagerError::InvalidConfig(
                "app_name must not be empty".into(),
            ));
        }
        Ok(Self {
            name: app_name.to_string(),
            dir: base_dir.join(directory_name(app_name)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn store_path(&self) -> PathBuf {
        self.dir.join(STORE_FILE_NAME)
    }

    pub fn master_key_path(&self) -> PathBuf {
        self.dir.join(MASTER_KEY_FILE_NAME)
    }

    /// 키링 account 등 경로 외 식별자로 쓰는 이스케이프된 이름
    pub fn escaped(&self) -> String {
        directory_name(&self.name)
    }
}

/// 앱 이름 → 디렉토리 이름 (단사 함수)
///
/// `[a-z0-9_-]`는 그대로, 나머지 바이트는 `%XX`(대문자 hex). 대문자는 hex 자리에만 나타나므로
/// 대소문자 무시 파일시스템에서도 서로 다른 이름이 같은 경로로 접히지 않습니다.
pub fn escape_component(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for b in name.bytes() {
        match b {
            b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-' => out.push(b as char),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

/// 네임스페이스 디렉토리 이름
///
/// 이스케이프 결과가 255 bytes를 넘으면 `<접두어>~<sha256 hex>`로 줄입니다.
/// `~`는 이스케이프 결과에 나타나지 않으므로 짧은 이름과 충돌하지 않습니다.
pub fn directory_name(app_name: &str) -> String {
    let escaped = escape_component(app_name);
    if escaped.len() <= MAX_COMPONENT_LEN {
        return escaped;
    }
    let digest: String = Sha256::digest(app_name.as_bytes())
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect();
    // 이스케이프 결과는 ASCII라 바이트 단위로 잘라도 안전
    format!("{}~{}", &escaped[..HASHED_PREFIX_LEN], digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_keeps_simple_names() {
        assert_eq!(escape_component("acme"), "acme");
        assert_eq!(escape_component("my_app-2"), "my_app-2");
    }

    #[test]
    fn test_escape_is_case_and_separator_safe() {
        assert_eq!(escape_component("Acme"), "%41cme");
        assert_eq!(escape_component("../etc"), "%2E%2E%2Fetc");
        assert_ne!(escape_component("Acme"), escape_component("acme"));
        assert_ne!(
            escape_component("Acme").to_lowercase(),
            escape_component("acme").to_lowercase()
        );
        // 리터럴 '%'도 이스케이프되어 "%41"과 "A"가 충돌하지 않음
        assert_ne!(escape_component("%41"), escape_component("A"));
    }

    #[test]
    fn test_namespace_paths_are_disjoint() {
        let base = Path::new("/tmp/skm");
        let a = Namespace::new("app_a", base).unwrap();
        let b = Namespace::new("app_b", base).unwrap();
        assert_ne!(a.store_path(), b.store_path());
        assert_ne!(a.master_key_path(), b.master_key_path());
        assert_ne!(a.store_path(), a.master_key_path());
        assert_eq!(a.store_path(), Namespace::new("app_a", base).unwrap().store_path());
    }

    #[test]
    fn test_long_names_fit_in_one_path_component() {
        let upper = "A".repeat(100);
        let hangul = "가".repeat(43);
        for name in [upper.as_str(), hangul.as_str()] {
            let dir_name = directory_name(name);
            assert!(dir_name.len() <= MAX_COMPONENT_LEN);
            assert!(dir_name.contains('~'));
            assert_eq!(dir_name, directory_name(name));
        }
        // 접두어가 같아도 전체 이름이 다르면 다른 디렉토리
        let other = format!("{}B", "A".repeat(99));
        assert_ne!(directory_name(&upper), directory_name(&other));
        // 짧은 이름은 이스케이프 결과 그대로
        assert_eq!(directory_name("Acme"), escape_component("Acme"));
    }

    #[test]
    fn test_empty_app_name_rejected() {
        let err = Namespace::new("  ", Path::new("/tmp")).unwrap_err();
        assert_eq!(err.code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!("file".parse::<MasterKeyBackend>().unwrap(), MasterKeyBackend::File);
        assert_eq!(" Keyring ".parse::<MasterKeyBackend>().unwrap(), MasterKeyBackend::Keyring);
        assert!("vault".parse::<MasterKeyBackend>().is_err());
    }
}
