//! Secret Manager - 네임스페이스별 키 저장/조회 파사드
//!
//! - 마스터키는 첫 쓰기에서 생성, 이후 메모리에만 보관 (drop 시 zeroize)
//! - 쓰기는 항상 Key Store로, 읽기는 Resolution Policy를 거침
//! - 전역 인스턴스 없음: 호출자가 만들고 소유하며 필요한 곳에 참조로 넘김

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::RwLock;

use tracing::debug;
use zeroize::Zeroize;

use crate::config::{KeyManagerConfig, Namespace};
use crate::db::KeyStore;
use crate::error::{KeyManagerError, Result};
use crate::models::SecretInfo;
use crate::secrets::crypto::{self, MasterKey};
use crate::secrets::master_key::MasterKeyProvider;
use crate::secrets::resolve::{self, EnvSource, Lookup, ProcessEnv, Resolved};

/// Secret Manager
///
/// `has`/`list`는 저장된 키만 봅니다. 환경 변수로만 제공되는 값은 `get`으로는 해석되지만
/// `has`는 `false`를 돌려줍니다 (저장 여부와 해석 가능 여부는 별개).
pub struct SecretManager {
    namespace: Namespace,
    store: KeyStore,
    keys: MasterKeyProvider,
    /// 마스터키 (메모리에 캐시)
    master_key: RwLock<Option<MasterKey>>,
    env: Box<dyn EnvSource>,
}

impl SecretManager {
    /// `app_name`만으로 생성 (`SKM_*` 환경 변수 설정 반영)
    pub fn new(app_name: &str) -> Result<Self> {
        Self::open(KeyManagerConfig::from_env(app_name)?)
    }

    /// 파일은 만들지 않음. 저장소와 마스터키는 첫 `save`에서 생성됩니다.
    pub fn open(config: KeyManagerConfig) -> Result<Self> {
        let namespace = config.namespace()?;
        debug!(
            namespace = namespace.name(),
            dir = %namespace.dir().display(),
            "secret manager opened"
        );
        Ok(Self {
            store: KeyStore::new(namespace.clone()),
            keys: MasterKeyProvider::new(namespace.clone(), config.master_key_backend),
            namespace,
            master_key: RwLock::new(None),
            env: Box::new(ProcessEnv),
        })
    }

    /// 환경 변수 조회 방식 교체
    pub fn with_env_source(mut self, env: impl EnvSource + 'static) -> Self {
        self.env = Box::new(env);
        self
    }

    pub fn namespace(&self) -> &str {
        self.namespace.name()
    }

    pub fn store_path(&self) -> PathBuf {
        self.store.path()
    }

    /// 시크릿 저장 (upsert)
    ///
    /// 환경 변수가 이미 설정되어 있어도 저장합니다. 나중에 환경 변수 없이 실행해도 해석되도록.
    pub fn save(&self, name: &str, value: &str, env_var: Option<&str>) -> Result<()> {
        validate_name(name)?;
        let env_var = env_var.filter(|v| !v.trim().is_empty());

        let key = self.key_for_write()?;
        let ciphertext = crypto::encrypt(&key, self.namespace.name(), name, value.as_bytes())
            .map_err(|e| KeyManagerError::EncryptionFailed(e.to_string()))?;
        self.store.upsert(name, &ciphertext, env_var)?;

        if env_var.and_then(|v| self.env.var(v)).is_some() {
            debug!(
                namespace = self.namespace.name(),
                name,
                env_var,
                "secret saved; environment variable currently takes precedence"
            );
        } else {
            debug!(namespace = self.namespace.name(), name, "secret saved");
        }
        Ok(())
    }

    /// 값 조회 (환경 변수 → 저장소 → 기본값)
    ///
    /// 기본값이 있으면 "없음"으로 실패하지 않습니다. 복호화 실패는 기본값이 있어도 에러입니다.
    pub fn get(&self, name: &str, env_var: Option<&str>, default: Option<&str>) -> Result<String> {
        let lookup = Lookup::new(name).env_var(env_var).default_value(default);
        self.resolve(lookup).map(|resolved| resolved.value)
    }

    /// 값과 출처를 함께 조회
    pub fn resolve(&self, lookup: Lookup<'_>) -> Result<Resolved> {
        validate_name(lookup.name)?;
        let resolved = resolve::resolve(lookup, self.env.as_ref(), || {
            self.read_plaintext(lookup.name)
        })?;
        debug!(
            namespace = self.namespace.name(),
            name = lookup.name,
            source = %resolved.source,
            "secret resolved"
        );
        Ok(resolved)
    }

    /// 저장된 키 존재 여부 (환경 변수는 보지 않음)
    pub fn has(&self, name: &str) -> Result<bool> {
        validate_name(name)?;
        self.store.contains(name)
    }

    /// 저장된 행 삭제, 있었는지 반환. 환경 변수에는 영향 없음
    pub fn delete(&self, name: &str) -> Result<bool> {
        validate_name(name)?;
        let existed = self.store.remove(name)?;
        debug!(namespace = self.namespace.name(), name, existed, "secret delete");
        Ok(existed)
    }

    /// 저장된 이름 목록 (값은 절대 포함하지 않음)
    pub fn list(&self) -> Result<BTreeSet<String>> {
        self.store.names()
    }

    /// 메타데이터 조회 (값 제외)
    pub fn describe(&self, name: &str) -> Result<Option<SecretInfo>> {
        validate_name(name)?;
        self.store.record(name)
    }

    pub fn records(&self) -> Result<Vec<SecretInfo>> {
        self.store.records()
    }

    /// 저장소에서 읽어 복호화. 행이 없으면 `Ok(None)`
    fn read_plaintext(&self, name: &str) -> Result<Option<String>> {
        let Some(ciphertext) = self.store.read(name)? else {
            return Ok(None);
        };

        // 행이 있다는 것은 저장소가 있다는 뜻이므로 키가 없으면 에러
        let key = self.key_for_read()?;
        let plaintext = crypto::decrypt(&key, self.namespace.name(), name, &ciphertext).map_err(
            |e| KeyManagerError::DecryptionFailed {
                name: name.to_string(),
                reason: e.to_string(),
            },
        )?;

        match String::from_utf8(plaintext) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                // 평문 메모리 지우기
                let mut bytes = e.into_bytes();
                bytes.zeroize();
                Err(KeyManagerError::DecryptionFailed {
                    name: name.to_string(),
                    reason: "plaintext is not valid UTF-8".to_string(),
                })
            }
        }
    }

    fn cached_key(&self) -> Result<Option<MasterKey>> {
        let cached = self
            .master_key
            .read()
            .map_err(|_| KeyManagerError::poisoned("master key"))?;
        Ok(cached.clone())
    }

    fn cache_key(&self, key: &MasterKey) -> Result<()> {
        let mut slot = self
            .master_key
            .write()
            .map_err(|_| KeyManagerError::poisoned("master key"))?;
        if slot.is_none() {
            *slot = Some(key.clone());
        }
        Ok(())
    }

    fn key_for_write(&self) -> Result<MasterKey> {
        if let Some(key) = self.cached_key()? {
            return Ok(key);
        }
        let key = self.keys.get_or_create()?;
        self.cache_key(&key)?;
        Ok(key)
    }

    fn key_for_read(&self) -> Result<MasterKey> {
        if let Some(key) = self.cached_key()? {
            return Ok(key);
        }
        let key = self.keys.require()?;
        self.cache_key(&key)?;
        Ok(key)
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(KeyManagerError::InvalidName(
            "secret name must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn manager(base: &std::path::Path, app: &str) -> SecretManager {
        SecretManager::open(KeyManagerConfig::new(app).with_data_dir(base))
            .unwrap()
            .with_env_source(HashMap::new())
    }

    #[test]
    fn test_open_creates_nothing() {
        let dir = tempdir().unwrap();
        let m = manager(dir.path(), "acme");
        assert!(m.list().unwrap().is_empty());
        assert!(m.get("k", None, None).unwrap_err().is_not_found());
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[test]
    fn test_save_get_roundtrip() {
        let dir = tempdir().unwrap();
        let m = manager(dir.path(), "acme");
        m.save("openai_api_key", "sk-123", Some("OPENAI_API_KEY")).unwrap();
        assert_eq!(m.get("openai_api_key", None, None).unwrap(), "sk-123");

        let info = m.describe("openai_api_key").unwrap().unwrap();
        assert_eq!(info.env_var.as_deref(), Some("OPENAI_API_KEY"));
    }

    #[test]
    fn test_ciphertext_never_contains_plaintext() {
        let dir = tempdir().unwrap();
        let m = manager(dir.path(), "acme");
        m.save("k", "very-distinctive-secret", None).unwrap();
        let raw = m.store.read("k").unwrap().unwrap();
        assert!(!raw
            .windows(b"very-distinctive-secret".len())
            .any(|w| w == b"very-distinctive-secret"));
    }

    #[test]
    fn test_has_ignores_environment() {
        let dir = tempdir().unwrap();
        let mut env = HashMap::new();
        env.insert("ENV_ONLY".to_string(), "from-env".to_string());
        let m = manager(dir.path(), "acme").with_env_source(env);

        assert_eq!(m.get("only_env", Some("ENV_ONLY"), None).unwrap(), "from-env");
        assert!(!m.has("only_env").unwrap());
    }

    #[test]
    fn test_empty_name_rejected() {
        let dir = tempdir().unwrap();
        let m = manager(dir.path(), "acme");
        assert_eq!(m.save("", "v", None).unwrap_err().code(), "INVALID_NAME");
        assert_eq!(m.has("").unwrap_err().code(), "INVALID_NAME");
        // 공백 이름도 그대로 저장되는 유효한 이름
        m.save(" ", "blank", None).unwrap();
        assert_eq!(m.get(" ", None, None).unwrap(), "blank");
    }

    #[test]
    fn test_reopen_reads_existing_key() {
        let dir = tempdir().unwrap();
        manager(dir.path(), "acme").save("k", "v", None).unwrap();
        let reopened = manager(dir.path(), "acme");
        assert_eq!(reopened.get("k", None, None).unwrap(), "v");
    }

    #[test]
    fn test_missing_master_key_is_reported() {
        let dir = tempdir().unwrap();
        let m = manager(dir.path(), "acme");
        m.save("k", "v", None).unwrap();
        std::fs::remove_file(m.namespace.master_key_path()).unwrap();

        let fresh = manager(dir.path(), "acme");
        let err = fresh.get("k", None, Some("fallback")).unwrap_err();
        assert_eq!(err.code(), "MASTER_KEY_UNREADABLE");
        let err = fresh.save("other", "v", None).unwrap_err();
        assert_eq!(err.code(), "MASTER_KEY_UNREADABLE");
        // 키를 다시 만들지 않음
        assert!(!fresh.namespace.master_key_path().exists());
    }
}
