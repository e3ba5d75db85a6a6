//! Master Key Provider
//!
//! - 네임스페이스당 마스터키 1개 (256-bit, CSPRNG)
//! - 기본은 `<namespace>/master.key` 파일 (Unix에서 0600), 옵션으로 OS 키링
//! - 기존 키를 읽을 수 없으면 절대 새로 만들지 않음 (기존 암호문이 고아가 되므로)

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use keyring::Entry;
use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::config::{MasterKeyBackend, Namespace};
use crate::error::{KeyManagerError, Result};
use crate::secrets::crypto::MasterKey;

/// Keychain 서비스 이름
const KEYCHAIN_SERVICE: &str = "secure-key-manager";
/// 마스터키 Keychain account prefix
const KEYCHAIN_ACCOUNT_PREFIX: &str = "master_key_v1:";
/// 키 파일 첫 줄
const KEY_FILE_HEADER: &str = "skm-master-key v1";
/// 체크섬 길이 (SHA-256 앞 8 bytes, hex)
const CHECKSUM_HEX_LEN: usize = 16;

#[cfg(unix)]
const KEY_FILE_MODE: u32 = 0o600;
#[cfg(unix)]
const KEY_DIR_MODE: u32 = 0o700;

pub struct MasterKeyProvider {
    namespace: Namespace,
    backend: MasterKeyBackend,
}

impl MasterKeyProvider {
    pub fn new(namespace: Namespace, backend: MasterKeyBackend) -> Self {
        Self { namespace, backend }
    }

    /// 기존 키 로드. 아직 만들어진 적 없으면 `Ok(None)`
    pub fn load(&self) -> Result<Option<MasterKey>> {
        match self.backend {
            MasterKeyBackend::File => self.load_from_file(),
            MasterKeyBackend::Keyring => self.load_from_keychain(),
        }
    }

    /// 반드시 존재해야 하는 키 로드 (저장소가 이미 있는 경우)
    pub fn require(&self) -> Result<MasterKey> {
        self.load()?
            .ok_or_else(|| self.unreadable("master key is missing"))
    }

    /// 키 로드, 없으면 생성 후 저장
    ///
    /// 키가 없는데 저장소 파일이 이미 있으면 `MasterKeyUnreadable`.
    pub fn get_or_create(&self) -> Result<MasterKey> {
        if let Some(key) = self.load()? {
            return Ok(key);
        }

        if self.namespace.store_path().exists() {
            // 키는 항상 저장소보다 먼저 게시되므로, 동시에 만든 쪽의 키가 보일 수 있음
            if let Some(key) = self.load()? {
                return Ok(key);
            }
            warn!(
                namespace = self.namespace.name(),
                "secret store exists but master key is missing; refusing to generate a new key"
            );
            return Err(self.unreadable("master key is missing but the secret store exists"));
        }

        let key = MasterKey::generate();
        match self.backend {
            MasterKeyBackend::File => self.create_key_file(&key),
            MasterKeyBackend::Keyring => {
                self.save_to_keychain(&key)?;
                info!(namespace = self.namespace.name(), "new master key saved to keychain");
                Ok(key)
            }
        }
    }

    fn unreadable(&self, reason: impl Into<String>) -> KeyManagerError {
        KeyManagerError::MasterKeyUnreadable {
            namespace: self.namespace.name().to_string(),
            reason: reason.into(),
        }
    }

    fn load_from_file(&self) -> Result<Option<MasterKey>> {
        let path = self.namespace.master_key_path();
        let text = match fs::read_to_string(&path) {
            Ok(text) => Zeroizing::new(text),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.unreadable(format!("cannot read key file: {}", e.kind()))),
        };

        warn_if_too_open(&path);

        decode_key_text(&text)
            .map(Some)
            .map_err(|reason| self.unreadable(reason))
    }

    /// 임시 파일에 쓰고 hard link로 게시 (이미 있으면 덮어쓰지 않음)
    ///
    /// 동시에 첫 사용이 일어나도 살아남는 키는 하나이며, 진 쪽은 이긴 쪽의 키를 다시 읽습니다.
    fn create_key_file(&self, key: &MasterKey) -> Result<MasterKey> {
        let dir = self.namespace.dir();
        create_private_dir(dir)?;

        let path = self.namespace.master_key_path();
        let tmp_path = dir.join(format!(
            "master.key.{:016x}.tmp",
            rand::thread_rng().gen::<u64>()
        ));

        let text = encode_key_text(key);
        let written = write_private_file(&tmp_path, text.as_bytes());
        let published = written.and_then(|_| fs::hard_link(&tmp_path, &path));
        let _ = fs::remove_file(&tmp_path);

        match published {
            Ok(()) => {
                info!(namespace = self.namespace.name(), "new master key created");
                Ok(key.clone())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!(namespace = self.namespace.name(), "master key created concurrently, reloading");
                self.require()
            }
            Err(e) => Err(KeyManagerError::Io(e)),
        }
    }

    fn keychain_entry(&self) -> Result<Entry> {
        let account = format!("{}{}", KEYCHAIN_ACCOUNT_PREFIX, self.namespace.escaped());
        Entry::new(KEYCHAIN_SERVICE, &account)
            .map_err(|e| self.unreadable(format!("keychain error: {}", e)))
    }

    /// Keychain에서 마스터키 로드
    fn load_from_keychain(&self) -> Result<Option<MasterKey>> {
        let entry = self.keychain_entry()?;
        let text = match entry.get_password() {
            Ok(password) => Zeroizing::new(password),
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(e) => return Err(self.unreadable(format!("keychain error: {}", e))),
        };
        decode_key_text(&text)
            .map(Some)
            .map_err(|reason| self.unreadable(reason))
    }

    /// Keychain에 마스터키 저장
    fn save_to_keychain(&self, key: &MasterKey) -> Result<()> {
        let entry = self.keychain_entry()?;
        let text = encode_key_text(key);
        entry
            .set_password(&text)
            .map_err(|e| self.unreadable(format!("keychain error: {}", e)))
    }
}

fn checksum_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .take(CHECKSUM_HEX_LEN / 2)
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// `header \n base64(key) \n checksum`
fn encode_key_text(key: &MasterKey) -> Zeroizing<String> {
    let encoded = Zeroizing::new(BASE64.encode(key.as_bytes()));
    Zeroizing::new(format!(
        "{}\n{}\n{}\n",
        KEY_FILE_HEADER,
        encoded.as_str(),
        checksum_hex(key.as_bytes())
    ))
}

/// 에러 사유에는 키 내용을 넣지 않음
fn decode_key_text(text: &str) -> std::result::Result<MasterKey, String> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    if lines.next() != Some(KEY_FILE_HEADER) {
        return Err("unrecognized key file format".to_string());
    }
    let encoded = lines.next().ok_or("key material missing")?;
    let checksum = lines.next().ok_or("checksum missing")?;

    let bytes = Zeroizing::new(
        BASE64
            .decode(encoded)
            .map_err(|_| "key material is not valid base64".to_string())?,
    );
    let key = MasterKey::from_slice(&bytes).ok_or("key material has wrong length")?;
    if checksum_hex(key.as_bytes()) != checksum {
        return Err("key checksum mismatch".to_string());
    }
    Ok(key)
}

fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    if dir.exists() {
        return Ok(());
    }
    fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(KEY_DIR_MODE))?;
    }
    Ok(())
}

fn write_private_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(KEY_FILE_MODE);
    }
    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(unix)]
fn warn_if_too_open(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = fs::metadata(path) {
        if meta.permissions().mode() & 0o077 != 0 {
            warn!(path = %path.display(), "master key file is readable by other users");
        }
    }
}

#[cfg(not(unix))]
fn warn_if_too_open(_path: &Path) {}
