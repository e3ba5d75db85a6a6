//! Database Module
//!
//! 네임스페이스 단위 시크릿 저장소 (Key Store). 값은 이미 암호화된 바이트만 다룹니다.

mod schema;

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{params, Connection, OpenFlags, OptionalExtension, TransactionBehavior};
use tracing::{debug, info};

use crate::config::Namespace;
use crate::error::{KeyManagerError, Result};
use crate::models::SecretInfo;

/// 다른 프로세스가 쓰기 잠금을 잡고 있을 때 대기 시간
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[cfg(unix)]
const STORE_FILE_MODE: u32 = 0o600;
#[cfg(unix)]
const STORE_DIR_MODE: u32 = 0o700;

/// 네임스페이스에 묶인 Key Store
///
/// 파일은 첫 쓰기에서 생성되며, 파일이 없는 상태의 읽기는 "키 없음"으로 취급합니다.
/// 모든 쓰기는 `BEGIN IMMEDIATE` 트랜잭션 하나로 커밋되어 행 단위로 원자적입니다.
pub struct KeyStore {
    namespace: Namespace,
    conn: Mutex<Option<Connection>>,
}

impl KeyStore {
    pub fn new(namespace: Namespace) -> Self {
        Self {
            namespace,
            conn: Mutex::new(None),
        }
    }

    pub fn path(&self) -> std::path::PathBuf {
        self.namespace.store_path()
    }

    /// 저장소 파일 존재 여부
    pub fn exists(&self) -> bool {
        self.path().exists()
    }

    /// 시크릿 저장 (upsert)
    ///
    /// - 같은 이름이 있으면 암호문 교체, `updated_at` 갱신 (감소하지 않음)
    /// - `env_var`가 `None`이면 기존에 등록된 환경 변수 이름은 유지
    pub fn upsert(&self, name: &str, ciphertext: &[u8], env_var: Option<&str>) -> Result<()> {
        let mut guard = self.lock()?;
        let conn = self.open_or_create(&mut guard)?;
        let now = chrono::Utc::now().timestamp_millis();

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO secrets (name, ciphertext, env_var, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(name) DO UPDATE SET
                ciphertext = excluded.ciphertext,
                env_var = COALESCE(excluded.env_var, secrets.env_var),
                updated_at = MAX(secrets.updated_at, excluded.updated_at)",
            params![name, ciphertext, env_var, now],
        )?;
        tx.commit()?;

        debug!(namespace = self.namespace.name(), name, "secret row upserted");
        Ok(())
    }

    /// 암호문 조회
    pub fn read(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let mut guard = self.lock()?;
        let Some(conn) = self.open_existing(&mut guard)? else {
            return Ok(None);
        };

        let ciphertext = conn
            .query_row(
                "SELECT ciphertext FROM secrets WHERE name = ?1",
                [name],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(ciphertext)
    }

    /// 시크릿 삭제, 행이 있었는지 반환
    pub fn remove(&self, name: &str) -> Result<bool> {
        let mut guard = self.lock()?;
        let Some(conn) = self.open_existing(&mut guard)? else {
            return Ok(false);
        };

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let deleted = tx.execute("DELETE FROM secrets WHERE name = ?1", [name])?;
        tx.commit()?;

        debug!(namespace = self.namespace.name(), name, deleted, "secret row removed");
        Ok(deleted > 0)
    }

    /// 저장된 이름 목록
    pub fn names(&self) -> Result<BTreeSet<String>> {
        let mut guard = self.lock()?;
        let Some(conn) = self.open_existing(&mut guard)? else {
            return Ok(BTreeSet::new());
        };

        let mut stmt = conn.prepare("SELECT name FROM secrets")?;
        let iter = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut names = BTreeSet::new();
        for name in iter {
            names.insert(name?);
        }
        Ok(names)
    }

    pub fn contains(&self, name: &str) -> Result<bool> {
        let mut guard = self.lock()?;
        let Some(conn) = self.open_existing(&mut guard)? else {
            return Ok(false);
        };

        let found = conn
            .query_row("SELECT 1 FROM secrets WHERE name = ?1", [name], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    /// 단일 메타데이터 조회
    pub fn record(&self, name: &str) -> Result<Option<SecretInfo>> {
        let mut guard = self.lock()?;
        let Some(conn) = self.open_existing(&mut guard)? else {
            return Ok(None);
        };

        let info = conn
            .query_row(
                "SELECT name, env_var, created_at, updated_at FROM secrets WHERE name = ?1",
                [name],
                row_to_info,
            )
            .optional()?;
        Ok(info)
    }

    /// 전체 메타데이터 (이름순)
    pub fn records(&self) -> Result<Vec<SecretInfo>> {
        let mut guard = self.lock()?;
        let Some(conn) = self.open_existing(&mut guard)? else {
            return Ok(Vec::new());
        };

        let mut stmt = conn.prepare(
            "SELECT name, env_var, created_at, updated_at FROM secrets ORDER BY name",
        )?;
        let iter = stmt.query_map([], row_to_info)?;
        let mut out = Vec::new();
        for info in iter {
            out.push(info?);
        }
        Ok(out)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Connection>>> {
        self.conn
            .lock()
            .map_err(|_| KeyManagerError::poisoned("key store"))
    }

    /// 파일이 있을 때만 연결 (없으면 `None`, 파일을 만들지 않음)
    fn open_existing<'a>(
        &self,
        slot: &'a mut Option<Connection>,
    ) -> Result<Option<&'a mut Connection>> {
        if slot.is_none() {
            let path = self.path();
            if !path.exists() {
                return Ok(None);
            }
            let conn = Connection::open_with_flags(
                &path,
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            initialize(&conn)?;
            *slot = Some(conn);
        }
        Ok(slot.as_mut())
    }

    /// 첫 쓰기: 디렉토리/파일 생성 후 스키마 초기화
    fn open_or_create<'a>(&self, slot: &'a mut Option<Connection>) -> Result<&'a mut Connection> {
        if slot.is_none() {
            let path = self.path();
            let created = !path.exists();
            if created {
                create_private_dir(self.namespace.dir())?;
            }

            let conn = Connection::open(&path)?;
            restrict_file(&path)?;
            initialize(&conn)?;
            if created {
                info!(namespace = self.namespace.name(), path = %path.display(), "secret store created");
            }
            *slot = Some(conn);
        }
        slot.as_mut()
            .ok_or_else(|| KeyManagerError::poisoned("key store connection"))
    }
}

fn row_to_info(row: &rusqlite::Row<'_>) -> rusqlite::Result<SecretInfo> {
    Ok(SecretInfo {
        name: row.get(0)?,
        env_var: row.get(1)?,
        created_at: row.get(2)?,
        updated_at: row.get(3)?,
    })
}

/// 연결 설정 및 스키마 초기화
fn initialize(conn: &Connection) -> Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;

    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version > schema::SCHEMA_VERSION {
        return Err(KeyManagerError::InvalidConfig(format!(
            "secret store schema version {} is newer than supported {}",
            version,
            schema::SCHEMA_VERSION
        )));
    }

    conn.execute_batch(schema::CREATE_SCHEMA)?;
    if version < schema::SCHEMA_VERSION {
        conn.pragma_update(None, "user_version", schema::SCHEMA_VERSION)?;
    }
    Ok(())
}

fn create_private_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(STORE_DIR_MODE))?;
    }
    Ok(())
}

fn restrict_file(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(STORE_FILE_MODE))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
