//! Database Schema
//!
//! 네임스페이스별 SQLite 파일 스키마 정의

/// 현재 스키마 버전 (`PRAGMA user_version`)
pub const SCHEMA_VERSION: i64 = 1;

/// 데이터베이스 스키마 생성 SQL
pub const CREATE_SCHEMA: &str = r#"
-- 시크릿 테이블 (값은 항상 암호문)
CREATE TABLE IF NOT EXISTS secrets (
    name TEXT PRIMARY KEY NOT NULL CHECK (length(name) > 0),
    ciphertext BLOB NOT NULL,
    env_var TEXT,              -- 등록 시 지정한 환경 변수 이름 (감사/탐색용)
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_secrets_updated ON secrets(updated_at);
"#;
