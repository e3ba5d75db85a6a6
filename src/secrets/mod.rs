//! Secret Manager 모듈
//!
//! Master Key + Encrypted Key Store 아키텍처를 통해 시크릿을 안전하게 관리합니다.
//!
//! - 네임스페이스(앱 이름)마다 마스터키 1개, SQLite 저장소 파일 1개
//! - 각 시크릿은 행 단위로 AEAD 암호화 (`crypto`)
//! - 읽기는 환경 변수 → 저장소 → 기본값 순서로 해석 (`resolve`)

pub mod crypto;
pub mod manager;
pub mod master_key;
pub mod resolve;

pub use manager::SecretManager;
pub use resolve::{EnvSource, Lookup, ProcessEnv, Resolved, Source};
