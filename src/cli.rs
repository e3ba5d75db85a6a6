//! CLI 인자 정의

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// 기본 네임스페이스
pub const DEFAULT_APP_NAME: &str = "secure-key-manager";

#[derive(Debug, Parser)]
#[command(name = "skm", version, about = "Encrypted, per-application storage for API keys and tokens")]
pub struct Cli {
    /// 네임스페이스(앱 이름)
    #[arg(long, global = true, env = "SKM_APP", default_value = DEFAULT_APP_NAME)]
    pub app: String,

    /// 데이터 디렉토리 (기본: 사용자 데이터 디렉토리)
    #[arg(long, global = true, env = "SKM_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// JSON 출력
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// 시크릿 저장 (값이 없으면 stdin 첫 줄)
    Save {
        name: String,
        #[arg(long)]
        env_var: Option<String>,
        #[arg(long)]
        value: Option<String>,
    },
    /// 시크릿 조회 (환경 변수 → 저장소 → 기본값)
    Get {
        name: String,
        #[arg(long)]
        env_var: Option<String>,
        #[arg(long)]
        default: Option<String>,
        /// 값의 출처를 stderr로 출력
        #[arg(long)]
        show_source: bool,
    },
    /// 저장 여부 (환경 변수는 보지 않음)
    Has { name: String },
    /// 저장된 시크릿 삭제
    Delete { name: String },
    /// 저장된 이름 목록
    List {
        /// 연결된 환경 변수와 시각 포함
        #[arg(long)]
        long: bool,
    },
    /// `KEY=VALUE` 파일 가져오기
    Import { file: PathBuf },
}
