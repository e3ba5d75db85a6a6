//! Secure Key Manager Library
//!
//! API 키/토큰을 앱 이름(네임스페이스) 단위로 암호화 저장하고,
//! 환경 변수 → 저장소 → 기본값 순서로 해석합니다.
//!
//! ```no_run
//! use skm_lib::{KeyManagerConfig, SecretManager};
//!
//! let manager = SecretManager::open(KeyManagerConfig::new("acme"))?;
//! manager.save("openai_api_key", "sk-123", Some("OPENAI_API_KEY"))?;
//! let key = manager.get("openai_api_key", Some("OPENAI_API_KEY"), None)?;
//! # Ok::<(), skm_lib::KeyManagerError>(())
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod db;
pub mod envfile;
pub mod error;
pub mod models;
pub mod secrets;

use std::io::{self, IsTerminal};
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

pub use config::{KeyManagerConfig, MasterKeyBackend, Namespace};
pub use error::{KeyManagerError, Result};
pub use models::{ImportReport, SecretInfo};
pub use secrets::{EnvSource, Lookup, ProcessEnv, Resolved, SecretManager, Source};

use cli::{Cli, Commands};
use commands::{secrets as cmd, Outcome};
use error::CommandError;

/// 찾지 못함 / 조건 거짓
const EXIT_NEGATIVE: u8 = 1;
/// 그 외 에러
const EXIT_ERROR: u8 = 2;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .try_init();
}

fn execute(cli: &Cli) -> Result<Outcome> {
    let mut config = KeyManagerConfig::from_env(cli.app.as_str())?;
    if let Some(dir) = &cli.data_dir {
        config = config.with_data_dir(dir.clone());
    }
    let manager = SecretManager::open(config)?;

    let mut stdout = io::stdout().lock();
    let json = cli.json;

    match &cli.command {
        Commands::Save {
            name,
            env_var,
            value,
        } => {
            let value = match value {
                Some(v) => zeroize::Zeroizing::new(v.clone()),
                None => cmd::read_value(&mut io::stdin().lock())?,
            };
            cmd::secrets_save(&manager, &mut stdout, name, &value, env_var.as_deref(), json)
        }
        Commands::Get {
            name,
            env_var,
            default,
            show_source,
        } => {
            let lookup = Lookup::new(name)
                .env_var(env_var.as_deref())
                .default_value(default.as_deref());
            cmd::secrets_get(
                &manager,
                &mut stdout,
                &mut io::stderr(),
                lookup,
                *show_source,
                json,
            )
        }
        Commands::Has { name } => cmd::secrets_has(&manager, &mut stdout, name, json),
        Commands::Delete { name } => cmd::secrets_delete(&manager, &mut stdout, name, json),
        Commands::List { long } => cmd::secrets_list(&manager, &mut stdout, *long, json),
        Commands::Import { file } => cmd::secrets_import(&manager, &mut stdout, file, json),
    }
}

/// CLI 실행
pub fn run() -> ExitCode {
    // 작업 디렉토리의 .env 로드 (없으면 무시)
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    match execute(&cli) {
        Ok(Outcome::Success) => ExitCode::SUCCESS,
        Ok(Outcome::Negative) => ExitCode::from(EXIT_NEGATIVE),
        Err(e) => {
            let error = CommandError::from(&e);
            if cli.json {
                match serde_json::to_string(&error) {
                    Ok(text) => eprintln!("{}", text),
                    Err(_) => eprintln!("error[{}]: {}", error.code, error.message),
                }
            } else {
                eprintln!("error[{}]: {}", error.code, error.message);
            }
            if e.is_not_found() {
                ExitCode::from(EXIT_NEGATIVE)
            } else {
                ExitCode::from(EXIT_ERROR)
            }
        }
    }
}
