//! env 파일 가져오기
//!
//! `KEY=VALUE` 파일(`.env`, `apikeys.ini` 등)의 항목을 암호화 저장소로 옮깁니다.
//! dotenvy(strict) 파서를 먼저 쓰고, 실패하면 `KEY=VALUE` 줄만 읽는 lenient 파서로 보강합니다.

use std::path::Path;

use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::error::{KeyManagerError, Result};
use crate::models::ImportReport;
use crate::secrets::SecretManager;

/// 파싱 결과
#[derive(Default)]
pub struct ParsedEnv {
    pub entries: Vec<(String, Zeroizing<String>)>,
    pub skipped_lines: Vec<usize>,
}

fn is_valid_env_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn strip_quotes(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2
        && ((bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\''))
    {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

/// lenient 파서: 주석/코드펜스/설명 줄은 건너뜀
pub fn parse_lenient(text: &str) -> ParsedEnv {
    let mut parsed = ParsedEnv::default();

    for (idx, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let line = line.strip_prefix("export ").unwrap_or(line).trim();
        let Some((k, v)) = line.split_once('=') else {
            parsed.skipped_lines.push(idx + 1);
            continue;
        };
        let key = k.trim();
        if !is_valid_env_key(key) {
            parsed.skipped_lines.push(idx + 1);
            continue;
        }

        let value = strip_quotes(v.trim())
            .replace("\\\"", "\"")
            .replace("\\'", "'");
        parsed.entries.push((key.to_string(), Zeroizing::new(value)));
    }

    parsed
}

/// strict 파서 우선, 실패 시 lenient
pub fn parse_env_file(path: &Path) -> Result<ParsedEnv> {
    let text = Zeroizing::new(std::fs::read_to_string(path).map_err(|e| {
        KeyManagerError::EnvFile(format!("cannot read {}: {}", path.display(), e))
    })?);

    let strict: std::result::Result<Vec<(String, String)>, dotenvy::Error> =
        dotenvy::from_read_iter(text.as_bytes()).collect();
    match strict {
        Ok(pairs) => Ok(ParsedEnv {
            entries: pairs
                .into_iter()
                .map(|(k, v)| (k, Zeroizing::new(v)))
                .collect(),
            skipped_lines: Vec::new(),
        }),
        Err(e) => {
            // 에러 메시지에 값이 섞일 수 있으므로 종류만 기록
            debug!(path = %path.display(), kind = dotenv_error_kind(&e), "strict env parse failed, using lenient parser");
            Ok(parse_lenient(&text))
        }
    }
}

fn dotenv_error_kind(e: &dotenvy::Error) -> &'static str {
    match e {
        dotenvy::Error::LineParse(..) => "line_parse",
        dotenvy::Error::Io(_) => "io",
        dotenvy::Error::EnvVar(_) => "env_var",
        _ => "other",
    }
}

impl SecretManager {
    /// env 파일의 각 항목을 저장
    ///
    /// 시크릿 이름은 키를 소문자로 바꾼 것이고, 원래 키는 연결된 환경 변수로 등록됩니다.
    /// 값이 비어 있는 항목은 건너뜁니다.
    pub fn import_env_file(&self, path: &Path) -> Result<ImportReport> {
        let parsed = parse_env_file(path)?;
        let mut report = ImportReport {
            imported: Vec::new(),
            skipped_lines: parsed.skipped_lines,
        };

        for (key, value) in &parsed.entries {
            if value.trim().is_empty() {
                continue;
            }
            let name = key.to_ascii_lowercase();
            self.save(&name, value, Some(key.as_str()))?;
            if !report.imported.contains(&name) {
                report.imported.push(name);
            }
        }

        if !report.skipped_lines.is_empty() {
            warn!(
                path = %path.display(),
                skipped = report.skipped_lines.len(),
                "some env file lines were not in KEY=VALUE form"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeyManagerConfig;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_lenient_parser_handles_mixed_content() {
        let text = "# comment\n\
                    export OPENAI_API_KEY=\"sk-1\"\n\
                    ```\n\
                    MERAKI_DASHBOARD_API_KEY='mk-2'\n\
                    IPINFO_TOKEN = tok3\n\
                    not a pair\n\
                    9BAD=x\n";
        let parsed = parse_lenient(text);
        let pairs: Vec<(&str, &str)> = parsed
            .entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("OPENAI_API_KEY", "sk-1"),
                ("MERAKI_DASHBOARD_API_KEY", "mk-2"),
                ("IPINFO_TOKEN", "tok3"),
            ]
        );
        assert_eq!(parsed.skipped_lines, vec![3, 6, 7]);
    }

    #[test]
    fn test_escaped_quotes_are_unescaped() {
        let parsed = parse_lenient("TOKEN=\"a\\\"b\"\n");
        assert_eq!(parsed.entries[0].1.as_str(), "a\"b");
    }

    #[test]
    fn test_import_saves_lowercased_names_with_env_var() {
        let dir = tempdir().unwrap();
        let env_path = dir.path().join("apikeys.ini");
        std::fs::write(&env_path, "OPENAI_API_KEY=sk-1\nEMPTY=\n").unwrap();

        let m = SecretManager::open(KeyManagerConfig::new("acme").with_data_dir(dir.path()))
            .unwrap()
            .with_env_source(HashMap::new());
        let report = m.import_env_file(&env_path).unwrap();

        assert_eq!(report.imported, vec!["openai_api_key".to_string()]);
        assert_eq!(m.get("openai_api_key", None, None).unwrap(), "sk-1");
        let info = m.describe("openai_api_key").unwrap().unwrap();
        assert_eq!(info.env_var.as_deref(), Some("OPENAI_API_KEY"));
        assert!(!m.has("empty").unwrap());
    }

    #[test]
    fn test_missing_file_is_env_file_error() {
        let dir = tempdir().unwrap();
        let err = parse_env_file(&dir.path().join("nope.env")).err().unwrap();
        assert_eq!(err.code(), "ENV_FILE_ERROR");
    }
}
