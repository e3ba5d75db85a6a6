//! Resolution Policy
//!
//! 논리 키 이름 하나에 대해 값을 어디서 가져올지 결정합니다. 순서 고정, 첫 성공에서 종료:
//!
//! 1. 환경 변수 (`env_var`가 주어지고 값이 비어있지 않으면 무조건 우선, 복호화 없음)
//! 2. Key Store + 복호화
//! 3. 호출자가 준 기본값
//! 4. `NotFound`
//!
//! 2단계의 복호화 실패나 스토리지 오류는 3단계로 넘어가지 않고 그대로 전파합니다.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::{KeyManagerError, Result};

/// 환경 변수 조회 추상화 (테스트에서는 맵으로 대체)
pub trait EnvSource: Send + Sync {
    fn var(&self, key: &str) -> Option<String>;
}

/// 실제 프로세스 환경
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// 값의 출처
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Environment,
    Store,
    Default,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Source::Environment => "environment",
            Source::Store => "store",
            Source::Default => "default",
        };
        f.write_str(s)
    }
}

/// 해석된 값 (Debug 출력에서 값은 가림)
#[derive(Clone, PartialEq, Eq)]
pub struct Resolved {
    pub value: String,
    pub source: Source,
}

impl std::fmt::Debug for Resolved {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolved")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .finish()
    }
}

/// 조회 요청
#[derive(Debug, Clone, Copy)]
pub struct Lookup<'a> {
    pub name: &'a str,
    pub env_var: Option<&'a str>,
    pub default: Option<&'a str>,
}

impl<'a> Lookup<'a> {
    pub fn new(name: &'a str) -> Self {
        Self {
            name,
            env_var: None,
            default: None,
        }
    }

    pub fn env_var(mut self, env_var: Option<&'a str>) -> Self {
        self.env_var = env_var;
        self
    }

    pub fn default_value(mut self, default: Option<&'a str>) -> Self {
        self.default = default;
        self
    }
}

/// 환경 변수 값 (빈 문자열은 미설정으로 취급, 공백뿐인 값은 그대로 우선)
fn env_override(env: &dyn EnvSource, env_var: Option<&str>) -> Option<String> {
    let key = env_var.filter(|k| !k.is_empty())?;
    env.var(key).filter(|v| !v.is_empty())
}

/// 정책 실행
///
/// `stored`는 환경 변수가 이기면 호출되지 않습니다.
pub fn resolve<F>(lookup: Lookup<'_>, env: &dyn EnvSource, stored: F) -> Result<Resolved>
where
    F: FnOnce() -> Result<Option<String>>,
{
    if let Some(value) = env_override(env, lookup.env_var) {
        return Ok(Resolved {
            value,
            source: Source::Environment,
        });
    }

    if let Some(value) = stored()? {
        return Ok(Resolved {
            value,
            source: Source::Store,
        });
    }

    if let Some(default) = lookup.default {
        return Ok(Resolved {
            value: default.to_string(),
            source: Source::Default,
        });
    }

    Err(KeyManagerError::NotFound {
        name: lookup.name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_environment_wins_without_touching_store() {
        let env = env(&[("ENV_K", "envval")]);
        let lookup = Lookup::new("k").env_var(Some("ENV_K"));
        let resolved = resolve(lookup, &env, || panic!("store must not be consulted")).unwrap();
        assert_eq!(resolved.value, "envval");
        assert_eq!(resolved.source, Source::Environment);
    }

    #[test]
    fn test_empty_env_falls_through_to_store() {
        let env = env(&[("ENV_K", "")]);
        let lookup = Lookup::new("k").env_var(Some("ENV_K"));
        let resolved = resolve(lookup, &env, || Ok(Some("stored".to_string()))).unwrap();
        assert_eq!(resolved.value, "stored");
        assert_eq!(resolved.source, Source::Store);
    }

    #[test]
    fn test_whitespace_env_value_still_wins() {
        let env = env(&[("ENV_K", " ")]);
        let lookup = Lookup::new("k").env_var(Some("ENV_K"));
        let resolved = resolve(lookup, &env, || panic!("store must not be consulted")).unwrap();
        assert_eq!(resolved.value, " ");
        assert_eq!(resolved.source, Source::Environment);
    }

    #[test]
    fn test_env_ignored_without_env_var_name() {
        let env = env(&[("k", "envval")]);
        let resolved = resolve(Lookup::new("k"), &env, || Ok(Some("stored".into()))).unwrap();
        assert_eq!(resolved.source, Source::Store);
    }

    #[test]
    fn test_default_then_not_found() {
        let env = HashMap::new();
        let lookup = Lookup::new("absent").default_value(Some("fallback"));
        let resolved = resolve(lookup, &env, || Ok(None)).unwrap();
        assert_eq!(resolved.value, "fallback");
        assert_eq!(resolved.source, Source::Default);

        let err = resolve(Lookup::new("absent"), &env, || Ok(None)).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_store_errors_are_not_masked_by_default() {
        let env = HashMap::new();
        let lookup = Lookup::new("k").default_value(Some("fallback"));
        let err = resolve(lookup, &env, || {
            Err(KeyManagerError::DecryptionFailed {
                name: "k".into(),
                reason: "authentication failed".into(),
            })
        })
        .unwrap_err();
        assert_eq!(err.code(), "DECRYPTION_FAILED");
    }

    #[test]
    fn test_resolved_debug_hides_value() {
        let resolved = Resolved {
            value: "sk-123".into(),
            source: Source::Store,
        };
        let debug = format!("{:?}", resolved);
        assert!(!debug.contains("sk-123"));
        assert!(debug.contains("Store"));
    }
}
