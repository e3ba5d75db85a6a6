//! Secure Key Manager Data Models
//!
//! 호출자에게 노출되는 메타데이터 모델. 시크릿 값은 절대 포함하지 않습니다.

use serde::Serialize;

/// 저장된 시크릿의 메타데이터 (값 제외)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretInfo {
    pub name: String,
    pub env_var: Option<String>,
    /// Unix epoch millis
    pub created_at: i64,
    pub updated_at: i64,
}

/// env 파일 가져오기 결과
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    /// 저장된 시크릿 이름 (소문자)
    pub imported: Vec<String>,
    /// `KEY=VALUE` 형식이 아니라서 건너뛴 줄 번호 (1-based)
    pub skipped_lines: Vec<usize>,
}
