//! CLI Commands Module
//!
//! 각 서브커맨드 구현. 결과는 writer로 출력하고 종료 코드 판단은 호출자가 합니다.

pub mod secrets;

/// 명령 실행 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// 찾지 못함 / 조건 거짓
    Negative,
}
