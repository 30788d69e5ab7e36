//! 에러 타입 정의

use thiserror::Error;

/// 재시도 없이 즉시 보고되는 프로토콜 위반
///
/// 일시적인 손실이 아니라 로직/설정 오류를 의미하므로 재전송하지 않음
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolViolation {
    #[error("스터핑 데이터가 이스케이프 바이트로 끝남")]
    DanglingEscape,

    #[error("페이로드 크기 초과: {size} bytes (최대 {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("수신 버퍼 부족: {needed} bytes 필요, {available} bytes 사용 가능")]
    BufferTooSmall { needed: usize, available: usize },
}

/// SLL 링크 계층 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("채널 I/O 에러: {0}")]
    Channel(#[from] std::io::Error),

    #[error("연결 실패: {attempts}회 시도 후 UA 없음")]
    ConnectionFailed { attempts: u32 },

    #[error("전송 실패: {attempts}회 시도 후 RR 없음")]
    TransferFailed { attempts: u32 },

    #[error("연결 해제 실패: {attempts}회 시도 후 응답 없음")]
    DisconnectFailed { attempts: u32 },

    #[error("프로토콜 위반: {0}")]
    Protocol(#[from] ProtocolViolation),

    #[error("잘못된 상태: expected {expected}, got {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("설정 에러: {0}")]
    Config(String),

    #[error("직렬화 에러: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("전송 데이터 불일치: {0}")]
    TransferMismatch(String),
}

impl Error {
    /// 재시도 예산 소진으로 인한 실패인지 여부
    pub fn is_retry_exhausted(&self) -> bool {
        matches!(
            self,
            Error::ConnectionFailed { .. }
                | Error::TransferFailed { .. }
                | Error::DisconnectFailed { .. }
        )
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_violation_conversion() {
        let err: Error = ProtocolViolation::DanglingEscape.into();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolViolation::DanglingEscape)
        ));
        assert!(!err.is_retry_exhausted());
    }

    #[test]
    fn test_violation_message_wrapped() {
        let err: Error = ProtocolViolation::PayloadTooLarge { size: 9, max: 8 }.into();
        assert_eq!(
            err.to_string(),
            "프로토콜 위반: 페이로드 크기 초과: 9 bytes (최대 8)"
        );
    }

    #[test]
    fn test_retry_exhausted() {
        assert!(Error::TransferFailed { attempts: 3 }.is_retry_exhausted());
        assert!(Error::ConnectionFailed { attempts: 1 }.is_retry_exhausted());
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        assert!(!Error::from(io_err).is_retry_exhausted());
    }
}
