//! 링크 설정

use std::time::Duration;

use crate::frame::{ADDR_INITIATOR_COMMAND, ADDR_RESPONDER_COMMAND};
use crate::{Error, Result, DEFAULT_MAX_PAYLOAD_SIZE};

/// 페이로드 크기 상한 (설정 검증용)
pub const MAX_PAYLOAD_LIMIT: usize = 16 * 1024;

/// 채널 역할
///
/// SET/DISC를 먼저 보내는 쪽이 Initiator, 기다리는 쪽이 Responder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

impl Role {
    /// 상대방 역할
    pub fn peer(self) -> Role {
        match self {
            Role::Initiator => Role::Responder,
            Role::Responder => Role::Initiator,
        }
    }

    /// 이 역할이 보내는 명령 프레임(SET, DISC, I)의 주소
    pub fn command_address(self) -> u8 {
        match self {
            Role::Initiator => ADDR_INITIATOR_COMMAND,
            Role::Responder => ADDR_RESPONDER_COMMAND,
        }
    }

    /// 이 역할이 보내는 응답 프레임(UA, RR, REJ)의 주소
    ///
    /// 응답은 상대 명령과 같은 주소를 사용
    pub fn response_address(self) -> u8 {
        self.peer().command_address()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Initiator => "initiator",
            Role::Responder => "responder",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SLL 세션 설정
///
/// 세션 시작 시 한 번 정해지고 이후 변경되지 않음
#[derive(Debug, Clone)]
pub struct Config {
    /// 채널 역할
    pub role: Role,

    /// 프레임당 최대 전송 시도 횟수
    pub retries: u32,

    /// 시도당 응답 대기 타임아웃
    pub timeout: Duration,

    /// 정보 프레임 최대 페이로드 크기 (바이트, 스터핑 전)
    pub max_payload_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            role: Role::Initiator,
            retries: 3,
            timeout: Duration::from_secs(1),
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new(role: Role) -> Self {
        Self {
            role,
            ..Self::default()
        }
    }

    pub fn initiator() -> Self {
        Self::new(Role::Initiator)
    }

    pub fn responder() -> Self {
        Self::new(Role::Responder)
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_payload_size(mut self, max_payload_size: usize) -> Self {
        self.max_payload_size = max_payload_size;
        self
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.retries == 0 {
            return Err(Error::Config("retries must be at least 1".into()));
        }
        if self.timeout.is_zero() {
            return Err(Error::Config("timeout must be positive".into()));
        }
        if self.max_payload_size == 0 || self.max_payload_size > MAX_PAYLOAD_LIMIT {
            return Err(Error::Config(format!(
                "max_payload_size must be within 1..={}, got {}",
                MAX_PAYLOAD_LIMIT, self.max_payload_size
            )));
        }
        Ok(())
    }

    /// 노이즈가 많은 회선용 설정
    pub fn noisy_line(role: Role) -> Self {
        Self {
            role,
            retries: 8,
            timeout: Duration::from_secs(2),
            max_payload_size: 256, // 작은 프레임일수록 손상 확률 낮음
        }
    }

    /// 짧고 안정적인 회선용 설정
    pub fn fast_line(role: Role) -> Self {
        Self {
            role,
            retries: 3,
            timeout: Duration::from_millis(300),
            max_payload_size: 4096,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.role, Role::Initiator);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(Config::default().with_retries(0).validate().is_err());
        assert!(Config::default()
            .with_timeout(Duration::ZERO)
            .validate()
            .is_err());
        assert!(Config::default()
            .with_max_payload_size(0)
            .validate()
            .is_err());
        assert!(Config::default()
            .with_max_payload_size(MAX_PAYLOAD_LIMIT + 1)
            .validate()
            .is_err());
    }

    #[test]
    fn test_role_addresses() {
        // 명령과 그에 대한 응답은 같은 주소를 공유
        assert_eq!(
            Role::Initiator.command_address(),
            Role::Responder.response_address()
        );
        assert_eq!(
            Role::Responder.command_address(),
            Role::Initiator.response_address()
        );
        assert_ne!(
            Role::Initiator.command_address(),
            Role::Responder.command_address()
        );
        assert_eq!(Role::Initiator.peer(), Role::Responder);
    }

    #[test]
    fn test_presets() {
        assert!(Config::noisy_line(Role::Responder).validate().is_ok());
        assert!(Config::fast_line(Role::Initiator).validate().is_ok());
    }
}
