//! # SLL (Serial Link Layer)
//!
//! 바이트 단위 시리얼 채널 위의 정지-대기(stop-and-wait) ARQ 데이터 링크 프로토콜
//!
//! ## 핵심 특징
//! - **HDLC식 프레이밍**: FLAG(0x7E) 구분, ESC(0x7D) 바이트 스터핑
//! - **헤더/페이로드 체크섬**: BCC1 = A ^ C, BCC2 = 페이로드 XOR
//! - **1비트 순서 번호**: 중복 프레임 억제, RR/REJ 확인 응답
//! - **재전송 타이머**: 타임아웃/REJ 기반 재전송, 재시도 예산 제한
//! - **재동기화**: 노이즈나 잘린 프레임 뒤 다음 FLAG에서 복구
//!
//! ## 구성
//! - [`stuffing`]: 바이트 스터핑/디스터핑
//! - [`frame`]: 프레임 상수와 인코딩
//! - [`recognizer`]: 바이트 단위 프레임 인식 상태 기계
//! - [`timer`]: 재전송 타이머
//! - [`link`]: 연결 설정/데이터 전송/연결 해제
//! - [`transfer`]: 링크 위의 파일 전송

pub mod channel;
pub mod config;
pub mod error;
pub mod frame;
pub mod link;
pub mod recognizer;
pub mod stats;
pub mod stuffing;
pub mod timer;
pub mod transfer;

pub use channel::{Channel, LossyChannel, MemoryChannel, SerialChannel};
pub use config::{Config, Role};
pub use error::{Error, ProtocolViolation, Result};
pub use frame::{Control, SeqBit};
pub use link::{Delivery, LinkLayer, Phase};
pub use recognizer::{Expectation, FrameRecognizer, Outcome};
pub use stats::LinkStats;
pub use timer::RetransmissionTimer;
pub use transfer::{receive_file, send_file, TransferMessage};

/// 기본 최대 페이로드 크기 (바이트, 스터핑 전)
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 1024;

/// 기본 시리얼 속도
pub const DEFAULT_BAUD_RATE: u32 = 38400;
