//! 프레임 인식기
//!
//! 채널에서 읽은 바이트를 하나씩 받아 헤더(FLAG, A, C, BCC1)를 검사하고,
//! 정보 프레임이면 종료 FLAG까지 페이로드를 모은 뒤 디스터핑과 BCC2 검사를 한다.
//! I/O를 하지 않는 순수 상태 기계이며, 읽기 루프는 링크 컨트롤러가 소유한다.
//!
//! 재동기화 규칙:
//! - 어떤 상태에서든 예상치 못한 바이트가 오면 진행 상황을 버리고 `AwaitStart`로
//! - 단, 그 바이트가 FLAG이면 곧바로 `AwaitAddr`로 (새 프레임의 시작일 수 있음)

use bytes::BytesMut;

use crate::frame::{bcc, Control, SeqBit};
use crate::stuffing::{destuff, max_stuffed_len, FLAG};

/// 인식기 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognizerState {
    AwaitStart,
    AwaitAddr,
    AwaitCtrl,
    AwaitChecksum,
    AwaitTerminator,
    /// 정보 프레임 페이로드 수집 중
    Payload,
    Done,
}

/// 호출자가 기다리는 프레임
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    /// 특정 제어 프레임 (SET, UA, DISC)
    Control { address: u8, control: Control },
    /// 전송 중인 정보 프레임에 대한 확인 응답: RR(next) 또는 REJ(next ^ 1)
    Acknowledgement { address: u8, next: SeqBit },
    /// 순서 번호 `seq`인 정보 프레임
    Information { address: u8, seq: SeqBit },
}

/// 헤더의 제어 필드가 기대와 어떻게 맞았는지
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Match {
    Expected,
    Duplicate,
    Reject,
    Disconnect,
    Setup,
}

impl Expectation {
    pub fn address(&self) -> u8 {
        match *self {
            Expectation::Control { address, .. }
            | Expectation::Acknowledgement { address, .. }
            | Expectation::Information { address, .. } => address,
        }
    }

    fn classify(&self, byte: u8) -> Option<Match> {
        let control = Control::from_byte(byte)?;

        match (*self, control) {
            (Expectation::Control { control: want, .. }, c) if c == want => Some(Match::Expected),
            (Expectation::Acknowledgement { next, .. }, Control::Rr(n)) if n == next => {
                Some(Match::Expected)
            }
            (Expectation::Acknowledgement { next, .. }, Control::Rej(n)) if n == next.next() => {
                Some(Match::Reject)
            }
            (Expectation::Information { seq, .. }, Control::Info(s)) => {
                if s == seq {
                    Some(Match::Expected)
                } else {
                    Some(Match::Duplicate)
                }
            }
            (_, Control::Disc) => Some(Match::Disconnect),
            (Expectation::Information { .. }, Control::Set) => Some(Match::Setup),
            _ => None,
        }
    }
}

/// 바이트 하나를 처리한 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// 헤더, BCC1 (정보 프레임이면 BCC2까지) 모두 유효하고 기대와 일치
    Accepted,
    /// 이전에 이미 받은 순서 번호의 정상 정보 프레임 (상대가 RR을 못 받음)
    Duplicate,
    /// 전송 중인 프레임에 대한 REJ
    Rejected,
    /// 페이로드 BCC2 불일치
    ChecksumMismatch,
    /// 다른 것을 기다리던 중 DISC 수신
    Disconnect,
    /// 정보 프레임을 기다리던 중 SET 수신 (상대가 UA를 못 받음)
    Setup,
    /// 아직 종료 상태가 아님
    InProgress,
    /// 프레임 형태가 깨져 진행 상황을 버림
    Malformed,
}

impl Outcome {
    /// 프레임 하나의 인식이 끝났는지 여부
    pub fn is_terminal(self) -> bool {
        !matches!(self, Outcome::InProgress | Outcome::Malformed)
    }
}

/// 프레임 인식기
#[derive(Debug)]
pub struct FrameRecognizer {
    state: RecognizerState,
    expectation: Expectation,
    max_payload: usize,
    matched: Option<Match>,
    control: u8,
    stuffed: BytesMut,
    payload: Vec<u8>,
}

impl FrameRecognizer {
    /// 새 인식기 생성
    pub fn new(expectation: Expectation, max_payload: usize) -> Self {
        Self {
            state: RecognizerState::AwaitStart,
            expectation,
            max_payload,
            matched: None,
            control: 0,
            stuffed: BytesMut::with_capacity(max_stuffed_len(max_payload)),
            payload: Vec::with_capacity(max_payload),
        }
    }

    /// 새 기대값으로 재설정하고 `AwaitStart`부터 시작
    pub fn arm(&mut self, expectation: Expectation) {
        self.expectation = expectation;
        self.reset();
    }

    /// 기대값은 유지하고 `AwaitStart`부터 다시 시작
    pub fn reset(&mut self) {
        self.state = RecognizerState::AwaitStart;
        self.matched = None;
        self.control = 0;
        self.stuffed.clear();
        self.payload.clear();
    }

    pub fn state(&self) -> RecognizerState {
        self.state
    }

    pub fn expectation(&self) -> Expectation {
        self.expectation
    }

    /// 마지막으로 인식된 프레임의 제어 필드
    pub fn control(&self) -> Option<Control> {
        if self.state == RecognizerState::Done {
            Control::from_byte(self.control)
        } else {
            None
        }
    }

    /// 마지막으로 수락된 정보 프레임의 페이로드 (BCC2 제외)
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// 바이트 하나 처리
    pub fn step(&mut self, byte: u8) -> Outcome {
        match self.state {
            RecognizerState::AwaitStart | RecognizerState::Done => {
                if byte == FLAG {
                    self.reset();
                    self.state = RecognizerState::AwaitAddr;
                }
                Outcome::InProgress
            }

            RecognizerState::AwaitAddr => {
                if byte == self.expectation.address() {
                    self.state = RecognizerState::AwaitCtrl;
                    Outcome::InProgress
                } else if byte == FLAG {
                    // 연속된 FLAG (직전 프레임의 종료 + 새 프레임의 시작)
                    Outcome::InProgress
                } else {
                    self.resync(byte)
                }
            }

            RecognizerState::AwaitCtrl => match self.expectation.classify(byte) {
                Some(matched) => {
                    self.matched = Some(matched);
                    self.control = byte;
                    self.state = RecognizerState::AwaitChecksum;
                    Outcome::InProgress
                }
                None => self.resync(byte),
            },

            RecognizerState::AwaitChecksum => {
                if byte != self.expectation.address() ^ self.control {
                    return self.resync(byte);
                }
                let is_info = Control::from_byte(self.control).is_some_and(Control::is_information);
                self.state = if is_info {
                    self.stuffed.clear();
                    RecognizerState::Payload
                } else {
                    RecognizerState::AwaitTerminator
                };
                Outcome::InProgress
            }

            RecognizerState::AwaitTerminator => {
                if byte == FLAG {
                    self.finish()
                } else {
                    self.state = RecognizerState::AwaitStart;
                    Outcome::Malformed
                }
            }

            RecognizerState::Payload => {
                if byte == FLAG {
                    return self.finish_payload();
                }
                if self.stuffed.len() >= max_stuffed_len(self.max_payload) {
                    // 상한 초과: 이 프레임은 버리고 다음 FLAG를 기다림
                    self.stuffed.clear();
                    self.state = RecognizerState::AwaitStart;
                    return Outcome::Malformed;
                }
                self.stuffed.extend_from_slice(&[byte]);
                Outcome::InProgress
            }
        }
    }

    fn resync(&mut self, byte: u8) -> Outcome {
        self.matched = None;
        self.state = if byte == FLAG {
            RecognizerState::AwaitAddr
        } else {
            RecognizerState::AwaitStart
        };
        Outcome::Malformed
    }

    fn finish(&mut self) -> Outcome {
        self.state = RecognizerState::Done;
        match self.matched.take() {
            Some(Match::Expected) => Outcome::Accepted,
            Some(Match::Duplicate) => Outcome::Duplicate,
            Some(Match::Reject) => Outcome::Rejected,
            Some(Match::Disconnect) => Outcome::Disconnect,
            Some(Match::Setup) => Outcome::Setup,
            None => {
                self.state = RecognizerState::AwaitStart;
                Outcome::Malformed
            }
        }
    }

    fn finish_payload(&mut self) -> Outcome {
        let decoded = destuff(&self.stuffed, self.max_payload + 1);
        self.stuffed.clear();

        let mut data = match decoded {
            Ok(data) if !data.is_empty() => data,
            // BCC2가 없거나 ESC로 끝남: 종료 FLAG가 다음 프레임의 시작일 수 있음
            _ => {
                self.matched = None;
                self.state = RecognizerState::AwaitAddr;
                return Outcome::Malformed;
            }
        };

        let bcc2 = data.pop().unwrap_or_default();
        if bcc(&data) != bcc2 {
            self.matched = None;
            self.state = RecognizerState::Done;
            return Outcome::ChecksumMismatch;
        }

        self.payload = data;
        self.finish()
    }
}
