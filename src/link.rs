//! 링크 컨트롤러
//!
//! 연결 설정(SET/UA), 데이터 전송(I/RR/REJ), 연결 해제(DISC/DISC/UA)를 담당한다.
//! 순서 번호, 재전송 타이머, 재시도 카운터를 세션 객체 안에 모두 소유하며
//! 전역 상태는 없다.
//!
//! ```plain
//!   Initiator                         Responder
//!      | ---- SET ------------------------> |
//!      | <--------------------------- UA -- |      open
//!      | ---- I(Ns) ----------------------> |
//!      | <---------------- RR(Ns^1)/REJ -- |      send / receive (반복)
//!      | ---- DISC -----------------------> |
//!      | <------------------------- DISC -- |
//!      | ---- UA -------------------------> |      close
//! ```
//!
//! 정지-대기(stop-and-wait) 방식이므로 방향마다 확인 응답을 받지 못한 정보 프레임은
//! 최대 하나다. 확인 응답이 유실되어 상대가 같은 프레임을 다시 보내면
//! 수신측은 중복으로 판단하고 직전 RR만 다시 보낸다.
//!
//! 재시도 정책: 타임아웃과 REJ 모두 같은 예산에서 1회씩 차감하며,
//! `open`/`send`/`close`를 시작할 때마다 카운터를 0으로 되돌린다.

use tracing::{debug, info, warn};

use crate::channel::Channel;
use crate::config::{Config, Role};
use crate::error::ProtocolViolation;
use crate::frame::{control_frame, information_frame, Control, SeqBit};
use crate::recognizer::{Expectation, FrameRecognizer, Outcome};
use crate::stats::LinkStats;
use crate::timer::RetransmissionTimer;
use crate::{Error, Result};

/// 세션 수명 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Closed,
    Open,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Closed => "closed",
            Phase::Open => "open",
        }
    }
}

/// [`LinkLayer::receive`] 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// 새 페이로드를 버퍼에 기록함 (길이)
    Data(usize),
    /// 이미 전달한 프레임의 재전송. 버퍼는 건드리지 않음 (직전 페이로드 길이)
    Duplicate(usize),
    /// 상대가 연결을 해제함
    EndOfSession,
}

/// 응답 대기 결과
enum Wait {
    Frame(Outcome),
    Expired,
}

/// 세션 상태 (open마다 초기화)
#[derive(Debug, Default)]
struct Session {
    tx_seq: SeqBit,
    rx_seq: SeqBit,
    last_rx_len: usize,
}

/// 링크 계층 세션
///
/// 채널은 세션이 독점하며 [`close`](LinkLayer::close)에서 해제된다.
pub struct LinkLayer<C: Channel> {
    config: Config,
    channel: C,
    timer: RetransmissionTimer,
    recognizer: FrameRecognizer,
    phase: Phase,
    session: Session,
    stats: LinkStats,
}

impl<C: Channel> LinkLayer<C> {
    /// 새 세션 생성 (Closed 상태)
    pub fn new(config: Config, channel: C) -> Result<Self> {
        config.validate()?;

        let recognizer = FrameRecognizer::new(
            Expectation::Control {
                address: config.role.peer().command_address(),
                control: Control::Set,
            },
            config.max_payload_size,
        );

        Ok(Self {
            timer: RetransmissionTimer::new()?,
            recognizer,
            config,
            channel,
            phase: Phase::Closed,
            session: Session::default(),
            stats: LinkStats::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn role(&self) -> Role {
        self.config.role
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// 다음에 보낼 정보 프레임의 순서 번호
    pub fn tx_sequence(&self) -> SeqBit {
        self.session.tx_seq
    }

    /// 다음에 받을 정보 프레임의 순서 번호
    pub fn rx_sequence(&self) -> SeqBit {
        self.session.rx_seq
    }

    /// 마지막 `open`/`send`/`close`에서 사용한 재시도 횟수
    pub fn retries(&self) -> u32 {
        self.timer.retries()
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// 연결 설정
    ///
    /// Initiator는 SET을 보내고 UA를 기다리며 타임아웃마다 재전송한다.
    /// Responder는 타이머 없이 SET을 기다렸다가 UA를 한 번 보낸다.
    pub fn open(&mut self) -> Result<()> {
        self.ensure_phase(Phase::Closed)?;
        self.session = Session::default();
        self.stats = LinkStats::new();

        let role = self.config.role;
        match role {
            Role::Initiator => {
                let frame = control_frame(role.command_address(), Control::Set);
                let expectation = Expectation::Control {
                    address: role.peer().response_address(),
                    control: Control::Ua,
                };
                if !self.exchange(&frame, expectation, false)? {
                    warn!(%role, attempts = self.config.retries, "no UA received, giving up");
                    return Err(Error::ConnectionFailed {
                        attempts: self.config.retries,
                    });
                }
            }
            Role::Responder => {
                self.recognizer.arm(Expectation::Control {
                    address: role.peer().command_address(),
                    control: Control::Set,
                });
                self.await_accepted()?;
                self.write_control(role.response_address(), Control::Ua)?;
            }
        }

        self.phase = Phase::Open;
        info!(%role, "connection established");
        Ok(())
    }

    /// 정보 프레임 하나 전송
    ///
    /// RR을 받으면 송신 순서 번호를 뒤집고 페이로드 길이를 반환한다.
    /// REJ를 받으면 즉시 재전송, 타임아웃이면 같은 프레임을 재전송한다.
    pub fn send(&mut self, payload: &[u8]) -> Result<usize> {
        self.ensure_phase(Phase::Open)?;

        let role = self.config.role;
        let seq = self.session.tx_seq;
        let frame = information_frame(
            role.command_address(),
            seq,
            payload,
            self.config.max_payload_size,
        )?;
        let expectation = Expectation::Acknowledgement {
            address: role.peer().response_address(),
            next: seq.next(),
        };

        debug!(%role, %seq, len = payload.len(), "sending information frame");
        if !self.exchange(&frame, expectation, true)? {
            warn!(%role, %seq, attempts = self.config.retries, "frame never acknowledged");
            return Err(Error::TransferFailed {
                attempts: self.config.retries,
            });
        }

        self.session.tx_seq.flip();
        self.stats.payload_bytes_sent += payload.len() as u64;
        Ok(payload.len())
    }

    /// 정보 프레임 하나 수신
    ///
    /// 새 프레임이면 `buf`에 복사하고 RR을 보낸다. 중복이면 직전 RR을 다시 보내고
    /// 버퍼와 순서 번호는 그대로 둔다. BCC2 오류면 REJ를 보내고 계속 기다린다.
    /// 상대의 DISC를 받으면 해제 절차를 수행하고 [`Delivery::EndOfSession`]을 반환한다.
    pub fn receive(&mut self, buf: &mut [u8]) -> Result<Delivery> {
        self.ensure_phase(Phase::Open)?;

        let role = self.config.role;
        loop {
            let seq = self.session.rx_seq;
            self.recognizer.arm(Expectation::Information {
                address: role.peer().command_address(),
                seq,
            });

            match self.await_terminal()? {
                Outcome::Accepted => {
                    let len = {
                        let payload = self.recognizer.payload();
                        if payload.len() > buf.len() {
                            return Err(ProtocolViolation::BufferTooSmall {
                                needed: payload.len(),
                                available: buf.len(),
                            }
                            .into());
                        }
                        buf[..payload.len()].copy_from_slice(payload);
                        payload.len()
                    };

                    self.write_control(role.response_address(), Control::Rr(seq.next()))?;
                    self.session.rx_seq.flip();
                    self.session.last_rx_len = len;
                    self.stats.info_frames_received += 1;
                    self.stats.payload_bytes_received += len as u64;
                    debug!(%role, %seq, len, "information frame accepted");
                    return Ok(Delivery::Data(len));
                }

                Outcome::Duplicate => {
                    // 상대는 아직 RR(seq)를 기다리는 중
                    self.stats.duplicates_received += 1;
                    warn!(%role, expected = %seq, "duplicate frame, re-sending RR");
                    self.write_control(role.response_address(), Control::Rr(seq))?;
                    return Ok(Delivery::Duplicate(self.session.last_rx_len));
                }

                Outcome::ChecksumMismatch => {
                    self.stats.rejects_sent += 1;
                    warn!(%role, %seq, "payload checksum mismatch, sending REJ");
                    self.write_control(role.response_address(), Control::Rej(seq))?;
                }

                Outcome::Disconnect => {
                    info!(%role, "peer requested disconnect");
                    match self.reply_disconnect() {
                        Ok(true) => info!(%role, "disconnected by peer"),
                        Ok(false) => warn!(%role, "no UA after DISC, closing anyway"),
                        Err(e) => warn!(%role, "teardown failed: {}", e),
                    }
                    self.phase = Phase::Closed;
                    return Ok(Delivery::EndOfSession);
                }

                Outcome::Setup => {
                    // 상대가 UA를 못 받고 SET을 재전송함
                    warn!(%role, "repeated SET, re-sending UA");
                    self.write_control(role.response_address(), Control::Ua)?;
                }

                other => debug!(?other, "ignored while awaiting information frame"),
            }
        }
    }

    /// 연결 해제 후 채널 해제
    ///
    /// 해제 절차가 실패해도 채널은 반드시 해제되며 에러로 보고만 한다.
    /// 상대의 DISC로 이미 끝난 세션이면 절차 없이 닫는다.
    pub fn close(mut self) -> Result<LinkStats> {
        let role = self.config.role;
        if self.phase == Phase::Closed {
            debug!(%role, "session already closed, releasing channel");
            return Ok(self.stats);
        }

        let result = match role {
            Role::Initiator => self.close_as_initiator(),
            Role::Responder => self.close_as_responder(),
        };
        self.phase = Phase::Closed;

        match &result {
            Ok(()) => info!(%role, "link closed: {}", self.stats.summary()),
            Err(e) => warn!(%role, "link closed without clean teardown: {}", e),
        }
        result.map(|_| self.stats)
    }

    /// Initiator: DISC 전송 → 상대 DISC 대기 (재전송) → UA 전송
    fn close_as_initiator(&mut self) -> Result<()> {
        let role = self.config.role;
        let frame = control_frame(role.command_address(), Control::Disc);
        let expectation = Expectation::Control {
            address: role.peer().command_address(),
            control: Control::Disc,
        };

        if !self.exchange(&frame, expectation, false)? {
            return Err(Error::DisconnectFailed {
                attempts: self.config.retries,
            });
        }
        self.write_control(role.response_address(), Control::Ua)
    }

    /// Responder: DISC 대기 → DISC 전송 → UA 대기
    ///
    /// DISC를 기다리는 동안 들어오는 중복 정보 프레임에는 RR을 다시 보낸다.
    fn close_as_responder(&mut self) -> Result<()> {
        let role = self.config.role;
        let seq = self.session.rx_seq;
        self.timer.reset_retries();
        self.recognizer.arm(Expectation::Information {
            address: role.peer().command_address(),
            seq,
        });

        loop {
            if self.timer.retries() >= self.config.retries {
                return Err(Error::DisconnectFailed {
                    attempts: self.config.retries,
                });
            }

            self.timer.arm(self.config.timeout)?;
            match self.await_frame_disarming()? {
                Wait::Expired => {}
                Wait::Frame(Outcome::Disconnect) => {
                    self.timer.disarm();
                    break;
                }
                Wait::Frame(Outcome::Duplicate) => {
                    self.timer.disarm();
                    self.stats.duplicates_received += 1;
                    self.write_control(role.response_address(), Control::Rr(seq))?;
                    self.recognizer.reset();
                }
                Wait::Frame(other) => {
                    self.timer.disarm();
                    warn!(%role, ?other, "unexpected frame while closing");
                    self.recognizer.reset();
                }
            }
        }

        if self.reply_disconnect()? {
            Ok(())
        } else {
            Err(Error::DisconnectFailed {
                attempts: self.config.retries,
            })
        }
    }

    /// 상대의 DISC에 DISC로 답하고 UA를 기다림. UA를 받으면 `true`.
    fn reply_disconnect(&mut self) -> Result<bool> {
        let role = self.config.role;
        let frame = control_frame(role.command_address(), Control::Disc);
        let expectation = Expectation::Control {
            address: role.peer().response_address(),
            control: Control::Ua,
        };
        self.exchange(&frame, expectation, false)
    }

    /// `frame`을 보내고 `expectation`에 맞는 응답을 기다린다.
    ///
    /// 타임아웃이면 재전송, REJ면 재시도 1회를 차감하고 즉시 재전송한다.
    /// 응답을 받으면 `true`, 재시도 예산을 모두 쓰면 `false`.
    fn exchange(&mut self, frame: &[u8], expectation: Expectation, is_info: bool) -> Result<bool> {
        self.timer.reset_retries();
        let mut attempts = 0u32;

        while self.timer.retries() < self.config.retries {
            if attempts > 0 {
                self.stats.retransmissions += 1;
                if is_info {
                    self.stats.info_retransmissions += 1;
                }
                warn!(
                    role = %self.config.role,
                    attempt = attempts + 1,
                    "retransmitting frame"
                );
            }
            attempts += 1;

            self.channel.write_bytes(frame)?;
            self.stats.frames_sent += 1;
            if is_info {
                self.stats.info_frames_sent += 1;
            }

            self.timer.arm(self.config.timeout)?;
            self.recognizer.arm(expectation);

            match self.await_reply()? {
                Some(Outcome::Rejected) => {
                    // 타이머가 REJ와 동시에 만료됐다면 이미 1회 차감됨
                    if self.timer.disarm() {
                        self.timer.count_retry();
                    }
                    self.stats.rejects_received += 1;
                    warn!(
                        role = %self.config.role,
                        retries = self.timer.retries(),
                        "frame rejected by peer"
                    );
                }
                Some(_) => {
                    self.timer.disarm();
                    return Ok(true);
                }
                None => {
                    debug!(role = %self.config.role, retries = self.timer.retries(), "timeout");
                }
            }
        }

        Ok(false)
    }

    /// 타이머가 만료될 때까지 응답 프레임 대기. `Accepted`/`Rejected`만 반환.
    fn await_reply(&mut self) -> Result<Option<Outcome>> {
        loop {
            match self.await_frame_disarming()? {
                Wait::Expired => return Ok(None),
                Wait::Frame(outcome @ (Outcome::Accepted | Outcome::Rejected)) => {
                    return Ok(Some(outcome))
                }
                Wait::Frame(other) => {
                    debug!(?other, "ignored while awaiting reply");
                    self.recognizer.reset();
                }
            }
        }
    }

    /// 타이머 없이 `Accepted`가 나올 때까지 대기
    fn await_accepted(&mut self) -> Result<()> {
        loop {
            match self.await_terminal()? {
                Outcome::Accepted => return Ok(()),
                other => {
                    debug!(?other, "ignored while awaiting frame");
                    self.recognizer.reset();
                }
            }
        }
    }

    /// 타이머 없이 종료 결과가 나올 때까지 대기
    fn await_terminal(&mut self) -> Result<Outcome> {
        loop {
            if let Wait::Frame(outcome) = self.await_frame(false)? {
                return Ok(outcome);
            }
        }
    }

    /// 채널 에러 시 타이머를 해제하고 전파
    fn await_frame_disarming(&mut self) -> Result<Wait> {
        self.await_frame(true).map_err(|e| {
            self.timer.disarm();
            e
        })
    }

    /// 바이트를 하나씩 읽어 인식기에 공급. 매 읽기 전에 타이머 만료를 확인한다.
    fn await_frame(&mut self, timed: bool) -> Result<Wait> {
        loop {
            if timed && self.timer.expired() {
                self.stats.timeouts += 1;
                return Ok(Wait::Expired);
            }

            let Some(byte) = self.channel.read_byte()? else {
                continue;
            };

            match self.recognizer.step(byte) {
                Outcome::InProgress => {}
                Outcome::Malformed => self.stats.frames_discarded += 1,
                outcome => return Ok(Wait::Frame(outcome)),
            }
        }
    }

    fn write_control(&mut self, address: u8, control: Control) -> Result<()> {
        self.channel.write_bytes(&control_frame(address, control))?;
        self.stats.frames_sent += 1;
        debug!(role = %self.config.role, ?control, "control frame sent");
        Ok(())
    }

    fn ensure_phase(&self, expected: Phase) -> Result<()> {
        if self.phase != expected {
            return Err(Error::InvalidState {
                expected: expected.as_str(),
                actual: self.phase.as_str(),
            });
        }
        Ok(())
    }
}
