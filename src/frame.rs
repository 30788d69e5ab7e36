//! 프레임 형식 정의
//!
//! ```plain
//! 제어 프레임:  | FLAG | A | C | A^C | FLAG |
//! 정보 프레임:  | FLAG | A | C(Ns) | A^C | stuff(D1..Dn, BCC2) | FLAG |
//! ```
//!
//! 제어 프레임은 헤더 바이트가 FLAG/ESC와 겹치지 않도록 정해져 있어 스터핑하지 않는다.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ProtocolViolation;
use crate::stuffing::{self, need_escape, FLAG};

/// 제어 프레임 길이
pub const CONTROL_FRAME_LEN: usize = 5;

/// Initiator가 보내는 명령 / Responder가 보내는 응답의 주소
pub const ADDR_INITIATOR_COMMAND: u8 = 0x03;

/// Responder가 보내는 명령 / Initiator가 보내는 응답의 주소
pub const ADDR_RESPONDER_COMMAND: u8 = 0x01;

pub const C_SET: u8 = 0x03;
pub const C_UA: u8 = 0x07;
pub const C_DISC: u8 = 0x0B;
pub const C_I0: u8 = 0x00;
pub const C_I1: u8 = 0x40;
pub const C_RR0: u8 = 0x05;
pub const C_RR1: u8 = 0x85;
pub const C_REJ0: u8 = 0x01;
pub const C_REJ1: u8 = 0x81;

const _: () = {
    let header = [
        ADDR_INITIATOR_COMMAND,
        ADDR_RESPONDER_COMMAND,
        C_SET,
        C_UA,
        C_DISC,
        C_I0,
        C_I1,
        C_RR0,
        C_RR1,
        C_REJ0,
        C_REJ1,
    ];
    let mut i = 0;
    while i < header.len() {
        assert!(!need_escape(header[i]));
        i += 1;
    }
};

/// 1비트 교대 순서 번호
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct SeqBit(bool);

impl SeqBit {
    pub const ZERO: SeqBit = SeqBit(false);
    pub const ONE: SeqBit = SeqBit(true);

    /// 다음 순서 번호 (mod 2)
    pub fn next(self) -> SeqBit {
        SeqBit(!self.0)
    }

    pub fn flip(&mut self) {
        self.0 = !self.0;
    }

    pub fn as_u8(self) -> u8 {
        self.0 as u8
    }
}

impl std::fmt::Display for SeqBit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// 제어 필드
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// 연결 요청
    Set,
    /// 비번호 확인 응답
    Ua,
    /// 연결 해제
    Disc,
    /// 정보 프레임 (송신 순서 번호)
    Info(SeqBit),
    /// 수신 준비 완료 (다음에 기대하는 순서 번호)
    Rr(SeqBit),
    /// 거부 (재전송 요청할 순서 번호)
    Rej(SeqBit),
}

impl Control {
    pub fn to_byte(self) -> u8 {
        match self {
            Control::Set => C_SET,
            Control::Ua => C_UA,
            Control::Disc => C_DISC,
            Control::Info(SeqBit::ZERO) => C_I0,
            Control::Info(_) => C_I1,
            Control::Rr(SeqBit::ZERO) => C_RR0,
            Control::Rr(_) => C_RR1,
            Control::Rej(SeqBit::ZERO) => C_REJ0,
            Control::Rej(_) => C_REJ1,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Control> {
        let control = match byte {
            C_SET => Control::Set,
            C_UA => Control::Ua,
            C_DISC => Control::Disc,
            C_I0 => Control::Info(SeqBit::ZERO),
            C_I1 => Control::Info(SeqBit::ONE),
            C_RR0 => Control::Rr(SeqBit::ZERO),
            C_RR1 => Control::Rr(SeqBit::ONE),
            C_REJ0 => Control::Rej(SeqBit::ZERO),
            C_REJ1 => Control::Rej(SeqBit::ONE),
            _ => return None,
        };
        Some(control)
    }

    /// 페이로드를 가지는 정보 프레임인지 여부
    pub fn is_information(self) -> bool {
        matches!(self, Control::Info(_))
    }
}

/// XOR 블록 검사 문자
pub fn bcc(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, &b| acc ^ b)
}

/// 제어 프레임 생성
pub fn control_frame(address: u8, control: Control) -> [u8; CONTROL_FRAME_LEN] {
    let c = control.to_byte();
    [FLAG, address, c, address ^ c, FLAG]
}

/// 정보 프레임 생성
///
/// `max_payload`를 넘는 페이로드는 [`ProtocolViolation::PayloadTooLarge`].
pub fn information_frame(
    address: u8,
    seq: SeqBit,
    payload: &[u8],
    max_payload: usize,
) -> Result<Bytes, ProtocolViolation> {
    if payload.len() > max_payload {
        return Err(ProtocolViolation::PayloadTooLarge {
            size: payload.len(),
            max: max_payload,
        });
    }

    let c = Control::Info(seq).to_byte();
    let bcc2 = bcc(payload);

    let mut buf = BytesMut::with_capacity(6 + 2 * (payload.len() + 1));
    buf.put_slice(&[FLAG, address, c, address ^ c]);
    stuffing::stuff_into(payload, &mut buf);
    stuffing::stuff_into(&[bcc2], &mut buf);
    buf.put_u8(FLAG);

    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stuffing::{ESC, ESC_MASK};

    #[test]
    fn test_control_code_roundtrip() {
        let all = [
            Control::Set,
            Control::Ua,
            Control::Disc,
            Control::Info(SeqBit::ZERO),
            Control::Info(SeqBit::ONE),
            Control::Rr(SeqBit::ZERO),
            Control::Rr(SeqBit::ONE),
            Control::Rej(SeqBit::ZERO),
            Control::Rej(SeqBit::ONE),
        ];
        for control in all {
            assert_eq!(Control::from_byte(control.to_byte()), Some(control));
        }
        assert_eq!(Control::from_byte(0xFF), None);
    }

    #[test]
    fn test_seq_bit() {
        let mut seq = SeqBit::default();
        assert_eq!(seq, SeqBit::ZERO);
        assert_eq!(seq.next(), SeqBit::ONE);
        seq.flip();
        assert_eq!(seq.as_u8(), 1);
        seq.flip();
        assert_eq!(seq.as_u8(), 0);
    }

    #[test]
    fn test_control_frame_layout() {
        let frame = control_frame(ADDR_INITIATOR_COMMAND, Control::Set);
        assert_eq!(frame, [FLAG, 0x03, 0x03, 0x00, FLAG]);

        let frame = control_frame(ADDR_RESPONDER_COMMAND, Control::Rr(SeqBit::ONE));
        assert_eq!(frame, [FLAG, 0x01, 0x85, 0x84, FLAG]);
    }

    #[test]
    fn test_information_frame_layout() {
        let frame =
            information_frame(ADDR_INITIATOR_COMMAND, SeqBit::ONE, &[0x01, 0x02, 0x03, 0x04], 16)
                .unwrap();
        assert_eq!(
            &frame[..],
            &[FLAG, 0x03, 0x40, 0x43, 0x01, 0x02, 0x03, 0x04, 0x04, FLAG]
        );
    }

    #[test]
    fn test_information_frame_stuffs_checksum() {
        // BCC2 자체가 FLAG인 경우도 이스케이프되어야 함
        let frame = information_frame(ADDR_INITIATOR_COMMAND, SeqBit::ZERO, &[FLAG], 16).unwrap();
        assert_eq!(
            &frame[..],
            &[FLAG, 0x03, 0x00, 0x03, ESC, FLAG ^ ESC_MASK, ESC, FLAG ^ ESC_MASK, FLAG]
        );
    }

    #[test]
    fn test_information_frame_too_large() {
        let err = information_frame(ADDR_INITIATOR_COMMAND, SeqBit::ZERO, &[0u8; 17], 16);
        assert_eq!(
            err.unwrap_err(),
            ProtocolViolation::PayloadTooLarge { size: 17, max: 16 }
        );
    }
}
