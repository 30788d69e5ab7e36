//! 바이트 스터핑 (투명성 코덱)
//!
//! 페이로드 안에 구분자([`FLAG`])나 이스케이프([`ESC`]) 바이트가 있으면
//! `ESC, byte ^ ESC_MASK` 쌍으로 치환하여 프레임 경계를 모호하지 않게 만든다.
//!
//! ```plain
//! 0x7E -> 0x7D 0x5E
//! 0x7D -> 0x7D 0x5D
//! ```
//!
//! 두 연산 모두 순수 함수이며, 호출자가 지정한 상한을 넘는 입력은
//! 잘라내지 않고 [`ProtocolViolation::PayloadTooLarge`]로 거부한다.

use bytes::{BufMut, BytesMut};

use crate::error::ProtocolViolation;

/// 프레임 구분자
pub const FLAG: u8 = 0x7E;

/// 이스케이프 바이트
pub const ESC: u8 = 0x7D;

/// 이스케이프된 바이트에 적용하는 XOR 마스크
pub const ESC_MASK: u8 = 0x20;

/// 이스케이프가 필요한 바이트인지 여부
pub const fn need_escape(byte: u8) -> bool {
    byte == FLAG || byte == ESC
}

// 치환 결과가 다시 이스케이프 대상이면 복원이 모호해짐
const _: () = assert!(!need_escape(FLAG ^ ESC_MASK) && !need_escape(ESC ^ ESC_MASK));

/// 페이로드 스터핑
///
/// 결과 길이는 항상 입력 길이 이상이며 최대 두 배.
pub fn stuff(payload: &[u8], limit: usize) -> Result<BytesMut, ProtocolViolation> {
    if payload.len() > limit {
        return Err(ProtocolViolation::PayloadTooLarge {
            size: payload.len(),
            max: limit,
        });
    }

    let mut out = BytesMut::with_capacity(stuffed_len(payload));
    stuff_into(payload, &mut out);
    Ok(out)
}

/// 상한 검사 없이 `out` 뒤에 스터핑된 바이트를 덧붙임
pub(crate) fn stuff_into(payload: &[u8], out: &mut BytesMut) {
    for &byte in payload {
        if need_escape(byte) {
            out.put_u8(ESC);
            out.put_u8(byte ^ ESC_MASK);
        } else {
            out.put_u8(byte);
        }
    }
}

/// 스터핑 후 길이 계산
pub fn stuffed_len(payload: &[u8]) -> usize {
    payload.len() + payload.iter().filter(|&&b| need_escape(b)).count()
}

/// 정보 프레임 페이로드 영역(페이로드 + BCC2)의 스터핑 후 최대 길이
pub const fn max_stuffed_len(max_payload: usize) -> usize {
    2 * (max_payload + 1)
}

/// 디스터핑
///
/// `ESC` 다음 바이트는 마스크를 벗겨 복원하고, 그 외 바이트는 그대로 복사.
/// 입력이 `ESC`로 끝나면 [`ProtocolViolation::DanglingEscape`].
pub fn destuff(stuffed: &[u8], limit: usize) -> Result<Vec<u8>, ProtocolViolation> {
    let mut out = Vec::with_capacity(stuffed.len().min(limit));
    let mut bytes = stuffed.iter();

    while let Some(&byte) = bytes.next() {
        let decoded = if byte == ESC {
            match bytes.next() {
                Some(&next) => next ^ ESC_MASK,
                None => return Err(ProtocolViolation::DanglingEscape),
            }
        } else {
            byte
        };

        if out.len() == limit {
            return Err(ProtocolViolation::PayloadTooLarge {
                size: out.len() + 1,
                max: limit,
            });
        }
        out.push(decoded);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_stuffed_len_is_worst_case() {
        // 페이로드와 BCC2가 모두 이스케이프되는 경우
        let region = [FLAG; 9];
        assert_eq!(stuffed_len(&region), max_stuffed_len(8));
        assert_eq!(stuff(&region, 9).unwrap().len(), max_stuffed_len(8));
    }

    #[test]
    fn test_passthrough() {
        let data = b"hello world";
        assert_eq!(&stuff(data, 64).unwrap()[..], data);
        assert_eq!(destuff(data, 64).unwrap(), data.to_vec());
    }

    #[test]
    fn test_escape_special_bytes() {
        let data = [0x01, FLAG, 0x02, ESC, 0x03];
        let stuffed = stuff(&data, 64).unwrap();
        assert_eq!(
            &stuffed[..],
            &[0x01, ESC, 0x5E, 0x02, ESC, 0x5D, 0x03]
        );
        assert_eq!(stuffed_len(&data), stuffed.len());
        assert_eq!(destuff(&stuffed, 64).unwrap(), data.to_vec());
    }

    #[test]
    fn test_all_byte_values_roundtrip() {
        let data: Vec<u8> = (0..=255).collect();
        let stuffed = stuff(&data, 256).unwrap();
        assert_eq!(stuffed.len(), 258);
        assert!(!stuffed.contains(&FLAG));
        assert_eq!(destuff(&stuffed, 256).unwrap(), data);
    }

    #[test]
    fn test_worst_case_doubles() {
        let data = [FLAG; 32];
        let stuffed = stuff(&data, 32).unwrap();
        assert_eq!(stuffed.len(), 64);
        assert_eq!(destuff(&stuffed, 32).unwrap(), data.to_vec());
    }

    #[test]
    fn test_empty() {
        assert!(stuff(&[], 8).unwrap().is_empty());
        assert!(destuff(&[], 8).unwrap().is_empty());
    }

    #[test]
    fn test_dangling_escape() {
        assert_eq!(
            destuff(&[0x01, ESC], 8),
            Err(ProtocolViolation::DanglingEscape)
        );
        assert_eq!(destuff(&[ESC], 8), Err(ProtocolViolation::DanglingEscape));
    }

    #[test]
    fn test_size_limits() {
        assert_eq!(
            stuff(&[0u8; 9], 8).unwrap_err(),
            ProtocolViolation::PayloadTooLarge { size: 9, max: 8 }
        );
        // 이스케이프 쌍은 한 바이트로 계산됨
        let stuffed = [ESC, 0x5E, ESC, 0x5D];
        assert_eq!(destuff(&stuffed, 2).unwrap(), vec![FLAG, ESC]);
        assert!(matches!(
            destuff(&stuffed, 1),
            Err(ProtocolViolation::PayloadTooLarge { max: 1, .. })
        ));
    }
}
