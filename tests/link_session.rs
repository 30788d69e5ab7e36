//! 두 세션을 메모리 채널로 연결한 종단 간 시나리오

use std::thread;
use std::time::Duration;

use sll::{Config, Delivery, Error, LinkLayer, LossyChannel, MemoryChannel, Role, SeqBit};

const QUANTUM: Duration = Duration::from_millis(2);

#[test]
fn lost_acknowledgement_is_recovered_by_retransmission() {
    let (a, b) = MemoryChannel::pair(QUANTUM);
    let timeout = Duration::from_secs(1);

    let responder = thread::spawn(move || {
        let config = Config::new(Role::Responder)
            .with_retries(3)
            .with_timeout(timeout);
        let mut link = LinkLayer::new(config, LossyChannel::new(b, 0)).unwrap();
        link.open().unwrap();

        let mut buf = [0u8; 16];
        assert_eq!(link.receive(&mut buf).unwrap(), Delivery::Data(4));
        assert_eq!(&buf[..4], &[0x01, 0x02, 0x03, 0x04]);

        // 두 번째 프레임의 RR을 유실시킴
        link.channel_mut().drop_next_writes(1);
        buf.fill(0);
        assert_eq!(link.receive(&mut buf).unwrap(), Delivery::Data(4));
        assert_eq!(&buf[..4], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(link.channel().dropped_writes(), 1);

        // 재전송된 프레임은 중복으로 처리되고 버퍼는 그대로
        buf.fill(0);
        assert_eq!(link.receive(&mut buf).unwrap(), Delivery::Duplicate(4));
        assert!(buf.iter().all(|&b| b == 0));

        assert_eq!(link.receive(&mut buf).unwrap(), Delivery::Data(5));
        assert_eq!(&buf[..5], b"three");

        assert_eq!(link.receive(&mut buf).unwrap(), Delivery::EndOfSession);
        let stats = link.close().unwrap();
        assert_eq!(stats.info_frames_received, 3);
        assert_eq!(stats.duplicates_received, 1);
    });

    let config = Config::new(Role::Initiator)
        .with_retries(3)
        .with_timeout(timeout);
    let mut link = LinkLayer::new(config, a).unwrap();
    link.open().unwrap();
    assert_eq!(link.tx_sequence(), SeqBit::ZERO);

    assert_eq!(link.send(&[0x01, 0x02, 0x03, 0x04]).unwrap(), 4);
    assert_eq!(link.tx_sequence(), SeqBit::ONE);
    assert_eq!(link.retries(), 0);

    assert_eq!(link.send(&[0x01, 0x02, 0x03, 0x04]).unwrap(), 4);
    assert_eq!(link.retries(), 1);
    assert_eq!(link.tx_sequence(), SeqBit::ZERO);

    // 재시도 카운터는 send마다 초기화
    assert_eq!(link.send(b"three").unwrap(), 5);
    assert_eq!(link.retries(), 0);

    let stats = link.close().unwrap();
    assert_eq!(stats.retransmissions, 1);
    assert_eq!(stats.info_frames_sent, 4);

    responder.join().unwrap();
}

#[test]
fn lossy_line_delivers_every_payload_once_in_order() {
    let (a, b) = MemoryChannel::pair(QUANTUM);
    let timeout = Duration::from_millis(100);
    let count = 20usize;

    // 대문자만 사용: 1비트 반전으로 FLAG/ESC가 만들어지지 않음
    let payloads: Vec<Vec<u8>> = (0..count)
        .map(|i| {
            (0..(i % 7) + 1)
                .map(|j| b'A' + ((i + j) % 26) as u8)
                .collect()
        })
        .collect();
    let expected = payloads.clone();

    let responder = thread::spawn(move || {
        let config = Config::new(Role::Responder)
            .with_retries(10)
            .with_timeout(timeout);
        let channel = LossyChannel::new(b, 42)
            .with_drop_rate(0.1)
            .with_corrupt_rate(0.1);
        let mut link = LinkLayer::new(config, channel).unwrap();
        link.open().unwrap();

        let mut received = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            match link.receive(&mut buf).unwrap() {
                Delivery::Data(len) => received.push(buf[..len].to_vec()),
                Delivery::Duplicate(_) => {}
                Delivery::EndOfSession => break,
            }
        }
        let _ = link.close();
        received
    });

    let config = Config::new(Role::Initiator)
        .with_retries(10)
        .with_timeout(timeout);
    let channel = LossyChannel::new(a, 7)
        .with_drop_rate(0.1)
        .with_corrupt_rate(0.1);
    let mut link = LinkLayer::new(config, channel).unwrap();
    link.open().unwrap();
    for payload in &payloads {
        assert_eq!(link.send(payload).unwrap(), payload.len());
    }
    let _ = link.close();

    assert_eq!(responder.join().unwrap(), expected);
}

#[test]
fn silent_peer_exhausts_retry_budget() {
    let (a, _b) = MemoryChannel::pair(QUANTUM);
    let config = Config::new(Role::Initiator)
        .with_retries(2)
        .with_timeout(Duration::from_millis(30));
    let mut link = LinkLayer::new(config, a).unwrap();

    let err = link.open().unwrap_err();
    assert!(err.is_retry_exhausted());
    assert!(matches!(err, Error::ConnectionFailed { attempts: 2 }));
}
