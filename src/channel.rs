//! 바이트 채널
//!
//! 링크 계층이 물리 계층에 요구하는 것은 두 가지뿐:
//! - `read_byte`: 드라이버가 정한 시간(quantum)까지 블로킹, 타임아웃이면 `None`
//! - `write_bytes`: 드라이버가 받아들일 때까지 블로킹
//!
//! 구현:
//! - [`SerialChannel`]: 실제 시리얼 포트 (`serialport`)
//! - [`MemoryChannel`]: 프로세스 내부에서 연결된 한 쌍 (테스트/데모용)
//! - [`LossyChannel`]: 쓰기 시 프레임 손실/비트 오류를 주입하는 래퍼

use std::io::{self, Read, Write};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{info, trace};

use crate::Result;

/// 링크 계층이 사용하는 바이트 채널
pub trait Channel {
    /// 바이트 하나 읽기. quantum 내에 도착하지 않으면 `Ok(None)`.
    fn read_byte(&mut self) -> io::Result<Option<u8>>;

    /// 버퍼 전체 쓰기. 쓴 바이트 수 반환.
    fn write_bytes(&mut self, buf: &[u8]) -> io::Result<usize>;
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        (**self).read_byte()
    }

    fn write_bytes(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write_bytes(buf)
    }
}

/// 시리얼 포트 채널 (8N1, 흐름 제어 없음)
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
}

impl SerialChannel {
    /// 시리얼 포트 열기. `quantum`은 바이트 하나를 기다리는 최대 시간.
    pub fn open(path: &str, baud_rate: u32, quantum: Duration) -> Result<Self> {
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(quantum)
            .open()
            .map_err(io::Error::from)?;

        // 이전 세션의 잔여 바이트 제거
        port.clear(ClearBuffer::All).map_err(io::Error::from)?;

        info!("Serial port {} opened at {} baud", path, baud_rate);
        Ok(Self { port })
    }
}

impl Channel for SerialChannel {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut buf = [0u8; 1];
        match self.port.read(&mut buf) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(buf[0])),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn write_bytes(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write_all(buf)?;
        self.port.flush()?;
        Ok(buf.len())
    }
}

/// 메모리 채널 (크로스빔 큐 한 쌍)
pub struct MemoryChannel {
    tx: Sender<u8>,
    rx: Receiver<u8>,
    quantum: Duration,
}

impl MemoryChannel {
    /// 서로 연결된 두 끝점 생성
    pub fn pair(quantum: Duration) -> (Self, Self) {
        let (tx_a, rx_b) = crossbeam_channel::unbounded();
        let (tx_b, rx_a) = crossbeam_channel::unbounded();

        (
            Self {
                tx: tx_a,
                rx: rx_a,
                quantum,
            },
            Self {
                tx: tx_b,
                rx: rx_b,
                quantum,
            },
        )
    }

    /// 아직 읽지 않은 수신 바이트 수
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl Channel for MemoryChannel {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        match self.rx.recv_timeout(self.quantum) {
            Ok(byte) => Ok(Some(byte)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "memory channel peer closed",
            )),
        }
    }

    fn write_bytes(&mut self, buf: &[u8]) -> io::Result<usize> {
        for &byte in buf {
            self.tx.send(byte).map_err(|_| {
                io::Error::new(io::ErrorKind::BrokenPipe, "memory channel peer closed")
            })?;
        }
        Ok(buf.len())
    }
}

/// 장애 주입 채널
///
/// 쓰기 한 번(= 프레임 하나)을 단위로 손실/손상을 적용한다. 시드 고정으로 재현 가능.
pub struct LossyChannel<C> {
    inner: C,
    rng: StdRng,
    drop_rate: f64,
    corrupt_rate: f64,
    drop_next: usize,
    dropped: u64,
    corrupted: u64,
}

impl<C: Channel> LossyChannel<C> {
    pub fn new(inner: C, seed: u64) -> Self {
        Self {
            inner,
            rng: StdRng::seed_from_u64(seed),
            drop_rate: 0.0,
            corrupt_rate: 0.0,
            drop_next: 0,
            dropped: 0,
            corrupted: 0,
        }
    }

    /// 쓰기 손실 확률 (0.0 ~ 1.0)
    pub fn with_drop_rate(mut self, rate: f64) -> Self {
        self.drop_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// 쓰기 중 1비트 반전 확률 (0.0 ~ 1.0)
    pub fn with_corrupt_rate(mut self, rate: f64) -> Self {
        self.corrupt_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// 다음 `count`번의 쓰기를 무조건 버림
    pub fn drop_next_writes(&mut self, count: usize) {
        self.drop_next += count;
    }

    pub fn dropped_writes(&self) -> u64 {
        self.dropped
    }

    pub fn corrupted_writes(&self) -> u64 {
        self.corrupted
    }

    pub fn into_inner(self) -> C {
        self.inner
    }
}

impl<C: Channel> Channel for LossyChannel<C> {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        self.inner.read_byte()
    }

    fn write_bytes(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.drop_next > 0 {
            self.drop_next -= 1;
            self.dropped += 1;
            trace!(len = buf.len(), "write dropped (scripted)");
            return Ok(buf.len());
        }

        if self.drop_rate > 0.0 && self.rng.gen_bool(self.drop_rate) {
            self.dropped += 1;
            trace!(len = buf.len(), "write dropped");
            return Ok(buf.len());
        }

        if !buf.is_empty() && self.corrupt_rate > 0.0 && self.rng.gen_bool(self.corrupt_rate) {
            let mut copy = buf.to_vec();
            let index = self.rng.gen_range(0..copy.len());
            let bit = self.rng.gen_range(0..8);
            copy[index] ^= 1 << bit;
            self.corrupted += 1;
            trace!(index, bit, "write corrupted");
            return self.inner.write_bytes(&copy);
        }

        self.inner.write_bytes(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUANTUM: Duration = Duration::from_millis(10);

    #[test]
    fn test_memory_pair() {
        let (mut a, mut b) = MemoryChannel::pair(QUANTUM);
        assert_eq!(a.write_bytes(b"hi").unwrap(), 2);
        assert_eq!(b.pending(), 2);
        assert_eq!(b.read_byte().unwrap(), Some(b'h'));
        assert_eq!(b.read_byte().unwrap(), Some(b'i'));
        assert_eq!(b.read_byte().unwrap(), None);
        assert_eq!(a.read_byte().unwrap(), None);
    }

    #[test]
    fn test_memory_peer_closed() {
        let (mut a, b) = MemoryChannel::pair(QUANTUM);
        drop(b);
        assert!(a.read_byte().is_err());
        assert!(a.write_bytes(&[1]).is_err());
    }

    #[test]
    fn test_boxed_channel() {
        let (a, mut b) = MemoryChannel::pair(QUANTUM);
        let mut boxed: Box<dyn Channel> = Box::new(a);
        boxed.write_bytes(&[7]).unwrap();
        assert_eq!(b.read_byte().unwrap(), Some(7));
    }

    #[test]
    fn test_lossy_scripted_drop() {
        let (a, mut b) = MemoryChannel::pair(QUANTUM);
        let mut lossy = LossyChannel::new(a, 1);
        lossy.drop_next_writes(1);
        assert_eq!(lossy.write_bytes(&[1, 2, 3]).unwrap(), 3);
        lossy.write_bytes(&[4]).unwrap();
        assert_eq!(b.read_byte().unwrap(), Some(4));
        assert_eq!(b.read_byte().unwrap(), None);
        assert_eq!(lossy.dropped_writes(), 1);
    }

    #[test]
    fn test_lossy_corrupts_single_bit() {
        let (a, mut b) = MemoryChannel::pair(QUANTUM);
        let mut lossy = LossyChannel::new(a, 7).with_corrupt_rate(1.0);
        let data = [0u8; 8];
        lossy.write_bytes(&data).unwrap();

        let mut received = Vec::new();
        while let Some(byte) = b.read_byte().unwrap() {
            received.push(byte);
        }
        assert_eq!(received.len(), 8);
        let flipped: u32 = received.iter().map(|b| b.count_ones()).sum();
        assert_eq!(flipped, 1);
        assert_eq!(lossy.corrupted_writes(), 1);
    }
}
