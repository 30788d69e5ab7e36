//! 링크 통계

use std::time::{Duration, Instant};

/// 세션 단위 링크 통계
#[derive(Debug, Clone)]
pub struct LinkStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 전송한 전체 프레임 수 (제어 + 정보, 재전송 포함)
    pub frames_sent: u64,

    /// 전송한 정보 프레임 수 (재전송 포함)
    pub info_frames_sent: u64,

    /// 새로 수락한 정보 프레임 수 (중복 제외)
    pub info_frames_received: u64,

    /// 재전송 횟수 (제어 + 정보)
    pub retransmissions: u64,

    /// 정보 프레임 재전송 횟수
    pub info_retransmissions: u64,

    /// 타임아웃 횟수
    pub timeouts: u64,

    /// 보낸 REJ 수
    pub rejects_sent: u64,

    /// 받은 REJ 수
    pub rejects_received: u64,

    /// 받은 중복 정보 프레임 수
    pub duplicates_received: u64,

    /// 형식 오류로 버린 프레임 수
    pub frames_discarded: u64,

    /// 확인 응답을 받은 페이로드 바이트
    pub payload_bytes_sent: u64,

    /// 수락한 페이로드 바이트
    pub payload_bytes_received: u64,
}

impl LinkStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            frames_sent: 0,
            info_frames_sent: 0,
            info_frames_received: 0,
            retransmissions: 0,
            info_retransmissions: 0,
            timeouts: 0,
            rejects_sent: 0,
            rejects_received: 0,
            duplicates_received: 0,
            frames_discarded: 0,
            payload_bytes_sent: 0,
            payload_bytes_received: 0,
        }
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 유효 처리율 (bytes/sec, 송수신 페이로드 합)
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        (self.payload_bytes_sent + self.payload_bytes_received) as f64 / elapsed
    }

    /// 재전송 비율 (정보 프레임 기준)
    pub fn retransmission_ratio(&self) -> f64 {
        if self.info_frames_sent == 0 {
            return 0.0;
        }
        self.info_retransmissions as f64 / self.info_frames_sent as f64
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Frames: {} (I: {} sent, {} received) | Bytes: {} sent, {} received | Throughput: {:.1} B/s | Retransmissions: {} (timeouts {}, REJ {}) | REJ sent: {} | Duplicates: {} | Discarded: {}",
            self.elapsed().as_secs_f64(),
            self.frames_sent,
            self.info_frames_sent,
            self.info_frames_received,
            self.payload_bytes_sent,
            self.payload_bytes_received,
            self.throughput(),
            self.retransmissions,
            self.timeouts,
            self.rejects_received,
            self.rejects_sent,
            self.duplicates_received,
            self.frames_discarded,
        )
    }
}

impl Default for LinkStats {
    fn default() -> Self {
        Self::new()
    }
}
