//! 재전송 타이머
//!
//! 단발성 타임아웃 통지기. 전용 워커 스레드가 명령 큐를 받아 마감 시각을 관리하고,
//! 만료되면 `expired` 플래그를 세우고 공유 재시도 카운터를 증가시킨다.
//! 링크 컨트롤러는 채널 읽기 사이사이에 [`RetransmissionTimer::expired`]를 폴링한다.
//!
//! 한 번에 하나의 arming만 유효하다. arming마다 세대 번호를 붙여
//! `disarm` 이후에는 취소된 arming의 만료가 절대 관찰되지 않도록 한다.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::{Error, Result};

/// 워커 스레드 명령
enum TimerCmd {
    Arm { generation: u64, duration: Duration },
    Disarm,
}

/// arming 상태 (워커와 소유자가 함께 접근)
#[derive(Debug, Default)]
struct ArmState {
    generation: u64,
    armed: bool,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<ArmState>,
    expired: AtomicBool,
    retries: AtomicU32,
}

/// 재전송 타이머
pub struct RetransmissionTimer {
    shared: Arc<Shared>,
    cmd_tx: Option<Sender<TimerCmd>>,
    worker: Option<JoinHandle<()>>,
}

impl RetransmissionTimer {
    /// 새 타이머 생성 (워커 스레드 시작)
    pub fn new() -> Result<Self> {
        let shared = Arc::new(Shared::default());
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();

        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name("sll-timer".into())
            .spawn(move || run_worker(worker_shared, cmd_rx))?;

        Ok(Self {
            shared,
            cmd_tx: Some(cmd_tx),
            worker: Some(worker),
        })
    }

    /// `duration` 뒤 한 번 만료되도록 설정
    ///
    /// 이미 설정된 상태에서 다시 호출하면 [`Error::InvalidState`].
    pub fn arm(&self, duration: Duration) -> Result<()> {
        let generation = {
            let mut state = self.shared.state.lock();
            if state.armed {
                return Err(Error::InvalidState {
                    expected: "disarmed timer",
                    actual: "armed timer",
                });
            }
            state.armed = true;
            state.generation += 1;
            self.shared.expired.store(false, Ordering::SeqCst);
            state.generation
        };

        trace!(generation, ?duration, "timer armed");
        self.send(TimerCmd::Arm {
            generation,
            duration,
        })
    }

    /// 대기 중인 만료 취소. 설정되지 않은 상태에서도 안전.
    ///
    /// 만료 전에 취소했으면 `true`. 이미 만료되어 재시도가 기록된 경우는 `false`.
    pub fn disarm(&self) -> bool {
        let cancelled = {
            let mut state = self.shared.state.lock();
            let cancelled = state.armed;
            state.armed = false;
            self.shared.expired.store(false, Ordering::SeqCst);
            cancelled
        };
        // 워커가 이미 종료된 경우는 무시해도 됨: armed=false면 만료가 기록되지 않음
        let _ = self.send(TimerCmd::Disarm);
        cancelled
    }

    /// 만료 여부
    pub fn expired(&self) -> bool {
        self.shared.expired.load(Ordering::SeqCst)
    }

    pub fn is_armed(&self) -> bool {
        self.shared.state.lock().armed
    }

    /// 현재 재시도 횟수
    pub fn retries(&self) -> u32 {
        self.shared.retries.load(Ordering::SeqCst)
    }

    /// 타임아웃 외의 사유(REJ)로 재시도 1회 차감
    pub fn count_retry(&self) -> u32 {
        self.shared.retries.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn reset_retries(&self) {
        self.shared.retries.store(0, Ordering::SeqCst);
    }

    fn send(&self, cmd: TimerCmd) -> Result<()> {
        let tx = self.cmd_tx.as_ref().ok_or_else(worker_gone)?;
        tx.send(cmd).map_err(|_| worker_gone())
    }
}

impl Drop for RetransmissionTimer {
    fn drop(&mut self) {
        // 송신측을 닫으면 워커 루프가 종료됨
        self.cmd_tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn worker_gone() -> Error {
    Error::Channel(std::io::Error::new(
        std::io::ErrorKind::BrokenPipe,
        "timer worker stopped",
    ))
}

fn run_worker(shared: Arc<Shared>, cmd_rx: Receiver<TimerCmd>) {
    let mut pending: Option<(u64, Instant)> = None;

    loop {
        let cmd = match pending {
            Some((_, deadline)) => cmd_rx.recv_deadline(deadline),
            None => cmd_rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match cmd {
            Ok(TimerCmd::Arm {
                generation,
                duration,
            }) => {
                pending = Some((generation, Instant::now() + duration));
            }
            Ok(TimerCmd::Disarm) => pending = None,
            Err(RecvTimeoutError::Timeout) => {
                if let Some((generation, _)) = pending.take() {
                    fire(&shared, generation);
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!("timer worker stopped");
}

fn fire(shared: &Shared, generation: u64) {
    let mut state = shared.state.lock();
    if !state.armed || state.generation != generation {
        return;
    }
    state.armed = false;
    shared.expired.store(true, Ordering::SeqCst);
    let retries = shared.retries.fetch_add(1, Ordering::SeqCst) + 1;
    trace!(generation, retries, "timer expired");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wait_until(timer: &RetransmissionTimer, limit: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < limit {
            if timer.expired() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        timer.expired()
    }

    #[test]
    fn test_fires_once() {
        let timer = RetransmissionTimer::new().unwrap();
        timer.arm(Duration::from_millis(20)).unwrap();
        assert!(timer.is_armed());
        assert!(wait_until(&timer, Duration::from_secs(2)));
        assert_eq!(timer.retries(), 1);
        assert!(!timer.is_armed());

        // 단발성: 추가 만료 없음
        thread::sleep(Duration::from_millis(50));
        assert_eq!(timer.retries(), 1);
    }

    #[test]
    fn test_disarm_cancels() {
        let timer = RetransmissionTimer::new().unwrap();
        timer.arm(Duration::from_millis(30)).unwrap();
        timer.disarm();
        thread::sleep(Duration::from_millis(80));
        assert!(!timer.expired());
        assert_eq!(timer.retries(), 0);
    }

    #[test]
    fn test_disarm_reports_whether_expiry_was_recorded() {
        let timer = RetransmissionTimer::new().unwrap();
        timer.arm(Duration::from_secs(10)).unwrap();
        assert!(timer.disarm());
        assert!(!timer.disarm());

        // 만료 후 disarm: 재시도는 이미 기록됨
        timer.arm(Duration::from_millis(5)).unwrap();
        assert!(wait_until(&timer, Duration::from_secs(2)));
        assert!(!timer.disarm());
        assert_eq!(timer.retries(), 1);
    }

    #[test]
    fn test_rearm_while_armed_rejected() {
        let timer = RetransmissionTimer::new().unwrap();
        timer.arm(Duration::from_secs(10)).unwrap();
        assert!(matches!(
            timer.arm(Duration::from_secs(10)),
            Err(Error::InvalidState { .. })
        ));
        timer.disarm();
        assert!(timer.arm(Duration::from_millis(10)).is_ok());
    }

    #[test]
    fn test_arm_clears_expired_flag() {
        let timer = RetransmissionTimer::new().unwrap();
        timer.arm(Duration::from_millis(5)).unwrap();
        assert!(wait_until(&timer, Duration::from_secs(2)));
        timer.arm(Duration::from_secs(10)).unwrap();
        assert!(!timer.expired());
        timer.disarm();
    }

    #[test]
    fn test_retry_counter() {
        let timer = RetransmissionTimer::new().unwrap();
        assert_eq!(timer.count_retry(), 1);
        assert_eq!(timer.count_retry(), 2);
        timer.reset_retries();
        assert_eq!(timer.retries(), 0);
    }
}
