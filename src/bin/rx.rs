//! SLL 수신기 (Responder) - Serial Link Layer
//!
//! 시리얼 포트에서 연결을 기다렸다가 파일 하나를 받아 저장한다.
//!
//! 사용법:
//!   cargo run --release --bin sll-rx -- [OPTIONS]
//!
//! 예시:
//!   cargo run --release --bin sll-rx -- --port /dev/ttyS1 --output ./received

use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use sll::{receive_file, Config, Delivery, LinkLayer, Role, SerialChannel, DEFAULT_BAUD_RATE};

/// 수신기 설정
struct RxConfig {
    port: String,
    baud_rate: u32,
    output_dir: PathBuf,
    quantum: Duration,
    config: Config,
}

impl Default for RxConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyS1".into(),
            baud_rate: DEFAULT_BAUD_RATE,
            output_dir: PathBuf::from("."),
            quantum: Duration::from_millis(100),
            config: Config::new(Role::Responder),
        }
    }
}

fn parse_args() -> RxConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = RxConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    config.port = args[i + 1].clone();
                    i += 1;
                }
            }
            "--baud" | "-b" => {
                if i + 1 < args.len() {
                    config.baud_rate = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--output" | "-o" => {
                if i + 1 < args.len() {
                    config.output_dir = PathBuf::from(&args[i + 1]);
                    i += 1;
                }
            }
            "--retries" | "-r" => {
                if i + 1 < args.len() {
                    config.config.retries = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--timeout" | "-t" => {
                if i + 1 < args.len() {
                    let ms: u64 = args[i + 1].parse().expect("유효한 숫자 필요 (ms)");
                    config.config.timeout = Duration::from_millis(ms);
                    i += 1;
                }
            }
            "--payload" => {
                if i + 1 < args.len() {
                    config.config.max_payload_size =
                        args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--noisy" => {
                config.config = Config::noisy_line(Role::Responder);
            }
            "--help" | "-h" => {
                println!(
                    r#"SLL RX - Serial Link Layer 수신기

정지-대기 ARQ 링크로 파일 하나를 수신
- 중복 프레임은 RR만 재전송하고 버림
- 페이로드 체크섬 오류 시 REJ로 재전송 요청

사용법:
  cargo run --release --bin sll-rx -- [OPTIONS]

옵션:
  -p, --port <PATH>      시리얼 포트 (기본: /dev/ttyS1)
  -b, --baud <RATE>      통신 속도 (기본: 38400)
  -o, --output <DIR>     저장 디렉터리 (기본: 현재 디렉터리)
  -r, --retries <N>      연결 해제 시 최대 시도 횟수 (기본: 3)
  -t, --timeout <MS>     시도당 응답 대기 시간 (기본: 1000)
  --payload <BYTES>      최대 페이로드 크기, 송신측과 같아야 함 (기본: 1024)
  --noisy                잡음이 많은 회선용 프리셋 (8회, 2초, 256 bytes)
  -h, --help             이 도움말 출력

로그 레벨은 RUST_LOG 환경 변수로 조정 (예: RUST_LOG=sll=debug)

예시:
  cargo run --release --bin sll-rx -- --port /dev/ttyS1 --output ./received
"#
                );
                std::process::exit(0);
            }
            _ => {}
        }
        i += 1;
    }

    config
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let rx_config = parse_args();

    info!("SLL RX starting...");
    info!("Port: {} @ {} baud", rx_config.port, rx_config.baud_rate);
    info!("Output directory: {}", rx_config.output_dir.display());

    let channel = SerialChannel::open(&rx_config.port, rx_config.baud_rate, rx_config.quantum)?;
    let mut link = LinkLayer::new(rx_config.config, channel)?;

    info!("Waiting for connection (SET)...");
    link.open()?;

    let path = receive_file(&mut link, &rx_config.output_dir)?;
    info!("Saved: {}", path.display());

    // 송신측의 DISC 대기
    let mut buf = vec![0u8; link.config().max_payload_size];
    loop {
        match link.receive(&mut buf) {
            Ok(Delivery::EndOfSession) => break,
            Ok(Delivery::Duplicate(_)) => continue,
            Ok(Delivery::Data(len)) => warn!("파일 전송 이후 예상치 못한 데이터: {} bytes", len),
            Err(e) => {
                warn!("연결 해제 대기 중 에러: {}", e);
                break;
            }
        }
    }

    let stats = link.close()?;
    println!("{}", stats.summary());
    Ok(())
}
