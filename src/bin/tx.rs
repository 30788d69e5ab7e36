//! SLL 송신기 (Initiator) - Serial Link Layer
//!
//! 시리얼 포트로 연결을 설정하고 파일 하나를 보낸 뒤 연결을 해제한다.
//!
//! 사용법:
//!   cargo run --release --bin sll-tx -- [OPTIONS]
//!
//! 예시:
//!   cargo run --release --bin sll-tx -- --port /dev/ttyS0 --file penguin.gif
//!   cargo run --release --bin sll-tx -- -p /dev/ttyUSB0 -f data.bin --retries 5 --timeout 2000

use std::path::PathBuf;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use sll::{send_file, Config, LinkLayer, Role, SerialChannel, DEFAULT_BAUD_RATE};

/// 송신기 설정
struct TxConfig {
    port: String,
    baud_rate: u32,
    file_path: Option<PathBuf>,
    quantum: Duration,
    config: Config,
}

impl Default for TxConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyS0".into(),
            baud_rate: DEFAULT_BAUD_RATE,
            file_path: None,
            quantum: Duration::from_millis(100),
            config: Config::new(Role::Initiator),
        }
    }
}

fn parse_args() -> TxConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = TxConfig::default();

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
            "--file" | "-f" => {
                if i + 1 < args.len() {
                    config.file_path = Some(PathBuf::from(&args[i + 1]));
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
                config.config = Config::noisy_line(Role::Initiator);
            }
            "--help" | "-h" => {
                println!(
                    r#"SLL TX - Serial Link Layer 송신기

정지-대기 ARQ 링크로 파일 하나를 전송
- SET/UA 연결 설정, I/RR/REJ 데이터 전송, DISC/DISC/UA 연결 해제
- 타임아웃 및 REJ 시 재전송

사용법:
  cargo run --release --bin sll-tx -- [OPTIONS]

옵션:
  -p, --port <PATH>      시리얼 포트 (기본: /dev/ttyS0)
  -b, --baud <RATE>      통신 속도 (기본: 38400)
  -f, --file <PATH>      전송할 파일 (필수)
  -r, --retries <N>      프레임당 최대 전송 시도 횟수 (기본: 3)
  -t, --timeout <MS>     시도당 응답 대기 시간 (기본: 1000)
  --payload <BYTES>      최대 페이로드 크기 (기본: 1024)
  --noisy                잡음이 많은 회선용 프리셋 (8회, 2초, 256 bytes)
  -h, --help             이 도움말 출력

로그 레벨은 RUST_LOG 환경 변수로 조정 (예: RUST_LOG=sll=debug)

예시:
  cargo run --release --bin sll-tx -- --port /dev/ttyS0 --file penguin.gif
  cargo run --release --bin sll-tx -- -p /dev/ttyUSB0 -f data.bin -r 5 -t 2000
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

    let tx_config = parse_args();
    let Some(file_path) = tx_config.file_path.clone() else {
        eprintln!("--file 옵션이 필요합니다 (--help 참고)");
        std::process::exit(2);
    };

    info!("SLL TX starting...");
    info!("Port: {} @ {} baud", tx_config.port, tx_config.baud_rate);
    info!(
        "Retries: {}, timeout: {:?}, max payload: {} bytes",
        tx_config.config.retries, tx_config.config.timeout, tx_config.config.max_payload_size
    );

    let channel = SerialChannel::open(&tx_config.port, tx_config.baud_rate, tx_config.quantum)?;
    let mut link = LinkLayer::new(tx_config.config, channel)?;

    link.open()?;

    if let Err(e) = send_file(&mut link, &file_path) {
        error!("전송 실패: {}", e);
        // 해제 실패는 이미 로그로 남음
        let _ = link.close();
        return Err(e.into());
    }

    let stats = link.close()?;
    println!("{}", stats.summary());
    Ok(())
}
