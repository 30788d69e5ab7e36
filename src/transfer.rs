//! 파일 전송 (링크 계층 위의 응용 계층)
//!
//! 파일 하나를 레코드 단위로 나누어 정보 프레임 하나에 레코드 하나씩 보낸다.
//!
//! ```plain
//! Start { name, size, crc32 }  →  Data { index, bytes } × N  →  End { crc32 }
//! ```
//!
//! 레코드는 `bincode`로 직렬화하며, 수신측은 크기와 CRC32를 검증한 뒤에만 파일을 쓴다.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::channel::Channel;
use crate::link::{Delivery, LinkLayer};
use crate::{Error, Result};

/// `Data` 레코드의 직렬화 오버헤드 (variant u32 + index u32 + 길이 u64)
pub const RECORD_OVERHEAD: usize = 16;

/// 전송 레코드
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferMessage {
    /// 파일 메타데이터
    Start { name: String, size: u64, crc32: u32 },

    /// 파일 데이터 조각
    Data { index: u32, bytes: Vec<u8> },

    /// 전송 완료
    End { crc32: u32 },
}

impl TransferMessage {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// 최대 페이로드 크기에서 `Data` 레코드 하나에 담을 수 있는 파일 바이트 수
pub fn record_capacity(max_payload_size: usize) -> Result<usize> {
    if max_payload_size <= RECORD_OVERHEAD {
        return Err(Error::Config(format!(
            "max_payload_size {} leaves no room for file data (overhead {})",
            max_payload_size, RECORD_OVERHEAD
        )));
    }
    Ok(max_payload_size - RECORD_OVERHEAD)
}

fn send_record<C: Channel>(link: &mut LinkLayer<C>, record: &TransferMessage) -> Result<()> {
    let bytes = record.to_bytes()?;
    link.send(&bytes)?;
    Ok(())
}

/// 열린 세션으로 파일 전송. 보낸 파일 바이트 수를 반환한다.
pub fn send_file<C: Channel>(link: &mut LinkLayer<C>, path: &Path) -> Result<u64> {
    let data = fs::read(path)?;
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| Error::Config(format!("invalid file name: {}", path.display())))?
        .to_string();

    let capacity = record_capacity(link.config().max_payload_size)?;
    let crc32 = crc32fast::hash(&data);

    info!(
        "파일 전송 시작: {} ({} bytes, {} records)",
        name,
        data.len(),
        data.len().div_ceil(capacity)
    );

    send_record(
        link,
        &TransferMessage::Start {
            name,
            size: data.len() as u64,
            crc32,
        },
    )?;

    for (index, chunk) in data.chunks(capacity).enumerate() {
        send_record(
            link,
            &TransferMessage::Data {
                index: index as u32,
                bytes: chunk.to_vec(),
            },
        )?;
        debug!(index, len = chunk.len(), "record sent");
    }

    send_record(link, &TransferMessage::End { crc32 })?;
    info!("파일 전송 완료: {}", link.stats().summary());

    Ok(data.len() as u64)
}

/// 수신 중인 파일
struct Incoming {
    name: String,
    size: u64,
    crc32: u32,
    data: Vec<u8>,
    next_index: u32,
}

/// 열린 세션에서 파일 하나를 받아 `dir`에 저장하고 경로를 반환한다.
///
/// 중복 전달은 건너뛴다. `End` 전에 상대가 연결을 끊거나 크기/CRC32가 맞지 않으면
/// [`Error::TransferMismatch`]이며 파일은 쓰지 않는다.
pub fn receive_file<C: Channel>(link: &mut LinkLayer<C>, dir: &Path) -> Result<PathBuf> {
    let mut buf = vec![0u8; link.config().max_payload_size];
    let mut incoming: Option<Incoming> = None;

    loop {
        let len = match link.receive(&mut buf)? {
            Delivery::Data(len) => len,
            Delivery::Duplicate(_) => continue,
            Delivery::EndOfSession => {
                return Err(Error::TransferMismatch(
                    "session ended before End record".into(),
                ))
            }
        };

        match TransferMessage::from_bytes(&buf[..len])? {
            TransferMessage::Start { name, size, crc32 } => {
                // 경로 요소는 버리고 파일 이름만 사용
                let name = Path::new(&name)
                    .file_name()
                    .and_then(|name| name.to_str())
                    .ok_or_else(|| Error::TransferMismatch(format!("invalid file name: {name}")))?
                    .to_string();

                info!("파일 수신 시작: {} ({} bytes)", name, size);
                incoming = Some(Incoming {
                    name,
                    size,
                    crc32,
                    data: Vec::new(),
                    next_index: 0,
                });
            }

            TransferMessage::Data { index, bytes } => {
                let file = incoming
                    .as_mut()
                    .ok_or_else(|| Error::TransferMismatch("Data before Start".into()))?;
                if index != file.next_index {
                    return Err(Error::TransferMismatch(format!(
                        "record {} out of order (expected {})",
                        index, file.next_index
                    )));
                }
                file.data.extend_from_slice(&bytes);
                file.next_index += 1;
            }

            TransferMessage::End { crc32 } => {
                let file = incoming
                    .take()
                    .ok_or_else(|| Error::TransferMismatch("End before Start".into()))?;

                if file.data.len() as u64 != file.size {
                    return Err(Error::TransferMismatch(format!(
                        "size {} != announced {}",
                        file.data.len(),
                        file.size
                    )));
                }
                let actual = crc32fast::hash(&file.data);
                if actual != file.crc32 || actual != crc32 {
                    return Err(Error::TransferMismatch(format!(
                        "crc32 {:08x} != {:08x}",
                        actual, file.crc32
                    )));
                }

                let path = dir.join(&file.name);
                fs::write(&path, &file.data)?;
                info!("파일 수신 완료: {} ({} bytes)", path.display(), file.size);
                return Ok(path);
            }
        }
    }
}
