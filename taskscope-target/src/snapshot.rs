//! メモリダンプファイルからの読み取り
//!
//! QEMUの `pmemsave` / `dump-guest-memory` などで保存した連続したメモリイメージを、
//! 指定したベースアドレスにマップされているものとして扱います。
//! ファイル全体を一度に読み込むため、スナップショットは停止中の状態そのものです。

use crate::Result;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// スナップショット読み取りのエラー
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("range 0x{addr:x}+{len} is outside the snapshot [0x{base:x}, 0x{end:x})")]
    OutOfRange { addr: u64, len: usize, base: u64, end: u64 },
}

/// メモリスナップショット
#[derive(Debug, Clone)]
pub struct Snapshot {
    base: u64,
    data: Vec<u8>,
}

impl Snapshot {
    /// ファイルからスナップショットを読み込む
    pub fn load<P: AsRef<Path>>(path: P, base: u64) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path)
            .map_err(|e| anyhow::anyhow!("Failed to read snapshot {:?}: {}", path, e))?;

        debug!("snapshot {:?} loaded at 0x{:x} ({} bytes)", path, base, data.len());
        Ok(Self::from_bytes(base, data))
    }

    /// バイト列からスナップショットを作成する
    pub fn from_bytes(base: u64, data: Vec<u8>) -> Self {
        Self { base, data }
    }

    /// ベースアドレス
    pub fn base(&self) -> u64 {
        self.base
    }

    /// 終端アドレス（含まない）
    pub fn end(&self) -> u64 {
        self.base.saturating_add(self.data.len() as u64)
    }

    /// `[addr, addr + len)` を読み取る
    pub fn read(&self, addr: u64, len: usize) -> std::result::Result<&[u8], SnapshotError> {
        let out_of_range = || SnapshotError::OutOfRange {
            addr,
            len,
            base: self.base,
            end: self.end(),
        };

        let start = addr.checked_sub(self.base).ok_or_else(out_of_range)?;
        let start = usize::try_from(start).map_err(|_| out_of_range())?;
        let end = start.checked_add(len).ok_or_else(out_of_range)?;

        self.data.get(start..end).ok_or_else(out_of_range)
    }
}
