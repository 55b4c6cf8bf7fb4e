//! メモリアクセサ
//!
//! イントロスペクションが外部に求めるのは、シンボル解決とメモリ読み取りの2つだけです。
//! 停止中のプロセス（`LiveTarget`）とメモリダンプ（`SnapshotTarget`）の2つの実装を提供します。

use crate::{Error, Result};
use taskscope_dwarf::SymbolResolver;
use taskscope_target::{Memory, Process, Snapshot};
use tracing::debug;

/// 停止中ターゲットへのアクセス
pub trait MemoryAccessor {
    /// シンボル名をアドレスに解決する
    ///
    /// 見つからなければ `Error::SymbolNotFound`。
    fn resolve_symbol(&self, name: &str) -> Result<u64>;

    /// `[address, address + len)` を読む
    ///
    /// 読めなければ `Error::Access`。
    fn read_memory(&self, address: u64, len: usize) -> Result<Vec<u8>>;
}

impl<T: MemoryAccessor + ?Sized> MemoryAccessor for Box<T> {
    fn resolve_symbol(&self, name: &str) -> Result<u64> {
        (**self).resolve_symbol(name)
    }

    fn read_memory(&self, address: u64, len: usize) -> Result<Vec<u8>> {
        (**self).read_memory(address, len)
    }
}

/// ptraceで停止させたプロセス
pub struct LiveTarget {
    /// アタッチ中は停止状態が保たれる。ドロップでデタッチ
    process: Process,
    memory: Memory,
    symbols: SymbolResolver,
    /// PIEのロードアドレス（非PIEなら0）
    load_bias: u64,
}

impl LiveTarget {
    /// プロセスにアタッチして停止させる
    pub fn attach(pid: i32, symbols: SymbolResolver) -> anyhow::Result<Self> {
        let process = Process::attach(pid)?;
        let memory = Memory::new(process.pid());

        let load_bias = if symbols.is_pie() {
            memory.get_base_address()? as u64
        } else {
            0
        };
        debug!(pid, load_bias = load_bias, "attached");

        Ok(Self {
            process,
            memory,
            symbols,
            load_bias,
        })
    }

    pub fn pid(&self) -> i32 {
        self.process.pid()
    }
}

impl MemoryAccessor for LiveTarget {
    fn resolve_symbol(&self, name: &str) -> Result<u64> {
        let address = self
            .symbols
            .resolve(name)
            .ok_or_else(|| Error::SymbolNotFound(name.to_string()))?;
        Ok(address.wrapping_add(self.load_bias))
    }

    fn read_memory(&self, address: u64, len: usize) -> Result<Vec<u8>> {
        let addr = usize::try_from(address)
            .map_err(|_| Error::access(address, len, "address exceeds the host address space"))?;

        self.memory.read(addr, len).map_err(|e| {
            // マッピング外なら原因をはっきりさせる
            match self.memory.is_readable(addr, len) {
                Ok(false) => Error::access(address, len, "address is not mapped readable"),
                _ => Error::access(address, len, format!("{:#}", e)),
            }
        })
    }
}

/// メモリダンプファイル
pub struct SnapshotTarget {
    snapshot: Snapshot,
    symbols: SymbolResolver,
}

impl SnapshotTarget {
    pub fn new(snapshot: Snapshot, symbols: SymbolResolver) -> Self {
        Self { snapshot, symbols }
    }
}

impl MemoryAccessor for SnapshotTarget {
    fn resolve_symbol(&self, name: &str) -> Result<u64> {
        self.symbols
            .resolve(name)
            .ok_or_else(|| Error::SymbolNotFound(name.to_string()))
    }

    fn read_memory(&self, address: u64, len: usize) -> Result<Vec<u8>> {
        self.snapshot
            .read(address, len)
            .map(|bytes| bytes.to_vec())
            .map_err(|e| Error::access(address, len, e))
    }
}
