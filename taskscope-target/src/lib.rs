//! taskscope ターゲットアクセス
//!
//! このクレートは、調査対象のメモリを読み取るための低レベル機能を提供します。
//! ptraceによる停止中プロセスへのアタッチ、/proc/pid/mem経由のメモリ読み取り、
//! メモリダンプファイル（スナップショット）からの読み取りを行います。
//! 対象への書き込みは一切行いません。

pub mod process;
pub mod memory;
pub mod snapshot;

pub use process::Process;
pub use memory::{Memory, MemoryMapping};
pub use snapshot::{Snapshot, SnapshotError};

/// ターゲット制御の結果型
pub type Result<T> = anyhow::Result<T>;
