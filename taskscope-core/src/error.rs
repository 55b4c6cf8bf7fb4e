//! イントロスペクションのエラー型
//!
//! どのクエリも、完全な結果を返すか以下のいずれかで失敗します。
//! 途中まで集めた結果を返すことはありません。

use thiserror::Error;

/// イントロスペクション中に発生するエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// カーネルイメージにシンボルがない（strip済み、あるいは別ビルドのイメージ）
    ///
    /// セッションの構築自体が失敗します。
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// メモリ読み取りに失敗した
    ///
    /// 実行中のクエリは中断されますが、セッションは有効なままです。
    /// ターゲットを再度停止させてからクエリを再発行できます。
    #[error("Failed to read {len} bytes at 0x{address:x}: {reason}")]
    Access {
        address: u64,
        len: usize,
        reason: String,
    },

    /// レイアウト表が実際のメモリ内容と一致しない（静的な設定ミス）
    #[error("Layout error: {0}")]
    Layout(String),

    /// 走査が安全上限を超えた（循環、あるいは際限のない成長）
    #[error("Corrupted structure: {0}")]
    Corruption(String),
}

impl Error {
    /// `Access` エラーを作成する
    pub fn access(address: u64, len: usize, reason: impl std::fmt::Display) -> Self {
        Error::Access {
            address,
            len,
            reason: reason.to_string(),
        }
    }
}

/// イントロスペクションの結果型
pub type Result<T> = std::result::Result<T, Error>;
