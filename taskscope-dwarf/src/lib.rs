//! taskscope DWARF デバッグ情報解析
//!
//! このクレートは、カーネルイメージ（ELF）とDWARFデバッグ情報の解析機能を提供します。
//! グローバルシンボルのアドレス解決と、構造体レイアウト（フィールドのオフセット・サイズ）の
//! 抽出を行います。

pub mod loader;
pub mod symbols;
pub mod struct_layout;

pub use loader::DwarfLoader;
pub use symbols::{Symbol, SymbolResolver};
pub use struct_layout::{MemberLayout, StructLayout, StructLayoutExtractor};

/// DWARF解析の結果型
pub type Result<T> = anyhow::Result<T>;
