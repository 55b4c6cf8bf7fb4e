//! シンボル解決機能

use crate::{DwarfLoader, Result};
use std::collections::HashMap;
use object::{Object, ObjectSymbol};

/// シンボル情報
#[derive(Debug, Clone)]
pub struct Symbol {
    /// マングルされたシンボル名
    pub name: String,
    /// デマングルされたシンボル名（可読な形式）
    pub demangled_name: String,
    pub address: u64,
    pub size: u64,
}

impl Symbol {
    /// シンボルを作成し、デマングルされた名前を設定する
    pub fn new(name: String, address: u64, size: u64) -> Self {
        let demangled_name = demangle_symbol(&name);
        Self {
            name,
            demangled_name,
            address,
            size,
        }
    }
}

/// シンボル名をデマングルする
///
/// Cのカーネルシンボルはそのまま返る。
fn demangle_symbol(name: &str) -> String {
    if let Ok(demangled) = rustc_demangle::try_demangle(name) {
        return format!("{:#}", demangled);
    }
    name.to_string()
}

/// シンボル解決
pub struct SymbolResolver {
    /// シンボル名 -> シンボル情報のマップ
    symbols_by_name: HashMap<String, Symbol>,
    /// PIE（Position Independent Executable）かどうか
    is_pie: bool,
}

impl SymbolResolver {
    /// DWARFローダーからシンボル解決を作成する
    pub fn new(loader: &DwarfLoader) -> Result<Self> {
        let symbols = loader.object_file().symbols().filter_map(|symbol| {
            let name = symbol.name().ok()?;
            if name.is_empty() {
                return None;
            }
            Some(Symbol::new(name.to_string(), symbol.address(), symbol.size()))
        });

        Ok(Self::from_symbols(symbols, loader.is_pie()))
    }

    /// シンボルの一覧から作成する
    pub fn from_symbols<I: IntoIterator<Item = Symbol>>(symbols: I, is_pie: bool) -> Self {
        let mut symbols_by_name = HashMap::new();
        for sym in symbols {
            // 同名のローカルシンボルがあっても最初に見つかったものを優先する
            symbols_by_name.entry(sym.name.clone()).or_insert(sym);
        }

        Self {
            symbols_by_name,
            is_pie,
        }
    }

    /// PIE（Position Independent Executable）かどうかを取得する
    pub fn is_pie(&self) -> bool {
        self.is_pie
    }

    /// シンボル名（マングル名またはデマングル名）からシンボルを検索する
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.symbols_by_name
            .get(name)
            .or_else(|| self.symbols_by_name.values().find(|s| s.demangled_name == name))
    }

    /// シンボル名からアドレスを解決する
    pub fn resolve(&self, name: &str) -> Option<u64> {
        self.lookup(name).map(|s| s.address)
    }
}
