//! カーネルイメージ（ELF + DWARF）の読み込み

use crate::Result;
use anyhow::Context;
use object::{Object, ObjectKind, ObjectSection};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

type Slice = gimli::EndianSlice<'static, gimli::RunTimeEndian>;

/// カーネルイメージのローダー
///
/// イメージのバイト列はセッションの間ずっと参照されるため、読み込み時に
/// `'static` へ昇格させます。1プロセスで読み込むイメージは高々数個です。
pub struct DwarfLoader {
    path: PathBuf,
    object_file: object::File<'static>,
    dwarf: gimli::Dwarf<Slice>,
    little_endian: bool,
    address_size: usize,
}

impl DwarfLoader {
    /// ELFファイルを読み込み、DWARFコンテキストを構築する
    ///
    /// `.debug_info` を持たない（strip済みの）イメージはエラーにします。
    /// 構造体レイアウトを推測で補うことはしません。
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let data = fs::read(path).with_context(|| format!("Failed to read image {:?}", path))?;
        let data: &'static [u8] = Box::leak(data.into_boxed_slice());

        let object_file = object::File::parse(data)
            .with_context(|| format!("Failed to parse ELF image {:?}", path))?;

        if object_file.section_by_name(".debug_info").is_none() {
            anyhow::bail!("Image {:?} has no .debug_info section (stripped?)", path);
        }

        let little_endian = object_file.is_little_endian();
        let endian = if little_endian {
            gimli::RunTimeEndian::Little
        } else {
            gimli::RunTimeEndian::Big
        };

        let dwarf = gimli::Dwarf::load(|id| -> Result<Slice> {
            // 存在しないセクションは空として扱う
            let bytes = match object_file.section_by_name(id.name()) {
                Some(section) => section
                    .data()
                    .with_context(|| format!("Failed to read section {}", id.name()))?,
                None => &[][..],
            };
            Ok(gimli::EndianSlice::new(bytes, endian))
        })?;

        let address_size = if object_file.is_64() { 8 } else { 4 };
        info!(
            path = %path.display(),
            arch = ?object_file.architecture(),
            address_size,
            little_endian,
            "kernel image loaded"
        );

        Ok(Self {
            path: path.to_path_buf(),
            object_file,
            dwarf,
            little_endian,
            address_size,
        })
    }

    /// 読み込んだイメージのパス
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dwarf(&self) -> &gimli::Dwarf<Slice> {
        &self.dwarf
    }

    /// シンボルテーブルの読み出し用
    pub fn object_file(&self) -> &object::File<'static> {
        &self.object_file
    }

    pub fn is_little_endian(&self) -> bool {
        self.little_endian
    }

    /// ターゲットのポインタ幅（バイト）。i686なら4、x86_64やriscv64なら8
    pub fn address_size(&self) -> usize {
        self.address_size
    }

    /// ET_DYN かどうか
    ///
    /// カーネルイメージは通常 ET_EXEC で、シンボルアドレスはそのまま使えます。
    /// ユーザ空間で動かすテスト用カーネルなど ET_DYN の場合は、
    /// 実行時のロードアドレスを加算する必要があります。
    pub fn is_pie(&self) -> bool {
        matches!(self.object_file.kind(), ObjectKind::Dynamic)
    }
}
