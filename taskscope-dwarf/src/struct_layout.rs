//! DWARFからの構造体レイアウト抽出
//!
//! 名前で指定した構造体のDIEを探し、メンバのオフセット・サイズ・ポインタかどうかを取り出します。
//! ネストした構造体メンバは `tree_by_tid_node.left_obj` のようなドット区切りのパスに平坦化します。
//! 無名の構造体/共用体メンバは親と同じパスに展開します（C11の無名メンバ）。

use crate::Result;
use gimli::Reader;

/// ネストした構造体を辿る最大深さ
const MAX_NESTING: usize = 8;

/// メンバのレイアウト
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberLayout {
    /// ドット区切りのフィールドパス
    pub path: String,
    /// 構造体先頭からのオフセット（バイト）
    pub offset: u64,
    /// サイズ（バイト）
    pub size: u64,
    /// ポインタ型かどうか
    pub is_pointer: bool,
}

/// 構造体のレイアウト
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructLayout {
    pub name: String,
    pub size: u64,
    pub members: Vec<MemberLayout>,
}

impl StructLayout {
    /// パスでメンバを検索する
    pub fn member(&self, path: &str) -> Option<&MemberLayout> {
        self.members.iter().find(|m| m.path == path)
    }
}

/// typedef等を剥がした後の型
#[derive(Debug, Clone, Copy)]
enum ResolvedType<O> {
    Scalar { size: u64 },
    Pointer { size: u64 },
    Aggregate { size: u64, offset: gimli::UnitOffset<O> },
    Unknown,
}

impl<O> ResolvedType<O> {
    fn size(&self) -> u64 {
        match self {
            ResolvedType::Scalar { size }
            | ResolvedType::Pointer { size }
            | ResolvedType::Aggregate { size, .. } => *size,
            ResolvedType::Unknown => 0,
        }
    }
}

/// 構造体レイアウト抽出器
pub struct StructLayoutExtractor<'a, R: Reader> {
    dwarf: &'a gimli::Dwarf<R>,
}

impl<'a, R: Reader<Offset = usize>> StructLayoutExtractor<'a, R> {
    /// 新しい抽出器を作成する
    pub fn new(dwarf: &'a gimli::Dwarf<R>) -> Self {
        Self { dwarf }
    }

    /// 名前で構造体を検索してレイアウトを抽出する
    ///
    /// 宣言のみ（DW_AT_declaration）のDIEは無視し、最初に見つかった定義を返します。
    pub fn find_struct(&self, name: &str) -> Result<Option<StructLayout>> {
        let mut units = self.dwarf.units();

        while let Some(header) = units.next()? {
            let unit = self.dwarf.unit(header)?;
            let mut entries = unit.entries();

            while let Some((_, entry)) = entries.next_dfs()? {
                if entry.tag() != gimli::DW_TAG_structure_type {
                    continue;
                }
                if self.is_declaration(entry) {
                    continue;
                }
                if self.get_name(&unit, entry).as_deref() != Some(name) {
                    continue;
                }

                let size = self.get_byte_size(entry).unwrap_or(0);
                let mut members = Vec::new();
                self.collect_members(&unit, entry.offset(), "", 0, 0, &mut members)?;

                tracing::debug!(name, size, members = members.len(), "struct layout extracted");
                return Ok(Some(StructLayout {
                    name: name.to_string(),
                    size,
                    members,
                }));
            }
        }

        Ok(None)
    }

    /// 構造体/共用体のメンバを再帰的に収集する
    fn collect_members(
        &self,
        unit: &gimli::Unit<R>,
        parent: gimli::UnitOffset<R::Offset>,
        prefix: &str,
        base_offset: u64,
        depth: usize,
        out: &mut Vec<MemberLayout>,
    ) -> Result<()> {
        if depth >= MAX_NESTING {
            tracing::debug!(prefix, depth, "nesting limit reached, deeper members are not collected");
            return Ok(());
        }

        let mut tree = unit.entries_tree(Some(parent))?;
        let root = tree.root()?;
        let mut children = root.children();

        while let Some(child) = children.next()? {
            let entry = child.entry();
            if entry.tag() != gimli::DW_TAG_member {
                continue;
            }

            // ビットフィールドはバイト単位のオフセットを持たない
            if entry.attr_value(gimli::DW_AT_bit_size)?.is_some()
                || entry.attr_value(gimli::DW_AT_data_bit_offset)?.is_some()
            {
                continue;
            }

            let offset = base_offset + self.get_data_member_location(entry)?.unwrap_or(0);
            let resolved = match self.get_type(entry) {
                Some(type_offset) => self.resolve_type(unit, type_offset, 0)?,
                None => ResolvedType::Unknown,
            };

            let name = self.get_name(unit, entry);
            let path = match (&name, prefix.is_empty()) {
                (Some(name), true) => name.clone(),
                (Some(name), false) => format!("{}.{}", prefix, name),
                (None, _) => prefix.to_string(),
            };

            if name.is_some() {
                out.push(MemberLayout {
                    path: path.clone(),
                    offset,
                    size: resolved.size(),
                    is_pointer: matches!(resolved, ResolvedType::Pointer { .. }),
                });
            }

            if let ResolvedType::Aggregate { offset: type_offset, .. } = resolved {
                self.collect_members(unit, type_offset, &path, offset, depth + 1, out)?;
            }
        }

        Ok(())
    }

    /// typedef / const / volatile を剥がして型を解決する
    fn resolve_type(
        &self,
        unit: &gimli::Unit<R>,
        type_offset: gimli::UnitOffset<R::Offset>,
        depth: usize,
    ) -> Result<ResolvedType<R::Offset>> {
        if depth >= MAX_NESTING * 4 {
            return Ok(ResolvedType::Unknown);
        }

        let mut entries = unit.entries_at_offset(type_offset)?;
        let Some((_, entry)) = entries.next_dfs()? else {
            return Ok(ResolvedType::Unknown);
        };

        let resolved = match entry.tag() {
            gimli::DW_TAG_typedef
            | gimli::DW_TAG_const_type
            | gimli::DW_TAG_volatile_type
            | gimli::DW_TAG_restrict_type
            | gimli::DW_TAG_atomic_type => match self.get_type(entry) {
                Some(inner) => self.resolve_type(unit, inner, depth + 1)?,
                None => ResolvedType::Unknown,
            },
            gimli::DW_TAG_pointer_type | gimli::DW_TAG_reference_type => ResolvedType::Pointer {
                size: self
                    .get_byte_size(entry)
                    .unwrap_or(u64::from(unit.encoding().address_size)),
            },
            gimli::DW_TAG_base_type | gimli::DW_TAG_enumeration_type => ResolvedType::Scalar {
                size: self.get_byte_size(entry).unwrap_or(0),
            },
            gimli::DW_TAG_structure_type | gimli::DW_TAG_union_type => {
                if self.is_declaration(entry) {
                    ResolvedType::Unknown
                } else {
                    ResolvedType::Aggregate {
                        size: self.get_byte_size(entry).unwrap_or(0),
                        offset: entry.offset(),
                    }
                }
            }
            gimli::DW_TAG_array_type => {
                let element_size = match self.get_type(entry) {
                    Some(inner) => self.resolve_type(unit, inner, depth + 1)?.size(),
                    None => 0,
                };
                let length = self.get_array_length(unit, entry.offset())?;
                ResolvedType::Scalar {
                    size: self
                        .get_byte_size(entry)
                        .unwrap_or(element_size.saturating_mul(length)),
                }
            }
            _ => ResolvedType::Unknown,
        };

        Ok(resolved)
    }

    /// 配列の要素数を DW_TAG_subrange_type から取得する
    fn get_array_length(
        &self,
        unit: &gimli::Unit<R>,
        array: gimli::UnitOffset<R::Offset>,
    ) -> Result<u64> {
        let mut tree = unit.entries_tree(Some(array))?;
        let root = tree.root()?;
        let mut children = root.children();
        let mut length = 1u64;

        while let Some(child) = children.next()? {
            let entry = child.entry();
            if entry.tag() != gimli::DW_TAG_subrange_type {
                continue;
            }

            let count = match entry.attr_value(gimli::DW_AT_count)?.and_then(|v| v.udata_value()) {
                Some(count) => count,
                None => match entry
                    .attr_value(gimli::DW_AT_upper_bound)?
                    .and_then(|v| v.udata_value())
                {
                    Some(upper) => upper + 1,
                    // 可変長配列（flexible array member）
                    None => 0,
                },
            };
            length = length.saturating_mul(count);
        }

        Ok(length)
    }

    /// 宣言のみのDIEかどうか
    fn is_declaration(&self, entry: &gimli::DebuggingInformationEntry<R>) -> bool {
        matches!(
            entry.attr_value(gimli::DW_AT_declaration),
            Ok(Some(gimli::AttributeValue::Flag(true)))
        )
    }

    /// 名前を取得する
    ///
    /// DWARF 5 では .debug_str / .debug_line_str への参照になるため、
    /// `attr_string` で解決する。
    fn get_name(
        &self,
        unit: &gimli::Unit<R>,
        entry: &gimli::DebuggingInformationEntry<R>,
    ) -> Option<String> {
        let attr = entry.attr_value(gimli::DW_AT_name).ok()??;
        let name = self.dwarf.attr_string(unit, attr).ok()?;
        name.to_string_lossy().ok().map(|s| s.into_owned())
    }

    /// バイトサイズを取得する
    fn get_byte_size(&self, entry: &gimli::DebuggingInformationEntry<R>) -> Option<u64> {
        entry
            .attr_value(gimli::DW_AT_byte_size)
            .ok()??
            .udata_value()
    }

    /// 型参照を取得する
    fn get_type(
        &self,
        entry: &gimli::DebuggingInformationEntry<R>,
    ) -> Option<gimli::UnitOffset<R::Offset>> {
        let attr = entry.attr_value(gimli::DW_AT_type).ok()??;
        match attr {
            gimli::AttributeValue::UnitRef(offset) => Some(offset),
            _ => None,
        }
    }

    /// データメンバのロケーション（オフセット）を取得する
    ///
    /// 定数形式のほか、古いコンパイラが出力する `DW_OP_plus_uconst` 形式の式も扱う。
    fn get_data_member_location(
        &self,
        entry: &gimli::DebuggingInformationEntry<R>,
    ) -> Result<Option<u64>> {
        let Some(attr) = entry.attr_value(gimli::DW_AT_data_member_location)? else {
            return Ok(None);
        };

        if let Some(offset) = attr.udata_value() {
            return Ok(Some(offset));
        }

        match attr {
            gimli::AttributeValue::Exprloc(expr) => {
                let mut reader = expr.0;
                if reader.read_u8()? == gimli::DW_OP_plus_uconst.0 {
                    Ok(Some(reader.read_uleb128()?))
                } else {
                    Err(anyhow::anyhow!("Unsupported data member location expression"))
                }
            }
            _ => Ok(None),
        }
    }
}
