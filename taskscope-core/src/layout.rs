//! 静的レイアウト表
//!
//! 構造体ごとに「フィールド名 → オフセット・サイズ・種類」を保持します。
//! この表は対象カーネルの実際のABI（DWARF）から一度だけ作るもので、
//! このクレート自身の構造体レイアウトとは無関係です。
//! 表と実メモリの食い違いは最も危険な入力なので、構築時に整合性を検査します。

use crate::config::Schema;
use crate::{Error, Result};
use taskscope_dwarf::{DwarfLoader, StructLayout, StructLayoutExtractor};

/// フィールドの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// 整数値
    Scalar,
    /// 辿ることのできるアドレス
    Pointer,
    /// 埋め込まれた構造体（リストノード等）
    Aggregate,
}

/// フィールドのレイアウト
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    pub name: String,
    pub offset: u64,
    pub size: u64,
    pub kind: FieldKind,
}

/// 構造体のレイアウト
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    name: String,
    size: u64,
    fields: Vec<FieldLayout>,
}

impl Layout {
    /// ビルダーを作成する
    pub fn builder(name: &str, size: u64) -> LayoutBuilder {
        LayoutBuilder {
            layout: Layout {
                name: name.to_string(),
                size,
                fields: Vec::new(),
            },
        }
    }

    /// DWARFから抽出した構造体レイアウトを変換する
    ///
    /// ポインタでなく、ネストしたメンバを持つフィールドは埋め込み構造体として扱う。
    pub fn from_struct_layout(layout: &StructLayout) -> Self {
        let fields = layout
            .members
            .iter()
            .map(|member| {
                let nested_prefix = format!("{}.", member.path);
                let kind = if member.is_pointer {
                    FieldKind::Pointer
                } else if layout.members.iter().any(|m| m.path.starts_with(&nested_prefix)) {
                    FieldKind::Aggregate
                } else {
                    FieldKind::Scalar
                };

                FieldLayout {
                    name: member.path.clone(),
                    offset: member.offset,
                    size: member.size,
                    kind,
                }
            })
            .collect();

        Self {
            name: layout.name.clone(),
            size: layout.size,
            fields,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 構造体全体のサイズ（バイト）
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn fields(&self) -> &[FieldLayout] {
        &self.fields
    }

    /// フィールドを検索する
    pub fn field(&self, name: &str) -> Result<&FieldLayout> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| Error::Layout(format!("struct {} has no field '{}'", self.name, name)))
    }

    /// フィールドのオフセットを取得する
    pub fn offset_of(&self, name: &str) -> Result<u64> {
        Ok(self.field(name)?.offset)
    }

    /// フィールドが指定した種類であることを確認する
    fn expect_kind(&self, name: &str, kind: FieldKind) -> Result<&FieldLayout> {
        let field = self.field(name)?;
        if field.kind != kind {
            return Err(Error::Layout(format!(
                "{}.{} is {:?}, expected {:?}",
                self.name, name, field.kind, kind
            )));
        }
        Ok(field)
    }

    /// 各フィールドが構造体に収まっているか、ポインタ幅が一致するかを検査する
    fn validate(&self, pointer_size: usize) -> Result<()> {
        for (i, field) in self.fields.iter().enumerate() {
            let end = field.offset.checked_add(field.size).ok_or_else(|| {
                Error::Layout(format!("{}.{}: offset overflows", self.name, field.name))
            })?;
            if end > self.size {
                return Err(Error::Layout(format!(
                    "{}.{} [{}..{}) exceeds struct size {}",
                    self.name, field.name, field.offset, end, self.size
                )));
            }

            if field.kind == FieldKind::Pointer && field.size != pointer_size as u64 {
                return Err(Error::Layout(format!(
                    "{}.{} is a {}-byte pointer, target pointers are {} bytes",
                    self.name, field.name, field.size, pointer_size
                )));
            }

            if self.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(Error::Layout(format!(
                    "{}.{} is declared twice",
                    self.name, field.name
                )));
            }
        }
        Ok(())
    }
}

/// `Layout` のビルダー
///
/// ```
/// use taskscope_core::layout::Layout;
///
/// let node = Layout::builder("list_node", 16)
///     .pointer("next", 0, 8)
///     .pointer("prev", 8, 8)
///     .build();
/// assert_eq!(node.offset_of("prev").unwrap(), 8);
/// ```
#[derive(Debug, Clone)]
pub struct LayoutBuilder {
    layout: Layout,
}

impl LayoutBuilder {
    fn field(mut self, name: &str, offset: u64, size: u64, kind: FieldKind) -> Self {
        self.layout.fields.push(FieldLayout {
            name: name.to_string(),
            offset,
            size,
            kind,
        });
        self
    }

    /// 整数フィールドを追加する
    pub fn scalar(self, name: &str, offset: u64, size: u64) -> Self {
        self.field(name, offset, size, FieldKind::Scalar)
    }

    /// ポインタフィールドを追加する
    pub fn pointer(self, name: &str, offset: u64, size: u64) -> Self {
        self.field(name, offset, size, FieldKind::Pointer)
    }

    /// 埋め込み構造体フィールドを追加する
    pub fn aggregate(self, name: &str, offset: u64, size: u64) -> Self {
        self.field(name, offset, size, FieldKind::Aggregate)
    }

    pub fn build(self) -> Layout {
        self.layout
    }
}

/// ターゲットのバイトオーダー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    /// 1/2/4/8バイトの符号なし整数をデコードする
    pub fn read_uint(self, bytes: &[u8]) -> Option<u64> {
        let mut buf = [0u8; 8];
        match (self, bytes.len()) {
            (_, 1) => Some(u64::from(bytes[0])),
            (Endian::Little, 2 | 4 | 8) => {
                buf[..bytes.len()].copy_from_slice(bytes);
                Some(u64::from_le_bytes(buf))
            }
            (Endian::Big, 2 | 4 | 8) => {
                buf[8 - bytes.len()..].copy_from_slice(bytes);
                Some(u64::from_be_bytes(buf))
            }
            _ => None,
        }
    }
}

/// タスク・プロセス・リストノードのレイアウト表
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutTable {
    task: Layout,
    process: Layout,
    list_node: Layout,
    pointer_size: usize,
    endian: Endian,
    schema: Schema,
}

impl LayoutTable {
    /// レイアウト表を作成し、スキーマが要求するフィールドを検査する
    pub fn new(
        task: Layout,
        process: Layout,
        list_node: Layout,
        pointer_size: usize,
        endian: Endian,
        schema: Schema,
    ) -> Result<Self> {
        if pointer_size != 4 && pointer_size != 8 {
            return Err(Error::Layout(format!("unsupported pointer size {}", pointer_size)));
        }

        let table = Self {
            task,
            process,
            list_node,
            pointer_size,
            endian,
            schema,
        };
        table.validate()?;
        Ok(table)
    }

    /// カーネルイメージのDWARFからレイアウト表を作る
    pub fn from_dwarf(loader: &DwarfLoader, schema: Schema) -> Result<Self> {
        let extractor = StructLayoutExtractor::new(loader.dwarf());
        let endian = if loader.is_little_endian() {
            Endian::Little
        } else {
            Endian::Big
        };

        Self::from_struct_layouts(
            |name| extractor.find_struct(name),
            loader.address_size(),
            endian,
            schema,
        )
    }

    /// 名前から構造体レイアウトを引く関数でレイアウト表を作る
    ///
    /// 構造体が見つからない、読み出しに失敗した、あるいは必要なフィールドがない場合は
    /// `Error::Layout`。
    pub fn from_struct_layouts<F>(
        mut find: F,
        pointer_size: usize,
        endian: Endian,
        schema: Schema,
    ) -> Result<Self>
    where
        F: FnMut(&str) -> anyhow::Result<Option<StructLayout>>,
    {
        let mut layout_of = |name: &str| -> Result<Layout> {
            let layout = find(name)
                .map_err(|e| Error::Layout(format!("failed to read DWARF for struct {}: {:#}", name, e)))?
                .ok_or_else(|| Error::Layout(format!("struct {} not found in DWARF", name)))?;
            Ok(Layout::from_struct_layout(&layout))
        };

        let task = layout_of(&schema.task_struct)?;
        let process = layout_of(&schema.process_struct)?;
        let list_node = layout_of(&schema.list_node_struct)?;

        Self::new(task, process, list_node, pointer_size, endian, schema)
    }

    fn validate(&self) -> Result<()> {
        let s = &self.schema;
        for layout in [&self.task, &self.process, &self.list_node] {
            layout.validate(self.pointer_size)?;
        }

        for (layout, name) in [(&self.task, &s.tid), (&self.process, &s.pid)] {
            let field = layout.expect_kind(name, FieldKind::Scalar)?;
            if !matches!(field.size, 1 | 2 | 4 | 8) {
                return Err(Error::Layout(format!(
                    "{}.{} has unsupported integer size {}",
                    layout.name, name, field.size
                )));
            }
        }

        for name in [&s.task_process, &s.tree_left, &s.tree_right] {
            self.task.expect_kind(name, FieldKind::Pointer)?;
        }
        for name in [&s.list_next, &s.list_prev] {
            self.list_node.expect_kind(name, FieldKind::Pointer)?;
        }

        for (layout, name) in [(&self.task, &s.siblings), (&self.process, &s.children)] {
            let field = layout.field(name)?;
            if field.size < self.list_node.size {
                return Err(Error::Layout(format!(
                    "{}.{} ({} bytes) cannot hold a {} ({} bytes)",
                    layout.name, name, field.size, self.list_node.name, self.list_node.size
                )));
            }
        }

        Ok(())
    }

    pub fn task(&self) -> &Layout {
        &self.task
    }

    pub fn process(&self) -> &Layout {
        &self.process
    }

    pub fn list_node(&self) -> &Layout {
        &self.list_node
    }

    /// ターゲットのポインタ幅（バイト）
    pub fn pointer_size(&self) -> usize {
        self.pointer_size
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}
