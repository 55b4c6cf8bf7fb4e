//! 型付きビュー
//!
//! 生のアドレスとレイアウトから構造化されたレコードを作ります。
//! 埋め込みフィールドのアドレスから、それを含む構造体のアドレスを逆算する
//! （container_of）のもここです。

use crate::accessor::MemoryAccessor;
use crate::layout::{FieldKind, Layout, LayoutTable};
use crate::task::{ListNode, ProcessRecord, TaskRecord};
use crate::{Error, Result};

/// 埋め込みフィールドのアドレスから所有構造体のアドレスを求める
///
/// `owner = member - offset_of(field)`。メモリは読まない。
/// 減算がアンダーフローした場合は、レイアウト表と実メモリが食い違っているので
/// `Error::Layout` を返す。
pub fn reverse_embed(member_address: u64, owner: &Layout, field: &str) -> Result<u64> {
    let offset = owner.offset_of(field)?;
    member_address.checked_sub(offset).ok_or_else(|| {
        Error::Layout(format!(
            "0x{:x} cannot be {}.{} (offset 0x{:x})",
            member_address,
            owner.name(),
            field,
            offset
        ))
    })
}

/// 所有構造体のアドレスからフィールドのアドレスを求める（`reverse_embed` の逆）
pub fn embed(owner_address: u64, owner: &Layout, field: &str) -> Result<u64> {
    let offset = owner.offset_of(field)?;
    owner_address.checked_add(offset).ok_or_else(|| {
        Error::Layout(format!(
            "{}.{} of 0x{:x} overflows the address space",
            owner.name(),
            field,
            owner_address
        ))
    })
}

/// メモリから読み取った構造体のコピー
#[derive(Debug, Clone)]
pub struct Record<'l> {
    address: u64,
    layout: &'l Layout,
    bytes: Vec<u8>,
    table: &'l LayoutTable,
}

impl<'l> Record<'l> {
    /// レコードの先頭アドレス
    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn layout(&self) -> &Layout {
        self.layout
    }

    /// フィールドの生バイト列
    pub fn bytes_of(&self, field: &str) -> Result<&[u8]> {
        let field = self.layout.field(field)?;
        // 範囲はLayoutTable構築時に検査済みだが、読み取り長とは独立に確かめる
        let start = field.offset as usize;
        let end = start + field.size as usize;
        self.bytes.get(start..end).ok_or_else(|| {
            Error::Layout(format!(
                "{}.{} lies outside the {} bytes read",
                self.layout.name(),
                field.name,
                self.bytes.len()
            ))
        })
    }

    /// 整数フィールドを読む
    pub fn unsigned(&self, field: &str) -> Result<u64> {
        let bytes = self.bytes_of(field)?;
        self.table.endian().read_uint(bytes).ok_or_else(|| {
            Error::Layout(format!(
                "{}.{} has unsupported integer size {}",
                self.layout.name(),
                field,
                bytes.len()
            ))
        })
    }

    /// ポインタフィールドを読む（0は「なし」を表す番兵）
    pub fn pointer(&self, field: &str) -> Result<u64> {
        let layout = self.layout.field(field)?;
        if layout.kind != FieldKind::Pointer {
            return Err(Error::Layout(format!(
                "{}.{} is not a pointer",
                self.layout.name(),
                field
            )));
        }
        self.unsigned(field)
    }

    /// フィールドのアドレス
    pub fn field_address(&self, field: &str) -> Result<u64> {
        embed(self.address, self.layout, field)
    }

    /// 埋め込み構造体を別レイアウトのレコードとして切り出す
    ///
    /// メモリは読まず、読み取り済みのバイト列から切り出す。
    pub fn embedded(&self, field: &str, inner: &'l Layout) -> Result<Record<'l>> {
        let address = self.field_address(field)?;
        let bytes = self.bytes_of(field)?;
        let bytes = bytes.get(..inner.size() as usize).ok_or_else(|| {
            Error::Layout(format!(
                "{}.{} is smaller than {}",
                self.layout.name(),
                field,
                inner.name()
            ))
        })?;

        Ok(Record {
            address,
            layout: inner,
            bytes: bytes.to_vec(),
            table: self.table,
        })
    }
}

/// アクセサとレイアウト表を組み合わせた型付きビュー
pub struct TypedView<'a, A: MemoryAccessor + ?Sized> {
    accessor: &'a A,
    table: &'a LayoutTable,
}

impl<'a, A: MemoryAccessor + ?Sized> TypedView<'a, A> {
    pub fn new(accessor: &'a A, table: &'a LayoutTable) -> Self {
        Self { accessor, table }
    }

    pub fn table(&self) -> &'a LayoutTable {
        self.table
    }

    /// アドレスをレイアウトに従ってレコードとして読む
    ///
    /// 構造体全体を一度に読み取る。読めなければ `Error::Access`。
    pub fn read(&self, address: u64, layout: &'a Layout) -> Result<Record<'a>> {
        let len = layout.size() as usize;
        let bytes = self.accessor.read_memory(address, len)?;
        if bytes.len() != len {
            return Err(Error::access(
                address,
                len,
                format!("short read of {} bytes", bytes.len()),
            ));
        }

        Ok(Record {
            address,
            layout,
            bytes,
            table: self.table,
        })
    }

    /// ターゲットのポインタ1つ分を読む
    pub fn read_pointer(&self, address: u64) -> Result<u64> {
        let len = self.table.pointer_size();
        let bytes = self.accessor.read_memory(address, len)?;
        if bytes.len() != len {
            return Err(Error::access(
                address,
                len,
                format!("short read of {} bytes", bytes.len()),
            ));
        }

        self.table
            .endian()
            .read_uint(&bytes)
            .ok_or_else(|| Error::Layout(format!("unsupported pointer size {}", len)))
    }

    /// `struct task` を読む
    pub fn read_task(&self, address: u64) -> Result<TaskRecord> {
        let record = self.read(address, self.table.task())?;
        TaskRecord::decode(&record, self.table)
    }

    /// `struct process` を読む
    pub fn read_process(&self, address: u64) -> Result<ProcessRecord> {
        let record = self.read(address, self.table.process())?;
        ProcessRecord::decode(&record, self.table)
    }

    /// 単独のリストノード（子リストの先頭など）を読む
    pub fn read_list_node(&self, address: u64) -> Result<ListNode> {
        let record = self.read(address, self.table.list_node())?;
        ListNode::decode(&record, self.table)
    }
}
