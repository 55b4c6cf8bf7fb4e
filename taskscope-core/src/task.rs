//! タスク・プロセスのレコード
//!
//! いずれもターゲットのメモリから読んだ値の独立したコピーで、
//! 停止中のセッションの間だけ意味を持ちます。

use crate::layout::LayoutTable;
use crate::view::Record;
use crate::Result;

/// 双方向循環リストのノード
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListNode {
    /// ノード自身のアドレス
    pub address: u64,
    pub next: u64,
    pub prev: u64,
}

impl ListNode {
    pub(crate) fn decode(record: &Record<'_>, table: &LayoutTable) -> Result<Self> {
        let schema = table.schema();
        Ok(Self {
            address: record.address(),
            next: record.pointer(&schema.list_next)?,
            prev: record.pointer(&schema.list_prev)?,
        })
    }
}

/// `struct task` のコピー
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRecord {
    /// タスク構造体のアドレス
    pub address: u64,
    pub tid: u64,
    /// 所属するプロセス構造体のアドレス
    pub process: u64,
    /// tidで並んだ二分探索木の左の子（0ならなし）
    pub left: u64,
    /// 右の子（0ならなし）
    pub right: u64,
    /// 親プロセスの子リストにつながる埋め込みノード
    pub siblings: ListNode,
}

impl TaskRecord {
    pub(crate) fn decode(record: &Record<'_>, table: &LayoutTable) -> Result<Self> {
        let schema = table.schema();
        let siblings = record.embedded(&schema.siblings, table.list_node())?;

        Ok(Self {
            address: record.address(),
            tid: record.unsigned(&schema.tid)?,
            process: record.pointer(&schema.task_process)?,
            left: record.pointer(&schema.tree_left)?,
            right: record.pointer(&schema.tree_right)?,
            siblings: ListNode::decode(&siblings, table)?,
        })
    }
}

/// `struct process` のコピー
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRecord {
    /// プロセス構造体のアドレス
    pub address: u64,
    pub pid: u64,
    /// 子リストの先頭（番兵）。`children.address` が番兵のアドレス
    pub children: ListNode,
}

impl ProcessRecord {
    pub(crate) fn decode(record: &Record<'_>, table: &LayoutTable) -> Result<Self> {
        let schema = table.schema();
        let children = record.embedded(&schema.children, table.list_node())?;

        Ok(Self {
            address: record.address(),
            pid: record.unsigned(&schema.pid)?,
            children: ListNode::decode(&children, table)?,
        })
    }

    /// 子リストが空か（先頭のnextが自分自身を指す）
    pub fn has_no_children(&self) -> bool {
        self.children.next == self.children.address
    }
}
