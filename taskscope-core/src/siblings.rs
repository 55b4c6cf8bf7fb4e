//! 子タスクリストの走査
//!
//! プロセスの `children` は双方向循環リストの先頭（番兵）で、各子タスクは
//! 埋め込みの `siblings_node` でつながっています。先頭の `next` から辿り、
//! 先頭のアドレスに戻った時点で止めます。先頭自身は要素ではありません。

use crate::accessor::MemoryAccessor;
use crate::config::WalkLimits;
use crate::task::TaskRecord;
use crate::view::{reverse_embed, TypedView};
use crate::{Error, Result};
use std::collections::HashSet;
use tracing::{debug, trace, warn};

/// 子タスクリストウォーカー
pub struct SiblingListWalker<'v, 'a, A: MemoryAccessor + ?Sized> {
    view: &'v TypedView<'a, A>,
    limits: WalkLimits,
}

impl<'v, 'a, A: MemoryAccessor + ?Sized> SiblingListWalker<'v, 'a, A> {
    pub fn new(view: &'v TypedView<'a, A>, limits: WalkLimits) -> Self {
        Self { view, limits }
    }

    /// `head` から始まる循環リストの子タスクをリンク順に返す
    pub fn walk(&self, head: u64) -> Result<Vec<TaskRecord>> {
        let table = self.view.table();
        let siblings = &table.schema().siblings;

        let mut current = self.view.read_list_node(head)?.next;
        let mut visited = HashSet::new();
        let mut children = Vec::new();

        while current != head {
            if current == 0 {
                warn!("null link in children list 0x{:x}", head);
                return Err(Error::Corruption(format!(
                    "children list 0x{:x} has a null link after {} nodes",
                    head,
                    children.len()
                )));
            }

            if children.len() >= self.limits.max_list_len {
                warn!("children list 0x{:x} longer than limit", head);
                return Err(Error::Corruption(format!(
                    "children list 0x{:x} does not return to its head within {} nodes",
                    head, self.limits.max_list_len
                )));
            }

            if !visited.insert(current) {
                warn!("children list 0x{:x} loops at 0x{:x}", head, current);
                return Err(Error::Corruption(format!(
                    "children list 0x{:x} loops at 0x{:x} without returning to its head",
                    head, current
                )));
            }

            let owner = reverse_embed(current, table.task(), siblings)?;
            let task = self.view.read_task(owner)?;
            trace!(tid = task.tid, next = task.siblings.next, "child task");

            // 埋め込みノードはタスクと一緒に読み済み
            current = task.siblings.next;
            children.push(task);
        }

        debug!(count = children.len(), "children list walked");
        Ok(children)
    }
}
