//! タスク木の走査
//!
//! tidをキーとする二分探索木を辿り、すべてのタスクをtid昇順の列にします。
//! 木の形は信用しないので、再帰ではなく明示的なワークリストで辿り、
//! 訪問済みアドレス・ノード数・深さで打ち切ります。

use crate::accessor::MemoryAccessor;
use crate::config::WalkLimits;
use crate::task::TaskRecord;
use crate::view::TypedView;
use crate::{Error, Result};
use std::collections::HashSet;
use tracing::{debug, trace, warn};

/// タスク木ウォーカー
pub struct TaskTreeWalker<'v, 'a, A: MemoryAccessor + ?Sized> {
    view: &'v TypedView<'a, A>,
    limits: WalkLimits,
}

impl<'v, 'a, A: MemoryAccessor + ?Sized> TaskTreeWalker<'v, 'a, A> {
    pub fn new(view: &'v TypedView<'a, A>, limits: WalkLimits) -> Self {
        Self { view, limits }
    }

    /// 根から到達できるすべてのタスクをtid昇順で返す
    ///
    /// 根が0なら空の木。読み取りに一度でも失敗したら、途中までの結果は捨てて
    /// エラーを返す。
    pub fn walk(&self, root: u64) -> Result<Vec<TaskRecord>> {
        let mut tasks = Vec::new();
        let mut visited = HashSet::new();
        // (アドレス, 深さ)
        let mut work = Vec::new();

        if root != 0 {
            work.push((root, 1usize));
        }

        while let Some((address, depth)) = work.pop() {
            if depth > self.limits.max_depth {
                warn!(depth, "task tree deeper than limit");
                return Err(Error::Corruption(format!(
                    "task tree deeper than {} at 0x{:x}",
                    self.limits.max_depth, address
                )));
            }

            if !visited.insert(address) {
                warn!("task tree revisits 0x{:x}", address);
                return Err(Error::Corruption(format!(
                    "task 0x{:x} is reachable twice in the task tree",
                    address
                )));
            }

            if visited.len() > self.limits.max_nodes {
                warn!(nodes = visited.len(), "task tree larger than limit");
                return Err(Error::Corruption(format!(
                    "task tree has more than {} nodes",
                    self.limits.max_nodes
                )));
            }

            let task = self.view.read_task(address)?;
            trace!(tid = task.tid, left = task.left, right = task.right, "task node");

            for child in [task.right, task.left] {
                if child != 0 {
                    work.push((child, depth + 1));
                }
            }
            tasks.push(task);
        }

        tasks.sort_by_key(|t| t.tid);
        debug!(count = tasks.len(), "task tree walked");
        Ok(tasks)
    }
}
