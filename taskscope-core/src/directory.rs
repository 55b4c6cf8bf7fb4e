//! タスクディレクトリ
//!
//! tidによるタスク検索とpidによるプロセス検索を提供します。
//! タスク一覧は最初の問い合わせで木を走査して作り、セッションの間キャッシュします。
//! ターゲットは停止しているので、その間メモリは変化しません。

use crate::accessor::MemoryAccessor;
use crate::config::WalkLimits;
use crate::task::{ProcessRecord, TaskRecord};
use crate::tree::TaskTreeWalker;
use crate::view::TypedView;
use crate::Result;
use std::cell::OnceCell;
use std::collections::HashMap;
use tracing::trace;

/// タスクディレクトリ
///
/// キャッシュは `OnceCell` なので `Sync` ではない。スレッドごとにセッションを作ること。
#[derive(Debug)]
pub struct TaskDirectory {
    root: u64,
    limits: WalkLimits,
    tasks: OnceCell<Vec<TaskRecord>>,
}

impl TaskDirectory {
    /// 解決済みの根から作る（0なら空の木）
    pub fn new(root: u64, limits: WalkLimits) -> Self {
        Self {
            root,
            limits,
            tasks: OnceCell::new(),
        }
    }

    pub fn root(&self) -> u64 {
        self.root
    }

    /// 根を差し替え、キャッシュを捨てる
    pub fn reset(&mut self, root: u64) {
        self.root = root;
        self.tasks = OnceCell::new();
    }

    /// すべてのタスク（tid昇順）
    ///
    /// 走査に失敗した場合は何もキャッシュせず、次の呼び出しで走査し直す。
    pub fn all_tasks<A: MemoryAccessor + ?Sized>(&self, view: &TypedView<'_, A>) -> Result<&[TaskRecord]> {
        if let Some(tasks) = self.tasks.get() {
            return Ok(tasks.as_slice());
        }

        let tasks = TaskTreeWalker::new(view, self.limits).walk(self.root)?;
        Ok(self.tasks.get_or_init(|| tasks).as_slice())
    }

    /// tidでタスクを検索する
    ///
    /// 線形探索で最初に一致したものを返す。
    pub fn find_task<A: MemoryAccessor + ?Sized>(
        &self,
        view: &TypedView<'_, A>,
        tid: u64,
    ) -> Result<Option<TaskRecord>> {
        Ok(self.all_tasks(view)?.iter().find(|t| t.tid == tid).cloned())
    }

    /// pidでプロセスを検索する
    ///
    /// tid順に各タスクの所属プロセスを読み、pidが一致した最初のものを返す。
    /// 同じプロセスは一度しか読まない。
    pub fn find_process<A: MemoryAccessor + ?Sized>(
        &self,
        view: &TypedView<'_, A>,
        pid: u64,
    ) -> Result<Option<ProcessRecord>> {
        let mut seen = HashMap::new();

        for task in self.all_tasks(view)? {
            let Some(process) = Self::process_cached(view, task, &mut seen)? else {
                continue;
            };
            if process.pid == pid {
                return Ok(Some(process.clone()));
            }
        }

        Ok(None)
    }

    /// タスクが属するプロセスの一覧（初出のtid順、重複なし）
    pub fn processes<A: MemoryAccessor + ?Sized>(
        &self,
        view: &TypedView<'_, A>,
    ) -> Result<Vec<ProcessRecord>> {
        let mut seen = HashMap::new();
        let mut processes = Vec::new();

        for task in self.all_tasks(view)? {
            let first_time = task.process != 0 && !seen.contains_key(&task.process);
            if let Some(process) = Self::process_cached(view, task, &mut seen)? {
                if first_time {
                    processes.push(process.clone());
                }
            }
        }

        Ok(processes)
    }

    /// 所属プロセスを読む。読み済みならキャッシュから返す
    ///
    /// 所属プロセスへのポインタが0のタスクはプロセスを持たない。
    fn process_cached<'s, A: MemoryAccessor + ?Sized>(
        view: &TypedView<'_, A>,
        task: &TaskRecord,
        seen: &'s mut HashMap<u64, ProcessRecord>,
    ) -> Result<Option<&'s ProcessRecord>> {
        if task.process == 0 {
            trace!(tid = task.tid, "task without process");
            return Ok(None);
        }

        if !seen.contains_key(&task.process) {
            let process = view.read_process(task.process)?;
            seen.insert(task.process, process);
        }
        Ok(seen.get(&task.process))
    }
}
