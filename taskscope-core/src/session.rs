//! イントロスペクションセッション
//!
//! 1つの停止中スナップショットに対する問い合わせの単位です。
//! タスク木の根はセッション開始時に一度だけ解決し、以降は引数として持ち回ります。
//! プロセス全体で共有される状態はないので、複数のターゲットを同時に扱えます。

use crate::accessor::MemoryAccessor;
use crate::config::{SessionConfig, WalkLimits};
use crate::directory::TaskDirectory;
use crate::layout::LayoutTable;
use crate::siblings::SiblingListWalker;
use crate::task::{ProcessRecord, TaskRecord};
use crate::view::TypedView;
use crate::Result;
use tracing::{debug, info};

/// イントロスペクションセッション
pub struct Session<A: MemoryAccessor> {
    accessor: A,
    table: LayoutTable,
    limits: WalkLimits,
    /// 根を指すグローバル変数のアドレス（根を直接与えた場合はNone）
    root_symbol: Option<u64>,
    directory: TaskDirectory,
}

impl<A: MemoryAccessor> Session<A> {
    /// 根のシンボルを解決し、根ポインタを読んでセッションを開始する
    ///
    /// シンボルがなければ `Error::SymbolNotFound`、根ポインタが読めなければ `Error::Access`。
    pub fn open(accessor: A, table: LayoutTable, config: SessionConfig) -> Result<Self> {
        let symbol = config.schema.root_symbol.as_str();
        let root_symbol = accessor.resolve_symbol(symbol)?;
        let root = TypedView::new(&accessor, &table).read_pointer(root_symbol)?;
        info!(symbol, root = root, "session opened");

        Ok(Self {
            accessor,
            table,
            limits: config.limits,
            root_symbol: Some(root_symbol),
            directory: TaskDirectory::new(root, config.limits),
        })
    }

    /// 解決済みの根からセッションを作る
    pub fn with_root(accessor: A, table: LayoutTable, limits: WalkLimits, root: u64) -> Self {
        Self {
            accessor,
            table,
            limits,
            root_symbol: None,
            directory: TaskDirectory::new(root, limits),
        }
    }

    /// 型付きビューを取得する
    pub fn view(&self) -> TypedView<'_, A> {
        TypedView::new(&self.accessor, &self.table)
    }

    pub fn accessor(&self) -> &A {
        &self.accessor
    }

    pub fn table(&self) -> &LayoutTable {
        &self.table
    }

    pub fn limits(&self) -> WalkLimits {
        self.limits
    }

    pub fn directory(&self) -> &TaskDirectory {
        &self.directory
    }

    /// タスク木の根のアドレス
    pub fn root(&self) -> u64 {
        self.directory.root()
    }

    /// キャッシュを捨て、根ポインタを読み直す
    ///
    /// ターゲットを再開してから再度停止させた後に呼ぶ。
    pub fn refresh(&mut self) -> Result<()> {
        let root = match self.root_symbol {
            Some(address) => self.view().read_pointer(address)?,
            None => self.directory.root(),
        };
        debug!(root = root, "session refreshed");
        self.directory.reset(root);
        Ok(())
    }

    /// すべてのタスク（tid昇順）
    pub fn all_tasks(&self) -> Result<&[TaskRecord]> {
        self.directory.all_tasks(&self.view())
    }

    /// tidでタスクを検索する
    pub fn find_task(&self, tid: u64) -> Result<Option<TaskRecord>> {
        self.directory.find_task(&self.view(), tid)
    }

    /// pidでプロセスを検索する
    pub fn find_process(&self, pid: u64) -> Result<Option<ProcessRecord>> {
        self.directory.find_process(&self.view(), pid)
    }

    /// タスクが属するプロセスを読む
    pub fn process_of(&self, task: &TaskRecord) -> Result<Option<ProcessRecord>> {
        if task.process == 0 {
            return Ok(None);
        }
        self.view().read_process(task.process).map(Some)
    }

    /// 全プロセス（初出のtid順）
    pub fn processes(&self) -> Result<Vec<ProcessRecord>> {
        self.directory.processes(&self.view())
    }

    /// プロセスの子タスク（リンク順）
    pub fn children_of(&self, process: &ProcessRecord) -> Result<Vec<TaskRecord>> {
        let view = self.view();
        SiblingListWalker::new(&view, self.limits).walk(process.children.address)
    }
}

/// すべてのタスクをtid昇順で返す
pub fn list_tasks<A: MemoryAccessor>(session: &Session<A>) -> Result<Vec<TaskRecord>> {
    Ok(session.all_tasks()?.to_vec())
}

/// tidでタスクを検索する
pub fn lookup_task<A: MemoryAccessor>(session: &Session<A>, tid: u64) -> Result<Option<TaskRecord>> {
    session.find_task(tid)
}

/// pidでプロセスを検索する
pub fn lookup_process<A: MemoryAccessor>(
    session: &Session<A>,
    pid: u64,
) -> Result<Option<ProcessRecord>> {
    session.find_process(pid)
}

/// プロセスの子タスクをリンク順に返す
pub fn children_of<A: MemoryAccessor>(
    session: &Session<A>,
    process: &ProcessRecord,
) -> Result<Vec<TaskRecord>> {
    session.children_of(process)
}
