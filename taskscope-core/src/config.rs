//! セッション設定

/// 走査の安全上限
///
/// 対象のメモリは信用できないため、木やリストの走査はこれらの上限で打ち切り、
/// `Error::Corruption` として報告します。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkLimits {
    /// タスク木から集めるノード数の上限
    pub max_nodes: usize,
    /// タスク木の深さの上限
    pub max_depth: usize,
    /// 子タスクリストの長さの上限
    pub max_list_len: usize,
}

impl Default for WalkLimits {
    fn default() -> Self {
        Self {
            max_nodes: 65_536,
            max_depth: 4_096,
            max_list_len: 65_536,
        }
    }
}

/// カーネル構造体の名前
///
/// 構造体名はDWARFから検索する名前、フィールドはドット区切りのパスです。
/// デフォルト値は対象カーネルの `struct task` / `struct process` に合わせてあります。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub task_struct: String,
    pub process_struct: String,
    pub list_node_struct: String,
    /// タスク木の根を指すグローバル変数
    pub root_symbol: String,
    pub tid: String,
    /// タスクが属するプロセスへのポインタ
    pub task_process: String,
    pub tree_left: String,
    pub tree_right: String,
    /// 親プロセスの子リストにつながる埋め込みノード
    pub siblings: String,
    pub pid: String,
    /// 子リストの先頭（番兵）
    pub children: String,
    pub list_next: String,
    pub list_prev: String,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            task_struct: "task".to_string(),
            process_struct: "process".to_string(),
            list_node_struct: "list_node".to_string(),
            root_symbol: "tree_by_tid_root".to_string(),
            tid: "tid".to_string(),
            task_process: "pi".to_string(),
            tree_left: "tree_by_tid_node.left_obj".to_string(),
            tree_right: "tree_by_tid_node.right_obj".to_string(),
            siblings: "siblings_node".to_string(),
            pid: "pid".to_string(),
            children: "children".to_string(),
            list_next: "next".to_string(),
            list_prev: "prev".to_string(),
        }
    }
}

/// セッション設定
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionConfig {
    pub schema: Schema,
    pub limits: WalkLimits,
}
