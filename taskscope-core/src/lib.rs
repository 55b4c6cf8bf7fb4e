//! taskscope イントロスペクションのコア
//!
//! 停止中ターゲットのメモリだけを読んで、カーネルのタスク管理構造を再構築します。
//! tidをキーとするタスクの二分探索木と、プロセスごとの子タスクの循環リストを
//! 静的なレイアウト表に従って辿ります。
//!
//! データの流れは一方向です:
//! `MemoryAccessor` → `TypedView` → {`TaskTreeWalker`, `SiblingListWalker`} → `TaskDirectory`

pub mod accessor;
pub mod command;
pub mod config;
pub mod directory;
pub mod error;
pub mod layout;
pub mod parse;
pub mod session;
pub mod siblings;
pub mod task;
pub mod tree;
pub mod view;

pub use accessor::{LiveTarget, MemoryAccessor, SnapshotTarget};
pub use command::Command;
pub use config::{Schema, SessionConfig, WalkLimits};
pub use directory::TaskDirectory;
pub use error::{Error, Result};
pub use layout::{Endian, FieldKind, FieldLayout, Layout, LayoutTable};
pub use session::{children_of, list_tasks, lookup_process, lookup_task, Session};
pub use siblings::SiblingListWalker;
pub use task::{ListNode, ProcessRecord, TaskRecord};
pub use tree::TaskTreeWalker;
pub use view::{embed, reverse_embed, Record, TypedView};
