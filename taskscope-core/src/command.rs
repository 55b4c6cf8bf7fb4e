//! REPLコマンド

use crate::parse::parse_number;

/// REPLコマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// タスク一覧表示
    Tasks,
    /// tidでタスクを表示
    Task(u64),
    /// pidでプロセスを表示
    Process(u64),
    /// プロセスの子タスクを表示
    Children(u64),
    /// レイアウト表を表示
    Layout,
    /// キャッシュを捨てて読み直す
    Refresh,
    /// ヘルプ表示
    Help,
    /// 終了
    Quit,
}

impl Command {
    /// コマンド文字列をパースする
    ///
    /// 数値引数は10進数または0x付き16進数。
    pub fn parse(input: &str) -> Option<Self> {
        let parts: Vec<&str> = input.split_whitespace().collect();
        if parts.is_empty() {
            return None;
        }

        let number = || -> Option<u64> {
            match parts.as_slice() {
                [_, arg] => parse_number(arg).ok(),
                _ => None,
            }
        };

        match parts[0] {
            "tasks" | "ps" => Some(Command::Tasks),
            "task" | "t" => number().map(Command::Task),
            "proc" | "process" | "p" => number().map(Command::Process),
            "children" | "ch" => number().map(Command::Children),
            "layout" => Some(Command::Layout),
            "refresh" | "r" => Some(Command::Refresh),
            "help" | "h" | "?" => Some(Command::Help),
            "quit" | "q" | "exit" => Some(Command::Quit),
            _ => None,
        }
    }
}
