//! テスト用の合成カーネルイメージ
//!
//! 1つの連続したメモリ領域に `struct task` / `struct process` を配置し、
//! `MemoryAccessor` として読ませます。領域外の読み取りは `Error::Access` になります。

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use taskscope_core::{
    Endian, Error, Layout, LayoutTable, MemoryAccessor, Result, Schema, Session, WalkLimits,
};

pub const BASE: u64 = 0x10_0000;
const SIZE: usize = 0x10_0000;
pub const ROOT_SYMBOL: &str = "tree_by_tid_root";

/// 共有メモリ（セッション作成後の書き換えを見せるため `Rc<RefCell>`）
#[derive(Clone)]
pub struct FakeMemory {
    bytes: Rc<RefCell<Vec<u8>>>,
    symbols: Rc<HashMap<String, u64>>,
}

impl MemoryAccessor for FakeMemory {
    fn resolve_symbol(&self, name: &str) -> Result<u64> {
        self.symbols
            .get(name)
            .copied()
            .ok_or_else(|| Error::SymbolNotFound(name.to_string()))
    }

    fn read_memory(&self, address: u64, len: usize) -> Result<Vec<u8>> {
        let bytes = self.bytes.borrow();
        let start = address
            .checked_sub(BASE)
            .ok_or_else(|| Error::access(address, len, "unmapped"))? as usize;
        let end = start
            .checked_add(len)
            .ok_or_else(|| Error::access(address, len, "unmapped"))?;
        bytes
            .get(start..end)
            .map(|b| b.to_vec())
            .ok_or_else(|| Error::access(address, len, "unmapped"))
    }
}

/// 合成カーネル
pub struct FakeKernel {
    memory: FakeMemory,
    ptr: u64,
    endian: Endian,
    next_free: u64,
}

impl FakeKernel {
    /// 64bitリトルエンディアンのカーネル
    pub fn new() -> Self {
        Self::with_target(8, Endian::Little)
    }

    pub fn with_target(ptr: u64, endian: Endian) -> Self {
        let mut symbols = HashMap::new();
        symbols.insert(ROOT_SYMBOL.to_string(), BASE);

        Self {
            memory: FakeMemory {
                bytes: Rc::new(RefCell::new(vec![0; SIZE])),
                symbols: Rc::new(symbols),
            },
            ptr,
            endian,
            // 先頭はルートポインタ用
            next_free: BASE + 0x40,
        }
    }

    /// レイアウト表（ポインタ幅 p に対して）
    ///
    /// task:      tid@0, pi@p, tree_by_tid_node@2p {left_obj, right_obj}, siblings_node@4p {next, prev}
    /// process:   pid@0, children@p {next, prev}
    /// list_node: next@0, prev@p
    pub fn table(&self) -> LayoutTable {
        let p = self.ptr;
        let task = Layout::builder("task", 6 * p)
            .scalar("tid", 0, 4)
            .pointer("pi", p, p)
            .aggregate("tree_by_tid_node", 2 * p, 2 * p)
            .pointer("tree_by_tid_node.left_obj", 2 * p, p)
            .pointer("tree_by_tid_node.right_obj", 3 * p, p)
            .aggregate("siblings_node", 4 * p, 2 * p)
            .pointer("siblings_node.next", 4 * p, p)
            .pointer("siblings_node.prev", 5 * p, p)
            .build();
        let process = Layout::builder("process", 3 * p)
            .scalar("pid", 0, 4)
            .aggregate("children", p, 2 * p)
            .build();
        let list_node = Layout::builder("list_node", 2 * p)
            .pointer("next", 0, p)
            .pointer("prev", p, p)
            .build();

        LayoutTable::new(task, process, list_node, p as usize, self.endian, Schema::default())
            .expect("consistent test layout")
    }

    pub fn accessor(&self) -> FakeMemory {
        self.memory.clone()
    }

    /// ルートポインタを読んでセッションを開く
    pub fn open(&self) -> Session<FakeMemory> {
        Session::open(self.accessor(), self.table(), Default::default()).expect("session opens")
    }

    pub fn open_with_limits(&self, limits: WalkLimits) -> Session<FakeMemory> {
        let root = self.read_word(BASE);
        Session::with_root(self.accessor(), self.table(), limits, root)
    }

    fn alloc(&mut self, size: u64) -> u64 {
        let address = self.next_free;
        self.next_free += (size + 0x3f) & !0x3f;
        address
    }

    fn write(&mut self, address: u64, value: u64, size: u64) {
        let bytes = match self.endian {
            Endian::Little => value.to_le_bytes()[..size as usize].to_vec(),
            Endian::Big => value.to_be_bytes()[8 - size as usize..].to_vec(),
        };
        let start = (address - BASE) as usize;
        self.memory.bytes.borrow_mut()[start..start + bytes.len()].copy_from_slice(&bytes);
    }

    pub fn write_word(&mut self, address: u64, value: u64) {
        let p = self.ptr;
        self.write(address, value, p);
    }

    pub fn read_word(&self, address: u64) -> u64 {
        let bytes = self.memory.read_memory(address, self.ptr as usize).expect("mapped");
        self.endian.read_uint(&bytes).expect("word")
    }

    /// タスクを確保する（リンクはすべて0）
    pub fn add_task(&mut self, tid: u32) -> u64 {
        let task = self.alloc(6 * self.ptr);
        self.write(task, u64::from(tid), 4);
        task
    }

    /// プロセスを確保する（子リストは空、つまり自分自身を指す）
    pub fn add_process(&mut self, pid: u32) -> u64 {
        let process = self.alloc(3 * self.ptr);
        self.write(process, u64::from(pid), 4);
        let head = self.children_head(process);
        self.write_word(head, head);
        self.write_word(head + self.ptr, head);
        process
    }

    pub fn children_head(&self, process: u64) -> u64 {
        process + self.ptr
    }

    pub fn siblings_node(&self, task: u64) -> u64 {
        task + 4 * self.ptr
    }

    pub fn set_process(&mut self, task: u64, process: u64) {
        let p = self.ptr;
        self.write_word(task + p, process);
    }

    pub fn set_children_links(&mut self, task: u64, left: u64, right: u64) {
        let p = self.ptr;
        self.write_word(task + 2 * p, left);
        self.write_word(task + 3 * p, right);
    }

    pub fn set_root(&mut self, root: u64) {
        self.write_word(BASE, root);
    }

    /// リストノードの next/prev を直接書く
    pub fn set_list_links(&mut self, node: u64, next: u64, prev: u64) {
        let p = self.ptr;
        self.write_word(node, next);
        self.write_word(node + p, prev);
    }

    /// プロセスの子リストを head → tasks[0] → ... → head の循環リストにする
    pub fn link_children(&mut self, process: u64, tasks: &[u64]) {
        let head = self.children_head(process);
        let mut nodes = vec![head];
        nodes.extend(tasks.iter().map(|&t| self.siblings_node(t)));

        for i in 0..nodes.len() {
            let next = nodes[(i + 1) % nodes.len()];
            let prev = nodes[(i + nodes.len() - 1) % nodes.len()];
            self.set_list_links(nodes[i], next, prev);
        }
    }

    /// tidの二分探索木に挿入順で組み立て、根を設定する
    pub fn build_tree(&mut self, tids: &[u32]) -> HashMap<u32, u64> {
        let mut nodes: HashMap<u32, u64> = HashMap::new();
        let mut tid_of: HashMap<u64, u32> = HashMap::new();
        let mut links: HashMap<u64, (u64, u64)> = HashMap::new();
        let mut root = 0u64;

        for &tid in tids {
            let task = self.add_task(tid);
            links.insert(task, (0, 0));
            tid_of.insert(task, tid);
            nodes.insert(tid, task);

            if root == 0 {
                root = task;
                continue;
            }

            let mut current = root;
            loop {
                let go_left = tid < tid_of[&current];
                let entry = links.get_mut(&current).unwrap();
                let slot = if go_left { &mut entry.0 } else { &mut entry.1 };
                if *slot == 0 {
                    *slot = task;
                    break;
                }
                current = *slot;
            }
        }

        for (&task, &(left, right)) in &links {
            self.set_children_links(task, left, right);
        }
        self.set_root(root);
        nodes
    }
}
