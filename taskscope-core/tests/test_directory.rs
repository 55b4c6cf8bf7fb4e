//! タスク木・子リスト・ディレクトリの統合テスト

mod common;

use common::{FakeKernel, FakeMemory, BASE};
use taskscope_core::{
    children_of, list_tasks, lookup_process, lookup_task, reverse_embed, Endian, Error,
    MemoryAccessor, Session, SessionConfig, WalkLimits,
};

fn tids(tasks: &[taskscope_core::TaskRecord]) -> Vec<u64> {
    tasks.iter().map(|t| t.tid).collect()
}

#[test]
fn test_small_tree_is_sorted_by_tid() {
    let mut kernel = FakeKernel::new();
    let t5 = kernel.add_task(5);
    let t3 = kernel.add_task(3);
    let t8 = kernel.add_task(8);
    kernel.set_children_links(t5, t3, t8);
    kernel.set_root(t5);

    let session = kernel.open();
    let tasks = list_tasks(&session).unwrap();
    assert_eq!(tids(&tasks), vec![3, 5, 8]);
    assert_eq!(tasks[0].address, t3);
    assert_eq!(tasks[1].left, t3);
    assert_eq!(tasks[1].right, t8);
}

#[test]
fn test_empty_tree() {
    let kernel = FakeKernel::new();
    let session = kernel.open();

    assert_eq!(session.root(), 0);
    assert!(list_tasks(&session).unwrap().is_empty());
    assert_eq!(lookup_task(&session, 1).unwrap(), None);
    assert_eq!(lookup_process(&session, 1).unwrap(), None);
}

#[test]
fn test_large_tree_contains_every_tid_once() {
    let mut kernel = FakeKernel::new();
    // 1009は素数なので 0..300 の範囲で値は重ならない
    let order: Vec<u32> = (0..300u32).map(|i| (i * 7919) % 1009 + 1).collect();
    kernel.build_tree(&order);

    let session = kernel.open();
    let tasks = list_tasks(&session).unwrap();

    let mut expected: Vec<u64> = order.iter().map(|&t| u64::from(t)).collect();
    expected.sort_unstable();
    assert_eq!(tasks.len(), order.len());
    assert_eq!(tids(&tasks), expected);
}

#[test]
fn test_degenerate_tree_does_not_recurse() {
    let mut kernel = FakeKernel::new();
    // 右にだけ伸びる長い鎖（再帰ならスタックを使い切る深さ）
    let chain: Vec<u64> = (1..=10_000).map(|tid| kernel.add_task(tid)).collect();
    for pair in chain.windows(2) {
        kernel.set_children_links(pair[0], 0, pair[1]);
    }
    kernel.set_root(chain[0]);

    let session = kernel.open_with_limits(WalkLimits {
        max_depth: 20_000,
        ..WalkLimits::default()
    });
    let tasks = list_tasks(&session).unwrap();
    assert_eq!(tasks.len(), 10_000);
    assert_eq!(tasks.first().map(|t| t.tid), Some(1));
    assert_eq!(tasks.last().map(|t| t.tid), Some(10_000));
}

#[test]
fn test_lookup_task() {
    let mut kernel = FakeKernel::new();
    let nodes = kernel.build_tree(&[10, 4, 15, 2, 7, 12]);
    let session = kernel.open();

    let task = lookup_task(&session, 7).unwrap().unwrap();
    assert_eq!(task.tid, 7);
    assert_eq!(task.address, nodes[&7]);

    assert_eq!(lookup_task(&session, 8).unwrap(), None);
    assert_eq!(lookup_task(&session, 0).unwrap(), None);
}

#[test]
fn test_children_in_link_order() {
    let mut kernel = FakeKernel::new();
    let t5 = kernel.add_task(5);
    let t3 = kernel.add_task(3);
    let t8 = kernel.add_task(8);
    kernel.set_children_links(t5, t3, t8);
    kernel.set_root(t5);

    let parent = kernel.add_process(1);
    let child = kernel.add_process(42);
    kernel.set_process(t5, parent);
    kernel.set_process(t3, child);
    kernel.set_process(t8, child);
    // リンク順はtid順と逆にする
    kernel.link_children(child, &[t8, t3]);

    let session = kernel.open();
    let process = lookup_process(&session, 42).unwrap().unwrap();
    assert_eq!(process.address, child);
    assert_eq!(process.pid, 42);

    let children = children_of(&session, &process).unwrap();
    assert_eq!(tids(&children), vec![8, 3]);

    // 番兵から逆算したアドレスは要素にならない
    let head_owner = reverse_embed(
        process.children.address,
        session.table().task(),
        "siblings_node",
    )
    .unwrap();
    assert!(children.iter().all(|t| t.address != head_owner));
}

#[test]
fn test_process_with_two_children_scenario() {
    let mut kernel = FakeKernel::new();
    let t5 = kernel.add_task(5);
    let t3 = kernel.add_task(3);
    let t8 = kernel.add_task(8);
    kernel.set_children_links(t5, t3, t8);
    kernel.set_root(t5);

    let init = kernel.add_process(1);
    let p = kernel.add_process(42);
    kernel.set_process(t5, init);
    kernel.set_process(t3, p);
    kernel.set_process(t8, p);
    kernel.link_children(p, &[t3, t8]);

    let session = kernel.open();
    let process = lookup_process(&session, 42).unwrap().unwrap();
    assert_eq!(process.address, p);

    let children = children_of(&session, &process).unwrap();
    assert_eq!(tids(&children), vec![3, 8]);
    assert_eq!(children[0].address, t3);
    assert_eq!(children[1].address, t8);
}

#[test]
fn test_empty_children_list() {
    let mut kernel = FakeKernel::new();
    let t1 = kernel.add_task(1);
    let p = kernel.add_process(1);
    kernel.set_process(t1, p);
    kernel.set_root(t1);

    let session = kernel.open();
    let process = lookup_process(&session, 1).unwrap().unwrap();
    assert!(process.has_no_children());
    assert!(children_of(&session, &process).unwrap().is_empty());
}

#[test]
fn test_lookup_process() {
    let mut kernel = FakeKernel::new();
    let nodes = kernel.build_tree(&[20, 10, 30, 25]);
    let p1 = kernel.add_process(100);
    let p2 = kernel.add_process(200);
    kernel.set_process(nodes[&10], p1);
    kernel.set_process(nodes[&20], p1);
    kernel.set_process(nodes[&25], p2);
    kernel.set_process(nodes[&30], p2);

    let session = kernel.open();
    let tasks = list_tasks(&session).unwrap();

    let process = lookup_process(&session, 200).unwrap().unwrap();
    assert_eq!(process.pid, 200);
    assert_eq!(process.address, p2);
    assert!(tasks.iter().any(|t| t.process == process.address));

    assert_eq!(lookup_process(&session, 300).unwrap(), None);

    let pids: Vec<u64> = session.processes().unwrap().iter().map(|p| p.pid).collect();
    assert_eq!(pids, vec![100, 200]);
}

#[test]
fn test_task_without_process_is_skipped() {
    let mut kernel = FakeKernel::new();
    let nodes = kernel.build_tree(&[2, 1, 3]);
    let p = kernel.add_process(7);
    kernel.set_process(nodes[&3], p);

    let session = kernel.open();
    assert_eq!(lookup_process(&session, 7).unwrap().map(|p| p.address), Some(p));
    assert_eq!(session.process_of(&lookup_task(&session, 1).unwrap().unwrap()).unwrap(), None);
}

#[test]
fn test_tree_cycle_is_corruption() {
    let mut kernel = FakeKernel::new();
    let t5 = kernel.add_task(5);
    let t3 = kernel.add_task(3);
    kernel.set_children_links(t5, t3, 0);
    // 子から根へ戻るリンク
    kernel.set_children_links(t3, 0, t5);
    kernel.set_root(t5);

    let session = kernel.open();
    assert!(matches!(list_tasks(&session), Err(Error::Corruption(_))));
}

#[test]
fn test_tree_self_loop_is_corruption() {
    let mut kernel = FakeKernel::new();
    let t1 = kernel.add_task(1);
    kernel.set_children_links(t1, t1, 0);
    kernel.set_root(t1);

    let session = kernel.open();
    assert!(matches!(list_tasks(&session), Err(Error::Corruption(_))));
}

#[test]
fn test_tree_limits() {
    let mut kernel = FakeKernel::new();
    let order: Vec<u32> = (1..=10).collect();
    kernel.build_tree(&order);

    let session = kernel.open_with_limits(WalkLimits {
        max_depth: 5,
        ..WalkLimits::default()
    });
    assert!(matches!(list_tasks(&session), Err(Error::Corruption(_))));

    let session = kernel.open_with_limits(WalkLimits {
        max_nodes: 9,
        ..WalkLimits::default()
    });
    assert!(matches!(list_tasks(&session), Err(Error::Corruption(_))));

    let session = kernel.open_with_limits(WalkLimits {
        max_nodes: 10,
        max_depth: 10,
        ..WalkLimits::default()
    });
    assert_eq!(list_tasks(&session).unwrap().len(), 10);
}

#[test]
fn test_unreadable_node_is_access_error_without_partial_result() {
    let mut kernel = FakeKernel::new();
    let t5 = kernel.add_task(5);
    let t3 = kernel.add_task(3);
    kernel.set_children_links(t5, t3, 0xdead_0000);
    kernel.set_root(t5);

    let session = kernel.open();
    let err = list_tasks(&session).unwrap_err();
    assert!(matches!(err, Error::Access { address: 0xdead_0000, .. }));

    // 失敗はキャッシュされず、再試行しても同じ失敗になる
    assert!(matches!(lookup_task(&session, 5), Err(Error::Access { .. })));
}

#[test]
fn test_list_that_never_returns_is_corruption() {
    let mut kernel = FakeKernel::new();
    let t1 = kernel.add_task(1);
    let t2 = kernel.add_task(2);
    let t3 = kernel.add_task(3);
    let p = kernel.add_process(9);
    kernel.link_children(p, &[t1, t2, t3]);
    // t3 から head ではなく t2 に戻る
    let (n2, n3) = (kernel.siblings_node(t2), kernel.siblings_node(t3));
    kernel.set_list_links(n3, n2, n2);

    let session = kernel.open();
    let process = session.view().read_process(p).unwrap();
    assert!(matches!(children_of(&session, &process), Err(Error::Corruption(_))));
}

#[test]
fn test_list_length_limit() {
    let mut kernel = FakeKernel::new();
    let tasks: Vec<u64> = (1..=3).map(|tid| kernel.add_task(tid)).collect();
    let p = kernel.add_process(9);
    kernel.link_children(p, &tasks);

    let session = kernel.open_with_limits(WalkLimits {
        max_list_len: 2,
        ..WalkLimits::default()
    });
    let process = session.view().read_process(p).unwrap();
    assert!(matches!(children_of(&session, &process), Err(Error::Corruption(_))));

    let session = kernel.open_with_limits(WalkLimits {
        max_list_len: 3,
        ..WalkLimits::default()
    });
    assert_eq!(tids(&children_of(&session, &process).unwrap()), vec![1, 2, 3]);
}

#[test]
fn test_list_with_null_link_is_corruption() {
    let mut kernel = FakeKernel::new();
    let t1 = kernel.add_task(1);
    let p = kernel.add_process(9);
    kernel.link_children(p, &[t1]);
    let node = kernel.siblings_node(t1);
    kernel.set_list_links(node, 0, kernel.children_head(p));

    let session = kernel.open();
    let process = session.view().read_process(p).unwrap();
    assert!(matches!(children_of(&session, &process), Err(Error::Corruption(_))));
}

#[test]
fn test_list_node_below_offset_is_layout_error() {
    let mut kernel = FakeKernel::new();
    let p = kernel.add_process(9);
    let head = kernel.children_head(p);
    // siblings_node のオフセットより小さいアドレスは task に逆算できない
    kernel.set_list_links(head, 0x10, head);

    let session = kernel.open();
    let process = session.view().read_process(p).unwrap();
    assert!(matches!(children_of(&session, &process), Err(Error::Layout(_))));
}

#[test]
fn test_missing_root_symbol() {
    let kernel = FakeKernel::new();
    let mut config = taskscope_core::SessionConfig::default();
    config.schema.root_symbol = "no_such_root".to_string();

    let result = taskscope_core::Session::open(kernel.accessor(), kernel.table(), config);
    assert!(matches!(result, Err(Error::SymbolNotFound(name)) if name == "no_such_root"));
}

#[test]
fn test_refresh_rereads_root() {
    let mut kernel = FakeKernel::new();
    let t1 = kernel.add_task(1);
    kernel.set_root(t1);

    let mut session = kernel.open();
    assert_eq!(tids(session.all_tasks().unwrap()), vec![1]);

    // ターゲットが再開して新しいタスクができた後、再び停止した
    let t2 = kernel.add_task(2);
    kernel.set_children_links(t1, 0, t2);
    assert_eq!(tids(session.all_tasks().unwrap()), vec![1]);

    session.refresh().unwrap();
    assert_eq!(tids(session.all_tasks().unwrap()), vec![1, 2]);
    assert_eq!(kernel.read_word(BASE), t1);
}

#[test]
fn test_32bit_big_endian_target() {
    let mut kernel = FakeKernel::with_target(4, Endian::Big);
    let nodes = kernel.build_tree(&[50, 20, 70, 60]);
    let p = kernel.add_process(0x1234);
    for &task in nodes.values() {
        kernel.set_process(task, p);
    }
    kernel.link_children(p, &[nodes[&70], nodes[&20]]);

    let session = kernel.open();
    assert_eq!(tids(&list_tasks(&session).unwrap()), vec![20, 50, 60, 70]);

    let process = lookup_process(&session, 0x1234).unwrap().unwrap();
    assert_eq!(tids(&children_of(&session, &process).unwrap()), vec![70, 20]);
}

/// 指定アドレスの読み取りだけ4バイトに切り詰めるアクセサ
struct TruncatedAt {
    inner: FakeMemory,
    address: u64,
}

impl MemoryAccessor for TruncatedAt {
    fn resolve_symbol(&self, name: &str) -> taskscope_core::Result<u64> {
        self.inner.resolve_symbol(name)
    }

    fn read_memory(&self, address: u64, len: usize) -> taskscope_core::Result<Vec<u8>> {
        let mut bytes = self.inner.read_memory(address, len)?;
        if address == self.address {
            bytes.truncate(4);
        }
        Ok(bytes)
    }
}

#[test]
fn test_short_root_read_is_access_error() {
    let mut kernel = FakeKernel::new();
    kernel.set_root(0xdead_0000_0010_0040);

    let accessor = TruncatedAt {
        inner: kernel.accessor(),
        address: BASE,
    };
    let result = Session::open(accessor, kernel.table(), SessionConfig::default());
    assert!(matches!(
        result,
        Err(Error::Access { address: BASE, len: 8, .. })
    ));
}
