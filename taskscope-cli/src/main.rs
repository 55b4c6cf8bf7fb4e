//! taskscope CLI - コマンドラインインターフェース
//!
//! 停止中のターゲット（ptraceでアタッチしたプロセス、またはメモリダンプ）の
//! タスク木を辿って表示するREPLです。

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use taskscope_core::parse::parse_number;
use taskscope_core::{
    Command, LayoutTable, LiveTarget, MemoryAccessor, Schema, Session, SessionConfig,
    SnapshotTarget, TaskRecord, WalkLimits,
};
use taskscope_dwarf::{DwarfLoader, SymbolResolver};
use taskscope_target::Snapshot;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// taskscope - Kernel task tree inspector
#[derive(Parser)]
#[command(name = "taskscope")]
#[command(version = "0.1.0")]
#[command(about = "Inspect the task tree of a stopped kernel image", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: TargetCommand,

    #[command(flatten)]
    options: CommonOptions,
}

#[derive(Subcommand)]
enum TargetCommand {
    /// Attach to a running process and stop it
    Attach {
        /// Path to the kernel image with DWARF information
        #[arg(long)]
        image: String,

        /// Process ID to attach to
        #[arg(short, long)]
        pid: i32,
    },

    /// Inspect a raw memory dump
    Snapshot {
        /// Path to the kernel image with DWARF information
        #[arg(long)]
        image: String,

        /// Path to the memory dump
        #[arg(long)]
        dump: String,

        /// Address the first byte of the dump was loaded at
        #[arg(long, value_parser = parse_number)]
        base: u64,
    },
}

#[derive(Args)]
struct CommonOptions {
    /// Global variable holding the root of the task tree
    #[arg(long, global = true)]
    root_symbol: Option<String>,

    /// Maximum number of tasks visited in the tree
    #[arg(long, global = true)]
    max_nodes: Option<usize>,

    /// Maximum depth of the task tree
    #[arg(long, global = true)]
    max_depth: Option<usize>,

    /// Maximum length of a children list
    #[arg(long, global = true)]
    max_list_len: Option<usize>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

impl CommonOptions {
    fn session_config(&self) -> SessionConfig {
        let defaults = WalkLimits::default();
        let mut schema = Schema::default();
        if let Some(symbol) = &self.root_symbol {
            schema.root_symbol = symbol.clone();
        }

        SessionConfig {
            schema,
            limits: WalkLimits {
                max_nodes: self.max_nodes.unwrap_or(defaults.max_nodes),
                max_depth: self.max_depth.unwrap_or(defaults.max_depth),
                max_list_len: self.max_list_len.unwrap_or(defaults.max_list_len),
            },
        }
    }
}

type DynSession = Session<Box<dyn MemoryAccessor>>;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.options.verbose);

    println!("taskscope - Kernel task tree inspector");
    println!("Version 0.1.0");
    println!();

    let config = cli.options.session_config();
    let mut session = open_session(cli.command, config)?;
    run_repl(&mut session)?;

    Ok(())
}

/// RUST_LOG があればそれに従い、なければ warn（-v で debug）
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

impl TargetCommand {
    fn image(&self) -> &str {
        match self {
            TargetCommand::Attach { image, .. } | TargetCommand::Snapshot { image, .. } => image,
        }
    }
}

/// イメージを読み込み、ターゲットを用意してセッションを開く
fn open_session(command: TargetCommand, config: SessionConfig) -> Result<DynSession> {
    let image = command.image();
    println!("Loading image: {}", image);

    // イメージからDWARF情報とシンボルを読み込む
    let loader = DwarfLoader::load(image)?;
    let symbols = SymbolResolver::new(&loader)?;
    let table = LayoutTable::from_dwarf(&loader, config.schema.clone())?;
    println!("Loaded layouts from {}", loader.path().display());
    info!(
        pointer_size = table.pointer_size(),
        endian = ?table.endian(),
        "layout table ready"
    );

    let accessor: Box<dyn MemoryAccessor> = match command {
        TargetCommand::Attach { pid, .. } => {
            let target = LiveTarget::attach(pid, symbols)
                .with_context(|| format!("Failed to attach to process {}", pid))?;
            println!("Attached to process {}", target.pid());
            Box::new(target)
        }
        TargetCommand::Snapshot { dump, base, .. } => {
            let snapshot = Snapshot::load(&dump, base)?;
            println!(
                "Loaded memory dump {} at 0x{:x}-0x{:x}",
                dump,
                snapshot.base(),
                snapshot.end()
            );
            Box::new(SnapshotTarget::new(snapshot, symbols))
        }
    };

    let session = Session::open(accessor, table, config)?;
    println!("Task tree root at 0x{:x}", session.root());
    println!();

    Ok(session)
}

/// REPLループを実行する
fn run_repl(session: &mut DynSession) -> Result<()> {
    println!("Type 'help' for available commands, 'quit' to exit.");
    println!();

    let mut rl = DefaultEditor::new()?;

    loop {
        let readline = rl.readline("(taskscope) ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line)?;

                match handle_command(session, line) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => eprintln!("Error: {:#}", e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    Ok(())
}

/// コマンドを処理する。終了する場合は false
fn handle_command(session: &mut DynSession, line: &str) -> Result<bool> {
    match Command::parse(line) {
        Some(Command::Tasks) => handle_tasks(session)?,
        Some(Command::Task(tid)) => handle_task(session, tid)?,
        Some(Command::Process(pid)) => handle_process(session, pid)?,
        Some(Command::Children(pid)) => handle_children(session, pid)?,
        Some(Command::Layout) => print_layouts(session.table()),
        Some(Command::Refresh) => {
            session.refresh()?;
            println!("Task tree root at 0x{:x}", session.root());
        }
        Some(Command::Help) => print_help(),
        Some(Command::Quit) => {
            // LiveTarget はセッションのドロップでデタッチされる
            println!("Goodbye!");
            return Ok(false);
        }
        None => {
            println!("Unknown command: {}", line);
            println!("Type 'help' for available commands.");
        }
    }

    Ok(true)
}

/// Tasksコマンドを処理する
fn handle_tasks(session: &DynSession) -> Result<()> {
    let tasks = session.all_tasks()?;
    if tasks.is_empty() {
        println!("No tasks found");
        return Ok(());
    }

    println!("{:>8}  {:>18}  {:>8}", "TID", "ADDRESS", "PID");
    for task in tasks {
        let pid = match session.process_of(task)? {
            Some(process) => process.pid.to_string(),
            None => "-".to_string(),
        };
        println!("{:>8}  {:>#18x}  {:>8}", task.tid, task.address, pid);
    }
    println!("{} tasks", tasks.len());
    Ok(())
}

/// Taskコマンドを処理する
fn handle_task(session: &DynSession, tid: u64) -> Result<()> {
    let Some(task) = session.find_task(tid)? else {
        println!("No task with tid {}", tid);
        return Ok(());
    };

    print_task(&task);
    match session.process_of(&task)? {
        Some(process) => println!("  process:  pid {} @ 0x{:x}", process.pid, process.address),
        None => println!("  process:  (none)"),
    }
    Ok(())
}

/// Processコマンドを処理する
fn handle_process(session: &DynSession, pid: u64) -> Result<()> {
    let Some(process) = session.find_process(pid)? else {
        println!("No process with pid {}", pid);
        return Ok(());
    };

    println!("Process {} @ 0x{:x}", process.pid, process.address);
    println!(
        "  children: 0x{:x} (next 0x{:x}, prev 0x{:x})",
        process.children.address, process.children.next, process.children.prev
    );

    let members: Vec<u64> = session
        .all_tasks()?
        .iter()
        .filter(|t| t.process == process.address)
        .map(|t| t.tid)
        .collect();
    println!("  tasks:    {:?}", members);
    Ok(())
}

/// Childrenコマンドを処理する
fn handle_children(session: &DynSession, pid: u64) -> Result<()> {
    let Some(process) = session.find_process(pid)? else {
        println!("No process with pid {}", pid);
        return Ok(());
    };

    let children = session.children_of(&process)?;
    if children.is_empty() {
        println!("Process {} has no children", pid);
        return Ok(());
    }

    println!("Children of process {} ({} found):", pid, children.len());
    for (i, child) in children.iter().enumerate() {
        println!("  {}. tid {} @ 0x{:x}", i + 1, child.tid, child.address);
    }
    Ok(())
}

fn print_task(task: &TaskRecord) {
    println!("Task {} @ 0x{:x}", task.tid, task.address);
    println!("  left:     0x{:x}", task.left);
    println!("  right:    0x{:x}", task.right);
    println!(
        "  siblings: 0x{:x} (next 0x{:x}, prev 0x{:x})",
        task.siblings.address, task.siblings.next, task.siblings.prev
    );
}

fn print_layouts(table: &LayoutTable) {
    println!(
        "Target: {}-bit {:?}-endian",
        table.pointer_size() * 8,
        table.endian()
    );
    for layout in [table.task(), table.process(), table.list_node()] {
        println!();
        println!("struct {} (size: {})", layout.name(), layout.size());
        for field in layout.fields() {
            println!(
                "  +0x{:<4x} {:<32} size {:<3} {:?}",
                field.offset, field.name, field.size, field.kind
            );
        }
    }
}

fn print_help() {
    println!("Available commands:");
    println!();
    println!("  help (h, ?)        - Show this help message");
    println!("  quit (q, exit)     - Detach and exit");
    println!();
    println!("Inspection commands:");
    println!("  tasks (ps)         - List all tasks ordered by tid");
    println!("  task (t) <tid>     - Show a task");
    println!("  proc (p) <pid>     - Show a process");
    println!("  children (ch) <pid> - List the children of a process");
    println!("  layout             - Show the structure layouts in use");
    println!("  refresh (r)        - Re-read the task tree root");
    println!();
    println!("Numbers may be decimal or 0x-prefixed hexadecimal.");
    println!();
    println!("Examples:");
    println!("  tasks");
    println!("  task 42");
    println!("  children 0x2a");
}
