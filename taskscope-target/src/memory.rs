//! 停止中プロセスのメモリ読み取り

use crate::Result;
use nix::unistd::Pid;
use std::fs::File;
use std::io::{BufRead, BufReader, Read as _, Seek, SeekFrom};
use tracing::trace;

/// メモリマッピング情報
#[derive(Debug, Clone)]
pub struct MemoryMapping {
    pub start: usize,
    pub end: usize,
    pub readable: bool,
}

impl MemoryMapping {
    /// `[addr, addr + len)` がこのマッピングに完全に含まれるか
    pub fn contains(&self, addr: usize, len: usize) -> bool {
        match addr.checked_add(len) {
            Some(end) => addr >= self.start && end <= self.end,
            None => false,
        }
    }
}

/// 読み取り専用のメモリアクセス
pub struct Memory {
    pid: Pid,
}

impl Memory {
    /// メモリアクセスを作成する
    pub fn new(pid: i32) -> Self {
        Self {
            pid: Pid::from_raw(pid),
        }
    }

    /// /proc/pid/mem のパスを取得する
    fn mem_path(&self) -> String {
        format!("/proc/{}/mem", self.pid)
    }

    /// メモリからデータを読み取る
    ///
    /// /proc/pid/memを使用してターゲットプロセスのメモリを読み取ります。
    /// /proc/pid/memが使用できない場合（EIOエラー）、PTRACE_PEEKDATAにフォールバックします。
    pub fn read(&self, addr: usize, size: usize) -> Result<Vec<u8>> {
        trace!("read 0x{:x} ({} bytes)", addr, size);

        match self.read_via_proc_mem(addr, size) {
            Ok(data) => Ok(data),
            Err(e) => {
                // EIO (errno 5): ptraceにフォールバック
                if let Some(io_err) = e.downcast_ref::<std::io::Error>() {
                    if io_err.raw_os_error() == Some(5) {
                        return self.read_via_ptrace(addr, size);
                    }
                }
                Err(e)
            }
        }
    }

    /// /proc/pid/mem経由でメモリを読み取る（内部実装）
    fn read_via_proc_mem(&self, addr: usize, size: usize) -> Result<Vec<u8>> {
        let mem_path = self.mem_path();
        let mut file = File::open(&mem_path)
            .map_err(|e| anyhow::anyhow!("Failed to open {}: {}", mem_path, e))?;

        file.seek(SeekFrom::Start(addr as u64))?;

        let mut buffer = vec![0u8; size];
        file.read_exact(&mut buffer)?;

        Ok(buffer)
    }

    /// PTRACE_PEEKDATAを使用してメモリからデータを読み取る
    ///
    /// /proc/pid/memが使用できない場合のフォールバック。
    /// ワード単位で読み取るため、大きな構造体では遅くなります。
    pub fn read_via_ptrace(&self, addr: usize, size: usize) -> Result<Vec<u8>> {
        use nix::sys::ptrace;

        let mut data = Vec::with_capacity(size);
        let word_size = std::mem::size_of::<usize>();

        for offset in (0..size).step_by(word_size) {
            let word_addr = addr
                .checked_add(offset)
                .ok_or_else(|| anyhow::anyhow!("Address overflow reading 0x{:x}+{}", addr, offset))?;
            let word = ptrace::read(self.pid, word_addr as *mut std::ffi::c_void)
                .map_err(|e| anyhow::anyhow!("Failed to read via ptrace at 0x{:x}: {}", word_addr, e))?;

            let bytes = word.to_ne_bytes();
            let copy_size = (size - offset).min(word_size);
            data.extend_from_slice(&bytes[..copy_size]);
        }

        Ok(data)
    }

    /// /proc/pid/maps を解析してメモリマッピング情報を取得する
    pub fn get_mappings(&self) -> Result<Vec<MemoryMapping>> {
        let maps_path = format!("/proc/{}/maps", self.pid);
        let file = File::open(&maps_path)
            .map_err(|e| anyhow::anyhow!("Failed to open {}: {}", maps_path, e))?;

        let mut mappings = Vec::new();
        for line in BufReader::new(file).lines() {
            if let Some(mapping) = parse_maps_line(&line?)? {
                mappings.push(mapping);
            }
        }

        Ok(mappings)
    }

    /// 実行可能ファイルのベースアドレスを取得する
    ///
    /// PIEの場合、シンボルアドレスはファイル内オフセットなので、
    /// 最初の実行可能セグメントの開始アドレスからファイルオフセットを引いた値を返します。
    pub fn get_base_address(&self) -> Result<usize> {
        let maps_path = format!("/proc/{}/maps", self.pid);
        let file = File::open(&maps_path)
            .map_err(|e| anyhow::anyhow!("Failed to open {}: {}", maps_path, e))?;

        for line in BufReader::new(file).lines() {
            let line = line?;
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 6 || parts[1].chars().nth(2) != Some('x') {
                continue;
            }

            let Some((start, _)) = parts[0].split_once('-') else {
                continue;
            };
            let start = usize::from_str_radix(start, 16)
                .map_err(|e| anyhow::anyhow!("Failed to parse base address: {}", e))?;
            let offset = usize::from_str_radix(parts[2], 16)
                .map_err(|e| anyhow::anyhow!("Failed to parse segment offset: {}", e))?;

            return start
                .checked_sub(offset)
                .ok_or_else(|| anyhow::anyhow!("Segment offset 0x{:x} exceeds start 0x{:x}", offset, start));
        }

        Err(anyhow::anyhow!("Could not find executable segment in memory mappings"))
    }

    /// `[addr, addr + len)` が読み取り可能なマッピング内にあるかチェックする
    pub fn is_readable(&self, addr: usize, len: usize) -> Result<bool> {
        let mappings = self.get_mappings()?;
        Ok(mappings.iter().any(|m| m.readable && m.contains(addr, len)))
    }
}

/// /proc/pid/maps の1行をパースする
///
/// フォーマット: "address perms offset dev inode pathname"
fn parse_maps_line(line: &str) -> Result<Option<MemoryMapping>> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 2 {
        return Ok(None);
    }

    let Some((start, end)) = parts[0].split_once('-') else {
        return Ok(None);
    };

    let start = usize::from_str_radix(start, 16)
        .map_err(|e| anyhow::anyhow!("Failed to parse start address: {}", e))?;
    let end = usize::from_str_radix(end, 16)
        .map_err(|e| anyhow::anyhow!("Failed to parse end address: {}", e))?;

    Ok(Some(MemoryMapping {
        start,
        end,
        readable: parts[1].starts_with('r'),
    }))
}
