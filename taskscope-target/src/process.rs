//! プロセスの停止制御

use crate::Result;
use nix::sys::ptrace;
use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;
use tracing::debug;

/// ptraceで停止させた調査対象プロセス
///
/// アタッチ中はプロセスが停止しているため、メモリの内容は変化しません。
/// ドロップ時にデタッチし、プロセスの実行を再開させます。
pub struct Process {
    pid: Pid,
}

impl Process {
    /// 既存のプロセスにアタッチし、停止するまで待機する
    ///
    /// PTRACE_ATTACHはSIGSTOPを送るだけなので、waitpidで停止を確認してから返します。
    /// 停止前にプロセスが終了した場合はエラーになります。
    pub fn attach(pid: i32) -> Result<Self> {
        let pid = Pid::from_raw(pid);
        ptrace::attach(pid)
            .map_err(|e| anyhow::anyhow!("Failed to attach to process {}: {}", pid, e))?;

        loop {
            match waitpid(pid, None)? {
                WaitStatus::Stopped(_, Signal::SIGSTOP) => break,
                WaitStatus::Stopped(_, signal) => {
                    // SIGSTOP以外のシグナルは再配送して停止を待ち続ける
                    debug!(%pid, ?signal, "re-delivering signal while waiting for attach stop");
                    ptrace::cont(pid, signal)?;
                }
                WaitStatus::Exited(_, code) => {
                    return Err(anyhow::anyhow!("Process {} exited with code {} during attach", pid, code));
                }
                WaitStatus::Signaled(_, signal, _) => {
                    return Err(anyhow::anyhow!("Process {} was killed by {:?} during attach", pid, signal));
                }
                status => {
                    return Err(anyhow::anyhow!("Unexpected wait status during attach: {:?}", status));
                }
            }
        }

        debug!(%pid, "process paused");
        Ok(Self { pid })
    }

    /// プロセスIDを取得する
    pub fn pid(&self) -> i32 {
        self.pid.as_raw()
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        let _ = ptrace::detach(self.pid, None);
    }
}
