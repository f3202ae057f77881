//! PID 文件
//!
//! 启动时写入当前进程号，退出时删除。删除前先确认文件里仍是本进程的 PID，
//! 同一路径已被后启动的实例覆盖时保留该文件。

use anyhow::{Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// 持有期间 PID 文件存在，drop 时删除
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
    pid: u32,
}

impl PidFile {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create PID file directory {dir:?}"))?;
        }

        let pid = std::process::id();
        fs::write(path, format!("{pid}\n"))
            .with_context(|| format!("Failed to write PID file {path:?}"))?;

        info!("PID {} recorded in {:?}", pid, path);
        Ok(Self {
            path: path.to_path_buf(),
            pid,
        })
    }

    /// 文件内容是否仍是本进程的 PID
    fn still_ours(&self) -> std::io::Result<bool> {
        let content = fs::read_to_string(&self.path)?;
        Ok(content.trim().parse::<u32>().ok() == Some(self.pid))
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        match self.still_ours() {
            Ok(true) => {}
            Ok(false) => {
                warn!(
                    "PID file {:?} no longer holds PID {}, leaving it in place",
                    self.path, self.pid
                );
                return;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => return,
            Err(e) => {
                warn!("Failed to read PID file {:?}: {}", self.path, e);
                return;
            }
        }

        match fs::remove_file(&self.path) {
            Ok(()) => info!("PID file removed: {:?}", self.path),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove PID file {:?}: {}", self.path, e),
        }
    }
}
