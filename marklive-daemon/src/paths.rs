use std::path::{Path, PathBuf};

use marklive_core::config;

pub const DAEMON_SOCKET: &str = "daemon.sock";
pub const HTTP_HOST: &str = "127.0.0.1";

pub fn marklive_root(home: &Path) -> PathBuf {
    config::root_dir_at(home)
}

pub fn socket_path(home: &Path) -> PathBuf {
    marklive_root(home).join(DAEMON_SOCKET)
}
