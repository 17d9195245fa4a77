//! 路径工具
//!
//! 处理配置中以 `~/` 开头的路径。仅支持当前用户的主目录，`~user` 形式原样保留。

use std::path::{Path, PathBuf};

/// 展开路径中的 ~ 为用户主目录
pub fn expand_tilde<P: AsRef<Path>>(path: P) -> PathBuf {
    let path = path.as_ref();
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            if rest.as_os_str().is_empty() {
                return home;
            }
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

/// 将主目录下的路径收缩为 `~/` 形式
pub fn collapse_tilde<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();
    if let Some(home) = dirs::home_dir() {
        if let Ok(rest) = path.strip_prefix(&home) {
            if rest.as_os_str().is_empty() {
                return "~".to_string();
            }
            return format!("~/{}", rest.to_string_lossy());
        }
    }
    path.to_string_lossy().to_string()
}
