//! 路径工具模块
//!
//! 配置文件路径的 tilde (~) 展开与默认位置

use std::path::{Path, PathBuf};

/// 默认配置目录名（位于用户主目录下）
pub const CONFIG_DIR_NAME: &str = ".openai-streaming";
/// 默认配置文件名
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// 展开路径中的 tilde (~) 为用户主目录
///
/// - `~` -> 用户主目录
/// - `~/path` -> 用户主目录/path
/// - `~user/path` 不支持，原样返回
/// - 其他路径原样返回
pub fn expand_tilde<P: AsRef<Path>>(path: P) -> PathBuf {
    let path = path.as_ref();
    let path_str = path.to_string_lossy();

    if !path_str.starts_with('~') {
        return path.to_path_buf();
    }

    // 无法获取主目录时返回原路径
    let Some(home_dir) = dirs::home_dir() else {
        return path.to_path_buf();
    };

    if path_str == "~" {
        home_dir
    } else if let Some(rest) = path_str.strip_prefix("~/") {
        home_dir.join(rest)
    } else {
        path.to_path_buf()
    }
}

/// 默认配置文件路径：`~/.openai-streaming/config.yaml`
///
/// 无法确定用户主目录时返回 None。
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}
