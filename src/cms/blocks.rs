use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::cms::error::{CmsError, Result};

/// 区块默认内容标记，`display_block` / `placeholder` 会把它替换为调用方给出的默认内容
pub const DEFAULT_BLOCK_MARKER: &str = "<!-- X_WINTER_DEFAULT_BLOCK_CONTENT -->";

/// 在区块内容中用去除首尾空白的默认内容替换默认内容标记
pub fn merge_default(content: &str, default: &str) -> String {
    content.replace(DEFAULT_BLOCK_MARKER, default.trim())
}

/// 单次渲染过程中的命名区块注册表
#[derive(Debug, Default)]
pub struct BlockRegistry {
    /// 已关闭的区块
    blocks: HashMap<String, String>,
    /// 已打开、尚未关闭的区块（名称，缓冲区）
    stack: Vec<(String, String)>,
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 打开一个新的区块，之后捕获的内容写入该区块
    pub fn start_block(&mut self, name: &str) {
        debug!("打开区块: {}", name);
        self.stack.push((name.to_string(), String::new()));
    }

    /// 向最内层已打开的区块写入内容
    pub fn capture(&mut self, text: &str) -> Result<()> {
        match self.stack.last_mut() {
            Some((_, buffer)) => {
                buffer.push_str(text);
                Ok(())
            }
            None => Err(CmsError::BlockNesting),
        }
    }

    /// 关闭最近打开的区块
    ///
    /// `append` 为真时追加到同名区块之后，否则替换同名区块。
    pub fn end_block(&mut self, append: bool) -> Result<()> {
        let (name, contents) = self.stack.pop().ok_or(CmsError::BlockNesting)?;
        debug!("关闭区块: {} (append = {})", name, append);
        if append {
            self.append(&name, &contents);
        } else {
            self.set(&name, contents);
        }
        Ok(())
    }

    pub fn set(&mut self, name: &str, contents: String) {
        self.blocks.insert(name.to_string(), contents);
    }

    pub fn append(&mut self, name: &str, contents: &str) {
        self.blocks
            .entry(name.to_string())
            .or_default()
            .push_str(contents);
    }

    /// 读取区块内容但不删除
    pub fn get(&self, name: &str) -> Option<&str> {
        self.blocks.get(name).map(String::as_str)
    }

    /// 读取并删除区块
    pub fn take(&mut self, name: &str) -> Option<String> {
        self.blocks.remove(name)
    }

    /// 当前是否还有未关闭的区块
    pub fn has_open_blocks(&self) -> bool {
        !self.stack.is_empty()
    }
}

/// 在渲染过程内共享的区块注册表
///
/// Tera 要求注册的函数满足 `Send + Sync`，因此用互斥锁包装。
#[derive(Debug, Clone, Default)]
pub struct SharedBlocks(Arc<Mutex<BlockRegistry>>);

impl SharedBlocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, BlockRegistry> {
        // 持锁期间不会回调到模板，中毒的锁里的数据依然可用
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
