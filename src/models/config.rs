use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::Result;

/// 主题资源的 URL 前缀，与 `themes_dir` 在磁盘上的位置无关
pub const THEMES_URL_PREFIX: &str = "/themes";

/// 站点配置，对应站点目录下的 `config.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 站点名称
    pub name: String,
    /// 站点根 URL，生成主题资源地址时使用
    pub app_url: String,
    /// 当前启用的主题
    pub active_theme: String,
    /// 主题目录（相对站点目录或绝对路径），只影响磁盘位置
    pub themes_dir: String,
    /// 运行环境，模板中可通过 `this.environment` 访问
    pub environment: String,
    /// 调试模式，开启后渲染错误会输出详细来源链
    pub debug: bool,
    /// 找不到页面时使用的页面名称
    pub not_found_page: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "Rust CMS".to_string(),
            app_url: String::new(),
            active_theme: "demo".to_string(),
            themes_dir: "themes".to_string(),
            environment: "production".to_string(),
            debug: false,
            not_found_page: Some("404".to_string()),
        }
    }
}

impl Config {
    /// 从文件加载配置
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// 加载站点目录下的 `config.yaml`，不存在时使用默认配置
    pub fn load(base_dir: &Path) -> Result<Self> {
        let path = base_dir.join("config.yaml");
        if path.exists() {
            Self::from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// 保存配置到文件
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;
        Ok(())
    }

    /// 当前主题所在目录
    pub fn theme_path(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(&self.themes_dir).join(&self.active_theme)
    }

    /// 去掉末尾斜杠的站点根 URL
    pub fn base_url(&self) -> &str {
        self.app_url.trim_end_matches('/')
    }
}
