use gray_matter::engine::YAML;
use gray_matter::{Matter, Pod};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::cms::error::{CmsError, Result};
use crate::models::{ComponentDecl, Content, ContentFormat, Layout, Page, Params, Partial};

/// 主题说明，对应主题目录下的 `theme.yaml`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ThemeInfo {
    pub name: String,
    pub description: Option<String>,
    pub author: Option<String>,
}

/// 从磁盘加载的主题
#[derive(Debug, Clone)]
pub struct Theme {
    /// 主题目录名
    pub code: String,
    /// 主题目录
    pub dir: PathBuf,
    /// 主题说明
    pub info: ThemeInfo,
    pages: BTreeMap<String, Page>,
    layouts: HashMap<String, Layout>,
    partials: HashMap<String, Partial>,
    content: HashMap<String, Content>,
}

impl Theme {
    /// 加载主题目录
    pub fn load(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(CmsError::Theme(format!("主题目录不存在: {}", dir.display())));
        }

        let code = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "default".to_string());
        info!("加载主题 {}: {}", code, dir.display());

        let info_path = dir.join("theme.yaml");
        let mut theme_info = if info_path.exists() {
            serde_yaml::from_str::<ThemeInfo>(&fs::read_to_string(&info_path)?)?
        } else {
            ThemeInfo::default()
        };
        if theme_info.name.is_empty() {
            theme_info.name = code.clone();
        }

        let mut theme = Theme {
            code,
            dir: dir.to_path_buf(),
            info: theme_info,
            pages: BTreeMap::new(),
            layouts: HashMap::new(),
            partials: HashMap::new(),
            content: HashMap::new(),
        };

        for source in scan(&dir.join("pages"), &["htm"])? {
            let page = source.into_page();
            debug!("加载页面: {} ({})", page.name, page.url);
            theme.pages.insert(page.name.clone(), page);
        }
        for source in scan(&dir.join("layouts"), &["htm"])? {
            let layout = source.into_layout();
            debug!("加载布局: {}", layout.name);
            theme.layouts.insert(layout.name.clone(), layout);
        }
        for source in scan(&dir.join("partials"), &["htm"])? {
            let partial = source.into_partial();
            debug!("加载局部模板: {}", partial.name);
            theme.partials.insert(partial.name.clone(), partial);
        }
        theme.load_content()?;

        info!(
            "主题 {} 加载完成 - 页面: {}, 布局: {}, 局部模板: {}, 内容: {}",
            theme.code,
            theme.pages.len(),
            theme.layouts.len(),
            theme.partials.len(),
            theme.content.len()
        );
        Ok(theme)
    }

    fn load_content(&mut self) -> Result<()> {
        let content_dir = self.dir.join("content");
        if !content_dir.exists() {
            return Ok(());
        }

        for entry in WalkDir::new(&content_dir) {
            let entry = entry.map_err(|e| CmsError::Theme(e.to_string()))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let format = match path
                .extension()
                .and_then(|ext| ext.to_str())
                .and_then(ContentFormat::from_extension)
            {
                Some(format) => format,
                None => {
                    warn!("忽略不支持的内容文件: {}", path.display());
                    continue;
                }
            };

            let file_name = relative_name(&content_dir, path);
            let body = fs::read_to_string(path)?;
            debug!("加载内容: {}", file_name);
            self.content.insert(
                file_name.clone(),
                Content {
                    file_name,
                    format,
                    body,
                },
            );
        }
        Ok(())
    }

    pub fn page(&self, name: &str) -> Option<&Page> {
        self.pages.get(strip_htm(name))
    }

    /// 按名称排序的全部页面
    pub fn pages(&self) -> impl Iterator<Item = &Page> {
        self.pages.values()
    }

    pub fn layout(&self, name: &str) -> Option<&Layout> {
        self.layouts.get(strip_htm(name))
    }

    pub fn partial(&self, name: &str) -> Option<&Partial> {
        self.partials.get(strip_htm(name))
    }

    /// 查找内容文件，省略扩展名时默认 `.htm`
    pub fn content(&self, name: &str) -> Option<&Content> {
        let name = name.trim_start_matches('/');
        self.content
            .get(name)
            .or_else(|| self.content.get(&format!("{}.htm", name)))
    }

    /// 需要注册到 Tera 的全部模板（模板名，源码）
    pub fn templates(&self) -> Vec<(String, String)> {
        let pages = self.pages.values().map(|p| (p.template_name(), p.markup.clone()));
        let layouts = self.layouts.values().map(|l| (l.template_name(), l.markup.clone()));
        let partials = self.partials.values().map(|p| (p.template_name(), p.markup.clone()));
        pages.chain(layouts).chain(partials).collect()
    }

    /// 主题静态资源目录
    pub fn assets_dir(&self) -> PathBuf {
        self.dir.join("assets")
    }
}

/// 解析前置元数据后的模板文件
struct TemplateSource {
    name: String,
    file_name: String,
    settings: Params,
    markup: String,
}

impl TemplateSource {
    fn string(&self, key: &str) -> Option<String> {
        self.settings.get(key).and_then(Value::as_str).map(str::to_string)
    }

    fn components(&self) -> Vec<ComponentDecl> {
        ComponentDecl::parse_all(self.settings.get("components"))
    }

    fn into_page(self) -> Page {
        let title = self.string("title").unwrap_or_else(|| self.name.clone());
        let url = self.string("url").unwrap_or_else(|| format!("/{}", self.name));
        Page {
            layout: self.string("layout"),
            description: self.string("description"),
            components: self.components(),
            title,
            url,
            name: self.name,
            file_name: self.file_name,
            settings: self.settings,
            markup: self.markup,
        }
    }

    fn into_layout(self) -> Layout {
        Layout {
            description: self.string("description"),
            components: self.components(),
            name: self.name,
            file_name: self.file_name,
            settings: self.settings,
            markup: self.markup,
        }
    }

    fn into_partial(self) -> Partial {
        Partial {
            name: self.name,
            file_name: self.file_name,
            settings: self.settings,
            markup: self.markup,
        }
    }
}

/// 扫描目录下指定扩展名的模板文件并解析前置元数据
fn scan(dir: &Path, extensions: &[&str]) -> Result<Vec<TemplateSource>> {
    let mut sources = Vec::new();
    if !dir.exists() {
        return Ok(sources);
    }

    let matter = Matter::<YAML>::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| CmsError::Theme(e.to_string()))?;
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| extensions.contains(&ext));
        if !path.is_file() || !matches {
            continue;
        }

        let raw = fs::read_to_string(path)?;
        let parsed = matter.parse(&raw);
        let settings = match parsed.data.map(pod_to_value) {
            Some(Value::Object(map)) => map,
            Some(Value::Null) | None => Params::new(),
            Some(_) => {
                return Err(CmsError::Theme(format!(
                    "前置元数据必须是映射: {}",
                    path.display()
                )))
            }
        };

        let file_name = relative_name(dir, path);
        sources.push(TemplateSource {
            name: strip_htm(&file_name).to_string(),
            file_name,
            settings,
            markup: parsed.content,
        });
    }
    Ok(sources)
}

fn relative_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn strip_htm(name: &str) -> &str {
    let name = name.trim_start_matches('/');
    name.strip_suffix(".htm").unwrap_or(name)
}

fn pod_to_value(pod: Pod) -> Value {
    match pod {
        Pod::String(s) => Value::String(s),
        Pod::Integer(i) => Value::from(i),
        Pod::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Pod::Boolean(b) => Value::Bool(b),
        Pod::Array(arr) => Value::Array(arr.into_iter().map(pod_to_value).collect()),
        Pod::Hash(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, pod_to_value(v)))
                .collect(),
        ),
        Pod::Null => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    #[test]
    fn test_load_theme_objects() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("demo");
        write(
            &root,
            "pages/blog/post.htm",
            "---\ntitle: Post\nurl: /blog/:slug\nlayout: default\n---\n<h1>{{ this.page.title }}</h1>\n",
        );
        write(&root, "pages/about.htm", "about\n");
        write(&root, "layouts/default.htm", "---\ndescription: Main\n---\n{{ page() }}");
        write(&root, "partials/nav/menu.htm", "<nav></nav>");
        write(&root, "content/welcome.md", "# Hello");
        write(&root, "content/logo.png", "binary");

        let theme = Theme::load(&root).unwrap();
        assert_eq!(theme.code, "demo");
        assert_eq!(theme.info.name, "demo");

        let post = theme.page("blog/post").unwrap();
        assert_eq!(post.title, "Post");
        assert_eq!(post.url, "/blog/:slug");
        assert_eq!(post.layout.as_deref(), Some("default"));
        assert_eq!(post.template_name(), "pages/blog/post.htm");
        assert!(post.markup.contains("<h1>"));

        let about = theme.page("about.htm").unwrap();
        assert_eq!(about.url, "/about");
        assert_eq!(about.title, "about");

        assert!(theme.layout("default").is_some());
        assert!(theme.partial("nav/menu").is_some());
        assert!(theme.content("welcome.md").is_some());
        assert!(theme.content("logo.png").is_none());
        assert_eq!(theme.templates().len(), 4);
    }

    #[test]
    fn test_missing_theme_directory() {
        let tmp = TempDir::new().unwrap();
        let err = Theme::load(&tmp.path().join("nope")).unwrap_err();
        assert!(matches!(err, CmsError::Theme(_)));
    }
}
