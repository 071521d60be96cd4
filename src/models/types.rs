use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// 模板函数参数，与 Tera 的值类型一致
pub type Params = serde_json::Map<String, Value>;

/// 页面或布局中声明的组件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentDecl {
    /// 组件别名，模板中用它引用组件
    pub alias: String,
    /// 组件类型名，对应已注册的组件
    pub kind: String,
    /// 组件属性
    pub properties: Params,
}

impl ComponentDecl {
    /// 从前置元数据的 `components` 段解析组件声明
    ///
    /// 每个条目形如 `alias: { type: "<组件名>", ..属性 }`，省略 `type` 时别名即组件名。
    pub fn parse_all(section: Option<&Value>) -> Vec<ComponentDecl> {
        let Some(Value::Object(map)) = section else {
            return Vec::new();
        };

        map.iter()
            .map(|(alias, value)| {
                let mut properties = match value {
                    Value::Object(props) => props.clone(),
                    _ => Params::new(),
                };
                let kind = match properties.remove("type") {
                    Some(Value::String(kind)) => kind,
                    _ => alias.clone(),
                };
                ComponentDecl {
                    alias: alias.clone(),
                    kind,
                    properties,
                }
            })
            .collect()
    }
}

/// 页面
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    /// 页面名称（相对 pages 目录、不含扩展名），如 `blog/post`
    pub name: String,
    /// 文件名，如 `blog/post.htm`
    pub file_name: String,
    /// 页面标题
    pub title: String,
    /// URL 模式
    pub url: String,
    /// 使用的布局
    pub layout: Option<String>,
    /// 页面描述
    pub description: Option<String>,
    /// 前置元数据中的全部设置
    pub settings: Params,
    /// 页面声明的组件
    #[serde(skip)]
    pub components: Vec<ComponentDecl>,
    /// 模板源码
    #[serde(skip)]
    pub markup: String,
}

impl Page {
    pub fn template_name(&self) -> String {
        format!("pages/{}", self.file_name)
    }

    /// 模板中 `this.page` 的值
    pub fn to_value(&self) -> Value {
        let mut value = self.settings.clone();
        value.insert("name".to_string(), Value::String(self.name.clone()));
        value.insert("file_name".to_string(), Value::String(self.file_name.clone()));
        value.insert("title".to_string(), Value::String(self.title.clone()));
        value.insert("url".to_string(), Value::String(self.url.clone()));
        Value::Object(value)
    }
}

/// 布局
#[derive(Debug, Clone, Serialize)]
pub struct Layout {
    pub name: String,
    pub file_name: String,
    pub description: Option<String>,
    pub settings: Params,
    #[serde(skip)]
    pub components: Vec<ComponentDecl>,
    #[serde(skip)]
    pub markup: String,
}

impl Layout {
    pub fn template_name(&self) -> String {
        format!("layouts/{}", self.file_name)
    }

    pub fn to_value(&self) -> Value {
        let mut value = self.settings.clone();
        value.insert("name".to_string(), Value::String(self.name.clone()));
        value.insert("file_name".to_string(), Value::String(self.file_name.clone()));
        Value::Object(value)
    }
}

/// 局部模板
#[derive(Debug, Clone, Serialize)]
pub struct Partial {
    pub name: String,
    pub file_name: String,
    pub settings: Params,
    #[serde(skip)]
    pub markup: String,
}

impl Partial {
    pub fn template_name(&self) -> String {
        format!("partials/{}", self.file_name)
    }
}

/// 静态内容格式，由文件扩展名决定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ContentFormat {
    Html,
    Text,
    Markdown,
}

impl ContentFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "htm" | "html" => Some(ContentFormat::Html),
            "txt" => Some(ContentFormat::Text),
            "md" | "markdown" => Some(ContentFormat::Markdown),
            _ => None,
        }
    }
}

/// 静态内容
#[derive(Debug, Clone, Serialize)]
pub struct Content {
    /// 带扩展名的文件名，如 `welcome.md`
    pub file_name: String,
    pub format: ContentFormat,
    pub body: String,
}

/// 资源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Css,
    Rss,
    Js,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Css => "css",
            AssetKind::Rss => "rss",
            AssetKind::Js => "js",
        }
    }

    /// 输出顺序：样式、订阅、脚本
    pub fn all() -> [AssetKind; 3] {
        [AssetKind::Css, AssetKind::Rss, AssetKind::Js]
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "css" => Ok(AssetKind::Css),
            "rss" => Ok(AssetKind::Rss),
            "js" => Ok(AssetKind::Js),
            other => Err(format!("未知的资源类型: {}", other)),
        }
    }
}

/// 主题资源地址：单个路径，或需要合并为一个地址的多个路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThemeUrl {
    Single(String),
    Many(Vec<String>),
}

impl From<&str> for ThemeUrl {
    fn from(path: &str) -> Self {
        ThemeUrl::Single(path.to_string())
    }
}

impl From<Vec<String>> for ThemeUrl {
    fn from(paths: Vec<String>) -> Self {
        ThemeUrl::Many(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_component_declarations() {
        let section = json!({
            "recentPosts": { "type": "blog_posts", "limit": 5 },
            "viewBag": { "title": "Hi" },
        });
        let decls = ComponentDecl::parse_all(Some(&section));

        let posts = decls.iter().find(|d| d.alias == "recentPosts").unwrap();
        assert_eq!(posts.kind, "blog_posts");
        assert_eq!(posts.properties.get("limit"), Some(&json!(5)));
        assert!(posts.properties.get("type").is_none());

        let bag = decls.iter().find(|d| d.alias == "viewBag").unwrap();
        assert_eq!(bag.kind, "viewBag");
    }

    #[test]
    fn test_asset_kind_parsing() {
        assert_eq!("JS".parse::<AssetKind>(), Ok(AssetKind::Js));
        assert_eq!("css".parse::<AssetKind>(), Ok(AssetKind::Css));
        assert!("woff".parse::<AssetKind>().is_err());
        assert_eq!(ContentFormat::from_extension("md"), Some(ContentFormat::Markdown));
        assert_eq!(ContentFormat::from_extension("png"), None);
    }
}
