use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::cms::error::{CmsError, Result};
use crate::models::Params;
use crate::theme::Theme;
use crate::utils::value_to_string;

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Param {
        name: String,
        optional: bool,
        default: Option<String>,
        constraint: Option<Regex>,
    },
}

/// 页面 URL 模式
///
/// 支持的片段：`literal`、`:name`、`:name?`（可选）、`:name?default`（带默认值）、
/// `:name|regex`（正则约束）。
#[derive(Debug, Clone)]
pub struct UrlPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl UrlPattern {
    pub fn parse(raw: &str) -> Result<Self> {
        let segments = split_path(raw)
            .map(|part| match part.strip_prefix(':') {
                Some(param) => parse_param(raw, param),
                None => Ok(Segment::Literal(part.to_string())),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(UrlPattern {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// 匹配 URL，成功时返回路由参数
    pub fn matches(&self, url: &str) -> Option<Params> {
        let parts: Vec<&str> = split_path(url).collect();
        if parts.len() > self.segments.len() {
            return None;
        }

        let mut params = Params::new();
        for (index, segment) in self.segments.iter().enumerate() {
            let part = parts.get(index).copied();
            match segment {
                Segment::Literal(literal) => {
                    if part != Some(literal.as_str()) {
                        return None;
                    }
                }
                Segment::Param {
                    name,
                    optional,
                    default,
                    constraint,
                } => {
                    let value = match part {
                        Some(part) => {
                            if let Some(constraint) = constraint {
                                if !constraint.is_match(part) {
                                    return None;
                                }
                            }
                            part.to_string()
                        }
                        None if *optional => default.clone().unwrap_or_default(),
                        None => return None,
                    };
                    params.insert(name.clone(), Value::String(value));
                }
            }
        }
        Some(params)
    }

    /// 用参数生成 URL，缺少必填参数时返回 `None`
    pub fn build(&self, params: &Params) -> Option<String> {
        let mut parts: Vec<Option<String>> = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(literal) => parts.push(Some(literal.clone())),
                Segment::Param {
                    name,
                    optional,
                    default,
                    ..
                } => {
                    let value = params
                        .get(name)
                        .map(value_to_string)
                        .filter(|v| !v.is_empty())
                        .or_else(|| default.clone());
                    match value {
                        Some(value) => parts.push(Some(value)),
                        None if *optional => parts.push(None),
                        None => return None,
                    }
                }
            }
        }

        while matches!(parts.last(), Some(None)) {
            parts.pop();
        }
        let parts = parts.into_iter().collect::<Option<Vec<_>>>()?;
        Some(format!("/{}", parts.join("/")))
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|part| !part.is_empty())
}

fn parse_param(raw: &str, param: &str) -> Result<Segment> {
    let (head, constraint) = match param.split_once('|') {
        Some((head, pattern)) => {
            let regex = Regex::new(pattern).map_err(|e| {
                CmsError::Theme(format!("URL 模式 {} 中的正则无效: {}", raw, e))
            })?;
            (head, Some(regex))
        }
        None => (param, None),
    };

    let (name, optional, default) = match head.split_once('?') {
        Some((name, default)) => (
            name,
            true,
            (!default.is_empty()).then(|| default.to_string()),
        ),
        None => (head, false, None),
    };

    if name.is_empty() {
        return Err(CmsError::Theme(format!("URL 模式 {} 中存在空参数名", raw)));
    }

    Ok(Segment::Param {
        name: name.to_string(),
        optional,
        default,
        constraint,
    })
}

/// 页面路由表
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<(String, UrlPattern)>,
}

impl Router {
    /// 按页面名称顺序构建路由表
    pub fn from_theme(theme: &Theme) -> Result<Self> {
        let mut router = Router::default();
        for page in theme.pages() {
            router.add(&page.name, &page.url)?;
        }
        Ok(router)
    }

    pub fn add(&mut self, page: &str, pattern: &str) -> Result<()> {
        debug!("注册路由: {} -> {}", pattern, page);
        self.routes.push((page.to_string(), UrlPattern::parse(pattern)?));
        Ok(())
    }

    /// 查找与 URL 匹配的页面，返回页面名称和路由参数
    pub fn find(&self, url: &str) -> Option<(&str, Params)> {
        self.routes
            .iter()
            .find_map(|(page, pattern)| pattern.matches(url).map(|params| (page.as_str(), params)))
    }

    /// 生成指定页面的 URL
    pub fn url(&self, page: &str, params: &Params) -> Option<String> {
        self.routes
            .iter()
            .find(|(name, _)| name == page)
            .and_then(|(_, pattern)| pattern.build(params))
    }

    /// 全部路由（页面名称，URL 模式）
    pub fn routes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.routes.iter().map(|(page, pattern)| (page.as_str(), pattern.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, Value)]) -> Params {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_match_literal_and_params() {
        let pattern = UrlPattern::parse("/blog/:slug").unwrap();
        let matched = pattern.matches("/blog/hello-world/").unwrap();
        assert_eq!(matched.get("slug"), Some(&json!("hello-world")));
        assert!(pattern.matches("/blog").is_none());
        assert!(pattern.matches("/news/hello").is_none());
        assert!(pattern.matches("/blog/a/b").is_none());
    }

    #[test]
    fn test_optional_and_default_params() {
        let pattern = UrlPattern::parse("/archive/:year?/:page?1").unwrap();
        let matched = pattern.matches("/archive").unwrap();
        assert_eq!(matched.get("year"), Some(&json!("")));
        assert_eq!(matched.get("page"), Some(&json!("1")));

        let matched = pattern.matches("/archive/2024/3").unwrap();
        assert_eq!(matched.get("year"), Some(&json!("2024")));
        assert_eq!(matched.get("page"), Some(&json!("3")));
    }

    #[test]
    fn test_regex_constraint() {
        let pattern = UrlPattern::parse("/post/:id|^[0-9]+$").unwrap();
        assert!(pattern.matches("/post/42").is_some());
        assert!(pattern.matches("/post/abc").is_none());
        assert!(UrlPattern::parse("/post/:id|([").is_err());
    }

    #[test]
    fn test_build_urls() {
        let pattern = UrlPattern::parse("/blog/:category?/:slug?").unwrap();
        assert_eq!(pattern.build(&Params::new()).as_deref(), Some("/blog"));
        assert_eq!(
            pattern.build(&params(&[("category", json!("rust"))])).as_deref(),
            Some("/blog/rust")
        );

        let required = UrlPattern::parse("/post/:id").unwrap();
        assert_eq!(required.build(&Params::new()), None);
        assert_eq!(
            required.build(&params(&[("id", json!(7))])).as_deref(),
            Some("/post/7")
        );

        let home = UrlPattern::parse("/").unwrap();
        assert_eq!(home.build(&Params::new()).as_deref(), Some("/"));
        assert!(home.matches("/").is_some());
    }

    #[test]
    fn test_router_first_match_wins() {
        let mut router = Router::default();
        router.add("blog-archive", "/blog/archive").unwrap();
        router.add("blog-post", "/blog/:slug").unwrap();

        assert_eq!(router.find("/blog/archive").map(|(page, _)| page), Some("blog-archive"));
        assert_eq!(router.find("/blog/first").map(|(page, _)| page), Some("blog-post"));
        assert!(router.find("/missing").is_none());
        assert_eq!(
            router.url("blog-post", &params(&[("slug", json!("first"))])).as_deref(),
            Some("/blog/first")
        );
        assert_eq!(router.url("unknown", &Params::new()), None);
    }
}
