use chrono::DateTime;
use std::collections::HashMap;
use tera::Tera;
use tracing::debug;

use crate::cms::error::{CmsError, Result};
use crate::theme::Theme;
use crate::utils::markdown;

/// 主题模板的基础 Tera 实例
///
/// 只包含主题模板和通用过滤器。每次渲染时克隆一份，再注册绑定到该次渲染的扩展函数。
#[derive(Clone)]
pub struct ThemeRenderer {
    /// 模板引擎
    pub tera: Tera,
}

impl ThemeRenderer {
    /// 创建新的主题渲染器
    ///
    /// `extra` 为主题之外的模板，例如组件自带的默认视图。
    pub fn new(theme: &Theme, extra: Vec<(String, String)>) -> Result<Self> {
        let mut tera = Tera::default();
        let mut templates = theme.templates();
        templates.extend(extra);

        debug!("注册 {} 个模板", templates.len());
        tera.add_raw_templates(templates)
            .map_err(|e| CmsError::from_render(&theme.code, e))?;

        Self::register_filters(&mut tera);
        Ok(ThemeRenderer { tera })
    }

    /// 注册模板过滤器
    fn register_filters(tera: &mut Tera) {
        // 注册日期格式化过滤器
        tera.register_filter("date_format", Self::date_format_filter);
        // 注册Markdown过滤器，变量中的原始 HTML 会被转义
        tera.register_filter("markdown", Self::markdown_filter);
    }

    fn date_format_filter(value: &tera::Value, args: &HashMap<String, tera::Value>) -> tera::Result<tera::Value> {
        if let Some(date) = value.as_str().and_then(|s| DateTime::parse_from_rfc3339(s).ok()) {
            let format = args.get("format")
                .and_then(|f| f.as_str())
                .unwrap_or("%Y-%m-%d");
            Ok(tera::Value::String(date.format(format).to_string()))
        } else {
            Ok(value.clone())
        }
    }

    fn markdown_filter(value: &tera::Value, _args: &HashMap<String, tera::Value>) -> tera::Result<tera::Value> {
        match value.as_str() {
            Some(text) => Ok(tera::Value::String(markdown::render_safe(text))),
            None => Ok(value.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_date_format_filter() {
        let mut args = HashMap::new();
        args.insert("format".to_string(), json!("%d/%m/%Y"));
        let value = ThemeRenderer::date_format_filter(&json!("2024-03-05T10:00:00+00:00"), &args).unwrap();
        assert_eq!(value, json!("05/03/2024"));

        let untouched = ThemeRenderer::date_format_filter(&json!("yesterday"), &HashMap::new()).unwrap();
        assert_eq!(untouched, json!("yesterday"));
    }

    #[test]
    fn test_markdown_filter() {
        let value = ThemeRenderer::markdown_filter(&json!("**bold** <b>x</b>"), &HashMap::new()).unwrap();
        let html = value.as_str().unwrap();
        assert!(html.contains("<strong>bold</strong>"));
        assert!(html.contains("&lt;b&gt;x&lt;/b&gt;"));
    }
}
