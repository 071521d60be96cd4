use serde_json::Value;

use crate::models::Params;

/// 判断是否为绝对地址（带协议、协议相对或以斜杠开头）
pub fn is_absolute_url(path: &str) -> bool {
    path.starts_with('/') || path.contains("://")
}

/// 把模板参数转成可直接输出的字符串
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// 用参数替换文本中的 `{name}` 占位符，未提供的占位符保持原样
pub fn interpolate(text: &str, params: &Params) -> String {
    params.iter().fold(text.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{}}}", key), &value_to_string(value))
    })
}

/// 纯文本转 HTML：转义并把换行转成 `<br>`
pub fn text_to_html(text: &str) -> String {
    tera::escape_html(text).replace('\n', "<br>\n")
}

pub mod markdown;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_interpolate() {
        let mut params = Params::new();
        params.insert("name".to_string(), json!("Ada"));
        params.insert("count".to_string(), json!(3));
        assert_eq!(
            interpolate("Hi {name}, {count} new, {missing}", &params),
            "Hi Ada, 3 new, {missing}"
        );
    }

    #[test]
    fn test_text_to_html() {
        assert_eq!(text_to_html("a < b\nc"), "a &lt; b<br>\nc");
    }

    #[test]
    fn test_url_helpers() {
        assert!(is_absolute_url("https://cdn.example.com/a.js"));
        assert!(is_absolute_url("//cdn.example.com/a.js"));
        assert!(!is_absolute_url("assets/a.js"));
    }
}
