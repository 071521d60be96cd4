use pulldown_cmark::{html, Event, Options, Parser};

fn options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options
}

/// 渲染主题内容文件，保留其中的原始 HTML
pub fn render(markdown: &str) -> String {
    let mut output = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut output, Parser::new_ext(markdown, options()));
    output
}

/// 渲染模板变量中的 Markdown，原始 HTML 作为文本输出
pub fn render_safe(markdown: &str) -> String {
    let events = Parser::new_ext(markdown, options()).map(|event| match event {
        Event::Html(raw) => Event::Text(raw),
        other => other,
    });

    let mut output = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut output, events);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_keeps_inline_html() {
        let html = render("Hi <span>there</span> **you**");
        assert_eq!(html, "<p>Hi <span>there</span> <strong>you</strong></p>\n");
    }

    #[test]
    fn test_render_safe_escapes_inline_html() {
        let html = render_safe("Hi <script>x()</script>");
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
    }
}
