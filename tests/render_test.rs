// 使用临时站点目录验证完整的页面渲染流程

use std::fs;
use std::path::Path;

use rust_cms::cms::{CmsError, Component, ComponentRun, Controller, FlashBag, ObjectKind};
use rust_cms::Config;
use serde_json::Value;
use tempfile::TempDir;

struct Greeting;

impl Component for Greeting {
    fn name(&self) -> &str {
        "greeting"
    }

    fn default_markup(&self) -> Option<&str> {
        Some("<p>Hello {{ __SELF__.properties.who }}</p>")
    }

    fn on_run(&self, run: &mut ComponentRun) -> rust_cms::cms::error::Result<()> {
        run.add_css("assets/css/greeting.css");
        run.add_js("https://cdn.example.com/greet.js");
        if let Some(feed) = run.property("feed").and_then(Value::as_str).map(str::to_string) {
            run.add_rss(feed);
        }
        run.flash("info", format!("greeted by {}", run.alias));
        Ok(())
    }
}

const LAYOUT: &str = r#"---
components:
  viewBag:
    siteName: Example
---
<title>{{ this.page.title }} | {{ viewBag.siteName }}</title>
{{ styles() }}
{{ assets(type="rss") }}
<h1>{% if placeholder(name="heading") %}{{ placeholder(name="heading", default="Site") }}{% else %}Untitled{% endif %}</h1>
{% for message in flash() %}<p class="{{ message.type }}">{{ message.message }}</p>
{% endfor %}
{{ page() }}
<footer>{{ display_block(name="footer", default="Footer") }}</footer>
{{ scripts() }}
"#;

const ABOUT: &str = r#"---
title: About
url: /about
layout: default
components:
  greeting:
    who: visitors
    feed: /feed.xml
  fancy:
    type: greeting
    who: fans
---
{% filter put(name="heading") %}About {{ block_default() }}{% endfilter %}
{% filter put(name="styles") %}<link rel="preload" href="x.css">{% endfilter %}
<section>{{ component(name="greeting") }}</section>
<section>{{ component(name="fancy", who="override") }}</section>
{{ content(name="intro.md", who="readers") }}
{{ content(name="notice.txt") }}
{{ content(name="banner") }}
[{{ partial(name="missing") }}]
{{ partial(name="card", title="Card title") }}
<a id="post" href="{{ 'post' | page(slug='first') }}">post</a>
<img src="{{ 'assets/img/logo.png' | theme }}">
{% set bundle = ["assets/js/a.js", "assets/js/b.js"] %}<script src="{{ bundle | theme }}"></script>
"#;

const POST: &str = r#"---
title: Post
url: /blog/:slug
layout: default
---
<article>{{ this.param.slug }}</article>
<a id="self" href="{{ page_url(name='post') }}">self</a>
<a id="other" href="{{ page_url(name='post', slug='second') }}">other</a>
<a id="reset" href="{{ page_url(name='post', preserve=false) }}">reset</a>
{% filter put(name="footer") %}Post footer{% endfilter %}
{% filter put(name="footer") %} / more{% endfilter %}
"#;

const BROKEN: &str = r#"---
url: /broken
layout: default
---
{{ partial(name="ghost", throw=true) }}
"#;

const NOT_FOUND: &str = r#"---
title: Not found
url: /404
---
<p>Missing page</p>
"#;

fn write(root: &Path, relative: &str, body: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

fn site() -> (TempDir, Controller) {
    site_in("themes")
}

fn site_in(themes_dir: &str) -> (TempDir, Controller) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write(
        root,
        "config.yaml",
        &format!(
            "name: Test\napp_url: 'http://example.com/'\nactive_theme: test\nthemes_dir: '{}'\nenvironment: test\n",
            themes_dir
        ),
    );

    let theme = root.join(themes_dir).join("test");
    write(&theme, "theme.yaml", "name: Test theme\nauthor: Tester\n");
    write(&theme, "layouts/default.htm", LAYOUT);
    write(&theme, "pages/about.htm", ABOUT);
    write(&theme, "pages/post.htm", POST);
    write(&theme, "pages/broken.htm", BROKEN);
    write(&theme, "pages/404.htm", NOT_FOUND);
    write(&theme, "partials/card.htm", "<div class=\"card\">{{ title }}</div>");
    write(&theme, "partials/fancy/default.htm", "<em>{{ __SELF__.properties.who }}</em>");
    write(&theme, "content/intro.md", "Hi **{who}**");
    write(&theme, "content/notice.txt", "a < b\nsecond line");
    write(&theme, "content/banner.htm", "<div class=\"banner\">B</div>");

    let config = Config::load(root).unwrap();
    let mut controller = Controller::new(root, config).unwrap();
    controller.register_component(Greeting).unwrap();
    (tmp, controller)
}

#[test]
fn test_page_renders_inside_layout() {
    let (_tmp, controller) = site();
    let html = controller.run("/about").unwrap().unwrap();

    assert!(html.contains("<title>About | Example</title>"));
    assert!(html.contains("<h1>About Site</h1>"));
    assert!(html.contains("<section><p>Hello visitors</p></section>"));
    assert!(html.contains("<section><em>override</em></section>"));
    assert!(html.contains("<p>Hi <strong>readers</strong></p>"));
    assert!(html.contains("a &lt; b<br>\nsecond line"));
    assert!(html.contains("<div class=\"banner\">B</div>"));
    assert!(html.contains("[]"));
    assert!(html.contains("<div class=\"card\">Card title</div>"));
    assert!(html.contains("<a id=\"post\" href=\"http://example.com/blog/first\">"));
    assert!(html.contains("<img src=\"http://example.com/themes/test/assets/img/logo.png\">"));
    assert!(html.contains(
        "<script src=\"http://example.com/combine?theme=test&f=assets%2Fjs%2Fa.js&f=assets%2Fjs%2Fb.js\"></script>"
    ));
    assert!(html.contains("<footer>Footer</footer>"));
}

#[test]
fn test_theme_urls_do_not_depend_on_themes_dir() {
    let (_tmp, controller) = site_in("./site-themes");
    let html = controller.run("/about").unwrap().unwrap();

    assert!(html.contains("<img src=\"http://example.com/themes/test/assets/img/logo.png\">"));
    assert!(!html.contains("site-themes"));
}

#[test]
fn test_component_assets_and_flash_reach_layout() {
    let (_tmp, controller) = site();
    let html = controller.run("/about").unwrap().unwrap();

    let stylesheet = "<link rel=\"stylesheet\" \
        href=\"http:&#x2F;&#x2F;example.com&#x2F;themes&#x2F;test&#x2F;assets&#x2F;css&#x2F;greeting.css\">";
    assert_eq!(html.matches(stylesheet).count(), 1);
    assert!(html.contains("<link rel=\"preload\" href=\"x.css\">"));
    assert!(html.contains(
        "<link rel=\"alternate\" type=\"application/rss+xml\" title=\"RSS\" href=\"&#x2F;feed.xml\">"
    ));
    let script = "<script src=\"https:&#x2F;&#x2F;cdn.example.com&#x2F;greet.js\"></script>";
    assert_eq!(html.matches(script).count(), 1);
    assert!(html.contains("<p class=\"info\">greeted by greeting</p>"));
    assert!(html.contains("<p class=\"info\">greeted by fancy</p>"));
}

#[test]
fn test_flash_passed_by_caller() {
    let (_tmp, controller) = site();
    let mut flash = FlashBag::new();
    flash.add("error", "Saving failed");

    let html = controller.run_with_flash("/about", flash).unwrap().unwrap();
    assert!(html.contains("<p class=\"error\">Saving failed</p>"));
}

#[test]
fn test_route_parameters_and_page_urls() {
    let (_tmp, controller) = site();
    let html = controller.run("/blog/first").unwrap().unwrap();

    assert!(html.contains("<article>first</article>"));
    assert!(html.contains("<a id=\"self\" href=\"http://example.com/blog/first\">"));
    assert!(html.contains("<a id=\"other\" href=\"http://example.com/blog/second\">"));
    assert!(html.contains("<a id=\"reset\" href=\"\">"));
    assert!(html.contains("<h1>Untitled</h1>"));
    assert!(html.contains("<footer>Post footer / more</footer>"));
}

#[test]
fn test_block_render_interceptor_applies_to_layout_blocks() {
    let (_tmp, mut controller) = site();
    controller.on_block_render(|name: &str, content: &str| -> Option<String> {
        (name == "footer").then(|| content.to_uppercase())
    });

    let html = controller.run("/blog/first").unwrap().unwrap();
    assert!(html.contains("<footer>POST FOOTER / MORE</footer>"));

    // 区块不存在时输出默认内容，不经过拦截器
    let html = controller.run("/about").unwrap().unwrap();
    assert!(html.contains("<footer>Footer</footer>"));
}

#[test]
fn test_missing_partial_with_throw_surfaces_not_found() {
    let (_tmp, controller) = site();
    let err = controller.run("/broken").unwrap_err();

    assert!(err.is_not_found());
    assert!(matches!(
        err,
        CmsError::NotFound { kind: ObjectKind::Partial, ref name } if name == "ghost"
    ));
}

#[test]
fn test_unknown_url_and_not_found_page() {
    let (_tmp, controller) = site();
    assert!(controller.run("/nothing/here").unwrap().is_none());

    let html = controller.render_not_found().unwrap().unwrap();
    assert!(html.contains("<p>Missing page</p>"));
}

#[test]
fn test_routes_listing() {
    let (_tmp, controller) = site();
    let routes = controller.routes();
    assert!(routes.contains(&("post".to_string(), "/blog/:slug".to_string())));
    assert!(routes.contains(&("about".to_string(), "/about".to_string())));
}
