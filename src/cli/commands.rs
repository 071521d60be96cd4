use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use rust_cms::cms::{Controller, FlashBag};
use rust_cms::core::Server;
use rust_cms::models::Config;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// 指定站点目录
    #[arg(short, long, default_value = ".")]
    pub path: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 初始化新的站点和示例主题
    Init(InitArgs),

    /// 渲染指定 URL 的页面
    Render(RenderArgs),

    /// 列出页面路由
    Routes,

    /// 启动本地服务器
    Serve(ServeArgs),
}

#[derive(Args)]
pub struct InitArgs {
    /// 站点目录名称
    #[arg(value_name = "NAME")]
    pub name: String,

    /// 站点名称
    #[arg(short, long)]
    pub title: Option<String>,
}

#[derive(Args)]
pub struct RenderArgs {
    /// 页面 URL
    #[arg(default_value = "/")]
    pub url: String,

    /// 输出文件，默认输出到标准输出
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// 附加闪存消息，格式为 `类型:消息`
    #[arg(long = "flash", value_name = "TYPE:MESSAGE")]
    pub flash: Vec<String>,
}

#[derive(Args)]
pub struct ServeArgs {
    /// 服务器端口
    #[arg(short, long, default_value = "8080")]
    pub port: u16,

    /// 监视主题目录并自动重新加载
    #[arg(short, long)]
    pub watch: bool,
}

/// 执行命令
pub async fn execute(cli: Cli) -> Result<()> {
    let site_path = cli.path.clone();

    match cli.command {
        Commands::Init(args) => {
            let site_path = site_path.join(&args.name);
            if site_path.exists() && site_path.read_dir()?.next().is_some() {
                anyhow::bail!("目录不为空: {}", site_path.display());
            }

            let title = args.title.unwrap_or_else(|| args.name.clone());
            initialize_site_structure(&site_path, &title)?;
            info!("Initialized new site at: {}", site_path.display());
            println!("{} {}", "Created".bright_green(), site_path.display());
        }
        Commands::Render(args) => {
            let controller = load_controller(&site_path)?;
            let mut flash = FlashBag::new();
            for entry in &args.flash {
                let (kind, message) = entry.split_once(':').unwrap_or(("info", entry.as_str()));
                flash.add(kind, message);
            }

            let html = match controller.run_with_flash(&args.url, flash)? {
                Some(html) => html,
                None => {
                    eprintln!("{} {}", "No page matches".yellow(), args.url);
                    controller
                        .render_not_found()?
                        .with_context(|| format!("没有与 {} 匹配的页面", args.url))?
                }
            };

            match args.output {
                Some(path) => {
                    fs::write(&path, html)
                        .with_context(|| format!("写入文件失败: {}", path.display()))?;
                    println!("{} {}", "Wrote".bright_green(), path.display());
                }
                None => println!("{}", html),
            }
        }
        Commands::Routes => {
            let controller = load_controller(&site_path)?;
            println!("{}", format!("Theme: {}", controller.theme().info.name).bright_white());
            for (page, pattern) in controller.routes() {
                println!("  {:<30} {}", pattern.bright_cyan(), page);
            }
        }
        Commands::Serve(args) => {
            let controller = load_controller(&site_path)?;
            Server::new(site_path, controller, args.port)
                .with_watch(args.watch)
                .start()
                .await?;
        }
    }

    Ok(())
}

fn load_controller(site_path: &Path) -> Result<Controller> {
    let config = Config::load(site_path)
        .with_context(|| format!("加载配置失败: {}", site_path.display()))?;
    let controller = Controller::new(site_path, config)
        .with_context(|| format!("加载主题失败: {}", site_path.display()))?;
    Ok(controller)
}

// 嵌入的示例主题
mod demo_theme {
    pub const THEME_YAML: &str = r#"name: Demo
description: Example theme for Rust CMS
author: Rust CMS
"#;

    pub const LAYOUT_DEFAULT: &str = r##"---
description: Default layout
---
<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{{ this.page.title }}</title>
    <link rel="stylesheet" href="{{ 'assets/css/theme.css' | theme }}">
    {{ styles() }}
</head>
<body>
    {{ partial(name="nav") }}
    {% for message in flash() %}
    <div class="flash flash-{{ message.type }}">{{ message.message }}</div>
    {% endfor %}
    <main>{{ page() }}</main>
    <footer>{{ display_block(name="footer", default="Powered by Rust CMS") }}</footer>
    {{ scripts() }}
</body>
</html>
"##;

    pub const PAGE_HOME: &str = r##"---
title: Home
url: /
layout: default
components:
  viewBag:
    tagline: Pages, partials and placeholders
---
<h1>{{ this.page.title }}</h1>
<p>{{ viewBag.tagline }}</p>
{{ content(name="welcome.md", name_of_site="Rust CMS") }}
<p><a href="{{ 'blog-post' | page(slug='hello-world') }}">Read the first post</a></p>
{% filter put(name="scripts") %}<script src="{{ 'assets/js/app.js' | theme }}"></script>{% endfilter %}
"##;

    pub const PAGE_BLOG_POST: &str = r##"---
title: Blog post
url: /blog/:slug
layout: default
---
<h1>{{ this.param.slug }}</h1>
{% filter put(name="footer", overwrite=true) %}{{ block_default() }} / post{% endfilter %}
"##;

    pub const PAGE_404: &str = r##"---
title: Page not found
url: /404
layout: default
---
<h1>Page not found</h1>
<p><a href="{{ 'home' | page }}">Back home</a></p>
"##;

    pub const PARTIAL_NAV: &str = r##"<nav>
    <a href="{{ page_url(name='home') }}">Home</a>
</nav>
"##;

    pub const CONTENT_WELCOME: &str = r#"Welcome to **{name_of_site}**. Edit `content/welcome.md` to change this text.
"#;

    pub const THEME_CSS: &str = "body { font-family: sans-serif; }\n";

    pub const APP_JS: &str = "console.log('Rust CMS demo theme');\n";
}

// 初始化站点文件结构，包括配置和示例主题
fn initialize_site_structure(site_path: &Path, site_title: &str) -> Result<()> {
    let config = Config {
        name: site_title.to_string(),
        active_theme: "demo".to_string(),
        environment: "dev".to_string(),
        debug: true,
        ..Config::default()
    };
    let theme_dir = config.theme_path(site_path);
    let files: [(&str, &str); 9] = [
        ("theme.yaml", demo_theme::THEME_YAML),
        ("layouts/default.htm", demo_theme::LAYOUT_DEFAULT),
        ("pages/home.htm", demo_theme::PAGE_HOME),
        ("pages/blog-post.htm", demo_theme::PAGE_BLOG_POST),
        ("pages/404.htm", demo_theme::PAGE_404),
        ("partials/nav.htm", demo_theme::PARTIAL_NAV),
        ("content/welcome.md", demo_theme::CONTENT_WELCOME),
        ("assets/css/theme.css", demo_theme::THEME_CSS),
        ("assets/js/app.js", demo_theme::APP_JS),
    ];

    for (relative, body) in files {
        let path = theme_dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, body)?;
    }

    config.save_to_file(&site_path.join("config.yaml"))?;
    Ok(())
}
