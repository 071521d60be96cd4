use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use tracing::error;
use tracing_subscriber::fmt;

mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志系统，日志输出到标准错误，标准输出留给渲染结果
    fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // 解析命令行参数
    let cli = cli::Cli::parse();

    // 打印欢迎信息
    eprintln!("{}", "
 ____           _      ____ __  __ ____
|  _ \\ _   _ __| |_   / ___|  \\/  / ___|
| |_) | | | / _` __| | |   | |\\/| \\___ \\
|  _ <| |_| \\__ \\ |_  | |___| |  | |___) |
|_| \\_\\\\__,_|___/\\__|  \\____|_|  |_|____/
    ".bright_cyan());

    eprintln!("{} {}", "Rust-CMS".bright_cyan(), env!("CARGO_PKG_VERSION").bright_green());
    eprintln!("{}", "Theme pages, partials and placeholders rendered with Tera".bright_white());
    eprintln!();

    // 执行命令
    if let Err(e) = cli::execute(cli).await {
        error!("Error: {}", e);

        // 打印错误链
        for cause in e.chain().skip(1) {
            error!("Caused by: {}", cause);
        }

        std::process::exit(1);
    }

    Ok(())
}
