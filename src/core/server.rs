use anyhow::{anyhow, Result};
use axum::{
    extract::{RawQuery, State},
    http::{header, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs;
use std::net::SocketAddr;
use std::path::{Component as PathComponent, Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::cms::{CmsError, Controller};
use crate::models::THEMES_URL_PREFIX;
use crate::theme::Theme;

type SharedController = Arc<RwLock<Arc<Controller>>>;

#[derive(Clone)]
struct AppState {
    controller: SharedController,
}

impl AppState {
    fn current(&self) -> Arc<Controller> {
        match self.controller.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// HTTP 服务器
pub struct Server {
    /// 站点目录
    base_dir: PathBuf,
    /// 端口
    port: u16,
    /// 当前控制器，主题重新加载时整体替换
    controller: SharedController,
    /// 是否监视主题目录并自动重新加载
    watch: bool,
}

impl Server {
    /// 创建新的服务器
    pub fn new(base_dir: PathBuf, controller: Controller, port: u16) -> Self {
        Self {
            base_dir,
            port,
            controller: Arc::new(RwLock::new(Arc::new(controller))),
            watch: false,
        }
    }

    pub fn with_watch(mut self, watch: bool) -> Self {
        self.watch = watch;
        self
    }

    /// 构建路由：主题资源、合并资源，其余请求交给页面控制器
    pub fn router(&self) -> Router {
        let state = AppState {
            controller: self.controller.clone(),
        };
        let controller = state.current();
        let theme = controller.theme();
        let assets_path = format!("{}/{}/assets", THEMES_URL_PREFIX, theme.code);
        debug!("主题资源路径: {} -> {}", assets_path, theme.assets_dir().display());

        Router::new()
            .route("/combine", get(combine_assets))
            .nest_service(&assets_path, ServeDir::new(theme.assets_dir()))
            .fallback(render_page)
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// 启动服务器
    pub async fn start(self) -> Result<()> {
        if self.watch {
            self.spawn_watcher()?;
        }

        let app = self.router();

        // 启动HTTP服务器
        let addr: SocketAddr = format!("0.0.0.0:{}", self.port).parse()?;
        info!("Server started at http://localhost:{}", self.port);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// 监视主题目录，文件变化后重新加载控制器
    fn spawn_watcher(&self) -> Result<()> {
        let theme_dir = {
            let guard = self
                .controller
                .read()
                .map_err(|_| anyhow!("控制器锁已损坏"))?;
            guard.theme().dir.clone()
        };

        let (tx, rx) = mpsc::channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(e) => warn!("监视错误: {:?}", e),
            },
            NotifyConfig::default(),
        )
        .map_err(|e| anyhow!("创建文件监视器失败: {}", e))?;
        watcher.watch(&theme_dir, RecursiveMode::Recursive)?;
        info!("正在监控主题目录: {}", theme_dir.display());

        let shared = self.controller.clone();
        let base_dir = self.base_dir.clone();
        std::thread::spawn(move || {
            // 监视器随线程存活
            let _watcher = watcher;
            while let Ok(event) = rx.recv() {
                debug!("收到文件事件: {:?}", event.paths);
                // 合并短时间内的连续事件
                while rx.recv_timeout(Duration::from_millis(200)).is_ok() {}
                reload(&shared, &base_dir);
            }
        });
        Ok(())
    }
}

fn reload(shared: &SharedController, base_dir: &Path) {
    let current = match shared.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    };
    match current.reload(base_dir) {
        Ok(controller) => {
            let mut guard = match shared.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *guard = Arc::new(controller);
            info!("主题已重新加载");
        }
        Err(e) => error!("重新加载主题失败，继续使用旧版本: {}", e),
    }
}

async fn render_page(State(state): State<AppState>, uri: Uri) -> Response {
    let controller = state.current();
    let path = uri.path().to_string();

    let result = tokio::task::spawn_blocking(move || -> Result<(StatusCode, String), CmsError> {
        match controller.run(&path)? {
            Some(html) => Ok((StatusCode::OK, html)),
            None => {
                let body = controller
                    .render_not_found()?
                    .unwrap_or_else(|| "Page not found".to_string());
                Ok((StatusCode::NOT_FOUND, body))
            }
        }
    })
    .await;

    match result {
        Ok(Ok((status, html))) => (status, Html(html)).into_response(),
        Ok(Err(e)) => {
            error!("页面渲染失败: {}", e);
            let mut source = std::error::Error::source(&e);
            while let Some(cause) = source {
                error!("Caused by: {}", cause);
                source = cause.source();
            }
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
        Err(e) => {
            error!("渲染任务失败: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn combine_assets(State(state): State<AppState>, RawQuery(query): RawQuery) -> Response {
    let controller = state.current();
    match combine(controller.theme(), query.as_deref().unwrap_or_default()) {
        Ok((content_type, body)) => ([(header::CONTENT_TYPE, content_type)], body).into_response(),
        Err(status) => status.into_response(),
    }
}

/// 按 `theme=<主题>&f=<路径>&f=<路径>` 拼接主题中的同类文件
pub fn combine(theme: &Theme, query: &str) -> Result<(&'static str, String), StatusCode> {
    let mut files = Vec::new();
    let mut theme_code = None;
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "theme" => theme_code = Some(value.into_owned()),
            "f" => files.push(value.into_owned()),
            _ => {}
        }
    }

    if theme_code.as_deref() != Some(theme.code.as_str()) || files.is_empty() {
        return Err(StatusCode::NOT_FOUND);
    }

    let extension = extension_of(&files[0]);
    let content_type = match extension.as_deref() {
        Some("css") => "text/css; charset=utf-8",
        Some("js") => "application/javascript; charset=utf-8",
        _ => {
            warn!("拒绝合并非 css/js 资源: {}", files[0]);
            return Err(StatusCode::BAD_REQUEST);
        }
    };

    let mut body = String::new();
    for file in &files {
        let relative = Path::new(file);
        // 只允许主题 assets 目录下的文件
        let escapes = !relative.starts_with("assets")
            || relative
                .components()
                .any(|c| !matches!(c, PathComponent::Normal(_)));
        if escapes || extension_of(file) != extension {
            warn!("拒绝合并资源: {}", file);
            return Err(StatusCode::BAD_REQUEST);
        }

        let content = fs::read_to_string(theme.dir.join(relative)).map_err(|e| {
            debug!("读取资源 {} 失败: {}", file, e);
            StatusCode::NOT_FOUND
        })?;
        body.push_str(&content);
        if !body.ends_with('\n') {
            body.push('\n');
        }
    }

    Ok((content_type, body))
}

fn extension_of(file: &str) -> Option<String> {
    Path::new(file)
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn theme() -> (TempDir, Theme) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("demo");
        fs::create_dir_all(root.join("assets/css")).unwrap();
        fs::write(root.join("assets/css/a.css"), "a{}").unwrap();
        fs::write(root.join("assets/css/b.css"), "b{}\n").unwrap();
        fs::write(root.join("assets/app.js"), "x()").unwrap();
        fs::write(root.join("assets/notes.txt"), "notes").unwrap();
        fs::create_dir_all(root.join("pages")).unwrap();
        fs::write(root.join("pages/home.htm"), "---\nurl: /\n---\nSECRET\n").unwrap();
        fs::write(root.join("pages/theme.css"), "x{}").unwrap();
        fs::write(root.join("theme.yaml"), "name: t\n").unwrap();
        let theme = Theme::load(&root).unwrap();
        (tmp, theme)
    }

    #[test]
    fn test_combine_concatenates_files() {
        let (_tmp, theme) = theme();
        let (content_type, body) =
            combine(&theme, "theme=demo&f=assets%2Fcss%2Fa.css&f=assets/css/b.css").unwrap();
        assert_eq!(content_type, "text/css; charset=utf-8");
        assert_eq!(body, "a{}\nb{}\n");
    }

    #[test]
    fn test_combine_rejects_bad_requests() {
        let (_tmp, theme) = theme();
        assert_eq!(combine(&theme, "theme=other&f=assets/css/a.css"), Err(StatusCode::NOT_FOUND));
        assert_eq!(combine(&theme, "theme=demo"), Err(StatusCode::NOT_FOUND));
        assert_eq!(
            combine(&theme, "theme=demo&f=assets/css/a.css&f=assets/app.js"),
            Err(StatusCode::BAD_REQUEST)
        );
        assert_eq!(
            combine(&theme, "theme=demo&f=../secret.css"),
            Err(StatusCode::BAD_REQUEST)
        );
        assert_eq!(
            combine(&theme, "theme=demo&f=assets/css/missing.css"),
            Err(StatusCode::NOT_FOUND)
        );
    }

    #[test]
    fn test_combine_only_serves_asset_files() {
        let (_tmp, theme) = theme();
        assert_eq!(combine(&theme, "theme=demo&f=pages/home.htm"), Err(StatusCode::BAD_REQUEST));
        assert_eq!(combine(&theme, "theme=demo&f=theme.yaml"), Err(StatusCode::BAD_REQUEST));
        assert_eq!(combine(&theme, "theme=demo&f=pages/theme.css"), Err(StatusCode::BAD_REQUEST));
        assert_eq!(combine(&theme, "theme=demo&f=assets/notes.txt"), Err(StatusCode::BAD_REQUEST));
        assert_eq!(
            combine(&theme, "theme=demo&f=assets/css/a.css&f=pages/b.css"),
            Err(StatusCode::BAD_REQUEST)
        );
    }
}
