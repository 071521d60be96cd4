use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tera::Tera;
use tracing::{debug, info, warn};

use crate::cms::assets::AssetRegistry;
use crate::cms::blocks::SharedBlocks;
use crate::cms::components::{Component, ComponentManager, ComponentRun};
use crate::cms::error::{CmsError, ObjectKind, Result};
use crate::cms::extension::BridgeExtension;
use crate::cms::flash::{FlashBag, FlashMessage};
use crate::cms::hooks::{BlockInterceptor, BlockInterceptors};
use crate::cms::router::Router;
use crate::models::{
    AssetKind, ComponentDecl, Config, ContentFormat, Layout, Page, Params, ThemeUrl, THEMES_URL_PREFIX,
};
use crate::theme::{Theme, ThemeRenderer};
use crate::utils::{interpolate, is_absolute_url, markdown, text_to_html};

/// 页面控制器能力接口，渲染桥接扩展的全部转发目标
pub trait PageController: Send + Sync {
    /// 输出当前页面已渲染的内容
    fn render_page(&self) -> Result<String>;

    /// 渲染局部模板
    fn render_partial(&self, name: &str, params: &Params, throw_on_missing: bool) -> Result<String>;

    /// 渲染静态内容
    fn render_content(&self, name: &str, params: &Params) -> Result<String>;

    /// 渲染组件默认视图
    fn render_component(&self, name: &str, params: &Params) -> Result<String>;

    /// 生成资源标签
    fn make_assets(&self, kind: Option<AssetKind>) -> Option<String>;

    /// 生成页面地址
    fn page_url(&self, name: &str, params: &Params, preserve_route_params: bool) -> Option<String>;

    /// 生成主题资源地址
    fn theme_url(&self, url: &ThemeUrl) -> String;

    /// 读取并删除闪存消息
    fn flash(&self, _kind: Option<&str>) -> Vec<FlashMessage> {
        Vec::new()
    }
}

/// 站点级控制器：持有主题、路由和组件，每个请求创建一个 [`RenderPass`]
#[derive(Clone)]
pub struct Controller {
    config: Arc<Config>,
    theme: Arc<Theme>,
    renderer: ThemeRenderer,
    router: Arc<Router>,
    components: Arc<ComponentManager>,
    interceptors: Arc<BlockInterceptors>,
}

impl Controller {
    /// 加载当前主题并创建控制器
    pub fn new(base_dir: &Path, config: Config) -> Result<Self> {
        Self::with_parts(
            base_dir,
            config,
            Arc::new(ComponentManager::new()),
            Arc::new(BlockInterceptors::new()),
        )
    }

    fn with_parts(
        base_dir: &Path,
        config: Config,
        components: Arc<ComponentManager>,
        interceptors: Arc<BlockInterceptors>,
    ) -> Result<Self> {
        let theme = Theme::load(&config.theme_path(base_dir))?;
        let renderer = ThemeRenderer::new(&theme, components.view_templates())?;
        let router = Router::from_theme(&theme)?;

        Ok(Controller {
            config: Arc::new(config),
            theme: Arc::new(theme),
            renderer,
            router: Arc::new(router),
            components,
            interceptors,
        })
    }

    /// 重新加载主题，保留已注册的组件和拦截器
    pub fn reload(&self, base_dir: &Path) -> Result<Self> {
        info!("重新加载主题: {}", self.theme.code);
        Self::with_parts(
            base_dir,
            (*self.config).clone(),
            self.components.clone(),
            self.interceptors.clone(),
        )
    }

    /// 注册组件
    pub fn register_component<C>(&mut self, component: C) -> Result<()>
    where
        C: Component + 'static,
    {
        if let Some(markup) = component.default_markup() {
            let name = ComponentManager::view_template_name(component.name());
            self.renderer
                .tera
                .add_raw_template(&name, markup)
                .map_err(|e| CmsError::from_render(&name, e))?;
        }
        Arc::make_mut(&mut self.components).register(component);
        Ok(())
    }

    /// 注册 `block.render` 拦截器，按注册顺序执行
    pub fn on_block_render<I>(&mut self, interceptor: I)
    where
        I: BlockInterceptor + 'static,
    {
        Arc::make_mut(&mut self.interceptors).register(interceptor);
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    /// 全部路由（页面名称，URL 模式）
    pub fn routes(&self) -> Vec<(String, String)> {
        self.router
            .routes()
            .map(|(page, pattern)| (page.to_string(), pattern.to_string()))
            .collect()
    }

    /// 渲染与 URL 匹配的页面，没有匹配的页面时返回 `None`
    pub fn run(&self, url: &str) -> Result<Option<String>> {
        self.run_with_flash(url, FlashBag::new())
    }

    pub fn run_with_flash(&self, url: &str, flash: FlashBag) -> Result<Option<String>> {
        match self.router.find(url) {
            Some((page, params)) => {
                debug!("URL {} 匹配页面 {}", url, page);
                self.run_page(page, params, flash).map(Some)
            }
            None => {
                info!("没有与 {} 匹配的页面", url);
                Ok(None)
            }
        }
    }

    /// 渲染配置中的 404 页面，主题中没有时返回 `None`
    pub fn render_not_found(&self) -> Result<Option<String>> {
        match self.config.not_found_page.as_deref() {
            Some(name) if self.theme.page(name).is_some() => {
                self.run_page(name, Params::new(), FlashBag::new()).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// 使用给定的路由参数渲染指定页面
    pub fn run_page(&self, name: &str, route_params: Params, flash: FlashBag) -> Result<String> {
        let page = self
            .theme
            .page(name)
            .ok_or_else(|| CmsError::not_found(ObjectKind::Page, name))?
            .clone();
        let layout = match page.layout.as_deref() {
            Some(layout) => Some(
                self.theme
                    .layout(layout)
                    .ok_or_else(|| CmsError::not_found(ObjectKind::Layout, layout))?
                    .clone(),
            ),
            None => None,
        };

        info!("渲染页面: {}", page.name);
        let pass = RenderPass::new(self, page, layout, route_params, flash);
        pass.execute()
    }
}

/// 单次页面渲染
///
/// 持有本次渲染的区块、资源、闪存消息和页面变量，渲染结束即释放。
/// 其中的 Tera 实例注册了指回自身（弱引用）的 [`BridgeExtension`]。
pub struct RenderPass {
    tera: Tera,
    config: Arc<Config>,
    theme: Arc<Theme>,
    router: Arc<Router>,
    components: Arc<ComponentManager>,
    page: Page,
    layout: Option<Layout>,
    route_params: Params,
    blocks: SharedBlocks,
    vars: Mutex<Params>,
    page_contents: Mutex<Option<String>>,
    assets: Mutex<AssetRegistry>,
    flash: Mutex<FlashBag>,
}

impl RenderPass {
    pub fn new(
        controller: &Controller,
        page: Page,
        layout: Option<Layout>,
        route_params: Params,
        flash: FlashBag,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<RenderPass>| {
            let blocks = SharedBlocks::new();
            let handle: Weak<dyn PageController> = weak.clone();
            let mut tera = controller.renderer.tera.clone();
            BridgeExtension::new(handle, blocks.clone(), controller.interceptors.clone())
                .register(&mut tera);

            RenderPass {
                tera,
                config: controller.config.clone(),
                theme: controller.theme.clone(),
                router: controller.router.clone(),
                components: controller.components.clone(),
                page,
                layout,
                route_params,
                blocks,
                vars: Mutex::new(Params::new()),
                page_contents: Mutex::new(None),
                assets: Mutex::new(AssetRegistry::new()),
                flash: Mutex::new(flash),
            }
        })
    }

    /// 执行组件、渲染页面，再渲染布局
    pub fn execute(self: &Arc<Self>) -> Result<String> {
        self.run_components()?;

        let contents = self.render_template(&self.page.template_name(), self.base_context())?;
        *lock(&self.page_contents) = Some(contents.clone());

        let result = match &self.layout {
            Some(layout) => self.render_template(&layout.template_name(), self.base_context())?,
            None => contents,
        };

        if self.blocks.lock().has_open_blocks() {
            warn!("页面 {} 渲染结束时仍有未关闭的区块", self.page.name);
        }
        Ok(result)
    }

    fn declarations(&self) -> impl Iterator<Item = &ComponentDecl> {
        let layout = self.layout.iter().flat_map(|l| l.components.iter());
        layout.chain(self.page.components.iter())
    }

    fn find_declaration(&self, alias: &str) -> Option<&ComponentDecl> {
        self.page
            .components
            .iter()
            .chain(self.layout.iter().flat_map(|l| l.components.iter()))
            .find(|decl| decl.alias == alias)
    }

    fn resolve_component(&self, decl: &ComponentDecl) -> Result<Arc<dyn Component>> {
        self.components
            .get(&decl.kind)
            .ok_or_else(|| CmsError::not_found(ObjectKind::Component, decl.kind.clone()))
    }

    fn component_properties(component: &dyn Component, decl: &ComponentDecl, params: &Params) -> Params {
        let mut properties = component.default_properties();
        properties.extend(decl.properties.clone());
        properties.extend(params.clone());
        properties
    }

    /// 依次执行布局和页面中声明的组件
    fn run_components(&self) -> Result<()> {
        for decl in self.declarations() {
            let component = self.resolve_component(decl)?;
            let properties = Self::component_properties(component.as_ref(), decl, &Params::new());
            let mut run = ComponentRun::new(decl.alias.clone(), properties);

            debug!("执行组件 {} ({})", decl.alias, decl.kind);
            component.on_run(&mut run)?;

            lock(&self.vars).extend(run.vars);
            for (kind, path) in run.assets {
                let path = self.resolve_asset_path(path);
                lock(&self.assets).add(kind, path, BTreeMap::new());
            }
            let mut flash = lock(&self.flash);
            for (kind, message) in run.flash {
                flash.add(kind, message);
            }
        }
        Ok(())
    }

    fn resolve_asset_path(&self, path: String) -> String {
        if is_absolute_url(&path) {
            path
        } else {
            self.theme_url(&ThemeUrl::Single(path))
        }
    }

    /// 页面、布局和局部模板共享的模板变量
    fn base_context(&self) -> tera::Context {
        let mut context = tera::Context::new();
        for (key, value) in lock(&self.vars).iter() {
            context.insert(key.as_str(), value);
        }

        let this = json!({
            "page": self.page.to_value(),
            "layout": self.layout.as_ref().map(Layout::to_value),
            "theme": {
                "code": self.theme.code,
                "name": self.theme.info.name,
                "description": self.theme.info.description,
                "author": self.theme.info.author,
            },
            "param": Value::Object(self.route_params.clone()),
            "environment": self.config.environment,
        });
        context.insert("this", &this);
        context
    }

    fn render_template(&self, name: &str, context: tera::Context) -> Result<String> {
        debug!("渲染模板: {}", name);
        self.tera
            .render(name, &context)
            .map_err(|e| CmsError::from_render(name, e))
    }
}

impl PageController for RenderPass {
    fn render_page(&self) -> Result<String> {
        Ok(lock(&self.page_contents).clone().unwrap_or_default())
    }

    fn render_partial(&self, name: &str, params: &Params, throw_on_missing: bool) -> Result<String> {
        let Some(partial) = self.theme.partial(name) else {
            if throw_on_missing {
                return Err(CmsError::not_found(ObjectKind::Partial, name));
            }
            debug!("局部模板 {} 不存在，输出空内容", name);
            return Ok(String::new());
        };

        let mut context = self.base_context();
        for (key, value) in params {
            context.insert(key.as_str(), value);
        }
        self.render_template(&partial.template_name(), context)
    }

    fn render_content(&self, name: &str, params: &Params) -> Result<String> {
        let content = self
            .theme
            .content(name)
            .ok_or_else(|| CmsError::not_found(ObjectKind::Content, name))?;

        let body = interpolate(&content.body, params);
        Ok(match content.format {
            ContentFormat::Html => body,
            ContentFormat::Text => text_to_html(&body),
            ContentFormat::Markdown => markdown::render(&body),
        })
    }

    fn render_component(&self, name: &str, params: &Params) -> Result<String> {
        let decl = self
            .find_declaration(name)
            .ok_or_else(|| CmsError::not_found(ObjectKind::Component, name))?;
        let component = self.resolve_component(decl)?;
        let properties = Self::component_properties(component.as_ref(), decl, params);

        let override_name = format!("{}/default", decl.alias);
        let template = match self.theme.partial(&override_name) {
            Some(partial) => partial.template_name(),
            None if component.default_markup().is_some() => {
                ComponentManager::view_template_name(component.name())
            }
            None => return Err(CmsError::not_found(ObjectKind::Partial, override_name)),
        };

        let mut context = self.base_context();
        context.insert(
            "__SELF__",
            &json!({
                "alias": decl.alias,
                "name": component.name(),
                "properties": Value::Object(properties),
            }),
        );
        self.render_template(&template, context)
    }

    fn make_assets(&self, kind: Option<AssetKind>) -> Option<String> {
        lock(&self.assets).make_assets(kind)
    }

    fn page_url(&self, name: &str, params: &Params, preserve_route_params: bool) -> Option<String> {
        let mut merged = if preserve_route_params {
            self.route_params.clone()
        } else {
            Params::new()
        };
        merged.extend(params.clone());

        let url = self.router.url(name.trim_end_matches(".htm"), &merged);
        if url.is_none() {
            warn!("无法生成页面 {} 的地址", name);
        }
        url.map(|path| format!("{}{}", self.config.base_url(), path))
    }

    fn theme_url(&self, url: &ThemeUrl) -> String {
        let base = self.config.base_url();
        match url {
            ThemeUrl::Single(path) => format!(
                "{}{}/{}/{}",
                base,
                THEMES_URL_PREFIX,
                self.theme.code,
                path.trim_start_matches('/')
            ),
            ThemeUrl::Many(paths) => {
                let query = url::form_urlencoded::Serializer::new(String::new())
                    .append_pair("theme", &self.theme.code)
                    .extend_pairs(paths.iter().map(|path| ("f", path.trim_start_matches('/'))))
                    .finish();
                format!("{}/combine?{}", base, query)
            }
        }
    }

    fn flash(&self, kind: Option<&str>) -> Vec<FlashMessage> {
        lock(&self.flash).take(kind)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
