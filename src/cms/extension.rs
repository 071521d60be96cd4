use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tera::Tera;
use tracing::{debug, warn};

use crate::cms::blocks::{merge_default, SharedBlocks, DEFAULT_BLOCK_MARKER};
use crate::cms::controller::PageController;
use crate::cms::error::{CmsError, Result};
use crate::cms::flash::FlashMessage;
use crate::cms::hooks::BlockInterceptors;
use crate::models::{AssetKind, Params, ThemeUrl};

/// 渲染桥接扩展
///
/// 把模板中的函数和过滤器调用转发给页面控制器或区块注册表，本身不包含业务逻辑。
/// 控制器以弱引用注入：控制器被释放后，所有转发操作返回 [`CmsError::MissingContext`]。
#[derive(Clone)]
pub struct BridgeExtension {
    controller: Weak<dyn PageController>,
    blocks: SharedBlocks,
    interceptors: Arc<BlockInterceptors>,
}

impl BridgeExtension {
    pub fn new(
        controller: Weak<dyn PageController>,
        blocks: SharedBlocks,
        interceptors: Arc<BlockInterceptors>,
    ) -> Self {
        Self {
            controller,
            blocks,
            interceptors,
        }
    }

    fn controller(&self) -> Result<Arc<dyn PageController>> {
        self.controller.upgrade().ok_or(CmsError::MissingContext)
    }

    /// 输出当前页面内容
    pub fn page(&self) -> Result<String> {
        self.controller()?.render_page()
    }

    /// 渲染局部模板，`throw_on_missing` 为假时找不到局部模板返回空字符串
    pub fn partial(&self, name: &str, params: &Params, throw_on_missing: bool) -> Result<String> {
        self.controller()?.render_partial(name, params, throw_on_missing)
    }

    /// 渲染静态内容
    pub fn content(&self, name: &str, params: &Params) -> Result<String> {
        self.controller()?.render_content(name, params)
    }

    /// 渲染组件默认视图
    pub fn component(&self, name: &str, params: &Params) -> Result<String> {
        self.controller()?.render_component(name, params)
    }

    /// 输出已注册的资源标签，可按类型过滤
    pub fn assets(&self, kind: Option<&str>) -> Result<Option<String>> {
        let kind = match kind {
            Some(kind) => match kind.parse::<AssetKind>() {
                Ok(kind) => Some(kind),
                Err(e) => {
                    warn!("{}", e);
                    return Ok(None);
                }
            },
            None => None,
        };
        Ok(self.controller()?.make_assets(kind))
    }

    /// 读取区块但不删除，区块不存在时返回 `None`
    pub fn placeholder(&self, name: &str, default: &str) -> Option<String> {
        let blocks = self.blocks.lock();
        blocks.get(name).map(|content| merge_default(content, default))
    }

    /// 生成页面地址
    pub fn page_url(&self, name: &str, params: &Params, preserve_route_params: bool) -> Result<Option<String>> {
        Ok(self.controller()?.page_url(name, params, preserve_route_params))
    }

    /// 生成主题资源地址
    pub fn theme_url(&self, url: &ThemeUrl) -> Result<String> {
        Ok(self.controller()?.theme_url(url))
    }

    /// 打开区块
    pub fn start_block(&self, name: &str) {
        self.blocks.lock().start_block(name);
    }

    /// 向当前打开的区块写入内容
    pub fn capture(&self, text: &str) -> Result<()> {
        self.blocks.lock().capture(text)
    }

    /// 关闭最近打开的区块
    pub fn end_block(&self, append: bool) -> Result<()> {
        self.blocks.lock().end_block(append)
    }

    /// 输出并删除区块
    ///
    /// 区块不存在时原样返回默认内容；存在时先交给 `block.render` 拦截器，
    /// 再用去除首尾空白的默认内容替换默认内容标记。拦截器返回空字符串时保留原内容。
    pub fn display_block(&self, name: &str, default: &str) -> String {
        let taken = self.blocks.lock().take(name);
        let Some(content) = taken else {
            return default.to_string();
        };

        let content = self
            .interceptors
            .fire(name, &content)
            .filter(|replacement| !replacement.is_empty())
            .unwrap_or(content);
        merge_default(&content, default)
    }

    /// 读取并删除闪存消息
    pub fn flash(&self, kind: Option<&str>) -> Result<Vec<FlashMessage>> {
        Ok(self.controller()?.flash(kind))
    }

    /// 注册模板函数和过滤器
    ///
    /// 所有函数和过滤器都输出已转义的 HTML，不会被 Tera 再次转义。
    pub fn register(&self, tera: &mut Tera) {
        debug!("注册渲染桥接扩展");

        let ext = self.clone();
        tera.register_function("page", markup(move |_args| {
            ext.page().map(Value::String).map_err(CmsError::into_tera)
        }));

        let ext = self.clone();
        tera.register_function("partial", markup(move |args| {
            let name = required_string(args, "partial", "name")?;
            let params = collect_params(args, &["name", "throw"]);
            let throw = bool_arg(args, "throw", false);
            ext.partial(&name, &params, throw)
                .map(Value::String)
                .map_err(CmsError::into_tera)
        }));

        let ext = self.clone();
        tera.register_function("content", markup(move |args| {
            let name = required_string(args, "content", "name")?;
            let params = collect_params(args, &["name"]);
            ext.content(&name, &params)
                .map(Value::String)
                .map_err(CmsError::into_tera)
        }));

        let ext = self.clone();
        tera.register_function("component", markup(move |args| {
            let name = required_string(args, "component", "name")?;
            let params = collect_params(args, &["name"]);
            ext.component(&name, &params)
                .map(Value::String)
                .map_err(CmsError::into_tera)
        }));

        let ext = self.clone();
        tera.register_function("assets", markup(move |args| {
            let kind = optional_string(args, "type");
            ext.assets(kind.as_deref())
                .map(optional_markup)
                .map_err(CmsError::into_tera)
        }));

        let ext = self.clone();
        tera.register_function("scripts", markup(move |_args| {
            ext.assets_with_block("js", "scripts")
        }));

        let ext = self.clone();
        tera.register_function("styles", markup(move |_args| {
            ext.assets_with_block("css", "styles")
        }));

        let ext = self.clone();
        tera.register_function("placeholder", markup(move |args| {
            let name = required_string(args, "placeholder", "name")?;
            let default = optional_string(args, "default").unwrap_or_default();
            Ok(optional_markup(ext.placeholder(&name, &default)))
        }));

        let ext = self.clone();
        tera.register_function("display_block", markup(move |args| {
            let name = required_string(args, "display_block", "name")?;
            let default = optional_string(args, "default").unwrap_or_default();
            Ok(Value::String(ext.display_block(&name, &default)))
        }));

        let ext = self.clone();
        tera.register_function("page_url", markup(move |args| {
            let name = required_string(args, "page_url", "name")?;
            let params = collect_params(args, &["name", "preserve"]);
            let preserve = bool_arg(args, "preserve", true);
            ext.page_url(&name, &params, preserve)
                .map(optional_markup)
                .map_err(CmsError::into_tera)
        }));

        let ext = self.clone();
        tera.register_function("theme_url", markup(move |args| {
            let url = args
                .get("url")
                .ok_or_else(|| missing_argument("theme_url", "url"))
                .and_then(|value| theme_url_arg("theme_url", value))?;
            ext.theme_url(&url).map(Value::String).map_err(CmsError::into_tera)
        }));

        tera.register_function("block_default", markup(|_args| {
            Ok(Value::String(DEFAULT_BLOCK_MARKER.to_string()))
        }));

        let ext = self.clone();
        tera.register_function("flash", markup(move |args| {
            let kind = optional_string(args, "type");
            let messages = ext.flash(kind.as_deref()).map_err(CmsError::into_tera)?;
            tera::to_value(messages).map_err(tera::Error::json)
        }));

        let ext = self.clone();
        tera.register_filter("page", markup_filter(move |value, args| {
            let name = value
                .as_str()
                .ok_or_else(|| invalid_value("page", "页面名称必须是字符串"))?;
            let params = collect_params(args, &["preserve"]);
            let preserve = bool_arg(args, "preserve", true);
            ext.page_url(name, &params, preserve)
                .map(optional_markup)
                .map_err(CmsError::into_tera)
        }));

        let ext = self.clone();
        tera.register_filter("theme", markup_filter(move |value, _args| {
            let url = theme_url_arg("theme", value)?;
            ext.theme_url(&url).map(Value::String).map_err(CmsError::into_tera)
        }));

        let ext = self.clone();
        tera.register_filter("put", markup_filter(move |value, args| {
            let name = required_string(args, "put", "name")?;
            let overwrite = bool_arg(args, "overwrite", false);
            let body = match value {
                Value::String(body) => body.clone(),
                other => crate::utils::value_to_string(other),
            };
            ext.put(&name, &body, !overwrite).map_err(CmsError::into_tera)?;
            Ok(Value::String(String::new()))
        }));
    }

    /// `put` 过滤器：把过滤区段的内容写入区块
    fn put(&self, name: &str, body: &str, append: bool) -> Result<()> {
        let mut blocks = self.blocks.lock();
        blocks.start_block(name);
        blocks.capture(body)?;
        blocks.end_block(append)
    }

    fn assets_with_block(&self, kind: &str, block: &str) -> tera::Result<Value> {
        let assets = self
            .assets(Some(kind))
            .map_err(CmsError::into_tera)?
            .unwrap_or_default();
        Ok(Value::String(assets + &self.display_block(block, "")))
    }
}

/// 输出安全 HTML 的模板函数
struct Markup<F>(F);

impl<F> tera::Function for Markup<F>
where
    F: Fn(&HashMap<String, Value>) -> tera::Result<Value> + Send + Sync,
{
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        (self.0)(args)
    }

    fn is_safe(&self) -> bool {
        true
    }
}

fn markup<F>(f: F) -> Markup<F>
where
    F: Fn(&HashMap<String, Value>) -> tera::Result<Value> + Send + Sync,
{
    Markup(f)
}

/// 输出安全 HTML 的过滤器
struct MarkupFilter<F>(F);

impl<F> tera::Filter for MarkupFilter<F>
where
    F: Fn(&Value, &HashMap<String, Value>) -> tera::Result<Value> + Send + Sync,
{
    fn filter(&self, value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
        (self.0)(value, args)
    }

    fn is_safe(&self) -> bool {
        true
    }
}

fn markup_filter<F>(f: F) -> MarkupFilter<F>
where
    F: Fn(&Value, &HashMap<String, Value>) -> tera::Result<Value> + Send + Sync,
{
    MarkupFilter(f)
}

fn optional_markup(value: Option<String>) -> Value {
    value.map_or(Value::Null, Value::String)
}

fn missing_argument(function: &str, name: &str) -> tera::Error {
    CmsError::invalid_argument(function, format!("缺少必要的参数: {}", name)).into_tera()
}

fn invalid_value(function: &str, message: &str) -> tera::Error {
    CmsError::invalid_argument(function, message).into_tera()
}

fn required_string(args: &HashMap<String, Value>, function: &str, name: &str) -> tera::Result<String> {
    match args.get(name) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(invalid_value(function, &format!("参数 {} 必须是字符串", name))),
        None => Err(missing_argument(function, name)),
    }
}

fn optional_string(args: &HashMap<String, Value>, name: &str) -> Option<String> {
    args.get(name).and_then(Value::as_str).map(str::to_string)
}

fn bool_arg(args: &HashMap<String, Value>, name: &str, default: bool) -> bool {
    args.get(name).and_then(Value::as_bool).unwrap_or(default)
}

/// 收集模板参数：`params` 对象与其余未保留的命名参数合并，后者优先
fn collect_params(args: &HashMap<String, Value>, reserved: &[&str]) -> Params {
    let mut params = match args.get("params") {
        Some(Value::Object(map)) => map.clone(),
        _ => Params::new(),
    };
    for (key, value) in args {
        if key != "params" && !reserved.contains(&key.as_str()) {
            params.insert(key.clone(), value.clone());
        }
    }
    params
}

fn theme_url_arg(function: &str, value: &Value) -> tera::Result<ThemeUrl> {
    match value {
        Value::String(path) => Ok(ThemeUrl::Single(path.clone())),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| invalid_value(function, "地址列表只能包含字符串"))
            })
            .collect::<tera::Result<Vec<_>>>()
            .map(ThemeUrl::Many),
        _ => Err(invalid_value(function, "地址必须是字符串或字符串数组")),
    }
}
