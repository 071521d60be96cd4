use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::cms::error::Result;
use crate::models::{AssetKind, Params};

/// 组件特征，所有组件必须实现此特征
pub trait Component: Send + Sync {
    /// 获取组件名称，页面前置元数据中的 `type` 引用该名称
    fn name(&self) -> &str;

    /// 获取组件描述
    fn description(&self) -> &str {
        ""
    }

    /// 属性默认值，会被页面中声明的属性覆盖
    fn default_properties(&self) -> Params {
        Params::new()
    }

    /// 默认视图的模板源码
    fn default_markup(&self) -> Option<&str> {
        None
    }

    /// 页面渲染前执行，可设置页面变量、添加资源和闪存消息
    fn on_run(&self, _run: &mut ComponentRun) -> Result<()> {
        Ok(())
    }
}

/// 一次组件执行的输入和产出
#[derive(Debug, Clone)]
pub struct ComponentRun {
    /// 组件别名
    pub alias: String,
    /// 合并后的属性
    pub properties: Params,
    pub(crate) vars: Params,
    pub(crate) assets: Vec<(AssetKind, String)>,
    pub(crate) flash: Vec<(String, String)>,
}

impl ComponentRun {
    pub fn new(alias: impl Into<String>, properties: Params) -> Self {
        Self {
            alias: alias.into(),
            properties,
            vars: Params::new(),
            assets: Vec::new(),
            flash: Vec::new(),
        }
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// 设置页面变量，页面和布局模板中可直接访问
    pub fn set_var(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn add_js(&mut self, path: impl Into<String>) {
        self.assets.push((AssetKind::Js, path.into()));
    }

    pub fn add_css(&mut self, path: impl Into<String>) {
        self.assets.push((AssetKind::Css, path.into()));
    }

    pub fn add_rss(&mut self, path: impl Into<String>) {
        self.assets.push((AssetKind::Rss, path.into()));
    }

    pub fn flash(&mut self, kind: impl Into<String>, message: impl Into<String>) {
        self.flash.push((kind.into(), message.into()));
    }
}

/// 组件管理器，负责注册和查找组件
#[derive(Clone, Default)]
pub struct ComponentManager {
    components: HashMap<String, Arc<dyn Component>>,
}

impl fmt::Debug for ComponentManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: BTreeMap<&str, &str> = self
            .components
            .values()
            .map(|c| (c.name(), c.description()))
            .collect();
        f.debug_struct("ComponentManager").field("components", &names).finish()
    }
}

impl ComponentManager {
    /// 创建带内置组件的管理器
    pub fn new() -> Self {
        let mut manager = Self::default();
        manager.register(ViewBag);
        manager
    }

    pub fn register<C>(&mut self, component: C)
    where
        C: Component + 'static,
    {
        info!("注册组件: {}", component.name());
        self.components
            .insert(component.name().to_string(), Arc::new(component));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Component>> {
        self.components.get(name).cloned()
    }

    /// 组件默认视图对应的模板名
    pub fn view_template_name(name: &str) -> String {
        format!("components/{}/default.htm", name)
    }

    /// 需要注册到 Tera 的组件默认视图
    pub fn view_templates(&self) -> Vec<(String, String)> {
        self.components
            .values()
            .filter_map(|c| {
                c.default_markup().map(|markup| {
                    debug!("注册组件 {} 的默认视图", c.name());
                    (Self::view_template_name(c.name()), markup.to_string())
                })
            })
            .collect()
    }
}

/// 内置组件：把声明的属性作为页面变量 `viewBag` 暴露给模板
pub struct ViewBag;

impl Component for ViewBag {
    fn name(&self) -> &str {
        "viewBag"
    }

    fn description(&self) -> &str {
        "Stores custom template properties"
    }

    fn on_run(&self, run: &mut ComponentRun) -> Result<()> {
        let properties = Value::Object(run.properties.clone());
        run.set_var("viewBag", properties);
        Ok(())
    }
}
