use std::collections::BTreeMap;
use tracing::debug;

use crate::models::AssetKind;

/// 注册到当前渲染过程的资源
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    /// 已解析的地址
    pub path: String,
    /// 额外的 HTML 属性
    pub attributes: BTreeMap<String, String>,
}

/// 按类型保存的资源列表，同类型内按路径去重
#[derive(Debug, Clone, Default)]
pub struct AssetRegistry {
    css: Vec<Asset>,
    rss: Vec<Asset>,
    js: Vec<Asset>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn list(&self, kind: AssetKind) -> &Vec<Asset> {
        match kind {
            AssetKind::Css => &self.css,
            AssetKind::Rss => &self.rss,
            AssetKind::Js => &self.js,
        }
    }

    fn list_mut(&mut self, kind: AssetKind) -> &mut Vec<Asset> {
        match kind {
            AssetKind::Css => &mut self.css,
            AssetKind::Rss => &mut self.rss,
            AssetKind::Js => &mut self.js,
        }
    }

    /// 添加资源，重复的路径会被忽略
    pub fn add(&mut self, kind: AssetKind, path: impl Into<String>, attributes: BTreeMap<String, String>) {
        let path = path.into();
        let list = self.list_mut(kind);
        if list.iter().any(|asset| asset.path == path) {
            debug!("忽略重复的 {} 资源: {}", kind, path);
            return;
        }
        debug!("添加 {} 资源: {}", kind, path);
        list.push(Asset { path, attributes });
    }

    /// 生成资源标签
    ///
    /// 不指定类型时依次输出样式、订阅和脚本。没有任何资源时返回 `None`。
    pub fn make_assets(&self, kind: Option<AssetKind>) -> Option<String> {
        let kinds: Vec<AssetKind> = match kind {
            Some(kind) => vec![kind],
            None => AssetKind::all().to_vec(),
        };

        let mut result = String::new();
        for kind in kinds {
            for asset in self.list(kind) {
                result.push_str(&render_tag(kind, asset));
                result.push('\n');
            }
        }

        (!result.is_empty()).then_some(result)
    }
}

fn render_tag(kind: AssetKind, asset: &Asset) -> String {
    // 固定属性原样输出，地址和自定义属性需要转义
    let path = tera::escape_html(&asset.path);
    let mut attributes: Vec<(&str, String)> = match kind {
        AssetKind::Css => vec![("rel", "stylesheet".into()), ("href", path)],
        AssetKind::Rss => vec![
            ("rel", "alternate".into()),
            ("type", "application/rss+xml".into()),
            ("title", "RSS".into()),
            ("href", path),
        ],
        AssetKind::Js => vec![("src", path)],
    };
    for (name, value) in &asset.attributes {
        let value = tera::escape_html(value);
        if let Some(slot) = attributes.iter_mut().find(|slot| slot.0 == name.as_str()) {
            slot.1 = value;
        } else {
            attributes.push((name.as_str(), value));
        }
    }

    let attributes: String = attributes
        .iter()
        .map(|(name, value)| format!(" {}=\"{}\"", name, value))
        .collect();

    match kind {
        AssetKind::Css | AssetKind::Rss => format!("<link{}>", attributes),
        AssetKind::Js => format!("<script{}></script>", attributes),
    }
}
