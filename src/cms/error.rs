use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// CMS 对象类型，用于错误信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Page,
    Layout,
    Partial,
    Content,
    Component,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectKind::Page => "page",
            ObjectKind::Layout => "layout",
            ObjectKind::Partial => "partial",
            ObjectKind::Content => "content",
            ObjectKind::Component => "component",
        };
        f.write_str(name)
    }
}

/// CMS 错误类型
#[derive(Error, Debug)]
pub enum CmsError {
    #[error("渲染上下文中没有可用的控制器")]
    MissingContext,

    #[error("找不到 {kind}: {name}")]
    NotFound {
        kind: ObjectKind,
        name: String,
    },

    #[error("区块嵌套无效: 没有已打开的区块")]
    BlockNesting,

    #[error("模板 {name} 渲染失败")]
    Template {
        name: String,
        #[source]
        source: tera::Error,
    },

    #[error("函数 {function} 参数错误: {message}")]
    InvalidArgument {
        function: String,
        message: String,
    },

    #[error("主题错误: {0}")]
    Theme(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = CmsError> = std::result::Result<T, E>;

impl CmsError {
    pub fn not_found(kind: ObjectKind, name: impl Into<String>) -> Self {
        CmsError::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn invalid_argument(function: &str, message: impl Into<String>) -> Self {
        CmsError::InvalidArgument {
            function: function.to_string(),
            message: message.into(),
        }
    }

    /// 包装为 Tera 错误，保留原错误作为来源
    pub fn into_tera(self) -> tera::Error {
        tera::Error::chain(self.to_string(), self)
    }

    /// 从 Tera 渲染错误中恢复 CMS 领域错误
    ///
    /// 扩展函数抛出的错误会被 Tera 层层包装，这里沿来源链查找第一个领域错误
    /// （未找到、缺少控制器、区块嵌套、参数错误），找不到时按模板错误返回。
    pub fn from_render(name: &str, err: tera::Error) -> Self {
        let mut current: Option<&(dyn StdError + 'static)> = Some(&err);
        while let Some(e) = current {
            if let Some(cms) = e.downcast_ref::<CmsError>() {
                if let Some(domain) = cms.replicate() {
                    return domain;
                }
            }
            current = e.source();
        }

        CmsError::Template {
            name: name.to_string(),
            source: err,
        }
    }

    fn replicate(&self) -> Option<Self> {
        match self {
            CmsError::MissingContext => Some(CmsError::MissingContext),
            CmsError::NotFound { kind, name } => Some(CmsError::not_found(*kind, name.clone())),
            CmsError::BlockNesting => Some(CmsError::BlockNesting),
            CmsError::InvalidArgument { function, message } => {
                Some(CmsError::invalid_argument(function, message.clone()))
            }
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CmsError::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_survives_tera_chain() {
        let inner = CmsError::not_found(ObjectKind::Partial, "missing").into_tera();
        let outer = tera::Error::chain("Function call 'partial' failed", inner);

        match CmsError::from_render("pages/home.htm", outer) {
            CmsError::NotFound { kind, name } => {
                assert_eq!(kind, ObjectKind::Partial);
                assert_eq!(name, "missing");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_plain_tera_error_becomes_template_error() {
        let err = tera::Error::msg("Variable `foo` not found");
        let converted = CmsError::from_render("pages/home.htm", err);
        assert!(matches!(converted, CmsError::Template { ref name, .. } if name == "pages/home.htm"));
    }
}
