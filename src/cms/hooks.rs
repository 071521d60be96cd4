use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// 区块渲染钩子名称
pub const BLOCK_RENDER_HOOK: &str = "block.render";

/// 区块渲染拦截器
///
/// 在 `display_block` 输出区块前调用，返回 `Some` 时用返回值替换区块内容。
pub trait BlockInterceptor: Send + Sync {
    fn on_block_render(&self, name: &str, content: &str) -> Option<String>;
}

impl<F> BlockInterceptor for F
where
    F: Fn(&str, &str) -> Option<String> + Send + Sync,
{
    fn on_block_render(&self, name: &str, content: &str) -> Option<String> {
        self(name, content)
    }
}

/// 按注册顺序排列的拦截器列表
#[derive(Clone, Default)]
pub struct BlockInterceptors {
    interceptors: Vec<Arc<dyn BlockInterceptor>>,
}

impl fmt::Debug for BlockInterceptors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockInterceptors")
            .field("len", &self.interceptors.len())
            .finish()
    }
}

impl BlockInterceptors {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册拦截器，先注册的先执行
    pub fn register<I>(&mut self, interceptor: I)
    where
        I: BlockInterceptor + 'static,
    {
        self.interceptors.push(Arc::new(interceptor));
    }

    /// 依次调用拦截器，第一个返回 `Some` 的结果生效
    pub fn fire(&self, name: &str, content: &str) -> Option<String> {
        for (index, interceptor) in self.interceptors.iter().enumerate() {
            if let Some(replacement) = interceptor.on_block_render(name, content) {
                debug!("{} 拦截器 #{} 替换了区块 {}", BLOCK_RENDER_HOOK, index, name);
                return Some(replacement);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_first_override_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut interceptors = BlockInterceptors::new();

        interceptors.register(|_: &str, _: &str| -> Option<String> { None });
        interceptors.register(|name: &str, content: &str| -> Option<String> {
            (name == "footer").then(|| content.to_uppercase())
        });
        let counter = calls.clone();
        interceptors.register(move |_: &str, _: &str| -> Option<String> {
            counter.fetch_add(1, Ordering::SeqCst);
            Some("late".to_string())
        });

        assert_eq!(interceptors.fire("footer", "abc").as_deref(), Some("ABC"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(interceptors.fire("header", "abc").as_deref(), Some("late"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_no_interceptors_means_no_override() {
        let interceptors = BlockInterceptors::new();
        assert!(interceptors.interceptors.is_empty());
        assert_eq!(interceptors.fire("x", "content"), None);
    }
}
