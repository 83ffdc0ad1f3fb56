//! 日志初始化

use tracing_subscriber::EnvFilter;

/// 安装 fmt 订阅者
///
/// 过滤规则取自 `RUST_LOG`，并追加 `default_directive`（例如 `"robogym=info"`）。
/// 已安装过订阅者时返回 `false`，重复调用无副作用。
pub fn init_logging(default_directive: &str) -> bool {
    let mut filter = EnvFilter::from_default_env();
    match default_directive.parse() {
        Ok(directive) => filter = filter.add_directive(directive),
        Err(e) => eprintln!("Ignoring invalid log directive '{}': {}", default_directive, e),
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}
