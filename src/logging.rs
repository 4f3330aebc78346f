//! ロギング初期化ユーティリティ

use tracing_subscriber::EnvFilter;

/// tracingサブスクライバを初期化する
///
/// `RUST_LOG`が未設定の場合は`info`を使う。二重初期化は無視する。
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
