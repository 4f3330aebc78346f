//! パス・エンドポイントフィルタ
//!
//! パイプライン適用可否の判定（バッファリング前に1回だけ評価）と、
//! エンドポイント単位のオプトアウトマーカー。マーカーはハンドラーが
//! response extensionsへ挿入し、ミドルウェアがアウトカム確定後に参照する。

use crate::config::{ExcludeMode, ExcludeRule, WrapOptions};
use crate::mask;
use axum::http::Extensions;
use serde_json::Value;
use std::collections::BTreeMap;

/// レスポンスラップをスキップするマーカー（監査ログは出力される）
#[derive(Debug, Clone, Copy)]
pub struct WrapIgnore;

/// 監査ログ自体をスキップするマーカー
#[derive(Debug, Clone, Copy)]
pub struct LogIgnore;

/// リクエストデータ（ボディ）のログ出力をスキップするマーカー
#[derive(Debug, Clone, Copy)]
pub struct RequestDataLogIgnore;

/// レスポンスデータ（ボディ）のログ出力をスキップするマーカー
#[derive(Debug, Clone, Copy)]
pub struct ResponseDataLogIgnore;

/// エンドポイント固有の追加ログプロパティ
#[derive(Debug, Clone, Default)]
pub struct LogProperties(pub BTreeMap<String, Value>);

/// response extensionsから抽出したマーカー集合
#[derive(Debug, Clone, Default)]
pub struct EndpointMarkers {
    /// ラップをスキップ
    pub wrap_ignore: bool,
    /// ログをスキップ
    pub log_ignore: bool,
    /// リクエストデータのログをスキップ
    pub request_data_log_ignore: bool,
    /// レスポンスデータのログをスキップ
    pub response_data_log_ignore: bool,
    /// 追加ログプロパティ
    pub properties: BTreeMap<String, Value>,
}

impl EndpointMarkers {
    /// response extensionsからマーカーを抽出する
    pub fn from_extensions(extensions: &Extensions) -> Self {
        Self {
            wrap_ignore: extensions.get::<WrapIgnore>().is_some(),
            log_ignore: extensions.get::<LogIgnore>().is_some(),
            request_data_log_ignore: extensions.get::<RequestDataLogIgnore>().is_some(),
            response_data_log_ignore: extensions.get::<ResponseDataLogIgnore>().is_some(),
            properties: extensions
                .get::<LogProperties>()
                .map(|p| p.0.clone())
                .unwrap_or_default(),
        }
    }
}

/// パスがドキュメント（swagger）プレフィックス配下か
pub fn is_swagger(path: &str, swagger_path: &str) -> bool {
    !swagger_path.is_empty() && starts_with_segments(path, swagger_path)
}

/// パスがラップ対象のAPIパスか
///
/// API専用構成では全パスが対象。そうでない場合は`wrap_when_api_path_starts_with`
/// 配下のみが対象になる。
pub fn is_api(path: &str, options: &WrapOptions) -> bool {
    options.is_api_only || starts_with_segments(path, &options.wrap_when_api_path_starts_with)
}

/// パスが除外ルールに一致するか
pub fn is_excluded(path: &str, rules: &[ExcludeRule]) -> bool {
    rules.iter().any(|rule| match rule.mode {
        ExcludeMode::Strict => starts_with_segments(path, &rule.path),
        ExcludeMode::Wildcard => mask::wildcard_match(&rule.path, path),
    })
}

/// パイプラインを適用すべきか
///
/// falseの場合はバッファリングもログも一切行わず、リクエストをそのまま
/// ダウンストリームへ通す。
pub fn should_intercept(path: &str, options: &WrapOptions) -> bool {
    !is_swagger(path, &options.swagger_path)
        && is_api(path, options)
        && !is_excluded(path, &options.exclude_paths)
}

/// セグメント境界を考慮した前方一致
///
/// `/api` は `/api` と `/api/...` に一致し、`/apiv2` には一致しない。
fn starts_with_segments(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
