//! 設定管理
//!
//! ラップ・監査ログのプロセス全体設定。`Arc`で共有し、リクエスト間で
//! 読み取り専用に扱う。スカラー設定は環境変数 `APIWRAP_*` で上書きできる。

use crate::audit::context::ContextInfo;
use crate::audit::sink::{default_sink, LogEntryParameters, LogSink};
use crate::classify::Fault;
use crate::mask::Masker;
use crate::wrap::{DefaultProblemDetails, ProblemDetailsExecutor};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::Level;

/// チャンネル単位のログ出力モード
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    /// 出力しない
    LogNone,
    /// 失敗時のみ出力
    LogFailures,
    /// 常に出力
    LogAll,
}

impl LogMode {
    /// このモードでチャンネルをログへ含めるべきか
    pub fn includes(&self, is_request_ok: bool) -> bool {
        match self {
            LogMode::LogAll => true,
            LogMode::LogFailures => !is_request_ok,
            LogMode::LogNone => false,
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "lognone" => Some(Self::LogNone),
            "failures" | "logfailures" => Some(Self::LogFailures),
            "all" | "logall" => Some(Self::LogAll),
            _ => None,
        }
    }
}

/// 除外ルールの一致モード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExcludeMode {
    /// セグメント境界を考慮した前方一致（既定）
    #[default]
    Strict,
    /// `*`ワイルドカードによるパス全体の一致
    Wildcard,
}

/// パイプラインから除外するパスのルール
#[derive(Debug, Clone)]
pub struct ExcludeRule {
    /// 対象パス（またはワイルドカードパターン）
    pub path: String,
    /// 一致モード
    pub mode: ExcludeMode,
}

impl ExcludeRule {
    /// 既定（Strict）モードのルールを作成する
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: ExcludeMode::Strict,
        }
    }

    /// ワイルドカードモードのルールを作成する
    pub fn wildcard(pattern: impl Into<String>) -> Self {
        Self {
            path: pattern.into(),
            mode: ExcludeMode::Wildcard,
        }
    }
}

/// 深刻度判定関数（最終ステータス・処理時間ms・フォールト → レベル）
pub type LevelFn = Arc<dyn Fn(u16, u64, Option<&Fault>) -> Level + Send + Sync>;

/// ログメッセージ・プロパティ構築関数
pub type MessageFn = Arc<dyn Fn(&ContextInfo) -> LogEntryParameters + Send + Sync>;

/// ラップ＋監査ログの設定
///
/// 全フィールドは独立に設定可能。既定値は`Default`実装を参照。
#[derive(Clone)]
pub struct WrapOptions {
    /// マスターのログモード。LogNoneなら監査ログを完全停止、
    /// LogAll以外では成功リクエストを記録しない
    pub log_mode: LogMode,
    /// リクエストヘッダーのログモード
    pub request_header_log_mode: LogMode,
    /// リクエストボディのログモード
    pub request_body_log_mode: LogMode,
    /// レスポンスヘッダーのログモード
    pub response_header_log_mode: LogMode,
    /// レスポンスボディのログモード
    pub response_body_log_mode: LogMode,
    /// リクエストボディを構造化オブジェクトとしてもログへ含めるか。
    /// マスキングはこのフラグが有効な場合のみ適用される
    pub log_request_body_as_structured_object: bool,
    /// レスポンスボディを構造化オブジェクトとしてもログへ含めるか
    pub log_response_body_as_structured_object: bool,
    /// マスク対象キーのワイルドカードパターン一覧
    pub masked_properties: Vec<String>,
    /// マスク置換文字列
    pub mask_format: String,
    /// リクエストボディログの最大文字数
    pub request_body_log_text_length_limit: usize,
    /// レスポンスボディログの最大文字数
    pub response_body_log_text_length_limit: usize,
    /// パイプラインから除外するパス
    pub exclude_paths: Vec<ExcludeRule>,
    /// 失敗・フォールト時にproblem-details実行器へ委譲するか
    pub use_api_problem_details_exception: bool,
    /// 成功レスポンスをラップせず素通しする
    pub ignore_wrap_for_ok_requests: bool,
    /// ドキュメント（swagger）パスのプレフィックス
    pub swagger_path: String,
    /// 全パスをAPIとして扱うか
    pub is_api_only: bool,
    /// HTMLボディの404差し替えを無効化する
    pub bypass_html_validation: bool,
    /// `is_api_only`が無効な場合にラップ対象とするパスのプレフィックス
    pub wrap_when_api_path_starts_with: String,
    /// 深刻度判定関数
    pub get_level: LevelFn,
    /// メッセージ・プロパティ構築関数
    pub get_log_message_and_properties: MessageFn,
    /// ログ出力先。未指定時はプロセス共通のtracingシンク
    pub sink: Arc<dyn LogSink>,
    /// problem-details実行器
    pub problem_details: Arc<dyn ProblemDetailsExecutor>,
}

impl Default for WrapOptions {
    fn default() -> Self {
        Self {
            log_mode: LogMode::LogAll,
            request_header_log_mode: LogMode::LogAll,
            request_body_log_mode: LogMode::LogAll,
            response_header_log_mode: LogMode::LogAll,
            response_body_log_mode: LogMode::LogFailures,
            log_request_body_as_structured_object: true,
            log_response_body_as_structured_object: true,
            masked_properties: default_masked_properties(),
            mask_format: "*** MASKED ***".to_string(),
            request_body_log_text_length_limit: 4000,
            response_body_log_text_length_limit: 4000,
            exclude_paths: Vec::new(),
            use_api_problem_details_exception: false,
            ignore_wrap_for_ok_requests: false,
            swagger_path: "/swagger".to_string(),
            is_api_only: true,
            bypass_html_validation: false,
            wrap_when_api_path_starts_with: "/api".to_string(),
            get_level: Arc::new(default_get_level),
            get_log_message_and_properties: Arc::new(default_log_message),
            sink: default_sink(),
            problem_details: Arc::new(DefaultProblemDetails),
        }
    }
}

impl std::fmt::Debug for WrapOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WrapOptions")
            .field("log_mode", &self.log_mode)
            .field("request_header_log_mode", &self.request_header_log_mode)
            .field("request_body_log_mode", &self.request_body_log_mode)
            .field("response_header_log_mode", &self.response_header_log_mode)
            .field("response_body_log_mode", &self.response_body_log_mode)
            .field("masked_properties", &self.masked_properties)
            .field("mask_format", &self.mask_format)
            .field(
                "request_body_log_text_length_limit",
                &self.request_body_log_text_length_limit,
            )
            .field(
                "response_body_log_text_length_limit",
                &self.response_body_log_text_length_limit,
            )
            .field("exclude_paths", &self.exclude_paths)
            .field(
                "use_api_problem_details_exception",
                &self.use_api_problem_details_exception,
            )
            .field("ignore_wrap_for_ok_requests", &self.ignore_wrap_for_ok_requests)
            .field("swagger_path", &self.swagger_path)
            .field("is_api_only", &self.is_api_only)
            .field("bypass_html_validation", &self.bypass_html_validation)
            .field(
                "wrap_when_api_path_starts_with",
                &self.wrap_when_api_path_starts_with,
            )
            .finish_non_exhaustive()
    }
}

impl WrapOptions {
    /// 環境変数でスカラー設定を上書きした設定を返す
    pub fn from_env() -> Self {
        let mut options = Self::default();
        options.log_mode = get_env_log_mode("APIWRAP_LOG_MODE", options.log_mode);
        options.request_header_log_mode =
            get_env_log_mode("APIWRAP_REQUEST_HEADER_LOG_MODE", options.request_header_log_mode);
        options.request_body_log_mode =
            get_env_log_mode("APIWRAP_REQUEST_BODY_LOG_MODE", options.request_body_log_mode);
        options.response_header_log_mode = get_env_log_mode(
            "APIWRAP_RESPONSE_HEADER_LOG_MODE",
            options.response_header_log_mode,
        );
        options.response_body_log_mode =
            get_env_log_mode("APIWRAP_RESPONSE_BODY_LOG_MODE", options.response_body_log_mode);
        options.request_body_log_text_length_limit = get_env_parse(
            "APIWRAP_REQUEST_BODY_LOG_TEXT_LENGTH_LIMIT",
            options.request_body_log_text_length_limit,
        );
        options.response_body_log_text_length_limit = get_env_parse(
            "APIWRAP_RESPONSE_BODY_LOG_TEXT_LENGTH_LIMIT",
            options.response_body_log_text_length_limit,
        );
        if let Some(mask) = get_env("APIWRAP_MASK_FORMAT") {
            options.mask_format = mask;
        }
        if let Some(path) = get_env("APIWRAP_SWAGGER_PATH") {
            options.swagger_path = path;
        }
        if let Some(prefix) = get_env("APIWRAP_WRAP_WHEN_API_PATH_STARTS_WITH") {
            options.wrap_when_api_path_starts_with = prefix;
        }
        options.ignore_wrap_for_ok_requests = get_env_bool(
            "APIWRAP_IGNORE_WRAP_FOR_OK_REQUESTS",
            options.ignore_wrap_for_ok_requests,
        );
        options.use_api_problem_details_exception = get_env_bool(
            "APIWRAP_USE_API_PROBLEM_DETAILS_EXCEPTION",
            options.use_api_problem_details_exception,
        );
        options.is_api_only = get_env_bool("APIWRAP_IS_API_ONLY", options.is_api_only);
        options.bypass_html_validation =
            get_env_bool("APIWRAP_BYPASS_HTML_VALIDATION", options.bypass_html_validation);
        options
    }

    /// 現在のパターン設定からマスカーを構築する
    pub(crate) fn masker(&self) -> Masker {
        Masker::new(&self.masked_properties, &self.mask_format)
    }
}

/// 既定の深刻度判定
///
/// 500以上はERROR、4xxはWARN、フォールトがあればステータスに関わらずERROR。
pub fn default_get_level(status: u16, _elapsed_ms: u64, fault: Option<&Fault>) -> Level {
    if status >= 500 {
        Level::ERROR
    } else if status >= 400 {
        Level::WARN
    } else if fault.is_some() {
        Level::ERROR
    } else {
        Level::INFO
    }
}

/// 既定のメッセージ構築
///
/// 1行メッセージに全文脈を`Context`プロパティとして添付する。
pub fn default_log_message(context: &ContextInfo) -> LogEntryParameters {
    LogEntryParameters {
        message: format!(
            "HTTP Request {} {} responded {} in {} ms",
            context.request.method,
            context.request.path,
            context.response.status_code,
            context.response.elapsed_ms
        ),
        additional_properties: BTreeMap::from([(
            "Context".to_string(),
            serde_json::to_value(context).unwrap_or(Value::Null),
        )]),
    }
}

fn default_masked_properties() -> Vec<String> {
    [
        "*password*",
        "*token*",
        "*secret*",
        "*bearer*",
        "*authorization*",
        "*otp",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// 環境変数を読み取る
pub fn get_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// 環境変数をパースして読み取る（未設定・パース失敗時はdefault）
pub fn get_env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    get_env(name).and_then(|s| s.parse().ok()).unwrap_or(default)
}

/// 真偽値の環境変数を読み取る（true/1/yes/onで有効）
pub fn get_env_bool(name: &str, default: bool) -> bool {
    match get_env(name) {
        Some(value) => matches!(
            value.to_ascii_lowercase().as_str(),
            "true" | "1" | "yes" | "on"
        ),
        None => default,
    }
}

fn get_env_log_mode(name: &str, default: LogMode) -> LogMode {
    get_env(name)
        .as_deref()
        .and_then(LogMode::parse)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let options = WrapOptions::default();
        assert_eq!(options.log_mode, LogMode::LogAll);
        assert_eq!(options.request_header_log_mode, LogMode::LogAll);
        assert_eq!(options.request_body_log_mode, LogMode::LogAll);
        assert_eq!(options.response_header_log_mode, LogMode::LogAll);
        assert_eq!(options.response_body_log_mode, LogMode::LogFailures);
        assert!(options.log_request_body_as_structured_object);
        assert!(options.log_response_body_as_structured_object);
        assert_eq!(options.mask_format, "*** MASKED ***");
        assert_eq!(options.request_body_log_text_length_limit, 4000);
        assert_eq!(options.response_body_log_text_length_limit, 4000);
        assert_eq!(options.swagger_path, "/swagger");
        assert_eq!(options.wrap_when_api_path_starts_with, "/api");
        assert!(options.is_api_only);
        assert!(!options.ignore_wrap_for_ok_requests);
        assert!(!options.use_api_problem_details_exception);
        assert!(options
            .masked_properties
            .contains(&"*password*".to_string()));
    }

    #[test]
    fn test_log_mode_includes() {
        assert!(LogMode::LogAll.includes(true));
        assert!(LogMode::LogAll.includes(false));
        assert!(!LogMode::LogFailures.includes(true));
        assert!(LogMode::LogFailures.includes(false));
        assert!(!LogMode::LogNone.includes(true));
        assert!(!LogMode::LogNone.includes(false));
    }

    #[test]
    fn test_log_mode_parse() {
        assert_eq!(LogMode::parse("all"), Some(LogMode::LogAll));
        assert_eq!(LogMode::parse("LogFailures"), Some(LogMode::LogFailures));
        assert_eq!(LogMode::parse("NONE"), Some(LogMode::LogNone));
        assert_eq!(LogMode::parse("sometimes"), None);
    }

    #[test]
    fn test_default_get_level() {
        assert_eq!(default_get_level(200, 10, None), Level::INFO);
        assert_eq!(default_get_level(404, 10, None), Level::WARN);
        assert_eq!(default_get_level(500, 10, None), Level::ERROR);
        // 回復済みフォールトは2xxでもERRORへ引き上げる
        let fault = Fault::new("boom");
        assert_eq!(default_get_level(200, 10, Some(&fault)), Level::ERROR);
    }

    #[test]
    fn test_from_env_overrides() {
        std::env::set_var("APIWRAP_RESPONSE_BODY_LOG_MODE", "all");
        std::env::set_var("APIWRAP_REQUEST_BODY_LOG_TEXT_LENGTH_LIMIT", "128");
        std::env::set_var("APIWRAP_IGNORE_WRAP_FOR_OK_REQUESTS", "true");
        let options = WrapOptions::from_env();
        assert_eq!(options.response_body_log_mode, LogMode::LogAll);
        assert_eq!(options.request_body_log_text_length_limit, 128);
        assert!(options.ignore_wrap_for_ok_requests);
        std::env::remove_var("APIWRAP_RESPONSE_BODY_LOG_MODE");
        std::env::remove_var("APIWRAP_REQUEST_BODY_LOG_TEXT_LENGTH_LIMIT");
        std::env::remove_var("APIWRAP_IGNORE_WRAP_FOR_OK_REQUESTS");
    }
}
