//! ログ出力先
//!
//! 既定はtracingイベントへの出力。専用トランスポートやテスト用カウンタへ
//! 差し替えられるよう、`LogSink`トレイトで抽象化する。

use crate::classify::Fault;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::Level;

/// 構築済みのログメッセージとプロパティ
#[derive(Debug, Clone, Default)]
pub struct LogEntryParameters {
    /// フォーマット済みメッセージ
    pub message: String,
    /// 追加の名前付きプロパティ
    pub additional_properties: BTreeMap<String, Value>,
}

/// 監査ログレコードの出力先
///
/// 多数の同時リクエストから呼ばれるため`Send + Sync`であること。
pub trait LogSink: Send + Sync {
    /// 1件のレコードを出力する
    fn write(&self, level: Level, fault: Option<&Fault>, entry: &LogEntryParameters);
}

/// tracingイベントとして出力する既定シンク
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write(&self, level: Level, fault: Option<&Fault>, entry: &LogEntryParameters) {
        let properties =
            serde_json::to_string(&entry.additional_properties).unwrap_or_default();
        let fault_message = fault.map(|f| f.message.as_str());
        if level == Level::ERROR {
            tracing::error!(properties = %properties, fault = fault_message, "{}", entry.message);
        } else if level == Level::WARN {
            tracing::warn!(properties = %properties, fault = fault_message, "{}", entry.message);
        } else if level == Level::INFO {
            tracing::info!(properties = %properties, fault = fault_message, "{}", entry.message);
        } else if level == Level::DEBUG {
            tracing::debug!(properties = %properties, fault = fault_message, "{}", entry.message);
        } else {
            tracing::trace!(properties = %properties, fault = fault_message, "{}", entry.message);
        }
    }
}

static DEFAULT_SINK: Lazy<Arc<TracingSink>> = Lazy::new(|| Arc::new(TracingSink));

/// プロセス共通の既定シンクを返す
///
/// 明示的なシンクが設定されていない場合に使われ、プロセスにつき1回だけ解決される。
pub fn default_sink() -> Arc<dyn LogSink> {
    DEFAULT_SINK.clone()
}
