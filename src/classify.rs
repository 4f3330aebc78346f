//! アウトカム分類
//!
//! ステータスコードと伝播したフォールトから Success / Failure / Fault を判定する。
//! 成功判定の述語はラップ判定とログ判定の両方で同一のものを使うこと。

use axum::http::StatusCode;
use serde_json::Value;

/// ダウンストリームから伝播したフォールト情報
///
/// ハンドラーのpanicから生成されるほか、ハンドラー自身がresponse extensionsへ
/// 挿入して「回復済みだが記録すべき」エラーを監査ログへ通知することもできる。
/// 回復済みフォールトは2xxレスポンスでも深刻度をERRORへ引き上げる。
#[derive(Debug, Clone)]
pub struct Fault {
    /// 人間可読なメッセージ
    pub message: String,
    /// problem-details相当の追加情報（任意）
    pub details: Option<Value>,
}

impl Fault {
    /// メッセージのみのフォールトを作成する
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }

    /// 追加情報付きのフォールトを作成する
    pub fn with_details(message: impl Into<String>, details: Value) -> Self {
        Self {
            message: message.into(),
            details: Some(details),
        }
    }

    /// panicペイロードからフォールトを生成する
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unhandled panic in downstream handler".to_string()
        };
        Self::new(message)
    }
}

/// リクエストの終端状態
#[derive(Debug, Clone)]
pub enum Outcome {
    /// 2xx-3xxで正常終了
    Success,
    /// 4xx以上のステータスで終了
    Failure(u16),
    /// ダウンストリームからpanicが伝播
    Fault(Fault),
}

impl Outcome {
    /// 成功アウトカムか
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

/// ステータスコードが成功範囲（2xx-3xx）か判定する
pub fn is_successful(status: StatusCode) -> bool {
    (200..400).contains(&status.as_u16())
}

/// ステータスコードとフォールトの有無からアウトカムを分類する
///
/// フォールトが存在する場合はステータスに関わらずFault。
pub fn classify(status: StatusCode, fault: Option<&Fault>) -> Outcome {
    if let Some(fault) = fault {
        return Outcome::Fault(fault.clone());
    }
    if is_successful(status) {
        Outcome::Success
    } else {
        Outcome::Failure(status.as_u16())
    }
}
