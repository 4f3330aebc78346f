//! レスポンスエンベロープの構築
//!
//! アウトカムとラップ設定から最終レスポンスのステータスとボディを決定する。
//! 204/304は常に素通し。フレームワーク既定のHTMLエラーページがエンベロープを
//! すり抜けないよう、API専用でない構成ではHTMLボディを404へ差し替える。

use crate::classify::Outcome;
use crate::config::WrapOptions;
use axum::http::StatusCode;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

/// ラップ判定の結果
#[derive(Debug, Clone, PartialEq)]
pub enum WrapOutput {
    /// 元ボディをそのまま通す
    Passthrough,
    /// ステータスとボディを差し替える
    Replace {
        /// 最終ステータスコード
        status: StatusCode,
        /// 最終ボディ（JSONテキスト）
        body: String,
    },
}

static HTML_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*<(!doctype\s+html|html)").expect("valid html regex"));

/// ボディがHTML文書に見えるか
pub fn is_html(body: &str) -> bool {
    HTML_RE.is_match(body)
}

/// 成功エンベロープを構築する
///
/// ボディがJSONとしてパースできる場合はパース済みツリーを、
/// できない場合は生テキストを`result`に載せる。
pub fn success_envelope(status: u16, body_text: &str) -> Value {
    json!({
        "message": "Request successful.",
        "isError": false,
        "statusCode": status,
        "result": parse_or_string(body_text),
    })
}

/// エラーエンベロープを構築する
pub fn error_envelope(status: u16, message: Value, details: Option<&Value>) -> Value {
    let mut exception = serde_json::Map::new();
    exception.insert("exceptionMessage".to_string(), message);
    if let Some(details) = details {
        exception.insert("details".to_string(), details.clone());
    }
    json!({
        "isError": true,
        "statusCode": status,
        "responseException": Value::Object(exception),
    })
}

fn parse_or_string(text: &str) -> Value {
    if text.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// 失敗レスポンスのメッセージをボディから導出する
///
/// ボディが空の場合はステータスの標準句を使う。
fn failure_message(status: StatusCode, body_text: &str) -> Value {
    if body_text.trim().is_empty() {
        Value::String(
            status
                .canonical_reason()
                .unwrap_or("Unhandled error occurred.")
                .to_string(),
        )
    } else {
        parse_or_string(body_text)
    }
}

/// problem-details実行器
///
/// `use_api_problem_details_exception`有効時、失敗・フォールトの最終レスポンスを
/// この実行器へ委譲する。既定実装はRFC 7807形状のJSONを返す。
pub trait ProblemDetailsExecutor: Send + Sync {
    /// problem-details応答（最終ステータスとボディ）を構築する
    fn execute(&self, status: StatusCode, detail: &str, instance: &str) -> (StatusCode, Value);
}

/// RFC 7807形状の既定problem-details実装
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultProblemDetails;

impl ProblemDetailsExecutor for DefaultProblemDetails {
    fn execute(&self, status: StatusCode, detail: &str, instance: &str) -> (StatusCode, Value) {
        let body = json!({
            "type": format!("https://httpstatuses.io/{}", status.as_u16()),
            "title": status.canonical_reason().unwrap_or("Error"),
            "status": status.as_u16(),
            "detail": detail,
            "instance": instance,
        });
        (status, body)
    }
}

/// アウトカムとラップ設定から最終レスポンス内容を決定する
pub fn apply(
    outcome: &Outcome,
    body_text: &str,
    status: StatusCode,
    path: &str,
    options: &WrapOptions,
) -> WrapOutput {
    // 204/304はボディ変換の対象外
    if status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED {
        return WrapOutput::Passthrough;
    }

    // API専用でない構成では、200で返ってきたHTML文書（典型的には
    // フレームワークの既定エラーページ）を404へ差し替える
    if !options.is_api_only
        && !options.bypass_html_validation
        && status == StatusCode::OK
        && is_html(body_text)
    {
        let body = error_envelope(
            404,
            Value::String("The requested resource was not found.".to_string()),
            None,
        );
        return WrapOutput::Replace {
            status: StatusCode::NOT_FOUND,
            body: body.to_string(),
        };
    }

    match outcome {
        Outcome::Success => {
            if options.ignore_wrap_for_ok_requests {
                WrapOutput::Passthrough
            } else {
                let body = success_envelope(status.as_u16(), body_text);
                WrapOutput::Replace {
                    status,
                    body: body.to_string(),
                }
            }
        }
        Outcome::Failure(code) => {
            let status =
                StatusCode::from_u16(*code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            if options.use_api_problem_details_exception {
                let detail = if body_text.trim().is_empty() {
                    status.canonical_reason().unwrap_or("Error").to_string()
                } else {
                    body_text.to_string()
                };
                let (status, body) = options.problem_details.execute(status, &detail, path);
                WrapOutput::Replace {
                    status,
                    body: body.to_string(),
                }
            } else {
                let body = error_envelope(*code, failure_message(status, body_text), None);
                WrapOutput::Replace {
                    status,
                    body: body.to_string(),
                }
            }
        }
        Outcome::Fault(fault) => {
            let status = StatusCode::INTERNAL_SERVER_ERROR;
            if options.use_api_problem_details_exception {
                let (status, body) =
                    options.problem_details.execute(status, &fault.message, path);
                WrapOutput::Replace {
                    status,
                    body: body.to_string(),
                }
            } else {
                let body = error_envelope(
                    status.as_u16(),
                    Value::String(fault.message.clone()),
                    fault.details.as_ref(),
                );
                WrapOutput::Replace {
                    status,
                    body: body.to_string(),
                }
            }
        }
    }
}
