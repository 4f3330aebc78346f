//! 監査ログレコードの組み立てと出力判定
//!
//! マスターモード・チャンネル別モード・エンドポイントマーカーを1つの
//! 決定へ合成し、マスク・切り詰めを適用したレコードをシンクへ出力する。
//! 呼び出しは1リクエストにつき最大1回であること。

use crate::audit::context::{group_headers, group_query, ContextInfo, RequestCapture, RequestInfo, ResponseInfo};
use crate::classify::Fault;
use crate::config::{LogMode, WrapOptions};
use crate::filter::EndpointMarkers;
use crate::mask::Masker;
use crate::ua;
use axum::http::{header, HeaderMap};
use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// ポリシーで除外したチャンネルに入れるプレースホルダ
///
/// 「空だった」と「ポリシーで除外した」を下流の消費者が区別できるよう、
/// 省略ではなく必ずこのリテラルを出力する。
pub const NOT_LOGGED: &str = "(Not Logged)";

/// 1件の監査ログレコードを組み立てて出力する
///
/// 出力しない判定（マスターモードLogNone・LogAll以外での成功・
/// LogIgnoreマーカー）の場合は何も出力せずfalseを返す。
#[allow(clippy::too_many_arguments)]
pub fn emit(
    options: &WrapOptions,
    request: &RequestCapture,
    response_headers: &HeaderMap,
    final_status: u16,
    final_body_text: Option<&str>,
    elapsed_ms: u64,
    is_request_ok: bool,
    fault: Option<&Fault>,
    markers: &EndpointMarkers,
) -> bool {
    if options.log_mode == LogMode::LogNone {
        return false;
    }
    if is_request_ok && options.log_mode != LogMode::LogAll {
        return false;
    }
    if markers.log_ignore {
        return false;
    }

    let level = (options.get_level)(final_status, elapsed_ms, fault);
    let masker = options.masker();

    // リクエストチャンネル。ヘッダー・クエリ・User-Agentはリクエストデータ
    // チャンネル自体が含まれる場合のみ採取する
    let mut request_body = String::new();
    let mut request_body_object = None;
    let mut request_headers = BTreeMap::new();
    let mut request_query = BTreeMap::new();
    let mut user_agent = BTreeMap::new();

    if options.request_body_log_mode.includes(is_request_ok) {
        if markers.request_data_log_ignore {
            request_body = NOT_LOGGED.to_string();
        } else if let Some(text) = request.body_text.as_deref() {
            let (text, object) = prepare_body(
                text,
                &masker,
                options.log_request_body_as_structured_object,
                options.request_body_log_text_length_limit,
            );
            request_body = text;
            request_body_object = object;
        }

        if options.request_header_log_mode.includes(is_request_ok) {
            request_headers = group_headers(&request.headers);
            masker.mask_flat(&mut request_headers);
        }

        if let Some(raw) = request
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
        {
            user_agent = ua::parse(raw);
        }

        request_query = group_query(&request.query_string);
    } else {
        request_body = NOT_LOGGED.to_string();
    }

    // レスポンスチャンネル
    let mut response_body = String::new();
    let mut response_body_object = None;
    if options.response_body_log_mode.includes(is_request_ok) {
        if markers.response_data_log_ignore {
            response_body = NOT_LOGGED.to_string();
        } else if let Some(text) = final_body_text {
            if !text.trim().is_empty() {
                let (text, object) = prepare_body(
                    text,
                    &masker,
                    options.log_response_body_as_structured_object,
                    options.response_body_log_text_length_limit,
                );
                response_body = text;
                response_body_object = object;
            }
        }
    } else {
        response_body = NOT_LOGGED.to_string();
    }

    let mut response_header_map = BTreeMap::new();
    if options.response_header_log_mode.includes(is_request_ok) {
        response_header_map = group_headers(response_headers);
        masker.mask_flat(&mut response_header_map);
    }

    let context = ContextInfo {
        request_id: Uuid::new_v4(),
        timestamp: Utc::now(),
        request: RequestInfo {
            client_ip: request.client_ip.clone(),
            method: request.method.clone(),
            scheme: request.scheme.clone(),
            host: request.host.clone(),
            path: request.path.clone(),
            query_string: request.query_string.clone(),
            query: request_query,
            body_string: request_body,
            body: request_body_object,
            headers: request_headers,
            user_agent,
        },
        response: ResponseInfo {
            status_code: final_status,
            elapsed_ms,
            body_string: response_body,
            body: response_body_object,
            headers: response_header_map,
        },
        properties: markers.properties.clone(),
    };

    let entry = (options.get_log_message_and_properties)(&context);
    options.sink.write(level, fault, &entry);
    true
}

/// ボディテキストをマスク・構造化・切り詰めして返す
///
/// 構造化が有効でJSONとしてパースできた場合はマスク済みツリーと
/// その整形テキストを使う。切り詰めが発生した場合は、テキストと
/// 構造化表現の不一致を避けるため構造化表現を破棄する。
fn prepare_body(
    text: &str,
    masker: &Masker,
    structured: bool,
    limit: usize,
) -> (String, Option<Value>) {
    let mut body_text = text.to_string();
    let mut body_object = None;
    if structured {
        if let Some(masked) = masker.mask_text(text) {
            body_text = masked.to_string();
            body_object = Some(masked);
        }
    }
    if body_text.chars().count() > limit {
        body_text = body_text.chars().take(limit).collect();
        body_object = None;
    }
    (body_text, body_object)
}
