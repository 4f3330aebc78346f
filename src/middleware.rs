//! パイプラインオーケストレータ
//!
//! フィルタ → リクエストキャプチャ → ダウンストリーム実行 → 分類 → ラップ →
//! 監査ログの順に1リクエストを処理するaxumミドルウェア。ダウンストリームの
//! panicはフォールトとして回収し、500エンベロープへ変換する。

use crate::audit::assembler;
use crate::audit::context::RequestCapture;
use crate::capture::{self, CapturedResponse};
use crate::classify::{self, Fault};
use crate::config::WrapOptions;
use crate::filter::{self, EndpointMarkers};
use crate::wrap::{self, WrapOutput};
use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

/// レスポンスラップ＋監査ログミドルウェア
///
/// `axum::middleware::from_fn_with_state(options, wrap_middleware)` で
/// Routerへ適用する。フィルタを通過した1リクエストにつき監査ログレコードは
/// 必ず1件だけ出力される。バイパスされたリクエストには一切手を加えない。
pub async fn wrap_middleware(
    State(options): State<Arc<WrapOptions>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if !filter::should_intercept(&path, &options) {
        return next.run(request).await;
    }

    let started = Instant::now();

    let buffered = capture::buffer_request(request).await;
    if let Some(err) = &buffered.error {
        warn!(error = %err, path = %path, "request body capture failed, continuing with empty body");
    }
    let snapshot = RequestCapture::from_request(&buffered.request, buffered.body_text);

    // ダウンストリーム実行。panicはフォールトとして回収する
    let mut panic_fault = None;
    let response = match AssertUnwindSafe(next.run(buffered.request)).catch_unwind().await {
        Ok(response) => response,
        Err(payload) => {
            panic_fault = Some(Fault::from_panic(payload));
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    };

    let markers = EndpointMarkers::from_extensions(response.extensions());
    let reported_fault = response.extensions().get::<Fault>().cloned();

    let captured = match capture::buffer_response(response).await {
        CapturedResponse::Buffered(captured) => captured,
        CapturedResponse::Started(response) => {
            // 出力開始済み: ボディの書き換えは断念し、ベストエフォートでログのみ残す
            warn!(
                path = %snapshot.path,
                "response has already started, response wrapping will not be applied"
            );
            let status = response.status();
            let fault = panic_fault.as_ref().or(reported_fault.as_ref());
            let is_request_ok = classify::is_successful(status) && panic_fault.is_none();
            assembler::emit(
                &options,
                &snapshot,
                response.headers(),
                status.as_u16(),
                None,
                started.elapsed().as_millis() as u64,
                is_request_ok,
                fault,
                &markers,
            );
            return response;
        }
    };

    let status = captured.parts.status;
    let body_text = captured.read_text();
    let outcome = classify::classify(status, panic_fault.as_ref());

    let output = if markers.wrap_ignore {
        WrapOutput::Passthrough
    } else {
        wrap::apply(&outcome, &body_text, status, &snapshot.path, &options)
    };

    let (final_status, final_body_text, response) = match output {
        WrapOutput::Passthrough => (status.as_u16(), body_text, captured.into_passthrough()),
        WrapOutput::Replace { status, body } => {
            let response = captured.into_replaced(status, body.clone());
            (status.as_u16(), body, response)
        }
    };

    let fault = panic_fault.as_ref().or(reported_fault.as_ref());
    let is_request_ok = outcome.is_success();
    assembler::emit(
        &options,
        &snapshot,
        response.headers(),
        final_status,
        Some(&final_body_text),
        started.elapsed().as_millis() as u64,
        is_request_ok,
        fault,
        &markers,
    );

    response
}
