//! ボディキャプチャ
//!
//! リクエスト/レスポンスボディを一度メモリバッファへ取り込み、検査・書き換えの後に
//! クライアントへ返すボディとして復元する。元ボディの復元は所有権で保証され、
//! `CapturedBody`を消費する以外に最終レスポンスを構築する経路はない。

use crate::error::WrapError;
use axum::body::{Body, Bytes};
use axum::http::response::Parts;
use axum::http::{header, HeaderValue, Request, StatusCode};
use axum::response::Response;
use http_body::Body as HttpBody;

/// バッファ済みリクエスト
///
/// ボディはバイト列として取り込み済みで、ダウンストリームへはそのバイト列から
/// 再構築したボディを渡す。読み込みに失敗した場合はエラーを保持し、空ボディで
/// 処理を継続する。
pub struct BufferedRequest {
    /// ボディを復元したリクエスト
    pub request: Request<Body>,
    /// ボディテキスト（空ボディはNone）
    pub body_text: Option<String>,
    /// 読み込み時のエラー（あれば）
    pub error: Option<WrapError>,
}

/// バッファ済みレスポンス
#[derive(Debug)]
pub struct CapturedBody {
    /// ステータス・ヘッダー等のレスポンスparts
    pub parts: Parts,
    /// バッファ済みボディ
    pub bytes: Bytes,
    /// ボディの取り込みに成功したか
    pub captured: bool,
}

impl CapturedBody {
    /// バッファ済みボディをテキストとして読む（非UTF-8は損失変換）
    pub fn read_text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    /// バッファ済みボディをそのまま復元したレスポンスを返す
    pub fn into_passthrough(self) -> Response {
        Response::from_parts(self.parts, Body::from(self.bytes))
    }

    /// ステータスとボディを差し替えたレスポンスを返す
    ///
    /// content-lengthは再計算に任せるため破棄し、content-typeをJSONへ更新する。
    pub fn into_replaced(mut self, status: StatusCode, body: String) -> Response {
        self.parts.status = status;
        self.parts.headers.remove(header::CONTENT_LENGTH);
        self.parts.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        Response::from_parts(self.parts, Body::from(body))
    }
}

/// レスポンスキャプチャの結果
pub enum CapturedResponse {
    /// ボディをバッファへ取り込んだ
    Buffered(CapturedBody),
    /// 出力開始済み（サイズ上限が不明なストリーミング応答）。取り込みを断念し、
    /// レスポンスへ手を加えずに返す。
    Started(Response),
}

/// リクエストボディをバッファへ取り込み、再読込可能なリクエストとして復元する
pub async fn buffer_request(request: Request<Body>) -> BufferedRequest {
    let (parts, body) = request.into_parts();
    match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => {
            let body_text = if bytes.is_empty() {
                None
            } else {
                Some(String::from_utf8_lossy(&bytes).into_owned())
            };
            BufferedRequest {
                request: Request::from_parts(parts, Body::from(bytes)),
                body_text,
                error: None,
            }
        }
        Err(err) => BufferedRequest {
            request: Request::from_parts(parts, Body::empty()),
            body_text: None,
            error: Some(WrapError::RequestBodyRead(err)),
        },
    }
}

/// レスポンスボディをバッファへ取り込む
///
/// サイズ上限が報告されないボディ（SSE・チャンク転送等）は出力開始済みとみなす。
/// バッファリングすると配信が壊れるため、書き換え対象にしない。
pub async fn buffer_response(response: Response) -> CapturedResponse {
    if HttpBody::size_hint(response.body()).upper().is_none() {
        return CapturedResponse::Started(response);
    }
    let (parts, body) = response.into_parts();
    match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => CapturedResponse::Buffered(CapturedBody {
            parts,
            bytes,
            captured: true,
        }),
        Err(err) => {
            tracing::warn!(error = %WrapError::ResponseBodyRead(err), "response body capture failed");
            CapturedResponse::Buffered(CapturedBody {
                parts,
                bytes: Bytes::new(),
                captured: false,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn test_buffer_request_preserves_body() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/data")
            .body(Body::from(r#"{"a":1}"#))
            .unwrap();
        let buffered = buffer_request(request).await;
        assert_eq!(buffered.body_text.as_deref(), Some(r#"{"a":1}"#));
        assert!(buffered.error.is_none());

        // ダウンストリームは復元済みボディを読める
        let bytes = axum::body::to_bytes(buffered.request.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], br#"{"a":1}"#);
    }

    #[tokio::test]
    async fn test_buffer_request_empty_body_is_none() {
        let request = Request::builder().uri("/api/x").body(Body::empty()).unwrap();
        let buffered = buffer_request(request).await;
        assert!(buffered.body_text.is_none());
    }

    #[tokio::test]
    async fn test_buffer_response_roundtrip() {
        let response = Response::new(Body::from("hello"));
        match buffer_response(response).await {
            CapturedResponse::Buffered(captured) => {
                assert!(captured.captured);
                assert_eq!(captured.read_text(), "hello");
                let response = captured.into_passthrough();
                let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                    .await
                    .unwrap();
                assert_eq!(&bytes[..], b"hello");
            }
            CapturedResponse::Started(_) => panic!("expected buffered response"),
        }
    }

    #[tokio::test]
    async fn test_buffer_response_detects_streaming() {
        let body = Body::from_stream(stream::iter(vec![Ok::<_, std::io::Error>(
            Bytes::from_static(b"chunk"),
        )]));
        let response = Response::new(body);
        match buffer_response(response).await {
            CapturedResponse::Started(_) => {}
            CapturedResponse::Buffered(_) => panic!("streaming body must not be buffered"),
        }
    }

    #[tokio::test]
    async fn test_into_replaced_sets_json_content_type() {
        let mut response = Response::new(Body::from("raw"));
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain"),
        );
        let CapturedResponse::Buffered(captured) = buffer_response(response).await else {
            panic!("expected buffered response");
        };
        let replaced = captured.into_replaced(StatusCode::BAD_REQUEST, "{}".to_string());
        assert_eq!(replaced.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            replaced.headers()[header::CONTENT_TYPE],
            "application/json; charset=utf-8"
        );
        assert!(replaced.headers().get(header::CONTENT_LENGTH).is_none());
    }
}
