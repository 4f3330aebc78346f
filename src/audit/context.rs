//! 監査ログレコードの文脈型
//!
//! リクエストスナップショットはダウンストリーム実行前に1回だけ採取し、
//! 以後は不変。レスポンス情報はラップ確定後の最終値から組み立てる。

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, HeaderMap, Request};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use uuid::Uuid;

/// ログ対象のリクエスト情報
#[derive(Debug, Clone, Serialize)]
pub struct RequestInfo {
    /// クライアントIP
    pub client_ip: Option<String>,
    /// HTTPメソッド
    pub method: String,
    /// スキーム
    pub scheme: String,
    /// ホスト
    pub host: String,
    /// パス
    pub path: String,
    /// 生のクエリ文字列
    pub query_string: String,
    /// キー単位にグループ化したクエリ（単一値または配列）
    pub query: BTreeMap<String, Value>,
    /// ボディテキスト（ポリシー除外時は"(Not Logged)"）
    pub body_string: String,
    /// 構造化ボディ（パース成功かつ長さ制限内のときのみ）
    pub body: Option<Value>,
    /// リクエストヘッダー（マスク適用済み）
    pub headers: BTreeMap<String, Value>,
    /// User-Agent解析結果
    pub user_agent: BTreeMap<String, String>,
}

/// ログ対象のレスポンス情報
#[derive(Debug, Clone, Serialize)]
pub struct ResponseInfo {
    /// 最終ステータスコード
    pub status_code: u16,
    /// 処理時間（ミリ秒、単調クロック）
    pub elapsed_ms: u64,
    /// ボディテキスト（ポリシー除外時は"(Not Logged)"）
    pub body_string: String,
    /// 構造化ボディ（パース成功かつ長さ制限内のときのみ）
    pub body: Option<Value>,
    /// レスポンスヘッダー（マスク適用済み）
    pub headers: BTreeMap<String, Value>,
}

/// 1リクエスト分の監査ログ文脈
#[derive(Debug, Clone, Serialize)]
pub struct ContextInfo {
    /// リクエスト相関ID
    pub request_id: Uuid,
    /// レコード生成時刻
    pub timestamp: DateTime<Utc>,
    /// リクエスト情報
    pub request: RequestInfo,
    /// レスポンス情報
    pub response: ResponseInfo,
    /// エンドポイント固有の追加プロパティ
    pub properties: BTreeMap<String, Value>,
}

/// ダウンストリーム実行前に採取するリクエストスナップショット
#[derive(Debug, Clone)]
pub struct RequestCapture {
    /// HTTPメソッド
    pub method: String,
    /// スキーム
    pub scheme: String,
    /// ホスト
    pub host: String,
    /// パス
    pub path: String,
    /// 生のクエリ文字列
    pub query_string: String,
    /// リクエストヘッダー
    pub headers: HeaderMap,
    /// クライアントIP
    pub client_ip: Option<String>,
    /// バッファ済みボディテキスト
    pub body_text: Option<String>,
}

impl RequestCapture {
    /// リクエストとバッファ済みボディテキストからスナップショットを採取する
    pub fn from_request(request: &Request<Body>, body_text: Option<String>) -> Self {
        let uri = request.uri();
        Self {
            method: request.method().to_string(),
            scheme: uri.scheme_str().unwrap_or("http").to_string(),
            host: uri
                .host()
                .map(str::to_string)
                .or_else(|| {
                    request
                        .headers()
                        .get(header::HOST)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string)
                })
                .unwrap_or_default(),
            path: uri.path().to_string(),
            query_string: uri.query().unwrap_or_default().to_string(),
            headers: request.headers().clone(),
            client_ip: client_ip(request),
            body_text,
        }
    }
}

/// クライアントIPを取得する（プロキシヘッダー優先）
fn client_ip(request: &Request<Body>) -> Option<String> {
    if let Some(forwarded) = request
        .headers()
        .get("x-forwarded-for")
        .or_else(|| request.headers().get("x-real-ip"))
        .and_then(|v| v.to_str().ok())
    {
        return Some(
            forwarded
                .split(',')
                .next()
                .unwrap_or(forwarded)
                .trim()
                .to_string(),
        );
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| normalize_ip(info.0.ip()).to_string())
}

/// IPv4-mapped IPv6（::ffff:x.x.x.x）をIPv4へ正規化する
fn normalize_ip(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                IpAddr::V4(v4)
            } else {
                IpAddr::V6(v6)
            }
        }
        v4 => v4,
    }
}

/// ヘッダーマップをキー単位の値（単一値または配列）へ変換する
pub fn group_headers(headers: &HeaderMap) -> BTreeMap<String, Value> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers.iter() {
        let text = String::from_utf8_lossy(value.as_bytes()).into_owned();
        grouped.entry(name.as_str().to_string()).or_default().push(text);
    }
    grouped
        .into_iter()
        .map(|(key, mut values)| {
            let value = if values.len() == 1 {
                Value::String(values.remove(0))
            } else {
                Value::Array(values.into_iter().map(Value::String).collect())
            };
            (key, value)
        })
        .collect()
}

/// クエリ文字列をキー単位の値（単一値または配列）へ変換する
///
/// パースに失敗した場合は空マップ（他のログ項目には影響しない）。
pub fn group_query(query_string: &str) -> BTreeMap<String, Value> {
    if query_string.is_empty() {
        return BTreeMap::new();
    }
    let pairs: Vec<(String, String)> = match serde_urlencoded::from_str(query_string) {
        Ok(pairs) => pairs,
        Err(_) => {
            tracing::debug!(query = %query_string, "cannot parse query string");
            return BTreeMap::new();
        }
    };
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, value) in pairs {
        grouped.entry(key).or_default().push(value);
    }
    grouped
        .into_iter()
        .map(|(key, mut values)| {
            let value = if values.len() == 1 {
                Value::String(values.remove(0))
            } else {
                Value::Array(values.into_iter().map(Value::String).collect())
            };
            (key, value)
        })
        .collect()
}
