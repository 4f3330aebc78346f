//! APIレスポンスラップ＋監査ログミドルウェア
//!
//! 全APIレスポンスを統一エンベロープへ正規化し、リクエスト/レスポンスの
//! 構造化監査ログを出力するaxumミドルウェア。
//!
//! - 成功レスポンスは成功エンベロープへラップ（`ignore_wrap_for_ok_requests`で素通し可）
//! - 失敗・panicはエラーエンベロープまたはproblem-detailsへ変換
//! - 機密フィールドはワイルドカードパターンでマスクしてからログ出力
//! - インターセプトした1リクエストにつき監査ログレコードは必ず1件
//!
//! # 使い方
//!
//! ```no_run
//! use std::sync::Arc;
//! use axum::{middleware, routing::get, Router};
//! use apiwrap::{wrap_middleware, WrapOptions};
//!
//! let options = Arc::new(WrapOptions::default());
//! let app: Router = Router::new()
//!     .route("/api/hello", get(|| async { "hello" }))
//!     .layer(middleware::from_fn_with_state(options, wrap_middleware));
//! ```

#![warn(missing_docs)]

/// 設定管理（ログモード・マスクパターン・除外ルール等）
pub mod config;

/// エラー型定義
pub mod error;

/// アウトカム分類（Success / Failure / Fault）
pub mod classify;

/// 機密フィールドのマスキング
pub mod mask;

/// リクエスト/レスポンスボディのキャプチャ
pub mod capture;

/// レスポンスエンベロープの構築
pub mod wrap;

/// パス・エンドポイントフィルタ
pub mod filter;

/// User-Agent簡易解析
pub mod ua;

/// 監査ログシステム（文脈組み立て・出力判定・シンク）
pub mod audit;

/// パイプラインオーケストレータ
pub mod middleware;

/// ロギング初期化ユーティリティ
pub mod logging;

pub use classify::{Fault, Outcome};
pub use config::{ExcludeMode, ExcludeRule, LogMode, WrapOptions};
pub use filter::{
    LogIgnore, LogProperties, RequestDataLogIgnore, ResponseDataLogIgnore, WrapIgnore,
};
pub use middleware::wrap_middleware;
