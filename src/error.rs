//! エラー型定義
//!
//! パイプライン内部で発生する回復可能なエラー（thiserror使用）。
//! いずれもリクエスト全体を中断せず、警告ログを残して処理を継続する。

use thiserror::Error;

/// パイプライン内部エラー
#[derive(Debug, Error)]
pub enum WrapError {
    /// リクエストボディの読み込みに失敗
    #[error("cannot read request body: {0}")]
    RequestBodyRead(axum::Error),

    /// レスポンスボディの取り込みに失敗
    #[error("cannot read response body: {0}")]
    ResponseBodyRead(axum::Error),
}
