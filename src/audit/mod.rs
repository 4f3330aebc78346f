//! 監査ログシステム
//!
//! 分類済みアウトカム・キャプチャ済みボディ・ログポリシーを
//! 1件の構造化レコードへ組み立て、設定されたシンクへ出力する。

/// レコードの組み立てと出力判定
pub mod assembler;

/// ログレコードの文脈型（リクエスト/レスポンススナップショット）
pub mod context;

/// ログ出力先（既定はtracingイベント）
pub mod sink;
