//! 機密フィールドのマスキング
//!
//! ワイルドカードパターンに一致するキーの値をマスク文字列へ置換する。
//! JSONツリーとフラットなヘッダーマップの両方に同じパターンを適用できる。
//! マスキングはベストエフォートであり、JSONとして不正なテキストは
//! 変更せずそのまま残す。

use regex::{Regex, RegexBuilder};
use serde_json::Value;
use std::collections::BTreeMap;

/// コンパイル済みワイルドカードマスカー
///
/// パターン中の `*` は任意の文字列に一致する（大文字小文字を区別しない）。
/// 一致したキーの値のみを置換し、キー名は保持する。
#[derive(Debug, Clone)]
pub struct Masker {
    patterns: Vec<Regex>,
    mask: String,
}

impl Masker {
    /// パターン一覧とマスク文字列からマスカーを構築する
    pub fn new(patterns: &[String], mask: &str) -> Self {
        let patterns = patterns.iter().filter_map(|p| compile_wildcard(p)).collect();
        Self {
            patterns,
            mask: mask.to_string(),
        }
    }

    /// キーパスがいずれかのパターンに一致するか
    fn matches(&self, path: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(path))
    }

    /// JSONツリーの機密値をインプレースでマスクする
    ///
    /// オブジェクトの子キーをドット連結パスで照合し、最初に一致した時点で
    /// 値をマスク文字列へ置換する。置換後のサブツリーには再帰しない
    /// （値はスカラーになるため最外の一致のみが適用される）。
    pub fn mask_value(&self, value: &mut Value) {
        if self.patterns.is_empty() {
            return;
        }
        self.mask_node(value, "");
    }

    fn mask_node(&self, value: &mut Value, path: &str) {
        match value {
            Value::Object(map) => {
                for (key, child) in map.iter_mut() {
                    let child_path = if path.is_empty() {
                        key.clone()
                    } else {
                        format!("{path}.{key}")
                    };
                    if self.matches(&child_path) {
                        *child = Value::String(self.mask.clone());
                    } else {
                        self.mask_node(child, &child_path);
                    }
                }
            }
            Value::Array(items) => {
                for (index, child) in items.iter_mut().enumerate() {
                    let child_path = format!("{path}[{index}]");
                    self.mask_node(child, &child_path);
                }
            }
            _ => {}
        }
    }

    /// JSONテキストをパースしてマスク済みツリーを返す
    ///
    /// JSONとして不正なテキストは`None`を返し、呼び出し側は元テキストを
    /// そのまま使う。
    pub fn mask_text(&self, text: &str) -> Option<Value> {
        let mut value: Value = serde_json::from_str(text).ok()?;
        self.mask_value(&mut value);
        Some(value)
    }

    /// フラットなキー→値マップ（ヘッダー等）をマスクする
    pub fn mask_flat(&self, map: &mut BTreeMap<String, Value>) {
        for (key, value) in map.iter_mut() {
            if self.matches(key) {
                *value = Value::String(self.mask.clone());
            }
        }
    }
}

/// 単一のワイルドカードパターンとの一致判定
///
/// マスクパターンと同じ `*` セマンティクス。除外ルールのWildcardモードでも使う。
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    compile_wildcard(pattern)
        .map(|re| re.is_match(text))
        .unwrap_or(false)
}

/// ワイルドカードパターンを正規表現へ変換する
///
/// `*` 以外をエスケープし、全体を `^...$` でアンカーする。
fn compile_wildcard(pattern: &str) -> Option<Regex> {
    let escaped = regex::escape(pattern).replace(r"\*", ".*");
    RegexBuilder::new(&format!("^{escaped}$"))
        .case_insensitive(true)
        .build()
        .ok()
}
