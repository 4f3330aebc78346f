//! User-Agent簡易解析
//!
//! ブラウザ・OS・デバイス種別のベストエフォート抽出。
//! 解析失敗は非致命的で、生文字列（`_Raw`）は常に残す。

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

static BROWSER_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    // 順序が重要: EdgeのUAはChrome/Safariを、ChromeのUAはSafariを含む
    [
        ("Edge", r"Edg(?:e|A|iOS)?/([0-9.]+)"),
        ("Opera", r"OPR/([0-9.]+)"),
        ("Chrome", r"Chrome/([0-9.]+)"),
        ("Firefox", r"Firefox/([0-9.]+)"),
        ("Safari", r"Version/([0-9.]+).*Safari"),
        ("curl", r"curl/([0-9.]+)"),
    ]
    .into_iter()
    .filter_map(|(name, pattern)| Regex::new(pattern).ok().map(|re| (name, re)))
    .collect()
});

static OS_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("Windows", r"Windows NT ([0-9.]+)"),
        ("iOS", r"(?:iPhone|CPU) OS ([0-9_]+)"),
        ("Android", r"Android ([0-9.]+)"),
        ("macOS", r"Mac OS X ([0-9_.]+)"),
        ("Linux", r"(Linux)"),
    ]
    .into_iter()
    .filter_map(|(name, pattern)| Regex::new(pattern).ok().map(|re| (name, re)))
    .collect()
});

/// User-Agent文字列からブラウザ/OS/デバイス情報を抽出する
///
/// 返り値には常に`_Raw`を含む。識別できた場合のみ`Browser`・
/// `BrowserVersion`・`OperatingSystem`・`OperatingSystemVersion`を追加する。
pub fn parse(raw: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    out.insert("_Raw".to_string(), raw.to_string());

    for (name, re) in BROWSER_PATTERNS.iter() {
        if let Some(caps) = re.captures(raw) {
            out.insert("Browser".to_string(), (*name).to_string());
            if let Some(version) = caps.get(1) {
                out.insert("BrowserVersion".to_string(), version.as_str().to_string());
            }
            break;
        }
    }

    for (name, re) in OS_PATTERNS.iter() {
        if let Some(caps) = re.captures(raw) {
            out.insert("OperatingSystem".to_string(), (*name).to_string());
            if *name != "Linux" {
                if let Some(version) = caps.get(1) {
                    out.insert(
                        "OperatingSystemVersion".to_string(),
                        version.as_str().replace('_', "."),
                    );
                }
            }
            break;
        }
    }

    out.insert("Device".to_string(), device_family(raw).to_string());
    out
}

fn device_family(raw: &str) -> &'static str {
    if raw.contains("iPad") {
        "iPad"
    } else if raw.contains("iPhone") {
        "iPhone"
    } else if raw.contains("Mobile") {
        "Mobile"
    } else {
        "Other"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chrome_on_windows() {
        let ua = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                  (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
        let parsed = parse(ua);
        assert_eq!(parsed["Browser"], "Chrome");
        assert_eq!(parsed["BrowserVersion"], "120.0.0.0");
        assert_eq!(parsed["OperatingSystem"], "Windows");
        assert_eq!(parsed["OperatingSystemVersion"], "10.0");
        assert_eq!(parsed["Device"], "Other");
    }

    #[test]
    fn test_parse_edge_not_reported_as_chrome() {
        let ua = "Mozilla/5.0 (Windows NT 10.0) AppleWebKit/537.36 (KHTML, like Gecko) \
                  Chrome/120.0.0.0 Safari/537.36 Edg/120.0.2210.91";
        let parsed = parse(ua);
        assert_eq!(parsed["Browser"], "Edge");
    }

    #[test]
    fn test_parse_safari_on_iphone() {
        let ua = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_2 like Mac OS X) \
                  AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Mobile/15E148 Safari/604.1";
        let parsed = parse(ua);
        assert_eq!(parsed["Browser"], "Safari");
        assert_eq!(parsed["OperatingSystem"], "iOS");
        assert_eq!(parsed["OperatingSystemVersion"], "17.2");
        assert_eq!(parsed["Device"], "iPhone");
    }

    #[test]
    fn test_parse_curl() {
        let parsed = parse("curl/8.4.0");
        assert_eq!(parsed["Browser"], "curl");
        assert_eq!(parsed["BrowserVersion"], "8.4.0");
    }

    #[test]
    fn test_parse_unknown_keeps_raw_only() {
        let parsed = parse("totally-custom-client");
        assert_eq!(parsed["_Raw"], "totally-custom-client");
        assert!(!parsed.contains_key("Browser"));
        assert!(!parsed.contains_key("OperatingSystem"));
        assert_eq!(parsed["Device"], "Other");
    }
}
