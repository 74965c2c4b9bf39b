//! Field extractors shared by the page parsers.
//!
//! Every function here tolerates missing or empty input and answers `None`
//! (or a documented empty value) instead of failing.

use chrono::{NaiveDate, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::ElementRef;

/// Arrival order of a disqualified horse (失格)
pub const ORDER_DISQUALIFIED: i32 = -20;
/// Arrival order of a horse that did not finish (中止)
pub const ORDER_STOPPED: i32 = -30;
/// Arrival order of an excluded horse (除外)
pub const ORDER_EXCLUDED: i32 = -40;
/// Arrival order of a scratched horse (取消)
pub const ORDER_WITHDRAWN: i32 = -50;

static CNAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"CNAME=([^&]+)").unwrap());
static DOACTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"doAction\([^,]+,\s*'([^']+)'\)").unwrap());
static SEX_AGE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.+?)(\d+)").unwrap());
static JP_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4})年(\d{1,2})月(\d{1,2})日").unwrap());
static JP_TIME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{1,2})時(\d{1,2})分").unwrap());

/// Text of an element, each text node trimmed and then concatenated
pub fn element_text(element: &ElementRef) -> String {
    element.text().map(str::trim).collect()
}

/// Text of the element's own text nodes, ignoring child elements
pub fn own_text(element: &ElementRef) -> String {
    element
        .children()
        .filter_map(|node| node.value().as_text())
        .map(|text| text.trim())
        .collect()
}

fn clean_number(text: &str) -> String {
    text.trim().replace(',', "")
}

/// Parse an integer, treating empty input as absent
pub fn parse_int(text: &str) -> Option<i32> {
    let cleaned = clean_number(text);
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok()
}

/// Parse a float, treating empty input as absent
pub fn parse_float(text: &str) -> Option<f64> {
    let cleaned = clean_number(text);
    if cleaned.is_empty() {
        return None;
    }
    if cleaned.starts_with('.') {
        return format!("0{}", cleaned).parse().ok();
    }
    cleaned.parse().ok()
}

/// Parse a race time `M:SS[.c]` into seconds
pub fn parse_minsec(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    match text.split_once(':') {
        Some((minutes, seconds)) => {
            let minutes: f64 = minutes.trim().parse().ok()?;
            let seconds: f64 = seconds.trim().parse().ok()?;
            Some(minutes * 60.0 + seconds)
        }
        None => text.parse().ok(),
    }
}

/// Decode an arrival order, mapping the four non-finish markers to sentinels
pub fn parse_arrival_order(text: &str) -> Option<i32> {
    match text.trim() {
        "失格" => Some(ORDER_DISQUALIFIED),
        "中止" => Some(ORDER_STOPPED),
        "除外" => Some(ORDER_EXCLUDED),
        "取消" => Some(ORDER_WITHDRAWN),
        other => other.parse().ok(),
    }
}

/// Split a sex+age token such as `牝3` or `せん6`.
///
/// Malformed input yields `("", 0)`.
pub fn split_sex_age(text: &str) -> (String, i32) {
    SEX_AGE_RE
        .captures(text.trim())
        .and_then(|caps| {
            let age = caps[2].parse().ok()?;
            Some((caps[1].to_string(), age))
        })
        .unwrap_or_default()
}

/// Identifier carried by the `CNAME` query parameter of a link
pub fn extract_cname_code(link: &str) -> Option<String> {
    CNAME_RE.captures(link).map(|caps| caps[1].to_string())
}

/// Second argument of an inline `doAction('/path', 'CODE')` handler
pub fn extract_doaction_code(onclick: &str) -> Option<String> {
    DOACTION_RE.captures(onclick).map(|caps| caps[1].to_string())
}

/// Date written as `2024年12月1日`, ignoring any trailing weekday
pub fn parse_jp_date(text: &str) -> Option<NaiveDate> {
    let caps = JP_DATE_RE.captures(text)?;
    NaiveDate::from_ymd_opt(
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
    )
}

/// Start time written as `10時05分`
pub fn parse_jp_time(text: &str) -> Option<NaiveTime> {
    let caps = JP_TIME_RE.captures(text)?;
    NaiveTime::from_hms_opt(caps[1].parse().ok()?, caps[2].parse().ok()?, 0)
}

/// Remove full-width and ASCII parentheses
pub fn strip_brackets(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '（' | '）' | '(' | ')'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    #[test]
    fn test_parse_int_absent() {
        assert_eq!(parse_int(""), None);
        assert_eq!(parse_int("   "), None);
        assert_eq!(parse_int("12"), Some(12));
        assert_eq!(parse_int("1,234"), Some(1234));
        assert_eq!(parse_int("計不"), None);
    }

    #[test]
    fn test_parse_float() {
        assert_eq!(parse_float(""), None);
        assert_eq!(parse_float("57.5"), Some(57.5));
        assert_eq!(parse_float(".154"), Some(0.154));
        assert_eq!(parse_float("-4"), Some(-4.0));
    }

    #[test]
    fn test_parse_minsec() {
        assert_eq!(parse_minsec("1:35.4"), Some(95.4));
        assert_eq!(parse_minsec("2:01"), Some(121.0));
        assert_eq!(parse_minsec("59.8"), Some(59.8));
        assert_eq!(parse_minsec(""), None);
        assert_eq!(parse_minsec("x:10"), None);
    }

    #[test]
    fn test_arrival_order_sentinels() {
        assert_eq!(parse_arrival_order("失格"), Some(ORDER_DISQUALIFIED));
        assert_eq!(parse_arrival_order("中止"), Some(ORDER_STOPPED));
        assert_eq!(parse_arrival_order("除外"), Some(ORDER_EXCLUDED));
        assert_eq!(parse_arrival_order("取消"), Some(ORDER_WITHDRAWN));

        let sentinels = [
            ORDER_DISQUALIFIED,
            ORDER_STOPPED,
            ORDER_EXCLUDED,
            ORDER_WITHDRAWN,
        ];
        for (i, a) in sentinels.iter().enumerate() {
            assert!(*a < 0);
            for b in &sentinels[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_arrival_order_numeric() {
        for n in 1..=18 {
            assert_eq!(parse_arrival_order(&n.to_string()), Some(n));
        }
        assert_eq!(parse_arrival_order(""), None);
        assert_eq!(parse_arrival_order("同着"), None);
    }

    #[test]
    fn test_split_sex_age_roundtrip() {
        for token in ["牝3", "牡5", "せん6", "セ10"] {
            let (sex, age) = split_sex_age(token);
            let digits: String = token.chars().filter(|c| c.is_ascii_digit()).collect();
            assert_eq!(format!("{}{}", sex, age), token);
            assert_eq!(age.to_string(), digits);
        }
    }

    #[test]
    fn test_split_sex_age_malformed() {
        assert_eq!(split_sex_age("牝"), (String::new(), 0));
        assert_eq!(split_sex_age(""), (String::new(), 0));
        assert_eq!(split_sex_age("3"), (String::new(), 0));
    }

    #[test]
    fn test_extract_cname_code() {
        assert_eq!(
            extract_cname_code("/JRADB/accessS.html?CNAME=ABC123"),
            Some("ABC123".to_string())
        );
        assert_eq!(
            extract_cname_code("/JRADB/accessU.html?CNAME=pw01dud101992109618/50&x=1"),
            Some("pw01dud101992109618/50".to_string())
        );
        assert_eq!(extract_cname_code("/JRADB/accessS.html"), None);
    }

    #[test]
    fn test_extract_doaction_code() {
        assert_eq!(
            extract_doaction_code("doAction('/path','XYZ789')"),
            Some("XYZ789".to_string())
        );
        assert_eq!(
            extract_doaction_code("return doAction('/JRADB/accessK.html', 'pw04kmk001122/66');"),
            Some("pw04kmk001122/66".to_string())
        );
        assert_eq!(extract_doaction_code("return false;"), None);
        assert_eq!(extract_doaction_code("doAction('/path')"), None);
    }

    #[test]
    fn test_parse_jp_date_and_time() {
        assert_eq!(
            parse_jp_date("2024年12月1日（日曜）"),
            NaiveDate::from_ymd_opt(2024, 12, 1)
        );
        assert_eq!(parse_jp_date("2024年13月1日"), None);
        assert_eq!(parse_jp_time("10時05分"), NaiveTime::from_hms_opt(10, 5, 0));
        assert_eq!(parse_jp_time(""), None);
    }

    #[test]
    fn test_element_text_and_own_text() {
        let html = Html::parse_fragment(
            r#"<div class="cell course"> 2,000<span class="unit">メートル</span> </div>"#,
        );
        let selector = Selector::parse("div.course").unwrap();
        let div = html.select(&selector).next().unwrap();
        assert_eq!(element_text(&div), "2,000メートル");
        assert_eq!(own_text(&div), "2,000");
    }

    #[test]
    fn test_strip_brackets() {
        assert_eq!(strip_brackets("（芝・右）"), "芝・右");
        assert_eq!(strip_brackets("(+4)"), "+4");
    }
}
