use crate::sanitize::{strip_forbidden, Platform};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateField {
    YearFull,
    YearShort,
    MonthName,
    MonthShortName,
    MonthPadded,
    Month,
    DayName,
    DayShortName,
    DayPadded,
    Day,
    Hour24,
    Hour12Padded,
    Hour12,
    MinutePadded,
    Minute,
    SecondPadded,
    Second,
    MeridiemUpper,
    MeridiemLower,
    Unix,
}

pub(crate) const DATE_FIELD_PATTERN: &str =
    "YYYY|YY|MMMM|MMM|MM|M|DDDD|DDD|DD|D|H|hh|h|mm|m|ss|s|A|a|unix";

impl DateField {
    pub fn parse(token: &str) -> Option<Self> {
        let field = match token {
            "YYYY" => DateField::YearFull,
            "YY" => DateField::YearShort,
            "MMMM" => DateField::MonthName,
            "MMM" => DateField::MonthShortName,
            "MM" => DateField::MonthPadded,
            "M" => DateField::Month,
            "DDDD" => DateField::DayName,
            "DDD" => DateField::DayShortName,
            "DD" => DateField::DayPadded,
            "D" => DateField::Day,
            "H" => DateField::Hour24,
            "hh" => DateField::Hour12Padded,
            "h" => DateField::Hour12,
            "mm" => DateField::MinutePadded,
            "m" => DateField::Minute,
            "ss" => DateField::SecondPadded,
            "s" => DateField::Second,
            "A" => DateField::MeridiemUpper,
            "a" => DateField::MeridiemLower,
            "unix" => DateField::Unix,
            _ => return None,
        };
        Some(field)
    }

    fn chrono_format(self) -> &'static str {
        match self {
            DateField::YearFull => "%Y",
            DateField::YearShort => "%y",
            DateField::MonthName => "%B",
            DateField::MonthShortName => "%b",
            DateField::MonthPadded => "%m",
            DateField::Month => "%-m",
            DateField::DayName => "%A",
            DateField::DayShortName => "%a",
            DateField::DayPadded => "%d",
            DateField::Day => "%-d",
            DateField::Hour24 => "%H",
            DateField::Hour12Padded => "%I",
            DateField::Hour12 => "%-I",
            DateField::MinutePadded => "%M",
            DateField::Minute => "%-M",
            DateField::SecondPadded => "%S",
            DateField::Second => "%-S",
            DateField::MeridiemUpper => "%p",
            DateField::MeridiemLower => "%P",
            DateField::Unix => "%s",
        }
    }

    pub fn format(self, date: &DateTime<Local>) -> String {
        date.format(self.chrono_format()).to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    Upper,
    Lower,
    Title,
    StripWindows,
    StripMac,
    StripDiacritics,
    Normalize,
    Date(DateField),
}

impl Transform {
    pub fn parse(id: &str) -> Option<Self> {
        let transform = match id {
            "up" => Transform::Upper,
            "lw" => Transform::Lower,
            "ti" => Transform::Title,
            "win" => Transform::StripWindows,
            "mac" => Transform::StripMac,
            "di" => Transform::StripDiacritics,
            "norm" => Transform::Normalize,
            other => {
                let field = other.strip_prefix("dt.")?;
                Transform::Date(DateField::parse(field)?)
            }
        };
        Some(transform)
    }

    pub fn apply(self, value: &str) -> String {
        match self {
            Transform::Upper => value.to_uppercase(),
            Transform::Lower => value.to_lowercase(),
            Transform::Title => title_case(value),
            Transform::StripWindows => strip_forbidden(value, Platform::Windows),
            Transform::StripMac => strip_forbidden(value, Platform::MacOs),
            Transform::StripDiacritics => remove_diacritics(value),
            Transform::Normalize => value.nfkc().collect(),
            Transform::Date(field) => match parse_date(value) {
                Some(date) => field.format(&date),
                None => value.to_string(),
            },
        }
    }
}

pub(crate) const TRANSFORM_PATTERN: &str = "up|lw|ti|win|mac|di|norm";

pub fn parse_chain(chain: &str) -> Vec<Transform> {
    let mut out = Vec::new();
    let mut rest = chain;
    while let Some(stripped) = rest.strip_prefix('.') {
        let (id, tail) = if let Some(after_dt) = stripped.strip_prefix("dt.") {
            let end = after_dt.find('.').unwrap_or(after_dt.len());
            (&stripped[..3 + end], &after_dt[end..])
        } else {
            let end = stripped.find('.').unwrap_or(stripped.len());
            (&stripped[..end], &stripped[end..])
        };
        if let Some(transform) = Transform::parse(id) {
            out.push(transform);
        }
        rest = tail;
    }
    out
}

pub fn apply_chain(value: String, chain: &[Transform]) -> String {
    chain
        .iter()
        .fold(value, |acc, transform| transform.apply(&acc))
}

fn title_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut word_start = true;
    for ch in value.chars() {
        if ch.is_alphanumeric() {
            if word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            word_start = false;
        } else {
            out.push(ch);
            word_start = ch != '\'';
        }
    }
    out
}

fn remove_diacritics(value: &str) -> String {
    value
        .nfd()
        .filter(|ch| !is_combining_mark(*ch))
        .nfc()
        .collect()
}

pub fn parse_date(input: &str) -> Option<DateTime<Local>> {
    let normalized = input.trim();
    if normalized.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(normalized) {
        return Some(dt.with_timezone(&Local));
    }

    let candidates = [
        "%Y:%m:%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y%m%d_%H%M%S",
        "%Y%m%d%H%M%S",
        "%d/%m/%Y %H:%M:%S",
    ];

    for fmt in candidates {
        if let Ok(naive) = NaiveDateTime::parse_from_str(normalized, fmt) {
            if let Some(local) = Local.from_local_datetime(&naive).single() {
                return Some(local);
            }
        }
    }

    for fmt in ["%Y-%m-%d", "%Y:%m:%d", "%Y%m%d", "%d/%m/%Y", "%B %d, %Y", "%d %B %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(normalized, fmt) {
            let naive = date.and_hms_opt(0, 0, 0)?;
            return Local.from_local_datetime(&naive).single();
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_transforms() {
        assert_eq!(Transform::Upper.apply("abc"), "ABC");
        assert_eq!(Transform::Lower.apply("ÀBC"), "àbc");
        assert_eq!(Transform::Title.apply("hello WORLD-wide o'neil"), "Hello World-Wide O'neil");
    }

    #[test]
    fn diacritics_are_removed() {
        assert_eq!(Transform::StripDiacritics.apply("Café Noël"), "Cafe Noel");
    }

    #[test]
    fn compatibility_normalization_folds_ligatures() {
        assert_eq!(Transform::Normalize.apply("ﬁle①"), "file1");
    }

    #[test]
    fn forbidden_strips_follow_platform_classes() {
        assert_eq!(Transform::StripWindows.apply("a:b*c?"), "abc");
        assert_eq!(Transform::StripMac.apply("a:b*c?"), "ab*c?");
    }

    #[test]
    fn date_transform_reformats_or_returns_input() {
        let year = Transform::parse("dt.YYYY").expect("dt.YYYY must parse");
        assert_eq!(year.apply("2021:07:04 10:11:12"), "2021");
        assert_eq!(year.apply("not a date"), "not a date");
    }

    #[test]
    fn chain_parsing_handles_date_fields() {
        let chain = parse_chain(".up.dt.MM.di");
        assert_eq!(
            chain,
            vec![
                Transform::Upper,
                Transform::Date(DateField::MonthPadded),
                Transform::StripDiacritics
            ]
        );
    }
}
