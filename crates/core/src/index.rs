use crate::sanitize::LONGEST_NAME_LIMIT;
use crate::template::TemplateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NumeralSystem {
    #[default]
    Decimal,
    Roman,
    Hex,
    Octal,
    Binary,
}

impl NumeralSystem {
    pub fn from_suffix(suffix: Option<&str>) -> Self {
        match suffix {
            Some("r") => NumeralSystem::Roman,
            Some("h") => NumeralSystem::Hex,
            Some("o") => NumeralSystem::Octal,
            Some("b") => NumeralSystem::Binary,
            _ => NumeralSystem::Decimal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Width {
    pub digits: usize,
    pub zero_pad: bool,
}

impl Width {
    pub fn parse(raw: &str) -> Result<Self, TemplateError> {
        if raw.is_empty() {
            return Ok(Self::default());
        }
        let digits = parse_length(raw, "index width")?;
        Ok(Self {
            digits,
            zero_pad: raw.starts_with('0'),
        })
    }
}

pub fn parse_length(raw: &str, what: &'static str) -> Result<usize, TemplateError> {
    match raw.parse::<usize>() {
        Ok(len) if len <= LONGEST_NAME_LIMIT => Ok(len),
        _ => Err(TemplateError::LengthTooLarge {
            what,
            value: raw.to_string(),
            limit: LONGEST_NAME_LIMIT,
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipRange {
    pub min: i64,
    pub max: i64,
}

impl SkipRange {
    pub fn contains(&self, value: i64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub capture_group: Option<usize>,
    pub start: i64,
    pub step: i64,
    pub width: Width,
    pub numeral: NumeralSystem,
    pub skip: Vec<SkipRange>,
    pub occurrence: usize,
}

impl Default for IndexSpec {
    fn default() -> Self {
        Self {
            capture_group: None,
            start: 1,
            step: 1,
            width: Width::default(),
            numeral: NumeralSystem::Decimal,
            skip: Vec::new(),
            occurrence: 0,
        }
    }
}

pub fn parse_skip_ranges(raw: &str) -> Result<Vec<SkipRange>, TemplateError> {
    let mut ranges = Vec::new();
    for item in raw.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        let invalid = || TemplateError::InvalidSkipRange(item.to_string());
        let (min, max) = match item.get(1..).and_then(|rest| rest.find('-')) {
            Some(pos) => {
                let split = pos + 1;
                let min = item[..split].trim().parse::<i64>().map_err(|_| invalid())?;
                let max = item[split + 1..].trim().parse::<i64>().map_err(|_| invalid())?;
                (min, max)
            }
            None => {
                let value = item.parse::<i64>().map_err(|_| invalid())?;
                (value, value)
            }
        };
        if min > max {
            return Err(invalid());
        }
        ranges.push(SkipRange { min, max });
    }
    Ok(ranges)
}

/// Computes the next value of an index occurrence and advances `offset` past
/// every configured skip range.
pub fn sequence_value(
    start: i64,
    position: usize,
    step: i64,
    skip: &[SkipRange],
    offset: &mut i64,
    capture_derived: bool,
) -> i64 {
    let base = if capture_derived {
        start
    } else {
        start.saturating_add((position as i64).saturating_mul(step))
    };
    let mut current = base.saturating_add(*offset);
    let advance = if step == 0 { 1 } else { step };

    while skip.iter().any(|range| range.contains(current)) {
        current = current.saturating_add(advance);
        *offset = offset.saturating_add(advance);
    }
    current
}

pub fn format_number(value: i64, numeral: NumeralSystem, width: Width) -> String {
    match numeral {
        NumeralSystem::Roman => to_roman(value).unwrap_or_else(|| value.to_string()),
        NumeralSystem::Hex => signed_radix(value, |m| format!("{m:x}")),
        NumeralSystem::Octal => signed_radix(value, |m| format!("{m:o}")),
        NumeralSystem::Binary => signed_radix(value, |m| format!("{m:b}")),
        NumeralSystem::Decimal => {
            let magnitude = pad(value.unsigned_abs().to_string(), width);
            if value < 0 {
                format!("-{magnitude}")
            } else {
                magnitude
            }
        }
    }
}

fn signed_radix(value: i64, render: impl Fn(u64) -> String) -> String {
    let digits = render(value.unsigned_abs());
    if value < 0 {
        format!("-{digits}")
    } else {
        digits
    }
}

fn pad(digits: String, width: Width) -> String {
    if digits.len() >= width.digits {
        return digits;
    }
    let fill = if width.zero_pad { '0' } else { ' ' };
    let mut out: String = std::iter::repeat(fill)
        .take(width.digits - digits.len())
        .collect();
    out.push_str(&digits);
    out
}

const ROMAN_TABLE: &[(i64, &str)] = &[
    (1000, "M"),
    (900, "CM"),
    (500, "D"),
    (400, "CD"),
    (100, "C"),
    (90, "XC"),
    (50, "L"),
    (40, "XL"),
    (10, "X"),
    (9, "IX"),
    (5, "V"),
    (4, "IV"),
    (1, "I"),
];

pub fn to_roman(value: i64) -> Option<String> {
    if !(1..=3999).contains(&value) {
        return None;
    }
    let mut rest = value;
    let mut out = String::new();
    for (amount, symbol) in ROMAN_TABLE {
        while rest >= *amount {
            out.push_str(symbol);
            rest -= amount;
        }
    }
    Some(out)
}

#[derive(Debug, Clone, Default)]
pub struct IndexSequencer {
    offsets: Vec<i64>,
}

impl IndexSequencer {
    pub fn new(occurrences: usize) -> Self {
        Self {
            offsets: vec![0; occurrences],
        }
    }

    pub fn next(&mut self, spec: &IndexSpec, position: usize, captured: Option<&str>) -> String {
        if spec.occurrence >= self.offsets.len() {
            self.offsets.resize(spec.occurrence + 1, 0);
        }
        let captured_start = spec
            .capture_group
            .and(captured)
            .and_then(|text| text.trim().parse::<i64>().ok());

        let offset = &mut self.offsets[spec.occurrence];
        let value = match captured_start {
            Some(start) => sequence_value(start, position, spec.step, &spec.skip, offset, true),
            None => sequence_value(spec.start, position, spec.step, &spec.skip, offset, false),
        };
        format_number(value, spec.numeral, spec.width)
    }

    pub fn offset(&self, occurrence: usize) -> i64 {
        self.offsets.get(occurrence).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zero_pad(digits: usize) -> Width {
        Width {
            digits,
            zero_pad: true,
        }
    }

    #[test]
    fn plain_sequence_with_padding() {
        let spec = IndexSpec {
            width: zero_pad(3),
            ..IndexSpec::default()
        };
        let mut seq = IndexSequencer::new(1);
        let out: Vec<String> = (0..3).map(|pos| seq.next(&spec, pos, None)).collect();
        assert_eq!(out, ["001", "002", "003"]);
    }

    #[test]
    fn skip_range_advances_and_persists_offset() {
        let spec = IndexSpec {
            start: 10,
            skip: parse_skip_ranges("10-15").expect("valid range"),
            ..IndexSpec::default()
        };
        let mut seq = IndexSequencer::new(1);
        let out: Vec<String> = (0..3).map(|pos| seq.next(&spec, pos, None)).collect();
        assert_eq!(out, ["16", "17", "18"]);
        assert_eq!(seq.offset(0), 6);
    }

    #[test]
    fn zero_step_skips_by_one() {
        let mut offset = 0;
        let skip = [SkipRange { min: 5, max: 6 }];
        assert_eq!(sequence_value(5, 3, 0, &skip, &mut offset, false), 7);
        assert_eq!(offset, 2);
    }

    #[test]
    fn capture_derived_start_ignores_position() {
        let spec = IndexSpec {
            capture_group: Some(1),
            width: zero_pad(3),
            ..IndexSpec::default()
        };
        let mut seq = IndexSequencer::new(1);
        assert_eq!(seq.next(&spec, 7, Some("42")), "042");
        assert_eq!(seq.next(&spec, 8, Some("x")), "009");
    }

    #[test]
    fn numeral_systems() {
        let width = Width::default();
        assert_eq!(format_number(1994, NumeralSystem::Roman, width), "MCMXCIV");
        assert_eq!(format_number(4000, NumeralSystem::Roman, width), "4000");
        assert_eq!(format_number(0, NumeralSystem::Roman, width), "0");
        assert_eq!(format_number(255, NumeralSystem::Hex, width), "ff");
        assert_eq!(format_number(-8, NumeralSystem::Octal, width), "-10");
        assert_eq!(format_number(5, NumeralSystem::Binary, width), "101");
    }

    #[test]
    fn decimal_padding_and_negatives() {
        assert_eq!(format_number(-5, NumeralSystem::Decimal, zero_pad(3)), "-005");
        let spaces = Width {
            digits: 3,
            zero_pad: false,
        };
        assert_eq!(format_number(7, NumeralSystem::Decimal, spaces), "  7");
        assert_eq!(format_number(12345, NumeralSystem::Decimal, zero_pad(3)), "12345");
    }

    #[test]
    fn skip_range_parsing() {
        let ranges = parse_skip_ranges("1-3; 7 ;-4--2").expect("valid ranges");
        assert_eq!(
            ranges,
            vec![
                SkipRange { min: 1, max: 3 },
                SkipRange { min: 7, max: 7 },
                SkipRange { min: -4, max: -2 },
            ]
        );
        assert!(matches!(
            parse_skip_ranges("9-2"),
            Err(TemplateError::InvalidSkipRange(_))
        ));
    }
}
