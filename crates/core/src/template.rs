use crate::change::{split_extension, Change};
use crate::grammar::{TokenKind, BRACES, GRAMMAR};
use crate::index::{
    parse_length, parse_skip_ranges, IndexSequencer, IndexSpec, NumeralSystem, Width,
};
use crate::metadata::{HashAlgorithm, MetadataProvider, TimeAttr};
use crate::transform::{apply_chain, parse_chain, parse_date, DateField, Transform};
use chrono::Local;
use rand::Rng;
use regex::Captures;
use std::collections::BTreeMap;
use std::ops::Range;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("invalid skip range: {0}")]
    InvalidSkipRange(String),
    #[error("invalid find pattern `{pattern}`: {message}")]
    InvalidPattern { pattern: String, message: String },
    #[error("{what} {value} exceeds the name length limit of {limit}")]
    LengthTooLarge {
        what: &'static str,
        value: String,
        limit: usize,
    },
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("failed to hash {}: {source}", path.display())]
    Hash {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RandomCharset {
    Letters,
    Upper,
    Lower,
    Digits,
    LettersDigits,
    Custom(Vec<char>),
}

impl RandomCharset {
    fn chars(&self) -> Vec<char> {
        match self {
            RandomCharset::Letters => ('a'..='z').chain('A'..='Z').collect(),
            RandomCharset::Upper => ('A'..='Z').collect(),
            RandomCharset::Lower => ('a'..='z').collect(),
            RandomCharset::Digits => ('0'..='9').collect(),
            RandomCharset::LettersDigits => ('a'..='z').chain('A'..='Z').chain('0'..='9').collect(),
            RandomCharset::Custom(chars) => chars.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    Filename,
    Extension,
    Parent { depth: usize },
    Index(IndexSpec),
    Date { attr: TimeAttr, field: DateField },
    Exif { attr: String, field: Option<DateField> },
    ExifTool { tag: String },
    Id3 { tag: String },
    Hash(HashAlgorithm),
    Csv { column: usize },
    Random { len: usize, charset: RandomCharset },
    MatchText,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub source: TokenSource,
    pub raw: String,
    pub span: Range<usize>,
    pub transforms: Vec<Transform>,
}

impl Token {
    pub fn kind(&self) -> TokenKind {
        match self.source {
            TokenSource::Filename => TokenKind::Filename,
            TokenSource::Extension => TokenKind::Extension,
            TokenSource::Parent { .. } => TokenKind::Parent,
            TokenSource::Index(_) => TokenKind::Index,
            TokenSource::Date { .. } => TokenKind::Date,
            TokenSource::Exif { .. } => TokenKind::Exif,
            TokenSource::ExifTool { .. } => TokenKind::ExifTool,
            TokenSource::Id3 { .. } => TokenKind::Id3,
            TokenSource::Hash(_) => TokenKind::Hash,
            TokenSource::Csv { .. } => TokenKind::Csv,
            TokenSource::Random { .. } => TokenKind::Random,
            TokenSource::MatchText => TokenKind::TransformOnly,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePart {
    Literal(String),
    Token(Token),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variables {
    by_kind: BTreeMap<TokenKind, Vec<usize>>,
}

impl Variables {
    pub fn contains(&self, kind: TokenKind) -> bool {
        self.by_kind.contains_key(&kind)
    }

    pub fn parts_of(&self, kind: TokenKind) -> &[usize] {
        self.by_kind.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.by_kind.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub source: String,
    pub parts: Vec<TemplatePart>,
    pub variables: Variables,
}

impl Template {
    pub fn index_occurrences(&self) -> usize {
        self.variables.parts_of(TokenKind::Index).len()
    }

    pub fn hash_algorithms(&self) -> Vec<HashAlgorithm> {
        let mut algorithms: Vec<HashAlgorithm> = self
            .variables
            .parts_of(TokenKind::Hash)
            .iter()
            .filter_map(|idx| match &self.parts[*idx] {
                TemplatePart::Token(Token {
                    source: TokenSource::Hash(alg),
                    ..
                }) => Some(*alg),
                _ => None,
            })
            .collect();
        algorithms.sort();
        algorithms.dedup();
        algorithms
    }
}

pub fn extract(input: &str) -> Result<Template, TemplateError> {
    let mut parts = Vec::new();
    let mut variables = Variables::default();
    let mut cursor = 0usize;
    let mut index_occurrence = 0usize;

    for caps in BRACES.captures_iter(input) {
        let whole = caps.get(0).expect("group 0 is always present");
        let body = &caps[1];
        let Some(source_and_tf) = classify(body, &mut index_occurrence)? else {
            continue;
        };
        let (source, transforms) = source_and_tf;

        if whole.start() > cursor {
            parts.push(TemplatePart::Literal(input[cursor..whole.start()].to_string()));
        }
        let token = Token {
            source,
            raw: whole.as_str().to_string(),
            span: whole.range(),
            transforms,
        };
        variables
            .by_kind
            .entry(token.kind())
            .or_default()
            .push(parts.len());
        parts.push(TemplatePart::Token(token));
        cursor = whole.end();
    }

    if cursor < input.len() {
        parts.push(TemplatePart::Literal(input[cursor..].to_string()));
    }

    Ok(Template {
        source: input.to_string(),
        parts,
        variables,
    })
}

fn classify(
    body: &str,
    index_occurrence: &mut usize,
) -> Result<Option<(TokenSource, Vec<Transform>)>, TemplateError> {
    let Some((kind, caps)) = GRAMMAR.classify(body) else {
        return Ok(None);
    };
    let transforms = caps
        .name("tf")
        .map(|m| parse_chain(m.as_str()))
        .unwrap_or_default();
    let text = |name: &str| caps.name(name).map(|m| m.as_str());

    let source = match kind {
        TokenKind::Filename => TokenSource::Filename,
        TokenKind::Extension => TokenSource::Extension,
        TokenKind::Parent => TokenSource::Parent {
            depth: text("depth").and_then(|d| d.parse().ok()).unwrap_or(1).max(1),
        },
        TokenKind::Index => {
            let spec = IndexSpec {
                capture_group: text("cap").and_then(|c| c.parse().ok()),
                start: text("start").and_then(|s| s.parse().ok()).unwrap_or(1),
                step: text("step").and_then(|s| s.parse().ok()).unwrap_or(1),
                width: Width::parse(text("width").unwrap_or_default())?,
                numeral: NumeralSystem::from_suffix(text("num")),
                skip: match text("skip") {
                    Some(raw) => parse_skip_ranges(raw)?,
                    None => Vec::new(),
                },
                occurrence: *index_occurrence,
            };
            *index_occurrence += 1;
            TokenSource::Index(spec)
        }
        TokenKind::Date => TokenSource::Date {
            attr: TimeAttr::parse(text("attr").unwrap_or_default()).unwrap_or(TimeAttr::Modified),
            field: DateField::parse(text("field").unwrap_or_default())
                .unwrap_or(DateField::YearFull),
        },
        TokenKind::Exif => TokenSource::Exif {
            attr: text("attr").unwrap_or_default().to_string(),
            field: text("field").and_then(DateField::parse),
        },
        TokenKind::ExifTool => TokenSource::ExifTool {
            tag: text("attr").unwrap_or_default().to_string(),
        },
        TokenKind::Id3 => TokenSource::Id3 {
            tag: text("attr").unwrap_or_default().to_string(),
        },
        TokenKind::Hash => match text("alg").and_then(HashAlgorithm::parse) {
            Some(alg) => TokenSource::Hash(alg),
            None => return Ok(None),
        },
        TokenKind::Csv => match text("col").and_then(|c| c.parse::<usize>().ok()) {
            Some(column) if column > 0 => TokenSource::Csv { column },
            _ => return Ok(None),
        },
        TokenKind::Random => {
            let charset = match (text("set"), text("custom")) {
                (_, Some(custom)) => RandomCharset::Custom(custom.chars().collect()),
                (Some("l"), _) => RandomCharset::Letters,
                (Some("lu"), _) => RandomCharset::Upper,
                (Some("ll"), _) => RandomCharset::Lower,
                (Some("d"), _) => RandomCharset::Digits,
                _ => RandomCharset::LettersDigits,
            };
            TokenSource::Random {
                len: match text("len") {
                    Some(raw) if !raw.is_empty() => parse_length(raw, "random length")?,
                    _ => 10,
                },
                charset,
            }
        }
        TokenKind::TransformOnly => TokenSource::MatchText,
    };

    Ok(Some((source, transforms)))
}

pub struct RenderContext<'a> {
    pub change: &'a Change,
    pub input_name: &'a str,
    pub match_text: &'a str,
    pub captures: Option<&'a Captures<'a>>,
    pub provider: &'a dyn MetadataProvider,
}

pub fn render(
    template: &Template,
    ctx: &RenderContext<'_>,
    sequencer: &mut IndexSequencer,
) -> Result<String, ResolveError> {
    let mut output = String::new();
    for part in &template.parts {
        match part {
            TemplatePart::Literal(text) => match ctx.captures {
                Some(caps) => caps.expand(text, &mut output),
                None => output.push_str(text),
            },
            TemplatePart::Token(token) => {
                let value = resolve_token(token, ctx, sequencer)?;
                output.push_str(&apply_chain(value, &token.transforms));
            }
        }
    }
    Ok(output)
}

fn resolve_token(
    token: &Token,
    ctx: &RenderContext<'_>,
    sequencer: &mut IndexSequencer,
) -> Result<String, ResolveError> {
    let change = ctx.change;
    let path = change.source_path();
    let value = match &token.source {
        TokenSource::Filename => {
            if change.is_dir {
                ctx.input_name.to_string()
            } else {
                split_extension(ctx.input_name).0.to_string()
            }
        }
        TokenSource::Extension => {
            if change.is_dir {
                String::new()
            } else {
                split_extension(ctx.input_name).1.to_string()
            }
        }
        TokenSource::Parent { depth } => change
            .base_dir
            .ancestors()
            .nth(depth - 1)
            .and_then(|dir| dir.file_name())
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default(),
        TokenSource::Index(spec) => {
            let captured = spec
                .capture_group
                .and_then(|group| ctx.captures.and_then(|caps| caps.get(group)))
                .map(|m| m.as_str());
            sequencer.next(spec, change.position, captured)
        }
        TokenSource::Date { attr, field } => {
            let date = match attr {
                TimeAttr::Now => Some(Local::now()),
                other => ctx.provider.file_time(&path, *other),
            };
            date.map(|d| field.format(&d)).unwrap_or_default()
        }
        TokenSource::Exif { attr, field } => {
            let raw = ctx.provider.exif(&path, attr).unwrap_or_default();
            match field {
                Some(field) => parse_date(&raw)
                    .map(|d| field.format(&d))
                    .unwrap_or_default(),
                None => raw,
            }
        }
        TokenSource::ExifTool { tag } => ctx.provider.exiftool(&path, tag).unwrap_or_default(),
        TokenSource::Id3 { tag } => ctx.provider.id3(&path, tag).unwrap_or_default(),
        TokenSource::Hash(alg) => {
            if change.is_dir {
                String::new()
            } else {
                ctx.provider
                    .hash(&path, *alg)
                    .map_err(|source| ResolveError::Hash {
                        path: path.clone(),
                        source,
                    })?
            }
        }
        TokenSource::Csv { column } => change
            .csv_row
            .get(column - 1)
            .map(|v| v.trim().to_string())
            .unwrap_or_default(),
        TokenSource::Random { len, charset } => {
            let chars = charset.chars();
            if chars.is_empty() {
                String::new()
            } else {
                let mut rng = rand::thread_rng();
                (0..*len)
                    .map(|_| chars[rng.gen_range(0..chars.len())])
                    .collect()
            }
        }
        TokenSource::MatchText => ctx.match_text.to_string(),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::tests::StaticMetadata;
    use regex::Regex;

    fn render_for(template: &str, change: &Change, provider: &StaticMetadata) -> String {
        let parsed = extract(template).expect("must extract");
        let mut seq = IndexSequencer::new(parsed.index_occurrences());
        let ctx = RenderContext {
            change,
            input_name: &change.source_name,
            match_text: "",
            captures: None,
            provider,
        };
        render(&parsed, &ctx, &mut seq).expect("must render")
    }

    #[test]
    fn extract_groups_tokens_by_kind() {
        let parsed = extract("{f}_{%03d}_{x.make}_{%d}").expect("must extract");
        assert_eq!(parsed.parts.len(), 7);
        assert_eq!(parsed.variables.parts_of(TokenKind::Index), &[2, 6]);
        assert!(parsed.variables.contains(TokenKind::Exif));
        assert!(!parsed.variables.contains(TokenKind::Hash));
        assert_eq!(parsed.index_occurrences(), 2);
    }

    #[test]
    fn unknown_braces_stay_literal() {
        let parsed = extract("a{nope}b{ext}").expect("must extract");
        assert_eq!(
            parsed.parts[0],
            TemplatePart::Literal("a{nope}b".to_string())
        );
        assert!(parsed.variables.contains(TokenKind::Extension));
    }

    #[test]
    fn malformed_skip_range_is_fatal() {
        let err = extract("{%d<5-1>}").expect_err("must fail");
        assert!(matches!(err, TemplateError::InvalidSkipRange(_)));
    }

    #[test]
    fn oversized_widths_and_lengths_are_rejected() {
        for template in ["{%99999999999d}", "{99999999999r}", "{%261d}", "{261r_d}"] {
            let err = extract(template).expect_err("must fail");
            assert!(
                matches!(err, TemplateError::LengthTooLarge { limit: 260, .. }),
                "{template}: {err}"
            );
        }
        assert!(extract("{%260d}{r}{12r_l}").is_ok());
    }

    #[test]
    fn renders_name_tokens_with_transforms() {
        let change = Change::new(0, "/photos/trip/day1", "Café.JPG", false);
        let provider = StaticMetadata::default();
        assert_eq!(
            render_for("{p}-{2p.up}-{f.di.lw}{ext.lw}", &change, &provider),
            "day1-TRIP-cafe.jpg"
        );
    }

    #[test]
    fn missing_metadata_renders_empty() {
        let change = Change::new(0, "/tmp", "a.mp3", false);
        let provider = StaticMetadata::default();
        assert_eq!(render_for("[{id3.title}]{x.model}", &change, &provider), "[]");
    }

    #[test]
    fn exif_date_field_and_csv_column() {
        let mut change = Change::new(0, "/tmp", "a.jpg", false);
        change.csv_row = vec!["first".to_string(), " second ".to_string()];
        let mut provider = StaticMetadata::default();
        provider
            .exif
            .insert("cdt".to_string(), "2020:01:02 03:04:05".to_string());
        assert_eq!(
            render_for("{x.cdt.YYYY}{x.cdt.MM}-{csv.2}", &change, &provider),
            "202001-second"
        );
    }

    #[test]
    fn random_token_honours_length_and_charset() {
        let change = Change::new(0, "/tmp", "a.txt", false);
        let provider = StaticMetadata::default();
        let value = render_for("{6r_d}", &change, &provider);
        assert_eq!(value.len(), 6);
        assert!(value.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn literal_text_expands_captures() {
        let change = Change::new(0, "/tmp", "IMG_12.jpg", false);
        let provider = StaticMetadata::default();
        let re = Regex::new(r"IMG_(\d+)").expect("valid regex");
        let caps = re.captures("IMG_12").expect("must match");
        let parsed = extract("photo-$1-{$1%04d}{.lw}").expect("must extract");
        let mut seq = IndexSequencer::new(parsed.index_occurrences());
        let ctx = RenderContext {
            change: &change,
            input_name: "IMG_12.jpg",
            match_text: "IMG_12",
            captures: Some(&caps),
            provider: &provider,
        };
        let out = render(&parsed, &ctx, &mut seq).expect("must render");
        assert_eq!(out, "photo-12-0012img_12");
    }
}
