use crate::transform::{DATE_FIELD_PATTERN, TRANSFORM_PATTERN};
use regex::Regex;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TokenKind {
    Filename,
    Extension,
    Parent,
    Index,
    Date,
    Exif,
    ExifTool,
    Id3,
    Hash,
    Csv,
    Random,
    TransformOnly,
}

impl TokenKind {
    pub const ALL: [TokenKind; 12] = [
        TokenKind::Filename,
        TokenKind::Extension,
        TokenKind::Parent,
        TokenKind::Index,
        TokenKind::Date,
        TokenKind::ExifTool,
        TokenKind::Exif,
        TokenKind::Id3,
        TokenKind::Hash,
        TokenKind::Csv,
        TokenKind::Random,
        TokenKind::TransformOnly,
    ];
}

pub static BRACES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}]+)\}").expect("brace pattern is valid"));

pub struct Grammar {
    rules: Vec<(TokenKind, Regex)>,
}

impl Grammar {
    fn build() -> Self {
        let tf = format!(r"(?P<tf>(?:\.(?:{TRANSFORM_PATTERN}|dt\.(?:{DATE_FIELD_PATTERN})))*)");
        let field = format!("(?:{DATE_FIELD_PATTERN})");

        let sources = [
            (TokenKind::Filename, format!("^f{tf}$")),
            (TokenKind::Extension, format!("^ext{tf}$")),
            (TokenKind::Parent, format!(r"^(?P<depth>\d*)p{tf}$")),
            (
                TokenKind::Index,
                format!(
                    r"^(?:\$(?P<cap>\d+))?(?P<start>-?\d+)?%(?P<width>\d*)d(?P<num>[rhob])?(?P<step>-?\d+)?(?:<(?P<skip>[^<>]*)>)?{tf}$"
                ),
            ),
            (
                TokenKind::Date,
                format!(r"^(?P<attr>mtime|ctime|btime|atime|now)\.(?P<field>{field}){tf}$"),
            ),
            (
                TokenKind::ExifTool,
                format!(r"^xt\.(?P<attr>[A-Za-z0-9_:\-]+?){tf}$"),
            ),
            (
                TokenKind::Exif,
                format!(r"^x\.(?P<attr>[A-Za-z0-9_]+)(?:\.(?P<field>{field}))?{tf}$"),
            ),
            (
                TokenKind::Id3,
                format!(
                    r"^id3\.(?P<attr>title|artist|album_artist|album|genre|year|total_tracks|track|total_discs|disc|format){tf}$"
                ),
            ),
            (
                TokenKind::Hash,
                format!(r"^hash\.(?P<alg>sha224|sha256|sha384|sha512|blake3){tf}$"),
            ),
            (TokenKind::Csv, format!(r"^csv\.(?P<col>\d+){tf}$")),
            (
                TokenKind::Random,
                format!(r#"^(?P<len>\d*)r(?:_(?P<set>ld|lu|ll|l|d)|"(?P<custom>[^"]+)")?{tf}$"#),
            ),
            (
                TokenKind::TransformOnly,
                format!(r"^(?P<tf>(?:\.(?:{TRANSFORM_PATTERN}|dt\.(?:{DATE_FIELD_PATTERN})))+)$"),
            ),
        ];

        let rules = sources
            .into_iter()
            .map(|(kind, pattern)| {
                let regex = Regex::new(&pattern).expect("token grammar is valid");
                (kind, regex)
            })
            .collect();
        Self { rules }
    }

    pub fn rule(&self, kind: TokenKind) -> &Regex {
        self.rules
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, regex)| regex)
            .expect("every token kind has a rule")
    }

    pub fn classify<'t>(&self, body: &'t str) -> Option<(TokenKind, regex::Captures<'t>)> {
        TokenKind::ALL
            .iter()
            .find_map(|kind| self.rule(*kind).captures(body).map(|caps| (*kind, caps)))
    }
}

pub static GRAMMAR: LazyLock<Grammar> = LazyLock::new(Grammar::build);

#[cfg(test)]
mod tests {
    use super::*;

    fn kind_of(body: &str) -> Option<TokenKind> {
        GRAMMAR.classify(body).map(|(kind, _)| kind)
    }

    #[test]
    fn classifies_each_kind() {
        assert_eq!(kind_of("f"), Some(TokenKind::Filename));
        assert_eq!(kind_of("f.up"), Some(TokenKind::Filename));
        assert_eq!(kind_of("ext"), Some(TokenKind::Extension));
        assert_eq!(kind_of("2p"), Some(TokenKind::Parent));
        assert_eq!(kind_of("$1%03d"), Some(TokenKind::Index));
        assert_eq!(kind_of("10%dr2<1-3;7>"), Some(TokenKind::Index));
        assert_eq!(kind_of("mtime.YYYY"), Some(TokenKind::Date));
        assert_eq!(kind_of("x.make.lw"), Some(TokenKind::Exif));
        assert_eq!(kind_of("x.cdt.MM"), Some(TokenKind::Exif));
        assert_eq!(kind_of("xt.Composite:ImageSize"), Some(TokenKind::ExifTool));
        assert_eq!(kind_of("id3.album_artist"), Some(TokenKind::Id3));
        assert_eq!(kind_of("hash.sha256"), Some(TokenKind::Hash));
        assert_eq!(kind_of("csv.2"), Some(TokenKind::Csv));
        assert_eq!(kind_of("8r_d"), Some(TokenKind::Random));
        assert_eq!(kind_of(r#"4r"abc""#), Some(TokenKind::Random));
        assert_eq!(kind_of(".ti.di"), Some(TokenKind::TransformOnly));
    }

    #[test]
    fn unknown_bodies_are_rejected() {
        assert_eq!(kind_of("hash.md4"), None);
        assert_eq!(kind_of("nope"), None);
        assert_eq!(kind_of("f.shout"), None);
    }

    #[test]
    fn index_rule_captures_parameters() {
        let caps = GRAMMAR
            .rule(TokenKind::Index)
            .captures("5%04dh3<1-2>")
            .expect("index must match");
        assert_eq!(&caps["start"], "5");
        assert_eq!(&caps["width"], "04");
        assert_eq!(&caps["num"], "h");
        assert_eq!(&caps["step"], "3");
        assert_eq!(&caps["skip"], "1-2");
    }
}
