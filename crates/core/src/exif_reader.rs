use anyhow::{Context, Result};
use exif::{In, Reader, Tag, Value};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

const ALIASES: &[(&str, Tag)] = &[
    ("make", Tag::Make),
    ("model", Tag::Model),
    ("lens", Tag::LensModel),
    ("lensmake", Tag::LensMake),
    ("iso", Tag::PhotographicSensitivity),
    ("et", Tag::ExposureTime),
    ("fnum", Tag::FNumber),
    ("fl", Tag::FocalLength),
    ("fl35", Tag::FocalLengthIn35mmFilm),
    ("w", Tag::PixelXDimension),
    ("h", Tag::PixelYDimension),
    ("cdt", Tag::DateTimeOriginal),
    ("software", Tag::Software),
    ("artist", Tag::Artist),
];

pub fn read_exif_fields(path: &Path) -> Result<HashMap<String, String>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open EXIF source: {}", path.display()))?;
    let mut buf = BufReader::new(file);
    let exif = Reader::new()
        .read_from_container(&mut buf)
        .with_context(|| format!("failed to parse EXIF: {}", path.display()))?;

    let mut fields = HashMap::new();
    for field in exif.fields().filter(|f| f.ifd_num == In::PRIMARY) {
        let value = field_text(&field.value, || field.display_value().to_string());
        if value.is_empty() {
            continue;
        }
        fields
            .entry(format!("{:?}", field.tag).to_ascii_lowercase())
            .or_insert(value);
    }

    for (alias, tag) in ALIASES {
        if let Some(field) = exif.get_field(*tag, In::PRIMARY) {
            let value = field_text(&field.value, || field.display_value().to_string());
            if !value.is_empty() {
                fields.insert((*alias).to_string(), value);
            }
        }
    }

    Ok(fields)
}

fn field_text(value: &Value, display: impl Fn() -> String) -> String {
    let raw = match value {
        Value::Ascii(parts) => parts
            .first()
            .map(|bytes| String::from_utf8_lossy(bytes).to_string())
            .unwrap_or_default(),
        _ => display(),
    };
    normalize(&raw)
}

fn normalize(value: &str) -> String {
    value
        .trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .replace(['/', '\\'], "_")
}
