use crate::change::{split_extension, split_last_segment};
use serde::{Deserialize, Serialize};

const WINDOWS_NAME_LIMIT_UTF16: usize = 260;
const UNIX_NAME_LIMIT_BYTES: usize = 255;
pub const LONGEST_NAME_LIMIT: usize = WINDOWS_NAME_LIMIT_UTF16;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    MacOs,
    Unix,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Unix
        }
    }

    pub fn case_insensitive_by_default(self) -> bool {
        matches!(self, Platform::Windows | Platform::MacOs)
    }

    pub fn is_forbidden(self, ch: char) -> bool {
        if ch == '\0' {
            return true;
        }
        match self {
            Platform::Windows => {
                matches!(ch, '<' | '>' | ':' | '"' | '|' | '?' | '*') || ch.is_control()
            }
            Platform::MacOs => ch == ':',
            Platform::Unix => false,
        }
    }

    pub fn segment_too_long(self, segment: &str) -> bool {
        match self {
            Platform::Windows => segment.encode_utf16().count() > WINDOWS_NAME_LIMIT_UTF16,
            Platform::MacOs | Platform::Unix => segment.len() > UNIX_NAME_LIMIT_BYTES,
        }
    }

    fn measure(self, value: &str) -> usize {
        match self {
            Platform::Windows => value.encode_utf16().count(),
            Platform::MacOs | Platform::Unix => value.len(),
        }
    }

    fn limit(self) -> usize {
        match self {
            Platform::Windows => WINDOWS_NAME_LIMIT_UTF16,
            Platform::MacOs | Platform::Unix => UNIX_NAME_LIMIT_BYTES,
        }
    }
}

fn segments(name: &str) -> impl Iterator<Item = &str> {
    name.split(['/', '\\'])
}

pub fn forbidden_chars(name: &str, platform: Platform) -> String {
    let mut found = String::new();
    for ch in name.chars() {
        if platform.is_forbidden(ch) && !found.contains(ch) {
            found.push(ch);
        }
    }
    found
}

pub fn strip_forbidden(name: &str, platform: Platform) -> String {
    name.chars().filter(|ch| !platform.is_forbidden(*ch)).collect()
}

pub fn has_trailing_period(name: &str) -> bool {
    segments(name).any(|seg| seg.ends_with('.') && seg != "." && seg != "..")
}

pub fn strip_trailing_periods(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut segment = String::new();
    for ch in name.chars() {
        if ch == '/' || ch == '\\' {
            out.push_str(trim_segment_dots(&segment));
            out.push(ch);
            segment.clear();
        } else {
            segment.push(ch);
        }
    }
    out.push_str(trim_segment_dots(&segment));
    out
}

fn trim_segment_dots(segment: &str) -> &str {
    if segment == "." || segment == ".." {
        segment
    } else {
        segment.trim_end_matches('.')
    }
}

pub fn longest_segment_exceeds(name: &str, platform: Platform) -> bool {
    segments(name).any(|seg| platform.segment_too_long(seg))
}

pub fn truncate_to_limit(name: &str, is_dir: bool, platform: Platform) -> String {
    let (dirs, last) = split_last_segment(name);
    let mut out = String::with_capacity(name.len());

    let mut dir_segment = String::new();
    for ch in dirs.chars() {
        if ch == '/' || ch == '\\' {
            out.push_str(&truncate_filename_if_needed(&dir_segment, "", platform));
            out.push(ch);
            dir_segment.clear();
        } else {
            dir_segment.push(ch);
        }
    }

    if is_dir {
        out.push_str(&truncate_filename_if_needed(last, "", platform));
    } else {
        let (stem, ext) = split_extension(last);
        let stem = truncate_filename_if_needed(stem, ext, platform);
        out.push_str(&stem);
        out.push_str(ext);
    }
    out
}

pub fn truncate_filename_if_needed(
    filename_without_ext: &str,
    extension_with_dot: &str,
    platform: Platform,
) -> String {
    let limit = platform.limit();
    let ext_len = platform.measure(extension_with_dot);
    if platform.measure(filename_without_ext) + ext_len <= limit {
        return filename_without_ext.to_string();
    }

    let budget = limit.saturating_sub(ext_len);
    let mut used = 0usize;
    let mut out = String::new();
    for ch in filename_without_ext.chars() {
        let width = match platform {
            Platform::Windows => ch.len_utf16(),
            Platform::MacOs | Platform::Unix => ch.len_utf8(),
        };
        if used + width > budget {
            break;
        }
        used += width;
        out.push(ch);
    }
    out
}
