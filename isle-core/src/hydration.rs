//! Splits rendered pages into static HTML and hydration islands.
//!
//! Island markup is meant for the client only and does not survive document
//! post-processing, so it is cut out before the host transforms the page and
//! re-attached afterwards.

use std::sync::LazyLock;

use regex::{Captures, Regex};

pub const HYDRATION_BEGIN: &str = "<!-- @astro/hydration begin -->";
pub const HYDRATION_END: &str = "<!-- @astro/hydration end -->";

/// Prefix of modules served by the framework runtime rather than the site.
pub const INTERNAL_MODULE_PREFIX: &str = "astro_core:";
const CLIENT_ID_PREFIX: &str = "/@id";

static INTERNAL_MODULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"/?astro_core:([^/\s"'<>]+)"#).expect("valid regex"));

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    pub static_html: String,
    pub hydration_code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Static,
    Capturing,
}

/// Separate hydration blocks from the rest of the document.
///
/// Static lines are copied byte for byte. Captured lines keep their
/// sentinels, have internal module references rewritten and always end in a
/// newline. A block missing its end sentinel runs to the end of the input.
pub fn extract_hydration(rendered: &str) -> Extracted {
    let mut out = Extracted::default();
    let mut state = ScanState::Static;

    for line in rendered.split_inclusive('\n') {
        let trimmed = line.trim();
        match state {
            ScanState::Static if trimmed == HYDRATION_BEGIN => {
                push_line(&mut out.hydration_code, line);
                state = ScanState::Capturing;
            }
            ScanState::Static => out.static_html.push_str(line),
            ScanState::Capturing => {
                push_line(&mut out.hydration_code, &resolve_ids(line));
                if trimmed == HYDRATION_END {
                    state = ScanState::Static;
                }
            }
        }
    }

    out
}

fn push_line(buf: &mut String, line: &str) {
    buf.push_str(line);
    if !line.ends_with('\n') {
        buf.push('\n');
    }
}

/// Rewrite `astro_core:<path>` references into URLs the client module loader
/// can fetch. References that are already rewritten are left alone.
pub fn resolve_ids(code: &str) -> String {
    INTERNAL_MODULE
        .replace_all(code, |caps: &Captures| {
            let whole = &caps[0];
            let start = caps.get(0).map(|m| m.start()).unwrap_or_default();
            if code[..start].ends_with(CLIENT_ID_PREFIX) {
                return whole.to_string();
            }
            format!("{CLIENT_ID_PREFIX}/{INTERNAL_MODULE_PREFIX}{}", &caps[1])
        })
        .into_owned()
}
