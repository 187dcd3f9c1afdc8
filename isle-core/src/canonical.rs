use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::url_map::has_file_extension;

static DUPLICATE_SLASHES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/{2,}").expect("valid regex"));

/// Normalize `pathname` into the canonical absolute URL for a page.
///
/// - `/index.html` is not canonical, the directory is
/// - a trailing `/1` page marker is dropped
/// - extension-less paths always end in `/`
/// - duplicate slashes collapse
pub fn canonical_url(pathname: &str, origin: &Url) -> Result<Url, url::ParseError> {
    let mut pathname = pathname
        .strip_suffix("/index.html")
        .unwrap_or(pathname)
        .to_string();

    if let Some(stripped) = pathname
        .strip_suffix("/1/")
        .or_else(|| pathname.strip_suffix("/1"))
    {
        pathname = stripped.to_string();
    }

    if !has_file_extension(&pathname) && !pathname.ends_with('/') {
        pathname.push('/');
    }

    let pathname = DUPLICATE_SLASHES.replace_all(&pathname, "/");
    origin.join(&pathname)
}
