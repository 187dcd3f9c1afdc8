use serde::Deserialize;

const FENCE: &str = "---";

/// Metadata block at the top of a page, component or collection entry.
///
/// ```text
/// ---
/// title = "Home"
/// css = ["/src/styles/home.css"]
/// imports = ["../components/Counter.html"]
/// collection = "posts"
/// ---
/// ```
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct FrontMatter {
    pub title: Option<String>,
    pub css: Vec<String>,
    pub imports: Vec<String>,
    pub collection: Option<String>,
    /// Any other keys, exposed to templates and collections as data.
    #[serde(flatten)]
    pub data: toml::Table,
}

/// Split `source` into its front matter and body. Sources without a
/// leading fence have empty front matter.
pub fn split(source: &str) -> Result<(FrontMatter, &str), toml::de::Error> {
    let Some((raw, body)) = fenced_block(source) else {
        return Ok((FrontMatter::default(), source));
    };
    let front_matter = toml::from_str(raw)?;
    Ok((front_matter, body))
}

fn fenced_block(source: &str) -> Option<(&str, &str)> {
    let rest = source.strip_prefix(FENCE)?;
    let rest = rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n'))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == FENCE {
            return Some((&rest[..offset], &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}
