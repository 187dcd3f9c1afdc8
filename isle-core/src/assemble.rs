const BODY_CLOSE: &str = "</body>";
const HEAD_CLOSE: &str = "</head>";

/// Re-attach hydration code and inject stylesheet references into a
/// transformed document.
///
/// Both insertions target the first closing tag only; a document without
/// the tag is left as is.
pub fn assemble(html: &str, hydration_code: &str, css: &[String]) -> String {
    let html = insert_before(html, BODY_CLOSE, hydration_code);
    insert_before(&html, HEAD_CLOSE, &css_script_tags(css))
}

/// One module script reference per stylesheet, in order.
pub fn css_script_tags(css: &[String]) -> String {
    css.iter()
        .map(|url| {
            format!(
                "  <script type=\"module\" src=\"{}\"></script>\n",
                html_escape::encode_double_quoted_attribute(url)
            )
        })
        .collect()
}

fn insert_before(html: &str, tag: &str, content: &str) -> String {
    match html.find(tag) {
        Some(at) if !content.is_empty() => {
            let mut out = String::with_capacity(html.len() + content.len());
            out.push_str(&html[..at]);
            out.push_str(content);
            out.push_str(&html[at..]);
            out
        }
        _ => html.to_string(),
    }
}
