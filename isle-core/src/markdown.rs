use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd, html};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMarkdown {
    pub html: String,
    /// Text of the first heading, if any.
    pub title: Option<String>,
}

fn options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_HEADING_ATTRIBUTES
}

pub fn render_markdown(source: &str) -> RenderedMarkdown {
    let events: Vec<Event> = Parser::new_ext(source, options()).collect();

    let mut in_heading = false;
    let mut text_buf = String::new();
    let mut title = None;
    for event in &events {
        match event {
            Event::Start(Tag::Heading { .. }) if title.is_none() => in_heading = true,
            Event::End(TagEnd::Heading(_)) if in_heading => {
                title = Some(text_buf.trim().to_string());
                in_heading = false;
            }
            Event::Text(text) | Event::Code(text) if in_heading => text_buf.push_str(text),
            _ => continue,
        }
    }

    let mut out = String::new();
    html::push_html(&mut out, events.into_iter());

    RenderedMarkdown { html: out, title }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_from_first_heading() {
        let rendered = render_markdown("Intro\n\n# Hello `world`\n\n## Second\n");
        assert_eq!(rendered.title.as_deref(), Some("Hello world"));
        assert!(rendered.html.contains("<h1>Hello <code>world</code></h1>"));
    }

    #[test]
    fn test_no_heading() {
        let rendered = render_markdown("just text");
        assert_eq!(rendered.title, None);
        assert_eq!(rendered.html, "<p>just text</p>\n");
    }
}
