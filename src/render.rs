//! Markdown to HTML restricted to a small allow-list.

use std::collections::{HashMap, HashSet};

use ammonia::Builder;
use pulldown_cmark::{html, Options, Parser};

const TAGS: &[&str] = &[
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "li", "strong", "em", "blockquote", "code",
    "pre", "a", "img",
];

pub fn render_markdown(markdown: &str) -> String {
    let mut raw = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut raw, Parser::new_ext(markdown, Options::empty()));

    let attributes: HashMap<&str, HashSet<&str>> = HashMap::from([
        ("a", HashSet::from(["href", "title"])),
        ("img", HashSet::from(["src", "alt", "width", "height"])),
    ]);
    let mut sanitizer = Builder::default();
    sanitizer
        .tags(TAGS.iter().copied().collect())
        .tag_attributes(attributes)
        .generic_attributes(HashSet::new());
    sanitizer.clean(&raw).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_basic_formatting() {
        let html = render_markdown("# Title\n\n**bold** and *em*\n\n- one\n- two");
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<strong>bold</strong>"));
        assert!(html.contains("<em>em</em>"));
        assert!(html.contains("<li>one</li>"));
    }

    #[test]
    fn drops_scripts_and_handlers() {
        let html = render_markdown("<script>alert(1)</script>\n\n<img src=\"x.png\" alt=\"a\" onerror=\"bad()\">");
        assert!(!html.contains("script"));
        assert!(!html.contains("alert"));
        assert!(!html.contains("onerror"));
        assert!(html.contains("src=\"x.png\""));
        assert!(html.contains("alt=\"a\""));
    }

    #[test]
    fn strips_tags_outside_the_list_but_keeps_text() {
        let html = render_markdown("<div class=\"x\"><span>inner</span></div>");
        assert!(!html.contains("<div"));
        assert!(!html.contains("<span"));
        assert!(html.contains("inner"));
    }

    #[test]
    fn links_keep_href_and_title_only() {
        let html = render_markdown("[site](https://example.com \"home\") [bad](javascript:alert(1))");
        assert!(html.contains("href=\"https://example.com\""));
        assert!(html.contains("title=\"home\""));
        assert!(!html.contains("javascript"));
    }

    #[test]
    fn code_blocks_lose_language_classes() {
        let html = render_markdown("```rust\nfn main() {}\n```");
        assert!(html.contains("<pre><code>fn main() {}"));
        assert!(!html.contains("class="));
    }
}
