use scraper::{Html, Node};

const SKIPPED: [&str; 3] = ["script", "style", "noscript"];

/// Whole-page visible text, one trimmed line per source line.
pub fn html_to_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let mut raw = String::new();
    for node in doc.root_element().descendants() {
        let Node::Text(text) = node.value() else { continue };
        let hidden = node
            .ancestors()
            .any(|a| matches!(a.value(), Node::Element(e) if SKIPPED.contains(&e.name())));
        if !hidden {
            raw.push_str(text);
        }
    }
    normalize(&raw)
}

fn normalize(s: &str) -> String {
    let mut out = String::new();
    for line in s.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() { continue; }
        if !out.is_empty() { out.push('\n'); }
        out.push_str(&collapsed);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripts_and_styles_are_dropped() {
        let html = r#"<html><head><title>T</title><style>p { color: red }</style>
            <script>var x = 1;</script></head>
            <body><noscript>enable js</noscript>
              <h1>Headline</h1>
              <p>First   paragraph with <b>bold</b> text.</p>
            </body></html>"#;
        let text = html_to_text(html);
        assert_eq!(text, "T\nHeadline\nFirst paragraph with bold text.");
    }

    #[test]
    fn empty_document_is_empty() {
        assert_eq!(html_to_text(""), "");
    }
}
