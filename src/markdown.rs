pub fn html_to_markdown(html: &str) -> String {
    html2md::parse_html(html)
}

/// Collapses runs of blank lines into one and drops leading/trailing blank lines.
/// Whitespace-only lines count as blank.
pub fn normalize_blank_lines(markdown: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    let mut prev_blank = true;
    for line in markdown.lines() {
        if line.trim().is_empty() {
            if !prev_blank {
                lines.push("");
            }
            prev_blank = true;
        } else {
            lines.push(line);
            prev_blank = false;
        }
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

/// Final file contents: `# <title>`, a blank line, then the normalized body.
pub fn render_article(title: &str, body_markdown: &str) -> String {
    let body = normalize_blank_lines(body_markdown);
    if body.is_empty() {
        format!("# {title}\n")
    } else {
        format!("# {title}\n\n{body}\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_blank_runs() {
        let input = "\n\nfirst\n\n\n   \nsecond\nthird\n\n\t\n";
        assert_eq!(normalize_blank_lines(input), "first\n\nsecond\nthird");
    }

    #[test]
    fn render_article_prepends_heading() {
        let md = render_article("Title", "para one\n\n\n\npara two\n\n");
        assert_eq!(md, "# Title\n\npara one\n\npara two\n");
        assert_eq!(render_article("Empty", "\n \n"), "# Empty\n");
    }

    #[test]
    fn html_to_markdown_keeps_images() {
        let md = html_to_markdown(r#"<p>Hello</p><p><img src="images/g/img_0.png" alt="a"></p>"#);
        assert!(md.contains("Hello"));
        assert!(md.contains("images/g/img_0.png"));
    }
}
