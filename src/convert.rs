//! Minimal conversion between Confluence storage format and markdown.
//!
//! The storage format is an HTML dialect. Round-trip fidelity is not a goal;
//! the mirror favors readable markdown on pull and well-formed storage HTML
//! on push. The remote server re-renders whatever is pushed, and the pushed
//! subtree is always re-pulled afterwards, so drift introduced here never
//! accumulates locally.

use std::sync::OnceLock;

use regex::Regex;

fn tag_re() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid regex"))
}

/// Converts storage-format HTML to markdown.
///
/// Handles headings, paragraphs, line breaks and list items, strips script
/// and style blocks entirely, then drops any remaining tags.
pub fn storage_to_markdown(html: &str) -> String {
    static SCRIPT: OnceLock<Regex> = OnceLock::new();
    static STYLE: OnceLock<Regex> = OnceLock::new();
    let script = SCRIPT
        .get_or_init(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").expect("valid regex"));
    let style =
        STYLE.get_or_init(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").expect("valid regex"));

    let mut md = script.replace_all(html, "").to_string();
    md = style.replace_all(&md, "").to_string();

    for i in (1..=6).rev() {
        md = md.replace(&format!("<h{i}>"), &format!("\n{} ", "#".repeat(i)));
        md = md.replace(&format!("</h{i}>"), "\n");
    }
    md = md.replace("<p>", "\n\n").replace("</p>", "\n");
    md = md.replace("<br>", "\n").replace("<br/>", "\n");
    md = md.replace("<ul>", "\n").replace("</ul>", "\n");
    md = md.replace("<ol>", "\n").replace("</ol>", "\n");
    md = md.replace("<li>", "- ").replace("</li>", "\n");

    md = tag_re().replace_all(&md, "").to_string();
    md = unescape_entities(&md);

    md.trim().to_string()
}

/// Converts markdown to storage-format HTML: ATX headings, fenced code
/// blocks, bullet lists and paragraphs. Everything else is passed through
/// as escaped text.
pub fn markdown_to_storage(markdown: &str) -> String {
    fn flush_paragraph(out: &mut String, paragraph: &mut Vec<&str>) {
        if !paragraph.is_empty() {
            out.push_str("<p>");
            out.push_str(&escape_text(&paragraph.join(" ")));
            out.push_str("</p>\n");
            paragraph.clear();
        }
    }
    fn close_list(out: &mut String, list_open: &mut bool) {
        if *list_open {
            out.push_str("</ul>\n");
            *list_open = false;
        }
    }

    let mut out = String::new();
    let mut paragraph: Vec<&str> = Vec::new();
    let mut list_open = false;
    let mut fence: Option<Vec<String>> = None;

    for line in markdown.lines() {
        if let Some(mut buf) = fence.take() {
            if line.trim_start().starts_with("```") {
                out.push_str("<pre><code>");
                out.push_str(&escape_text(&buf.join("\n")));
                out.push_str("</code></pre>\n");
            } else {
                buf.push(line.to_string());
                fence = Some(buf);
            }
            continue;
        }

        let trimmed = line.trim();
        if trimmed.starts_with("```") {
            flush_paragraph(&mut out, &mut paragraph);
            close_list(&mut out, &mut list_open);
            fence = Some(Vec::new());
        } else if let Some((level, text)) = heading_of(trimmed) {
            flush_paragraph(&mut out, &mut paragraph);
            close_list(&mut out, &mut list_open);
            out.push_str(&format!("<h{level}>{}</h{level}>\n", escape_text(text)));
        } else if let Some(item) = trimmed.strip_prefix("- ").or(trimmed.strip_prefix("* ")) {
            flush_paragraph(&mut out, &mut paragraph);
            if !list_open {
                out.push_str("<ul>");
                list_open = true;
            }
            out.push_str(&format!("<li>{}</li>", escape_text(item)));
        } else if trimmed.is_empty() {
            flush_paragraph(&mut out, &mut paragraph);
            close_list(&mut out, &mut list_open);
        } else {
            close_list(&mut out, &mut list_open);
            paragraph.push(trimmed);
        }
    }

    if let Some(buf) = fence {
        // Unterminated fence: emit what was collected.
        out.push_str("<pre><code>");
        out.push_str(&escape_text(&buf.join("\n")));
        out.push_str("</code></pre>\n");
    }
    flush_paragraph(&mut out, &mut paragraph);
    close_list(&mut out, &mut list_open);

    out.trim_end().to_string()
}

/// Rewrites markdown image references to point into the local `assets`
/// directory, prefixing each filename with the owning page id.
pub fn rewrite_image_refs(markdown: &str, page_id: &str) -> String {
    static IMAGE: OnceLock<Regex> = OnceLock::new();
    let re = IMAGE.get_or_init(|| Regex::new(r"!\[([^\]]*)\]\(([^)]+)\)").expect("valid regex"));

    re.replace_all(markdown, |caps: &regex::Captures<'_>| {
        let alt = &caps[1];
        let url = &caps[2];
        let filename = url
            .rsplit('/')
            .next()
            .unwrap_or(url)
            .split('?')
            .next()
            .unwrap_or(url);
        format!("![{alt}](assets/{page_id}-{filename})")
    })
    .to_string()
}

fn heading_of(line: &str) -> Option<(usize, &str)> {
    let level = line.chars().take_while(|c| *c == '#').count();
    if (1..=6).contains(&level) {
        line[level..]
            .strip_prefix(' ')
            .map(|text| (level, text.trim()))
    } else {
        None
    }
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn unescape_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
