//! Model replies rendered as Telegram HTML.
//!
//! Telegram's HTML mode understands `<b>`, `<i>`, `<s>`, `<code>`, `<pre>`
//! and `<a href>`. The source is escaped first, so anything the renderer
//! does not recognise reaches the user as literal text. Unterminated inline
//! markers stay literal; an unterminated fence is closed at the end.

/// Convert the Markdown subset models commonly emit into Telegram HTML.
pub fn markdown_to_telegram_html(md: &str) -> String {
    let escaped = escape_html(md);
    let mut lines: Vec<String> = Vec::new();
    let mut fence: Option<Fence<'_>> = None;

    for line in escaped.split('\n') {
        let marker = line.trim_start().strip_prefix("```");
        if let Some(open) = fence.as_mut() {
            if marker.is_some() {
                lines.push(open.render());
                fence = None;
            } else {
                open.body.push(line);
            }
        } else if let Some(lang) = marker {
            fence = Some(Fence {
                lang: lang.trim(),
                body: Vec::new(),
            });
        } else {
            lines.push(render_line(line));
        }
    }
    if let Some(open) = fence {
        lines.push(open.render());
    }

    lines.join("\n")
}

struct Fence<'a> {
    lang: &'a str,
    body: Vec<&'a str>,
}

impl Fence<'_> {
    fn render(&self) -> String {
        let body = self.body.join("\n");
        let tagged = !self.lang.is_empty()
            && self
                .lang
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '_' | '#'));
        if tagged {
            format!(
                "<pre><code class=\"language-{}\">{body}</code></pre>",
                self.lang
            )
        } else {
            format!("<pre>{body}</pre>")
        }
    }
}

/// Headings have no Telegram equivalent; they become bold lines.
fn render_line(line: &str) -> String {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|&c| c == '#').count();
    if (1..=6).contains(&hashes)
        && let Some(title) = trimmed[hashes..].strip_prefix(' ')
    {
        return format!("<b>{}</b>", render_inline(title.trim()));
    }
    render_inline(line)
}

fn render_inline(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(ch) = rest.chars().next() {
        if let Some((code, after)) = span(rest, "`", "`") {
            out.push_str(&format!("<code>{code}</code>"));
            rest = after;
        } else if let Some((inner, after)) = span(rest, "**", "**") {
            out.push_str(&format!("<b>{}</b>", render_inline(inner)));
            rest = after;
        } else if let Some((inner, after)) = span(rest, "~~", "~~") {
            out.push_str(&format!("<s>{}</s>", render_inline(inner)));
            rest = after;
        } else if let Some((inner, after)) = span(rest, "*", "*") {
            out.push_str(&format!("<i>{}</i>", render_inline(inner)));
            rest = after;
        } else if let Some((anchor, after)) = link(rest) {
            out.push_str(&anchor);
            rest = after;
        } else {
            out.push(ch);
            rest = &rest[ch.len_utf8()..];
        }
    }

    out
}

/// Match `open … close` at the start of `rest`. The enclosed text must be
/// non-empty and not padded with whitespace, so `2 * 3 * 4` and `* item`
/// stay literal.
fn span<'a>(rest: &'a str, open: &str, close: &str) -> Option<(&'a str, &'a str)> {
    let body = rest.strip_prefix(open)?;
    let end = body.find(close)?;
    let inner = &body[..end];
    let tight = !inner.is_empty()
        && !inner.starts_with(char::is_whitespace)
        && !inner.ends_with(char::is_whitespace);
    tight.then(|| (inner, &body[end + close.len()..]))
}

/// `[label](url)` with an http(s) target.
fn link(rest: &str) -> Option<(String, &str)> {
    let (label, after) = span(rest, "[", "]")?;
    let (url, after) = span(after, "(", ")")?;
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        return None;
    }
    let href = url.replace('"', "&quot;");
    Some((
        format!("<a href=\"{href}\">{}</a>", render_inline(label)),
        after,
    ))
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("**hello**", "<b>hello</b>")]
    #[case("*hello*", "<i>hello</i>")]
    #[case("`code`", "<code>code</code>")]
    #[case("~~old~~", "<s>old</s>")]
    #[case("**bold `x`**", "<b>bold <code>x</code></b>")]
    #[case("`**not bold**`", "<code>**not bold**</code>")]
    #[case("<script>alert(1)</script>", "&lt;script&gt;alert(1)&lt;/script&gt;")]
    #[case("a & b", "a &amp; b")]
    #[case("2 * 3 * 4", "2 * 3 * 4")]
    #[case("* item one", "* item one")]
    #[case("**unterminated", "**unterminated")]
    #[case("snake_case_name", "snake_case_name")]
    fn inline_markup(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(markdown_to_telegram_html(input), expected);
    }

    #[test]
    fn links_require_http_targets() {
        assert_eq!(
            markdown_to_telegram_html("[docs](https://example.com/a?b=1&c=2)"),
            "<a href=\"https://example.com/a?b=1&amp;c=2\">docs</a>"
        );
        assert_eq!(
            markdown_to_telegram_html("[x](javascript:alert)"),
            "[x](javascript:alert)"
        );
    }

    #[test]
    fn fenced_block_keeps_content_verbatim() {
        let html = markdown_to_telegram_html("Try:\n```rust\nlet v = a < b && *p;\n```\nDone.");
        assert_eq!(
            html,
            "Try:\n<pre><code class=\"language-rust\">let v = a &lt; b &amp;&amp; *p;</code></pre>\nDone."
        );
    }

    #[test]
    fn unterminated_fence_is_closed() {
        assert_eq!(
            markdown_to_telegram_html("```\nline 1\nline 2"),
            "<pre>line 1\nline 2</pre>"
        );
    }

    #[test]
    fn headings_become_bold_lines() {
        assert_eq!(
            markdown_to_telegram_html("## Summary\n#hashtag"),
            "<b>Summary</b>\n#hashtag"
        );
    }

    #[test]
    fn plain_text_is_unchanged() {
        let text = "Hello there.\n\n- first\n- second";
        assert_eq!(markdown_to_telegram_html(text), text);
    }
}
