use std::sync::OnceLock;

use regex::Regex;

/// Escape markup-significant characters. Applied to every piece of untrusted
/// text before any structural transformation.
pub fn escape_html(unsafe_text: &str) -> String {
    unsafe_text
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#039;")
}

/// A slice of raw text classified by the fence scanner.
#[derive(Debug, PartialEq)]
enum Segment {
    Text(String),
    /// A fenced block. An unterminated fence still lands here so that inline
    /// rules can never leak into an open fence mid-stream.
    Code { lang: String, body: String },
}

/// Split raw text on triple-backtick fence lines. Fences are line-delimited:
/// a line whose trimmed content starts with ``` opens (with an optional
/// language tag) or closes a block.
fn split_fences(raw: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut text: Option<String> = None;
    let mut code: Option<(String, String)> = None;

    for line in raw.lines() {
        let trimmed = line.trim_start();

        if code.is_some() {
            if trimmed.starts_with("```") {
                let (lang, body) = code.take().unwrap();
                segments.push(Segment::Code { lang, body });
            } else if let Some((_, body)) = code.as_mut() {
                if !body.is_empty() {
                    body.push('\n');
                }
                body.push_str(line);
            }
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix("```") {
            if let Some(t) = text.take() {
                segments.push(Segment::Text(t));
            }
            let lang = rest
                .trim()
                .split_whitespace()
                .next()
                .unwrap_or("")
                .to_string();
            code = Some((lang, String::new()));
            continue;
        }

        match text.as_mut() {
            Some(t) => {
                t.push('\n');
                t.push_str(line);
            }
            None => text = Some(line.to_string()),
        }
    }

    if let Some((lang, body)) = code.take() {
        segments.push(Segment::Code { lang, body });
    }
    if let Some(t) = text.take() {
        segments.push(Segment::Text(t));
    }
    segments
}

fn inline_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"`([^`]+)`").unwrap())
}

fn bold_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\*\*(.*?)\*\*|__(.*?)__").unwrap())
}

fn italic_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\*(.*?)\*|_(.*?)_").unwrap())
}

fn strike_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"~~(.*?)~~").unwrap())
}

/// Paired-delimiter inline rules, applied to already-escaped text.
/// Never called on fence bodies.
fn apply_inline(escaped: &str) -> String {
    let html = inline_code_re().replace_all(escaped, "<code>$1</code>");
    let html = bold_re().replace_all(&html, "<strong>$1$2</strong>");
    let html = italic_re().replace_all(&html, "<em>$1$2</em>");
    strike_re().replace_all(&html, "<del>$1</del>").into_owned()
}

/// Render one fenced block with a language label and copy affordance.
/// The body is escaped verbatim; no inline transformation is applied.
fn render_code_block(lang: &str, body: &str) -> String {
    let lang_display = if lang.is_empty() { "code" } else { lang };
    let language_class = if lang.is_empty() {
        String::new()
    } else {
        format!("language-{}", escape_html(lang))
    };
    format!(
        "<pre><div class=\"code-header\"><span class=\"language\">{}</span><button class=\"copy-code-btn\" aria-label=\"Copy code\" title=\"Copy code\">Copy</button></div><code class=\"{}\">{}</code></pre>",
        escape_html(lang_display),
        language_class,
        escape_html(body.trim())
    )
}

/// Raw accumulated text → safe, partially-structured markup.
///
/// Total, deterministic and pure: a streaming message's full accumulated
/// text is re-rendered through this on every fragment, so an open fence is
/// always treated as code and never as inline-formatted text.
pub fn render_markup(raw: &str) -> String {
    let mut html = String::new();
    for segment in split_fences(raw) {
        match segment {
            Segment::Code { lang, body } => html.push_str(&render_code_block(&lang, &body)),
            Segment::Text(text) => {
                let inline = apply_inline(&escape_html(&text));
                html.push_str(&inline.replace('\n', "<br>"));
            }
        }
    }
    html
}

fn sanitizer() -> &'static ammonia::Builder<'static> {
    static SANITIZER: OnceLock<ammonia::Builder<'static>> = OnceLock::new();
    SANITIZER.get_or_init(|| {
        let mut builder = ammonia::Builder::default();
        builder
            .add_tags(["button"])
            .add_generic_attributes(["class"])
            .add_tag_attributes("button", ["aria-label", "title"])
            .add_tag_attributes("a", ["target"])
            .link_rel(Some("noopener noreferrer"));
        builder
    })
}

/// Final defense pass over projected markup: anything outside the crate's
/// tag/attribute whitelist is stripped. Links get rel="noopener noreferrer".
pub fn sanitize(html: &str) -> String {
    sanitizer().clean(html).to_string()
}
