//! Markup to Markdown conversion.
//!
//! The service returns a cleaned-up article body: headings, paragraphs,
//! emphasis, links, images, lists, quotes, and code. Conversion is a fixed
//! sequence of regex passes over that markup, producing ATX headings and
//! blank-line separated blocks. Script, style, and head content is dropped.
//!
//! Code (`<pre>` and `<code>`) is lifted out into placeholders first so its
//! whitespace and entities survive the later passes untouched.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use thiserror::Error;

/// Errors converting markup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConversionError {
    /// The input contains NUL bytes and is not text markup.
    #[error("input contains NUL bytes")]
    NulByte,
    /// Non-empty markup produced no text.
    #[error("markup produced no text")]
    NoText,
}

fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

static COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"(?s)<!--.*?-->"));

static DROPPED_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(
        r"(?is)<(?:script|style|head|noscript|template)\b[^>]*>.*?</(?:script|style|head|noscript|template)\s*>",
    )
});

static PRE_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?is)<pre\b[^>]*>(.*?)</pre\s*>"));

static CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?is)<code\b[^>]*>(.*?)</code\s*>"));

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"\s+"));

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?is)<h([1-6])\b[^>]*>(.*?)</h[1-6]\s*>"));

static IMG_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"(?is)<img\b[^>]*>"));

static SRC_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r#"(?is)\bsrc\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#)
});

static ALT_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r#"(?is)\balt\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#)
});

static HREF_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r#"(?is)\bhref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#)
});

static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?is)<a\b([^>]*)>(.*?)</a\s*>"));

static STRONG_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r"(?is)<(?:strong|b)\b[^>]*>(.*?)</(?:strong|b)\s*>")
});

static EM_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?is)<(?:em|i)\b[^>]*>(.*?)</(?:em|i)\s*>"));

static BR_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"(?i)<br\b[^>]*>"));

static HR_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"(?i)<hr\b[^>]*>"));

static OL_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?is)<ol\b[^>]*>(.*?)</ol\s*>"));

static LI_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"(?i)<li\b[^>]*>"));

static LI_CLOSE_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"(?i)</li\s*>"));

static LIST_WRAPPER_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?i)</?(?:ul|ol)\b[^>]*>"));

static BLOCKQUOTE_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?is)<blockquote\b[^>]*>(.*?)</blockquote\s*>"));

static BLOCK_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(
        r"(?i)</?(?:p|div|section|article|header|footer|main|aside|nav|figure|figcaption|table|thead|tbody|tr|dl|dt|dd|blockquote)\b[^>]*>",
    )
});

static CELL_CLOSE_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"(?i)</t[dh]\s*>"));

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"(?s)<[^>]*>"));

static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z][a-zA-Z0-9]*);")
});

static BLANK_LINES_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"\n{3,}"));

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"\x00(\d+)\x00"));

/// Converts article markup to Markdown.
///
/// # Errors
///
/// Returns [`ConversionError::NulByte`] for input containing NUL bytes and
/// [`ConversionError::NoText`] when non-blank markup yields no text.
pub fn convert(html: &str) -> Result<String, ConversionError> {
    if html.contains('\0') {
        return Err(ConversionError::NulByte);
    }
    if html.trim().is_empty() {
        return Ok(String::new());
    }

    let mut code_blocks: Vec<CodeBlock> = Vec::new();

    let text = COMMENT_RE.replace_all(html, "");
    let text = DROPPED_BLOCK_RE.replace_all(&text, "");

    let text = PRE_RE.replace_all(&text, |caps: &Captures| {
        let code = decode_entities(&TAG_RE.replace_all(&caps[1], ""));
        let code = code.trim_matches('\n').trim_end();
        placeholder(&mut code_blocks, format!("```\n{code}\n```"), true)
    });
    let text = CODE_RE.replace_all(&text, |caps: &Captures| {
        let code = decode_entities(&TAG_RE.replace_all(&caps[1], ""));
        let code = WHITESPACE_RE.replace_all(code.trim(), " ");
        if code.is_empty() {
            String::new()
        } else {
            placeholder(&mut code_blocks, format!("`{code}`"), false)
        }
    });

    let text = WHITESPACE_RE.replace_all(&text, " ");
    let text = PLACEHOLDER_RE.replace_all(&text, |caps: &Captures| {
        let is_block = caps[1]
            .parse::<usize>()
            .ok()
            .and_then(|i| code_blocks.get(i))
            .is_some_and(|block| block.is_block);
        if is_block {
            format!("\n\n{}\n\n", &caps[0])
        } else {
            caps[0].to_string()
        }
    });

    let text = HEADING_RE.replace_all(&text, |caps: &Captures| {
        let level: usize = caps[1].parse().unwrap_or(1);
        let inner = inline_text(&caps[2]);
        if inner.is_empty() {
            "\n\n".to_string()
        } else {
            format!("\n\n{} {inner}\n\n", "#".repeat(level))
        }
    });
    let text = IMG_RE.replace_all(&text, |caps: &Captures| {
        let tag = &caps[0];
        match attribute(&SRC_ATTR_RE, tag) {
            Some(src) => format!("![{}]({src})", attribute(&ALT_ATTR_RE, tag).unwrap_or_default()),
            None => String::new(),
        }
    });
    let text = LINK_RE.replace_all(&text, |caps: &Captures| {
        let label = caps[2].trim().to_string();
        match attribute(&HREF_ATTR_RE, &caps[1]) {
            Some(href) if !label.is_empty() && !href.is_empty() => format!("[{label}]({href})"),
            _ => label,
        }
    });
    let text = STRONG_RE.replace_all(&text, |caps: &Captures| wrap_inline(&caps[1], "**"));
    let text = EM_RE.replace_all(&text, |caps: &Captures| wrap_inline(&caps[1], "*"));
    let text = BR_RE.replace_all(&text, "\n");
    let text = HR_RE.replace_all(&text, "\n\n---\n\n");

    let text = OL_RE.replace_all(&text, |caps: &Captures| {
        let mut n = 0;
        let numbered = LI_OPEN_RE.replace_all(&caps[1], |_: &Captures| {
            n += 1;
            format!("\n{n}. ")
        });
        format!("\n\n{numbered}\n\n")
    });
    let text = LI_OPEN_RE.replace_all(&text, "\n- ");
    let text = LI_CLOSE_RE.replace_all(&text, "");
    let text = LIST_WRAPPER_RE.replace_all(&text, "\n\n");

    let text = BLOCKQUOTE_RE.replace_all(&text, |caps: &Captures| {
        let inner = BLOCK_TAG_RE.replace_all(&caps[1], "\n\n");
        let inner = TAG_RE.replace_all(&inner, "");
        let quoted = inner
            .split("\n\n")
            .map(str::trim)
            .filter(|para| !para.is_empty())
            .map(|para| {
                para.lines()
                    .map(|line| format!("> {}", line.trim()))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .collect::<Vec<_>>()
            .join("\n>\n");
        format!("\n\n{quoted}\n\n")
    });

    let text = BLOCK_TAG_RE.replace_all(&text, "\n\n");
    let text = CELL_CLOSE_RE.replace_all(&text, " ");
    let text = TAG_RE.replace_all(&text, "");
    let text = decode_entities(&text);

    let text = text
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n");
    let text = BLANK_LINES_RE.replace_all(&text, "\n\n");
    let text = text.trim();

    if text.is_empty() {
        return Err(ConversionError::NoText);
    }

    let restored = PLACEHOLDER_RE.replace_all(text, |caps: &Captures| {
        caps[1]
            .parse::<usize>()
            .ok()
            .and_then(|i| code_blocks.get(i))
            .map(|block| block.markdown.clone())
            .unwrap_or_default()
    });
    Ok(restored.into_owned())
}

struct CodeBlock {
    markdown: String,
    is_block: bool,
}

fn placeholder(store: &mut Vec<CodeBlock>, markdown: String, is_block: bool) -> String {
    store.push(CodeBlock { markdown, is_block });
    format!("\0{}\0", store.len() - 1)
}

fn attribute(re: &Regex, tag: &str) -> Option<String> {
    let caps = re.captures(tag)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))
        .map(|m| m.as_str().trim().to_string())
}

/// Tag-stripped, whitespace-collapsed text of an inline fragment.
fn inline_text(fragment: &str) -> String {
    let stripped = TAG_RE.replace_all(fragment, "");
    WHITESPACE_RE.replace_all(stripped.trim(), " ").into_owned()
}

fn wrap_inline(inner: &str, marker: &str) -> String {
    let trimmed = inner.trim();
    if trimmed.is_empty() {
        inner.to_string()
    } else {
        format!("{marker}{trimmed}{marker}")
    }
}

/// Decodes named and numeric character references.
///
/// Unknown named references are left as written.
#[must_use]
pub fn decode_entities(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &Captures| {
            let name = &caps[1];
            let decoded = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = name.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                named_entity(name)
            };
            match decoded {
                Some('\0') | None => caps[0].to_string(),
                Some(c) => c.to_string(),
            }
        })
        .into_owned()
}

fn named_entity(name: &str) -> Option<char> {
    Some(match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "ndash" => '\u{2013}',
        "mdash" => '\u{2014}',
        "hellip" => '\u{2026}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201c}',
        "rdquo" => '\u{201d}',
        "laquo" => '\u{ab}',
        "raquo" => '\u{bb}',
        "copy" => '\u{a9}',
        "reg" => '\u{ae}',
        "trade" => '\u{2122}',
        "deg" => '\u{b0}',
        "times" => '\u{d7}',
        "middot" => '\u{b7}',
        "bull" => '\u{2022}',
        "euro" => '\u{20ac}',
        "pound" => '\u{a3}',
        _ => return None,
    })
}
