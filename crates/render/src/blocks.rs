//! Typed content blocks and their markup rendering.
//!
//! A content document is either an ordered block list (designer format), a
//! legacy `{"html": …}` object carrying raw markup, or a JSON-encoded string
//! wrapping one of the two. Unknown block types are skipped silently so old
//! engines survive new designer features; a document that cannot be
//! interpreted at all renders a minimal fallback instead of failing.

use serde::Deserialize;
use tracing::debug;

/// One designer block. Variant fields mirror the designer's JSON, with the
/// documented defaults applied at render time.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Block {
    #[serde(rename_all = "camelCase")]
    Text {
        #[serde(default)]
        text: String,
        #[serde(default)]
        font_size: Option<u32>,
        #[serde(default)]
        color: Option<String>,
        #[serde(default)]
        align: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Button {
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        link: Option<String>,
        #[serde(default)]
        background_color: Option<String>,
        #[serde(default)]
        color: Option<String>,
        #[serde(default)]
        border_radius: Option<u32>,
        #[serde(default)]
        font_size: Option<u32>,
    },
    #[serde(rename_all = "camelCase")]
    Image {
        #[serde(default)]
        src: String,
        #[serde(default)]
        alt: String,
        #[serde(default)]
        border_radius: Option<u32>,
    },
    Email {
        #[serde(default)]
        placeholder: Option<String>,
    },
    Divider {
        #[serde(default)]
        height: Option<u32>,
        #[serde(default)]
        style: Option<String>,
        #[serde(default)]
        color: Option<String>,
    },
    Spacer {
        #[serde(default)]
        height: Option<u32>,
    },
    Html {
        #[serde(default)]
        html: String,
    },
}

const FALLBACK_MARKUP: &str =
    r#"<div style="padding: 20px;"><p>No content available</p></div>"#;

/// Render a content document to markup.
pub fn render_content(content: &serde_json::Value) -> String {
    match content {
        // Content stored as a JSON-encoded string; unwrap one level.
        serde_json::Value::String(raw) => match serde_json::from_str(raw) {
            Ok(inner) => render_content(&inner),
            Err(_) if !raw.trim().is_empty() => {
                // Treat the raw string as display text, not markup.
                format!(
                    r#"<div style="padding: 20px;"><p>{}</p></div>"#,
                    escape_html(raw)
                )
            }
            Err(_) => FALLBACK_MARKUP.to_string(),
        },
        serde_json::Value::Array(items) => render_blocks(items),
        serde_json::Value::Object(map) => match map.get("html").and_then(|v| v.as_str()) {
            Some(html) => html.to_string(),
            None => FALLBACK_MARKUP.to_string(),
        },
        _ => FALLBACK_MARKUP.to_string(),
    }
}

fn render_blocks(items: &[serde_json::Value]) -> String {
    let mut html = String::from(r#"<div style="padding: 0;">"#);
    for item in items {
        match serde_json::from_value::<Block>(item.clone()) {
            Ok(block) => html.push_str(&render_block(&block)),
            Err(_) => {
                debug!(block = %item, "skipping unknown content block");
            }
        }
    }
    html.push_str("</div>");
    html
}

fn render_block(block: &Block) -> String {
    match block {
        Block::Text {
            text,
            font_size,
            color,
            align,
        } => format!(
            r#"<div style="margin-bottom: 15px; font-size: {}px; color: {}; text-align: {};">{}</div>"#,
            font_size.unwrap_or(16),
            escape_attr(color.as_deref().unwrap_or("#333")),
            escape_attr(align.as_deref().unwrap_or("left")),
            escape_html(text),
        ),
        Block::Button {
            text,
            link,
            background_color,
            color,
            border_radius,
            font_size,
        } => format!(
            r#"<a href="{}" class="cta-button" style="display: inline-block; padding: 12px 24px; background: {}; color: {}; text-decoration: none; border-radius: {}px; font-size: {}px; margin-bottom: 15px;">{}</a>"#,
            escape_attr(link.as_deref().unwrap_or("#")),
            escape_attr(background_color.as_deref().unwrap_or("#007bff")),
            escape_attr(color.as_deref().unwrap_or("#fff")),
            border_radius.unwrap_or(4),
            font_size.unwrap_or(16),
            escape_html(text.as_deref().unwrap_or("Click Here")),
        ),
        Block::Image {
            src,
            alt,
            border_radius,
        } => format!(
            r#"<img src="{}" alt="{}" style="max-width: 100%; height: auto; margin-bottom: 15px; border-radius: {}px;">"#,
            escape_attr(src),
            escape_attr(alt),
            border_radius.unwrap_or(0),
        ),
        Block::Email { placeholder } => format!(
            r#"<input type="email" placeholder="{}" style="width: 100%; padding: 12px; border: 1px solid #ddd; border-radius: 4px; margin-bottom: 15px;">"#,
            escape_attr(placeholder.as_deref().unwrap_or("Enter your email")),
        ),
        Block::Divider {
            height,
            style,
            color,
        } => format!(
            r#"<hr style="border: none; border-top: {}px {} {}; margin: 20px 0;">"#,
            height.unwrap_or(1),
            escape_attr(style.as_deref().unwrap_or("solid")),
            escape_attr(color.as_deref().unwrap_or("#ddd")),
        ),
        Block::Spacer { height } => {
            format!(r#"<div style="height: {}px;"></div>"#, height.unwrap_or(20))
        }
        // Raw HTML passes through untouched; the designer owns its safety.
        Block::Html { html } => html.clone(),
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

fn escape_attr(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
