//! HTML extraction: title, meta description, visible text, and outbound
//! links. Mirrors `crawlerlib/parsing.py::Extractor`, built on the
//! teacher's `lol_html`-based streaming rewriter rather than loading a
//! DOM tree.

use lol_html::{element, text, HtmlRewriter, Settings};

use crate::normalize::normalize_link;
use crate::types::ExtractedFields;

const MAX_TEXT_CHARS: usize = 4_000;

/// Extracts `{title, description, text, num_links}` plus the absolute,
/// in-scope links discovered in `<a href>`. Unusable input (malformed
/// enough that the rewriter cannot process it) yields empty fields and
/// no links, matching §7 `ParseError`'s no-propagation policy.
pub fn extract(base_url: &str, html: &str) -> (ExtractedFields, Vec<String>) {
    let mut title = String::new();
    let mut description = String::new();
    let mut og_description = String::new();
    let mut text_chunks: Vec<String> = Vec::new();
    let mut text_len = 0usize;
    let mut links: Vec<String> = Vec::new();

    {
        let mut rewriter = HtmlRewriter::new(
            Settings {
                element_content_handlers: vec![
                    element!("meta[name=description]", |el| {
                        if description.is_empty() {
                            if let Some(content) = el.get_attribute("content") {
                                description = content.trim().to_string();
                            }
                        }
                        Ok(())
                    }),
                    element!("meta[property='og:description']", |el| {
                        if og_description.is_empty() {
                            if let Some(content) = el.get_attribute("content") {
                                og_description = content.trim().to_string();
                            }
                        }
                        Ok(())
                    }),
                    element!("a[href]", |el| {
                        if let Some(href) = el.get_attribute("href") {
                            if let Some(normalized) = normalize_link(base_url, &href) {
                                links.push(normalized);
                            }
                        }
                        Ok(())
                    }),
                    text!("title", |t| {
                        title.push_str(t.as_str());
                        Ok(())
                    }),
                    text!("*", |t| {
                        if text_len < MAX_TEXT_CHARS {
                            let chunk = t.as_str().trim();
                            if !chunk.is_empty() {
                                text_len += chunk.chars().count();
                                text_chunks.push(chunk.to_string());
                            }
                        }
                        Ok(())
                    }),
                ],
                ..Settings::new()
            },
            |_: &[u8]| {},
        );

        if rewriter.write(html.as_bytes()).is_err() || rewriter.end().is_err() {
            return (ExtractedFields::default(), Vec::new());
        }
    }

    let description = if description.is_empty() { og_description } else { description };
    let mut text: String = text_chunks.join(" ");
    if text.chars().count() > MAX_TEXT_CHARS {
        text = text.chars().take(MAX_TEXT_CHARS).collect();
    }

    let fields = ExtractedFields {
        title: title.trim().to_string(),
        description,
        text,
        num_links: links.len(),
    };
    (fields, links)
}
