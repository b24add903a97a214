use crate::fetchers::PageSnapshot;
use crate::report::{
    ContentReport, Heading, ImageRef, LinkRef, MediaRef, TableData,
};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use url::Url;

/// Builds the normalized content report for a page snapshot.
///
/// The document is parsed once. One walk collects visible text (text nodes
/// outside script/style/noscript subtrees, whitespace-normalized, document
/// order); selector passes collect the structural elements. No script
/// content is ever evaluated.
pub fn extract(snapshot: &PageSnapshot) -> ContentReport {
    let doc = Html::parse_document(&snapshot.html);
    let base = Url::parse(&snapshot.final_url).ok();

    let text_blocks = collect_text_blocks(&doc);
    let text_length = text_blocks.join(crate::report::TEXT_SEPARATOR).len();

    let report = ContentReport {
        url: snapshot.final_url.clone(),
        method: snapshot.method,
        title: select_first_text(&doc, "title"),
        meta_description: select_meta_description(&doc),
        headings: collect_headings(&doc),
        links: collect_links(&doc, base.as_ref()),
        images: collect_images(&doc, base.as_ref()),
        audio_sources: collect_audio_sources(&doc, base.as_ref()),
        tables: collect_tables(&doc),
        html_length: snapshot.html.len(),
        text_length,
        query_params: collect_query_params(base.as_ref()),
        text_blocks,
        audio_transcripts: Vec::new(),
    };

    ::log::debug!(
        "extracted {} text blocks, {} links, {} headings, {} tables from {}",
        report.text_blocks.len(),
        report.links.len(),
        report.headings.len(),
        report.tables.len(),
        report.url
    );

    report
}

/// Resolves a raw href/src to an absolute URL against the snapshot base.
/// Malformed values fall back to the literal, flagged as unresolved.
fn resolve_reference(base: Option<&Url>, raw: &str) -> (String, bool) {
    if let Ok(absolute) = Url::parse(raw) {
        return (absolute.to_string(), true);
    }
    if let Some(base) = base {
        if let Ok(joined) = base.join(raw) {
            return (joined.to_string(), true);
        }
    }
    (raw.to_string(), false)
}

fn normalize_whitespace(segment: &str) -> String {
    segment.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(element: &ElementRef) -> String {
    normalize_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

fn collect_text_blocks(doc: &Html) -> Vec<String> {
    let mut blocks = Vec::new();

    for node in doc.tree.root().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let invisible = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .map(|e| matches!(e.name(), "script" | "style" | "noscript"))
                .unwrap_or(false)
        });
        if invisible {
            continue;
        }
        let normalized = normalize_whitespace(text);
        if !normalized.is_empty() {
            blocks.push(normalized);
        }
    }

    blocks
}

fn select_first_text(doc: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).unwrap();
    doc.select(&selector)
        .map(|el| element_text(&el))
        .find(|text| !text.is_empty())
}

fn select_meta_description(doc: &Html) -> Option<String> {
    let selector = Selector::parse(r#"meta[name="description"]"#).unwrap();
    doc.select(&selector)
        .filter_map(|el| el.value().attr("content"))
        .map(|content| normalize_whitespace(content))
        .find(|content| !content.is_empty())
}

fn collect_headings(doc: &Html) -> Vec<Heading> {
    let selector = Selector::parse("h1, h2, h3, h4, h5, h6").unwrap();
    doc.select(&selector)
        .map(|el| {
            let level = el
                .value()
                .name()
                .trim_start_matches('h')
                .parse::<u8>()
                .unwrap_or(6);
            Heading {
                level,
                text: element_text(&el),
            }
        })
        .collect()
}

fn collect_links(doc: &Html, base: Option<&Url>) -> Vec<LinkRef> {
    let selector = Selector::parse("a[href]").unwrap();
    doc.select(&selector)
        .filter_map(|el| {
            let href = el.value().attr("href")?;
            if href.is_empty() {
                return None;
            }
            let (resolved_url, resolved) = resolve_reference(base, href);
            Some(LinkRef {
                text: element_text(&el),
                href: href.to_string(),
                resolved_url,
                resolved,
            })
        })
        .collect()
}

fn collect_images(doc: &Html, base: Option<&Url>) -> Vec<ImageRef> {
    let selector = Selector::parse("img[src]").unwrap();
    doc.select(&selector)
        .filter_map(|el| {
            let src = el.value().attr("src")?;
            if src.is_empty() {
                return None;
            }
            let (resolved_url, resolved) = resolve_reference(base, src);
            Some(ImageRef {
                alt: el.value().attr("alt").unwrap_or_default().to_string(),
                src: src.to_string(),
                resolved_url,
                resolved,
            })
        })
        .collect()
}

fn collect_audio_sources(doc: &Html, base: Option<&Url>) -> Vec<MediaRef> {
    let selector = Selector::parse("audio[src], audio > source[src]").unwrap();
    doc.select(&selector)
        .filter_map(|el| {
            let src = el.value().attr("src")?;
            if src.is_empty() {
                return None;
            }
            let (resolved_url, resolved) = resolve_reference(base, src);
            Some(MediaRef {
                src: src.to_string(),
                resolved_url,
                resolved,
            })
        })
        .collect()
}

fn collect_tables(doc: &Html) -> Vec<TableData> {
    let table_selector = Selector::parse("table").unwrap();
    let row_selector = Selector::parse("tr").unwrap();
    let cell_selector = Selector::parse("th, td").unwrap();
    let header_cell_selector = Selector::parse("th").unwrap();
    let thead_header_selector = Selector::parse("thead th").unwrap();

    let mut tables = Vec::new();

    for table in doc.select(&table_selector) {
        let mut headers: Vec<String> = table
            .select(&thead_header_selector)
            .map(|el| element_text(&el))
            .collect();
        let mut rows: Vec<Vec<String>> = Vec::new();

        for (index, row) in table.select(&row_selector).enumerate() {
            let in_thead = row.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .map(|e| e.name() == "thead")
                    .unwrap_or(false)
            });
            if in_thead {
                continue;
            }

            let cells: Vec<String> = row
                .select(&cell_selector)
                .map(|el| element_text(&el))
                .collect();
            if cells.is_empty() {
                continue;
            }

            // A leading all-th row doubles as the header when no thead exists
            if headers.is_empty()
                && index == 0
                && row.select(&header_cell_selector).count() == cells.len()
            {
                headers = cells;
                continue;
            }

            rows.push(cells);
        }

        if !headers.is_empty() || !rows.is_empty() {
            tables.push(TableData { headers, rows });
        }
    }

    tables
}

fn collect_query_params(base: Option<&Url>) -> HashMap<String, String> {
    let mut params = HashMap::new();
    if let Some(url) = base {
        for (key, value) in url.query_pairs() {
            // First occurrence wins for duplicate keys
            params
                .entry(key.to_string())
                .or_insert_with(|| value.to_string());
        }
    }
    params
}
