use crate::fetchers::FetchMethod;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Separator used when joining the report's text blocks.
/// `text_length` is always the length of exactly that joined string.
pub const TEXT_SEPARATOR: &str = "\n";

/// A heading extracted from the page, in document order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heading {
    /// Heading depth, 1 through 6
    pub level: u8,

    /// Visible heading text
    pub text: String,
}

/// An anchor extracted from the page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRef {
    /// Visible link text
    pub text: String,

    /// The href attribute exactly as written in the markup
    pub href: String,

    /// Absolute URL resolved against the snapshot's final URL.
    /// Falls back to the literal href when resolution fails.
    pub resolved_url: String,

    /// False when the href could not be resolved to an absolute URL
    pub resolved: bool,
}

/// An image extracted from the page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Alt text, empty when absent
    pub alt: String,

    /// The src attribute exactly as written in the markup
    pub src: String,

    /// Absolute URL resolved against the snapshot's final URL
    pub resolved_url: String,

    /// False when the src could not be resolved to an absolute URL
    pub resolved: bool,
}

/// An embedded media source (audio elements and their source children)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRef {
    /// The src attribute exactly as written in the markup
    pub src: String,

    /// Absolute URL resolved against the snapshot's final URL
    pub resolved_url: String,

    /// False when the src could not be resolved to an absolute URL
    pub resolved: bool,
}

/// A table extracted from the page: optional header row plus data rows
/// as ordered cell-text sequences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableData {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Outcome of one transcription request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptStatus {
    Success,
    Failed,
}

/// Transcript obtained for one discovered audio clip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioTranscript {
    /// Absolute URL of the audio clip
    pub source_url: String,

    pub status: TranscriptStatus,

    /// Transcript text; empty when transcription failed
    pub text: String,

    /// Advisory flag: the transcript looks cut off mid-sentence.
    /// Never authoritative; the interpreter only narrows execution on it.
    pub truncated: bool,
}

/// Normalized extraction result for one page snapshot.
///
/// Created once per snapshot. After assembly it is only ever appended to:
/// audio transcripts by the audio resolver, decoded text blocks by the
/// encoded-content decoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentReport {
    /// Final resolved URL of the snapshot
    pub url: String,

    /// How the snapshot was fetched
    pub method: FetchMethod,

    pub title: Option<String>,

    pub meta_description: Option<String>,

    /// Visible text in document order, one whitespace-normalized block per
    /// text node, script/style/noscript content excluded
    pub text_blocks: Vec<String>,

    pub headings: Vec<Heading>,

    pub links: Vec<LinkRef>,

    pub images: Vec<ImageRef>,

    pub audio_sources: Vec<MediaRef>,

    pub tables: Vec<TableData>,

    /// Length of the raw HTML string, reported even when zero
    pub html_length: usize,

    /// Length of the text blocks joined with [`TEXT_SEPARATOR`],
    /// reported even when zero
    pub text_length: usize,

    /// Query parameters of the snapshot URL, percent-decoded,
    /// first occurrence wins
    pub query_params: HashMap<String, String>,

    pub audio_transcripts: Vec<AudioTranscript>,
}

impl ContentReport {
    /// All visible text joined with the report's declared separator
    pub fn joined_text(&self) -> String {
        self.text_blocks.join(TEXT_SEPARATOR)
    }
}

/// Renders the human-readable audit report for a content report.
///
/// Section layout mirrors what downstream consumers expect: statistics
/// first, then structure (headings, links, images, tables), then audio
/// transcriptions, then the full text content.
pub fn to_markdown(report: &ContentReport) -> String {
    let mut md: Vec<String> = Vec::new();

    md.push("# Page Content Report\n".to_string());
    md.push(format!("**URL:** {}\n", report.url));
    md.push(format!("**Method:** {}\n", report.method));
    if let Some(title) = &report.title {
        md.push(format!("**Title:** {}\n", title));
    }
    if let Some(desc) = &report.meta_description {
        md.push(format!("**Description:** {}\n", desc));
    }
    md.push("\n---\n".to_string());

    md.push("## Statistics\n".to_string());
    md.push(format!("- **Total Links:** {}", report.links.len()));
    md.push(format!("- **Total Images:** {}", report.images.len()));
    md.push(format!("- **Total Headings:** {}", report.headings.len()));
    md.push(format!("- **Total Tables:** {}", report.tables.len()));
    md.push(format!(
        "- **Audio Clips:** {}",
        report.audio_transcripts.len()
    ));
    md.push(format!("- **HTML Length:** {} characters", report.html_length));
    md.push(format!(
        "- **Text Content Length:** {} characters\n",
        report.text_length
    ));
    md.push("\n---\n".to_string());

    if !report.headings.is_empty() {
        md.push(format!("## Headings ({})\n", report.headings.len()));
        for (i, heading) in report.headings.iter().enumerate() {
            md.push(format!("{}. **H{}:** {}", i + 1, heading.level, heading.text));
        }
        md.push("\n---\n".to_string());
    }

    if !report.links.is_empty() {
        md.push(format!("## Links ({})\n", report.links.len()));
        for (i, link) in report.links.iter().enumerate() {
            let text = if link.text.is_empty() {
                "[No text]"
            } else {
                &link.text
            };
            md.push(format!("{}. [{}]({})", i + 1, text, link.resolved_url));
        }
        md.push("\n---\n".to_string());
    }

    if !report.images.is_empty() {
        md.push(format!("## Images ({})\n", report.images.len()));
        for (i, img) in report.images.iter().enumerate() {
            let alt = if img.alt.is_empty() {
                "[No alt text]"
            } else {
                &img.alt
            };
            md.push(format!("{}. **Alt:** {}", i + 1, alt));
            md.push(format!("   **Src:** {}", img.resolved_url));
        }
        md.push("\n---\n".to_string());
    }

    if !report.tables.is_empty() {
        md.push(format!("## Tables ({})\n", report.tables.len()));
        for (idx, table) in report.tables.iter().enumerate() {
            md.push(format!("\n### Table #{}", idx + 1));
            if !table.headers.is_empty() {
                md.push(format!("| {} |", table.headers.join(" | ")));
                md.push(format!(
                    "|{}|",
                    table
                        .headers
                        .iter()
                        .map(|_| "---")
                        .collect::<Vec<_>>()
                        .join("|")
                ));
                for row in &table.rows {
                    let mut padded = row.clone();
                    padded.resize(table.headers.len(), String::new());
                    padded.truncate(table.headers.len());
                    md.push(format!("| {} |", padded.join(" | ")));
                }
            } else {
                for (i, row) in table.rows.iter().enumerate() {
                    md.push(format!("**Row {}:** {}", i + 1, row.join(" | ")));
                }
            }
            md.push(String::new());
        }
        md.push("\n---\n".to_string());
    }

    if !report.audio_transcripts.is_empty() {
        md.push(format!(
            "## Audio Transcriptions ({})\n",
            report.audio_transcripts.len()
        ));
        for (i, transcript) in report.audio_transcripts.iter().enumerate() {
            md.push(format!("{}. **Source:** {}", i + 1, transcript.source_url));
            md.push(format!("   **Status:** {:?}", transcript.status));
            if transcript.truncated {
                md.push("   **Warning:** transcript appears cut off mid-sentence".to_string());
            }
            if !transcript.text.is_empty() {
                md.push(format!("   **Text:** {}", transcript.text));
            }
        }
        md.push("\n---\n".to_string());
    }

    md.push("## Text Content\n".to_string());
    md.push("```".to_string());
    md.push(report.joined_text());
    md.push("```\n".to_string());

    md.join("\n")
}
