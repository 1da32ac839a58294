use tracing::warn;

use crate::error::{IngestError, Result};
use crate::types::{IngestionEvent, SourceKind};

const MAX_HTML_BYTES: usize = 5 * 1024 * 1024;

/// Extracts raw text for an ingestion event (§4.6 step 1 "Extract").
///
/// - `Url` sources are fetched over HTTP and have HTML tags stripped.
/// - `File` sources are dispatched by extension; only plain text is
///   supported today, PDF/DOCX fail with [`IngestError::Unsupported`].
/// - `Manual` sources pass their inline `content` straight through.
pub struct Extractor {
    http: reqwest::Client,
}

impl Extractor {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    pub async fn extract(&self, event: &IngestionEvent) -> Result<String> {
        match event.kind {
            SourceKind::Url => self.extract_url(event).await,
            SourceKind::File => self.extract_file(event),
            SourceKind::Manual => self.extract_manual(event),
        }
    }

    async fn extract_url(&self, event: &IngestionEvent) -> Result<String> {
        let url = event
            .url
            .as_deref()
            .ok_or_else(|| IngestError::Extraction("url source missing url".into()))?;

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::Extraction(format!("fetch {url} returned {status}")));
        }
        let body = response.text().await?;
        let body = if body.len() > MAX_HTML_BYTES {
            warn!(%url, len = body.len(), "truncating oversized fetch body");
            body[..MAX_HTML_BYTES].to_string()
        } else {
            body
        };
        Ok(strip_html(&body))
    }

    fn extract_file(&self, event: &IngestionEvent) -> Result<String> {
        let file_id = event
            .file_id
            .as_deref()
            .ok_or_else(|| IngestError::Extraction("file source missing file_id".into()))?;
        let ext = file_id.rsplit('.').next().unwrap_or("").to_lowercase();
        match ext.as_str() {
            "txt" | "md" => event
                .content
                .clone()
                .ok_or_else(|| IngestError::Extraction(format!("file {file_id} has no content"))),
            "pdf" | "docx" => Err(IngestError::Unsupported(ext)),
            other => Err(IngestError::Unsupported(other.to_string())),
        }
    }

    fn extract_manual(&self, event: &IngestionEvent) -> Result<String> {
        event
            .content
            .clone()
            .ok_or_else(|| IngestError::Extraction("manual source missing content".into()))
    }
}

/// Strips `<tag ...>` markup and collapses whitespace. Not a full HTML
/// parser: good enough for policy/help-center pages, not arbitrary markup.
fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: SourceKind) -> IngestionEvent {
        IngestionEvent {
            source_id: "src-1".into(),
            tenant_id: "tenant-a".into(),
            kind,
            url: None,
            file_id: None,
            content: None,
            title: None,
            version: None,
        }
    }

    #[test]
    fn strip_html_removes_tags_and_collapses_whitespace() {
        let html = "<html><body><p>Hello   <b>world</b></p></body></html>";
        assert_eq!(strip_html(html), "Hello world");
    }

    #[tokio::test]
    async fn manual_source_passes_content_through() {
        let extractor = Extractor::new(reqwest::Client::new());
        let mut event = event(SourceKind::Manual);
        event.content = Some("plain text".into());
        let text = extractor.extract(&event).await.unwrap();
        assert_eq!(text, "plain text");
    }

    #[tokio::test]
    async fn manual_source_without_content_fails() {
        let extractor = Extractor::new(reqwest::Client::new());
        let event = event(SourceKind::Manual);
        assert!(matches!(extractor.extract(&event).await, Err(IngestError::Extraction(_))));
    }

    #[tokio::test]
    async fn pdf_file_is_unsupported() {
        let extractor = Extractor::new(reqwest::Client::new());
        let mut event = event(SourceKind::File);
        event.file_id = Some("policy.pdf".into());
        assert!(matches!(extractor.extract(&event).await, Err(IngestError::Unsupported(_))));
    }

    #[tokio::test]
    async fn txt_file_uses_inline_content() {
        let extractor = Extractor::new(reqwest::Client::new());
        let mut event = event(SourceKind::File);
        event.file_id = Some("notes.txt".into());
        event.content = Some("notes body".into());
        let text = extractor.extract(&event).await.unwrap();
        assert_eq!(text, "notes body");
    }
}
