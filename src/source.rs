use crate::error::ContractError;
use crate::types::PageSize;
use lopdf::{Document as LoDocument, Object as LoObject};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const MAX_PAGE_TREE_DEPTH: usize = 10;

pub trait DocumentSource {
    fn fetch(&self) -> Result<Vec<u8>, ContractError>;
    fn describe(&self) -> String;
}

#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DocumentSource for FileSource {
    fn fetch(&self) -> Result<Vec<u8>, ContractError> {
        std::fs::read(&self.path).map_err(|err| {
            ContractError::SourceLoadFailure(format!("{}: {err}", self.path.display()))
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[derive(Debug, Clone)]
pub struct BytesSource {
    label: String,
    bytes: Arc<Vec<u8>>,
}

impl BytesSource {
    pub fn new(label: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            label: label.into(),
            bytes: Arc::new(bytes),
        }
    }
}

impl DocumentSource for BytesSource {
    fn fetch(&self) -> Result<Vec<u8>, ContractError> {
        if self.bytes.is_empty() {
            return Err(ContractError::SourceLoadFailure(format!("{} is empty", self.label)));
        }
        Ok(self.bytes.as_ref().clone())
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpSource {
    url: String,
    timeout: std::time::Duration,
}

#[cfg(feature = "http")]
impl HttpSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: std::time::Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[cfg(feature = "http")]
impl DocumentSource for HttpSource {
    fn fetch(&self) -> Result<Vec<u8>, ContractError> {
        let fail = |err: reqwest::Error| ContractError::SourceLoadFailure(format!("{}: {err}", self.url));
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(fail)?;
        let response = client
            .get(&self.url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(fail)?;
        let bytes = response.bytes().map_err(fail)?;
        Ok(bytes.to_vec())
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub(crate) bytes: Arc<Vec<u8>>,
    pdf_version: String,
    page_sizes: Vec<PageSize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageReport {
    pub page: u32,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub pdf_version: String,
    pub page_count: u32,
    pub file_size_bytes: usize,
    pub pages: Vec<PageReport>,
}

impl SourceDocument {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ContractError> {
        let pdf = LoDocument::load_mem(&bytes)
            .map_err(|err| ContractError::SourceLoadFailure(format!("pdf parse failed: {err}")))?;
        if pdf.is_encrypted() {
            return Err(ContractError::SourceLoadFailure(
                "encrypted pdf sources are not supported".to_string(),
            ));
        }
        let pages = pdf.get_pages();
        if pages.is_empty() {
            return Err(ContractError::SourceLoadFailure("pdf has no pages".to_string()));
        }
        let page_sizes = pages
            .values()
            .map(|id| match pdf.get_object(*id) {
                Ok(page) => media_box_size(&pdf, page, MAX_PAGE_TREE_DEPTH),
                Err(_) => PageSize::letter(),
            })
            .collect();
        Ok(Self {
            pdf_version: pdf.version.clone(),
            bytes: Arc::new(bytes),
            page_sizes,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, ContractError> {
        FileSource::new(path).fetch().and_then(Self::from_bytes)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn page_count(&self) -> u32 {
        self.page_sizes.len() as u32
    }

    pub fn page_sizes(&self) -> &[PageSize] {
        &self.page_sizes
    }

    pub fn page_size(&self, page: u32) -> Option<PageSize> {
        let idx = (page as usize).checked_sub(1)?;
        self.page_sizes.get(idx).copied()
    }

    pub fn pdf_version(&self) -> &str {
        &self.pdf_version
    }

    pub fn report(&self) -> SourceReport {
        SourceReport {
            pdf_version: self.pdf_version.clone(),
            page_count: self.page_count(),
            file_size_bytes: self.bytes.len(),
            pages: self
                .page_sizes
                .iter()
                .enumerate()
                .map(|(idx, size)| PageReport {
                    page: idx as u32 + 1,
                    width: size.width,
                    height: size.height,
                })
                .collect(),
        }
    }
}

fn media_box_size(pdf: &LoDocument, page: &LoObject, depth: usize) -> PageSize {
    if depth == 0 {
        return PageSize::letter();
    }
    let Ok(dict) = page.as_dict() else {
        return PageSize::letter();
    };
    if let Ok(media_box) = dict.get(b"MediaBox") {
        let resolved = match media_box {
            LoObject::Reference(id) => pdf.get_object(*id).ok(),
            other => Some(other),
        };
        if let Some(size) = resolved.and_then(|obj| box_size(pdf, obj)) {
            return size;
        }
    }
    if let Ok(LoObject::Reference(parent_id)) = dict.get(b"Parent") {
        if let Ok(parent) = pdf.get_object(*parent_id) {
            return media_box_size(pdf, parent, depth - 1);
        }
    }
    PageSize::letter()
}

fn box_size(pdf: &LoDocument, obj: &LoObject) -> Option<PageSize> {
    let arr = obj.as_array().ok()?;
    if arr.len() != 4 {
        return None;
    }
    let mut values = [0.0f64; 4];
    for (slot, item) in values.iter_mut().zip(arr) {
        let item = match item {
            LoObject::Reference(id) => pdf.get_object(*id).ok()?,
            other => other,
        };
        *slot = match item {
            LoObject::Integer(i) => *i as f64,
            LoObject::Real(r) => *r as f64,
            _ => return None,
        };
    }
    let size = PageSize::new((values[2] - values[0]).abs(), (values[3] - values[1]).abs());
    size.is_valid().then_some(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::make_pdf_bytes;
    use lopdf::{Stream as LoStream, dictionary};

    #[test]
    fn reads_page_count_and_sizes() {
        let doc = SourceDocument::from_bytes(make_pdf_bytes(12)).expect("source");
        assert_eq!(doc.page_count(), 12);
        assert_eq!(doc.page_size(12), Some(PageSize::letter()));
        assert_eq!(doc.page_size(0), None);
        assert_eq!(doc.page_size(13), None);
        let report = doc.report();
        assert_eq!(report.pages.len(), 12);
        assert_eq!(report.file_size_bytes, doc.bytes().len());
    }

    #[test]
    fn inherits_media_box_from_page_tree() {
        let mut pdf = LoDocument::with_version("1.5");
        let pages_id = pdf.new_object_id();
        let content_id = pdf.add_object(LoStream::new(dictionary! {}, b"".to_vec()));
        let page_id = pdf.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        pdf.objects.insert(
            pages_id,
            LoObject::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), LoObject::Real(842.0)],
            }),
        );
        let catalog_id = pdf.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        pdf.trailer.set("Root", catalog_id);
        let mut bytes = Vec::new();
        pdf.save_to(&mut bytes).expect("save");

        let doc = SourceDocument::from_bytes(bytes).expect("source");
        assert_eq!(doc.page_size(1), Some(PageSize::new(595.0, 842.0)));
    }

    #[test]
    fn malformed_and_empty_sources_fail_to_load() {
        let err = SourceDocument::from_bytes(b"not a pdf".to_vec()).expect_err("invalid");
        assert!(matches!(err, ContractError::SourceLoadFailure(_)));
        let err = BytesSource::new("upload", Vec::new()).fetch().expect_err("empty");
        assert!(err.to_string().contains("upload is empty"));
    }

    #[test]
    fn missing_file_is_a_load_failure() {
        let missing = std::env::temp_dir().join(format!(
            "contract_overlay_missing_{}.pdf",
            std::process::id()
        ));
        let err = SourceDocument::from_path(&missing).expect_err("missing");
        assert!(matches!(err, ContractError::SourceLoadFailure(_)));
    }
}
