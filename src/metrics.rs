use contract_audit::SynthesisCounts;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PageMetrics {
    pub page_number: u32,
    pub text_lines: usize,
    pub marks: usize,
    pub content_bytes: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SynthesisMetrics {
    pub page_count: u32,
    pub pages: Vec<PageMetrics>,
    pub fields_drawn: usize,
    pub fields_skipped: usize,
    pub marks_drawn: usize,
    pub marks_skipped: usize,
    pub annotations_drawn: usize,
    pub annotations_skipped: usize,
    pub total_ms: f64,
    pub output_bytes: usize,
}

impl SynthesisMetrics {
    pub fn skipped(&self) -> usize {
        self.fields_skipped + self.marks_skipped + self.annotations_skipped
    }

    pub fn counts(&self) -> SynthesisCounts {
        SynthesisCounts {
            page_count: self.page_count as usize,
            fields_drawn: self.fields_drawn,
            fields_skipped: self.fields_skipped,
            marks_drawn: self.marks_drawn,
            annotations_drawn: self.annotations_drawn,
        }
    }
}
