use serde_json::{Value, json};
use sha2::{Digest, Sha256};

pub const RECORD_SCHEMA: &str = "contract_overlay.audit_record";
pub const RECORD_VERSION: &str = "1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureMethod {
    Typed,
    Drawn,
}

impl SignatureMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureMethod::Typed => "typed",
            SignatureMethod::Drawn => "drawn",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SynthesisCounts {
    pub page_count: usize,
    pub fields_drawn: usize,
    pub fields_skipped: usize,
    pub marks_drawn: usize,
    pub annotations_drawn: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub contract_id: String,
    pub signature_method: SignatureMethod,
    pub source_sha256: String,
    pub document_sha256: String,
    pub document_bytes: usize,
    pub counts: SynthesisCounts,
}

impl AuditRecord {
    pub fn new(
        contract_id: impl Into<String>,
        signature_method: SignatureMethod,
        source: &[u8],
        document: &[u8],
        counts: SynthesisCounts,
    ) -> Self {
        Self {
            contract_id: contract_id.into(),
            signature_method,
            source_sha256: hex_sha256(source),
            document_sha256: hex_sha256(document),
            document_bytes: document.len(),
            counts,
        }
    }

    // Hash over the identifying fields only; counts are informational.
    pub fn fingerprint_sha256(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(RECORD_SCHEMA.as_bytes());
        hasher.update(b"\n");
        hasher.update(RECORD_VERSION.as_bytes());
        hasher.update(b"\n");
        hasher.update(self.contract_id.as_bytes());
        hasher.update(b"\n");
        hasher.update(self.signature_method.as_str().as_bytes());
        hasher.update(b"\n");
        hasher.update(self.source_sha256.as_bytes());
        hasher.update(b"\n");
        hasher.update(self.document_sha256.as_bytes());
        to_hex(&hasher.finalize())
    }

    pub fn to_json_value(&self) -> Value {
        json!({
            "schema": RECORD_SCHEMA,
            "version": RECORD_VERSION,
            "contract_id": self.contract_id,
            "signature_method": self.signature_method.as_str(),
            "source_sha256": self.source_sha256,
            "document_sha256": self.document_sha256,
            "document_bytes": self.document_bytes,
            "fingerprint_sha256": self.fingerprint_sha256(),
            "counts": {
                "pages": self.counts.page_count,
                "fields_drawn": self.counts.fields_drawn,
                "fields_skipped": self.counts.fields_skipped,
                "marks_drawn": self.counts.marks_drawn,
                "annotations_drawn": self.counts.annotations_drawn,
            },
        })
    }

    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(&self.to_json_value()).unwrap_or_else(|_| "{}".to_string())
    }
}

pub fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    to_hex(&hasher.finalize())
}

fn to_hex(digest: &[u8]) -> String {
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        use std::fmt::Write;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(method: SignatureMethod) -> AuditRecord {
        AuditRecord::new(
            "rental-agreement",
            method,
            b"%PDF-source",
            b"%PDF-output",
            SynthesisCounts {
                page_count: 12,
                fields_drawn: 9,
                fields_skipped: 1,
                marks_drawn: 8,
                annotations_drawn: 2,
            },
        )
    }

    #[test]
    fn hex_sha256_matches_known_digest() {
        assert_eq!(
            hex_sha256(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn fingerprint_is_stable_and_depends_on_signature_method() {
        let typed = sample(SignatureMethod::Typed);
        assert_eq!(typed.fingerprint_sha256(), typed.fingerprint_sha256());
        assert_eq!(typed.fingerprint_sha256().len(), 64);
        let drawn = sample(SignatureMethod::Drawn);
        assert_ne!(typed.fingerprint_sha256(), drawn.fingerprint_sha256());
    }

    #[test]
    fn json_export_carries_counts_and_method() {
        let record = sample(SignatureMethod::Drawn);
        let value = record.to_json_value();
        assert_eq!(value["signature_method"], "drawn");
        assert_eq!(value["counts"]["pages"], 12);
        assert_eq!(value["counts"]["fields_skipped"], 1);
        assert_eq!(value["document_bytes"], b"%PDF-output".len());
        let text = record.to_json_pretty();
        assert!(text.contains("\"schema\": \"contract_overlay.audit_record\""));
    }
}
