use crate::debug::DebugLogger;
use crate::error::{ContractError, lopdf_err};
use crate::layout::layout_field;
use crate::metrics::{PageMetrics, SynthesisMetrics};
use crate::overlay::{checkbox_selected, signature_rect};
use crate::raster::{MarkRasterizer, RasterMark};
use crate::session::{CommitSnapshot, SignatureMode};
use crate::transform::centered_box;
use crate::types::DocRect;
use flate2::Compression;
use flate2::write::ZlibEncoder;
use lopdf::{Dictionary, Document as LoDocument, Object as LoObject, ObjectId, Stream as LoStream, dictionary};
use serde_json::json;
use std::collections::BTreeMap;
use std::io::Write;
use std::time::Instant;

pub const PDF_MIME_TYPE: &str = "application/pdf";

const MAX_PAGE_TREE_DEPTH: usize = 10;

#[derive(Debug, Clone)]
pub struct SynthesizedDocument {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub signature_mode: SignatureMode,
    pub metrics: SynthesisMetrics,
}

struct TextRun {
    x: f64,
    y: f64,
    text: String,
}

struct ImageRun {
    id: ObjectId,
    rect: DocRect,
}

#[derive(Default)]
struct PagePlan {
    texts: Vec<TextRun>,
    images: Vec<ImageRun>,
}

pub struct DocumentSynthesizer<'a> {
    rasterizer: &'a MarkRasterizer,
    debug: Option<&'a DebugLogger>,
}

impl<'a> DocumentSynthesizer<'a> {
    pub fn new(rasterizer: &'a MarkRasterizer) -> Self {
        Self {
            rasterizer,
            debug: None,
        }
    }

    pub(crate) fn with_debug(mut self, debug: Option<&'a DebugLogger>) -> Self {
        self.debug = debug;
        self
    }

    pub fn synthesize(&self, snapshot: &CommitSnapshot) -> Result<SynthesizedDocument, ContractError> {
        let started = Instant::now();
        let mut pdf = LoDocument::load_mem(snapshot.source.bytes()).map_err(lopdf_err)?;
        let page_ids = pdf.get_pages();
        let page_count = page_ids.len() as u32;
        let layout = &snapshot.layout;
        let style = self.rasterizer.style();
        let mut metrics = SynthesisMetrics {
            page_count,
            ..SynthesisMetrics::default()
        };
        let mut plans: BTreeMap<u32, PagePlan> = BTreeMap::new();

        tracing::info!(
            contract = %layout.contract_id,
            pages = page_count,
            signature_mode = snapshot.signature.mode.as_str(),
            "synthesis started"
        );

        for field in &snapshot.fields {
            let Some(spec) = layout.field(&field.name) else {
                continue;
            };
            let Some(placed) = layout_field(spec, &field.value, &layout.text) else {
                continue;
            };
            let page = spec.coordinate.page;
            if !page_ids.contains_key(&page) {
                self.skip(spec.name, page, page_count);
                metrics.fields_skipped += 1;
                continue;
            }
            let plan = plans.entry(page).or_default();
            for (idx, line) in placed.lines.iter().enumerate() {
                plan.texts.push(TextRun {
                    x: placed.x,
                    y: placed.line_baseline(idx),
                    text: line.clone(),
                });
            }
            metrics.fields_drawn += 1;
        }

        let mut checkmark_id = None;
        for spec in &layout.checkboxes {
            if !checkbox_selected(&snapshot.selection, spec.target) {
                continue;
            }
            let page = spec.coordinate.page;
            if !page_ids.contains_key(&page) {
                self.skip(spec.target.key(), page, page_count);
                metrics.marks_skipped += 1;
                continue;
            }
            let id = match checkmark_id {
                Some(id) => id,
                None => {
                    let mark = self.rasterizer.rasterize_checkmark()?;
                    let id = embed_mark(&mut pdf, &mark)?;
                    checkmark_id = Some(id);
                    id
                }
            };
            let rect = centered_box(spec.coordinate.point(), style.checkmark_pt, style.checkmark_pt);
            plans.entry(page).or_default().images.push(ImageRun { id, rect });
            metrics.marks_drawn += 1;
        }

        // Only the owner's signature is drawn; the counter-party and date anchors stay blank.
        let anchor = layout.anchors.owner_signature;
        if page_ids.contains_key(&anchor.page) {
            let mark = self.signature_mark(snapshot)?;
            let id = embed_mark(&mut pdf, &mark)?;
            let rect = signature_rect(anchor.point(), mark.width_px, mark.height_px, style.signature_scale);
            plans.entry(anchor.page).or_default().images.push(ImageRun { id, rect });
            metrics.marks_drawn += 1;
        } else {
            self.skip("owner_signature", anchor.page, page_count);
            metrics.marks_skipped += 1;
        }

        for note in &snapshot.annotations {
            if !page_ids.contains_key(&note.page) {
                self.skip(&format!("annotation:{}", note.id), note.page, page_count);
                metrics.annotations_skipped += 1;
                continue;
            }
            plans.entry(note.page).or_default().texts.push(TextRun {
                x: note.x,
                y: note.y,
                text: note.text.clone(),
            });
            metrics.annotations_drawn += 1;
        }

        let font_id = plans.values().any(|p| !p.texts.is_empty()).then(|| {
            pdf.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => "Helvetica",
                "Encoding" => "WinAnsiEncoding",
            })
        });
        for (page, plan) in &plans {
            let Some(page_id) = page_ids.get(page).copied() else {
                continue;
            };
            let content_bytes = stamp_page(&mut pdf, page_id, plan, font_id, layout.text.font_size_pt)?;
            metrics.pages.push(PageMetrics {
                page_number: *page,
                text_lines: plan.texts.len(),
                marks: plan.images.len(),
                content_bytes,
            });
        }

        pdf.compress();
        let mut bytes = Vec::new();
        pdf.save_to(&mut bytes)
            .map_err(|err| ContractError::SynthesisFailure(format!("pdf serialization failed: {err}")))?;

        metrics.output_bytes = bytes.len();
        metrics.total_ms = started.elapsed().as_secs_f64() * 1000.0;
        tracing::info!(
            fields = metrics.fields_drawn,
            marks = metrics.marks_drawn,
            annotations = metrics.annotations_drawn,
            skipped = metrics.skipped(),
            bytes = metrics.output_bytes,
            "synthesis finished"
        );
        if let Some(debug) = self.debug {
            debug.log_event(
                "synth.summary",
                json!({
                    "contract_id": layout.contract_id,
                    "signature_mode": snapshot.signature.mode.as_str(),
                    "metrics": metrics,
                }),
            );
        }

        Ok(SynthesizedDocument {
            bytes,
            mime_type: PDF_MIME_TYPE,
            signature_mode: snapshot.signature.mode,
            metrics,
        })
    }

    fn signature_mark(&self, snapshot: &CommitSnapshot) -> Result<RasterMark, ContractError> {
        let signature = &snapshot.signature;
        if !signature.has_data() {
            return Err(ContractError::SignatureMissing(signature.mode));
        }
        match (signature.mode, signature.drawn.as_ref()) {
            (SignatureMode::Drawn, Some(mark)) => Ok(mark.clone()),
            (SignatureMode::Drawn, None) => Err(ContractError::SignatureMissing(SignatureMode::Drawn)),
            (SignatureMode::Typed, _) => self.rasterizer.rasterize_signature(signature.typed_name.trim()),
        }
    }

    fn skip(&self, target: &str, page: u32, page_count: u32) {
        tracing::warn!(target_name = target, page, page_count, "synthesis target skipped: page out of range");
        if let Some(debug) = self.debug {
            debug.log_skip("synth.skip", target, page, page_count);
        }
    }
}

fn embed_mark(pdf: &mut LoDocument, mark: &RasterMark) -> Result<ObjectId, ContractError> {
    let rgba = mark
        .decode_rgba()
        .map_err(|err| ContractError::SynthesisFailure(format!("mark image decode failed: {err}")))?;
    let (width, height) = rgba.dimensions();
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha = Vec::with_capacity((width * height) as usize);
    for px in rgba.pixels() {
        rgb.extend_from_slice(&px.0[..3]);
        alpha.push(px.0[3]);
    }

    let smask_id = pdf.add_object(
        LoStream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
            },
            zlib(&alpha)?,
        )
        .with_compression(false),
    );
    let image_id = pdf.add_object(
        LoStream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
                "SMask" => LoObject::Reference(smask_id),
            },
            zlib(&rgb)?,
        )
        .with_compression(false),
    );
    Ok(image_id)
}

fn zlib(data: &[u8]) -> Result<Vec<u8>, ContractError> {
    let fail = |err: std::io::Error| ContractError::SynthesisFailure(format!("image compression failed: {err}"));
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).map_err(fail)?;
    encoder.finish().map_err(fail)
}

fn stamp_page(
    pdf: &mut LoDocument,
    page_id: ObjectId,
    plan: &PagePlan,
    font_id: Option<ObjectId>,
    font_size: f64,
) -> Result<usize, ContractError> {
    let page = pdf
        .get_object(page_id)
        .and_then(LoObject::as_dict)
        .map_err(lopdf_err)?
        .clone();
    let mut resources = inherited_resources(pdf, &page, MAX_PAGE_TREE_DEPTH);

    let mut ops = String::from("\nQ\nq\n0 g\n");
    if let (Some(font_id), false) = (font_id, plan.texts.is_empty()) {
        let mut fonts = resource_subdict(pdf, &resources, b"Font");
        let font_name = unique_name(&fonts, "COHelv");
        fonts.set(font_name.as_bytes().to_vec(), LoObject::Reference(font_id));
        resources.set("Font", LoObject::Dictionary(fonts));
        for run in &plan.texts {
            ops.push_str(&format!(
                "BT /{font_name} {} Tf 1 0 0 1 {} {} Tm ({}) Tj ET\n",
                fmt_num(font_size),
                fmt_num(run.x),
                fmt_num(run.y),
                pdf_literal(&run.text)
            ));
        }
    }
    if !plan.images.is_empty() {
        let mut xobjects = resource_subdict(pdf, &resources, b"XObject");
        for run in &plan.images {
            let name = unique_name(&xobjects, "COMark");
            xobjects.set(name.as_bytes().to_vec(), LoObject::Reference(run.id));
            ops.push_str(&format!(
                "q {} 0 0 {} {} {} cm /{name} Do Q\n",
                fmt_num(run.rect.width),
                fmt_num(run.rect.height),
                fmt_num(run.rect.x),
                fmt_num(run.rect.y)
            ));
        }
        resources.set("XObject", LoObject::Dictionary(xobjects));
    }
    ops.push_str("Q\n");

    let mut contents = vec![LoObject::Reference(
        pdf.add_object(LoStream::new(dictionary! {}, b"q\n".to_vec())),
    )];
    match page.get(b"Contents") {
        Ok(LoObject::Reference(id)) => match pdf.get_object(*id) {
            Ok(LoObject::Array(arr)) => contents.extend(arr.iter().cloned()),
            _ => contents.push(LoObject::Reference(*id)),
        },
        Ok(LoObject::Array(arr)) => contents.extend(arr.iter().cloned()),
        _ => {}
    }
    let content_len = ops.len();
    contents.push(LoObject::Reference(
        pdf.add_object(LoStream::new(dictionary! {}, ops.into_bytes())),
    ));

    let page_mut = pdf
        .get_object_mut(page_id)
        .and_then(LoObject::as_dict_mut)
        .map_err(lopdf_err)?;
    page_mut.set("Resources", LoObject::Dictionary(resources));
    page_mut.set("Contents", LoObject::Array(contents));
    Ok(content_len)
}

fn inherited_resources(pdf: &LoDocument, page: &Dictionary, depth: usize) -> Dictionary {
    match page.get(b"Resources") {
        Ok(LoObject::Dictionary(d)) => return d.clone(),
        Ok(LoObject::Reference(id)) => {
            if let Ok(d) = pdf.get_object(*id).and_then(LoObject::as_dict) {
                return d.clone();
            }
        }
        _ => {}
    }
    if depth == 0 {
        return Dictionary::new();
    }
    match page.get(b"Parent") {
        Ok(LoObject::Reference(parent_id)) => match pdf.get_object(*parent_id).and_then(LoObject::as_dict) {
            Ok(parent) => inherited_resources(pdf, parent, depth - 1),
            Err(_) => Dictionary::new(),
        },
        _ => Dictionary::new(),
    }
}

fn resource_subdict(pdf: &LoDocument, resources: &Dictionary, key: &[u8]) -> Dictionary {
    match resources.get(key) {
        Ok(LoObject::Dictionary(d)) => d.clone(),
        Ok(LoObject::Reference(id)) => pdf
            .get_object(*id)
            .ok()
            .and_then(|o| o.as_dict().ok())
            .cloned()
            .unwrap_or_default(),
        _ => Dictionary::new(),
    }
}

fn unique_name(dict: &Dictionary, base: &str) -> String {
    (1..)
        .map(|n| format!("{base}{n}"))
        .find(|name| !dict.has(name.as_bytes()))
        .unwrap_or_else(|| base.to_string())
}

fn fmt_num(value: f64) -> String {
    let text = format!("{value:.3}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    match text {
        "-0" | "" => "0".to_string(),
        other => other.to_string(),
    }
}

// WinAnsi literal body; unmapped characters become `?`.
fn pdf_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 4);
    for ch in text.chars() {
        match winansi_byte(ch) {
            Some(b'(') => out.push_str("\\("),
            Some(b')') => out.push_str("\\)"),
            Some(b'\\') => out.push_str("\\\\"),
            Some(byte @ 0x20..=0x7E) => out.push(byte as char),
            Some(byte) => out.push_str(&format!("\\{byte:03o}")),
            None => out.push('?'),
        }
    }
    out
}

fn winansi_byte(ch: char) -> Option<u8> {
    Some(match ch {
        '\u{0020}'..='\u{007E}' | '\u{00A0}'..='\u{00FF}' => ch as u8,
        '\u{20AC}' => 0x80,
        '\u{201A}' => 0x82,
        '\u{0192}' => 0x83,
        '\u{201E}' => 0x84,
        '\u{2026}' => 0x85,
        '\u{2020}' => 0x86,
        '\u{2021}' => 0x87,
        '\u{02C6}' => 0x88,
        '\u{2030}' => 0x89,
        '\u{0160}' => 0x8A,
        '\u{2039}' => 0x8B,
        '\u{0152}' => 0x8C,
        '\u{017D}' => 0x8E,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201C}' => 0x93,
        '\u{201D}' => 0x94,
        '\u{2022}' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        '\u{02DC}' => 0x98,
        '\u{2122}' => 0x99,
        '\u{0161}' => 0x9A,
        '\u{203A}' => 0x9B,
        '\u{0153}' => 0x9C,
        '\u{017E}' => 0x9E,
        '\u{0178}' => 0x9F,
        _ => return None,
    })
}
