use crate::config::{CheckboxTarget, MarkStyle};
use crate::debug::DebugLogger;
use crate::layout::layout_field;
use crate::raster::{MarkRasterizer, RasterMark};
use crate::session::{ContractSession, SelectionState, SignatureMode, TextAnnotation};
use crate::transform::{centered_box, left_anchored_box};
use crate::types::{DocPoint, DocRect, ScreenPoint, ScreenRect};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayLine {
    pub text: String,
    pub origin: ScreenPoint,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OverlayElement {
    FieldText {
        field: String,
        font_px: f64,
        lines: Vec<OverlayLine>,
    },
    Checkmark {
        target: &'static str,
        doc_rect: DocRect,
        rect: ScreenRect,
    },
    SignatureText {
        text: String,
        font_px: f64,
        rect: ScreenRect,
    },
    SignatureImage {
        rect: ScreenRect,
        data_uri: String,
    },
    Annotation {
        id: u64,
        text: String,
        font_px: f64,
        origin: ScreenPoint,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageOverlay {
    pub page: u32,
    pub measured: bool,
    pub pointer_events: bool,
    pub elements: Vec<OverlayElement>,
}

pub struct OverlayRenderer<'a> {
    session: &'a ContractSession,
    style: MarkStyle,
    rasterizer: Option<&'a MarkRasterizer>,
    debug: Option<&'a DebugLogger>,
}

impl<'a> OverlayRenderer<'a> {
    pub fn new(session: &'a ContractSession, style: MarkStyle) -> Self {
        Self {
            session,
            style,
            rasterizer: None,
            debug: None,
        }
    }

    // Lets the typed-signature preview use the size the committed raster will have.
    pub fn with_rasterizer(mut self, rasterizer: &'a MarkRasterizer) -> Self {
        self.rasterizer = Some(rasterizer);
        self
    }

    pub(crate) fn with_debug(mut self, debug: Option<&'a DebugLogger>) -> Self {
        self.debug = debug;
        self
    }

    pub fn render_pages(&self, pages: impl IntoIterator<Item = u32>) -> Vec<PageOverlay> {
        self.report_out_of_range();
        pages
            .into_iter()
            .filter(|page| self.page_in_range(*page))
            .map(|page| self.render_page(page))
            .collect()
    }

    pub fn render_page(&self, page: u32) -> PageOverlay {
        let mut elements = Vec::new();
        if self.page_in_range(page) {
            self.push_fields(page, &mut elements);
            self.push_checkmarks(page, &mut elements);
            self.push_signature(page, &mut elements);
            self.push_annotations(page, &mut elements);
        }
        PageOverlay {
            page,
            measured: self.session.dimensions().get(page).is_some(),
            pointer_events: false,
            elements,
        }
    }

    fn page_in_range(&self, page: u32) -> bool {
        page >= 1 && self.session.page_count().is_none_or(|count| page <= count)
    }

    fn push_fields(&self, page: u32, out: &mut Vec<OverlayElement>) {
        let layout = self.session.layout();
        let transform = self.session.transform();
        for field in self.session.fields() {
            let Some(spec) = layout.field(&field.name) else {
                continue;
            };
            if spec.coordinate.page != page {
                continue;
            }
            let Some(placed) = layout_field(spec, &field.value, &layout.text) else {
                continue;
            };
            let lines = placed
                .lines
                .iter()
                .enumerate()
                .map(|(idx, text)| OverlayLine {
                    text: text.clone(),
                    origin: transform.to_screen(page, DocPoint::new(placed.x, placed.line_baseline(idx))),
                })
                .collect();
            out.push(OverlayElement::FieldText {
                field: field.name.clone(),
                font_px: layout.text.font_size_pt * transform.scale(),
                lines,
            });
        }
    }

    fn push_checkmarks(&self, page: u32, out: &mut Vec<OverlayElement>) {
        let transform = self.session.transform();
        let size = self.style.checkmark_pt;
        for spec in &self.session.layout().checkboxes {
            if spec.coordinate.page != page || !checkbox_selected(self.session.selection(), spec.target) {
                continue;
            }
            let doc_rect = centered_box(spec.coordinate.point(), size, size);
            out.push(OverlayElement::Checkmark {
                target: spec.target.key(),
                doc_rect,
                rect: transform.rect_to_screen(page, doc_rect),
            });
        }
    }

    fn push_signature(&self, page: u32, out: &mut Vec<OverlayElement>) {
        let anchor = self.session.layout().anchors.owner_signature;
        if anchor.page != page {
            return;
        }
        let transform = self.session.transform();
        let signature = self.session.signature();
        match signature.mode {
            SignatureMode::Typed => {
                let text = signature.typed_name.trim();
                if text.is_empty() {
                    return;
                }
                let doc_rect = signature_rect(
                    anchor.point(),
                    self.style.signature_width_px,
                    self.style.signature_height_px,
                    self.style.signature_scale,
                );
                let raster_px = self
                    .rasterizer
                    .and_then(|r| r.signature_font_px(text).ok())
                    .unwrap_or(self.style.signature_font_px);
                out.push(OverlayElement::SignatureText {
                    text: text.to_string(),
                    font_px: raster_px as f64 * self.style.signature_scale * transform.scale(),
                    rect: transform.rect_to_screen(page, doc_rect),
                });
            }
            SignatureMode::Drawn => {
                let Some(mark) = signature.drawn.as_ref() else {
                    return;
                };
                let doc_rect = drawn_signature_rect(anchor.point(), mark, self.style.signature_scale);
                out.push(OverlayElement::SignatureImage {
                    rect: transform.rect_to_screen(page, doc_rect),
                    data_uri: mark.data_uri(),
                });
            }
        }
    }

    fn push_annotations(&self, page: u32, out: &mut Vec<OverlayElement>) {
        let transform = self.session.transform();
        let font_px = self.session.layout().text.font_size_pt * transform.scale();
        for note in self.session.annotations().iter().filter(|n| n.page == page) {
            out.push(OverlayElement::Annotation {
                id: note.id,
                text: note.text.clone(),
                font_px,
                origin: transform.to_screen(page, DocPoint::new(note.x, note.y)),
            });
        }
    }

    fn report_out_of_range(&self) {
        let Some(count) = self.session.page_count() else {
            return;
        };
        let layout = self.session.layout();
        let fields = layout
            .fields
            .iter()
            .map(|spec| (spec.name, spec.coordinate.page));
        let boxes = layout
            .checkboxes
            .iter()
            .map(|spec| (spec.target.key(), spec.coordinate.page));
        for (target, page) in fields.chain(boxes) {
            if page > count {
                tracing::warn!(target_name = target, page, page_count = count, "overlay target skipped: page out of range");
                if let Some(debug) = self.debug {
                    debug.log_skip("overlay.skip", target, page, count);
                }
            }
        }
    }
}

pub(crate) fn signature_rect(anchor: DocPoint, width_px: u32, height_px: u32, scale: f64) -> DocRect {
    left_anchored_box(anchor, width_px as f64 * scale, height_px as f64 * scale)
}

pub(crate) fn drawn_signature_rect(anchor: DocPoint, mark: &RasterMark, scale: f64) -> DocRect {
    signature_rect(anchor, mark.width_px, mark.height_px, scale)
}

pub(crate) fn checkbox_selected(selection: &SelectionState, target: CheckboxTarget) -> bool {
    match target {
        CheckboxTarget::Agreement(a) => selection.agreements.contains(&a),
        CheckboxTarget::Option(o) => selection.options.contains(&o),
        CheckboxTarget::Payment(p) => selection.payment == Some(p),
    }
}

pub fn handle_page_click(
    session: &mut ContractSession,
    page: u32,
    click: ScreenPoint,
    page_origin: ScreenPoint,
    prompt: impl FnOnce() -> Option<String>,
) -> Option<TextAnnotation> {
    if !session.is_adding_text() {
        return None;
    }
    let local = click.offset_from(page_origin);
    let at = session.transform().to_document(page, local);
    let Some(text) = prompt() else {
        session.cancel_add_text();
        return None;
    };
    session.place_annotation(page, at, &text).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContractLayout;
    use crate::session::tests::{onboarding, ready_session};
    use crate::session::{Agreement, OptionFlag, PaymentOption};
    use crate::source::SourceDocument;
    use crate::test_support::{make_pdf_bytes, sans_signature_face, tiny_png};
    use crate::types::PageSize;
    use std::sync::Arc;

    fn measured_session() -> ContractSession {
        let mut session = ready_session(12);
        session.measure_from_source();
        session
    }

    fn checkmark_rect(overlay: &PageOverlay, key: &str) -> Option<(DocRect, ScreenRect)> {
        overlay.elements.iter().find_map(|el| match el {
            OverlayElement::Checkmark { target, doc_rect, rect } if *target == key => Some((*doc_rect, *rect)),
            _ => None,
        })
    }

    #[test]
    fn owner_field_wraps_and_shifts_on_screen() {
        let mut session = measured_session();
        session.set_scale(1.4);
        let overlay = OverlayRenderer::new(&session, MarkStyle::default()).render_page(1);
        let owner = overlay
            .elements
            .iter()
            .find_map(|el| match el {
                OverlayElement::FieldText { field, lines, font_px } if field == "owner" => Some((lines, *font_px)),
                _ => None,
            })
            .expect("owner text");
        let (lines, font_px) = owner;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "Maria Elena");
        assert!((lines[0].origin.x - 284.0 * 1.4).abs() < 1e-9);
        assert!((lines[1].origin.y - lines[0].origin.y - 14.0 * 1.4).abs() < 1e-9);
        assert!((font_px - 12.0 * 1.4).abs() < 1e-9);
        assert!(!overlay.pointer_events);
    }

    #[test]
    fn date_field_renders_us_format() {
        let session = measured_session();
        let overlay = OverlayRenderer::new(&session, MarkStyle::default()).render_page(1);
        let date = overlay.elements.iter().find_map(|el| match el {
            OverlayElement::FieldText { field, lines, .. } if field == "effective_date" => Some(lines[0].text.clone()),
            _ => None,
        });
        assert_eq!(date.as_deref(), Some("03/07/2025"));
    }

    #[test]
    fn checkmark_is_centered_on_its_coordinate() {
        let session = measured_session();
        let overlay = OverlayRenderer::new(&session, MarkStyle::default()).render_page(11);
        let (doc_rect, rect) = checkmark_rect(&overlay, "revenue_share").expect("mark");
        assert_eq!((doc_rect.x, doc_rect.y), (74.0, 342.0));
        assert_eq!((rect.x, rect.y, rect.width), (74.0, 792.0 - 354.0, 12.0));
        assert!(checkmark_rect(&overlay, "gps_tracking").is_none());
    }

    #[test]
    fn selections_show_only_when_active() {
        let mut session = measured_session();
        session.set_option(OptionFlag::GpsTracking, true);
        session.set_agreement(Agreement::TerminationTerms, false);
        let page11 = OverlayRenderer::new(&session, MarkStyle::default()).render_page(11);
        assert!(checkmark_rect(&page11, "gps_tracking").is_some());
        assert!(checkmark_rect(&page11, "termination_terms").is_none());
        session.select_payment(PaymentOption::DirectDeposit);
        let page12 = OverlayRenderer::new(&session, MarkStyle::default()).render_page(12);
        assert!(checkmark_rect(&page12, "direct_deposit").is_some());
        assert!(checkmark_rect(&page12, "paper_check").is_none());
    }

    #[test]
    fn only_the_active_signature_mode_renders() {
        let mut session = measured_session();
        session.capture_signature_stroke(tiny_png(40, 10)).expect("png");
        let render = |s: &ContractSession| {
            OverlayRenderer::new(s, MarkStyle::default())
                .render_page(12)
                .elements
                .into_iter()
                .filter(|el| {
                    matches!(el, OverlayElement::SignatureText { .. } | OverlayElement::SignatureImage { .. })
                })
                .collect::<Vec<_>>()
        };
        let typed = render(&session);
        assert_eq!(typed.len(), 1);
        let OverlayElement::SignatureText { font_px, rect, .. } = &typed[0] else {
            panic!("expected typed signature");
        };
        assert_eq!(*font_px, 20.0);
        assert_eq!((rect.x, rect.width, rect.height), (120.0, 200.0, 50.0));

        session.set_signature_mode(SignatureMode::Drawn);
        let drawn = render(&session);
        assert_eq!(drawn.len(), 1);
        let OverlayElement::SignatureImage { rect, data_uri } = &drawn[0] else {
            panic!("expected drawn signature");
        };
        assert_eq!((rect.width, rect.height), (20.0, 5.0));
        assert!(data_uri.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn typed_preview_follows_the_fitted_raster_size() {
        let rasterizer = MarkRasterizer::new(MarkStyle::default(), Some(sans_signature_face()));
        let mut session = measured_session();
        session.zoom_in();
        let font_px = |s: &ContractSession| {
            OverlayRenderer::new(s, MarkStyle::default())
                .with_rasterizer(&rasterizer)
                .render_page(12)
                .elements
                .into_iter()
                .find_map(|el| match el {
                    OverlayElement::SignatureText { font_px, .. } => Some(font_px),
                    _ => None,
                })
                .expect("typed signature")
        };
        let zoom = session.scale().get();
        assert!((font_px(&session) - 40.0 * 0.5 * zoom).abs() < 1e-9);

        let long_name = "Maria Elena Rodriguez de la Fuente y Montenegro";
        session.set_typed_name(long_name);
        let fitted = rasterizer.signature_font_px(long_name).expect("fitted") as f64;
        assert!(fitted < 40.0);
        assert!((font_px(&session) - fitted * 0.5 * zoom).abs() < 1e-9);
    }

    #[test]
    fn out_of_range_pages_are_skipped_without_affecting_others() {
        let mut layout = ContractLayout::rental_agreement();
        layout.fields[1].coordinate.page = 99;
        let mut session = ContractSession::new(Arc::new(layout), &onboarding());
        session.attach_source(SourceDocument::from_bytes(make_pdf_bytes(12)).expect("source"));
        session.measure_from_source();

        let renderer = OverlayRenderer::new(&session, MarkStyle::default());
        let overlays = renderer.render_pages(1..=99);
        assert_eq!(overlays.len(), 12);
        let names: Vec<&str> = overlays[0]
            .elements
            .iter()
            .filter_map(|el| match el {
                OverlayElement::FieldText { field, .. } => Some(field.as_str()),
                _ => None,
            })
            .collect();
        assert!(!names.contains(&"owner_email"));
        assert!(names.contains(&"owner"));
        assert_eq!(names.len(), 9);
        assert!(renderer.render_page(99).elements.is_empty());
    }

    #[test]
    fn unmeasured_page_falls_back_to_origin() {
        let session = ready_session(12);
        let overlay = OverlayRenderer::new(&session, MarkStyle::default()).render_page(1);
        assert!(!overlay.measured);
        let OverlayElement::FieldText { lines, .. } = &overlay.elements[0] else {
            panic!("expected field text");
        };
        assert_eq!(lines[0].origin, ScreenPoint::ORIGIN);
    }

    #[test]
    fn zoom_change_recomputes_positions() {
        let mut session = measured_session();
        let before = OverlayRenderer::new(&session, MarkStyle::default()).render_page(11);
        session.zoom_in();
        let after = OverlayRenderer::new(&session, MarkStyle::default()).render_page(11);
        let (_, a) = checkmark_rect(&before, "revenue_share").expect("before");
        let (_, b) = checkmark_rect(&after, "revenue_share").expect("after");
        assert!((b.x - a.x * 1.2).abs() < 1e-9);
        assert!((b.width - 12.0 * 1.2).abs() < 1e-9);
    }

    #[test]
    fn page_click_places_one_annotation_then_exits_mode() {
        let mut session = measured_session();
        session.set_scale(2.0);
        session.set_page_dimensions(3, PageSize::new(612.0, 800.0));
        assert!(handle_page_click(&mut session, 3, ScreenPoint::new(10.0, 10.0), ScreenPoint::ORIGIN, || {
            Some("ignored".to_string())
        })
        .is_none());

        session.begin_add_text();
        let note = handle_page_click(
            &mut session,
            3,
            ScreenPoint::new(300.0, 1100.0),
            ScreenPoint::new(100.0, 100.0),
            || Some(" Initials: MR ".to_string()),
        )
        .expect("placed");
        assert_eq!((note.x, note.y), (100.0, 300.0));
        assert_eq!(note.text, "Initials: MR");
        assert!(!session.is_adding_text());

        session.begin_add_text();
        assert!(handle_page_click(&mut session, 3, ScreenPoint::ORIGIN, ScreenPoint::ORIGIN, || None).is_none());
        assert!(!session.is_adding_text());
        assert_eq!(session.annotations().len(), 1);

        let overlay = OverlayRenderer::new(&session, MarkStyle::default()).render_page(3);
        let origin = overlay.elements.iter().find_map(|el| match el {
            OverlayElement::Annotation { origin, .. } => Some(*origin),
            _ => None,
        });
        assert_eq!(origin, Some(ScreenPoint::new(200.0, 1000.0)));
    }
}
