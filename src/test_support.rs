use lopdf::{Document as LoDocument, Object as LoObject, Stream as LoStream, dictionary};

pub(crate) fn make_pdf_bytes(pages: u32) -> Vec<u8> {
    let mut doc = LoDocument::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let mut kids: Vec<LoObject> = Vec::new();
    for page in 1..=pages {
        let content = format!("BT /F1 18 Tf 72 720 Td (Page {page}) Tj ET").into_bytes();
        let content_id = doc.add_object(LoStream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(page_id.into());
    }
    doc.objects.insert(
        pages_id,
        LoObject::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut out = Vec::new();
    doc.save_to(&mut out).expect("save");
    out
}

pub(crate) fn tiny_png(width: u32, height: u32) -> Vec<u8> {
    let mut pixmap = tiny_skia::Pixmap::new(width, height).expect("pixmap");
    pixmap.fill(tiny_skia::Color::BLACK);
    pixmap.encode_png().expect("png")
}

pub(crate) const SANS_FONT: &[u8] = include_bytes!("../testdata/DejaVuSans.ttf");

pub(crate) fn sans_signature_face() -> crate::font::SignatureFace {
    let mut registry = crate::font::FontRegistry::new();
    registry
        .register_bytes(SANS_FONT.to_vec(), Some("DejaVuSans"))
        .expect("fixture font");
    registry.signature_face(None, false).expect("registered face")
}
