use crate::types::{DocPoint, DocRect, PageSize, ScreenPoint, ScreenRect, ZoomScale};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageDimensions {
    pages: BTreeMap<u32, PageSize>,
}

impl PageDimensions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, page: u32, size: PageSize) -> bool {
        if page == 0 || !size.is_valid() {
            return false;
        }
        self.pages.insert(page, size);
        true
    }

    pub fn get(&self, page: u32) -> Option<PageSize> {
        self.pages.get(&page).copied()
    }

    pub fn measured_count(&self) -> usize {
        self.pages.len()
    }

    pub fn clear(&mut self) {
        self.pages.clear();
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CoordinateTransform<'a> {
    dimensions: &'a PageDimensions,
    scale: f64,
}

impl<'a> CoordinateTransform<'a> {
    pub fn new(dimensions: &'a PageDimensions, scale: ZoomScale) -> Self {
        Self {
            dimensions,
            scale: scale.get(),
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn page_height(&self, page: u32) -> Option<f64> {
        self.dimensions.get(page).map(|size| size.height)
    }

    pub fn to_screen(&self, page: u32, point: DocPoint) -> ScreenPoint {
        let Some(height) = self.page_height(page) else {
            return ScreenPoint::ORIGIN;
        };
        ScreenPoint {
            x: point.x * self.scale,
            y: (height - point.y) * self.scale,
        }
    }

    pub fn to_document(&self, page: u32, point: ScreenPoint) -> DocPoint {
        let Some(height) = self.page_height(page) else {
            return DocPoint::ORIGIN;
        };
        DocPoint {
            x: point.x / self.scale,
            y: height - point.y / self.scale,
        }
    }

    pub fn rect_to_screen(&self, page: u32, rect: DocRect) -> ScreenRect {
        let top_left = self.to_screen(page, DocPoint::new(rect.x, rect.top()));
        ScreenRect {
            x: top_left.x,
            y: top_left.y,
            width: rect.width * self.scale,
            height: rect.height * self.scale,
        }
    }
}

// Shared by the live overlay and the synthesizer.
pub fn centered_box(center: DocPoint, width: f64, height: f64) -> DocRect {
    DocRect {
        x: center.x - width / 2.0,
        y: center.y - height / 2.0,
        width,
        height,
    }
}

pub fn left_anchored_box(anchor: DocPoint, width: f64, height: f64) -> DocRect {
    DocRect {
        x: anchor.x,
        y: anchor.y - height / 2.0,
        width,
        height,
    }
}
