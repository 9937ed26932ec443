//! PDF rendering with `printpdf` and Code 128 barcodes from `barcoders`.
//!
//! Layouts are expressed in points from the top-left corner of the page and
//! converted to PDF user space when drawn.

use super::{Artifact, ArtifactRenderer, RenderError};
use crate::config::BrandingConfig;
use crate::photos::PhotoStore;
use crate::types::Registrant;
use async_trait::async_trait;
use barcoders::sym::code128::Code128;
use printpdf::image_crate::DynamicImage;
use printpdf::path::PaintMode;
use printpdf::{
    BuiltinFont, Color, Image, ImageTransform, IndirectFontRef, Mm, PdfDocument, PdfLayerReference,
    Rect, Rgb,
};
use std::path::Path;
use std::sync::Arc;

/// A6 portrait, in points
const CARD_SIZE: (f32, f32) = (297.0, 420.0);
/// A4 landscape, in points
const CERTIFICATE_SIZE: (f32, f32) = (842.0, 595.0);
const IMAGE_DPI: f32 = 300.0;

const GREEN: (u8, u8, u8) = (0x00, 0x64, 0x00);
const WHITE: (u8, u8, u8) = (0xff, 0xff, 0xff);
const DARK_GREY: (u8, u8, u8) = (0x33, 0x33, 0x33);
const GREY: (u8, u8, u8) = (0x66, 0x66, 0x66);
const BLACK: (u8, u8, u8) = (0x00, 0x00, 0x00);
const GRADIENT_TOP: (u8, u8, u8) = (0xe6, 0xff, 0xe6);
const GRADIENT_BOTTOM: (u8, u8, u8) = (0xb3, 0xff, 0xb3);

/// Renders identity cards and certificates as PDF.
pub struct PdfArtifactRenderer {
    branding: Arc<BrandingConfig>,
    photos: PhotoStore,
}

impl PdfArtifactRenderer {
    /// Create a renderer using `branding` and reading photos from `photos`.
    #[must_use]
    pub fn new(branding: BrandingConfig, photos: PhotoStore) -> Self {
        Self {
            branding: Arc::new(branding),
            photos,
        }
    }

    async fn load_photo(&self, registrant: &Registrant) -> Option<DynamicImage> {
        let reference = registrant.photo_reference.as_deref()?;
        match self.photos.load(reference).await {
            Ok(bytes) => decode_image(&bytes, reference),
            Err(e) => {
                tracing::warn!(event_id = %registrant.event_id, error = %e, "Registrant photo unavailable");
                None
            },
        }
    }
}

#[async_trait]
impl ArtifactRenderer for PdfArtifactRenderer {
    async fn render_identity_card(&self, registrant: &Registrant) -> Result<Artifact, RenderError> {
        let photo = self.load_photo(registrant).await;
        let logo = match &self.branding.logo_path {
            Some(path) => load_image(path).await,
            None => None,
        };

        let card = CardContent::new(registrant, &self.branding);
        let bytes = tokio::task::spawn_blocking(move || draw_identity_card(&card, logo, photo))
            .await
            .map_err(|e| RenderError::Task(e.to_string()))??;

        Ok(Artifact::identity_card(registrant, bytes))
    }

    async fn render_certificate(&self, registrant: &Registrant) -> Result<Artifact, RenderError> {
        let template = match &self.branding.certificate_template_path {
            Some(path) => load_image(path).await,
            None => None,
        };

        let name = registrant.name.to_uppercase();
        let bytes = tokio::task::spawn_blocking(move || draw_certificate(&name, template))
            .await
            .map_err(|e| RenderError::Task(e.to_string()))??;

        Ok(Artifact::certificate(registrant, bytes))
    }
}

/// Text printed on an identity card.
struct CardContent {
    title: String,
    subtitle: String,
    name: String,
    state: String,
    event_id: String,
    validity: String,
    footer: String,
}

impl CardContent {
    fn new(registrant: &Registrant, branding: &BrandingConfig) -> Self {
        Self {
            title: branding.event_title.clone(),
            subtitle: branding.event_subtitle.clone(),
            name: registrant.name.to_uppercase(),
            state: registrant.state.to_uppercase(),
            event_id: registrant.event_id.to_string(),
            validity: format!("Valid: {}", branding.event_dates),
            footer: branding.card_footer.clone(),
        }
    }
}

fn draw_identity_card(
    card: &CardContent,
    logo: Option<DynamicImage>,
    photo: Option<DynamicImage>,
) -> Result<Vec<u8>, RenderError> {
    let (width, height) = CARD_SIZE;
    let (doc, page, layer) =
        PdfDocument::new(format!("Event ID {}", card.event_id), mm(width), mm(height), "Card");
    let canvas = Canvas {
        layer: doc.get_page(page).get_layer(layer),
        height,
    };
    let regular = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_error)?;
    let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(pdf_error)?;
    let italic = doc.add_builtin_font(BuiltinFont::TimesItalic).map_err(pdf_error)?;
    let footer_font = doc.add_builtin_font(BuiltinFont::TimesRoman).map_err(pdf_error)?;

    // Vertical gradient approximated with bands
    let bands: u8 = 24;
    let band_height = height / f32::from(bands);
    for band in 0..bands {
        let t = f32::from(band) / f32::from(bands - 1);
        let color = blend(GRADIENT_TOP, GRADIENT_BOTTOM, t);
        canvas.fill_rect(0.0, f32::from(band) * band_height, width, band_height + 0.5, color);
    }

    canvas.fill_rect(0.0, 0.0, width, 40.0, GREEN);
    canvas.text_centered(&card.title, 14.0, 0.0, width, 8.0, &bold, WHITE);
    canvas.text_centered(&card.subtitle, 9.0, 0.0, width, 25.0, &regular, WHITE);

    canvas.stroke_rect(15.0, 50.0, 267.0, 350.0, GREEN, 2.0);

    if let Some(logo) = logo {
        canvas.image_fit_width(&logo, 20.0, 60.0, 70.0);
    }
    if let Some(photo) = photo {
        canvas.image(&photo, 108.0, 60.0, 80.0, 100.0);
        canvas.stroke_rect(108.0, 60.0, 80.0, 100.0, GREEN, 1.0);
    }

    canvas.text_centered(&format!("Name: {}", card.name), 10.0, 20.0, 257.0, 200.0, &regular, DARK_GREY);
    canvas.text_centered(&format!("State: {}", card.state), 10.0, 20.0, 257.0, 220.0, &regular, DARK_GREY);
    canvas.text_centered(
        &format!("ID: {}", card.event_id.to_uppercase()),
        12.0,
        20.0,
        257.0,
        240.0,
        &bold,
        GREEN,
    );
    canvas.text_centered(&card.validity, 8.0, 20.0, 257.0, 260.0, &italic, GREY);

    canvas.barcode(&card.event_id, 60.0, 318.0, 180.0, 34.0)?;
    canvas.text_centered(&card.event_id, 8.0, 60.0, 180.0, 355.0, &regular, BLACK);

    canvas.text_centered(&card.footer, 9.0, 0.0, width, 385.0, &footer_font, GREEN);

    drop(canvas);
    doc.save_to_bytes().map_err(pdf_error)
}

fn draw_certificate(name: &str, template: Option<DynamicImage>) -> Result<Vec<u8>, RenderError> {
    let (width, height) = CERTIFICATE_SIZE;
    let (doc, page, layer) = PdfDocument::new(format!("Certificate {name}"), mm(width), mm(height), "Certificate");
    let canvas = Canvas {
        layer: doc.get_page(page).get_layer(layer),
        height,
    };
    let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(pdf_error)?;

    if let Some(template) = template {
        canvas.image(&template, 0.0, 0.0, width, height);
    }

    // Name area matches the template's blank line
    canvas.text_centered(name, 28.0, 275.0, width - 275.0 - 72.0, 260.0, &bold, BLACK);

    drop(canvas);
    doc.save_to_bytes().map_err(pdf_error)
}

/// One page layer addressed in top-left points.
struct Canvas {
    layer: PdfLayerReference,
    height: f32,
}

impl Canvas {
    fn rect(&self, x: f32, y: f32, w: f32, h: f32) -> Rect {
        Rect::new(mm(x), mm(self.height - y - h), mm(x + w), mm(self.height - y))
    }

    fn fill_rect(&self, x: f32, y: f32, w: f32, h: f32, color: (u8, u8, u8)) {
        self.layer.set_fill_color(rgb(color));
        self.layer.add_rect(self.rect(x, y, w, h).with_mode(PaintMode::Fill));
    }

    fn stroke_rect(&self, x: f32, y: f32, w: f32, h: f32, color: (u8, u8, u8), thickness: f32) {
        self.layer.set_outline_color(rgb(color));
        self.layer.set_outline_thickness(thickness);
        self.layer.add_rect(self.rect(x, y, w, h).with_mode(PaintMode::Stroke));
    }

    /// Centre `text` within `[x, x + width]`; `y` is the top of the line.
    #[allow(clippy::too_many_arguments)]
    fn text_centered(
        &self,
        text: &str,
        size: f32,
        x: f32,
        width: f32,
        y: f32,
        font: &IndirectFontRef,
        color: (u8, u8, u8),
    ) {
        let left = x + ((width - approximate_text_width(text, size)) / 2.0).max(0.0);
        let baseline = self.height - y - size * 0.8;
        self.layer.set_fill_color(rgb(color));
        self.layer.use_text(text, size, mm(left), mm(baseline), font);
    }

    /// Draw `image` stretched into the box at `(x, y)`.
    fn image(&self, image: &DynamicImage, x: f32, y: f32, w: f32, h: f32) {
        let (natural_w, natural_h) = natural_size(image);
        if natural_w <= 0.0 || natural_h <= 0.0 {
            return;
        }
        Image::from_dynamic_image(image).add_to_layer(
            self.layer.clone(),
            ImageTransform {
                translate_x: Some(mm(x)),
                translate_y: Some(mm(self.height - y - h)),
                scale_x: Some(w / natural_w),
                scale_y: Some(h / natural_h),
                dpi: Some(IMAGE_DPI),
                ..ImageTransform::default()
            },
        );
    }

    /// Draw `image` `w` points wide, keeping its aspect ratio.
    fn image_fit_width(&self, image: &DynamicImage, x: f32, y: f32, w: f32) {
        let (natural_w, natural_h) = natural_size(image);
        if natural_w <= 0.0 {
            return;
        }
        self.image(image, x, y, w, w * natural_h / natural_w);
    }

    /// Code 128 (set B) bars filling the box at `(x, y)`.
    fn barcode(&self, data: &str, x: f32, y: f32, w: f32, h: f32) -> Result<(), RenderError> {
        let modules = encode_barcode(data)?;
        if modules.is_empty() {
            return Ok(());
        }
        #[allow(clippy::cast_precision_loss)]
        let module_width = w / modules.len() as f32;

        self.layer.set_fill_color(rgb(BLACK));
        for (start, run) in bar_runs(&modules) {
            #[allow(clippy::cast_precision_loss)]
            let left = x + start as f32 * module_width;
            #[allow(clippy::cast_precision_loss)]
            let bar_width = run as f32 * module_width;
            self.layer
                .add_rect(self.rect(left, y, bar_width, h).with_mode(PaintMode::Fill));
        }
        Ok(())
    }
}

/// Encode `data` as Code 128 modules (1 = bar).
fn encode_barcode(data: &str) -> Result<Vec<u8>, RenderError> {
    // 'Ɓ' selects character set B (printable ASCII)
    let barcode = Code128::new(format!("Ɓ{data}")).map_err(|e| RenderError::Barcode(e.to_string()))?;
    Ok(barcode.encode())
}

/// `(start, length)` of each run of bar modules.
fn bar_runs(modules: &[u8]) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut start = None;
    for (i, &module) in modules.iter().enumerate() {
        match (module == 1, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                runs.push((s, i - s));
                start = None;
            },
            _ => {},
        }
    }
    if let Some(s) = start {
        runs.push((s, modules.len() - s));
    }
    runs
}

async fn load_image(path: &Path) -> Option<DynamicImage> {
    match tokio::fs::read(path).await {
        Ok(bytes) => decode_image(&bytes, &path.display().to_string()),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Branding image unavailable");
            None
        },
    }
}

fn decode_image(bytes: &[u8], source: &str) -> Option<DynamicImage> {
    match printpdf::image_crate::load_from_memory(bytes) {
        // Alpha channels are flattened; PDF image masks are not used
        Ok(image) => Some(DynamicImage::ImageRgb8(image.to_rgb8())),
        Err(e) => {
            tracing::warn!(source, error = %e, "Image could not be decoded");
            None
        },
    }
}

/// Image size in points at [`IMAGE_DPI`].
#[allow(clippy::cast_precision_loss)]
fn natural_size(image: &DynamicImage) -> (f32, f32) {
    let px_to_pt = 72.0 / IMAGE_DPI;
    (image.width() as f32 * px_to_pt, image.height() as f32 * px_to_pt)
}

/// Builtin fonts carry no metrics here; average glyph width is close enough
/// for centring short lines.
#[allow(clippy::cast_precision_loss)]
fn approximate_text_width(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * 0.55
}

fn mm(points: f32) -> Mm {
    Mm(points * 25.4 / 72.0)
}

fn rgb((r, g, b): (u8, u8, u8)) -> Color {
    Color::Rgb(Rgb::new(
        f32::from(r) / 255.0,
        f32::from(g) / 255.0,
        f32::from(b) / 255.0,
        None,
    ))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn blend(from: (u8, u8, u8), to: (u8, u8, u8), t: f32) -> (u8, u8, u8) {
    let mix = |a: u8, b: u8| (f32::from(a) + (f32::from(b) - f32::from(a)) * t).round() as u8;
    (mix(from.0, to.0), mix(from.1, to.1), mix(from.2, to.2))
}

fn pdf_error(e: impl std::fmt::Display) -> RenderError {
    RenderError::Pdf(e.to_string())
}
