use std::{fs, io::Cursor};

use chrono::NaiveDateTime;
use log::info;
use printpdf::{
    image_crate::codecs::png::PngDecoder,
    BuiltinFont, Color, Image, ImageTransform, IndirectFontRef, Line, Mm, PdfDocument,
    PdfDocumentReference, PdfLayerReference, Point, Rgb,
};

use crate::aggregate::{self, MonthGroup, ReportRecord, YearMonth};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::report_kind::{Column, ColumnType, ReportKind};
use crate::util;


const PAGE_WIDTH: f32 = 297.0;
const PAGE_HEIGHT: f32 = 210.0;
const MARGIN: f32 = 10.0;
const FOOTER_HEIGHT: f32 = 12.0;
const PT_TO_MM: f32 = 0.3528;
const LOGO_HEIGHT: f32 = 25.0;

const TITLE_SIZE: f32 = 16.0;
const HEADING_SIZE: f32 = 12.0;
const CELL_SIZE: f32 = 6.5;
const BODY_SIZE: f32 = 9.0;
const FOOTER_SIZE: f32 = 8.0;
const CELL_PADDING: f32 = 1.2;


/// Font, logo and heading shared by every export.
pub struct ExportAssets {
    pub ministry_name: String,
    font: Option<Vec<u8>>,
    logo: Option<Vec<u8>>,
}

impl ExportAssets {
    pub fn load(config: &Config) -> AppResult<Self> {
        let font = match &config.pdf_font_path {
            Some(path) => Some(fs::read(path)?),
            None => None,
        };
        let logo = match &config.pdf_logo_path {
            Some(path) => Some(fs::read(path)?),
            None => None,
        };

        Ok(ExportAssets {
            ministry_name: config.ministry_name.clone(),
            font,
            logo,
        })
    }
}

pub struct PdfReport {
    pub bytes: Vec<u8>,
    pub pages: usize,
    pub filename: String,
}


fn export_error<E: std::fmt::Debug>(err: E) -> AppError {
    AppError::Export(format!("{:?}", err))
}

fn text_width(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * 0.5 * PT_TO_MM
}

fn line_height(size: f32) -> f32 {
    size * PT_TO_MM * 1.3
}

/// Greedy word wrap by estimated glyph width. Words longer than a line are cut.
pub fn wrap_text(text: &str, size: f32, width: f32) -> Vec<String> {
    let max = ((width / (size * 0.5 * PT_TO_MM)).floor() as usize).max(1);
    let mut lines = Vec::new();

    for para in text.lines() {
        let mut cur = String::new();

        for word in para.split_whitespace() {
            let mut chars: Vec<char> = word.chars().collect();
            while chars.len() > max {
                if !cur.is_empty() {
                    lines.push(std::mem::take(&mut cur));
                }
                lines.push(chars[..max].iter().collect());
                chars.drain(..max);
            }
            if chars.is_empty() {
                continue;
            }

            let word: String = chars.into_iter().collect();
            if cur.is_empty() {
                cur = word;
            }
            else if cur.chars().count() + 1 + word.chars().count() <= max {
                cur.push(' ');
                cur.push_str(&word);
            }
            else {
                lines.push(std::mem::replace(&mut cur, word));
            }
        }

        lines.push(cur);
    }

    if lines.is_empty() {
        lines.push(String::new());
    }

    lines
}

/// `<province>_<YYYY-MM>.pdf` reduced to ASCII file name characters.
pub fn export_filename(province: &str, month: YearMonth) -> String {
    let mut name = String::new();

    for c in province.trim().chars() {
        let c = match c {
            'à' | 'â' | 'ä' => 'a',
            'À' | 'Â' | 'Ä' => 'A',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'É' | 'È' | 'Ê' | 'Ë' => 'E',
            'î' | 'ï' => 'i',
            'Î' | 'Ï' => 'I',
            'ô' | 'ö' => 'o',
            'Ô' | 'Ö' => 'O',
            'ù' | 'û' | 'ü' => 'u',
            'Ù' | 'Û' | 'Ü' => 'U',
            'ç' => 'c',
            'Ç' => 'C',
            c if c.is_ascii_alphanumeric() || c == '-' => c,
            c if c.is_whitespace() || c == '_' => '_',
            _ => continue,
        };
        name.push(c);
    }

    if name.is_empty() {
        name.push_str("rapports");
    }

    format!("{}_{}.pdf", name, month)
}


struct PageWriter {
    doc: PdfDocumentReference,
    font: IndirectFontRef,
    layers: Vec<PdfLayerReference>,
    y: f32,
}

impl PageWriter {
    fn new(title: &str, assets: &ExportAssets) -> AppResult<Self> {
        let (doc, page, layer) = PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");

        let font = match &assets.font {
            Some(bytes) => doc.add_external_font(Cursor::new(bytes.clone())),
            None => doc.add_builtin_font(BuiltinFont::Helvetica),
        }.map_err(export_error)?;

        let layer = doc.get_page(page).get_layer(layer);

        Ok(PageWriter {
            doc,
            font,
            layers: vec![layer],
            y: PAGE_HEIGHT - MARGIN,
        })
    }

    fn layer(&self) -> &PdfLayerReference {
        // Never empty: created with the first page.
        &self.layers[self.layers.len() - 1]
    }

    fn new_page(&mut self) {
        let (page, layer) = self.doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        self.layers.push(self.doc.get_page(page).get_layer(layer));
        self.y = PAGE_HEIGHT - MARGIN;
    }

    /// Starts a new page unless `height` still fits. Returns whether it did.
    fn ensure_space(&mut self, height: f32) -> bool {
        if self.y - height < MARGIN + FOOTER_HEIGHT {
            self.new_page();
            true
        }
        else {
            false
        }
    }

    fn text(&self, text: &str, size: f32, x: f32, y: f32) {
        self.layer().use_text(text, size, Mm(x), Mm(y), &self.font);
    }

    fn centered(&self, text: &str, size: f32, y: f32) {
        let x = ((PAGE_WIDTH - text_width(text, size)) / 2.0).max(MARGIN);
        self.text(text, size, x, y);
    }

    fn line(&self, x1: f32, y1: f32, x2: f32, y2: f32) {
        self.layer().add_line(Line {
            points: vec![
                (Point::new(Mm(x1), Mm(y1)), false),
                (Point::new(Mm(x2), Mm(y2)), false),
            ],
            is_closed: false,
        });
    }

    fn logo(&mut self, png: &[u8]) -> AppResult<()> {
        let decoder = PngDecoder::new(Cursor::new(png)).map_err(export_error)?;
        let image = Image::try_from(decoder).map_err(export_error)?;

        let (w_px, h_px) = (image.image.width.0 as f32, image.image.height.0 as f32);
        if w_px <= 0.0 || h_px <= 0.0 {
            return Ok(());
        }

        let dpi = h_px * 25.4 / LOGO_HEIGHT;
        let width = w_px * 25.4 / dpi;
        self.y -= LOGO_HEIGHT;

        image.add_to_layer(self.layer().clone(), ImageTransform {
            translate_x: Some(Mm((PAGE_WIDTH - width) / 2.0)),
            translate_y: Some(Mm(self.y)),
            dpi: Some(dpi),
            ..Default::default()
        });

        self.y -= 4.0;
        Ok(())
    }

    fn footers(&self, exported_at: NaiveDateTime) {
        let stamp = format!("Exporté le: {} à {}",
            exported_at.format("%d/%m/%Y"), exported_at.format("%H:%M"));
        let total = self.layers.len();

        for (i, layer) in self.layers.iter().enumerate() {
            let page = format!("Page {} sur {}", i + 1, total);
            let y = MARGIN;

            layer.use_text(stamp.as_str(), FOOTER_SIZE, Mm(MARGIN), Mm(y), &self.font);
            layer.use_text(page.as_str(), FOOTER_SIZE,
                Mm(PAGE_WIDTH - MARGIN - text_width(&page, FOOTER_SIZE)), Mm(y), &self.font);
        }
    }

    fn finish(self) -> AppResult<(Vec<u8>, usize)> {
        let pages = self.layers.len();
        let bytes = self.doc.save_to_bytes().map_err(export_error)?;
        Ok((bytes, pages))
    }
}


struct Table<'a> {
    columns: Vec<&'static Column>,
    widths: Vec<f32>,
    records: Vec<&'a ReportRecord>,
    kind: ReportKind,
}

impl<'a> Table<'a> {
    fn new(kind: ReportKind, records: Vec<&'a ReportRecord>) -> Self {
        let columns: Vec<&'static Column> = kind.columns().iter()
            .filter(|c| c.ty != ColumnType::LongText)
            .collect();
        let width = (PAGE_WIDTH - 2.0 * MARGIN) / columns.len().max(1) as f32;

        Table {
            widths: vec![width; columns.len()],
            columns,
            records,
            kind,
        }
    }

    fn header_cells(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.label.to_owned()).collect()
    }

    fn total_cells(&self) -> Vec<String> {
        let totals = aggregate::totals(self.kind, self.records.iter().copied());

        self.columns.iter()
            .enumerate()
            .map(|(i, c)| match totals.sum(c.key) {
                Some(sum) => util::format_number(sum),
                None if i == 0 => "Total".to_owned(),
                None => String::new(),
            })
            .collect()
    }

    fn draw_row(&self, w: &mut PageWriter, cells: &[String], with_header: bool) {
        let wrapped: Vec<Vec<String>> = cells.iter()
            .zip(self.widths.iter())
            .map(|(cell, width)| wrap_text(cell, CELL_SIZE, width - 2.0 * CELL_PADDING))
            .collect();
        let n_lines = wrapped.iter().map(Vec::len).max().unwrap_or(1);
        let height = n_lines as f32 * line_height(CELL_SIZE) + 2.0 * CELL_PADDING;

        if w.ensure_space(height) && with_header {
            self.draw_row(w, &self.header_cells(), false);
        }

        let top = w.y;
        let bottom = top - height;
        let right = MARGIN + self.widths.iter().sum::<f32>();

        w.line(MARGIN, top, right, top);
        w.line(MARGIN, bottom, right, bottom);

        let mut x = MARGIN;
        for (lines, width) in wrapped.iter().zip(self.widths.iter()) {
            w.line(x, top, x, bottom);
            for (i, line) in lines.iter().enumerate() {
                let y = top - CELL_PADDING - (i + 1) as f32 * line_height(CELL_SIZE) + 0.6;
                w.text(line, CELL_SIZE, x + CELL_PADDING, y);
            }
            x += width;
        }
        w.line(x, top, x, bottom);

        w.y = bottom;
    }

    fn draw(&self, w: &mut PageWriter) {
        self.draw_row(w, &self.header_cells(), false);
        for record in &self.records {
            let cells: Vec<String> = self.columns.iter().map(|c| record.display(c)).collect();
            self.draw_row(w, &cells, true);
        }
        self.draw_row(w, &self.total_cells(), true);
    }
}

fn description_heading(record: &ReportRecord) -> String {
    let place = ["city", "title"].iter()
        .map(|key| record.text(key))
        .find(|s| !s.is_empty())
        .unwrap_or_default();

    if place.is_empty() {
        format!("Description ({}):", util::format_date(record.date))
    }
    else {
        format!("Description ({}, {}):", util::format_date(record.date), place)
    }
}

fn draw_descriptions(w: &mut PageWriter, records: &[&ReportRecord]) {
    let width = PAGE_WIDTH - 2.0 * MARGIN;

    for record in records {
        let description = record.text("description");
        if description.trim().is_empty() {
            continue;
        }

        w.ensure_space(2.0 * line_height(BODY_SIZE) + 2.0);
        w.y -= line_height(BODY_SIZE) + 1.0;
        w.text(&description_heading(record), BODY_SIZE, MARGIN, w.y);

        for line in wrap_text(&description, BODY_SIZE, width) {
            w.ensure_space(line_height(BODY_SIZE));
            w.y -= line_height(BODY_SIZE);
            w.text(&line, BODY_SIZE, MARGIN, w.y);
        }
    }
}


/// Renders the reports of one province and month.
pub fn render(assets: &ExportAssets, province: &str, group: &MonthGroup,
    exported_at: NaiveDateTime) -> AppResult<PdfReport> {

    if group.records.is_empty() {
        return Err(AppError::NotFound);
    }

    let title = format!("Rapports {} – {}", province, group.month.label());
    let mut w = PageWriter::new(&title, assets)?;

    if let Some(logo) = &assets.logo {
        w.logo(logo)?;
    }

    w.y -= line_height(HEADING_SIZE);
    w.centered(&assets.ministry_name, HEADING_SIZE, w.y);
    w.y -= line_height(TITLE_SIZE) + 2.0;
    w.centered(&title, TITLE_SIZE, w.y);
    w.y -= 6.0;

    for (kind, records) in group.by_kind() {
        w.ensure_space(line_height(HEADING_SIZE) + 20.0);
        w.y -= line_height(HEADING_SIZE);
        w.text(kind.label(), HEADING_SIZE, MARGIN, w.y);
        w.y -= 2.0;

        Table::new(kind, records.clone()).draw(&mut w);
        draw_descriptions(&mut w, &records);
        w.y -= 6.0;
    }

    w.footers(exported_at);
    let (bytes, pages) = w.finish()?;

    info!("Exported {} reports of {} {} on {} pages",
        group.records.len(), province, group.month, pages);

    Ok(PdfReport {
        bytes,
        pages,
        filename: export_filename(province, group.month),
    })
}


#[cfg(test)]
mod tests {
    use chrono::Local;
    use serde_json::json;

    use super::*;
    use crate::aggregate::tests::record;

    fn assets() -> ExportAssets {
        ExportAssets {
            ministry_name: crate::config::DEFAULT_MINISTRY_NAME.to_owned(),
            font: None,
            logo: None,
        }
    }

    #[test]
    fn renders_a_pdf_document() {
        let group = MonthGroup {
            month: YearMonth { year: 2025, month: 8 },
            records: vec![
                record(ReportKind::Flood, "LAC", "2025-08-14", json!({
                    "id": 1, "city": "Bol", "deaths": 3, "description": "Crue du lac.",
                    "images": [], "created_at": "2025-08-14T10:00:00",
                })),
                record(ReportKind::Cholera, "LAC", "2025-08-02", json!({ "id": 2, "cases": 40 })),
            ],
        };

        let pdf = render(&assets(), "LAC", &group, Local::now().naive_local()).unwrap();
        assert!(pdf.bytes.starts_with(b"%PDF"));
        assert_eq!(pdf.pages, 1);
        assert_eq!(pdf.filename, "LAC_2025-08.pdf");
    }

    #[test]
    fn long_tables_span_several_pages() {
        let records = (0..120)
            .map(|i| record(ReportKind::SocialAction, "KANEM", "2025-03-01", json!({
                "id": i, "city": "Mao", "participants_men": i,
                "description": "Séance de sensibilisation dans le quartier.",
            })))
            .collect();
        let group = MonthGroup { month: YearMonth { year: 2025, month: 3 }, records };

        let pdf = render(&assets(), "KANEM", &group, Local::now().naive_local()).unwrap();
        assert!(pdf.pages > 1);
    }

    #[test]
    fn empty_groups_are_not_exported() {
        let group = MonthGroup { month: YearMonth { year: 2025, month: 3 }, records: vec![] };
        assert!(matches!(render(&assets(), "KANEM", &group, Local::now().naive_local()),
            Err(AppError::NotFound)));
    }

    #[test]
    fn file_names_stay_ascii() {
        let month = YearMonth { year: 2025, month: 10 };
        assert_eq!(export_filename("BAHR EL GAZEL", month), "BAHR_EL_GAZEL_2025-10.pdf");
        assert_eq!(export_filename("Actualités", month), "Actualites_2025-10.pdf");
        assert_eq!(export_filename("../..", month), "rapports_2025-10.pdf");
    }

    #[test]
    fn wrapping_respects_width() {
        let lines = wrap_text("un deux trois quatre cinq six sept", 10.0, 20.0);
        let max = (20.0 / (10.0 * 0.5 * PT_TO_MM)).floor() as usize;
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|l| l.chars().count() <= max));

        let cut = wrap_text(&"x".repeat(50), 10.0, 20.0);
        assert!(cut.len() >= 4);
    }
}
