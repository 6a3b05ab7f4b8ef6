#![forbid(unsafe_code)]

//! PDF rendering for brochures. Two independent backends implement
//! the same trait; the renderer tries the styled one first and falls
//! back to the plain one, so a brochure request only fails when both
//! do.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use verdant_contracts::brochure::{BrochureKind, BrochureModel, BrochureSection};

use crate::brochure::performance_table;

// US Letter with one-inch margins.
const PAGE_WIDTH: f32 = 612.0;
const PAGE_HEIGHT: f32 = 792.0;
const MARGIN: f32 = 72.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    Engine { engine: &'static str, detail: String },
    BothEnginesFailed { primary: String, fallback: String },
}

pub trait RenderEngine {
    fn name(&self) -> &'static str;
    fn render(&self, model: &BrochureModel) -> Result<Vec<u8>, RenderError>;
}

/// One logical line of laid-out text. Both backends consume the same
/// line stream so they emit identical content, differently styled.
#[derive(Debug, Clone, PartialEq)]
enum Line {
    Heading(String),
    SubHeading(String),
    Body(String),
    TableRow([String; 5]),
    Spacer,
}

fn kind_title(kind: BrochureKind) -> &'static str {
    match kind {
        BrochureKind::ExecutiveSummary => "Executive Summary",
        BrochureKind::StrategyPerformance => "Strategy Performance",
        BrochureKind::DdqPackage => "Due Diligence Package",
        BrochureKind::CustomProspect => "Prospect Overview",
    }
}

/// Flattens the model into the logical line stream. Every section the
/// model names contributes content; nothing is silently dropped.
fn layout(model: &BrochureModel) -> Vec<Line> {
    let mut lines = Vec::new();
    lines.push(Line::Heading(format!(
        "{} - {}",
        model.firm_overview.firm_name,
        kind_title(model.kind)
    )));
    if let Some(prospect) = &model.prospect_name {
        lines.push(Line::Body(format!("Prepared for {prospect}")));
    }
    lines.push(Line::Body(format!("Generated {}", model.generated_date)));
    lines.push(Line::Spacer);

    for section in &model.sections {
        match section {
            BrochureSection::Overview => {
                lines.push(Line::SubHeading("Firm Overview".to_string()));
                lines.push(Line::Body(model.firm_overview.tagline.clone()));
                lines.push(Line::Body(model.firm_overview.philosophy.clone()));
                for highlight in &model.firm_overview.highlights {
                    lines.push(Line::Body(format!("- {highlight}")));
                }
                lines.push(Line::Spacer);
            }
            BrochureSection::Strategies => {
                lines.push(Line::SubHeading("Strategies".to_string()));
                lines.push(Line::TableRow([
                    "Strategy".to_string(),
                    "YTD".to_string(),
                    "1 Year".to_string(),
                    "3 Year".to_string(),
                    "Since Inception".to_string(),
                ]));
                for row in performance_table(&model.strategies) {
                    lines.push(Line::TableRow([
                        row.title,
                        row.ytd,
                        row.one_year,
                        row.three_year,
                        row.since_inception,
                    ]));
                }
                for strategy in &model.strategies {
                    if !strategy.description.is_empty() {
                        lines.push(Line::Body(format!(
                            "{}: {}",
                            strategy.title, strategy.description
                        )));
                    }
                }
                lines.push(Line::Spacer);
            }
            BrochureSection::Team => {
                lines.push(Line::SubHeading("Team".to_string()));
                if model.team.members.is_empty() {
                    lines.push(Line::Body(
                        "Team biographies are available on request.".to_string(),
                    ));
                }
                for member in &model.team.members {
                    lines.push(Line::Body(format!(
                        "{} - {}: {}",
                        member.name, member.role, member.bio
                    )));
                }
                lines.push(Line::Spacer);
            }
            BrochureSection::DdqSummary => {
                lines.push(Line::SubHeading("Due Diligence Summary".to_string()));
                if let Some(first) = model.ddq.sections.first() {
                    lines.push(Line::Body(format!("{}: {}", first.heading, first.body)));
                }
                lines.push(Line::Spacer);
            }
            BrochureSection::DdqFull => {
                lines.push(Line::SubHeading("Due Diligence Questionnaire".to_string()));
                for ddq in &model.ddq.sections {
                    lines.push(Line::Body(format!("{}: {}", ddq.heading, ddq.body)));
                }
                lines.push(Line::Spacer);
            }
        }
    }

    lines.push(Line::Spacer);
    lines.push(Line::Body(model.disclaimer.clone()));
    lines
}

/// Wraps `text` to at most `width` characters per rendered line.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.len() + 1 + word.len() > width {
            out.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        out.push(current);
    }
    if out.is_empty() {
        out.push(String::new());
    }
    out
}

/// Escapes a string for a PDF literal string operand.
fn pdf_escape(text: &str) -> String {
    text.chars()
        .flat_map(|c| match c {
            '(' => vec!['\\', '('],
            ')' => vec!['\\', ')'],
            '\\' => vec!['\\', '\\'],
            c if c.is_ascii() => vec![c],
            // Non-ASCII falls back to a marker; the standard fonts
            // carry no wide encodings.
            _ => vec!['?'],
        })
        .collect()
}

struct PageAssembler {
    doc: Document,
    font_ids: Vec<(String, lopdf::ObjectId)>,
    page_ids: Vec<lopdf::ObjectId>,
    pages_id: lopdf::ObjectId,
    operations: Vec<Operation>,
    cursor_y: f32,
}

impl PageAssembler {
    fn new(fonts: &[(&str, &str)]) -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_ids = fonts
            .iter()
            .map(|(alias, base_font)| {
                let id = doc.add_object(dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type1",
                    "BaseFont" => *base_font,
                });
                (alias.to_string(), id)
            })
            .collect();
        Self {
            doc,
            font_ids,
            page_ids: Vec::new(),
            pages_id,
            operations: Vec::new(),
            cursor_y: PAGE_HEIGHT - MARGIN,
        }
    }

    fn ensure_room(&mut self, line_height: f32) {
        if self.cursor_y - line_height < MARGIN {
            self.flush_page();
        }
    }

    fn text(&mut self, font_alias: &str, size: f32, x: f32, text: &str) {
        let line_height = size * 1.4;
        self.ensure_room(line_height);
        self.cursor_y -= line_height;
        self.operations.push(Operation::new("BT", vec![]));
        self.operations.push(Operation::new(
            "Tf",
            vec![Object::Name(font_alias.as_bytes().to_vec()), size.into()],
        ));
        self.operations.push(Operation::new(
            "Td",
            vec![x.into(), self.cursor_y.into()],
        ));
        self.operations.push(Operation::new(
            "Tj",
            vec![Object::string_literal(pdf_escape(text))],
        ));
        self.operations.push(Operation::new("ET", vec![]));
    }

    fn spacer(&mut self, height: f32) {
        self.ensure_room(height);
        self.cursor_y -= height;
    }

    fn flush_page(&mut self) {
        let content = Content {
            operations: std::mem::take(&mut self.operations),
        };
        let encoded = match content.encode() {
            Ok(bytes) => bytes,
            Err(_) => Vec::new(),
        };
        let content_id = self
            .doc
            .add_object(Stream::new(dictionary! {}, encoded));
        let mut font_dict = lopdf::Dictionary::new();
        for (alias, id) in &self.font_ids {
            font_dict.set(alias.as_bytes().to_vec(), Object::Reference(*id));
        }
        let resources_id = self.doc.add_object(dictionary! {
            "Font" => Object::Dictionary(font_dict),
        });
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        });
        self.page_ids.push(page_id);
        self.cursor_y = PAGE_HEIGHT - MARGIN;
    }

    fn finish(mut self) -> Result<Vec<u8>, String> {
        if !self.operations.is_empty() || self.page_ids.is_empty() {
            self.flush_page();
        }
        let kids: Vec<Object> = self
            .page_ids
            .iter()
            .map(|id| Object::Reference(*id))
            .collect();
        let count = kids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);
        let mut buf = Vec::new();
        self.doc.save_to(&mut buf).map_err(|e| e.to_string())?;
        Ok(buf)
    }
}

/// Primary backend: bold headings, body flow, aligned table columns.
#[derive(Debug, Clone, Copy, Default)]
pub struct StyledRenderEngine;

impl RenderEngine for StyledRenderEngine {
    fn name(&self) -> &'static str {
        "styled"
    }

    fn render(&self, model: &BrochureModel) -> Result<Vec<u8>, RenderError> {
        let mut page = PageAssembler::new(&[
            ("F1", "Helvetica"),
            ("F2", "Helvetica-Bold"),
        ]);
        let columns = [MARGIN, MARGIN + 200.0, MARGIN + 270.0, MARGIN + 340.0, MARGIN + 410.0];
        for line in layout(model) {
            match line {
                Line::Heading(text) => {
                    for part in wrap(&text, 52) {
                        page.text("F2", 18.0, MARGIN, &part);
                    }
                    page.spacer(8.0);
                }
                Line::SubHeading(text) => {
                    page.spacer(4.0);
                    page.text("F2", 13.0, MARGIN, &text);
                }
                Line::Body(text) => {
                    for part in wrap(&text, 88) {
                        page.text("F1", 10.0, MARGIN, &part);
                    }
                }
                Line::TableRow(cells) => {
                    let line_height = 10.0_f32 * 1.4;
                    page.ensure_room(line_height);
                    page.cursor_y -= line_height;
                    let y = page.cursor_y;
                    for (cell, x) in cells.iter().zip(columns.iter()) {
                        let clipped: String = cell.chars().take(34).collect();
                        page.operations.push(Operation::new("BT", vec![]));
                        page.operations.push(Operation::new(
                            "Tf",
                            vec![Object::Name(b"F1".to_vec()), 10.0_f32.into()],
                        ));
                        page.operations
                            .push(Operation::new("Td", vec![(*x).into(), y.into()]));
                        page.operations.push(Operation::new(
                            "Tj",
                            vec![Object::string_literal(pdf_escape(&clipped))],
                        ));
                        page.operations.push(Operation::new("ET", vec![]));
                    }
                }
                Line::Spacer => page.spacer(10.0),
            }
        }
        page.finish().map_err(|detail| RenderError::Engine {
            engine: "styled",
            detail,
        })
    }
}

/// Fallback backend: a single monospace style, no tables, no flow
/// niceties. Kept intentionally dumb so it has nothing left to break.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainRenderEngine;

impl RenderEngine for PlainRenderEngine {
    fn name(&self) -> &'static str {
        "plain"
    }

    fn render(&self, model: &BrochureModel) -> Result<Vec<u8>, RenderError> {
        let mut page = PageAssembler::new(&[("F1", "Courier")]);
        for line in layout(model) {
            match line {
                Line::Heading(text) | Line::SubHeading(text) => {
                    for part in wrap(&text.to_uppercase(), 70) {
                        page.text("F1", 10.0, MARGIN, &part);
                    }
                }
                Line::Body(text) => {
                    for part in wrap(&text, 70) {
                        page.text("F1", 10.0, MARGIN, &part);
                    }
                }
                Line::TableRow(cells) => {
                    let joined = cells.join("  |  ");
                    for part in wrap(&joined, 70) {
                        page.text("F1", 10.0, MARGIN, &part);
                    }
                }
                Line::Spacer => page.spacer(10.0),
            }
        }
        page.finish().map_err(|detail| RenderError::Engine {
            engine: "plain",
            detail,
        })
    }
}

/// Renders with the primary engine, falling back to the secondary on
/// failure. Output is all-or-nothing; a failed render leaves no
/// partial bytes behind.
pub struct PdfRenderer {
    primary: Box<dyn RenderEngine + Send + Sync>,
    fallback: Box<dyn RenderEngine + Send + Sync>,
}

impl PdfRenderer {
    pub fn new(
        primary: Box<dyn RenderEngine + Send + Sync>,
        fallback: Box<dyn RenderEngine + Send + Sync>,
    ) -> Self {
        Self { primary, fallback }
    }

    pub fn mvp_v1() -> Self {
        Self::new(Box::new(StyledRenderEngine), Box::new(PlainRenderEngine))
    }

    pub fn render(&self, model: &BrochureModel) -> Result<Vec<u8>, RenderError> {
        let primary_err = match self.primary.render(model) {
            Ok(bytes) => return Ok(bytes),
            Err(RenderError::Engine { detail, .. }) => detail,
            Err(RenderError::BothEnginesFailed { primary, .. }) => primary,
        };
        match self.fallback.render(model) {
            Ok(bytes) => Ok(bytes),
            Err(RenderError::Engine { detail, .. }) => Err(RenderError::BothEnginesFailed {
                primary: primary_err,
                fallback: detail,
            }),
            Err(e @ RenderError::BothEnginesFailed { .. }) => Err(e),
        }
    }
}
