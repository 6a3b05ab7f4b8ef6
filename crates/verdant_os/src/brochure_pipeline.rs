#![forbid(unsafe_code)]

use time::Date;

use verdant_contracts::brochure::{BrochureKind, BrochureOptions};
use verdant_contracts::UtcSeconds;
use verdant_engines::brochure::BrochureAggregator;
use verdant_engines::pdf::{PdfRenderer, RenderError};
use verdant_storage::PageStore;

/// Aggregate-then-render. The aggregator never fails; the renderer
/// only fails when both backends do.
pub struct BrochurePipeline {
    aggregator: BrochureAggregator,
    renderer: PdfRenderer,
}

impl BrochurePipeline {
    pub fn new(renderer: PdfRenderer) -> Self {
        Self {
            aggregator: BrochureAggregator::new(),
            renderer,
        }
    }

    pub fn mvp_v1() -> Self {
        Self::new(PdfRenderer::mvp_v1())
    }

    pub fn generate(
        &self,
        kind: BrochureKind,
        options: &BrochureOptions,
        store: &dyn PageStore,
        today: Date,
        now: UtcSeconds,
    ) -> Result<Vec<u8>, RenderError> {
        let model = self.aggregator.build(kind, options, store, today, now);
        self.renderer.render(&model)
    }

    /// Attachment filename for the Content-Disposition header.
    pub fn filename(&self, kind: BrochureKind) -> String {
        kind.filename()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;
    use verdant_engines::pdf::{PlainRenderEngine, RenderEngine};
    use verdant_storage::MemPageStore;

    struct AlwaysFailing;

    impl RenderEngine for AlwaysFailing {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn render(
            &self,
            _model: &verdant_contracts::brochure::BrochureModel,
        ) -> Result<Vec<u8>, RenderError> {
            Err(RenderError::Engine {
                engine: "failing",
                detail: "simulated".to_string(),
            })
        }
    }

    #[test]
    fn at_brochure_pipeline_01_generates_pdf_from_empty_store() {
        let pipeline = BrochurePipeline::mvp_v1();
        let store = MemPageStore::new_in_memory();
        let bytes = pipeline
            .generate(
                BrochureKind::ExecutiveSummary,
                &BrochureOptions::default(),
                &store,
                date!(2024 - 06 - 30),
                UtcSeconds(1_700_000_000),
            )
            .unwrap();
        assert!(bytes.starts_with(b"%PDF-"));
        assert_eq!(
            pipeline.filename(BrochureKind::ExecutiveSummary),
            "executive-summary.pdf"
        );
    }

    #[test]
    fn at_brochure_pipeline_02_double_render_failure_surfaces() {
        let renderer = PdfRenderer::new(Box::new(AlwaysFailing), Box::new(AlwaysFailing));
        let pipeline = BrochurePipeline::new(renderer);
        let store = MemPageStore::new_in_memory();
        let err = pipeline
            .generate(
                BrochureKind::DdqPackage,
                &BrochureOptions::default(),
                &store,
                date!(2024 - 06 - 30),
                UtcSeconds(0),
            )
            .unwrap_err();
        assert!(matches!(err, RenderError::BothEnginesFailed { .. }));
    }

    #[test]
    fn at_brochure_pipeline_03_primary_failure_still_generates() {
        let renderer = PdfRenderer::new(Box::new(AlwaysFailing), Box::new(PlainRenderEngine));
        let pipeline = BrochurePipeline::new(renderer);
        let store = MemPageStore::new_in_memory();
        let bytes = pipeline
            .generate(
                BrochureKind::CustomProspect,
                &BrochureOptions::default(),
                &store,
                date!(2024 - 06 - 30),
                UtcSeconds(0),
            )
            .unwrap();
        assert!(bytes.starts_with(b"%PDF-"));
    }
}
