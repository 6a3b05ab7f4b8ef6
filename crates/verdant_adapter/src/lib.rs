#![forbid(unsafe_code)]

//! Adapter runtime shared by the HTTP binary and its tests. Owns the
//! immutable configuration, the selected stores, the submission and
//! brochure pipelines, and the per-session challenge table.

use std::collections::BTreeMap;
use std::env;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use verdant_contracts::brochure::{BrochureKind, BrochureOptions, BrochureSection};
use verdant_contracts::config::AppConfig;
use verdant_contracts::submission::{IssuedChallenge, RawSubmission, RequestContext};
use verdant_contracts::UtcSeconds;
use verdant_engines::dispatch::{FallbackMailer, RemoteDispatcher};
use verdant_engines::forms::{FormEngine, FormEngineConfig, MemRateCounter};
use verdant_engines::pdf::RenderError;
use verdant_os::bootstrap::app_config_from_env;
use verdant_os::brochure_pipeline::BrochurePipeline;
use verdant_os::health::{select_primary, Primary};
use verdant_os::submission::{SubmissionOutcome, SubmissionPipeline};
use verdant_storage::{
    DatabaseRouter, MemPageStore, MemTicketStore, PageStore, SiteNavigation, TicketStore,
};

pub const MAX_PER_PAGE: u64 = 50;
pub const DEFAULT_PER_PAGE: u64 = 10;

/// Fallback channel of last resort: the message lands in the process
/// log where an operator can recover it.
#[derive(Debug, Default)]
pub struct LogMailer;

impl FallbackMailer for LogMailer {
    fn send(&mut self, to: &str, subject: &str, body: &str) -> Result<(), String> {
        tracing::warn!(%to, %subject, body_len = body.len(), "fallback email (logged only)");
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSubmissionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportTicketCounts {
    pub total: u64,
    pub open: u64,
    pub resolved: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub database: String,
    pub support_tickets: SupportTicketCounts,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaItemDto {
    pub id: u64,
    pub title: String,
    pub publication: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaItemsPage {
    pub items: Vec<MediaItemDto>,
    pub has_next: bool,
    pub total_pages: u64,
    pub current_page: u64,
    pub total_items: u64,
    pub per_page: u64,
}

pub struct AdapterRuntime {
    config: AppConfig,
    primary: Primary,
    router: DatabaseRouter,
    tickets: MemTicketStore,
    pages: MemPageStore,
    pipeline: SubmissionPipeline,
    brochures: BrochurePipeline,
    rate: MemRateCounter,
    challenges: BTreeMap<String, IssuedChallenge>,
    staff_token: Option<String>,
}

impl AdapterRuntime {
    /// Bootstrap, probe, and wire everything. Called once at process
    /// start; failures here mean the process cannot serve at all.
    pub fn from_env() -> Self {
        let config = app_config_from_env();
        let primary = select_primary(config.db.as_ref(), config.use_embedded_db);
        let dispatcher = RemoteDispatcher::new(config.dispatcher.clone());
        let pipeline = SubmissionPipeline::new(
            FormEngine::new(FormEngineConfig::mvp_v1()),
            Some(Box::new(dispatcher)),
            Some(Box::new(LogMailer)),
            config.contact_email.clone(),
        );
        Self {
            config,
            primary,
            router: DatabaseRouter::mvp_v1(),
            tickets: MemTicketStore::new_in_memory(),
            pages: MemPageStore::with_default_navigation(),
            pipeline,
            brochures: BrochurePipeline::mvp_v1(),
            rate: MemRateCounter::new_in_memory(),
            challenges: BTreeMap::new(),
            staff_token: env::var("STAFF_API_TOKEN").ok().filter(|t| !t.is_empty()),
        }
    }

    /// Test constructor: no outbound dispatch, deterministic forms.
    pub fn for_tests(config: AppConfig) -> Self {
        let pipeline = SubmissionPipeline::new(
            FormEngine::new(FormEngineConfig::test_mode()),
            None,
            Some(Box::new(LogMailer)),
            config.contact_email.clone(),
        );
        Self {
            config,
            primary: Primary::EmbeddedLocal,
            router: DatabaseRouter::mvp_v1(),
            tickets: MemTicketStore::new_in_memory(),
            pages: MemPageStore::with_default_navigation(),
            pipeline,
            brochures: BrochurePipeline::mvp_v1(),
            rate: MemRateCounter::new_in_memory(),
            challenges: BTreeMap::new(),
            staff_token: Some("staff-secret".to_string()),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn router(&self) -> &DatabaseRouter {
        &self.router
    }

    pub fn pages_mut(&mut self) -> &mut MemPageStore {
        &mut self.pages
    }

    pub fn now(&self) -> UtcSeconds {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        UtcSeconds(secs)
    }

    pub fn today(&self) -> time::Date {
        time::OffsetDateTime::now_utc().date()
    }

    pub fn request_context(&self, client_ip: &str, session_id: Option<String>) -> RequestContext {
        RequestContext {
            client_ip: client_ip.to_string(),
            now: self.now(),
            session_id,
        }
    }

    /// Mints and stores a challenge for the session; a later submit
    /// from the same session consumes it.
    pub fn issue_challenge(&mut self, session_id: &str) -> IssuedChallenge {
        let challenge = self.pipeline.engine().issue_challenge(self.now());
        self.challenges.insert(session_id.to_string(), challenge);
        challenge
    }

    fn take_challenge(&mut self, session_id: Option<&str>) -> Option<IssuedChallenge> {
        session_id.and_then(|sid| self.challenges.remove(sid))
    }

    pub fn submit_contact(
        &mut self,
        raw: &RawSubmission,
        ctx: &RequestContext,
    ) -> SubmissionOutcome {
        let challenge = self.take_challenge(ctx.session_id.as_deref());
        self.pipeline.submit_contact(
            raw,
            ctx,
            challenge.as_ref(),
            &mut self.rate,
            &mut self.tickets,
        )
    }

    pub fn submit_newsletter(
        &mut self,
        raw: &RawSubmission,
        ctx: &RequestContext,
    ) -> SubmissionOutcome {
        self.pipeline.submit_newsletter(raw, ctx, &mut self.tickets)
    }

    pub fn submit_onboarding(
        &mut self,
        raw: &RawSubmission,
        ctx: &RequestContext,
    ) -> SubmissionOutcome {
        self.pipeline.submit_onboarding(raw, ctx, &mut self.tickets)
    }

    pub fn submit_garden_interest(
        &mut self,
        raw: &RawSubmission,
        ctx: &RequestContext,
    ) -> SubmissionOutcome {
        self.pipeline
            .submit_garden_interest(raw, ctx, &mut self.tickets)
    }

    /// Healthy means the serving store matches intent: the remote
    /// probe passed, or embedded was requested outright. Running on
    /// the embedded fallback after a failed probe is unhealthy.
    fn database_healthy(&self) -> bool {
        match self.primary {
            Primary::Remote => true,
            Primary::EmbeddedLocal => self.config.use_embedded_db,
        }
    }

    pub fn status(&self) -> StatusResponse {
        let counts = self.tickets.counts();
        StatusResponse {
            status: if self.database_healthy() {
                "healthy".to_string()
            } else {
                "unhealthy".to_string()
            },
            database: match self.primary {
                Primary::Remote => "remote".to_string(),
                Primary::EmbeddedLocal => "embedded".to_string(),
            },
            support_tickets: SupportTicketCounts {
                total: counts.total,
                open: counts.open,
                resolved: counts.resolved,
            },
            timestamp: self.now().0,
        }
    }

    pub fn navigation(&self) -> SiteNavigation {
        self.pages.navigation().clone()
    }

    /// Pagination with a hard per-page cap. Out-of-range or
    /// nonsensical paging yields an empty page, never an error.
    pub fn media_items(&self, page: Option<u64>, per_page: Option<u64>) -> MediaItemsPage {
        let per_page = per_page.unwrap_or(DEFAULT_PER_PAGE).min(MAX_PER_PAGE).max(1);
        let page = page.unwrap_or(1);
        let all = self.pages.media_items();
        let total_items = all.len() as u64;
        let total_pages = total_items.div_ceil(per_page);
        let items = if page == 0 || (total_pages > 0 && page > total_pages) {
            Vec::new()
        } else {
            all.iter()
                .skip(((page.saturating_sub(1)) * per_page) as usize)
                .take(per_page as usize)
                .map(|m| MediaItemDto {
                    id: m.id,
                    title: m.title.clone(),
                    publication: m.publication.clone(),
                    url: m.url.clone(),
                })
                .collect()
        };
        MediaItemsPage {
            has_next: page >= 1 && page < total_pages,
            items,
            total_pages,
            current_page: page,
            total_items,
            per_page,
        }
    }

    pub fn is_staff(&self, token: Option<&str>) -> bool {
        match (&self.staff_token, token) {
            (Some(expected), Some(given)) => expected == given,
            _ => false,
        }
    }

    /// Brochure generation with the staff gate applied: the DDQ
    /// package and full strategy-performance book are staff-only;
    /// public prospects get the reduced section set.
    pub fn generate_brochure(
        &self,
        kind: BrochureKind,
        mut options: BrochureOptions,
        staff: bool,
    ) -> Result<(Vec<u8>, String), BrochureAccess> {
        match kind {
            BrochureKind::DdqPackage | BrochureKind::StrategyPerformance if !staff => {
                return Err(BrochureAccess::Forbidden);
            }
            BrochureKind::CustomProspect if !staff => {
                options.sections =
                    Some(vec![BrochureSection::Overview, BrochureSection::Strategies]);
            }
            _ => {}
        }
        let bytes = self
            .brochures
            .generate(kind, &options, &self.pages, self.today(), self.now())
            .map_err(BrochureAccess::Render)?;
        Ok((bytes, self.brochures.filename(kind)))
    }
}

#[derive(Debug)]
pub enum BrochureAccess {
    Forbidden,
    Render(RenderError),
}

/// Query-string pagination. An absent value falls back to defaults;
/// a present but unparseable value is invalid pagination and is
/// collapsed to page zero, which yields the empty page.
pub fn parse_pagination(
    page: Option<&str>,
    per_page: Option<&str>,
) -> (Option<u64>, Option<u64>) {
    fn parse_one(value: Option<&str>) -> Result<Option<u64>, ()> {
        match value {
            None => Ok(None),
            Some(raw) => raw.trim().parse::<u64>().map(Some).map_err(|_| ()),
        }
    }
    match (parse_one(page), parse_one(per_page)) {
        (Ok(page), Ok(per_page)) => (page, per_page),
        _ => (Some(0), None),
    }
}

/// Folds a decoded form or JSON body into the raw submission map.
/// Repeated keys become lists, matching multi-select semantics.
pub fn push_raw_field(raw: &mut RawSubmission, key: &str, value: String) {
    use verdant_contracts::submission::FormValue;
    match raw.remove(key) {
        None => {
            raw.insert(key.to_string(), FormValue::Scalar(value));
        }
        Some(FormValue::Scalar(prev)) => {
            raw.insert(key.to_string(), FormValue::List(vec![prev, value]));
        }
        Some(FormValue::List(mut values)) => {
            values.push(value);
            raw.insert(key.to_string(), FormValue::List(values));
        }
    }
}

/// JSON bodies allow strings, numbers, booleans, and string arrays;
/// everything else is ignored rather than rejected.
pub fn raw_submission_from_json(body: &serde_json::Value) -> RawSubmission {
    use verdant_contracts::submission::FormValue;
    let mut raw = RawSubmission::new();
    let Some(object) = body.as_object() else {
        return raw;
    };
    for (key, value) in object {
        match value {
            serde_json::Value::String(s) => {
                raw.insert(key.clone(), FormValue::Scalar(s.clone()));
            }
            serde_json::Value::Number(n) => {
                raw.insert(key.clone(), FormValue::Scalar(n.to_string()));
            }
            serde_json::Value::Bool(b) => {
                raw.insert(key.clone(), FormValue::Scalar(b.to_string()));
            }
            serde_json::Value::Array(items) => {
                let strings: Vec<String> = items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect();
                raw.insert(key.clone(), FormValue::List(strings));
            }
            _ => {}
        }
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;
    use verdant_contracts::config::DispatcherConfig;
    use verdant_storage::MediaItem;

    fn test_config() -> AppConfig {
        AppConfig {
            db: None,
            dispatcher: DispatcherConfig {
                base_url: "http://localhost:8001/api".to_string(),
                api_timeout_seconds: 30,
                quick_timeout_seconds: 10,
            },
            contact_email: "hello@verdantcapital.example".to_string(),
            default_from_email: "noreply@verdantcapital.example".to_string(),
            use_embedded_db: true,
        }
    }

    fn runtime_with_media(count: u64) -> AdapterRuntime {
        let mut rt = AdapterRuntime::for_tests(test_config());
        for i in 0..count {
            rt.pages_mut().push_media_item(MediaItem {
                id: i + 1,
                title: format!("Article {}", i + 1),
                publication: "The Ledger".to_string(),
                url: format!("https://press.example/{}", i + 1),
                published_at: UtcSeconds(1_700_000_000 + i as i64),
            });
        }
        rt
    }

    #[test]
    fn at_adapter_01_per_page_capped_at_fifty() {
        let rt = runtime_with_media(120);
        let page = rt.media_items(Some(1), Some(500));
        assert_eq!(page.per_page, 50);
        assert_eq!(page.items.len(), 50);
        assert_eq!(page.total_items, 120);
        assert_eq!(page.total_pages, 3);
        assert!(page.has_next);
        let last = rt.media_items(Some(3), Some(500));
        assert!(!last.has_next);
    }

    #[test]
    fn at_adapter_02_out_of_range_page_is_empty_not_error() {
        let rt = runtime_with_media(5);
        let page = rt.media_items(Some(99), Some(10));
        assert!(page.items.is_empty());
        assert!(!page.has_next);
        assert_eq!(page.total_items, 5);
        let zero = rt.media_items(Some(0), Some(10));
        assert!(zero.items.is_empty());
        assert!(!zero.has_next);
    }

    #[test]
    fn at_adapter_08_media_envelope_field_names() {
        let rt = runtime_with_media(3);
        let value = serde_json::to_value(rt.media_items(Some(1), Some(2))).unwrap();
        let object = value.as_object().unwrap();
        for key in ["items", "has_next", "total_pages", "current_page", "total_items"] {
            assert!(object.contains_key(key), "missing envelope field {key}");
        }
        assert_eq!(object["current_page"], 1);
        assert_eq!(object["total_items"], 3);
        assert_eq!(object["has_next"], true);
    }

    #[test]
    fn at_adapter_09_unparseable_pagination_yields_empty_page() {
        let rt = runtime_with_media(5);
        let (page, per_page) = parse_pagination(Some("abc"), Some("10"));
        let result = rt.media_items(page, per_page);
        assert!(result.items.is_empty());
        let (page, per_page) = parse_pagination(Some("2"), Some("-1"));
        let result = rt.media_items(page, per_page);
        assert!(result.items.is_empty());
        let (page, per_page) = parse_pagination(None, None);
        assert_eq!((page, per_page), (None, None));
    }

    #[test]
    fn at_adapter_03_staff_gate_on_ddq_and_performance() {
        let rt = AdapterRuntime::for_tests(test_config());
        assert!(matches!(
            rt.generate_brochure(BrochureKind::DdqPackage, BrochureOptions::default(), false),
            Err(BrochureAccess::Forbidden)
        ));
        assert!(rt
            .generate_brochure(BrochureKind::DdqPackage, BrochureOptions::default(), true)
            .is_ok());
        assert!(rt
            .generate_brochure(
                BrochureKind::ExecutiveSummary,
                BrochureOptions::default(),
                false
            )
            .is_ok());
        assert!(rt.is_staff(Some("staff-secret")));
        assert!(!rt.is_staff(Some("wrong")));
        assert!(!rt.is_staff(None));
    }

    #[test]
    fn at_adapter_04_challenge_consumed_on_submit() {
        let mut rt = AdapterRuntime::for_tests(test_config());
        let c = rt.issue_challenge("sess_1");
        assert_eq!((c.a, c.b), (1, 1));
        assert!(rt.take_challenge(Some("sess_1")).is_some());
        assert!(rt.take_challenge(Some("sess_1")).is_none());
    }

    #[test]
    fn at_adapter_05_repeated_form_keys_become_lists() {
        use verdant_contracts::submission::FormValue;
        let mut raw = RawSubmission::new();
        push_raw_field(&mut raw, "ethical_considerations", "tobacco".to_string());
        push_raw_field(&mut raw, "ethical_considerations", "weapons".to_string());
        assert_eq!(
            raw.get("ethical_considerations"),
            Some(&FormValue::List(vec![
                "tobacco".to_string(),
                "weapons".to_string()
            ]))
        );
    }

    #[test]
    fn at_adapter_06_json_body_coercions() {
        let body = serde_json::json!({
            "email": "a@b.co",
            "consent": true,
            "human_check": 2,
            "interests": ["research", "compliance"],
            "nested": {"ignored": true},
        });
        let raw = raw_submission_from_json(&body);
        assert_eq!(
            verdant_contracts::submission::scalar(&raw, "consent"),
            Some("true")
        );
        assert_eq!(
            verdant_contracts::submission::scalar(&raw, "human_check"),
            Some("2")
        );
        assert_eq!(
            verdant_contracts::submission::list(&raw, "interests").len(),
            2
        );
        assert!(raw.get("nested").is_none());
    }

    #[test]
    fn at_adapter_07_status_reports_embedded_database() {
        let rt = AdapterRuntime::for_tests(test_config());
        let status = rt.status();
        assert_eq!(status.status, "healthy");
        assert_eq!(status.database, "embedded");
        assert_eq!(status.support_tickets.total, 0);
    }

    #[test]
    fn at_adapter_10_fallback_primary_reports_unhealthy() {
        // Embedded by request is healthy; embedded after a failed
        // remote probe is not.
        let mut config = test_config();
        config.use_embedded_db = false;
        let rt = AdapterRuntime::for_tests(config);
        assert_eq!(rt.status().status, "unhealthy");

        let remote = AdapterRuntime {
            primary: Primary::Remote,
            ..AdapterRuntime::for_tests(test_config())
        };
        assert_eq!(remote.status().status, "healthy");
    }
}
