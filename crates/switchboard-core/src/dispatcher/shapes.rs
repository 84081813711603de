//! Payload shapes shared by every variant, and the blocks the variant builders compose.

use crate::config::SearchSettings;
use crate::error::DispatchError;
use crate::shared::{FacetSelections, RequestEnvelope};
use serde_json::{json, Map, Value};

/// Facet blocks sent with search-style payloads, in order.
pub const FACET_FIELDS: [&str; 5] = ["project", "documenttype", "category", "infoboxtype", "author"];

const FACET_NUMBER_OF_VALUES: u32 = 10;

const SEARCH_FIELDS: [&str; 10] = [
    "title",
    "clickableuri",
    "uniqueid",
    "project",
    "documenttype",
    "category",
    "infoboxtype",
    "author",
    "date",
    "summary",
];

const ANSWER_EXTRA_FIELDS: [&str; 3] = ["excerpt", "sourcetype", "filetype"];

const PASSAGE_FIELDS: [&str; 5] = ["title", "clickableuri", "project", "uniqueid", "summary"];

const CITATION_FIELDS: [&str; 4] = ["title", "clickableuri", "project", "uniqueid"];

/// Conversation posture tag read by the agent and gateway routes.
pub(crate) const SINGLE_TURN: &str = "single-turn";
pub(crate) const MULTI_TURN: &str = "multi-turn";

/// Builds the variant-agnostic payloads from the organisation's search settings.
#[derive(Debug, Clone)]
pub struct Shapes {
    settings: SearchSettings,
}

impl Shapes {
    pub fn new(settings: SearchSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    /// One block per facet field; unselected facets carry an empty selection.
    pub fn facet_blocks(&self, selections: &FacetSelections) -> Value {
        let blocks: Vec<Value> = FACET_FIELDS
            .iter()
            .map(|field| {
                let current: Vec<Value> = selections
                    .get(*field)
                    .map(|values| {
                        values
                            .iter()
                            .filter(|v| !v.trim().is_empty())
                            .map(|v| json!({ "value": v, "state": "selected" }))
                            .collect()
                    })
                    .unwrap_or_default();
                json!({
                    "facetId": field,
                    "field": field,
                    "type": "specific",
                    "numberOfValues": FACET_NUMBER_OF_VALUES,
                    "currentValues": current,
                    "freezeCurrentValues": false,
                    "isFieldExpanded": false,
                    "preventAutoSelect": false,
                })
            })
            .collect();
        Value::Array(blocks)
    }

    pub fn search_fields(&self) -> Vec<&'static str> {
        SEARCH_FIELDS.to_vec()
    }

    /// Superset of the search fields.
    pub fn answer_fields(&self) -> Vec<&'static str> {
        SEARCH_FIELDS.iter().chain(ANSWER_EXTRA_FIELDS.iter()).copied().collect()
    }

    pub fn passage_fields(&self) -> Vec<&'static str> {
        PASSAGE_FIELDS.to_vec()
    }

    /// Per-tool field lists for the tool-orchestration gateway.
    pub fn gateway_controls(&self) -> Value {
        json!({
            "answer": { "fieldsToInclude": self.answer_fields() },
            "passages": { "additionalFields": self.passage_fields() },
            "search": { "fieldsToInclude": self.search_fields() },
        })
    }

    fn common(&self, tag: &str) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("searchHub".into(), json!(self.settings.search_hub));
        m.insert("pipeline".into(), json!(self.settings.pipeline));
        m.insert("locale".into(), json!(self.settings.locale));
        m.insert("timezone".into(), json!(self.settings.timezone));
        m.insert("backendMode".into(), json!(tag));
        m
    }

    /// Search-API payload. Identical for every variant apart from the `backendMode` tag.
    pub fn search(&self, env: &RequestEnvelope, tag: &str) -> Value {
        let mut m = self.common(tag);
        m.insert("q".into(), json!(env.text.trim()));
        m.insert("firstResult".into(), json!(env.first_result));
        m.insert(
            "numberOfResults".into(),
            json!(env.number_of_results.unwrap_or(self.settings.number_of_results)),
        );
        m.insert("fieldsToInclude".into(), json!(self.search_fields()));
        m.insert("facets".into(), self.facet_blocks(&env.facets));
        Value::Object(m)
    }

    /// Generative-answer payload for the direct route; never carries a session id.
    pub fn direct_answer(&self, env: &RequestEnvelope, tag: &str) -> Value {
        let mut m = self.common(tag);
        m.insert("q".into(), json!(env.text.trim()));
        m.insert("fieldsToInclude".into(), json!(self.answer_fields()));
        m.insert("facets".into(), self.facet_blocks(&env.facets));
        m.insert(
            "pipelineRuleParameters".into(),
            json!({
                "mlGenerativeQuestionAnswering": {
                    "responseFormat": { "contentFormat": ["text/markdown", "text/plain"] },
                    "citationsFieldToInclude": CITATION_FIELDS,
                }
            }),
        );
        Value::Object(m)
    }

    /// Passage-retrieval payload, in the aggregator's naming.
    pub fn passages(&self, env: &RequestEnvelope, tag: &str) -> Value {
        let mut m = Map::new();
        m.insert("query".into(), json!(env.text.trim()));
        m.insert(
            "numberOfPassages".into(),
            json!(env.number_of_passages.unwrap_or(self.settings.number_of_passages)),
        );
        m.insert("additionalFields".into(), json!(self.passage_fields()));
        m.insert("searchHub".into(), json!(self.settings.search_hub));
        m.insert("pipeline".into(), json!(self.settings.pipeline));
        m.insert(
            "localization".into(),
            json!({ "locale": self.settings.locale, "fallbackLocale": self.settings.fallback_locale }),
        );
        m.insert("queryCorrection".into(), json!({ "enabled": false }));
        m.insert("facets".into(), self.facet_blocks(&env.facets));
        m.insert("backendMode".into(), json!(tag));
        if let Some(org) = self.settings.organization_id.as_deref().filter(|o| !o.is_empty()) {
            m.insert("organizationId".into(), json!(org));
        }
        Value::Object(m)
    }

    pub fn suggest(&self, env: &RequestEnvelope, tag: &str) -> Value {
        json!({
            "q": env.text.trim(),
            "count": env.suggest_count.unwrap_or(self.settings.suggest_count),
            "searchHub": self.settings.search_hub,
            "pipeline": self.settings.pipeline,
            "locale": self.settings.locale,
            "timezone": self.settings.timezone,
            "backendMode": tag,
        })
    }

    /// Content-preview payload. Fails fast when the document identifier is missing.
    pub fn content(&self, env: &RequestEnvelope) -> Result<Value, DispatchError> {
        let unique_id = env
            .unique_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(DispatchError::MissingField { field: "uniqueId" })?;
        Ok(json!({
            "uniqueId": unique_id,
            "q": env.text.trim(),
            "requestedOutputSize": env.requested_output_size.unwrap_or(0),
            "enableNavigation": false,
        }))
    }
}

/// Text of a conversational action; blank is rejected before any downstream call.
pub(crate) fn required_text<'a>(env: &'a RequestEnvelope, field: &'static str) -> Result<&'a str, DispatchError> {
    let text = env.text.trim();
    if text.is_empty() {
        return Err(DispatchError::MissingField { field });
    }
    Ok(text)
}

/// Session id carried by the envelope, or a freshly generated UUID v4.
pub(crate) fn session_or_new(env: &RequestEnvelope) -> String {
    env.session()
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shapes() -> Shapes {
        Shapes::new(SearchSettings::default())
    }

    #[test]
    fn every_facet_block_is_present_even_when_unselected() {
        let env = RequestEnvelope::new("q").with_facet("project", vec!["alpha".into(), "beta".into()]);
        let payload = shapes().search(&env, "coveo");
        let facets = payload["facets"].as_array().unwrap();
        let ids: Vec<_> = facets.iter().map(|f| f["facetId"].as_str().unwrap()).collect();
        assert_eq!(ids, FACET_FIELDS.to_vec());
        assert_eq!(facets[0]["currentValues"][1], json!({"value": "beta", "state": "selected"}));
        assert_eq!(facets[1]["currentValues"], json!([]));
        assert_eq!(facets[4]["type"], "specific");
    }

    #[test]
    fn answer_fields_extend_search_fields() {
        let s = shapes();
        let answer = s.answer_fields();
        assert!(s.search_fields().iter().all(|f| answer.contains(f)));
        assert!(answer.len() > s.search_fields().len());
    }

    #[test]
    fn passages_use_aggregator_naming() {
        let env = RequestEnvelope::new(" vpc ");
        let p = shapes().passages(&env, "bedrockAgent");
        assert_eq!(p["query"], "vpc");
        assert_eq!(p["numberOfPassages"], 5);
        assert_eq!(p["localization"]["fallbackLocale"], "en");
        assert!(p.get("q").is_none());
        assert!(p.get("organizationId").is_none());
    }

    #[test]
    fn organization_id_is_sent_with_passages_when_configured() {
        let settings = SearchSettings {
            organization_id: Some("org-1".into()),
            ..SearchSettings::default()
        };
        let p = Shapes::new(settings).passages(&RequestEnvelope::new("x"), "coveo");
        assert_eq!(p["organizationId"], "org-1");
    }

    #[test]
    fn content_requires_unique_id() {
        let s = shapes();
        let err = s.content(&RequestEnvelope::new("q").with_unique_id("  ")).unwrap_err();
        assert_eq!(err, DispatchError::MissingField { field: "uniqueId" });
        let ok = s.content(&RequestEnvelope::new("q").with_unique_id("doc-1")).unwrap();
        assert_eq!(ok["uniqueId"], "doc-1");
        assert_eq!(ok["requestedOutputSize"], 0);
    }

    #[test]
    fn gateway_controls_name_each_tool() {
        let c = shapes().gateway_controls();
        assert!(c["answer"]["fieldsToInclude"].is_array());
        assert!(c["passages"]["additionalFields"].is_array());
        assert!(c["search"]["fieldsToInclude"].is_array());
    }
}
