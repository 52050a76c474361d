//! Expert instructions and response schemas.
//!
//! The engine only depends on [`PromptCatalog`]; [`BuiltinCatalog`] is a
//! compact default so a deployment works end to end. Schemas use the
//! generative API's uppercase type names.

use crate::performance::PerformanceReport;
use serde_json::{json, Value};
use vantage_core::{AccessibilityHeuristics, ExpertKey, RuleResults};

/// Subjects the contextual re-rank must never promote.
pub const RERANK_EXCLUSIONS: [&str; 3] = [
    "Screen Reader Compatibility",
    "Missing Alt Text",
    "Missing Form Labels",
];

/// What an expert is told about the site besides its text.
#[derive(Debug, Clone, Default)]
pub struct ExpertContext {
    pub url: String,
    pub performance: Option<PerformanceReport>,
    pub animation_hints: Option<Vec<String>>,
    pub heuristics: Option<AccessibilityHeuristics>,
    /// More than one page contributed text
    pub multi_page: bool,
    /// A mobile screenshot accompanies the desktop one
    pub mobile_captured: bool,
}

/// One half of the competitor comparison.
#[derive(Debug, Clone)]
pub struct SchemaPartition {
    /// Appended to the competitor instruction to scope this half
    pub focus: String,
    pub schema: Value,
}

/// Source of instructions and schemas for every expert.
pub trait PromptCatalog: Send + Sync {
    /// System instruction for `key`.
    fn system_instruction(&self, key: ExpertKey, context: &ExpertContext) -> String;

    /// Response schema for `key`.
    fn schema(&self, key: ExpertKey) -> Value;

    /// The competitor schema split into halves that are generated in parallel.
    fn competitor_partitions(&self) -> Vec<SchemaPartition>;

    /// System instruction for the contextual re-rank.
    fn rerank_instruction(&self) -> String;

    /// Response schema for the contextual re-rank: an array of issues.
    fn rerank_schema(&self) -> Value;
}

/// Website context block shared by every standard expert.
#[must_use]
pub fn website_context(context: &ExpertContext) -> String {
    let mut prompt = format!("\n### Website Context ###\n- Website URL: {}\n", context.url);
    if context.multi_page {
        prompt.push_str(
            "- Note: text below is aggregated from several pages. Look for site-wide patterns.\n",
        );
    }

    if let Some(performance) = &context.performance {
        prompt.push_str("\n### Core Web Vitals & Performance Metrics (Lab Data for Homepage) ###\n");
        match &performance.performance_data {
            Some(m) => {
                prompt.push_str(&format!(
                    "- Largest Contentful Paint: {}\n- Cumulative Layout Shift: {}\n- Total Blocking Time: {}\n- First Contentful Paint: {}\n- Time to Interactive: {}\n- Speed Index: {}\n",
                    m.lcp, m.cls, m.tbt, m.fcp, m.tti, m.si
                ));
            }
            None => {
                prompt.push_str("IMPORTANT: Data could not be retrieved from the PageSpeed Insights API.\n");
                if let Some(error) = &performance.error {
                    prompt.push_str(&format!("Reason: {error}\n"));
                }
            }
        }
    }

    if let Some(hints) = &context.animation_hints {
        prompt.push_str("\n### Discovered CSS Animations & Transitions (from Homepage) ###\n");
        if hints.is_empty() {
            prompt.push_str(
                "No significant CSS animations or transitions were detected. Judge motion from the static screenshot.\n",
            );
        } else {
            prompt.push_str("Elements whose CSS suggests motion:\n");
            for hint in hints {
                prompt.push_str(&format!("- {hint}\n"));
            }
        }
    }

    if let Some(h) = &context.heuristics {
        let yes_no = |b: bool| if b { "Yes" } else { "No" };
        prompt.push_str(&format!(
            "\n### Automated Accessibility Check (from Homepage) ###\n- Images without descriptive alt text: {}\n- Form inputs without corresponding labels: {}\n- Presence of semantic HTML5 elements (main, nav, header, etc.): {}\n- Presence of ARIA attributes (roles, properties): {}\n",
            h.images_missing_alt,
            h.inputs_missing_labels,
            yes_no(h.has_semantic_elements),
            yes_no(h.has_aria_attributes),
        ));
    }

    prompt
}

/// Full user content for a standard expert.
///
/// Strategy sees only the page text; the accessibility expert also gets the
/// rule engine output.
#[must_use]
pub fn expert_content(
    key: ExpertKey,
    context: &ExpertContext,
    rule_results: Option<&RuleResults>,
    live_text: &str,
) -> String {
    if key == ExpertKey::Strategy {
        return live_text.to_string();
    }

    let mut content = website_context(context);
    if key == ExpertKey::Accessibility {
        if let Some(rules) = rule_results {
            let section = |title: &str, items: &[Value]| {
                format!(
                    "\n### {title} ###\n{}\n",
                    serde_json::to_string_pretty(items).unwrap_or_else(|_| "[]".to_string())
                )
            };
            content.push_str(&section("Automated Axe-Core Accessibility Violations", &rules.violations));
            content.push_str(&section("Axe-Core Passes (axePasses)", &rules.passes));
            content.push_str(&section("Axe-Core Incomplete Checks (axeIncomplete)", &rules.incomplete));
            content.push_str(&section("Axe-Core Inapplicable Rules (axeInapplicable)", &rules.inapplicable));
        }
    }
    content.push_str("\n### Live Website Text Content ###\n");
    content.push_str(live_text);
    content
}

const BASE_INSTRUCTION: &str = "You are a demanding website auditor. Audit the site from its screenshot(s) and text and fill every field of the requested JSON schema.

Rate every scored parameter from 1 (poor) to 10 (excellent): 1-4 major flaws, 5-6 functional but uninspired, 7-8 well executed, 9-10 outstanding.

Rules:
1. Infer the site's type and primary purpose first and let it guide the audit.
2. A parameter that does not apply gets Score 0 and a one-line Analysis saying why.
3. Exclude Score 0 parameters when averaging SectionScore and CategoryScore.
4. Every applicable parameter and critical issue cites at least one full sentence from the site.
5. Keep Analysis, Recommendation and KeyFinding to at most three sentences.
6. Populate Analysis, Confidence and KeyFinding for every Top 5 issue.";

const STRATEGY_INSTRUCTION: &str = "You are a UX strategist and domain analyst. Base the analysis only on the supplied Live Website Text Content, never on prior knowledge of the site.

- ExecutiveSummary: 7-8 lines in the form \"WHAT IS WORKING: ... WHAT IS NOT WORKING: ...\", each point with a short quoted citation. No introduction. Do not use the words website, site, platform, app or portal.
- PurposeAnalysis: the purpose of the site itself (the actions it wants visitors to take), with two or three sentences of key objectives.
- UserPersonas: three realistic personas, three or four sentences per narrative field.
- Score TrustSignalsAndCredibility, TargetAudienceAlignment, CompetitiveDifferentiation and CallToActionStrategy.";

const COMPETITOR_INSTRUCTION: &str = "You are a competitive analyst comparing a Primary website with a Competitor from their text and screenshots (primary first).

- Score every comparison parameter 1-10 for both sites with a one-sentence Analysis and a Winner of Primary, Competitor or Tie.
- CompetitorStrengths, PrimaryStrengths and Opportunities each contain exactly three specific, actionable items. Infer from best practice rather than leaving any list empty.
- Use High, Critical or Strategic for Impact.";

const RERANK_INSTRUCTION: &str = "You are a Chief Product Strategist. Re-rank a list of critical issues found on a website by their impact on the site's primary purpose and its ability to serve its target audience.";

fn string_list() -> Value {
    json!({"type": "ARRAY", "items": {"type": "STRING"}})
}

fn confidence() -> Value {
    json!({"type": "STRING", "enum": ["high", "medium", "low"]})
}

/// A single critical issue. Expert lists omit `source`; the re-ranked list carries it.
fn critical_issue(with_source: bool) -> Value {
    let mut schema = json!({
        "type": "OBJECT",
        "properties": {
            "Issue": {"type": "STRING"},
            "ImpactLevel": {"type": "STRING"},
            "Score": {"type": "INTEGER"},
            "Recommendation": {"type": "STRING"},
            "Citations": string_list(),
            "Confidence": confidence(),
            "Analysis": {"type": "STRING"},
            "KeyFinding": {"type": "STRING"}
        },
        "required": ["Issue", "ImpactLevel", "Score", "Recommendation", "Citations", "Confidence", "Analysis", "KeyFinding"]
    });
    if with_source {
        schema["properties"]["source"] = json!({"type": "STRING"});
        if let Some(required) = schema["required"].as_array_mut() {
            required.push(json!("source"));
        }
    }
    schema
}

fn scored_section(parameters: &[&str]) -> Value {
    let mut name = json!({"type": "STRING"});
    if !parameters.is_empty() {
        name["enum"] = json!(parameters);
    }
    json!({
        "type": "OBJECT",
        "properties": {
            "SectionScore": {"type": "NUMBER"},
            "Parameters": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "ParameterName": name,
                        "Score": {"type": "INTEGER"},
                        "ImpactLevel": {"type": "STRING"},
                        "Confidence": confidence(),
                        "Analysis": {"type": "STRING"},
                        "Recommendation": {"type": "STRING"},
                        "Citations": string_list(),
                        "KeyFinding": {"type": "STRING"}
                    },
                    "required": ["ParameterName", "Score", "ImpactLevel", "Confidence", "Analysis", "Citations", "Recommendation", "KeyFinding"]
                }
            }
        },
        "required": ["SectionScore", "Parameters"]
    })
}

/// Object schema with every listed property required.
fn object_of(properties: Vec<(&str, Value)>) -> Value {
    let required: Vec<&str> = properties.iter().map(|(name, _)| *name).collect();
    let properties: serde_json::Map<String, Value> = properties
        .into_iter()
        .map(|(name, schema)| (name.to_string(), schema))
        .collect();
    json!({"type": "OBJECT", "properties": properties, "required": required})
}

fn category(top_field: &str, sections: Vec<(&str, Value)>) -> Value {
    let mut properties = vec![
        ("CategoryScore", json!({"type": "NUMBER"})),
        (top_field, json!({"type": "ARRAY", "items": critical_issue(false)})),
    ];
    properties.extend(sections);
    properties.push(("OverallRecommendations", string_list()));
    object_of(properties)
}

fn comparison_list() -> Value {
    json!({
        "type": "ARRAY",
        "items": object_of(vec![
            ("Parameter", json!({"type": "STRING"})),
            ("PrimaryScore", json!({"type": "INTEGER"})),
            ("CompetitorScore", json!({"type": "INTEGER"})),
            ("Analysis", json!({"type": "STRING"})),
            ("Winner", json!({"type": "STRING", "enum": ["Primary", "Competitor", "Tie"]})),
        ])
    })
}

/// Axe rules echoed back for manual review or as not applicable.
fn rule_notes(with_nodes: bool) -> Value {
    let mut item = json!({
        "type": "OBJECT",
        "properties": {
            "id": {"type": "STRING"},
            "description": {"type": "STRING"}
        },
        "required": ["id", "description"]
    });
    if with_nodes {
        item["properties"]["nodes"] = string_list();
    }
    json!({"type": "ARRAY", "items": item})
}

fn strength_list() -> Value {
    json!({
        "type": "ARRAY",
        "items": object_of(vec![
            ("Strength", json!({"type": "STRING"})),
            ("Description", json!({"type": "STRING"})),
            ("Impact", json!({"type": "STRING"})),
        ])
    })
}

/// Compact built-in instructions and schemas.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinCatalog;

impl BuiltinCatalog {
    fn strategy_schema() -> Value {
        object_of(vec![
            ("ExecutiveSummary", json!({"type": "STRING"})),
            (
                "DomainAnalysis",
                object_of(vec![("Items", string_list()), ("Confidence", confidence())]),
            ),
            (
                "PurposeAnalysis",
                object_of(vec![
                    ("PrimaryPurpose", string_list()),
                    ("KeyObjectives", json!({"type": "STRING"})),
                    ("Confidence", confidence()),
                ]),
            ),
            (
                "TargetAudience",
                object_of(vec![
                    ("WebsiteType", json!({"type": "STRING"})),
                    ("Primary", string_list()),
                    ("DemographicsPsychographics", json!({"type": "STRING"})),
                    ("MarketSegmentation", json!({"type": "STRING"})),
                    ("Confidence", confidence()),
                ]),
            ),
            (
                "UserPersonas",
                json!({
                    "type": "ARRAY",
                    "items": object_of(vec![
                        ("Name", json!({"type": "STRING"})),
                        ("Age", json!({"type": "INTEGER"})),
                        ("Location", json!({"type": "STRING"})),
                        ("Occupation", json!({"type": "STRING"})),
                        ("UserNeedsBehavior", json!({"type": "STRING"})),
                        ("PainPointOpportunity", json!({"type": "STRING"})),
                    ])
                }),
            ),
            (
                "TrustSignalsAndCredibility",
                scored_section(&["SocialProofIntegration", "AuthorityMarkers", "SecurityAssurances", "BrandConsistency"]),
            ),
            (
                "TargetAudienceAlignment",
                scored_section(&["ContentRelevance", "ToneAndVoiceFit", "PainPointAddressing", "UserJourneyLogic"]),
            ),
            (
                "CompetitiveDifferentiation",
                scored_section(&["UniqueValueProposition", "FeatureDistinctiveness", "MarketPositioningClarity", "InnovationFactor"]),
            ),
            (
                "CallToActionStrategy",
                scored_section(&["CTAPlacement", "ActionOrientedCopy", "UrgencyAndIncentives", "FrictionReduction"]),
            ),
        ])
    }

    fn ux_schema() -> Value {
        category(
            "Top5CriticalUXIssues",
            vec![
                (
                    "UsabilityHeuristics",
                    scored_section(&[
                        "VisibilityOfSystemStatus",
                        "MatchBetweenSystemAndRealWorld",
                        "UserControlAndFreedom",
                        "ConsistencyAndStandards",
                        "ErrorPrevention",
                        "RecognitionVsRecall",
                        "FlexibilityAndEfficiencyOfUse",
                        "AestheticAndMinimalistDesign",
                        "HelpUsersRecoverFromErrors",
                        "HelpAndDocumentation",
                    ]),
                ),
                (
                    "UsabilityMetrics",
                    scored_section(&["TaskCompletionTime", "ClickDepth", "NavigationClarity", "CognitiveLoad", "ErrorRate"]),
                ),
                (
                    "AccessibilityCompliance",
                    scored_section(&["ContrastAndReadability", "KeyboardNavigation", "ScreenReaderCompatibility", "TouchTargetSize"]),
                ),
            ],
        )
    }

    fn product_schema() -> Value {
        category(
            "Top5CriticalProductIssues",
            vec![
                (
                    "MarketFitAndBusinessAlignment",
                    scored_section(&["ClearValueProposition", "OnboardingEffectiveness", "FeatureDiscoverability", "MonetizationModelClarity"]),
                ),
                (
                    "UserRetentionAndEngagement",
                    scored_section(&["GamificationIncentives", "PersonalizationAdaptability", "FrictionPoints", "UserFeedbackIteration"]),
                ),
                (
                    "ConversionOptimization",
                    scored_section(&["CTAClarityPlacement", "CheckoutPaymentFlow", "LeadGenerationForms", "MicrocopyMessaging"]),
                ),
            ],
        )
    }

    fn visual_schema() -> Value {
        category(
            "Top5CriticalVisualIssues",
            vec![
                (
                    "UIConsistencyAndBranding",
                    scored_section(&["ColorPaletteContrast", "TypographyReadability", "IconographySymbolism", "SpacingAlignment"]),
                ),
                (
                    "AestheticAndEmotionalAppeal",
                    scored_section(&["VisualHierarchy", "ImageryIllustrations", "AnimationMotionUI", "WhitespaceMinimalism"]),
                ),
                (
                    "ResponsivenessAndAdaptability",
                    scored_section(&["MobileOptimization", "DarkModeTheming", "ActualLoadTimeAndCoreWebVitals"]),
                ),
            ],
        )
    }

    fn accessibility_schema() -> Value {
        let mut schema = category(
            "Top5CriticalAccessibilityIssues",
            vec![
                (
                    "AutomatedCompliance",
                    scored_section(&[
                        "WCAG_A_Compliance",
                        "WCAG_AA_Compliance",
                        "BestPractices",
                        "ARIANavigation",
                        "ImageAltText",
                        "FormLabels",
                        "LinkPurpose",
                    ]),
                ),
                (
                    "ScreenReaderExperience",
                    scored_section(&["StructureAndHeadings", "AlternativeTextQuality", "KeyboardFlow", "AriaLiveUsage"]),
                ),
                (
                    "VisualAccessibility",
                    scored_section(&["ColorContrastRatios", "ResizableText", "FocusIndicators", "LayoutStability"]),
                ),
                ("PassedAudits", scored_section(&[])),
                ("ManualChecks", rule_notes(true)),
                ("NotApplicable", rule_notes(false)),
            ],
        );
        schema["properties"]["ComplianceScore"] = json!({"type": "NUMBER"});
        schema["properties"]["RiskLevel"] =
            json!({"type": "STRING", "enum": ["Critical", "High", "Moderate", "Low"]});
        if let Some(required) = schema["required"].as_array_mut() {
            required.push(json!("ComplianceScore"));
            required.push(json!("RiskLevel"));
        }
        schema
    }

    fn strategic_partition() -> Value {
        object_of(vec![
            ("ExecutiveSummary", json!({"type": "STRING"})),
            ("CompetitorStrengths", strength_list()),
            ("PrimaryStrengths", strength_list()),
            (
                "Opportunities",
                json!({
                    "type": "ARRAY",
                    "items": object_of(vec![
                        ("Opportunity", json!({"type": "STRING"})),
                        ("ActionPlan", json!({"type": "STRING"})),
                    ])
                }),
            ),
            ("StrategyComparison", comparison_list()),
            ("AccessibilityComparison", comparison_list()),
        ])
    }

    fn tactical_partition() -> Value {
        object_of(vec![
            ("UXComparison", comparison_list()),
            ("ProductComparison", comparison_list()),
            ("VisualComparison", comparison_list()),
        ])
    }
}

impl PromptCatalog for BuiltinCatalog {
    fn system_instruction(&self, key: ExpertKey, context: &ExpertContext) -> String {
        let multi_page = "\n- This is a multi-page audit. Identify patterns and inconsistencies across pages.";
        let no_mobile = "\n- The mobile screenshot capture FAILED. Infer mobile behavior from the desktop view and say that the mobile view was unavailable.";

        let mut specific = match key {
            ExpertKey::Strategy => return STRATEGY_INSTRUCTION.to_string(),
            ExpertKey::Competitor => return COMPETITOR_INSTRUCTION.to_string(),
            ExpertKey::Ux => String::from(
                "You are a UX Auditor evaluating usability and accessibility.\n- Ground ScreenReaderCompatibility in the Automated Accessibility Check data.",
            ),
            ExpertKey::Product => String::from(
                "You are a Product Auditor evaluating market fit, engagement and conversion.\n- Ground any load-time judgement in the performance metrics; if they could not be retrieved, score it 0 and say the check failed.",
            ),
            ExpertKey::Visual => String::from(
                "You are a Visual Designer evaluating aesthetics, branding and responsiveness.",
            ),
            ExpertKey::Accessibility => String::from(
                "You are an Accessibility Auditor judging WCAG 2.1 AA compliance from the axe-core results plus visual and structural review.\n- Map each axe rule failure to the closest fixed parameter (e.g. image-alt to ImageAltText); if there are no violations, say so and stress manual verification.\n- Fill PassedAudits from the passes, ManualChecks from the incomplete checks and NotApplicable from the inapplicable rules.\n- ComplianceScore is passed / (passed + failed) * 100. RiskLevel is Critical with any critical violation, High with more than two serious, Moderate with more than two minor, else Low.\n- Every parameter carries a Recommendation and a citation of the failed rule or satisfied WCAG criterion, and every failure states its legal risk.",
            ),
        };

        if context.multi_page {
            specific.push_str(multi_page);
        }
        match key {
            ExpertKey::Ux if !context.mobile_captured => specific.push_str(no_mobile),
            ExpertKey::Visual if context.mobile_captured => specific
                .push_str("\n- Compare the desktop and mobile screenshots for MobileOptimization."),
            ExpertKey::Visual => specific.push_str(no_mobile),
            _ => {}
        }

        format!("{BASE_INSTRUCTION}\n\n{specific}")
    }

    fn schema(&self, key: ExpertKey) -> Value {
        match key {
            ExpertKey::Strategy => Self::strategy_schema(),
            ExpertKey::Ux => Self::ux_schema(),
            ExpertKey::Product => Self::product_schema(),
            ExpertKey::Visual => Self::visual_schema(),
            ExpertKey::Accessibility => Self::accessibility_schema(),
            ExpertKey::Competitor => {
                let mut merged = Self::strategic_partition();
                let tactical = Self::tactical_partition();
                if let (Some(props), Some(extra)) = (
                    merged["properties"].as_object_mut(),
                    tactical["properties"].as_object(),
                ) {
                    props.extend(extra.clone());
                }
                if let (Some(required), Some(extra)) =
                    (merged["required"].as_array_mut(), tactical["required"].as_array())
                {
                    required.extend(extra.iter().cloned());
                }
                merged
            }
        }
    }

    fn competitor_partitions(&self) -> Vec<SchemaPartition> {
        vec![
            SchemaPartition {
                focus: "FOCUS: Only the executive summary, strengths, opportunities, strategy and accessibility comparisons.".to_string(),
                schema: Self::strategic_partition(),
            },
            SchemaPartition {
                focus: "FOCUS: Only the UX, product and visual comparisons.".to_string(),
                schema: Self::tactical_partition(),
            },
        ]
    }

    fn rerank_instruction(&self) -> String {
        RERANK_INSTRUCTION.to_string()
    }

    fn rerank_schema(&self) -> Value {
        json!({"type": "ARRAY", "items": critical_issue(true)})
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::performance::PerformanceMetrics;

    fn required(schema: &Value) -> Vec<&str> {
        schema["required"]
            .as_array()
            .map(|keys| keys.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_expert_schemas_require_their_top_five_field() {
        let catalog = BuiltinCatalog;
        for key in ExpertKey::STANDARD {
            let schema = catalog.schema(key);
            assert_eq!(schema["type"], "OBJECT", "{key}");
            if let Some(field) = key.top_issues_field() {
                assert!(required(&schema).contains(&field), "{key} missing {field}");
                assert_eq!(schema["properties"][field]["type"], "ARRAY");
            }
        }
        assert!(required(&catalog.schema(ExpertKey::Strategy)).contains(&"PurposeAnalysis"));
    }

    #[test]
    fn test_competitor_partitions_are_disjoint_and_cover_the_schema() {
        let catalog = BuiltinCatalog;
        let partitions = catalog.competitor_partitions();
        assert_eq!(partitions.len(), 2);

        let first = required(&partitions[0].schema);
        let second = required(&partitions[1].schema);
        assert!(first.iter().all(|k| !second.contains(k)));

        let full = catalog.schema(ExpertKey::Competitor);
        let mut all: Vec<&str> = first.into_iter().chain(second).collect();
        all.sort_unstable();
        let mut expected = required(&full);
        expected.sort_unstable();
        assert_eq!(all, expected);
    }

    #[test]
    fn test_rerank_schema_is_issue_array_with_source() {
        let schema = BuiltinCatalog.rerank_schema();
        assert_eq!(schema["type"], "ARRAY");
        assert!(required(&schema["items"]).contains(&"source"));
        assert!(required(&BuiltinCatalog.schema(ExpertKey::Ux)["properties"]["Top5CriticalUXIssues"]["items"])
            .iter()
            .all(|k| *k != "source"));
    }

    #[test]
    fn test_instruction_variants() {
        let catalog = BuiltinCatalog;
        let mut context = ExpertContext {
            url: "https://example.com".to_string(),
            ..ExpertContext::default()
        };

        let ux = catalog.system_instruction(ExpertKey::Ux, &context);
        assert!(ux.contains("mobile screenshot capture FAILED"));
        assert!(!ux.contains("multi-page"));

        context.mobile_captured = true;
        context.multi_page = true;
        let visual = catalog.system_instruction(ExpertKey::Visual, &context);
        assert!(visual.contains("Compare the desktop and mobile"));
        assert!(visual.contains("multi-page"));

        assert!(!catalog
            .system_instruction(ExpertKey::Strategy, &context)
            .contains("multi-page"));
    }

    #[test]
    fn test_website_context_sections() {
        let context = ExpertContext {
            url: "https://example.com".to_string(),
            performance: Some(PerformanceReport {
                performance_data: Some(PerformanceMetrics {
                    lcp: "2.5 s".to_string(),
                    cls: "0.1".to_string(),
                    tbt: "120 ms".to_string(),
                    fcp: "1.0 s".to_string(),
                    tti: "3.0 s".to_string(),
                    si: "2.0 s".to_string(),
                }),
                error: None,
            }),
            animation_hints: Some(vec!["div.hero (animation: fade 1s)".to_string()]),
            heuristics: Some(AccessibilityHeuristics {
                images_missing_alt: 3,
                inputs_missing_labels: 1,
                has_semantic_elements: true,
                has_aria_attributes: false,
            }),
            multi_page: false,
            mobile_captured: true,
        };

        let text = website_context(&context);
        assert!(text.contains("- Website URL: https://example.com"));
        assert!(text.contains("Largest Contentful Paint: 2.5 s"));
        assert!(text.contains("- div.hero (animation: fade 1s)"));
        assert!(text.contains("Images without descriptive alt text: 3"));
        assert!(text.contains("(roles, properties): No"));
    }

    #[test]
    fn test_performance_failure_reason() {
        let context = ExpertContext {
            url: "https://example.com".to_string(),
            performance: Some(PerformanceReport {
                performance_data: None,
                error: Some("quota exceeded".to_string()),
            }),
            ..ExpertContext::default()
        };
        let text = website_context(&context);
        assert!(text.contains("could not be retrieved"));
        assert!(text.contains("Reason: quota exceeded"));
    }

    #[test]
    fn test_axe_results_only_reach_accessibility_expert() {
        let rules = RuleResults {
            violations: vec![json!({"id": "image-alt"})],
            ..RuleResults::default()
        };
        let context = ExpertContext::default();

        let a11y = expert_content(ExpertKey::Accessibility, &context, Some(&rules), "page text");
        assert!(a11y.contains("image-alt"));
        assert!(a11y.ends_with("### Live Website Text Content ###\npage text"));

        let ux = expert_content(ExpertKey::Ux, &context, Some(&rules), "page text");
        assert!(!ux.contains("image-alt"));

        assert_eq!(
            expert_content(ExpertKey::Strategy, &context, Some(&rules), "page text"),
            "page text"
        );
    }
}
