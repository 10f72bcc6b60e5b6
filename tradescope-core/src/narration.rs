//! Prompt rendering and structured-response parsing for narrated analyses
//!
//! Prompts carry the metrics with percentages at one decimal place, scores as
//! integers and counts as integers. Responses are JSON objects, optionally
//! wrapped in markdown code fences.
//!
//! No model transport lives here; callers send the prompt text wherever they
//! like and hand the reply to `parse_response`.

use crate::analysis::{AnalysisReport, DisruptionAnalysis};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// Placeholder content used when a comprehensive analysis cannot be parsed
pub const ANALYSIS_UNAVAILABLE: &str = "Analysis unavailable.";

/// Kind of prompt to render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    Stakeholder,
    Comprehensive,
    Followup,
    Disruption,
}

impl PromptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptKind::Stakeholder => "stakeholder",
            PromptKind::Comprehensive => "comprehensive",
            PromptKind::Followup => "followup",
            PromptKind::Disruption => "disruption",
        }
    }
}

/// Accept either a string or a list of strings (joined with "; ")
fn text_or_list<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum TextOrList {
        Text(String),
        List(Vec<String>),
    }

    Ok(match TextOrList::deserialize(deserializer)? {
        TextOrList::Text(s) => s,
        TextOrList::List(items) => items.join("; "),
    })
}

/// Role, interests and vulnerabilities of the person the analysis is for
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct StakeholderProfile {
    #[serde(deserialize_with = "text_or_list")]
    pub role_description: String,
    #[serde(deserialize_with = "text_or_list")]
    pub key_interests: String,
    #[serde(deserialize_with = "text_or_list")]
    pub critical_uses: String,
    #[serde(deserialize_with = "text_or_list")]
    pub supply_chain_vulnerabilities: String,
    #[serde(deserialize_with = "text_or_list")]
    pub supply_chain_concerns: String,
}

impl StakeholderProfile {
    /// Role description, or "the stakeholder" when none is known
    pub fn role(&self) -> &str {
        if self.role_description.trim().is_empty() {
            "the stakeholder"
        } else {
            &self.role_description
        }
    }
}

/// One titled section of narrated analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSection {
    pub title: String,
    pub content: String,
}

impl AnalysisSection {
    fn unavailable(title: &str) -> Self {
        AnalysisSection {
            title: title.to_string(),
            content: ANALYSIS_UNAVAILABLE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ComprehensiveAnalysis {
    pub trends_analysis: AnalysisSection,
    pub exporters_analysis: AnalysisSection,
    pub trade_balance_analysis: AnalysisSection,
    pub metrics_analysis: AnalysisSection,
}

impl ComprehensiveAnalysis {
    pub fn fallback() -> Self {
        ComprehensiveAnalysis {
            trends_analysis: AnalysisSection::unavailable("Import/Export Trends"),
            exporters_analysis: AnalysisSection::unavailable("Top Exporters"),
            trade_balance_analysis: AnalysisSection::unavailable("Trade Balance"),
            metrics_analysis: AnalysisSection::unavailable("Fragility Metrics"),
        }
    }

    /// Parse a model reply, substituting the fallback sections on failure
    pub fn parse_or_fallback(response: &str) -> Self {
        match parse_response(response) {
            Ok(analysis) => analysis,
            Err(e) => {
                tracing::warn!("comprehensive analysis unparseable, using fallback: {:#}", e);
                ComprehensiveAnalysis::fallback()
            }
        }
    }

    pub fn sections(&self) -> [&AnalysisSection; 4] {
        [
            &self.trends_analysis,
            &self.exporters_analysis,
            &self.trade_balance_analysis,
            &self.metrics_analysis,
        ]
    }
}

/// Prioritized issues, questions and next steps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct FollowUp {
    pub key_issues: Vec<String>,
    pub specific_questions: Vec<String>,
    pub next_steps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DisruptionNarrative {
    pub title: String,
    pub content: String,
    pub risk_assessment: String,
    pub concentration_assessment: String,
    pub resilience_assessment: String,
}

/// Body of the first markdown code fence (plain or json-tagged), or the
/// whole reply when it has none. Text around the fence is dropped.
pub fn strip_code_fences(response: &str) -> &str {
    let text = response.trim();
    let Some(open) = text.find("```") else {
        return text;
    };
    let body = &text[open + 3..];
    let body = body.strip_prefix("json").unwrap_or(body);
    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

/// Parse a model reply into `T`
pub fn parse_response<T: DeserializeOwned>(response: &str) -> Result<T> {
    let body = strip_code_fences(response);
    serde_json::from_str(body).with_context(|| {
        let preview: String = body.chars().take(80).collect();
        format!("failed to parse response as JSON: {}", preview)
    })
}

fn profile_json(profile: &StakeholderProfile) -> Result<String> {
    serde_json::to_string_pretty(profile).context("failed to serialize stakeholder profile")
}

/// Prompt asking for a stakeholder profile for `stakeholder` and `term`
pub fn stakeholder_prompt(term: &str, stakeholder: &str) -> String {
    format!(
        r#"Define the role, interests, and potential concerns of a '{stakeholder}' in the context of the supply chain for products related to '{term}'. Return ONLY a JSON object.

{{
    "role_description": "A concise description of the stakeholder's role.",
    "key_interests": "Stakeholder's primary interests related to the supply chain (e.g., cost, reliability, resilience, regulatory compliance).",
    "critical_uses": "Specific, critical ways the stakeholder uses products related to '{term}' in their operations. Be very specific.",
    "supply_chain_vulnerabilities": "Specific vulnerabilities in the supply chain of '{term}' that could directly impact the stakeholder, considering the 'critical_uses'.",
    "supply_chain_concerns": "List of concerns this stakeholder may have regarding supply chain disruptions or changes."
}}
"#
    )
}

fn or_na<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| v.to_string())
}

/// Prompt asking for the four-section analysis of `report`
pub fn comprehensive_prompt(report: &AnalysisReport, profile: &StakeholderProfile) -> Result<String> {
    let m = &report.metrics;
    let o = &report.aggregates.overview;
    let market = &report.reference_market;

    let (peak_year, peak_value) = match &o.peak_import {
        Some(p) => (p.year.to_string(), p.total_value),
        None => ("N/A".to_string(), 0.0),
    };
    let (leading, leading_value) = match &o.leading_supplier {
        Some(s) => (s.exporter.as_str(), s.total_value),
        None => ("N/A", 0.0),
    };
    let (deficit_year, deficit_value) = match &o.largest_deficit {
        Some(d) => (d.year.to_string(), d.total_value),
        None => ("N/A".to_string(), 0.0),
    };
    let top_exporters = m.top_exporters.iter().take(3).cloned().collect::<Vec<_>>().join(", ");
    let top_importers = m.top_importers.iter().take(3).cloned().collect::<Vec<_>>().join(", ");

    Ok(format!(
        r#"You are a seasoned supply chain risk consultant. Analyze the data and provide insights directly relevant to the defined stakeholder, {role}. Consider industry-specific factors.

Stakeholder Definition:
```json
{profile}
```

Your analysis MUST connect the data to the stakeholder's 'critical_uses' and 'supply_chain_vulnerabilities' as defined above.

Analyze supply chain data and return ONLY a JSON object:

```json
{{
    "trends_analysis": {{
        "title": "Import/Export Trends Analysis",
        "content": "Two paragraphs (6+ sentences each) analyzing trends. Connect the data to the stakeholder's critical uses and vulnerabilities. Quantify the impact whenever possible."
    }},
    "exporters_analysis": {{
        "title": "Top Exporters Analysis",
        "content": "Two paragraphs (6+ sentences each) analyzing top exporters. Connect to stakeholder concerns. Quantify risks."
    }},
    "trade_balance_analysis": {{
        "title": "Trade Balance Analysis",
        "content": "Two paragraphs (6+ sentences each). Connect trade balance trends to the stakeholder's interests. Quantify."
    }},
    "metrics_analysis": {{
        "title": "Supply Chain Fragility Metrics Analysis",
        "content": "Two paragraphs (6+ sentences). Analyze metrics and provide actionable recommendations for the stakeholder, considering their defined vulnerabilities. Quantify."
    }}
}}
```

DATA FOR ANALYSIS:

1. PRODUCT INFORMATION:
   - Product: Products related to {term}
   - Time Period: {time_range}

2. TRADE TRENDS:
   - Total {market} Imports: ${total_imports:.1}K
   - Total {market} Exports: ${total_exports:.1}K
   - Peak Import Year: {peak_year} (${peak_value:.1}K)
   - Trade Balance: ${balance:.1}K
   - Years Covered: {first_year} to {last_year}

3. TOP EXPORTERS TO {market}:
   - Leading Exporter: {leading} (${leading_value:.1}K)
   - Top 3 Exporters: {top_3_share:.1}% of total imports
   - Total Suppliers: {num_suppliers}

4. TRADE BALANCE METRICS:
   - Average Balance: ${average_balance:.1}K
   - Largest Deficit Year: {deficit_year} (${deficit_value:.1}K)
   - Recent Trend: {trend}

5. SUPPLY CHAIN METRICS:
   - Risk Score: {risk_score:.0}/100 ({risk_level} Risk)
   - Top Supplier Share: {top_supplier_share:.1}%
   - Top 3 Concentration: {top_3_concentration:.1}%
   - Supplier Count: {num_suppliers} suppliers from {global_suppliers} global options
   - Diversity Score: {diversity:.1}/100
   - Substitutability: {substitutability:.1}/100
   - Top Export Countries: {top_exporters}
   - Top Import Countries: {top_importers}
   - {market} Market Share: {market_share:.1}%
   - YoY Growth Rate: {yoy:.1}%
"#,
        role = profile.role(),
        profile = profile_json(profile)?,
        term = report.term,
        time_range = report.time_range,
        total_imports = o.total_imports,
        total_exports = o.total_exports,
        balance = o.total_exports - o.total_imports,
        first_year = or_na(o.first_year),
        last_year = or_na(o.last_year),
        top_3_share = o.top_3_supplier_share,
        num_suppliers = m.num_suppliers,
        average_balance = o.average_balance,
        trend = o.balance_trend.as_str(),
        risk_score = m.risk_score,
        risk_level = report.risk_level.label(),
        top_supplier_share = m.top_supplier_share,
        top_3_concentration = m.top_3_concentration,
        global_suppliers = m.global_supplier_count,
        diversity = m.diversity_score,
        substitutability = m.substitutability,
        market_share = m.us_market_share,
        yoy = m.yoy_growth,
    ))
}

/// Prompt asking for prioritized follow-up questions on a previous analysis
pub fn followup_prompt(
    analysis: &ComprehensiveAnalysis,
    profile: &StakeholderProfile,
) -> Result<String> {
    let analysis_json =
        serde_json::to_string_pretty(analysis).context("failed to serialize analysis")?;

    Ok(format!(
        r#"Given the initial supply chain analysis and stakeholder definition, identify key issues, formulate specific, prioritized questions (most important first), and suggest next steps. Return ONLY a JSON object.

Initial Analysis:
```json
{analysis_json}
```

Stakeholder Definition:
```json
{profile}
```

Desired JSON Output:
{{
    "key_issues": [
        "Summary of key vulnerability/opportunity 1 (most important).",
        "Summary of key vulnerability/opportunity 2.",
        "Summary of key vulnerability/opportunity 3."
    ],
    "specific_questions": [
        "A specific, data-answerable question about issue 1. Start with 'So what does this mean for...?' and relate it to the stakeholder's critical uses and vulnerabilities.",
        "A specific, data-answerable question about issue 2. Start with 'So what...?'",
        "A specific question about issue 3. Start with 'So what...?'"
    ],
    "next_steps": [
        "Concrete action to address issue 1.",
        "Concrete action to address issue 2.",
        "Concrete action to address issue 3."
    ]
}}
"#,
        profile = profile_json(profile)?,
    ))
}

/// Prompt asking how a supplier disruption affects the stakeholder
pub fn disruption_prompt(
    analysis: &DisruptionAnalysis,
    profile: &StakeholderProfile,
) -> Result<String> {
    let r = &analysis.report;
    let before = &r.baseline;
    let after = &r.disrupted;
    let d = &r.delta;

    Ok(format!(
        r#"Analyze the supply chain disruption and its impact specifically on the defined stakeholder. Return ONLY a JSON object.
Stakeholder Definition:
```json
{profile}
```

Desired JSON Structure:
{{
    "title": "Disruption Analysis: Impact of Removing {supplier} on {role}",
    "content": "Two paragraphs (6+ sentences each). Focus on the stakeholder-specific impacts, considering their 'critical_uses' and 'vulnerabilities'.",
    "risk_assessment": "One paragraph (3-4 sentences) analyzing risk score change for the stakeholder.",
    "concentration_assessment": "One paragraph (3-4 sentences) analyzing supplier concentration changes for the stakeholder.",
    "resilience_assessment": "One paragraph (3-4 sentences) on resilience, with stakeholder-specific mitigation suggestions."
}}

DISRUPTION DATA:
- Product: Products related to {term}
- Time Period: {time_range}
- Supplier Removed: {supplier} (${removed_value:.1}K, {removed_share:.1}% share)

BASE METRICS (BEFORE):
- Risk Score: {b_risk:.0}/100 ({b_level} Risk)
- Diversity Score: {b_div:.0}/100
- Substitutability: {b_sub:.0}/100
- Top Supplier Share: {b_top:.1}%
- Top 3 Concentration: {b_top3:.1}%
- Supplier Count: {b_count}
- {market} Market Share: {b_share:.1}%
- Trade Balance: ${b_balance:.1}K

DISRUPTED METRICS (AFTER):
- Risk Score: {a_risk:.0}/100 ({a_level} Risk) ({d_risk:+.1})
- Diversity Score: {a_div:.0}/100 ({d_div:+.1})
- Substitutability: {a_sub:.0}/100 ({d_sub:+.1})
- Top Supplier Share: {a_top:.1}% ({d_top:+.1}%)
- Top 3 Concentration: {a_top3:.1}% ({d_top3:+.1}%)
- Supplier Count: {a_count} ({d_count:+})
- {market} Market Share: {a_share:.1}% ({d_share:+.1}%)
- Trade Balance: ${a_balance:.1}K ({d_balance:+.1}K)
"#,
        profile = profile_json(profile)?,
        supplier = r.removed_supplier,
        role = profile.role(),
        term = analysis.term,
        time_range = analysis.time_range,
        market = r.reference_market,
        removed_value = r.removed_value,
        removed_share = r.removed_share,
        b_risk = before.risk_score,
        b_level = analysis.baseline_risk_level.label(),
        b_div = before.diversity_score,
        b_sub = before.substitutability,
        b_top = before.top_supplier_share,
        b_top3 = before.top_3_concentration,
        b_count = before.num_suppliers,
        b_share = before.us_market_share,
        b_balance = before.trade_balance,
        a_risk = after.risk_score,
        a_level = analysis.disrupted_risk_level.label(),
        a_div = after.diversity_score,
        a_sub = after.substitutability,
        a_top = after.top_supplier_share,
        a_top3 = after.top_3_concentration,
        a_count = after.num_suppliers,
        a_share = after.us_market_share,
        a_balance = after.trade_balance,
        d_risk = d.risk_score,
        d_div = d.diversity_score,
        d_sub = d.substitutability,
        d_top = d.top_supplier_share,
        d_top3 = d.top_3_concentration,
        d_count = d.num_suppliers,
        d_share = d.us_market_share,
        d_balance = d.trade_balance,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisSettings, Analyzer};
    use crate::record::{Product, TradeRecord};
    use crate::store::MemoryStore;

    fn analyzer() -> Analyzer<MemoryStore> {
        Analyzer::new(
            MemoryStore::new(
                vec![
                    TradeRecord::new(2022, "CHN", "USA", "9018", 50.0),
                    TradeRecord::new(2023, "MEX", "USA", "9018", 30.0),
                    TradeRecord::new(2023, "CAN", "USA", "9018", 20.0),
                    TradeRecord::new(2023, "USA", "CAN", "9018", 12.5),
                ],
                vec![Product::new("9018", "Medical instruments")],
            ),
            AnalysisSettings::default(),
        )
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```\n{}\n```  "), "{}");
        assert_eq!(strip_code_fences("  {} "), "{}");
        assert_eq!(
            strip_code_fences("Here you go:\n```json\n{\"a\": 1}\n```\nThanks"),
            "{\"a\": 1}"
        );
    }

    #[test]
    fn test_parse_stakeholder_profile_accepts_lists() {
        let reply = r#"```json
        {
            "role_description": "Hospital buyer",
            "supply_chain_concerns": ["price volatility", "recalls"]
        }
        ```"#;
        let profile: StakeholderProfile = parse_response(reply).unwrap();
        assert_eq!(profile.role(), "Hospital buyer");
        assert_eq!(profile.supply_chain_concerns, "price volatility; recalls");
        assert!(profile.key_interests.is_empty());
    }

    #[test]
    fn test_parse_error_mentions_preview() {
        let err = parse_response::<FollowUp>("not json at all").unwrap_err();
        assert!(err.to_string().contains("not json"));
    }

    #[test]
    fn test_comprehensive_fallback() {
        let analysis = ComprehensiveAnalysis::parse_or_fallback("the model rambled");
        assert_eq!(analysis, ComprehensiveAnalysis::fallback());
        assert!(analysis
            .sections()
            .iter()
            .all(|s| s.content == ANALYSIS_UNAVAILABLE));
    }

    #[test]
    fn test_comprehensive_prompt_formats_metrics() {
        let report = analyzer().analyze("medical").unwrap();
        let prompt = comprehensive_prompt(&report, &StakeholderProfile::default()).unwrap();
        assert!(prompt.contains("Products related to medical"));
        assert!(prompt.contains("Time Period: Past 5 Years"));
        assert!(prompt.contains("Risk Score: 62/100 (Moderate Risk)"));
        assert!(prompt.contains("Top Supplier Share: 50.0%"));
        assert!(prompt.contains("Supplier Count: 3 suppliers"));
        assert!(prompt.contains("Total USA Imports: $100.0K"));
        // Balance is exports minus imports
        assert!(prompt.contains("Trade Balance: $-87.5K"));
        assert!(prompt.contains("insights directly relevant to the defined stakeholder, the stakeholder."));
    }

    #[test]
    fn test_disruption_prompt_signs_deltas() {
        let result = analyzer().simulate_disruption("medical", None).unwrap();
        let profile = StakeholderProfile {
            role_description: "Hospital buyer".to_string(),
            ..StakeholderProfile::default()
        };
        let prompt = disruption_prompt(&result, &profile).unwrap();
        assert!(prompt.contains("Impact of Removing CHN on Hospital buyer"));
        assert!(prompt.contains("Supplier Removed: CHN ($50.0K, 50.0% share)"));
        assert!(prompt.contains("Risk Score: 48/100 (High Risk) (-14.0)"));
        assert!(prompt.contains("Supplier Count: 2 (-1)"));
        assert!(prompt.contains("Top Supplier Share: 60.0% (+10.0%)"));
    }

    #[test]
    fn test_followup_prompt_embeds_analysis() {
        let prompt = followup_prompt(
            &ComprehensiveAnalysis::fallback(),
            &StakeholderProfile::default(),
        )
        .unwrap();
        assert!(prompt.contains("\"trends_analysis\""));
        assert!(prompt.contains(ANALYSIS_UNAVAILABLE));
        assert!(prompt.contains("\"next_steps\""));
    }

    #[test]
    fn test_stakeholder_prompt() {
        let prompt = stakeholder_prompt("insulin", "pharmacy chain");
        assert!(prompt.contains("a 'pharmacy chain'"));
        assert!(prompt.contains("products related to 'insulin'"));
        assert_eq!(PromptKind::Followup.as_str(), "followup");
    }
}
