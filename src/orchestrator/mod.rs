//! Orchestrator engine: the facade the dispatcher and the REST handlers
//! compose stages through.
//!
//! `run_evidence` and `run_report` resolve their missing prerequisites from
//! text, so single-stage REST calls behave like their full-pipeline
//! counterparts.

use crate::stages::{claims, pipeline, report, simulate};
use crate::types::{
    ClaimItem, EvidenceItem, Report, SimulateResponse, StrategyConfig,
};

/// Extract claims from text under the given strategy.
pub async fn run_claims(text: &str, strategy: Option<&StrategyConfig>) -> Vec<ClaimItem> {
    let max_claims = strategy.map(|s| s.max_claims);
    claims::extract_claims(text, max_claims).await
}

/// Retrieve evidence for claims, extracting claims from `text` first when
/// none were provided.
pub async fn run_evidence(
    text: Option<&str>,
    claims_input: Option<Vec<ClaimItem>>,
    strategy: Option<&StrategyConfig>,
) -> Vec<EvidenceItem> {
    let resolved = match claims_input {
        Some(claims) if !claims.is_empty() => claims,
        _ => run_claims(text.unwrap_or(""), strategy).await,
    };
    pipeline::retrieve_evidence(&resolved, strategy).await
}

/// Build the report, resolving claims and evidence as needed.
pub async fn run_report(
    text: Option<&str>,
    claims_input: Option<Vec<ClaimItem>>,
    evidences_input: Option<Vec<EvidenceItem>>,
    strategy: Option<&StrategyConfig>,
) -> Report {
    let resolved_claims = match claims_input {
        Some(claims) if !claims.is_empty() => claims,
        _ => run_claims(text.unwrap_or(""), strategy).await,
    };
    let resolved_evidences = match evidences_input {
        Some(evidences) => evidences,
        None => {
            let retrieved =
                pipeline::retrieve_evidence(&resolved_claims, strategy).await;
            pipeline::align_evidences(&resolved_claims, &retrieved, strategy).await
        }
    };
    report::build_report(&resolved_claims, &resolved_evidences, text.unwrap_or("")).await
}

/// Run the opinion simulation.
#[allow(clippy::too_many_arguments)]
pub async fn run_simulation(
    text: &str,
    time_window_hours: i64,
    platform: &str,
    comments: &[String],
    claims_input: Option<&[ClaimItem]>,
    evidences_input: Option<&[EvidenceItem]>,
    report_input: Option<&Report>,
) -> SimulateResponse {
    simulate::simulate_opinion(simulate::SimulationInput {
        text,
        claims: claims_input,
        evidences: evidences_input,
        report: report_input,
        time_window_hours,
        platform,
        comments,
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_evidence_resolves_claims_from_text() {
        let evidences = run_evidence(
            Some("某医院2026-01-02宣布感染率下降20%。官方通报称数据属实。"),
            None,
            None,
        )
        .await;
        // Search is disabled in tests, so each claim gets a placeholder row.
        assert!(!evidences.is_empty());
        assert!(evidences.iter().all(|e| e.evidence_id.starts_with('e')));
    }

    #[tokio::test]
    async fn test_run_report_end_to_end_rule_path() {
        let report = run_report(
            Some("震惊！内部消息称100%真实，必须立即转发。"),
            None,
            None,
            None,
        )
        .await;
        assert!(report.risk_score <= 100);
        assert!(!report.claim_reports.is_empty());
        assert!(!report.suspicious_points.is_empty());
    }
}
