//! Target selection tests
//!
//! Exercises the router directly against a populated directory: explicit
//! targets, capability matching, keyword fallback, exclusions and the
//! latency tie-break.

use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use team_gateway::directory::{TeamDirectory, TeamRegistration};
use team_gateway::routing::{
    CandidateFinder, CapabilityMatchFinder, CapabilityRouter, KeywordFinder, RouteRequest,
    EXPLICIT_STRATEGY,
};

fn team(team_id: &str, capabilities: &[&str]) -> TeamRegistration {
    TeamRegistration::new(
        team_id,
        format!("{team_id} team"),
        format!("http://{team_id}.internal:9000"),
        "ops",
    )
    .with_capabilities(capabilities.iter().copied())
}

fn router_with(teams: Vec<TeamRegistration>) -> (Arc<TeamDirectory>, CapabilityRouter) {
    let directory = Arc::new(TeamDirectory::new());
    for registration in teams {
        directory.register(registration);
    }
    let router = CapabilityRouter::new(directory.clone(), KeywordFinder::default());
    (directory, router)
}

fn none() -> BTreeSet<String> {
    BTreeSet::new()
}

#[test]
fn test_explicit_target_wins_over_capabilities() {
    let (_directory, router) = router_with(vec![
        team("sales-1", &["sales"]),
        team("support-1", &["customer-support"]),
    ]);

    let request = RouteRequest::new("marketing-1", "anything")
        .to_team("support-1")
        .with_capabilities(["sales"]);
    let target = router.select(&request, &none()).unwrap();

    assert_eq!(target.team_id, "support-1");
    assert_eq!(target.strategy, EXPLICIT_STRATEGY);
    assert_eq!(target.task_url(), "http://support-1.internal:9000/task");
}

#[test]
fn test_unavailable_explicit_target_does_not_fall_back() {
    let (directory, router) = router_with(vec![team("a", &["sales"]), team("b", &["sales"])]);
    directory
        .update("a", |record| record.mark_degraded(Utc::now()))
        .unwrap();

    let request = RouteRequest::new("ops", "quote")
        .to_team("a")
        .with_capabilities(["sales"]);
    let err = router.select(&request, &none()).unwrap_err();

    assert_eq!(err.status_code(), 503);
    assert_eq!(err.team_id(), Some("a"));
}

#[test]
fn test_unknown_explicit_target_is_unavailable() {
    let (_directory, router) = router_with(vec![team("a", &["sales"])]);

    let err = router
        .select(&RouteRequest::new("ops", "quote").to_team("ghost"), &none())
        .unwrap_err();
    assert_eq!(err.status_code(), 503);
}

#[test]
fn test_all_required_capabilities_must_match() {
    let (_directory, router) = router_with(vec![
        team("a", &["crm"]),
        team("b", &["crm", "reporting"]),
        team("c", &["reporting"]),
    ]);

    let request = RouteRequest::new("ops", "quarterly numbers").with_capabilities(["crm", "reporting"]);
    let target = router.select(&request, &none()).unwrap();

    assert_eq!(target.team_id, "b");
    assert_eq!(target.strategy, "capability_match");
}

#[test]
fn test_fastest_team_is_preferred() {
    let (directory, router) = router_with(vec![team("a", &["crm"]), team("b", &["crm"])]);

    directory.update("a", |record| record.record_success(900.0)).unwrap();
    directory.update("b", |record| record.record_success(50.0)).unwrap();

    let target = router
        .select(&RouteRequest::new("ops", "x").with_capabilities(["crm"]), &none())
        .unwrap();
    assert_eq!(target.team_id, "b");
}

#[test]
fn test_latency_tie_breaks_by_team_id() {
    let (_directory, router) = router_with(vec![team("zeta", &["crm"]), team("alpha", &["crm"])]);

    let target = router
        .select(&RouteRequest::new("ops", "x").with_capabilities(["crm"]), &none())
        .unwrap();
    assert_eq!(target.team_id, "alpha");
}

#[test]
fn test_exclusions_from_request_and_caller_are_combined() {
    let (_directory, router) = router_with(vec![
        team("a", &["crm"]),
        team("b", &["crm"]),
        team("c", &["crm"]),
    ]);

    let request = RouteRequest::new("ops", "x")
        .with_capabilities(["crm"])
        .excluding("a");
    let caller_excluded: BTreeSet<String> = ["b".to_string()].into_iter().collect();

    let target = router.select(&request, &caller_excluded).unwrap();
    assert_eq!(target.team_id, "c");
}

#[test]
fn test_not_prefixed_capabilities_become_exclusions() {
    let (_directory, router) = router_with(vec![team("a", &["crm"]), team("b", &["crm"])]);

    let request = RouteRequest::new("ops", "x")
        .with_capabilities(["crm", "not:a"])
        .normalize();
    assert!(request.excluded_team_ids.contains("a"));
    assert_eq!(request.required_capabilities, vec!["crm"]);

    let target = router.select(&request, &none()).unwrap();
    assert_eq!(target.team_id, "b");
}

#[test]
fn test_keyword_fallback_when_no_capabilities_given() {
    let (_directory, router) = router_with(vec![
        team("support-1", &["customer-support"]),
        team("roadmap-1", &["roadmap"]),
    ]);

    let target = router
        .select(&RouteRequest::new("sales-1", "Customer needs SUPPORT with login"), &none())
        .unwrap();
    assert_eq!(target.team_id, "support-1");
    assert_eq!(target.strategy, "keyword_inference");
}

#[test]
fn test_keyword_fallback_when_capable_teams_are_unavailable() {
    let (directory, router) = router_with(vec![
        team("crm-1", &["crm"]),
        team("sales-1", &["sales"]),
    ]);
    directory
        .update("crm-1", |record| record.mark_unhealthy(Utc::now()))
        .unwrap();

    let request = RouteRequest::new("ops", "Prepare the sales pipeline").with_capabilities(["crm"]);
    let target = router.select(&request, &none()).unwrap();

    assert_eq!(target.team_id, "sales-1");
    assert_eq!(target.strategy, "keyword_inference");
}

#[test]
fn test_no_candidate_is_service_unavailable() {
    let (_directory, router) = router_with(vec![team("a", &["crm"])]);

    let err = router
        .select(&RouteRequest::new("ops", "nothing relevant").with_capabilities(["quantum"]), &none())
        .unwrap_err();
    assert_eq!(err.status_code(), 503);
    assert_eq!(err.kind(), "no_available_team");
    assert_eq!(err.team_id(), None);
}

#[test]
fn test_custom_finder_chain() {
    let directory = Arc::new(TeamDirectory::new());
    directory.register(team("a", &["crm"]));

    let router = CapabilityRouter::with_finders(
        directory,
        vec![Box::new(CapabilityMatchFinder) as Box<dyn CandidateFinder>],
    );

    // Keyword inference is not part of this chain
    let err = router
        .select(&RouteRequest::new("ops", "sales help"), &none())
        .unwrap_err();
    assert_eq!(err.status_code(), 503);
}

#[test]
fn test_configured_keyword_table_replaces_builtin() {
    let directory = Arc::new(TeamDirectory::new());
    directory.register(team("legal-1", &["contracts"]));
    directory.register(team("sales-1", &["sales"]));

    let mut table = BTreeMap::new();
    table.insert("NDA".to_string(), vec!["contracts".to_string()]);
    let router = CapabilityRouter::new(directory, KeywordFinder::from_config(&table));

    let target = router
        .select(&RouteRequest::new("ops", "Review this nda for sales"), &none())
        .unwrap();
    assert_eq!(target.team_id, "legal-1");
}
