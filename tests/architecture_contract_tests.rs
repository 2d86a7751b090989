//! Architecture contract tests.

mod support;

use support::architecture::{
    find_lines_containing, find_non_export_lines_in_mod_files, path_exists,
};

#[test]
fn domain_has_no_runtime_or_outer_layer_imports() {
    let hits = find_lines_containing(
        "src/domain",
        &[
            "crate::adapter",
            "crate::infrastructure",
            "crate::application",
            "crate::port",
            "tokio::",
            "tokio_util::",
            "tracing::",
        ],
    );

    assert!(
        hits.is_empty(),
        "found forbidden imports in domain layer: {hits:#?}"
    );
}

#[test]
fn application_does_not_depend_on_adapters_or_infrastructure() {
    let hits = find_lines_containing(
        "src/application",
        &["crate::adapter", "crate::infrastructure"],
    );

    assert!(
        hits.is_empty(),
        "application layer reaches into outer layers: {hits:#?}"
    );
}

#[test]
fn ports_only_depend_on_domain_and_errors() {
    let hits = find_lines_containing(
        "src/port",
        &[
            "crate::adapter",
            "crate::application",
            "crate::infrastructure",
        ],
    );

    assert!(hits.is_empty(), "port layer has outer imports: {hits:#?}");
}

#[test]
fn process_adapter_goes_through_service_port() {
    let hits = find_lines_containing(
        "src/adapter/outbound",
        &["crate::application", "crate::infrastructure"],
    );

    assert!(
        hits.is_empty(),
        "outbound adapters should only see ports and domain: {hits:#?}"
    );
}

#[test]
fn mod_rs_is_export_only() {
    let violations = find_non_export_lines_in_mod_files("src");
    assert!(
        violations.is_empty(),
        "found non-export content in mod.rs files: {violations:#?}"
    );
}

#[test]
fn orchestrator_phases_live_in_application_layer() {
    for phase in ["startup", "recovery", "shutdown"] {
        let path = format!("src/application/orchestrator/{phase}.rs");
        assert!(path_exists(&path), "missing orchestrator phase {path}");
    }
    assert!(path_exists("src/application/orchestrator.rs"));
}

#[test]
fn no_unwrap_in_production_code() {
    let mut hits = find_lines_containing("src", &[".unwrap()", ".expect("]);
    hits.retain(|(path, _, _)| !path.starts_with("src/testkit/"));

    assert!(
        hits.is_empty(),
        "found unwrap/expect outside tests: {hits:#?}"
    );
}

