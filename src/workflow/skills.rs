//! Mandatory-skill resolution table.
//!
//! A pure 2D lookup from (phase, work type) to an ordered list of skill
//! ids. Plan, Execute, and Review carry work-type-specific variants; every
//! other phase has a single phase-wide default. The match is exhaustive
//! over both enums, so adding a phase or work type without extending the
//! table is a compile error.

use super::{WorkType, WorkflowPhase};

/// Ordered skill ids required for a (phase, work type) combination.
/// May be empty.
pub fn skill_ids(phase: WorkflowPhase, work_type: WorkType) -> &'static [&'static str] {
    use WorkType as WT;
    use WorkflowPhase as WP;

    match phase {
        WP::Idle => &[],
        WP::Detect => &["project-detection", "framework-inventory"],
        WP::Classify => &["work-classification", "scope-estimation"],
        WP::Plan => match work_type {
            WT::Frontend => &["component-planning", "state-design", "accessibility-review"],
            WT::Backend => &["api-design", "data-modeling", "migration-planning"],
            WT::Fullstack => &["api-design", "component-planning", "contract-sync"],
            WT::Research => &["hypothesis-framing", "source-survey"],
            WT::General => &["task-breakdown"],
        },
        WP::Execute => match work_type {
            WT::Frontend => &[
                "component-implementation",
                "styling-conventions",
                "browser-testing",
            ],
            WT::Backend => &[
                "service-implementation",
                "database-access",
                "integration-testing",
            ],
            WT::Fullstack => &[
                "service-implementation",
                "component-implementation",
                "end-to-end-testing",
            ],
            WT::Research => &["prototype-spike", "benchmarking"],
            WT::General => &["implementation-hygiene"],
        },
        WP::Integrate => &["merge-discipline", "conflict-resolution"],
        WP::Review => match work_type {
            WT::Frontend => &["ui-review", "accessibility-review"],
            WT::Backend => &["api-review", "query-review"],
            WT::Fullstack => &["api-review", "ui-review"],
            WT::Research => &["findings-review"],
            WT::General => &["code-review"],
        },
        WP::Complete => &["retrospective"],
        WP::Research => &["source-survey", "note-taking"],
    }
}

/// Resolve the mandatory skills for a (phase, work type) combination.
pub fn resolve_skills(phase: WorkflowPhase, work_type: WorkType) -> Vec<String> {
    skill_ids(phase, work_type)
        .iter()
        .map(|s| s.to_string())
        .collect()
}
