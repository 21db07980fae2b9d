//! Law-style checks over case ids, pipeline transitions, and the
//! comparator, exercising inputs no demo case happens to produce.

use evolink_runner::{
    compare, validate_transition, CaseDisposition, CaseId, CaseState, ExpectedOutcome,
};
use evolink_sandbox::Verdict;
use proptest::prelude::*;
use regex::Regex;
use std::time::Duration;

const ALL_STATES: [CaseState; 7] = [
    CaseState::Init,
    CaseState::BaselineCompiled,
    CaseState::ClientCompiled,
    CaseState::EvolvedCompiled,
    CaseState::Linked,
    CaseState::Executed,
    CaseState::Verdicted,
];

#[test]
fn verdicted_is_terminal_and_reachable_from_everywhere_else() {
    for from in ALL_STATES {
        for to in ALL_STATES {
            let legal = validate_transition(from, to);
            if from == CaseState::Verdicted {
                assert!(!legal, "{from:?} -> {to:?} must be illegal");
            }
            if to == CaseState::Verdicted && from != CaseState::Verdicted {
                assert!(legal, "{from:?} -> Verdicted must be legal");
            }
        }
    }
}

#[test]
fn forward_steps_are_adjacent_only() {
    for pair in ALL_STATES.windows(2) {
        assert!(validate_transition(pair[0], pair[1]), "{pair:?}");
    }
    assert!(!validate_transition(CaseState::Init, CaseState::ClientCompiled));
    assert!(!validate_transition(CaseState::Linked, CaseState::BaselineCompiled));
    assert!(!validate_transition(CaseState::Executed, CaseState::Linked));
}

fn any_expectation() -> impl Strategy<Value = ExpectedOutcome> {
    prop_oneof![
        "[a-z\\n]{0,16}".prop_map(|s| ExpectedOutcome::CompatibleRuntimeMatch { stdout: s }),
        Just(ExpectedOutcome::CompatibleLinkOnly),
        Just(ExpectedOutcome::IncompatibleLinkError {
            pattern: Regex::new("unresolved").expect("static pattern"),
        }),
        "[a-z\\n]{0,16}"
            .prop_map(|s| ExpectedOutcome::IncompatibleRuntimeBehaviorChange { stdout: s }),
    ]
}

proptest! {
    #[test]
    fn prop_infra_faults_override_every_expectation(expected in any_expectation()) {
        let verdict = Verdict::timed_out(Duration::from_secs(5));
        let disposition = compare(&verdict, &expected);
        let is_infra = matches!(disposition, CaseDisposition::Infra { .. });
        prop_assert!(is_infra);
    }

    #[test]
    fn prop_runtime_match_is_exact_equality(stdout in "[a-z\\n]{0,24}") {
        let expected = ExpectedOutcome::CompatibleRuntimeMatch { stdout: stdout.clone() };
        prop_assert!(compare(&Verdict::completed(0, stdout.clone(), vec![]), &expected).is_pass());
        let drifted = format!("{stdout}x");
        prop_assert!(!compare(&Verdict::completed(0, drifted, vec![]), &expected).is_pass());
    }

    #[test]
    fn prop_case_ids_are_stable_and_separator_free(
        stem in "[a-z][a-zA-Z0-9]{0,8}([-_ ][a-z][a-zA-Z0-9]{0,8}){0,3}"
    ) {
        let id = CaseId::from_stem(&stem);
        prop_assert!(!id.as_str().chars().any(|c| "-_ .".contains(c)));
        prop_assert_eq!(CaseId::from_stem(id.as_str()), id);
    }
}
