//! Golden responses in the shapes the service actually produces.

use pretty_assertions::assert_eq;
use vigil_core::analysis::build_prompt;
use vigil_core::verdict::VerdictBasis;
use vigil_core::{Verdict, VerdictSource, classify};

struct Golden {
    name: &'static str,
    text: &'static str,
    violation: bool,
}

const GOLDENS: &[Golden] = &[
    Golden {
        name: "plain labeled violation",
        text: "VERDICT: ×\nReason: YouTube is playing a gaming video.",
        violation: true,
    },
    Golden {
        name: "plain labeled compliance",
        text: "VERDICT: ○\nActivity: editing a spreadsheet.",
        violation: false,
    },
    Golden {
        name: "markdown bold marker",
        text: "Looking at both displays...\n\n**VERDICT:** ×\n**Reason:** Twitter timeline on Monitor2.",
        violation: true,
    },
    Golden {
        name: "heading marker",
        text: "## Verdict: ○\n\nActivity: reading API documentation",
        violation: false,
    },
    Golden {
        name: "full-width colon",
        text: "判定：×\n理由：ショッピングサイトを閲覧中",
        violation: true,
    },
    Golden {
        name: "bare leading glyph",
        text: "×\nThe user is browsing a shopping site.",
        violation: true,
    },
    Golden {
        name: "bare leading compliant glyph",
        text: "○\nThe user is writing code in an editor.",
        violation: false,
    },
    Golden {
        name: "refusal",
        text: "I'm sorry, I can't help with analyzing these images.",
        violation: false,
    },
    Golden {
        name: "keywords only",
        text: "There appears to be a possible violation: a game is open.",
        violation: false,
    },
    Golden {
        name: "self-contradicting",
        text: "VERDICT: ×\nActually, on second look the game is paused.\nVERDICT: ○",
        violation: false,
    },
];

#[test]
fn golden_responses() {
    for golden in GOLDENS {
        let result = classify(golden.text);
        assert_eq!(result.is_violation, golden.violation, "{}", golden.name);
    }
}

#[test]
fn echoed_prompt_is_not_a_violation() {
    let prompt = build_prompt("No games.", 2);
    let verdict = Verdict::from_response(prompt, VerdictSource::Cli);
    assert!(!verdict.is_violation);
    assert!(verdict.basis.is_ambiguous() || verdict.basis == VerdictBasis::LabeledSection);
}

#[test]
fn cli_output_with_noise_lines() {
    let text = "Loaded cached credentials.\nData collection is disabled.\nVERDICT: ×\nReason: Discord chat open";
    let verdict = Verdict::from_response(text.to_string(), VerdictSource::Cli);
    assert!(verdict.is_violation);
    assert_eq!(verdict.basis, VerdictBasis::LabeledSection);
    assert_eq!(verdict.source, VerdictSource::Cli);
}
