//! `vigil classify`: run the verdict classifier over saved text.

use std::path::PathBuf;

use clap::Parser;
use serde::Serialize;
use vigil_core::verdict::{VerdictBasis, classify};

use crate::exit_codes;

#[derive(Debug, Parser)]
pub struct ClassifyArgs {
    /// File holding the response text; stdin when omitted or `-`
    #[arg(value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Print only `violation` or `compliant`
    #[arg(long)]
    pub brief: bool,
}

#[derive(Debug, Serialize)]
struct ClassifyOutput<'a> {
    is_violation: bool,
    ambiguous: bool,
    basis: &'a VerdictBasis,
    display_text: &'a str,
}

pub(crate) async fn run_classify(args: ClassifyArgs) -> i32 {
    let text = match crate::read_input(args.file.as_deref()).await {
        Ok(text) => text,
        Err(err) => {
            eprintln!("Error: {err:#}");
            return exit_codes::FAILURE;
        }
    };

    let result = classify(&text);
    if args.brief {
        println!("{}", if result.is_violation { "violation" } else { "compliant" });
        return exit_codes::SUCCESS;
    }

    let output = ClassifyOutput {
        is_violation: result.is_violation,
        ambiguous: result.basis.is_ambiguous(),
        basis: &result.basis,
        display_text: &result.display_text,
    };
    match serde_json::to_string_pretty(&output) {
        Ok(json) => {
            println!("{json}");
            exit_codes::SUCCESS
        }
        Err(err) => {
            eprintln!("Error: failed to encode result: {err}");
            exit_codes::FAILURE
        }
    }
}
