//! `vigil levels`: the score → level table.

use clap::Parser;
use serde::Serialize;
use vigil_core::level::{LEVEL_TABLE, Resource, required_resources};
use vigil_core::{InterventionLevel, level_for};

use crate::exit_codes;

#[derive(Debug, Parser)]
pub struct LevelsArgs {
    /// Resolve a single score instead of printing the table
    #[arg(long, value_name = "N")]
    pub score: Option<u32>,

    /// Output as JSON for automation
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct LevelRow {
    min_score: u32,
    max_score: Option<u32>,
    level: InterventionLevel,
    resources: Vec<Resource>,
}

#[derive(Debug, Serialize)]
struct ScoreLevel {
    score: u32,
    level: InterventionLevel,
    resources: Vec<Resource>,
}

pub(crate) fn run_levels(args: LevelsArgs) -> i32 {
    match args.score {
        Some(score) => print_score(score, args.json),
        None => print_table(args.json),
    }
}

fn table_rows() -> Vec<LevelRow> {
    LEVEL_TABLE
        .iter()
        .enumerate()
        .map(|(i, spec)| LevelRow {
            min_score: spec.min_score,
            max_score: LEVEL_TABLE.get(i + 1).map(|next| next.min_score - 1),
            level: spec.level,
            resources: spec.resources.to_vec(),
        })
        .collect()
}

fn print_table(json: bool) -> i32 {
    let rows = table_rows();
    if json {
        return print_json(&rows);
    }
    println!("{:<10} {:<16} HOLDS", "SCORE", "LEVEL");
    for row in rows {
        let range = match row.max_score {
            Some(max) => format!("{}-{max}", row.min_score),
            None => format!("{}+", row.min_score),
        };
        println!(
            "{range:<10} {:<16} {}",
            row.level.label(),
            describe_resources(&row.resources)
        );
    }
    exit_codes::SUCCESS
}

fn print_score(score: u32, json: bool) -> i32 {
    let level = level_for(score);
    let resources = required_resources(level);
    if json {
        return print_json(&ScoreLevel {
            score,
            level,
            resources,
        });
    }
    println!("{score}: {} (holds: {})", level.label(), describe_resources(&resources));
    exit_codes::SUCCESS
}

fn describe_resources(resources: &[Resource]) -> String {
    if resources.is_empty() {
        return "-".to_string();
    }
    resources
        .iter()
        .map(Resource::label)
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_json<T: Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
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
