//! wildsim - Survival RPG ability & combat simulation prototype
//!
//! Runs survival scenarios headlessly: a player actor with an ability
//! loadout against mob spawns, scripted inputs standing in for the live
//! input layer, and a combat log as the artifact.

use wildsim::cli;
use wildsim::headless::{run_headless_scenario, ScenarioConfig};

fn main() {
    let args = cli::parse_args();

    let mut config = match &args.scenario {
        Some(path) => match ScenarioConfig::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error loading scenario: {e}");
                std::process::exit(1);
            }
        },
        None => ScenarioConfig::demo(),
    };

    if let Some(output) = &args.output {
        config.output_path = Some(output.display().to_string());
    }
    if let Some(max_duration) = args.max_duration {
        config.max_duration_secs = max_duration;
    }
    if let Some(seed) = args.seed {
        config.random_seed = Some(seed);
    }

    match run_headless_scenario(config) {
        Ok(result) => {
            println!(
                "Outcome: {} after {:.1}s (seed: {:?})",
                result.outcome, result.elapsed, result.random_seed
            );
            for actor in &result.actors {
                println!(
                    "  {} [{}]: {} ({:.0}/{:.0} HP)",
                    actor.name,
                    actor.kind,
                    if actor.survived { "alive" } else { "dead" },
                    actor.final_health,
                    actor.max_health
                );
            }
        }
        Err(e) => {
            eprintln!("Scenario failed: {e}");
            std::process::exit(1);
        }
    }
}
