//! Run summary output

use colored::*;

use slipway_core::pipeline::{ArtifactOutcome, RepoReport, RunReport};

/// Prints the per-repository outcomes and the run totals.
pub fn print_summary(run: &RunReport) {
    println!();
    println!("{}", "Run summary".bold());

    for repo in &run.repositories {
        print_repository(repo);
    }

    let published = run.published();
    let failed = run.failed();
    println!();
    if failed == 0 {
        println!(
            "{}",
            format!("✓ {} artifacts published", published).green().bold()
        );
    } else {
        println!(
            "{}",
            format!("✗ {} artifacts published, {} failures", published, failed)
                .red()
                .bold()
        );
    }
}

fn print_repository(repo: &RepoReport) {
    let marker = if repo.succeeded() {
        "✓".green().bold()
    } else {
        "✗".red().bold()
    };
    println!(
        "{} {} {}",
        marker,
        repo.name.bold(),
        format!("({:.1?})", repo.duration).dimmed()
    );

    if let Some(error) = &repo.error {
        println!("    {}", error.red());
        return;
    }

    for artifact in &repo.artifacts {
        match &artifact.outcome {
            ArtifactOutcome::Published { artifact: path } => {
                println!(
                    "    {} {}",
                    artifact.builder_key.cyan(),
                    path.display().to_string().dimmed()
                );
            }
            ArtifactOutcome::Skipped { reason } => {
                println!(
                    "    {} {}",
                    artifact.builder_key.cyan(),
                    format!("skipped: {}", reason).yellow()
                );
            }
            ArtifactOutcome::Failed { stage, message } => {
                println!(
                    "    {} {}",
                    artifact.builder_key.cyan(),
                    format!("{} failed: {}", stage, message).red()
                );
            }
        }
    }
}
