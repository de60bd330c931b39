use eapproval_db::repositories::SqlRequestRepository;
use eapproval_db::{DemoSeedDataset, SeedResult};

use crate::commands::{with_migrated_pool, CommandResult, StepFailure};

pub fn run(clean: bool) -> CommandResult {
    if clean {
        return run_clean();
    }

    let loaded = with_migrated_pool("seed", |pool| async move {
        let repo = SqlRequestRepository::new(pool);
        let seeded = DemoSeedDataset::load(&repo)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 6u8))?;
        let verification = DemoSeedDataset::verify(&repo)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 7u8))?;

        if !verification.all_present {
            return Err(("seed_verification", verification_message(&verification.checks), 7u8));
        }
        Ok::<_, StepFailure>(seeded)
    });

    match loaded {
        Ok(seeded) => CommandResult::success("seed", seed_message(&seeded)),
        Err(failure) => failure,
    }
}

fn run_clean() -> CommandResult {
    let removed = with_migrated_pool("seed", |pool| async move {
        let repo = SqlRequestRepository::new(pool);
        DemoSeedDataset::clean(&repo)
            .await
            .map_err(|error| ("seed_clean", error.to_string(), 6u8))
    });

    match removed {
        Ok(removed) => CommandResult::success("seed", format!("removed {removed} demo requests")),
        Err(failure) => failure,
    }
}

fn seed_message(seeded: &SeedResult) -> String {
    let lines: Vec<String> = seeded
        .requests_seeded
        .iter()
        .map(|request| format!("  - {}: {}", request.id, request.description))
        .collect();
    format!("demo requests loaded:\n{}", lines.join("\n"))
}

fn verification_message(checks: &[(&'static str, bool)]) -> String {
    let failed = checks
        .iter()
        .filter_map(|(check, passed)| (!passed).then_some(*check))
        .collect::<Vec<_>>();
    if failed.is_empty() {
        "some demo requests failed to load".to_string()
    } else {
        format!("demo request verification failed for: {}", failed.join(", "))
    }
}
