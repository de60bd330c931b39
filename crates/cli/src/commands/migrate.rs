use eapproval_db::migrations;

use crate::commands::{with_migrated_pool, CommandResult};

pub fn run() -> CommandResult {
    let applied = with_migrated_pool("migrate", |pool| async move {
        migrations::applied_count(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))
    });

    match applied {
        Ok(count) => CommandResult::success(
            "migrate",
            format!("applied pending migrations ({count} recorded)"),
        ),
        Err(failure) => failure,
    }
}
