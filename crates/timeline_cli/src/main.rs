//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `timeline_core` linkage and schema bootstrap.
//! - Run one publish -> feed-read round against an in-memory database.
//! - Keep output deterministic apart from generated ids.

use log::error;
use std::process::ExitCode;
use timeline_core::{
    open_db_in_memory, Claim, ClaimPolicy, ClaimSet, CoreOptions, Mention, Post, Profile,
    SqliteFeedStore, SqliteProfileRepository, TimelineService,
};
use uuid::Uuid;

const DOMAIN: &str = "timeline.local";

fn main() -> ExitCode {
    println!("timeline_core ping={}", timeline_core::ping());
    println!("timeline_core version={}", timeline_core::core_version());

    if let Ok(log_dir) = std::env::var("TIMELINE_LOG_DIR") {
        let level = timeline_core::LogLevel::for_build();
        if let Err(err) = timeline_core::init_logging(level.as_str(), &log_dir) {
            eprintln!("logging disabled: {err}");
        }
    }

    match run_probe() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_probe module=cli status=error error={err}");
            eprintln!("probe failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run_probe() -> Result<(), Box<dyn std::error::Error>> {
    let conn = open_db_in_memory()?;
    println!(
        "timeline_core schema_version={}",
        timeline_core::db::migrations::schema_version(&conn)?
    );

    let options = CoreOptions::for_domain(DOMAIN);
    let author = Profile::new(Uuid::new_v4(), DOMAIN, "author");
    let mut reader = Profile::new(Uuid::new_v4(), DOMAIN, "reader");
    reader
        .audiences
        .insert(timeline_core::Audience::followers(author.id));

    let profiles = SqliteProfileRepository::new(&conn);
    profiles.save_profile(&author)?;
    profiles.save_profile(&reader)?;

    let service = TimelineService::new(
        SqliteFeedStore::new(&conn),
        profiles,
        ClaimPolicy::new(),
        &options,
    );

    let mut post = Post::draft(author.to_ref(), 1_000);
    post.published_at = Some(1_000);
    post.addressed_to.push(Mention::public());
    service
        .scoped(ClaimSet::new([Claim::subject(author.id)]))
        .handle_publish(&mut post)?;
    println!("timeline_core published audiences={}", post.audience.len());

    let page = service
        .scoped(ClaimSet::new([Claim::subject(reader.id)]))
        .get_feed(reader.id, i64::MAX, None)?;
    println!(
        "timeline_core feed entries={} applied_limit={}",
        page.len(),
        page.applied_limit
    );
    Ok(())
}
