//! Serve command - fetch the questions for the LIVE tube.

use console::style;
use tubeline::model::UserId;
use tubeline::scheduler::ContentSource;

use crate::error::CliError;
use crate::runner::{CliRunner, GlobalOptions};

/// Arguments for the serve command.
pub struct ServeArgs {
    pub user: String,
    pub json: bool,
}

/// Run the serve command.
pub fn run(options: &GlobalOptions, args: ServeArgs) -> Result<(), CliError> {
    let runner = CliRunner::new(options)?;
    runner.log_startup("serve");
    let scheduler = runner.scheduler()?;
    let user = UserId::new(args.user);

    runner.restore_content(&scheduler, &user)?;
    let served = runner.block_on(async {
        let served = scheduler.serve_live(&user).await?;
        // Let a refresh behind stale content finish so the next serve is fresh.
        if let Some(refresh) = scheduler.cache().pending_process(&user, served.content.tube) {
            let _ = scheduler.coordinator().wait(refresh).await;
        }
        Ok::<_, CliError>(served)
    })?;
    runner.save_content(&scheduler, &user)?;
    let content = &served.content;

    if args.json {
        let json = serde_json::to_string_pretty(content.as_ref())
            .map_err(|e| CliError::InvalidArgument(e.to_string()))?;
        println!("{}", json);
        return Ok(());
    }

    let source = match served.source {
        ContentSource::Ready => style(served.source.to_string()).green(),
        ContentSource::Stale => style(served.source.to_string()).yellow(),
        ContentSource::Emergency => style(served.source.to_string()).red(),
    };
    println!(
        "{} {} level {} ({}, {}s old)",
        style(content.tube).bold(),
        content.stitch_id,
        content.boundary_level,
        source,
        content.age().as_secs()
    );
    for (n, q) in content.questions.iter().enumerate() {
        println!(
            "  {:>2}. {:<20} {} / {}",
            n + 1,
            q.prompt,
            style(&q.correct_answer).green(),
            style(&q.distractor).dim()
        );
    }
    Ok(())
}
