use colored::Colorize;
use kotoba_srs::admission::{AdmissionController, AdmissionRequest, LearnNewQuota, LearnerTimezone};
use kotoba_srs::cli::{Args, Command};
use kotoba_srs::config::SchedulerConfig;
use kotoba_srs::database::Database;
use kotoba_srs::database_factory::{DatabaseConfig, DatabaseFactory};
use kotoba_srs::due_aggregation_service::{
    DueAggregationService, DueForOwner, DueForSet, LearnNewCandidates,
};
use kotoba_srs::error::SchedulerError;
use kotoba_srs::item::{ItemKind, ItemWithSrs};
use kotoba_srs::review_session::{ReviewApplied, ReviewSession, SessionSummary};
use kotoba_srs::spaced_repetition::{Outcome, SrsRecord};
use kotoba_srs::time_format::format_optional;
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::process::ExitCode;
use std::time::Duration;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionStep {
    item_id: i64,
    action: String,
    #[serde(flatten)]
    applied: ReviewApplied,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionReport {
    set_id: i64,
    steps: Vec<SessionStep>,
    summary: SessionSummary,
    remaining: usize,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse_args();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> CliResult<()> {
    let override_date = args.validate_override_date()?;
    let fixed_now = args.validate_now()?;

    let db_config = DatabaseConfig::builder()
        .test_mode(args.test)
        .custom_path(args.db_path.as_ref().map(|p| p.to_string_lossy().into_owned()))
        .date_ymd(override_date)
        .fixed_now(fixed_now)
        .build();
    let db = DatabaseFactory::create(db_config)?;

    let config = SchedulerConfig::builder()
        .max_concurrency(args.max_concurrency)
        .fetch_timeout(Duration::from_millis(args.fetch_timeout_ms))
        .build();
    let scope = config.scope_or_default(args.scope.as_deref()).to_string();
    let now = db.current_time();
    debug!("Running {:?} at {} in scope '{}'", args.command, now, scope);

    match args.command.clone() {
        Command::Due { owner, count_only } => {
            let service = DueAggregationService::new(&db, config.scheduler(), config.aggregation.clone());
            let result = if count_only {
                service.due_count_for_owner(&owner, &scope, now).await?
            } else {
                service.due_for_owner(&owner, &scope, now).await?
            };
            emit(&args, &result, print_due_for_owner)
        }
        Command::DueSet { set_id } => {
            let service = DueAggregationService::new(&db, config.scheduler(), config.aggregation.clone());
            let result = service.due_for_set(set_id, &scope, now).await?;
            emit(&args, &result, |r| print_due_for_set(r, now))
        }
        Command::LearnNew { set_id, kind, limit } => {
            let kind = kind.as_deref().map(str::parse::<ItemKind>).transpose()?;
            let service = DueAggregationService::new(&db, config.scheduler(), config.aggregation.clone());
            let result = service.learn_new_candidates(set_id, &scope, kind, limit).await?;
            emit(&args, &result, print_candidates)
        }
        Command::Quota {
            set_id,
            kind,
            cap,
            requested,
            timezone,
        } => {
            let request = AdmissionRequest {
                set_id,
                kind: kind.parse()?,
                scope: scope.clone(),
                requested_count: requested,
                cap,
                as_of: now,
                timezone: Utc,
            };
            let learner_timezone: LearnerTimezone = timezone.parse()?;
            debug!("Counting today's entries in {:?}", learner_timezone);
            let controller = AdmissionController::new(&db);
            let quota = match learner_timezone {
                LearnerTimezone::Named(zone) => controller.admit(&request.in_timezone(zone))?,
                LearnerTimezone::Fixed(offset) => controller.admit(&request.in_timezone(offset))?,
            };
            emit(&args, &quota, |q| print_quota(q, requested))
        }
        Command::Review { item_id, outcome } => {
            let outcome: Outcome = outcome.parse()?;
            let mut session = ReviewSession::new(&db, config.scheduler(), &scope, std::iter::empty());
            let applied = session.apply_review(item_id, outcome, now)?;
            emit(&args, &applied, |a| print_applied(item_id, outcome.as_str(), a, now))
        }
        Command::Session { set_id, answers } => {
            let report = run_session(&db, &config, &scope, set_id, &answers, now).await?;
            emit(&args, &report, |r| print_session(r, now))
        }
        Command::Enter { item_id } => {
            let mut session = ReviewSession::new(&db, config.scheduler(), &scope, std::iter::empty());
            let applied = session.enter_cycle(item_id, now)?;
            emit(&args, &applied, |a| print_applied(item_id, "entered", a, now))
        }
        Command::CreateSet { owner, title, no_srs } => {
            let set_id = db.create_set(&owner, &title, !no_srs)?;
            info!("Created set {} '{}' for {}", set_id, title, owner);
            let set = db.get_set(set_id)?.ok_or(SchedulerError::SetNotFound(set_id))?;
            emit(&args, &set, |s| println!("Created set {} '{}'", s.id, s.title.bold()))
        }
        Command::AddItem {
            owner,
            kind,
            content,
            set,
        } => {
            let kind: ItemKind = kind.parse()?;
            let content: Map<String, Value> = serde_json::from_str(&content).map_err(SchedulerError::from)?;
            if let Some(set_id) = set {
                db.get_set(set_id)?.ok_or(SchedulerError::SetNotFound(set_id))?;
            }
            let item_id = db.insert_item(&owner, kind, &content)?;
            if let Some(set_id) = set {
                db.add_item_to_set(set_id, item_id)?;
            }
            info!("Created {} item {} for {}", kind, item_id, owner);
            let result = json!({ "id": item_id, "type": kind, "setId": set });
            emit(&args, &result, |_| println!("Created {} item {}", kind, item_id))
        }
    }
}

/// Runs a scripted session over the due items of a set. `retract` retracts
/// the answer given just before it.
async fn run_session(
    db: &Database,
    config: &SchedulerConfig,
    scope: &str,
    set_id: i64,
    answers: &[String],
    now: DateTime<Utc>,
) -> CliResult<SessionReport> {
    let service = DueAggregationService::new(db, config.scheduler(), config.aggregation.clone());
    let due = service.due_for_set(set_id, scope, now).await?;
    let mut session = ReviewSession::new(
        db,
        config.scheduler(),
        scope,
        due.items.iter().map(|item| item.item.id),
    );

    let mut steps = Vec::new();
    let mut last_answered: Option<i64> = None;
    for answer in answers {
        if answer.eq_ignore_ascii_case("retract") {
            let item_id = last_answered.ok_or("'retract' must follow an answer")?;
            let applied = session.retract(item_id)?;
            steps.push(SessionStep {
                item_id,
                action: "retract".to_string(),
                applied,
            });
            continue;
        }

        let outcome: Outcome = answer.parse()?;
        let Some(item_id) = session.next_item(now)? else {
            debug!("Session for set {} ran out of items", set_id);
            break;
        };
        let applied = session.apply_review(item_id, outcome, now)?;
        steps.push(SessionStep {
            item_id,
            action: outcome.to_string(),
            applied,
        });
        last_answered = Some(item_id);
    }

    info!(
        "Session on set {} finished: {} answered, {} retracted",
        set_id,
        session.summary().answered,
        session.summary().retracted
    );
    Ok(SessionReport {
        set_id,
        steps,
        summary: session.summary().clone(),
        remaining: session.remaining(),
    })
}

fn emit<T: Serialize>(args: &Args, value: &T, print_text: impl FnOnce(&T)) -> CliResult<()> {
    if args.text {
        print_text(value);
    } else {
        println!("{}", serde_json::to_string_pretty(value)?);
    }
    Ok(())
}

fn print_due_for_owner(result: &DueForOwner) {
    println!("{} {}", result.total_due.to_string().bold(), "items due".bold());
    for set in &result.by_set {
        println!("  {} (set {}): {}", set.set_title, set.set_id, set.due_count.to_string().yellow());
    }
    if let Some(items) = &result.items {
        for item in items {
            println!(
                "    #{} [{}] level {} in '{}'",
                item.id, item.kind, item.srs_level, item.set_title
            );
        }
    }
    for failure in &result.failed_sets {
        println!(
            "  {} {} (set {}): {}",
            "skipped".red(),
            failure.set_title,
            failure.set_id,
            failure.reason
        );
    }
}

fn print_item_line(item: &ItemWithSrs, now: DateTime<Utc>) {
    let level = SrsRecord::level_of(item.srs.as_ref());
    let since = item
        .srs
        .as_ref()
        .and_then(|record| record.time_created)
        .map(|t| format!(", reviewed {}", format_optional(now, Some(t))))
        .unwrap_or_default();
    println!("  #{} [{}] level {}{}", item.item.id, item.item.kind, level, since);
}

fn print_due_for_set(result: &DueForSet, now: DateTime<Utc>) {
    println!(
        "{}: {} due",
        result.set.title.bold(),
        result.items.len().to_string().yellow()
    );
    for item in &result.items {
        print_item_line(item, now);
    }
}

fn print_candidates(result: &LearnNewCandidates) {
    println!("{} new items available", result.items.len().to_string().bold());
    for item in &result.items {
        println!("  #{} [{}]", item.item.id, item.item.kind);
    }
}

fn print_quota(quota: &LearnNewQuota, requested: i64) {
    println!("Learned today: {}", quota.learned_today);
    let remaining = quota.remaining.to_string();
    if quota.remaining > 0 {
        println!("Remaining:     {}", remaining.green());
    } else {
        println!("Remaining:     {}", remaining.red());
    }
    if requested > 0 {
        println!("Admitted:      {} of {}", quota.admitted, requested);
    }
}

fn print_applied(item_id: i64, action: &str, applied: &ReviewApplied, now: DateTime<Utc>) {
    let arrow = if applied.new_level >= applied.previous_level {
        format!("{} -> {}", applied.previous_level, applied.new_level).green()
    } else {
        format!("{} -> {}", applied.previous_level, applied.new_level).red()
    };
    println!(
        "Item {} {}: level {}, next review {}",
        item_id,
        action,
        arrow,
        format_optional(now, applied.next_due_at)
    );
}

fn print_session(report: &SessionReport, now: DateTime<Utc>) {
    for step in &report.steps {
        print_applied(step.item_id, &step.action, &step.applied, now);
    }
    let summary = &report.summary;
    println!(
        "{} answered, {} correct, {} incorrect, {} retracted, {} left",
        summary.answered.to_string().bold(),
        summary.correct.to_string().green(),
        summary.incorrect.to_string().red(),
        summary.retracted,
        report.remaining
    );
}
