use kotoba_srs::interval_table::{IntervalTable, MAX_LEVEL, MIN_LEVEL, UNSEEN_LEVEL};
use kotoba_srs::spaced_repetition::{Outcome, ReviewScheduler};
use std::env;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() != 2 {
        eprintln!("Usage: {} <level>", args[0]);
        eprintln!();
        eprintln!("Shows where an answer moves an item at <level> and when it is due next.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  <level>  Current level, 0 (unseen) to {}", MAX_LEVEL);
        eprintln!();
        eprintln!("Example: {} 3", args[0]);
        std::process::exit(1);
    }

    let level: i64 = match args[1].parse() {
        Ok(level) => level,
        Err(_) => {
            eprintln!("Error: '{}' is not a level", args[1]);
            std::process::exit(1);
        }
    };

    let intervals = IntervalTable::default();
    println!("{}", level_summary(level, &intervals));

    for outcome in [Outcome::Correct, Outcome::Incorrect] {
        let next = ReviewScheduler::next_level(level, outcome);
        println!(
            "  {:<9} -> level {} (next review in {})",
            outcome.as_str(),
            next,
            describe(intervals.interval(next))
        );
    }
}

fn level_summary(level: i64, intervals: &IntervalTable) -> String {
    if level == UNSEEN_LEVEL {
        format!("Level {}: unseen, never due", level)
    } else if (MIN_LEVEL..=MAX_LEVEL).contains(&level) {
        format!(
            "Level {}: due {} after the last review",
            level,
            describe(intervals.interval(level))
        )
    } else {
        format!("Level {}: out of range, never due", level)
    }
}

fn describe(interval: chrono::Duration) -> String {
    if interval.num_days() > 0 {
        format!("{} days", interval.num_days())
    } else if interval.num_hours() > 0 {
        format!("{} hours", interval.num_hours())
    } else {
        format!("{} minutes", interval.num_minutes())
    }
}
