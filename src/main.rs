use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};

use feb_scout::consolidate::{ConsolidateOptions, consolidate};
use feb_scout::db;
use feb_scout::matcher;

fn main() -> Result<()> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let Some(command) = args.first().filter(|a| !a.starts_with("--")).cloned() else {
        print_usage();
        return Ok(());
    };
    let rest = &args[1..];
    let db_path = flag_value(rest, "--db")
        .map(PathBuf::from)
        .unwrap_or_else(db::default_db_path);

    match command.as_str() {
        "generate" => cmd_generate(&db_path, rest),
        "consolidate" => cmd_consolidate(&db_path, rest),
        "list-candidates" => cmd_list_candidates(&db_path, rest),
        "profile" => cmd_profile(&db_path, rest),
        "matches" => cmd_matches(&db_path, rest),
        "validate" => cmd_validate(&db_path, rest),
        "stats" => cmd_stats(&db_path, rest),
        "potential" => cmd_potential(&db_path, rest),
        other => {
            print_usage();
            bail!("unknown command {other}")
        }
    }
}

fn print_usage() {
    println!("feb_scout — player identity resolution for scraped federation stats");
    println!();
    println!("Usage: feb_scout <command> [--db PATH] [options]");
    println!();
    println!("Commands (generate/consolidate/stats also accept --json):");
    println!("  generate         [--min-score 0.50]            score and persist candidate pairs");
    println!("  consolidate      [--min-score 0.85] [--use-confirmed]");
    println!("                                                 rebuild identity groups");
    println!("  list-candidates  [--min-score 0.70] [--limit 50]");
    println!("  profile          <profile_id>                  show one profile in detail");
    println!("  matches          <profile_id> [--min-score 0.30] [--limit 20]");
    println!("  validate         <candidate_id> <status> [--notes TEXT]");
    println!("                                                 status: confirmed|rejected|unsure");
    println!("  stats                                          validation status counts");
    println!("  potential        [--min-score 0.60] [--limit 50]");
}

fn cmd_generate(db_path: &Path, args: &[String]) -> Result<()> {
    let min_score = flag_f64(args, "--min-score")?.unwrap_or(0.50);
    let mut conn = db::open_db(db_path)?;
    let summary = matcher::generate_candidates(&mut conn, min_score)?;

    if has_flag(args, "--json") {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }
    println!("Candidate generation complete");
    println!("DB: {}", db_path.display());
    println!("Profiles: {}", summary.profiles_seen);
    println!("Blocks: {}", summary.blocks);
    println!("Pairs scored: {}", summary.pairs_scored);
    println!("Candidates inserted: {}", summary.candidates_inserted);
    Ok(())
}

fn cmd_consolidate(db_path: &Path, args: &[String]) -> Result<()> {
    let opts = ConsolidateOptions {
        use_confirmed: has_flag(args, "--use-confirmed"),
        min_score: flag_f64(args, "--min-score")?.unwrap_or(0.85),
    };
    let mut conn = db::open_db(db_path)?;
    let summary = consolidate(&mut conn, opts)?;

    if has_flag(args, "--json") {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }
    println!("Consolidation complete");
    println!("DB: {}", db_path.display());
    println!("Profiles processed: {}", summary.profiles_processed);
    println!("Groups created: {}", summary.groups_created);
    println!("Profiles consolidated: {}", summary.profiles_consolidated);
    println!("Multi-profile groups: {}", summary.multi_profile_groups);
    Ok(())
}

fn cmd_list_candidates(db_path: &Path, args: &[String]) -> Result<()> {
    let min_score = flag_f64(args, "--min-score")?.unwrap_or(0.70);
    let limit = flag_usize(args, "--limit")?.unwrap_or(50);
    let conn = db::open_db(db_path)?;
    let candidates = matcher::high_confidence_candidates(&conn, min_score, limit)?;

    println!(
        "Pending candidates with score >= {min_score:.2}: {}",
        candidates.len()
    );
    for (idx, cand) in candidates.iter().enumerate() {
        println!(
            "{}. [score {:.3}] candidate {} ({})",
            idx + 1,
            cand.candidate_score,
            cand.candidate_id,
            cand.confidence_level,
        );
        for side in [&cand.side_1, &cand.side_2] {
            println!(
                "   profile {}: {} | team {} | season {} | born {}",
                side.profile_id,
                side.name_raw,
                side.team_code.as_deref().unwrap_or("n/a"),
                side.season.as_deref().unwrap_or("n/a"),
                opt_i32(side.birth_year),
            );
        }
        println!(
            "   components: name {:.2} age {:.2} team {:.2} timeline {:.2}",
            cand.breakdown.name_match,
            cand.breakdown.age_match,
            cand.breakdown.team_overlap,
            cand.breakdown.timeline_fit,
        );
    }
    Ok(())
}

fn cmd_profile(db_path: &Path, args: &[String]) -> Result<()> {
    let profile_id = positional_i64(args, 0).context("usage: profile <profile_id>")?;
    let conn = db::open_db(db_path)?;
    let Some(detail) = db::profile_detail(&conn, profile_id)? else {
        bail!("profile {profile_id} not found");
    };

    let p = &detail.profile;
    println!("Profile {}", p.profile_id);
    println!("Name: {}", p.name_raw);
    println!("Normalized: {}", p.name_normalized);
    println!("Team: {}", p.team_code.as_deref().unwrap_or("n/a"));
    println!("Season: {}", p.season.as_deref().unwrap_or("n/a"));
    println!("Born: {}", opt_i32(p.birth_year));
    println!("Dorsal: {}", opt_i32(p.dorsal));
    match (p.is_consolidated, p.consolidated_player_id) {
        (true, Some(id)) => println!("Consolidated: yes (player {id})"),
        _ => println!("Consolidated: no"),
    }
    println!(
        "Games: {}",
        detail
            .games_played
            .map_or("n/a".to_string(), |v| v.to_string())
    );
    println!("Avg minutes: {}", opt_f64(detail.avg_minutes));
    println!("Avg points: {}", opt_f64(detail.avg_points));
    println!("Avg valuation: {}", opt_f64(detail.avg_valuation));
    println!(
        "Performance tier: {}",
        detail.performance_tier.as_deref().unwrap_or("n/a")
    );
    println!("Potential: {}", opt_f64(detail.potential_score));
    println!(
        "Potential tier: {}",
        detail.potential_tier.as_deref().unwrap_or("n/a")
    );
    println!(
        "Young talent: {}",
        if detail.is_young_talent { "yes" } else { "no" }
    );
    Ok(())
}

fn cmd_matches(db_path: &Path, args: &[String]) -> Result<()> {
    let profile_id = positional_i64(args, 0).context("usage: matches <profile_id>")?;
    let min_score = flag_f64(args, "--min-score")?.unwrap_or(0.30);
    let limit = flag_usize(args, "--limit")?.unwrap_or(20);
    let conn = db::open_db(db_path)?;
    let matches = matcher::find_candidate_matches(&conn, profile_id, min_score)?;

    println!(
        "Matches for profile {profile_id} with score >= {min_score:.2}: {}",
        matches.len()
    );
    for m in matches.iter().take(limit) {
        println!(
            "[score {:.3}] profile {} ({}): {} | team {} | season {} | born {}",
            m.candidate_score,
            m.profile_id,
            m.confidence_level.as_str(),
            m.name_raw,
            m.team_code.as_deref().unwrap_or("n/a"),
            m.season.as_deref().unwrap_or("n/a"),
            opt_i32(m.birth_year),
        );
    }
    if matches.len() > limit {
        println!("... and {} more", matches.len() - limit);
    }
    Ok(())
}

fn cmd_validate(db_path: &Path, args: &[String]) -> Result<()> {
    let candidate_id =
        positional_i64(args, 0).context("usage: validate <candidate_id> <status>")?;
    let status =
        positional(args, 1).ok_or_else(|| anyhow!("usage: validate <candidate_id> <status>"))?;
    let notes = flag_value(args, "--notes");

    let conn = db::open_db(db_path)?;
    if matcher::validate_candidate(&conn, candidate_id, status, "cli_user", notes)? {
        println!("Candidate {candidate_id} marked '{status}'");
        Ok(())
    } else {
        bail!(
            "could not validate candidate {candidate_id}: unknown id or invalid status \
             (expected confirmed|rejected|unsure)"
        )
    }
}

fn cmd_stats(db_path: &Path, args: &[String]) -> Result<()> {
    let conn = db::open_db(db_path)?;
    let stats = matcher::validation_stats(&conn)?;

    if has_flag(args, "--json") {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    println!("Validation status counts");
    for (status, count) in &stats.by_status {
        println!("{status}: {count}");
    }
    println!("total: {}", stats.total);
    Ok(())
}

fn cmd_potential(db_path: &Path, args: &[String]) -> Result<()> {
    let min_score = flag_f64(args, "--min-score")?.unwrap_or(0.60);
    let limit = flag_usize(args, "--limit")?.unwrap_or(50);
    let conn = db::open_db(db_path)?;
    let rows = db::profiles_by_potential(&conn, min_score, limit)?;

    println!("Profiles with potential >= {min_score:.2}: {}", rows.len());
    for (idx, row) in rows.iter().enumerate() {
        let talent = if row.is_young_talent {
            " [young talent]"
        } else {
            ""
        };
        println!(
            "{}. [{:.3}] {}{talent}",
            idx + 1,
            row.potential_score,
            row.name_raw,
        );
        println!(
            "   profile {} | team {} | season {} | born {} | avg pts {} | tier {}",
            row.profile_id,
            row.team_code.as_deref().unwrap_or("n/a"),
            row.season.as_deref().unwrap_or("n/a"),
            opt_i32(row.birth_year),
            opt_f64(row.avg_points),
            row.potential_tier.as_deref().unwrap_or("n/a"),
        );
    }
    Ok(())
}

fn flag_value<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg.strip_prefix(name).and_then(|r| r.strip_prefix('=')) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed);
            }
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.trim());
        }
    }
    None
}

fn has_flag(args: &[String], name: &str) -> bool {
    args.iter().any(|arg| arg == name)
}

fn flag_f64(args: &[String], name: &str) -> Result<Option<f64>> {
    flag_value(args, name)
        .map(|raw| {
            raw.parse::<f64>()
                .with_context(|| format!("{name} expects a number, got '{raw}'"))
        })
        .transpose()
}

fn flag_usize(args: &[String], name: &str) -> Result<Option<usize>> {
    flag_value(args, name)
        .map(|raw| {
            raw.parse::<usize>()
                .with_context(|| format!("{name} expects an integer, got '{raw}'"))
        })
        .transpose()
}

// Positional arguments: everything that is not a flag or a flag's value.
fn positional<'a>(args: &'a [String], index: usize) -> Option<&'a str> {
    let mut skip_next = false;
    let mut seen = 0usize;
    for arg in args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if let Some(rest) = arg.strip_prefix("--") {
            if !matches!(rest, "use-confirmed" | "json") && !rest.contains('=') {
                skip_next = true;
            }
            continue;
        }
        if seen == index {
            return Some(arg.as_str());
        }
        seen += 1;
    }
    None
}

fn positional_i64(args: &[String], index: usize) -> Result<i64> {
    let raw = positional(args, index).ok_or_else(|| anyhow!("missing argument"))?;
    raw.parse::<i64>()
        .with_context(|| format!("expected a numeric id, got '{raw}'"))
}

fn opt_i32(value: Option<i32>) -> String {
    value.map_or("n/a".to_string(), |v| v.to_string())
}

fn opt_f64(value: Option<f64>) -> String {
    value.map_or("n/a".to_string(), |v| format!("{v:.1}"))
}
