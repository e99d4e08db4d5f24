use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use rayon::prelude::*;
use rusqlite::{Connection, params};
use serde::Serialize;

use crate::db::{self, PlayerProfile};
use crate::name_normalizer::name_similarity;

// Composite weights. Name dominates because it is the only signal present on
// every row; the rest are weak corroboration.
const WEIGHT_NAME_MATCH: f64 = 0.40;
const WEIGHT_AGE_MATCH: f64 = 0.30;
const WEIGHT_TEAM_OVERLAP: f64 = 0.20;
const WEIGHT_TIMELINE_FIT: f64 = 0.10;

// Confidence tier cutoffs, for human triage only.
const THRESHOLD_VERY_HIGH: f64 = 0.85;
const THRESHOLD_HIGH: f64 = 0.70;
const THRESHOLD_MEDIUM: f64 = 0.50;

// Neutral component scores when an optional signal is absent. Deliberately
// neither 0 nor 1 so a missing field cannot decide a pair on its own.
const NEUTRAL_AGE: f64 = 0.5;
const NEUTRAL_TEAM: f64 = 0.3;
const NEUTRAL_TIMELINE: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub name_match: f64,
    pub age_match: f64,
    pub team_overlap: f64,
    pub timeline_fit: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    VeryHigh,
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= THRESHOLD_VERY_HIGH {
            ConfidenceLevel::VeryHigh
        } else if score >= THRESHOLD_HIGH {
            ConfidenceLevel::High
        } else if score >= THRESHOLD_MEDIUM {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConfidenceLevel::VeryHigh => "very_high",
            ConfidenceLevel::High => "high",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStatus {
    Pending,
    Confirmed,
    Rejected,
    Unsure,
}

impl ValidationStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(ValidationStatus::Pending),
            "confirmed" => Some(ValidationStatus::Confirmed),
            "rejected" => Some(ValidationStatus::Rejected),
            "unsure" => Some(ValidationStatus::Unsure),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ValidationStatus::Pending => "pending",
            ValidationStatus::Confirmed => "confirmed",
            ValidationStatus::Rejected => "rejected",
            ValidationStatus::Unsure => "unsure",
        }
    }

    /// A reviewer can only move a candidate away from pending.
    pub fn is_human_decision(self) -> bool {
        !matches!(self, ValidationStatus::Pending)
    }
}

/// Composite similarity between two profiles with its component breakdown.
/// Symmetric, bounded to [0, 1], and never fails on missing optional fields.
pub fn score_pair(a: &PlayerProfile, b: &PlayerProfile) -> (f64, ScoreBreakdown) {
    let breakdown = ScoreBreakdown {
        name_match: name_similarity(&a.name_raw, &b.name_raw),
        age_match: age_match(a.birth_year, b.birth_year),
        team_overlap: team_overlap(a.team_code.as_deref(), b.team_code.as_deref()),
        timeline_fit: timeline_fit(a, b),
    };
    let composite = WEIGHT_NAME_MATCH * breakdown.name_match
        + WEIGHT_AGE_MATCH * breakdown.age_match
        + WEIGHT_TEAM_OVERLAP * breakdown.team_overlap
        + WEIGHT_TIMELINE_FIT * breakdown.timeline_fit;
    (composite.clamp(0.0, 1.0), breakdown)
}

fn age_match(year1: Option<i32>, year2: Option<i32>) -> f64 {
    let (Some(year1), Some(year2)) = (year1, year2) else {
        return NEUTRAL_AGE;
    };
    match (year1 - year2).abs() {
        0 => 1.0,
        // One year off is a common scraping error, two is already suspect.
        1 => 0.7,
        2 => 0.3,
        _ => 0.0,
    }
}

fn team_overlap(team1: Option<&str>, team2: Option<&str>) -> f64 {
    let (Some(team1), Some(team2)) = (team1, team2) else {
        return NEUTRAL_TEAM;
    };
    if team1 == team2 { 1.0 } else { 0.2 }
}

fn timeline_fit(a: &PlayerProfile, b: &PlayerProfile) -> f64 {
    let year1 = a.season.as_deref().and_then(season_start_year);
    let year2 = b.season.as_deref().and_then(season_start_year);
    let (Some(year1), Some(year2)) = (year1, year2) else {
        return NEUTRAL_TIMELINE;
    };
    match (year1 - year2).abs() {
        0 => {
            // Same season on two teams can be a mid-season transfer, unless
            // the birth years disagree as well.
            let conflicting_teams = matches!(
                (a.team_code.as_deref(), b.team_code.as_deref()),
                (Some(t1), Some(t2)) if t1 != t2
            );
            let cohort_mismatch = matches!(
                (a.birth_year, b.birth_year),
                (Some(y1), Some(y2)) if y1 != y2
            );
            if conflicting_teams && cohort_mismatch {
                0.4
            } else {
                0.8
            }
        }
        1 => 1.0,
        2 => 0.6,
        3 | 4 => 0.3,
        _ => 0.1,
    }
}

/// First year of a season label like "2023/24", "2023-24" or "2023".
pub fn season_start_year(season: &str) -> Option<i32> {
    season
        .split(['/', '-'])
        .next()?
        .trim()
        .parse::<i32>()
        .ok()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum BlockKey {
    NameInitial(char),
    SeasonTeam(String, String),
}

// Pairs worth scoring: profiles sharing a normalized-name initial or a
// season+team, deduplicated across blocks. Indices into the id-ordered
// profile slice, so i < j implies profile_id_1 < profile_id_2.
fn blocked_pairs(profiles: &[PlayerProfile]) -> (Vec<(usize, usize)>, usize) {
    let mut blocks: HashMap<BlockKey, Vec<usize>> = HashMap::new();
    for (idx, profile) in profiles.iter().enumerate() {
        if let Some(initial) = profile.name_normalized.chars().next() {
            blocks
                .entry(BlockKey::NameInitial(initial))
                .or_default()
                .push(idx);
        }
        if let (Some(season), Some(team)) = (&profile.season, &profile.team_code) {
            blocks
                .entry(BlockKey::SeasonTeam(season.clone(), team.clone()))
                .or_default()
                .push(idx);
        }
    }

    let block_count = blocks.len();
    let mut pairs = HashSet::new();
    for members in blocks.values() {
        for (pos, &i) in members.iter().enumerate() {
            for &j in &members[pos + 1..] {
                pairs.insert(if i < j { (i, j) } else { (j, i) });
            }
        }
    }

    let mut pairs = pairs.into_iter().collect::<Vec<_>>();
    pairs.sort_unstable();
    (pairs, block_count)
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateSummary {
    pub profiles_seen: usize,
    pub blocks: usize,
    pub pairs_scored: usize,
    pub candidates_inserted: usize,
}

/// Scores blocked profile pairs and persists those at or above `min_score`.
/// Existing pairs are left untouched, so re-running is additive and a partial
/// run can simply be re-invoked.
pub fn generate_candidates(conn: &mut Connection, min_score: f64) -> Result<GenerateSummary> {
    let profiles = db::load_profiles(conn)?;
    let (pairs, blocks) = blocked_pairs(&profiles);

    let scored = pairs
        .par_iter()
        .filter_map(|&(i, j)| {
            let (score, breakdown) = score_pair(&profiles[i], &profiles[j]);
            (score >= min_score).then_some((i, j, score, breakdown))
        })
        .collect::<Vec<_>>();

    let created_at = Utc::now().to_rfc3339();
    let tx = conn.transaction().context("begin candidate transaction")?;
    let mut inserted = 0usize;
    {
        let mut stmt = tx
            .prepare(
                r#"
                INSERT OR IGNORE INTO player_identity_candidates (
                    profile_id_1, profile_id_2,
                    name_match_score, age_match_score,
                    team_overlap_score, timeline_fit_score,
                    candidate_score, confidence_level, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .context("prepare candidate insert")?;
        for (i, j, score, breakdown) in &scored {
            let changed = stmt
                .execute(params![
                    profiles[*i].profile_id,
                    profiles[*j].profile_id,
                    breakdown.name_match,
                    breakdown.age_match,
                    breakdown.team_overlap,
                    breakdown.timeline_fit,
                    score,
                    ConfidenceLevel::from_score(*score).as_str(),
                    created_at,
                ])
                .context("insert candidate")?;
            inserted += changed;
        }
    }
    tx.commit().context("commit candidate transaction")?;

    Ok(GenerateSummary {
        profiles_seen: profiles.len(),
        blocks,
        pairs_scored: pairs.len(),
        candidates_inserted: inserted,
    })
}

#[derive(Debug, Clone)]
pub struct CandidateSide {
    pub profile_id: i64,
    pub name_raw: String,
    pub team_code: Option<String>,
    pub season: Option<String>,
    pub birth_year: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct CandidateReview {
    pub candidate_id: i64,
    pub candidate_score: f64,
    pub breakdown: ScoreBreakdown,
    pub confidence_level: String,
    pub validation_status: String,
    pub side_1: CandidateSide,
    pub side_2: CandidateSide,
}

/// Pending candidates at or above `min_score`, best first, joined with both
/// profiles for display.
pub fn high_confidence_candidates(
    conn: &Connection,
    min_score: f64,
    limit: usize,
) -> Result<Vec<CandidateReview>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT
                c.candidate_id, c.candidate_score,
                c.name_match_score, c.age_match_score,
                c.team_overlap_score, c.timeline_fit_score,
                c.confidence_level, c.validation_status,
                p1.profile_id, p1.name_raw, p1.team_code, p1.season, p1.birth_year,
                p2.profile_id, p2.name_raw, p2.team_code, p2.season, p2.birth_year
            FROM player_identity_candidates c
            JOIN player_profiles p1 ON c.profile_id_1 = p1.profile_id
            JOIN player_profiles p2 ON c.profile_id_2 = p2.profile_id
            WHERE c.candidate_score >= ?1
              AND c.validation_status = 'pending'
            ORDER BY c.candidate_score DESC, c.candidate_id ASC
            LIMIT ?2
            "#,
        )
        .context("prepare candidate review query")?;

    let rows = stmt
        .query_map(params![min_score, limit as i64], |row| {
            Ok(CandidateReview {
                candidate_id: row.get(0)?,
                candidate_score: row.get(1)?,
                breakdown: ScoreBreakdown {
                    name_match: row.get(2)?,
                    age_match: row.get(3)?,
                    team_overlap: row.get(4)?,
                    timeline_fit: row.get(5)?,
                },
                confidence_level: row.get(6)?,
                validation_status: row.get(7)?,
                side_1: CandidateSide {
                    profile_id: row.get(8)?,
                    name_raw: row.get(9)?,
                    team_code: row.get(10)?,
                    season: row.get(11)?,
                    birth_year: row.get(12)?,
                },
                side_2: CandidateSide {
                    profile_id: row.get(13)?,
                    name_raw: row.get(14)?,
                    team_code: row.get(15)?,
                    season: row.get(16)?,
                    birth_year: row.get(17)?,
                },
            })
        })
        .context("query candidate reviews")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode candidate review row")?);
    }
    Ok(out)
}

#[derive(Debug, Clone)]
pub struct ProfileMatch {
    pub profile_id: i64,
    pub name_raw: String,
    pub team_code: Option<String>,
    pub season: Option<String>,
    pub birth_year: Option<i32>,
    pub candidate_score: f64,
    pub breakdown: ScoreBreakdown,
    pub confidence_level: ConfidenceLevel,
}

/// Ad-hoc scoring of one profile against every other, best first. Errors if
/// the profile does not exist.
pub fn find_candidate_matches(
    conn: &Connection,
    profile_id: i64,
    min_score: f64,
) -> Result<Vec<ProfileMatch>> {
    let target = db::load_profile(conn, profile_id)?
        .ok_or_else(|| anyhow!("profile {profile_id} not found"))?;

    let mut out = Vec::new();
    for other in db::load_profiles(conn)? {
        if other.profile_id == target.profile_id {
            continue;
        }
        let (score, breakdown) = score_pair(&target, &other);
        if score >= min_score {
            out.push(ProfileMatch {
                profile_id: other.profile_id,
                name_raw: other.name_raw,
                team_code: other.team_code,
                season: other.season,
                birth_year: other.birth_year,
                candidate_score: score,
                breakdown,
                confidence_level: ConfidenceLevel::from_score(score),
            });
        }
    }
    out.sort_by(|a, b| {
        b.candidate_score
            .partial_cmp(&a.candidate_score)
            .unwrap_or(Ordering::Equal)
            .then(a.profile_id.cmp(&b.profile_id))
    });
    Ok(out)
}

/// Records a reviewer decision. `Ok(false)` means the input was rejected
/// (unknown candidate id, or a status outside confirmed/rejected/unsure);
/// errors are reserved for storage failures. This is the only mutation path
/// for `validation_status`.
pub fn validate_candidate(
    conn: &Connection,
    candidate_id: i64,
    status: &str,
    validated_by: &str,
    notes: Option<&str>,
) -> Result<bool> {
    let Some(status) = ValidationStatus::parse(status) else {
        return Ok(false);
    };
    if !status.is_human_decision() {
        return Ok(false);
    }

    let changed = conn
        .execute(
            r#"
            UPDATE player_identity_candidates
            SET validation_status = ?1,
                validated_by = ?2,
                validated_at = ?3,
                validation_notes = ?4
            WHERE candidate_id = ?5
            "#,
            params![
                status.as_str(),
                validated_by,
                Utc::now().to_rfc3339(),
                notes,
                candidate_id,
            ],
        )
        .context("update candidate validation")?;
    Ok(changed > 0)
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationStats {
    pub by_status: Vec<(String, i64)>,
    pub total: i64,
}

pub fn validation_stats(conn: &Connection) -> Result<ValidationStats> {
    let mut stmt = conn
        .prepare(
            "SELECT validation_status, COUNT(*) FROM player_identity_candidates \
             GROUP BY validation_status ORDER BY validation_status",
        )
        .context("prepare validation stats query")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
        .context("query validation stats")?;

    let mut by_status = Vec::new();
    let mut total = 0i64;
    for row in rows {
        let (status, count) = row.context("decode validation stat row")?;
        total += count;
        by_status.push((status, count));
    }
    Ok(ValidationStats { by_status, total })
}
