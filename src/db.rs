use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use crate::name_normalizer::normalize_name;

/// One (player, season, team) observation scraped from the portal.
/// Only the two consolidation fields ever change after creation.
#[derive(Debug, Clone)]
pub struct PlayerProfile {
    pub profile_id: i64,
    pub name_raw: String,
    pub name_normalized: String,
    pub season: Option<String>,
    pub team_code: Option<String>,
    pub birth_year: Option<i32>,
    pub dorsal: Option<i32>,
    pub consolidated_player_id: Option<i64>,
    pub is_consolidated: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NewProfile<'a> {
    pub name_raw: &'a str,
    pub season: Option<&'a str>,
    pub team_code: Option<&'a str>,
    pub birth_year: Option<i32>,
    pub dorsal: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct ProfileDetail {
    pub profile: PlayerProfile,
    pub games_played: Option<i64>,
    pub avg_minutes: Option<f64>,
    pub avg_points: Option<f64>,
    pub avg_valuation: Option<f64>,
    pub performance_tier: Option<String>,
    pub potential_score: Option<f64>,
    pub potential_tier: Option<String>,
    pub is_young_talent: bool,
}

#[derive(Debug, Clone)]
pub struct PotentialRow {
    pub profile_id: i64,
    pub name_raw: String,
    pub season: Option<String>,
    pub team_code: Option<String>,
    pub birth_year: Option<i32>,
    pub avg_points: Option<f64>,
    pub potential_score: f64,
    pub potential_tier: Option<String>,
    pub is_young_talent: bool,
}

pub fn default_db_path() -> PathBuf {
    match std::env::var("FEB_SCOUT_DB") {
        Ok(path) if !path.trim().is_empty() => PathBuf::from(path.trim()),
        _ => PathBuf::from("scouting_feb.db"),
    }
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS player_profiles (
            profile_id INTEGER PRIMARY KEY,
            name_raw TEXT NOT NULL,
            name_normalized TEXT NOT NULL,
            season TEXT NULL,
            team_code TEXT NULL,
            birth_year INTEGER NULL,
            dorsal INTEGER NULL,
            consolidated_player_id INTEGER NULL,
            is_consolidated INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_profiles_name_normalized
            ON player_profiles(name_normalized);
        CREATE INDEX IF NOT EXISTS idx_profiles_season_team
            ON player_profiles(season, team_code);

        CREATE TABLE IF NOT EXISTS player_identity_candidates (
            candidate_id INTEGER PRIMARY KEY AUTOINCREMENT,
            profile_id_1 INTEGER NOT NULL,
            profile_id_2 INTEGER NOT NULL,
            name_match_score REAL NOT NULL,
            age_match_score REAL NOT NULL,
            team_overlap_score REAL NOT NULL,
            timeline_fit_score REAL NOT NULL,
            candidate_score REAL NOT NULL,
            confidence_level TEXT NOT NULL,
            validation_status TEXT NOT NULL DEFAULT 'pending',
            validated_by TEXT NULL,
            validated_at TEXT NULL,
            validation_notes TEXT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(profile_id_1, profile_id_2)
        );
        CREATE INDEX IF NOT EXISTS idx_candidates_score
            ON player_identity_candidates(candidate_score);
        CREATE INDEX IF NOT EXISTS idx_candidates_status
            ON player_identity_candidates(validation_status);

        -- Populated by the ETL / scoring steps outside this crate; read here
        -- for the profile detail view and the potential listing.
        CREATE TABLE IF NOT EXISTS player_profile_metrics (
            profile_id INTEGER PRIMARY KEY,
            games_played INTEGER NULL,
            avg_minutes REAL NULL,
            avg_points REAL NULL,
            avg_valuation REAL NULL,
            performance_tier TEXT NULL
        );
        CREATE TABLE IF NOT EXISTS player_profile_potential (
            profile_id INTEGER PRIMARY KEY,
            potential_score REAL NOT NULL,
            potential_tier TEXT NULL,
            is_young_talent INTEGER NOT NULL DEFAULT 0,
            is_consistent_performer INTEGER NOT NULL DEFAULT 0
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

/// Inserts one profile, deriving `name_normalized` at creation time.
pub fn insert_profile(conn: &Connection, profile: &NewProfile<'_>) -> Result<i64> {
    conn.execute(
        r#"
        INSERT INTO player_profiles (
            name_raw, name_normalized, season, team_code, birth_year, dorsal, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            profile.name_raw,
            normalize_name(profile.name_raw),
            profile.season,
            profile.team_code,
            profile.birth_year,
            profile.dorsal,
            Utc::now().to_rfc3339(),
        ],
    )
    .context("insert player profile")?;
    Ok(conn.last_insert_rowid())
}

const PROFILE_COLUMNS: &str = "profile_id, name_raw, name_normalized, season, team_code, \
     birth_year, dorsal, consolidated_player_id, is_consolidated";

fn profile_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PlayerProfile> {
    Ok(PlayerProfile {
        profile_id: row.get(0)?,
        name_raw: row.get(1)?,
        name_normalized: row.get(2)?,
        season: row.get(3)?,
        team_code: row.get(4)?,
        birth_year: row.get(5)?,
        dorsal: row.get(6)?,
        consolidated_player_id: row.get(7)?,
        is_consolidated: row.get::<_, i64>(8)? != 0,
    })
}

/// All profiles, ordered by id so pair generation is deterministic.
pub fn load_profiles(conn: &Connection) -> Result<Vec<PlayerProfile>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {PROFILE_COLUMNS} FROM player_profiles ORDER BY profile_id"
        ))
        .context("prepare load profiles query")?;
    let rows = stmt
        .query_map([], profile_from_row)
        .context("query profiles")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode profile row")?);
    }
    Ok(out)
}

pub fn load_profile(conn: &Connection, profile_id: i64) -> Result<Option<PlayerProfile>> {
    conn.query_row(
        &format!("SELECT {PROFILE_COLUMNS} FROM player_profiles WHERE profile_id = ?1"),
        params![profile_id],
        profile_from_row,
    )
    .optional()
    .context("query profile by id")
}

/// Profile joined with its metric and potential rows, for the CLI detail view.
pub fn profile_detail(conn: &Connection, profile_id: i64) -> Result<Option<ProfileDetail>> {
    conn.query_row(
        r#"
        SELECT
            pp.profile_id, pp.name_raw, pp.name_normalized, pp.season, pp.team_code,
            pp.birth_year, pp.dorsal, pp.consolidated_player_id, pp.is_consolidated,
            m.games_played, m.avg_minutes, m.avg_points, m.avg_valuation, m.performance_tier,
            p.potential_score, p.potential_tier, p.is_young_talent
        FROM player_profiles pp
        LEFT JOIN player_profile_metrics m ON pp.profile_id = m.profile_id
        LEFT JOIN player_profile_potential p ON pp.profile_id = p.profile_id
        WHERE pp.profile_id = ?1
        "#,
        params![profile_id],
        |row| {
            Ok(ProfileDetail {
                profile: profile_from_row(row)?,
                games_played: row.get(9)?,
                avg_minutes: row.get(10)?,
                avg_points: row.get(11)?,
                avg_valuation: row.get(12)?,
                performance_tier: row.get(13)?,
                potential_score: row.get(14)?,
                potential_tier: row.get(15)?,
                is_young_talent: row.get::<_, Option<i64>>(16)?.unwrap_or(0) != 0,
            })
        },
    )
    .optional()
    .context("query profile detail")
}

/// Profiles at or above a potential score, best first.
pub fn profiles_by_potential(
    conn: &Connection,
    min_score: f64,
    limit: usize,
) -> Result<Vec<PotentialRow>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT
                pp.profile_id, pp.name_raw, pp.season, pp.team_code, pp.birth_year,
                m.avg_points, p.potential_score, p.potential_tier, p.is_young_talent
            FROM player_profiles pp
            JOIN player_profile_potential p ON pp.profile_id = p.profile_id
            LEFT JOIN player_profile_metrics m ON pp.profile_id = m.profile_id
            WHERE p.potential_score >= ?1
            ORDER BY p.potential_score DESC, pp.profile_id ASC
            LIMIT ?2
            "#,
        )
        .context("prepare potential query")?;
    let rows = stmt
        .query_map(params![min_score, limit as i64], |row| {
            Ok(PotentialRow {
                profile_id: row.get(0)?,
                name_raw: row.get(1)?,
                season: row.get(2)?,
                team_code: row.get(3)?,
                birth_year: row.get(4)?,
                avg_points: row.get(5)?,
                potential_score: row.get(6)?,
                potential_tier: row.get(7)?,
                is_young_talent: row.get::<_, i64>(8)? != 0,
            })
        })
        .context("query potential rows")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode potential row")?);
    }
    Ok(out)
}
