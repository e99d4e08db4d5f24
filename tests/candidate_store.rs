use rusqlite::{Connection, params};

use feb_scout::db::{NewProfile, init_schema, insert_profile};
use feb_scout::matcher::{
    generate_candidates, high_confidence_candidates, validate_candidate, validation_stats,
};
use feb_scout::name_normalizer::normalize_name;

fn test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    init_schema(&conn).expect("init schema");
    conn
}

fn add_profile(
    conn: &Connection,
    name: &str,
    season: Option<&str>,
    team: Option<&str>,
    birth_year: Option<i32>,
) -> i64 {
    insert_profile(
        conn,
        &NewProfile {
            name_raw: name,
            season,
            team_code: team,
            birth_year,
            dorsal: None,
        },
    )
    .expect("insert profile")
}

fn candidate_count(conn: &Connection) -> i64 {
    conn.query_row(
        "SELECT COUNT(*) FROM player_identity_candidates",
        [],
        |row| row.get(0),
    )
    .expect("count candidates")
}

#[test]
fn generation_persists_one_pending_candidate_per_pair() {
    let mut conn = test_db();
    add_profile(&conn, "MARÍA GARCÍA LÓPEZ", Some("2023/24"), Some("CBA"), Some(2001));
    add_profile(&conn, "MARÍA GARCÍA LÓPEZ", Some("2023/24"), Some("CBA"), Some(2001));

    let summary = generate_candidates(&mut conn, 0.95).expect("generate");
    assert_eq!(summary.candidates_inserted, 1);
    assert_eq!(candidate_count(&conn), 1);

    let (score, status): (f64, String) = conn
        .query_row(
            "SELECT candidate_score, validation_status FROM player_identity_candidates",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .expect("read candidate");
    assert!(score >= 0.95, "score {score}");
    assert_eq!(status, "pending");
}

#[test]
fn generation_is_idempotent_per_pair() {
    let mut conn = test_db();
    add_profile(&conn, "MARÍA GARCÍA", Some("2023/24"), Some("CBA"), Some(2001));
    add_profile(&conn, "MARÍA GARCÍA", Some("2024/25"), Some("CBA"), Some(2001));

    let first = generate_candidates(&mut conn, 0.50).expect("first run");
    let count_after_first = candidate_count(&conn);
    let second = generate_candidates(&mut conn, 0.50).expect("second run");

    assert!(first.candidates_inserted > 0);
    assert_eq!(second.candidates_inserted, 0);
    assert_eq!(candidate_count(&conn), count_after_first);
}

#[test]
fn lower_threshold_rerun_only_adds_rows() {
    let mut conn = test_db();
    add_profile(&conn, "MARIA GARCIA LOPEZ", Some("2023/24"), Some("CBA"), Some(2001));
    add_profile(&conn, "MARIA GARCIA LOPEZ", Some("2024/25"), Some("CBA"), Some(2001));
    // Same initial, different everything else: pairs against the others at a
    // low score only.
    add_profile(&conn, "MARTA GOMEZ", Some("2024/25"), Some("ZAR"), Some(1990));

    generate_candidates(&mut conn, 0.90).expect("strict run");
    assert_eq!(candidate_count(&conn), 1);

    generate_candidates(&mut conn, 0.10).expect("loose run");
    assert_eq!(candidate_count(&conn), 3);

    // The strict row kept its original score.
    let top: f64 = conn
        .query_row(
            "SELECT MAX(candidate_score) FROM player_identity_candidates",
            [],
            |row| row.get(0),
        )
        .expect("max score");
    assert!(top >= 0.90);
}

#[test]
fn review_queue_is_sorted_and_skips_validated_rows() {
    let mut conn = test_db();
    add_profile(&conn, "MARIA GARCIA LOPEZ", Some("2023/24"), Some("CBA"), Some(2001));
    add_profile(&conn, "MARIA GARCIA LOPEZ", Some("2024/25"), Some("CBA"), Some(2001));
    add_profile(&conn, "M. GARCIA LOPEZ", Some("2022/23"), Some("CBA"), None);

    generate_candidates(&mut conn, 0.30).expect("generate");
    let queue = high_confidence_candidates(&conn, 0.30, 50).expect("queue");
    assert!(queue.len() >= 2);
    for window in queue.windows(2) {
        assert!(window[0].candidate_score >= window[1].candidate_score);
    }

    let top_id = queue[0].candidate_id;
    assert!(
        validate_candidate(&conn, top_id, "confirmed", "tester", None).expect("validate")
    );
    let queue_after = high_confidence_candidates(&conn, 0.30, 50).expect("queue after");
    assert!(queue_after.iter().all(|c| c.candidate_id != top_id));
}

#[test]
fn validate_rejects_bad_status_and_leaves_row_untouched() {
    let mut conn = test_db();
    add_profile(&conn, "MARÍA GARCÍA", Some("2023/24"), Some("CBA"), Some(2001));
    add_profile(&conn, "MARÍA GARCÍA", Some("2024/25"), Some("CBA"), Some(2001));
    generate_candidates(&mut conn, 0.50).expect("generate");

    let candidate_id: i64 = conn
        .query_row(
            "SELECT candidate_id FROM player_identity_candidates",
            [],
            |row| row.get(0),
        )
        .expect("candidate id");

    for status in ["maybe", "CONFIRMED", "", "pending"] {
        assert!(
            !validate_candidate(&conn, candidate_id, status, "tester", None).expect("call"),
            "status '{status}' should be rejected"
        );
    }

    let status: String = conn
        .query_row(
            "SELECT validation_status FROM player_identity_candidates WHERE candidate_id = ?1",
            params![candidate_id],
            |row| row.get(0),
        )
        .expect("status");
    assert_eq!(status, "pending");
}

#[test]
fn validate_unknown_candidate_fails_without_side_effects() {
    let conn = test_db();
    let before = candidate_count(&conn);
    assert!(!validate_candidate(&conn, 9999, "confirmed", "tester", None).expect("call"));
    assert_eq!(candidate_count(&conn), before);
}

#[test]
fn validate_records_audit_fields_and_stats_follow() {
    let mut conn = test_db();
    add_profile(&conn, "MARÍA GARCÍA", Some("2023/24"), Some("CBA"), Some(2001));
    add_profile(&conn, "MARÍA GARCÍA", Some("2024/25"), Some("CBA"), Some(2001));
    add_profile(&conn, "MARÍA GARCÍA", Some("2025/26"), Some("CBA"), Some(2001));
    generate_candidates(&mut conn, 0.50).expect("generate");
    assert_eq!(candidate_count(&conn), 3);

    assert!(
        validate_candidate(&conn, 1, "confirmed", "reviewer", Some("same dorsal too"))
            .expect("validate")
    );
    let (by, notes): (String, String) = conn
        .query_row(
            "SELECT validated_by, validation_notes FROM player_identity_candidates \
             WHERE candidate_id = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .expect("audit fields");
    assert_eq!(by, "reviewer");
    assert_eq!(notes, "same dorsal too");

    let stats = validation_stats(&conn).expect("stats");
    assert_eq!(stats.total, 3);
    let get = |name: &str| {
        stats
            .by_status
            .iter()
            .find(|(status, _)| status == name)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    };
    assert_eq!(get("confirmed"), 1);
    assert_eq!(get("pending"), 2);
}

#[test]
fn generation_blocks_on_season_team_across_different_initials() {
    let mut conn = test_db();
    // Different first letters, same season+team: still compared.
    let id1 = add_profile(&conn, "ANA RUIZ", Some("2023/24"), Some("CBA"), Some(2001));
    let id2 = add_profile(&conn, "RUIZ, ANA", Some("2023/24"), Some("CBA"), Some(2001));
    assert!(id1 < id2);

    let summary = generate_candidates(&mut conn, 0.80).expect("generate");
    assert_eq!(summary.candidates_inserted, 1);

    let (p1, p2): (i64, i64) = conn
        .query_row(
            "SELECT profile_id_1, profile_id_2 FROM player_identity_candidates",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .expect("pair");
    assert_eq!((p1, p2), (id1, id2));
}

#[test]
fn inserted_profiles_carry_normalized_names() {
    let conn = test_db();
    let id = add_profile(&conn, "  MARÍA   GARCÍA ", None, None, None);
    let stored: String = conn
        .query_row(
            "SELECT name_normalized FROM player_profiles WHERE profile_id = ?1",
            params![id],
            |row| row.get(0),
        )
        .expect("normalized");
    assert_eq!(stored, normalize_name("  MARÍA   GARCÍA "));
    assert_eq!(stored, "maria garcia");
}
