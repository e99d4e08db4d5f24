use std::collections::HashSet;

use once_cell::sync::Lazy;

// Particles that carry no identity signal inside compound surnames.
static SURNAME_PARTICLES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "de", "del", "la", "los", "las", "da", "dos", "das", "van", "von", "el",
    ])
});

const SURNAME_WEIGHT: f64 = 0.60;
const INITIAL_WEIGHT: f64 = 0.20;
const FIRST_NAME_WEIGHT: f64 = 0.20;

/// Canonical comparable form of a scraped name: lowercase, diacritics folded
/// to base Latin letters, punctuation reduced to `. , -`, whitespace collapsed.
///
/// Empty input yields empty output. Idempotent, so consolidation can group by
/// exact equality of the result.
pub fn normalize_name(raw: &str) -> String {
    let folded = fold_diacritics(&raw.to_lowercase());
    let mut out = String::with_capacity(folded.len());
    let mut last_was_space = true;
    for ch in folded.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        } else if ch.is_ascii_alphanumeric() || matches!(ch, '.' | ',' | '-') {
            out.push(ch);
            last_was_space = false;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

// Fixed fold table covering Latin-1 Supplement plus the Latin Extended-A
// letters that show up in federation rosters.
fn fold_diacritics(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' | 'ā' | 'ă' | 'ą' => out.push('a'),
            'é' | 'è' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => out.push('e'),
            'í' | 'ì' | 'î' | 'ï' | 'ī' | 'į' | 'ı' => out.push('i'),
            'ó' | 'ò' | 'ô' | 'ö' | 'õ' | 'ō' | 'ő' | 'ø' => out.push('o'),
            'ú' | 'ù' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' | 'ų' => out.push('u'),
            'ý' | 'ÿ' => out.push('y'),
            'ñ' | 'ń' | 'ņ' | 'ň' => out.push('n'),
            'ç' | 'ć' | 'č' => out.push('c'),
            'ś' | 'ş' | 'š' => out.push('s'),
            'ź' | 'ż' | 'ž' => out.push('z'),
            'ĺ' | 'ļ' | 'ľ' | 'ł' => out.push('l'),
            'ŕ' | 'ř' => out.push('r'),
            'ť' | 'ţ' => out.push('t'),
            'ď' | 'đ' => out.push('d'),
            'ğ' | 'ģ' => out.push('g'),
            'ķ' => out.push('k'),
            'æ' => out.push_str("ae"),
            'œ' => out.push_str("oe"),
            'ß' => out.push_str("ss"),
            _ => out.push(ch),
        }
    }
    out
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameComponents {
    pub initial: String,
    pub first_name: String,
    pub surnames: String,
}

/// Splits a name into (initial, first name, surnames), handling the three
/// portal formats: `"perez, juan"`, `"j. perez"` / `"j.m. perez"`, and
/// `"juan perez garcia"`. Initial-only forms leave `first_name` empty.
pub fn parse_name_components(name: &str) -> NameComponents {
    let name = normalize_name(name);
    if name.is_empty() {
        return NameComponents::default();
    }

    // "surnames, given names"
    if let Some((surnames, given)) = name.split_once(',') {
        let first_name = given
            .trim()
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_string();
        let initial = first_char(&first_name);
        return NameComponents {
            initial,
            first_name,
            surnames: surnames.trim().to_string(),
        };
    }

    // "j. surname" or "j.m. surname"
    if name.contains('.') {
        let parts = name.split_whitespace().collect::<Vec<_>>();
        let mut initials_end = 0;
        for part in &parts {
            if part.contains('.') {
                initials_end += 1;
            } else {
                break;
            }
        }
        let initial = parts.first().map(|p| first_char(p)).unwrap_or_default();
        let surnames = parts.get(initials_end..).unwrap_or(&[]).join(" ");
        return NameComponents {
            initial,
            first_name: String::new(),
            surnames,
        };
    }

    let parts = name.split_whitespace().collect::<Vec<_>>();
    if parts.len() == 1 {
        // Single token: assume surname only.
        return NameComponents {
            initial: String::new(),
            first_name: String::new(),
            surnames: parts[0].to_string(),
        };
    }

    let first_name = parts[0].to_string();
    NameComponents {
        initial: first_char(&first_name),
        first_name,
        surnames: parts[1..].join(" "),
    }
}

fn first_char(s: &str) -> String {
    s.chars().next().map(String::from).unwrap_or_default()
}

/// Surname tokens that matter for comparison, particles dropped.
pub fn surname_tokens(surnames: &str) -> Vec<String> {
    surnames
        .split_whitespace()
        .filter(|t| !SURNAME_PARTICLES.contains(t))
        .map(|t| t.to_string())
        .collect()
}

/// Structural similarity between two names in [0, 1]. Exact normalized
/// equality is 1.0; otherwise surnames dominate (exact match or token
/// Jaccard), with smaller bonuses for matching initials and first names.
/// Symmetric in its arguments.
pub fn name_similarity(name1: &str, name2: &str) -> f64 {
    let norm1 = normalize_name(name1);
    let norm2 = normalize_name(name2);
    if !norm1.is_empty() && norm1 == norm2 {
        return 1.0;
    }

    let c1 = parse_name_components(&norm1);
    let c2 = parse_name_components(&norm2);
    let mut score = 0.0;

    if !c1.surnames.is_empty() && !c2.surnames.is_empty() {
        if c1.surnames == c2.surnames {
            score += SURNAME_WEIGHT;
        } else {
            let t1 = surname_tokens(&c1.surnames)
                .into_iter()
                .collect::<HashSet<_>>();
            let t2 = surname_tokens(&c2.surnames)
                .into_iter()
                .collect::<HashSet<_>>();
            let union = t1.union(&t2).count();
            if union > 0 {
                let intersection = t1.intersection(&t2).count();
                score += SURNAME_WEIGHT * intersection as f64 / union as f64;
            }
        }
    }

    let initials_match = !c1.initial.is_empty() && c1.initial == c2.initial;
    if initials_match {
        score += INITIAL_WEIGHT;
    }

    if !c1.first_name.is_empty() && !c2.first_name.is_empty() {
        if c1.first_name == c2.first_name {
            score += FIRST_NAME_WEIGHT;
        } else if c1.first_name.contains(&c2.first_name)
            || c2.first_name.contains(&c1.first_name)
        {
            score += FIRST_NAME_WEIGHT / 2.0;
        }
    } else if initials_match {
        // One side abbreviated to an initial; the match is weaker evidence
        // than a full first-name match.
        score += FIRST_NAME_WEIGHT / 2.0;
    }

    score.min(1.0)
}

/// Edit-distance fallback over the normalized forms, for names whose
/// structure the component parser cannot align.
pub fn fuzzy_match_score(name1: &str, name2: &str) -> f64 {
    let norm1 = normalize_name(name1);
    let norm2 = normalize_name(name2);
    if norm1.is_empty() || norm2.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(&norm1, &norm2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_case_accents_and_whitespace() {
        assert_eq!(normalize_name("  MARÍA   GARCÍA "), "maria garcia");
        assert_eq!(normalize_name("PÉREZ, JOSÉ"), "perez, jose");
        assert_eq!(normalize_name("Ibañez\tNúñez"), "ibanez nunez");
        assert_eq!(normalize_name(""), "");
        assert_eq!(normalize_name("   "), "");
    }

    #[test]
    fn normalize_drops_stray_symbols() {
        assert_eq!(normalize_name("GARCÍA (CAP.)"), "garcia cap.");
        assert_eq!(normalize_name("O'NEILL"), "oneill");
    }

    #[test]
    fn normalize_is_idempotent() {
        for raw in ["J.M. GARCÍA", "  De   La Torre, ANA ", "łukasz ŻÓŁĆ", ""] {
            let once = normalize_name(raw);
            assert_eq!(normalize_name(&once), once);
        }
    }

    #[test]
    fn components_from_comma_format() {
        let c = parse_name_components("PÉREZ, JUAN");
        assert_eq!(c.initial, "j");
        assert_eq!(c.first_name, "juan");
        assert_eq!(c.surnames, "perez");
    }

    #[test]
    fn components_from_initial_format() {
        let c = parse_name_components("J.M. GARCÍA LÓPEZ");
        assert_eq!(c.initial, "j");
        assert_eq!(c.first_name, "");
        assert_eq!(c.surnames, "garcia lopez");
    }

    #[test]
    fn components_from_plain_format() {
        let c = parse_name_components("JUAN MANUEL PÉREZ");
        assert_eq!(c.initial, "j");
        assert_eq!(c.first_name, "juan");
        assert_eq!(c.surnames, "manuel perez");

        let single = parse_name_components("PÉREZ");
        assert_eq!(single.first_name, "");
        assert_eq!(single.surnames, "perez");
    }

    #[test]
    fn surname_tokens_drop_particles() {
        assert_eq!(surname_tokens("de la torre"), vec!["torre".to_string()]);
    }

    #[test]
    fn similarity_exact_and_abbreviated() {
        assert_eq!(name_similarity("JUAN PÉREZ", "juan perez"), 1.0);
        let abbreviated = name_similarity("J. PÉREZ", "JUAN PÉREZ");
        assert!(abbreviated >= 0.85, "got {abbreviated}");
        let reversed = name_similarity("PÉREZ, JUAN", "JUAN PÉREZ");
        assert!(reversed >= 0.85, "got {reversed}");
    }

    #[test]
    fn similarity_is_symmetric() {
        let pairs = [
            ("J. PÉREZ", "JUAN PÉREZ"),
            ("GARCÍA, ANA", "ANA GARCÍA RUIZ"),
            ("MARIA GARCIA", "ANA MARTIN"),
        ];
        for (a, b) in pairs {
            assert_eq!(name_similarity(a, b), name_similarity(b, a));
        }
    }

    #[test]
    fn similarity_of_unrelated_names_is_low() {
        assert!(name_similarity("MARIA GARCIA LOPEZ", "ANA MARTIN RUIZ") < 0.2);
    }

    #[test]
    fn fuzzy_score_handles_empty_and_typos() {
        assert_eq!(fuzzy_match_score("", "JUAN"), 0.0);
        assert!(fuzzy_match_score("maria garcia", "maria garcia") > 0.99);
        assert!(fuzzy_match_score("maria garcia", "maria garcai") > 0.8);
    }
}
