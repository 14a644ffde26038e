//! License text classification.
//!
//! Reference texts are embedded at compile time. Both the reference texts and
//! the candidate file are normalised into a stream of lowercase words, cut
//! into overlapping five-word shingles, and compared. A template "matches"
//! when nearly all of its shingles show up in the candidate; the candidate is
//! classified when the matches together explain most of its words.

use regex::Regex;
use rust_embed::Embed;
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::models::{Coverage, Match};

const SHINGLE: usize = 5;
/// Minimum percentage of a template's shingles that must be present.
pub const MATCH_THRESHOLD: f64 = 90.0;
/// Minimum percentage of the candidate's words the matches must cover.
pub const COVERAGE_THRESHOLD: f64 = 75.0;

#[derive(Embed)]
#[folder = "templates/"]
struct Templates;

struct Template {
    id: String,
    shingles: HashSet<String>,
}

static TEMPLATES: LazyLock<Vec<Template>> = LazyLock::new(|| {
    let mut templates: Vec<Template> = Templates::iter()
        .filter_map(|name| {
            let id = name.strip_suffix(".txt")?.to_string();
            let file = Templates::get(&name)?;
            let words = normalize(&String::from_utf8_lossy(&file.data));
            Some(Template { id, shingles: shingles(&words).collect() })
        })
        .collect();
    templates.sort_by(|a, b| a.id.cmp(&b.id));
    templates
});

// Copyright holder lines differ per project and carry no license meaning.
static NOTICE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(copyright\s*(\(c\)|©|\d|\[yyyy\]|<year>)|\(c\)\s*\d|©|all rights reserved)").unwrap()
});

/// Identifiers of every license this classifier knows about.
pub fn known_types() -> Vec<&'static str> {
    TEMPLATES.iter().map(|t| t.id.as_str()).collect()
}

/// Classify license text, returning detected type identifiers and coverage.
///
/// When the coverage is below [`COVERAGE_THRESHOLD`] the type list is empty
/// but the individual matches are still reported.
pub fn classify(contents: &[u8]) -> (Vec<String>, Coverage) {
    let words = normalize(&String::from_utf8_lossy(contents));
    if words.len() < SHINGLE {
        return (Vec::new(), Coverage::default());
    }
    let doc: Vec<String> = shingles(&words).collect();

    // (template, percent, covered word positions)
    let mut candidates: Vec<(&Template, f64, Vec<bool>)> = Vec::new();
    for template in TEMPLATES.iter() {
        let mut found: HashSet<&str> = HashSet::new();
        let mut covered = vec![false; words.len()];
        for (i, shingle) in doc.iter().enumerate() {
            if template.shingles.contains(shingle) {
                found.insert(shingle);
                covered[i..i + SHINGLE].iter_mut().for_each(|c| *c = true);
            }
        }
        let percent = percentage(found.len(), template.shingles.len());
        if percent >= MATCH_THRESHOLD {
            candidates.push((template, percent, covered));
        }
    }

    // A smaller license whose text is wholly contained in a bigger one that
    // also matched (BSD-2-Clause inside BSD-3-Clause) is not a separate match.
    let kept: Vec<&(&Template, f64, Vec<bool>)> = candidates
        .iter()
        .filter(|(template, _, covered)| {
            !candidates.iter().any(|(other, _, other_covered)| {
                other.shingles.len() > template.shingles.len()
                    && covered.iter().zip(other_covered).all(|(mine, theirs)| !mine || *theirs)
            })
        })
        .collect();

    let union = (0..words.len()).filter(|&i| kept.iter().any(|(_, _, covered)| covered[i])).count();
    let coverage = Coverage {
        percent: percentage(union, words.len()),
        matches: kept
            .iter()
            .map(|(template, percent, _)| Match { id: template.id.clone(), percent: *percent })
            .collect(),
    };
    let types = match coverage.percent >= COVERAGE_THRESHOLD {
        true => coverage.matches.iter().map(|m| m.id.clone()).collect(),
        false => Vec::new(),
    };
    (types, coverage)
}

fn normalize(text: &str) -> Vec<String> {
    text.lines()
        .filter(|line| !NOTICE_LINE.is_match(line))
        .flat_map(|line| line.split(|c: char| !c.is_alphanumeric()))
        .filter(|word| !word.is_empty())
        .map(|word| match word.to_lowercase().as_str() {
            "licence" => "license".to_string(),
            "licences" => "licenses".to_string(),
            "licenced" => "licensed".to_string(),
            other => other.to_string(),
        })
        .collect()
}

fn shingles(words: &[String]) -> impl Iterator<Item = String> + '_ {
    words.windows(SHINGLE).map(|window| window.join(" "))
}

fn percentage(part: usize, whole: usize) -> f64 {
    match whole {
        0 => 0.0,
        _ => part as f64 * 100.0 / whole as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn template(id: &str) -> String {
        let file = Templates::get(&format!("{id}.txt")).unwrap();
        String::from_utf8(file.data.into_owned()).unwrap()
    }

    #[test]
    fn all_templates_load() {
        let known = known_types();
        for id in ["Apache-2.0", "BSD-2-Clause", "BSD-3-Clause", "BSL-1.0", "ISC", "MIT", "Unlicense", "Zlib"] {
            assert!(known.contains(&id), "missing {id}");
        }
    }

    #[rstest]
    #[case("MIT")]
    #[case("Apache-2.0")]
    #[case("BSD-3-Clause")]
    #[case("BSD-2-Clause")]
    #[case("ISC")]
    #[case("Zlib")]
    #[case("Unlicense")]
    #[case("BSL-1.0")]
    fn classifies_reference_text_with_copyright_line(#[case] id: &str) {
        let text = format!("Copyright (c) 2024 Some Person\n\n{}", template(id));
        let (types, coverage) = classify(text.as_bytes());
        assert_eq!(types, vec![id.to_string()]);
        assert!(coverage.percent >= COVERAGE_THRESHOLD);
    }

    #[test]
    fn rewrapped_british_spelling_still_matches() {
        let text = template("MIT").replace('\n', " ").replace("license", "licence");
        let (types, _) = classify(text.as_bytes());
        assert_eq!(types, vec!["MIT".to_string()]);
    }

    #[test]
    fn unknown_text_has_no_types() {
        let (types, coverage) =
            classify(b"You may do whatever you like with this code as long as you buy me a coffee.");
        assert!(types.is_empty());
        assert!(coverage.matches.is_empty());
    }

    #[test]
    fn license_buried_in_prose_is_reported_but_not_classified() {
        let filler = "this paragraph is about something else entirely and keeps going for a while ".repeat(40);
        let text = format!("{filler}\n{}", template("MIT"));
        let (types, coverage) = classify(text.as_bytes());
        assert!(types.is_empty());
        assert_eq!(coverage.matches.len(), 1);
        assert!(coverage.percent < COVERAGE_THRESHOLD);
    }

    #[test]
    fn empty_input() {
        let (types, coverage) = classify(b"");
        assert!(types.is_empty());
        assert_eq!(coverage.percent, 0.0);
    }
}
