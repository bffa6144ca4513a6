use std::collections::{BTreeMap, HashSet};

use crate::error::ParseError;
use crate::models::file_entry::extension_of;
use crate::models::plan::{OrganizationPlan, PlanAction, RawPlanAction};
use crate::shell::safety::validate_relative_path;

const MAX_FOLDER_NAME_CHARS: usize = 64;

/// Leading words that open prose rather than name a folder.
const LEADING_STOPWORDS: &[&str] = &[
    "a", "all", "an", "and", "based", "for", "here", "i", "if", "in", "it", "move", "note",
    "ok", "okay", "place", "put", "so", "sure", "the", "these", "this", "those", "to", "we",
    "you",
];

/// How a raw oracle response should be turned into a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanParser {
    /// Bracketed JSON action array, as requested by the prompts.
    Strict,
    /// Prose/markdown answer; extensions are mapped to folder names and
    /// paired with the candidate file names.
    FreeText { candidates: Vec<String> },
}

impl PlanParser {
    pub fn parse(&self, raw: &str) -> Result<OrganizationPlan, ParseError> {
        match self {
            Self::Strict => decode_strict(raw),
            Self::FreeText { candidates } => {
                let mapping = extract_extension_mapping(raw, candidates);
                Ok(mapping_to_plan(&mapping, candidates))
            }
        }
    }
}

/// Decodes the slice between the first `[` and the last `]`. Any text before
/// the array becomes the rationale.
pub fn decode_strict(raw: &str) -> Result<OrganizationPlan, ParseError> {
    let start = raw.find('[').ok_or(ParseError::NoArray)?;
    let end = raw.rfind(']').ok_or(ParseError::NoArray)?;
    if end < start {
        return Err(ParseError::NoArray);
    }

    let slice = &raw[start..=end];
    let raw_actions: Vec<RawPlanAction> =
        serde_json::from_str(slice).map_err(|e| ParseError::Malformed(e.to_string()))?;
    let actions = raw_actions
        .into_iter()
        .map(PlanAction::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(OrganizationPlan::new(actions, preamble(&raw[..start])))
}

fn preamble(text: &str) -> String {
    let trimmed = text.trim();
    let without_fence = trimmed
        .strip_suffix("```json")
        .or_else(|| trimmed.strip_suffix("```"))
        .unwrap_or(trimmed);
    without_fence.trim().to_string()
}

/// Maps file extensions to folder names from a free-text plan. Lines with no
/// recognizable folder name are skipped; later lines win on conflicts.
pub fn extract_extension_mapping(
    plan_text: &str,
    candidates: &[String],
) -> BTreeMap<String, String> {
    let known_extensions: HashSet<String> = candidates
        .iter()
        .filter_map(|name| extension_of(name))
        .collect();
    let lowered_candidates: Vec<(String, Option<String>)> = candidates
        .iter()
        .map(|name| (name.to_lowercase(), extension_of(name)))
        .collect();

    let mut mapping = BTreeMap::new();
    for line in plan_text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let Some(folder) = extract_folder_name(line) else {
            continue;
        };

        let lowered = line.to_lowercase();
        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
        {
            if known_extensions.contains(token) {
                mapping.insert(token.to_string(), folder.clone());
            }
        }

        for (candidate, extension) in &lowered_candidates {
            if let Some(extension) = extension {
                if lowered.contains(candidate.as_str()) {
                    mapping.insert(extension.clone(), folder.clone());
                }
            }
        }
    }
    mapping
}

/// Emphasis, then quotes, then the leading word after any bullet or number.
pub fn extract_folder_name(line: &str) -> Option<String> {
    emphasized_span(line)
        .or_else(|| quoted_span(line, '"'))
        .or_else(|| quoted_span(line, '\''))
        .or_else(|| leading_word(line))
        .and_then(|name| clean_folder_name(&name))
}

fn emphasized_span(line: &str) -> Option<String> {
    let start = line.find("**")? + 2;
    let end = line[start..].find("**")? + start;
    Some(line[start..end].to_string())
}

fn quoted_span(line: &str, quote: char) -> Option<String> {
    let start = line.find(quote)? + quote.len_utf8();
    let end = line[start..].find(quote)? + start;
    Some(line[start..end].to_string())
}

fn leading_word(line: &str) -> Option<String> {
    let body = strip_list_prefix(line);
    let word: String = body
        .chars()
        .take_while(|c| c.is_alphanumeric() || matches!(c, '_' | '-'))
        .collect();
    if word.is_empty() || LEADING_STOPWORDS.contains(&word.to_lowercase().as_str()) {
        return None;
    }
    Some(word)
}

fn strip_list_prefix(line: &str) -> &str {
    let mut rest = line.trim_start();
    loop {
        let before = rest;
        rest = rest
            .trim_start_matches(['-', '*', '+', '•', '#', '>'])
            .trim_start();

        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits > 0 {
            let after = &rest[digits..];
            if let Some(stripped) = after
                .strip_prefix('.')
                .or_else(|| after.strip_prefix(')'))
                .or_else(|| after.strip_prefix(':'))
            {
                rest = stripped.trim_start();
            }
        }
        if let Some(stripped) = rest.strip_prefix('(') {
            let digits = stripped.chars().take_while(|c| c.is_ascii_digit()).count();
            if digits > 0 {
                if let Some(after) = stripped[digits..].strip_prefix(')') {
                    rest = after.trim_start();
                }
            }
        }
        if rest == before {
            return rest;
        }
    }
}

fn clean_folder_name(raw: &str) -> Option<String> {
    let name = raw
        .trim()
        .trim_end_matches([':', '.', ','])
        .trim_end_matches('/')
        .trim();
    if name.is_empty() || name.chars().count() > MAX_FOLDER_NAME_CHARS {
        return None;
    }
    validate_relative_path(name).ok()?;
    Some(name.to_string())
}

/// One `MoveFile` per candidate whose extension was mapped.
pub fn mapping_to_plan(mapping: &BTreeMap<String, String>, candidates: &[String]) -> OrganizationPlan {
    let actions = candidates
        .iter()
        .filter_map(|name| {
            let extension = extension_of(name)?;
            let folder = mapping.get(&extension)?;
            Some(PlanAction::move_file(name.clone(), format!("{folder}/{name}")))
        })
        .filter(|action| action.validate().is_ok())
        .collect();
    OrganizationPlan::new(actions, "extracted from free-text plan")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::plan::ActionKind;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn strict_decode_ignores_surrounding_prose() {
        let raw = "Sure! Here is the plan:\n```json\n[{\"action\":\"move_file\",\"source\":\"report.pdf\",\"destination\":\"Documents/report.pdf\"}]\n```\nLet me know if you need more.";
        let plan = decode_strict(raw).unwrap();
        assert_eq!(
            plan.actions,
            vec![PlanAction::move_file("report.pdf", "Documents/report.pdf")]
        );
        assert_eq!(plan.rationale, "Sure! Here is the plan:");
    }

    #[test]
    fn strict_decode_is_unaffected_by_prefix_and_suffix() {
        let array = r#"[{"action":"create_folder","source":"Invoices"},{"action":"rename_folder","source":"pics","name":"Photos"}]"#;
        let bare = decode_strict(array).unwrap();
        for (prefix, suffix) in [("", "\nthanks"), ("Plan follows.\n", ""), ("a b c ", " x y z")] {
            let wrapped = format!("{prefix}{array}{suffix}");
            assert_eq!(decode_strict(&wrapped).unwrap().actions, bare.actions);
        }
    }

    #[test]
    fn strict_decode_accepts_empty_array() {
        let plan = decode_strict("No changes needed: []").unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn strict_decode_requires_brackets() {
        assert_eq!(decode_strict("move it to Documents"), Err(ParseError::NoArray));
        assert_eq!(decode_strict("] backwards ["), Err(ParseError::NoArray));
    }

    #[test]
    fn strict_decode_surfaces_malformed_json() {
        let err = decode_strict("[{\"action\": \"move_file\", }]").unwrap_err();
        assert!(matches!(err, ParseError::Malformed(_)));
    }

    #[test]
    fn strict_decode_rejects_unknown_kind() {
        let err = decode_strict(r#"[{"action":"delete_file","source":"a.txt"}]"#).unwrap_err();
        assert_eq!(err, ParseError::UnknownAction("delete_file".to_string()));
    }

    #[test]
    fn folder_name_from_emphasis() {
        assert_eq!(
            extract_folder_name("1. **Tax Returns** - the pdf files"),
            Some("Tax Returns".to_string())
        );
    }

    #[test]
    fn folder_name_from_quotes() {
        assert_eq!(
            extract_folder_name("Put the jpg files into \"Vacation Photos\""),
            Some("Vacation Photos".to_string())
        );
        assert_eq!(
            extract_folder_name("Use 'Receipts' for the csv exports"),
            Some("Receipts".to_string())
        );
    }

    #[test]
    fn folder_name_from_leading_word() {
        assert_eq!(extract_folder_name("- Images: jpg, png"), Some("Images".to_string()));
        assert_eq!(extract_folder_name("2) Music for mp3"), Some("Music".to_string()));
        assert_eq!(extract_folder_name("(3) Archives zip"), Some("Archives".to_string()));
    }

    #[test]
    fn prose_openers_yield_no_folder() {
        assert_eq!(extract_folder_name("Sure, here is my suggestion"), None);
        assert_eq!(extract_folder_name("The pdf files are reports"), None);
        assert_eq!(extract_folder_name("   "), None);
    }

    #[test]
    fn heuristic_maps_known_extensions() {
        let text = "**Documents**: pdf and docx files\n- Images: jpg\n";
        let mapping = extract_extension_mapping(text, &names(&["report.pdf", "photo.jpg"]));
        assert_eq!(mapping.get("pdf"), Some(&"Documents".to_string()));
        assert_eq!(mapping.get("jpg"), Some(&"Images".to_string()));
        assert!(!mapping.contains_key("docx"));
    }

    #[test]
    fn heuristic_is_conservative_on_unmatched_lines() {
        let text = "Sure, happy to help!\nThese files look like a mix.\nMisc stuff here";
        let mapping = extract_extension_mapping(text, &names(&["report.pdf"]));
        assert!(mapping.is_empty());
    }

    #[test]
    fn heuristic_name_mention_maps_own_extension() {
        let text = "\"Budget\" should hold Q3-Forecast.XLSX";
        let mapping = extract_extension_mapping(text, &names(&["q3-forecast.xlsx"]));
        assert_eq!(mapping.get("xlsx"), Some(&"Budget".to_string()));
    }

    #[test]
    fn heuristic_last_line_wins() {
        let text = "Documents: pdf\nReports: pdf";
        let mapping = extract_extension_mapping(text, &names(&["a.pdf"]));
        assert_eq!(mapping.get("pdf"), Some(&"Reports".to_string()));
    }

    #[test]
    fn free_text_parser_builds_move_actions() {
        let parser = PlanParser::FreeText {
            candidates: names(&["report.pdf", "notes"]),
        };
        let plan = parser.parse("**Documents** gets every pdf").unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.actions[0].kind, ActionKind::MoveFile);
        assert_eq!(plan.actions[0].source, "report.pdf");
        assert_eq!(
            plan.actions[0].destination.as_deref(),
            Some("Documents/report.pdf")
        );
    }

    #[test]
    fn unsafe_folder_names_are_dropped() {
        assert_eq!(extract_folder_name("**../../etc** pdf"), None);
        assert_eq!(extract_folder_name("\"/tmp\" for pdf"), None);
    }
}
