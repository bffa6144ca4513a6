use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::scope_path;
use crate::shell::safety::validate_relative_path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    CreateFolder,
    MoveFile,
    RenameFolder,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreateFolder => write!(f, "create_folder"),
            Self::MoveFile => write!(f, "move_file"),
            Self::RenameFolder => write!(f, "rename_folder"),
        }
    }
}

impl std::str::FromStr for ActionKind {
    type Err = ParseError;

    /// Accepts `move_file`, `moveFile`, `MoveFile` and `move-file` spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();
        match folded.as_str() {
            "createfolder" => Ok(Self::CreateFolder),
            "movefile" => Ok(Self::MoveFile),
            "renamefolder" => Ok(Self::RenameFolder),
            _ => Err(ParseError::UnknownAction(s.to_string())),
        }
    }
}

/// Wire shape of one action as the oracle writes it.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPlanAction {
    pub action: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default, alias = "new_name", alias = "newName")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPlanAction")]
pub struct PlanAction {
    #[serde(rename = "action")]
    pub kind: ActionKind,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(rename = "name", skip_serializing_if = "Option::is_none")]
    pub new_name: Option<String>,
}

impl PlanAction {
    pub fn create_folder(name: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::CreateFolder,
            source: name.into(),
            destination: None,
            new_name: None,
        }
    }

    pub fn move_file(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::MoveFile,
            source: source.into(),
            destination: Some(destination.into()),
            new_name: None,
        }
    }

    pub fn rename_folder(source: impl Into<String>, new_name: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::RenameFolder,
            source: source.into(),
            destination: None,
            new_name: Some(new_name.into()),
        }
    }

    /// Checks the per-kind field rules and that every path stays relative.
    pub fn validate(&self) -> Result<(), ParseError> {
        let kind = self.kind.to_string();
        require_path(&kind, "source", Some(&self.source))?;
        match self.kind {
            ActionKind::CreateFolder => {}
            ActionKind::MoveFile => {
                require_path(&kind, "destination", self.destination.as_deref())?;
            }
            ActionKind::RenameFolder => {
                require_path(&kind, "name", self.new_name.as_deref())?;
            }
        }
        Ok(())
    }

    /// Names the action touches, for audit messages.
    pub fn describe(&self) -> String {
        match self.kind {
            ActionKind::CreateFolder => format!("create folder {}", self.source),
            ActionKind::MoveFile => format!(
                "move {} -> {}",
                self.source,
                self.destination.as_deref().unwrap_or("?")
            ),
            ActionKind::RenameFolder => format!(
                "rename {} -> {}",
                self.source,
                self.new_name.as_deref().unwrap_or("?")
            ),
        }
    }

    /// True when `source` is the entry called `name` directly inside the
    /// request directory. A same-named file in a subfolder does not count.
    pub fn references(&self, name: &str) -> bool {
        scope_path::normalize_relative(&self.source) == scope_path::normalize_relative(name)
    }
}

fn require_path(kind: &str, field: &'static str, value: Option<&str>) -> Result<(), ParseError> {
    let Some(value) = value else {
        return Err(ParseError::MissingField {
            kind: kind.to_string(),
            field,
        });
    };
    if value.trim().is_empty() {
        return Err(ParseError::EmptyField {
            kind: kind.to_string(),
            field,
        });
    }
    validate_relative_path(value).map_err(|e| ParseError::UnsafePath(format!("{value}: {e}")))
}

impl TryFrom<RawPlanAction> for PlanAction {
    type Error = ParseError;

    fn try_from(raw: RawPlanAction) -> Result<Self, Self::Error> {
        let kind: ActionKind = raw.action.parse()?;
        let clean = |value: Option<String>| {
            value
                .map(|v| scope_path::normalize_relative(&v))
                .filter(|v| !v.is_empty())
        };
        let action = match kind {
            // Oracles sometimes put the folder to create under `name`.
            ActionKind::CreateFolder => PlanAction {
                kind,
                source: clean(raw.source).or_else(|| clean(raw.name)).unwrap_or_default(),
                destination: None,
                new_name: None,
            },
            ActionKind::MoveFile => PlanAction {
                kind,
                source: clean(raw.source).unwrap_or_default(),
                destination: clean(raw.destination),
                new_name: None,
            },
            ActionKind::RenameFolder => PlanAction {
                kind,
                source: clean(raw.source).unwrap_or_default(),
                destination: None,
                new_name: clean(raw.name).or_else(|| clean(raw.destination)),
            },
        };
        if action.source.is_empty() {
            return Err(ParseError::MissingField {
                kind: kind.to_string(),
                field: "source",
            });
        }
        action.validate()?;
        Ok(action)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationPlan {
    #[serde(default)]
    pub actions: Vec<PlanAction>,
    #[serde(default)]
    pub rationale: String,
}

impl OrganizationPlan {
    pub fn new(actions: Vec<PlanAction>, rationale: impl Into<String>) -> Self {
        Self {
            actions,
            rationale: rationale.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Keeps only actions of `kind`; returns how many were dropped.
    pub fn retain_kind(&mut self, kind: ActionKind) -> usize {
        let before = self.actions.len();
        self.actions.retain(|action| action.kind == kind);
        before - self.actions.len()
    }
}

/// What a plan request was asked about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestContext {
    ForFile(String),
    ForDirectory,
}

impl RequestContext {
    pub fn target_file(&self) -> Option<&str> {
        match self {
            Self::ForFile(name) => Some(name.as_str()),
            Self::ForDirectory => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(action: &str, source: Option<&str>, destination: Option<&str>, name: Option<&str>) -> RawPlanAction {
        RawPlanAction {
            action: action.to_string(),
            source: source.map(str::to_string),
            destination: destination.map(str::to_string),
            name: name.map(str::to_string),
        }
    }

    #[test]
    fn action_kind_parses_common_spellings() {
        assert_eq!("move_file".parse::<ActionKind>(), Ok(ActionKind::MoveFile));
        assert_eq!("MoveFile".parse::<ActionKind>(), Ok(ActionKind::MoveFile));
        assert_eq!("rename-folder".parse::<ActionKind>(), Ok(ActionKind::RenameFolder));
        assert_eq!("createFolder".parse::<ActionKind>(), Ok(ActionKind::CreateFolder));
    }

    #[test]
    fn action_kind_rejects_unknown_values() {
        assert_eq!(
            "delete_file".parse::<ActionKind>(),
            Err(ParseError::UnknownAction("delete_file".to_string()))
        );
    }

    #[test]
    fn move_file_requires_destination() {
        let err = PlanAction::try_from(raw("move_file", Some("a.txt"), None, None)).unwrap_err();
        assert!(matches!(err, ParseError::MissingField { field: "destination", .. }));
    }

    #[test]
    fn rename_folder_requires_new_name() {
        let err = PlanAction::try_from(raw("rename_folder", Some("Docs"), None, None)).unwrap_err();
        assert!(matches!(err, ParseError::MissingField { field: "name", .. }));
    }

    #[test]
    fn missing_source_is_rejected() {
        let err = PlanAction::try_from(raw("move_file", None, Some("Docs/a.txt"), None)).unwrap_err();
        assert!(matches!(err, ParseError::MissingField { field: "source", .. }));
    }

    #[test]
    fn create_folder_accepts_name_field() {
        let action = PlanAction::try_from(raw("create_folder", None, None, Some("Invoices"))).unwrap();
        assert_eq!(action, PlanAction::create_folder("Invoices"));
    }

    #[test]
    fn traversal_paths_are_unsafe() {
        let err = PlanAction::try_from(raw("move_file", Some("a.txt"), Some("../../a.txt"), None))
            .unwrap_err();
        assert!(matches!(err, ParseError::UnsafePath(_)));
    }

    #[test]
    fn paths_are_normalized_on_decode() {
        let action =
            PlanAction::try_from(raw("move_file", Some("./a.txt"), Some("Docs/"), None)).unwrap();
        assert_eq!(action.source, "a.txt");
        assert_eq!(action.destination.as_deref(), Some("Docs"));
    }

    #[test]
    fn plan_action_deserializes_through_raw_shape() {
        let json = r#"{"action":"rename_folder","source":"pics","name":"Photos"}"#;
        let action: PlanAction = serde_json::from_str(json).unwrap();
        assert_eq!(action, PlanAction::rename_folder("pics", "Photos"));

        let serialized = serde_json::to_value(&action).unwrap();
        assert_eq!(serialized["action"], "rename_folder");
        assert_eq!(serialized["name"], "Photos");
    }

    #[test]
    fn references_matches_whole_relative_path() {
        assert!(PlanAction::move_file("a.txt", "Docs/a.txt").references("a.txt"));
        assert!(PlanAction::move_file("./a.txt", "Docs/a.txt").references("a.txt"));
        assert!(!PlanAction::move_file("b.txt", "Docs/b.txt").references("a.txt"));
        assert!(!PlanAction::move_file("Archive/a.txt", "Trash/a.txt").references("a.txt"));
    }

    #[test]
    fn retain_kind_reports_dropped_actions() {
        let mut plan = OrganizationPlan::new(
            vec![
                PlanAction::rename_folder("a", "b"),
                PlanAction::move_file("x.txt", "Docs/x.txt"),
                PlanAction::create_folder("Docs"),
            ],
            "",
        );
        assert_eq!(plan.retain_kind(ActionKind::RenameFolder), 2);
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn empty_plan_is_valid() {
        let plan: OrganizationPlan = serde_json::from_str("{}").unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.rationale, "");
    }
}
