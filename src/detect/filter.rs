//! Class selection and its resolution into an allow-list of class ids.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use super::result::{AllowedClasses, ClassNameMap};

/// Choice label that stands for "every class the model knows".
pub const ALL_CLASSES: &str = "All classes";

/// What the user asked to detect.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SelectionRepr", into = "SelectionRepr")]
pub enum ClassSelection {
    #[default]
    All,
    Only(BTreeSet<String>),
}

impl ClassSelection {
    /// Build from a set of names. An empty set collapses to `All`.
    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            Self::All
        } else {
            Self::Only(names)
        }
    }

    /// Reconcile a raw multiselect state.
    ///
    /// The "All classes" entry wins over any explicit names picked alongside
    /// it, and an empty pick means all classes.
    pub fn from_choices<S: AsRef<str>>(choices: &[S]) -> Self {
        if choices
            .iter()
            .any(|choice| choice.as_ref().eq_ignore_ascii_case(ALL_CLASSES))
        {
            return Self::All;
        }
        Self::only(
            choices
                .iter()
                .map(|choice| choice.as_ref().trim())
                .filter(|choice| !choice.is_empty()),
        )
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    /// Resolve against a model's class map. `None` means no filtering.
    pub fn resolve(&self, names: &ClassNameMap) -> Option<AllowedClasses> {
        resolve(self, names)
    }
}

/// Resolve a selection into the class ids a detector should keep.
///
/// Returns `None` for `All`, and also when nothing in the selection matches
/// the map: an empty allow-list would silently mean "detect nothing".
pub fn resolve(selection: &ClassSelection, names: &ClassNameMap) -> Option<AllowedClasses> {
    let ClassSelection::Only(wanted) = selection else {
        return None;
    };
    let ids = names.ids_for(wanted.iter().map(String::as_str));
    if ids.is_empty() {
        log::warn!(
            "class selection {:?} matches no model class; detecting all classes",
            wanted
        );
        return None;
    }
    Some(ids)
}

impl fmt::Display for ClassSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Only(names) => {
                let joined: Vec<&str> = names.iter().map(String::as_str).collect();
                f.write_str(&joined.join(","))
            }
        }
    }
}

impl FromStr for ClassSelection {
    type Err = std::convert::Infallible;

    /// Parses `all` or a comma separated list of class names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        let choices: Vec<&str> = trimmed.split(',').collect();
        Ok(Self::from_choices(&choices))
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum SelectionRepr {
    Keyword(String),
    Names(Vec<String>),
}

impl TryFrom<SelectionRepr> for ClassSelection {
    type Error = String;

    fn try_from(repr: SelectionRepr) -> Result<Self, Self::Error> {
        match repr {
            SelectionRepr::Keyword(word) => word
                .parse()
                .map_err(|_| format!("invalid class selection '{}'", word)),
            SelectionRepr::Names(names) => Ok(Self::from_choices(&names)),
        }
    }
}

impl From<ClassSelection> for SelectionRepr {
    fn from(selection: ClassSelection) -> Self {
        match selection {
            ClassSelection::All => SelectionRepr::Keyword("all".to_string()),
            ClassSelection::Only(names) => SelectionRepr::Names(names.into_iter().collect()),
        }
    }
}
