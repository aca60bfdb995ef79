//! Core identifier types for the stepbench interpreter.
//!
//! This module defines the small shared vocabulary used across the crate:
//! the two mutually exclusive query languages a state can evaluate
//! expressions in, and the discriminant naming each state variant.
//!
//! # Examples
//!
//! ```rust
//! use stepbench::types::{QueryLanguage, StateKind};
//!
//! let lang = QueryLanguage::from("JSONata");
//! assert_eq!(lang, QueryLanguage::Jsonata);
//! assert_eq!(lang.to_string(), "JSONata");
//!
//! assert_eq!(StateKind::Task.to_string(), "Task");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// The expression language a state evaluates its fields in.
///
/// Every state machine declares a top-level language (defaulting to
/// JSONPath); individual `Map` states and plain states may override it.
/// The two languages carry disjoint field sets, enforced at factory time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum QueryLanguage {
    /// Classic path-based data flow: `InputPath`, `Parameters`,
    /// `ResultSelector`, `ResultPath`, `OutputPath`, `States.*` intrinsics.
    #[default]
    JsonPath,
    /// Expression-based data flow: `Arguments`, `Output`, `{% … %}`
    /// expressions with `$states` bindings.
    Jsonata,
}

impl QueryLanguage {
    #[must_use]
    pub fn is_jsonata(&self) -> bool {
        matches!(self, Self::Jsonata)
    }

    #[must_use]
    pub fn is_jsonpath(&self) -> bool {
        matches!(self, Self::JsonPath)
    }
}

impl fmt::Display for QueryLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::JsonPath => write!(f, "JSONPath"),
            Self::Jsonata => write!(f, "JSONata"),
        }
    }
}

impl From<&str> for QueryLanguage {
    fn from(s: &str) -> Self {
        match s {
            "JSONata" => Self::Jsonata,
            _ => Self::JsonPath,
        }
    }
}

/// Discriminant naming a state variant, as written in the `Type` field of a
/// raw definition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateKind {
    Task,
    Pass,
    Choice,
    Wait,
    Succeed,
    Fail,
    Map,
    Parallel,
}

impl StateKind {
    /// Parse the raw `Type` field. Unknown types are a definition error
    /// handled by the factory, so this returns `None` rather than guessing.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Task" => Some(Self::Task),
            "Pass" => Some(Self::Pass),
            "Choice" => Some(Self::Choice),
            "Wait" => Some(Self::Wait),
            "Succeed" => Some(Self::Succeed),
            "Fail" => Some(Self::Fail),
            "Map" => Some(Self::Map),
            "Parallel" => Some(Self::Parallel),
            _ => None,
        }
    }

    /// Terminal states may not carry `Next`, `End`, `Retry`, or `Catch`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeed | Self::Fail)
    }
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Task => "Task",
            Self::Pass => "Pass",
            Self::Choice => "Choice",
            Self::Wait => "Wait",
            Self::Succeed => "Succeed",
            Self::Fail => "Fail",
            Self::Map => "Map",
            Self::Parallel => "Parallel",
        };
        write!(f, "{name}")
    }
}
