//! Choice rule model.
//!
//! JSONPath rules combine a `Variable` reference with one comparison
//! operator, or nest boolean combinators. JSONata rules carry a single
//! `{% … %}`-wrapped `Condition`.

use serde_json::Value;

/// A top-level choice rule: a test plus the transition it selects.
#[derive(Clone, Debug)]
pub struct ChoiceRule {
    pub test: ChoiceTest,
    pub next: String,
    pub assign: Option<Value>,
}

#[derive(Clone, Debug)]
pub enum ChoiceTest {
    /// JSONata rule: the raw `{% … %}`-wrapped condition.
    Condition(String),
    And(Vec<ChoiceTest>),
    Or(Vec<ChoiceTest>),
    Not(Box<ChoiceTest>),
    /// Binary comparison, e.g. `StringEquals` / `NumericLessThanPath`.
    Compare {
        variable: String,
        subject: CompareSubject,
        relation: CompareRelation,
        by_path: bool,
        value: Value,
    },
    /// Type/presence test, e.g. `IsPresent: false`, `IsNull: true`.
    Unary {
        variable: String,
        test: UnaryTest,
        expected: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareSubject {
    String,
    Numeric,
    Boolean,
    Timestamp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareRelation {
    Equals,
    LessThan,
    LessThanEquals,
    GreaterThan,
    GreaterThanEquals,
    /// `StringMatches`, with `*` wildcards.
    Matches,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryTest {
    IsNull,
    IsPresent,
    IsNumeric,
    IsString,
    IsBoolean,
    IsTimestamp,
}

/// Recognize a comparison field name. Returns `None` for non-operator
/// fields like `Variable` or `Next`.
#[must_use]
pub fn parse_operator(name: &str) -> Option<ParsedOperator> {
    let unary = match name {
        "IsNull" => Some(UnaryTest::IsNull),
        "IsPresent" => Some(UnaryTest::IsPresent),
        "IsNumeric" => Some(UnaryTest::IsNumeric),
        "IsString" => Some(UnaryTest::IsString),
        "IsBoolean" => Some(UnaryTest::IsBoolean),
        "IsTimestamp" => Some(UnaryTest::IsTimestamp),
        _ => None,
    };
    if let Some(test) = unary {
        return Some(ParsedOperator::Unary(test));
    }

    let (name, by_path) = match name.strip_suffix("Path") {
        Some(base) => (base, true),
        None => (name, false),
    };
    let subjects = [
        ("String", CompareSubject::String),
        ("Numeric", CompareSubject::Numeric),
        ("Boolean", CompareSubject::Boolean),
        ("Timestamp", CompareSubject::Timestamp),
    ];
    for (prefix, subject) in subjects {
        if let Some(rest) = name.strip_prefix(prefix) {
            let relation = match rest {
                "Equals" => CompareRelation::Equals,
                "LessThan" => CompareRelation::LessThan,
                "LessThanEquals" => CompareRelation::LessThanEquals,
                "GreaterThan" => CompareRelation::GreaterThan,
                "GreaterThanEquals" => CompareRelation::GreaterThanEquals,
                "Matches" if subject == CompareSubject::String && !by_path => {
                    CompareRelation::Matches
                }
                _ => continue,
            };
            return Some(ParsedOperator::Compare {
                subject,
                relation,
                by_path,
            });
        }
    }
    None
}

#[derive(Clone, Copy, Debug)]
pub enum ParsedOperator {
    Unary(UnaryTest),
    Compare {
        subject: CompareSubject,
        relation: CompareRelation,
        by_path: bool,
    },
}

/// `StringMatches` wildcard matching: `*` matches any run of characters.
#[must_use]
pub fn wildcard_match(pattern: &str, value: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == value;
    }
    let mut rest = value;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    // Pattern ended with `*` (or the trailing part was consumed).
    true
}
