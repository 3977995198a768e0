//! Branch predicate evaluation
//!
//! Pure functions over the variable store. Malformed comparisons (bad regex,
//! non-numeric operands) evaluate to `false`; nothing here returns an error.

use crate::flow::{ComparisonOperator, ConditionComparison, ConditionGroup, LogicalOperator};
use crate::variables::VariableStore;
use regex::RegexBuilder;

/// Compiled-size ceiling for operator-authored patterns
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Outcome of evaluating a condition node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionMatch<'a> {
    Group(&'a str),
    None,
}

/// First group (in list order) whose comparisons hold wins.
pub fn evaluate<'a>(groups: &'a [ConditionGroup], store: &VariableStore) -> ConditionMatch<'a> {
    groups
        .iter()
        .find(|group| group_holds(group, store))
        .map_or(ConditionMatch::None, |group| ConditionMatch::Group(&group.id))
}

fn group_holds(group: &ConditionGroup, store: &VariableStore) -> bool {
    let mut results = group.comparisons.iter().map(|c| comparison_holds(c, store));
    match group.logical_operator {
        LogicalOperator::And => results.all(|r| r),
        LogicalOperator::Or => results.any(|r| r),
    }
}

pub fn comparison_holds(comparison: &ConditionComparison, store: &VariableStore) -> bool {
    let actual = store.get(&comparison.variable_name);
    // Right-hand side may reference other variables; the left side is always raw.
    let expected = comparison
        .value
        .as_deref()
        .map(|v| store.interpolate(v))
        .unwrap_or_default();
    let lhs = actual.unwrap_or_default();

    match comparison.operator {
        ComparisonOperator::Equals => lhs == expected,
        ComparisonOperator::NotEquals => lhs != expected,
        ComparisonOperator::Contains => lhs.contains(expected.as_str()),
        ComparisonOperator::NotContains => !lhs.contains(expected.as_str()),
        ComparisonOperator::GreaterThan => {
            numeric_pair(lhs, &expected).is_some_and(|(l, r)| l > r)
        }
        ComparisonOperator::LessThan => numeric_pair(lhs, &expected).is_some_and(|(l, r)| l < r),
        ComparisonOperator::IsSet => is_set(actual),
        ComparisonOperator::IsEmpty => !is_set(actual),
        ComparisonOperator::StartsWith => lhs.starts_with(expected.as_str()),
        ComparisonOperator::EndsWith => lhs.ends_with(expected.as_str()),
        ComparisonOperator::MatchesRegex => regex_matches(&expected, lhs).unwrap_or(false),
        ComparisonOperator::NotMatchesRegex => {
            regex_matches(&expected, lhs).is_some_and(|matched| !matched)
        }
    }
}

fn is_set(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.is_empty())
}

fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

fn numeric_pair(lhs: &str, rhs: &str) -> Option<(f64, f64)> {
    Some((parse_number(lhs)?, parse_number(rhs)?))
}

/// `None` when the pattern does not compile
fn regex_matches(pattern: &str, haystack: &str) -> Option<bool> {
    match RegexBuilder::new(pattern).size_limit(REGEX_SIZE_LIMIT).build() {
        Ok(re) => Some(re.is_match(haystack)),
        Err(e) => {
            tracing::debug!(pattern, error = %e, "Comparison regex failed to compile");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmp(var: &str, operator: ComparisonOperator, value: Option<&str>) -> ConditionComparison {
        ConditionComparison {
            id: format!("{var}-cmp"),
            variable_name: var.to_string(),
            operator,
            value: value.map(String::from),
        }
    }

    fn group(id: &str, op: LogicalOperator, comparisons: Vec<ConditionComparison>) -> ConditionGroup {
        ConditionGroup {
            id: id.to_string(),
            comparisons,
            logical_operator: op,
        }
    }

    fn store(pairs: &[(&str, &str)]) -> VariableStore {
        let mut store = VariableStore::new();
        for (k, v) in pairs {
            store.set(*k, *v);
        }
        store
    }

    #[test]
    fn test_first_matching_group_wins() {
        let s = store(&[("x", "1")]);
        let groups = vec![
            group("G1", LogicalOperator::And, vec![cmp("x", ComparisonOperator::Equals, Some("2"))]),
            group("G2", LogicalOperator::And, vec![cmp("x", ComparisonOperator::Equals, Some("1"))]),
            group("G3", LogicalOperator::And, vec![cmp("x", ComparisonOperator::IsSet, None)]),
        ];
        assert_eq!(evaluate(&groups, &s), ConditionMatch::Group("G2"));
    }

    #[test]
    fn test_no_group_matches() {
        let s = store(&[("age", "17")]);
        let groups = vec![group(
            "G1",
            LogicalOperator::And,
            vec![cmp("age", ComparisonOperator::GreaterThan, Some("18"))],
        )];
        assert_eq!(evaluate(&groups, &s), ConditionMatch::None);
    }

    #[test]
    fn test_numeric_compare_is_numeric_not_lexical() {
        let s = store(&[("n", "9")]);
        assert!(comparison_holds(&cmp("n", ComparisonOperator::LessThan, Some("10")), &s));
        assert!(!comparison_holds(&cmp("n", ComparisonOperator::GreaterThan, Some("10")), &s));
    }

    #[test]
    fn test_non_numeric_compare_is_false_both_ways() {
        let s = store(&[("n", "abc")]);
        assert!(!comparison_holds(&cmp("n", ComparisonOperator::GreaterThan, Some("1")), &s));
        assert!(!comparison_holds(&cmp("n", ComparisonOperator::LessThan, Some("1")), &s));
        assert!(!comparison_holds(&cmp("missing", ComparisonOperator::LessThan, Some("1")), &s));
    }

    #[test]
    fn test_and_requires_all_or_requires_any() {
        let s = store(&[("a", "x"), ("b", "y")]);
        let comparisons = vec![
            cmp("a", ComparisonOperator::Equals, Some("x")),
            cmp("b", ComparisonOperator::Equals, Some("nope")),
        ];
        assert_eq!(
            evaluate(&[group("G", LogicalOperator::And, comparisons.clone())], &s),
            ConditionMatch::None
        );
        assert_eq!(
            evaluate(&[group("G", LogicalOperator::Or, comparisons)], &s),
            ConditionMatch::Group("G")
        );
    }

    #[test]
    fn test_is_set_and_is_empty() {
        let s = store(&[("blank", ""), ("full", "v")]);
        assert!(comparison_holds(&cmp("full", ComparisonOperator::IsSet, None), &s));
        assert!(!comparison_holds(&cmp("blank", ComparisonOperator::IsSet, None), &s));
        assert!(comparison_holds(&cmp("blank", ComparisonOperator::IsEmpty, None), &s));
        assert!(comparison_holds(&cmp("missing", ComparisonOperator::IsEmpty, None), &s));
    }

    #[test]
    fn test_string_operators() {
        let s = store(&[("email", "ada@example.com")]);
        assert!(comparison_holds(&cmp("email", ComparisonOperator::Contains, Some("@")), &s));
        assert!(comparison_holds(&cmp("email", ComparisonOperator::NotContains, Some("#")), &s));
        assert!(comparison_holds(&cmp("email", ComparisonOperator::StartsWith, Some("ada")), &s));
        assert!(comparison_holds(&cmp("email", ComparisonOperator::EndsWith, Some(".com")), &s));
        assert!(comparison_holds(&cmp("email", ComparisonOperator::NotEquals, Some("bob")), &s));
    }

    #[test]
    fn test_regex_operators_and_bad_patterns() {
        let s = store(&[("code", "AB-123")]);
        assert!(comparison_holds(
            &cmp("code", ComparisonOperator::MatchesRegex, Some(r"^[A-Z]{2}-\d+$")),
            &s
        ));
        assert!(comparison_holds(
            &cmp("code", ComparisonOperator::NotMatchesRegex, Some(r"^\d+$")),
            &s
        ));
        // Unbalanced group never compiles: both forms degrade to false
        assert!(!comparison_holds(&cmp("code", ComparisonOperator::MatchesRegex, Some("(")), &s));
        assert!(!comparison_holds(&cmp("code", ComparisonOperator::NotMatchesRegex, Some("(")), &s));
    }

    #[test]
    fn test_right_hand_side_is_interpolated() {
        let s = store(&[("a", "5"), ("limit", "3")]);
        assert!(comparison_holds(
            &cmp("a", ComparisonOperator::GreaterThan, Some("{{limit}}")),
            &s
        ));
    }
}
