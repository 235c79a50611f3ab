//! The ordered (category, trigger, weight) table that drives extraction.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracery_types::NodeType;

use crate::error::{ExtractError, Result};

/// Categories extraction is allowed to produce.
const EXTRACTABLE: [NodeType; 5] = [
    NodeType::Insight,
    NodeType::Decision,
    NodeType::ActionItem,
    NodeType::Test,
    NodeType::Agent,
];

/// One row of the pattern table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRule {
    /// Node type produced on a match.
    pub category: NodeType,
    /// Short label recorded on the produced node.
    pub label: String,
    /// Trigger regex, matched case-insensitively.
    pub pattern: String,
    /// Base weight in [0, 1]; also the candidate's confidence.
    pub weight: f64,
}

impl PatternRule {
    pub fn new(
        category: NodeType,
        label: impl Into<String>,
        pattern: impl Into<String>,
        weight: f64,
    ) -> Self {
        Self {
            category,
            label: label.into(),
            pattern: pattern.into(),
            weight,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CompiledRule {
    pub(crate) rule: PatternRule,
    pub(crate) regex: Regex,
}

/// An ordered, validated set of pattern rules.
///
/// Row order matters: when two overlapping matches carry the same weight the
/// earlier row wins.
#[derive(Debug, Clone)]
pub struct PatternTable {
    rules: Vec<CompiledRule>,
}

impl PatternTable {
    /// Compile a table, rejecting invalid rows.
    pub fn new(rules: impl IntoIterator<Item = PatternRule>) -> Result<Self> {
        let compiled = rules
            .into_iter()
            .map(compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules: compiled })
    }

    /// A table with no rules; extracts nothing.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a rule at the lowest precedence.
    pub fn with_rule(mut self, rule: PatternRule) -> Result<Self> {
        self.rules.push(compile(rule)?);
        Ok(self)
    }

    /// Append several rules, keeping their order.
    pub fn extend(mut self, rules: impl IntoIterator<Item = PatternRule>) -> Result<Self> {
        for rule in rules {
            self.rules.push(compile(rule)?);
        }
        Ok(self)
    }

    /// The rules in precedence order.
    pub fn rules(&self) -> impl Iterator<Item = &PatternRule> {
        self.rules.iter().map(|c| &c.rule)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub(crate) fn compiled(&self) -> &[CompiledRule] {
        &self.rules
    }
}

impl Default for PatternTable {
    fn default() -> Self {
        Self::new(default_rules()).expect("built-in pattern table compiles")
    }
}

fn compile(rule: PatternRule) -> Result<CompiledRule> {
    if !EXTRACTABLE.contains(&rule.category) {
        return Err(ExtractError::InvalidCategory(rule.category));
    }
    if !(0.0..=1.0).contains(&rule.weight) || rule.weight.is_nan() {
        return Err(ExtractError::InvalidWeight {
            pattern: rule.pattern.clone(),
            weight: rule.weight,
        });
    }

    let regex = RegexBuilder::new(&rule.pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| ExtractError::InvalidPattern {
            pattern: rule.pattern.clone(),
            source,
        })?;

    if regex.is_match("") {
        return Err(ExtractError::EmptyMatch(rule.pattern));
    }

    Ok(CompiledRule { rule, regex })
}

/// The built-in trigger table.
pub fn default_rules() -> Vec<PatternRule> {
    use NodeType::*;

    vec![
        PatternRule::new(Insight, "key_insight", r"\bkey insight\b:?", 0.8),
        PatternRule::new(Insight, "important_finding", r"\bimportant finding\b:?", 0.8),
        PatternRule::new(Insight, "insight", r"\binsight:", 0.8),
        PatternRule::new(Insight, "discovered_that", r"\bdiscovered that\b", 0.8),
        PatternRule::new(Insight, "realized_that", r"\breali[sz]ed that\b", 0.8),
        PatternRule::new(Insight, "learned_that", r"\blearned that\b", 0.8),
        PatternRule::new(Insight, "bulb", "💡", 0.8),
        PatternRule::new(Decision, "decision", r"\bdecision:", 0.7),
        PatternRule::new(Decision, "decided_to", r"\bdecided to\b", 0.7),
        PatternRule::new(Decision, "chose_to", r"\bchose to\b", 0.7),
        PatternRule::new(Decision, "will_implement", r"\bwill implement\b", 0.7),
        PatternRule::new(Decision, "check", "✅", 0.7),
        PatternRule::new(ActionItem, "todo", r"\btodo:", 0.6),
        PatternRule::new(ActionItem, "action_item", r"\baction item\b:?", 0.6),
        PatternRule::new(ActionItem, "next_step", r"\bnext step\b:?", 0.6),
        PatternRule::new(ActionItem, "need_to", r"\bneed to\b", 0.6),
        PatternRule::new(ActionItem, "target", "🎯", 0.6),
        PatternRule::new(Test, "test", r"\btest:", 0.5),
        PatternRule::new(Test, "test_tube", "🧪", 0.5),
        PatternRule::new(Agent, "agent", r"\bagent:", 0.4),
        PatternRule::new(Agent, "robot", "🤖", 0.4),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_compiles() {
        let table = PatternTable::default();
        assert_eq!(table.len(), default_rules().len());
        assert!(table.rules().all(|r| r.weight > 0.0));
    }

    #[test]
    fn test_rejects_invalid_regex() {
        let err = PatternTable::new([PatternRule::new(NodeType::Insight, "bad", "(unclosed", 0.5)])
            .unwrap_err();
        assert!(matches!(err, ExtractError::InvalidPattern { .. }));
    }

    #[test]
    fn test_rejects_empty_match() {
        let err = PatternTable::new([PatternRule::new(NodeType::Insight, "any", "x*", 0.5)])
            .unwrap_err();
        assert!(matches!(err, ExtractError::EmptyMatch(_)));
    }

    #[test]
    fn test_rejects_structural_category() {
        let err = PatternTable::new([PatternRule::new(NodeType::File, "f", "file:", 0.5)])
            .unwrap_err();
        assert!(matches!(err, ExtractError::InvalidCategory(NodeType::File)));
    }

    #[test]
    fn test_rejects_weight_out_of_range() {
        let err = PatternTable::new([PatternRule::new(NodeType::Decision, "d", "x:", 1.5)])
            .unwrap_err();
        assert!(matches!(err, ExtractError::InvalidWeight { .. }));
    }

    #[test]
    fn test_with_rule_appends_lowest_precedence() {
        let table = PatternTable::empty()
            .with_rule(PatternRule::new(NodeType::Decision, "agreed", r"we agreed to", 0.7))
            .unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.rules().next().unwrap().label, "agreed");
    }
}
