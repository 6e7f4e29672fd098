// File: src/core/types.rs
use serde::{Deserialize, Serialize};
use std::fmt;

/// A unique identifier for a target-side phrase in the shared index.
pub type TargetId = usize;

/// One source sentence: a vector of words, each word a vector of factor
/// strings (surface form, optionally POS, lemma, ...). Every word carries
/// the same factor count.
pub type Context = Vec<Vec<String>>;

/// Word alignment as explicit (source position, target position) pairs.
/// A position may appear in zero, one, or many pairs on either side.
pub type Alignment = Vec<(usize, usize)>;

/// Index of the surface form inside a word's factor vector.
pub const FACTOR_FORM: usize = 0;
/// Index of the P(target|source) score inside a candidate's score vector.
pub const P_E_F_INDEX: usize = 2;

/// A flat phrase-table candidate for one source span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Translation {
    pub target_id: TargetId,
    pub alignment: Alignment,
    pub scores: Vec<f64>,
}

/// A hierarchical (synchronous-grammar) rule candidate. Terminal and
/// non-terminal alignments are disjoint: a rule position is either a real
/// word link or a grammar slot, never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartTranslation {
    pub target_id: TargetId,
    /// Target-side surface string, non-terminal slots included.
    pub target_rep: String,
    pub term_alignment: Alignment,
    pub nonterm_alignment: Alignment,
    pub scores: Vec<f64>,
    pub rule_count: u32,
}

impl fmt::Display for ChartTranslation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rule #{} -> \"{}\" ({} applications)",
            self.target_id, self.target_rep, self.rule_count
        )
    }
}

/// Syntax-label bundle for a rule's left-hand side or for one non-terminal
/// child: the candidate labels, the parent label, and the covered span
/// rendered as a string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyntaxInfo {
    pub labels: Vec<String>,
    pub parent: String,
    pub span: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chart_translation_renders_without_side_effects() {
        let t = ChartTranslation {
            target_id: 7,
            target_rep: "der [X] hund".to_string(),
            term_alignment: vec![(0, 0)],
            nonterm_alignment: vec![(1, 1)],
            scores: vec![0.1, 0.2, 0.3],
            rule_count: 2,
        };
        assert_eq!(t.to_string(), "rule #7 -> \"der [X] hund\" (2 applications)");
    }
}
