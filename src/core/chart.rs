// File: src/core/chart.rs
use crate::config::FeatureFamily;
use crate::consumer::FeatureConsumer;
use crate::core::extractor::{
    check_alignment, check_factor, check_span, emit_bag_of_words, emit_indicator, emit_internal,
    emit_paired, emit_topics, sti_prefix, FeatureExtractor,
};
use crate::core::types::{Alignment, ChartTranslation, Context, SyntaxInfo, P_E_F_INDEX};
use crate::error::ExtractError;
use log::warn;
use std::collections::HashSet;

impl FeatureExtractor {
    /// Hierarchical (chart) path: same family dispatch as the flat path,
    /// operating on rule candidates, plus the syntax families. `source_side`
    /// is the rule's source string, non-terminal slots included; `lhs`
    /// carries the labels of the rule's left-hand side, `children` one entry
    /// per non-terminal child.
    #[allow(clippy::too_many_arguments)]
    pub fn generate_features_chart(
        &self,
        fc: &mut dyn FeatureConsumer,
        context: &Context,
        source_side: &str,
        lhs: &SyntaxInfo,
        children: &[SyntaxInfo],
        span_start: usize,
        span_end: usize,
        translations: &[ChartTranslation],
        topics: &[String],
    ) -> Result<Vec<f32>, ExtractError> {
        self.chart_features(
            fc, context, source_side, lhs, children, span_start, span_end, translations, topics,
        )
    }

    /// Chart path for call sites that only know the left-hand side of the
    /// rule. Identical dispatch, no per-child syntax features.
    #[allow(clippy::too_many_arguments)]
    pub fn generate_features_chart_lhs(
        &self,
        fc: &mut dyn FeatureConsumer,
        context: &Context,
        source_side: &str,
        lhs: &SyntaxInfo,
        span_start: usize,
        span_end: usize,
        translations: &[ChartTranslation],
        topics: &[String],
    ) -> Result<Vec<f32>, ExtractError> {
        self.chart_features(
            fc, context, source_side, lhs, &[], span_start, span_end, translations, topics,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn chart_features(
        &self,
        fc: &mut dyn FeatureConsumer,
        context: &Context,
        source_side: &str,
        lhs: &SyntaxInfo,
        children: &[SyntaxInfo],
        span_start: usize,
        span_end: usize,
        translations: &[ChartTranslation],
        topics: &[String],
    ) -> Result<Vec<f32>, ExtractError> {
        check_span(context, span_start, span_end)?;
        if translations.is_empty() {
            return Err(ExtractError::NoTranslations);
        }
        if self.on(FeatureFamily::Context) || self.on(FeatureFamily::SourceTargetContext) {
            for &factor in self.config.factors() {
                check_factor(context, factor)?;
            }
        }
        if !self.config.is_loaded() {
            warn!("chart extraction with an unloaded config, every feature family is off");
        }

        let source_tokens: Vec<&str> = source_side.split_whitespace().collect();

        // Validate every rule before the first emission.
        let index = self.target_index.read();
        let mut target_tokens: Vec<Vec<&str>> = Vec::with_capacity(translations.len());
        for t in translations {
            if index.phrase_of(t.target_id).is_none() {
                return Err(ExtractError::UnknownTargetId(t.target_id));
            }
            let tokens: Vec<&str> = t.target_rep.split_whitespace().collect();
            check_partition(&t.term_alignment, &t.nonterm_alignment)?;
            check_alignment(&t.term_alignment, source_tokens.len(), tokens.len())?;
            check_alignment(&t.nonterm_alignment, source_tokens.len(), tokens.len())?;
            self.check_scores(&t.scores)?;
            target_tokens.push(tokens);
        }
        let max = Self::max_prob_chart(translations)?;

        fc.set_namespace('s', true);
        let sti = sti_prefix(&source_tokens);
        if self.on(FeatureFamily::Context) {
            self.emit_context(context, span_start, span_end, "", fc);
        }
        if self.on(FeatureFamily::SourceTargetContext) {
            self.emit_context(context, span_start, span_end, &sti, fc);
        }
        if self.on(FeatureFamily::BagOfWords) {
            emit_bag_of_words(context, span_start, span_end, "", fc);
        }
        if self.on(FeatureFamily::SourceTargetBagOfWords) {
            emit_bag_of_words(context, span_start, span_end, &sti, fc);
        }
        if self.on(FeatureFamily::SourceInternal) {
            emit_internal(&source_tokens, "w", "", fc);
        }
        if self.on(FeatureFamily::SourceIndicator) {
            emit_indicator(&source_tokens, "p", "", fc);
        }
        if self.on(FeatureFamily::SourceTopic) {
            emit_topics(&source_tokens, topics, fc);
        }
        if self.on(FeatureFamily::SyntaxParent) {
            emit_lhs_syntax(lhs, "", fc);
        }
        if self.on(FeatureFamily::SyntaxChildren) {
            emit_rhs_syntax(children, fc);
        }

        let mut losses = Vec::with_capacity(translations.len());
        for (t, tokens) in translations.iter().zip(&target_tokens) {
            fc.set_namespace('p', false);

            // Target positions filled by non-terminals are grammar slots,
            // not words. Word-level families skip them.
            let slots: HashSet<usize> = t.nonterm_alignment.iter().map(|&(_, tp)| tp).collect();
            let terminal_words: Vec<&str> = tokens
                .iter()
                .enumerate()
                .filter(|(i, _)| !slots.contains(i))
                .map(|(_, w)| *w)
                .collect();

            if self.on(FeatureFamily::TargetInternal) {
                emit_internal(&terminal_words, "tw", "", fc);
            }
            if self.on(FeatureFamily::SourceTargetInternal) {
                emit_internal(&terminal_words, "tw", &sti, fc);
            }
            if self.on(FeatureFamily::TargetIndicator) {
                emit_indicator(&terminal_words, "tp", "", fc);
            }
            if self.on(FeatureFamily::Paired) {
                emit_paired(&source_tokens, tokens, &t.term_alignment, "", fc);
            }
            if self.on(FeatureFamily::SourceTargetPaired) {
                emit_paired(&source_tokens, tokens, &t.term_alignment, &sti, fc);
            }
            if self.on(FeatureFamily::SourceTargetSyntax) {
                emit_lhs_syntax(lhs, &sti, fc);
            }
            if self.on(FeatureFamily::Scores) {
                self.emit_scores(&t.scores, "", fc);
            }
            if self.on(FeatureFamily::SourceTargetScore) {
                self.emit_scores(&t.scores, &sti, fc);
            }
            let best = t.scores[P_E_F_INDEX] >= max;
            if best && self.on(FeatureFamily::MostFrequent) {
                fc.add_feature("freq^best");
            }
            if best && self.on(FeatureFamily::SourceTargetMostFrequent) {
                fc.add_feature(&format!("{sti}freq^best"));
            }

            let loss = (max - t.scores[P_E_F_INDEX]) as f32;
            let label = t.target_id.to_string();
            if self.train {
                fc.train(&label, loss);
            } else {
                fc.predict(&label);
            }
            losses.push(loss);
        }
        fc.finish_example();
        Ok(losses)
    }

    /// Maximum P(target|source) across the rule candidates.
    pub fn max_prob_chart(translations: &[ChartTranslation]) -> Result<f64, ExtractError> {
        if translations.is_empty() {
            return Err(ExtractError::NoTranslations);
        }
        let mut max = f64::NEG_INFINITY;
        for t in translations {
            let p = *t
                .scores
                .get(P_E_F_INDEX)
                .ok_or(ExtractError::ScoreIndexOutOfBounds {
                    index: P_E_F_INDEX,
                    len: t.scores.len(),
                })?;
            max = max.max(p);
        }
        Ok(max)
    }
}

/// Terminal and non-terminal alignments must partition the rule's aligned
/// positions. A position on both sides would be counted as a word and as a
/// grammar slot at once, so overlap rejects the call.
fn check_partition(term: &Alignment, nonterm: &Alignment) -> Result<(), ExtractError> {
    let term_src: HashSet<usize> = term.iter().map(|&(s, _)| s).collect();
    let term_tgt: HashSet<usize> = term.iter().map(|&(_, t)| t).collect();
    for &(s, t) in nonterm {
        if term_src.contains(&s) {
            return Err(ExtractError::OverlappingAlignments(s));
        }
        if term_tgt.contains(&t) {
            return Err(ExtractError::OverlappingAlignments(t));
        }
    }
    Ok(())
}

fn emit_lhs_syntax(lhs: &SyntaxInfo, prefix: &str, fc: &mut dyn FeatureConsumer) {
    for label in &lhs.labels {
        fc.add_feature(&format!("{prefix}lhs^{label}^{}^{}", lhs.parent, lhs.span));
    }
}

fn emit_rhs_syntax(children: &[SyntaxInfo], fc: &mut dyn FeatureConsumer) {
    for (i, child) in children.iter().enumerate() {
        for label in &child.labels {
            fc.add_feature(&format!("rhs^{i}^{label}^{}^{}", child.parent, child.span));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractorConfig;
    use crate::consumer::{CollectingConsumer, Event};
    use crate::core::target_index::TargetIndex;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn ctx(words: &[&str]) -> Context {
        words.iter().map(|w| vec![w.to_string()]).collect()
    }

    fn extractor(config_json: &str, phrases: &[&str], train: bool) -> FeatureExtractor {
        let config = Arc::new(ExtractorConfig::load_str(config_json).unwrap());
        let mut index = TargetIndex::new();
        for p in phrases {
            index.intern(p);
        }
        FeatureExtractor::new(index.into_shared(), config, train)
    }

    fn rule(
        target_id: usize,
        target_rep: &str,
        term: Alignment,
        nonterm: Alignment,
        p_e_f: f64,
    ) -> ChartTranslation {
        ChartTranslation {
            target_id,
            target_rep: target_rep.to_string(),
            term_alignment: term,
            nonterm_alignment: nonterm,
            scores: vec![0.0, 0.0, p_e_f],
            rule_count: 1,
        }
    }

    fn lhs() -> SyntaxInfo {
        SyntaxInfo {
            labels: vec!["NP".to_string(), "NN".to_string()],
            parent: "S".to_string(),
            span: "the_dog".to_string(),
        }
    }

    const BARE: &str = r#"{"window-size": 1, "factors": [0]}"#;

    #[test]
    fn overlapping_alignments_reject_the_call_with_nothing_emitted() {
        let ex = extractor(BARE, &["der [X] hund"], true);
        let mut fc = CollectingConsumer::new();
        let bad = rule(0, "der [X] hund", vec![(0, 0)], vec![(0, 1)], 0.5);

        let result = ex.generate_features_chart_lhs(
            &mut fc,
            &ctx(&["the", "dog"]),
            "the [X] dog",
            &lhs(),
            0,
            1,
            &[bad],
            &[],
        );
        assert!(matches!(result, Err(ExtractError::OverlappingAlignments(0))));
        assert!(fc.events.is_empty());
    }

    #[test]
    fn word_level_families_skip_non_terminal_slots() {
        let config = r#"{"target-internal": true, "target-indicator": true,
                         "window-size": 1, "factors": [0]}"#;
        let ex = extractor(config, &["der [X] hund"], true);
        let mut fc = CollectingConsumer::new();
        let r = rule(0, "der [X] hund", vec![(0, 0), (2, 2)], vec![(1, 1)], 0.5);

        ex.generate_features_chart_lhs(
            &mut fc,
            &ctx(&["the", "big", "dog"]),
            "the [X] dog",
            &lhs(),
            0,
            2,
            &[r],
            &[],
        )
        .unwrap();

        assert_eq!(
            fc.feature_names(),
            vec!["tw^der", "tw^hund", "tp^der_hund"]
        );
    }

    #[test]
    fn paired_chart_features_use_the_terminal_alignment_only() {
        let config = r#"{"paired": true, "window-size": 1, "factors": [0]}"#;
        let ex = extractor(config, &["der [X] hund"], true);
        let mut fc = CollectingConsumer::new();
        let r = rule(0, "der [X] hund", vec![(0, 0), (2, 2)], vec![(1, 1)], 0.5);

        ex.generate_features_chart_lhs(
            &mut fc,
            &ctx(&["the", "big", "dog"]),
            "the [X] dog",
            &lhs(),
            0,
            2,
            &[r],
            &[],
        )
        .unwrap();

        assert_eq!(fc.feature_names(), vec!["pair^the^der", "pair^dog^hund"]);
    }

    #[test]
    fn lhs_syntax_features_combine_label_parent_and_span() {
        let config = r#"{"syntax-parent": true, "window-size": 1, "factors": [0]}"#;
        let ex = extractor(config, &["der hund"], true);
        let mut fc = CollectingConsumer::new();
        let r = rule(0, "der hund", vec![(0, 0), (1, 1)], vec![], 0.5);

        ex.generate_features_chart_lhs(
            &mut fc,
            &ctx(&["the", "dog"]),
            "the dog",
            &lhs(),
            0,
            1,
            &[r],
            &[],
        )
        .unwrap();

        assert_eq!(
            fc.feature_names(),
            vec!["lhs^NP^S^the_dog", "lhs^NN^S^the_dog"]
        );
    }

    #[test]
    fn rhs_syntax_features_cover_each_child() {
        let config = r#"{"syntax-children": true, "window-size": 1, "factors": [0]}"#;
        let ex = extractor(config, &["der [X] hund"], true);
        let mut fc = CollectingConsumer::new();
        let r = rule(0, "der [X] hund", vec![(0, 0), (2, 2)], vec![(1, 1)], 0.5);
        let children = [SyntaxInfo {
            labels: vec!["JJ".to_string()],
            parent: "NP".to_string(),
            span: "big".to_string(),
        }];

        ex.generate_features_chart(
            &mut fc,
            &ctx(&["the", "big", "dog"]),
            "the [X] dog",
            &lhs(),
            &children,
            0,
            2,
            &[r],
            &[],
        )
        .unwrap();

        assert_eq!(fc.feature_names(), vec!["rhs^0^JJ^NP^big"]);
    }

    #[test]
    fn source_prefixed_syntax_runs_per_candidate() {
        let config = r#"{"source-target-indicator-syntax": true, "window-size": 1, "factors": [0]}"#;
        let ex = extractor(config, &["der hund", "ein hund"], true);
        let mut fc = CollectingConsumer::new();
        let rules = [
            rule(0, "der hund", vec![(0, 0), (1, 1)], vec![], 0.6),
            rule(1, "ein hund", vec![(0, 0), (1, 1)], vec![], 0.4),
        ];

        ex.generate_features_chart_lhs(
            &mut fc,
            &ctx(&["the", "dog"]),
            "the dog",
            &lhs(),
            0,
            1,
            &rules,
            &[],
        )
        .unwrap();

        let names = fc.feature_names();
        assert_eq!(names.len(), 4);
        assert!(names.iter().all(|n| n.starts_with("sti^the_dog^lhs^")));
    }

    #[test]
    fn chart_losses_mirror_the_flat_convention() {
        let ex = extractor(BARE, &["der hund", "ein hund"], true);
        let mut fc = CollectingConsumer::new();
        let rules = [
            rule(0, "der hund", vec![], vec![], 0.7),
            rule(1, "ein hund", vec![], vec![], 0.3),
        ];

        assert_eq!(FeatureExtractor::max_prob_chart(&rules).unwrap(), 0.7);
        let losses = ex
            .generate_features_chart_lhs(
                &mut fc,
                &ctx(&["the", "dog"]),
                "the dog",
                &lhs(),
                0,
                1,
                &rules,
                &[],
            )
            .unwrap();
        assert_eq!(losses[0], 0.0);
        assert!((losses[1] - 0.4).abs() < 1e-6);
        assert!(fc.events.contains(&Event::Train("0".to_string(), 0.0)));
        assert_eq!(fc.events.last(), Some(&Event::FinishExample));
    }

    proptest! {
        #[test]
        fn partition_overlap_is_rejected_everything_else_passes(
            term in proptest::collection::vec((0usize..4, 0usize..4), 0..5),
            nonterm in proptest::collection::vec((0usize..4, 0usize..4), 0..5),
        ) {
            let ex = extractor(BARE, &["a b c d"], true);
            let mut fc = CollectingConsumer::new();
            let r = ChartTranslation {
                target_id: 0,
                target_rep: "a b c d".to_string(),
                term_alignment: term.clone(),
                nonterm_alignment: nonterm.clone(),
                scores: vec![0.0, 0.0, 0.5],
                rule_count: 1,
            };
            let result = ex.generate_features_chart_lhs(
                &mut fc,
                &ctx(&["w", "x", "y", "z"]),
                "p q r s",
                &lhs(),
                0,
                3,
                &[r],
                &[],
            );

            let term_src: HashSet<usize> = term.iter().map(|&(s, _)| s).collect();
            let term_tgt: HashSet<usize> = term.iter().map(|&(_, t)| t).collect();
            let overlap = nonterm
                .iter()
                .any(|&(s, t)| term_src.contains(&s) || term_tgt.contains(&t));

            prop_assert_eq!(result.is_err(), overlap);
            if overlap {
                prop_assert!(fc.events.is_empty());
            }
        }
    }
}
