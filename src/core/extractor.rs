// File: src/core/extractor.rs
use crate::config::{ExtractorConfig, FeatureFamily};
use crate::consumer::FeatureConsumer;
use crate::core::target_index::SharedTargetIndex;
use crate::core::types::{Alignment, Context, Translation, FACTOR_FORM, P_E_F_INDEX};
use crate::error::ExtractError;
use log::warn;
use std::sync::Arc;

/// Left / right sentence-boundary sentinels for context positions that fall
/// outside the sentence.
pub const BOS: &str = "<s>";
pub const EOS: &str = "</s>";

/// Scans the enabled feature families over one span and its candidate
/// translations, streaming named feature events to a consumer.
///
/// Extractors hold no mutable state of their own: the config and the target
/// index are shared snapshots, so instances can be created freely per call
/// or per worker and run in parallel over disjoint spans. Every call either
/// emits the complete example or, on a precondition failure, nothing at all.
pub struct FeatureExtractor {
    pub(crate) target_index: SharedTargetIndex,
    pub(crate) config: Arc<ExtractorConfig>,
    pub(crate) train: bool,
}

impl FeatureExtractor {
    pub fn new(target_index: SharedTargetIndex, config: Arc<ExtractorConfig>, train: bool) -> Self {
        Self {
            target_index,
            config,
            train,
        }
    }

    /// Flat (phrase-based) path. Emits the shared source-side features, then
    /// the per-candidate features, closing each candidate with `train` (loss
    /// attached) or `predict`, and the example with `finish_example`.
    ///
    /// Returns the per-candidate loss vector: `max_prob - p(target|source)`,
    /// zero for the best candidate, growing linearly for worse ones.
    pub fn generate_features(
        &self,
        fc: &mut dyn FeatureConsumer,
        context: &Context,
        span_start: usize,
        span_end: usize,
        translations: &[Translation],
        topics: &[String],
    ) -> Result<Vec<f32>, ExtractError> {
        check_span(context, span_start, span_end)?;
        if translations.is_empty() {
            return Err(ExtractError::NoTranslations);
        }
        check_factor(context, FACTOR_FORM)?;
        if self.on(FeatureFamily::Context) || self.on(FeatureFamily::SourceTargetContext) {
            for &factor in self.config.factors() {
                check_factor(context, factor)?;
            }
        }
        if !self.config.is_loaded() {
            warn!("extraction with an unloaded config, every feature family is off");
        }

        let source_words = factor_values(context, span_start, span_end, FACTOR_FORM);

        // Resolve and validate every candidate before the first emission so
        // a failed call leaves the consumer untouched.
        let index = self.target_index.read();
        let mut target_words: Vec<Vec<&str>> = Vec::with_capacity(translations.len());
        for t in translations {
            let phrase = index
                .phrase_of(t.target_id)
                .ok_or(ExtractError::UnknownTargetId(t.target_id))?;
            let words: Vec<&str> = phrase.split_whitespace().collect();
            check_alignment(&t.alignment, source_words.len(), words.len())?;
            self.check_scores(&t.scores)?;
            target_words.push(words);
        }
        let max = Self::max_prob(translations)?;

        fc.set_namespace('s', true);
        let sti = sti_prefix(&source_words);
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
            emit_internal(&source_words, "w", "", fc);
        }
        if self.on(FeatureFamily::SourceIndicator) {
            emit_indicator(&source_words, "p", "", fc);
        }
        if self.on(FeatureFamily::SourceTopic) {
            emit_topics(&source_words, topics, fc);
        }

        let mut losses = Vec::with_capacity(translations.len());
        for (t, tgt) in translations.iter().zip(&target_words) {
            fc.set_namespace('p', false);
            if self.on(FeatureFamily::TargetInternal) {
                emit_internal(tgt, "tw", "", fc);
            }
            if self.on(FeatureFamily::SourceTargetInternal) {
                emit_internal(tgt, "tw", &sti, fc);
            }
            if self.on(FeatureFamily::TargetIndicator) {
                emit_indicator(tgt, "tp", "", fc);
            }
            if self.on(FeatureFamily::Paired) {
                emit_paired(&source_words, tgt, &t.alignment, "", fc);
            }
            if self.on(FeatureFamily::SourceTargetPaired) {
                emit_paired(&source_words, tgt, &t.alignment, &sti, fc);
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

    /// Maximum P(target|source) across the candidates.
    pub fn max_prob(translations: &[Translation]) -> Result<f64, ExtractError> {
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

    pub(crate) fn on(&self, family: FeatureFamily) -> bool {
        self.config.is_enabled(family)
    }

    /// One feature per (factor, offset) around the span. Offsets -w..=-1 are
    /// taken left of `span_start`, 1..=w right of `span_end`; positions past
    /// the sentence produce the boundary sentinels.
    pub(crate) fn emit_context(
        &self,
        context: &Context,
        span_start: usize,
        span_end: usize,
        prefix: &str,
        fc: &mut dyn FeatureConsumer,
    ) {
        let len = context.len() as isize;
        let window = self.config.window_size() as isize;
        for &factor in self.config.factors() {
            for off in (-window..0).chain(1..=window) {
                let pos = if off < 0 {
                    span_start as isize + off
                } else {
                    span_end as isize + off
                };
                let value = if pos < 0 {
                    BOS
                } else if pos >= len {
                    EOS
                } else {
                    context[pos as usize][factor].as_str()
                };
                fc.add_feature(&format!("{prefix}c^{factor}_{off}^{value}"));
            }
        }
    }

    /// Raw or binned features for the configured score slots.
    pub(crate) fn emit_scores(&self, scores: &[f64], prefix: &str, fc: &mut dyn FeatureConsumer) {
        for &idx in self.config.score_indexes() {
            if self.config.binned_scores() {
                let bucket = bin_of(scores[idx], self.config.score_bins());
                fc.add_feature(&format!("{prefix}bin^{idx}_{bucket}"));
            } else {
                fc.add_feature_value(&format!("{prefix}sc^{idx}"), scores[idx]);
            }
        }
    }

    pub(crate) fn check_scores(&self, scores: &[f64]) -> Result<(), ExtractError> {
        if scores.len() <= P_E_F_INDEX {
            return Err(ExtractError::ScoreIndexOutOfBounds {
                index: P_E_F_INDEX,
                len: scores.len(),
            });
        }
        if self.on(FeatureFamily::Scores) || self.on(FeatureFamily::SourceTargetScore) {
            for &idx in self.config.score_indexes() {
                if idx >= scores.len() {
                    return Err(ExtractError::ScoreIndexOutOfBounds {
                        index: idx,
                        len: scores.len(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Bucket index for `score` among ascending boundaries: bucket `i` iff
/// `bins[i-1] <= score < bins[i]`, with open-ended first and last buckets.
pub(crate) fn bin_of(score: f64, bins: &[f64]) -> usize {
    bins.iter().position(|b| score < *b).unwrap_or(bins.len())
}

pub(crate) fn check_span(context: &Context, start: usize, end: usize) -> Result<(), ExtractError> {
    if start > end || end >= context.len() {
        return Err(ExtractError::SpanOutOfBounds {
            start,
            end,
            len: context.len(),
        });
    }
    Ok(())
}

pub(crate) fn check_factor(context: &Context, factor: usize) -> Result<(), ExtractError> {
    let count = context.iter().map(Vec::len).min().unwrap_or(0);
    if factor >= count {
        return Err(ExtractError::FactorOutOfBounds { factor, count });
    }
    Ok(())
}

pub(crate) fn check_alignment(
    alignment: &Alignment,
    src_len: usize,
    tgt_len: usize,
) -> Result<(), ExtractError> {
    for &(s, t) in alignment {
        if s >= src_len || t >= tgt_len {
            return Err(ExtractError::AlignmentOutOfBounds {
                src: s,
                tgt: t,
            });
        }
    }
    Ok(())
}

/// Values of one factor across the span, in order.
pub(crate) fn factor_values(
    context: &Context,
    start: usize,
    end: usize,
    factor: usize,
) -> Vec<String> {
    context[start..=end]
        .iter()
        .map(|word| word[factor].clone())
        .collect()
}

/// Key prefix for the local-model family group: the concatenated
/// source-side surface string.
pub(crate) fn sti_prefix<S: AsRef<str>>(words: &[S]) -> String {
    let joined = words.iter().map(AsRef::as_ref).collect::<Vec<_>>().join("_");
    format!("sti^{joined}^")
}

pub(crate) fn emit_internal<S: AsRef<str>>(
    words: &[S],
    tag: &str,
    prefix: &str,
    fc: &mut dyn FeatureConsumer,
) {
    for w in words {
        fc.add_feature(&format!("{prefix}{tag}^{}", w.as_ref()));
    }
}

pub(crate) fn emit_indicator<S: AsRef<str>>(
    words: &[S],
    tag: &str,
    prefix: &str,
    fc: &mut dyn FeatureConsumer,
) {
    let joined = words.iter().map(AsRef::as_ref).collect::<Vec<_>>().join("_");
    fc.add_feature(&format!("{prefix}{tag}^{joined}"));
}

pub(crate) fn emit_paired<A: AsRef<str>, B: AsRef<str>>(
    src: &[A],
    tgt: &[B],
    alignment: &Alignment,
    prefix: &str,
    fc: &mut dyn FeatureConsumer,
) {
    for &(s, t) in alignment {
        fc.add_feature(&format!(
            "{prefix}pair^{}^{}",
            src[s].as_ref(),
            tgt[t].as_ref()
        ));
    }
}

/// Every context word outside the span, surface factor. Repeated words emit
/// once per occurrence, so duplicates weight proportionally downstream.
pub(crate) fn emit_bag_of_words(
    context: &Context,
    span_start: usize,
    span_end: usize,
    prefix: &str,
    fc: &mut dyn FeatureConsumer,
) {
    for pos in (0..span_start).chain(span_end + 1..context.len()) {
        fc.add_feature(&format!("{prefix}bow^{}", context[pos][FACTOR_FORM]));
    }
}

pub(crate) fn emit_topics<S: AsRef<str>>(
    words: &[S],
    topics: &[String],
    fc: &mut dyn FeatureConsumer,
) {
    for w in words {
        for topic in topics {
            fc.add_feature(&format!("top^{}_{}", w.as_ref(), topic));
        }
    }
}
