use crossterm::style::Stylize;
use sense_core::consumer::{CollectingConsumer, Event};
use sense_core::core::types::{ChartTranslation, SyntaxInfo, Translation};
use sense_core::{ExtractorConfig, FeatureExtractor, TargetIndex};
use std::sync::Arc;

// Everything switched on so the demo shows the full key inventory.
const DEMO_CONFIG: &str = r#"{
    "context": true,
    "source-internal": true,
    "source-indicator": true,
    "target-internal": true,
    "target-indicator": true,
    "bag-of-words": true,
    "paired": true,
    "scores": true,
    "binned-scores": true,
    "most-frequent": true,
    "source-topic": true,
    "syntax-parent": true,
    "syntax-children": true,
    "window-size": 2,
    "factors": [0],
    "score-indexes": [2],
    "score-bins": [0.2, 0.5, 0.8]
}"#;

fn main() {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => ExtractorConfig::load(&path),
        None => ExtractorConfig::load_str(DEMO_CONFIG),
    };
    let config = match config {
        Ok(c) => Arc::new(c),
        Err(e) => {
            eprintln!("[ERROR] Could not load extractor config: {e}");
            std::process::exit(1);
        }
    };

    let mut index = TargetIndex::new();
    let chat = index.intern("le chat");
    let minou = index.intern("minou");
    let rule = index.intern("le [X] chat");
    let extractor = FeatureExtractor::new(index.into_shared(), config, true);

    let context: Vec<Vec<String>> = ["the", "black", "cat", "sat", "down"]
        .iter()
        .map(|w| vec![w.to_string()])
        .collect();
    let topics = vec!["pets".to_string()];

    // Flat candidates for the span "cat"
    let translations = vec![
        Translation {
            target_id: chat,
            alignment: vec![(0, 1)],
            scores: vec![0.05, 0.4, 0.7],
        },
        Translation {
            target_id: minou,
            alignment: vec![(0, 0)],
            scores: vec![0.02, 0.1, 0.3],
        },
    ];
    let mut fc = CollectingConsumer::new();
    match extractor.generate_features(&mut fc, &context, 2, 2, &translations, &topics) {
        Ok(losses) => print_example("flat candidates for span \"cat\"", &fc, &losses),
        Err(e) => eprintln!("[ERROR] flat extraction failed: {e}"),
    }

    // One rule candidate covering "black cat"
    let lhs = SyntaxInfo {
        labels: vec!["NP".to_string()],
        parent: "S".to_string(),
        span: "black_cat".to_string(),
    };
    let children = vec![SyntaxInfo {
        labels: vec!["JJ".to_string()],
        parent: "NP".to_string(),
        span: "black".to_string(),
    }];
    let rules = vec![ChartTranslation {
        target_id: rule,
        target_rep: "le [X] chat".to_string(),
        term_alignment: vec![(2, 2)],
        nonterm_alignment: vec![(1, 1)],
        scores: vec![0.1, 0.3, 0.6],
        rule_count: 3,
    }];
    println!("{}", rules[0]);

    let mut fc = CollectingConsumer::new();
    match extractor.generate_features_chart(
        &mut fc,
        &context,
        "the [X] cat",
        &lhs,
        &children,
        1,
        2,
        &rules,
        &topics,
    ) {
        Ok(losses) => print_example("chart candidates for span \"black cat\"", &fc, &losses),
        Err(e) => eprintln!("[ERROR] chart extraction failed: {e}"),
    }
}

fn print_example(title: &str, fc: &CollectingConsumer, losses: &[f32]) {
    println!("{}", title.bold());
    for event in &fc.events {
        match event {
            Event::Namespace(ns, shared) => {
                let kind = if *shared { "shared" } else { "candidate" };
                println!("  namespace '{ns}' ({kind})");
            }
            Event::Feature(name) => println!("    {}", name.as_str().green()),
            Event::FeatureValue(name, value) => {
                println!("    {} = {value}", name.as_str().green())
            }
            Event::Train(label, loss) => {
                println!("  {} candidate {label}, loss {loss}", "train".cyan())
            }
            Event::Predict(label) => println!("  {} candidate {label}", "predict".cyan()),
            Event::FinishExample => println!("  {}", "finish example".dark_grey()),
        }
    }
    println!("losses: {losses:?}\n");
}
