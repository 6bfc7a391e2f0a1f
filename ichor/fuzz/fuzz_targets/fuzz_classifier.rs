//! Fuzz target for the classifier and the text helpers around it.
//!
//! Classification runs on every generated fragment, and the oracles cut and
//! quote fragment text, so none of these may panic on any input.

#![no_main]

use libfuzzer_sys::fuzz_target;
use ichor::oracle::bisect::halves;
use ichor::oracle::nesting::wrap;
use ichor::Classifier;

fuzz_target!(|data: &str| {
    let classifier = Classifier::standard();
    let classification = classifier.classify(data);

    // No parse implies no execute.
    assert!(classification.allow_parse || !classification.allow_execute);
    let _ = classifier.explain(data);

    let (front, back) = halves(data);
    assert_eq!(front.len() + back.len(), data.len());

    let _ = wrap(data, 3);
});
