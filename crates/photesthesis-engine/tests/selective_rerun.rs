//! With `PHOTESTHESIS_TEST_HASH` set, only the transcript with that plan
//! hash is re-checked; all others are untouched.
//!
//! Kept alone in this file: it mutates process-global environment state.

mod common;

use common::{expr_grammar, CalcTest, Syms};
use photesthesis_corpus::{Corpus, Transcript};
use photesthesis_engine::Admin;

#[test]
fn test_selective_rerun_via_test_hash() {
    common::init_tracing();
    let syms = Syms::new();
    let grammar = expr_grammar(&syms);
    let mut corpus = Corpus::new();

    let mut admin = Admin::new(
        &grammar,
        &mut corpus,
        syms.test.clone(),
        CalcTest::new(syms.clone()),
    );
    admin.administer(0, 3, 3).unwrap();
    drop(admin);

    let before: Vec<Transcript> = corpus.transcripts(&syms.test).cloned().collect();
    assert!(before.len() >= 2, "need several transcripts to select among");
    let target = before[0].plan().hash();

    // Shift the SUT so every plan would mismatch, but limit checking to one.
    std::env::set_var("PHOTESTHESIS_TEST_HASH", target.to_string());
    let mut changed = CalcTest::new(syms.clone());
    changed.result_offset = 1;
    let mut admin = Admin::new(&grammar, &mut corpus, syms.test.clone(), changed);
    let failures = admin.administer(0, 3, 3).unwrap();
    let test = admin.into_test();
    std::env::remove_var("PHOTESTHESIS_TEST_HASH");

    assert_eq!(failures, vec![target]);
    assert_eq!(test.mismatches, 1);

    let after: Vec<Transcript> = corpus.transcripts(&syms.test).cloned().collect();
    assert_eq!(after.len(), before.len());
    for ts in &before {
        let hash = ts.plan().hash();
        let now = after
            .iter()
            .find(|t| t.plan().hash() == hash)
            .expect("no transcript disappeared");
        if hash == target {
            assert_ne!(now, ts, "the selected transcript was re-recorded");
        } else {
            assert_eq!(now, ts, "unselected transcripts stay untouched");
        }
    }
}
