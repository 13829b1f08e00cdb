//! Fingerprint Integration Tests
//!
//! The fingerprint is the cache key, so it must be stable across releases,
//! collision-free on a varied corpus, and blind to everything except title
//! and source text.

use std::collections::HashSet;

use teaser::domain::{fingerprint, Fingerprint, GenerationRequest, VoicePreference};

#[test]
fn test_known_values_are_stable() {
    assert_eq!(
        fingerprint("Ep1", "An episode about tides.").as_str(),
        "0318d48852ce57e6"
    );
    assert_eq!(fingerprint("פרק 1", "שלום עולם").as_str(), "abd4a5059ba0ef4f");
}

#[test]
fn test_corpus_has_no_collisions() {
    let mut seen = HashSet::new();
    let mut count = 0;

    for episode in 0..40 {
        for text in [
            String::new(),
            format!("Episode {episode} script"),
            format!("Episode {episode} script "),
            format!("episode {episode} script"),
            "x".repeat(episode + 1),
        ] {
            let fp = fingerprint(&format!("Ep{episode}"), &text);
            count += 1;
            assert!(seen.insert(fp.clone()), "collision on Ep{episode}: {fp}");
        }
    }

    assert_eq!(seen.len(), count);
}

#[test]
fn test_only_title_and_text_matter() {
    let base = GenerationRequest::new("Ep1", "Same text", 15);
    let varied = GenerationRequest::new("Ep1", "Same text", 60)
        .with_voice_preference(VoicePreference::Male)
        .with_voice_id("onyx")
        .with_headline("Different headline");

    assert_eq!(base.fingerprint(), varied.fingerprint());
    assert_ne!(
        base.fingerprint(),
        GenerationRequest::new("Ep1", "Same text.", 15).fingerprint()
    );
    assert_ne!(
        base.fingerprint(),
        GenerationRequest::new("Ep2", "Same text", 15).fingerprint()
    );
}

#[test]
fn test_fingerprint_names_a_directory() {
    let fp = fingerprint("Ep1", "text");
    assert_eq!(Fingerprint::parse(fp.as_str()), Some(fp.clone()));
    assert!(fp
        .as_str()
        .chars()
        .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
}
