//! Black-box checks of the short-description heuristic's documented
//! behavior, driven through the public library surface.

use tarsas::text::{derive_short_description, strip_markup};

#[test]
fn single_paragraph_with_clear_first_sentence_stays_bounded() {
    // Arrange: 300-character single paragraph whose first sentence is well
    // over 30 characters.
    let first = "Settlers race to claim the best harbors before winter closes the shipping lanes.";
    let filler = "x".repeat(300 - first.len() - 1);
    let long = format!("{} {}", first, filler);
    assert_eq!(long.chars().count(), 300);

    // Act
    let short = derive_short_description(&long);

    // Assert
    assert!(short.chars().count() <= 300);
    assert!(short.ends_with(['.', '!', '?', '\u{2026}']));
}

#[test]
fn markup_heavy_description_becomes_plain_prose() {
    let raw = "<p>A <em>fast</em> bidding game for the whole family.</p>&#10;&#10;<p>Auction rounds escalate quickly &amp; brutally.</p>";
    let clean = strip_markup(raw);
    assert_eq!(
        clean,
        "A fast bidding game for the whole family.\n\nAuction rounds escalate quickly & brutally."
    );

    let short = derive_short_description(&clean);
    // Both sentences are short, so they are joined.
    assert_eq!(
        short,
        "A fast bidding game for the whole family. Auction rounds escalate quickly & brutally."
    );
}

#[test]
fn derived_short_description_never_exceeds_the_cap() {
    let inputs = [
        "word ".repeat(400),
        format!("{}.", "y".repeat(500)),
        format!("{}\n\n{}", "z".repeat(249), "tail paragraph."),
        "Tiny.".to_string(),
    ];
    for input in inputs {
        let short = derive_short_description(&input);
        assert!(
            short.chars().count() <= 300,
            "cap exceeded for input starting {:?}",
            &input[..20.min(input.len())]
        );
    }
}
