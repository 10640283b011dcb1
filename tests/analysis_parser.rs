use std::fs;
use std::path::PathBuf;

use footy_value::analysis_parser::{format_analysis_response, parse_analysis_response};

fn reply_fixture() -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push("llm_reply.md");
    fs::read_to_string(path).expect("fixture file should be readable")
}

#[test]
fn parses_structured_reply() {
    let doc = parse_analysis_response(&reply_fixture());
    assert_eq!(doc.title, "Liverpool vs Manchester Utd: value analysis");

    assert_eq!(doc.opportunities.len(), 2);
    let first = &doc.opportunities[0];
    assert_eq!(first.market, "Liverpool win");
    assert_eq!(first.odds, Some(1.70));
    assert_eq!(first.real_probability, Some(66.0));
    assert_eq!(first.implied_probability, Some(58.8));

    assert_eq!(doc.comparisons.len(), 3);
    assert_eq!(doc.comparisons[1].market, "Draw");
    assert_eq!(doc.comparisons[1].implied, 25.0);

    let confidence = doc.confidence.as_deref().unwrap_or_default();
    assert!(confidence.starts_with("Medium"), "{confidence}");
    assert!(doc.is_structured());
}

#[test]
fn formatted_reply_mentions_every_market() {
    let doc = parse_analysis_response(&reply_fixture());
    let text = format_analysis_response(&doc);
    assert!(text.contains("Liverpool win"));
    assert!(text.contains("Over 2.5 goals"));
    assert!(text.contains("Medium"));
}

#[test]
fn bullet_replies_are_understood() {
    let reply = "**Quick take**\n\
        - Over 2.5 goals @ 1.95: real 58% vs implied 51.3%\n\
        - BTTS yes @ 1.80: real 60% vs implied 55.6%\n\
        Confidence: Low";
    let doc = parse_analysis_response(reply);
    assert_eq!(doc.title, "Quick take");
    assert_eq!(doc.opportunities.len(), 2);
    assert_eq!(doc.opportunities[1].odds, Some(1.80));
    assert_eq!(doc.confidence.as_deref(), Some("Low"));
}

#[test]
fn malformed_input_never_panics() {
    let inputs = [
        "",
        "\n\n\n",
        "|",
        "| Market |\n|---|\n| |",
        "# \n**\n- @ : real % vs implied %",
        "Confidence:",
        "### Probability comparison\n- 45% 30%\n- : 10% vs 20%",
        "| Market | Odds | Real | Implied |\n| a | b | c |\n| x | 1.5 | 200% | nan |",
        "🙂🙂🙂 | ∞ | 1e309 %",
    ];
    for input in inputs {
        let doc = parse_analysis_response(input);
        assert_eq!(doc.raw, input);
        let _ = format_analysis_response(&doc);
    }
}

#[test]
fn unstructured_reply_is_passed_through() {
    let doc = parse_analysis_response("Sorry, I cannot help with that.");
    assert!(!doc.is_structured());
    assert_eq!(format_analysis_response(&doc), "Sorry, I cannot help with that.");
}
