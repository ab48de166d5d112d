//! Markdown session reports.

use std::fmt::Write;

use crate::session::SessionId;
use crate::token::AnalysisToken;

/// Render the stored analysis of a session as a Markdown document.
///
/// Tokens are rendered in the order given; callers pass the output of the
/// store's ordered listing.
pub fn render_markdown_report(session_id: &SessionId, tokens: &[AnalysisToken]) -> String {
    let mut md = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(md, "# StreamMind Session Analysis Report\n");
    let _ = writeln!(md, "**Session ID:** {}\n", session_id);
    let _ = writeln!(md, "**Total Tokens:** {}\n", tokens.len());
    md.push_str("---\n\n");

    for token in tokens {
        let _ = writeln!(md, "## Token #{}\n", token.token_index);
        let _ = writeln!(md, "**Timestamp:** {}\n", token.timestamp);
        let _ = writeln!(md, "{}\n", token.content);
        md.push_str("---\n\n");
    }

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::NewToken;
    use chrono::Utc;

    #[test]
    fn test_empty_report() {
        let session = SessionId::new();
        let md = render_markdown_report(&session, &[]);
        assert!(md.starts_with("# StreamMind Session Analysis Report\n\n"));
        assert!(md.contains(&format!("**Session ID:** {}", session)));
        assert!(md.contains("**Total Tokens:** 0"));
        assert!(!md.contains("## Token"));
    }

    #[test]
    fn test_report_sections_follow_token_order() {
        let session = SessionId::new();
        let tokens = vec![
            AnalysisToken::from_new(1, NewToken::new(session, "first", 0, 1000), Utc::now()),
            AnalysisToken::from_new(2, NewToken::new(session, "second", 1, 1001), Utc::now()),
        ];
        let md = render_markdown_report(&session, &tokens);

        let first = md.find("## Token #0").unwrap();
        let second = md.find("## Token #1").unwrap();
        assert!(first < second);
        assert!(md.contains("**Timestamp:** 1001"));
        assert_eq!(md.matches("---\n\n").count(), 3);
    }
}
