//! Human-readable rendering of a validation pass.

use std::fmt::Write;

use super::result::CheckResult;

const RULE_WIDTH: usize = 60;

/// Render the report shown to the user after a validation pass.
pub fn render_feedback(results: &[CheckResult], checks_passed: usize, checks_total: usize) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut out = String::new();

    let _ = writeln!(
        out,
        "Validation Results: {checks_passed}/{checks_total} checks passed"
    );
    let _ = writeln!(out, "{rule}");

    for result in results {
        let status = if result.passed { "PASS" } else { "FAIL" };
        let _ = writeln!(out);
        let _ = writeln!(out, "{status}: {}", result.name);
        let _ = writeln!(out, "  {}", result.message);
        if !result.passed {
            if let Some(expected) = &result.expected {
                let _ = writeln!(out, "  Expected: {expected}");
            }
            if let Some(actual) = &result.actual {
                let _ = writeln!(out, "  Actual: {actual}");
            }
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "{rule}");
    if checks_passed == checks_total {
        out.push_str("All checks passed! Great job!");
    } else {
        let _ = write!(
            out,
            "{} check(s) failed. Review the feedback above.",
            checks_total - checks_passed
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, passed: bool) -> CheckResult {
        CheckResult {
            name: name.into(),
            passed,
            message: if passed { "ok".into() } else { "Exit code mismatch".into() },
            expected: Some("exit code 0".into()),
            actual: Some("exit code 1".into()),
        }
    }

    #[test]
    fn test_render_mixed() {
        let text = render_feedback(&[result("first", true), result("second", false)], 1, 2);
        let expected = format!(
            "Validation Results: 1/2 checks passed\n{rule}\n\n\
             PASS: first\n  ok\n\n\
             FAIL: second\n  Exit code mismatch\n  Expected: exit code 0\n  Actual: exit code 1\n\n\
             {rule}\n1 check(s) failed. Review the feedback above.",
            rule = "=".repeat(60)
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn test_render_all_passed() {
        let text = render_feedback(&[result("only", true)], 1, 1);
        assert!(text.starts_with("Validation Results: 1/1 checks passed"));
        assert!(text.ends_with("All checks passed! Great job!"));
        assert!(!text.contains("Expected:"));
    }
}
