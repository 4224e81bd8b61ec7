//! `file` checks: existence, mode, ownership, content.

use async_trait::async_trait;
use regex::Regex;

use super::result::CheckOutcome;
use super::strategy::{misrouted, CheckStrategy};
use crate::environment::Environment;
use crate::scenario::{CheckKind, FileCheck, ValidationCheck};

#[derive(Debug, Default, Clone, Copy)]
pub struct FileStrategy;

/// `"0644"` and `"644"` compare equal.
fn normalize_mode(mode: &str) -> &str {
    let trimmed = mode.trim().trim_start_matches('0');
    if trimmed.is_empty() {
        "0"
    } else {
        trimmed
    }
}

fn content_preview(content: &str) -> String {
    let head: String = content.chars().take(50).collect();
    format!("content start: {head}...")
}

impl FileStrategy {
    async fn evaluate(&self, env: &dyn Environment, check: &FileCheck) -> CheckOutcome {
        let path = check.path.as_str();
        let exists = env.exists(path).await;

        match (check.should_exist, exists) {
            (true, false) => {
                return CheckOutcome::fail("File does not exist")
                    .expected(format!("File {path} should exist"))
                    .actual("File not found");
            }
            (false, true) => {
                return CheckOutcome::fail("File exists but should not")
                    .expected(format!("File {path} should not exist"))
                    .actual("File exists");
            }
            (false, false) => return CheckOutcome::pass("File correctly does not exist"),
            (true, true) => {}
        }

        if check.permissions.is_some() || check.owner.is_some() || check.group.is_some() {
            let stat = match env.stat(path).await {
                Ok(stat) => stat,
                Err(e) => return CheckOutcome::fail(format!("Failed to check file stats: {e}")),
            };

            if let Some(expected) = &check.permissions {
                if normalize_mode(expected) != normalize_mode(&stat.permissions) {
                    return CheckOutcome::fail("File permissions do not match")
                        .expected(format!("permissions {expected}"))
                        .actual(format!("permissions {}", stat.permissions));
                }
            }
            if let Some(owner) = &check.owner {
                if &stat.owner != owner {
                    return CheckOutcome::fail("File owner does not match")
                        .expected(format!("owner {owner}"))
                        .actual(format!("owner {}", stat.owner));
                }
            }
            if let Some(group) = &check.group {
                if &stat.group != group {
                    return CheckOutcome::fail("File group does not match")
                        .expected(format!("group {group}"))
                        .actual(format!("group {}", stat.group));
                }
            }
        }

        if check.content_contains.is_some() || check.content_regex.is_some() {
            let content = match env.read_file(path).await {
                Ok(content) => content,
                Err(e) => return CheckOutcome::fail(format!("Failed to read file: {e}")),
            };

            if let Some(needle) = &check.content_contains {
                if !content.contains(needle.as_str()) {
                    return CheckOutcome::fail("File content does not contain expected text")
                        .expected(format!("content containing: {needle}"))
                        .actual(content_preview(&content));
                }
            }
            if let Some(pattern) = &check.content_regex {
                match Regex::new(pattern) {
                    Ok(re) if re.is_match(&content) => {}
                    Ok(_) => {
                        return CheckOutcome::fail("File content does not match regex pattern")
                            .expected(format!("pattern: {pattern}"))
                            .actual(content_preview(&content));
                    }
                    Err(e) => {
                        return CheckOutcome::fail(format!("Invalid regex pattern: {e}"))
                            .expected(format!("pattern: {pattern}"));
                    }
                }
            }
        }

        CheckOutcome::pass("File validation passed")
    }
}

#[async_trait]
impl CheckStrategy for FileStrategy {
    fn kind(&self) -> CheckKind {
        CheckKind::File
    }

    async fn check(&self, env: &dyn Environment, check: &ValidationCheck) -> CheckOutcome {
        match check {
            ValidationCheck::File(c) => self.evaluate(env, c).await,
            other => misrouted(self.kind(), other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeEnvironment;

    fn check(path: &str) -> FileCheck {
        FileCheck {
            path: path.to_string(),
            should_exist: true,
            permissions: None,
            owner: None,
            group: None,
            content_contains: None,
            content_regex: None,
            description: None,
        }
    }

    #[test]
    fn test_normalize_mode() {
        assert_eq!(normalize_mode("0644"), "644");
        assert_eq!(normalize_mode("644"), "644");
        assert_eq!(normalize_mode("0000"), "0");
    }

    #[tokio::test]
    async fn test_existence_both_directions() {
        let env = FakeEnvironment::new();
        env.add_file("/etc/motd", "hello", "644", "root", "root");

        let outcome = FileStrategy.evaluate(&env, &check("/etc/missing")).await;
        assert_eq!(outcome.message, "File does not exist");

        let mut absent = check("/etc/motd");
        absent.should_exist = false;
        let outcome = FileStrategy.evaluate(&env, &absent).await;
        assert_eq!(outcome.message, "File exists but should not");

        let mut absent = check("/etc/missing");
        absent.should_exist = false;
        let outcome = FileStrategy.evaluate(&env, &absent).await;
        assert!(outcome.passed);
        assert_eq!(outcome.message, "File correctly does not exist");
    }

    #[tokio::test]
    async fn test_leading_zero_permissions_match() {
        let env = FakeEnvironment::new();
        env.add_file("/etc/foo.conf", "", "644", "root", "root");

        let mut c = check("/etc/foo.conf");
        c.permissions = Some("0644".into());
        assert!(FileStrategy.evaluate(&env, &c).await.passed);

        c.permissions = Some("0600".into());
        let outcome = FileStrategy.evaluate(&env, &c).await;
        assert_eq!(outcome.message, "File permissions do not match");
        assert_eq!(outcome.expected.as_deref(), Some("permissions 0600"));
        assert_eq!(outcome.actual.as_deref(), Some("permissions 644"));
    }

    #[tokio::test]
    async fn test_owner_then_group() {
        let env = FakeEnvironment::new();
        env.add_file("/srv/app", "", "750", "deploy", "deploy");

        let mut c = check("/srv/app");
        c.owner = Some("root".into());
        c.group = Some("wheel".into());
        let outcome = FileStrategy.evaluate(&env, &c).await;
        assert_eq!(outcome.message, "File owner does not match");

        c.owner = Some("deploy".into());
        let outcome = FileStrategy.evaluate(&env, &c).await;
        assert_eq!(outcome.message, "File group does not match");
        assert_eq!(outcome.actual.as_deref(), Some("group deploy"));
    }

    #[tokio::test]
    async fn test_content_checks() {
        let env = FakeEnvironment::new();
        env.add_file(
            "/etc/hosts",
            "127.0.0.1 localhost\n10.0.0.5 db.internal\n",
            "644",
            "root",
            "root",
        );

        let mut c = check("/etc/hosts");
        c.content_contains = Some("db.internal".into());
        c.content_regex = Some(r"^10\.0\.0\.\d+\s+db".into());
        let outcome = FileStrategy.evaluate(&env, &c).await;
        // `^` without multiline mode only anchors at the very start.
        assert_eq!(outcome.message, "File content does not match regex pattern");

        c.content_regex = Some(r"(?m)^10\.0\.0\.\d+\s+db".into());
        assert!(FileStrategy.evaluate(&env, &c).await.passed);

        c.content_contains = Some("cache.internal".into());
        let outcome = FileStrategy.evaluate(&env, &c).await;
        assert_eq!(outcome.message, "File content does not contain expected text");
        assert!(outcome.actual.unwrap().starts_with("content start: 127.0.0.1"));
    }
}
