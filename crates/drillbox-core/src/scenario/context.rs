//! Randomised template variables for scenario files.
//!
//! Scenario YAML may reference `{{ random_file }}`, `{{ random_user }}` and
//! friends so repeated practice runs do not see identical names. A fresh
//! [`TemplateContext`] is generated per file before parsing.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use rand::seq::IndexedRandom;
use rand::Rng;
use regex::{Captures, Regex};

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("regex for template placeholders")
});

const FILE_EXTENSIONS: &[&str] = &["txt", "conf", "log", "sh", "py"];
const TEXT_WORDS: &[&str] = &[
    "linux", "system", "kernel", "bash", "shell", "terminal", "process", "daemon",
];

/// Variable name to rendered value.
pub type TemplateContext = BTreeMap<String, String>;

/// Produces fresh template variables.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContextGenerator;

impl ContextGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Generate a context from the thread-local RNG.
    pub fn generate(&self) -> TemplateContext {
        self.generate_with(&mut rand::rng())
    }

    /// Generate a context from a caller-supplied RNG (seeded in tests).
    pub fn generate_with<R: Rng + ?Sized>(&self, rng: &mut R) -> TemplateContext {
        let mut ctx = TemplateContext::new();
        let ext = FILE_EXTENSIONS.choose(rng).copied().unwrap_or("txt");
        ctx.insert(
            "random_file".into(),
            format!("{}.{}", lowercase(rng, 8), ext),
        );
        ctx.insert("random_dir".into(), lowercase(rng, 6));
        ctx.insert("random_user".into(), format!("user_{}", lowercase(rng, 4)));
        ctx.insert("random_group".into(), format!("group_{}", lowercase(rng, 4)));
        ctx.insert(
            "random_ip".into(),
            format!(
                "192.168.{}.{}",
                rng.random_range(1..=254u8),
                rng.random_range(1..=254u8)
            ),
        );
        ctx.insert(
            "random_port".into(),
            rng.random_range(1024..=65535u16).to_string(),
        );
        let words: Vec<&str> = (0..5)
            .filter_map(|_| TEXT_WORDS.choose(rng).copied())
            .collect();
        ctx.insert("random_text".into(), words.join(" "));
        ctx.insert("uuid".into(), uuid::Uuid::new_v4().to_string());
        ctx
    }
}

fn lowercase<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| char::from(b'a' + rng.random_range(0..26u8)))
        .collect()
}

/// Replace every `{{ name }}` in `template`.
///
/// Unknown variables render as the empty string.
pub fn render(template: &str, ctx: &TemplateContext) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            ctx.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned()
}
