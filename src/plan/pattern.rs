// src/plan/pattern.rs

//! `{wildcard}` path patterns and template expansion.
//!
//! Rule outputs are path templates like `results/{sample}.out`. Matching a
//! concrete path against such a pattern yields wildcard bindings, which are
//! then substituted into the rule's input patterns and command template.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use anyhow::{anyhow, bail, Result};
use regex::Regex;

/// Bindings extracted from matching a concrete path against a pattern,
/// plus anything else a template is allowed to reference (`input`, `output`,
/// `threads`, `params.<name>`).
pub type Bindings = BTreeMap<String, String>;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_.]*)\}").unwrap())
}

/// All `{name}` placeholder names referenced by a template, in order of
/// appearance (duplicates included).
pub fn placeholder_names(template: &str) -> Vec<String> {
    placeholder_re()
        .captures_iter(template)
        .map(|c| c[1].to_string())
        .collect()
}

/// Substitute `{name}` placeholders from `bindings` into a template.
///
/// Unknown placeholders are an error; templates are validated against the
/// rule's wildcards and params at load time, so hitting this at plan time
/// means a bug or a hand-built rule set.
pub fn expand_template(template: &str, bindings: &Bindings) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for cap in placeholder_re().captures_iter(template) {
        let whole = cap.get(0).unwrap();
        let name = &cap[1];
        let value = bindings
            .get(name)
            .ok_or_else(|| anyhow!("template '{template}' references unknown placeholder '{{{name}}}'"))?;
        out.push_str(&template[last..whole.start()]);
        out.push_str(value);
        last = whole.end();
    }
    out.push_str(&template[last..]);

    Ok(out)
}

/// A compiled output pattern: an anchored regex with one capture group per
/// wildcard occurrence.
///
/// A pattern without wildcards matches only its literal self. A wildcard may
/// appear more than once; all occurrences must then capture identical text.
#[derive(Debug, Clone)]
pub struct WildcardPattern {
    raw: String,
    regex: Regex,
    /// Wildcard name per capture group, in group order. May contain repeats.
    groups: Vec<String>,
    /// Distinct wildcard names, in order of first appearance.
    wildcards: Vec<String>,
}

impl WildcardPattern {
    pub fn compile(raw: &str) -> Result<Self> {
        let mut regex_src = String::from("^");
        let mut groups = Vec::new();
        let mut wildcards = Vec::new();
        let mut last = 0;

        for cap in placeholder_re().captures_iter(raw) {
            let whole = cap.get(0).unwrap();
            let name = cap[1].to_string();
            if name.contains('.') {
                bail!("wildcard name '{{{name}}}' may not contain '.'");
            }

            regex_src.push_str(&regex::escape(&raw[last..whole.start()]));
            // Group names must be unique in the regex, so repeated wildcards
            // get numbered groups; equality is checked after matching.
            regex_src.push_str(&format!("(?P<w{}>.+?)", groups.len()));
            if !wildcards.contains(&name) {
                wildcards.push(name.clone());
            }
            groups.push(name);
            last = whole.end();
        }
        regex_src.push_str(&regex::escape(&raw[last..]));
        regex_src.push('$');

        let regex = Regex::new(&regex_src)
            .map_err(|e| anyhow!("pattern '{raw}' compiled to invalid regex: {e}"))?;

        Ok(Self {
            raw: raw.to_string(),
            regex,
            groups,
            wildcards,
        })
    }

    /// The original pattern text.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Distinct wildcard names bound by this pattern.
    pub fn wildcards(&self) -> &[String] {
        &self.wildcards
    }

    pub fn has_wildcards(&self) -> bool {
        !self.wildcards.is_empty()
    }

    /// Match a concrete path, returning wildcard bindings on success.
    ///
    /// Returns `None` when the path doesn't match, or when a repeated
    /// wildcard would bind to two different strings.
    pub fn match_path(&self, path: &str) -> Option<Bindings> {
        let caps = self.regex.captures(path)?;
        let mut bindings = Bindings::new();

        for (i, name) in self.groups.iter().enumerate() {
            let value = caps.name(&format!("w{i}"))?.as_str();
            match bindings.get(name) {
                Some(prev) if prev != value => return None,
                _ => {
                    bindings.insert(name.clone(), value.to_string());
                }
            }
        }

        Some(bindings)
    }

    /// Substitute wildcard bindings back into the pattern, producing a
    /// concrete path.
    pub fn expand(&self, bindings: &Bindings) -> Result<String> {
        expand_template(&self.raw, bindings)
    }
}
