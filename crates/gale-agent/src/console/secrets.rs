//! Secret masking for console output.

/// Replacement used when a secret is registered without an explicit mask.
pub const DEFAULT_MASK: &str = "********";

/// Ordered list of (plaintext, replacement) pairs applied to every outgoing
/// console line.
///
/// Replacements run in insertion order, which lets a job pin a specific mask
/// per secret. Secrets accumulate for the life of the job; removal is not
/// supported.
#[derive(Debug, Clone, Default)]
pub struct SecretTable {
    entries: Vec<(String, String)>,
}

impl SecretTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a secret. Registering the same (plain, mask) pair twice has
    /// the same effect as registering it once.
    pub fn add(&mut self, plain: &str, mask: &str) {
        if plain.is_empty() {
            return;
        }
        let mask = if mask.is_empty() { DEFAULT_MASK } else { mask };
        if self
            .entries
            .iter()
            .any(|(p, m)| p == plain && m == mask)
        {
            return;
        }
        self.entries.push((plain.to_string(), mask.to_string()));
    }

    /// Replace every registered plaintext in `text` with its mask.
    pub fn apply(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (plain, mask) in &self.entries {
            out = out.replace(plain, mask);
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
