//! Build-variable interpolation.
//!
//! Replaces `${agent.location}`, `${agent.hostname}` and `${date}` anywhere
//! in a string in a single pass. Unknown `${...}` tokens pass through
//! unchanged.

/// Fixed interpolation values of one agent.
#[derive(Debug, Clone)]
pub struct BuildVars {
    pub agent_location: String,
    pub agent_hostname: String,
}

impl BuildVars {
    pub fn expand(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let tail = &rest[start..];
            match tail.find('}') {
                Some(end) => {
                    let token = &tail[2..end];
                    match self.resolve(token) {
                        Some(value) => out.push_str(&value),
                        None => out.push_str(&tail[..=end]),
                    }
                    rest = &tail[end + 1..];
                }
                None => {
                    out.push_str(tail);
                    return out;
                }
            }
        }

        out.push_str(rest);
        out
    }

    fn resolve(&self, token: &str) -> Option<String> {
        match token {
            "agent.location" => Some(self.agent_location.clone()),
            "agent.hostname" => Some(self.agent_hostname.clone()),
            // Evaluated at expansion time, not at job start.
            "date" => Some(
                chrono::Local::now()
                    .format("%Y-%m-%d %H:%M:%S %Z")
                    .to_string(),
            ),
            _ => None,
        }
    }
}
