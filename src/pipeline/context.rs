//! Append-only prompt history threaded through a task's attempts.

use crate::pipeline::prompts;

/// Outcome recorded after a generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    /// Diagnostic already bounded to the configured window.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// Stage instructions, written once per stage entry.
    Instructions(String),
    /// An artifact from an earlier stage, restored when a task resumes.
    Prior { tag: String, code: String },
    /// Extra reference material, such as package documentation.
    Reference(String),
    /// One attempt. `code` is `None` when nothing usable was generated.
    Attempt {
        tag: String,
        code: Option<String>,
        verdict: Verdict,
    },
}

/// Conversation buffer for one task. Entries are only ever appended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    entries: Vec<Entry>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn push_instructions(&mut self, text: impl Into<String>) {
        self.entries.push(Entry::Instructions(text.into()));
    }

    pub fn push_prior(&mut self, tag: &str, code: impl Into<String>) {
        self.entries.push(Entry::Prior {
            tag: tag.to_string(),
            code: code.into(),
        });
    }

    pub fn push_reference(&mut self, text: impl Into<String>) {
        self.entries.push(Entry::Reference(text.into()));
    }

    pub fn push_success(&mut self, tag: &str, code: impl Into<String>) {
        self.entries.push(Entry::Attempt {
            tag: tag.to_string(),
            code: Some(code.into()),
            verdict: Verdict::Accepted,
        });
    }

    pub fn push_failure(&mut self, tag: &str, code: Option<String>, diagnostic: impl Into<String>) {
        self.entries.push(Entry::Attempt {
            tag: tag.to_string(),
            code,
            verdict: Verdict::Failed(diagnostic.into()),
        });
    }

    /// Diagnostics of every failed attempt, oldest first.
    pub fn diagnostics(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|e| match e {
            Entry::Attempt {
                verdict: Verdict::Failed(d),
                ..
            } => Some(d.as_str()),
            _ => None,
        })
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            match entry {
                Entry::Instructions(text) => {
                    out.push_str(text.trim_end());
                    out.push_str("\n\n");
                }
                Entry::Prior { tag, code } => {
                    out.push_str(&fenced(tag, code));
                    out.push_str("\n\n");
                }
                Entry::Reference(text) => {
                    out.push_str(&prompts::reference(text));
                }
                Entry::Attempt { tag, code, verdict } => {
                    if let Some(code) = code {
                        out.push_str(&fenced(tag, code));
                        out.push_str("\n\n");
                    }
                    match verdict {
                        Verdict::Accepted => out.push_str(prompts::SUCCESS_NOTE),
                        Verdict::Failed(diagnostic) => {
                            out.push_str(&prompts::failure_note(code.is_some(), diagnostic))
                        }
                    }
                }
            }
        }
        out
    }

    /// The request prompt for a stage answering in `tag`: the rendered
    /// history followed by an opened fence.
    pub fn prompt_for(&self, tag: &str) -> String {
        let mut prompt = self.render();
        prompt.push_str("```");
        prompt.push_str(tag);
        prompt.push('\n');
        prompt
    }
}

fn fenced(tag: &str, code: &str) -> String {
    let mut out = format!("```{}\n{}", tag, code);
    if !code.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("```");
    out
}
