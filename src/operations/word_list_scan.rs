//! Counting occurrences of configured word lists

use crate::core::{Config, Payload, StepState, Table, Visualization};
use crate::execution::ItemOperation;
use crate::notify::Notifier;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use serde_json::{json, Value};

pub const STEP_ID: &str = "word_list_scan";

#[derive(Debug, Deserialize)]
struct WordListConfig {
    name: String,
    #[serde(default = "active_by_default")]
    active: bool,
    #[serde(rename = "list of words", default)]
    words: Vec<WordConfig>,
}

#[derive(Debug, Deserialize)]
struct WordConfig {
    word: String,
    #[serde(rename = "is regex", default)]
    is_regex: bool,
}

fn active_by_default() -> bool {
    true
}

/// One active list with its compiled patterns
#[derive(Debug)]
struct WordList {
    name: String,
    patterns: Vec<Regex>,
}

impl WordList {
    fn count(&self, text: &str) -> usize {
        self.patterns
            .iter()
            .map(|pattern| pattern.find_iter(text).count())
            .sum()
    }
}

/// Adds one count column per active word list
#[derive(Debug)]
pub struct WordListScan {
    input_column: String,
    lists: Vec<WordList>,
}

impl WordListScan {
    /// Compile the active lists
    ///
    /// Entries whose pattern does not compile are logged and skipped.
    pub fn from_config(config: &Config, notifier: &dyn Notifier) -> anyhow::Result<Self> {
        let input_column = config.get_or("input column", "text".to_string());
        let configured: Vec<WordListConfig> = config.require("word lists")?;

        let mut lists = Vec::new();
        for list in configured.into_iter().filter(|l| l.active) {
            let mut patterns = Vec::new();
            for entry in list.words.iter().filter(|w| !w.word.is_empty()) {
                let source = if entry.is_regex {
                    entry.word.clone()
                } else {
                    format!(r"\b{}\b", regex::escape(&entry.word))
                };
                match RegexBuilder::new(&source).case_insensitive(true).build() {
                    Ok(pattern) => patterns.push(pattern),
                    Err(e) => notifier.error(&format!(
                        "Error compiling pattern '{}' in word list '{}': {}",
                        entry.word, list.name, e
                    )),
                }
            }
            lists.push(WordList {
                name: list.name,
                patterns,
            });
        }

        Ok(Self {
            input_column,
            lists,
        })
    }

    pub fn list_names(&self) -> Vec<&str> {
        self.lists.iter().map(|l| l.name.as_str()).collect()
    }
}

impl ItemOperation for WordListScan {
    fn input_column(&self) -> &str {
        &self.input_column
    }

    fn output_columns(&self) -> Vec<String> {
        self.lists.iter().map(|l| l.name.clone()).collect()
    }

    fn process_item(
        &self,
        notifier: &dyn Notifier,
        _payload: &Payload,
        item: &Value,
    ) -> anyhow::Result<Vec<Value>> {
        let Some(text) = item.as_str().filter(|t| !t.is_empty()) else {
            return Ok(vec![json!(0); self.lists.len()]);
        };

        let total = self.lists.len();
        let mut counts = Vec::with_capacity(total);
        for (i, list) in self.lists.iter().enumerate() {
            counts.push(json!(list.count(text)));
            notifier.send_status(StepState::Running, 100.0 * (i + 1) as f64 / total as f64);
        }
        Ok(counts)
    }

    fn after_items(
        &mut self,
        table: &Table,
        payload: &Payload,
        _notifier: &dyn Notifier,
    ) -> anyhow::Result<()> {
        let mut rows = String::new();
        for list in &self.lists {
            let values = table.column(&list.name).unwrap_or_default();
            let total: u64 = values.iter().filter_map(Value::as_u64).sum();
            let hits = values
                .iter()
                .filter(|v| v.as_u64().is_some_and(|n| n > 0))
                .count();
            rows.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape_html(&list.name),
                total,
                hits
            ));
        }

        payload.add_visualization(Visualization::Html {
            html: format!(
                "<h4>Word List Scan</h4><table><tr><th>List</th><th>Matches</th><th>Texts with matches</th></tr>{}</table>",
                rows
            ),
            css: None,
        });
        Ok(())
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
