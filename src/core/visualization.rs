//! Visual artifacts produced by steps

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A rendered artifact attached to a step's outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum Visualization {
    SimpleText {
        text: String,
    },
    Html {
        html: String,
        #[serde(default)]
        css: Option<String>,
    },
    /// A plotly figure description, passed through untouched
    Plotly {
        figure: Value,
    },
    /// Several visualizations shown as panels of one artifact
    Multi {
        visualizations: Vec<Visualization>,
    },
}

impl Visualization {
    pub fn text(text: impl Into<String>) -> Self {
        Visualization::SimpleText { text: text.into() }
    }

    /// Collapse the visualizations of one step into at most one artifact
    pub fn combine(mut visualizations: Vec<Visualization>) -> Option<Visualization> {
        match visualizations.len() {
            0 => None,
            1 => visualizations.pop(),
            _ => Some(Visualization::Multi { visualizations }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serialized_shape() {
        let value = serde_json::to_value(Visualization::text("hi")).unwrap();
        assert_eq!(value, json!({"type": "simple_text", "content": {"text": "hi"}}));
    }

    #[test]
    fn test_combine() {
        assert_eq!(Visualization::combine(vec![]), None);
        assert_eq!(
            Visualization::combine(vec![Visualization::text("a")]),
            Some(Visualization::text("a"))
        );
        let multi = Visualization::combine(vec![Visualization::text("a"), Visualization::text("b")]);
        assert!(matches!(multi, Some(Visualization::Multi { visualizations }) if visualizations.len() == 2));
    }
}
