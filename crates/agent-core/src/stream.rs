//! Streaming JSON Filter
//!
//! Removes structured-data fragments from a streamed completion so the
//! caller only sees prose. Brace depth and string state are carried across
//! chunk boundaries; text inside a candidate object is held back until the
//! object closes and is then either dropped (JSON) or released (prose).

use serde_json::Value;

/// Field names that mark a region as structured output
const KEYWORDS: &[&str] = &[
    "\"action\"",
    "\"thought\"",
    "\"response\"",
    "\"quickOptions\"",
    "\"medicalContextUpdate\"",
    "\"medicalContext\"",
    "\"stage\"",
    "\"progress\"",
    "\"tool\"",
    "\"toolCalls\"",
    "\"arguments\"",
    "\"riskLevel\"",
];

/// Incremental prose extractor
#[derive(Debug, Default)]
pub struct JsonStreamFilter {
    region: String,
    depth: usize,
    in_string: bool,
    escaped: bool,
    /// Whether the region has passed the `{ "` opening check
    confirmed: bool,
}

impl JsonStreamFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns the prose that can be emitted now
    pub fn push(&mut self, chunk: &str) -> String {
        let mut out = String::with_capacity(chunk.len());

        for c in chunk.chars() {
            if self.depth == 0 {
                if c == '{' {
                    self.open_region();
                } else {
                    out.push(c);
                }
                continue;
            }

            self.region.push(c);

            if !self.confirmed {
                match c {
                    c if c.is_whitespace() => continue,
                    '"' => self.confirmed = true,
                    '}' => {}
                    _ => {
                        // `{` followed by something other than a key: prose.
                        out.push_str(&self.region);
                        self.reset();
                        continue;
                    }
                }
            }

            self.track(c);

            if self.depth == 0 {
                if !looks_like_json(&self.region) {
                    out.push_str(&self.region);
                }
                self.reset();
            }
        }

        out
    }

    /// End of stream; returns any held-back prose
    pub fn finish(&mut self) -> String {
        let region = std::mem::take(&mut self.region);
        self.reset();
        if region.is_empty() || contains_keyword(&region) {
            String::new()
        } else {
            region
        }
    }

    /// Whether text is currently being held back
    pub fn is_buffering(&self) -> bool {
        self.depth > 0
    }

    fn open_region(&mut self) {
        self.region.push('{');
        self.depth = 1;
        self.in_string = false;
        self.escaped = false;
        self.confirmed = false;
    }

    fn track(&mut self, c: char) {
        if self.in_string {
            match c {
                _ if self.escaped => self.escaped = false,
                '\\' => self.escaped = true,
                '"' => self.in_string = false,
                _ => {}
            }
            return;
        }
        match c {
            '"' => self.in_string = true,
            '{' => self.depth += 1,
            '}' => self.depth = self.depth.saturating_sub(1),
            _ => {}
        }
    }

    fn reset(&mut self) {
        self.region.clear();
        self.depth = 0;
        self.in_string = false;
        self.escaped = false;
        self.confirmed = false;
    }
}

fn contains_keyword(region: &str) -> bool {
    KEYWORDS.iter().any(|k| region.contains(k))
}

fn looks_like_json(region: &str) -> bool {
    matches!(serde_json::from_str::<Value>(region), Ok(Value::Object(map)) if !map.is_empty())
        || contains_keyword(region)
}

/// Run a whole text through a fresh filter
pub fn strip_json(text: &str) -> String {
    let mut filter = JsonStreamFilter::new();
    let mut out = filter.push(text);
    out.push_str(&filter.finish());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(chunks: &[&str]) -> String {
        let mut filter = JsonStreamFilter::new();
        let mut out = String::new();
        for chunk in chunks {
            out.push_str(&filter.push(chunk));
        }
        out.push_str(&filter.finish());
        out
    }

    #[test]
    fn test_plain_text_passes_unchanged() {
        let text = "Rest, drink fluids, and see a doctor if the fever lasts more than 3 days.";
        assert_eq!(feed(&[&text[..10], &text[10..31], &text[31..]]), text);
    }

    #[test]
    fn test_embedded_json_removed_across_chunks() {
        let out = feed(&[
            "Based on your symptoms ",
            "{\"action\": \"diag",
            "nose\", \"thought\": \"a } in a string\", ",
            "\"stage\": \"diagnosing\"}",
            " you should rest.",
        ]);
        assert_eq!(out, "Based on your symptoms  you should rest.");
    }

    #[test]
    fn test_nested_objects_removed() {
        let out = feed(&["A {\"medicalContextUpdate\": {\"symptoms\": [\"cough\"]}} B"]);
        assert_eq!(out, "A  B");
    }

    #[test]
    fn test_prose_braces_kept() {
        assert_eq!(strip_json("Use the {left} arm"), "Use the {left} arm");
        assert_eq!(strip_json("Empty {} set"), "Empty {} set");
    }

    #[test]
    fn test_unclosed_json_dropped_on_finish() {
        let mut filter = JsonStreamFilter::new();
        assert_eq!(filter.push("Done. {\"action\": \"resp"), "Done. ");
        assert!(filter.is_buffering());
        assert_eq!(filter.finish(), "");
    }

    #[test]
    fn test_unclosed_prose_flushed_on_finish() {
        let mut filter = JsonStreamFilter::new();
        assert_eq!(filter.push("odd {\"quoted\" text"), "odd ");
        assert_eq!(filter.finish(), "{\"quoted\" text");
    }
}
