//! Deterministic capability fakes.
//!
//! `ScriptedGenerator` and `ScriptedSearch` answer by substring rules over the
//! prompt or query, so a test can script each pipeline stage independently.
//! Both record every call for assertions.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::error::{CapabilityError, CapabilityResult};
use super::{SearchProvider, TextGenerator};
use crate::domain::Source;

struct GenerationRule {
    needle: String,
    responses: Vec<CapabilityResult<String>>,
    served: usize,
}

/// Text generator that replays scripted responses.
///
/// The first rule whose needle occurs in the prompt answers. A rule with
/// several responses serves them in order and then repeats the last one.
pub struct ScriptedGenerator {
    rules: Mutex<Vec<GenerationRule>>,
    fallback: CapabilityResult<String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            fallback: Err(CapabilityError::Failed("no scripted response".to_string())),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer prompts containing `needle` with `text`.
    pub fn respond_to(self, needle: impl Into<String>, text: impl Into<String>) -> Self {
        self.respond_sequence(needle, vec![Ok(text.into())])
    }

    /// Answer prompts containing `needle` with `responses`, in order.
    pub fn respond_sequence(
        self,
        needle: impl Into<String>,
        responses: Vec<CapabilityResult<String>>,
    ) -> Self {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(GenerationRule {
                needle: needle.into(),
                responses,
                served: 0,
            });
        }
        self
    }

    /// Fail prompts containing `needle` with `err`.
    pub fn fail_on(self, needle: impl Into<String>, err: CapabilityError) -> Self {
        self.respond_sequence(needle, vec![Err(err)])
    }

    /// Response for prompts no rule matches.
    pub fn otherwise(mut self, text: impl Into<String>) -> Self {
        self.fallback = Ok(text.into());
        self
    }

    /// Sleep this long before every response.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Prompts received, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    fn next_response(&self, prompt: &str) -> CapabilityResult<String> {
        let Ok(mut rules) = self.rules.lock() else {
            return Err(CapabilityError::Failed("script poisoned".to_string()));
        };
        for rule in rules.iter_mut() {
            if !prompt.contains(&rule.needle) || rule.responses.is_empty() {
                continue;
            }
            let idx = rule.served.min(rule.responses.len() - 1);
            rule.served += 1;
            return rule.responses[idx].clone();
        }
        self.fallback.clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str, _context: Option<&str>) -> CapabilityResult<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(prompt.to_string());
        }
        let response = self.next_response(prompt);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        response
    }
}

enum SearchRule {
    Hits {
        needle: String,
        hits: Vec<Source>,
    },
    Fail {
        needle: String,
        err: CapabilityError,
        /// `None` fails forever; `Some(n)` fails the next `n` matching calls.
        remaining: Option<u32>,
    },
    Delay {
        needle: String,
        delay: Duration,
    },
}

/// Search provider that answers from scripted rules.
///
/// Fail rules are consulted before hit rules, so a bounded failure followed
/// by hits models a flaky backend that recovers.
pub struct ScriptedSearch {
    rules: Mutex<Vec<SearchRule>>,
    fallback: Vec<Source>,
    queries: Mutex<Vec<String>>,
}

impl Default for ScriptedSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedSearch {
    pub fn new() -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            fallback: Vec::new(),
            queries: Mutex::new(Vec::new()),
        }
    }

    fn push(self, rule: SearchRule) -> Self {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(rule);
        }
        self
    }

    /// Return `hits` for queries containing `needle`.
    pub fn hits_for(self, needle: impl Into<String>, hits: Vec<Source>) -> Self {
        self.push(SearchRule::Hits {
            needle: needle.into(),
            hits,
        })
    }

    /// Permanently fail queries containing `needle`.
    pub fn fail_for(self, needle: impl Into<String>, err: CapabilityError) -> Self {
        self.push(SearchRule::Fail {
            needle: needle.into(),
            err,
            remaining: None,
        })
    }

    /// Fail the next `times` queries containing `needle`, then fall through.
    pub fn fail_times(self, needle: impl Into<String>, times: u32, err: CapabilityError) -> Self {
        self.push(SearchRule::Fail {
            needle: needle.into(),
            err,
            remaining: Some(times),
        })
    }

    /// Delay answers to queries containing `needle`.
    pub fn delay_for(self, needle: impl Into<String>, delay: Duration) -> Self {
        self.push(SearchRule::Delay {
            needle: needle.into(),
            delay,
        })
    }

    /// Hits for queries no rule matches (empty by default).
    pub fn otherwise(mut self, hits: Vec<Source>) -> Self {
        self.fallback = hits;
        self
    }

    /// Queries received, in call order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }

    fn plan(&self, query: &str) -> (Option<Duration>, CapabilityResult<Vec<Source>>) {
        let Ok(mut rules) = self.rules.lock() else {
            return (None, Err(CapabilityError::Failed("script poisoned".to_string())));
        };

        let delay = rules.iter().find_map(|r| match r {
            SearchRule::Delay { needle, delay } if query.contains(needle.as_str()) => Some(*delay),
            _ => None,
        });

        for rule in rules.iter_mut() {
            if let SearchRule::Fail {
                needle,
                err,
                remaining,
            } = rule
            {
                if !query.contains(needle.as_str()) {
                    continue;
                }
                match remaining {
                    None => return (delay, Err(err.clone())),
                    Some(0) => continue,
                    Some(n) => {
                        *n -= 1;
                        return (delay, Err(err.clone()));
                    }
                }
            }
        }

        let hits = rules
            .iter()
            .find_map(|r| match r {
                SearchRule::Hits { needle, hits } if query.contains(needle.as_str()) => {
                    Some(hits.clone())
                }
                _ => None,
            })
            .unwrap_or_else(|| self.fallback.clone());
        (delay, Ok(hits))
    }
}

#[async_trait]
impl SearchProvider for ScriptedSearch {
    async fn search(&self, query: &str) -> CapabilityResult<Vec<Source>> {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query.to_string());
        }
        let (delay, result) = self.plan(query);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result
    }
}

/// Convenience constructor for test sources.
pub fn source(uri: &str, snippet: &str) -> Source {
    Source {
        uri: uri.to_string(),
        snippet: snippet.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_generator_sequence_repeats_last_response() {
        let gen = ScriptedGenerator::new().respond_sequence(
            "draft",
            vec![Ok("one".to_string()), Ok("two".to_string())],
        );
        assert_eq!(gen.generate("draft please", None).await.unwrap(), "one");
        assert_eq!(gen.generate("draft again", None).await.unwrap(), "two");
        assert_eq!(gen.generate("draft more", None).await.unwrap(), "two");
        assert_eq!(gen.call_count(), 3);
    }

    #[tokio::test]
    async fn test_generator_unmatched_prompt_uses_fallback() {
        let gen = ScriptedGenerator::new();
        assert!(gen.generate("anything", None).await.is_err());
        let gen = ScriptedGenerator::new().otherwise("default");
        assert_eq!(gen.generate("anything", None).await.unwrap(), "default");
    }

    #[tokio::test]
    async fn test_search_bounded_failure_then_hits() {
        let search = ScriptedSearch::new()
            .fail_times("grid", 1, CapabilityError::Transient("503".into()))
            .hits_for("grid", vec![source("https://g.example", "grid fact")]);

        assert!(search.search("grid storage").await.is_err());
        let hits = search.search("grid storage").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(search.queries().len(), 2);
    }

    #[tokio::test]
    async fn test_search_permanent_failure_wins_over_hits() {
        let search = ScriptedSearch::new()
            .hits_for("x", vec![source("u", "s")])
            .fail_for("x", CapabilityError::Failed("gone".into()));
        assert!(search.search("x").await.is_err());
        assert!(search.search("x").await.is_err());
    }
}
