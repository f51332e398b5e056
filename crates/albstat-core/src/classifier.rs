// Service classification
//
// The request column looks like `GET https://host:443/arcgis/rest/services/geodata/Parkering/MapServer/3?f=json HTTP/2.0`.
// Path rules run in order and the first capture wins, then the special
// endpoints, otherwise the request stays unclassified (empty string).

use crate::config::{ClassifierConfig, EndpointMatch, SpecialEndpoint};
use crate::error::ConfigError;
use regex::Regex;

struct PathRule {
    name: String,
    pattern: Regex,
}

pub struct ServiceClassifier {
    rules: Vec<PathRule>,
    special: Vec<SpecialEndpoint>,
    separator: String,
}

impl ServiceClassifier {
    /// compile all rules. fails on the first invalid pattern
    pub fn from_config(config: &ClassifierConfig) -> Result<Self, ConfigError> {
        let rules = config
            .rules
            .iter()
            .map(|rule| {
                Regex::new(&rule.pattern)
                    .map(|pattern| PathRule {
                        name: rule.name.clone(),
                        pattern,
                    })
                    .map_err(|source| ConfigError::Pattern {
                        rule: rule.name.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        // compare lowercase once instead of per request
        let special = config
            .special
            .iter()
            .map(|s| SpecialEndpoint {
                url: s.url.to_lowercase(),
                service: s.service.clone(),
                matching: s.matching,
            })
            .collect();

        Ok(Self {
            rules,
            special,
            separator: config.separator.clone(),
        })
    }

    /// Rule names in evaluation order
    pub fn rule_names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.name.as_str())
    }

    /// Pull the url out of a `METHOD url PROTOCOL` request.
    /// Returns "" when the request has no second part.
    pub fn extract_url(request: &str) -> &str {
        request.split_whitespace().nth(1).unwrap_or("")
    }

    /// Classify a raw request column
    pub fn classify(&self, request: &str) -> String {
        self.classify_url(Self::extract_url(request))
    }

    /// Classify an already extracted url
    pub fn classify_url(&self, url: &str) -> String {
        if url.is_empty() {
            return String::new();
        }

        for rule in &self.rules {
            if let Some(caps) = rule.pattern.captures(url) {
                let captured = caps.get(1).or_else(|| caps.get(0)).map(|m| m.as_str());
                if let Some(service) = captured {
                    return self.normalize(service);
                }
            }
        }

        let lowered = url.to_lowercase();
        self.special
            .iter()
            .find(|s| match s.matching {
                EndpointMatch::Exact => lowered == s.url,
                EndpointMatch::Prefix => lowered.starts_with(&s.url),
            })
            .map(|s| s.service.clone())
            .unwrap_or_default()
    }

    // "geodata/Parkering" -> "geodata.Parkering", runs of slashes collapse
    fn normalize(&self, captured: &str) -> String {
        captured
            .split('/')
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(&self.separator)
    }
}
