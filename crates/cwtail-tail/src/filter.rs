use regex::Regex;

/// Compiled message filter
#[derive(Clone)]
pub struct CompiledFilter {
    /// Regex pattern (if any)
    regex: Option<Regex>,

    /// Original pattern string
    pattern: String,

    /// Whether to invert match
    invert: bool,
}

impl CompiledFilter {
    /// Create a new filter from a pattern string
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let regex = if pattern.is_empty() {
            None
        } else {
            Some(Regex::new(pattern)?)
        };

        Ok(Self {
            regex,
            pattern: pattern.to_string(),
            invert: false,
        })
    }

    /// Create a filter that keeps messages NOT matching `pattern`.
    /// An empty pattern keeps everything.
    pub fn exclude(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::new(pattern)?.inverted())
    }

    /// Invert the match
    pub fn inverted(mut self) -> Self {
        self.invert = true;
        self
    }

    /// Check if a message passes this filter
    pub fn matches(&self, message: &str) -> bool {
        match &self.regex {
            Some(re) => re.is_match(message) != self.invert,
            // No pattern: nothing to include or exclude
            None => true,
        }
    }

    /// Check if filter is empty (matches everything)
    pub fn is_empty(&self) -> bool {
        self.regex.is_none()
    }
}

impl Default for CompiledFilter {
    fn default() -> Self {
        Self {
            regex: None,
            pattern: String::new(),
            invert: false,
        }
    }
}

impl std::fmt::Debug for CompiledFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledFilter")
            .field("pattern", &self.pattern)
            .field("invert", &self.invert)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regex_filter() {
        let filter = CompiledFilter::new("error").unwrap();
        assert!(filter.matches("an error occurred"));
        assert!(!filter.matches("everything is fine"));
    }

    #[test]
    fn test_exclude_filter() {
        let filter = CompiledFilter::exclude("health(check)?").unwrap();
        assert!(!filter.matches("GET /healthcheck 200"));
        assert!(filter.matches("GET /orders 200"));
    }

    #[test]
    fn test_empty_exclude_keeps_everything() {
        let filter = CompiledFilter::exclude("").unwrap();
        assert!(filter.is_empty());
        assert!(filter.matches("anything"));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(CompiledFilter::exclude("(unclosed").is_err());
    }
}
