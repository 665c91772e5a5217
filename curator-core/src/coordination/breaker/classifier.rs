use crate::gateway::GatewayFailure;

/// Lowercase message fragments upstream uses when it starts rate limiting us.
const RATE_LIMIT_PATTERNS: &[&str] = &[
    "confirm you're not a bot",
    "confirm that you're not a bot",
    "sign in to confirm",
    "login_required",
    "signinconfirmnotbotexception",
    "too many requests",
    "http 429",
];

/// Failure kinds that are rate limiting regardless of message.
const RATE_LIMIT_KINDS: &[&str] = &["SignInConfirmNotBot", "RateLimited"];

/// Separates rate-limit signals from generic failures. Only the former may
/// move the breaker; timeouts, network errors and not-found never do.
#[derive(Debug, Clone)]
pub struct RateLimitClassifier {
    patterns: Vec<String>,
}

impl Default for RateLimitClassifier {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl RateLimitClassifier {
    pub fn new(extra_patterns: &[String]) -> Self {
        let patterns = RATE_LIMIT_PATTERNS
            .iter()
            .map(|pattern| (*pattern).to_string())
            .chain(
                extra_patterns
                    .iter()
                    .map(|pattern| pattern.trim().to_lowercase())
                    .filter(|pattern| !pattern.is_empty()),
            )
            .collect();
        Self { patterns }
    }

    /// Inspects the failure and every cause beneath it.
    pub fn is_rate_limit(&self, failure: &GatewayFailure) -> bool {
        failure.chain().any(|link| self.matches(link))
    }

    fn matches(&self, failure: &GatewayFailure) -> bool {
        if RATE_LIMIT_KINDS.contains(&failure.kind.as_str()) {
            return true;
        }
        let message = failure.message.to_lowercase();
        self.patterns
            .iter()
            .any(|pattern| message.contains(pattern.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bot_check_messages_are_rate_limits() {
        let classifier = RateLimitClassifier::default();
        let failure = GatewayFailure::new(
            "ExtractionError",
            "Sign in to confirm you're not a bot. This helps protect our community.",
        );

        assert!(classifier.is_rate_limit(&failure));
    }

    #[test]
    fn nested_cause_is_inspected() {
        let classifier = RateLimitClassifier::default();
        let failure = GatewayFailure::new("ExecutionException", "lookup failed")
            .caused_by(GatewayFailure::new("SignInConfirmNotBot", "blocked"));

        assert!(classifier.is_rate_limit(&failure));
    }

    #[test]
    fn generic_and_breaker_failures_are_not_rate_limits() {
        let classifier = RateLimitClassifier::default();

        assert!(!classifier.is_rate_limit(&GatewayFailure::new(
            "Timeout",
            "request timed out after 10s"
        )));
        assert!(!classifier.is_rate_limit(&GatewayFailure::new(
            "Network",
            "connection reset by peer"
        )));
        assert!(!classifier.is_rate_limit(&GatewayFailure::breaker_open()));
    }

    #[test]
    fn configured_patterns_extend_the_defaults() {
        let classifier = RateLimitClassifier::new(&["Quota Exceeded".to_string()]);
        let failure = GatewayFailure::new("Upstream", "daily quota exceeded for key");

        assert!(classifier.is_rate_limit(&failure));
    }
}
