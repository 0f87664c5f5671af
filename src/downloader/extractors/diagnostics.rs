// Failure diagnostics - identifies why a VOD or a remux failed
//
// Analyzes platform messages and ffmpeg stderr to determine:
// - Type of failure (login required, expired session, deleted VOD, ...)
// - A hint for the user
// - Whether a retry may help

/// Reasons a VOD could not be fetched or remuxed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Signed stream URL expired or was rejected (HTTP 403 from the CDN)
    Http403Forbidden,

    /// Login needed to watch this VOD
    LoginRequired,

    /// Adult (19+) content that needs a verified account
    AgeRestricted,

    /// Subscriber-only or fan-club-only VOD
    SubscribersOnly,

    /// Private VOD
    PrivateVod,

    /// Deleted or never existed
    VodUnavailable,

    /// Geographic restriction
    GeoBlocked,

    /// Rate limiting (429 or similar)
    RateLimited,

    /// Network timeout or refused connection
    NetworkTimeout,

    /// Output disk is full
    DiskFull,

    /// Stream data ffmpeg could not demux
    InvalidData,

    /// Generic/unknown failure
    Unknown,
}

impl FailureReason {
    /// Check if this reason is worth retrying later without changes
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::NetworkTimeout)
    }

    /// Check if logging in might help
    pub fn login_might_help(&self) -> bool {
        matches!(
            self,
            Self::Http403Forbidden | Self::LoginRequired | Self::AgeRestricted | Self::SubscribersOnly
        )
    }

    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::Http403Forbidden => "Access denied (HTTP 403)",
            Self::LoginRequired => "Login required",
            Self::AgeRestricted => "Age-restricted VOD",
            Self::SubscribersOnly => "Subscribers-only VOD",
            Self::PrivateVod => "Private VOD",
            Self::VodUnavailable => "VOD unavailable",
            Self::GeoBlocked => "Geographic restriction",
            Self::RateLimited => "Rate limited",
            Self::NetworkTimeout => "Network timeout",
            Self::DiskFull => "No space left on device",
            Self::InvalidData => "Invalid stream data",
            Self::Unknown => "Unknown failure",
        }
    }

    /// What the user can do about it
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Http403Forbidden => Some(
                "The stream URL was rejected. Signed URLs expire; run again, \
                 and use --login if the VOD needs an account.",
            ),
            Self::LoginRequired | Self::SubscribersOnly => {
                Some("Run with --login and an account that can watch this VOD.")
            }
            Self::AgeRestricted => Some("Run with --login using an age-verified account."),
            Self::RateLimited => Some("Wait a few minutes, then try again with fewer --jobs."),
            Self::NetworkTimeout => Some("Check your internet connection and try again."),
            Self::DiskFull => Some("Free up disk space or choose another --output directory."),
            Self::InvalidData => Some("The stream may be corrupt; try another quality with -q."),
            Self::VodUnavailable | Self::PrivateVod => {
                Some("The VOD was removed or made private; nothing to retry.")
            }
            Self::GeoBlocked | Self::Unknown => None,
        }
    }
}

/// Detailed diagnostics information
#[derive(Debug, Clone)]
pub struct FailureDiagnostics {
    /// Primary reason
    pub reason: FailureReason,

    /// First informative line of the message
    pub context: Option<String>,

    /// Raw error patterns that matched
    pub matched_patterns: Vec<String>,
}

impl FailureDiagnostics {
    pub fn new(reason: FailureReason, context: Option<String>) -> Self {
        Self {
            reason,
            context,
            matched_patterns: Vec::new(),
        }
    }

    pub fn with_patterns(mut self, patterns: Vec<String>) -> Self {
        self.matched_patterns = patterns;
        self
    }

    /// One-line summary suitable for a batch report
    pub fn summary(&self) -> String {
        match self.reason.hint() {
            Some(hint) => format!("{}. {}", self.reason.description(), hint),
            None => self.reason.description().to_string(),
        }
    }
}

/// Analyze an error message and return the failure reason
pub fn diagnose_error(error: &str) -> Option<FailureReason> {
    let lower = error.to_lowercase();

    // Check patterns in order of specificity

    if lower.contains("no space left") || lower.contains("disk full") {
        return Some(FailureReason::DiskFull);
    }

    if lower.contains("19세") || lower.contains("adult") || lower.contains("age-restricted") {
        return Some(FailureReason::AgeRestricted);
    }

    if lower.contains("구독") || lower.contains("subscriber") || lower.contains("fan club") {
        return Some(FailureReason::SubscribersOnly);
    }

    if lower.contains("로그인") || lower.contains("login required") || lower.contains("not logged in") {
        return Some(FailureReason::LoginRequired);
    }

    if lower.contains("비공개") || lower.contains("private") {
        return Some(FailureReason::PrivateVod);
    }

    if lower.contains("삭제")
        || lower.contains("존재하지 않")
        || lower.contains("not found")
        || lower.contains("404")
        || lower.contains("410")
        || lower.contains("deleted")
        || lower.contains("unavailable")
    {
        return Some(FailureReason::VodUnavailable);
    }

    if lower.contains("not available in your country") || lower.contains("region") {
        return Some(FailureReason::GeoBlocked);
    }

    if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests") {
        return Some(FailureReason::RateLimited);
    }

    if lower.contains("403") || lower.contains("forbidden") {
        return Some(FailureReason::Http403Forbidden);
    }

    if lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("connection refused")
        || lower.contains("connection reset")
        || lower.contains("network is unreachable")
    {
        return Some(FailureReason::NetworkTimeout);
    }

    if lower.contains("invalid data found") || lower.contains("could not find codec") {
        return Some(FailureReason::InvalidData);
    }

    if !error.trim().is_empty() {
        return Some(FailureReason::Unknown);
    }

    None
}

/// Full diagnostic analysis of an error
pub fn analyze_error(error: &str) -> FailureDiagnostics {
    let reason = diagnose_error(error).unwrap_or(FailureReason::Unknown);
    let patterns = extract_patterns(error);

    let context = error
        .lines()
        .map(str::trim)
        .find(|line| {
            let l = line.to_lowercase();
            l.starts_with("error")
                || l.contains("forbidden")
                || l.contains("failed")
                || l.contains("invalid")
        })
        .map(str::to_string);

    FailureDiagnostics::new(reason, context).with_patterns(patterns)
}

fn extract_patterns(error: &str) -> Vec<String> {
    let patterns = [
        "403",
        "404",
        "429",
        "forbidden",
        "timeout",
        "timed out",
        "rate limit",
        "private",
        "login",
        "no space left",
        "invalid data",
    ];

    let lower = error.to_lowercase();

    patterns
        .iter()
        .filter(|p| lower.contains(*p))
        .map(|p| p.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_403_detection() {
        let error = "[https @ 0x55] HTTP error 403 Forbidden";
        assert_eq!(diagnose_error(error), Some(FailureReason::Http403Forbidden));
        assert!(FailureReason::Http403Forbidden.login_might_help());
    }

    #[test]
    fn test_platform_messages() {
        assert_eq!(
            diagnose_error("로그인이 필요한 VOD입니다."),
            Some(FailureReason::LoginRequired)
        );
        assert_eq!(
            diagnose_error("19세 미만 시청 불가"),
            Some(FailureReason::AgeRestricted)
        );
        assert_eq!(
            diagnose_error("삭제되었거나 존재하지 않는 VOD입니다."),
            Some(FailureReason::VodUnavailable)
        );
        assert_eq!(diagnose_error("비공개 VOD"), Some(FailureReason::PrivateVod));
    }

    #[test]
    fn test_disk_full_detection() {
        let error = "av_interleaved_write_frame(): No space left on device";
        assert_eq!(diagnose_error(error), Some(FailureReason::DiskFull));
    }

    #[test]
    fn test_timeout_detection() {
        assert_eq!(
            diagnose_error("Connection timed out"),
            Some(FailureReason::NetworkTimeout)
        );
    }

    #[test]
    fn test_unknown_and_empty() {
        assert_eq!(diagnose_error("something odd"), Some(FailureReason::Unknown));
        assert_eq!(diagnose_error("   "), None);
    }

    #[test]
    fn test_retryable_reasons() {
        assert!(!FailureReason::VodUnavailable.is_retryable());
        assert!(FailureReason::RateLimited.is_retryable());
    }

    #[test]
    fn test_analyze_error() {
        let stderr = "Opening 'x' for reading\n\
                      [hls @ 0x1] HTTP error 403 Forbidden\n\
                      Error opening input files: Server returned 403 Forbidden";
        let diag = analyze_error(stderr);
        assert_eq!(diag.reason, FailureReason::Http403Forbidden);
        assert_eq!(diag.context.as_deref(), Some("[hls @ 0x1] HTTP error 403 Forbidden"));
        assert!(diag.matched_patterns.contains(&"403".to_string()));
        assert!(diag.summary().starts_with("Access denied"));
    }
}
