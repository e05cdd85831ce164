use std::time::Duration;

const DEFERRED_REDIRECT_MS: u64 = 500;

/// A single browser command in a navigation plan.
#[derive(Debug, Clone, PartialEq)]
pub enum NavStep {
    Goto(String),
    Script(String),
    Pause(Duration),
}

/// Ways of re-entering a target once an authwall has been seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationStrategy {
    /// Land on the referrer, then reopen the target in the same tab.
    ReopenViaReferrer,
    /// Land on a neutral page, rewrite history to the referrer, then redirect.
    HistoryRewrite,
    /// Land on the referrer and redirect after a short timer.
    DeferredRedirect,
}

impl NavigationStrategy {
    pub fn for_attempt(attempt: u32) -> Self {
        match attempt % 3 {
            0 => NavigationStrategy::ReopenViaReferrer,
            1 => NavigationStrategy::HistoryRewrite,
            _ => NavigationStrategy::DeferredRedirect,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            NavigationStrategy::ReopenViaReferrer => "reopen_via_referrer",
            NavigationStrategy::HistoryRewrite => "history_rewrite",
            NavigationStrategy::DeferredRedirect => "deferred_redirect",
        }
    }

    pub fn plan(&self, target: &str, referrer: &str, neutral: &str, settle: Duration) -> Vec<NavStep> {
        let target_js = js_string(target);
        match self {
            NavigationStrategy::ReopenViaReferrer => vec![
                NavStep::Goto(referrer.to_string()),
                NavStep::Pause(settle),
                NavStep::Script(format!("window.open({}, '_self');", target_js)),
                NavStep::Pause(settle),
            ],
            NavigationStrategy::HistoryRewrite => vec![
                NavStep::Goto(neutral.to_string()),
                NavStep::Pause(settle),
                NavStep::Script(format!(
                    "history.pushState({{}}, '', {}); window.location.href = {};",
                    js_string(referrer),
                    target_js
                )),
                NavStep::Pause(settle),
            ],
            NavigationStrategy::DeferredRedirect => vec![
                NavStep::Goto(referrer.to_string()),
                NavStep::Pause(settle),
                NavStep::Script(format!(
                    "setTimeout(() => {{ window.location.href = {}; }}, {});",
                    target_js, DEFERRED_REDIRECT_MS
                )),
                NavStep::Pause(settle + Duration::from_millis(DEFERRED_REDIRECT_MS * 2)),
            ],
        }
    }
}

/// First visit: neutral page, then a script-driven jump so the target sees a referrer.
pub fn initial_plan(target: &str, neutral: &str, settle: Duration) -> Vec<NavStep> {
    vec![
        NavStep::Goto(neutral.to_string()),
        NavStep::Pause(settle),
        NavStep::Script(format!("window.location.href = {};", js_string(target))),
        NavStep::Pause(settle),
    ]
}

fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: &str = "https://www.linkedin.com/in/jdoe";
    const R: &str = "https://www.google.com/search?q=jdoe";
    const N: &str = "https://www.google.com/";

    #[test]
    fn strategy_cycles_by_attempt() {
        let picked: Vec<_> = (0..6).map(NavigationStrategy::for_attempt).collect();
        assert_eq!(
            picked,
            vec![
                NavigationStrategy::ReopenViaReferrer,
                NavigationStrategy::HistoryRewrite,
                NavigationStrategy::DeferredRedirect,
                NavigationStrategy::ReopenViaReferrer,
                NavigationStrategy::HistoryRewrite,
                NavigationStrategy::DeferredRedirect,
            ]
        );
    }

    #[test]
    fn plans_enter_through_expected_page() {
        let zero = Duration::ZERO;
        let first = |s: NavigationStrategy| s.plan(T, R, N, zero).into_iter().next();
        assert_eq!(first(NavigationStrategy::ReopenViaReferrer), Some(NavStep::Goto(R.into())));
        assert_eq!(first(NavigationStrategy::HistoryRewrite), Some(NavStep::Goto(N.into())));
        assert_eq!(first(NavigationStrategy::DeferredRedirect), Some(NavStep::Goto(R.into())));
    }

    #[test]
    fn history_rewrite_mentions_both_urls() {
        let steps = NavigationStrategy::HistoryRewrite.plan(T, R, N, Duration::ZERO);
        let script = steps
            .iter()
            .find_map(|s| match s {
                NavStep::Script(js) => Some(js.clone()),
                _ => None,
            })
            .unwrap();
        assert!(script.contains("history.pushState({}, '', \"https://www.google.com/search?q=jdoe\")"));
        assert!(script.ends_with("window.location.href = \"https://www.linkedin.com/in/jdoe\";"));
    }

    #[test]
    fn urls_are_escaped() {
        let steps = initial_plan("https://x/in/a\";alert(1)//", N, Duration::ZERO);
        assert_eq!(
            steps[2],
            NavStep::Script(r#"window.location.href = "https://x/in/a\";alert(1)//";"#.to_string())
        );
    }
}
