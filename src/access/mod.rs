pub mod dedup;
pub mod session;
pub mod strategy;

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::AccessSettings;
use crate::error::AccessError;
use crate::model::RawDocument;
use crate::parser::profile_id;
use crate::store::ArtifactStore;
use dedup::{Claim, DedupSet};
use session::{BrowserSession, SessionCookie};
use strategy::{initial_plan, NavStep, NavigationStrategy};

const WALL_URL_MARKERS: &[&str] = &["authwall", "signup"];
const WALL_CONTENT_MARKERS: &[&str] = &["authwall", "Sign in to continue to LinkedIn"];
const BLOCKING_COOKIE_HINTS: &[&str] = &["auth", "block"];

/// True when the page is a login or signup wall instead of the requested profile.
pub fn is_authwall(url: &str, content: &str) -> bool {
    WALL_URL_MARKERS.iter().any(|m| url.contains(m))
        || WALL_CONTENT_MARKERS.iter().any(|m| content.contains(m))
}

#[derive(Debug)]
pub enum Acquisition {
    Fetched { document: RawDocument, attempts: u32 },
    /// Already in the dedup set or the artifact store; nothing was navigated.
    AlreadyAcquired,
    /// Another worker holds the claim on this URL.
    ClaimedElsewhere,
}

/// Per-target state for one `acquire` call.
#[derive(Debug)]
struct AccessSession<'a> {
    target: &'a str,
    referrer: &'a str,
    attempts: u32,
}

pub struct AccessController<S: BrowserSession> {
    session: S,
    dedup: Arc<DedupSet>,
    artifacts: Arc<dyn ArtifactStore>,
    settings: AccessSettings,
    deadline: Option<Duration>,
    cancel: CancellationToken,
}

impl<S: BrowserSession> AccessController<S> {
    pub fn new(
        session: S,
        dedup: Arc<DedupSet>,
        artifacts: Arc<dyn ArtifactStore>,
        settings: AccessSettings,
    ) -> Self {
        let deadline = settings.deadline();
        AccessController {
            session,
            dedup,
            artifacts,
            settings,
            deadline,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Fetches `target` through the browser session, retrying past authwalls.
    ///
    /// The URL is marked in the dedup set only on success; every error leaves it
    /// eligible for a later run.
    pub async fn acquire(
        &mut self,
        target: &str,
        referrer: Option<&str>,
    ) -> Result<Acquisition, AccessError> {
        let key = profile_id(target).ok_or_else(|| AccessError::InvalidUrl(target.to_string()))?;

        let claim = match self.dedup.try_claim(target) {
            Claim::Claimed(claim) => claim,
            Claim::AlreadyAcquired => return Ok(Acquisition::AlreadyAcquired),
            Claim::InFlight => return Ok(Acquisition::ClaimedElsewhere),
        };
        if self.artifacts.exists(&key) {
            debug!("{} already captured", key);
            claim.commit();
            return Ok(Acquisition::AlreadyAcquired);
        }

        let referrer = referrer.unwrap_or(&self.settings.default_referrer).to_string();
        let cancel = self.cancel.clone();
        let deadline = self.deadline;
        let started = Instant::now();

        let attempt = async {
            match deadline {
                Some(limit) => tokio::time::timeout(limit, self.drive(target, &referrer))
                    .await
                    .unwrap_or_else(|_| {
                        Err(AccessError::DeadlineExceeded {
                            url: target.to_string(),
                            elapsed: started.elapsed(),
                        })
                    }),
                None => self.drive(target, &referrer).await,
            }
        };
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AccessError::Cancelled { url: target.to_string() }),
            r = attempt => r,
        };

        match result {
            Ok((document, attempts)) => {
                claim.commit();
                Ok(Acquisition::Fetched { document, attempts })
            }
            Err(e) => Err(e),
        }
    }

    async fn drive(&mut self, target: &str, referrer: &str) -> Result<(RawDocument, u32), AccessError> {
        let mut state = AccessSession {
            target,
            referrer,
            attempts: 0,
        };
        let settle = Duration::from_millis(self.settings.settle_ms);
        self.run_plan(initial_plan(target, &self.settings.neutral_url, settle))
            .await?;

        loop {
            let url = self.session.current_url().await?;
            let content = self.session.page_source().await?;
            if !is_authwall(&url, &content) {
                info!("Acquired {} after {} retries", state.target, state.attempts);
                let mut document = RawDocument::new(state.target, content);
                document.final_url = Some(url).filter(|u| !u.is_empty());
                return Ok((document, state.attempts));
            }
            if state.attempts >= self.settings.max_retries {
                warn!("Authwall persists for {} after {} retries", state.target, state.attempts);
                return Err(AccessError::AuthwallExceeded {
                    url: state.target.to_string(),
                    attempts: state.attempts,
                });
            }

            let strategy = NavigationStrategy::for_attempt(state.attempts);
            state.attempts += 1;
            debug!(
                "Authwall on {} (attempt {}/{}), trying {}",
                state.target,
                state.attempts,
                self.settings.max_retries,
                strategy.name()
            );
            let plan = strategy.plan(
                state.target,
                state.referrer,
                &self.settings.neutral_url,
                settle,
            );
            self.run_plan(plan).await?;
            self.sanitize_cookies().await?;
            self.simulate_human().await?;
            self.pause(self.settings.retry_delay_ms).await;
        }
    }

    async fn run_plan(&mut self, steps: Vec<NavStep>) -> Result<(), AccessError> {
        for step in steps {
            match step {
                NavStep::Goto(url) => self.session.goto(&url).await?,
                NavStep::Script(js) => self.session.run_script(&js).await?,
                NavStep::Pause(d) => {
                    if !d.is_zero() {
                        tokio::time::sleep(d).await;
                    }
                }
            }
        }
        Ok(())
    }

    /// Drops cookies that look like auth or block state and pins the locale cookie.
    async fn sanitize_cookies(&mut self) -> Result<(), AccessError> {
        let site = self.settings.cookie_domain.trim_start_matches('.').to_string();
        let cookies = self.session.cookies().await?;
        for c in cookies.iter().filter(|c| c.domain.contains(&site)) {
            let name = c.name.to_lowercase();
            if BLOCKING_COOKIE_HINTS.iter().any(|h| name.contains(h)) {
                debug!("Removing cookie {} ({})", c.name, c.domain);
                self.session.delete_cookie(&c.name, &c.domain).await?;
            }
        }

        let locale = &self.settings.locale_cookie;
        let present = cookies
            .iter()
            .any(|c| c.name == locale.name && c.value == locale.value && c.domain.contains(&site));
        if !present {
            let cookie = SessionCookie {
                name: locale.name.clone(),
                value: locale.value.clone(),
                domain: self.settings.cookie_domain.clone(),
            };
            self.session.set_cookie(&cookie).await?;
        }
        Ok(())
    }

    async fn simulate_human(&mut self) -> Result<(), AccessError> {
        let (scroll, pointer) = {
            let mut rng = rand::thread_rng();
            let scroll: u32 = rng.gen_range(100..=600);
            let pointer = rng
                .gen_bool(0.3)
                .then(|| (rng.gen_range(0..=500u32), rng.gen_range(0..=500u32)));
            (scroll, pointer)
        };
        self.session
            .run_script(&format!("window.scrollBy(0, {});", scroll))
            .await?;
        self.pause(self.settings.retry_delay_ms / 2).await;
        if let Some((x, y)) = pointer {
            self.session
                .run_script(&format!(
                    "document.dispatchEvent(new MouseEvent('mousemove', {{ clientX: {}, clientY: {}, bubbles: true }}));",
                    x, y
                ))
                .await?;
        }
        Ok(())
    }

    /// Randomized pause between consecutive targets on this session.
    pub async fn pace(&self) {
        self.pause_with_jitter(self.settings.between_targets_ms, self.settings.jitter_ms * 2)
            .await;
    }

    async fn pause(&self, base_ms: u64) {
        self.pause_with_jitter(base_ms, self.settings.jitter_ms).await;
    }

    async fn pause_with_jitter(&self, base_ms: u64, jitter_ms: u64) {
        let extra = rand::thread_rng().gen_range(0..=jitter_ms);
        let total = base_ms + extra;
        if total > 0 {
            tokio::time::sleep(Duration::from_millis(total)).await;
        }
    }
}
