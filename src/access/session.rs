use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, DeleteCookiesParams};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::AccessSettings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
}

/// The browser page an acquisition drives. One session is at one navigation state at a
/// time, so every call on it is sequential.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn goto(&mut self, url: &str) -> Result<()>;
    async fn run_script(&mut self, script: &str) -> Result<()>;
    async fn current_url(&mut self) -> Result<String>;
    async fn page_source(&mut self) -> Result<String>;
    async fn cookies(&mut self) -> Result<Vec<SessionCookie>>;
    async fn delete_cookie(&mut self, name: &str, domain: &str) -> Result<()>;
    async fn set_cookie(&mut self, cookie: &SessionCookie) -> Result<()>;
}

pub struct ChromeSession {
    page: Page,
}

impl ChromeSession {
    pub fn new(page: Page) -> Self {
        ChromeSession { page }
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn goto(&mut self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .with_context(|| format!("Navigation to {} failed", url))?;
        Ok(())
    }

    async fn run_script(&mut self, script: &str) -> Result<()> {
        self.page
            .evaluate(script)
            .await
            .context("Script evaluation failed")?;
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    async fn page_source(&mut self) -> Result<String> {
        self.page.content().await.context("Failed to read page content")
    }

    async fn cookies(&mut self) -> Result<Vec<SessionCookie>> {
        let cookies = self.page.get_cookies().await.context("Failed to list cookies")?;
        Ok(cookies
            .into_iter()
            .map(|c| SessionCookie {
                name: c.name,
                value: c.value,
                domain: c.domain,
            })
            .collect())
    }

    async fn delete_cookie(&mut self, name: &str, domain: &str) -> Result<()> {
        let params = DeleteCookiesParams::builder()
            .name(name)
            .domain(domain)
            .build()
            .map_err(|e| anyhow!(e))?;
        self.page.delete_cookie(params).await?;
        Ok(())
    }

    async fn set_cookie(&mut self, cookie: &SessionCookie) -> Result<()> {
        let param = CookieParam::builder()
            .name(cookie.name.clone())
            .value(cookie.value.clone())
            .domain(cookie.domain.clone())
            .path("/")
            .build()
            .map_err(|e| anyhow!(e))?;
        self.page.set_cookie(param).await?;
        Ok(())
    }
}

/// A launched Chrome process plus the task pumping its CDP event stream.
pub struct ChromeBrowser {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl ChromeBrowser {
    pub async fn launch(settings: &AccessSettings) -> Result<Self> {
        let mut builder = BrowserConfig::builder();
        if !settings.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &settings.chrome_path {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(|e| anyhow!(e))?;
        let (browser, mut events) = Browser::launch(config)
            .await
            .context("Failed to launch Chrome")?;
        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let Err(e) = event {
                    warn!("Browser event stream error: {}", e);
                    break;
                }
            }
        });
        Ok(ChromeBrowser { browser, handler })
    }

    pub async fn new_session(&self) -> Result<ChromeSession> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("Failed to open a browser page")?;
        Ok(ChromeSession::new(page))
    }

    pub async fn shutdown(mut self) {
        if let Err(e) = self.browser.close().await {
            debug!("Browser close failed: {}", e);
        }
        let _ = self.browser.wait().await;
        self.handler.abort();
    }
}
