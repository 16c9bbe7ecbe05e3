use crate::config::BotConfig;
use crate::models::candidate::{AvailDates, Slot};
use crate::scraping::constants::*;
use crate::selection::ports::{AvailabilitySource, Notifier, SlotDropdown, Submitter, Widget};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thirtyfour::prelude::*;
use tracing::{error, info, warn};
use url::Url;

/// A browser session sitting on the slot selection page
pub struct KendoPage {
    driver: Arc<WebDriver>,
    url: Url,
}

impl KendoPage {
    pub async fn open(config: &BotConfig, url: Url) -> Result<Self> {
        let mut caps = DesiredCapabilities::chrome();
        if config.headless {
            caps.set_headless()?;
        }

        caps.add_arg("--no-sandbox")?;
        caps.add_arg("--disable-dev-shm-usage")?;
        caps.add_arg("--disable-gpu")?;
        caps.add_arg("--disable-extensions")?;
        caps.add_arg("--no-first-run")?;
        caps.add_arg("--disable-background-timer-throttling")?;
        caps.add_arg("--disable-renderer-backgrounding")?;

        let driver = WebDriver::new(config.webdriver_url.as_str(), caps).await?;
        let page = KendoPage {
            driver: Arc::new(driver),
            url,
        };

        if let Err(e) = page.load().await {
            error!("Slot selection page failed to load: {:?}", e);
            if let Err(quit_err) = page.quit().await {
                warn!("Could not quit Chrome after a failed load: {:?}", quit_err);
            }
            return Err(e);
        }
        Ok(page)
    }

    async fn load(&self) -> Result<()> {
        self.driver
            .set_window_rect(0, 0, WINDOW_WIDTH, WINDOW_HEIGHT)
            .await?;

        info!("Opening slot selection page {}", self.url);
        self.driver.goto(self.url.as_str()).await?;
        self.prepare().await
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn prepare(&self) -> Result<()> {
        run_script(&self.driver, PREPARE_PAGE_JS, vec![]).await?;
        Ok(())
    }

    pub fn date_picker(&self) -> KendoDatePicker {
        KendoDatePicker {
            driver: self.driver.clone(),
        }
    }

    pub fn slot_dropdown(&self) -> KendoDropDown {
        KendoDropDown {
            driver: self.driver.clone(),
        }
    }

    /// The browser's cookies, formatted for a `Cookie` request header
    pub async fn cookie_header(&self) -> Result<Option<String>> {
        let cookies = self.driver.get_all_cookies().await?;
        if cookies.is_empty() {
            return Ok(None);
        }

        let header = cookies
            .iter()
            .map(|cookie| format!("{}={}", cookie.name, cookie.value))
            .collect::<Vec<_>>()
            .join("; ");
        Ok(Some(header))
    }

    pub async fn quit(self) -> Result<()> {
        info!("Quitting Chrome session");

        match Arc::try_unwrap(self.driver) {
            Ok(driver) => driver.quit().await?,
            Err(_) => error!("Driver Arc still has other references, cannot quit cleanly"),
        }
        Ok(())
    }
}

async fn run_script(driver: &WebDriver, script: &'static str, args: Vec<Value>) -> Result<Value> {
    let ret = driver
        .execute(script, args)
        .await
        .context("page script failed")?;
    Ok(ret.json().clone())
}

async fn script_flag(driver: &WebDriver, script: &'static str) -> Result<bool> {
    Ok(run_script(driver, script, vec![]).await?.as_bool().unwrap_or(false))
}

async fn script_text(driver: &WebDriver, script: &'static str) -> Result<Option<String>> {
    let value = run_script(driver, script, vec![]).await?;
    Ok(match value {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    })
}

/// The visible Kendo date picker
pub struct KendoDatePicker {
    driver: Arc<WebDriver>,
}

#[async_trait]
impl Widget for KendoDatePicker {
    async fn is_ready(&self) -> Result<bool> {
        script_flag(&self.driver, DATE_PICKER_READY_JS).await
    }

    async fn value(&self) -> Result<Option<String>> {
        script_text(&self.driver, DATE_PICKER_VALUE_JS).await
    }

    async fn set_value(&self, value: &str) -> Result<()> {
        run_script(
            &self.driver,
            DATE_PICKER_SET_JS,
            vec![Value::String(value.to_string())],
        )
        .await?;
        Ok(())
    }
}

/// The visible Kendo slot dropdown
pub struct KendoDropDown {
    driver: Arc<WebDriver>,
}

#[async_trait]
impl Widget for KendoDropDown {
    async fn is_ready(&self) -> Result<bool> {
        script_flag(&self.driver, DROPDOWN_READY_JS).await
    }

    async fn value(&self) -> Result<Option<String>> {
        script_text(&self.driver, DROPDOWN_VALUE_JS).await
    }

    async fn set_value(&self, value: &str) -> Result<()> {
        run_script(
            &self.driver,
            DROPDOWN_SET_VALUE_JS,
            vec![Value::String(value.to_string())],
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SlotDropdown for KendoDropDown {
    async fn set_data_source(&self, slots: &[Slot]) -> Result<()> {
        let source = serde_json::to_value(slots)?;
        run_script(&self.driver, DROPDOWN_SET_SOURCE_JS, vec![source]).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        run_script(&self.driver, DROPDOWN_CLEAR_JS, vec![]).await?;
        Ok(())
    }
}

#[async_trait]
impl AvailabilitySource for KendoPage {
    async fn available_dates(&self) -> Result<Option<AvailDates>> {
        match run_script(&self.driver, AVAIL_DATES_JS, vec![]).await? {
            Value::Null => Ok(None),
            value => Ok(Some(serde_json::from_value(value)?)),
        }
    }
}

#[async_trait]
impl Submitter for KendoPage {
    async fn submit(&self) -> Result<()> {
        self.driver
            .find(By::Id(BUTTON_SUBMIT_ID))
            .await?
            .click()
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for KendoPage {
    async fn announce(&self, message: &str) -> Result<()> {
        run_script(
            &self.driver,
            ANNOUNCE_JS,
            vec![Value::String(message.to_string())],
        )
        .await?;
        Ok(())
    }
}
