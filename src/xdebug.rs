//! Xdebug on/off switch for the PHP service.

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::context::AppContext;
use crate::errors::Result;
use crate::events::{ProgressEvent, emit};
use crate::exec;
use crate::store::XDEBUG_ENABLED_KEY;

pub struct XdebugController {
    ctx: Arc<AppContext>,
}

impl XdebugController {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    /// Stored state, or the last known one when the store is unreadable.
    pub async fn status(&self) -> bool {
        match self.ctx.settings.xdebug_enabled().await {
            Some(enabled) => {
                self.ctx.xdebug.set(enabled);
                enabled
            }
            None => self.ctx.xdebug.get(),
        }
    }

    pub async fn toggle(&self, tx: &mpsc::Sender<ProgressEvent>) -> Result<bool> {
        let enabled = !self.status().await;
        self.set_enabled(enabled, tx).await?;
        Ok(enabled)
    }

    /// Persist the flag and recreate the PHP service with the matching mode.
    pub async fn set_enabled(&self, enabled: bool, tx: &mpsc::Sender<ProgressEvent>) -> Result<()> {
        let mode = if enabled { "debug" } else { "off" };
        emit(
            tx,
            ProgressEvent::Step {
                step: "xdebug".to_string(),
                message: format!("Setting XDEBUG_MODE={}", mode),
            },
        )
        .await;

        self.ctx
            .store
            .save_setting(XDEBUG_ENABLED_KEY, if enabled { "true" } else { "false" })
            .await?;
        self.ctx.xdebug.set(enabled);

        let config = &self.ctx.config;
        let spec = exec::compose(
            config,
            [
                "up".to_string(),
                "-d".to_string(),
                "--force-recreate".to_string(),
                "--no-deps".to_string(),
                config.install.service.clone(),
            ],
        )
        .env("XDEBUG_MODE", mode);

        emit(
            tx,
            ProgressEvent::Step {
                step: "restart".to_string(),
                message: format!("Recreating {}", config.install.service),
            },
        )
        .await;
        match exec::stream_progress(self.ctx.runner.as_ref(), spec, tx).await {
            Ok(()) => {
                tracing::info!(enabled, "xdebug mode changed");
                emit(tx, ProgressEvent::Done).await;
                Ok(())
            }
            Err(e) => {
                tracing::error!(enabled, error = %e, "failed to restart PHP service");
                emit(tx, ProgressEvent::Failed(e.to_string())).await;
                Err(e)
            }
        }
    }
}
