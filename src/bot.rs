//! The bot runtime: log in over REST, connect the gateway, and feed events
//! into the command framework until shutdown is requested.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::BotConfig;
use crate::error::{BotError, CommandError, HttpError};
use crate::events::GatewayEvent;
use crate::framework::{Framework, Shutdown};
use crate::gateway::{self, GatewayConfig, Intents};
use crate::http::DiscordHttpClient;
use crate::plugins::MANIFEST;
use crate::types::Snowflake;

fn login_error(e: HttpError) -> BotError {
    if e.is_unauthorized() {
        BotError::InvalidToken
    } else {
        BotError::Http(e)
    }
}

/// Application owners followed by configured extras, without duplicates.
fn merge_owners(application: Vec<Snowflake>, extra: &[Snowflake]) -> Vec<Snowflake> {
    let mut owners = application;
    for id in extra {
        if !owners.contains(id) {
            owners.push(id.clone());
        }
    }
    owners
}

/// Run until a command requests shutdown or the gateway gives up.
pub async fn run(config: BotConfig) -> Result<Shutdown, BotError> {
    let http = DiscordHttpClient::new(config.token.clone())?;

    let me = http.current_user().await.map_err(login_error)?;
    info!(user = %me.tag(), id = %me.id, "logged in");

    let owners = match http.current_application().await {
        Ok(app) => merge_owners(app.owner_ids(), &config.owners),
        Err(e) => {
            warn!(error = %e, "could not fetch application owners");
            config.owners.clone()
        }
    };
    if owners.is_empty() {
        warn!("no owners known, owner-only commands are unusable");
    }

    let gateway_url = match http.gateway_url().await {
        Ok(url) => Some(url),
        Err(e) => {
            warn!(error = %e, "GET /gateway/bot failed, using the default gateway");
            None
        }
    };

    let framework = Framework::new(Arc::new(http), config.framework_options());
    framework.set_identity(me).await;
    framework.add_owners(owners).await;
    let loaded = framework
        .plugins
        .load_and_reload_extensions(MANIFEST, config.plugins.as_deref())
        .await;
    info!(loaded, "plugins ready");

    let gw = gateway::connect(GatewayConfig {
        token: config.token.clone(),
        intents: Intents::default(),
        url: gateway_url,
    });
    info!("gateway connected, entering event loop");

    let shutdown = loop {
        let event = tokio::select! {
            kind = framework.shutdown_requested() => {
                gw.driver.abort();
                break kind;
            }
            event = gw.events.recv() => event,
        };
        let Ok(event) = event else {
            // The driver only drops its sender when it stops for good.
            return match gw.driver.await {
                Ok(Err(reason)) => Err(BotError::Gateway(reason)),
                _ => Ok(Shutdown::Close),
            };
        };
        handle_event(&framework, event).await;
    };

    info!(?shutdown, "event loop stopped");
    Ok(shutdown)
}

async fn handle_event(framework: &Arc<Framework>, event: GatewayEvent) {
    let woken = framework.waiter.dispatch(&event).await;
    if woken > 0 {
        debug!(event = event.name(), woken, "delivered to waiters");
    }

    match event {
        GatewayEvent::Ready(ready) => {
            framework.set_identity(ready.user).await;
        }
        GatewayEvent::MessageCreate(message) => {
            let framework = Arc::clone(framework);
            tokio::spawn(async move {
                let id = message.id.clone();
                match framework.dispatch(message).await {
                    Ok(_) => {}
                    Err(e @ CommandError::NotOwner { .. }) => warn!(message = %id, "{e}"),
                    Err(e) => error!(message = %id, error = %e, "command failed"),
                }
            });
        }
        GatewayEvent::Unknown {
            event_name: Some(ref name),
            ..
        } => {
            tracing::trace!(event = %name, "unhandled gateway event");
        }
        _ => {}
    }
}
