//! Subcommand implementations. Each connects, runs one query or the watch
//! loop, and disconnects.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use rustplus_core::types::{ChatMessage, ResponsePayload, TeamChanged};
use rustplus_core::{EntityPayload, EntitySnapshot, Registration, Response, Session};
use rustplus_ws::WsDialer;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::cli::{Command, SwitchState};
use crate::config::CliConfig;
use crate::render;

type WsSession = Session<WsDialer>;

pub struct Options {
    pub config: CliConfig,
    pub json: bool,
    pub timeout: Duration,
}

/// A connected session with its reader task.
struct Connection {
    session: Arc<WsSession>,
    reader: JoinHandle<rustplus_core::Result<()>>,
}

impl Connection {
    async fn open(session: WsSession, timeout: Duration) -> anyhow::Result<Self> {
        let session = Arc::new(session);
        tokio::time::timeout(timeout, session.connect())
            .await
            .context("timed out connecting")?
            .with_context(|| format!("failed to connect to {}", session.config().url()))?;
        let reader = tokio::spawn({
            let session = session.clone();
            async move { session.run().await }
        });
        Ok(Self { session, reader })
    }

    async fn close(self) -> anyhow::Result<()> {
        if self.session.is_connected().await {
            self.session.disconnect().await?;
        }
        match self.reader.await {
            Ok(result) => result.context("connection lost")?,
            Err(err) => tracing::warn!("reader task failed: {err}"),
        }
        Ok(())
    }
}

async fn within<T>(
    timeout: Duration,
    fut: impl Future<Output = rustplus_core::Result<T>>,
) -> anyhow::Result<T> {
    Ok(tokio::time::timeout(timeout, fut)
        .await
        .context("timed out waiting for the server")??)
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn run(ctx: Options, command: Command) -> anyhow::Result<()> {
    if let Command::Watch = command {
        return watch(ctx).await;
    }

    let session = Session::new(ctx.config.connection.clone(), WsDialer::new().with_timeout(ctx.timeout));
    let conn = Connection::open(session, ctx.timeout).await?;
    let result = query(&ctx, &conn.session, command).await;
    let closed = conn.close().await;
    result.and(closed)
}

async fn query(ctx: &Options, session: &WsSession, command: Command) -> anyhow::Result<()> {
    let t = ctx.timeout;
    match command {
        Command::Info => {
            let info = within(t, session.server_info()).await?;
            if ctx.json {
                return print_json(&info);
            }
            println!("{}", render::server_info(&info));
        }
        Command::Time => {
            let info = within(t, session.time()).await?;
            if ctx.json {
                return print_json(&info);
            }
            println!("{}", render::time(&info));
        }
        Command::Map => {
            let mut info = within(t, session.map()).await?;
            info.jpg_image.clear();
            if ctx.json {
                return print_json(&info);
            }
            println!("{}", render::map(&info));
        }
        Command::Markers => {
            let markers = within(t, session.map_markers()).await?;
            if ctx.json {
                return print_json(&markers);
            }
            println!("{}", render::markers(&markers));
        }
        Command::Team => {
            let info = within(t, session.team_info()).await?;
            if ctx.json {
                return print_json(&info);
            }
            println!("{}", render::team(&info));
        }
        Command::Chat => {
            let messages = within(t, session.team_chat()).await?;
            if ctx.json {
                return print_json(&messages);
            }
            for message in &messages {
                println!("{}", render::chat_line(message));
            }
        }
        Command::Say { message } => {
            let text = message.join(" ");
            if text.trim().is_empty() {
                bail!("refusing to send an empty message");
            }
            within(t, session.send_team_message(text)).await?;
        }
        Command::Switch { id, state } => {
            let name = ctx.config.entity_name(id).unwrap_or("switch").to_string();
            // Resolve first so a non-switch is refused locally.
            let snapshot = resolve(session, id, &name, t).await?;
            let (tx, rx) = tokio::sync::oneshot::channel();
            session
                .write_entity(
                    id,
                    &name,
                    state.as_bool(),
                    Some(Box::new(move |response: &Response, _: &EntitySnapshot| {
                        let _ = tx.send(response.payload.clone());
                    })),
                )
                .await?;
            let reply = tokio::time::timeout(t, rx)
                .await
                .context("timed out waiting for the server")?
                .context("connection closed")?;
            if let Some(ResponsePayload::Error { error }) = reply {
                bail!("server rejected switch {id}: {error}");
            }
            let verb = if state == SwitchState::On { "on" } else { "off" };
            println!("{} \"{}\" switched {verb}", snapshot.id, snapshot.name);
        }
        Command::Entity { id } => {
            let name = ctx.config.entity_name(id).unwrap_or("entity").to_string();
            let snapshot = resolve(session, id, &name, t).await?;
            if ctx.json {
                return print_json(&EntityView::from(&snapshot));
            }
            println!("{}", render::entity(&snapshot));
        }
        Command::Watch => bail!("watch is not a one-shot query"),
    }
    Ok(())
}

async fn resolve(session: &WsSession, id: u32, name: &str, timeout: Duration) -> anyhow::Result<EntitySnapshot> {
    let (registration, resolved) = Registration::new(id, name).with_channel();
    session.register(registration).await?;
    tokio::time::timeout(timeout, resolved)
        .await
        .with_context(|| format!("entity {id} did not resolve"))?
        .context("connection closed before entity resolved")
}

#[derive(Serialize)]
struct EntityView<'a> {
    id: u32,
    name: &'a str,
    #[serde(rename = "type")]
    entity_type: Option<&'static str>,
    state: Option<&'a EntityPayload>,
}

impl<'a> From<&'a EntitySnapshot> for EntityView<'a> {
    fn from(s: &'a EntitySnapshot) -> Self {
        Self {
            id: s.id,
            name: &s.name,
            entity_type: s.entity_type().map(|t| t.as_str()),
            state: s.value.as_ref(),
        }
    }
}

// ─── Watch ────────────────────────────────────────────────────────

enum Event {
    Entity(EntitySnapshot, EntityPayload),
    Chat(ChatMessage),
    Team(TeamChanged),
}

async fn watch(ctx: Options) -> anyhow::Result<()> {
    let (events_tx, mut events) = mpsc::unbounded_channel::<Event>();
    let (chat_tx, mut chat_rx) = mpsc::unbounded_channel::<ChatMessage>();
    let (team_tx, mut team_rx) = mpsc::unbounded_channel::<TeamChanged>();

    // Registrations made before connect are flushed on connect.
    let session = Session::new(ctx.config.connection.clone(), WsDialer::new().with_timeout(ctx.timeout))
        .with_chat_sink(chat_tx)
        .with_team_sink(team_tx);
    for def in &ctx.config.entities {
        let id = def.id;
        session
            .register(Registration::new(id, def.name.clone()).with_hook(move |snapshot| {
                tracing::info!(entity_id = id, "{}", render::entity(snapshot));
            }))
            .await?;
        let tx = events_tx.clone();
        session
            .subscribe(id, move |before, payload| {
                let _ = tx.send(Event::Entity(before.clone(), payload.clone()));
            })
            .await?;
    }
    if ctx.config.entities.is_empty() {
        tracing::warn!("no [[entities]] configured, watching team events only");
    }

    let mut conn = Connection::open(session, ctx.timeout).await?;
    tracing::info!(entities = ctx.config.entities.len(), "watching, ctrl-c to stop");

    loop {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            result = &mut conn.reader => {
                return match result {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(err)) => Err(err).context("connection lost"),
                    Err(err) => Err(err).context("reader task failed"),
                };
            }
            Some(event) = events.recv() => event,
            Some(message) = chat_rx.recv() => Event::Chat(message),
            Some(changed) = team_rx.recv() => Event::Team(changed),
        };
        emit(&ctx, event)?;
    }

    conn.close().await
}

fn emit(ctx: &Options, event: Event) -> anyhow::Result<()> {
    match event {
        Event::Entity(before, payload) => {
            if ctx.json {
                let mut view = serde_json::to_value(EntityView::from(&before))?;
                view["state"] = serde_json::to_value(&payload)?;
                return print_json(&serde_json::json!({ "entity": view }));
            }
            println!("{} \"{}\": {}", before.id, before.name, render::payload(&payload));
        }
        Event::Chat(message) => {
            if ctx.json {
                return print_json(&serde_json::json!({ "chat": message }));
            }
            println!("{}", render::chat_line(&message));
        }
        Event::Team(changed) => {
            if ctx.json {
                return print_json(&serde_json::json!({ "team": changed }));
            }
            println!("team changed ({} members)", changed.team_info.members.len());
        }
    }
    Ok(())
}
