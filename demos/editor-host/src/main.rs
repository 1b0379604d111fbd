//! Headless editor host.
//!
//! Wires the bridge together the way an editor extension would: a PTY
//! terminal surface, console-backed notifications and status, a
//! ready-on-connect RPC client, and a session manager driving the engine
//! lifecycle. Starts a session, then runs until interrupted.

use std::{path::Path, sync::Arc};

use anyhow::Context as _;
use async_trait::async_trait;
use engine_bridge_core::{
    BridgeContext, BridgePaths, ChannelMsg, Disposable, HostDetails, LogChannel, LogLevel, Logger,
    Settings, StatusItem, Terminal, TerminalId, TerminalSpawn, UiError, UiHost,
};
use engine_bridge_pty::PtyTerminal;
use engine_bridge_rpc::{
    ClientOptions, ConnectError, RpcClient, RpcClientFactory, SocketTransport,
};
use engine_bridge_session::{EngineFeature, SessionManager};
use tokio::sync::{Mutex, broadcast};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Engine version this host was built against.
const REQUIRED_ENGINE_VERSION: &str = "1.0.0";

/// Optional settings file read from the working directory.
const SETTINGS_FILE: &str = "engine-bridge.json";

/// UI host backed by the console and a real pseudo-terminal.
struct HeadlessUi {
    closed_tx: broadcast::Sender<TerminalId>,
}

struct PrintStatus;

impl StatusItem for PrintStatus {
    fn set_text(&self, text: &str) {
        println!("[status] {text}");
    }
    fn set_color(&self, _color: &str) {}
}

struct CommandRegistration;

impl Disposable for CommandRegistration {
    fn dispose(&mut self) {}
}

#[async_trait]
impl UiHost for HeadlessUi {
    async fn create_terminal(&self, spawn: TerminalSpawn) -> Result<Box<dyn Terminal>, UiError> {
        let terminal = PtyTerminal::spawn(spawn, self.closed_tx.clone())
            .map_err(|e| UiError::SpawnFailed(e.to_string()))?;
        Ok(Box::new(terminal))
    }

    // Console notifications are informational only; nobody is there to
    // click an action button.
    async fn show_error(&self, message: &str, _actions: &[&str]) -> Option<String> {
        eprintln!("[error] {message}");
        None
    }

    async fn show_warning(&self, message: &str, _actions: &[&str]) -> Option<String> {
        eprintln!("[warning] {message}");
        None
    }

    async fn show_quick_pick(&self, _items: &[&str]) -> Option<String> {
        None
    }

    fn create_status_item(&self) -> Arc<dyn StatusItem> {
        Arc::new(PrintStatus)
    }

    fn register_command(&self, name: &str) -> Box<dyn Disposable> {
        tracing::debug!(name, "Command registered");
        Box::new(CommandRegistration)
    }

    fn subscribe_terminal_closed(&self) -> broadcast::Receiver<TerminalId> {
        self.closed_tx.subscribe()
    }
}

/// RPC client that reports ready as soon as the socket is open and holds
/// the transport until stopped.
struct ReadyOnConnectClient {
    transport: Mutex<Option<SocketTransport>>,
}

#[async_trait]
impl RpcClient for ReadyOnConnectClient {
    async fn ready(&self) -> Result<(), ConnectError> {
        Ok(())
    }

    async fn stop(&self) {
        self.transport.lock().await.take();
    }
}

struct ReadyOnConnectFactory;

#[async_trait]
impl RpcClientFactory for ReadyOnConnectFactory {
    async fn create(
        &self,
        transport: SocketTransport,
        options: ClientOptions,
    ) -> Arc<dyn RpcClient> {
        tracing::debug!(
            section = %options.configuration_section,
            "Engine RPC client created"
        );
        Arc::new(ReadyOnConnectClient {
            transport: Mutex::new(Some(transport)),
        })
    }
}

struct AnnounceFeature;

impl EngineFeature for AnnounceFeature {
    fn set_rpc_client(&self, _client: Arc<dyn RpcClient>) {
        tracing::info!("Engine RPC client is ready");
    }
}

fn load_settings() -> anyhow::Result<Settings> {
    let path = Path::new(SETTINGS_FILE);
    if !path.exists() {
        return Ok(Settings::default());
    }
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {SETTINGS_FILE}"))?;
    serde_json::from_str(&contents).with_context(|| format!("parsing {SETTINGS_FILE}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let settings = load_settings()?;
    let paths = BridgePaths::with_defaults("engine-bridge");

    let closed_tx = broadcast::channel(16).0;
    let ui: Arc<dyn UiHost> = Arc::new(HeadlessUi { closed_tx });

    let channel = Arc::new(LogChannel::new());
    let mut log_rx = channel.subscribe();
    tokio::spawn(async move {
        loop {
            match log_rx.recv().await {
                Ok(ChannelMsg::Line(line)) => println!("{line}"),
                Ok(ChannelMsg::Reveal) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let logger = Arc::new(
        Logger::new(
            LogLevel::Normal,
            Arc::clone(&ui),
            Arc::clone(&channel),
            &paths.log_dir,
        )
        .await
        .context("opening the bridge log file")?,
    );

    let ctx = BridgeContext {
        ui,
        logger,
        settings: Arc::new(settings),
        paths,
        host: HostDetails {
            name: "Engine Bridge Demo".into(),
            profile_id: "EngineBridge.Demo".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        },
    };

    let feature: Arc<dyn EngineFeature> = Arc::new(AnnounceFeature);
    let manager = Arc::new(SessionManager::new(
        ctx,
        REQUIRED_ENGINE_VERSION,
        vec![Arc::clone(&feature)],
        Arc::new(ReadyOnConnectFactory),
    ));

    let watch = manager.spawn_terminal_watch();
    manager.start().await;

    tokio::signal::ctrl_c()
        .await
        .context("waiting for interrupt")?;
    tracing::info!("Shutting down");

    feature.dispose();
    manager.dispose().await;
    watch.abort();

    Ok(())
}
