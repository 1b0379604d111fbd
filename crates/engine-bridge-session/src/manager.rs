//! Session lifecycle orchestration.
//!
//! One `SessionManager` drives a session attempt through resolve, launch,
//! handshake and connect, publishes state transitions, and recovers from
//! engine death. Every start attempt carries a generation number; stopping
//! (or restarting) bumps the generation, so a continuation from a superseded
//! attempt that resumes later observes the mismatch and discards its result
//! instead of resurrecting a session the user already tore down.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use engine_bridge_core::{BridgeContext, Disposable, Terminal, TerminalId};
use engine_bridge_handshake::{
    HandshakeError, PollPolicy, delete_session_file, wait_for_session_file,
};
use engine_bridge_launcher::{
    LaunchError, PlatformInfo, StartupArgs, launch, resolve_engine_executable,
};
use engine_bridge_rpc::{
    ClientOptions, ConnectError, RpcClient, RpcClientFactory, connect,
};
use thiserror::Error;
use tokio::sync::{Mutex, broadcast};

use crate::{
    features::EngineFeature,
    status::{SessionState, StatusPublisher},
};

/// Command identifiers registered with the editor host.
pub const RUN_SELECTION_COMMAND: &str = "engineBridge.runSelection";
pub const RESTART_SESSION_COMMAND: &str = "engineBridge.restartSession";
pub const SHOW_STATUS_MENU_COMMAND: &str = "engineBridge.showStatusMenu";
pub const GET_SESSION_PATH_COMMAND: &str = "engineBridge.getSessionPath";

/// Status menu entries.
pub const MENU_RESTART: &str = "Restart Current Session";
pub const MENU_SHOW_LOGS: &str = "Open Session Logs";

/// Document language the RPC client is scoped to.
pub const LANGUAGE_ID: &str = "engine-script";

/// A user-initiated command routed to the session manager.
#[derive(Debug, Clone)]
pub enum SessionCommand {
    /// Send the current editor selection to the interactive console.
    RunSelection { text: String, multi_line: bool },
    RestartSession,
    ShowStatusMenu,
    GetSessionPath,
}

/// Why a session attempt did not reach `Running`.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Launch(#[from] LaunchError),
    #[error(transparent)]
    Handshake(#[from] HandshakeError),
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error("The engine process terminated unexpectedly")]
    UnexpectedExit,
}

struct Inner {
    state: SessionState,
    terminal: Option<Box<dyn Terminal>>,
    rpc_client: Option<Arc<dyn RpcClient>>,
    commands: Vec<Box<dyn Disposable>>,
    /// Bumped by every `start` and `stop`. A continuation holding a stale
    /// generation must discard its result.
    generation: u64,
}

/// Drives the engine session lifecycle for one editor window.
pub struct SessionManager {
    ctx: BridgeContext,
    required_engine_version: String,
    features: Vec<Arc<dyn EngineFeature>>,
    client_factory: Arc<dyn RpcClientFactory>,
    poll_policy: PollPolicy,
    platform: PlatformInfo,
    status: StatusPublisher,
    inner: Mutex<Inner>,
}

impl SessionManager {
    /// Build a manager and register its editor commands.
    #[must_use]
    pub fn new(
        ctx: BridgeContext,
        required_engine_version: impl Into<String>,
        features: Vec<Arc<dyn EngineFeature>>,
        client_factory: Arc<dyn RpcClientFactory>,
    ) -> Self {
        let commands = [
            RUN_SELECTION_COMMAND,
            RESTART_SESSION_COMMAND,
            SHOW_STATUS_MENU_COMMAND,
            GET_SESSION_PATH_COMMAND,
        ]
        .iter()
        .map(|name| ctx.ui.register_command(name))
        .collect();

        let status = StatusPublisher::new(Arc::clone(&ctx.ui));

        Self {
            required_engine_version: required_engine_version.into(),
            features,
            client_factory,
            poll_policy: PollPolicy::default(),
            platform: PlatformInfo::detect(),
            status,
            inner: Mutex::new(Inner {
                state: SessionState::Initializing,
                terminal: None,
                rpc_client: None,
                commands,
                generation: 0,
            }),
            ctx,
        }
    }

    /// Override the handshake poll cadence.
    #[must_use]
    pub fn poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poll_policy = policy;
        self
    }

    /// Override the detected platform facts.
    #[must_use]
    pub fn platform(mut self, platform: PlatformInfo) -> Self {
        self.platform = platform;
        self
    }

    /// Current session state.
    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    /// Path of the handshake file this instance rendezvouses on.
    #[must_use]
    pub fn session_file_path(&self) -> &Path {
        &self.ctx.paths.session_file
    }

    /// Start a session attempt. Failures are surfaced through the status
    /// element and notifications, never panics.
    pub async fn start(&self) {
        let generation = {
            let mut inner = self.inner.lock().await;
            inner.generation += 1;
            inner.state = SessionState::Initializing;
            inner.generation
        };
        self.status
            .set_status("Starting...", SessionState::Initializing);

        if let Err(error) = self.run_start_sequence(generation).await {
            self.enter_failed(generation, &error).await;
        }
    }

    /// Stop the running session, releasing the client, the handshake file
    /// and the console terminal. Idempotent; the published state is left
    /// untouched (a follow-up `start` or `enter_failed` decides it).
    pub async fn stop(&self) {
        let (client, mut terminal) = {
            let mut inner = self.inner.lock().await;
            inner.generation += 1;
            (inner.rpc_client.take(), inner.terminal.take())
        };

        if client.is_some() || terminal.is_some() {
            self.ctx.logger.write("Shutting down the engine session...").await;
        }

        if let Some(client) = client {
            client.stop().await;
        }

        if let Err(e) = delete_session_file(&self.ctx.paths.session_file).await {
            self.ctx
                .logger
                .write_warning(&format!("Could not remove the session file: {e}"))
                .await;
        }

        if let Some(terminal) = terminal.as_mut() {
            self.ctx.logger.write("Terminating the engine process...").await;
            terminal.dispose();
        }
    }

    /// Stop, then start a fresh attempt.
    pub async fn restart(&self) {
        self.stop().await;
        self.start().await;
    }

    /// React to the host closing a terminal. Foreign terminals are ignored;
    /// losing our own console means the engine died under us.
    pub async fn handle_terminal_closed(&self, id: TerminalId) {
        {
            let mut inner = self.inner.lock().await;
            match inner.terminal.as_ref() {
                // The process is already gone, so take the handle without
                // disposing it.
                Some(terminal) if terminal.id() == id => inner.terminal = None,
                _ => return,
            }
        }

        let error = SessionError::UnexpectedExit;
        self.ctx.logger.write_error(&error.to_string()).await;
        self.stop().await;
        {
            let mut inner = self.inner.lock().await;
            inner.state = SessionState::Failed;
        }
        self.publish_failed();

        let choice = self
            .ctx
            .ui
            .show_error(
                "The engine session terminated unexpectedly. Would you like to restart it?",
                &["Yes", "No"],
            )
            .await;
        if choice.as_deref() == Some("Yes") {
            self.start().await;
        }
    }

    /// Watch the host's terminal-closed events for the manager's lifetime.
    pub fn spawn_terminal_watch(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        let mut rx = manager.ctx.ui.subscribe_terminal_closed();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(id) => manager.handle_terminal_closed(id).await,
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Stop the session and release the registered commands.
    pub async fn dispose(&self) {
        self.stop().await;
        let mut commands: Vec<Box<dyn Disposable>> = {
            let mut inner = self.inner.lock().await;
            std::mem::take(&mut inner.commands)
        };
        for command in &mut commands {
            command.dispose();
        }
    }

    /// Route a user command.
    pub async fn handle_command(&self, command: SessionCommand) {
        match command {
            SessionCommand::RunSelection { text, multi_line } => {
                self.run_selection(&text, multi_line).await;
            }
            SessionCommand::RestartSession => self.restart().await,
            SessionCommand::ShowStatusMenu => self.show_status_menu().await,
            SessionCommand::GetSessionPath => {
                let path = self.session_file_path().display().to_string();
                self.ctx
                    .logger
                    .write(&format!("Session file path: {path}"))
                    .await;
            }
        }
    }

    async fn run_selection(&self, text: &str, multi_line: bool) {
        let inner = self.inner.lock().await;
        let Some(terminal) = inner.terminal.as_ref() else {
            drop(inner);
            self.ctx
                .logger
                .write_verbose("Ignoring selection: no engine console is running")
                .await;
            return;
        };

        terminal.send_text(text, true);
        // A multi-line selection ending an open block needs one more newline
        // before the interactive shell evaluates it.
        if multi_line && text.trim_end().ends_with('}') {
            terminal.send_text("", true);
        }
        terminal.show();
    }

    async fn show_status_menu(&self) {
        let choice = self
            .ctx
            .ui
            .show_quick_pick(&[MENU_RESTART, MENU_SHOW_LOGS])
            .await;
        match choice.as_deref() {
            Some(MENU_RESTART) => self.restart().await,
            Some(MENU_SHOW_LOGS) => self.ctx.logger.show_log_panel(),
            _ => {}
        }
    }

    async fn run_start_sequence(&self, generation: u64) -> Result<(), SessionError> {
        let settings = self.ctx.settings.load();

        let executable = resolve_engine_executable(&self.platform, &settings).await?;

        let modules_dir: PathBuf = settings
            .developer
            .bundled_modules_path
            .clone()
            .unwrap_or_else(|| self.ctx.paths.modules_dir.clone());
        let engine_log = self
            .ctx
            .paths
            .log_dir
            .join(format!("{}-engine.log", chrono::Utc::now().timestamp()));
        let startup_args = StartupArgs::new(
            &self.required_engine_version,
            &self.ctx.host,
            &modules_dir,
            &engine_log,
            &self.ctx.paths.session_file,
        )
        .wait_for_debugger(settings.developer.wait_for_debugger)
        .log_level(settings.developer.log_level.as_deref());

        let terminal = launch(
            self.ctx.ui.as_ref(),
            self.platform.platform,
            &executable,
            &startup_args,
            &self.ctx.paths.session_file,
        )
        .await?;

        {
            let mut inner = self.inner.lock().await;
            if inner.generation != generation {
                let mut terminal = terminal;
                terminal.dispose();
                return Ok(());
            }
            if let Some(mut old) = inner.terminal.take() {
                old.dispose();
            }
            inner.terminal = Some(terminal);
        }

        let details =
            wait_for_session_file(&self.ctx.paths.session_file, self.poll_policy).await?;

        if self.superseded(generation).await {
            tracing::debug!("Discarding handshake result for a superseded session attempt");
            return Ok(());
        }

        self.ctx
            .logger
            .write(&format!(
                "Connecting to engine on port {}",
                details.language_service_port
            ))
            .await;

        let transport = connect(details.language_service_port).await?;
        let client = self
            .client_factory
            .create(transport, client_options())
            .await;
        client.ready().await?;

        let stale = {
            let mut inner = self.inner.lock().await;
            if inner.generation == generation {
                if let Some(old) = inner.rpc_client.replace(Arc::clone(&client)) {
                    tokio::spawn(async move { old.stop().await });
                }
                inner.state = SessionState::Running;
                false
            } else {
                true
            }
        };
        if stale {
            tracing::debug!("Discarding client from a superseded session attempt");
            client.stop().await;
            return Ok(());
        }

        self.status.set_status("Running", SessionState::Running);
        self.ctx.logger.write("Engine session started").await;

        for feature in &self.features {
            feature.set_rpc_client(Arc::clone(&client));
        }

        Ok(())
    }

    async fn enter_failed(&self, generation: u64, error: &SessionError) {
        {
            let mut inner = self.inner.lock().await;
            if inner.generation != generation {
                tracing::debug!("Discarding failure from a superseded session attempt: {error}");
                return;
            }
            inner.state = SessionState::Failed;
        }
        self.publish_failed();

        match error {
            SessionError::Launch(LaunchError::MissingNativeDependency(missing)) => {
                let names = missing
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                self.ctx
                    .logger
                    .write_and_show_warning(&format!(
                        "The engine cannot start because required libraries are missing: {names}. \
                         Install them and restart the session."
                    ))
                    .await;
            }
            _ => {
                self.ctx
                    .logger
                    .write_and_show_error(&format!(
                        "The engine session could not be started: {error}"
                    ))
                    .await;
            }
        }
    }

    // Every failure path converges here so observers see one rendering.
    fn publish_failed(&self) {
        self.status
            .set_status("Starting Error", SessionState::Failed);
    }

    async fn superseded(&self, generation: u64) -> bool {
        self.inner.lock().await.generation != generation
    }
}

fn client_options() -> ClientOptions {
    ClientOptions {
        document_selector: vec![LANGUAGE_ID.to_string()],
        configuration_section: LANGUAGE_ID.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Mutex as StdMutex,
            atomic::{AtomicBool, AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use async_trait::async_trait;
    use engine_bridge_core::{
        BridgeContext, BridgePaths, ChannelMsg, HostDetails, LogChannel, LogLevel, Logger,
        Settings, StatusItem, TerminalSpawn, UiError, UiHost,
        settings::DeveloperSettings,
    };
    use engine_bridge_launcher::{Platform, PlatformInfo};
    use engine_bridge_rpc::SocketTransport;

    use super::*;

    struct TestTerminal {
        id: TerminalId,
        sent: Arc<StdMutex<Vec<String>>>,
        disposed: Arc<AtomicBool>,
    }

    impl Terminal for TestTerminal {
        fn id(&self) -> TerminalId {
            self.id
        }
        fn send_text(&self, text: &str, add_newline: bool) {
            let line = if add_newline {
                format!("{text}\n")
            } else {
                text.to_string()
            };
            self.sent.lock().unwrap().push(line);
        }
        fn show(&self) {}
        fn dispose(&mut self) {
            self.disposed.store(true, Ordering::SeqCst);
        }
    }

    struct CountingDisposable(Arc<AtomicUsize>);
    impl Disposable for CountingDisposable {
        fn dispose(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct NoopItem;
    impl StatusItem for NoopItem {
        fn set_text(&self, _: &str) {}
        fn set_color(&self, _: &str) {}
    }

    struct TestUi {
        closed_tx: broadcast::Sender<TerminalId>,
        terminals: StdMutex<Vec<(TerminalId, Arc<AtomicBool>)>>,
        sent: Arc<StdMutex<Vec<String>>>,
        errors: StdMutex<Vec<String>>,
        warnings: StdMutex<Vec<String>>,
        error_answer: StdMutex<Option<String>>,
        quick_pick_answer: StdMutex<Option<String>>,
        commands_dropped: Arc<AtomicUsize>,
        commands_registered: AtomicUsize,
    }

    impl TestUi {
        fn new() -> Self {
            Self {
                closed_tx: broadcast::channel(8).0,
                terminals: StdMutex::new(Vec::new()),
                sent: Arc::new(StdMutex::new(Vec::new())),
                errors: StdMutex::new(Vec::new()),
                warnings: StdMutex::new(Vec::new()),
                error_answer: StdMutex::new(None),
                quick_pick_answer: StdMutex::new(None),
                commands_dropped: Arc::new(AtomicUsize::new(0)),
                commands_registered: AtomicUsize::new(0),
            }
        }

        fn spawned(&self) -> Vec<(TerminalId, Arc<AtomicBool>)> {
            self.terminals.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl UiHost for TestUi {
        async fn create_terminal(
            &self,
            _spawn: TerminalSpawn,
        ) -> Result<Box<dyn Terminal>, UiError> {
            let id = TerminalId::new_v4();
            let disposed = Arc::new(AtomicBool::new(false));
            self.terminals
                .lock()
                .unwrap()
                .push((id, Arc::clone(&disposed)));
            Ok(Box::new(TestTerminal {
                id,
                sent: Arc::clone(&self.sent),
                disposed,
            }))
        }

        async fn show_error(&self, message: &str, actions: &[&str]) -> Option<String> {
            self.errors.lock().unwrap().push(message.to_string());
            let answer = self.error_answer.lock().unwrap().clone();
            answer.filter(|a| actions.contains(&a.as_str()))
        }

        async fn show_warning(&self, message: &str, _actions: &[&str]) -> Option<String> {
            self.warnings.lock().unwrap().push(message.to_string());
            None
        }

        async fn show_quick_pick(&self, items: &[&str]) -> Option<String> {
            let answer = self.quick_pick_answer.lock().unwrap().clone();
            answer.filter(|a| items.contains(&a.as_str()))
        }

        fn create_status_item(&self) -> Arc<dyn StatusItem> {
            Arc::new(NoopItem)
        }

        fn register_command(&self, _name: &str) -> Box<dyn Disposable> {
            self.commands_registered.fetch_add(1, Ordering::SeqCst);
            Box::new(CountingDisposable(Arc::clone(&self.commands_dropped)))
        }

        fn subscribe_terminal_closed(&self) -> broadcast::Receiver<TerminalId> {
            self.closed_tx.subscribe()
        }
    }

    struct StubRpcClient {
        ready_ok: bool,
        stopped: AtomicBool,
    }

    #[async_trait]
    impl RpcClient for StubRpcClient {
        async fn ready(&self) -> Result<(), ConnectError> {
            if self.ready_ok {
                Ok(())
            } else {
                Err(ConnectError::ReadyRejected("engine init failed".into()))
            }
        }
        async fn stop(&self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    struct StubFactory {
        ready_ok: bool,
        created: AtomicUsize,
        last: StdMutex<Option<Arc<StubRpcClient>>>,
    }

    impl StubFactory {
        fn new(ready_ok: bool) -> Self {
            Self {
                ready_ok,
                created: AtomicUsize::new(0),
                last: StdMutex::new(None),
            }
        }
    }

    #[async_trait]
    impl RpcClientFactory for StubFactory {
        async fn create(
            &self,
            _transport: SocketTransport,
            _options: ClientOptions,
        ) -> Arc<dyn RpcClient> {
            self.created.fetch_add(1, Ordering::SeqCst);
            let client = Arc::new(StubRpcClient {
                ready_ok: self.ready_ok,
                stopped: AtomicBool::new(false),
            });
            *self.last.lock().unwrap() = Some(Arc::clone(&client));
            client
        }
    }

    #[derive(Default)]
    struct CountingFeature {
        clients: AtomicUsize,
    }

    impl EngineFeature for CountingFeature {
        fn set_rpc_client(&self, _client: Arc<dyn RpcClient>) {
            self.clients.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        ui: Arc<TestUi>,
        channel: Arc<LogChannel>,
        factory: Arc<StubFactory>,
        feature: Arc<CountingFeature>,
        manager: Arc<SessionManager>,
        session_file: PathBuf,
    }

    fn write_program(path: &Path, executable: bool) {
        std::fs::write(path, b"#!/bin/sh\nsleep 60\n").unwrap();
        #[cfg(unix)]
        if executable {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        #[cfg(not(unix))]
        let _ = executable;
    }

    async fn harness_with(executable: bool, ready_ok: bool, deadline: Duration) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("engine-host");
        write_program(&exe, executable);

        let ui = Arc::new(TestUi::new());
        let channel = Arc::new(LogChannel::new());
        let logger = Arc::new(
            Logger::new(
                LogLevel::Verbose,
                Arc::clone(&ui) as Arc<dyn UiHost>,
                Arc::clone(&channel),
                &dir.path().join("logs"),
            )
            .await
            .unwrap(),
        );

        let settings = Settings {
            developer: DeveloperSettings {
                engine_exe_path: Some(exe.to_string_lossy().into_owned()),
                ..Default::default()
            },
            ..Default::default()
        };
        let paths = BridgePaths {
            log_dir: dir.path().join("logs"),
            modules_dir: dir.path().join("modules"),
            session_file: dir.path().join("session.json"),
        };
        let session_file = paths.session_file.clone();
        let ctx = BridgeContext {
            ui: Arc::clone(&ui) as Arc<dyn UiHost>,
            logger,
            settings: Arc::new(settings),
            paths,
            host: HostDetails {
                name: "Test Host".into(),
                profile_id: "Test.Host".into(),
                version: "1.0.0".into(),
            },
        };

        let feature = Arc::new(CountingFeature::default());
        let factory = Arc::new(StubFactory::new(ready_ok));
        let manager = Arc::new(
            SessionManager::new(
                ctx,
                "0.7.9",
                vec![Arc::clone(&feature) as Arc<dyn EngineFeature>],
                Arc::clone(&factory) as Arc<dyn RpcClientFactory>,
            )
            .poll_policy(PollPolicy {
                interval: Duration::from_millis(10),
                deadline,
            })
            .platform(PlatformInfo {
                platform: Platform::Other,
                windows_dir: None,
                wow64: false,
            }),
        );

        Harness {
            _dir: dir,
            ui,
            channel,
            factory,
            feature,
            manager,
            session_file,
        }
    }

    async fn harness(ready_ok: bool) -> Harness {
        harness_with(true, ready_ok, Duration::from_secs(2)).await
    }

    async fn open_port() -> (u16, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let task = tokio::spawn(async move {
            loop {
                if listener.accept().await.is_err() {
                    break;
                }
            }
        });
        (port, task)
    }

    async fn write_session_file(path: &Path, port: u16) {
        let tmp = path.with_extension("tmp");
        let body = format!("{{\"languageServicePort\":{port},\"debugServicePort\":{port}}}");
        tokio::fs::write(&tmp, body).await.unwrap();
        tokio::fs::rename(&tmp, path).await.unwrap();
    }

    /// Keeps rewriting the session file so the poll loop is guaranteed to
    /// observe it no matter when the launch-stage cleanup runs.
    fn spawn_session_writer(path: PathBuf, port: u16) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            for _ in 0..300 {
                write_session_file(&path, port).await;
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
    }

    #[tokio::test]
    async fn fresh_manager_is_initializing_with_commands_registered() {
        let h = harness(true).await;
        assert_eq!(h.manager.state().await, SessionState::Initializing);
        assert_eq!(h.ui.commands_registered.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn successful_start_reaches_running() {
        let h = harness(true).await;
        let (port, _listener) = open_port().await;
        let _writer = spawn_session_writer(h.session_file.clone(), port);

        h.manager.start().await;

        assert_eq!(h.manager.state().await, SessionState::Running);
        assert_eq!(h.ui.spawned().len(), 1);
        assert_eq!(h.factory.created.load(Ordering::SeqCst), 1);
        assert_eq!(h.feature.clients.load(Ordering::SeqCst), 1);
        let client = h.factory.last.lock().unwrap().clone().unwrap();
        assert!(!client.stopped.load(Ordering::SeqCst));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn inaccessible_override_fails_before_launch() {
        let h = harness_with(false, true, Duration::from_secs(2)).await;

        h.manager.start().await;

        assert_eq!(h.manager.state().await, SessionState::Failed);
        assert!(h.ui.spawned().is_empty());
        assert!(!h.session_file.exists());
        let errors = h.ui.errors.lock().unwrap();
        assert!(errors[0].contains("could not be started"));
    }

    #[tokio::test]
    async fn handshake_timeout_fails_the_attempt() {
        let h = harness_with(true, true, Duration::from_millis(100)).await;

        h.manager.start().await;

        assert_eq!(h.manager.state().await, SessionState::Failed);
        let errors = h.ui.errors.lock().unwrap();
        assert!(errors[0].contains("Timed out"));
    }

    #[tokio::test]
    async fn ready_rejection_fails_the_attempt() {
        let h = harness(false).await;
        let (port, _listener) = open_port().await;
        let _writer = spawn_session_writer(h.session_file.clone(), port);

        h.manager.start().await;

        assert_eq!(h.manager.state().await, SessionState::Failed);
        let errors = h.ui.errors.lock().unwrap();
        assert!(errors[0].contains("engine init failed"));
    }

    #[tokio::test]
    async fn restart_after_failure_recovers() {
        let h = harness_with(true, true, Duration::from_millis(200)).await;

        h.manager.start().await;
        assert_eq!(h.manager.state().await, SessionState::Failed);

        let (port, _listener) = open_port().await;
        let _writer = spawn_session_writer(h.session_file.clone(), port);
        h.manager.restart().await;

        assert_eq!(h.manager.state().await, SessionState::Running);
        let spawned = h.ui.spawned();
        assert_eq!(spawned.len(), 2);
        // The console from the failed attempt was torn down on restart.
        assert!(spawned[0].1.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn stop_is_idempotent_when_nothing_runs() {
        let h = harness(true).await;
        h.manager.stop().await;
        h.manager.stop().await;
        assert_eq!(h.manager.state().await, SessionState::Initializing);
    }

    #[tokio::test]
    async fn stop_tears_down_client_and_terminal() {
        let h = harness(true).await;
        let (port, _listener) = open_port().await;
        let writer = spawn_session_writer(h.session_file.clone(), port);

        h.manager.start().await;
        writer.abort();
        h.manager.stop().await;

        let client = h.factory.last.lock().unwrap().clone().unwrap();
        assert!(client.stopped.load(Ordering::SeqCst));
        assert!(h.ui.spawned()[0].1.load(Ordering::SeqCst));
        assert!(!h.session_file.exists());
    }

    #[tokio::test]
    async fn stop_removes_a_leftover_session_file() {
        let h = harness(true).await;
        write_session_file(&h.session_file, 4000).await;

        h.manager.stop().await;

        assert!(!h.session_file.exists());
    }

    #[tokio::test]
    async fn closing_a_foreign_terminal_is_ignored() {
        let h = harness(true).await;
        let (port, _listener) = open_port().await;
        let _writer = spawn_session_writer(h.session_file.clone(), port);
        h.manager.start().await;

        h.manager.handle_terminal_closed(TerminalId::new_v4()).await;

        assert_eq!(h.manager.state().await, SessionState::Running);
        let client = h.factory.last.lock().unwrap().clone().unwrap();
        assert!(!client.stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn losing_the_console_fails_the_session_when_restart_declined() {
        let h = harness(true).await;
        let (port, _listener) = open_port().await;
        let _writer = spawn_session_writer(h.session_file.clone(), port);
        h.manager.start().await;

        *h.ui.error_answer.lock().unwrap() = Some("No".into());
        let id = h.ui.spawned()[0].0;
        h.manager.handle_terminal_closed(id).await;

        assert_eq!(h.manager.state().await, SessionState::Failed);
        let client = h.factory.last.lock().unwrap().clone().unwrap();
        assert!(client.stopped.load(Ordering::SeqCst));
        let errors = h.ui.errors.lock().unwrap();
        assert!(errors.iter().any(|e| e.contains("terminated unexpectedly")));
    }

    #[tokio::test]
    async fn losing_the_console_restarts_when_accepted() {
        let h = harness(true).await;
        let (port, _listener) = open_port().await;
        let _writer = spawn_session_writer(h.session_file.clone(), port);
        h.manager.start().await;

        *h.ui.error_answer.lock().unwrap() = Some("Yes".into());
        let id = h.ui.spawned()[0].0;
        h.manager.handle_terminal_closed(id).await;

        assert_eq!(h.manager.state().await, SessionState::Running);
        assert_eq!(h.ui.spawned().len(), 2);
        assert_eq!(h.feature.clients.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stop_during_pending_handshake_discards_the_late_result() {
        let h = harness(true).await;
        let (port, _listener) = open_port().await;

        let manager = Arc::clone(&h.manager);
        let attempt = tokio::spawn(async move { manager.start().await });
        tokio::time::sleep(Duration::from_millis(100)).await;

        h.manager.stop().await;
        write_session_file(&h.session_file, port).await;
        attempt.await.unwrap();

        assert_eq!(h.manager.state().await, SessionState::Initializing);
        assert_eq!(h.factory.created.load(Ordering::SeqCst), 0);
        // The console of the abandoned attempt was disposed by stop.
        assert!(h.ui.spawned()[0].1.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn run_selection_closes_open_blocks() {
        let h = harness(true).await;
        let (port, _listener) = open_port().await;
        let _writer = spawn_session_writer(h.session_file.clone(), port);
        h.manager.start().await;

        h.manager
            .handle_command(SessionCommand::RunSelection {
                text: "Get-Item".into(),
                multi_line: false,
            })
            .await;
        h.manager
            .handle_command(SessionCommand::RunSelection {
                text: "if ($x) {\n  $x\n}".into(),
                multi_line: true,
            })
            .await;

        let sent = h.ui.sent.lock().unwrap();
        assert_eq!(sent[0], "Get-Item\n");
        assert_eq!(sent[1], "if ($x) {\n  $x\n}\n");
        assert_eq!(sent[2], "\n");
    }

    #[tokio::test]
    async fn run_selection_without_console_is_a_no_op() {
        let h = harness(true).await;
        h.manager
            .handle_command(SessionCommand::RunSelection {
                text: "Get-Item".into(),
                multi_line: false,
            })
            .await;
        assert!(h.ui.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn status_menu_can_reveal_the_logs() {
        let h = harness(true).await;
        *h.ui.quick_pick_answer.lock().unwrap() = Some(MENU_SHOW_LOGS.into());
        let mut rx = h.channel.subscribe();

        h.manager.handle_command(SessionCommand::ShowStatusMenu).await;

        assert_eq!(rx.recv().await.unwrap(), ChannelMsg::Reveal);
    }

    #[tokio::test]
    async fn session_path_command_logs_the_path() {
        let h = harness(true).await;
        h.manager.handle_command(SessionCommand::GetSessionPath).await;

        let history = h.channel.history();
        assert!(
            history
                .iter()
                .any(|line| line.contains(&h.session_file.display().to_string()))
        );
    }

    #[tokio::test]
    async fn dispose_releases_commands_once() {
        let h = harness(true).await;
        h.manager.dispose().await;
        h.manager.dispose().await;
        assert_eq!(h.ui.commands_dropped.load(Ordering::SeqCst), 4);
    }
}
