use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use reqwest::Url;
use rodio::{Decoder, OutputStream, Sink};
use std::{
    io::{self, Cursor},
    sync::{Arc, Mutex as StdMutex},
    time::Duration as StdDuration,
};
use tokio::{
    sync::{
        mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
        Mutex,
    },
    time::sleep,
};
use tracing::{debug, error, info};

mod api;
mod app;
mod artifact;
mod config;
mod session;
mod studio;
mod types;
mod ui;

use app::{AppCommand, AppEvent, AppState};
use config::AppConfig;
use session::{Session, SharedSession, Turn};
use types::GenerateRequest;

/// The only error text a failed generation ever shows in the conversation;
/// diagnostics stay in the tracing log.
const BACKEND_ERROR_MESSAGE: &str = "Error connecting to backend.";
const RESULT_SUMMARY: &str = "Here is your generated track:";

struct AudioPlayer {
    _stream: OutputStream,
    handle: rodio::OutputStreamHandle,
    sink: Option<Sink>,
}

unsafe impl Send for AudioPlayer {}
unsafe impl Sync for AudioPlayer {}

impl AudioPlayer {
    fn new() -> Result<Self> {
        let (stream, handle) =
            OutputStream::try_default().context("failed to open audio output")?;
        Ok(Self { _stream: stream, handle, sink: None })
    }

    fn play(&mut self, bytes: Bytes) -> Result<()> {
        self.stop();
        let decoder = Decoder::new(Cursor::new(bytes)).context("failed to decode audio")?;
        let sink = Sink::try_new(&self.handle).context("failed to create audio sink")?;
        sink.append(decoder);
        sink.play();
        self.sink = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
    }

    fn is_playing(&self) -> bool {
        self.sink.as_ref().map(|sink| !sink.empty()).unwrap_or(false)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing()?;
    info!("starting cadence");

    let config = AppConfig::load()?;
    let client = api::Client::new(config.backend_url())?;
    let studio_base = Url::parse(config.studio_url()).context("invalid studio base URL")?;
    let session: SharedSession = Arc::new(StdMutex::new(Session::new(config.initial_settings())));

    let (event_tx, mut event_rx) = unbounded_channel();
    let (command_tx, command_rx) = unbounded_channel();

    let controller = Controller::new(client.clone(), event_tx.clone(), session.clone(), studio_base);
    controller.spawn(command_rx);

    let mut app_state = AppState::new();
    seed_health_status(&client, &mut app_state).await;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    enable_raw_mode()?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    terminal.hide_cursor()?;

    let ui_result =
        ui::run(&mut terminal, &mut app_state, &session, &mut event_rx, command_tx.clone());

    terminal.show_cursor()?;
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;

    ui_result
}

async fn seed_health_status(client: &api::Client, app: &mut AppState) {
    match client.health().await {
        Ok(body) => {
            let status = body.get("status").and_then(|v| v.as_str()).unwrap_or("unknown");
            app.handle_event(AppEvent::Info(format!(
                "Backend status: {status} @ {}",
                client.base_url()
            )));
        }
        Err(err) => {
            app.handle_event(AppEvent::Error(format!("Backend health check failed: {err}")));
        }
    }
}

fn setup_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|err: Box<dyn std::error::Error + Send + Sync>| {
            anyhow!("failed to initialise tracing: {err}")
        })?;
    Ok(())
}

/// The generation session controller: owns the single-flight submission
/// lifecycle and is the only writer to the conversation log.
struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    client: api::Client,
    event_tx: UnboundedSender<AppEvent>,
    session: SharedSession,
    studio_base: Url,
    // Opened on first playback so a headless host still runs everything else.
    player: Mutex<Option<AudioPlayer>>,
}

impl Controller {
    fn new(
        client: api::Client,
        event_tx: UnboundedSender<AppEvent>,
        session: SharedSession,
        studio_base: Url,
    ) -> Self {
        let inner =
            ControllerInner { client, event_tx, session, studio_base, player: Mutex::new(None) };
        Self { inner: Arc::new(inner) }
    }

    fn spawn(self, mut command_rx: UnboundedReceiver<AppCommand>) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                if let Err(err) = Controller::handle_command(inner.clone(), command).await {
                    error!("command error: {err}");
                    let _ = inner.event_tx.send(AppEvent::Error(format!("{err}")));
                }
            }
        });
    }

    async fn handle_command(inner: Arc<ControllerInner>, command: AppCommand) -> Result<()> {
        match command {
            AppCommand::SubmitPrompt { prompt } => {
                Controller::submit_prompt(inner, prompt).await?;
            }
            AppCommand::PlayTurn { turn } => {
                Controller::play_turn(inner, turn).await?;
            }
            AppCommand::StopPlayback => {
                Controller::stop_playback(inner).await?;
            }
            AppCommand::OpenStudio { turn } => {
                Controller::open_studio(inner, turn).await?;
            }
        }
        Ok(())
    }

    /// One full submission: freeze the prompt and settings, dispatch the
    /// request, and append exactly one outcome turn. The session lock is
    /// never held across the await.
    async fn submit_prompt(inner: Arc<ControllerInner>, raw: String) -> Result<()> {
        let Some(submission) = session::lock(&inner.session).begin_submit(&raw) else {
            debug!("prompt rejected: empty or a generation already in flight");
            return Ok(());
        };

        let request = GenerateRequest::new(submission.prompt.as_str(), submission.settings);
        let turn = match inner.client.generate(&request).await {
            Ok(reply) => {
                let generated = artifact::process_reply(reply);
                info!(
                    "generated {} bytes for prompt {:?}",
                    generated.handle().len(),
                    submission.prompt
                );
                Turn::result(RESULT_SUMMARY, generated, submission.settings, submission.prompt)
            }
            Err(err) => {
                error!("generation failed: {err:#}");
                Turn::error(BACKEND_ERROR_MESSAGE)
            }
        };

        session::lock(&inner.session).finish_submit(turn);
        Ok(())
    }

    async fn play_turn(inner: Arc<ControllerInner>, turn: usize) -> Result<()> {
        let bytes = {
            let guard = session::lock(&inner.session);
            guard
                .log()
                .turns()
                .get(turn)
                .and_then(Turn::as_result)
                .and_then(|result| result.artifact.handle().bytes())
        };
        let Some(bytes) = bytes else {
            let _ = inner
                .event_tx
                .send(AppEvent::Info("No playable audio for that turn.".to_string()));
            return Ok(());
        };

        {
            let mut player = inner.player.lock().await;
            if player.is_none() {
                *player = Some(AudioPlayer::new()?);
            }
            if let Some(player) = player.as_mut() {
                player.play(bytes)?;
            }
        }

        let _ = inner.event_tx.send(AppEvent::PlaybackStarted { turn });
        Controller::spawn_playback_monitor(inner);
        Ok(())
    }

    async fn stop_playback(inner: Arc<ControllerInner>) -> Result<()> {
        if let Some(player) = inner.player.lock().await.as_mut() {
            player.stop();
        }
        let _ = inner.event_tx.send(AppEvent::PlaybackStopped);
        Ok(())
    }

    async fn open_studio(inner: Arc<ControllerInner>, turn: usize) -> Result<()> {
        let link = {
            let guard = session::lock(&inner.session);
            guard.log().turns().get(turn).and_then(Turn::as_result).map(|result| {
                studio::build_studio_link(
                    &inner.studio_base,
                    result.artifact.suggested_filename(),
                    &result.prompt,
                )
            })
        };
        let message = match link {
            Some(url) => format!("Open in studio: {url}"),
            None => "That turn has no track to open.".to_string(),
        };
        let _ = inner.event_tx.send(AppEvent::Info(message));
        Ok(())
    }

    fn spawn_playback_monitor(inner: Arc<ControllerInner>) {
        tokio::spawn(async move {
            loop {
                sleep(StdDuration::from_millis(500)).await;
                let playing = inner
                    .player
                    .lock()
                    .await
                    .as_ref()
                    .map(AudioPlayer::is_playing)
                    .unwrap_or(false);
                if !playing {
                    let _ = inner.event_tx.send(AppEvent::PlaybackStopped);
                    break;
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn http_response(status_line: &str, extra_headers: &str, body: &[u8]) -> Vec<u8> {
        let mut response = format!(
            "HTTP/1.1 {status_line}\r\n{extra_headers}content-length: {}\r\nconnection: close\r\n\r\n",
            body.len()
        )
        .into_bytes();
        response.extend_from_slice(body);
        response
    }

    fn request_complete(request: &[u8]) -> bool {
        let Some(pos) = request.windows(4).position(|window| window == b"\r\n\r\n") else {
            return false;
        };
        let headers = String::from_utf8_lossy(&request[..pos]);
        let content_length = headers
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                if name.eq_ignore_ascii_case("content-length") {
                    value.trim().parse::<usize>().ok()
                } else {
                    None
                }
            })
            .unwrap_or(0);
        request.len() >= pos + 4 + content_length
    }

    /// Serves exactly one canned HTTP response, then closes the connection.
    async fn spawn_backend(response: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
        let addr = listener.local_addr().expect("listener addr");
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept connection");
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = socket.read(&mut buf).await.expect("read request");
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                if request_complete(&request) {
                    break;
                }
            }
            socket.write_all(&response).await.expect("write response");
            socket.shutdown().await.ok();
        });
        format!("http://{addr}")
    }

    fn test_controller(base_url: &str) -> (Arc<ControllerInner>, SharedSession) {
        let client = api::Client::new(Some(base_url)).expect("client");
        let (event_tx, _event_rx) = unbounded_channel();
        let session: SharedSession =
            Arc::new(StdMutex::new(Session::new(session::Settings::default())));
        let inner = Arc::new(ControllerInner {
            client,
            event_tx,
            session: session.clone(),
            studio_base: Url::parse(studio::DEFAULT_STUDIO_URL).expect("studio URL"),
            player: Mutex::new(None),
        });
        (inner, session)
    }

    #[tokio::test]
    async fn submit_success_appends_paired_result_turn() {
        let body = b"RIFFdata";
        let response = http_response(
            "200 OK",
            "content-type: audio/wav\r\ncontent-disposition: attachment; filename=\"track_001.wav\"\r\n",
            body,
        );
        let base = spawn_backend(response).await;
        let (inner, session) = test_controller(&base);

        Controller::submit_prompt(inner, "lofi beat".to_string()).await.expect("submit");

        let guard = session::lock(&session);
        assert!(!guard.pending());
        let turns = guard.log().turns();
        assert_eq!(turns.len(), 2);
        assert!(matches!(&turns[0], Turn::User(user) if user.text == "lofi beat"));

        let result = turns[1].as_result().expect("result turn");
        assert_eq!(result.summary, RESULT_SUMMARY);
        assert_eq!(result.artifact.suggested_filename(), "track_001.wav");
        assert_eq!(result.prompt, "lofi beat");
        assert_eq!(result.settings.duration_seconds(), 15);
        assert_eq!(result.settings.tempo_bpm(), 90);
        assert_eq!(result.settings.density(), 0.5);
        assert_eq!(result.artifact.handle().bytes().as_deref(), Some(body.as_slice()));
    }

    #[tokio::test]
    async fn submit_failure_appends_generic_error_turn() {
        let response = http_response(
            "500 Internal Server Error",
            "content-type: application/json\r\n",
            b"{\"detail\":\"synth exploded\"}",
        );
        let base = spawn_backend(response).await;
        let (inner, session) = test_controller(&base);

        Controller::submit_prompt(inner, "lofi beat".to_string()).await.expect("submit");

        let guard = session::lock(&session);
        assert!(!guard.pending());
        let turns = guard.log().turns();
        assert_eq!(turns.len(), 2);
        match &turns[1] {
            Turn::Error(error) => {
                assert_eq!(error.message, BACKEND_ERROR_MESSAGE);
                assert!(
                    !error.message.contains("synth exploded"),
                    "server detail must never reach the conversation"
                );
            }
            other => panic!("expected error turn, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn submit_against_unreachable_backend_degrades_to_error_turn() {
        // Nothing listens here; the connection is refused outright.
        let (inner, session) = test_controller("http://127.0.0.1:9");

        Controller::submit_prompt(inner, "lofi beat".to_string()).await.expect("submit");

        let guard = session::lock(&session);
        assert!(!guard.pending());
        assert_eq!(guard.log().len(), 2);
        match guard.log().turns().last() {
            Some(Turn::Error(error)) => assert_eq!(error.message, BACKEND_ERROR_MESSAGE),
            other => panic!("expected error turn, got {other:?}"),
        }
    }
}
