//! Async driver of the call state machine.
//!
//! One task owns the [`CallMachine`] and the [`Outbox`]. Media, network and
//! transcription work runs in spawned tasks that report back as
//! [`CallEvent`]s through the same channel the [`CallHandle`] writes to, so
//! every transition happens on the controller task, one at a time.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{Instrument, debug, error, info, info_span, warn};

use sinistres_core::call::{CallEvent, CallMachine, CallMode, Effect, Notice, Turn};
use sinistres_core::conversation::Transcript;
use sinistres_core::frames::{InboundFrame, OutboundFrame};
use sinistres_core::outbox::Outbox;

use super::media::{Microphone, Playback, SpeechSynth};
use super::transport::{Connector, FrameSink, FrameStream};
use crate::api::Transcriber;
use crate::config::Settings;
use crate::error::{ClientError, Result};

/// Devices and services a call runs on.
#[derive(Clone)]
pub struct CallServices {
    pub connector: Arc<dyn Connector>,
    pub transcriber: Arc<dyn Transcriber>,
    pub microphone: Arc<dyn Microphone>,
    pub playback: Arc<dyn Playback>,
    pub speech: Arc<dyn SpeechSynth>,
}

enum Input {
    Event(CallEvent),
    Connected(Box<dyn FrameSink>, Box<dyn FrameStream>),
    ConnectFailed(String),
}

/// Injects user actions into a running call.
#[derive(Clone)]
pub struct CallHandle {
    tx: mpsc::UnboundedSender<Input>,
}

impl CallHandle {
    fn event(&self, event: CallEvent) -> Result<()> {
        self.tx
            .send(Input::Event(event))
            .map_err(|_| ClientError::NotOpen)
    }

    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.event(CallEvent::UserText(text.into()))
    }

    pub fn start_recording(&self) -> Result<()> {
        self.event(CallEvent::StartRecording)
    }

    pub fn stop_recording(&self) -> Result<()> {
        self.event(CallEvent::StopRecording)
    }

    pub fn submit_audio(&self, audio: Vec<u8>) -> Result<()> {
        self.event(CallEvent::AudioSubmitted(audio))
    }

    pub fn end_call(&self) -> Result<()> {
        self.event(CallEvent::EndCall)
    }
}

/// A started call: the handle for user input, the notice feed, and the controller task.
pub struct Call {
    pub handle: CallHandle,
    pub notices: mpsc::UnboundedReceiver<Notice>,
    task: JoinHandle<Transcript>,
}

impl Call {
    /// Waits for the call to end and returns its conversation log.
    pub async fn finished(self) -> Result<Transcript> {
        self.task
            .await
            .map_err(|e| ClientError::Io(std::io::Error::other(e)))
    }
}

struct Recording {
    turn: Turn,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

struct CallController {
    session_id: String,
    url: String,
    machine: CallMachine,
    outbox: Outbox,
    services: CallServices,
    sink: Option<Box<dyn FrameSink>>,
    inputs: mpsc::UnboundedReceiver<Input>,
    loopback: mpsc::UnboundedSender<Input>,
    notices: mpsc::UnboundedSender<Notice>,
    reader: Option<JoinHandle<()>>,
    playback: Option<JoinHandle<()>>,
    speech: Option<JoinHandle<()>>,
    recording: Option<Recording>,
    transcriptions: Vec<JoinHandle<()>>,
}

/// Starts a conversation session in `mode` and returns immediately.
pub fn start_call(settings: &Settings, mode: CallMode, services: CallServices) -> Call {
    let session_id = new_session_id();
    let url = settings.conversation_url(&session_id);
    let machine = CallMachine::new(mode, settings.api_base())
        .with_recording_window(settings.recording_window);

    let (tx, inputs) = mpsc::unbounded_channel();
    let (notices_tx, notices) = mpsc::unbounded_channel();

    let controller = CallController {
        session_id: session_id.clone(),
        url,
        machine,
        outbox: Outbox::new(settings.send_timeout),
        services,
        sink: None,
        inputs,
        loopback: tx.clone(),
        notices: notices_tx,
        reader: None,
        playback: None,
        speech: None,
        recording: None,
        transcriptions: Vec::new(),
    };

    let span = info_span!("call", session_id = %session_id, mode = ?mode);
    let task = tokio::spawn(controller.run().instrument(span));

    Call {
        handle: CallHandle { tx },
        notices,
        task,
    }
}

fn new_session_id() -> String {
    let millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    sinistres_core::frames::session_id(millis)
}

fn now() -> std::time::Instant {
    Instant::now().into_std()
}

impl CallController {
    async fn run(mut self) -> Transcript {
        if self.machine.mode() == CallMode::FullCall {
            if let Err(err) = self.services.microphone.probe().await {
                let effects = self.machine.handle(CallEvent::MicrophoneDenied(err.to_string()));
                self.execute(effects).await;
                return self.shutdown().await;
            }
        }

        self.spawn_connect();

        while !self.machine.is_ended() {
            let deadline = self.outbox.next_deadline(now());
            tokio::select! {
                input = self.inputs.recv() => match input {
                    Some(input) => self.on_input(input).await,
                    None => break,
                },
                _ = tokio::time::sleep(deadline.unwrap_or(Duration::ZERO)), if deadline.is_some() => {
                    self.expire_frames();
                }
            }
        }

        self.shutdown().await
    }

    fn spawn_connect(&self) {
        let connector = self.services.connector.clone();
        let url = self.url.clone();
        let tx = self.loopback.clone();
        tokio::spawn(
            async move {
                let input = match connector.connect(&url).await {
                    Ok((sink, stream)) => Input::Connected(sink, stream),
                    Err(err) => Input::ConnectFailed(err.to_string()),
                };
                let _ = tx.send(input);
            }
            .in_current_span(),
        );
    }

    async fn on_input(&mut self, input: Input) {
        match input {
            Input::Event(event) => {
                let effects = self.machine.handle(event);
                self.execute(effects).await;
            }
            Input::Connected(sink, stream) => {
                info!(url = %self.url, "conversation connected");
                self.sink = Some(sink);
                self.outbox.set_open(true);
                self.reader = Some(self.spawn_reader(stream));
                self.flush().await;
            }
            Input::ConnectFailed(reason) => {
                error!(url = %self.url, reason = %reason, "conversation connection failed");
                let effects = self.machine.handle(CallEvent::SocketClosed);
                self.execute(effects).await;
            }
        }
    }

    fn spawn_reader(&self, mut stream: Box<dyn FrameStream>) -> JoinHandle<()> {
        let tx = self.loopback.clone();
        tokio::spawn(
            async move {
                while let Some(frame) = stream.next_frame().await {
                    match frame {
                        Ok(text) => match InboundFrame::decode(&text) {
                            Ok(frame) => {
                                if tx.send(Input::Event(CallEvent::FrameReceived(frame))).is_err() {
                                    return;
                                }
                            }
                            Err(err) => warn!(error = %err, "undecodable frame skipped"),
                        },
                        Err(err) => {
                            warn!(error = %err, "conversation socket failed");
                            break;
                        }
                    }
                }
                let _ = tx.send(Input::Event(CallEvent::SocketClosed));
            }
            .in_current_span(),
        )
    }

    async fn execute(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            self.apply(effect).await;
        }
    }

    async fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::PlayAudio { turn, url } => {
                abort(self.playback.take());
                let playback = self.services.playback.clone();
                self.playback = Some(self.spawn_reporting(async move {
                    match playback.play(&url).await {
                        Ok(()) => CallEvent::PlaybackFinished(turn),
                        Err(err) => CallEvent::PlaybackFailed {
                            turn,
                            reason: err.to_string(),
                        },
                    }
                }));
            }
            Effect::Speak { turn, text } => {
                abort(self.speech.take());
                let speech = self.services.speech.clone();
                self.speech = Some(self.spawn_reporting(async move {
                    match speech.speak(&text).await {
                        Ok(()) => CallEvent::SpeechFinished(turn),
                        Err(err) => CallEvent::SpeechFailed {
                            turn,
                            reason: err.to_string(),
                        },
                    }
                }));
            }
            Effect::StopPlayback => abort(self.playback.take()),
            Effect::CancelSpeech => abort(self.speech.take()),
            Effect::OpenMicrophone {
                turn,
                window,
                delay,
            } => self.open_microphone(turn, window, delay),
            Effect::StopRecording { turn } => {
                if let Some(recording) = self.recording.as_mut().filter(|r| r.turn == turn) {
                    if let Some(stop) = recording.stop.take() {
                        debug!(turn, "stopping capture");
                        let _ = stop.send(());
                    }
                }
            }
            Effect::Transcribe { turn, audio } => {
                let transcriber = self.services.transcriber.clone();
                self.transcriptions.retain(|task| !task.is_finished());
                let task = self.spawn_reporting(async move {
                    match transcriber.transcribe(audio).await {
                        Ok(transcript) => CallEvent::TranscriptionSucceeded { turn, transcript },
                        Err(err) => CallEvent::TranscriptionFailed {
                            turn,
                            reason: err.to_string(),
                        },
                    }
                });
                self.transcriptions.push(task);
            }
            Effect::Send(frame) => {
                self.outbox.push(frame, now());
                self.flush().await;
            }
            Effect::CloseSocket => {
                self.outbox.set_open(false);
                if let Some(mut sink) = self.sink.take() {
                    if let Err(err) = sink.close().await {
                        debug!(error = %err, "socket close failed");
                    }
                }
            }
            Effect::Notify(notice) => self.notify(notice),
        }
    }

    fn open_microphone(&mut self, turn: Turn, window: Option<Duration>, delay: Duration) {
        if let Some(previous) = self.recording.take() {
            previous.task.abort();
        }
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let microphone = self.services.microphone.clone();

        let task = self.spawn_reporting(async move {
            tokio::time::sleep(delay).await;
            info!(turn, window_secs = ?window.map(|w| w.as_secs_f64()), "microphone open");

            let (release_tx, release_rx) = oneshot::channel();
            let capture = microphone.record(release_rx);
            tokio::pin!(capture);

            let stop_signal = async move {
                match window {
                    Some(window) => {
                        tokio::select! {
                            _ = tokio::time::sleep(window) => debug!(turn, "recording window elapsed"),
                            _ = &mut stop_rx => {}
                        }
                    }
                    None => {
                        let _ = stop_rx.await;
                    }
                }
                let _ = release_tx.send(());
            };

            let early = tokio::select! {
                result = &mut capture => Some(result),
                _ = stop_signal => None,
            };
            let result = match early {
                Some(result) => result,
                None => capture.await,
            };
            match result {
                Ok(audio) => CallEvent::RecordingCaptured { turn, audio },
                Err(err) => CallEvent::RecordingFailed {
                    turn,
                    reason: err.to_string(),
                },
            }
        });

        self.recording = Some(Recording {
            turn,
            stop: Some(stop_tx),
            task,
        });
    }

    fn spawn_reporting<F>(&self, work: F) -> JoinHandle<()>
    where
        F: std::future::Future<Output = CallEvent> + Send + 'static,
    {
        let tx = self.loopback.clone();
        tokio::spawn(
            async move {
                let event = work.await;
                let _ = tx.send(Input::Event(event));
            }
            .in_current_span(),
        )
    }

    /// Sends queued frames in order while the socket stays open.
    async fn flush(&mut self) {
        while let Some(queued) = self.outbox.pop_ready() {
            let Some(sink) = self.sink.as_mut() else {
                self.outbox.requeue(queued);
                return;
            };
            let text = match queued.frame.encode() {
                Ok(text) => text,
                Err(err) => {
                    error!(error = %err, "frame encoding failed, frame dropped");
                    continue;
                }
            };
            let sent = sink.send(text).await;
            match sent {
                Ok(()) => debug!(frame = ?queued.frame, "frame sent"),
                Err(err) => {
                    warn!(error = %err, pending = self.outbox.len() + 1, "send failed, frame kept for retry");
                    self.outbox.requeue(queued);
                    self.sink = None;
                    return;
                }
            }
        }
    }

    fn expire_frames(&mut self) {
        for frame in self.outbox.expire(now()) {
            warn!(frame = ?frame, "frame not delivered before timeout");
            if !matches!(frame, OutboundFrame::Close) {
                self.notify(Notice::Alert(
                    "Message non envoyé : la connexion au serveur est indisponible.".to_string(),
                ));
            }
        }
    }

    fn notify(&self, notice: Notice) {
        if self.notices.send(notice).is_err() {
            debug!("notice receiver dropped");
        }
    }

    async fn shutdown(mut self) -> Transcript {
        abort(self.playback.take());
        abort(self.speech.take());
        if let Some(recording) = self.recording.take() {
            recording.task.abort();
        }
        for task in self.transcriptions.drain(..) {
            task.abort();
        }
        abort(self.reader.take());
        if let Some(mut sink) = self.sink.take() {
            let _ = sink.close().await;
        }
        info!(
            session_id = %self.session_id,
            claim_id = ?self.machine.claim_id(),
            messages = self.machine.transcript().len(),
            "call finished"
        );
        self.machine.transcript().clone()
    }
}

fn abort(task: Option<JoinHandle<()>>) {
    if let Some(task) = task {
        task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sinistres_core::conversation::Speaker;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Log = Arc<Mutex<Vec<(String, Instant)>>>;

    fn record(log: &Log, entry: impl Into<String>) {
        log.lock().unwrap().push((entry.into(), Instant::now()));
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().iter().map(|(e, _)| e.clone()).collect()
    }

    fn at(log: &Log, entry: &str) -> Instant {
        log.lock()
            .unwrap()
            .iter()
            .find(|(e, _)| e == entry)
            .map(|(_, t)| *t)
            .unwrap()
    }

    struct FakeSink(Log);

    #[async_trait]
    impl FrameSink for FakeSink {
        async fn send(&mut self, text: String) -> Result<()> {
            record(&self.0, format!("send:{text}"));
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    struct FakeStream(mpsc::UnboundedReceiver<String>);

    #[async_trait]
    impl FrameStream for FakeStream {
        async fn next_frame(&mut self) -> Option<Result<String>> {
            self.0.recv().await.map(Ok)
        }
    }

    struct FakeConnector {
        log: Log,
        frames: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
        delay: Option<Duration>,
        connects: AtomicUsize,
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn connect(&self, _url: &str) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>)> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            match self.delay {
                Some(delay) => tokio::time::sleep(delay).await,
                None => std::future::pending::<()>().await,
            }
            let frames = self.frames.lock().unwrap().take().unwrap();
            Ok((Box::new(FakeSink(self.log.clone())), Box::new(FakeStream(frames))))
        }
    }

    struct FakeDevices {
        log: Log,
        deny_microphone: bool,
        playback_time: Duration,
    }

    #[async_trait]
    impl Microphone for FakeDevices {
        async fn probe(&self) -> Result<()> {
            if self.deny_microphone {
                Err(ClientError::Microphone("NotAllowedError".into()))
            } else {
                Ok(())
            }
        }

        async fn record(&self, stop: oneshot::Receiver<()>) -> Result<Vec<u8>> {
            record(&self.log, "mic:open");
            let _ = stop.await;
            record(&self.log, "mic:stop");
            Ok(b"M001".to_vec())
        }
    }

    #[async_trait]
    impl Playback for FakeDevices {
        async fn play(&self, url: &str) -> Result<()> {
            record(&self.log, format!("play:{url}"));
            tokio::time::sleep(self.playback_time).await;
            record(&self.log, "play:end");
            Ok(())
        }
    }

    #[async_trait]
    impl SpeechSynth for FakeDevices {
        async fn speak(&self, text: &str) -> Result<()> {
            record(&self.log, format!("speak:{text}"));
            Ok(())
        }
    }

    #[async_trait]
    impl Transcriber for FakeDevices {
        async fn transcribe(&self, audio: Vec<u8>) -> Result<String> {
            record(&self.log, "transcribe");
            Ok(String::from_utf8(audio).unwrap())
        }
    }

    struct Harness {
        log: Log,
        server: mpsc::UnboundedSender<String>,
        connector: Arc<FakeConnector>,
        services: CallServices,
    }

    fn harness(connect_delay: Option<Duration>, deny_microphone: bool) -> Harness {
        let log: Log = Arc::default();
        let (server, frames) = mpsc::unbounded_channel();
        let connector = Arc::new(FakeConnector {
            log: log.clone(),
            frames: Mutex::new(Some(frames)),
            delay: connect_delay,
            connects: AtomicUsize::new(0),
        });
        let devices = Arc::new(FakeDevices {
            log: log.clone(),
            deny_microphone,
            playback_time: Duration::from_secs(2),
        });
        let services = CallServices {
            connector: connector.clone(),
            transcriber: devices.clone(),
            microphone: devices.clone(),
            playback: devices.clone(),
            speech: devices,
        };
        Harness {
            log,
            server,
            connector,
            services,
        }
    }

    fn settings() -> Settings {
        Settings::new("http://localhost:8000").unwrap()
    }

    async fn wait_for(call: &mut Call, pred: impl Fn(&Notice) -> bool) -> Vec<Notice> {
        let mut seen = Vec::new();
        while let Some(notice) = call.notices.recv().await {
            let done = pred(&notice);
            seen.push(notice);
            if done {
                return seen;
            }
        }
        panic!("notice stream ended before the expected notice: {seen:?}");
    }

    fn is_client_message(notice: &Notice) -> bool {
        matches!(notice, Notice::Message(m) if m.speaker == Speaker::Client)
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_call_listens_after_playback_for_the_whole_window() {
        let h = harness(Some(Duration::ZERO), false);
        h.server
            .send(r#"{"type":"greeting","claim_id":"CLM-9","message":"Bonjour","audio_url":"/static/a.mp3"}"#.into())
            .unwrap();

        let mut call = start_call(&settings(), CallMode::FullCall, h.services.clone());
        let seen = wait_for(&mut call, is_client_message).await;
        assert!(seen.contains(&Notice::ClaimAssigned("CLM-9".into())));

        // The frame is written right after the client message is announced.
        tokio::task::yield_now().await;
        assert_eq!(
            entries(&h.log),
            vec![
                "play:http://localhost:8000/static/a.mp3",
                "play:end",
                "mic:open",
                "mic:stop",
                "transcribe",
                r#"send:{"type":"user_text","text":"M001"}"#,
            ]
        );
        assert!(at(&h.log, "mic:open") >= at(&h.log, "play:end"));
        assert_eq!(
            at(&h.log, "mic:stop") - at(&h.log, "mic:open"),
            Duration::from_secs(10)
        );

        call.handle.end_call().unwrap();
        let transcript = call.finished().await.unwrap();
        assert_eq!(transcript.len(), 2);
        assert!(entries(&h.log).contains(&r#"send:{"type":"close"}"#.to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_call_hangs_up_after_the_summary_is_played() {
        let h = harness(Some(Duration::ZERO), false);
        h.server
            .send(r#"{"type":"greeting","claim_id":"CLM-9","message":"Bonjour","audio_url":"/static/a.mp3"}"#.into())
            .unwrap();

        let mut call = start_call(&settings(), CallMode::FullCall, h.services.clone());
        wait_for(&mut call, is_client_message).await;

        h.server
            .send(r#"{"type":"response","acknowledge":"Merci","summary":"Dossier SINS-1 enregistré","next_question":"Au revoir","audio_url":"/static/b.mp3","completed":true}"#.into())
            .unwrap();
        let seen = wait_for(&mut call, |n| *n == Notice::Ended).await;
        assert!(seen.contains(&Notice::Completed));

        let log = entries(&h.log);
        let close = r#"send:{"type":"close"}"#;
        let summary_end = log.iter().rposition(|e| e == "play:end").unwrap();
        let closed = log.iter().position(|e| e == close).unwrap();
        assert!(summary_end < closed, "{log:?}");
        assert_eq!(log.iter().filter(|e| *e == "mic:open").count(), 1);
        assert_eq!(
            at(&h.log, close) - at(&h.log, "play:http://localhost:8000/static/b.mp3"),
            Duration::from_secs(2)
        );

        let transcript = call.finished().await.unwrap();
        assert_eq!(transcript.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_text_written_before_connection_is_flushed_on_open() {
        let h = harness(Some(Duration::from_secs(1)), false);
        let mut call = start_call(&settings(), CallMode::Message, h.services.clone());

        call.handle.send_text("J'ai eu un accrochage").unwrap();
        wait_for(&mut call, is_client_message).await;
        assert!(entries(&h.log).is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(
            entries(&h.log),
            vec![r#"send:{"type":"user_text","text":"J'ai eu un accrochage"}"#]
        );

        call.handle.end_call().unwrap();
        call.finished().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsent_frame_expires_with_an_alert() {
        let h = harness(None, false);
        let mut call = start_call(&settings(), CallMode::Message, h.services.clone());

        let started = Instant::now();
        call.handle.send_text("allô ?").unwrap();
        let seen = wait_for(&mut call, |n| matches!(n, Notice::Alert(_))).await;
        assert!(matches!(seen.last(), Some(Notice::Alert(text)) if text.contains("non envoyé")));
        assert!(Instant::now() - started >= sinistres_core::outbox::DEFAULT_SEND_TIMEOUT);

        call.handle.end_call().unwrap();
        call.finished().await.unwrap();
    }

    #[tokio::test]
    async fn test_denied_microphone_ends_before_connecting() {
        let h = harness(Some(Duration::ZERO), true);
        let mut call = start_call(&settings(), CallMode::FullCall, h.services.clone());

        let seen = wait_for(&mut call, |n| *n == Notice::Ended).await;
        assert!(matches!(seen[0], Notice::Alert(_)));
        assert!(call.finished().await.unwrap().is_empty());
        assert_eq!(h.connector.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_server_disconnect_ends_the_call() {
        let h = harness(Some(Duration::ZERO), false);
        let mut call = start_call(&settings(), CallMode::Message, h.services.clone());
        h.server
            .send(r#"{"type":"greeting","message":"Bonjour"}"#.into())
            .unwrap();
        wait_for(&mut call, |n| matches!(n, Notice::Message(_))).await;

        drop(h.server);
        let seen = wait_for(&mut call, |n| *n == Notice::Ended).await;
        assert!(seen.iter().any(|n| matches!(n, Notice::Alert(_))));
        assert_eq!(call.finished().await.unwrap().len(), 1);
    }
}
