//! Voice session — the single owner of mode, narration, result reading and
//! the speech collaborators.
//!
//! ```text
//! VoiceSession (cloneable handle) → [actions] ─┐
//!                                              ├→ coordinator task → SessionStatus (watch)
//! speech / listen / fetch tasks → [events] ────┘
//! ```
//!
//! Every utterance and recognition session is started under a fresh epoch.
//! Starting anything cancels whatever is active and bumps the epoch. A task
//! whose epoch has been voided is dropped before it reaches the collaborator,
//! and a completion that still slips through is recognised by its stale epoch
//! and ignored. This keeps at most one of {speaking, listening} active at any
//! moment. Backend fetches carry a request number the same way.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use wikivoice_core::locale::TableError;
use wikivoice_core::narration::{Narration, NarrationController};
use wikivoice_core::results::{ResultNarrator, ResultStep};
use wikivoice_core::router::{Command, CommandRouter};
use wikivoice_core::types::{
    Article, HighlightTarget, Mode, SearchResult, SessionConfig, SessionStatus, Utterance,
};

use crate::api::{search_all, ApiError, Backend};
use crate::speech::{AudioCue, AudioCues, Highlighter, SpeechInput, SpeechOutput};

/// Everything the session talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub output: Arc<dyn SpeechOutput>,
    pub input: Arc<dyn SpeechInput>,
    pub backend: Arc<dyn Backend>,
    pub cues: Arc<dyn AudioCues>,
    pub highlighter: Arc<dyn Highlighter>,
}

/// Configuration the session refuses to start with.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Table(#[from] TableError),
    #[error("listen timeout of {timeout_ms} ms is shorter than the {window_ms} ms recognition window")]
    ListenTimeout { timeout_ms: u64, window_ms: u64 },
}

/// Manual article navigation, as offered by on-screen controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NarrationOp {
    Play,
    Stop,
    Repeat,
    NextText,
    PreviousText,
    NextSection,
    PreviousSection,
}

/// Cloneable handle to a running session. All methods are non-blocking;
/// observe the effects through [`VoiceSession::subscribe_status`].
///
/// The session shuts down once every handle is dropped.
#[derive(Clone)]
pub struct VoiceSession {
    actions: mpsc::UnboundedSender<Action>,
    status_rx: watch::Receiver<SessionStatus>,
}

// ─── Internal types ────────────────────────────────────────────────────────

#[derive(Debug)]
enum Action {
    Search(String),
    OpenResult(usize),
    OpenArticle(u64),
    Narration(NarrationOp),
    Voice,
    Home,
}

enum Event {
    SpeechDone {
        epoch: u64,
    },
    Listened {
        epoch: u64,
        outcome: ListenOutcome,
    },
    SearchDone {
        request: u64,
        results: Vec<SearchResult>,
    },
    ArticleLoaded {
        request: u64,
        article: Result<Article, ApiError>,
    },
}

#[derive(Debug)]
enum ListenOutcome {
    Heard(String),
    TimedOut,
}

/// What a finished utterance leads to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Then {
    Narration,
    Results,
    Listen(Purpose),
    Rest,
}

/// What a transcript will be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Purpose {
    Query,
    ArticleCommand,
    ResultChoice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activity {
    Idle,
    Speaking { epoch: u64, then: Then },
    Listening { epoch: u64, purpose: Purpose },
}

// ─── Handle ────────────────────────────────────────────────────────────────

impl VoiceSession {
    /// Spawn the coordinator on the current tokio runtime.
    ///
    /// `config.fallback_language` becomes the router's fallback locale. The
    /// listen timeout must cover the input engine's recognition window, or a
    /// slow speaker would be cut off and read as silence.
    pub fn spawn(
        config: SessionConfig,
        router: CommandRouter,
        collab: Collaborators,
    ) -> Result<Self, SessionError> {
        let router = router.with_fallback(&config.fallback_language)?;
        if let Some(window) = collab.input.recognition_window() {
            if config.listen_timeout() < window {
                return Err(SessionError::ListenTimeout {
                    timeout_ms: config.listen_timeout_ms,
                    window_ms: window.as_millis() as u64,
                });
            }
        }
        let (actions, action_rx) = mpsc::unbounded_channel();
        let (events, event_rx) = mpsc::unbounded_channel();
        let (status, status_rx) = watch::channel(SessionStatus::default());
        let (live, _) = watch::channel(0);

        let coordinator = Coordinator {
            config,
            router,
            collab,
            events,
            status,
            live,
            mode: Mode::Search,
            narration: None,
            results: ResultNarrator::default(),
            voice_search: false,
            activity: Activity::Idle,
            epoch: 0,
            request: 0,
            loading: false,
            highlighted: None,
            last_error: None,
        };
        tokio::spawn(coordinator.run(action_rx, event_rx));

        Ok(Self { actions, status_rx })
    }

    /// Submit a typed query.
    pub fn search(&self, query: impl Into<String>) {
        self.send(Action::Search(query.into()));
    }

    /// Open the result at `index` of the current list.
    pub fn open_result(&self, index: usize) {
        self.send(Action::OpenResult(index));
    }

    pub fn open_article(&self, id: u64) {
        self.send(Action::OpenArticle(id));
    }

    pub fn play(&self) {
        self.send(Action::Narration(NarrationOp::Play));
    }

    pub fn stop(&self) {
        self.send(Action::Narration(NarrationOp::Stop));
    }

    pub fn repeat(&self) {
        self.send(Action::Narration(NarrationOp::Repeat));
    }

    pub fn next_text(&self) {
        self.send(Action::Narration(NarrationOp::NextText));
    }

    pub fn previous_text(&self) {
        self.send(Action::Narration(NarrationOp::PreviousText));
    }

    pub fn next_section(&self) {
        self.send(Action::Narration(NarrationOp::NextSection));
    }

    pub fn previous_section(&self) {
        self.send(Action::Narration(NarrationOp::PreviousSection));
    }

    pub fn narration(&self, op: NarrationOp) {
        self.send(Action::Narration(op));
    }

    /// The microphone button.
    pub fn voice(&self) {
        self.send(Action::Voice);
    }

    /// Abandon everything and return to the search page.
    pub fn home(&self) {
        self.send(Action::Home);
    }

    pub fn status(&self) -> SessionStatus {
        self.status_rx.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status_rx.clone()
    }

    fn send(&self, action: Action) {
        if self.actions.send(action).is_err() {
            warn!("voice session is no longer running");
        }
    }
}

// ─── Coordinator ───────────────────────────────────────────────────────────

struct Coordinator {
    config: SessionConfig,
    router: CommandRouter,
    collab: Collaborators,
    events: mpsc::UnboundedSender<Event>,
    status: watch::Sender<SessionStatus>,
    /// Current epoch, watched by speech and listen tasks.
    live: watch::Sender<u64>,
    mode: Mode,
    narration: Option<NarrationController>,
    results: ResultNarrator,
    /// The current interaction started from the microphone, so results are
    /// read aloud and an opened article plays by itself.
    voice_search: bool,
    activity: Activity,
    epoch: u64,
    request: u64,
    loading: bool,
    highlighted: Option<HighlightTarget>,
    last_error: Option<String>,
}

impl Coordinator {
    async fn run(
        mut self,
        mut actions: mpsc::UnboundedReceiver<Action>,
        mut events: mpsc::UnboundedReceiver<Event>,
    ) {
        self.publish();
        loop {
            tokio::select! {
                action = actions.recv() => match action {
                    Some(action) => self.on_action(action),
                    None => break,
                },
                Some(event) = events.recv() => self.on_event(event),
            }
            self.publish();
        }
        self.cancel_activity();
        debug!("session: all handles dropped, shutting down");
    }

    fn locale(&self) -> &str {
        &self.config.language
    }

    fn sentences(&self) -> &wikivoice_core::locale::Sentences {
        &self.router.catalog().table(&self.config.language).sentences
    }

    // ─── Actions ───────────────────────────────────────────────────────

    fn on_action(&mut self, action: Action) {
        debug!(?action, mode = ?self.mode, "session: action");
        match action {
            Action::Search(query) => {
                self.voice_search = false;
                self.submit_search(query);
            }
            Action::OpenResult(index) => {
                if self.mode != Mode::ResultList {
                    return;
                }
                match self.results.select(index) {
                    Some(result) => self.open_article(result.id, false),
                    None => debug!(index, "session: no such result"),
                }
            }
            Action::OpenArticle(id) => self.open_article(id, false),
            Action::Narration(op) => {
                if self.mode == Mode::Article {
                    self.narrate(op);
                }
            }
            Action::Voice => self.voice_button(),
            Action::Home => self.go_home(),
        }
    }

    fn voice_button(&mut self) {
        match self.mode {
            Mode::Search => {
                self.voice_search = false;
                let prompt = self.sentences().search_prompt.clone();
                self.speak(Utterance::prompt(prompt), Then::Listen(Purpose::Query));
            }
            Mode::Article => {
                if let Some(narration) = self.narration.as_mut() {
                    narration.stop();
                }
                let prompt = self.sentences().article_prompt.clone();
                self.speak(Utterance::prompt(prompt), Then::Listen(Purpose::ArticleCommand));
            }
            Mode::ResultList => {
                self.voice_search = true;
                let prompt = self.sentences().search_open.clone();
                let step = self.results.resume_reading(prompt);
                self.apply_result_step(step);
            }
        }
    }

    fn narrate(&mut self, op: NarrationOp) {
        let Some(narration) = self.narration.as_mut() else {
            return;
        };
        let step = match op {
            NarrationOp::Play => narration.start(),
            NarrationOp::Stop => narration.stop(),
            NarrationOp::Repeat => narration.repeat(),
            NarrationOp::NextText => narration.next_text(),
            NarrationOp::PreviousText => narration.previous_text(),
            NarrationOp::NextSection => narration.next_section(),
            NarrationOp::PreviousSection => narration.previous_section(),
        };
        self.apply_narration(step);
    }

    fn submit_search(&mut self, query: String) {
        let query = query.trim().to_string();
        if query.is_empty() {
            return;
        }
        self.cancel_activity();
        self.mode = Mode::Search;
        self.narration = None;
        self.results = ResultNarrator::default();
        self.set_highlight(None);
        self.last_error = None;
        if self.voice_search {
            let searching = self.sentences().searching.clone();
            self.speak(Utterance::prompt(searching), Then::Rest);
        }
        self.begin_loading();

        let request = self.request;
        let backend = self.collab.backend.clone();
        let kinds = self.config.search_kinds.clone();
        let limit = self.config.search_limit;
        let events = self.events.clone();
        info!(%query, ?kinds, "session: searching");
        tokio::spawn(async move {
            let results = search_all(backend.as_ref(), &kinds, &query, limit).await;
            let _ = events.send(Event::SearchDone { request, results });
        });
    }

    fn open_article(&mut self, id: u64, voice: bool) {
        self.cancel_activity();
        self.results.stop();
        self.voice_search = voice;
        self.begin_loading();

        let request = self.request;
        let backend = self.collab.backend.clone();
        let events = self.events.clone();
        info!(id, "session: opening article");
        tokio::spawn(async move {
            let article = backend.article(id).await;
            let _ = events.send(Event::ArticleLoaded { request, article });
        });
    }

    fn go_home(&mut self) {
        self.cancel_activity();
        // Void any fetch still in flight.
        self.request += 1;
        self.end_loading();
        self.mode = Mode::Search;
        self.narration = None;
        self.results = ResultNarrator::default();
        self.voice_search = false;
        self.last_error = None;
        self.set_highlight(None);
    }

    // ─── Completions ───────────────────────────────────────────────────

    fn on_event(&mut self, event: Event) {
        match event {
            Event::SpeechDone { epoch } => self.on_speech_done(epoch),
            Event::Listened { epoch, outcome } => self.on_listened(epoch, outcome),
            Event::SearchDone { request, results } => {
                if request != self.request {
                    debug!(request, "session: dropping stale search");
                    return;
                }
                self.end_loading();
                self.on_results(results);
            }
            Event::ArticleLoaded { request, article } => {
                if request != self.request {
                    debug!(request, "session: dropping stale article");
                    return;
                }
                self.end_loading();
                self.on_article(article);
            }
        }
    }

    fn on_speech_done(&mut self, epoch: u64) {
        let Activity::Speaking { epoch: current, then } = self.activity else {
            debug!(epoch, "session: completion with nothing speaking");
            return;
        };
        if current != epoch {
            debug!(epoch, current, "session: stale speech completion");
            return;
        }
        self.activity = Activity::Idle;
        match then {
            Then::Narration => {
                if let Some(narration) = self.narration.as_mut() {
                    let step = narration.on_speech_complete();
                    self.apply_narration(step);
                }
            }
            Then::Results => {
                let step = self.results.on_speech_complete();
                self.apply_result_step(step);
            }
            Then::Listen(purpose) => self.listen(purpose),
            Then::Rest => {}
        }
    }

    fn on_listened(&mut self, epoch: u64, outcome: ListenOutcome) {
        let Activity::Listening { epoch: current, purpose } = self.activity else {
            debug!(epoch, "session: transcript with nothing listening");
            return;
        };
        if current != epoch {
            debug!(epoch, current, "session: stale transcript");
            return;
        }
        self.activity = Activity::Idle;
        self.collab.cues.play(AudioCue::ListenStop);

        let transcript = match outcome {
            ListenOutcome::Heard(text) => text,
            ListenOutcome::TimedOut => {
                debug!("session: listen timed out");
                self.collab.input.cancel();
                String::new()
            }
        };
        info!(%transcript, ?purpose, "session: heard");

        match purpose {
            Purpose::Query => {
                if transcript.trim().is_empty() {
                    return;
                }
                self.voice_search = true;
                self.submit_search(transcript);
            }
            Purpose::ArticleCommand => {
                if self.mode != Mode::Article {
                    return;
                }
                let command = self.router.route(&transcript, self.locale(), Mode::Article);
                self.article_command(command);
            }
            Purpose::ResultChoice => {
                if self.mode != Mode::ResultList {
                    return;
                }
                match self.router.route(&transcript, self.locale(), Mode::ResultList) {
                    Command::Home => self.go_home(),
                    command => {
                        let step = self.results.on_command(command);
                        self.apply_result_step(step);
                    }
                }
            }
        }
    }

    fn article_command(&mut self, command: Command) {
        let op = match command {
            Command::Play => NarrationOp::Play,
            Command::Stop => NarrationOp::Stop,
            Command::Repeat => NarrationOp::Repeat,
            Command::Next => NarrationOp::NextText,
            Command::Previous => NarrationOp::PreviousText,
            Command::NextSection => NarrationOp::NextSection,
            Command::PreviousSection => NarrationOp::PreviousSection,
            Command::Home => return self.go_home(),
            Command::Confirm | Command::Back | Command::Help => {
                let help = self.router.help_sentence(self.locale(), Mode::Article).to_string();
                return self.speak(Utterance::prompt(help), Then::Rest);
            }
        };
        self.narrate(op);
    }

    fn on_results(&mut self, results: Vec<SearchResult>) {
        info!(count = results.len(), "session: search finished");
        match results.len() {
            0 => {
                self.mode = Mode::Search;
                if self.voice_search {
                    self.voice_search = false;
                    self.collab.cues.play(AudioCue::Alert);
                    let sentence = self.sentences().search_no_results.clone();
                    self.speak(Utterance::prompt(sentence), Then::Rest);
                }
            }
            1 => {
                let id = results[0].id;
                self.open_article(id, self.voice_search);
            }
            _ => {
                self.mode = Mode::ResultList;
                self.results = ResultNarrator::new(results);
                if self.voice_search {
                    let prompt = self.sentences().search_open.clone();
                    let step = self.results.start_reading(prompt);
                    self.apply_result_step(step);
                }
            }
        }
    }

    fn on_article(&mut self, article: Result<Article, ApiError>) {
        match article {
            Ok(article) => {
                info!(title = %article.title, "session: article ready");
                self.mode = Mode::Article;
                self.results = ResultNarrator::default();
                self.narration = Some(NarrationController::new(article));
                self.last_error = None;
                self.set_highlight(None);
                if self.voice_search {
                    self.narrate(NarrationOp::Play);
                }
            }
            Err(e) => {
                warn!("session: article fetch failed: {e}");
                self.last_error = Some(e.to_string());
                if self.voice_search {
                    self.collab.cues.play(AudioCue::Alert);
                }
            }
        }
    }

    // ─── Directives ────────────────────────────────────────────────────

    fn apply_narration(&mut self, step: Narration) {
        match step {
            Narration::Speak(utterance) => self.speak(utterance, Then::Narration),
            Narration::Silence => self.cancel_activity(),
            Narration::Unchanged => {}
        }
    }

    fn apply_result_step(&mut self, step: ResultStep) {
        match step {
            ResultStep::Speak(utterance) => self.speak(utterance, Then::Results),
            ResultStep::Listen => self.listen(Purpose::ResultChoice),
            ResultStep::Open(result) => {
                info!(id = result.id, title = %result.title, "session: result chosen");
                self.open_article(result.id, true);
            }
            ResultStep::Unchanged => {}
        }
    }

    // ─── Speech discipline ─────────────────────────────────────────────

    /// Void whatever is speaking or listening.
    fn cancel_activity(&mut self) {
        match self.activity {
            Activity::Idle => return,
            Activity::Speaking { .. } => self.collab.output.cancel(),
            Activity::Listening { .. } => {
                self.collab.input.cancel();
                self.collab.cues.play(AudioCue::ListenStop);
            }
        }
        self.activity = Activity::Idle;
        self.next_epoch();
    }

    fn next_epoch(&mut self) -> u64 {
        self.epoch += 1;
        self.live.send_replace(self.epoch);
        self.epoch
    }

    fn speak(&mut self, utterance: Utterance, then: Then) {
        self.cancel_activity();
        let epoch = self.next_epoch();
        self.activity = Activity::Speaking { epoch, then };
        if utterance.target.is_some() {
            self.set_highlight(utterance.target);
        }

        let pause = match utterance.target {
            Some(target) if then == Then::Narration && target.is_heading() => {
                self.config.heading_pause()
            }
            _ => Duration::ZERO,
        };
        let output = self.collab.output.clone();
        let locale = self.config.language.clone();
        let events = self.events.clone();
        let live = self.live.subscribe();
        debug!(epoch, text = %utterance.text, "session: speak");
        tokio::spawn(async move {
            let spoken = async {
                output.speak(&utterance.text, &locale).await;
                // The heading pause belongs to the utterance and is voided with it.
                if !pause.is_zero() {
                    tokio::time::sleep(pause).await;
                }
            };
            tokio::select! {
                biased;
                _ = voided(live, epoch) => {}
                _ = spoken => {
                    let _ = events.send(Event::SpeechDone { epoch });
                }
            }
        });
    }

    fn listen(&mut self, purpose: Purpose) {
        self.cancel_activity();
        let epoch = self.next_epoch();
        self.activity = Activity::Listening { epoch, purpose };
        self.collab.cues.play(AudioCue::ListenStart);

        let input = self.collab.input.clone();
        let locale = self.config.language.clone();
        let limit = self.config.listen_timeout();
        let events = self.events.clone();
        let live = self.live.subscribe();
        debug!(epoch, ?purpose, "session: listen");
        tokio::spawn(async move {
            let heard = tokio::time::timeout(limit, input.listen_once(&locale));
            tokio::select! {
                biased;
                _ = voided(live, epoch) => {}
                outcome = heard => {
                    let outcome = match outcome {
                        Ok(text) => ListenOutcome::Heard(text),
                        Err(_) => ListenOutcome::TimedOut,
                    };
                    let _ = events.send(Event::Listened { epoch, outcome });
                }
            }
        });
    }

    // ─── Status ────────────────────────────────────────────────────────

    fn set_highlight(&mut self, target: Option<HighlightTarget>) {
        if self.highlighted != target {
            self.highlighted = target;
            self.collab.highlighter.set_highlighted(target);
        }
    }

    fn begin_loading(&mut self) {
        self.request += 1;
        self.loading = true;
        if self.voice_search {
            self.collab.cues.play(AudioCue::LoadingStart);
        }
    }

    fn end_loading(&mut self) {
        if !self.loading {
            return;
        }
        self.loading = false;
        if self.voice_search {
            self.collab.cues.play(AudioCue::LoadingStop);
        }
    }

    fn publish(&self) {
        let narration = self.narration.as_ref();
        let status = SessionStatus {
            mode: self.mode,
            article_title: narration.map(|n| n.article().title.clone()),
            narration: narration.map(NarrationController::state),
            position: narration.map(NarrationController::position),
            results: self.results.results().to_vec(),
            result_index: (!self.results.results().is_empty()).then(|| self.results.index()),
            reading_results: self.results.is_active(),
            highlighted: self.highlighted,
            speaking: matches!(self.activity, Activity::Speaking { .. }),
            listening: matches!(self.activity, Activity::Listening { .. }),
            loading: self.loading,
            last_error: self.last_error.clone(),
        };
        self.status.send_replace(status);
    }
}

/// Resolves once `epoch` is no longer the live one.
async fn voided(mut live: watch::Receiver<u64>, epoch: u64) {
    loop {
        let current = *live.borrow_and_update();
        if current != epoch || live.changed().await.is_err() {
            return;
        }
    }
}
